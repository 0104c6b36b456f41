//! API documentation attached to generated declarations.
//!
//! Documentation only decorates output; nothing about a declaration's shape depends on it.
//! Hosts supply it through a [`DocsProvider`], or load an [`ApiDocs`] table from XML:
//!
//! ```xml
//! <apis>
//!   <api name="CreateFileW" helpLink="https://learn.microsoft.com/...">
//!     <description>Creates or opens a file or I/O device.</description>
//!     <param name="lpFileName">The name of the file or device.</param>
//!     <field name="...">...</field>
//!     <returns>An open handle to the file.</returns>
//!     <remarks>...</remarks>
//!   </api>
//! </apis>
//! ```

use std::collections::{BTreeMap, HashMap};

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{Error, Result};

/// Documentation of one API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDetails {
    /// Summary
    pub description: Option<String>,
    /// Link to the full documentation
    pub help_link: Option<String>,
    /// Remarks
    pub remarks: Option<String>,
    /// Description of the return value
    pub returns: Option<String>,
    /// Parameter descriptions by parameter name
    pub parameters: BTreeMap<String, String>,
    /// Field or enum member descriptions by name
    pub fields: BTreeMap<String, String>,
}

/// Source of API documentation.
pub trait DocsProvider: Send + Sync {
    /// Documentation for the API named `name`, if any.
    fn api_details(&self, name: &str) -> Option<ApiDetails>;
}

/// An in-memory documentation table with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct ApiDocs {
    entries: HashMap<String, ApiDetails>,
}

impl ApiDocs {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds documentation for `name`, replacing what was there.
    pub fn insert(&mut self, name: &str, details: ApiDetails) {
        self.entries.insert(name.to_ascii_lowercase(), details);
    }

    /// Adds every entry of `other` whose API is not documented yet. Earlier sources win.
    pub fn merge(&mut self, other: ApiDocs) {
        for (name, details) in other.entries {
            self.entries.entry(name).or_insert(details);
        }
    }

    /// Number of documented APIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is documented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a documentation table from XML.
    ///
    /// Unknown elements are ignored. The first entry for an API wins, like [`ApiDocs::merge`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the XML is not well-formed or an element lacks its `name`.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut docs = ApiDocs::new();
        let mut current: Option<(String, ApiDetails)> = None;
        let mut element: Option<(String, Option<String>)> = None;
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref start)) => {
                    let tag = tag_name(start);
                    if tag == "api" {
                        let name = required_attribute(start, "name")?;
                        let details = ApiDetails {
                            help_link: attribute(start, "helpLink")?,
                            ..ApiDetails::default()
                        };
                        current = Some((name, details));
                    } else if current.is_some() {
                        element = Some((tag, attribute(start, "name")?));
                        text.clear();
                    }
                }
                Ok(Event::Text(ref content)) => {
                    if element.is_some() {
                        let content = content
                            .unescape()
                            .map_err(|error| Error::Error(format!("Invalid docs XML: {error}")))?;
                        text.push_str(&content);
                    }
                }
                Ok(Event::CData(ref content)) => {
                    if element.is_some() {
                        text.push_str(&String::from_utf8_lossy(content.as_ref()));
                    }
                }
                Ok(Event::End(ref end)) => {
                    let tag = String::from_utf8_lossy(end.name().as_ref()).to_string();
                    if tag == "api" {
                        if let Some((name, details)) = current.take() {
                            docs.entries
                                .entry(name.to_ascii_lowercase())
                                .or_insert(details);
                        }
                    } else if let (Some((_, details)), Some((open, name))) =
                        (current.as_mut(), element.take())
                    {
                        if open == tag {
                            store(details, &tag, name, std::mem::take(&mut text))?;
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(error) => {
                    return Err(Error::Error(format!(
                        "Invalid docs XML at {}: {error}",
                        reader.error_position()
                    )))
                }
            }
        }

        Ok(docs)
    }
}

impl DocsProvider for ApiDocs {
    fn api_details(&self, name: &str) -> Option<ApiDetails> {
        self.entries.get(&name.to_ascii_lowercase()).cloned()
    }
}

fn tag_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).to_string()
}

fn attribute(start: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|error| Error::Error(format!("Invalid docs XML: {error}")))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|error| Error::Error(format!("Invalid docs XML: {error}")))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn required_attribute(start: &BytesStart, key: &str) -> Result<String> {
    attribute(start, key)?.ok_or_else(|| {
        Error::Error(format!(
            "Docs element <{}> has no {key} attribute",
            tag_name(start)
        ))
    })
}

fn store(details: &mut ApiDetails, tag: &str, name: Option<String>, text: String) -> Result<()> {
    match tag {
        "description" => details.description = Some(text),
        "remarks" => details.remarks = Some(text),
        "returns" => details.returns = Some(text),
        "param" | "field" => {
            let Some(name) = name else {
                return Err(Error::Error(format!(
                    "Docs element <{tag}> has no name attribute"
                )));
            };
            let map = if tag == "param" {
                &mut details.parameters
            } else {
                &mut details.fields
            };
            map.entry(name).or_insert(text);
        }
        _ => {}
    }
    Ok(())
}
