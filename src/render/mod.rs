//! Output units: committed declarations grouped into source files and rendered to C#.
//!
//! Grouping follows the shape of the generated code rather than the metadata:
//!
//! - every top-level type gets its own unit, named after the type;
//! - delegates share one `Delegates.g.cs` unit;
//! - extern methods are grouped by the module they import from, inside partial
//!   declarations of the methods container class;
//! - constants share one unit of that class;
//! - with [`crate::config::GeneratorOptions::emit_single_file`] everything lands in
//!   `NativeMethods.g.cs`.
//!
//! Unit names compare ignoring case, so two types whose names differ only in case share a
//! unit. Declarations are immutable once committed, which lets [`render_units`] render units
//! on the `rayon` thread pool.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    config::GeneratorOptions,
    synth::declarations::{Declaration, DeclarationKind},
};

mod csharp;
mod writer;

/// Name of the only unit when everything goes into a single file.
pub const SINGLE_FILE_UNIT: &str = "NativeMethods.g.cs";

/// Name of the unit holding every delegate.
pub const DELEGATES_UNIT: &str = "Delegates.g.cs";

/// Settings shared by every unit of one generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSettings {
    /// Namespace aliased as `winmdroot`; empty if the store has no common namespace
    pub root_namespace: String,
    /// Name of the static class holding extern methods and constants
    pub class_name: String,
    /// Declare everything `public` instead of `internal`
    pub public: bool,
}

impl UnitSettings {
    /// Settings for a store rooted at `root_namespace`.
    #[must_use]
    pub fn new(options: &GeneratorOptions, root_namespace: &str) -> Self {
        UnitSettings {
            root_namespace: root_namespace.to_string(),
            class_name: options.class_name.clone(),
            public: options.public,
        }
    }

    /// The accessibility keyword of generated declarations.
    #[must_use]
    pub fn visibility(&self) -> &'static str {
        if self.public {
            "public"
        } else {
            "internal"
        }
    }
}

/// One generated source file.
#[derive(Debug, Clone)]
pub struct OutputUnit {
    /// File name, such as `HANDLE.g.cs`
    pub name: String,
    /// Settings of the generator that produced the declarations
    pub settings: Arc<UnitSettings>,
    /// Declarations, ordered by namespace and name
    pub declarations: Vec<Arc<Declaration>>,
}

impl OutputUnit {
    /// Renders the unit to C# source text.
    #[must_use]
    pub fn render(&self) -> String {
        csharp::render_unit(self)
    }
}

/// The unit `declaration` belongs to.
#[must_use]
pub fn unit_name(declaration: &Declaration, settings: &UnitSettings, single_file: bool) -> String {
    if single_file {
        return SINGLE_FILE_UNIT.to_string();
    }
    match &declaration.kind {
        DeclarationKind::Method(method) => {
            format!("{}.{}.g.cs", settings.class_name, method.module)
        }
        DeclarationKind::Constant(_) => format!("{}.Constants.g.cs", settings.class_name),
        DeclarationKind::Delegate(_) => DELEGATES_UNIT.to_string(),
        _ => format!("{}.g.cs", declaration.name),
    }
}

/// Groups declarations into units, ordered by unit name.
#[must_use]
pub fn group(
    mut declarations: Vec<Arc<Declaration>>,
    settings: &Arc<UnitSettings>,
    single_file: bool,
) -> Vec<OutputUnit> {
    declarations.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

    let mut units: BTreeMap<String, OutputUnit> = BTreeMap::new();
    for declaration in declarations {
        let name = unit_name(&declaration, settings, single_file);
        units
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| OutputUnit {
                name,
                settings: Arc::clone(settings),
                declarations: Vec::new(),
            })
            .declarations
            .push(declaration);
    }
    units.into_values().collect()
}

/// Renders `units` in parallel and returns the text of each by unit name.
#[must_use]
pub fn render_units(units: &[OutputUnit]) -> BTreeMap<String, String> {
    let rendered: Vec<(String, String)> = units
        .par_iter()
        .map(|unit| (unit.name.clone(), unit.render()))
        .collect();

    debug!(units = rendered.len(), "Rendered output units");
    rendered.into_iter().collect()
}

/// Renames units whose names collide, ignoring case, with an earlier unit. The later unit
/// is prefixed with `owner`.
pub(crate) fn disambiguate(
    seen: &mut HashSet<String>,
    owner: &str,
    mut unit: OutputUnit,
) -> OutputUnit {
    if !seen.insert(unit.name.to_ascii_lowercase()) {
        unit.name = format!("{owner}.{}", unit.name);
        seen.insert(unit.name.to_ascii_lowercase());
    }
    unit
}
