//! Enums.

use tracing::trace;

use crate::{
    docs::ApiDetails,
    metadata::{
        customattributes::{
            find_attribute, find_attributes, ASSOCIATED_CONSTANT, FLAGS,
            INTEROP_DECORATION_NAMESPACE, SYSTEM_NAMESPACE,
        },
        tables::{FieldDefinition, TypeDefinition},
    },
    synth::{
        declarations::{EnumDecl, EnumMember},
        typeref::primitive_keyword,
        Synthesizer,
    },
    Result,
};

impl EnumDecl {
    /// The literal of `value` as it appears in the declaration.
    ///
    /// Flags render as unpadded hexadecimal. A negative value of a signed base is written as
    /// the two's complement pattern, cast back to the base type.
    #[must_use]
    pub fn literal(&self, value: i128) -> String {
        if !self.flags {
            return value.to_string();
        }

        if value < 0 {
            let mask = if self.base_bits >= 64 {
                u64::MAX
            } else {
                (1u64 << self.base_bits) - 1
            };
            // Reinterpreting the low bits is the point here.
            let pattern = (value as u64) & mask;
            format!("unchecked(({})0x{:X})", self.base, pattern)
        } else {
            format!("0x{value:X}")
        }
    }
}

impl Synthesizer<'_> {
    pub(crate) fn synthesize_enum(&self, def: &TypeDefinition) -> Result<EnumDecl> {
        let attributes = self.reader.custom_attributes(def.token);
        let flags = find_attribute(attributes, SYSTEM_NAMESPACE, FLAGS).is_some();

        let mut base = None;
        let mut members = Vec::new();
        let docs = self.docs(&def.name);

        for &token in &def.fields {
            let field = self.reader.field(token)?;
            match &field.default {
                None if base.is_none() => base = Some(field.signature.clone()),
                None => {
                    return Err(malformed_error!(
                        "Enum {} has more than one instance field",
                        def.name
                    ))
                }
                Some(_) => members.push(self.enum_member(def, field, docs.as_ref())?),
            }
        }

        let Some(base) = base else {
            return Err(malformed_error!("Enum {} has no underlying type", def.name));
        };
        let (Some((base_bits, base_signed)), Some(keyword)) =
            (base.integer_width(), primitive_keyword(&base))
        else {
            return Err(not_supported!(
                "Enum {} has a non-integral underlying type {:?}",
                def.name,
                base
            ));
        };

        // Loose constants that belong to this enum.
        for attribute in find_attributes(attributes, INTEROP_DECORATION_NAMESPACE, ASSOCIATED_CONSTANT) {
            let Some(name) = attribute.arg(0).and_then(|arg| arg.as_str()) else {
                continue;
            };
            if members.iter().any(|member: &EnumMember| member.name == name) {
                continue;
            }
            let Some(constant) = self.index().find_constant(name) else {
                trace!(enum_name = %def.name, constant = name, "Associated constant not found");
                continue;
            };
            let field = self.reader.field(constant)?;
            members.push(self.enum_member(def, field, docs.as_ref())?);
        }

        Ok(EnumDecl {
            flags,
            base: keyword,
            base_bits,
            base_signed,
            members,
        })
    }

    fn enum_member(
        &self,
        def: &TypeDefinition,
        field: &FieldDefinition,
        docs: Option<&ApiDetails>,
    ) -> Result<EnumMember> {
        let value = field
            .default
            .as_ref()
            .and_then(|value| value.as_i128())
            .ok_or_else(|| {
                malformed_error!("{}.{} has a non-integral value", def.name, field.name)
            })?;

        Ok(EnumMember {
            name: field.name.clone(),
            value,
            docs: docs.and_then(|docs| docs.fields.get(&field.name).cloned()),
        })
    }
}
