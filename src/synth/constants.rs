//! Constants, both loose ones from `Apis` containers and literals declared inside structs.

use crate::{
    ledger::{Context, LedgerKey},
    metadata::{
        customattributes::{decode_guid, find_decoration, GUID},
        tables::{ConstantValue, FieldDefinition},
        token::Token,
    },
    synth::{
        declarations::{ConstantDecl, ConstantExpr, Declaration, DeclarationKind, TypeExpr},
        typeref::escape_identifier,
        Element, Synthesizer,
    },
    Result,
};

/// The literal of a constant value, suffixed so that it keeps its type.
#[must_use]
pub fn literal(value: &ConstantValue) -> String {
    match value {
        ConstantValue::Boolean(value) => value.to_string(),
        ConstantValue::Char(value) => char_literal(*value),
        ConstantValue::I1(value) => value.to_string(),
        ConstantValue::U1(value) => value.to_string(),
        ConstantValue::I2(value) => value.to_string(),
        ConstantValue::U2(value) => value.to_string(),
        ConstantValue::I4(value) => value.to_string(),
        ConstantValue::U4(value) => format!("{value}U"),
        ConstantValue::I8(value) => format!("{value}L"),
        ConstantValue::U8(value) => format!("{value}UL"),
        ConstantValue::R4(value) => float_literal(f64::from(*value), "float", "F"),
        ConstantValue::R8(value) => float_literal(*value, "double", "D"),
        ConstantValue::String(value) => string_literal(value),
        ConstantValue::Null => "null".to_string(),
    }
}

fn float_literal(value: f64, keyword: &str, suffix: &str) -> String {
    if value.is_nan() {
        format!("{keyword}.NaN")
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "Positive" } else { "Negative" };
        format!("{keyword}.{sign}Infinity")
    } else {
        format!("{value}{suffix}")
    }
}

fn char_literal(unit: u16) -> String {
    match char::from_u32(u32::from(unit)) {
        Some('\'') => "'\\''".to_string(),
        Some('\\') => "'\\\\'".to_string(),
        Some(c) if c.is_ascii_graphic() || c == ' ' => format!("'{c}'"),
        _ => format!("'\\u{unit:04X}'"),
    }
}

fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04X}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Synthesizer<'_> {
    /// Declares a static field as a constant.
    ///
    /// Literals typed as a typedef struct or an enum convert their stored value to that type.
    /// GUIDs carry their value in a decoration rather than the `Constant` table.
    pub(crate) fn constant_decl(
        &self,
        field: &FieldDefinition,
        context: Context,
    ) -> Result<ConstantDecl> {
        let name = escape_identifier(&field.name);
        let ty = self.type_expr(&field.signature, context, Element::Other)?;

        if let Some(guid) =
            find_decoration(self.reader.custom_attributes(field.token), GUID).and_then(decode_guid)
        {
            return Ok(ConstantDecl {
                name,
                ty,
                value: ConstantExpr::Guid(guid),
            });
        }

        let Some(value) = field.default.as_ref().filter(|_| field.is_literal()) else {
            return Err(not_supported!(
                "Static field {} has no constant value",
                field.name
            ));
        };

        let value = if field.signature == value.signature() || ty.is_primitive() {
            ConstantExpr::Literal(literal(value))
        } else {
            ConstantExpr::Converted {
                ty: ty.clone(),
                literal: literal(value),
            }
        };
        Ok(ConstantDecl { name, ty, value })
    }

    /// Generates a loose constant of an `Apis` container in `namespace`.
    pub(crate) fn request_constant(&self, namespace: &str, token: Token) -> Result<()> {
        let field = self.reader.field(token)?;
        let context = Context::new(self.allows_marshaling());

        let key = LedgerKey::Constant(namespace.to_string(), field.name.clone());
        self.generator.ledger.generate(key, || {
            let constant = self
                .constant_decl(field, context)
                .map_err(|error| error.wrap_generation(&field.name))?;
            let mut declaration = Declaration::new(
                namespace,
                &field.name,
                DeclarationKind::Constant(constant),
            );
            declaration.docs = self.docs(&field.name);
            Ok(Some(declaration))
        })?;
        Ok(())
    }
}

impl ConstantDecl {
    /// Returns `true` if the value can be declared `const`; the rest become `static readonly`.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self.value, ConstantExpr::Literal(_)) && !matches!(self.ty, TypeExpr::Array(_))
    }
}
