//! Translation of signatures into type expressions.

use crate::{
    ledger::Context,
    metadata::{
        customattributes::{find_attribute, INTEROP_SERVICES_NAMESPACE, MARSHAL_AS},
        signatures::{SignatureMethod, TypeSignature},
        tables::{MethodDefinition, ParamAttributes},
        token::Token,
    },
    synth::{
        declarations::{CallingConvention, FunctionPointerSig, ParamDecl, TypeExpr},
        Element, Synthesizer,
    },
    Result,
};

/// The keyword of a primitive signature.
#[must_use]
pub(crate) fn primitive_keyword(signature: &TypeSignature) -> Option<&'static str> {
    Some(match signature {
        TypeSignature::Void => "void",
        TypeSignature::Boolean => "bool",
        TypeSignature::Char => "char",
        TypeSignature::I1 => "sbyte",
        TypeSignature::U1 => "byte",
        TypeSignature::I2 => "short",
        TypeSignature::U2 => "ushort",
        TypeSignature::I4 => "int",
        TypeSignature::U4 => "uint",
        TypeSignature::I8 => "long",
        TypeSignature::U8 => "ulong",
        TypeSignature::R4 => "float",
        TypeSignature::R8 => "double",
        TypeSignature::I => "nint",
        TypeSignature::U => "nuint",
        TypeSignature::String => "string",
        TypeSignature::Object => "object",
        _ => return None,
    })
}

impl Synthesizer<'_> {
    /// Translates a signature, requesting every type it mentions.
    pub(crate) fn type_expr(
        &self,
        signature: &TypeSignature,
        context: Context,
        element: Element,
    ) -> Result<TypeExpr> {
        if let Some(keyword) = primitive_keyword(signature) {
            return Ok(TypeExpr::Primitive(keyword));
        }

        Ok(match signature {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => {
                self.request_type(*token, context)?
            }
            TypeSignature::Ptr(pointer) => match self.interface_target(&pointer.base) {
                // COM objects are references when the runtime marshals them; a field holding
                // one is typed as an array so the struct stays a value type.
                Some(interface) if context.allow_marshaling => {
                    let named = self.request_type(interface, context)?;
                    if element == Element::Field {
                        TypeExpr::Array(Box::new(named))
                    } else {
                        named
                    }
                }
                _ => self
                    .type_expr(&pointer.base, context, Element::Other)?
                    .pointer(),
            },
            TypeSignature::ByRef(base) => self.type_expr(base, context, Element::Other)?.pointer(),
            TypeSignature::SzArray(base) => {
                TypeExpr::Array(Box::new(self.type_expr(base, context, Element::Other)?))
            }
            // Sized arrays outside struct fields decay to pointers, as they do in C.
            TypeSignature::Array(array) => self
                .type_expr(&array.base, context, Element::Other)?
                .pointer(),
            TypeSignature::FnPtr(method) => {
                let convention = convention_of(method).unwrap_or(CallingConvention::Stdcall);
                TypeExpr::FunctionPointer(Box::new(self.function_pointer(
                    method,
                    convention,
                    context,
                )?))
            }
            other => return Err(not_supported!("Unsupported signature {:?}", other)),
        })
    }

    /// Builds a function pointer type from a method signature.
    ///
    /// Delegates among the parameters become nested function pointers, so the result never
    /// depends on marshaling.
    pub(crate) fn function_pointer(
        &self,
        method: &SignatureMethod,
        convention: CallingConvention,
        context: Context,
    ) -> Result<FunctionPointerSig> {
        let blittable = context.with_marshaling(false);
        let params = method
            .params
            .iter()
            .map(|param| self.type_expr(&param.base, blittable, Element::Parameter))
            .collect::<Result<Vec<_>>>()?;
        let ret = self.type_expr(&method.return_type.base, blittable, Element::Return)?;

        Ok(FunctionPointerSig {
            convention,
            params,
            ret,
        })
    }

    /// Translates the parameters of a method, naming them from its parameter rows.
    ///
    /// Under marshaling, a pointer to an interface pointer is exposed as an `out` parameter of
    /// the interface type.
    pub(crate) fn param_decls(
        &self,
        method: &MethodDefinition,
        context: Context,
    ) -> Result<Vec<ParamDecl>> {
        let mut params = Vec::with_capacity(method.signature.params.len());
        for (position, param) in method.signature.params.iter().enumerate() {
            let sequence = u16::try_from(position + 1)
                .map_err(|_| malformed_error!("{} has too many parameters", method.name))?;
            let row = method.param(sequence);
            let name = match row {
                Some(row) if !row.name.is_empty() => row.name.clone(),
                _ => format!("param{sequence}"),
            };
            let flags = row.map_or(ParamAttributes::empty(), |row| row.flags);

            let (ty, out) = match &param.base {
                TypeSignature::Ptr(outer) if context.allow_marshaling => match outer.base.as_ref()
                {
                    TypeSignature::Ptr(inner) if self.interface_target(&inner.base).is_some() => {
                        (self.type_expr(outer.base.as_ref(), context, Element::Parameter)?, true)
                    }
                    _ => (
                        self.type_expr(&param.base, context, Element::Parameter)?,
                        flags.contains(ParamAttributes::OUT),
                    ),
                },
                other => (
                    self.type_expr(other, context, Element::Parameter)?,
                    flags.contains(ParamAttributes::OUT),
                ),
            };

            let marshal_as = row.and_then(|row| self.marshal_as(row.token));
            params.push(ParamDecl {
                name: escape_identifier(&name),
                ty,
                out,
                optional: flags.contains(ParamAttributes::OPTIONAL),
                marshal_as,
            });
        }
        Ok(params)
    }

    /// The `UnmanagedType` named by a `MarshalAs` attribute on a field or parameter row.
    pub(crate) fn marshal_as(&self, token: Token) -> Option<String> {
        let attribute = find_attribute(
            self.reader.custom_attributes(token),
            INTEROP_SERVICES_NAMESPACE,
            MARSHAL_AS,
        )?;
        let value = attribute.arg(0)?.as_i64()?;
        Some(unmanaged_type_name(value))
    }
}

/// The calling convention bits of a function pointer signature.
pub(crate) fn convention_of(method: &SignatureMethod) -> Option<CallingConvention> {
    if method.cdecl {
        Some(CallingConvention::Cdecl)
    } else if method.stdcall {
        Some(CallingConvention::Stdcall)
    } else if method.thiscall {
        Some(CallingConvention::Thiscall)
    } else if method.fastcall {
        Some(CallingConvention::Fastcall)
    } else {
        None
    }
}

/// `System.Runtime.InteropServices.UnmanagedType` member names for the values native API
/// metadata uses.
fn unmanaged_type_name(value: i64) -> String {
    match value {
        2 => "Bool".to_string(),
        19 => "BStr".to_string(),
        20 => "LPStr".to_string(),
        21 => "LPWStr".to_string(),
        25 => "IUnknown".to_string(),
        26 => "IDispatch".to_string(),
        28 => "Interface".to_string(),
        30 => "ByValArray".to_string(),
        42 => "LPArray".to_string(),
        other => format!("(UnmanagedType){other}"),
    }
}

/// Prefixes identifiers that collide with target-language keywords with `@`.
pub(crate) fn escape_identifier(name: &str) -> String {
    const KEYWORDS: &[&str] = &[
        "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
        "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
        "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
        "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
        "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
        "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed",
        "short", "sizeof", "stackalloc", "static", "string", "struct", "switch", "this",
        "throw", "true", "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort",
        "using", "virtual", "void", "volatile", "while",
    ];

    if KEYWORDS.contains(&name) {
        format!("@{name}")
    } else {
        name.to_string()
    }
}
