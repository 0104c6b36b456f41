//! Structs, unions and their nested types.

use tracing::trace;

use crate::{
    index::TypeKind,
    ledger::{Context, LedgerKey},
    metadata::{
        customattributes::{
            decode_guid, find_attribute, find_attributes, find_decoration, CustomAttribute,
            CustomAttributeArgument, ASSOCIATED_ENUM, COMPILER_SERVICES_NAMESPACE, FIXED_BUFFER,
            FLEXIBLE_ARRAY, GUID, INTEROP_DECORATION_NAMESPACE, NATIVE_BITFIELD, NATIVE_TYPEDEF,
            OBSOLETE, SYSTEM_NAMESPACE,
        },
        signatures::TypeSignature,
        tables::{FieldDefinition, TypeDefinition},
        token::Token,
    },
    synth::{
        bitfield::BitfieldLayout,
        declarations::{
            BitfieldAccessor, Declaration, DeclarationKind, EnumAccessor, FieldDecl, HelperKind,
            LayoutSpec, StructDecl, StructMember, TypeExpr,
        },
        flexible,
        typeref::{escape_identifier, primitive_keyword},
        Element, Synthesizer,
    },
    Result,
};

/// Local helper struct for variable-length arrays of pointers, which cannot be generic
/// arguments.
pub const POINTER_ARRAY_HELPER: &str = "VariableLengthInlineArrayHelper";

/// Layout facts of the struct a field belongs to.
#[derive(Clone, Copy)]
struct Shape {
    explicit: bool,
    /// The trailing variable-length array, if any
    flexible: Option<Token>,
}

impl Synthesizer<'_> {
    pub(crate) fn synthesize_struct(
        &self,
        def: &TypeDefinition,
        context: Context,
    ) -> Result<StructDecl> {
        let attributes = self.reader.custom_attributes(def.token);

        let mut instance = Vec::with_capacity(def.fields.len());
        for &token in &def.fields {
            let field = self.reader.field(token)?;
            if !field.is_static() {
                instance.push(field);
            }
        }

        let explicit =
            def.is_explicit_layout() || instance.iter().any(|field| field.offset.is_some());
        let flexible = instance.last().map(|field| field.token).filter(|&token| {
            find_decoration(self.reader.custom_attributes(token), FLEXIBLE_ARRAY).is_some()
        });

        // Overlapping fields and trailing allocations cannot be marshaled by the runtime.
        let body_context = if explicit || flexible.is_some() {
            context.with_marshaling(false)
        } else {
            context
        };

        let class_layout = def.layout.unwrap_or_default();
        let mut decl = StructDecl {
            guid: find_decoration(attributes, GUID).and_then(decode_guid),
            typedef: find_decoration(attributes, NATIVE_TYPEDEF).is_some(),
            release_method: self.index().release_method(def.token).map(str::to_string),
            ..StructDecl::default()
        };

        let docs = self.docs(&def.name);
        for &token in &def.fields {
            let field = self.reader.field(token)?;
            let field_docs = docs
                .as_ref()
                .and_then(|docs| docs.fields.get(&field.name).cloned());
            let shape = Shape { explicit, flexible };
            self.struct_member(def, field, shape, body_context, field_docs, &mut decl)
                .map_err(|error| error.wrap_generation(&field.name))?;
        }

        let unicode = decl.members.iter().any(|member| match member {
            StructMember::Field(field) => holds_char(&field.ty),
            _ => false,
        });
        if explicit || unicode || !class_layout.is_default() {
            decl.layout = Some(LayoutSpec {
                explicit,
                pack: class_layout.packing_size,
                size: class_layout.class_size,
                unicode,
            });
        }

        let nested_context = if explicit {
            context.nested_in_explicit()
        } else {
            body_context
        };
        for &nested in &def.nested_types {
            let nested_def = self.reader.type_definition(nested)?;
            // Fixed buffers are folded back into their field.
            if nested_def.name.starts_with('<') {
                continue;
            }
            if let Some(kind) = self
                .synthesize_kind(nested_def, nested_context)
                .map_err(|error| error.wrap_generation(&nested_def.name))?
            {
                decl.nested
                    .push(Declaration::new(&def.namespace, &nested_def.name, kind));
            }
        }

        Ok(decl)
    }

    fn struct_member(
        &self,
        owner: &TypeDefinition,
        field: &FieldDefinition,
        shape: Shape,
        context: Context,
        docs: Option<String>,
        decl: &mut StructDecl,
    ) -> Result<()> {
        let attributes = self.reader.custom_attributes(field.token);

        if field.is_static() {
            decl.members
                .push(StructMember::Constant(self.constant_decl(field, context)?));
            return Ok(());
        }

        let name = escape_identifier(&field.name);
        let mut member = FieldDecl::new(name.clone(), TypeExpr::Primitive("void"));
        member.docs = docs;
        member.offset = if shape.explicit { field.offset } else { None };
        member.marshal_as = self.marshal_as(field.token);
        member.obsolete = find_attribute(attributes, SYSTEM_NAMESPACE, OBSOLETE)
            .map(obsolete_message);

        if let Some(fixed) = find_attribute(attributes, COMPILER_SERVICES_NAMESPACE, FIXED_BUFFER) {
            let (Some(CustomAttributeArgument::Type(element)), Some(length)) =
                (fixed.arg(0), fixed.arg(1).and_then(|arg| arg.as_i64()))
            else {
                return Err(malformed_error!(
                    "Fixed buffer {}.{} is not correctly encoded",
                    owner.name,
                    field.name
                ));
            };
            member.ty = self.type_expr(element, context, Element::Field)?;
            member.fixed_length = Some(u32::try_from(length).map_err(|_| {
                malformed_error!("Fixed buffer {} has length {}", field.name, length)
            })?);
            decl.members.push(StructMember::Field(member));
            return Ok(());
        }

        if shape.flexible == Some(field.token) {
            let TypeSignature::Array(array) = &field.signature else {
                return Err(malformed_error!(
                    "Variable-length array {}.{} is not declared as an array",
                    owner.name,
                    field.name
                ));
            };
            let element = self.field_type(owner, &array.base, context)?;
            if element.is_pointer() {
                decl.members.push(StructMember::InlineArrayHelper {
                    element: element.clone(),
                });
                member.ty = TypeExpr::Local(POINTER_ARRAY_HELPER.to_string());
            } else {
                let (helper, index) = flexible::helper_for(&element);
                let namespace = self.request_helper(helper)?;
                member.ty = TypeExpr::VariableLengthArray {
                    element: Box::new(element.clone()),
                    namespace,
                    index,
                };
            }
            decl.members.push(StructMember::Field(member));
            decl.members.push(StructMember::SizeOf { element });
            return Ok(());
        }

        if let TypeSignature::Array(array) = &field.signature {
            if let Some(length) = array.dimensions.first().and_then(|dimension| dimension.size) {
                member.ty = self.field_type(owner, &array.base, context)?;
                member.fixed_length = Some(length);
                decl.members.push(StructMember::Field(member));
                return Ok(());
            }
        }

        member.ty = self.field_type(owner, &field.signature, context)?;

        if let Some(associated) = find_decoration(attributes, ASSOCIATED_ENUM)
            .and_then(|attribute| attribute.arg(0))
            .and_then(|arg| arg.as_str())
        {
            match self.associated_enum(owner, associated) {
                Some(enum_token) => {
                    let enum_ty = self.request_definition(enum_token, context)?;
                    let backing = format!("_{}", field.name);
                    decl.members.push(StructMember::EnumAccessor(EnumAccessor {
                        name,
                        field: backing.clone(),
                        enum_ty,
                        raw_ty: member.ty.clone(),
                    }));
                    member.name = backing;
                    member.private = true;
                }
                None => {
                    trace!(field = %field.name, associated, "Associated enum not found");
                }
            }
        }

        let bitfields: Vec<&CustomAttribute> =
            find_attributes(attributes, INTEROP_DECORATION_NAMESPACE, NATIVE_BITFIELD).collect();
        if !bitfields.is_empty() {
            let Some((bits, signed)) = field.signature.integer_width() else {
                return Err(not_supported!(
                    "Bitfields stored in {:?} are not supported",
                    field.signature
                ));
            };
            let storage = primitive_keyword(&field.signature).unwrap_or("nint");

            for attribute in bitfields {
                let (Some(property), Some(offset), Some(length)) = (
                    attribute.arg(0).and_then(|arg| arg.as_str()),
                    attribute.arg(1).and_then(|arg| arg.as_i64()),
                    attribute.arg(2).and_then(|arg| arg.as_i64()),
                ) else {
                    return Err(malformed_error!(
                        "Bitfield on {}.{} is not correctly encoded",
                        owner.name,
                        field.name
                    ));
                };

                match BitfieldLayout::new(offset, length, bits, signed)? {
                    Some(layout) => decl.members.push(StructMember::Bitfield(BitfieldAccessor {
                        name: escape_identifier(property),
                        field: member.name.clone(),
                        storage,
                        layout,
                    })),
                    None => trace!(field = %field.name, property, "Skipped zero-length bitfield"),
                }
            }
        }

        decl.members.push(StructMember::Field(member));
        Ok(())
    }

    /// Types a field, referring to types nested in `owner` by their local name.
    fn field_type(
        &self,
        owner: &TypeDefinition,
        signature: &TypeSignature,
        context: Context,
    ) -> Result<TypeExpr> {
        let local = |token: Token| -> Result<Option<TypeExpr>> {
            match self.local_definition(token) {
                Some(def) => {
                    let def = self.reader.type_definition(def)?;
                    Ok((def.enclosing == Some(owner.token))
                        .then(|| TypeExpr::Local(def.name.clone())))
                }
                None => Ok(None),
            }
        };

        match signature {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => {
                if let Some(expr) = local(*token)? {
                    return Ok(expr);
                }
            }
            TypeSignature::Ptr(pointer) => {
                if let TypeSignature::ValueType(token) = pointer.base.as_ref() {
                    if let Some(expr) = local(*token)? {
                        return Ok(expr.pointer());
                    }
                }
            }
            _ => {}
        }
        self.type_expr(signature, context, Element::Field)
    }

    /// Finds the enum an `AssociatedEnum` decoration names, preferring the owner's namespace.
    fn associated_enum(&self, owner: &TypeDefinition, name: &str) -> Option<Token> {
        let index = self.index();
        index
            .namespace(&owner.namespace)
            .and_then(|ns| ns.types.get(name).copied())
            .into_iter()
            .chain(index.find_types(name))
            .find(|&token| index.kind(token) == TypeKind::EnumLike)
    }

    /// Requests a support struct and returns the namespace it is declared in.
    fn request_helper(&self, helper: HelperKind) -> Result<String> {
        let namespace = self.index().common_namespace().to_string();
        let name = helper.to_string();
        self.generator
            .ledger
            .generate(LedgerKey::Special(name.clone()), || {
                Ok(Some(Declaration::new(
                    &namespace,
                    name,
                    DeclarationKind::Helper(helper),
                )))
            })?;
        Ok(namespace)
    }
}

fn holds_char(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Primitive(keyword) => *keyword == "char",
        TypeExpr::VariableLengthArray { element, .. } => holds_char(element),
        _ => false,
    }
}

fn obsolete_message(attribute: &CustomAttribute) -> String {
    attribute
        .arg(0)
        .and_then(|arg| arg.as_str())
        .unwrap_or_default()
        .to_string()
}
