//! An in-memory metadata store.
//!
//! [`MetadataBuilder`] assembles rows the same way a compiler would emit them: value types
//! extend `System.ValueType`, enums carry a `value__` field, delegates expose an `Invoke`
//! method. The result, [`InMemoryMetadata`], implements [`MetadataReader`] and can be plugged
//! into a store through [`InMemoryMetadata::factory`].
//!
//! # Examples
//!
//! ```rust
//! use dotbind::metadata::{memory::MetadataBuilder, signatures::TypeSignature};
//!
//! let mut builder = MetadataBuilder::new("Windows.Win32");
//! let point = builder.struct_type("Windows.Win32.Foundation", "POINT");
//! builder.field(point, "x", TypeSignature::I4);
//! builder.field(point, "y", TypeSignature::I4);
//! let metadata = builder.build();
//! # use dotbind::metadata::reader::MetadataReader;
//! assert_eq!(metadata.type_definitions().len(), 1);
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    file::Backend,
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeArgument, INTEROP_DECORATION_NAMESPACE},
        reader::{MetadataReader, ReaderFactory},
        signatures::{SignatureMethod, SignatureParameter, TypeSignature},
        tables::{
            AssemblyReference, ClassLayout, ConstantValue, FieldAttributes, FieldDefinition,
            MethodDefinition, MethodImport, NamespaceDefinition, PInvokeAttributes,
            ParamAttributes, Parameter, ResolutionScope, TypeAttributes, TypeDefinition,
            TypeReference,
        },
        token::{
            Token, TABLE_ASSEMBLYREF, TABLE_FIELD, TABLE_METHODDEF, TABLE_PARAM, TABLE_TYPEDEF,
            TABLE_TYPEREF,
        },
    },
    Result,
};

/// Metadata held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadata {
    assembly: String,
    root: NamespaceDefinition,
    type_defs: Vec<TypeDefinition>,
    type_refs: Vec<TypeReference>,
    assembly_refs: Vec<AssemblyReference>,
    fields: Vec<FieldDefinition>,
    methods: Vec<MethodDefinition>,
    attributes: HashMap<Token, Vec<CustomAttribute>>,
}

impl InMemoryMetadata {
    /// A reader factory that hands out clones of this metadata, ignoring the mapped bytes.
    #[must_use]
    pub fn factory(self) -> Arc<dyn ReaderFactory> {
        let shared = Arc::new(self);
        Arc::new(
            move |_backend: Arc<dyn Backend>| -> Result<Box<dyn MetadataReader>> {
                Ok(Box::new((*shared).clone()))
            },
        )
    }

    /// The first `TypeRef` row with the given namespace and name.
    #[must_use]
    pub fn find_type_ref(&self, namespace: &str, name: &str) -> Option<Token> {
        self.type_refs
            .iter()
            .find(|r| r.namespace == namespace && r.name == name)
            .map(|r| r.token)
    }
}

fn row<'a, T>(rows: &'a [T], token: Token, table: u8, what: &str) -> Result<&'a T> {
    if token.table() != table || token.row() == 0 {
        return Err(malformed_error!("{} is not a {} handle", token, what));
    }

    rows.get(token.row() as usize - 1)
        .ok_or_else(|| malformed_error!("{} row {} does not exist", what, token.row()))
}

impl MetadataReader for InMemoryMetadata {
    fn assembly_name(&self) -> &str {
        &self.assembly
    }

    fn root_namespace(&self) -> &NamespaceDefinition {
        &self.root
    }

    fn type_definitions(&self) -> &[TypeDefinition] {
        &self.type_defs
    }

    fn type_definition(&self, token: Token) -> Result<&TypeDefinition> {
        row(&self.type_defs, token, TABLE_TYPEDEF, "TypeDef")
    }

    fn type_reference(&self, token: Token) -> Result<&TypeReference> {
        row(&self.type_refs, token, TABLE_TYPEREF, "TypeRef")
    }

    fn assembly_reference(&self, token: Token) -> Result<&AssemblyReference> {
        row(&self.assembly_refs, token, TABLE_ASSEMBLYREF, "AssemblyRef")
    }

    fn field(&self, token: Token) -> Result<&FieldDefinition> {
        row(&self.fields, token, TABLE_FIELD, "Field")
    }

    fn method(&self, token: Token) -> Result<&MethodDefinition> {
        row(&self.methods, token, TABLE_METHODDEF, "MethodDef")
    }

    fn custom_attributes(&self, parent: Token) -> &[CustomAttribute] {
        self.attributes.get(&parent).map_or(&[], Vec::as_slice)
    }
}

/// Builds [`InMemoryMetadata`] row by row.
pub struct MetadataBuilder {
    metadata: InMemoryMetadata,
    system_ref: Token,
    value_type: Token,
    enum_type: Token,
    delegate_type: Token,
    object_type: Token,
    param_count: u32,
}

impl MetadataBuilder {
    /// Starts a store describing `assembly`.
    ///
    /// References to the core library base types are created up front.
    #[must_use]
    pub fn new(assembly: &str) -> Self {
        let mut builder = MetadataBuilder {
            metadata: InMemoryMetadata {
                assembly: assembly.to_string(),
                ..InMemoryMetadata::default()
            },
            system_ref: Token(0),
            value_type: Token(0),
            enum_type: Token(0),
            delegate_type: Token(0),
            object_type: Token(0),
            param_count: 0,
        };

        builder.system_ref = builder.assembly_ref("netstandard");
        let scope = ResolutionScope::Assembly(builder.system_ref);
        builder.value_type = builder.type_ref("System", "ValueType", scope);
        builder.enum_type = builder.type_ref("System", "Enum", scope);
        builder.delegate_type = builder.type_ref("System", "MulticastDelegate", scope);
        builder.object_type = builder.type_ref("System", "Object", scope);
        builder
    }

    /// Adds an `AssemblyRef` row.
    pub fn assembly_ref(&mut self, name: &str) -> Token {
        let token = Token::from_parts(
            TABLE_ASSEMBLYREF,
            self.metadata.assembly_refs.len() as u32 + 1,
        );
        self.metadata.assembly_refs.push(AssemblyReference {
            token,
            name: name.to_string(),
            version: (0, 0, 0, 0),
        });
        token
    }

    /// Adds a `TypeRef` row.
    pub fn type_ref(&mut self, namespace: &str, name: &str, scope: ResolutionScope) -> Token {
        let token = Token::from_parts(TABLE_TYPEREF, self.metadata.type_refs.len() as u32 + 1);
        self.metadata.type_refs.push(TypeReference {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            scope,
        });
        token
    }

    /// Adds a `TypeRef` to a type of the core library, such as `System.Guid`.
    pub fn system_type_ref(&mut self, namespace: &str, name: &str) -> Token {
        let scope = ResolutionScope::Assembly(self.system_ref);
        self.type_ref(namespace, name, scope)
    }

    /// Adds a `TypeRef` to a type defined in this same store.
    pub fn local_ref(&mut self, namespace: &str, name: &str) -> Token {
        self.type_ref(namespace, name, ResolutionScope::Module)
    }

    /// Adds a `TypeDef` row.
    pub fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        extends: Option<Token>,
    ) -> Token {
        let token = Token::from_parts(TABLE_TYPEDEF, self.metadata.type_defs.len() as u32 + 1);
        self.metadata.type_defs.push(TypeDefinition {
            token,
            flags,
            namespace: namespace.to_string(),
            name: name.to_string(),
            extends,
            fields: Vec::new(),
            methods: Vec::new(),
            nested_types: Vec::new(),
            enclosing: None,
            interfaces: Vec::new(),
            layout: None,
        });
        token
    }

    /// Adds a sequential-layout value type.
    pub fn struct_type(&mut self, namespace: &str, name: &str) -> Token {
        let extends = Some(self.value_type);
        self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
            extends,
        )
    }

    /// Adds an explicit-layout value type.
    pub fn union_type(&mut self, namespace: &str, name: &str) -> Token {
        let extends = Some(self.value_type);
        self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            extends,
        )
    }

    /// Adds an enum with the given underlying type.
    pub fn enum_type(&mut self, namespace: &str, name: &str, underlying: TypeSignature) -> Token {
        let extends = Some(self.enum_type);
        let token = self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            extends,
        );
        self.push_field(
            token,
            "value__",
            FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME | FieldAttributes::RTSPECIAL_NAME,
            underlying,
            None,
        );
        token
    }

    /// Adds an enum member.
    pub fn enum_member(&mut self, owner: Token, name: &str, value: ConstantValue) -> Token {
        let signature = value.signature();
        self.push_field(
            owner,
            name,
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
            signature,
            Some(value),
        )
    }

    /// Adds a delegate whose `Invoke` method has `signature`.
    pub fn delegate_type(
        &mut self,
        namespace: &str,
        name: &str,
        signature: SignatureMethod,
        params: &[&str],
    ) -> Token {
        let extends = Some(self.delegate_type);
        let token = self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            extends,
        );
        self.method(
            token,
            ".ctor",
            SignatureMethod {
                has_this: true,
                return_type: SignatureParameter::of(TypeSignature::Void),
                params: vec![
                    SignatureParameter::of(TypeSignature::Object),
                    SignatureParameter::of(TypeSignature::I),
                ],
                ..SignatureMethod::default()
            },
            &["object", "method"],
        );
        self.method(token, "Invoke", signature, params);
        token
    }

    /// Adds a COM interface.
    pub fn interface_type(&mut self, namespace: &str, name: &str) -> Token {
        self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            None,
        )
    }

    /// Adds a static class, such as the per-namespace `Apis` container.
    pub fn class_type(&mut self, namespace: &str, name: &str) -> Token {
        let extends = Some(self.object_type);
        self.define_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            extends,
        )
    }

    /// Nests `child` inside `parent`.
    pub fn nest(&mut self, parent: Token, child: Token) {
        if let Some(def) = self.type_mut(child) {
            def.enclosing = Some(parent);
            def.namespace.clear();
            def.flags.remove(TypeAttributes::PUBLIC);
            def.flags.insert(TypeAttributes::NESTED_PUBLIC);
        }
        if let Some(def) = self.type_mut(parent) {
            def.nested_types.push(child);
        }
    }

    /// Sets packing and size of a type.
    pub fn layout(&mut self, ty: Token, packing_size: u16, class_size: u32) {
        if let Some(def) = self.type_mut(ty) {
            def.layout = Some(ClassLayout {
                packing_size,
                class_size,
            });
        }
    }

    /// Records that `ty` implements `interface`.
    pub fn implements(&mut self, ty: Token, interface: Token) {
        if let Some(def) = self.type_mut(ty) {
            def.interfaces.push(interface);
        }
    }

    /// Adds an instance field.
    pub fn field(&mut self, owner: Token, name: &str, signature: TypeSignature) -> Token {
        self.push_field(owner, name, FieldAttributes::PUBLIC, signature, None)
    }

    /// Adds an instance field at an explicit byte offset.
    pub fn field_at(
        &mut self,
        owner: Token,
        name: &str,
        signature: TypeSignature,
        offset: u32,
    ) -> Token {
        let token = self.field(owner, name, signature);
        if let Some(field) = self.metadata.fields.last_mut() {
            field.offset = Some(offset);
        }
        token
    }

    /// Adds a public static literal.
    pub fn constant(&mut self, owner: Token, name: &str, value: ConstantValue) -> Token {
        self.enum_member(owner, name, value)
    }

    /// Adds a public static literal declared with a type other than its stored value's.
    ///
    /// Native API metadata types constants such as `S_OK` as their typedef struct while the
    /// `Constant` table holds the underlying integer.
    pub fn typed_constant(
        &mut self,
        owner: Token,
        name: &str,
        signature: TypeSignature,
        value: ConstantValue,
    ) -> Token {
        self.push_field(
            owner,
            name,
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
            signature,
            Some(value),
        )
    }

    /// Adds a static field without a default value.
    pub fn static_field(&mut self, owner: Token, name: &str, signature: TypeSignature) -> Token {
        self.push_field(
            owner,
            name,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::INIT_ONLY,
            signature,
            None,
        )
    }

    /// Adds a method with named parameters.
    pub fn method(
        &mut self,
        owner: Token,
        name: &str,
        signature: SignatureMethod,
        params: &[&str],
    ) -> Token {
        let token = Token::from_parts(TABLE_METHODDEF, self.metadata.methods.len() as u32 + 1);
        let mut rows = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            self.param_count += 1;
            rows.push(Parameter {
                token: Token::from_parts(TABLE_PARAM, self.param_count),
                sequence: index as u16 + 1,
                name: (*param).to_string(),
                flags: ParamAttributes::IN,
            });
        }

        self.metadata.methods.push(MethodDefinition {
            token,
            name: name.to_string(),
            signature,
            params: rows,
            import: None,
        });
        if let Some(def) = self.type_mut(owner) {
            def.methods.push(token);
        }
        token
    }

    /// Adds an extern method imported from `module`.
    pub fn extern_method(
        &mut self,
        owner: Token,
        name: &str,
        module: &str,
        signature: SignatureMethod,
        params: &[&str],
    ) -> Token {
        let token = self.method(owner, name, signature, params);
        if let Some(method) = self.metadata.methods.last_mut() {
            method.import = Some(MethodImport {
                module: module.to_string(),
                entry_point: name.to_string(),
                flags: PInvokeAttributes::NO_MANGLE | PInvokeAttributes::CALL_CONV_WINAPI,
            });
        }
        token
    }

    /// Marks the most recently added extern method as setting the last error.
    pub fn sets_last_error(&mut self, method: Token) {
        if let Some(import) = self
            .method_mut(method)
            .and_then(|method| method.import.as_mut())
        {
            import.flags.insert(PInvokeAttributes::SUPPORTS_LAST_ERROR);
        }
    }

    /// Overrides the flags of one parameter; sequence 0 is the return value.
    pub fn param_flags(&mut self, method: Token, sequence: u16, flags: ParamAttributes) {
        if let Some(method) = self.method_mut(method) {
            if let Some(param) = method.params.iter_mut().find(|p| p.sequence == sequence) {
                param.flags = flags;
            }
        }
    }

    /// Adds the row describing a method's return value and returns its token.
    pub fn return_param(&mut self, method: Token) -> Token {
        self.param_count += 1;
        let token = Token::from_parts(TABLE_PARAM, self.param_count);
        if let Some(method) = self.method_mut(method) {
            method.params.insert(
                0,
                Parameter {
                    token,
                    sequence: 0,
                    name: String::new(),
                    flags: ParamAttributes::empty(),
                },
            );
        }
        token
    }

    /// The token a parameter row received, for attaching attributes to it.
    #[must_use]
    pub fn param_token(&self, method: Token, sequence: u16) -> Option<Token> {
        self.method_row(method)
            .and_then(|method| method.param(sequence))
            .map(|param| param.token)
    }

    /// Attaches a custom attribute.
    pub fn attribute(&mut self, parent: Token, attribute: CustomAttribute) {
        self.metadata
            .attributes
            .entry(parent)
            .or_default()
            .push(attribute);
    }

    /// Attaches an interop decoration.
    pub fn decorate(&mut self, parent: Token, name: &str, args: Vec<CustomAttributeArgument>) {
        self.attribute(
            parent,
            CustomAttribute::new(INTEROP_DECORATION_NAMESPACE, name, args),
        );
    }

    /// Finishes the store and builds the namespace tree.
    #[must_use]
    pub fn build(mut self) -> InMemoryMetadata {
        let mut root = NamespaceDefinition::default();
        for def in &self.metadata.type_defs {
            if def.is_nested() {
                continue;
            }
            namespace_node(&mut root, &def.namespace).types.push(def.token);
        }
        self.metadata.root = root;
        self.metadata
    }

    fn type_mut(&mut self, token: Token) -> Option<&mut TypeDefinition> {
        if token.table() != TABLE_TYPEDEF {
            return None;
        }
        let index = (token.row() as usize).checked_sub(1)?;
        self.metadata.type_defs.get_mut(index)
    }

    fn method_row(&self, token: Token) -> Option<&MethodDefinition> {
        if token.table() != TABLE_METHODDEF {
            return None;
        }
        let index = (token.row() as usize).checked_sub(1)?;
        self.metadata.methods.get(index)
    }

    fn method_mut(&mut self, token: Token) -> Option<&mut MethodDefinition> {
        if token.table() != TABLE_METHODDEF {
            return None;
        }
        let index = (token.row() as usize).checked_sub(1)?;
        self.metadata.methods.get_mut(index)
    }

    fn push_field(
        &mut self,
        owner: Token,
        name: &str,
        flags: FieldAttributes,
        signature: TypeSignature,
        default: Option<ConstantValue>,
    ) -> Token {
        let token = Token::from_parts(TABLE_FIELD, self.metadata.fields.len() as u32 + 1);
        self.metadata.fields.push(FieldDefinition {
            token,
            name: name.to_string(),
            flags,
            signature,
            default,
            offset: None,
        });
        if let Some(def) = self.type_mut(owner) {
            def.fields.push(token);
        }
        token
    }
}

fn namespace_node<'a>(root: &'a mut NamespaceDefinition, full: &str) -> &'a mut NamespaceDefinition {
    if full.is_empty() {
        return root;
    }

    let mut node = root;
    let mut prefix = String::new();
    for segment in full.split('.') {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(segment);

        let index = match node.children.iter().position(|child| child.name == prefix) {
            Some(index) => index,
            None => {
                node.children.push(NamespaceDefinition {
                    name: prefix.clone(),
                    ..NamespaceDefinition::default()
                });
                node.children.len() - 1
            }
        };
        node = &mut node.children[index];
    }
    node
}
