//! C# source text for declaration trees.
//!
//! Type references inside the generated tree are written relative to the store's root
//! namespace through the `winmdroot` alias, so units stay readable regardless of how deeply
//! a type is namespaced. Anything outside the root is fully qualified with `global::`.

use std::collections::BTreeMap;

use crate::{
    docs::ApiDetails,
    render::{
        writer::{escape_string, escape_xml, CodeWriter},
        OutputUnit, UnitSettings,
    },
    synth::{
        declarations::{
            BitfieldAccessor, CallingConvention, ConstantDecl, ConstantExpr, Declaration,
            DeclarationKind, DelegateDecl, EnumAccessor, EnumDecl, ExternMethod, FieldDecl,
            FunctionPointerSig, HelperKind, InterfaceDecl, LayoutSpec, MethodSig, ParamDecl,
            StructDecl, StructMember, TypeExpr,
        },
        POINTER_ARRAY_HELPER,
    },
};

const HEADER: &str = "\
// ------------------------------------------------------------------------------
// <auto-generated>
//     This code was generated by dotbind.
//
//     Changes to this file may cause incorrect behavior and will be lost if
//     the code is regenerated.
// </auto-generated>
// ------------------------------------------------------------------------------
";

const PRAGMAS: &str =
    "#pragma warning disable CS1591,CS1573,CS0465,CS0649,CS8019,CS1570,CS1584,CS1658,CS0436,CS8981";

const USINGS: &[&str] = &[
    "global::System",
    "global::System.Diagnostics",
    "global::System.Diagnostics.CodeAnalysis",
    "global::System.Runtime.CompilerServices",
    "global::System.Runtime.InteropServices",
];

/// Element types C# accepts in `fixed` buffers.
const FIXED_BUFFER_TYPES: &[&str] = &[
    "bool", "byte", "sbyte", "short", "ushort", "int", "uint", "long", "ulong", "char", "float",
    "double",
];

/// Renders a whole unit: header, usings, then type namespaces, then the methods and
/// constants container.
pub(crate) fn render_unit(unit: &OutputUnit) -> String {
    let mut emitter = Emitter::new(&unit.settings);
    emitter.preamble();

    let mut types: BTreeMap<&str, Vec<&Declaration>> = BTreeMap::new();
    let mut members: BTreeMap<&str, Vec<&Declaration>> = BTreeMap::new();
    for declaration in unit.declarations.iter().map(|declaration| &**declaration) {
        if declaration.is_member() {
            let namespace = if unit.settings.root_namespace.is_empty() {
                declaration.namespace.as_str()
            } else {
                unit.settings.root_namespace.as_str()
            };
            members.entry(namespace).or_default().push(declaration);
        } else {
            types
                .entry(declaration.namespace.as_str())
                .or_default()
                .push(declaration);
        }
    }

    for (namespace, declarations) in types {
        emitter.namespace(namespace, |emitter| {
            for declaration in declarations {
                emitter.out.separate();
                emitter.declaration(declaration);
            }
        });
    }

    for (namespace, declarations) in members {
        emitter.namespace(namespace, |emitter| {
            let header = format!(
                "{} static partial class {}",
                emitter.visibility(),
                emitter.settings.class_name
            );
            emitter.out.open(header);
            let (methods, constants): (Vec<&Declaration>, Vec<&Declaration>) = declarations
                .into_iter()
                .partition(|declaration| matches!(declaration.kind, DeclarationKind::Method(_)));
            for declaration in methods.into_iter().chain(constants) {
                emitter.out.separate();
                emitter.declaration(declaration);
            }
            emitter.out.close();
        });
    }

    emitter.out.finish()
}

/// Returns `true` for types that need an unsafe context.
fn is_unsafe(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Pointer(_) | TypeExpr::FunctionPointer(_) => true,
        TypeExpr::Array(inner) => is_unsafe(inner),
        TypeExpr::VariableLengthArray { element, .. } => is_unsafe(element),
        _ => false,
    }
}

fn is_fixed_buffer(ty: &TypeExpr) -> bool {
    matches!(ty, TypeExpr::Primitive(keyword) if FIXED_BUFFER_TYPES.contains(keyword))
}

fn is_void(ty: &TypeExpr) -> bool {
    *ty == TypeExpr::Primitive("void")
}

fn signature_is_unsafe(signature: &MethodSig) -> bool {
    is_unsafe(&signature.ret) || signature.params.iter().any(|param| is_unsafe(&param.ty))
}

fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn unsafe_modifier(needed: bool) -> &'static str {
    if needed {
        "unsafe "
    } else {
        ""
    }
}

/// The member name of `System.Runtime.InteropServices.CallingConvention`.
fn runtime_convention(convention: CallingConvention) -> &'static str {
    match convention {
        CallingConvention::Cdecl => "Cdecl",
        CallingConvention::Stdcall => "StdCall",
        CallingConvention::Thiscall => "ThisCall",
        CallingConvention::Fastcall => "FastCall",
    }
}

fn guid_attribute(guid: &uguid::Guid) -> String {
    format!("[Guid(\"{}\")]", guid.to_string().to_ascii_uppercase())
}

/// The arguments of `new Guid(uint, ushort, ushort, byte, ...)` for `guid`.
pub(crate) fn guid_arguments(guid: &uguid::Guid) -> String {
    let digits = guid.to_string().replace('-', "").to_ascii_uppercase();
    let part = |start: usize, end: usize| format!("0x{}", digits.get(start..end).unwrap_or("0"));

    let mut arguments = vec![part(0, 8), part(8, 12), part(12, 16)];
    for byte in 0..8 {
        let start = 16 + byte * 2;
        arguments.push(part(start, start + 2));
    }
    arguments.join(", ")
}

fn layout_attribute(layout: &LayoutSpec) -> String {
    let mut attribute = format!(
        "[StructLayout(LayoutKind.{}",
        if layout.explicit {
            "Explicit"
        } else {
            "Sequential"
        }
    );
    if layout.pack != 0 {
        attribute.push_str(&format!(", Pack = {}", layout.pack));
    }
    if layout.size != 0 {
        attribute.push_str(&format!(", Size = {}", layout.size));
    }
    if layout.unicode {
        attribute.push_str(", CharSet = CharSet.Unicode");
    }
    attribute.push_str(")]");
    attribute
}

/// Writes declarations of one unit.
pub(crate) struct Emitter<'a> {
    settings: &'a UnitSettings,
    pub(crate) out: CodeWriter,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(settings: &'a UnitSettings) -> Self {
        Emitter {
            settings,
            out: CodeWriter::new(),
        }
    }

    fn visibility(&self) -> &'static str {
        self.settings.visibility()
    }

    fn preamble(&mut self) {
        self.out.line(HEADER);
        self.out.line(PRAGMAS);
        for using in USINGS {
            self.out.line(format!("using {using};"));
        }
        if !self.settings.root_namespace.is_empty() {
            self.out.line(format!(
                "using winmdroot = global::{};",
                self.settings.root_namespace
            ));
        }
    }

    fn namespace(&mut self, namespace: &str, body: impl FnOnce(&mut Self)) {
        self.out.separate();
        if namespace.is_empty() {
            body(self);
        } else {
            self.out.open(format!("namespace {namespace}"));
            body(self);
            self.out.close();
        }
    }

    /// The reference to a type declared as `name` in `namespace`.
    fn qualify(&self, namespace: &str, name: &str) -> String {
        let root = self.settings.root_namespace.as_str();
        if namespace.is_empty() {
            return format!("global::{name}");
        }
        if !root.is_empty() {
            if namespace == root {
                return format!("winmdroot.{name}");
            }
            if let Some(rest) = namespace
                .strip_prefix(root)
                .and_then(|rest| rest.strip_prefix('.'))
            {
                return format!("winmdroot.{rest}.{name}");
            }
        }
        format!("global::{namespace}.{name}")
    }

    pub(crate) fn type_name(&self, ty: &TypeExpr) -> String {
        match ty {
            TypeExpr::Primitive(keyword) => (*keyword).to_string(),
            TypeExpr::Named { namespace, name } => self.qualify(namespace, name),
            TypeExpr::Local(name) => name.clone(),
            TypeExpr::Pointer(inner) => format!("{}*", self.type_name(inner)),
            TypeExpr::Array(inner) => format!("{}[]", self.type_name(inner)),
            TypeExpr::FunctionPointer(signature) => self.function_pointer(signature, None),
            TypeExpr::VariableLengthArray {
                element,
                namespace,
                index,
            } => {
                let helper = self.qualify(namespace, "VariableLengthInlineArray");
                match index {
                    Some(storage) => format!("{helper}<{}, {storage}>", self.type_name(element)),
                    None => format!("{helper}<{}>", self.type_name(element)),
                }
            }
        }
    }

    fn function_pointer(&self, signature: &FunctionPointerSig, this: Option<String>) -> String {
        let arguments: Vec<String> = this
            .into_iter()
            .chain(signature.params.iter().map(|param| self.type_name(param)))
            .chain(std::iter::once(self.type_name(&signature.ret)))
            .collect();
        format!(
            "delegate *unmanaged[{}]<{}>",
            signature.convention,
            arguments.join(", ")
        )
    }

    fn params(&self, params: &[ParamDecl]) -> String {
        params
            .iter()
            .map(|param| {
                let mut text = String::new();
                if let Some(marshal) = &param.marshal_as {
                    text.push_str(&format!("[MarshalAs(UnmanagedType.{marshal})] "));
                }
                if param.optional {
                    text.push_str("[Optional] ");
                }
                if param.out && !param.ty.is_pointer() {
                    text.push_str("[Out] ");
                }
                text.push_str(&format!("{} {}", self.type_name(&param.ty), param.name));
                text
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn plain_params(&self, params: &[ParamDecl]) -> String {
        params
            .iter()
            .map(|param| format!("{} {}", self.type_name(&param.ty), param.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn summary(&mut self, docs: Option<&ApiDetails>) {
        if let Some(description) = docs.and_then(|docs| docs.description.as_deref()) {
            self.out.doc("summary", "", description);
        }
    }

    fn method_docs(&mut self, docs: Option<&ApiDetails>, signature: &MethodSig) {
        let Some(docs) = docs else {
            return;
        };
        self.summary(Some(docs));
        for param in &signature.params {
            if let Some(text) = docs.parameters.get(&param.name) {
                let attributes = format!(" name=\"{}\"", param.name);
                self.out.doc("param", &attributes, text);
            }
        }
        if let Some(returns) = &docs.returns {
            self.out.doc("returns", "", returns);
        }
    }

    fn remarks(&mut self, docs: Option<&ApiDetails>, extra: Option<String>) {
        let link = docs.and_then(|docs| docs.help_link.as_deref());
        let remarks = docs.and_then(|docs| docs.remarks.as_deref());
        if link.is_none() && remarks.is_none() && extra.is_none() {
            return;
        }

        self.out.line("/// <remarks>");
        if let Some(link) = link {
            self.out.line(format!(
                "/// <para><see href=\"{}\">Learn more about this API from learn.microsoft.com</see>.</para>",
                escape_xml(link).replace('"', "&quot;")
            ));
        }
        if let Some(remarks) = remarks {
            self.out.doc("para", "", remarks);
        }
        if let Some(extra) = extra {
            self.out.line(format!("/// <para>{extra}</para>"));
        }
        self.out.line("/// </remarks>");
    }

    fn obsolete(&mut self, message: Option<&String>) {
        if let Some(message) = message {
            self.out
                .line(format!("[Obsolete(\"{}\")]", escape_string(message)));
        }
    }

    fn return_marshal(&mut self, signature: &MethodSig) {
        if let Some(marshal) = &signature.ret_marshal_as {
            self.out
                .line(format!("[return: MarshalAs(UnmanagedType.{marshal})]"));
        }
    }

    pub(crate) fn declaration(&mut self, declaration: &Declaration) {
        let name = simple_name(&declaration.name);
        let docs = declaration.docs.as_ref();
        match &declaration.kind {
            DeclarationKind::Struct(decl) => self.struct_decl(name, docs, decl),
            DeclarationKind::Enum(decl) => self.enum_decl(name, docs, decl),
            DeclarationKind::Delegate(decl) => self.delegate_decl(name, docs, decl),
            DeclarationKind::UntypedDelegate => self.untyped_delegate(name, docs),
            DeclarationKind::Interface(decl) if decl.vtable => self.vtable_struct(name, docs, decl),
            DeclarationKind::Interface(decl) => self.interface_decl(name, docs, decl),
            DeclarationKind::Method(method) => self.extern_method(docs, method),
            DeclarationKind::Constant(constant) => {
                let description = docs.and_then(|docs| docs.description.as_deref());
                self.constant(constant, description);
            }
            DeclarationKind::Helper(kind) => self.helper(*kind),
        }
    }

    fn struct_decl(&mut self, name: &str, docs: Option<&ApiDetails>, decl: &StructDecl) {
        self.summary(docs);
        let release = decl
            .release_method
            .as_ref()
            .map(|method| format!("Release with <c>{}</c>.", escape_xml(method)));
        self.remarks(docs, release);
        if let Some(layout) = &decl.layout {
            self.out.line(layout_attribute(layout));
        }
        if let Some(guid) = &decl.guid {
            self.out.line(guid_attribute(guid));
        }

        let needs_unsafe = decl.members.iter().any(|member| match member {
            StructMember::Field(field) => {
                is_unsafe(&field.ty)
                    || (field.fixed_length.is_some()
                        && field.marshal_as.is_none()
                        && is_fixed_buffer(&field.ty))
            }
            StructMember::Constant(constant) => is_unsafe(&constant.ty),
            _ => false,
        });
        let header = if decl.typedef {
            format!(
                "{} {}readonly partial struct {name} : IEquatable<{name}>",
                self.visibility(),
                unsafe_modifier(needs_unsafe)
            )
        } else {
            format!(
                "{} {}partial struct {name}",
                self.visibility(),
                unsafe_modifier(needs_unsafe)
            )
        };
        self.out.open(header);

        let mut fixed_helpers: Vec<(String, TypeExpr, u32)> = Vec::new();
        for member in &decl.members {
            self.out.separate();
            match member {
                StructMember::Field(field) => self.field(field, decl.typedef, &mut fixed_helpers),
                StructMember::Constant(constant) => self.constant(constant, None),
                StructMember::EnumAccessor(accessor) => self.enum_accessor(accessor),
                StructMember::Bitfield(bitfield) => self.bitfield(bitfield),
                StructMember::SizeOf { element } => self.size_of(name, element),
                StructMember::InlineArrayHelper { element } => self.pointer_array_helper(element),
            }
        }

        if decl.typedef {
            let value = decl.members.iter().find_map(|member| match member {
                StructMember::Field(field) => Some(field),
                _ => None,
            });
            if let Some(value) = value {
                self.typedef_members(name, value);
            }
        }

        for (helper, element, length) in &fixed_helpers {
            self.out.separate();
            self.fixed_array(helper, element, *length);
        }

        for nested in &decl.nested {
            self.out.separate();
            self.declaration(nested);
        }
        self.out.close();
    }

    fn field(
        &mut self,
        field: &FieldDecl,
        readonly: bool,
        fixed_helpers: &mut Vec<(String, TypeExpr, u32)>,
    ) {
        if let Some(docs) = &field.docs {
            self.out.doc("summary", "", docs);
        }
        if let Some(offset) = field.offset {
            self.out.line(format!("[FieldOffset({offset})]"));
        }
        match (&field.marshal_as, field.fixed_length) {
            (Some(marshal), Some(length)) => self.out.line(format!(
                "[MarshalAs(UnmanagedType.{marshal}, SizeConst = {length})]"
            )),
            (Some(marshal), None) => self
                .out
                .line(format!("[MarshalAs(UnmanagedType.{marshal})]")),
            _ => {}
        }
        self.obsolete(field.obsolete.as_ref());

        let access = if field.private {
            "private"
        } else {
            self.visibility()
        };
        let readonly = if readonly { " readonly" } else { "" };
        let ty = self.type_name(&field.ty);
        let name = &field.name;

        match field.fixed_length {
            Some(_) if field.marshal_as.is_some() => {
                self.out.line(format!("{access}{readonly} {ty}[] {name};"));
            }
            Some(length) if is_fixed_buffer(&field.ty) => {
                self.out.line(format!("{access} fixed {ty} {name}[{length}];"));
            }
            Some(length) => {
                let helper = format!("__{}_{length}", field.ty.simple_name());
                if !fixed_helpers.iter().any(|(existing, _, _)| *existing == helper) {
                    fixed_helpers.push((helper.clone(), field.ty.clone(), length));
                }
                self.out.line(format!("{access}{readonly} {helper} {name};"));
            }
            None => self.out.line(format!("{access}{readonly} {ty} {name};")),
        }
    }

    /// A local struct holding `length` elements of a type `fixed` cannot hold.
    fn fixed_array(&mut self, helper: &str, element: &TypeExpr, length: u32) {
        let visibility = self.visibility();
        let ty = self.type_name(element);
        let pointers = is_unsafe(element);
        self.out.open(format!(
            "{visibility} {}partial struct {helper}",
            unsafe_modifier(pointers)
        ));

        let fields: Vec<String> = (0..length.max(1)).map(|index| format!("_{index}")).collect();
        self.out
            .line(format!("{visibility} {ty} {};", fields.join(", ")));
        self.out.separate();
        self.out
            .line(format!("/// <summary>Always <c>{length}</c>.</summary>"));
        self.out
            .line(format!("{visibility} readonly int Length => {length};"));

        if !pointers {
            self.out.separate();
            self.out.line("[UnscopedRef]");
            self.out.line(format!(
                "{visibility} ref {ty} this[int index] => ref AsSpan()[index];"
            ));
            self.out.separate();
            self.out.line("[UnscopedRef]");
            self.out.line(format!(
                "{visibility} Span<{ty}> AsSpan() => MemoryMarshal.CreateSpan(ref _0, {length});"
            ));
        }
        self.out.close();
    }

    fn constant(&mut self, constant: &ConstantDecl, docs: Option<&str>) {
        if let Some(docs) = docs {
            self.out.doc("summary", "", docs);
        }
        let visibility = self.visibility();
        let name = &constant.name;
        let ty = self.type_name(&constant.ty);
        let modifier = if is_unsafe(&constant.ty) { " unsafe" } else { "" };

        let line = match &constant.value {
            ConstantExpr::Literal(literal) if constant.is_const() => {
                format!("{visibility} const {ty} {name} = {literal};")
            }
            ConstantExpr::Literal(literal) => {
                format!("{visibility} static readonly{modifier} {ty} {name} = {literal};")
            }
            ConstantExpr::Converted { ty: target, literal } => {
                let target = self.type_name(target);
                format!(
                    "{visibility} static readonly{modifier} {target} {name} = ({target})({literal});"
                )
            }
            ConstantExpr::Guid(guid) => format!(
                "{visibility} static readonly global::System.Guid {name} = new global::System.Guid({});",
                guid_arguments(guid)
            ),
        };
        self.out.line(line);
    }

    fn enum_accessor(&mut self, accessor: &EnumAccessor) {
        let enum_ty = self.type_name(&accessor.enum_ty);
        let raw = self.type_name(&accessor.raw_ty);
        let field = &accessor.field;
        self.out
            .open(format!("{} {enum_ty} {}", self.visibility(), accessor.name));
        self.out
            .line(format!("readonly get => ({enum_ty})this.{field};"));
        self.out.line(format!("set => this.{field} = ({raw})value;"));
        self.out.close();
    }

    fn bitfield(&mut self, bitfield: &BitfieldAccessor) {
        let layout = &bitfield.layout;
        let storage = bitfield.storage;
        let field = &bitfield.field;
        let offset = layout.offset;
        let mask = layout.mask();
        let property = layout.property_type();

        self.out.line(format!(
            "/// <summary>Bits {offset}..{} of <c>{field}</c>.</summary>",
            offset + layout.length - 1
        ));
        self.out
            .open(format!("{} {property} {}", self.visibility(), bitfield.name));

        if layout.is_boolean() {
            self.out
                .line(format!("readonly get => (this.{field} & 0x{mask:X}) != 0;"));
            self.out.line(format!(
                "set => this.{field} = unchecked(value ? ({storage})(this.{field} | ({storage})0x{mask:X}) : ({storage})(this.{field} & ~({storage})0x{mask:X}));"
            ));
        } else {
            if layout.signed {
                let (wide, width) = if layout.storage_bits < 32 {
                    ("int", 32)
                } else {
                    (storage, layout.storage_bits)
                };
                self.out.line(format!(
                    "readonly get => ({property})((({wide})this.{field} << {}) >> {});",
                    width - offset - layout.length,
                    width - layout.length
                ));
            } else {
                self.out.line(format!(
                    "readonly get => ({property})((this.{field} >> {offset}) & 0x{:X});",
                    layout.mask_no_offset()
                ));
            }

            self.out.open("set");
            if layout.asserts_range() {
                self.out.line(format!(
                    "Debug.Assert(value is >= {} and <= {});",
                    layout.min(),
                    layout.max()
                ));
            }
            self.out.line(format!(
                "this.{field} = unchecked(({storage})((this.{field} & ~({storage})0x{mask:X}) | ((({storage})value << {offset}) & ({storage})0x{mask:X})));"
            ));
            self.out.close();
        }
        self.out.close();
    }

    fn size_of(&mut self, name: &str, element: &TypeExpr) {
        let element = self.type_name(element);
        self.out.line(
            "/// <summary>Bytes to allocate for this struct with <paramref name=\"count\"/> elements in its trailing array.</summary>",
        );
        self.out
            .open(format!("{} static unsafe int SizeOf(int count)", self.visibility()));
        self.out.line(format!("int v = sizeof({name});"));
        self.out.line("if (count > 1)");
        self.out
            .line(format!("    v += checked((count - 1) * sizeof({element}));"));
        self.out.line("else if (count < 0)");
        self.out
            .line("    throw new ArgumentOutOfRangeException(nameof(count));");
        self.out.line("return v;");
        self.out.close();
    }

    /// Pointers cannot be generic arguments, so their trailing arrays index raw addresses.
    fn pointer_array_helper(&mut self, element: &TypeExpr) {
        let visibility = self.visibility();
        let ty = self.type_name(element);
        self.out.open(format!(
            "{visibility} unsafe partial struct {POINTER_ARRAY_HELPER}"
        ));
        self.out.line(format!("{visibility} nint e0;"));
        self.out.separate();
        self.out.open(format!("{visibility} {ty} this[int index]"));
        self.out.line(format!(
            "readonly get => ({ty})Unsafe.Add(ref Unsafe.AsRef(in this.e0), index);"
        ));
        self.out
            .line("set => Unsafe.Add(ref this.e0, index) = (nint)value;");
        self.out.close();
        self.out.close();
    }

    fn typedef_members(&mut self, name: &str, value: &FieldDecl) {
        let visibility = self.visibility();
        let ty = self.type_name(&value.ty);
        let field = &value.name;
        let hash = if value.ty.is_pointer() {
            format!("unchecked((int)(nint)this.{field})")
        } else {
            format!("this.{field}.GetHashCode()")
        };

        let members = [
            format!("{visibility} {name}({ty} value) => this.{field} = value;"),
            format!("public static implicit operator {ty}({name} value) => value.{field};"),
            format!("public static explicit operator {name}({ty} value) => new {name}(value);"),
            format!(
                "public static bool operator ==({name} left, {name} right) => left.{field} == right.{field};"
            ),
            format!("public static bool operator !=({name} left, {name} right) => !(left == right);"),
            format!("public bool Equals({name} other) => this.{field} == other.{field};"),
            format!(
                "public override bool Equals(object obj) => obj is {name} other && this.Equals(other);"
            ),
            format!("public override int GetHashCode() => {hash};"),
        ];
        for member in members {
            self.out.separate();
            self.out.line(member);
        }
    }

    fn enum_decl(&mut self, name: &str, docs: Option<&ApiDetails>, decl: &EnumDecl) {
        self.summary(docs);
        self.remarks(docs, None);
        if decl.flags {
            self.out.line("[Flags]");
        }
        self.out
            .open(format!("{} enum {name} : {}", self.visibility(), decl.base));
        for member in &decl.members {
            if let Some(docs) = &member.docs {
                self.out.doc("summary", "", docs);
            }
            self.out
                .line(format!("{} = {},", member.name, decl.literal(member.value)));
        }
        self.out.close();
    }

    fn delegate_decl(&mut self, name: &str, docs: Option<&ApiDetails>, decl: &DelegateDecl) {
        let signature = &decl.signature;
        self.method_docs(docs, signature);
        self.remarks(docs, None);
        if let Some(convention) = decl.convention {
            self.out.line(format!(
                "[UnmanagedFunctionPointer(CallingConvention.{})]",
                runtime_convention(convention)
            ));
        }
        self.return_marshal(signature);
        self.out.line(format!(
            "{} {}delegate {} {name}({});",
            self.visibility(),
            unsafe_modifier(signature_is_unsafe(signature)),
            self.type_name(&signature.ret),
            self.params(&signature.params)
        ));
    }

    fn untyped_delegate(&mut self, name: &str, docs: Option<&ApiDetails>) {
        let visibility = self.visibility();
        self.summary(docs);
        self.out.open(format!("{visibility} partial struct {name}"));
        self.out.line(format!("{visibility} nint Value;"));
        self.out.separate();
        self.out.line(format!(
            "{visibility} TDelegate CreateDelegate<TDelegate>()\n    where TDelegate : Delegate => Marshal.GetDelegateForFunctionPointer<TDelegate>(this.Value);"
        ));
        self.out.close();
    }

    fn interface_decl(&mut self, name: &str, docs: Option<&ApiDetails>, decl: &InterfaceDecl) {
        self.summary(docs);
        self.remarks(docs, None);
        let guid = decl
            .guid
            .as_ref()
            .map(|guid| format!("Guid(\"{}\"), ", guid.to_string().to_ascii_uppercase()))
            .unwrap_or_default();
        self.out.line(format!(
            "[{guid}InterfaceType(ComInterfaceType.InterfaceIsIUnknown), ComImport()]"
        ));

        let base = decl
            .base
            .as_ref()
            .filter(|base| base.simple_name() != "IUnknown")
            .map(|base| format!(" : {}", self.type_name(base)))
            .unwrap_or_default();
        let needs_unsafe = decl
            .inherited
            .iter()
            .chain(&decl.methods)
            .any(signature_is_unsafe);
        self.out.open(format!(
            "{} {}interface {name}{base}",
            self.visibility(),
            unsafe_modifier(needs_unsafe)
        ));

        let methods = decl
            .inherited
            .iter()
            .map(|method| (method, true))
            .chain(decl.methods.iter().map(|method| (method, false)));
        for (method, redeclared) in methods {
            self.out.separate();
            self.out.line("[PreserveSig]");
            self.return_marshal(method);
            self.out.line(format!(
                "{}{} {}({});",
                if redeclared { "new " } else { "" },
                self.type_name(&method.ret),
                method.name,
                self.params(&method.params)
            ));
        }
        self.out.close();
    }

    fn vtable_entry(&self, name: &str, method: &MethodSig) -> String {
        let mut arguments = vec![format!("{name}*")];
        arguments.extend(method.params.iter().map(|param| self.type_name(&param.ty)));
        arguments.push(self.type_name(&method.ret));
        format!("delegate *unmanaged[Stdcall]<{}>", arguments.join(", "))
    }

    fn vtable_struct(&mut self, name: &str, docs: Option<&ApiDetails>, decl: &InterfaceDecl) {
        let visibility = self.visibility();
        self.summary(docs);
        self.remarks(docs, None);
        if let Some(guid) = &decl.guid {
            self.out.line(guid_attribute(guid));
        }
        self.out
            .open(format!("{visibility} unsafe partial struct {name}"));

        let slots: Vec<&MethodSig> = decl.inherited.iter().chain(&decl.methods).collect();
        for (slot, method) in slots.iter().enumerate() {
            self.out.separate();
            let entry = self.vtable_entry(name, method);
            let arguments: Vec<String> =
                std::iter::once(format!("({name}*)Unsafe.AsPointer(ref this)"))
                    .chain(method.params.iter().map(|param| param.name.clone()))
                    .collect();
            let call = format!("(({entry})lpVtbl[{slot}])({})", arguments.join(", "));

            self.out.open(format!(
                "{visibility} {} {}({})",
                self.type_name(&method.ret),
                method.name,
                self.plain_params(&method.params)
            ));
            if is_void(&method.ret) {
                self.out.line(format!("{call};"));
            } else {
                self.out.line(format!("return {call};"));
            }
            self.out.close();
        }

        self.out.separate();
        self.out.open(format!("{visibility} struct Vtbl"));
        for (slot, method) in slots.iter().enumerate() {
            let entry = self.vtable_entry(name, method);
            self.out
                .line(format!("{visibility} {entry} {}_{};", method.name, slot + 1));
        }
        self.out.close();

        self.out.separate();
        self.out.line("private void** lpVtbl;");
        self.out.close();
    }

    fn extern_method(&mut self, docs: Option<&ApiDetails>, method: &ExternMethod) {
        let signature = &method.signature;
        self.method_docs(docs, signature);
        self.remarks(docs, None);

        let mut import = format!(
            "[DllImport(\"{}\", ExactSpelling = true",
            escape_string(&method.library)
        );
        if method.entry_point != signature.name {
            import.push_str(&format!(", EntryPoint = \"{}\"", method.entry_point));
        }
        if method.sets_last_error {
            import.push_str(", SetLastError = true");
        }
        import.push_str(")]");
        self.out.line(import);
        self.out
            .line("[DefaultDllImportSearchPaths(DllImportSearchPath.System32)]");
        self.return_marshal(signature);
        self.obsolete(method.obsolete.as_ref());
        self.out.line(format!(
            "{} static extern {}{} {}({});",
            self.visibility(),
            unsafe_modifier(signature_is_unsafe(signature)),
            self.type_name(&signature.ret),
            signature.name,
            self.params(&signature.params)
        ));
    }

    fn helper(&mut self, kind: HelperKind) {
        let visibility = self.visibility();
        let (header, storage, element) = match kind {
            HelperKind::VariableLengthInlineArray => (
                format!("{visibility} struct VariableLengthInlineArray<T>\n    where T : unmanaged"),
                "T",
                "ref this.e0".to_string(),
            ),
            HelperKind::VariableLengthInlineArrayIndexed => (
                format!(
                    "{visibility} struct VariableLengthInlineArray<T, TBlittable>\n    where T : unmanaged\n    where TBlittable : unmanaged"
                ),
                "TBlittable",
                "ref Unsafe.As<TBlittable, T>(ref this.e0)".to_string(),
            ),
        };

        self.out.open(header);
        self.out.line(format!("{visibility} {storage} e0;"));
        self.out.separate();
        self.out.line("[UnscopedRef]");
        self.out.line(format!(
            "{visibility} ref T this[int index] => ref Unsafe.Add({element}, index);"
        ));
        self.out.separate();
        self.out.line("[UnscopedRef]");
        self.out.line(format!(
            "{visibility} Span<T> AsSpan(int length) => MemoryMarshal.CreateSpan({element}, length);"
        ));
        self.out.close();
    }
}
