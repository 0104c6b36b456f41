//! In-memory metadata shaped like a slice of the Win32 API surface.

use crate::metadata::{
    customattributes::{
        CustomAttribute, CustomAttributeArgument as Arg, ASSOCIATED_CONSTANT, ASSOCIATED_ENUM,
        FIXED_BUFFER, FLAGS, FLEXIBLE_ARRAY, GUID, NATIVE_BITFIELD, NATIVE_TYPEDEF, RAII_FREE,
        SUPPORTED_ARCHITECTURE, SYSTEM_NAMESPACE, COMPILER_SERVICES_NAMESPACE,
        INTEROP_SERVICES_NAMESPACE, UNMANAGED_FUNCTION_POINTER,
    },
    memory::{InMemoryMetadata, MetadataBuilder},
    reader::MetadataReader,
    signatures::{
        ArrayDimensions, SignatureArray, SignatureMethod, SignatureParameter, TypeSignature,
    },
    tables::{ConstantValue, ParamAttributes, ResolutionScope},
    token::Token,
};

pub const FOUNDATION: &str = "Windows.Win32.Foundation";
pub const FILE_SYSTEM: &str = "Windows.Win32.Storage.FileSystem";
pub const DIAGNOSTICS: &str = "Windows.Win32.System.Diagnostics";
pub const THREADING: &str = "Windows.Win32.System.Threading";
pub const COM: &str = "Windows.Win32.System.Com";
pub const IOCTL: &str = "Windows.Win32.System.Ioctl";

pub fn signature(ret: TypeSignature, params: Vec<TypeSignature>) -> SignatureMethod {
    SignatureMethod {
        default: true,
        return_type: SignatureParameter::of(ret),
        params: params.into_iter().map(SignatureParameter::of).collect(),
        ..SignatureMethod::default()
    }
}

pub fn instance_signature(ret: TypeSignature, params: Vec<TypeSignature>) -> SignatureMethod {
    SignatureMethod {
        has_this: true,
        ..signature(ret, params)
    }
}

pub fn array_of(element: TypeSignature, size: u32) -> TypeSignature {
    TypeSignature::Array(SignatureArray {
        base: Box::new(element),
        rank: 1,
        dimensions: vec![ArrayDimensions {
            size: Some(size),
            lower_bound: None,
        }],
    })
}

pub fn ptr(base: TypeSignature) -> TypeSignature {
    TypeSignature::pointer_to(base)
}

pub fn guid_args(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Vec<Arg> {
    let mut args = vec![Arg::U4(data1), Arg::U2(data2), Arg::U2(data3)];
    args.extend(data4.iter().map(|byte| Arg::U1(*byte)));
    args
}

pub fn bitfield(name: &str, offset: i64, length: i64) -> Vec<Arg> {
    vec![
        Arg::String(Some(name.to_string())),
        Arg::I8(offset),
        Arg::I8(length),
    ]
}

/// Namespaces `Foundation`, `Storage.FileSystem`, `System.Diagnostics`, `System.Threading`,
/// `System.Com` and `System.Ioctl` below `Windows.Win32`. Only `Foundation` and
/// `Storage.FileSystem` have an `Apis` class. `CONTEXT` exists for x64 only.
pub fn win32() -> InMemoryMetadata {
    let mut b = MetadataBuilder::new("Windows.Win32");

    // Foundation
    let point = b.struct_type(FOUNDATION, "POINT");
    b.field(point, "x", TypeSignature::I4);
    b.field(point, "y", TypeSignature::I4);

    let rect = b.struct_type(FOUNDATION, "RECT");
    for side in ["left", "top", "right", "bottom"] {
        b.field(rect, side, TypeSignature::I4);
    }

    let handle = b.struct_type(FOUNDATION, "HANDLE");
    b.field(handle, "Value", TypeSignature::I);
    b.decorate(handle, NATIVE_TYPEDEF, vec![]);
    b.decorate(
        handle,
        RAII_FREE,
        vec![Arg::String(Some("CloseHandle".to_string()))],
    );

    let bool_type = b.struct_type(FOUNDATION, "BOOL");
    b.field(bool_type, "Value", TypeSignature::I4);
    b.decorate(bool_type, NATIVE_TYPEDEF, vec![]);

    let pwstr = b.struct_type(FOUNDATION, "PWSTR");
    b.field(pwstr, "Value", ptr(TypeSignature::Char));
    b.decorate(pwstr, NATIVE_TYPEDEF, vec![]);

    let hresult = b.struct_type(FOUNDATION, "HRESULT");
    b.field(hresult, "Value", TypeSignature::I4);
    b.decorate(hresult, NATIVE_TYPEDEF, vec![]);

    let win32_error = b.enum_type(FOUNDATION, "WIN32_ERROR", TypeSignature::U4);
    b.enum_member(win32_error, "NO_ERROR", ConstantValue::U4(0));
    b.enum_member(win32_error, "ERROR_ACCESS_DENIED", ConstantValue::U4(5));
    b.decorate(
        win32_error,
        ASSOCIATED_CONSTANT,
        vec![Arg::String(Some("ERROR_FILE_NOT_FOUND".to_string()))],
    );

    let large_integer = b.union_type(FOUNDATION, "LARGE_INTEGER");
    let anonymous = b.struct_type(FOUNDATION, "_Anonymous_e__Struct");
    b.nest(large_integer, anonymous);
    b.field(anonymous, "LowPart", TypeSignature::U4);
    b.field(anonymous, "HighPart", TypeSignature::I4);
    b.field_at(large_integer, "Anonymous", TypeSignature::ValueType(anonymous), 0);
    b.field_at(large_integer, "QuadPart", TypeSignature::I8, 0);

    let farproc = b.delegate_type(FOUNDATION, "FARPROC", signature(TypeSignature::I, vec![]), &[]);
    b.attribute(
        farproc,
        CustomAttribute::new(
            INTEROP_SERVICES_NAMESPACE,
            UNMANAGED_FUNCTION_POINTER,
            vec![Arg::Enum(1)],
        ),
    );

    let foundation_apis = b.class_type(FOUNDATION, "Apis");
    let close_handle = b.extern_method(
        foundation_apis,
        "CloseHandle",
        "KERNEL32.dll",
        signature(
            TypeSignature::ValueType(bool_type),
            vec![TypeSignature::ValueType(handle)],
        ),
        &["hObject"],
    );
    b.sets_last_error(close_handle);
    b.extern_method(
        foundation_apis,
        "GetLastError",
        "KERNEL32.dll",
        signature(TypeSignature::ValueType(win32_error), vec![]),
        &[],
    );
    b.constant(foundation_apis, "MAX_PATH", ConstantValue::U4(260));
    b.typed_constant(
        foundation_apis,
        "ERROR_FILE_NOT_FOUND",
        TypeSignature::ValueType(win32_error),
        ConstantValue::U4(2),
    );
    b.typed_constant(
        foundation_apis,
        "S_OK",
        TypeSignature::ValueType(hresult),
        ConstantValue::I4(0),
    );
    b.typed_constant(
        foundation_apis,
        "E_FAIL",
        TypeSignature::ValueType(hresult),
        ConstantValue::I4(-2_147_467_259),
    );

    // Storage.FileSystem
    let share_mode = b.enum_type(FILE_SYSTEM, "FILE_SHARE_MODE", TypeSignature::U4);
    b.attribute(
        share_mode,
        CustomAttribute::new(SYSTEM_NAMESPACE, FLAGS, vec![]),
    );
    b.enum_member(share_mode, "FILE_SHARE_NONE", ConstantValue::U4(0));
    b.enum_member(share_mode, "FILE_SHARE_READ", ConstantValue::U4(1));
    b.enum_member(share_mode, "FILE_SHARE_WRITE", ConstantValue::U4(2));
    b.enum_member(share_mode, "FILE_SHARE_DELETE", ConstantValue::U4(4));

    let disposition = b.enum_type(FILE_SYSTEM, "FILE_CREATION_DISPOSITION", TypeSignature::U4);
    b.enum_member(disposition, "CREATE_NEW", ConstantValue::U4(1));
    b.enum_member(disposition, "CREATE_ALWAYS", ConstantValue::U4(2));
    b.enum_member(disposition, "OPEN_EXISTING", ConstantValue::U4(3));

    let find_data = b.struct_type(FILE_SYSTEM, "WIN32_FIND_DATAW");
    b.field(find_data, "dwFileAttributes", TypeSignature::U4);
    b.field(find_data, "nFileSizeHigh", TypeSignature::U4);
    b.field(find_data, "cFileName", array_of(TypeSignature::Char, 260));

    let name_info = b.struct_type(FILE_SYSTEM, "FILE_NAME_INFO");
    b.field(name_info, "FileNameLength", TypeSignature::U4);
    let file_name = b.field(name_info, "FileName", array_of(TypeSignature::Char, 1));
    b.decorate(file_name, FLEXIBLE_ARRAY, vec![]);

    let share_info = b.struct_type(FILE_SYSTEM, "FILE_SHARE_INFO");
    let share_field = b.field(share_info, "ShareMode", TypeSignature::U4);
    b.decorate(
        share_field,
        ASSOCIATED_ENUM,
        vec![Arg::String(Some("FILE_SHARE_MODE".to_string()))],
    );

    let volume_label = b.struct_type(FILE_SYSTEM, "VOLUME_LABEL");
    let buffer = b.struct_type("", "<Label>e__FixedBuffer");
    b.nest(volume_label, buffer);
    b.field(buffer, "FixedElementField", TypeSignature::Char);
    let label = b.field(volume_label, "Label", TypeSignature::ValueType(buffer));
    b.attribute(
        label,
        CustomAttribute::new(
            COMPILER_SERVICES_NAMESPACE,
            FIXED_BUFFER,
            vec![Arg::Type(TypeSignature::Char), Arg::I4(32)],
        ),
    );

    let file_apis = b.class_type(FILE_SYSTEM, "Apis");
    let create_file = b.extern_method(
        file_apis,
        "CreateFileW",
        "KERNEL32.dll",
        signature(
            TypeSignature::ValueType(handle),
            vec![
                TypeSignature::ValueType(pwstr),
                TypeSignature::U4,
                TypeSignature::ValueType(share_mode),
                TypeSignature::ValueType(disposition),
            ],
        ),
        &[
            "lpFileName",
            "dwDesiredAccess",
            "dwShareMode",
            "dwCreationDisposition",
        ],
    );
    b.sets_last_error(create_file);
    b.extern_method(
        file_apis,
        "DeleteFileW",
        "KERNEL32.dll",
        signature(
            TypeSignature::ValueType(bool_type),
            vec![TypeSignature::ValueType(pwstr)],
        ),
        &["lpFileName"],
    );
    let find_first = b.extern_method(
        file_apis,
        "FindFirstFileW",
        "KERNEL32.dll",
        signature(
            TypeSignature::ValueType(handle),
            vec![
                TypeSignature::ValueType(pwstr),
                ptr(TypeSignature::ValueType(find_data)),
            ],
        ),
        &["lpFileName", "lpFindFileData"],
    );
    b.param_flags(find_first, 2, ParamAttributes::OUT);
    b.constant(file_apis, "INVALID_FILE_SIZE", ConstantValue::U4(u32::MAX));
    b.constant(file_apis, "FILE_ATTRIBUTE_READONLY", ConstantValue::U4(1));

    // System.Diagnostics
    let context = b.struct_type(DIAGNOSTICS, "CONTEXT");
    b.field(context, "Rip", TypeSignature::U8);
    b.decorate(context, SUPPORTED_ARCHITECTURE, vec![Arg::I4(2)]);
    b.local_ref(DIAGNOSTICS, "CONTEXT");

    let ldt = b.struct_type(DIAGNOSTICS, "LDT_BITS");
    let bits = b.field(ldt, "_bitfield", TypeSignature::U4);
    b.decorate(bits, NATIVE_BITFIELD, bitfield("BaseMid", 0, 8));
    b.decorate(bits, NATIVE_BITFIELD, bitfield("Type", 8, 5));
    b.decorate(bits, NATIVE_BITFIELD, bitfield("Dpl", 13, 2));
    b.decorate(bits, NATIVE_BITFIELD, bitfield("Pres", 15, 1));
    b.decorate(bits, NATIVE_BITFIELD, bitfield("Reserved", 16, 0));

    let signed = b.struct_type(DIAGNOSTICS, "SIGNED_BITS");
    let signed_bits = b.field(signed, "_bitfield", TypeSignature::I4);
    b.decorate(signed_bits, NATIVE_BITFIELD, bitfield("Delta", 0, 4));

    // System.Threading
    let start_routine = b.delegate_type(
        THREADING,
        "LPTHREAD_START_ROUTINE",
        signature(TypeSignature::U4, vec![ptr(TypeSignature::Void)]),
        &["lpThreadParameter"],
    );
    b.attribute(
        start_routine,
        CustomAttribute::new(
            INTEROP_SERVICES_NAMESPACE,
            UNMANAGED_FUNCTION_POINTER,
            vec![Arg::Enum(3)],
        ),
    );
    let start_info = b.struct_type(THREADING, "THREAD_START_INFO");
    b.field(start_info, "Routine", TypeSignature::Class(start_routine));
    b.field(start_info, "Parameter", ptr(TypeSignature::Void));

    // System.Com
    let guid = b.system_type_ref("System", "Guid");
    let unknown = b.interface_type(COM, "IUnknown");
    b.decorate(
        unknown,
        GUID,
        guid_args(0, 0, 0, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]),
    );
    b.method(
        unknown,
        "QueryInterface",
        instance_signature(
            TypeSignature::ValueType(hresult),
            vec![
                ptr(TypeSignature::ValueType(guid)),
                ptr(ptr(TypeSignature::Void)),
            ],
        ),
        &["riid", "ppvObject"],
    );
    b.method(
        unknown,
        "AddRef",
        instance_signature(TypeSignature::U4, vec![]),
        &[],
    );
    b.method(
        unknown,
        "Release",
        instance_signature(TypeSignature::U4, vec![]),
        &[],
    );

    let stream = b.interface_type(COM, "ISequentialStream");
    b.implements(stream, unknown);
    b.decorate(
        stream,
        GUID,
        guid_args(
            0x0c73_3a30,
            0x2a1c,
            0x11ce,
            [0xad, 0xe5, 0x00, 0xaa, 0x00, 0x44, 0x77, 0x3a],
        ),
    );
    b.method(
        stream,
        "Read",
        instance_signature(
            TypeSignature::ValueType(hresult),
            vec![ptr(TypeSignature::Void), TypeSignature::U4, ptr(TypeSignature::U4)],
        ),
        &["pv", "cb", "pcbRead"],
    );

    // System.Ioctl
    let extent = b.struct_type(IOCTL, "DISK_EXTENT");
    b.field(extent, "DiskNumber", TypeSignature::U4);
    b.field(extent, "StartingOffset", TypeSignature::ValueType(large_integer));
    b.field(extent, "ExtentLength", TypeSignature::ValueType(large_integer));

    let extents = b.struct_type(IOCTL, "VOLUME_DISK_EXTENTS");
    b.field(extents, "NumberOfDiskExtents", TypeSignature::U4);
    let entries = b.field(extents, "Extents", array_of(TypeSignature::ValueType(extent), 1));
    b.decorate(entries, FLEXIBLE_ARRAY, vec![]);

    b.build()
}

/// A second store, `Contoso.Interop`, referencing `Windows.Win32` types across assemblies.
pub fn contoso() -> InMemoryMetadata {
    let mut b = MetadataBuilder::new("Contoso.Interop");
    let win32 = b.assembly_ref("Windows.Win32");
    let rect = b.type_ref(FOUNDATION, "RECT", ResolutionScope::Assembly(win32));
    let handle = b.type_ref(FOUNDATION, "HANDLE", ResolutionScope::Assembly(win32));
    let guid = b.system_type_ref("System", "Guid");
    let missing = b.type_ref(FOUNDATION, "NOT_THERE", ResolutionScope::Assembly(win32));

    let widget = b.struct_type("Contoso.Interop.Widgets", "WIDGET");
    b.field(widget, "Bounds", TypeSignature::ValueType(rect));
    b.field(widget, "Owner", TypeSignature::ValueType(handle));
    b.field(widget, "Kind", TypeSignature::ValueType(guid));

    let broken = b.struct_type("Contoso.Interop.Widgets", "BROKEN_WIDGET");
    b.field(broken, "Missing", TypeSignature::ValueType(missing));

    let apis = b.class_type("Contoso.Interop.Widgets", "Apis");
    b.extern_method(
        apis,
        "WidgetCreate",
        "contoso.dll",
        signature(
            TypeSignature::ValueType(handle),
            vec![ptr(TypeSignature::ValueType(rect))],
        ),
        &["bounds"],
    );
    b.build()
}

/// The `TypeDef` named `name`, in table order.
pub fn type_def(metadata: &InMemoryMetadata, name: &str) -> Token {
    metadata
        .type_definitions()
        .iter()
        .find(|def| def.name == name)
        .map(|def| def.token)
        .unwrap_or_else(|| panic!("fixture has no type {name}"))
}

/// The `TypeRef` with the given namespace and name.
pub fn type_ref(metadata: &InMemoryMetadata, namespace: &str, name: &str) -> Token {
    metadata
        .find_type_ref(namespace, name)
        .unwrap_or_else(|| panic!("fixture has no reference to {namespace}.{name}"))
}
