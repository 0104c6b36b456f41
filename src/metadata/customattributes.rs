//! Decoded custom attributes ("decorations").
//!
//! Native API metadata encodes most interop information as custom attributes. The store
//! decodes them into [`CustomAttribute`] values; the helpers here locate them by namespace and
//! name and pull typed arguments out.

use crate::metadata::signatures::TypeSignature;

/// Namespace of the interop decorations defined by the API metadata itself.
pub const INTEROP_DECORATION_NAMESPACE: &str = "Windows.Win32.Foundation.Metadata";
/// `System.Runtime.CompilerServices`
pub const COMPILER_SERVICES_NAMESPACE: &str = "System.Runtime.CompilerServices";
/// `System.Runtime.InteropServices`
pub const INTEROP_SERVICES_NAMESPACE: &str = "System.Runtime.InteropServices";
/// `System`
pub const SYSTEM_NAMESPACE: &str = "System";

/// Restricts a definition to a set of CPU architectures.
pub const SUPPORTED_ARCHITECTURE: &str = "SupportedArchitectureAttribute";
/// Names the function that releases a handle type.
pub const RAII_FREE: &str = "RAIIFreeAttribute";
/// Marks a struct as a strongly typed wrapper around one primitive.
pub const NATIVE_TYPEDEF: &str = "NativeTypedefAttribute";
/// Marks the trailing variable-length array of a struct.
pub const FLEXIBLE_ARRAY: &str = "FlexibleArrayAttribute";
/// Associates an integer field with an enum type.
pub const ASSOCIATED_ENUM: &str = "AssociatedEnumAttribute";
/// Associates an enum with loose constants that belong to it.
pub const ASSOCIATED_CONSTANT: &str = "AssociatedConstantAttribute";
/// Describes one bitfield packed into an integer field.
pub const NATIVE_BITFIELD: &str = "NativeBitfieldAttribute";
/// A COM or constant GUID.
pub const GUID: &str = "GuidAttribute";
/// The field holds a fixed-size inline buffer.
pub const FIXED_BUFFER: &str = "FixedBufferAttribute";
/// Tooling-internal type.
pub const COMPILER_GENERATED: &str = "CompilerGeneratedAttribute";
/// Calling convention of a delegate.
pub const UNMANAGED_FUNCTION_POINTER: &str = "UnmanagedFunctionPointerAttribute";
/// Enum members combine as bit flags.
pub const FLAGS: &str = "FlagsAttribute";
/// Obsolete API.
pub const OBSOLETE: &str = "ObsoleteAttribute";
/// Marshaling override for a field, parameter or return value.
pub const MARSHAL_AS: &str = "MarshalAsAttribute";

/// A decoded attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit
    I1(i8),
    /// Unsigned 8-bit
    U1(u8),
    /// Signed 16-bit
    I2(i16),
    /// Unsigned 16-bit
    U2(u16),
    /// Signed 32-bit
    I4(i32),
    /// Unsigned 32-bit
    U4(u32),
    /// Signed 64-bit
    I8(i64),
    /// Unsigned 64-bit
    U8(u64),
    /// 32-bit float
    R4(f32),
    /// 64-bit float
    R8(f64),
    /// String, `None` for a null string
    String(Option<String>),
    /// A `System.Type` argument
    Type(TypeSignature),
    /// An enum value, stored as its underlying integer
    Enum(i64),
    /// An array of arguments
    Array(Vec<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// The argument as a wide integer, if it is integral.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CustomAttributeArgument::I1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I8(value) | CustomAttributeArgument::Enum(value) => {
                Some(*value)
            }
            CustomAttributeArgument::U8(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// The argument as a string, if it is a non-null string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CustomAttributeArgument::String(Some(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// A named (field or property) attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Field or property name
    pub name: String,
    /// Value
    pub value: CustomAttributeArgument,
}

/// A decoded custom attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// Namespace of the attribute type
    pub namespace: String,
    /// Name of the attribute type
    pub name: String,
    /// Positional constructor arguments
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named arguments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttribute {
    /// Creates an attribute with positional arguments only.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        fixed_args: Vec<CustomAttributeArgument>,
    ) -> Self {
        CustomAttribute {
            namespace: namespace.into(),
            name: name.into(),
            fixed_args,
            named_args: Vec::new(),
        }
    }

    /// Returns `true` if the attribute type has the given namespace and name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace == namespace
    }

    /// The positional argument at `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&CustomAttributeArgument> {
        self.fixed_args.get(index)
    }

    /// The named argument called `name`.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }
}

/// Finds the first attribute with the given namespace and name.
#[must_use]
pub fn find_attribute<'a>(
    attributes: &'a [CustomAttribute],
    namespace: &str,
    name: &str,
) -> Option<&'a CustomAttribute> {
    attributes.iter().find(|attr| attr.is(namespace, name))
}

/// Finds every attribute with the given namespace and name.
pub fn find_attributes<'a>(
    attributes: &'a [CustomAttribute],
    namespace: &'a str,
    name: &'a str,
) -> impl Iterator<Item = &'a CustomAttribute> + 'a {
    attributes.iter().filter(move |attr| attr.is(namespace, name))
}

/// Finds an interop decoration by name.
#[must_use]
pub fn find_decoration<'a>(
    attributes: &'a [CustomAttribute],
    name: &str,
) -> Option<&'a CustomAttribute> {
    find_attribute(attributes, INTEROP_DECORATION_NAMESPACE, name)
}

/// Decodes a `GuidAttribute` in its numeric form (`u32, u16, u16, u8 x 8`).
#[must_use]
pub fn decode_guid(attribute: &CustomAttribute) -> Option<uguid::Guid> {
    let data1 = u32::try_from(attribute.arg(0)?.as_i64()?).ok()?;
    let data2 = u16::try_from(attribute.arg(1)?.as_i64()?).ok()?;
    let data3 = u16::try_from(attribute.arg(2)?.as_i64()?).ok()?;
    let mut data4 = [0u8; 8];
    for (index, byte) in data4.iter_mut().enumerate() {
        *byte = u8::try_from(attribute.arg(3 + index)?.as_i64()?).ok()?;
    }

    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&data1.to_le_bytes());
    bytes[4..6].copy_from_slice(&data2.to_le_bytes());
    bytes[6..8].copy_from_slice(&data3.to_le_bytes());
    bytes[8..16].copy_from_slice(&data4);
    Some(uguid::Guid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_namespace_and_name() {
        let attrs = vec![
            CustomAttribute::new(SYSTEM_NAMESPACE, FLAGS, vec![]),
            CustomAttribute::new(
                INTEROP_DECORATION_NAMESPACE,
                NATIVE_BITFIELD,
                vec![
                    CustomAttributeArgument::String(Some("a".into())),
                    CustomAttributeArgument::I8(0),
                    CustomAttributeArgument::I8(3),
                ],
            ),
            CustomAttribute::new(
                INTEROP_DECORATION_NAMESPACE,
                NATIVE_BITFIELD,
                vec![
                    CustomAttributeArgument::String(Some("b".into())),
                    CustomAttributeArgument::I8(3),
                    CustomAttributeArgument::I8(5),
                ],
            ),
        ];

        assert!(find_attribute(&attrs, SYSTEM_NAMESPACE, FLAGS).is_some());
        assert!(find_decoration(&attrs, FLAGS).is_none());
        assert_eq!(
            find_attributes(&attrs, INTEROP_DECORATION_NAMESPACE, NATIVE_BITFIELD).count(),
            2
        );
    }

    #[test]
    fn argument_conversions() {
        assert_eq!(CustomAttributeArgument::U2(7).as_i64(), Some(7));
        assert_eq!(CustomAttributeArgument::I4(-2).as_i64(), Some(-2));
        assert_eq!(CustomAttributeArgument::Enum(3).as_i64(), Some(3));
        assert_eq!(CustomAttributeArgument::U8(u64::MAX).as_i64(), None);
        assert_eq!(
            CustomAttributeArgument::String(Some("x".into())).as_str(),
            Some("x")
        );
        assert_eq!(CustomAttributeArgument::String(None).as_str(), None);
    }

    #[test]
    fn guid_decoding() {
        // 00000000-0000-0000-C000-000000000046 (IUnknown)
        let mut args = vec![
            CustomAttributeArgument::U4(0),
            CustomAttributeArgument::U2(0),
            CustomAttributeArgument::U2(0),
            CustomAttributeArgument::U1(0xC0),
        ];
        args.extend((0..7).map(|i| CustomAttributeArgument::U1(if i == 6 { 0x46 } else { 0 })));
        let attr = CustomAttribute::new(INTEROP_DECORATION_NAMESPACE, GUID, args);

        let guid = decode_guid(&attr).unwrap();
        assert_eq!(guid, uguid::guid!("00000000-0000-0000-C000-000000000046"));
    }
}
