//! End-to-end tests of request operations against a single store.
//!
//! The metadata is assembled in memory and mirrors the shapes real API metadata uses:
//! an `Apis` class per namespace for functions and constants, flags enums, structs that
//! embed other structs and a type restricted to one architecture.

use dotbind::{
    metadata::{
        customattributes::{
            CustomAttribute, CustomAttributeArgument, FLAGS, SUPPORTED_ARCHITECTURE,
            SYSTEM_NAMESPACE,
        },
        signatures::{SignatureMethod, SignatureParameter},
    },
    prelude::*,
    synth::{bitfield::BitfieldLayout, flexible},
};
use std::sync::Arc;

const FOUNDATION: &str = "Contoso.Native.Foundation";
const UI: &str = "Contoso.Native.UI";

fn function(ret: TypeSignature, params: Vec<TypeSignature>) -> SignatureMethod {
    SignatureMethod {
        default: true,
        return_type: SignatureParameter::of(ret),
        params: params.into_iter().map(SignatureParameter::of).collect(),
        ..SignatureMethod::default()
    }
}

fn metadata() -> InMemoryMetadata {
    let mut b = MetadataBuilder::new("Contoso.Native");

    let point = b.struct_type(FOUNDATION, "POINT");
    b.field(point, "x", TypeSignature::I4);
    b.field(point, "y", TypeSignature::I4);

    let rect = b.struct_type(FOUNDATION, "RECT");
    b.field(rect, "topLeft", TypeSignature::ValueType(point));
    b.field(rect, "bottomRight", TypeSignature::ValueType(point));

    let style = b.enum_type(UI, "WINDOW_STYLE", TypeSignature::U4);
    b.enum_member(style, "WS_BORDER", ConstantValue::U4(1));
    b.enum_member(style, "WS_CAPTION", ConstantValue::U4(2));
    b.attribute(style, CustomAttribute::new(SYSTEM_NAMESPACE, FLAGS, vec![]));

    let context = b.struct_type(UI, "THREAD_CONTEXT");
    b.field(context, "Rip", TypeSignature::U8);
    b.decorate(
        context,
        SUPPORTED_ARCHITECTURE,
        vec![CustomAttributeArgument::I4(2)],
    );

    let apis = b.class_type(UI, "Apis");
    b.extern_method(
        apis,
        "MoveWindow",
        "USER32.dll",
        function(TypeSignature::I4, vec![TypeSignature::ValueType(rect)]),
        &["bounds"],
    );
    b.constant(apis, "WM_CLOSE", ConstantValue::U4(0x10));

    b.build()
}

fn generator(platform: Platform) -> Arc<Generator> {
    Generator::from_metadata(
        metadata(),
        GeneratorOptions::default().with_platform(platform),
    )
    .unwrap()
}

#[test]
fn repeated_requests_do_not_synthesize_again() {
    let generator = generator(Platform::X64);
    let first = generator
        .request_type_by_name(FOUNDATION, "RECT", Context::new(true))
        .unwrap();
    let calls = generator.synthesis_calls();
    let before = generator.declaration(FOUNDATION, "RECT").unwrap();

    let second = generator
        .request_type_by_name(FOUNDATION, "RECT", Context::new(true))
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(generator.synthesis_calls(), calls);
    assert_eq!(*generator.declaration(FOUNDATION, "RECT").unwrap(), *before);
}

#[test]
fn embedded_types_commit_before_their_container() {
    let generator = generator(Platform::X64);
    generator
        .request_type_by_name(FOUNDATION, "RECT", Context::new(true))
        .unwrap();

    let names: Vec<String> = generator
        .committed()
        .iter()
        .map(|declaration| declaration.name.clone())
        .collect();
    let point = names.iter().position(|name| name == "POINT").unwrap();
    let rect = names.iter().position(|name| name == "RECT").unwrap();
    assert!(point < rect);
}

#[test]
fn flags_enums_render_hexadecimal_members() {
    let generator = generator(Platform::X64);
    let outcome = generator
        .try_generate("WINDOW_STYLE", &CancellationToken::new())
        .unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::Generated(vec![format!("{UI}.WINDOW_STYLE")])
    );

    let rendered = generator.render();
    let text = &rendered["WINDOW_STYLE.g.cs"];
    assert!(text.contains("[Flags]"));
    assert!(text.contains("WS_BORDER = 0x1,"));
    assert!(text.contains("WS_CAPTION = 0x2,"));
}

#[test]
fn restricted_types_are_incompatible_elsewhere() {
    let none = CancellationToken::new();
    assert!(generator(Platform::X64)
        .try_generate("THREAD_CONTEXT", &none)
        .unwrap()
        .is_generated());

    let error = generator(Platform::Arm64)
        .try_generate("THREAD_CONTEXT", &none)
        .unwrap_err();
    assert!(error.is_platform_incompatible());
    assert!(matches!(error, Error::PlatformIncompatible(_)));
}

#[test]
fn unknown_names_have_no_suggestions() {
    let outcome = generator(Platform::X64)
        .try_generate("Zzyzx", &CancellationToken::new())
        .unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::NotFound {
            suggestions: Vec::new(),
            illegal_characters: false,
        }
    );
}

#[test]
fn methods_render_into_their_module_unit() {
    let generator = generator(Platform::X64);
    let none = CancellationToken::new();
    assert_eq!(generator.generate_module("User32.*", &none).unwrap(), 1);
    generator.try_generate("WM_CLOSE", &none).unwrap();

    let rendered = generator.render();
    let methods = &rendered["PInvoke.User32.g.cs"];
    assert!(methods.contains("[DllImport(\"USER32.dll\", ExactSpelling = true)]"));
    assert!(methods.contains(
        "internal static extern int MoveWindow(winmdroot.Foundation.RECT bounds);"
    ));
    assert!(rendered["PInvoke.Constants.g.cs"].contains("internal const uint WM_CLOSE = "));
    assert!(rendered.contains_key("POINT.g.cs"));
}

#[test]
fn sweeps_skip_what_the_platform_lacks() {
    let generator = generator(Platform::Arm64);
    let report = generator.generate_all(&CancellationToken::new()).unwrap();
    assert!(report.failed.is_empty());
    assert!(generator.declaration(UI, "THREAD_CONTEXT").is_none());
    assert!(generator.declaration(UI, "WINDOW_STYLE").is_some());
    assert!(generator.declaration(UI, "MoveWindow").is_some());
}

#[test]
fn cancelled_sweeps_commit_nothing_further() {
    let generator = generator(Platform::X64);
    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        generator.generate_all(&token),
        Err(Error::Cancelled)
    ));
    assert!(generator.committed().is_empty());
}

#[test]
fn trailing_arrays_size_their_elements() {
    assert_eq!(flexible::size_of(8, 4, 1).unwrap(), 8);
    assert_eq!(flexible::size_of(8, 4, 3).unwrap(), 16);
    assert!(flexible::size_of(8, 4, -1).is_err());
}

#[test]
fn bitfields_hold_every_value_of_their_range() {
    let narrow = BitfieldLayout::new(3, 5, 16, true).unwrap().unwrap();
    for value in narrow.min()..=narrow.max() {
        let storage = narrow.write(0xFFFF, value).unwrap();
        assert_eq!(narrow.read(storage), value);
        assert_eq!(storage & !narrow.mask(), 0xFFFF & !narrow.mask());
    }
    assert!(narrow.write(0, narrow.max() + 1).is_err());

    let full = BitfieldLayout::new(0, 8, 8, false).unwrap().unwrap();
    assert!(!full.asserts_range());
    assert_eq!(full.read(full.write(0, 255).unwrap()), 255);
}
