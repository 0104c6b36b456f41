//! Target platforms and architecture decorations.

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString};

/// The platform a compilation targets.
///
/// Parsed from and printed as the names build tools use.
///
/// ```rust
/// use dotbind::index::Platform;
///
/// let platform: Platform = "x64".parse()?;
/// assert_eq!(platform, Platform::X64);
/// assert_eq!(Platform::AnyCpu32BitPreferred.to_string(), "anycpu32bitpreferred");
/// # Ok::<(), strum::ParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    /// Architecture-neutral
    #[default]
    AnyCpu,
    /// Architecture-neutral, preferring a 32-bit process
    AnyCpu32BitPreferred,
    /// 32-bit x86
    X86,
    /// x86-64
    X64,
    /// AArch64
    Arm64,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Architectures named by a `SupportedArchitecture` decoration
    pub struct InteropArchitecture : u32 {
        /// 32-bit x86
        const X86 = 0x1;
        /// x86-64
        const X64 = 0x2;
        /// AArch64
        const ARM64 = 0x4;
        /// Every architecture
        const ALL = 0x7;
    }
}

impl Platform {
    /// Returns `true` if a definition restricted to `required` may be used on this platform.
    ///
    /// Architecture-neutral targets only accept definitions available everywhere.
    #[must_use]
    pub fn supports(self, required: InteropArchitecture) -> bool {
        match self {
            Platform::AnyCpu | Platform::AnyCpu32BitPreferred => required == InteropArchitecture::ALL,
            Platform::X86 => required.contains(InteropArchitecture::X86),
            Platform::X64 => required.contains(InteropArchitecture::X64),
            Platform::Arm64 => required.contains(InteropArchitecture::ARM64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parse_and_print() {
        for platform in Platform::iter() {
            let parsed: Platform = platform.to_string().parse().unwrap();
            assert_eq!(parsed, platform);
        }
        assert_eq!("ARM64".parse::<Platform>().unwrap(), Platform::Arm64);
        assert!("itanium".parse::<Platform>().is_err());
    }

    #[test]
    fn architecture_filtering() {
        let x64_only = InteropArchitecture::X64;
        let desktop = InteropArchitecture::X86 | InteropArchitecture::X64;

        assert!(Platform::X64.supports(x64_only));
        assert!(!Platform::X86.supports(x64_only));
        assert!(!Platform::Arm64.supports(desktop));
        assert!(Platform::X86.supports(desktop));
        assert!(!Platform::AnyCpu.supports(desktop));
        assert!(Platform::AnyCpu.supports(InteropArchitecture::ALL));
    }
}
