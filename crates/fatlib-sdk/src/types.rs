//! Core types for fatlib-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Error types for discovery, fetch and build operations
//! - [`Platform`] / [`Arch`] - Apple platform and CPU architecture identifiers
//! - [`PlatformConfig`] - Architectures and minimum OS version for one platform
//! - [`BuildArtifact`] - A per-architecture static library produced by a build
//! - [`DistributionBundle`] - A merged universal library plus its headers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Error types for fatlib-sdk operations.
///
/// Every variant except [`BuildError::Patch`] in lenient mode is fatal: the
/// pipeline stops at the first error and the CLI exits with status 1.
///
/// # Example
///
/// ```ignore
/// use fatlib_sdk::{BuildError, Pipeline};
///
/// match pipeline.run() {
///     Ok(report) => println!("{} bundles", report.bundles.len()),
///     Err(BuildError::UnsupportedTarget { platform, arch }) => {
///         eprintln!("{platform}-{arch} is not in the platform matrix");
///     }
///     Err(e) => eprintln!("build failed: {e}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The developer toolchain could not be queried.
    ///
    /// Raised when `xcodebuild -showsdks` or `xcode-select` cannot be started
    /// or exits with a failure status.
    #[error("toolchain query failed: {0}")]
    Toolchain(String),

    /// Downloading or unpacking an upstream source archive failed.
    #[error("source fetch failed: {0}")]
    Fetch(String),

    /// The HTTP client reported an error while downloading a source archive.
    #[error("HTTP error: {0}. Check network access and the archive URL")]
    Http(#[from] reqwest::Error),

    /// A textual patch matched nothing in its target file.
    ///
    /// Only raised when the patch policy is strict.
    #[error(
        "patch '{description}' did not apply to {}. Upstream sources may have changed; update the recipe or set [patches] strict = false",
        file.display()
    )]
    Patch {
        /// File the patch was applied to.
        file: PathBuf,
        /// Human-readable patch description.
        description: String,
    },

    /// The requested platform/architecture pair is not in the platform matrix.
    #[error("unsupported platform/architecture: {platform}-{arch}")]
    UnsupportedTarget {
        /// Platform name as requested.
        platform: String,
        /// Architecture identifier as requested.
        arch: String,
    },

    /// An external build tool exited with a failure status.
    ///
    /// This covers `tar`, `autoreconf`, `configure`, `make` and `lipo`.
    #[error("build error: {0}")]
    Command(String),

    /// A per-architecture static library is missing or empty.
    #[error("build artifact missing or empty: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Invalid configuration.
    #[error("configuration error: {0}. Check fatlib.toml or CLI flags")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed while writing the build manifest.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Apple platform family.
///
/// The declaration order is the build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "tvOS")]
    TvOs,
    #[serde(rename = "watchOS")]
    WatchOs,
}

impl Platform {
    /// All platforms, in build order.
    pub const ALL: [Platform; 4] = [
        Platform::Ios,
        Platform::MacOs,
        Platform::TvOs,
        Platform::WatchOs,
    ];

    /// Returns the display name used by Apple (`"iOS"`, `"macOS"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::MacOs => "macOS",
            Platform::TvOs => "tvOS",
            Platform::WatchOs => "watchOS",
        }
    }

    /// Returns the lowercase directory name used under `dist/` and `build/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::MacOs => "macos",
            Platform::TvOs => "tvos",
            Platform::WatchOs => "watchos",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = BuildError;

    /// Accepts either the display name or the directory name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.dir_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                BuildError::Config(format!(
                    "unknown platform '{}'. Expected one of: ios, macos, tvos, watchos",
                    s
                ))
            })
    }
}

/// CPU architecture identifier as understood by clang's `-arch` and `lipo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Armv7,
    Armv7s,
    Arm64,
    Armv7k,
    I386,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    pub const ALL: [Arch; 6] = [
        Arch::Armv7,
        Arch::Armv7s,
        Arch::Arm64,
        Arch::Armv7k,
        Arch::I386,
        Arch::X86_64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Armv7 => "armv7",
            Arch::Armv7s => "armv7s",
            Arch::Arm64 => "arm64",
            Arch::Armv7k => "armv7k",
            Arch::I386 => "i386",
            Arch::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = BuildError;

    /// Accepts the exact `-arch` identifier (`"armv7s"`, `"x86_64"`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arch::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                BuildError::Config(format!(
                    "unknown architecture '{}'. Expected one of: \
                     armv7, armv7s, arm64, armv7k, i386, x86_64",
                    s
                ))
            })
    }
}

/// Architectures and deployment target for one platform.
///
/// # Example
///
/// ```
/// use fatlib_sdk::{Arch, Platform, PlatformConfig};
///
/// let macos = PlatformConfig::new(Platform::MacOs, vec![Arch::X86_64], "10.11");
/// assert_eq!(macos.archs.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    /// Architectures to build, in build order.
    pub archs: Vec<Arch>,
    /// Minimum OS version passed to the compiler's `-m<os>-version-min` flag.
    pub min_version: String,
}

impl PlatformConfig {
    pub fn new(platform: Platform, archs: Vec<Arch>, min_version: impl Into<String>) -> Self {
        Self {
            platform,
            archs,
            min_version: min_version.into(),
        }
    }

    /// First architecture listed more than once, if any.
    ///
    /// `lipo` refuses to merge two slices of the same architecture.
    pub fn duplicate_arch(&self) -> Option<Arch> {
        self.archs
            .iter()
            .enumerate()
            .find(|&(i, arch)| self.archs[..i].contains(arch))
            .map(|(_, arch)| *arch)
    }
}

/// A static library installed for a single platform/architecture pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub platform: Platform,
    pub arch: Arch,
    /// Path to the installed static library (e.g. `<prefix>/lib/libzmq.a`).
    pub library: PathBuf,
    /// Path to the installed header directory (`<prefix>/include`).
    pub include_dir: PathBuf,
}

/// A merged universal library and its headers, ready for distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBundle {
    pub platform: Platform,
    /// Recipe name of the library (e.g. `"libzmq"`).
    pub library_name: String,
    /// Path to the merged archive under `dist/<platform>/lib/`.
    pub library: PathBuf,
    /// Path to `dist/<platform>/include/`.
    pub include_dir: PathBuf,
    /// Architectures contained in the merged archive.
    pub archs: Vec<Arch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_display_and_dir_names() {
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
        assert_eq!("macOS".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("WATCHOS".parse::<Platform>().unwrap(), Platform::WatchOs);
        assert!("android".parse::<Platform>().is_err());
    }

    #[test]
    fn arch_parse_rejects_unknown_identifiers() {
        assert_eq!("armv7s".parse::<Arch>().unwrap(), Arch::Armv7s);
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        let err = "ppc".parse::<Arch>().unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
        assert!(err.to_string().contains("unknown architecture 'ppc'"));
    }

    #[test]
    fn unsupported_target_message_uses_composite_key() {
        let err = BuildError::UnsupportedTarget {
            platform: "macOS".into(),
            arch: "armv7".into(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported platform/architecture: macOS-armv7"
        );
    }

    #[test]
    fn duplicate_arch_finds_repeated_architecture() {
        let unique = PlatformConfig::new(Platform::Ios, vec![Arch::Arm64, Arch::X86_64], "9.0");
        assert_eq!(unique.duplicate_arch(), None);

        let doubled = PlatformConfig::new(
            Platform::Ios,
            vec![Arch::Arm64, Arch::X86_64, Arch::Arm64],
            "9.0",
        );
        assert_eq!(doubled.duplicate_arch(), Some(Arch::Arm64));
    }

    #[test]
    fn platform_order_is_build_order() {
        let mut shuffled = vec![Platform::WatchOs, Platform::Ios, Platform::TvOs, Platform::MacOs];
        shuffled.sort();
        assert_eq!(shuffled, Platform::ALL.to_vec());
    }
}
