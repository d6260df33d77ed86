//! Static platform/architecture matrix.
//!
//! Maps each supported `(Platform, Arch)` pair to the toolchain settings needed
//! to cross-compile for it, and derives the per-architecture
//! [`ArchitectureBuildConfig`] from the discovered SDK version.
//!
//! | Platform | Architectures | Default minimum OS |
//! |----------|---------------|--------------------|
//! | iOS | armv7, armv7s, arm64, i386 (sim), x86_64 (sim) | 9.0 |
//! | macOS | x86_64 | 10.11 |
//! | tvOS | arm64, x86_64 (sim) | 9.0 |
//! | watchOS | armv7k, i386 (sim) | 2.0 |

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::{Arch, BuildError, Platform, PlatformConfig};

/// Toolchain settings for one platform/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    pub platform: Platform,
    pub arch: Arch,
    /// Platform directory / SDK base name (`iPhoneOS`, `iPhoneSimulator`, ...).
    pub sdk_name: &'static str,
    /// Autotools `--host` triple.
    pub host: &'static str,
    /// Deployment target flag without its value.
    pub min_version_flag: &'static str,
    pub simulator: bool,
    /// Whether device slices embed bitcode.
    pub bitcode: bool,
}

const fn entry(
    platform: Platform,
    arch: Arch,
    sdk_name: &'static str,
    host: &'static str,
    min_version_flag: &'static str,
    simulator: bool,
    bitcode: bool,
) -> MatrixEntry {
    MatrixEntry {
        platform,
        arch,
        sdk_name,
        host,
        min_version_flag,
        simulator,
        bitcode,
    }
}

/// Every supported pair, grouped by platform in default build order.
pub const MATRIX: &[MatrixEntry] = &[
    entry(
        Platform::Ios,
        Arch::Armv7,
        "iPhoneOS",
        "arm-apple-darwin",
        "-mios-version-min",
        false,
        true,
    ),
    entry(
        Platform::Ios,
        Arch::Armv7s,
        "iPhoneOS",
        "arm-apple-darwin",
        "-mios-version-min",
        false,
        true,
    ),
    entry(
        Platform::Ios,
        Arch::Arm64,
        "iPhoneOS",
        "arm-apple-darwin",
        "-mios-version-min",
        false,
        true,
    ),
    entry(
        Platform::Ios,
        Arch::I386,
        "iPhoneSimulator",
        "i386-apple-darwin",
        "-mios-simulator-version-min",
        true,
        false,
    ),
    entry(
        Platform::Ios,
        Arch::X86_64,
        "iPhoneSimulator",
        "x86_64-apple-darwin",
        "-mios-simulator-version-min",
        true,
        false,
    ),
    entry(
        Platform::MacOs,
        Arch::X86_64,
        "MacOSX",
        "x86_64-apple-darwin",
        "-mmacosx-version-min",
        false,
        false,
    ),
    entry(
        Platform::TvOs,
        Arch::Arm64,
        "AppleTVOS",
        "arm-apple-darwin",
        "-mtvos-version-min",
        false,
        true,
    ),
    entry(
        Platform::TvOs,
        Arch::X86_64,
        "AppleTVSimulator",
        "x86_64-apple-darwin",
        "-mtvos-simulator-version-min",
        true,
        false,
    ),
    entry(
        Platform::WatchOs,
        Arch::Armv7k,
        "WatchOS",
        "arm-apple-darwin",
        "-mwatchos-version-min",
        false,
        true,
    ),
    entry(
        Platform::WatchOs,
        Arch::I386,
        "WatchSimulator",
        "i386-apple-darwin",
        "-mwatchos-simulator-version-min",
        true,
        false,
    ),
];

/// Looks up the matrix entry for a pair.
///
/// # Errors
///
/// [`BuildError::UnsupportedTarget`] if the pair is not in [`MATRIX`].
pub fn lookup(platform: Platform, arch: Arch) -> Result<&'static MatrixEntry, BuildError> {
    MATRIX
        .iter()
        .find(|e| e.platform == platform && e.arch == arch)
        .ok_or_else(|| BuildError::UnsupportedTarget {
            platform: platform.to_string(),
            arch: arch.to_string(),
        })
}

/// Looks up a pair by its `"<platform>-<arch>"` key, e.g. `"iOS-armv7s"`.
pub fn lookup_key(key: &str) -> Result<&'static MatrixEntry, BuildError> {
    let (platform_name, arch_name) = key.split_once('-').unwrap_or((key, ""));
    let platform: Platform = platform_name
        .parse()
        .map_err(|_| BuildError::UnsupportedTarget {
            platform: platform_name.to_string(),
            arch: arch_name.to_string(),
        })?;
    let arch = resolve_arch(platform, arch_name)?;
    lookup(platform, arch)
}

/// Parses an architecture identifier and checks it against `platform`.
///
/// # Errors
///
/// [`BuildError::UnsupportedTarget`] for an unknown identifier or a pair
/// missing from [`MATRIX`].
pub fn resolve_arch(platform: Platform, name: &str) -> Result<Arch, BuildError> {
    let Ok(arch) = name.parse::<Arch>() else {
        return Err(BuildError::UnsupportedTarget {
            platform: platform.to_string(),
            arch: name.to_string(),
        });
    };
    lookup(platform, arch)?;
    Ok(arch)
}

/// Default architectures for a platform, in matrix order.
pub fn default_archs(platform: Platform) -> Vec<Arch> {
    MATRIX
        .iter()
        .filter(|e| e.platform == platform)
        .map(|e| e.arch)
        .collect()
}

/// Default deployment target for a platform.
pub fn default_min_version(platform: Platform) -> &'static str {
    match platform {
        Platform::Ios => "9.0",
        Platform::MacOs => "10.11",
        Platform::TvOs => "9.0",
        Platform::WatchOs => "2.0",
    }
}

/// Default configuration for every platform.
pub fn default_platforms() -> Vec<PlatformConfig> {
    Platform::ALL
        .into_iter()
        .map(|p| PlatformConfig::new(p, default_archs(p), default_min_version(p)))
        .collect()
}

/// Resolved toolchain configuration for a single architecture build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchitectureBuildConfig {
    pub platform: Platform,
    pub arch: Arch,
    pub sdk_root: PathBuf,
    pub host: String,
    pub cflags: String,
    pub ldflags: String,
    /// Directory holding `clang`, `ar`, `ranlib` for this toolchain.
    pub toolchain_bin: PathBuf,
    pub min_version: String,
}

impl ArchitectureBuildConfig {
    /// Derives the build configuration for one pair.
    ///
    /// # Arguments
    ///
    /// * `config` - Platform settings (architectures, deployment target)
    /// * `arch` - Architecture to build
    /// * `sdk_version` - Installed SDK version for the platform (e.g. `"13.2"`)
    /// * `developer_dir` - Active Xcode developer directory
    pub fn derive(
        config: &PlatformConfig,
        arch: Arch,
        sdk_version: &str,
        developer_dir: &Path,
    ) -> Result<Self, BuildError> {
        let entry = lookup(config.platform, arch)?;
        let sdk_root = developer_dir
            .join("Platforms")
            .join(format!("{}.platform", entry.sdk_name))
            .join("Developer/SDKs")
            .join(format!("{}{}.sdk", entry.sdk_name, sdk_version));
        let toolchain_bin = developer_dir.join("Toolchains/XcodeDefault.xctoolchain/usr/bin");

        let mut cflags = format!(
            "-arch {} -isysroot {} {}={} -O2",
            arch,
            sdk_root.display(),
            entry.min_version_flag,
            config.min_version
        );
        if entry.bitcode {
            cflags.push_str(" -fembed-bitcode");
        }
        let ldflags = format!("-arch {} -isysroot {}", arch, sdk_root.display());

        Ok(Self {
            platform: config.platform,
            arch,
            sdk_root,
            host: entry.host.to_string(),
            cflags,
            ldflags,
            toolchain_bin,
            min_version: config.min_version.clone(),
        })
    }

    /// `"<platform>-<arch>"`, the matrix key of this configuration.
    pub fn key(&self) -> String {
        format!("{}-{}", self.platform, self.arch)
    }

    /// Explicit environment for every command of this architecture's build.
    ///
    /// `inherited_path` is the caller's `PATH`; the toolchain directory is
    /// prepended so autotools picks up Xcode's compilers.
    pub fn env(&self, inherited_path: Option<&str>) -> Vec<(String, String)> {
        let bin = self.toolchain_bin.display();
        let path = match inherited_path {
            Some(p) if !p.is_empty() => format!("{}:{}", bin, p),
            _ => format!("{}:/usr/bin:/bin:/usr/sbin:/sbin", bin),
        };
        vec![
            ("CC".to_string(), format!("{}/clang", bin)),
            ("CXX".to_string(), format!("{}/clang++", bin)),
            ("AR".to_string(), format!("{}/ar", bin)),
            ("RANLIB".to_string(), format!("{}/ranlib", bin)),
            ("CFLAGS".to_string(), self.cflags.clone()),
            ("CXXFLAGS".to_string(), self.cflags.clone()),
            ("LDFLAGS".to_string(), self.ldflags.clone()),
            ("SDKROOT".to_string(), self.sdk_root.display().to_string()),
            ("PATH".to_string(), path),
        ]
    }
}
