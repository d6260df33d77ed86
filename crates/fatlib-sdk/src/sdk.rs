//! Installed SDK discovery.
//!
//! Queries `xcodebuild -showsdks` for the platform SDKs installed with the
//! active Xcode and `xcode-select -print-path` for its developer directory.
//! Platforms without an installed SDK are simply absent from the result.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::exec::{CommandRunner, CommandSpec};
use crate::types::{BuildError, Platform};

/// Device SDK name prefixes as printed after `-sdk`.
///
/// Simulator SDKs share the device SDK version and are not listed here.
const SDK_PREFIXES: [(&str, Platform); 4] = [
    ("iphoneos", Platform::Ios),
    ("macosx", Platform::MacOs),
    ("appletvos", Platform::TvOs),
    ("watchos", Platform::WatchOs),
];

/// SDKs reported by the local developer toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInventory {
    /// Active developer directory (e.g. `/Applications/Xcode.app/Contents/Developer`).
    pub developer_dir: PathBuf,
    /// SDK version per installed platform.
    pub versions: BTreeMap<Platform, String>,
}

impl SdkInventory {
    pub fn new(developer_dir: impl Into<PathBuf>) -> Self {
        Self {
            developer_dir: developer_dir.into(),
            versions: BTreeMap::new(),
        }
    }

    pub fn with_sdk(mut self, platform: Platform, version: impl Into<String>) -> Self {
        self.versions.insert(platform, version.into());
        self
    }

    pub fn version(&self, platform: Platform) -> Option<&str> {
        self.versions.get(&platform).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Discovers installed SDKs using the given runner.
///
/// # Errors
///
/// Returns [`BuildError::Toolchain`] if either query cannot be executed or
/// fails; there is no fallback.
pub fn discover_sdks(runner: &dyn CommandRunner) -> Result<SdkInventory, BuildError> {
    let listing = runner.capture(
        &CommandSpec::new("xcodebuild", "xcodebuild -showsdks")
            .arg("-showsdks"),
    )?;
    let developer_dir = runner.capture(
        &CommandSpec::new("xcode-select", "xcode-select -print-path")
            .arg("-print-path"),
    )?;
    let developer_dir = developer_dir.trim();
    if developer_dir.is_empty() {
        return Err(BuildError::Toolchain(
            "xcode-select -print-path returned an empty developer directory. \
             Run `sudo xcode-select --switch /Applications/Xcode.app`"
                .to_string(),
        ));
    }

    let inventory = SdkInventory {
        developer_dir: PathBuf::from(developer_dir),
        versions: parse_showsdks(&listing),
    };
    for (platform, version) in &inventory.versions {
        log::info!("Found {} SDK {}", platform, version);
    }
    if inventory.is_empty() {
        log::warn!("No iOS, macOS, tvOS or watchOS SDK found; nothing will be built");
    }
    Ok(inventory)
}

/// Parses the output of `xcodebuild -showsdks`.
///
/// Lines look like `\tiOS 13.2   \t-sdk iphoneos13.2`. When several versions
/// of one platform are installed the newest wins.
pub fn parse_showsdks(output: &str) -> BTreeMap<Platform, String> {
    let mut versions: BTreeMap<Platform, String> = BTreeMap::new();

    for line in output.lines() {
        let Some(pos) = line.find("-sdk ") else {
            continue;
        };
        let Some(sdk) = line[pos + 5..].split_whitespace().next() else {
            continue;
        };

        for (prefix, platform) in SDK_PREFIXES {
            let Some(version) = sdk.strip_prefix(prefix) else {
                continue;
            };
            if !version.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            let newer = versions
                .get(&platform)
                .map(|current| version_key(version) > version_key(current))
                .unwrap_or(true);
            if newer {
                versions.insert(platform, version.to_string());
            }
        }
    }

    versions
}

fn version_key(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    const SHOWSDKS: &str = "iOS SDKs:
\tiOS 13.2                      \t-sdk iphoneos13.2

iOS Simulator SDKs:
\tSimulator - iOS 13.2          \t-sdk iphonesimulator13.2

macOS SDKs:
\tDriverKit 19.0                \t-sdk driverkit.macosx19.0
\tmacOS 10.15                   \t-sdk macosx10.15

tvOS SDKs:
\ttvOS 13.2                     \t-sdk appletvos13.2

tvOS Simulator SDKs:
\tSimulator - tvOS 13.2         \t-sdk appletvsimulator13.2

watchOS SDKs:
\twatchOS 6.1                   \t-sdk watchos6.1

watchOS Simulator SDKs:
\tSimulator - watchOS 6.1       \t-sdk watchsimulator6.1
";

    const DEVELOPER_DIR: &str = "/Applications/Xcode.app/Contents/Developer";

    #[test]
    fn parses_all_device_sdks() {
        let versions = parse_showsdks(SHOWSDKS);
        assert_eq!(versions.len(), 4);
        assert_eq!(versions[&Platform::Ios], "13.2");
        assert_eq!(versions[&Platform::MacOs], "10.15");
        assert_eq!(versions[&Platform::TvOs], "13.2");
        assert_eq!(versions[&Platform::WatchOs], "6.1");
    }

    #[test]
    fn ignores_driverkit_and_simulators() {
        let versions = parse_showsdks(
            "\tDriverKit 19.0 \t-sdk driverkit.macosx19.0\n\tSimulator - iOS 13.2 \t-sdk iphonesimulator13.2\n",
        );
        assert!(versions.is_empty());
    }

    #[test]
    fn missing_platforms_are_absent() {
        let versions = parse_showsdks("macOS SDKs:\n\tmacOS 10.15 \t-sdk macosx10.15\n");
        assert_eq!(versions.len(), 1);
        assert!(!versions.contains_key(&Platform::Ios));
    }

    #[test]
    fn newest_version_wins() {
        let versions = parse_showsdks(
            "\tmacOS 10.15 \t-sdk macosx10.15\n\tmacOS 10.9 \t-sdk macosx10.9\n\tmacOS 11.1 \t-sdk macosx11.1\n",
        );
        assert_eq!(versions[&Platform::MacOs], "11.1");
    }

    #[test]
    fn empty_listing_yields_empty_inventory() {
        assert!(parse_showsdks("").is_empty());
    }

    #[test]
    fn discovers_versions_and_developer_dir() {
        let runner = RecordingRunner::default().with_sdks(SHOWSDKS);

        let inventory = discover_sdks(&runner).unwrap();

        assert_eq!(inventory.developer_dir, PathBuf::from(DEVELOPER_DIR));
        assert_eq!(inventory.version(Platform::WatchOs), Some("6.1"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn failing_showsdks_is_a_toolchain_error() {
        let runner = RecordingRunner::default()
            .with_output("xcode-select", DEVELOPER_DIR);

        let err = discover_sdks(&runner).unwrap_err();

        assert!(matches!(err, BuildError::Toolchain(_)));
        assert!(runner.calls_to("xcode-select").is_empty());
    }

    #[test]
    fn empty_developer_dir_is_a_toolchain_error() {
        let runner = RecordingRunner::default()
            .with_output("xcodebuild", SHOWSDKS)
            .with_output("xcode-select", "  \n");

        let err = discover_sdks(&runner).unwrap_err();

        match err {
            BuildError::Toolchain(message) => {
                assert!(message.contains("empty developer directory"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
