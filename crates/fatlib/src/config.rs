//! Configuration file support for fatlib.
//!
//! Project settings live in `fatlib.toml` so builds are reproducible without
//! repeating CLI flags.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./fatlib.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths in the file are resolved against the directory containing it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! build_dir = "build"
//! dist_dir = "dist"
//! jobs = 8
//!
//! [libraries]
//! zmq_version = "4.3.2"
//! pgm_branch = "release-5-2-122"
//!
//! [patches]
//! strict = true
//!
//! [platforms.ios]
//! archs = ["arm64", "x86_64"]
//! min_version = "11.0"
//!
//! [platforms.watchos]
//! enabled = false
//! ```

use anyhow::{Context, Result};
use fatlib_sdk::matrix::{default_archs, default_min_version, resolve_arch};
use fatlib_sdk::recipes::{DEFAULT_PGM_BRANCH, DEFAULT_ZMQ_VERSION};
use fatlib_sdk::{BuildError, PatchPolicy, Platform, PlatformConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "fatlib.toml";

/// Root configuration structure for `fatlib.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FatlibConfig {
    /// Directories and build parallelism.
    pub project: ProjectConfig,

    /// Upstream library versions.
    pub libraries: LibrariesConfig,

    /// Source patch behavior.
    pub patches: PatchesConfig,

    /// Per-platform overrides.
    pub platforms: PlatformsConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Scratch directory, deleted after a successful build.
    ///
    /// Defaults to `build/`.
    pub build_dir: Option<PathBuf>,

    /// Output directory for universal libraries and headers.
    ///
    /// Defaults to `dist/`.
    pub dist_dir: Option<PathBuf>,

    /// Keep the scratch directory after a successful build.
    pub keep_build: Option<bool>,

    /// Parallel `make` jobs. Defaults to the number of CPUs.
    pub jobs: Option<usize>,
}

/// Upstream library versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrariesConfig {
    /// libzmq release version, without the leading `v`.
    pub zmq_version: Option<String>,

    /// OpenPGM branch or tag.
    pub pgm_branch: Option<String>,
}

/// Source patch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchesConfig {
    /// Fail the build when a patch matches nothing. Defaults to `true`.
    pub strict: bool,
}

impl Default for PatchesConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Per-platform sections, `[platforms.<name>]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub ios: PlatformSection,
    pub macos: PlatformSection,
    pub tvos: PlatformSection,
    pub watchos: PlatformSection,
}

impl PlatformsConfig {
    /// The section for `platform`.
    pub fn section(&self, platform: Platform) -> &PlatformSection {
        match platform {
            Platform::Ios => &self.ios,
            Platform::MacOs => &self.macos,
            Platform::TvOs => &self.tvos,
            Platform::WatchOs => &self.watchos,
        }
    }
}

/// One platform's overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    /// Build this platform when its SDK is installed. Defaults to `true`.
    pub enabled: bool,

    /// Architectures to build, e.g. `["arm64", "x86_64"]`.
    ///
    /// Defaults to every architecture the platform supports.
    pub archs: Option<Vec<String>>,

    /// Minimum OS version.
    pub min_version: Option<String>,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            enabled: true,
            archs: None,
            min_version: None,
        }
    }
}

impl FatlibConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Returns
    ///
    /// * `Ok(FatlibConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: FatlibConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolves the platform sections into build configurations.
    ///
    /// Disabled platforms are left out. Architecture names are validated
    /// against the platform matrix.
    ///
    /// # Errors
    ///
    /// * [`BuildError::UnsupportedTarget`] for an architecture the platform
    ///   does not support
    /// * [`BuildError::Config`] for an architecture listed twice
    pub fn platform_configs(&self) -> Result<Vec<PlatformConfig>, BuildError> {
        let mut configs = Vec::new();
        for platform in Platform::ALL {
            let section = self.platforms.section(platform);
            if !section.enabled {
                log::info!("{} disabled in {}", platform, CONFIG_FILE_NAME);
                continue;
            }

            let archs = match &section.archs {
                None => default_archs(platform),
                Some(names) => names
                    .iter()
                    .map(|name| resolve_arch(platform, name))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            let min_version = section
                .min_version
                .clone()
                .unwrap_or_else(|| default_min_version(platform).to_string());
            let config = PlatformConfig::new(platform, archs, min_version);
            if let Some(arch) = config.duplicate_arch() {
                return Err(BuildError::Config(format!(
                    "[platforms.{}] lists {} more than once",
                    platform.dir_name(),
                    arch
                )));
            }
            configs.push(config);
        }
        Ok(configs)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// Every value is the built-in default, so the file only documents them
    /// until edited.
    pub fn generate_starter_toml() -> String {
        let archs = |p: Platform| {
            default_archs(p)
                .iter()
                .map(|a| format!("\"{}\"", a))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            r#"# fatlib configuration file
# CLI flags override these settings when provided.

[project]
# Scratch directory, removed after a successful build (default: build)
build_dir = "build"

# Output directory for universal libraries and headers (default: dist)
dist_dir = "dist"

# Keep the scratch directory after a successful build
# keep_build = true

# Parallel make jobs (default: number of CPUs)
# jobs = 8

[libraries]
# libzmq release to download
zmq_version = "{zmq}"

# OpenPGM branch or tag to download
pgm_branch = "{pgm}"

[patches]
# Fail when a source patch matches nothing (upstream sources changed)
strict = true

[platforms.ios]
archs = [{ios_archs}]
min_version = "{ios_min}"

[platforms.macos]
archs = [{macos_archs}]
min_version = "{macos_min}"

[platforms.tvos]
archs = [{tvos_archs}]
min_version = "{tvos_min}"

[platforms.watchos]
archs = [{watchos_archs}]
min_version = "{watchos_min}"
# enabled = false
"#,
            zmq = DEFAULT_ZMQ_VERSION,
            pgm = DEFAULT_PGM_BRANCH,
            ios_archs = archs(Platform::Ios),
            ios_min = default_min_version(Platform::Ios),
            macos_archs = archs(Platform::MacOs),
            macos_min = default_min_version(Platform::MacOs),
            tvos_archs = archs(Platform::TvOs),
            tvos_min = default_min_version(Platform::TvOs),
            watchos_archs = archs(Platform::WatchOs),
            watchos_min = default_min_version(Platform::WatchOs),
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<FatlibConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a new resolver by discovering and loading configuration.
    pub fn new() -> Result<Self> {
        match FatlibConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Creates a resolver from an explicit `--config` path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let config = FatlibConfig::load_from_file(path)?;
        Ok(Self {
            config: Some(config),
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Directory relative config paths are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Arguments
    ///
    /// * `cli_value` - Value from CLI argument (None if not provided)
    /// * `config_getter` - Function to get value from config
    /// * `default` - Default value if neither CLI nor config provides a value
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&FatlibConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }

    /// Resolves a directory: CLI value as given, config value relative to
    /// the config file, otherwise `default`.
    pub fn resolve_dir<F>(
        &self,
        cli_value: Option<PathBuf>,
        config_getter: F,
        default: &str,
    ) -> PathBuf
    where
        F: FnOnce(&FatlibConfig) -> Option<PathBuf>,
    {
        if let Some(dir) = cli_value {
            return dir;
        }
        let configured = self.config.as_ref().and_then(config_getter);
        match configured {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => self.base_dir().join(dir),
            None => PathBuf::from(default),
        }
    }

    /// Patch policy from `[patches] strict`, forced lenient by the CLI flag.
    pub fn patch_policy(&self, lenient_flag: bool) -> PatchPolicy {
        let strict = self
            .config
            .as_ref()
            .map(|c| c.patches.strict)
            .unwrap_or(true);
        if lenient_flag || !strict {
            PatchPolicy::Lenient
        } else {
            PatchPolicy::Strict
        }
    }

    /// Platform configurations from the config file, or the built-in defaults.
    pub fn platform_configs(&self) -> Result<Vec<PlatformConfig>, BuildError> {
        self.config
            .as_ref()
            .map(FatlibConfig::platform_configs)
            .unwrap_or_else(|| FatlibConfig::default().platform_configs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatlib_sdk::Arch;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FatlibConfig::default();
        assert!(config.patches.strict);
        assert!(config.platforms.ios.enabled);
        assert!(config.project.build_dir.is_none());

        let platforms = config.platform_configs().unwrap();
        assert_eq!(platforms.len(), 4);
        assert_eq!(platforms[0].platform, Platform::Ios);
        assert_eq!(platforms[0].archs.len(), 5);
        assert_eq!(platforms[1].min_version, "10.11");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fatlib.toml");

        std::fs::write(
            &config_path,
            r#"
[project]
dist_dir = "out"
jobs = 3

[libraries]
zmq_version = "4.3.4"

[patches]
strict = false

[platforms.ios]
archs = ["arm64", "x86_64"]
min_version = "11.0"

[platforms.watchos]
enabled = false
"#,
        )
        .unwrap();

        let config = FatlibConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.project.dist_dir, Some(PathBuf::from("out")));
        assert_eq!(config.project.jobs, Some(3));
        assert_eq!(config.libraries.zmq_version.as_deref(), Some("4.3.4"));
        assert!(config.libraries.pgm_branch.is_none());
        assert!(!config.patches.strict);

        let platforms = config.platform_configs().unwrap();
        let names: Vec<_> = platforms.iter().map(|p| p.platform).collect();
        assert_eq!(names, vec![Platform::Ios, Platform::MacOs, Platform::TvOs]);
        assert_eq!(platforms[0].archs, vec![Arch::Arm64, Arch::X86_64]);
        assert_eq!(platforms[0].min_version, "11.0");
    }

    #[test]
    fn test_unsupported_arch_in_config() {
        let mut config = FatlibConfig::default();
        config.platforms.macos.archs = Some(vec!["armv7".to_string()]);
        let err = config.platform_configs().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported platform/architecture: macOS-armv7"
        );

        config.platforms.macos.archs = Some(vec!["ppc".to_string()]);
        let err = config.platform_configs().unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedTarget { .. }));
    }

    #[test]
    fn test_duplicate_arch_in_config() {
        let mut config = FatlibConfig::default();
        config.platforms.tvos.archs = Some(vec!["arm64".to_string(), "arm64".to_string()]);

        let err = config.platform_configs().unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
        assert!(err.to_string().contains("[platforms.tvos] lists arm64 more than once"));
    }

    #[test]
    fn test_discover_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fatlib.toml");
        std::fs::write(&config_path, "[libraries]\npgm_branch = \"master\"\n").unwrap();
        let nested = temp_dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = FatlibConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.libraries.pgm_branch.as_deref(), Some("master"));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = FatlibConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_config_resolver() {
        let mut config = FatlibConfig::default();
        config.project.jobs = Some(6);
        config.project.build_dir = Some(PathBuf::from("scratch"));
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: Some(PathBuf::from("/work/fatlib.toml")),
        };

        // CLI value takes precedence
        assert_eq!(resolver.resolve(Some(2), |c| c.project.jobs, 1), 2);
        // Config value used when CLI is None
        assert_eq!(resolver.resolve(None, |c| c.project.jobs, 1), 6);
        assert!(!resolver.resolve(None, |c| c.project.keep_build, false));

        assert_eq!(
            resolver.resolve_dir(None, |c| c.project.build_dir.clone(), "build"),
            PathBuf::from("/work/scratch")
        );
        assert_eq!(
            resolver.resolve_dir(
                Some(PathBuf::from("tmp")),
                |c| c.project.build_dir.clone(),
                "build"
            ),
            PathBuf::from("tmp")
        );
        assert_eq!(
            resolver.resolve_dir(None, |c| c.project.dist_dir.clone(), "dist"),
            PathBuf::from("dist")
        );
    }

    #[test]
    fn test_patch_policy() {
        let resolver = ConfigResolver::default();
        assert_eq!(resolver.patch_policy(false), PatchPolicy::Strict);
        assert_eq!(resolver.patch_policy(true), PatchPolicy::Lenient);

        let mut config = FatlibConfig::default();
        config.patches.strict = false;
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: None,
        };
        assert_eq!(resolver.patch_policy(false), PatchPolicy::Lenient);
    }

    #[test]
    fn test_generate_starter_toml() {
        let toml_text = FatlibConfig::generate_starter_toml();
        assert!(toml_text.contains("zmq_version = \"4.3.2\""));
        assert!(toml_text.contains("pgm_branch = \"release-5-2-122\""));
        assert!(
            toml_text.contains("archs = [\"armv7\", \"armv7s\", \"arm64\", \"i386\", \"x86_64\"]")
        );

        let parsed: FatlibConfig = toml::from_str(&toml_text).unwrap();
        let platforms = parsed.platform_configs().unwrap();
        assert_eq!(platforms.len(), 4);
        assert_eq!(platforms[3].archs, vec![Arch::Armv7k, Arch::I386]);
    }
}
