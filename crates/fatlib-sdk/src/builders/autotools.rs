//! Autotools cross-compilation for a single platform/architecture pair.
//!
//! [`CrossBuilder`] runs `configure`, the recipe's post-configure patches,
//! `make clean`, `make` and `make install` inside the shared source tree,
//! installing into `<build_dir>/<library>/<platform>-<arch>`. Every command
//! gets the architecture's environment explicitly; nothing is exported into
//! the fatlib process.

use std::path::{Path, PathBuf};

use crate::builders::common::ensure_non_empty_file;
use crate::exec::{CommandRunner, CommandSpec};
use crate::matrix::ArchitectureBuildConfig;
use crate::patch::{PatchPolicy, apply_all};
use crate::recipes::LibraryRecipe;
use crate::types::{BuildArtifact, BuildError};

/// Builds one recipe for one architecture at a time.
pub struct CrossBuilder<'a> {
    runner: &'a dyn CommandRunner,
    /// Root under which per-architecture install prefixes are created.
    build_dir: PathBuf,
    jobs: usize,
    patch_policy: PatchPolicy,
    /// `PATH` of the invoking process, appended after the toolchain bin dir.
    inherited_path: Option<String>,
}

impl<'a> CrossBuilder<'a> {
    /// Creates a new builder
    ///
    /// # Arguments
    ///
    /// * `runner` - Executes configure/make
    /// * `build_dir` - Scratch root; prefixes go to `<build_dir>/<library>/<platform>-<arch>`
    pub fn new(runner: &'a dyn CommandRunner, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            build_dir: build_dir.into(),
            jobs: 1,
            patch_policy: PatchPolicy::Strict,
            inherited_path: std::env::var("PATH").ok(),
        }
    }

    /// Sets the number of parallel `make` jobs
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn patch_policy(mut self, policy: PatchPolicy) -> Self {
        self.patch_policy = policy;
        self
    }

    /// Overrides the `PATH` appended to the toolchain directory.
    pub fn inherited_path(mut self, path: Option<String>) -> Self {
        self.inherited_path = path;
        self
    }

    /// Install prefix for a recipe/architecture pair.
    pub fn prefix(&self, recipe: &LibraryRecipe, config: &ArchitectureBuildConfig) -> PathBuf {
        prefix_for(&self.build_dir, &recipe.name, config)
    }

    /// Environment for every command of this build.
    ///
    /// Dependencies built earlier for the same architecture are exposed
    /// through `PKG_CONFIG_PATH` and extra include/library search paths.
    pub fn environment(
        &self,
        recipe: &LibraryRecipe,
        config: &ArchitectureBuildConfig,
    ) -> Vec<(String, String)> {
        let mut env = config.env(self.inherited_path.as_deref());
        if recipe.depends_on.is_empty() {
            return env;
        }

        let prefixes: Vec<PathBuf> = recipe
            .depends_on
            .iter()
            .map(|dep| prefix_for(&self.build_dir, dep, config))
            .collect();
        let pkg_config_path = prefixes
            .iter()
            .map(|p| p.join("lib/pkgconfig").display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        let includes: String = prefixes
            .iter()
            .map(|p| format!(" -I{}", p.join("include").display()))
            .collect();
        let libs: String = prefixes
            .iter()
            .map(|p| format!(" -L{}", p.join("lib").display()))
            .collect();

        for (key, value) in env.iter_mut() {
            match key.as_str() {
                "CFLAGS" | "CXXFLAGS" => value.push_str(&includes),
                "LDFLAGS" => value.push_str(&libs),
                _ => {}
            }
        }
        env.push(("PKG_CONFIG_PATH".to_string(), pkg_config_path));
        env
    }

    /// The `./configure` invocation for one architecture.
    pub fn configure_command(
        &self,
        recipe: &LibraryRecipe,
        source_dir: &Path,
        config: &ArchitectureBuildConfig,
    ) -> CommandSpec {
        let configure_dir = recipe.configure_dir(source_dir);
        let prefix = self.prefix(recipe, config);
        CommandSpec::new(
            configure_dir.join("configure"),
            format!("configure {} for {}", recipe.name, config.key()),
        )
        .arg(format!("--host={}", config.host))
        .arg(format!("--prefix={}", prefix.display()))
        .args(["--disable-shared", "--enable-static"])
        .args(recipe.configure_args.iter())
        .current_dir(configure_dir)
        .envs(self.environment(recipe, config))
    }

    /// Configures, builds and installs `recipe` for one architecture.
    ///
    /// # Returns
    ///
    /// * `Ok(BuildArtifact)` pointing at `<prefix>/lib/<lib_file>`
    /// * `Err(BuildError)` on the first failing step; nothing is retried
    pub fn build(
        &self,
        recipe: &LibraryRecipe,
        source_dir: &Path,
        config: &ArchitectureBuildConfig,
    ) -> Result<BuildArtifact, BuildError> {
        let key = config.key();
        let prefix = self.prefix(recipe, config);
        let configure_dir = recipe.configure_dir(source_dir);
        let env = self.environment(recipe, config);
        log::info!("Building {} for {}", recipe.name, key);

        self.runner.run(&self.configure_command(recipe, source_dir, config))?;

        apply_all(&recipe.post_configure, &configure_dir, self.patch_policy)?;

        let make = |args: &[&str], what: &str| {
            CommandSpec::new("make", format!("make {} ({} {})", what, recipe.name, key))
                .args(args.iter().copied())
                .current_dir(&configure_dir)
                .envs(env.clone())
        };
        self.runner.run(&make(&["clean"], "clean"))?;
        let jobs = format!("-j{}", self.jobs);
        self.runner.run(&make(&[jobs.as_str()], "build"))?;
        self.runner.run(&make(&["install"], "install"))?;

        let library = prefix.join("lib").join(&recipe.lib_file);
        ensure_non_empty_file(&library)?;
        log::debug!("Installed {}", library.display());

        Ok(BuildArtifact {
            platform: config.platform,
            arch: config.arch,
            library,
            include_dir: prefix.join("include"),
        })
    }
}

fn prefix_for(build_dir: &Path, library: &str, config: &ArchitectureBuildConfig) -> PathBuf {
    build_dir
        .join(library)
        .join(format!("{}-{}", config.platform.dir_name(), config.arch))
}
