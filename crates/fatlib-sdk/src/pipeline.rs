//! The end-to-end build pipeline.
//!
//! ```text
//! Init → SdkDiscovered → SourceFetched → Building(p, a)* → Assembling(p)* → Cleaned → Done
//!                                     (any failure) → Aborted
//! ```
//!
//! [`Pipeline::plan`] discovers SDKs, selects platforms and resolves every
//! [`ArchitectureBuildConfig`] before anything touches the filesystem, so an
//! unsupported platform/architecture pair fails the run before any build.
//! [`Pipeline::run`] then executes the plan strictly sequentially and stops at
//! the first error.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::builders::common::{default_jobs, remove_dir, reset_dir};
use crate::builders::{CrossBuilder, UniversalAssembler};
use crate::exec::{CommandRunner, CommandSpec};
use crate::manifest::BuildManifest;
use crate::matrix::{ArchitectureBuildConfig, default_platforms};
use crate::patch::PatchPolicy;
use crate::recipes::{DEFAULT_PGM_BRANCH, DEFAULT_ZMQ_VERSION, LibraryRecipe, default_recipes};
use crate::sdk::{SdkInventory, discover_sdks};
use crate::source::{SourceFetcher, prepare_source};
use crate::types::{Arch, BuildArtifact, BuildError, DistributionBundle, Platform, PlatformConfig};

/// Everything a run needs besides its runner and fetcher.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Scratch directory; recreated at the start of a run.
    pub build_dir: PathBuf,
    /// Output directory; recreated at the start of a run.
    pub dist_dir: PathBuf,
    /// Candidate platforms, each with its architectures and deployment target.
    pub platforms: Vec<PlatformConfig>,
    /// Restricts the run to these platforms when non-empty.
    pub only: Vec<Platform>,
    /// Libraries to build, dependencies first.
    pub recipes: Vec<LibraryRecipe>,
    pub jobs: usize,
    pub patch_policy: PatchPolicy,
    /// Leave `build_dir` in place after a successful run.
    pub keep_build: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            dist_dir: PathBuf::from("dist"),
            platforms: default_platforms(),
            only: Vec::new(),
            recipes: default_recipes(DEFAULT_ZMQ_VERSION, DEFAULT_PGM_BRANCH),
            jobs: default_jobs(),
            patch_policy: PatchPolicy::Strict,
            keep_build: false,
        }
    }
}

/// Pipeline progress, recorded in [`PipelineReport::states`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    SdkDiscovered,
    SourceFetched { library: String },
    Building { library: String, platform: Platform, arch: Arch },
    Assembling { library: String, platform: Platform },
    Cleaned,
    Done,
    Aborted,
}

/// What will be built, resolved up front.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub inventory: SdkInventory,
    /// Platforms that will be built, in build order.
    pub platforms: Vec<PlatformConfig>,
    /// Platforms left out because no SDK is installed for them.
    pub skipped: Vec<Platform>,
    /// Every architecture build, grouped by platform.
    pub targets: Vec<ArchitectureBuildConfig>,
    pub recipes: Vec<LibraryRecipe>,
}

impl BuildPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub bundles: Vec<DistributionBundle>,
    pub skipped: Vec<Platform>,
    pub manifest: Option<PathBuf>,
    pub states: Vec<PipelineState>,
}

/// Drives discovery, fetching, building and assembly.
pub struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn SourceFetcher,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        fetcher: &'a dyn SourceFetcher,
        options: PipelineOptions,
    ) -> Self {
        Self {
            runner,
            fetcher,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Discovers SDKs and resolves every architecture build.
    ///
    /// A platform is built only if it is selected and an SDK for it is
    /// installed; platforms without an SDK are listed in
    /// [`BuildPlan::skipped`].
    ///
    /// # Errors
    ///
    /// * [`BuildError::Toolchain`] if SDK discovery fails
    /// * [`BuildError::UnsupportedTarget`] if a selected platform lists an
    ///   architecture outside the platform matrix
    /// * [`BuildError::Config`] if the build and dist directories overlap or a
    ///   platform lists an architecture twice
    pub fn plan(&self) -> Result<BuildPlan, BuildError> {
        let inventory = discover_sdks(self.runner)?;
        self.plan_with(inventory)
    }

    /// Resolves a plan against an already discovered inventory.
    pub fn plan_with(&self, inventory: SdkInventory) -> Result<BuildPlan, BuildError> {
        check_layout(&self.options.build_dir, &self.options.dist_dir)?;
        for platform in &self.options.only {
            if !self.options.platforms.iter().any(|p| p.platform == *platform) {
                log::warn!(
                    "{} was requested but is not enabled in the configuration",
                    platform
                );
            }
        }

        let mut platforms = Vec::new();
        let mut skipped = Vec::new();
        let mut targets = Vec::new();

        for config in &self.options.platforms {
            if !self.options.only.is_empty() && !self.options.only.contains(&config.platform) {
                log::debug!("{} not selected", config.platform);
                continue;
            }
            if let Some(arch) = config.duplicate_arch() {
                return Err(BuildError::Config(format!(
                    "{} lists {} more than once",
                    config.platform, arch
                )));
            }
            let Some(sdk_version) = inventory.version(config.platform) else {
                log::warn!("No {} SDK installed; skipping", config.platform);
                skipped.push(config.platform);
                continue;
            };
            for arch in &config.archs {
                targets.push(ArchitectureBuildConfig::derive(
                    config,
                    *arch,
                    sdk_version,
                    &inventory.developer_dir,
                )?);
            }
            platforms.push(config.clone());
        }

        Ok(BuildPlan {
            inventory,
            platforms,
            skipped,
            targets,
            recipes: self.options.recipes.clone(),
        })
    }

    /// The `configure` command of every build in `plan`, without running anything.
    pub fn preview(&self, plan: &BuildPlan) -> Vec<CommandSpec> {
        let builder = self.cross_builder();
        let src_root = self.src_root();
        plan.recipes
            .iter()
            .flat_map(|recipe| {
                let source_dir = src_root.join(&recipe.name);
                plan.targets
                    .iter()
                    .map(|target| builder.configure_command(recipe, &source_dir, target))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Runs the whole pipeline.
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineReport)` with every produced bundle
    /// * `Err(BuildError)` at the first failure; later steps are not attempted
    pub fn run(&self) -> Result<PipelineReport, BuildError> {
        let mut states = vec![PipelineState::Init];
        match self.execute(&mut states) {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Some(last) = states.last() {
                    log::error!("Build aborted after {:?}", last);
                }
                states.push(PipelineState::Aborted);
                log::debug!("Pipeline states: {:?}", states);
                Err(err)
            }
        }
    }

    fn execute(&self, states: &mut Vec<PipelineState>) -> Result<PipelineReport, BuildError> {
        let plan = self.plan()?;
        states.push(PipelineState::SdkDiscovered);

        reset_dir(&self.options.build_dir)?;
        reset_dir(&self.options.dist_dir)?;

        let mut bundles = Vec::new();
        if plan.is_empty() {
            log::warn!("No platform has an installed SDK; nothing to build");
        } else {
            for recipe in &plan.recipes {
                bundles.extend(self.build_library(recipe, &plan, states)?);
            }
        }

        let manifest = if bundles.is_empty() {
            None
        } else {
            let manifest = BuildManifest::new(&plan.inventory, &plan.recipes, &bundles);
            Some(manifest.write_to(&self.options.dist_dir)?)
        };

        if self.options.keep_build {
            log::info!("Keeping {}", self.options.build_dir.display());
        } else {
            remove_dir(&self.options.build_dir)?;
        }
        states.push(PipelineState::Cleaned);
        states.push(PipelineState::Done);

        Ok(PipelineReport {
            bundles,
            skipped: plan.skipped,
            manifest,
            states: std::mem::take(states),
        })
    }

    /// Fetches, builds every target of, and assembles one library.
    fn build_library(
        &self,
        recipe: &LibraryRecipe,
        plan: &BuildPlan,
        states: &mut Vec<PipelineState>,
    ) -> Result<Vec<DistributionBundle>, BuildError> {
        let source_dir = self.fetcher.fetch(recipe, &self.src_root(), self.runner)?;
        prepare_source(recipe, &source_dir, self.options.patch_policy, self.runner)?;
        states.push(PipelineState::SourceFetched {
            library: recipe.name.clone(),
        });

        let builder = self.cross_builder();
        let mut artifacts: BTreeMap<Platform, Vec<BuildArtifact>> = plan
            .platforms
            .iter()
            .map(|p| (p.platform, Vec::new()))
            .collect();

        for target in &plan.targets {
            states.push(PipelineState::Building {
                library: recipe.name.clone(),
                platform: target.platform,
                arch: target.arch,
            });
            let artifact = builder.build(recipe, &source_dir, target)?;
            artifacts.entry(target.platform).or_default().push(artifact);
        }

        let assembler = UniversalAssembler::new(self.runner, &self.options.dist_dir);
        let mut bundles = Vec::new();
        for (platform, list) in &artifacts {
            states.push(PipelineState::Assembling {
                library: recipe.name.clone(),
                platform: *platform,
            });
            if let Some(bundle) = assembler.assemble(*platform, recipe, list)? {
                bundles.push(bundle);
            }
        }
        Ok(bundles)
    }

    fn cross_builder(&self) -> CrossBuilder<'a> {
        CrossBuilder::new(self.runner, &self.options.build_dir)
            .jobs(self.options.jobs)
            .patch_policy(self.options.patch_policy)
    }

    fn src_root(&self) -> PathBuf {
        self.options.build_dir.join("src")
    }
}

/// Rejects a build directory that equals, contains or lies inside the dist
/// directory. Both are reset at the start of a run and the build directory
/// is removed at the end.
fn check_layout(build_dir: &Path, dist_dir: &Path) -> Result<(), BuildError> {
    let build = normalized(build_dir)?;
    let dist = normalized(dist_dir)?;
    if build.starts_with(&dist) || dist.starts_with(&build) {
        return Err(BuildError::Config(format!(
            "build directory {} and dist directory {} overlap",
            build_dir.display(),
            dist_dir.display()
        )));
    }
    Ok(())
}

fn normalized(path: &Path) -> Result<PathBuf, BuildError> {
    let mut out = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
