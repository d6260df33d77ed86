//! # fatlib
//!
//! Command-line tool that builds universal ZeroMQ static libraries (with
//! OpenPGM) for iOS, macOS, tvOS and watchOS.
//!
//! ## Overview
//!
//! `fatlib` is the CLI front end of [`fatlib_sdk`]. It handles:
//!
//! - **Discovery** - Lists the platform SDKs the active Xcode ships
//! - **Building** - Downloads, patches and cross-compiles libzmq and OpenPGM
//!   for every configured architecture
//! - **Assembly** - Merges the architectures of each platform with `lipo`
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter configuration
//! fatlib init
//!
//! # See what would be built
//! fatlib --dry-run build
//!
//! # Build everything the local Xcode supports
//! fatlib build
//!
//! # Only iOS and macOS, keeping the scratch directory
//! fatlib build --platform ios --platform macos --keep-build
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Build universal libraries into `dist/` |
//! | `sdks` | List installed platform SDKs |
//! | `matrix` | Print the resolved platform/architecture matrix |
//! | `init` | Write a starter `fatlib.toml` |
//!
//! ## Output Directory
//!
//! ```text
//! dist/
//! ├── ios/
//! │   ├── include/       # zmq.h, pgm-5.2/...
//! │   └── lib/           # libzmq.a, libpgm.a (universal)
//! ├── macos/
//! └── manifest.json      # versions, SDKs and bundles of this build
//! ```
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--dry-run`** - Preview what would be done without making changes
//! - **`--verbose` / `-v`** - Enable detailed output showing all commands
//! - **`--config <path>`** - Use this `fatlib.toml` instead of discovering one
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `fatlib.toml`

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fatlib_sdk::builders::common::default_jobs;
use fatlib_sdk::matrix::lookup;
use fatlib_sdk::recipes::{DEFAULT_PGM_BRANCH, DEFAULT_ZMQ_VERSION, default_recipes};
use fatlib_sdk::{
    BuildPlan, HttpFetcher, Pipeline, PipelineOptions, PipelineReport, Platform, PlatformConfig,
    SystemRunner, discover_sdks,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use config::{CONFIG_FILE_NAME, ConfigResolver, FatlibConfig};

pub mod config;

/// Builds universal ZeroMQ/OpenPGM static libraries for Apple platforms.
#[derive(Parser, Debug)]
#[command(
    name = "fatlib",
    author,
    version,
    about = "Universal ZeroMQ static libraries for Apple platforms",
    long_about = None
)]
struct Cli {
    /// Print what would be done without actually doing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Path to fatlib.toml (default: discovered from the current directory upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, cross-compile and merge the libraries into dist/.
    Build(BuildArgs),
    /// List the platform SDKs installed with the active Xcode.
    Sdks,
    /// Print the resolved platform/architecture matrix.
    Matrix {
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
    /// Scaffold a starter fatlib.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    #[arg(long = "platform", value_enum, help = "Only build these platforms (repeatable)")]
    platforms: Vec<PlatformArg>,
    #[arg(long, help = "libzmq release version (default: 4.3.2)")]
    zmq_version: Option<String>,
    #[arg(long, help = "OpenPGM branch or tag (default: release-5-2-122)")]
    pgm_branch: Option<String>,
    #[arg(long, help = "Scratch directory (default: build)")]
    build_dir: Option<PathBuf>,
    #[arg(long, help = "Output directory (default: dist)")]
    dist_dir: Option<PathBuf>,
    #[arg(long, help = "Keep the scratch directory after a successful build")]
    keep_build: bool,
    #[arg(long, short = 'j', help = "Parallel make jobs (default: number of CPUs)")]
    jobs: Option<usize>,
    #[arg(long, help = "Warn instead of failing when a source patch matches nothing")]
    lenient_patches: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PlatformArg {
    Ios,
    Macos,
    Tvos,
    Watchos,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Ios => Platform::Ios,
            PlatformArg::Macos => Platform::MacOs,
            PlatformArg::Tvos => Platform::TvOs,
            PlatformArg::Watchos => Platform::WatchOs,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

/// One row of `fatlib matrix`.
#[derive(Debug, Serialize)]
struct MatrixRow {
    key: String,
    platform: Platform,
    arch: String,
    sdk: &'static str,
    host: &'static str,
    min_version: String,
    simulator: bool,
    bitcode: bool,
}

/// Parses the command line and runs the selected command.
pub fn run() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build(ref args) => {
            let resolver = load_config(cli.config.as_deref())?;
            cmd_build(&resolver, args, cli.dry_run, cli.verbose)
        }
        Command::Sdks => cmd_sdks(cli.verbose),
        Command::Matrix { format } => {
            let resolver = load_config(cli.config.as_deref())?;
            cmd_matrix(&resolver, format)
        }
        Command::Init { ref output } => cmd_init(output, cli.dry_run),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

fn load_config(explicit: Option<&Path>) -> Result<ConfigResolver> {
    let resolver = match explicit {
        Some(path) => ConfigResolver::from_path(path)?,
        None => ConfigResolver::new()?,
    };
    if let Some(path) = &resolver.config_path {
        log::info!("Using configuration from {}", path.display());
    }
    Ok(resolver)
}

/// Merges CLI flags, `fatlib.toml` and built-in defaults.
fn pipeline_options(resolver: &ConfigResolver, args: &BuildArgs) -> Result<PipelineOptions> {
    let zmq_version = resolver.resolve(
        args.zmq_version.clone(),
        |c| c.libraries.zmq_version.clone(),
        DEFAULT_ZMQ_VERSION.to_string(),
    );
    let pgm_branch = resolver.resolve(
        args.pgm_branch.clone(),
        |c| c.libraries.pgm_branch.clone(),
        DEFAULT_PGM_BRANCH.to_string(),
    );
    let jobs = resolver.resolve(args.jobs, |c| c.project.jobs, default_jobs());
    if jobs == 0 {
        bail!("--jobs must be at least 1");
    }

    Ok(PipelineOptions {
        build_dir: resolver.resolve_dir(
            args.build_dir.clone(),
            |c| c.project.build_dir.clone(),
            "build",
        ),
        dist_dir: resolver.resolve_dir(
            args.dist_dir.clone(),
            |c| c.project.dist_dir.clone(),
            "dist",
        ),
        platforms: resolver.platform_configs()?,
        only: args.platforms.iter().copied().map(Platform::from).collect(),
        recipes: default_recipes(&zmq_version, &pgm_branch),
        jobs,
        patch_policy: resolver.patch_policy(args.lenient_patches),
        keep_build: args.keep_build || resolver.resolve(None, |c| c.project.keep_build, false),
    })
}

fn cmd_build(
    resolver: &ConfigResolver,
    args: &BuildArgs,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let options = pipeline_options(resolver, args)?;
    let runner = SystemRunner::new().verbose(verbose);
    let fetcher = HttpFetcher::new().context("creating HTTP client")?;
    let pipeline = Pipeline::new(&runner, &fetcher, options);

    if dry_run {
        let plan = pipeline.plan()?;
        print_plan(&pipeline, &plan);
        return Ok(());
    }

    let report = pipeline.run()?;
    print_report(&report, &pipeline.options().dist_dir);
    Ok(())
}

fn print_plan(pipeline: &Pipeline<'_>, plan: &BuildPlan) {
    let options = pipeline.options();
    println!(
        "[dry-run] Developer dir: {}",
        plan.inventory.developer_dir.display()
    );
    for platform in &plan.skipped {
        println!("[dry-run] Skipping {} (no SDK installed)", platform);
    }
    if plan.is_empty() {
        println!(
            "[dry-run] Nothing to build; {} would be left empty",
            options.dist_dir.display()
        );
        return;
    }
    for recipe in &plan.recipes {
        println!(
            "[dry-run] Would fetch {} {} from {}",
            recipe.name, recipe.version, recipe.archive_url
        );
    }
    for command in pipeline.preview(plan) {
        println!("[dry-run] Would run: {}", command);
    }
    for config in &plan.platforms {
        let archs: Vec<&str> = config.archs.iter().map(|a| a.as_str()).collect();
        let platform_dir = options.dist_dir.join(config.platform.dir_name());
        let lib_dir = platform_dir.join("lib");
        for recipe in &plan.recipes {
            println!(
                "[dry-run] Would merge {} ({}) into {}",
                recipe.lib_file,
                archs.join(" "),
                lib_dir.join(&recipe.lib_file).display()
            );
        }
    }
}

fn print_report(report: &PipelineReport, dist_dir: &Path) {
    if report.bundles.is_empty() {
        println!("No libraries were built; {} is empty", dist_dir.display());
        return;
    }
    println!("Built {} universal libraries:", report.bundles.len());
    for bundle in &report.bundles {
        let archs: Vec<&str> = bundle.archs.iter().map(|a| a.as_str()).collect();
        println!(
            "  {:<8} {:<8} [{}] {}",
            bundle.platform,
            bundle.library_name,
            archs.join(", "),
            bundle.library.display()
        );
    }
    for platform in &report.skipped {
        println!("  skipped {} (no SDK installed)", platform);
    }
    if let Some(manifest) = &report.manifest {
        println!("Manifest: {}", manifest.display());
    }
}

fn cmd_sdks(verbose: bool) -> Result<()> {
    let runner = SystemRunner::new().verbose(verbose);
    let inventory = discover_sdks(&runner)?;
    println!("Developer dir: {}", inventory.developer_dir.display());
    for platform in Platform::ALL {
        match inventory.version(platform) {
            Some(version) => println!("  {:<8} {}", platform, version),
            None => println!("  {:<8} (not installed)", platform),
        }
    }
    Ok(())
}

fn matrix_rows(platforms: &[PlatformConfig]) -> Result<Vec<MatrixRow>> {
    let mut rows = Vec::new();
    for config in platforms {
        for arch in &config.archs {
            let entry = lookup(config.platform, *arch)?;
            rows.push(MatrixRow {
                key: format!("{}-{}", config.platform, arch),
                platform: config.platform,
                arch: arch.to_string(),
                sdk: entry.sdk_name,
                host: entry.host,
                min_version: config.min_version.clone(),
                simulator: entry.simulator,
                bitcode: entry.bitcode,
            });
        }
    }
    Ok(rows)
}

fn cmd_matrix(resolver: &ConfigResolver, format: OutputFormat) -> Result<()> {
    let rows = matrix_rows(&resolver.platform_configs()?)?;
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&rows)?,
        OutputFormat::Json => serde_json::to_string_pretty(&rows)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn cmd_init(output: &Path, dry_run: bool) -> Result<()> {
    ensure_can_write(output)?;
    let contents = FatlibConfig::generate_starter_toml();
    if dry_run {
        println!("[dry-run] Would write {:?}:\n{}", output, contents);
        return Ok(());
    }
    write_file(output, contents.as_bytes())?;
    println!("Wrote starter config to {:?}", output);
    Ok(())
}

fn load_dotenv() {
    if let Ok(cwd) = std::env::current_dir() {
        let root = find_project_root(&cwd).unwrap_or(cwd);
        let _ = dotenvy::from_path(root.join(".env.local"));
    }
}

/// Nearest ancestor holding `fatlib.toml` or `.git`.
fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| {
            candidate.join(CONFIG_FILE_NAME).is_file() || candidate.join(".git").exists()
        })
        .map(Path::to_path_buf)
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing file {:?}", path))
}
