//! Universal static libraries for Apple platforms
//!
//! `fatlib-sdk` cross-compiles autotools C libraries (libzmq and its OpenPGM
//! transport) for every iOS, macOS, tvOS and watchOS architecture the local
//! Xcode supports, then merges the per-architecture archives into one
//! universal library per platform with `lipo`.
//!
//! # Architecture
//!
//! - **SDK discovery** ([`sdk`]): which platform SDKs the active Xcode ships
//! - **Sources** ([`source`], [`patch`], [`recipes`]): download, unpack and
//!   patch upstream tarballs
//! - **Platform matrix** ([`matrix`]): static table from platform/architecture
//!   to host triple, SDK root and compiler flags
//! - **Builders** ([`builders`]): `configure`/`make` per architecture, `lipo`
//!   per platform
//! - **Pipeline** ([`pipeline`]): runs the steps above in order and writes
//!   the [`manifest`]
//!
//! All external tools go through the [`CommandRunner`] trait. Every command
//! carries its own environment, so nothing in the calling process is mutated.
//!
//! # Example
//!
//! ```ignore
//! use fatlib_sdk::{HttpFetcher, Pipeline, PipelineOptions, SystemRunner};
//!
//! fn main() -> Result<(), fatlib_sdk::BuildError> {
//!     let runner = SystemRunner::new().verbose(true);
//!     let fetcher = HttpFetcher::new()?;
//!     let report = Pipeline::new(&runner, &fetcher, PipelineOptions::default()).run()?;
//!
//!     for bundle in &report.bundles {
//!         println!("{} {}", bundle.platform, bundle.library.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod builders;
pub mod exec;
pub mod manifest;
pub mod matrix;
pub mod patch;
pub mod pipeline;
pub mod recipes;
pub mod sdk;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use exec::{CommandRunner, CommandSpec, SystemRunner};
pub use manifest::BuildManifest;
pub use matrix::{ArchitectureBuildConfig, MatrixEntry};
pub use patch::{Patch, PatchPolicy};
pub use pipeline::{BuildPlan, Pipeline, PipelineOptions, PipelineReport, PipelineState};
pub use recipes::LibraryRecipe;
pub use sdk::{SdkInventory, discover_sdks};
pub use source::{HttpFetcher, SourceFetcher};
pub use types::{
    Arch, BuildArtifact, BuildError, DistributionBundle, Platform, PlatformConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
