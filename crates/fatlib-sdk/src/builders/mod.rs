//! Build steps that turn a prepared source tree into distributable libraries.
//!
//! ## Builders
//!
//! | Builder | Input | Output |
//! |---------|-------|--------|
//! | [`CrossBuilder`] | patched source tree + [`ArchitectureBuildConfig`](crate::matrix::ArchitectureBuildConfig) | `build/<lib>/<platform>-<arch>/lib/<lib>.a` |
//! | [`UniversalAssembler`] | every artifact of one platform | `dist/<platform>/lib/<lib>.a` + `include/` |
//!
//! The `common` module holds the filesystem helpers both use.
//!
//! ## Example
//!
//! ```ignore
//! use fatlib_sdk::builders::{CrossBuilder, UniversalAssembler};
//! use fatlib_sdk::{SystemRunner, Platform};
//!
//! let runner = SystemRunner::new().verbose(true);
//! let builder = CrossBuilder::new(&runner, "build").jobs(8);
//! let artifact = builder.build(&recipe, &source_dir, &arch_config)?;
//!
//! let assembler = UniversalAssembler::new(&runner, "dist");
//! assembler.assemble(Platform::MacOs, &recipe, &[artifact])?;
//! # Ok::<(), fatlib_sdk::BuildError>(())
//! ```

pub mod autotools;
pub mod common;
pub mod universal;

pub use autotools::CrossBuilder;
pub use universal::UniversalAssembler;
