//! Upstream library recipes.
//!
//! A [`LibraryRecipe`] says where a library's sources come from, how to patch
//! and configure them, and which static library the install produces.
//! [`openpgm`] and [`libzmq`] are the two libraries fatlib ships.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;

/// Default libzmq release.
pub const DEFAULT_ZMQ_VERSION: &str = "4.3.2";

/// Default OpenPGM branch or tag.
pub const DEFAULT_PGM_BRANCH: &str = "release-5-2-122";

/// How to fetch, patch, configure and install one library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecipe {
    /// Normalized source directory name (e.g. `"libzmq"`).
    pub name: String,
    /// Version tag or branch, recorded in the build manifest.
    pub version: String,
    /// Gzipped tarball URL.
    pub archive_url: String,
    /// Directory containing `configure` / `configure.ac`, relative to the source root.
    pub configure_subdir: PathBuf,
    /// Run `autoreconf -fvi` before configuring.
    pub bootstrap: bool,
    /// File name of the installed static library (e.g. `"libzmq.a"`).
    pub lib_file: String,
    /// Extra `./configure` arguments.
    pub configure_args: Vec<String>,
    /// Applied once after extraction.
    pub patches: Vec<Patch>,
    /// Applied after every `./configure` run, to generated files.
    pub post_configure: Vec<Patch>,
    /// Recipes whose per-architecture install this library links against.
    pub depends_on: Vec<String>,
}

impl LibraryRecipe {
    /// Absolute-from-source-root path of the configure directory.
    pub fn configure_dir(&self, source_dir: &std::path::Path) -> PathBuf {
        source_dir.join(&self.configure_subdir)
    }
}

/// OpenPGM, the reliable-multicast transport libzmq's `pgm://` uses.
///
/// The GitHub branch archive contains the autotools inputs under
/// `openpgm/pgm`, so it needs `autoreconf` before `configure`.
pub fn openpgm(branch: &str) -> LibraryRecipe {
    let configure_ac = "openpgm/pgm/configure.ac";
    LibraryRecipe {
        name: "openpgm".to_string(),
        version: branch.to_string(),
        archive_url: format!(
            "https://github.com/steve-o/openpgm/archive/{}.tar.gz",
            branch
        ),
        configure_subdir: PathBuf::from("openpgm/pgm"),
        bootstrap: true,
        lib_file: "libpgm.a".to_string(),
        configure_args: Vec::new(),
        patches: vec![
            // The rpl_malloc/rpl_realloc fallbacks are selected whenever the
            // check cannot run, which is always the case when cross-compiling.
            Patch::disable_macro(configure_ac, "AC_FUNC_MALLOC"),
            Patch::disable_macro(configure_ac, "AC_FUNC_REALLOC"),
            // Link probes for librt and libresolv, which Darwin does not ship.
            Patch::comment_lines(configure_ac, 41, 42, "dnl "),
            // Inline cpuid assembly is rejected by the simulator toolchains.
            Patch::replace_guard(
                "openpgm/pgm/cpu.c",
                "#if defined( __x86_64__ ) || defined( __i386__ )",
                "#if 0",
            ),
        ],
        post_configure: Vec::new(),
        depends_on: Vec::new(),
    }
}

/// libzmq, built from a release tarball with OpenPGM support.
pub fn libzmq(version: &str) -> LibraryRecipe {
    LibraryRecipe {
        name: "libzmq".to_string(),
        version: version.to_string(),
        archive_url: format!(
            "https://github.com/zeromq/libzmq/releases/download/v{0}/zeromq-{0}.tar.gz",
            version
        ),
        configure_subdir: PathBuf::new(),
        bootstrap: false,
        lib_file: "libzmq.a".to_string(),
        configure_args: vec![
            "--with-pgm".to_string(),
            "--without-libsodium".to_string(),
            "--without-docs".to_string(),
            "--disable-perf".to_string(),
            "--disable-curve-keygen".to_string(),
        ],
        patches: Vec::new(),
        // clock_gettime only exists from iOS 10 / macOS 10.12 on, but the SDK
        // declares it, so configure detects it regardless of the deployment target.
        post_configure: vec![Patch::replace_guard(
            "src/platform.hpp",
            "#define HAVE_CLOCK_GETTIME 1",
            "/* #undef HAVE_CLOCK_GETTIME */",
        )],
        depends_on: vec!["openpgm".to_string()],
    }
}

/// The default recipe list, in build order.
pub fn default_recipes(zmq_version: &str, pgm_branch: &str) -> Vec<LibraryRecipe> {
    vec![openpgm(pgm_branch), libzmq(zmq_version)]
}
