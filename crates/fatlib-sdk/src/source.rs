//! Upstream source fetching and preparation.
//!
//! [`HttpFetcher`] downloads a recipe's tarball, unpacks it with `tar` and
//! renames the extracted top-level directory to the recipe name.
//! [`prepare_source`] then patches the tree and runs the autotools bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;

use crate::builders::common::{create_dir, remove_dir, reset_dir};
use crate::exec::{CommandRunner, CommandSpec};
use crate::patch::{PatchPolicy, apply_all};
use crate::recipes::LibraryRecipe;
use crate::types::BuildError;

const USER_AGENT: &str = concat!("fatlib/", env!("CARGO_PKG_VERSION"));

/// Produces a clean, unpatched source tree for a recipe.
pub trait SourceFetcher {
    /// Fetches `recipe` into `src_root/<recipe.name>` and returns that path.
    ///
    /// Any existing directory at the destination is replaced.
    fn fetch(
        &self,
        recipe: &LibraryRecipe,
        src_root: &Path,
        runner: &dyn CommandRunner,
    ) -> Result<PathBuf, BuildError>;
}

/// Downloads source archives over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, BuildError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http })
    }

    /// Streams `url` into `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, BuildError> {
        log::info!("Downloading {}", url);
        let fetch_err =
            |e: reqwest::Error| BuildError::Fetch(format!("downloading {}: {}", url, e));

        let mut response = self
            .http
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        let mut file = fs::File::create(dest)?;
        let bytes = response.copy_to(&mut file).map_err(fetch_err)?;
        if bytes == 0 {
            return Err(BuildError::Fetch(format!("{} returned an empty archive", url)));
        }
        log::debug!("Downloaded {} bytes to {}", bytes, dest.display());
        Ok(bytes)
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(
        &self,
        recipe: &LibraryRecipe,
        src_root: &Path,
        runner: &dyn CommandRunner,
    ) -> Result<PathBuf, BuildError> {
        create_dir(src_root)?;
        let archive = src_root.join(format!("{}.tar.gz", recipe.name));
        self.download(&recipe.archive_url, &archive)?;

        let staging = src_root.join(format!(".extract-{}", recipe.name));
        reset_dir(&staging)?;
        runner
            .run(
                &CommandSpec::new("tar", format!("extracting {}", archive.display()))
                    .arg("-xzf")
                    .arg(&archive)
                    .arg("-C")
                    .arg(&staging),
            )
            .map_err(|e| BuildError::Fetch(e.to_string()))?;

        let dest = src_root.join(&recipe.name);
        normalize_extracted(&staging, &dest)?;

        fs::remove_file(&archive)?;
        remove_dir(&staging)?;
        Ok(dest)
    }
}

/// Moves the single top-level directory of an extracted archive to `dest`.
///
/// Release tarballs unpack to `zeromq-4.3.2/`, branch archives to
/// `openpgm-release-5-2-122/`; both become `dest`.
pub fn normalize_extracted(staging: &Path, dest: &Path) -> Result<(), BuildError> {
    let entries: Vec<PathBuf> = fs::read_dir(staging)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;

    let top = match entries.as_slice() {
        [single] if single.is_dir() => single,
        [] => {
            return Err(BuildError::Fetch(format!(
                "archive extracted nothing into {}",
                staging.display()
            )));
        }
        _ => {
            return Err(BuildError::Fetch(format!(
                "expected a single top-level directory in {}, found {} entries",
                staging.display(),
                entries.len()
            )));
        }
    };

    remove_dir(dest)?;
    fs::rename(top, dest).map_err(|e| {
        BuildError::Fetch(format!(
            "renaming {} to {}: {}",
            top.display(),
            dest.display(),
            e
        ))
    })
}

/// Applies the recipe's patches and, if required, bootstraps autotools.
///
/// Returns the number of patches that changed a file.
pub fn prepare_source(
    recipe: &LibraryRecipe,
    source_dir: &Path,
    policy: PatchPolicy,
    runner: &dyn CommandRunner,
) -> Result<usize, BuildError> {
    let applied = apply_all(&recipe.patches, source_dir, policy)?;
    log::info!(
        "Applied {}/{} patches to {}",
        applied,
        recipe.patches.len(),
        recipe.name
    );

    if recipe.bootstrap {
        runner.run(
            &CommandSpec::new("autoreconf", format!("autoreconf ({})", recipe.name))
                .arg("-fvi")
                .current_dir(recipe.configure_dir(source_dir)),
        )?;
    }
    Ok(applied)
}
