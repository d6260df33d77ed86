//! Universal (fat) static library assembly.
//!
//! Merges the per-architecture archives of one platform with `lipo -create`
//! and copies the headers into `dist/<platform>/include`.

use std::path::{Path, PathBuf};

use crate::builders::common::{copy_dir_recursive, create_dir, ensure_non_empty_file};
use crate::exec::{CommandRunner, CommandSpec};
use crate::recipes::LibraryRecipe;
use crate::types::{BuildArtifact, BuildError, DistributionBundle, Platform};

/// Produces one [`DistributionBundle`] per platform and library.
pub struct UniversalAssembler<'a> {
    runner: &'a dyn CommandRunner,
    dist_dir: PathBuf,
}

impl<'a> UniversalAssembler<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dist_dir: dist_dir.into(),
        }
    }

    /// `dist/<platform>`.
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.dist_dir.join(platform.dir_name())
    }

    /// Merges `artifacts` of `recipe` into `dist/<platform>/lib/<lib_file>`.
    ///
    /// Headers are taken from the first artifact; every architecture installs
    /// the same public headers.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` if `artifacts` is empty (logged as a warning)
    /// * `Ok(Some(bundle))` once the merged archive and headers are in place
    /// * `Err(BuildError)` if an artifact is missing or `lipo` fails
    pub fn assemble(
        &self,
        platform: Platform,
        recipe: &LibraryRecipe,
        artifacts: &[BuildArtifact],
    ) -> Result<Option<DistributionBundle>, BuildError> {
        let lib_file = recipe.lib_file.as_str();
        let Some(first) = artifacts.first() else {
            log::warn!(
                "No {} artifacts were built for {}; skipping universal library",
                lib_file,
                platform
            );
            return Ok(None);
        };

        for artifact in artifacts {
            if artifact.platform != platform {
                return Err(BuildError::Config(format!(
                    "artifact {} belongs to {}, not {}",
                    artifact.library.display(),
                    artifact.platform,
                    platform
                )));
            }
            ensure_non_empty_file(&artifact.library)?;
        }

        let platform_dir = self.platform_dir(platform);
        let lib_dir = platform_dir.join("lib");
        create_dir(&lib_dir)?;
        let output = lib_dir.join(lib_file);

        log::info!(
            "Creating universal {} for {} ({} architectures)",
            lib_file,
            platform,
            artifacts.len()
        );
        let lipo = CommandSpec::new("lipo", format!("lipo -create ({} {})", platform, lib_file))
            .arg("-create")
            .args(artifacts.iter().map(|a| a.library.as_os_str().to_os_string()))
            .arg("-output")
            .arg(&output);
        self.runner.run(&lipo)?;
        ensure_non_empty_file(&output)?;

        let include_dir = platform_dir.join("include");
        copy_headers(&first.include_dir, &include_dir)?;

        Ok(Some(DistributionBundle {
            platform,
            library_name: recipe.name.clone(),
            library: output,
            include_dir,
            archs: artifacts.iter().map(|a| a.arch).collect(),
        }))
    }
}

fn copy_headers(src: &Path, dest: &Path) -> Result<(), BuildError> {
    if !src.is_dir() {
        log::warn!("No headers installed at {}", src.display());
        return create_dir(dest);
    }
    copy_dir_recursive(src, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::{libzmq, openpgm};
    use crate::testing::RecordingRunner;
    use crate::types::Arch;
    use tempfile::TempDir;

    fn artifact(root: &Path, platform: Platform, arch: Arch, contents: &str) -> BuildArtifact {
        let prefix = root.join(format!("build/libzmq/{}-{}", platform.dir_name(), arch));
        std::fs::create_dir_all(prefix.join("lib")).unwrap();
        std::fs::create_dir_all(prefix.join("include")).unwrap();
        std::fs::write(prefix.join("lib/libzmq.a"), contents).unwrap();
        std::fs::write(prefix.join("include/zmq.h"), format!("/* {} */", arch)).unwrap();
        BuildArtifact {
            platform,
            arch,
            library: prefix.join("lib/libzmq.a"),
            include_dir: prefix.join("include"),
        }
    }

    #[test]
    fn merges_archives_in_order_and_copies_first_headers() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![
            artifact(temp.path(), Platform::Ios, Arch::Armv7, "armv7;"),
            artifact(temp.path(), Platform::Ios, Arch::Arm64, "arm64;"),
        ];
        let runner = RecordingRunner::default();
        let assembler = UniversalAssembler::new(&runner, temp.path().join("dist"));

        let bundle = assembler
            .assemble(Platform::Ios, &libzmq("4.3.2"), &artifacts)
            .unwrap()
            .expect("bundle");

        assert_eq!(bundle.library, temp.path().join("dist/ios/lib/libzmq.a"));
        let merged = std::fs::read_to_string(&bundle.library).unwrap();
        assert_eq!(merged, "armv7;arm64;");
        assert_eq!(bundle.archs, vec![Arch::Armv7, Arch::Arm64]);
        assert_eq!(bundle.library_name, "libzmq");
        assert_eq!(
            std::fs::read_to_string(bundle.include_dir.join("zmq.h")).unwrap(),
            "/* armv7 */"
        );

        let lipo = runner.calls_to("lipo");
        assert_eq!(lipo.len(), 1);
        assert_eq!(lipo[0].args[0], "-create");
        let first_input = artifacts[0].library.as_os_str();
        assert_eq!(lipo[0].args[1].as_os_str(), first_input);
    }

    #[test]
    fn empty_artifact_list_is_skipped() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::default();
        let assembler = UniversalAssembler::new(&runner, temp.path().join("dist"));

        let bundle = assembler.assemble(Platform::TvOs, &libzmq("4.3.2"), &[]).unwrap();

        assert!(bundle.is_none());
        assert!(runner.calls().is_empty());
        assert!(!temp.path().join("dist/tvos").exists());
    }

    #[test]
    fn empty_artifact_file_aborts_before_lipo() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![artifact(temp.path(), Platform::MacOs, Arch::X86_64, "")];
        let runner = RecordingRunner::default();
        let assembler = UniversalAssembler::new(&runner, temp.path().join("dist"));

        let err = assembler
            .assemble(Platform::MacOs, &libzmq("4.3.2"), &artifacts)
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingArtifact(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn lipo_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![artifact(temp.path(), Platform::MacOs, Arch::X86_64, "x")];
        let runner = RecordingRunner::default().failing_when(|c| c.program_name() == "lipo");
        let assembler = UniversalAssembler::new(&runner, temp.path().join("dist"));

        let err = assembler
            .assemble(Platform::MacOs, &libzmq("4.3.2"), &artifacts)
            .unwrap_err();
        assert!(matches!(err, BuildError::Command(_)));
    }

    #[test]
    fn headers_from_several_libraries_are_merged() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::default();
        let assembler = UniversalAssembler::new(&runner, temp.path().join("dist"));

        let pgm_prefix = temp.path().join("build/openpgm/macos-x86_64");
        std::fs::create_dir_all(pgm_prefix.join("lib")).unwrap();
        std::fs::create_dir_all(pgm_prefix.join("include/pgm-5.2/pgm")).unwrap();
        std::fs::write(pgm_prefix.join("lib/libpgm.a"), "pgm").unwrap();
        std::fs::write(pgm_prefix.join("include/pgm-5.2/pgm/pgm.h"), "").unwrap();
        let pgm = BuildArtifact {
            platform: Platform::MacOs,
            arch: Arch::X86_64,
            library: pgm_prefix.join("lib/libpgm.a"),
            include_dir: pgm_prefix.join("include"),
        };
        let zmq = artifact(temp.path(), Platform::MacOs, Arch::X86_64, "zmq");

        assembler.assemble(Platform::MacOs, &openpgm("master"), &[pgm]).unwrap();
        assembler.assemble(Platform::MacOs, &libzmq("4.3.2"), &[zmq]).unwrap();

        let include = temp.path().join("dist/macos/include");
        assert!(include.join("zmq.h").is_file());
        assert!(include.join("pgm-5.2/pgm/pgm.h").is_file());
        assert!(temp.path().join("dist/macos/lib/libpgm.a").is_file());
    }
}
