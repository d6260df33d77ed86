//! Common utilities shared by the fetcher, the autotools runner and the
//! universal assembler.
//!
//! All functions return [`BuildError`]s whose messages name the path involved
//! and, where there is one, the fix.

use std::fs;
use std::path::Path;

use crate::types::BuildError;

/// Deletes `dir` if it exists and recreates it empty.
pub fn reset_dir(dir: &Path) -> Result<(), BuildError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            BuildError::Io(std::io::Error::new(
                e.kind(),
                format!("removing {}: {}", dir.display(), e),
            ))
        })?;
    }
    create_dir(dir)
}

/// Creates `dir` and its parents.
pub fn create_dir(dir: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dir).map_err(|e| {
        BuildError::Io(std::io::Error::new(
            e.kind(),
            format!("creating directory {}: {}", dir.display(), e),
        ))
    })
}

/// Removes `dir` and everything below it; a missing directory is not an error.
pub fn remove_dir(dir: &Path) -> Result<(), BuildError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::Io(std::io::Error::new(
            e.kind(),
            format!("removing {}: {}", dir.display(), e),
        ))),
    }
}

/// Checks that `path` is a regular, non-empty file.
///
/// # Errors
///
/// [`BuildError::MissingArtifact`] if the file does not exist or is empty.
pub fn ensure_non_empty_file(path: &Path) -> Result<(), BuildError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(BuildError::MissingArtifact(path.to_path_buf())),
    }
}

/// Recursively copies `src` into `dest`, merging with existing contents.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), BuildError> {
    create_dir(dest)?;

    for entry in fs::read_dir(src).map_err(|e| {
        BuildError::Io(std::io::Error::new(
            e.kind(),
            format!("reading directory {}: {}", src.display(), e),
        ))
    })? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|e| {
                BuildError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "copying {} to {}: {}",
                        path.display(),
                        dest_path.display(),
                        e
                    ),
                ))
            })?;
        }
    }

    Ok(())
}

/// Number of parallel `make` jobs to use when none is configured.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reset_dir_empties_existing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("build");
        std::fs::create_dir_all(dir.join("stale")).unwrap();
        std::fs::write(dir.join("stale/file.o"), b"x").unwrap();

        reset_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn remove_dir_ignores_missing() {
        let temp = TempDir::new().unwrap();
        remove_dir(&temp.path().join("never-created")).unwrap();
    }

    #[test]
    fn ensure_non_empty_file_rejects_missing_and_empty() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("libzmq.a");
        assert!(matches!(
            ensure_non_empty_file(&missing),
            Err(BuildError::MissingArtifact(_))
        ));

        std::fs::write(&missing, b"").unwrap();
        assert!(ensure_non_empty_file(&missing).is_err());

        std::fs::write(&missing, b"!<arch>\n").unwrap();
        ensure_non_empty_file(&missing).unwrap();

        assert!(ensure_non_empty_file(temp.path()).is_err());
    }

    #[test]
    fn copy_dir_recursive_merges_trees() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("pgm-5.2/pgm")).unwrap();
        std::fs::write(src.join("pgm-5.2/pgm/pgm.h"), b"/* pgm */").unwrap();
        let dest = temp.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("zmq.h"), b"/* zmq */").unwrap();

        copy_dir_recursive(&src, &dest).unwrap();

        assert!(dest.join("zmq.h").is_file());
        assert_eq!(
            std::fs::read_to_string(dest.join("pgm-5.2/pgm/pgm.h")).unwrap(),
            "/* pgm */"
        );
    }

    #[test]
    fn default_jobs_is_positive() {
        assert!(default_jobs() >= 1);
    }
}
