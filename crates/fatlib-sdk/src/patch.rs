//! In-place textual patches for upstream sources.
//!
//! Upstream autotools projects need a few lines changed before they
//! cross-compile for Apple devices. Each [`Patch`] targets one file relative to
//! the source root and is applied to a freshly extracted tree; applying a
//! patch twice is not guarded against.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::BuildError;

/// What to do when a patch changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchPolicy {
    /// A no-op patch is an error.
    #[default]
    Strict,
    /// A no-op patch is logged as a warning and skipped.
    Lenient,
}

/// A single textual edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PatchKind {
    /// Comment out every line that starts with `name`.
    DisableMacro {
        name: String,
        #[serde(default = "default_marker")]
        marker: String,
    },
    /// Comment out lines `first..=last` (1-based).
    CommentLines {
        first: usize,
        last: usize,
        #[serde(default = "default_marker")]
        marker: String,
    },
    /// Replace a preprocessor guard line (`#if ...`, `#define ...`).
    ReplaceGuard { from: String, to: String },
    /// Replace every occurrence of a literal.
    ReplaceText { from: String, to: String },
}

fn default_marker() -> String {
    "#".to_string()
}

/// A patch bound to its target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Path relative to the library's source root.
    pub file: PathBuf,
    #[serde(flatten)]
    pub kind: PatchKind,
}

/// Outcome of applying one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    Skipped,
}

impl Patch {
    pub fn disable_macro(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: PatchKind::DisableMacro {
                name: name.into(),
                marker: default_marker(),
            },
        }
    }

    pub fn comment_lines(
        file: impl Into<PathBuf>,
        first: usize,
        last: usize,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            kind: PatchKind::CommentLines {
                first,
                last,
                marker: marker.into(),
            },
        }
    }

    pub fn replace_guard(
        file: impl Into<PathBuf>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            kind: PatchKind::ReplaceGuard {
                from: from.into(),
                to: to.into(),
            },
        }
    }

    pub fn replace_text(
        file: impl Into<PathBuf>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            kind: PatchKind::ReplaceText {
                from: from.into(),
                to: to.into(),
            },
        }
    }

    /// Short description used in logs and errors.
    pub fn describe(&self) -> String {
        match &self.kind {
            PatchKind::DisableMacro { name, .. } => format!("disable {}", name),
            PatchKind::CommentLines { first, last, .. } => {
                format!("comment out lines {}-{}", first, last)
            }
            PatchKind::ReplaceGuard { from, to } => {
                format!("replace guard '{}' with '{}'", from, to)
            }
            PatchKind::ReplaceText { from, to } => format!("replace '{}' with '{}'", from, to),
        }
    }

    /// Applies the edit to `content`, returning `None` if nothing changed.
    pub fn apply_to_str(&self, content: &str) -> Option<String> {
        let patched = match &self.kind {
            PatchKind::DisableMacro { name, marker } => map_lines(content, |_, line| {
                let trimmed = line.trim_start();
                if trimmed.starts_with(name.as_str()) {
                    Some(format!("{}{}", marker, line))
                } else {
                    None
                }
            }),
            PatchKind::CommentLines { first, last, marker } => {
                if *first == 0 || first > last || *last > content.lines().count() {
                    return None;
                }
                map_lines(content, |number, line| {
                    (*first..=*last)
                        .contains(&number)
                        .then(|| format!("{}{}", marker, line))
                })
            }
            PatchKind::ReplaceGuard { from, to } | PatchKind::ReplaceText { from, to } => {
                if from.is_empty() || !content.contains(from.as_str()) {
                    return None;
                }
                content.replace(from.as_str(), to)
            }
        };

        (patched != content).then_some(patched)
    }

    /// Applies the patch to its file under `root`.
    ///
    /// # Errors
    ///
    /// [`BuildError::Io`] if the file cannot be read or written, and
    /// [`BuildError::Patch`] if the patch matched nothing under
    /// [`PatchPolicy::Strict`].
    pub fn apply(&self, root: &Path, policy: PatchPolicy) -> Result<PatchOutcome, BuildError> {
        let path = root.join(&self.file);
        let content = fs::read_to_string(&path).map_err(|e| {
            BuildError::Io(std::io::Error::new(
                e.kind(),
                format!("reading {} for patching: {}", path.display(), e),
            ))
        })?;

        match self.apply_to_str(&content) {
            Some(patched) => {
                fs::write(&path, patched)?;
                log::debug!("Patched {}: {}", self.file.display(), self.describe());
                Ok(PatchOutcome::Applied)
            }
            None => match policy {
                PatchPolicy::Strict => Err(BuildError::Patch {
                    file: path,
                    description: self.describe(),
                }),
                PatchPolicy::Lenient => {
                    log::warn!(
                        "Patch '{}' matched nothing in {}; continuing",
                        self.describe(),
                        self.file.display()
                    );
                    Ok(PatchOutcome::Skipped)
                }
            },
        }
    }
}

/// Applies patches in order, stopping at the first error.
pub fn apply_all(patches: &[Patch], root: &Path, policy: PatchPolicy) -> Result<usize, BuildError> {
    let mut applied = 0;
    for patch in patches {
        if patch.apply(root, policy)? == PatchOutcome::Applied {
            applied += 1;
        }
    }
    Ok(applied)
}

/// Rewrites lines for which `f(line_number, line)` returns a replacement,
/// preserving the original line endings.
fn map_lines<F>(content: &str, mut f: F) -> String
where
    F: FnMut(usize, &str) -> Option<String>,
{
    let mut out = String::with_capacity(content.len() + 64);
    for (index, raw) in content.split_inclusive('\n').enumerate() {
        let (line, ending) = match raw.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (raw, ""),
        };
        match f(index + 1, line) {
            Some(replacement) => {
                out.push_str(&replacement);
                out.push_str(ending);
            }
            None => out.push_str(raw),
        }
    }
    out
}
