//! Test doubles for driving builders and the pipeline without Xcode.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::exec::{CommandRunner, CommandSpec};
use crate::recipes::LibraryRecipe;
use crate::source::SourceFetcher;
use crate::types::BuildError;

type Predicate = Box<dyn Fn(&CommandSpec) -> bool>;

/// Records every command and simulates the file effects of the ones the
/// builders depend on: `configure` remembers `--prefix`, `make install`
/// writes the configured static libraries and a header, `lipo -create`
/// writes its output.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: RefCell<Vec<CommandSpec>>,
    outputs: HashMap<String, String>,
    installs: Vec<(String, String)>,
    fail_when: Option<Predicate>,
    prefix: RefCell<Option<PathBuf>>,
}

impl RecordingRunner {
    /// Canned stdout for `capture` calls of `program`.
    pub(crate) fn with_output(mut self, program: &str, stdout: &str) -> Self {
        self.outputs.insert(program.to_string(), stdout.to_string());
        self
    }

    /// Canned `xcodebuild -showsdks` / `xcode-select` output.
    pub(crate) fn with_sdks(self, showsdks: &str) -> Self {
        self.with_output("xcodebuild", showsdks)
            .with_output(
                "xcode-select",
                "/Applications/Xcode.app/Contents/Developer\n",
            )
    }

    /// `make install` in a directory containing `dir_needle` installs `lib_file`.
    pub(crate) fn installing(mut self, dir_needle: &str, lib_file: &str) -> Self {
        self.installs.push((dir_needle.to_string(), lib_file.to_string()));
        self
    }

    pub(crate) fn failing_when(
        mut self,
        predicate: impl Fn(&CommandSpec) -> bool + 'static,
    ) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Recorded commands whose program file name is `name`.
    pub(crate) fn calls_to(&self, name: &str) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program_name() == name)
            .cloned()
            .collect()
    }

    fn simulate(&self, cmd: &CommandSpec) -> std::io::Result<()> {
        match cmd.program_name().as_str() {
            "configure" => {
                let prefix = cmd
                    .args
                    .iter()
                    .filter_map(|a| a.to_str())
                    .find_map(|a| a.strip_prefix("--prefix="))
                    .map(PathBuf::from);
                *self.prefix.borrow_mut() = prefix;
            }
            "make" if cmd.has_arg("install") => {
                let prefix = self.prefix.borrow().clone();
                let cwd = cmd.cwd.clone().unwrap_or_default();
                if let Some(prefix) = prefix {
                    for (needle, lib) in &self.installs {
                        if cwd.to_string_lossy().contains(needle.as_str()) {
                            std::fs::create_dir_all(prefix.join("lib"))?;
                            std::fs::write(prefix.join("lib").join(lib), b"!<arch>\n")?;
                            let include = prefix.join("include");
                            std::fs::create_dir_all(&include)?;
                            std::fs::write(include.join(format!("{}.h", needle)), b"/* header */")?;
                        }
                    }
                }
            }
            "lipo" if cmd.has_arg("-create") => {
                let args: Vec<PathBuf> = cmd.args.iter().map(PathBuf::from).collect();
                if let Some(pos) = cmd.args.iter().position(|a| a == "-output") {
                    let mut merged = Vec::new();
                    for input in &args[1..pos] {
                        merged.extend(std::fs::read(input)?);
                    }
                    std::fs::write(&args[pos + 1], merged)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<(), BuildError> {
        self.calls.borrow_mut().push(cmd.clone());
        if self.fail_when.as_ref().is_some_and(|f| f(cmd)) {
            return Err(BuildError::Command(format!(
                "{} failed.\n\nCommand: {}\nExit status: exit status: 1",
                cmd.description, cmd
            )));
        }
        self.simulate(cmd)?;
        Ok(())
    }

    fn capture(&self, cmd: &CommandSpec) -> Result<String, BuildError> {
        self.calls.borrow_mut().push(cmd.clone());
        self.outputs
            .get(&cmd.program_name())
            .cloned()
            .ok_or_else(|| BuildError::Toolchain(format!("Failed to start {}", cmd.description)))
    }
}

/// Writes a fixed set of files as the "downloaded" source tree.
#[derive(Default)]
pub(crate) struct FixtureFetcher {
    files: Vec<(String, PathBuf, String)>,
    fetched: RefCell<Vec<String>>,
}

impl FixtureFetcher {
    /// Adds `content` at `path` (relative to the source root) for `library`.
    pub(crate) fn with_file(
        mut self,
        library: &str,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Self {
        self.files.push((
            library.to_string(),
            path.as_ref().to_path_buf(),
            content.to_string(),
        ));
        self
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl SourceFetcher for FixtureFetcher {
    fn fetch(
        &self,
        recipe: &LibraryRecipe,
        src_root: &Path,
        _runner: &dyn CommandRunner,
    ) -> Result<PathBuf, BuildError> {
        let dest = src_root.join(&recipe.name);
        crate::builders::common::reset_dir(&dest)?;
        for (library, path, content) in &self.files {
            if library == &recipe.name {
                let file = dest.join(path);
                if let Some(parent) = file.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(file, content)?;
            }
        }
        self.fetched.borrow_mut().push(recipe.name.clone());
        Ok(dest)
    }
}

/// Lists the files under `dir`, relative to it, sorted.
pub(crate) fn list_tree(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), BuildError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    if dir.is_dir() {
        walk(dir, dir, &mut out)?;
    }
    out.sort();
    Ok(out)
}
