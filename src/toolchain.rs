//! The seam between the orchestrator and the external compiler binaries.
//!
//! The orchestrator never builds command lines itself. Every leaf action calls
//! into a [`Toolchain`], which is expected to run synchronously and report
//! failure through a [`ToolError`] carrying enough context to reproduce the
//! invocation by hand.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::package::Package;

/// A failed tool invocation.
#[derive(Debug, Error)]
#[error("{} {}: {}\n{}", .program, .args.join(" "), .reason, .output.trim_end())]
pub struct ToolError {
    pub program: String,
    pub args: Vec<String>,
    /// Exit status or spawn failure.
    pub reason: String,
    /// Combined stdout and stderr of the tool.
    pub output: String,
}

impl ToolError {
    pub fn new(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            reason: reason.into(),
            output: String::new(),
        }
    }
}

/// Inputs of a single package compilation.
#[derive(Debug)]
pub struct Compile<'a> {
    pub package: &'a Package,
    /// Source files, already joined with the package directory.
    pub files: &'a [Utf8PathBuf],
    /// Directories searched for the archives of dependencies.
    pub includes: &'a [Utf8PathBuf],
    pub output: &'a Utf8Path,
    pub flags: &'a [String],
    /// Set when nothing else will be packed into the archive afterwards.
    pub complete: bool,
}

/// Inputs of linking a command package into an executable.
#[derive(Debug)]
pub struct Link<'a> {
    pub package: &'a Package,
    pub archive: &'a Utf8Path,
    pub includes: &'a [Utf8PathBuf],
    pub output: &'a Utf8Path,
    pub flags: &'a [String],
}

/// Files produced by the foreign-call preprocessor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgoOutput {
    /// Generated sources to be compiled together with the package.
    pub go_files: Vec<Utf8PathBuf>,
    /// Objects to be packed into the package archive.
    pub objects: Vec<Utf8PathBuf>,
}

pub trait Toolchain: Send + Sync {
    /// Path of the compiler binary, consulted by staleness checks.
    fn compiler(&self) -> &Utf8Path;

    /// Path of the linker binary, consulted by staleness checks.
    fn linker(&self) -> &Utf8Path;

    fn compile(&self, job: &Compile<'_>) -> Result<(), ToolError>;

    fn assemble(
        &self,
        package: &Package,
        source: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), ToolError>;

    /// Appends `objects` to the archive at `archive`.
    fn pack(
        &self,
        package: &Package,
        objects: &[Utf8PathBuf],
        archive: &Utf8Path,
    ) -> Result<(), ToolError>;

    fn link(&self, job: &Link<'_>) -> Result<(), ToolError>;

    fn cgo(&self, package: &Package, objdir: &Utf8Path) -> Result<CgoOutput, ToolError> {
        let _ = objdir;
        Err(ToolError::new(
            "cgo",
            format!("package \"{}\" needs cgo, which this toolchain does not support", package.path),
        ))
    }
}

/// Runs `command` to completion and returns its combined output.
///
/// A non-zero exit status becomes a [`ToolError`] holding the program, its
/// arguments and everything the tool printed.
pub fn run(command: &mut Command) -> Result<String, ToolError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let args: Vec<String> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::debug!(program = %program, args = ?args, "running tool");

    let output = match command.output() {
        Ok(output) => output,
        Err(err) => {
            return Err(ToolError {
                program,
                args,
                reason: err.to_string(),
                output: String::new(),
            });
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(ToolError {
            program,
            args,
            reason: output.status.to_string(),
            output: text,
        })
    }
}
