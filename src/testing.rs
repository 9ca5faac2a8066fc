//! Fixtures shared by the unit tests: a scratch project directory and a
//! toolchain that records what it was asked to do.

use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;
use tempfile::TempDir;

use crate::core::Config;
use crate::package::{Metadata, Package};
use crate::toolchain::{CgoOutput, Compile, Link, ToolError, Toolchain};
use crate::Context;

pub(crate) fn touch(path: &Utf8Path, secs: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    if !path.exists() {
        fs::write(path, b"").unwrap();
    }
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn write(path: &Utf8Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ToolError::new("fake", err.to_string()))?;
    }
    fs::write(path, b"artifact").map_err(|err| ToolError::new("fake", err.to_string()))
}

/// Records every invocation as `"<stage> <import path>"` and writes the
/// expected output files. Invocations listed in `failing` fail instead.
pub(crate) struct FakeToolchain {
    compiler: Utf8PathBuf,
    linker: Utf8PathBuf,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeToolchain {
    pub(crate) fn new(root: &Utf8Path) -> Self {
        Self {
            compiler: root.join("tool/compile"),
            linker: root.join("tool/link"),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn fail_on(&self, call: &str) {
        self.failing.lock().unwrap().insert(call.to_owned());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push(call.clone());
        if self.failing.lock().unwrap().contains(&call) {
            return Err(ToolError {
                program: "fake".into(),
                args: vec![call],
                reason: "exit status: 1".into(),
                output: "fake failure".into(),
            });
        }
        Ok(())
    }
}

impl Toolchain for FakeToolchain {
    fn compiler(&self) -> &Utf8Path {
        &self.compiler
    }

    fn linker(&self) -> &Utf8Path {
        &self.linker
    }

    fn compile(&self, job: &Compile<'_>) -> Result<(), ToolError> {
        self.record(format!("compile {}", job.package.path))?;
        write(job.output)
    }

    fn assemble(
        &self,
        package: &Package,
        source: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), ToolError> {
        self.record(format!(
            "asm {}/{}",
            package.path,
            source.file_name().unwrap_or_default()
        ))?;
        write(output)
    }

    fn pack(
        &self,
        package: &Package,
        _: &[Utf8PathBuf],
        archive: &Utf8Path,
    ) -> Result<(), ToolError> {
        self.record(format!("pack {}", package.path))?;
        write(archive)
    }

    fn link(&self, job: &Link<'_>) -> Result<(), ToolError> {
        self.record(format!("link {}", job.package.path))?;
        write(job.output)
    }

    fn cgo(&self, package: &Package, objdir: &Utf8Path) -> Result<CgoOutput, ToolError> {
        self.record(format!("cgo {}", package.path))?;
        let output = CgoOutput {
            go_files: vec![objdir.join("_cgo_gotypes.go")],
            objects: vec![objdir.join("_cgo_.o")],
        };
        for file in output.go_files.iter().chain(&output.objects) {
            write(file)?;
        }
        Ok(output)
    }
}

/// A temporary project directory with a fake toolchain whose binaries are
/// older than anything the tests create.
pub(crate) struct Workspace {
    _dir: TempDir,
    pub(crate) root: Utf8PathBuf,
    pub(crate) toolchain: Arc<FakeToolchain>,
}

impl Workspace {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let toolchain = Arc::new(FakeToolchain::new(&root));
        touch(toolchain.compiler(), 10);
        touch(toolchain.linker(), 10);

        Self {
            _dir: dir,
            root,
            toolchain,
        }
    }

    pub(crate) fn config(&self) -> Config {
        Config::new(&self.root)
    }

    pub(crate) fn context(&self, config: Config) -> Context {
        Context::new(config, self.toolchain.clone())
    }

    /// Metadata for `path` with its directory under `src/`.
    pub(crate) fn meta(&self, path: &str) -> Metadata {
        let name = path.rsplit('/').next().unwrap_or(path);
        Metadata::new(name, self.root.join("src").join(path))
    }

    pub(crate) fn write_sources(&self, meta: &Metadata, secs: i64) {
        for file in meta.files.all() {
            touch(&meta.dir.join(file), secs);
        }
    }

    pub(crate) fn touch(&self, path: &Utf8Path, secs: i64) {
        touch(path, secs);
    }
}
