use camino::{Utf8Path, Utf8PathBuf};

use crate::package::{Package, Scope};

/// How much the orchestrator reports while it works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Logging configuration handed to the resolver, builder and executors.
///
/// Events go through `tracing`; the level here decides which of them the
/// orchestrator bothers to emit at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Errors only.
    pub fn quiet() -> Self {
        Self::new(LogLevel::Error)
    }

    pub fn verbose() -> Self {
        Self::new(LogLevel::Debug)
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    /// Installs a global `fmt` subscriber filtered at this level, unless
    /// `RUST_LOG` says otherwise.
    #[cfg(feature = "logging")]
    pub fn init(&self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| format!("kiln={}", self.level.as_str()).into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
}

/// Operating system and architecture pair that artifacts are built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn host() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Directory name under which installed archives for this target live.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.os, self.arch)
    }
}

/// Build settings shared by every stage of one build.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scratch directory for objects and uninstalled archives.
    pub workdir: Utf8PathBuf,
    /// Root of the installed package cache.
    pub pkgdir: Utf8PathBuf,
    pub bindir: Utf8PathBuf,
    pub host: Target,
    pub target: Target,
    /// Rebuild everything regardless of timestamps.
    pub force: bool,
    /// Copy built archives into the package cache.
    pub install: bool,
    pub gcflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub log: LogConfig,
}

impl Config {
    /// Defaults rooted at a project directory: `pkg/` for installed
    /// archives, `bin/` for executables, `.kiln/` as the work directory.
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        let root = root.as_ref();
        Self {
            workdir: root.join(".kiln"),
            pkgdir: root.join("pkg"),
            bindir: root.join("bin"),
            host: Target::host(),
            target: Target::host(),
            force: false,
            install: true,
            gcflags: Vec::new(),
            ldflags: Vec::new(),
            log: LogConfig::default(),
        }
    }

    pub fn workdir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    pub fn gcflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gcflags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn ldflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ldflags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    fn scope_dir(&self, scope: Scope) -> Utf8PathBuf {
        match scope {
            Scope::Build => self.workdir.clone(),
            Scope::Test => self.workdir.join("_test"),
        }
    }

    /// Directory holding intermediate objects of `pkg`.
    pub fn objdir(&self, pkg: &Package) -> Utf8PathBuf {
        self.scope_dir(pkg.scope).join(&pkg.path).join("_obj")
    }

    /// The archive produced by compiling `pkg`, before installation.
    pub fn objfile(&self, pkg: &Package) -> Utf8PathBuf {
        self.scope_dir(pkg.scope).join(format!("{}.a", pkg.path))
    }

    /// Where the archive of `pkg` lives in the package cache.
    pub fn installpath(&self, pkg: &Package) -> Utf8PathBuf {
        self.pkgdir
            .join(self.target.dir_name())
            .join(format!("{}.a", pkg.path))
    }

    /// The executable linked from a command package.
    pub fn binfile(&self, pkg: &Package) -> Utf8PathBuf {
        match pkg.scope {
            Scope::Test => self.objdir(pkg).join(format!("{}.test", pkg.base_name())),
            Scope::Build if self.target != self.host => self
                .bindir
                .join(self.target.dir_name())
                .join(pkg.base_name()),
            Scope::Build => self.bindir.join(pkg.base_name()),
        }
    }

    /// Directories searched for dependency archives.
    pub fn includes(&self) -> Vec<Utf8PathBuf> {
        vec![
            self.workdir.clone(),
            self.pkgdir.join(self.target.dir_name()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Metadata;

    fn package(path: &str, scope: Scope) -> Package {
        Package::new(path, scope, Metadata::default(), vec![], false)
    }

    #[test]
    fn artifact_paths_follow_scope_and_target() {
        let config = Config::new("/proj").target(Target::new("linux", "amd64"));
        let pkg = package("github.com/x/tool", Scope::Build);

        assert_eq!(config.objfile(&pkg), "/proj/.kiln/github.com/x/tool.a");
        assert_eq!(
            config.installpath(&pkg),
            "/proj/pkg/linux_amd64/github.com/x/tool.a"
        );
        assert_eq!(config.objdir(&pkg), "/proj/.kiln/github.com/x/tool/_obj");

        let test = package("github.com/x/tool", Scope::Test);
        assert_eq!(config.objfile(&test), "/proj/.kiln/_test/github.com/x/tool.a");
        assert_eq!(
            config.binfile(&test),
            "/proj/.kiln/_test/github.com/x/tool/_obj/tool.test"
        );
    }

    #[test]
    fn cross_compiled_binaries_carry_the_target() {
        let mut config = Config::new("/proj");
        config.host = Target::new("linux", "amd64");
        config.target = Target::new("linux", "amd64");

        let pkg = package("cmd/tool", Scope::Build);
        assert_eq!(config.binfile(&pkg), "/proj/bin/tool");

        let config = config.target(Target::new("windows", "arm64"));
        assert_eq!(config.binfile(&pkg), "/proj/bin/windows_arm64/tool");
    }

    #[test]
    fn log_levels_are_ordered() {
        let quiet = LogConfig::quiet();
        assert!(quiet.enabled(LogLevel::Error));
        assert!(!quiet.enabled(LogLevel::Info));

        let verbose = LogConfig::verbose();
        assert!(verbose.enabled(LogLevel::Debug));
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    }
}
