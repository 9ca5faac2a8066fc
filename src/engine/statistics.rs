use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use console::style;
use serde::{Serialize, Serializer};

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Accumulated time spent in one kind of stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTotal {
    pub count: usize,
    #[serde(rename = "millis", serialize_with = "as_millis")]
    pub total: Duration,
}

/// Per-stage timing totals, shared by every action of a build.
#[derive(Debug, Default)]
pub struct Statistics {
    entries: Mutex<BTreeMap<String, StageTotal>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: &str, elapsed: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(stage.to_owned()).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    /// Runs `f` and records how long it took under `stage`.
    pub fn time<T>(&self, stage: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = f();
        self.record(stage, start.elapsed());
        value
    }

    pub fn snapshot(&self) -> BTreeMap<String, StageTotal> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Time summed over all stages. With several workers this exceeds the
    /// wall clock time of the build.
    pub fn total(&self) -> Duration {
        self.snapshot().values().map(|stage| stage.total).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (stage, total) in self.snapshot() {
            writeln!(
                f,
                "{:>10} {:>4}x {:.2?}",
                style(&stage).cyan(),
                total.count,
                total.total
            )?;
        }
        Ok(())
    }
}
