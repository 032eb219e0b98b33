//! Loading and replaying pre-recorded call traces.
//!
//! This module implements only the narrow contract the core touches: deserializing a
//! trace file into a [`Runner`] that replays its entries in order.
use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    code::{Arg, Runner, WorkerState},
    error::Error,
    registry,
};

/// One recorded `(module, function, args)` call.
#[derive(Debug, Clone, Deserialize)]
pub struct Call {
    module: String,
    function: String,
    #[serde(default)]
    args: Vec<Arg>,
}

/// Reads a trace file (a JSON array of [`Call`]s) from disk.
pub(crate) fn load(path: &Path) -> Result<TraceRunner, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::ArgParseError(format!("cannot read trace file `{}`: {e}", path.display())))?;
    let calls: Vec<Call> = serde_json::from_str(&text)
        .map_err(|e| Error::ArgParseError(format!("invalid trace file `{}`: {e}", path.display())))?;
    if calls.is_empty() {
        return Err(Error::ArgParseError(format!("trace file `{}` has no recorded calls", path.display())));
    }

    let mut runners = Vec::with_capacity(calls.len());
    for call in &calls {
        runners.push(registry::lookup(&call.module, &call.function, &call.args)?);
    }

    Ok(TraceRunner { runners, cursor: AtomicUsize::new(0) })
}

/// Replays a fixed sequence of recorded calls in a round-robin loop.
///
/// Each worker shares one `cursor`, so a trace's calls are distributed — not
/// duplicated — across the concurrency level, matching the "replayed in order"
/// requirement from a single logical sequence under concurrent workers.
pub(crate) struct TraceRunner {
    runners: Vec<std::sync::Arc<dyn Runner>>,
    cursor: AtomicUsize,
}

#[async_trait]
impl Runner for TraceRunner {
    async fn run(&self, worker_id: u32, state: &mut WorkerState) -> anyhow::Result<()> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.runners.len();
        self.runners[idx].run(worker_id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    /// Writes `contents` to a process-unique temp file and returns its path; the
    /// caller is responsible for the file living long enough to be read.
    fn write_temp_json(contents: &str) -> std::path::PathBuf {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let n = SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        let path = std::env::temp_dir().join(format!("squeeze-bench-trace-test-{}-{n}.json", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn replays_recorded_calls_round_robin() {
        let path = write_temp_json(
            r#"[{"module":"core","function":"sleep","args":[0]},{"module":"rand","function":"u64"}]"#,
        );
        let runner = load(&path).unwrap();
        let mut state: WorkerState = Box::new(());
        // Two invocations should round-trip through both recorded calls without error.
        runner.run(0, &mut state).await.unwrap();
        runner.run(0, &mut state).await.unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_trace_is_rejected() {
        let path = write_temp_json("[]");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::ArgParseError(_)));
        std::fs::remove_file(&path).ok();
    }
}
