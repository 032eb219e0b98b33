//! The per-benchmark control plane: owns the counter and the dynamic worker pool,
//! and runs the runner lifecycle (`init`/`init_runner`/`run`/`done`) exactly once per
//! appropriate scope.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::task::JoinHandle;

use crate::{
    code::{Runner, SuiteState},
    counter::{Counter, CounterHandle},
    error::Error,
    fragment::CodeFragment,
};

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns one [`Counter`] and a dynamic pool of worker tasks executing a single
/// resolved runner.
///
/// Unlike a fixed-size worker spawn, a `Job` can grow and shrink at arbitrary points
/// via [`set_concurrency`], since both the CLI's `-c` and the
/// [`Squeezer`](crate::squeeze::Squeezer) need to resize a live benchmark rather than
/// spawn a fresh one per worker count.
pub struct Job {
    /// Display name of the resolved code fragment.
    pub name: String,
    runner: Arc<dyn Runner>,
    counter: Arc<Counter>,
    suite: SuiteState,
    workers: Vec<Worker>,
    stopped: bool,
}

impl Job {
    /// Constructs the job, evaluating `init` synchronously. No workers are started.
    ///
    /// Fails with [`Error::InitFailed`] if `init` raises; in that case no state is
    /// retained and nothing needs to be torn down.
    pub async fn start(fragment: &CodeFragment) -> Result<Self, Error> {
        let (name, runner) = fragment.resolve()?;
        let suite = runner.init().await.map_err(Error::InitFailed)?;
        tracing::debug!(job = %name, "init hook completed");
        Ok(Self { name, runner, counter: Arc::new(Counter::new()), suite, workers: Vec::new(), stopped: false })
    }

    /// Returns a shareable read-only handle to this job's counter.
    pub fn get_counter(&self) -> CounterHandle {
        CounterHandle::new(self.counter.clone())
    }

    /// Returns the number of currently live workers.
    pub fn concurrency(&self) -> u32 {
        self.workers.len() as u32
    }

    /// Transitions the live worker count to exactly `n`, spawning or retiring workers
    /// as needed, and returns only once the live count equals `n`.
    ///
    /// If any newly-spawned worker's `init_runner` hook fails, the error is returned
    /// as [`Error::WorkerInitFailed`] and the workers that did start successfully are
    /// left running (partial progress is not rolled back); the caller's live count
    /// will be below `n` and may retry.
    pub async fn set_concurrency(&mut self, n: u32) -> Result<(), Error> {
        let current = self.workers.len() as u32;
        if n > current {
            self.grow(n - current).await?;
        } else if n < current {
            self.shrink(current - n).await;
        }
        tracing::debug!(job = %self.name, concurrency = n, "concurrency set");
        Ok(())
    }

    async fn grow(&mut self, additional: u32) -> Result<(), Error> {
        for _ in 0..additional {
            let worker_id = self.workers.len() as u32;
            let stop = Arc::new(AtomicBool::new(false));

            let state = self
                .runner
                .init_runner(worker_id, &self.suite)
                .await
                .map_err(|source| Error::WorkerInitFailed { worker_id, source })?;

            let handle = spawn_worker(worker_id, self.runner.clone(), self.counter.clone(), stop.clone(), state);
            self.workers.push(Worker { stop, handle });
        }
        Ok(())
    }

    async fn shrink(&mut self, surplus: u32) {
        let split_at = self.workers.len() - surplus as usize;
        let retiring: Vec<Worker> = self.workers.split_off(split_at);
        for w in &retiring {
            w.stop.store(true, Ordering::Relaxed);
        }
        for w in retiring {
            let _ = w.handle.await;
        }
    }

    /// Transitions to zero workers, then evaluates `done` once, then releases
    /// resources. Idempotent: a second call is a no-op.
    pub async fn stop(&mut self) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.shrink(self.workers.len() as u32).await;
        self.runner.done(&self.suite).await.map_err(Error::Other)?;
        self.stopped = true;
        tracing::debug!(job = %self.name, "done hook completed");
        Ok(())
    }
}

fn spawn_worker(
    worker_id: u32,
    runner: Arc<dyn Runner>,
    counter: Arc<Counter>,
    stop: Arc<AtomicBool>,
    mut state: crate::code::WorkerState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match runner.run(worker_id, &mut state).await {
                Ok(()) => counter.increment(),
                Err(err) => {
                    // A worker that raises mid-loop dies silently as far as the
                    // benchmark's sampled rate goes, but the failure is observable
                    // via this log event. It is not restarted or treated as fatal.
                    tracing::warn!(worker_id, error = %err, "runner faulted; worker exiting");
                    break;
                }
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeSpec;

    fn noop_fragment() -> CodeFragment {
        CodeFragment::new(CodeSpec::parse("core:noop().").unwrap())
    }

    #[tokio::test]
    async fn set_concurrency_reaches_exact_count() {
        let mut job = Job::start(&noop_fragment()).await.unwrap();
        job.set_concurrency(4).await.unwrap();
        assert_eq!(job.concurrency(), 4);
        job.set_concurrency(1).await.unwrap();
        assert_eq!(job.concurrency(), 1);
        job.set_concurrency(0).await.unwrap();
        assert_eq!(job.concurrency(), 0);
        job.stop().await.unwrap();
    }

    #[tokio::test]
    async fn counter_advances_while_workers_run() {
        let mut job = Job::start(&noop_fragment()).await.unwrap();
        let counter = job.get_counter();
        job.set_concurrency(2).await.unwrap();
        // Give the workers a moment to run a few iterations.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(counter.get() > 0);
        job.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut job = Job::start(&noop_fragment()).await.unwrap();
        job.set_concurrency(2).await.unwrap();
        job.stop().await.unwrap();
        job.stop().await.unwrap();
        assert_eq!(job.concurrency(), 0);
    }

    #[tokio::test]
    async fn init_runs_exactly_once() {
        let fragment = CodeFragment {
            name: None,
            runner: CodeSpec::parse("group:join_leave(\"test-job-init-once\").").unwrap(),
            init: Some(CodeSpec::parse("group:create(\"test-job-init-once\").").unwrap()),
            init_runner: None,
            done: Some(CodeSpec::parse("group:delete(\"test-job-init-once\").").unwrap()),
        };
        use crate::registry::GROUP_CREATE_CALLS;
        use std::sync::atomic::Ordering as AtomicOrdering;
        let before = GROUP_CREATE_CALLS.load(AtomicOrdering::Relaxed);

        let mut job = Job::start(&fragment).await.unwrap();
        job.set_concurrency(3).await.unwrap();
        job.stop().await.unwrap();

        assert_eq!(GROUP_CREATE_CALLS.load(AtomicOrdering::Relaxed), before + 1);
    }
}
