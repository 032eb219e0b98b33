//! A code fragment: a main runner body plus its optional attached hooks.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    code::{CodeSpec, Runner, SuiteState, WorkerState, execute_once},
    error::Error,
};

/// A runner body together with the hooks attached to it via `--init`, `--init_runner`,
/// and `--done`. Only `runner` is required.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CodeFragment {
    /// Display name, defaulting to the runner's own resolved name.
    pub name: Option<String>,
    /// The required `runner` body.
    pub runner: CodeSpec,
    /// The optional `init` hook.
    pub init: Option<CodeSpec>,
    /// The optional `init_runner` hook.
    pub init_runner: Option<CodeSpec>,
    /// The optional `done` hook.
    pub done: Option<CodeSpec>,
}

impl CodeFragment {
    /// Creates a fragment with only a runner body and no hooks.
    pub fn new(runner: CodeSpec) -> Self {
        Self { name: None, runner, init: None, init_runner: None, done: None }
    }

    /// Resolves every `CodeSpec` in this fragment against the built-in registry,
    /// producing a single composite [`Runner`] and its display name.
    pub(crate) fn resolve(&self) -> Result<(String, Arc<dyn Runner>), Error> {
        let (runner_name, run_impl) = self.runner.resolve()?;
        let init_impl = self.init.as_ref().map(CodeSpec::resolve).transpose()?.map(|(_, r)| r);
        let init_runner_impl = self.init_runner.as_ref().map(CodeSpec::resolve).transpose()?.map(|(_, r)| r);
        let done_impl = self.done.as_ref().map(CodeSpec::resolve).transpose()?.map(|(_, r)| r);

        let name = self.name.clone().unwrap_or(runner_name);
        let composite = CompositeRunner { run_impl, init_impl, init_runner_impl, done_impl };
        Ok((name, Arc::new(composite)))
    }
}

/// A [`Runner`] assembled from a main runner body and independently-resolved hooks.
///
/// An attached hook's entire one-shot lifecycle is executed exactly once in its slot
/// (see [`execute_once`]); the main body's own `init`/`init_runner`/`done` still run
/// around the hot `run` loop, so a workload that needs suite/worker state for its
/// `run` method (e.g. `group:join_leave`) keeps that state even when a hook is also
/// attached.
struct CompositeRunner {
    run_impl: Arc<dyn Runner>,
    init_impl: Option<Arc<dyn Runner>>,
    init_runner_impl: Option<Arc<dyn Runner>>,
    done_impl: Option<Arc<dyn Runner>>,
}

#[async_trait]
impl Runner for CompositeRunner {
    async fn init(&self) -> anyhow::Result<SuiteState> {
        let suite = self.run_impl.init().await?;
        if let Some(hook) = &self.init_impl {
            execute_once(hook.as_ref()).await?;
        }
        Ok(suite)
    }

    async fn init_runner(&self, worker_id: u32, suite: &SuiteState) -> anyhow::Result<WorkerState> {
        if let Some(hook) = &self.init_runner_impl {
            let hook_suite = hook.init().await?;
            let mut hook_state = hook.init_runner(worker_id, &hook_suite).await?;
            hook.run(worker_id, &mut hook_state).await?;
        }
        self.run_impl.init_runner(worker_id, suite).await
    }

    async fn run(&self, worker_id: u32, state: &mut WorkerState) -> anyhow::Result<()> {
        self.run_impl.run(worker_id, state).await
    }

    async fn done(&self, suite: &SuiteState) -> anyhow::Result<()> {
        self.run_impl.done(suite).await?;
        if let Some(hook) = &self.done_impl {
            execute_once(hook.as_ref()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        code::CodeSpec,
        registry::{GROUP_CREATE_CALLS, GROUP_DELETE_CALLS, group_members},
    };
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn hooks_run_exactly_once_around_the_main_loop() {
        let group = "test-fragment-hooks";
        let before_create = GROUP_CREATE_CALLS.load(Ordering::Relaxed);
        let before_delete = GROUP_DELETE_CALLS.load(Ordering::Relaxed);

        let fragment = CodeFragment {
            name: None,
            runner: CodeSpec::parse(&format!("group:join_leave(\"{group}\").")).unwrap(),
            init: Some(CodeSpec::parse(&format!("group:create(\"{group}\").")).unwrap()),
            init_runner: None,
            done: Some(CodeSpec::parse(&format!("group:delete(\"{group}\").")).unwrap()),
        };

        let (_, runner) = fragment.resolve().unwrap();
        let suite = runner.init().await.unwrap();
        let mut w0 = runner.init_runner(0, &suite).await.unwrap();
        runner.run(0, &mut w0).await.unwrap();
        runner.run(0, &mut w0).await.unwrap();
        assert_eq!(group_members(group), Some(1));
        runner.done(&suite).await.unwrap();

        assert_eq!(GROUP_CREATE_CALLS.load(Ordering::Relaxed), before_create + 1);
        assert_eq!(GROUP_DELETE_CALLS.load(Ordering::Relaxed), before_delete + 1);
        assert_eq!(group_members(group), None);
    }
}
