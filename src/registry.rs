//! The closed registry of built-in named workloads.
//!
//! Every code fragment resolves, by `(module, function)` name, to one of these: rather
//! than embed a scripting runtime, a fixed set of workloads is shipped and addressed
//! by name, the same way a structured `{module, function, args}` triple already does.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, LazyLock, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::RngCore;

use crate::{
    code::{Arg, Runner, SuiteState, WorkerState},
    error::Error,
};

/// Looks up a built-in workload by `(module, function)` name and constructs it with
/// the given literal arguments.
///
/// Returns `Error::ArgParseError` if the name is unknown or the arguments don't match
/// what the workload expects.
pub(crate) fn lookup(module: &str, function: &str, args: &[Arg]) -> Result<Arc<dyn Runner>, Error> {
    match (module, function) {
        ("core", "noop") => Ok(Arc::new(Noop)),
        ("core", "sleep") => {
            let millis = args.first().and_then(Arg::as_int).unwrap_or(0).max(0) as u64;
            Ok(Arc::new(Sleep { duration: Duration::from_millis(millis) }))
        }
        ("rand", "u64") => Ok(Arc::new(RandU64)),
        ("rand", "bytes") => {
            let len = args.first().and_then(Arg::as_int).unwrap_or(16).max(0) as usize;
            Ok(Arc::new(RandBytes { len }))
        }
        ("group", "create") => Ok(Arc::new(GroupCreate { name: group_name(args)? })),
        ("group", "delete") => Ok(Arc::new(GroupDelete { name: group_name(args)? })),
        ("group", "join_leave") => Ok(Arc::new(GroupJoinLeave { name: group_name(args)? })),
        _ => Err(Error::ArgParseError(format!("unknown built-in workload `{module}:{function}`"))),
    }
}

fn group_name(args: &[Arg]) -> Result<String, Error> {
    args.first()
        .map(|a| a.to_string())
        .ok_or_else(|| Error::ArgParseError("group workload requires a name argument".into()))
}

/// A runner that does nothing but count invocations. Useful as a pure scheduler/
/// contention probe: its per-invocation cost is as close to zero as this harness can
/// produce, so a squeeze search against it traces the overhead of the Job/worker
/// machinery itself rather than of any user workload.
struct Noop;

#[async_trait]
impl Runner for Noop {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        Ok(())
    }
}

/// `core:sleep(millis)` — async-sleeps for a fixed duration per invocation.
struct Sleep {
    duration: Duration,
}

#[async_trait]
impl Runner for Sleep {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// `rand:u64()` — generates one random `u64` per invocation.
struct RandU64;

#[async_trait]
impl Runner for RandU64 {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        let _ = rand::rng().next_u64();
        Ok(())
    }
}

/// `rand:bytes(n)` — fills an `n`-byte buffer with randomness per invocation.
struct RandBytes {
    len: usize,
}

#[async_trait]
impl Runner for RandBytes {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.len];
        rand::rng().fill_bytes(&mut buf);
        Ok(())
    }
}

/// Process-wide table of named groups, modeling the original tool's `pg`-style group
/// primitive used by the `group:*` built-ins. Backing a `Mutex<HashMap<..>>` keeps
/// group membership visible across every `Job` in a comparison run.
static GROUPS: LazyLock<Mutex<HashMap<String, HashSet<u32>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Counts `group:create`/`group:delete` invocations, so tests can verify "create
/// observed once, delete observed once" for a hook-paired fragment without reaching
/// into process-external state.
pub static GROUP_CREATE_CALLS: AtomicU64 = AtomicU64::new(0);
pub static GROUP_DELETE_CALLS: AtomicU64 = AtomicU64::new(0);

/// Returns the current member count of a named group, or `None` if it doesn't exist.
pub fn group_members(name: &str) -> Option<usize> {
    GROUPS.lock().unwrap().get(name).map(|members| members.len())
}

/// `group:create(name)` — idempotently creates a named group. Cheap enough to be
/// squeezed for a saturation search, and usable as an `--init N CODE` hook.
struct GroupCreate {
    name: String,
}

#[async_trait]
impl Runner for GroupCreate {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        GROUP_CREATE_CALLS.fetch_add(1, Ordering::Relaxed);
        GROUPS.lock().unwrap().entry(self.name.clone()).or_default();
        Ok(())
    }
}

/// `group:delete(name)` — removes a named group. Typically attached as a `--done N
/// CODE` hook paired with `group:create`.
struct GroupDelete {
    name: String,
}

#[async_trait]
impl Runner for GroupDelete {
    async fn run(&self, _worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        GROUP_DELETE_CALLS.fetch_add(1, Ordering::Relaxed);
        GROUPS.lock().unwrap().remove(&self.name);
        Ok(())
    }
}

/// `group:join_leave(name)` — each worker joins the group once in `init_runner`, then
/// every invocation toggles its membership (leave, then rejoin), exercising the group
/// under concurrent membership churn.
struct GroupJoinLeave {
    name: String,
}

#[async_trait]
impl Runner for GroupJoinLeave {
    async fn init_runner(&self, worker_id: u32, _suite: &SuiteState) -> anyhow::Result<WorkerState> {
        GROUPS.lock().unwrap().entry(self.name.clone()).or_default().insert(worker_id);
        Ok(Box::new(worker_id))
    }

    async fn run(&self, worker_id: u32, _state: &mut WorkerState) -> anyhow::Result<()> {
        let mut groups = GROUPS.lock().unwrap();
        let members = groups.entry(self.name.clone()).or_default();
        members.remove(&worker_id);
        members.insert(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_is_registered() {
        let runner = lookup("core", "sleep", &[Arg::Int(1)]).unwrap();
        let mut state: WorkerState = Box::new(());
        runner.run(0, &mut state).await.unwrap();
    }

    #[test]
    fn unknown_workload_errors() {
        let err = lookup("core", "does_not_exist", &[]).unwrap_err();
        assert!(matches!(err, Error::ArgParseError(_)));
    }

    #[tokio::test]
    async fn group_create_then_delete_clears_group() {
        let name = "test-group-registry-unit";
        let create = lookup("group", "create", &[Arg::Str(name.into())]).unwrap();
        let mut state: WorkerState = Box::new(());
        create.run(0, &mut state).await.unwrap();
        assert_eq!(group_members(name), Some(0));

        let delete = lookup("group", "delete", &[Arg::Str(name.into())]).unwrap();
        delete.run(0, &mut state).await.unwrap();
        assert_eq!(group_members(name), None);
    }
}
