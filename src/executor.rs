//! The thin coordinator: builds Jobs, invokes the Sampler or Squeezer, tears down.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    bridge::{ChildProcessBridge, IsolationBridge},
    counter::CounterHandle,
    error::Error,
    fragment::CodeFragment,
    job::Job,
    sampler::{JobSamples, ReportMode, SampleOptions, perform_benchmark},
    squeeze::{SqueezeOptions, SqueezeResult, perform_squeeze},
};

/// Run-level options shared by both `run` and `compare`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker count for non-squeeze runs.
    pub concurrency: u32,
    /// Wall-clock interval between counter reads.
    pub sample_duration: Duration,
    /// Number of retained intervals to average.
    pub samples: u32,
    /// Number of initial intervals to discard.
    pub warmup: u32,
    /// Coefficient-of-variation gate, if set.
    pub cv: Option<f64>,
    /// Run each fragment in a fresh, isolated runtime instance.
    pub isolated: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            sample_duration: Duration::from_millis(1000),
            samples: 3,
            warmup: 0,
            cv: None,
            isolated: false,
        }
    }
}

fn sample_options_from(run_options: &RunOptions, report: ReportMode) -> SampleOptions {
    SampleOptions {
        sample_duration: run_options.sample_duration,
        warmup: run_options.warmup,
        samples: run_options.samples,
        cv: run_options.cv,
        report,
    }
}

/// The result of a single `run` call: either a Sampler result or a Squeezer result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunOutcome {
    /// A non-squeeze Sampler result.
    Sample(JobSamples),
    /// A Squeezer result: best QPS, best concurrency, and the full history.
    Squeeze(SqueezeResult),
}

/// Runs a single code fragment, routing to the isolation bridge if requested.
///
/// If `squeeze_options` is absent, returns the Sampler result for `run_options`.
/// If present, returns the Squeezer result; `run_options.concurrency` is ignored in
/// that case since the Squeezer drives concurrency itself.
pub async fn run(
    fragment: &CodeFragment,
    run_options: &RunOptions,
    squeeze_options: Option<&SqueezeOptions>,
) -> Result<RunOutcome, Error> {
    if run_options.isolated {
        return run_isolated(fragment, run_options, squeeze_options).await;
    }
    run_local(fragment, run_options.concurrency, &sample_options_from(run_options, ReportMode::Mean), squeeze_options).await
}

async fn run_isolated(
    fragment: &CodeFragment,
    run_options: &RunOptions,
    squeeze_options: Option<&SqueezeOptions>,
) -> Result<RunOutcome, Error> {
    let sample_options = sample_options_from(run_options, ReportMode::Mean);
    let bridge = ChildProcessBridge::new();
    let mut handles = bridge.prepare(1).await?;
    let mut handle = handles.remove(0);
    let outcome = tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
        outcome = handle.run(fragment, run_options.concurrency, &sample_options, squeeze_options) => outcome,
    };
    handle.shutdown().await;
    outcome
}

/// Executes one code fragment entirely within this process: constructs its Job,
/// drives either the Sampler or the Squeezer, and stops the Job on every exit path.
pub(crate) async fn run_local(
    fragment: &CodeFragment,
    concurrency: u32,
    sample_options: &SampleOptions,
    squeeze_options: Option<&SqueezeOptions>,
) -> Result<RunOutcome, Error> {
    let mut job = Job::start(fragment).await?;

    let measure = async {
        match squeeze_options {
            Some(sq) => {
                let result = perform_squeeze(&mut job, sample_options, sq).await?;
                Ok(RunOutcome::Squeeze(result))
            }
            None => {
                job.set_concurrency(concurrency).await?;
                let mut samples = perform_benchmark(&[job.get_counter()], sample_options).await;
                Ok(RunOutcome::Sample(samples.remove(0)))
            }
        }
    };

    let outcome: Result<RunOutcome, Error> = tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
        outcome = measure => outcome,
    };

    if let Err(e) = job.stop().await {
        tracing::warn!(error = %e, "job teardown failed after run");
    }

    outcome
}

/// Runs multiple code fragments simultaneously under identical load, sampling their
/// counters together so their throughput numbers are comparable.
pub async fn compare(fragments: &[CodeFragment], run_options: &RunOptions) -> Result<Vec<(String, JobSamples)>, Error> {
    if run_options.isolated {
        return compare_isolated(fragments, run_options).await;
    }
    compare_local(fragments, run_options).await
}

async fn compare_local(fragments: &[CodeFragment], run_options: &RunOptions) -> Result<Vec<(String, JobSamples)>, Error> {
    let mut jobs = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        match Job::start(fragment).await {
            Ok(job) => jobs.push(job),
            Err(e) => {
                stop_all(&mut jobs).await;
                return Err(e);
            }
        }
    }

    let measure = async {
        for job in &mut jobs {
            job.set_concurrency(run_options.concurrency).await?;
        }
        let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
        let counters: Vec<CounterHandle> = jobs.iter().map(Job::get_counter).collect();
        let sample_options = sample_options_from(run_options, ReportMode::Mean);
        let samples = perform_benchmark(&counters, &sample_options).await;
        Ok(names.into_iter().zip(samples).collect())
    };

    let result: Result<Vec<(String, JobSamples)>, Error> = tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
        result = measure => result,
    };

    stop_all(&mut jobs).await;

    result
}

async fn compare_isolated(fragments: &[CodeFragment], run_options: &RunOptions) -> Result<Vec<(String, JobSamples)>, Error> {
    let sample_options = sample_options_from(run_options, ReportMode::Mean);
    let bridge = ChildProcessBridge::new();
    let mut handles = bridge.prepare(fragments.len()).await?;

    let mut results = Vec::with_capacity(fragments.len());
    for (fragment, mut handle) in fragments.iter().zip(handles.drain(..)) {
        let (name, _) = fragment.resolve()?;
        let outcome = handle.run(fragment, run_options.concurrency, &sample_options, None).await;
        handle.shutdown().await;
        match outcome? {
            RunOutcome::Sample(s) => results.push((name, s)),
            RunOutcome::Squeeze(_) => unreachable!("compare never requests a squeeze"),
        }
    }
    Ok(results)
}

async fn stop_all(jobs: &mut [Job]) {
    for job in jobs {
        if let Err(e) = job.stop().await {
            tracing::warn!(error = %e, "job teardown failed during comparison abort");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeSpec;

    #[tokio::test(start_paused = true)]
    async fn run_without_squeeze_returns_sample_result() {
        let fragment = CodeFragment::new(CodeSpec::parse("core:noop().").unwrap());
        let run_options = RunOptions { sample_duration: Duration::from_millis(10), samples: 2, ..Default::default() };
        let outcome = run(&fragment, &run_options, None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Sample(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn compare_ranks_multiple_fragments() {
        let fragments = vec![
            CodeFragment::new(CodeSpec::parse("core:noop().").unwrap()),
            CodeFragment::new(CodeSpec::parse("core:sleep(1).").unwrap()),
        ];
        let run_options = RunOptions { sample_duration: Duration::from_millis(10), samples: 2, ..Default::default() };
        let results = compare(&fragments, &run_options).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn invalid_fragment_aborts_comparison_before_measuring() {
        let fragments = vec![CodeFragment::new(CodeSpec::Expression("bogus:thing(1).".into()))];
        let run_options = RunOptions::default();
        let err = compare(&fragments, &run_options).await.unwrap_err();
        assert!(matches!(err, Error::InitFailed(_) | Error::ArgParseError(_)));
    }
}
