//! End-to-end scenarios driven against the public `Executor`/`cli` API and the
//! built-in registry workloads, since there is no hosted-runtime snippet compiler to
//! script against in this rebuild.
use std::time::Duration;

use squeeze_bench::{
    CodeFragment, CodeSpec, Error, JobSamples, RunOptions, RunOutcome, SqueezeOptions, cli, compare, run,
};

fn fragment(expr: &str) -> CodeFragment {
    CodeFragment::new(CodeSpec::parse(expr).unwrap())
}

#[tokio::test]
async fn smoke_sleep_1ms_single_worker_lands_in_expected_qps_band() {
    let frag = fragment("core:sleep(1).");
    let run_options = RunOptions { concurrency: 1, ..Default::default() };
    let outcome = run(&frag, &run_options, None).await.unwrap();
    let RunOutcome::Sample(samples) = outcome else { panic!("expected a sample outcome") };
    let qps = samples.mean();
    assert!((400.0..=1100.0).contains(&qps), "qps {qps} outside [400, 1100]");
}

#[tokio::test]
async fn comparison_returns_one_row_per_fragment_with_rel_at_or_under_peak() {
    let fragments = vec![fragment("rand:u64()."), fragment("rand:bytes(2).")];
    let run_options =
        RunOptions { concurrency: 2, sample_duration: Duration::from_millis(20), samples: 10, warmup: 1, ..Default::default() };
    let results = compare(&fragments, &run_options).await.unwrap();
    assert_eq!(results.len(), 2);

    let peak = results.iter().map(|(_, s)| s.mean()).fold(f64::NEG_INFINITY, f64::max);
    assert!(peak > 0.0);
    for (_, samples) in &results {
        let rel = 100.0 * samples.mean() / peak;
        assert!(rel <= 100.0 + f64::EPSILON, "rel {rel} exceeds 100%");
    }
}

#[tokio::test(start_paused = true)]
async fn squeeze_of_a_cheap_op_reports_best_concurrency_within_bounds() {
    let frag = fragment("group:create(\"test-scenario-squeeze\").");
    let run_options =
        RunOptions { sample_duration: Duration::from_millis(10), samples: 2, ..Default::default() };
    let squeeze_options = SqueezeOptions { min: 1, max: 16, threshold: 3 };

    let outcome = run(&frag, &run_options, Some(&squeeze_options)).await.unwrap();
    let RunOutcome::Squeeze(result) = outcome else { panic!("expected a squeeze outcome") };

    assert!((squeeze_options.min..=squeeze_options.max).contains(&result.best_concurrency));
    let max_qps_in_history = result.history.iter().map(|s| s.qps).fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(result.best_qps, max_qps_in_history);
    assert!(!result.history.is_empty());
}

#[tokio::test]
async fn init_done_hook_pairing_runs_without_a_runner_fault() {
    let mut frag = fragment("group:join_leave(\"test-scenario-hooks\").");
    frag.init = Some(CodeSpec::parse("group:create(\"test-scenario-hooks\").").unwrap());
    frag.done = Some(CodeSpec::parse("group:delete(\"test-scenario-hooks\").").unwrap());

    let run_options =
        RunOptions { concurrency: 2, sample_duration: Duration::from_millis(10), samples: 2, ..Default::default() };
    let outcome = run(&frag, &run_options, None).await;
    assert!(outcome.is_ok(), "expected no RunnerFault, got {outcome:?}");
}

#[tokio::test(start_paused = true)]
async fn cv_gate_never_returns_before_samples_times_sample_duration_has_elapsed() {
    let frag = fragment("core:sleep(1).");
    let run_options = RunOptions {
        concurrency: 1,
        sample_duration: Duration::from_millis(10),
        samples: 5,
        cv: Some(0.05),
        ..Default::default()
    };

    let start = tokio::time::Instant::now();
    let outcome = run(&frag, &run_options, None).await.unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(outcome, RunOutcome::Sample(JobSamples::Mean(_))));
    assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?} shorter than 5 * sample_duration");
}

#[test]
fn squeeze_with_two_fragments_is_rejected_before_any_job_starts() {
    let opts = cli::Opts {
        concurrency: 1,
        sample_duration: "1000ms".parse().unwrap(),
        samples: 3,
        warmup: 0,
        cv: None,
        verbose: false,
        isolated: false,
        squeeze: true,
        min: None,
        max: None,
        threshold: 3,
        profile: false,
        init: vec![],
        init_runner: vec![],
        done: vec![],
        isolation_worker: false,
        code: vec!["core:noop().".into(), "core:sleep(1).".into()],
    };
    let err = opts.build().unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}
