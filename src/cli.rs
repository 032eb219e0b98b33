//! Command-line surface: argument parsing, validation, and dispatch into the executor.
//!
//! Validation that can't be expressed in clap's declarative surface (squeeze mode
//! forbidding more than one fragment, `--min` exceeding `--max`) runs once immediately
//! after parsing, before any `Job` is constructed, and produces
//! [`Error::InvalidConfiguration`] rather than a panic.
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{
    bridge::run_isolation_worker,
    code::CodeSpec,
    error::Error,
    executor::{self, RunOptions, RunOutcome},
    fragment::CodeFragment,
    report::BenchReport,
    reporter,
    squeeze::SqueezeOptions,
};

/// `<tool> [OPTIONS] CODE1 [CODE2 ...]`.
#[derive(Parser, Debug)]
#[command(version, about = "Micro-benchmark harness and concurrency-saturation explorer")]
pub struct Opts {
    /// Worker count for non-squeeze runs
    #[arg(short = 'c', long, default_value_t = 1)]
    pub concurrency: u32,

    /// Interval between counter reads
    #[arg(short = 'd', long = "sample_duration", default_value = "1000ms")]
    pub sample_duration: humantime::Duration,

    /// Retained samples
    #[arg(short = 's', long, default_value_t = 3)]
    pub samples: u32,

    /// Warmup samples to discard
    #[arg(short = 'w', long, default_value_t = 0)]
    pub warmup: u32,

    /// Coefficient-of-variation gate
    #[arg(long)]
    pub cv: Option<f64>,

    /// Enable progress logging to stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Run each fragment in a fresh runtime instance
    #[arg(short = 'i', long)]
    pub isolated: bool,

    /// Enable squeeze (concurrency-saturation) mode
    #[arg(short = 'q', long)]
    pub squeeze: bool,

    /// Squeeze starting worker count
    #[arg(long)]
    pub min: Option<u32>,

    /// Squeeze worker count cap
    #[arg(long)]
    pub max: Option<u32>,

    /// Consecutive non-improving increments before the squeeze terminates
    #[arg(short = 't', long, default_value_t = 3)]
    pub threshold: u32,

    /// Run the call-tracing profiler instead of a benchmark (out of core)
    #[arg(short = 'p', long)]
    pub profile: bool,

    /// Attach an `init` hook to the N-th (0-indexed) code fragment: `--init N CODE`
    #[arg(long = "init", num_args = 2, value_names = ["N", "CODE"])]
    pub init: Vec<String>,

    /// Attach an `init_runner` hook: `--init_runner N CODE`
    #[arg(long = "init_runner", num_args = 2, value_names = ["N", "CODE"])]
    pub init_runner: Vec<String>,

    /// Attach a `done` hook: `--done N CODE`
    #[arg(long = "done", num_args = 2, value_names = ["N", "CODE"])]
    pub done: Vec<String>,

    /// Re-exec this binary as an isolation worker. Not user-facing.
    #[arg(long = "isolation-worker", hide = true)]
    pub isolation_worker: bool,

    /// The code fragments to benchmark
    pub code: Vec<String>,
}

/// A fully parsed and validated invocation, ready for [`executor`].
pub struct BenchConfig {
    /// The code fragments to benchmark, with their attached hooks resolved by index.
    pub fragments: Vec<CodeFragment>,
    /// Shared run-level options (concurrency, sampling, isolation).
    pub run_options: RunOptions,
    /// Squeeze options, present only when `--squeeze` was passed.
    pub squeeze_options: Option<SqueezeOptions>,
}

impl Opts {
    /// Validates and lowers the parsed CLI options into a [`BenchConfig`].
    pub fn build(self) -> Result<BenchConfig, Error> {
        if self.code.is_empty() {
            return Err(Error::InvalidConfiguration("at least one code fragment is required".into()));
        }
        if self.squeeze && self.code.len() > 1 {
            return Err(Error::InvalidConfiguration("--squeeze accepts exactly one code fragment".into()));
        }
        if self.profile {
            return Err(Error::InvalidConfiguration("--profile is not implemented by this build".into()));
        }

        let mut fragments: Vec<CodeFragment> =
            self.code.iter().map(|raw| CodeSpec::parse(raw).map(CodeFragment::new)).collect::<Result<_, _>>()?;

        attach_hooks(&mut fragments, &self.init, |f, spec| f.init = Some(spec))?;
        attach_hooks(&mut fragments, &self.init_runner, |f, spec| f.init_runner = Some(spec))?;
        attach_hooks(&mut fragments, &self.done, |f, spec| f.done = Some(spec))?;

        let run_options = RunOptions {
            concurrency: self.concurrency,
            sample_duration: self.sample_duration.into(),
            samples: self.samples,
            warmup: self.warmup,
            cv: self.cv,
            isolated: self.isolated,
        };

        let squeeze_options = if self.squeeze {
            let defaults = SqueezeOptions::default();
            let min = self.min.unwrap_or(defaults.min);
            let max = self.max.unwrap_or(defaults.max);
            if min > max {
                return Err(Error::InvalidConfiguration(format!("--min ({min}) must not exceed --max ({max})")));
            }
            Some(SqueezeOptions { min, max, threshold: self.threshold })
        } else {
            None
        };

        Ok(BenchConfig { fragments, run_options, squeeze_options })
    }
}

fn attach_hooks(
    fragments: &mut [CodeFragment],
    raw: &[String],
    set: impl Fn(&mut CodeFragment, CodeSpec),
) -> Result<(), Error> {
    for pair in raw.chunks(2) {
        let [index, code] = pair else {
            return Err(Error::ArgParseError("hook flags require an index and a code argument".into()));
        };
        let index: usize = index
            .parse()
            .map_err(|_| Error::ArgParseError(format!("invalid fragment index `{index}`")))?;
        let fragment = fragments
            .get_mut(index)
            .ok_or_else(|| Error::ArgParseError(format!("hook index {index} has no matching code fragment")))?;
        set(fragment, CodeSpec::parse(code)?);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Parses `std::env::args`, validates, and runs the benchmark described, printing its
/// report to stdout. Returns the error to surface on stderr with a nonzero exit code.
pub async fn run() -> Result<(), Error> {
    let opts = Opts::parse();

    if opts.isolation_worker {
        return run_isolation_worker().await;
    }

    init_tracing(opts.verbose);
    let config = opts.build()?;

    let report = if let Some(squeeze_options) = &config.squeeze_options {
        let fragment = &config.fragments[0];
        let (name, _) = fragment.resolve()?;
        match executor::run(fragment, &config.run_options, Some(squeeze_options)).await? {
            RunOutcome::Squeeze(result) => BenchReport::squeeze(name, &result),
            RunOutcome::Sample(_) => unreachable!("squeeze_options implies a squeeze outcome"),
        }
    } else if config.fragments.len() == 1 {
        let fragment = &config.fragments[0];
        let (name, _) = fragment.resolve()?;
        match executor::run(fragment, &config.run_options, None).await? {
            RunOutcome::Sample(samples) => BenchReport::single(name, config.run_options.concurrency, &samples),
            RunOutcome::Squeeze(_) => unreachable!("no squeeze_options implies a sample outcome"),
        }
    } else {
        let results = executor::compare(&config.fragments, &config.run_options).await?;
        BenchReport::compare(&results, config.run_options.concurrency)
    };

    println!("{}", reporter::render(&report));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts(code: Vec<&str>) -> Opts {
        Opts {
            concurrency: 1,
            sample_duration: "1000ms".parse().unwrap(),
            samples: 3,
            warmup: 0,
            cv: None,
            verbose: false,
            isolated: false,
            squeeze: false,
            min: None,
            max: None,
            threshold: 3,
            profile: false,
            init: vec![],
            init_runner: vec![],
            done: vec![],
            isolation_worker: false,
            code: code.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn squeeze_with_multiple_fragments_is_rejected() {
        let mut opts = base_opts(vec!["core:noop().", "core:sleep(1)."]);
        opts.squeeze = true;
        let err = opts.build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn min_exceeding_max_is_rejected() {
        let mut opts = base_opts(vec!["core:noop()."]);
        opts.squeeze = true;
        opts.min = Some(10);
        opts.max = Some(5);
        let err = opts.build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn hooks_attach_to_the_indexed_fragment() {
        let mut opts = base_opts(vec!["group:join_leave(\"g\").", "core:noop()."]);
        opts.init = vec!["0".into(), "group:create(\"g\").".into()];
        opts.done = vec!["0".into(), "group:delete(\"g\").".into()];
        let config = opts.build().unwrap();
        assert!(config.fragments[0].init.is_some());
        assert!(config.fragments[0].done.is_some());
        assert!(config.fragments[1].init.is_none());
    }

    #[test]
    fn profile_flag_is_rejected_as_unimplemented() {
        let mut opts = base_opts(vec!["core:noop()."]);
        opts.profile = true;
        let err = opts.build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
