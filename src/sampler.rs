//! Fixed-interval counter sampling with optional coefficient-of-variation gating.
use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

use crate::counter::CounterHandle;

/// What shape of result [`perform_benchmark`] should return per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReportMode {
    /// A single mean rate per job.
    Mean,
    /// The full retained window of per-interval rates, newest first.
    Extended,
}

/// Options recognized by [`perform_benchmark`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SampleOptions {
    /// Wall-clock interval between counter reads.
    pub sample_duration: Duration,
    /// Number of initial intervals to discard.
    pub warmup: u32,
    /// Number of retained intervals to average (or return, in `extended` mode).
    pub samples: u32,
    /// Coefficient-of-variation gate: keep sampling until every job's window
    /// satisfies `stddev / mean <= cv`.
    pub cv: Option<f64>,
    /// Whether to collapse each job's window to a mean or return it whole.
    pub report: ReportMode,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            sample_duration: Duration::from_millis(1000),
            warmup: 0,
            samples: 3,
            cv: None,
            report: ReportMode::Mean,
        }
    }
}

/// A single job's sampled result, shaped per [`ReportMode`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum JobSamples {
    /// The mean of the retained window.
    Mean(f64),
    /// The retained window itself, newest first.
    Extended(Vec<f64>),
}

impl JobSamples {
    /// The mean rate, regardless of which variant this is.
    pub fn mean(&self) -> f64 {
        match self {
            JobSamples::Mean(m) => *m,
            JobSamples::Extended(v) => mean(v),
        }
    }
}

/// Samples a set of job counters at a fixed interval, optionally gating on CV,
/// and returns one result per counter in the same order they were passed in.
///
/// Jobs are sampled together so that, in comparison mode, every job's *i*-th
/// reading is taken within one `sample_duration` of the others.
pub async fn perform_benchmark(counters: &[CounterHandle], options: &SampleOptions) -> Vec<JobSamples> {
    // samples = 1 makes CV undefined; fall back to an ungated run.
    let cv_gate = if options.samples <= 1 { None } else { options.cv };

    if options.warmup > 0 {
        tokio::time::sleep(options.sample_duration * options.warmup).await;
    }

    let mut last: Vec<u64> = counters.iter().map(CounterHandle::get).collect();
    let mut windows: Vec<VecDeque<f64>> = vec![VecDeque::with_capacity(options.samples as usize); counters.len()];
    let mut prev = Instant::now();

    loop {
        tokio::time::sleep(options.sample_duration).await;
        let now = Instant::now();
        let elapsed = now.duration_since(prev).as_secs_f64();
        prev = now;

        for (i, counter) in counters.iter().enumerate() {
            let value = counter.get();
            let delta = value.saturating_sub(last[i]) as f64 / elapsed;
            last[i] = value;
            windows[i].push_front(delta);
            if windows[i].len() > options.samples as usize {
                windows[i].pop_back();
            }
        }

        tracing::debug!(rates = ?windows.iter().map(|w| w.front().copied().unwrap_or(0.0)).collect::<Vec<_>>(), "sample taken");

        if windows.iter().any(|w| w.len() < options.samples as usize) {
            continue;
        }

        if let Some(bound) = cv_gate {
            if windows.iter().any(|w| coefficient_of_variation(w) > bound) {
                continue;
            }
        }

        break;
    }

    windows
        .into_iter()
        .map(|w| {
            let v: Vec<f64> = w.into_iter().collect();
            match options.report {
                ReportMode::Mean => JobSamples::Mean(mean(&v)),
                ReportMode::Extended => JobSamples::Extended(v),
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn coefficient_of_variation(values: &VecDeque<f64>) -> f64 {
    let values: Vec<f64> = values.iter().copied().collect();
    let m = mean(&values);
    if m == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / m
}
