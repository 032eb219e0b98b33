//! The concurrency-saturation search: sweeps worker count looking for the QPS knee.
use crate::{
    error::Error,
    job::Job,
    sampler::{JobSamples, SampleOptions, perform_benchmark},
};

/// Options recognized by [`perform_squeeze`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SqueezeOptions {
    /// Starting worker count.
    pub min: u32,
    /// Hard upper bound on worker count.
    pub max: u32,
    /// Consecutive non-improving increments tolerated before declaring the peak.
    pub threshold: u32,
}

impl Default for SqueezeOptions {
    fn default() -> Self {
        // Ideally this cap would track the process/thread limit minus a safety
        // margin, but std doesn't expose RLIMIT_NPROC portably, so this is a
        // conservative fixed approximation.
        Self { min: 1, max: 9000, threshold: 3 }
    }
}

/// One recorded `(qps, concurrency)` point from a squeeze run.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SqueezeStep {
    /// Measured throughput at this concurrency level.
    pub qps: f64,
    /// The worker count this point was measured at.
    pub concurrency: u32,
}

/// The outcome of a squeeze run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SqueezeResult {
    /// The highest QPS observed.
    pub best_qps: f64,
    /// The first concurrency level that achieved `best_qps`.
    pub best_concurrency: u32,
    /// Every `(qps, concurrency)` point visited, newest first.
    pub history: Vec<SqueezeStep>,
}

/// Drives `job` through ascending worker counts, sampling once per step, until
/// throughput fails to improve for `threshold` consecutive steps past the best
/// seen so far, or `max` is reached.
pub async fn perform_squeeze(
    job: &mut Job,
    sample_options: &SampleOptions,
    squeeze_options: &SqueezeOptions,
) -> Result<SqueezeResult, Error> {
    let mut current = squeeze_options.min;
    let mut best_qps = f64::NEG_INFINITY;
    let mut best_concurrency = squeeze_options.min;
    let mut history = Vec::new();

    loop {
        job.set_concurrency(current).await?;
        let samples = perform_benchmark(&[job.get_counter()], sample_options).await;
        let qps = match &samples[0] {
            JobSamples::Mean(m) => *m,
            JobSamples::Extended(v) => v.iter().sum::<f64>() / v.len().max(1) as f64,
        };

        history.insert(0, SqueezeStep { qps, concurrency: current });
        tracing::info!(concurrency = current, qps, "squeeze step");

        if qps > best_qps {
            best_qps = qps;
            best_concurrency = current;
        } else if current - best_concurrency > squeeze_options.threshold {
            break;
        }

        current += 1;
        if current > squeeze_options.max {
            break;
        }
    }

    Ok(SqueezeResult { best_qps, best_concurrency, history })
}
