//! Report data: the rows a text reporter renders.
use crate::{sampler::JobSamples, squeeze::SqueezeResult};

/// One line of the output table: a code fragment's measured rate at one
/// concurrency level.
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// Display name of the code fragment.
    pub code: String,
    /// Worker count this row was measured at.
    pub concurrency: u32,
    /// Measured throughput, in invocations per second.
    pub qps: f64,
}

/// The rows to render plus whether a `Rel%` column is meaningful.
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// The rows to render, in no particular order (the reporter sorts them).
    pub rows: Vec<ReportRow>,
    /// Whether this report compares multiple fragments (adds the `Rel%` column).
    pub comparison: bool,
}

impl BenchReport {
    /// Builds a single-row report from one fragment's non-squeeze sample result.
    pub fn single(code: String, concurrency: u32, samples: &JobSamples) -> Self {
        Self { rows: vec![ReportRow { code, concurrency, qps: samples.mean() }], comparison: false }
    }

    /// Builds a report from one fragment's squeeze history, one row per step visited.
    pub fn squeeze(code: String, result: &SqueezeResult) -> Self {
        let rows = result
            .history
            .iter()
            .map(|step| ReportRow { code: code.clone(), concurrency: step.concurrency, qps: step.qps })
            .collect();
        Self { rows, comparison: false }
    }

    /// Builds a comparison report: one row per fragment, all at the same concurrency.
    pub fn compare(results: &[(String, JobSamples)], concurrency: u32) -> Self {
        let rows = results
            .iter()
            .map(|(code, samples)| ReportRow { code: code.clone(), concurrency, qps: samples.mean() })
            .collect();
        Self { rows, comparison: true }
    }
}
