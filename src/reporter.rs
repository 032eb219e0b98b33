//! Plain-text rendering of a [`BenchReport`] as a static post-run table.
use itertools::Itertools;
use tabled::{
    builder::Builder,
    settings::{Alignment, Padding, Style, object::FirstColumn},
};

use crate::{report::BenchReport, util::IntoAdjustedRate};

/// Code is truncated to this many characters before display.
const CODE_TRUNCATE_LEN: usize = 62;

/// Renders `report` as a table sorted descending by QPS: `code`, `||` (concurrency),
/// `QPS`, and — in comparison mode — `Rel%` normalized to the peak row.
pub fn render(report: &BenchReport) -> String {
    let peak = report.rows.iter().map(|r| r.qps).fold(f64::NEG_INFINITY, f64::max);

    let mut builder = Builder::default();
    let mut header = vec!["code".to_string(), "||".to_string(), "QPS".to_string()];
    if report.comparison {
        header.push("Rel%".to_string());
    }
    builder.push_record(header);

    for row in report.rows.iter().sorted_by(|a, b| b.qps.total_cmp(&a.qps)) {
        let mut cells = vec![truncate(&row.code, CODE_TRUNCATE_LEN), row.concurrency.to_string(), row.qps.adjusted().to_string()];
        if report.comparison {
            let rel = if peak > 0.0 { 100.0 * row.qps / peak } else { 0.0 };
            cells.push(format!("{rel:.1}%"));
        }
        builder.push_record(cells);
    }

    let mut table = builder.build();
    table.with(Style::empty()).with(Alignment::right()).with(Padding::new(1, 2, 0, 0)).modify(FirstColumn, Alignment::left());
    table.to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
