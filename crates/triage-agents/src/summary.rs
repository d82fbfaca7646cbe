//! Batch summary rendering.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use triage::ProcessedMetrics;

/// How the end-of-batch metrics are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    /// One structured log line.
    #[default]
    Simple,
    /// Fixed-width metric table.
    Table,
    /// One labelled line per metric.
    Pretty,
}

/// Renders the batch metrics in the requested style. All styles go through
/// the log layer, so redirection and filtering behave like the rest of the
/// pipeline output.
pub fn render(metrics: &ProcessedMetrics, style: SummaryStyle) {
    match style {
        SummaryStyle::Simple => render_simple(metrics),
        SummaryStyle::Table => render_table(metrics),
        SummaryStyle::Pretty => render_pretty(metrics),
    }
}

fn render_simple(m: &ProcessedMetrics) {
    info!(
        items = m.total_items,
        llm_calls = m.total_llm_calls,
        cost_usd = m.total_cost,
        time_ms = m.total_time_ms,
        success_rate = m.success_rate,
        throughput_per_min = m.throughput_per_min,
        "batch summary"
    );
}

fn render_table(m: &ProcessedMetrics) {
    info!("+----------------------+----------------+");
    info!("| {:<20} | {:>14} |", "metric", "value");
    info!("+----------------------+----------------+");
    info!("| {:<20} | {:>14} |", "incidents", m.total_items);
    info!("| {:<20} | {:>14} |", "oracle calls", m.total_llm_calls);
    info!("| {:<20} | {:>14} |", "total cost", format!("${:.4}", m.total_cost));
    info!("| {:<20} | {:>14} |", "total time", format!("{} ms", m.total_time_ms));
    info!("| {:<20} | {:>14} |", "success rate", format!("{:.1}%", m.success_rate));
    info!("| {:<20} | {:>14} |", "throughput", format!("{:.2}/min", m.throughput_per_min));
    info!("+----------------------+----------------+");
}

fn render_pretty(m: &ProcessedMetrics) {
    info!("==== batch summary ====");
    info!("incidents processed : {}", m.total_items);
    info!("oracle calls        : {}", m.total_llm_calls);
    info!("total cost          : ${:.4}", m.total_cost);
    info!("total time          : {} ms", m.total_time_ms);
    info!("success rate        : {:.1}%", m.success_rate);
    info!("throughput          : {:.2} incidents/min", m.throughput_per_min);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ProcessedMetrics {
        ProcessedMetrics {
            total_cost: 0.0123,
            total_llm_calls: 12,
            total_time_ms: 45_000,
            total_items: 6,
            success_rate: 83.3,
            throughput_per_min: 6.0,
        }
    }

    #[test]
    fn test_all_styles_render() {
        for style in [SummaryStyle::Simple, SummaryStyle::Table, SummaryStyle::Pretty] {
            render(&metrics(), style);
        }
    }

    #[test]
    fn test_style_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&SummaryStyle::Pretty).unwrap(), r#""pretty""#);
        let style: SummaryStyle = serde_json::from_str(r#""table""#).unwrap();
        assert_eq!(style, SummaryStyle::Table);
    }

    #[test]
    fn test_style_parses_as_cli_value() {
        let style = SummaryStyle::from_str("table", true).unwrap();
        assert_eq!(style, SummaryStyle::Table);
        assert!(SummaryStyle::from_str("fancy", true).is_err());
    }
}
