//! Comparison reports: an aligned terminal table or a JSON document.

use std::io::Write;
use std::time::Duration;

use clap::ValueEnum;
use colored::Colorize;

use crate::artifact::CommandKind;
use crate::compare::{Benchmark, Comparison};
use crate::error::DxResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

pub fn write_report<W: Write>(
    out: &mut W,
    comparison: &Comparison,
    format: ReportFormat,
) -> DxResult<()> {
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, comparison)?;
            writeln!(out)?;
        }
        ReportFormat::Table => match comparison.command {
            CommandKind::Ingest => write_ingest_table(out, comparison)?,
            CommandKind::Query => write_query_table(out, comparison)?,
        },
    }
    out.flush()?;
    Ok(())
}

fn write_ingest_table<W: Write>(out: &mut W, comparison: &Comparison) -> DxResult<()> {
    writeln!(
        out,
        "{}",
        format!(
            "Ingest comparison: {} -> {}",
            comparison.first, comparison.second
        )
        .bold()
    )?;
    for bench in &comparison.benchmarks {
        writeln!(
            out,
            "  {:.<40} {:>12}",
            comparison.first.to_string(),
            format_duration(bench.first_time)
        )?;
        writeln!(
            out,
            "  {:.<40} {:>12}",
            comparison.second.to_string(),
            format_duration(bench.second_time)
        )?;
        writeln!(out, "  {:.<40} {:>12}", "delta", format_ratio(bench.time_delta, true))?;
    }
    Ok(())
}

fn write_query_table<W: Write>(out: &mut W, comparison: &Comparison) -> DxResult<()> {
    writeln!(
        out,
        "{}",
        format!(
            "Query comparison: {} -> {}",
            comparison.first, comparison.second
        )
        .bold()
    )?;
    writeln!(
        out,
        "  {:>10} | {:>10} | {:>10} | {:>12} | {:>12} | {:>10}",
        "queries",
        "valid",
        "accuracy",
        comparison.first.to_string(),
        comparison.second.to_string(),
        "delta"
    )?;
    writeln!(out, "  {}", "-".repeat(78))?;
    for bench in &comparison.benchmarks {
        write_query_row(out, bench)?;
    }
    Ok(())
}

fn write_query_row<W: Write>(out: &mut W, bench: &Benchmark) -> DxResult<()> {
    let accuracy = format_ratio(bench.accuracy, false);
    let accuracy = if bench.accuracy < 1.0 {
        accuracy.red().to_string()
    } else {
        accuracy
    };
    writeln!(
        out,
        "  {:>10} | {:>10} | {:>10} | {:>12} | {:>12} | {:>10}",
        bench.size,
        bench.valid_queries,
        accuracy,
        format_duration(bench.first_time),
        format_duration(bench.second_time),
        format_ratio(bench.time_delta, true)
    )?;
    Ok(())
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{:.2}s", d.as_secs_f64())
    } else if d.as_millis() > 0 {
        format!("{:.2}ms", d.as_secs_f64() * 1000.0)
    } else {
        format!("{:.2}µs", d.as_secs_f64() * 1_000_000.0)
    }
}

fn format_ratio(value: f64, signed: bool) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    if signed {
        format!("{:+.2}%", value * 100.0)
    } else {
        format!("{:.2}%", value * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::Instance;

    fn bench(accuracy: f64, delta: f64) -> Benchmark {
        Benchmark {
            size: 100,
            valid_queries: 98,
            num_correct: 98,
            first_time: Duration::from_millis(12),
            second_time: Duration::from_micros(12_780),
            time_delta: delta,
            accuracy,
        }
    }

    fn render(comparison: &Comparison, format: ReportFormat) -> String {
        let mut out = Vec::new();
        write_report(&mut out, comparison, format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_query_table() {
        let cmp = Comparison {
            command: CommandKind::Query,
            first: Instance::Candidate,
            second: Instance::Primary,
            benchmarks: vec![bench(1.0, 0.065), bench(f64::NAN, f64::NAN)],
        };
        let text = render(&cmp, ReportFormat::Table);
        assert!(text.contains("candidate -> primary"));
        assert!(text.contains("100.00%"));
        assert!(text.contains("+6.50%"));
        assert!(text.contains("12.00ms"));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn test_ingest_table() {
        let cmp = Comparison {
            command: CommandKind::Ingest,
            first: Instance::Primary,
            second: Instance::Candidate,
            benchmarks: vec![Benchmark {
                size: 0,
                valid_queries: 0,
                num_correct: 0,
                first_time: Duration::from_secs(1),
                second_time: Duration::from_millis(1_250),
                time_delta: 0.25,
                accuracy: f64::NAN,
            }],
        };
        let text = render(&cmp, ReportFormat::Table);
        assert!(text.contains("primary"));
        assert!(text.contains("1.25s"));
        assert!(text.contains("+25.00%"));
    }

    #[test]
    fn test_json_renders_nan_as_null() {
        let cmp = Comparison {
            command: CommandKind::Query,
            first: Instance::Candidate,
            second: Instance::Primary,
            benchmarks: vec![bench(f64::NAN, 0.5)],
        };
        let value: serde_json::Value =
            serde_json::from_str(&render(&cmp, ReportFormat::Json)).unwrap();
        assert_eq!(value["command"], "query");
        assert!(value["benchmarks"][0]["accuracy"].is_null());
        assert_eq!(value["benchmarks"][0]["timeDelta"], 0.5);
        assert_eq!(value["benchmarks"][0]["firstTime"], "12ms");
    }

    #[test]
    fn test_format_ratio() {
        assert_eq!(format_ratio(-0.125, true), "-12.50%");
        assert_eq!(format_ratio(0.5, false), "50.00%");
        assert_eq!(format_ratio(f64::INFINITY, true), "n/a");
    }
}
