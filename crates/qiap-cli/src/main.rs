//! QIAP CLI
//!
//! Command-line tooling for Quality Issue Reports:
//! - `qiap check`: parse and validate a report, print a summary (or JSON)
//! - `qiap format`: re-write a report in canonical form

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use qiap_report::{read_report, report_to_string, write_report_file, Report, ReportSummary};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qiap")]
#[command(author, version, about = "Quality Issue Report tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a Quality Issue Report.
    ///
    /// Prints counts of issues, affected products, affected values and
    /// actions per type. With `--json` the whole report is printed instead.
    Check {
        /// Report file (XML)
        report: PathBuf,
        /// Print the parsed report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-write a Quality Issue Report in canonical form.
    Format {
        /// Report file (XML)
        report: PathBuf,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { report, json } => cmd_check(&report, json),
        Commands::Format { report, out } => cmd_format(&report, out.as_deref()),
    }
}

fn load(path: &Path) -> Result<Report> {
    read_report(path).with_context(|| format!("invalid report {}", path.display()))
}

fn cmd_check(path: &Path, json: bool) -> Result<()> {
    let report = load(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!(
        "{} {} (organisation: {})",
        "ok".green().bold(),
        path.display(),
        report.organisation()
    );
    print!("{}", render_summary(&report.summary()));
    Ok(())
}

fn cmd_format(path: &Path, out: Option<&Path>) -> Result<()> {
    let report = load(path)?;
    match out {
        Some(out) => {
            write_report_file(&report, out)?;
            eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
        }
        None => print!("{}", report_to_string(&report)?),
    }
    Ok(())
}

fn render_summary(summary: &ReportSummary) -> String {
    let rows = [
        ("issues", summary.issues),
        ("affected products", summary.affected_products),
        ("affected values", summary.affected_values),
        ("discard product", summary.discard_product),
        ("discard value", summary.discard_value),
        ("correct value", summary.correct_value),
        ("custom correction", summary.custom_correction),
    ];
    let mut text = String::new();
    for (label, count) in rows {
        text.push_str(&format!("{label:>18}: {count}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_summary() {
        let summary = ReportSummary {
            issues: 2,
            correct_value: 3,
            ..ReportSummary::default()
        };
        let text = render_summary(&summary);
        assert!(text.contains("            issues: 2\n"));
        assert!(text.contains("     correct value: 3\n"));
        assert_eq!(text.lines().count(), 7);
    }

    #[test]
    fn test_cli_parses_format_output() {
        let cli = Cli::try_parse_from(["qiap", "format", "in.xml", "-o", "out.xml"]).unwrap();
        match cli.command {
            Commands::Format { report, out } => {
                assert_eq!(report, PathBuf::from("in.xml"));
                assert_eq!(out, Some(PathBuf::from("out.xml")));
            }
            Commands::Check { .. } => panic!("expected format"),
        }
    }

    #[test]
    fn test_format_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.xml");
        let output = dir.path().join("out.xml");
        std::fs::write(
            &input,
            "<qi:QualityIssueReport xmlns:qi=\"http://geca.esa.int/qiap/issue/2008/07\" organisation=\"ESA\">\
             <qi:QualityIssue id=\"1\" last-modified=\"2008-07-01\" mission=\"ENVISAT\">\
             <qi:Title>t</qi:Title><qi:Description>d</qi:Description>\
             </qi:QualityIssue></qi:QualityIssueReport>",
        )
        .unwrap();
        cmd_format(&input, Some(&output)).unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("<qi:Title>t</qi:Title>"));
        assert_eq!(load(&output).unwrap().issues().len(), 1);
    }
}
