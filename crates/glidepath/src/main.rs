use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use glidepath_core::{CapitalMarketAssumptions, PlanningReport, RetirementPlanner};

mod io;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "glidepath")]
#[command(about = "Monte Carlo retirement projection")]
struct Args {
    /// Planning request (YAML)
    #[arg(short, long)]
    request: PathBuf,

    /// Engine, analysis and trade-off configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report destination; printed to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to the data directory (default: ~/.glidepath/)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".glidepath")
}

fn plan(args: &Args) -> Result<PlanningReport> {
    let request = io::load_request(&args.request)?;
    let config = io::load_config(args.config.as_deref())?;
    let planner = RetirementPlanner::new(
        Arc::new(CapitalMarketAssumptions::default_assumptions()),
        config,
    )?;
    Ok(planner.plan(&request)?)
}

fn summary(report: &PlanningReport) -> String {
    let results = &report.results;
    let mut out = format!(
        "success probability {:.1}%, median retirement balance {:.0}",
        results.success_probability() * 100.0,
        results.median_retirement_balance()
    );
    if let Some(rec) = report.recommendations.first() {
        out.push_str(&format!("\ntop recommendation: {}", rec.title));
    }
    out
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    logging::init_logging(&data_dir, &args.log_level)?;

    let report = plan(&args)?;
    let json = serde_json::to_string_pretty(&report).wrap_err("failed to serialize report")?;

    match &args.output {
        Some(path) => {
            io::atomic_write(path, &json)
                .wrap_err_with(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
            eprintln!("{}", summary(&report));
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "glidepath",
            "--request",
            "plan.yaml",
            "-o",
            "report.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.request, PathBuf::from("plan.yaml"));
        assert_eq!(args.output, Some(PathBuf::from("report.json")));
        assert_eq!(args.log_level, "debug");
        assert!(args.config.is_none());

        assert!(Args::try_parse_from(["glidepath"]).is_err());
    }

    #[test]
    fn test_plan_from_files() {
        let dir = tempdir().unwrap();
        let request = dir.path().join("plan.yaml");
        let config = dir.path().join("config.yaml");
        std::fs::write(
            &request,
            "current_age: 35\n\
             retirement_age: 60\n\
             current_savings: 80000.0\n\
             annual_contribution: 10000.0\n\
             risk_tolerance: moderate\n\
             n_paths: 500\n",
        )
        .unwrap();
        std::fs::write(&config, "engine:\n  backend: cpu\n  cpu_workers: 2\n").unwrap();

        let args = Args {
            request,
            config: Some(config),
            output: None,
            log_level: "info".into(),
            data_dir: Some(dir.path().to_path_buf()),
        };
        let report = plan(&args).unwrap();
        assert_eq!(report.results.n_paths, 500);
        assert!(summary(&report).starts_with("success probability"));
    }
}
