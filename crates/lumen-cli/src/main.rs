//! lumen - light-curve pipeline CLI
//!
//! ```text
//! lumen process 8462852 --start-day 100 --duration-days 30
//! lumen plot 8462852 --save
//! lumen compare 8462852 757076 --axis time --save
//! lumen list
//! lumen delete 8462852
//! ```
//!
//! 設定は `--config`（省略時はカレントの lumen.toml があれば読む）と `LUMEN_*` 環境変数から。

mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lumen_core::app::config::DEFAULT_CONFIG_FILE;
use lumen_core::app::PlotOutput;
use lumen_core::plot::ComparisonAxis;
use lumen_core::{
    LumenConfig, LumenError, Orchestrator, OrchestratorBuilder, ProcessOptions, TargetId,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "Fetch, normalize and compare stellar light curves")]
struct Cli {
    /// TOML config file. Defaults to ./lumen.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, normalize and compute deviation for a target, then store the artifact.
    Process(ProcessArgs),

    /// Render the stored deviation of one target as PNG.
    Plot {
        target: TargetId,

        /// Also save under the configured plot directory.
        #[arg(long)]
        save: bool,

        /// Write the PNG to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Overlay the stored deviations of several targets.
    Compare {
        #[arg(required = true, num_args = 1..)]
        targets: Vec<TargetId>,

        #[arg(long)]
        save: bool,

        #[arg(long)]
        out: Option<PathBuf>,

        /// Horizontal axis; defaults to the configured one.
        #[arg(long, value_enum)]
        axis: Option<AxisArg>,
    },

    /// Print the stored artifact of a target.
    Show {
        target: TargetId,

        /// Include every deviation point, not just the summary.
        #[arg(long)]
        full: bool,
    },

    /// List targets with stored artifacts.
    List,

    /// Delete the stored artifact of a target.
    Delete { target: TargetId },
}

#[derive(Debug, clap::Args)]
struct ProcessArgs {
    target: TargetId,

    /// Per-file download timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Attempt only the first N candidate files.
    #[arg(long)]
    max_files: Option<usize>,

    #[arg(long, allow_hyphen_values = true)]
    start_day: Option<f64>,

    #[arg(long)]
    duration_days: Option<f64>,

    /// Time-bin width in days.
    #[arg(long, conflicts_with = "no_bin")]
    bin_size: Option<f64>,

    /// Keep every sample instead of binning.
    #[arg(long)]
    no_bin: bool,
}

impl ProcessArgs {
    /// Command-line flags override the configured defaults.
    fn options(&self, defaults: &ProcessOptions) -> ProcessOptions {
        let mut options = defaults.clone();
        if let Some(secs) = self.timeout_secs {
            options.timeout = Duration::from_secs(secs);
        }
        if self.max_files.is_some() {
            options.max_files = self.max_files;
        }
        if self.start_day.is_some() {
            options.window.start_day = self.start_day;
        }
        if self.duration_days.is_some() {
            options.window.duration_days = self.duration_days;
        }
        if self.no_bin {
            options.time_bin_size_days = None;
        } else if self.bin_size.is_some() {
            options.time_bin_size_days = self.bin_size;
        }
        options
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AxisArg {
    Index,
    Time,
}

impl From<AxisArg> for ComparisonAxis {
    fn from(value: AxisArg) -> Self {
        match value {
            AxisArg::Index => ComparisonAxis::Index,
            AxisArg::Time => ComparisonAxis::Time,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<LumenError>() {
                Some(lumen) => eprintln!("error[{}]: {err:#}", lumen.code()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let config = LumenConfig::load(config_path.as_deref()).context("loading configuration")?;
    tracing::debug!(config = ?config_path, store = %config.store_dir.display(), "configuration loaded");

    let mut builder = OrchestratorBuilder::from_config(&config)?;
    if let Command::Compare {
        axis: Some(axis), ..
    } = &cli.command
    {
        builder = builder.comparison_axis((*axis).into());
    }
    let orchestrator = builder.build()?;

    tokio::select! {
        result = dispatch(&orchestrator, &config, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            anyhow::bail!("interrupted")
        }
    }
}

async fn dispatch(
    orchestrator: &Orchestrator,
    config: &LumenConfig,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Process(args) => {
            let options = args.options(&config.process);
            let outcome = orchestrator.process(args.target, &options).await?;
            print_json(&outcome)
        }
        Command::Plot { target, save, out } => {
            let output = orchestrator.plot(target, save).await?;
            emit_plot(&output, out.as_deref(), json!({ "target": target })).await
        }
        Command::Compare {
            targets,
            save,
            out,
            axis: _,
        } => {
            let output = orchestrator.compare(&targets, save).await?;
            emit_plot(&output, out.as_deref(), json!({ "targets": targets })).await
        }
        Command::Show { target, full } => {
            let artifact = orchestrator.get(target).await?;
            if full {
                print_json(&artifact)
            } else {
                print_json(&json!({
                    "target": artifact.target(),
                    "summary": artifact.summary(),
                    "metadata": artifact.metadata(),
                }))
            }
        }
        Command::List => {
            let targets = orchestrator.list().await?;
            print_json(&targets)
        }
        Command::Delete { target } => {
            orchestrator.delete(target).await?;
            print_json(&json!({ "deleted": target }))
        }
    }
}

async fn emit_plot(
    output: &PlotOutput,
    out: Option<&Path>,
    mut report: serde_json::Value,
) -> anyhow::Result<()> {
    if let Some(out) = out {
        tokio::fs::write(out, &output.bytes)
            .await
            .with_context(|| format!("writing {}", out.display()))?;
    }
    report["bytes"] = json!(output.bytes.len());
    report["saved"] = json!(output.path);
    report["written"] = json!(out);
    print_json(&report)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
