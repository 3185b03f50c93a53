//! patchbay: CLI tool for replaying and checking cable scripts
//!
//! A cable script is a JSON-lines file of UI actions (add a window, mount it,
//! draw a cable, send a window to the trash, ...). Scripts are replayed
//! against recording units, so the physical operations the synchronizer makes
//! can be inspected without any audio running:
//!
//! - `replay`: run a script and print every physical operation
//! - `check`: run a script and verify the live connections after every tick
//! - `schema`: print the JSON schema of the script format

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use patchbay_core::script::{ScriptCommand, ScriptRunner, StepOutcome, audit, parse_script};
use patchbay_core::{SceneConfig, SceneEvent, SceneEventTag, UnitCall};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Replay and check patch-bay cable scripts
#[derive(Parser)]
#[command(name = "patchbay")]
#[command(about = "Replay cable scripts against recording units")]
#[command(version)]
struct Cli {
    /// Scene config file (JSON). Falls back to $PATCHBAY_CONFIG, then defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and print every physical operation
    Replay {
        script: PathBuf,

        /// Also print scene events with these tags (e.g. "linked,node-destroyed")
        #[arg(long, value_delimiter = ',')]
        events: Vec<String>,
    },

    /// Run a script and verify live connections after every tick
    Check { script: PathBuf },

    /// Print the JSON schema of the script format
    Schema,
}

fn load_config(path: Option<&Path>) -> Result<SceneConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os("PATCHBAY_CONFIG").map(PathBuf::from),
    };
    let Some(path) = path else {
        return Ok(SceneConfig::default());
    };
    tracing::debug!(path = %path.display(), "loading scene config");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn load_script(path: &Path) -> Result<Vec<patchbay_core::script::ScriptLine>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    Ok(parse_script(&text)?)
}

fn parse_tags(tags: &[String]) -> Result<Vec<SceneEventTag>> {
    tags.iter()
        .map(|t| t.trim().parse::<SceneEventTag>().map_err(|e| anyhow!(e)))
        .collect()
}

fn print_call(call: &UnitCall, format: OutputFormat) {
    if format == OutputFormat::Json {
        if let Ok(json) = serde_json::to_string(call) {
            println!("{}", json);
        }
        return;
    }
    match call {
        UnitCall::Connect { from, to, route } => println!(
            "  {} {} -> {} [{}:{} {}]",
            "connect   ".green(),
            from.cyan(),
            to.cyan(),
            route.output,
            route.input,
            route.kind.to_string().dimmed()
        ),
        UnitCall::Disconnect { from, to, route } => println!(
            "  {} {} -> {} [{}:{} {}]",
            "disconnect".red(),
            from.cyan(),
            to.cyan(),
            route.output,
            route.input,
            route.kind.to_string().dimmed()
        ),
        UnitCall::SetParam { unit, param, value } => println!(
            "  {} {}.{} = {}",
            "set       ".yellow(),
            unit.cyan(),
            param,
            value
        ),
    }
}

fn print_event(event: &SceneEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}", json);
            }
        }
        OutputFormat::Table => {
            let detail = serde_json::to_value(event)
                .map(|v| v.to_string())
                .unwrap_or_default();
            println!("  {} {}", event.tag().to_string().magenta(), detail.dimmed());
        }
    }
}

fn print_step(line: usize, command: &ScriptCommand, outcome: &StepOutcome, format: OutputFormat) {
    if format == OutputFormat::Json {
        return;
    }
    let summary = match outcome {
        StepOutcome::Flushed(report) => format!(
            "runs={} linked={} unlinked={} failures={}",
            report.runs,
            report.linked.len(),
            report.unlinked.len(),
            report.failures
        ),
        StepOutcome::Destroyed(report) => format!(
            "cables={} unlinked={} failures={}",
            report.removed_cables.len(),
            report.unlinked.len(),
            report.failures
        ),
        StepOutcome::Removed { cables } => format!("removed={}", cables.len()),
        StepOutcome::Knob { value } => format!("value={}", value),
        StepOutcome::Preset { applied } => format!("applied={}", applied),
        StepOutcome::Node { .. } | StepOutcome::Cable { .. } | StepOutcome::Done => String::new(),
    };
    println!(
        "{:>4} {:<16} {}",
        line.to_string().dimmed(),
        command.tag().to_string().bold(),
        summary
    );
}

fn cmd_replay(script: &Path, events: &[String], config: SceneConfig, format: OutputFormat) -> Result<()> {
    let lines = load_script(script)?;
    let tags = parse_tags(events)?;

    let mut runner = ScriptRunner::new(config);
    let receiver = runner.scene_mut().subscribe();

    for line in &lines {
        let outcome = runner.run(line)?;
        print_step(line.line, &line.command, &outcome, format);
        for call in runner.log().take() {
            print_call(&call, format);
        }
        for event in receiver.try_iter() {
            if tags.contains(&event.tag()) {
                print_event(&event, format);
            }
        }
    }

    if format == OutputFormat::Table {
        let scene = runner.scene();
        println!("{}", "-".repeat(60));
        println!(
            "{} live, {} pending",
            scene.live_connections().len().to_string().green(),
            scene.pending_cables().len().to_string().yellow()
        );
    }
    Ok(())
}

fn cmd_check(script: &Path, config: SceneConfig, format: OutputFormat) -> Result<()> {
    let lines = load_script(script)?;
    let mut runner = ScriptRunner::new(config);
    let mut ticks = 0;
    let mut violations = 0;

    for line in &lines {
        runner.run(line)?;
        if line.command != ScriptCommand::Tick {
            continue;
        }
        ticks += 1;
        for violation in audit(runner.scene()) {
            violations += 1;
            match format {
                OutputFormat::Table => println!(
                    "{} line {}: {}",
                    "violation".red().bold(),
                    line.line,
                    violation
                ),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "line": line.line, "violation": violation.to_string() })
                ),
            }
        }
    }

    if violations > 0 {
        bail!("{} violation(s) over {} tick(s)", violations, ticks);
    }
    if format == OutputFormat::Table {
        println!("{} {} tick(s) checked", "ok".green().bold(), ticks);
    }
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(ScriptCommand);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PATCHBAY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { script, events } => cmd_replay(&script, &events, config, cli.format),
        Commands::Check { script } => cmd_check(&script, config, cli.format),
        Commands::Schema => cmd_schema(),
    }
}
