//! strata CLI - replay motion plans into G-code

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_gcode::{GcodeWriter, MachineSettings, Plan};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Stateful G-code writer for FDM printers", long_about = None)]
struct Cli {
    /// Log debug output (suppressed retractions, tool changes)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write G-code for a JSON motion plan
    Emit {
        /// Motion plan (.json)
        plan: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Machine settings (.toml)
        #[arg(long, conflicts_with = "profile")]
        machine: Option<PathBuf>,
        /// Built-in machine profile
        #[arg(long)]
        profile: Option<String>,
    },
    /// List built-in machine profiles
    Profiles,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Emit {
            plan,
            output,
            machine,
            profile,
        } => {
            let settings = load_settings(machine.as_deref(), profile.as_deref())?;
            emit(&plan, output.as_deref(), &settings)?;
        }
        Commands::Profiles => list_profiles(),
    }

    Ok(())
}

fn load_settings(machine: Option<&Path>, profile: Option<&str>) -> Result<MachineSettings> {
    match (machine, profile) {
        (Some(path), _) => MachineSettings::load(path)
            .with_context(|| format!("loading machine settings from {}", path.display())),
        (None, Some(name)) => MachineSettings::by_name(name)
            .with_context(|| format!("unknown profile '{name}' (see `strata profiles`)")),
        (None, None) => Ok(MachineSettings::generic()),
    }
}

fn emit(plan_path: &Path, output: Option<&Path>, settings: &MachineSettings) -> Result<()> {
    let json = std::fs::read_to_string(plan_path)
        .with_context(|| format!("reading {}", plan_path.display()))?;
    let plan = Plan::from_json(&json).with_context(|| format!("parsing {}", plan_path.display()))?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let mut writer = GcodeWriter::from_settings(sink, settings)?;
    let summary = plan.run(&mut writer).context("replaying plan")?;
    writer.into_inner()?.flush()?;

    info!(machine = %settings.name, flavor = %settings.flavor, "plan replayed");
    if let Some(summary) = summary {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn list_profiles() {
    for profile in MachineSettings::all_profiles() {
        println!(
            "{:<26} {:<18} {} extruder(s)",
            profile.name,
            profile.flavor.name(),
            profile.extruders.len()
        );
    }
}
