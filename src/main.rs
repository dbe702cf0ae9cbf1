//! loopsched Command Line Interface
//!
//! Usage:
//!   loopsched [OPTIONS] <FILE>
//!   loopsched --help
//!
//! Examples:
//!   loopsched gemm.json                                  # Lower for CPU and print the tree
//!   loopsched -a "reorder L2,L1" -a "parallelize L2 openmp" gemm.json
//!   loopsched --target gpu -a "parallelize L1 threadIdx.x" gemm.json
//!   loopsched --no-lower --emit json -o out.json gemm.json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use loopsched::config::{LowerConfig, ScheduleConfig};
use loopsched::lower::{lower_with, Target};
use loopsched::session::Session;
use loopsched::transform::ScheduleCommand;
use std::fs;
use std::path::PathBuf;

/// loopsched - transactional loop-nest scheduling
#[derive(Parser, Debug)]
#[command(name = "loopsched")]
#[command(author = "loopsched contributors")]
#[command(version)]
#[command(about = "Apply dependence-checked loop transformations to a program tree", long_about = None)]
struct Cli {
    /// Session file (JSON: functions, program, schedule)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Schedule command, applied after the session's own (repeatable)
    #[arg(short = 'a', long = "apply", value_name = "CMD")]
    apply: Vec<ScheduleCommand>,

    /// Lowering target
    #[arg(short, long, default_value = "cpu")]
    target: TargetArg,

    /// Stop after scheduling
    #[arg(long)]
    no_lower: bool,

    /// Keep guards and dead code in the lowered tree
    #[arg(long)]
    no_simplify: bool,

    /// What to emit
    #[arg(long, default_value = "tree")]
    emit: EmitKind,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    /// Host CPU, `openmp` loops
    Cpu,
    /// GPU, `threadIdx.*` / `blockIdx.*` loops
    Gpu,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Cpu => Target::cpu(),
            TargetArg::Gpu => Target::gpu(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Indented pseudo-code
    Tree,
    /// Tree as JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("loopsched v{}", loopsched::VERSION);
    debug!("Input file: {:?}", cli.input);

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let session = Session::from_json(&text)
        .with_context(|| format!("Failed to load session: {:?}", cli.input))?;
    let registry = session.registry().with_context(|| "Invalid function list")?;

    let mut commands = session.schedule.clone();
    commands.extend(cli.apply.iter().cloned());
    info!("Scheduling ({} commands)...", commands.len());
    let schedule = match loopsched::apply_commands(session.program, &commands, &registry, ScheduleConfig::default()) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!("Scheduling failed: {}", e);
            return Err(e.into());
        }
    };
    for command in schedule.history() {
        debug!("applied: {}", command);
    }

    let ast = if cli.no_lower {
        schedule.into_ast()
    } else {
        info!("Lowering for {:?}...", cli.target);
        let config = LowerConfig::default().with_simplify(!cli.no_simplify);
        lower_with(schedule.ast(), &cli.target.into(), &registry, &config)
            .with_context(|| "Lowering failed")?
    };

    let output = match cli.emit {
        EmitKind::Tree => ast.to_string(),
        EmitKind::Json => serde_json::to_string_pretty(&ast).with_context(|| "Failed to serialize tree")?,
    };
    write_output(&cli.output, &output)?;
    Ok(())
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
