use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, bail};
use prodsweep_core::config::{FactorConfig, LinkedFactorConfig, LinkedParameter, SweepConfig};
use prodsweep_core::engine::SimulationEngine;
use prodsweep_core::engine::process::ProcessEngine;
use prodsweep_core::engine::toy::ToyEconomy;
use prodsweep_core::model::ParamValue;
use prodsweep_core::output::{OutputLayout, atomic_write, write_report};
use prodsweep_core::table::csv::read_table;
use prodsweep_core::{SweepProgress, SweepReport, run_sweep};

mod logging;

use logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "prodsweep")]
#[command(about = "Parameter sweeps over agent-based production simulations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sweep and write its tables
    Run(RunArgs),
    /// Print the shape and header of a persisted table
    Inspect {
        /// CSV file written by `run`
        path: PathBuf,
    },
    /// Write a starter configuration file
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    /// Built-in production economy
    Toy,
    /// External engine process speaking the JSON line protocol
    Process,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Sweep configuration (YAML)
    #[arg(short, long)]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = EngineKind::Toy)]
    engine: EngineKind,

    /// Engine executable, required with `--engine process`
    #[arg(long)]
    engine_cmd: Option<PathBuf>,

    /// Extra argument passed to the engine executable (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Seed of the built-in engine
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Directory receiving results and the log file
    #[arg(short, long, default_value = "results")]
    out_dir: PathBuf,

    /// Override `runs`
    #[arg(long)]
    runs: Option<u32>,

    /// Override `max_ticks`
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Override `parallel_jobs`
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Override `lorenz_bins`
    #[arg(long)]
    bins: Option<usize>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut SweepConfig) {
        if let Some(runs) = self.runs {
            config.runs = runs;
        }
        if let Some(max_ticks) = self.max_ticks {
            config.max_ticks = max_ticks;
        }
        if let Some(jobs) = self.jobs {
            config.parallel_jobs = jobs;
        }
        if let Some(bins) = self.bins {
            config.lorenz_bins = bins;
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    match Args::parse().command {
        Command::Run(args) => run(&args),
        Command::Inspect { path } => inspect(&path),
        Command::InitConfig { path, force } => init_config(&path, force),
    }
}

fn run(args: &RunArgs) -> color_eyre::Result<()> {
    let _log_guard = init_logging(&args.out_dir, &args.log_level)?;

    let mut config = SweepConfig::load(&args.config)
        .wrap_err_with(|| format!("loading {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate()?;

    let report = match args.engine {
        EngineKind::Toy => {
            let engine = ToyEconomy::new(args.seed, config.reporters.clone());
            sweep_with_progress(&engine, &config)?
        }
        EngineKind::Process => {
            let Some(cmd) = &args.engine_cmd else {
                bail!("--engine process requires --engine-cmd");
            };
            let engine = ProcessEngine::new(cmd, args.engine_args.clone(), &config.reporters);
            sweep_with_progress(&engine, &config)?
        }
    };

    let layout = OutputLayout::new(&args.out_dir, &config.output_stem);
    let written = write_report(&report, &config, &layout)?;

    print_summary(&report, layout.dir());
    tracing::info!(manifest = %written.manifest.display(), "Sweep finished");
    Ok(())
}

/// Run the sweep while a watcher thread reports progress on stderr
fn sweep_with_progress<E: SimulationEngine>(
    engine: &E,
    config: &SweepConfig,
) -> color_eyre::Result<SweepReport> {
    let progress = SweepProgress::default();
    let done = AtomicBool::new(false);

    let report = std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut last = usize::MAX;
            while !done.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(250));
                let completed = progress.completed();
                if completed != last && progress.total() > 0 {
                    eprint!("\rProgress: {completed}/{} combinations", progress.total());
                    last = completed;
                }
            }
            if last != usize::MAX {
                eprintln!();
            }
        });

        let report = run_sweep(engine, config, Some(&progress));
        done.store(true, Ordering::Relaxed);
        report
    })?;
    Ok(report)
}

fn print_summary(report: &SweepReport, dir: &Path) {
    println!(
        "{} of {} combinations completed in {:.2}s",
        report.completed(),
        report.combinations,
        report.elapsed.as_secs_f64()
    );
    for failure in &report.failures {
        println!("  failed: {failure}");
    }
    if !report.lorenz.excluded.is_empty() {
        let excluded: Vec<String> = report.lorenz.excluded.iter().map(|c| c.to_string()).collect();
        println!(
            "  excluded from Lorenz tables (degenerate wealth): {}",
            excluded.join(", ")
        );
    }
    println!("Results written to {}", dir.display());
}

fn inspect(path: &Path) -> color_eyre::Result<()> {
    let table = read_table(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    println!(
        "{}: {} rows x {} columns",
        path.display(),
        table.len(),
        table.columns().len()
    );
    for column in table.columns() {
        println!("  {column}");
    }
    Ok(())
}

fn starter_config() -> SweepConfig {
    let percent = |name: &str, column: &str| LinkedParameter {
        name: name.to_string(),
        column: Some(column.to_string()),
    };
    let tuple = |values: [i64; 3]| values.into_iter().map(ParamValue::Int).collect::<Vec<_>>();

    SweepConfig {
        model: "production.nlogo".to_string(),
        factors: vec![
            FactorConfig::new("num-workers", vec![ParamValue::Int(50), ParamValue::Int(100)])
                .with_column("Workers"),
            FactorConfig::new("num-owners", vec![ParamValue::Int(5), ParamValue::Int(10)])
                .with_column("Owners"),
            FactorConfig::new("num-assets", vec![ParamValue::Int(10)]).with_column("Assets"),
        ],
        linked: vec![LinkedFactorConfig {
            parameters: vec![
                percent("percent-capital", "Capital_perc"),
                percent("percent-wages", "Wages_perc"),
                percent("percent-owner-income", "Income_perc"),
            ],
            values: vec![tuple([30, 50, 20]), tuple([20, 60, 20])],
        }],
        ..Default::default()
    }
}

fn init_config(path: &Path, force: bool) -> color_eyre::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let yaml = starter_config().to_yaml()?;
    atomic_write(path, &yaml).wrap_err_with(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
