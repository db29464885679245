//! Jattack CLI entrypoint.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use jattack::{Config, GenerateOptions, GeneratedProgram, SearchStrategy, TemplateClass};

#[derive(Debug, Parser)]
#[command(name = "jattack")]
#[command(about = "template-driven program generation for JIT compiler testing")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "jattack.toml")]
    config: PathBuf,

    /// Working directory for execution.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate programs from a template document
    Generate {
        template: PathBuf,

        #[arg(long)]
        strategy: Option<SearchStrategy>,

        #[arg(long)]
        seed: Option<u64>,

        /// Number of programs to generate.
        #[arg(long)]
        outputs: Option<u64>,

        /// Entry invocations per run.
        #[arg(long)]
        invocations: Option<u64>,

        /// Systematic search runs until the whole space is explored.
        #[arg(long)]
        exhaustive: bool,

        #[arg(long)]
        no_solver_aid: bool,

        #[arg(long)]
        no_hot_filling: bool,

        /// Wrap filled expressions in hole tracking calls.
        #[arg(long)]
        track_holes: bool,

        /// Output directory for generated programs.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Execute a generated program and print its checksum
    Run {
        program: PathBuf,

        /// Upper bound on entry invocations.
        #[arg(long)]
        cap: Option<u64>,
    },

    /// Print version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    if let Some(cwd) = &cli.cwd {
        if let Err(err) = std::env::set_current_dir(cwd) {
            return print_error_and_exit(
                &cli,
                anyhow::anyhow!(err).context(format!("failed to set cwd to {}", cwd.display())),
            );
        }
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Generate {
            template,
            strategy,
            seed,
            outputs,
            invocations,
            exhaustive,
            no_solver_aid,
            no_hot_filling,
            track_holes,
            out,
        } => {
            let text = std::fs::read_to_string(template)
                .with_context(|| format!("failed to read template {}", template.display()))?;
            let class = TemplateClass::from_json(&text)
                .with_context(|| format!("invalid template {}", template.display()))?;
            let opt = GenerateOptions {
                strategy: *strategy,
                seed: *seed,
                n_outputs: *outputs,
                invocations: *invocations,
                exhaustive: *exhaustive,
                no_solver_aid: *no_solver_aid,
                no_hot_filling: *no_hot_filling,
                track_holes: *track_holes,
                output_dir: out.clone(),
            };
            let result = jattack::generate(config, &class, &opt)?;
            jattack::write_summary(&result.summary, &opt.apply(config).output_dir)?;
            if cli.json {
                print_json(cli, &result.summary)?;
            } else {
                println!("{}", result.summary.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Run { program, cap } => {
            let loaded = GeneratedProgram::load(program)
                .with_context(|| format!("failed to load program {}", program.display()))?;
            let report = jattack::run_program(&loaded, *cap)?;
            if cli.json {
                print_json(cli, &report)?;
            } else {
                println!("{}", report.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Version => {
            print_json(cli, &jattack::version_info())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: serde::Serialize>(cli: &Cli, value: &T) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}
