use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sqlguard_core::model::Recommendation;
use sqlguard_core::{ConfidenceScorer, EngineConfig, SelfCorrector};
use sqlguard_runner::{
    correct_until_stable, load_context, load_schema, render_correction, render_corrections,
    render_result, Config, CorrectionConfig, OutputFormat, RunnerError, Workspace, CONFIG_FILE,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new sqlguard.toml config file
    Init,

    /// Score every configured query
    Check {
        /// Output format, overriding the config file
        #[arg(long)]
        format: Option<OutputFormat>,
    },

    /// Score a single query
    Eval {
        sql: String,

        /// JSON schema file mapping tables to columns
        #[arg(long)]
        schema: PathBuf,

        /// Business context, one statement per line or a JSON array
        #[arg(long)]
        context: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        /// Run the correction loop after scoring
        #[arg(long)]
        correct: bool,
    },

    /// Run the correction loop on the given SQL, or on every configured query
    Correct {
        sql: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Check and re-check whenever inputs change
    Watch,
}

const EXAMPLE_CONFIG: &str = r#"version = "1.0"

[schema]
path = "schema.json"

[context]
path = "context.txt"

[queries]
path = "queries/"

[output]
format = "text"

[correction]
max_attempts = 2

[engine]
critical_ceiling = 0.65

[engine.parser]
dialect = "generic"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init => {
            let config_path = env::current_dir()?.join(CONFIG_FILE);
            if config_path.exists() {
                println!("Config file already exists at {}", config_path.display());
                return Ok(());
            }

            fs::write(&config_path, EXAMPLE_CONFIG)?;
            println!("Created {}", CONFIG_FILE);
            Ok(())
        }
        Commands::Eval {
            sql,
            schema,
            context,
            json,
            correct,
        } => {
            let (engine, correction) = settings()?;
            let scorer = ConfidenceScorer::new(engine.clone())?;
            let schema = load_schema(&schema)?;
            let context = match context {
                Some(path) => load_context(&path)?,
                None => Vec::new(),
            };
            let format = if json { OutputFormat::Json } else { OutputFormat::Text };

            if correct {
                let corrector = SelfCorrector::new(&engine)?;
                let outcome = correct_until_stable(
                    &scorer,
                    &corrector,
                    &sql,
                    &schema,
                    &context,
                    correction.max_attempts,
                );
                println!("{}", render_correction(&outcome, format)?.trim_end());
                exit_for(outcome.final_result().recommendation);
                return Ok(());
            }

            let result = scorer.evaluate(&sql, &schema, &context);
            println!("{}", render_result(&result, format)?.trim_end());
            exit_for(result.recommendation);
            Ok(())
        }
        cmd => {
            let (config, config_dir) = match Config::find_and_load(&env::current_dir()?) {
                Ok(found) => found,
                Err(e @ RunnerError::ConfigNotFound(_)) => {
                    eprintln!("{} {}", style("Error:").red().bold(), e.report());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{} {}", style("Error:").red().bold(), e.report());
                    return Err(e.into());
                }
            };
            // stdout carries the report, which may be JSON
            eprintln!("Using configuration from: {}", config_dir.display());
            debug!(schema = %config.schema.path.display(), queries = %config.queries.path.display(), "loaded configuration");

            match cmd {
                Commands::Check { format } => {
                    let format = format.unwrap_or(config.output.format);
                    let workspace = Workspace::load(config)?;

                    let bar = ProgressBar::new(workspace.queries().len() as u64);
                    bar.set_style(
                        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")?
                            .progress_chars("=> "),
                    );
                    let report = workspace.check_with_progress(|query| {
                        bar.set_message(query.name.clone());
                        bar.inc(1);
                    });
                    bar.finish_and_clear();

                    sqlguard_runner::emit(workspace.config(), &report.render(format)?)?;
                    if report.has_rejections() {
                        std::process::exit(1);
                    }
                    Ok(())
                }
                Commands::Correct { sql, json } => {
                    let format = if json { OutputFormat::Json } else { OutputFormat::Text };
                    let workspace = Workspace::load(config)?;

                    let outcomes = if sql.is_empty() {
                        workspace.correct_all()
                    } else {
                        sql.iter()
                            .enumerate()
                            .map(|(i, sql)| (format!("#{}", i + 1), workspace.correct(sql)))
                            .collect()
                    };
                    println!("{}", render_corrections(&outcomes, format)?.trim_end());
                    Ok(())
                }
                Commands::Watch => {
                    println!("Starting watch mode...");
                    sqlguard_runner::watch(&config)?;
                    Ok(())
                }
                Commands::Init | Commands::Eval { .. } => unreachable!(),
            }
        }
    }
}

/// Engine and correction settings from the nearest sqlguard.toml, or the
/// defaults when there is none.
fn settings() -> Result<(EngineConfig, CorrectionConfig), RunnerError> {
    match Config::find_and_load(&env::current_dir()?) {
        Ok((config, _)) => Ok((config.engine, config.correction)),
        Err(RunnerError::ConfigNotFound(_)) => Ok((EngineConfig::default(), CorrectionConfig::default())),
        Err(e) => Err(e),
    }
}

/// Exits with status 1 on a REJECT verdict; other verdicts return.
fn exit_for(recommendation: Recommendation) {
    if recommendation == Recommendation::Reject {
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
