mod config;
mod correction;
mod error;
mod inputs;
mod report;

pub use config::{Config, CorrectionConfig, OutputConfig, CONFIG_FILE};
pub use correction::{correct_until_stable, CorrectionAttempt, CorrectionOutcome, StopReason};
pub use error::{Result, RunnerError};
pub use inputs::{discover_queries, load_context, load_schema, QueryFile};
pub use report::{
    render_correction, render_corrections, render_result, OutputFormat, QueryReport, Report,
};

use rayon::prelude::*;
use sqlguard_core::model::{BusinessContext, ConfidenceResult, Recommendation};
use sqlguard_core::{ConfidenceScorer, Schema, SelfCorrector};
use tracing::info;

/// Everything a batch run needs, loaded once from a [`Config`].
pub struct Workspace {
    config: Config,
    scorer: ConfidenceScorer,
    corrector: SelfCorrector,
    schema: Schema,
    context: BusinessContext,
    queries: Vec<QueryFile>,
}

impl Workspace {
    pub fn load(config: Config) -> Result<Self> {
        let scorer = ConfidenceScorer::new(config.engine.clone())?;
        let corrector = SelfCorrector::new(&config.engine)?;
        let schema = load_schema(&config.schema.path)?;
        let context = match &config.context.path {
            Some(path) => load_context(path)?,
            None => BusinessContext::new(),
        };
        let queries = discover_queries(&config.queries.path)?;

        Ok(Self {
            config,
            scorer,
            corrector,
            schema,
            context,
            queries,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queries(&self) -> &[QueryFile] {
        &self.queries
    }

    pub fn evaluate(&self, sql: &str) -> ConfidenceResult {
        self.scorer.evaluate(sql, &self.schema, &self.context)
    }

    pub fn check(&self) -> Report {
        self.check_with_progress(|_| {})
    }

    /// Evaluates every query in parallel. `progress` is called once per
    /// finished query, from whichever worker finished it.
    pub fn check_with_progress<F>(&self, progress: F) -> Report
    where
        F: Fn(&QueryReport) + Sync,
    {
        let queries: Vec<QueryReport> = self
            .queries
            .par_iter()
            .map(|query| {
                let report = QueryReport {
                    name: query.name.clone(),
                    path: query.path.clone(),
                    result: self.evaluate(&query.sql),
                };
                progress(&report);
                report
            })
            .collect();

        let report = Report { queries };
        info!(
            queries = report.queries.len(),
            rejected = report.count(Recommendation::Reject),
            "checked batch"
        );
        report
    }

    pub fn correct(&self, sql: &str) -> CorrectionOutcome {
        correct_until_stable(
            &self.scorer,
            &self.corrector,
            sql,
            &self.schema,
            &self.context,
            self.config.correction.max_attempts,
        )
    }

    /// Runs the correction loop over every discovered query.
    pub fn correct_all(&self) -> Vec<(String, CorrectionOutcome)> {
        self.queries
            .par_iter()
            .map(|query| (query.name.clone(), self.correct(&query.sql)))
            .collect()
    }
}

/// Writes a rendered report to the configured output path, or stdout.
pub fn emit(config: &Config, rendered: &str) -> Result<()> {
    match &config.output.path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), "wrote report");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// Checks once, then re-checks whenever the schema, context or queries change.
pub fn watch(config: &Config) -> Result<()> {
    use console::style;
    use notify::{event::EventKind, Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};

    println!("{}", style("SqlGuard").green().bold());
    println!("  {} Initial check...", style("➜").green());
    run_check(config)?;

    println!("  {} Watching for changes...", style("➜").cyan());
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())?;

    watcher.watch(&config.schema.path, RecursiveMode::NonRecursive)?;
    watcher.watch(&config.queries.path, RecursiveMode::Recursive)?;
    if let Some(path) = &config.context.path {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
    }

    let output_path = config
        .output
        .path
        .as_ref()
        .map(|path| path.canonicalize().unwrap_or_else(|_| path.clone()));
    let cwd = std::env::current_dir().ok();

    for res in rx {
        match res {
            Ok(event) => {
                if output_path
                    .as_ref()
                    .is_some_and(|output| event.paths.contains(output))
                {
                    continue;
                }
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)) {
                    continue;
                }

                if let Some(changed_path) = event.paths.first() {
                    let relative_path = cwd
                        .as_deref()
                        .and_then(|cwd| changed_path.strip_prefix(cwd).ok())
                        .unwrap_or(changed_path);
                    println!(
                        "\n{} Changed: {}",
                        style("[⚡️CHECK]").yellow().bold(),
                        style(relative_path.display()).cyan()
                    );
                }

                if let Err(e) = run_check(config) {
                    println!("  {} Check failed: {}", style("✖").red(), style(e.report()).red());
                }
            }
            Err(e) => println!("  {} Watch error: {}", style("✖").red(), style(e).red()),
        }
    }

    Ok(())
}

fn run_check(config: &Config) -> Result<()> {
    // Reloaded on every run so schema and context edits are picked up.
    let workspace = Workspace::load(config.clone())?;
    let report = workspace.check();
    emit(config, &report.render(config.output.format)?)
}

