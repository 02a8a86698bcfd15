//! Text and JSON rendering of batch reports and correction outcomes.

use console::style;
use serde::{Deserialize, Serialize};
use sqlguard_core::model::{ConfidenceResult, Recommendation, Severity};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use crate::correction::CorrectionOutcome;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{}', expected text or json", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub name: String,
    pub path: PathBuf,
    pub result: ConfidenceResult,
}

/// Results of one batch, in query discovery order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub queries: Vec<QueryReport>,
}

impl Report {
    pub fn count(&self, recommendation: Recommendation) -> usize {
        self.queries
            .iter()
            .filter(|query| query.result.recommendation == recommendation)
            .count()
    }

    pub fn has_rejections(&self) -> bool {
        self.count(Recommendation::Reject) > 0
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Text => Ok(self.render_text()),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        for query in &self.queries {
            let _ = writeln!(
                out,
                "{} {} {}",
                verdict(query.result.recommendation),
                style(&query.name).bold(),
                style(format!("({:.2})", query.result.overall_confidence)).dim()
            );
            write_issues(&mut out, &query.result);
        }
        let _ = writeln!(
            out,
            "\n{} queries: {} accepted, {} to correct, {} rejected",
            self.queries.len(),
            style(self.count(Recommendation::Accept)).green(),
            style(self.count(Recommendation::Correct)).yellow(),
            style(self.count(Recommendation::Reject)).red()
        );
        out
    }
}

/// Renders a single evaluation the way one entry of a batch report looks.
pub fn render_result(result: &ConfidenceResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "{} {}",
                verdict(result.recommendation),
                style(format!("confidence {:.4}", result.overall_confidence)).bold()
            );
            for score in &result.dimension_scores {
                let _ = writeln!(
                    out,
                    "  {:<9} {:.2} {}",
                    score.dimension.as_str(),
                    score.raw_score,
                    style(format!("x{:.2}", score.weight)).dim()
                );
            }
            write_issues(&mut out, result);
            if result.hallucinations_detected {
                let _ = writeln!(out, "  {} hallucinations detected", style("!").red().bold());
            }
            Ok(out)
        }
    }
}

pub fn render_correction(outcome: &CorrectionOutcome, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(outcome)?);
    }

    let mut out = String::new();
    let initial = &outcome.initial;
    let _ = writeln!(
        out,
        "{} {:.4}  {}",
        verdict(initial.recommendation),
        initial.overall_confidence,
        outcome.original_sql
    );
    for attempt in &outcome.attempts {
        let fixes: Vec<&str> = attempt.applied_fixes.iter().map(|fix| fix.as_str()).collect();
        let _ = writeln!(
            out,
            "  {} attempt {} [{}]",
            style("➜").cyan(),
            attempt.attempt,
            fixes.join(", ")
        );
        let _ = writeln!(
            out,
            "{} {:.4}  {}",
            verdict(attempt.result.recommendation),
            attempt.result.overall_confidence,
            attempt.sql
        );
    }
    if outcome.attempts.is_empty() {
        write_issues(&mut out, initial);
    }
    Ok(out)
}

#[derive(Serialize)]
struct NamedOutcome<'a> {
    name: &'a str,
    #[serde(flatten)]
    outcome: &'a CorrectionOutcome,
}

/// Renders several correction outcomes. JSON output is a single array of
/// outcomes, each tagged with its query name.
pub fn render_corrections(outcomes: &[(String, CorrectionOutcome)], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let named: Vec<NamedOutcome<'_>> = outcomes
            .iter()
            .map(|(name, outcome)| NamedOutcome { name, outcome })
            .collect();
        return Ok(serde_json::to_string_pretty(&named)?);
    }

    let mut out = String::new();
    for (name, outcome) in outcomes {
        let _ = writeln!(out, "{}", style(name).bold());
        out.push_str(&render_correction(outcome, format)?);
    }
    Ok(out)
}

fn verdict(recommendation: Recommendation) -> String {
    let label = format!("[{}]", recommendation.as_str());
    match recommendation {
        Recommendation::Accept => style(label).green().bold().to_string(),
        Recommendation::Correct => style(label).yellow().bold().to_string(),
        Recommendation::Reject => style(label).red().bold().to_string(),
    }
}

fn write_issues(out: &mut String, result: &ConfidenceResult) {
    for issue in &result.issues {
        let marker = match issue.severity {
            Severity::Critical => style("✖").red(),
            Severity::Warning => style("⚠").yellow(),
            Severity::Info => style("•").dim(),
        };
        let location = issue
            .location
            .map(|location| format!(" at {}", location))
            .unwrap_or_default();
        let _ = writeln!(out, "  {} {}{}: {}", marker, issue.code, location, issue.message);
        if let Some(suggestion) = &issue.suggestion {
            let _ = writeln!(out, "      {}", style(suggestion).cyan());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::correct_until_stable;
    use sqlguard_core::{ConfidenceScorer, SelfCorrector};
    use sqlguard_macros::schema;

    fn report() -> Report {
        let scorer = ConfidenceScorer::default();
        let schema = schema! { sales: [region, net_revenue] };
        let queries = [("ok", "SELECT region FROM sales"), ("broken", "SELEC region")]
            .into_iter()
            .map(|(name, sql)| QueryReport {
                name: name.to_string(),
                path: PathBuf::from(format!("{}.sql", name)),
                result: scorer.evaluate(sql, &schema, &[]),
            })
            .collect();
        Report { queries }
    }

    #[test]
    fn parses_output_formats() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn counts_recommendations() {
        let report = report();
        assert_eq!(report.count(Recommendation::Accept), 1);
        assert_eq!(report.count(Recommendation::Reject), 1);
        assert!(report.has_rejections());
    }

    #[test]
    fn text_lists_every_query_and_issue() {
        console::set_colors_enabled(false);
        let text = report().render(OutputFormat::Text).unwrap();
        assert!(text.contains("[ACCEPT] ok"));
        assert!(text.contains("[REJECT] broken"));
        assert!(text.contains("syntax_error"));
        assert!(text.contains("2 queries: 1 accepted, 0 to correct, 1 rejected"));
    }

    fn outcomes() -> Vec<(String, CorrectionOutcome)> {
        let scorer = ConfidenceScorer::default();
        let corrector = SelfCorrector::new(scorer.config()).unwrap();
        let schema = schema! { sales: [region, net_revenue] };
        [
            ("where_aggregate", "SELECT region FROM sales WHERE SUM(net_revenue) > 1 GROUP BY region"),
            ("plain", "SELECT region FROM sales"),
        ]
        .into_iter()
        .map(|(name, sql)| {
            let outcome = correct_until_stable(&scorer, &corrector, sql, &schema, &[], 2);
            (name.to_string(), outcome)
        })
        .collect()
    }

    #[test]
    fn corrections_render_as_one_json_array() {
        let json = render_corrections(&outcomes(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entries = value.as_array().expect("a JSON array");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "where_aggregate");
        assert!(entries[0]["original_sql"].as_str().unwrap().contains("WHERE SUM"));
        assert_eq!(entries[1]["name"], "plain");
    }

    #[test]
    fn corrections_text_names_each_query() {
        console::set_colors_enabled(false);
        let text = render_corrections(&outcomes(), OutputFormat::Text).unwrap();
        assert!(text.starts_with("where_aggregate\n"));
        assert!(text.contains("\nplain\n"));
    }

    #[test]
    fn json_is_machine_readable() {
        let json = report().render(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["queries"][0]["name"], "ok");
        assert_eq!(value["queries"][1]["result"]["recommendation"], "REJECT");
    }
}
