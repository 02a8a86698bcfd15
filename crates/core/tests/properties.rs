use proptest::prelude::*;
use sqlguard_core::prelude::*;
use sqlguard_macros::schema;

fn sales() -> Schema {
    schema! {
        sales: [region, net_revenue, fiscal_year],
        regions: [id, name],
    }
}

/// SELECT lists drawn from known and unknown columns, with an optional filter.
fn query_parts() -> impl Strategy<Value = (Vec<&'static str>, Option<u32>)> {
    (
        prop::sample::subsequence(vec!["region", "net_revenue", "fiscal_year", "bogus"], 1..=4),
        prop::option::of(1990u32..2100),
    )
}

/// Where the generated SELECT ends up in the statement
#[derive(Debug, Clone, Copy)]
enum Nesting {
    TopLevel,
    Derived,
    Union,
    Cte,
}

fn nesting() -> impl Strategy<Value = Nesting> {
    prop_oneof![
        Just(Nesting::TopLevel),
        Just(Nesting::Derived),
        Just(Nesting::Union),
        Just(Nesting::Cte),
    ]
}

impl Nesting {
    fn wrap(self, select: &str, outer_column: &str) -> String {
        match self {
            Nesting::TopLevel => select.to_string(),
            Nesting::Derived => format!("SELECT t.{} FROM ({}) AS t", outer_column, select),
            Nesting::Union => format!("{} UNION ALL {}", select, select),
            Nesting::Cte => format!("WITH picked AS ({}) SELECT {} FROM picked", select, outer_column),
        }
    }
}

fn render(columns: &[&str], join: Option<&str>, year: Option<u32>) -> String {
    let mut sql = format!("SELECT {} FROM sales", columns.join(", "));
    if let Some(table) = join {
        sql.push_str(&format!(" CROSS JOIN {}", table));
    }
    if let Some(year) = year {
        sql.push_str(&format!(" WHERE fiscal_year = {}", year));
    }
    sql
}

fn render_nested(columns: &[&str], join: Option<&str>, year: Option<u32>, nesting: Nesting) -> String {
    nesting.wrap(&render(columns, join, year), columns[0])
}

proptest! {
    #[test]
    fn evaluation_is_deterministic((columns, year) in query_parts(), nesting in nesting()) {
        let scorer = ConfidenceScorer::default();
        let sql = render_nested(&columns, None, year, nesting);
        let first = scorer.evaluate(&sql, &sales(), &[]);
        let second = scorer.evaluate(&sql, &sales(), &[]);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn unknown_tables_never_raise_confidence(
        (columns, year) in query_parts(),
        suffix in "[a-z]{2,8}",
        nesting in nesting(),
    ) {
        let scorer = ConfidenceScorer::default();
        let ghost = format!("ghost_{}", suffix);

        let without = scorer.evaluate(&render_nested(&columns, None, year, nesting), &sales(), &[]);
        let with = scorer.evaluate(&render_nested(&columns, Some(&ghost), year, nesting), &sales(), &[]);

        prop_assert!(with.has_issue(IssueCode::UnknownTable));
        prop_assert!(with.overall_confidence <= without.overall_confidence);
        prop_assert!(with.score(Dimension::Schema) <= without.score(Dimension::Schema));
    }

    #[test]
    fn scores_stay_in_range(sql in ".{0,80}") {
        let result = ConfidenceScorer::default().evaluate(&sql, &sales(), &[]);

        prop_assert!((0.0..=1.0).contains(&result.overall_confidence));
        prop_assert_eq!(result.dimension_scores.len(), 5);
        for score in &result.dimension_scores {
            prop_assert!((0.0..=1.0).contains(&score.raw_score));
        }
        if result.critical_issues().next().is_some() {
            prop_assert!(result.overall_confidence <= 0.65);
        }
    }

    #[test]
    fn empty_context_never_costs_confidence((columns, year) in query_parts(), nesting in nesting()) {
        let sql = render_nested(&columns, None, year, nesting);
        let result = ConfidenceScorer::default().evaluate(&sql, &sales(), &[]);
        prop_assert_eq!(result.score(Dimension::Context), 1.0);
    }

    #[test]
    fn aggregate_filters_are_corrected_at_any_nesting(threshold in 0u32..100_000, nesting in nesting()) {
        let scorer = ConfidenceScorer::default();
        let corrector = SelfCorrector::new(scorer.config()).unwrap();
        let select = format!(
            "SELECT region, SUM(net_revenue) AS total FROM sales WHERE SUM(net_revenue) > {} GROUP BY region",
            threshold
        );
        let sql = nesting.wrap(&select, "region");

        let before = scorer.evaluate(&sql, &sales(), &[]);
        prop_assert!(before.has_issue(IssueCode::AggregateInWhere));

        let correction = corrector.correct(&sql, &before.issues);
        prop_assert_eq!(&correction.applied_fixes, &vec![FixCode::MoveAggregateToHaving]);
        let corrected = correction.corrected_sql.unwrap();
        let after = scorer.evaluate(&corrected, &sales(), &[]);
        prop_assert!(!after.has_issue(IssueCode::AggregateInWhere));
        prop_assert!(after.overall_confidence >= before.overall_confidence);
    }

    #[test]
    fn long_condition_chains_stay_in_range(terms in 1usize..3_000) {
        let sql = format!(
            "SELECT region FROM sales WHERE {}fiscal_year = 1",
            "fiscal_year = 1 AND ".repeat(terms)
        );
        let result = ConfidenceScorer::default().evaluate(&sql, &sales(), &[]);
        prop_assert!((0.0..=1.0).contains(&result.overall_confidence));
        if result.has_issue(IssueCode::SyntaxError) {
            prop_assert_eq!(result.recommendation, Recommendation::Reject);
        }
    }
}
