//! Vocabulary of SQL functions the engine recognizes.

use std::collections::BTreeSet;

/// Functions that collapse a group of rows into a single value.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "AVG", "COUNT", "SUM", "MIN", "MAX", "EVERY", "BIT_AND", "BIT_OR", "BOOL_AND", "BOOL_OR",
    "ARRAY_AGG", "STRING_AGG", "JSON_AGG", "JSONB_AGG", "JSON_OBJECT_AGG", "STDDEV",
    "STDDEV_POP", "STDDEV_SAMP", "VARIANCE", "VAR_POP", "VAR_SAMP", "CORR", "COVAR_POP",
    "COVAR_SAMP", "PERCENTILE_CONT", "PERCENTILE_DISC", "MODE", "LISTAGG", "GROUP_CONCAT",
    "ANY_VALUE", "COUNT_IF", "MEDIAN",
];

/// Scalar, date/time and window functions accepted without configuration.
pub const SCALAR_FUNCTIONS: &[&str] = &[
    // math
    "ABS", "ACOS", "ASIN", "ATAN", "ATAN2", "CBRT", "CEIL", "CEILING", "COS", "COT", "DEGREES",
    "DIV", "EXP", "FLOOR", "LN", "LOG", "LOG10", "MOD", "PI", "POW", "POWER", "RADIANS", "RANDOM",
    "ROUND", "SIGN", "SIN", "SQRT", "TAN", "TRUNC", "WIDTH_BUCKET",
    // string
    "ASCII", "BTRIM", "CHR", "CHAR_LENGTH", "CHARACTER_LENGTH", "CONCAT", "CONCAT_WS", "FORMAT",
    "INITCAP", "LEFT", "LENGTH", "LOWER", "LPAD", "LTRIM", "MD5", "OCTET_LENGTH", "POSITION",
    "REGEXP_REPLACE", "REGEXP_MATCHES", "REPEAT", "REPLACE", "REVERSE", "RIGHT", "RPAD", "RTRIM",
    "SPLIT_PART", "STRPOS", "SUBSTR", "SUBSTRING", "TO_ASCII", "TO_HEX", "TRANSLATE", "TRIM",
    "UPPER",
    // date and time
    "AGE", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATE", "DATE_ADD", "DATE_DIFF",
    "DATEDIFF", "DATE_PART", "DATE_SUB", "DATE_TRUNC", "EXTRACT", "ISFINITE", "JUSTIFY_DAYS",
    "JUSTIFY_HOURS", "JUSTIFY_INTERVAL", "LOCALTIME", "LOCALTIMESTAMP", "MAKE_DATE",
    "MAKE_TIMESTAMP", "NOW", "TIMEOFDAY", "TO_CHAR", "TO_DATE", "TO_NUMBER", "TO_TIMESTAMP",
    // conditional and conversion
    "CAST", "COALESCE", "GREATEST", "IFNULL", "LEAST", "NULLIF", "NVL",
    // window
    "ROW_NUMBER", "RANK", "DENSE_RANK", "PERCENT_RANK", "CUME_DIST", "NTILE", "LAG", "LEAD",
    "FIRST_VALUE", "LAST_VALUE", "NTH_VALUE",
];

/// Keywords some dialects parse as bare identifiers rather than calls.
pub const NILADIC_FUNCTIONS: &[&str] = &[
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURRENT_ROLE",
    "CURRENT_SCHEMA", "CURRENT_CATALOG", "LOCALTIME", "LOCALTIMESTAMP", "SESSION_USER", "USER",
];

pub fn is_niladic(name: &str) -> bool {
    NILADIC_FUNCTIONS.contains(&name.to_uppercase().as_str())
}

/// Reduces a possibly qualified, possibly quoted function name to its
/// upper-case base name: `pg_catalog."sum"` becomes `SUM`.
pub fn normalize_function_name(name: &str) -> String {
    let base = name.rsplit('.').next().unwrap_or(name);
    base.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_uppercase()
}

pub fn is_aggregate(name: &str) -> bool {
    let normalized = normalize_function_name(name);
    AGGREGATE_FUNCTIONS.contains(&normalized.as_str())
}

/// Whitelist consulted by the hallucination detector.
#[derive(Debug, Clone)]
pub struct FunctionCatalog {
    known: BTreeSet<String>,
}

impl FunctionCatalog {
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut known: BTreeSet<String> = AGGREGATE_FUNCTIONS
            .iter()
            .chain(SCALAR_FUNCTIONS)
            .map(|name| name.to_string())
            .collect();
        known.extend(extra.into_iter().map(|name| normalize_function_name(name.as_ref())));
        Self { known }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(&normalize_function_name(name))
    }
}

impl Default for FunctionCatalog {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_qualified_and_quoted_names() {
        assert_eq!(normalize_function_name("pg_catalog.\"sum\""), "SUM");
        assert_eq!(normalize_function_name("count"), "COUNT");
    }

    #[test]
    fn recognizes_aggregates_case_insensitively() {
        assert!(is_aggregate("sum"));
        assert!(is_aggregate("Count"));
        assert!(!is_aggregate("upper"));
        assert!(!is_aggregate("row_number"));
    }

    #[test]
    fn catalog_accepts_extra_functions() {
        let catalog = FunctionCatalog::new(["calculate_revenue"]);
        assert!(catalog.contains("CALCULATE_REVENUE"));
        assert!(catalog.contains("coalesce"));
        assert!(!FunctionCatalog::default().contains("calculate_revenue"));
    }
}
