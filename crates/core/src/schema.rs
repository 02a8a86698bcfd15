//! Caller-supplied schema and the case-insensitive index built from it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping of table name to its column names, as supplied by the caller.
///
/// Serializes as `{"sales": ["region", "net_revenue"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, merging columns if the exact name already exists
    pub fn add_table<I, C>(&mut self, name: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.tables
            .entry(name.into())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
    }

    pub fn with_table<I, C>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.add_table(name, columns);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.tables.iter().map(|(name, columns)| (name.as_str(), columns))
    }
}

impl<K, I, C> FromIterator<(K, I)> for Schema
where
    K: Into<String>,
    I: IntoIterator<Item = C>,
    C: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut schema = Schema::new();
        for (name, columns) in iter {
            schema.add_table(name, columns);
        }
        schema
    }
}

/// Read-only, case-insensitive lookup of tables and columns.
///
/// Table keys that collide after case-folding have their column sets merged.
/// Built once per evaluation and dropped with it.
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    tables: BTreeMap<String, BTreeSet<String>>,
    supplied: bool,
}

impl SchemaIndex {
    pub fn new(schema: &Schema, include_system_catalog: bool) -> Self {
        let mut tables: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, columns) in schema.tables() {
            tables
                .entry(name.to_lowercase())
                .or_default()
                .extend(columns.iter().map(|c| c.to_lowercase()));
        }

        let supplied = !tables.is_empty();
        if supplied && include_system_catalog {
            for (name, columns) in SYSTEM_CATALOG {
                tables
                    .entry(name.to_string())
                    .or_default()
                    .extend(columns.iter().map(|c| c.to_string()));
            }
        }

        Self { tables, supplied }
    }

    /// True when the caller supplied no tables, in which case nothing
    /// about table or column existence can be proven.
    pub fn is_empty(&self) -> bool {
        !self.supplied
    }

    /// Resolves a (possibly schema-qualified) table name to its index key.
    ///
    /// `public.sales` falls back to `sales` when only the bare name is known.
    pub fn resolve_table(&self, name: &str) -> Option<&str> {
        let lowered = name.to_lowercase();
        if let Some((key, _)) = self.tables.get_key_value(&lowered) {
            return Some(key.as_str());
        }
        let last = lowered.rsplit('.').next()?;
        self.tables
            .get_key_value(last)
            .map(|(key, _)| key.as_str())
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.resolve_table(table)
            .and_then(|key| self.tables.get(key))
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|columns| columns.contains(&column.to_lowercase()))
    }

    /// True if any table in the index has the column
    pub fn knows_column(&self, column: &str) -> bool {
        let lowered = column.to_lowercase();
        self.tables.values().any(|columns| columns.contains(&lowered))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Closest known table name, if one is within a plausible edit distance
    pub fn closest_table(&self, name: &str) -> Option<&str> {
        closest(name, self.tables.keys().map(String::as_str))
    }

    /// Closest column among the given tables (or all tables when empty)
    pub fn closest_column<'a>(&'a self, tables: &[&str], name: &str) -> Option<&'a str> {
        let candidates: Vec<&'a str> = if tables.is_empty() {
            self.tables
                .values()
                .flat_map(|columns| columns.iter().map(String::as_str))
                .collect()
        } else {
            tables
                .iter()
                .filter_map(|table| self.columns(table))
                .flat_map(|columns| columns.iter().map(String::as_str))
                .collect()
        };
        closest(name, candidates.into_iter())
    }
}

fn closest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let target = name.to_lowercase();
    let max_distance = (target.chars().count() / 3).max(1);
    candidates
        .map(|candidate| (levenshtein(&target, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min()
        .map(|(_, candidate)| candidate)
}

/// Simple Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        previous = current;
    }
    previous[b.len()]
}

/// PostgreSQL catalog tables that generated SQL commonly introspects.
const SYSTEM_CATALOG: &[(&str, &[&str])] = &[
    (
        "pg_tables",
        &[
            "schemaname", "tablename", "tableowner", "tablespace", "hasindexes", "hasrules",
            "hastriggers", "rowsecurity",
        ],
    ),
    (
        "pg_catalog.pg_tables",
        &[
            "schemaname", "tablename", "tableowner", "tablespace", "hasindexes", "hasrules",
            "hastriggers", "rowsecurity",
        ],
    ),
    (
        "pg_class",
        &[
            "oid", "relname", "relnamespace", "reltype", "relowner", "relam", "relfilenode",
            "reltablespace", "relpages", "reltuples", "relallvisible", "reltoastrelid",
            "relhasindex", "relisshared", "relpersistence", "relkind", "relnatts", "relchecks",
            "relhasrules", "relhastriggers", "relhassubclass", "relrowsecurity",
            "relforcerowsecurity", "relispopulated", "relreplident", "relispartition",
            "relfrozenxid", "relminmxid", "relacl", "reloptions", "relpartbound",
        ],
    ),
    ("pg_namespace", &["oid", "nspname", "nspowner", "nspacl"]),
    (
        "pg_attribute",
        &[
            "attrelid", "attname", "atttypid", "attstattarget", "attlen", "attnum", "attndims",
            "attcacheoff", "atttypmod", "attbyval", "attstorage", "attalign", "attnotnull",
            "atthasdef", "attidentity", "attgenerated", "attisdropped", "attislocal",
            "attinhcount", "attcollation", "attacl", "attoptions", "attfdwoptions",
            "attmissingval",
        ],
    ),
    (
        "information_schema.tables",
        &[
            "table_catalog", "table_schema", "table_name", "table_type",
            "self_referencing_column_name", "reference_generation", "user_defined_type_catalog",
            "user_defined_type_schema", "user_defined_type_name", "is_insertable_into",
            "is_typed", "commit_action",
        ],
    ),
    (
        "information_schema.columns",
        &[
            "table_catalog", "table_schema", "table_name", "column_name", "ordinal_position",
            "column_default", "is_nullable", "data_type", "character_maximum_length",
            "character_octet_length", "numeric_precision", "numeric_precision_radix",
            "numeric_scale", "datetime_precision", "interval_type", "interval_precision",
            "character_set_catalog", "character_set_schema", "character_set_name",
            "collation_catalog", "collation_schema", "collation_name", "domain_catalog",
            "domain_schema", "domain_name", "udt_catalog", "udt_schema", "udt_name",
            "scope_catalog", "scope_schema", "scope_name", "maximum_cardinality",
            "dtd_identifier", "is_self_referencing", "is_identity", "identity_generation",
            "identity_start", "identity_increment", "identity_maximum", "identity_minimum",
            "identity_cycle", "is_generated", "generation_expression", "is_updatable",
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Schema {
        Schema::new().with_table("Sales", ["Region", "net_revenue", "fiscal_year"])
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let index = SchemaIndex::new(&sales(), false);
        assert_eq!(index.resolve_table("SALES"), Some("sales"));
        assert!(index.has_column("sales", "REGION"));
        assert!(!index.has_column("sales", "country"));
    }

    #[test]
    fn qualified_names_fall_back_to_last_segment() {
        let index = SchemaIndex::new(&sales(), false);
        assert_eq!(index.resolve_table("public.sales"), Some("sales"));
        assert_eq!(index.resolve_table("public.revenues"), None);
    }

    #[test]
    fn colliding_keys_are_merged() {
        let schema = Schema::new()
            .with_table("orders", ["id"])
            .with_table("ORDERS", ["amount"]);
        let index = SchemaIndex::new(&schema, false);
        assert_eq!(index.table_names().count(), 1);
        assert!(index.has_column("orders", "id"));
        assert!(index.has_column("orders", "amount"));
    }

    #[test]
    fn empty_schema_stays_empty_even_with_catalog() {
        let index = SchemaIndex::new(&Schema::new(), true);
        assert!(index.is_empty());
        assert_eq!(index.resolve_table("pg_tables"), None);
    }

    #[test]
    fn system_catalog_is_merged_into_supplied_schemas() {
        let index = SchemaIndex::new(&sales(), true);
        assert!(!index.is_empty());
        assert!(index.has_column("information_schema.columns", "column_name"));
        assert!(index.has_column("pg_catalog.pg_tables", "tablename"));
    }

    #[test]
    fn suggests_close_names_only() {
        let index = SchemaIndex::new(&sales(), false);
        assert_eq!(index.closest_table("sale"), Some("sales"));
        assert_eq!(index.closest_table("revenues"), None);
        assert_eq!(index.closest_column(&["sales"], "net_revenu"), Some("net_revenue"));
        assert_eq!(index.closest_column(&[], "regoin"), Some("region"));
    }

    #[test]
    fn levenshtein_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
