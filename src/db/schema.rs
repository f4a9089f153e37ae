use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::DatabaseFilter;

/// A metadata row as returned by the metadata source: positional primitive values
pub type Row = Vec<serde_json::Value>;

/// Identity of a table: `(database, schema, table)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableKey {
    pub fn new(database: &str, schema: &str, table: &str) -> Self {
        Self {
            database: database.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Fully-qualified identity of a column or, with no column, of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnIdentity {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub column: Option<String>,
}

impl ColumnIdentity {
    pub fn column(database: &str, schema: &str, table: &str, column: &str) -> Self {
        Self {
            database: database.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            column: Some(column.to_string()),
        }
    }

    pub fn table(key: &TableKey) -> Self {
        Self {
            database: key.database.clone(),
            schema: key.schema.clone(),
            table: key.table.clone(),
            column: None,
        }
    }

    /// `database.schema.table.column`, with an empty column segment for tables.
    pub fn cache_key(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.database,
            self.schema,
            self.table,
            self.column.as_deref().unwrap_or("")
        )
    }

    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.database, &self.schema, &self.table)
    }
}

impl std::fmt::Display for ColumnIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}.{}.{}", self.database, self.schema, self.table, column),
            None => write!(f, "{}.{}.{}", self.database, self.schema, self.table),
        }
    }
}

/// Column metadata as fetched from the information schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub ordinal_position: i64,
    /// Upper-cased declared type, `None` when the source reported none
    pub data_type: Option<String>,
    pub char_max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub is_nullable: bool,
    pub comment: Option<String>,
}

impl ColumnMetadata {
    /// Parse an 11-field column row. Returns `None` for malformed rows.
    pub fn from_row(row: &Row) -> Option<Self> {
        if row.len() != 11 {
            return None;
        }
        Some(Self {
            database: required_str(&row[0])?,
            schema: required_str(&row[1])?,
            table: required_str(&row[2])?,
            column: required_str(&row[3])?,
            ordinal_position: value_i64(&row[4]).unwrap_or(0),
            data_type: value_str(&row[5])
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty()),
            char_max_length: value_i64(&row[6]),
            numeric_precision: value_i64(&row[7]),
            numeric_scale: value_i64(&row[8]),
            is_nullable: value_nullable(&row[9]),
            comment: value_str(&row[10]),
        })
    }

    pub fn has_comment(&self) -> bool {
        is_present(&self.comment)
    }

    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.database, &self.schema, &self.table)
    }

    pub fn identity(&self) -> ColumnIdentity {
        ColumnIdentity::column(&self.database, &self.schema, &self.table, &self.column)
    }
}

/// Table metadata as fetched from the information schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub table_type: String,
    pub row_count: Option<i64>,
    pub bytes: Option<i64>,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_altered: Option<DateTime<Utc>>,
    pub clustering_key: Option<String>,
}

impl TableMetadata {
    /// Parse a 10-field table row. Returns `None` for malformed rows.
    pub fn from_row(row: &Row) -> Option<Self> {
        if row.len() != 10 {
            return None;
        }
        Some(Self {
            database: required_str(&row[0])?,
            schema: required_str(&row[1])?,
            table: required_str(&row[2])?,
            table_type: value_str(&row[3]).unwrap_or_default(),
            row_count: value_i64(&row[4]),
            bytes: value_i64(&row[5]),
            comment: value_str(&row[6]),
            created_at: value_timestamp(&row[7]),
            last_altered: value_timestamp(&row[8]),
            clustering_key: value_str(&row[9]),
        })
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(&self.database, &self.schema, &self.table)
    }

    pub fn has_comment(&self) -> bool {
        is_present(&self.comment)
    }

    pub fn is_clustered(&self) -> bool {
        is_present(&self.clustering_key)
    }
}

/// Type of table constraint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    PrimaryKey,
    ForeignKey,
    Unique,
}

impl ConstraintType {
    /// Parse the information-schema spelling (`PRIMARY KEY`, `FOREIGN KEY`, `UNIQUE`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PRIMARY KEY" => Some(ConstraintType::PrimaryKey),
            "FOREIGN KEY" => Some(ConstraintType::ForeignKey),
            "UNIQUE" => Some(ConstraintType::Unique),
            _ => None,
        }
    }
}

/// A constraint declared on a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub constraint_type: ConstraintType,
    pub constraint_name: String,
}

impl ConstraintInfo {
    pub fn from_row(row: &Row) -> Option<Self> {
        if row.len() != 5 {
            return None;
        }
        Some(Self {
            database: required_str(&row[0])?,
            schema: required_str(&row[1])?,
            table: required_str(&row[2])?,
            constraint_type: ConstraintType::parse(&value_str(&row[3])?)?,
            constraint_name: value_str(&row[4]).unwrap_or_default(),
        })
    }

    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.database, &self.schema, &self.table)
    }
}

/// Storage usage for a table. Null byte counts are read as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMetrics {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub active_bytes: i64,
    pub time_travel_bytes: i64,
    pub failsafe_bytes: i64,
    pub clone_bytes: i64,
}

impl StorageMetrics {
    pub fn from_row(row: &Row) -> Option<Self> {
        if row.len() != 7 {
            return None;
        }
        Some(Self {
            database: required_str(&row[0])?,
            schema: required_str(&row[1])?,
            table: required_str(&row[2])?,
            active_bytes: value_i64(&row[3]).unwrap_or(0),
            time_travel_bytes: value_i64(&row[4]).unwrap_or(0),
            failsafe_bytes: value_i64(&row[5]).unwrap_or(0),
            clone_bytes: value_i64(&row[6]).unwrap_or(0),
        })
    }

    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.database, &self.schema, &self.table)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The typed result of discovery: every well-formed metadata record that
/// passed the database filter, in source order. Per-table lookups go through
/// an index built once at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CatalogRecord")]
pub struct MetadataCatalog {
    columns: Vec<ColumnMetadata>,
    tables: Vec<TableMetadata>,
    constraints: Vec<ConstraintInfo>,
    storage: Vec<StorageMetrics>,
    /// Number of metadata queries issued to build this catalog
    pub queries_executed: u32,
    #[serde(skip)]
    index: CatalogIndex,
}

/// Positions into the catalog's record lists. The first record wins when
/// the source reports duplicates.
#[derive(Debug, Clone, Default)]
struct CatalogIndex {
    tables: HashMap<TableKey, usize>,
    columns_by_table: HashMap<TableKey, Vec<usize>>,
    columns: HashMap<(TableKey, String), usize>,
    constraint_types: HashMap<TableKey, HashSet<ConstraintType>>,
    storage: HashMap<TableKey, usize>,
}

impl CatalogIndex {
    fn build(
        columns: &[ColumnMetadata],
        tables: &[TableMetadata],
        constraints: &[ConstraintInfo],
        storage: &[StorageMetrics],
    ) -> Self {
        let mut index = Self::default();
        for (pos, table) in tables.iter().enumerate() {
            index.tables.entry(table.key()).or_insert(pos);
        }
        for (pos, column) in columns.iter().enumerate() {
            let key = column.table_key();
            index
                .columns
                .entry((key.clone(), column.column.clone()))
                .or_insert(pos);
            index.columns_by_table.entry(key).or_default().push(pos);
        }
        for constraint in constraints {
            index
                .constraint_types
                .entry(constraint.table_key())
                .or_default()
                .insert(constraint.constraint_type);
        }
        for (pos, metrics) in storage.iter().enumerate() {
            index.storage.entry(metrics.table_key()).or_insert(pos);
        }
        index
    }
}

/// Serialized catalog, without the index.
#[derive(Deserialize)]
struct CatalogRecord {
    #[serde(default)]
    columns: Vec<ColumnMetadata>,
    #[serde(default)]
    tables: Vec<TableMetadata>,
    #[serde(default)]
    constraints: Vec<ConstraintInfo>,
    #[serde(default)]
    storage: Vec<StorageMetrics>,
    #[serde(default)]
    queries_executed: u32,
}

impl From<CatalogRecord> for MetadataCatalog {
    fn from(record: CatalogRecord) -> Self {
        let mut catalog = Self::new(record.columns, record.tables, record.constraints, record.storage);
        catalog.queries_executed = record.queries_executed;
        catalog
    }
}

/// Raw rows as fetched, before parsing.
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    pub columns: Vec<Row>,
    pub tables: Vec<Row>,
    pub constraints: Vec<Row>,
    pub storage: Vec<Row>,
}

impl MetadataCatalog {
    pub fn new(
        columns: Vec<ColumnMetadata>,
        tables: Vec<TableMetadata>,
        constraints: Vec<ConstraintInfo>,
        storage: Vec<StorageMetrics>,
    ) -> Self {
        let index = CatalogIndex::build(&columns, &tables, &constraints, &storage);
        Self {
            columns,
            tables,
            constraints,
            storage,
            queries_executed: 0,
            index,
        }
    }

    /// Parse raw rows, dropping malformed rows and filtered-out databases.
    pub fn from_rows(raw: &RawMetadata, filter: &DatabaseFilter) -> Self {
        let mut dropped = 0usize;
        let columns = parse_rows(&raw.columns, ColumnMetadata::from_row, &mut dropped)
            .into_iter()
            .filter(|c| filter.includes(&c.database))
            .collect();
        let tables = parse_rows(&raw.tables, TableMetadata::from_row, &mut dropped)
            .into_iter()
            .filter(|t| filter.includes(&t.database))
            .collect();
        let constraints = parse_rows(&raw.constraints, ConstraintInfo::from_row, &mut dropped)
            .into_iter()
            .filter(|c| filter.includes(&c.database))
            .collect();
        let storage = parse_rows(&raw.storage, StorageMetrics::from_row, &mut dropped)
            .into_iter()
            .filter(|s| filter.includes(&s.database))
            .collect();

        if dropped > 0 {
            log::debug!("Excluded {} malformed metadata rows", dropped);
        }

        Self::new(columns, tables, constraints, storage)
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn tables(&self) -> &[TableMetadata] {
        &self.tables
    }

    pub fn constraints(&self) -> &[ConstraintInfo] {
        &self.constraints
    }

    pub fn storage(&self) -> &[StorageMetrics] {
        &self.storage
    }

    /// Columns grouped by table, tables in first-seen order.
    pub fn columns_by_table(&self) -> Vec<(TableKey, Vec<&ColumnMetadata>)> {
        group_by_table(&self.columns)
    }

    pub fn table(&self, key: &TableKey) -> Option<&TableMetadata> {
        self.index.tables.get(key).map(|&pos| &self.tables[pos])
    }

    pub fn columns_for(&self, key: &TableKey) -> Vec<&ColumnMetadata> {
        self.index
            .columns_by_table
            .get(key)
            .map(|positions| positions.iter().map(|&pos| &self.columns[pos]).collect())
            .unwrap_or_default()
    }

    pub fn constraint_types_for(&self, key: &TableKey) -> HashSet<ConstraintType> {
        self.index.constraint_types.get(key).cloned().unwrap_or_default()
    }

    pub fn storage_for(&self, key: &TableKey) -> Option<&StorageMetrics> {
        self.index.storage.get(key).map(|&pos| &self.storage[pos])
    }

    pub fn column(&self, identity: &ColumnIdentity) -> Option<&ColumnMetadata> {
        let name = identity.column.as_deref()?;
        self.index
            .columns
            .get(&(identity.table_key(), name.to_string()))
            .map(|&pos| &self.columns[pos])
    }

    /// Distinct database names, first-seen order.
    pub fn databases(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tables
            .iter()
            .map(|t| &t.database)
            .chain(self.columns.iter().map(|c| &c.database))
            .filter(|db| seen.insert(db.as_str().to_string()))
            .cloned()
            .collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Group columns by table, keeping tables in first-seen order.
pub fn group_by_table<'a>(columns: &'a [ColumnMetadata]) -> Vec<(TableKey, Vec<&'a ColumnMetadata>)> {
    let mut order: Vec<TableKey> = Vec::new();
    let mut groups: HashMap<TableKey, Vec<&ColumnMetadata>> = HashMap::new();
    for column in columns {
        let key = column.table_key();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(column);
    }
    order
        .into_iter()
        .map(|key| {
            let cols = groups.remove(&key).unwrap_or_default();
            (key, cols)
        })
        .collect()
}

fn parse_rows<T>(rows: &[Row], parse: fn(&Row) -> Option<T>, dropped: &mut usize) -> Vec<T> {
    rows.iter()
        .filter_map(|row| {
            let parsed = parse(row);
            if parsed.is_none() {
                *dropped += 1;
            }
            parsed
        })
        .collect()
}

/// A comment or clustering key counts only when non-blank.
pub fn is_present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn value_str(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_str(value: &serde_json::Value) -> Option<String> {
    value_str(value).filter(|s| !s.is_empty())
}

fn value_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// `"NO"` or `false` means not nullable. Anything else is treated as nullable.
fn value_nullable(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.trim().eq_ignore_ascii_case("NO"),
        _ => true,
    }
}

fn value_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_timestamp(s),
        serde_json::Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Parse an RFC 3339, offset-suffixed or naive timestamp. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
