//! Catalog metadata: tables, columns, keys and relationships.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::value::SqlValue;
use crate::error::{ExtractError, Result};

/// Column types the driver can bind and decode natively.
///
/// Both the `information_schema` spelling and the short alias are listed so
/// user-supplied types match as well as discovered ones.
const NATIVE_TYPES: &[&str] = &[
    // numeric
    "integer",
    "int",
    "int4",
    "smallint",
    "int2",
    "bigint",
    "int8",
    "numeric",
    "decimal",
    "real",
    "float4",
    "double precision",
    "float8",
    // text
    "character varying",
    "varchar",
    "character",
    "char",
    "bpchar",
    "text",
    // boolean
    "boolean",
    "bool",
    // date/time
    "date",
    "time",
    "time without time zone",
    "timestamp",
    "timestamp without time zone",
    "timestamp with time zone",
    "timestamptz",
    // binary
    "bytea",
];

/// Native types whose value range is wider than `rust_decimal` or `chrono`
/// cover (`NaN`, over 28 significant digits, `infinity`). They are compared
/// natively but selected as text and parsed by [`SqlValue::from_pg_text`].
const TEXT_DECODED_TYPES: &[&str] = &[
    "numeric",
    "decimal",
    "date",
    "timestamp",
    "timestamp without time zone",
    "timestamp with time zone",
    "timestamptz",
];

/// Keywords PostgreSQL rejects as bare column or table names.
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant", "group",
    "having", "ilike", "in", "initially", "inner", "intersect", "into", "is", "isnull",
    "join", "lateral", "leading", "left", "like", "limit", "localtime", "localtimestamp",
    "natural", "not", "notnull", "null", "offset", "on", "only", "or", "order", "outer",
    "overlaps", "placing", "primary", "references", "returning", "right", "select",
    "session_user", "similar", "some", "symmetric", "system_user", "table", "tablesample",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "variadic",
    "verbose", "when", "where", "window", "with",
];

/// True if values of `data_type` are compared without a text cast.
pub fn is_natively_scannable(data_type: &str) -> bool {
    let dt = data_type.trim().to_lowercase();
    NATIVE_TYPES.contains(&dt.as_str())
}

/// True if values of `data_type` are compared natively but read back as text.
pub fn is_text_decoded(data_type: &str) -> bool {
    let dt = data_type.trim().to_lowercase();
    TEXT_DECODED_TYPES.contains(&dt.as_str())
}

/// An identifier as it must appear in SQL text: bare when PostgreSQL reads
/// it back unchanged, double-quoted otherwise.
pub fn quote_ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !RESERVED_WORDS.contains(&name);
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type as reported by `information_schema.columns.data_type`.
    pub data_type: String,

    /// Whether the column is part of the table's primary key.
    pub is_primary: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary: false,
        }
    }

    /// Mark this column as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Whether the column is selected as `name::text`.
    pub fn selected_as_text(&self) -> bool {
        !is_natively_scannable(&self.data_type) || is_text_decoded(&self.data_type)
    }

    /// Select-list entry: the name, or `name::text AS name` for text-read types.
    pub fn select_expr(&self) -> String {
        let ident = quote_ident(&self.name);
        if self.selected_as_text() {
            format!("{0}::text AS {0}", ident)
        } else {
            ident
        }
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// `schema.table` with each part quoted where SQL requires it.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// Columns flagged as primary, in ordinal order.
    pub fn primary_columns(&self) -> Vec<Column> {
        self.columns.iter().filter(|c| c.is_primary).cloned().collect()
    }

    /// Check if table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Schema and name of a base table, before its columns are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Foreign key constraint as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Schema of the referencing table.
    pub schema: String,

    /// Referencing table.
    pub table: String,

    /// Referencing columns, in constraint order.
    pub columns: Vec<String>,

    /// Schema of the referenced table.
    pub ref_schema: String,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns, aligned with `columns`.
    pub ref_columns: Vec<String>,
}

/// Descriptive cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
    SelfReferencing,
}

impl RelationType {
    /// Classify from table identity and per-end uniqueness.
    pub fn classify(same_table: bool, source_unique: bool, target_unique: bool) -> Self {
        if same_table {
            return RelationType::SelfReferencing;
        }
        match (source_unique, target_unique) {
            (true, true) => RelationType::OneToOne,
            (true, false) => RelationType::OneToMany,
            (false, true) => RelationType::ManyToOne,
            (false, false) => RelationType::ManyToMany,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::OneToOne => "one-to-one",
            RelationType::OneToMany => "one-to-many",
            RelationType::ManyToOne => "many-to-one",
            RelationType::ManyToMany => "many-to-many",
            RelationType::SelfReferencing => "self-referencing",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved foreign key between two catalog tables.
///
/// The source table holds the foreign key; the target is the referenced table.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub source_table: Arc<Table>,
    pub source_columns: Vec<Column>,
    pub target_table: Arc<Table>,
    pub target_columns: Vec<Column>,
    pub relation_type: RelationType,
}

impl Relationship {
    pub fn is_self_referencing(&self) -> bool {
        self.source_table.full_name() == self.target_table.full_name()
    }
}

fn column_names(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}.[{}] -> {}.[{}]",
            self.relation_type,
            self.source_table.full_name(),
            column_names(&self.source_columns),
            self.target_table.full_name(),
            column_names(&self.target_columns)
        )
    }
}

/// A possibly composite key: columns paired positionally with values.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub columns: Vec<Column>,
    pub values: Vec<SqlValue>,
}

impl PrimaryKey {
    /// Build a key. Columns without a declared type are treated as `integer`.
    pub fn new(columns: Vec<Column>, values: Vec<SqlValue>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(ExtractError::InvalidPrimaryKey {
                columns: columns.len(),
                values: values.len(),
            });
        }
        let columns = columns
            .into_iter()
            .map(|mut c| {
                if c.data_type.is_empty() {
                    c.data_type = "integer".to_string();
                }
                c
            })
            .collect();
        Ok(Self { columns, values })
    }

    /// Predicate and bound arguments, placeholders numbered from `$1`.
    pub fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let conditions: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let ident = quote_ident(&col.name);
                if is_natively_scannable(&col.data_type) {
                    format!("{} = ${}", ident, i + 1)
                } else {
                    format!("{}::text = ${}", ident, i + 1)
                }
            })
            .collect();
        (conditions.join(" AND "), self.values.clone())
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| format!("{}={}", c.name, v.key_part()))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_col(name: &str, data_type: &str) -> Column {
        Column::new(name, data_type)
    }

    #[test]
    fn test_where_clause_composite() {
        let pk = PrimaryKey::new(
            vec![
                key_col("id", "integer"),
                key_col("active", "boolean"),
                key_col("name", "text"),
            ],
            vec![SqlValue::I64(42), SqlValue::Bool(true), SqlValue::from("test")],
        )
        .unwrap();

        let (clause, args) = pk.where_clause();
        assert_eq!(clause, "id = $1 AND active = $2 AND name = $3");
        assert_eq!(
            args,
            vec![SqlValue::I64(42), SqlValue::Bool(true), SqlValue::from("test")]
        );
    }

    #[test]
    fn test_where_clause_casts_unscannable_types() {
        let pk = PrimaryKey::new(
            vec![key_col("id", "uuid"), key_col("tenant", "integer")],
            vec![SqlValue::from("a-b"), SqlValue::I64(1)],
        )
        .unwrap();
        let (clause, _) = pk.where_clause();
        assert_eq!(clause, "id::text = $1 AND tenant = $2");
    }

    #[test]
    fn test_where_clause_quotes_identifiers() {
        let pk = PrimaryKey::new(
            vec![key_col("order", "integer"), key_col("Code", "uuid")],
            vec![SqlValue::I64(1), SqlValue::from("x")],
        )
        .unwrap();
        let (clause, _) = pk.where_clause();
        assert_eq!(clause, "\"order\" = $1 AND \"Code\"::text = $2");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("_tmp$1"), "_tmp$1");
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("MixedCase"), "\"MixedCase\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
        assert_eq!(quote_ident("with space"), "\"with space\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident(""), "\"\"");
    }

    #[test]
    fn test_select_expr_reads_wide_types_as_text() {
        assert_eq!(Column::new("amount", "numeric").select_expr(), "amount::text AS amount");
        assert_eq!(Column::new("day", "date").select_expr(), "day::text AS day");
        assert_eq!(
            Column::new("at", "timestamp without time zone").select_expr(),
            "at::text AS at"
        );
        assert_eq!(Column::new("at", "timestamptz").select_expr(), "at::text AS at");
        assert_eq!(Column::new("n", "bigint").select_expr(), "n");
        assert_eq!(Column::new("when", "time").select_expr(), "\"when\"");
    }

    #[test]
    fn test_new_primary_key_length_mismatch() {
        let err = PrimaryKey::new(vec![key_col("id", "integer")], vec![]).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::InvalidPrimaryKey {
                columns: 1,
                values: 0
            }
        ));
        assert!(PrimaryKey::new(vec![], vec![SqlValue::I64(1)]).is_err());
    }

    #[test]
    fn test_new_primary_key_defaults_type() {
        let pk = PrimaryKey::new(vec![key_col("id", "")], vec![SqlValue::I64(1)]).unwrap();
        assert_eq!(pk.columns[0].data_type, "integer");
    }

    #[test]
    fn test_classify() {
        use RelationType::*;
        assert_eq!(RelationType::classify(true, false, false), SelfReferencing);
        assert_eq!(RelationType::classify(false, true, true), OneToOne);
        assert_eq!(RelationType::classify(false, true, false), OneToMany);
        assert_eq!(RelationType::classify(false, false, true), ManyToOne);
        assert_eq!(RelationType::classify(false, false, false), ManyToMany);
    }

    #[test]
    fn test_select_expr() {
        assert_eq!(key_col("id", "integer").select_expr(), "id");
        assert_eq!(key_col("doc", "jsonb").select_expr(), "doc::text AS doc");
        assert_eq!(key_col("at", "time with time zone").select_expr(), "at::text AS at");
    }

    #[test]
    fn test_relationship_display() {
        let users = Arc::new(Table::new(
            "public",
            "users",
            vec![key_col("id", "integer").primary()],
        ));
        let orders = Arc::new(Table::new(
            "public",
            "orders",
            vec![key_col("id", "integer").primary(), key_col("user_id", "integer")],
        ));
        let rel = Relationship {
            source_table: orders.clone(),
            source_columns: vec![orders.columns[1].clone()],
            target_table: users.clone(),
            target_columns: vec![users.columns[0].clone()],
            relation_type: RelationType::ManyToOne,
        };
        assert_eq!(
            rel.to_string(),
            "many-to-one | public.orders.[user_id] -> public.users.[id]"
        );
        assert!(!rel.is_self_referencing());
    }
}
