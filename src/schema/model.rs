//! Schema types for db-chat.
//!
//! Represents the tables of one MySQL database as reported by `DESCRIBE`,
//! and the summary used to ground query generation.

use serde::Serialize;

/// Structured description of the tables of one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaSummary {
    /// Database the summary was built from.
    pub database: String,

    /// Table names in `SHOW TABLES` order, including omitted ones.
    pub table_names: Vec<String>,

    /// Described tables, in the same order as `table_names`.
    pub tables: Vec<TableSchema>,

    /// Tables whose description failed and were left out.
    pub omitted: Vec<String>,
}

impl SchemaSummary {
    /// Creates an empty summary for the given database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Looks up a described table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns true if the database has no tables at all.
    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
    }

    /// Formats the schema for inclusion in an LLM system prompt.
    ///
    /// Lists the tables first, then the column definitions of each described
    /// table.
    pub fn format_for_llm(&self) -> String {
        if self.table_names.is_empty() {
            return format!("Database '{}' has no tables.\n", self.database);
        }

        let tables_text = self
            .tables
            .iter()
            .map(format_table_for_llm)
            .collect::<Vec<_>>()
            .join("");

        format!(
            "Database: {}\nTables: {}\n\n{}",
            self.database,
            self.table_names.join(", "),
            tables_text
        )
    }
}

fn format_table_for_llm(table: &TableSchema) -> String {
    let column_lines = table
        .columns
        .iter()
        .map(format_column_line)
        .collect::<Vec<_>>()
        .join("");

    format!("Table: {}\n{}\n", table.name, column_lines)
}

fn format_column_line(column: &Column) -> String {
    let annotations = [
        key_annotation(&column.key),
        (!column.is_nullable).then_some("NOT NULL".to_string()),
        column.default.as_ref().map(|d| format!("DEFAULT {d}")),
        (!column.extra.is_empty()).then(|| column.extra.clone()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    if annotations.is_empty() {
        format!("  - {}: {}\n", column.name, column.data_type)
    } else {
        format!(
            "  - {}: {} ({})\n",
            column.name,
            column.data_type,
            annotations.join(", ")
        )
    }
}

fn key_annotation(key: &str) -> Option<String> {
    match key {
        "PRI" => Some("PK".to_string()),
        "UNI" => Some("UNIQUE".to_string()),
        "MUL" => Some("INDEX".to_string()),
        _ => None,
    }
}

/// Represents one table and its ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Columns in definition order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Creates a table with the given name and columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Returns `(name, data_type)` pairs in column order.
    pub fn column_types(&self) -> Vec<(&str, &str)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect()
    }
}

/// One row of `DESCRIBE` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Column name (`Field`).
    pub name: String,

    /// Data type, e.g. `int` or `varchar(255)` (`Type`).
    pub data_type: String,

    /// Whether the column allows NULL values (`Null`).
    pub is_nullable: bool,

    /// Key kind: `PRI`, `UNI`, `MUL` or empty (`Key`).
    pub key: String,

    /// Default value expression, if any (`Default`).
    pub default: Option<String>,

    /// Extra attributes such as `auto_increment` (`Extra`).
    pub extra: String,
}

impl Column {
    /// Creates a new nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ..Self::default()
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Sets the key kind.
    pub fn with_key(self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }

    /// Sets the extra attributes.
    pub fn with_extra(self, extra: impl Into<String>) -> Self {
        Self {
            extra: extra.into(),
            ..self
        }
    }
}
