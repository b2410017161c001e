//! Table registry: named tables, each served by one primary B+-tree plus
//! zero or more secondary trees.
//!
//! The primary key of a table is its first declared column. Integer keys
//! index the tree directly; text keys go through [`hash_key`]. A secondary
//! index maps `hash_key` of a column's text rendering to the primary key, so
//! every record a secondary references stays reachable through the primary.

use std::collections::HashMap;

use btree::{BPlusTree, Field, Key, Value};

use crate::ast::ColumnDef;
use crate::executor::{Executor, QueryOutput};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::SqlError;

/// Order of the trees backing tables created through SQL.
pub const DEFAULT_TREE_ORDER: usize = 8;

/// FNV-1a over the bytes of `s`, used to key text values into the `u64`
/// ordered key space.
pub fn hash_key(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// The tree key a field indexes under: integers directly, text hashed.
pub(crate) fn field_key(field: &Field) -> Key {
    match field {
        Field::Int(i) => *i as u64,
        Field::Text(s) => hash_key(s),
    }
}

/// One named table: its schema, the primary tree keyed by the first column,
/// and secondary trees keyed by hashed column values.
pub struct Table {
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) primary: BPlusTree,
    pub(crate) secondaries: HashMap<String, BPlusTree>,
}

impl Table {
    fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            primary: BPlusTree::new(DEFAULT_TREE_ORDER),
            secondaries: HashMap::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// The column the primary tree is keyed by.
    pub fn primary_column(&self) -> &ColumnDef {
        &self.columns[0]
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.primary.len()
    }

    /// Read-only access to the primary tree, e.g. for persisting the table
    /// as a snapshot.
    pub fn primary_tree(&self) -> &BPlusTree {
        &self.primary
    }

    /// All rows with their primary keys, ascending by key.
    pub(crate) fn scan_rows(&self) -> Result<Vec<(Key, Vec<Field>)>, SqlError> {
        self.primary
            .entries()
            .into_iter()
            .map(|(key, value)| Ok((key, decode_row(value)?)))
            .collect()
    }
}

/// Turns a stored tree value back into a row.
pub(crate) fn decode_row(value: Value) -> Result<Vec<Field>, SqlError> {
    match value {
        Value::Record(fields) => Ok(fields),
        other => Err(SqlError::Corrupt(format!(
            "primary index holds a non-record value: {:?}",
            other
        ))),
    }
}

/// The table registry and entry point for executing SQL text.
#[derive(Default)]
pub struct Database {
    tables: HashMap<String, Table>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lexes, parses, and executes one statement.
    pub fn execute(&mut self, query: &str) -> Result<QueryOutput, SqlError> {
        let tokens = tokenize(query);
        let statement = Parser::new(tokens).parse()?;
        tracing::debug!(kind = statement.kind(), "executing statement");
        Executor::new(self).execute(statement)
    }

    /// Registers a new empty table.
    ///
    /// # Errors
    ///
    /// [`SqlError::TableExists`] if the name is taken;
    /// [`SqlError::Syntax`] if the schema declares no columns.
    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> Result<(), SqlError> {
        if columns.is_empty() {
            return Err(SqlError::Syntax(format!(
                "table \"{}\" needs at least one column",
                name
            )));
        }
        if self.tables.contains_key(name) {
            return Err(SqlError::TableExists(name.to_string()));
        }
        self.tables.insert(name.to_string(), Table::new(columns));
        Ok(())
    }

    /// Unregisters a table, dropping its primary and secondary trees.
    pub fn drop_table(&mut self, name: &str) -> Result<(), SqlError> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SqlError::UnknownTable(name.to_string()))
    }

    /// Builds a secondary index over `column`, keyed by the hash of each
    /// row's value in that column.
    ///
    /// # Errors
    ///
    /// [`TreeError::AlreadyExists`](btree::TreeError::AlreadyExists) if two
    /// existing rows share a value in the column; secondary trees admit
    /// only distinct keys.
    pub fn create_secondary_index(&mut self, table: &str, column: &str) -> Result<(), SqlError> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| SqlError::UnknownTable(table.to_string()))?;
        let idx = t
            .column_index(column)
            .ok_or_else(|| SqlError::UnknownColumn(column.to_string()))?;

        let mut tree = BPlusTree::new(DEFAULT_TREE_ORDER);
        for (pk, value) in t.primary.entries() {
            let row = decode_row(value)?;
            tree.insert(field_key(&row[idx]), Value::Int(pk as i64))?;
        }
        t.secondaries.insert(column.to_string(), tree);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Names of all registered tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ColumnType;

    fn schema() -> Vec<ColumnDef> {
        vec![
            ColumnDef {
                name: "id".into(),
                column_type: ColumnType::Int,
            },
            ColumnDef {
                name: "name".into(),
                column_type: ColumnType::Text,
            },
        ]
    }

    #[test]
    fn create_and_drop_table() {
        let mut db = Database::new();
        db.create_table("users", schema()).unwrap();
        assert!(db.table("users").is_some());
        assert_eq!(db.table_names(), vec!["users"]);

        assert!(matches!(
            db.create_table("users", schema()),
            Err(SqlError::TableExists(_))
        ));

        db.drop_table("users").unwrap();
        assert!(db.table("users").is_none());
        assert!(matches!(
            db.drop_table("users"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn empty_schema_is_rejected() {
        let mut db = Database::new();
        assert!(matches!(
            db.create_table("t", Vec::new()),
            Err(SqlError::Syntax(_))
        ));
    }

    #[test]
    fn hash_key_is_stable_and_spreads() {
        // FNV-1a test vectors.
        assert_eq!(hash_key(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(hash_key("a"), 0xaf63_dc4c_8601_ec8c);

        assert_eq!(hash_key("Alice"), hash_key("Alice"));
        assert_ne!(hash_key("Alice"), hash_key("Bob"));
    }
}
