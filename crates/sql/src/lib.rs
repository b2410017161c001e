//! # SQL — DriftKV Query Front-End
//!
//! A small SQL dialect compiled onto B+-tree tables.
//!
//! ## Pipeline
//!
//! ```text
//! query text
//!   |
//!   v
//! ┌──────────┐    ┌──────────┐    ┌────────────┐
//! │  lexer   │ -> │  parser  │ -> │  executor  │ -> QueryOutput
//! │ (tokens) │    │  (AST)   │    │ (registry) │
//! └──────────┘    └──────────┘    └────────────┘
//! ```
//!
//! ## Dialect
//!
//! ```text
//! SELECT col (, col)* FROM table [WHERE expr [AND expr]*] [LIMIT n]
//! INSERT [INTO] table (col, ...) VALUES (val, ...) [, (val, ...)]*
//! UPDATE table SET col = val (, col = val)* [WHERE ...]
//! DELETE FROM table [WHERE ...]
//! CREATE TABLE table (col TYPE, ...)
//! DROP TABLE table
//! ```
//!
//! Keywords are case-insensitive; identifiers are alphanumerics plus
//! underscore; string literals are double-quoted with no escapes; `expr` is
//! `column op value` where `op` is `==` or `=`. One row after `VALUES`
//! parses as a plain insert, several as a bulk insert.
//!
//! ## Example
//!
//! ```rust
//! use sql::{Database, QueryOutput};
//!
//! let mut db = Database::new();
//! db.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();
//! db.execute("INSERT INTO users (id, name) VALUES (1, \"Ada\")").unwrap();
//! match db.execute("SELECT name FROM users WHERE id == 1").unwrap() {
//!     QueryOutput::Rows { rows, .. } => assert_eq!(rows.len(), 1),
//!     _ => unreachable!(),
//! }
//! ```

mod ast;
mod database;
mod executor;
mod lexer;
mod parser;

pub use ast::*;
pub use database::{hash_key, Database, Table, DEFAULT_TREE_ORDER};
pub use executor::{Executor, QueryOutput};
pub use lexer::{tokenize, Token, TokenKind, KEYWORDS};
pub use parser::Parser;

use btree::TreeError;
use thiserror::Error;

/// Errors surfaced by the SQL front-end.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The query failed to lex or parse; the message names the missing or
    /// unexpected element.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The leading keyword is recognized but the dialect does not cover the
    /// statement.
    #[error("unsupported statement")]
    Unsupported,

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    /// A literal does not match the declared type of its column.
    #[error("type mismatch for column \"{column}\": expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    /// Stored data violated an executor invariant.
    #[error("corrupt table data: {0}")]
    Corrupt(String),

    /// An index operation failed (duplicate key, snapshot damage, I/O).
    #[error(transparent)]
    Tree(#[from] TreeError),
}
