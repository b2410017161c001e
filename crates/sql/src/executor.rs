//! Statement execution against the table registry.
//!
//! SELECT resolves an equality predicate on the primary column to a point
//! lookup and one on a secondary-indexed column to a secondary lookup;
//! everything else walks the primary leaf chain. All WHERE predicates are
//! applied as filters afterwards (the lookup is an access path, not the
//! final answer — a hashed secondary key can collide), then LIMIT truncates.
//!
//! Mutations keep the secondary invariant: every key a secondary index
//! stores resolves to a live row in the primary tree. Uniqueness is checked
//! before anything is written, so a duplicate-key failure leaves the table
//! untouched.

use btree::{Field, Key, TreeError, Value};

use crate::ast::*;
use crate::database::{decode_row, field_key, Database, Table};
use crate::SqlError;

/// The result of executing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// SELECT: projected column names plus the matching rows.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Field>>,
    },
    /// INSERT/UPDATE/DELETE: number of rows written or removed.
    Affected(usize),
    /// CREATE TABLE / DROP TABLE.
    None,
}

/// Executes statements against a [`Database`].
pub struct Executor<'a> {
    db: &'a mut Database,
}

impl<'a> Executor<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    /// Dispatches over the statement variants.
    pub fn execute(&mut self, statement: Statement) -> Result<QueryOutput, SqlError> {
        match statement {
            Statement::Select(s) => self.select(s),
            Statement::Insert(s) => self.insert(s),
            Statement::BulkInsert(s) => self.bulk_insert(s),
            Statement::Update(s) => self.update(s),
            Statement::Delete(s) => self.delete(s),
            Statement::CreateTable(s) => {
                self.db.create_table(&s.table, s.columns)?;
                Ok(QueryOutput::None)
            }
            Statement::DropTable(s) => {
                self.db.drop_table(&s.table)?;
                Ok(QueryOutput::None)
            }
        }
    }

    fn select(&mut self, stmt: SelectStatement) -> Result<QueryOutput, SqlError> {
        let table = self
            .db
            .table(&stmt.table)
            .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;

        let projection: Vec<usize> = if stmt.columns.len() == 1 && stmt.columns[0] == "*" {
            (0..table.columns().len()).collect()
        } else {
            stmt.columns
                .iter()
                .map(|name| {
                    table
                        .column_index(name)
                        .ok_or_else(|| SqlError::UnknownColumn(name.clone()))
                })
                .collect::<Result<_, _>>()?
        };

        let mut matches = collect_matching(table, stmt.where_clause.as_ref())?;
        if let Some(limit) = stmt.limit {
            matches.truncate(limit as usize);
        }

        let columns = projection
            .iter()
            .map(|&i| table.columns()[i].name.clone())
            .collect();
        let rows = matches
            .into_iter()
            .map(|(_, row)| projection.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(QueryOutput::Rows { columns, rows })
    }

    fn insert(&mut self, stmt: InsertStatement) -> Result<QueryOutput, SqlError> {
        let row = {
            let table = self
                .db
                .table(&stmt.table)
                .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;
            build_row(table, &stmt.columns, &stmt.values)?
        };
        self.insert_row(&stmt.table, row)?;
        Ok(QueryOutput::Affected(1))
    }

    fn bulk_insert(&mut self, stmt: BulkInsertStatement) -> Result<QueryOutput, SqlError> {
        let rows: Vec<Vec<Field>> = {
            let table = self
                .db
                .table(&stmt.table)
                .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;
            stmt.rows
                .iter()
                .map(|values| build_row(table, &stmt.columns, values))
                .collect::<Result<_, _>>()?
        };

        let count = rows.len();
        for row in rows {
            self.insert_row(&stmt.table, row)?;
        }
        Ok(QueryOutput::Affected(count))
    }

    fn update(&mut self, stmt: UpdateStatement) -> Result<QueryOutput, SqlError> {
        let (assignments, matches) = {
            let table = self
                .db
                .table(&stmt.table)
                .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;

            let assignments: Vec<(usize, Field)> = stmt
                .assignments
                .iter()
                .map(|(name, literal)| {
                    let idx = table
                        .column_index(name)
                        .ok_or_else(|| SqlError::UnknownColumn(name.clone()))?;
                    Ok((idx, coerce(&table.columns()[idx], literal)?))
                })
                .collect::<Result<_, SqlError>>()?;

            (assignments, collect_matching(table, stmt.where_clause.as_ref())?)
        };

        let count = matches.len();
        for (pk, row) in matches {
            let mut new_row = row.clone();
            for (idx, field) in &assignments {
                new_row[*idx] = field.clone();
            }
            self.replace_row(&stmt.table, pk, &row, new_row)?;
        }
        Ok(QueryOutput::Affected(count))
    }

    fn delete(&mut self, stmt: DeleteStatement) -> Result<QueryOutput, SqlError> {
        let matches = {
            let table = self
                .db
                .table(&stmt.table)
                .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;
            collect_matching(table, stmt.where_clause.as_ref())?
        };

        let table = self
            .db
            .table_mut(&stmt.table)
            .ok_or_else(|| SqlError::UnknownTable(stmt.table.clone()))?;

        let count = matches.len();
        for (pk, row) in matches {
            table.primary.delete(pk);
            let hashes: Vec<(String, Key)> = secondary_hashes(table, &row);
            for (column, hash) in hashes {
                if let Some(tree) = table.secondaries.get_mut(&column) {
                    tree.delete(hash);
                }
            }
        }
        Ok(QueryOutput::Affected(count))
    }

    /// Inserts a fully-typed row, maintaining every secondary index.
    /// Uniqueness (primary key and indexed values) is verified before any
    /// tree is touched.
    fn insert_row(&mut self, table_name: &str, row: Vec<Field>) -> Result<(), SqlError> {
        let table = self
            .db
            .table_mut(table_name)
            .ok_or_else(|| SqlError::UnknownTable(table_name.to_string()))?;

        let pk = field_key(&row[0]);
        if table.primary.search(pk).is_some() {
            return Err(SqlError::Tree(TreeError::AlreadyExists));
        }

        let hashes = secondary_hashes(table, &row);
        for (column, hash) in &hashes {
            if let Some(tree) = table.secondaries.get(column) {
                if tree.search(*hash).is_some() {
                    return Err(SqlError::Tree(TreeError::AlreadyExists));
                }
            }
        }

        table.primary.insert(pk, Value::Record(row))?;
        for (column, hash) in hashes {
            if let Some(tree) = table.secondaries.get_mut(&column) {
                tree.insert(hash, Value::Int(pk as i64))?;
            }
        }
        Ok(())
    }

    /// Swaps `old_row` for `new_row`. An unchanged primary key updates in
    /// place; a changed one re-keys through delete + insert. Secondary
    /// entries follow the changed column values.
    fn replace_row(
        &mut self,
        table_name: &str,
        pk: Key,
        old_row: &[Field],
        new_row: Vec<Field>,
    ) -> Result<(), SqlError> {
        let table = self
            .db
            .table_mut(table_name)
            .ok_or_else(|| SqlError::UnknownTable(table_name.to_string()))?;

        let new_pk = field_key(&new_row[0]);

        let old_hashes = secondary_hashes(table, old_row);
        let new_hashes = secondary_hashes(table, &new_row);

        // All uniqueness checks happen before the first write.
        if new_pk != pk && table.primary.search(new_pk).is_some() {
            return Err(SqlError::Tree(TreeError::AlreadyExists));
        }
        for ((column, old_hash), (_, new_hash)) in old_hashes.iter().zip(&new_hashes) {
            if new_hash != old_hash {
                if let Some(tree) = table.secondaries.get(column) {
                    if tree.search(*new_hash).is_some() {
                        return Err(SqlError::Tree(TreeError::AlreadyExists));
                    }
                }
            }
        }

        if new_pk == pk {
            table.primary.update(pk, Value::Record(new_row));
        } else {
            table.primary.delete(pk);
            table.primary.insert(new_pk, Value::Record(new_row))?;
        }

        for ((column, old_hash), (_, new_hash)) in old_hashes.iter().zip(&new_hashes) {
            if let Some(tree) = table.secondaries.get_mut(column) {
                if new_hash != old_hash {
                    tree.delete(*old_hash);
                    tree.insert(*new_hash, Value::Int(new_pk as i64))?;
                } else if new_pk != pk {
                    tree.update(*old_hash, Value::Int(new_pk as i64));
                }
            }
        }
        Ok(())
    }
}

/// The `(column, hash)` pair a row contributes to each secondary index.
fn secondary_hashes(table: &Table, row: &[Field]) -> Vec<(String, Key)> {
    table
        .secondaries
        .keys()
        .filter_map(|column| {
            let idx = table.column_index(column)?;
            Some((column.clone(), field_key(&row[idx])))
        })
        .collect()
}

/// Gathers the rows a WHERE clause selects (all rows when there is none),
/// picking the cheapest access path first and filtering with every
/// predicate afterwards.
fn collect_matching(
    table: &Table,
    clause: Option<&WhereClause>,
) -> Result<Vec<(Key, Vec<Field>)>, SqlError> {
    let clause = match clause {
        None => return table.scan_rows(),
        Some(c) => c,
    };

    for expr in &clause.exprs {
        if table.column_index(&expr.left).is_none() {
            return Err(SqlError::UnknownColumn(expr.left.clone()));
        }
    }

    let candidates = candidate_rows(table, clause)?;
    Ok(candidates
        .into_iter()
        .filter(|(_, row)| clause.exprs.iter().all(|e| row_matches(table, row, e)))
        .collect())
}

/// Picks the access path for a WHERE clause: a primary point lookup, a
/// secondary-index lookup, or a full leaf-chain scan.
fn candidate_rows(table: &Table, clause: &WhereClause) -> Result<Vec<(Key, Vec<Field>)>, SqlError> {
    let primary = table.primary_column();

    for expr in &clause.exprs {
        if expr.left != primary.name {
            continue;
        }
        let Some(field) = operand_field(table, &expr.right) else {
            continue;
        };
        if !field_fits(&field, primary.column_type) {
            // An INT key can never equal a TEXT literal; nothing matches.
            return Ok(Vec::new());
        }
        let key = field_key(&field);
        return Ok(match table.primary.search(key) {
            Some(value) => vec![(key, decode_row(value.clone())?)],
            None => Vec::new(),
        });
    }

    for expr in &clause.exprs {
        let Some(tree) = table.secondaries.get(&expr.left) else {
            continue;
        };
        let Some(field) = operand_field(table, &expr.right) else {
            continue;
        };
        let hash = field_key(&field);
        return match tree.search(hash) {
            Some(Value::Int(pk)) => {
                let pk = *pk as Key;
                match table.primary.search(pk) {
                    Some(value) => Ok(vec![(pk, decode_row(value.clone())?)]),
                    // The index pointed at a missing row; the invariant is
                    // broken and hiding that would mask real damage.
                    None => Err(SqlError::Corrupt(format!(
                        "secondary index on \"{}\" references a missing row",
                        expr.left
                    ))),
                }
            }
            Some(other) => Err(SqlError::Corrupt(format!(
                "secondary index on \"{}\" holds a non-key value: {:?}",
                expr.left, other
            ))),
            None => Ok(Vec::new()),
        };
    }

    table.scan_rows()
}

/// Evaluates one equality predicate against a row.
fn row_matches(table: &Table, row: &[Field], expr: &Expression) -> bool {
    let Some(idx) = table.column_index(&expr.left) else {
        return false;
    };
    let left = &row[idx];

    match &expr.right {
        Operand::Ident(name) => match table.column_index(name) {
            // A column on the right compares two fields of the same row.
            Some(right_idx) => left == &row[right_idx],
            None => left == &Field::Text(name.clone()),
        },
        Operand::Int(i) => left == &Field::Int(*i),
        Operand::Str(s) => left == &Field::Text(s.clone()),
    }
}

/// Resolves a WHERE operand to a concrete field, or `None` when it names a
/// column (a column-to-column comparison has no literal key to look up).
fn operand_field(table: &Table, operand: &Operand) -> Option<Field> {
    match operand {
        Operand::Int(i) => Some(Field::Int(*i)),
        Operand::Str(s) => Some(Field::Text(s.clone())),
        Operand::Ident(name) => {
            if table.column_index(name).is_some() {
                None
            } else {
                // A bare identifier that names no column reads as text.
                Some(Field::Text(name.clone()))
            }
        }
    }
}

fn field_fits(field: &Field, column_type: ColumnType) -> bool {
    matches!(
        (field, column_type),
        (Field::Int(_), ColumnType::Int) | (Field::Text(_), ColumnType::Text)
    )
}

/// Assembles a typed row in schema order from an INSERT's column and value
/// lists. Every table column must be given exactly once, with a literal of
/// the declared type.
fn build_row(table: &Table, columns: &[String], values: &[Literal]) -> Result<Vec<Field>, SqlError> {
    if columns.len() != values.len() {
        return Err(SqlError::Syntax(format!(
            "{} columns but {} values",
            columns.len(),
            values.len()
        )));
    }

    let mut fields: Vec<Option<Field>> = vec![None; table.columns().len()];
    for (name, literal) in columns.iter().zip(values) {
        let idx = table
            .column_index(name)
            .ok_or_else(|| SqlError::UnknownColumn(name.clone()))?;
        if fields[idx].is_some() {
            return Err(SqlError::Syntax(format!("duplicate column \"{}\"", name)));
        }
        fields[idx] = Some(coerce(&table.columns()[idx], literal)?);
    }

    fields
        .into_iter()
        .zip(table.columns())
        .map(|(field, column)| {
            field.ok_or_else(|| {
                SqlError::Syntax(format!("missing value for column \"{}\"", column.name))
            })
        })
        .collect()
}

/// Checks a literal against a column's declared type.
fn coerce(column: &ColumnDef, literal: &Literal) -> Result<Field, SqlError> {
    match (column.column_type, literal) {
        (ColumnType::Int, Literal::Int(i)) => Ok(Field::Int(*i)),
        (ColumnType::Text, Literal::Str(s)) => Ok(Field::Text(s.clone())),
        (column_type, _) => Err(SqlError::TypeMismatch {
            column: column.name.clone(),
            expected: column_type.name(),
        }),
    }
}
