//! Typed statements produced by the parser.

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    BulkInsert(BulkInsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
}

/// A literal value appearing in VALUES or SET. String literals have their
/// quotes stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
}

/// The right-hand side of a WHERE comparison: a bare identifier (usually a
/// column name) or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Ident(String),
    Int(i64),
    Str(String),
}

/// One comparison, `left op right`. The operator literal is preserved as
/// written (`=` or `==`) — both mean equality inside WHERE.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub left: String,
    pub operator: String,
    pub right: Operand,
}

/// A WHERE clause: one or more comparisons joined by AND.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub exprs: Vec<Expression>,
}

/// The storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "INT",
            ColumnType::Text => "TEXT",
        }
    }
}

/// One column declaration in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<String>,
    pub table: String,
    pub where_clause: Option<WhereClause>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkInsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Literal>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<(String, Literal)>,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub table: String,
}

impl Statement {
    /// Short name of the statement kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::BulkInsert(_) => "BULK INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
        }
    }
}
