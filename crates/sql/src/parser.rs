//! Recursive-descent parser: token vector → [`Statement`].
//!
//! Dispatch happens on the leading keyword. Error messages name the element
//! that was expected and quote the token that was found instead.

use crate::ast::*;
use crate::lexer::{Token, TokenKind};
use crate::SqlError;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                literal: String::new(),
            });
        }
        Self { tokens, pos: 0 }
    }

    /// Parses one statement.
    pub fn parse(&mut self) -> Result<Statement, SqlError> {
        // A lexer failure anywhere in the input outranks grammar errors.
        if let Some(err) = self.tokens.iter().find(|t| t.kind == TokenKind::Error) {
            return Err(SqlError::Syntax(err.literal.clone()));
        }

        let first = self.peek().clone();
        match first.kind {
            TokenKind::Eof => Err(SqlError::Syntax("empty query".into())),
            TokenKind::Keyword => match first.literal.to_ascii_uppercase().as_str() {
                "SELECT" => self.parse_select(),
                "INSERT" => self.parse_insert(),
                "UPDATE" => self.parse_update(),
                "DELETE" => self.parse_delete(),
                "CREATE" => self.parse_create_table(),
                "DROP" => self.parse_drop_table(),
                _ => Err(SqlError::Unsupported),
            },
            _ => Err(SqlError::Unsupported),
        }
    }

    // --------------------- Statements ---------------------

    fn parse_select(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // SELECT

        let mut columns = vec![self.expect_identifier("column name in SELECT")?];
        while self.eat(TokenKind::Comma) {
            columns.push(self.expect_identifier("column name after comma")?);
        }

        self.expect_keyword("FROM", "FROM clause")?;
        let table = self.expect_identifier("table name")?;

        let where_clause = self.parse_optional_where()?;

        let limit = if self.at_keyword("LIMIT") {
            self.advance();
            let tok = self.peek().clone();
            if tok.kind != TokenKind::Integer {
                return Err(self.unexpected("row count after LIMIT", &tok));
            }
            self.advance();
            let n = tok.literal.parse().map_err(|_| {
                SqlError::Syntax(format!("integer literal out of range: {}", tok.literal))
            })?;
            Some(n)
        } else {
            None
        };

        Ok(Statement::Select(SelectStatement {
            columns,
            table,
            where_clause,
            limit,
        }))
    }

    fn parse_insert(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // INSERT
        if self.at_keyword("INTO") {
            self.advance();
        }

        let table = self.expect_identifier("table name")?;
        let columns = self.parse_column_list()?;

        self.expect_keyword("VALUES", "VALUES keyword")?;

        let mut rows = vec![self.parse_value_row()?];
        while self.eat(TokenKind::Comma) {
            rows.push(self.parse_value_row()?);
        }

        if rows.len() == 1 {
            let values = rows.remove(0);
            Ok(Statement::Insert(InsertStatement {
                table,
                columns,
                values,
            }))
        } else {
            Ok(Statement::BulkInsert(BulkInsertStatement {
                table,
                columns,
                rows,
            }))
        }
    }

    fn parse_update(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // UPDATE

        let table = self.expect_identifier("table name")?;
        self.expect_keyword("SET", "SET keyword")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier("column name in SET")?;
            let tok = self.peek().clone();
            if tok.kind != TokenKind::Assign {
                return Err(self.unexpected("assignment operator", &tok));
            }
            self.advance();
            let value = self.expect_literal("value after assignment")?;
            assignments.push((column, value));

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let where_clause = self.parse_optional_where()?;

        Ok(Statement::Update(UpdateStatement {
            table,
            assignments,
            where_clause,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // DELETE
        self.expect_keyword("FROM", "FROM keyword")?;
        let table = self.expect_identifier("table name")?;
        let where_clause = self.parse_optional_where()?;

        Ok(Statement::Delete(DeleteStatement {
            table,
            where_clause,
        }))
    }

    fn parse_create_table(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // CREATE
        self.expect_keyword("TABLE", "TABLE keyword")?;
        let table = self.expect_identifier("table name")?;

        let tok = self.peek().clone();
        if tok.kind != TokenKind::LeftParen {
            return Err(self.unexpected("opening parenthesis", &tok));
        }
        self.advance();

        let mut columns = Vec::new();
        loop {
            let name = self.expect_identifier("column name")?;
            let type_name = self.expect_identifier("column type")?;
            let column_type = match type_name.to_ascii_uppercase().as_str() {
                "INT" | "INTEGER" => ColumnType::Int,
                "TEXT" | "STRING" | "VARCHAR" => ColumnType::Text,
                _ => {
                    return Err(SqlError::Syntax(format!(
                        "unknown column type \"{}\"",
                        type_name
                    )))
                }
            };
            columns.push(ColumnDef { name, column_type });

            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::RightParen => {
                    self.advance();
                    break;
                }
                TokenKind::Comma => self.advance(),
                _ => return Err(self.unexpected("comma or closing parenthesis", &tok)),
            }
        }

        Ok(Statement::CreateTable(CreateTableStatement {
            table,
            columns,
        }))
    }

    fn parse_drop_table(&mut self) -> Result<Statement, SqlError> {
        self.advance(); // DROP
        self.expect_keyword("TABLE", "TABLE keyword")?;
        let table = self.expect_identifier("table name")?;
        Ok(Statement::DropTable(DropTableStatement { table }))
    }

    // --------------------- Clauses ---------------------

    fn parse_column_list(&mut self) -> Result<Vec<String>, SqlError> {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::LeftParen {
            return Err(self.unexpected("opening parenthesis", &tok));
        }
        self.advance();

        let mut columns = Vec::new();
        loop {
            columns.push(self.expect_identifier("column name")?);
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::RightParen => {
                    self.advance();
                    return Ok(columns);
                }
                TokenKind::Comma => self.advance(),
                _ => return Err(self.unexpected("comma or closing parenthesis", &tok)),
            }
        }
    }

    fn parse_value_row(&mut self) -> Result<Vec<Literal>, SqlError> {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::LeftParen {
            return Err(self.unexpected("opening parenthesis before values", &tok));
        }
        self.advance();

        let mut values = Vec::new();
        loop {
            values.push(self.expect_literal("value")?);
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::RightParen => {
                    self.advance();
                    return Ok(values);
                }
                TokenKind::Comma => self.advance(),
                _ => return Err(self.unexpected("comma or closing parenthesis", &tok)),
            }
        }
    }

    fn parse_optional_where(&mut self) -> Result<Option<WhereClause>, SqlError> {
        if !self.at_keyword("WHERE") {
            return Ok(None);
        }
        self.advance();

        let mut exprs = vec![self.parse_expression()?];
        while self.at_keyword("AND") {
            self.advance();
            exprs.push(self.parse_expression()?);
        }

        Ok(Some(WhereClause { exprs }))
    }

    fn parse_expression(&mut self) -> Result<Expression, SqlError> {
        let left = self.expect_identifier("left side of expression")?;

        // Inside WHERE both `==` and `=` mean equality; keep the spelling.
        let tok = self.peek().clone();
        let operator = match tok.kind {
            TokenKind::Equals | TokenKind::Assign => {
                self.advance();
                tok.literal
            }
            _ => return Err(self.unexpected("comparison operator", &tok)),
        };

        let tok = self.peek().clone();
        let right = match tok.kind {
            TokenKind::Identifier => {
                self.advance();
                Operand::Ident(tok.literal)
            }
            TokenKind::Integer => {
                self.advance();
                Operand::Int(parse_int(&tok.literal)?)
            }
            TokenKind::Str => {
                self.advance();
                Operand::Str(unquote(&tok.literal))
            }
            _ => return Err(self.unexpected("right side of expression", &tok)),
        };

        Ok(Expression {
            left,
            operator,
            right,
        })
    }

    // --------------------- Token helpers ---------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consumes the current token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let tok = self.peek();
        tok.kind == TokenKind::Keyword && tok.literal.eq_ignore_ascii_case(keyword)
    }

    fn expect_keyword(&mut self, keyword: &str, what: &str) -> Result<(), SqlError> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            let tok = self.peek().clone();
            Err(self.unexpected(what, &tok))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, SqlError> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Identifier {
            self.advance();
            Ok(tok.literal)
        } else {
            Err(self.unexpected(what, &tok))
        }
    }

    fn expect_literal(&mut self, what: &str) -> Result<Literal, SqlError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer => {
                self.advance();
                Ok(Literal::Int(parse_int(&tok.literal)?))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Literal::Str(unquote(&tok.literal)))
            }
            _ => Err(self.unexpected(what, &tok)),
        }
    }

    fn unexpected(&self, what: &str, found: &Token) -> SqlError {
        let found = match found.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("\"{}\"", found.literal),
        };
        SqlError::Syntax(format!("missing {}, found {}", what, found))
    }
}

fn parse_int(literal: &str) -> Result<i64, SqlError> {
    literal
        .parse()
        .map_err(|_| SqlError::Syntax(format!("integer literal out of range: {}", literal)))
}

/// Strips the surrounding double quotes from a string token literal.
fn unquote(literal: &str) -> String {
    literal[1..literal.len() - 1].to_string()
}
