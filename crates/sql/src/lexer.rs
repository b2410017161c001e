//! SQL tokenizer.
//!
//! A pure function from query text to a token vector. The sequence ends with
//! an `Eof` token, or with a single `Error` token (carrying the message)
//! when the input cannot be tokenized further.
//!
//! Keywords match case-insensitively; the token keeps the literal exactly as
//! written. String literals are double-quoted with no escapes, and the token
//! literal keeps the quotes. `*` is emitted as an identifier so `SELECT *`
//! needs no special case downstream.

/// The lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Tokenization failed; the literal is the error message.
    Error,
    /// End of input.
    Eof,
    Identifier,
    Integer,
    /// A double-quoted string literal, quotes included.
    Str,
    Keyword,
    LeftParen,
    RightParen,
    Comma,
    /// `=`
    Assign,
    /// `==`
    Equals,
}

/// One token: its kind plus the literal text as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
}

impl Token {
    fn new(kind: TokenKind, literal: impl Into<String>) -> Self {
        Self {
            kind,
            literal: literal.into(),
        }
    }
}

/// The reserved words of the dialect.
pub const KEYWORDS: [&str; 14] = [
    "SELECT", "INSERT", "DELETE", "INTO", "FROM", "WHERE", "LIMIT", "AND", "VALUES", "UPDATE",
    "SET", "CREATE", "DROP", "TABLE",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenizes `input`.
///
/// Deterministic: the same input always yields the same token sequence.
pub fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_whitespace() => pos += 1,
            '*' => {
                tokens.push(Token::new(TokenKind::Identifier, "*"));
                pos += 1;
            }
            '(' => {
                tokens.push(Token::new(TokenKind::LeftParen, "("));
                pos += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenKind::RightParen, ")"));
                pos += 1;
            }
            ',' => {
                tokens.push(Token::new(TokenKind::Comma, ","));
                pos += 1;
            }
            '=' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::new(TokenKind::Equals, "=="));
                    pos += 2;
                } else {
                    tokens.push(Token::new(TokenKind::Assign, "="));
                    pos += 1;
                }
            }
            '"' => {
                let start = pos;
                pos += 1;
                while pos < chars.len() && chars[pos] != '"' {
                    pos += 1;
                }
                if pos >= chars.len() {
                    tokens.push(Token::new(TokenKind::Error, "unterminated string"));
                    return tokens;
                }
                pos += 1; // consume the closing quote
                let literal: String = chars[start..pos].iter().collect();
                tokens.push(Token::new(TokenKind::Str, literal));
            }
            c if is_ident_start(c) => {
                let start = pos;
                while pos < chars.len() && is_ident_continue(chars[pos]) {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                let kind = if is_keyword(&word) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                tokens.push(Token::new(kind, word));
            }
            c if c.is_ascii_digit() => {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let digits: String = chars[start..pos].iter().collect();
                tokens.push(Token::new(TokenKind::Integer, digits));
            }
            other => {
                tokens.push(Token::new(
                    TokenKind::Error,
                    format!("unexpected character: '{}'", other),
                ));
                return tokens;
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eof, ""));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn select_statement_tokens() {
        let tokens = tokenize("SELECT name, age FROM users WHERE age == 30");
        let expected = [
            (TokenKind::Keyword, "SELECT"),
            (TokenKind::Identifier, "name"),
            (TokenKind::Comma, ","),
            (TokenKind::Identifier, "age"),
            (TokenKind::Keyword, "FROM"),
            (TokenKind::Identifier, "users"),
            (TokenKind::Keyword, "WHERE"),
            (TokenKind::Identifier, "age"),
            (TokenKind::Equals, "=="),
            (TokenKind::Integer, "30"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (tok, (kind, literal)) in tokens.iter().zip(expected) {
            assert_eq!(tok.kind, kind);
            assert_eq!(tok.literal, literal);
        }
    }

    #[test]
    fn keywords_match_case_insensitively_and_keep_their_spelling() {
        let tokens = tokenize("select From wHeRe");
        assert_eq!(
            tokens
                .iter()
                .map(|t| (t.kind, t.literal.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (TokenKind::Keyword, "select"),
                (TokenKind::Keyword, "From"),
                (TokenKind::Keyword, "wHeRe"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn star_is_an_identifier() {
        let tokens = tokenize("SELECT * FROM t");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].literal, "*");
    }

    #[test]
    fn string_literal_keeps_quotes() {
        let tokens = tokenize("\"John\"");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].literal, "\"John\"");
    }

    #[test]
    fn assign_and_equals_are_distinct() {
        assert_eq!(
            kinds("a = b == c"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn identifiers_allow_underscores_and_digits() {
        let tokens = tokenize("col_1 _hidden t2");
        assert!(tokens[..3]
            .iter()
            .all(|t| t.kind == TokenKind::Identifier));
        assert_eq!(tokens[0].literal, "col_1");
        assert_eq!(tokens[1].literal, "_hidden");
        assert_eq!(tokens[2].literal, "t2");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let tokens = tokenize("SELECT \"oops");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.literal, "unterminated string");
        // No Eof after an error.
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Eof));
    }

    #[test]
    fn unexpected_character_is_an_error() {
        let tokens = tokenize("SELECT ; FROM t");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.literal, "unexpected character: ';'");
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \t\n"), vec![TokenKind::Eof]);
    }

    #[test]
    fn tokenization_is_deterministic() {
        let input = "INSERT INTO t (id, name) VALUES (1, \"a\"), (2, \"b\")";
        assert_eq!(tokenize(input), tokenize(input));
    }
}
