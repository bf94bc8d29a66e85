//! Tokenizer for filter expressions.
//!
//! Characters that only serve code constructs outside the grammar
//! (attribute access, assignment, subscripts, strings, statements) are
//! rejected here as security violations.

use crate::expr::ast::Span;
use crate::expr::error::{ExprError, ExprResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    /// Backtick-quoted column name.
    QuotedIdent(String),
    True,
    False,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

const RESERVED_WORDS: &[&str] = &[
    "import", "lambda", "exec", "eval", "compile", "open", "globals", "locals", "getattr",
    "setattr", "delattr", "del", "def", "class", "return", "yield", "for", "while", "if", "else",
    "with", "as", "from", "global", "nonlocal", "in", "is",
];

pub fn tokenize(source: &str) -> ExprResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let single = |kind: TokenKind| Token {
            kind,
            span: Span::new(start, start + 1),
        };
        let double = |kind: TokenKind| Token {
            kind,
            span: Span::new(start, start + 2),
        };
        let next = chars.get(pos + 1).copied();

        match c {
            '0'..='9' => {
                let (token, end) = lex_number(source, &chars, start)?;
                tokens.push(token);
                pos = end;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let (token, end) = lex_number(source, &chars, start)?;
                tokens.push(token);
                pos = end;
            }
            '.' => {
                return Err(ExprError::security(
                    source,
                    Span::new(start, start + 1),
                    "attribute access is not allowed",
                ));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                tokens.push(Token {
                    kind: classify_word(source, &word, Span::new(start, end))?,
                    span: Span::new(start, end),
                });
                pos = end;
            }
            '`' => {
                let mut end = start + 1;
                while end < chars.len() && chars[end] != '`' {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ExprError::syntax(
                        source,
                        Span::new(start, chars.len()),
                        "unterminated quoted column name",
                    ));
                }
                let name: String = chars[start + 1..end].iter().collect();
                if name.trim().is_empty() {
                    return Err(ExprError::syntax(
                        source,
                        Span::new(start, end + 1),
                        "quoted column name must not be empty",
                    ));
                }
                tokens.push(Token {
                    kind: TokenKind::QuotedIdent(name),
                    span: Span::new(start, end + 1),
                });
                pos = end + 1;
            }
            '+' => {
                tokens.push(single(TokenKind::Plus));
                pos += 1;
            }
            '-' => {
                tokens.push(single(TokenKind::Minus));
                pos += 1;
            }
            '*' if next == Some('*') => {
                tokens.push(double(TokenKind::StarStar));
                pos += 2;
            }
            '*' => {
                tokens.push(single(TokenKind::Star));
                pos += 1;
            }
            '/' => {
                tokens.push(single(TokenKind::Slash));
                pos += 1;
            }
            '<' if next == Some('=') => {
                tokens.push(double(TokenKind::Le));
                pos += 2;
            }
            '<' => {
                tokens.push(single(TokenKind::Lt));
                pos += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(double(TokenKind::Ge));
                pos += 2;
            }
            '>' => {
                tokens.push(single(TokenKind::Gt));
                pos += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(double(TokenKind::EqEq));
                pos += 2;
            }
            '=' => {
                return Err(ExprError::security(
                    source,
                    Span::new(start, start + 1),
                    "assignment is not allowed; use `==` to compare",
                ));
            }
            '!' if next == Some('=') => {
                tokens.push(double(TokenKind::NotEq));
                pos += 2;
            }
            '(' => {
                tokens.push(single(TokenKind::LParen));
                pos += 1;
            }
            ')' => {
                tokens.push(single(TokenKind::RParen));
                pos += 1;
            }
            ',' => {
                tokens.push(single(TokenKind::Comma));
                pos += 1;
            }
            '[' | ']' | '{' | '}' => {
                return Err(ExprError::security(
                    source,
                    Span::new(start, start + 1),
                    "subscripts and collection literals are not allowed",
                ));
            }
            '\'' | '"' => {
                return Err(ExprError::security(
                    source,
                    Span::new(start, start + 1),
                    "string literals are not allowed",
                ));
            }
            ';' | ':' => {
                return Err(ExprError::security(
                    source,
                    Span::new(start, start + 1),
                    "statements are not allowed",
                ));
            }
            other => {
                return Err(ExprError::syntax(
                    source,
                    Span::new(start, start + 1),
                    format!("unexpected character `{other}`"),
                ));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(chars.len(), chars.len()),
    });
    Ok(tokens)
}

fn classify_word(source: &str, word: &str, span: Span) -> ExprResult<TokenKind> {
    if word.contains("__") {
        return Err(ExprError::security(
            source,
            span,
            format!("identifier `{word}` is not allowed"),
        ));
    }
    let lowered = word.to_ascii_lowercase();
    if RESERVED_WORDS.contains(&lowered.as_str()) {
        return Err(ExprError::security(
            source,
            span,
            format!("reserved word `{word}` is not allowed"),
        ));
    }
    Ok(match lowered.as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Ident(word.to_string()),
    })
}

fn lex_number(source: &str, chars: &[char], start: usize) -> ExprResult<(Token, usize)> {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end] == '.' {
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
        let mut exp_end = end + 1;
        if exp_end < chars.len() && (chars[exp_end] == '+' || chars[exp_end] == '-') {
            exp_end += 1;
        }
        if exp_end < chars.len() && chars[exp_end].is_ascii_digit() {
            while exp_end < chars.len() && chars[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    // `1.foo` would otherwise lex as a number followed by an identifier.
    if end < chars.len() && (chars[end].is_alphabetic() || chars[end] == '_') {
        return Err(ExprError::syntax(
            source,
            Span::new(start, end + 1),
            "malformed number",
        ));
    }

    let text: String = chars[start..end].iter().collect();
    let value = text.parse::<f64>().map_err(|_| {
        ExprError::syntax(source, Span::new(start, end), format!("invalid number `{text}`"))
    })?;
    Ok((
        Token {
            kind: TokenKind::Number(value),
            span: Span::new(start, end),
        },
        end,
    ))
}

#[cfg(test)]
mod tests {
    use super::{tokenize, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_operators_and_numbers() {
        assert_eq!(
            kinds("a**2 >= .5e1 != 3"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::StarStar,
                TokenKind::Number(2.0),
                TokenKind::Ge,
                TokenKind::Number(5.0),
                TokenKind::NotEq,
                TokenKind::Number(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("x and Not y OR TRUE"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident("y".to_string()),
                TokenKind::Or,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quoted_column_keeps_spaces() {
        assert_eq!(
            kinds("`cell area`")[0],
            TokenKind::QuotedIdent("cell area".to_string())
        );
    }

    #[test]
    fn rejects_code_constructs_as_security_violations() {
        for text in [
            "area.real",
            "x = 1",
            "cols[0]",
            "'abc'",
            "a; b",
            "__import__",
            "lambda",
        ] {
            let err = tokenize(text).unwrap_err();
            assert!(err.is_security_rejection(), "{text}: {err}");
        }
    }

    #[test]
    fn reports_position_of_bad_character() {
        let err = tokenize("area > 5 ? 1").unwrap_err();
        assert_eq!(err.position(), Some(9));
        assert!(!err.is_security_rejection());
    }
}
