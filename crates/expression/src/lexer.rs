//! Tokenizer for the built-in rule language.

use crate::ExpressionError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

/// Split `source` into tokens.
///
/// # Errors
/// Returns [`ExpressionError::Invalid`] on an unterminated string, a
/// malformed number, or a character outside the grammar.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Two-character operators first.
        let pair = (c, chars.get(pos + 1).copied());
        let two = match pair {
            ('=', Some('=')) => Some(Token::Eq),
            ('!', Some('=')) => Some(Token::Ne),
            ('<', Some('=')) => Some(Token::Le),
            ('>', Some('=')) => Some(Token::Ge),
            ('&', Some('&')) => Some(Token::And),
            ('|', Some('|')) => Some(Token::Or),
            _ => None,
        };
        if let Some(token) = two {
            tokens.push(token);
            pos += 2;
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '<' => tokens.push(Token::Lt),
            '>' => tokens.push(Token::Gt),
            '!' => tokens.push(Token::Not),
            '"' | '\'' => {
                let (literal, next) = read_string(&chars, pos, source)?;
                tokens.push(Token::Str(literal));
                pos = next;
                continue;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, pos)) => {
                let start = pos;
                pos += 1;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                let text: String = chars[start..pos].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    ExpressionError::invalid(source, format!("malformed number '{text}'"))
                })?;
                tokens.push(Token::Number(number));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                tokens.push(keyword_or_ident(word));
                continue;
            }
            other => {
                return Err(ExpressionError::invalid(
                    source,
                    format!("unexpected character '{other}' at offset {pos}"),
                ));
            }
        }
        pos += 1;
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[char], pos: usize) -> bool {
    chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit())
}

fn keyword_or_ident(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Ident(word),
    }
}

/// Read a quoted string starting at `start` (the opening quote).
/// Returns the unescaped literal and the position after the closing quote.
fn read_string(
    chars: &[char],
    start: usize,
    source: &str,
) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut literal = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars.get(pos + 1).ok_or_else(|| {
                    ExpressionError::invalid(source, "dangling escape at end of input")
                })?;
                literal.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                pos += 2;
            }
            c if c == quote => return Ok((literal, pos + 1)),
            c => {
                literal.push(c);
                pos += 1;
            }
        }
    }

    Err(ExpressionError::invalid(
        source,
        format!("unterminated string starting at offset {start}"),
    ))
}
