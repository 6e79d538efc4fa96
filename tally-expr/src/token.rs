//! Tokenizer for the expression language.

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Float(f64),
    Text(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    LParen,
    RParen,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Integer(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => format!("{v:?}"),
            Self::True => "true".to_owned(),
            Self::False => "false".to_owned(),
            Self::Null => "null".to_owned(),
            other => format!("\"{}\"", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::StarStar => "**",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::LParen => "(",
            Self::RParen => ")",
            _ => "",
        }
    }
}

/// Token together with the character offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let Some(&ch) = chars.get(i) else {
            break;
        };

        let position = i;
        let (token, next) = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => parse_number(&chars, i)?,
            '"' | '\'' => parse_string(&chars, i, ch)?,
            c if c.is_alphabetic() || c == '_' => parse_identifier(&chars, i)?,
            '+' => (Token::Plus, i + 1),
            '-' => (Token::Minus, i + 1),
            '/' => (Token::Slash, i + 1),
            '%' => (Token::Percent, i + 1),
            '(' => (Token::LParen, i + 1),
            ')' => (Token::RParen, i + 1),
            '*' => pick(&chars, i, '*', Token::StarStar, Token::Star),
            '<' => pick(&chars, i, '=', Token::Le, Token::Lt),
            '>' => pick(&chars, i, '=', Token::Ge, Token::Gt),
            '!' => pick(&chars, i, '=', Token::BangEq, Token::Bang),
            '=' => pair(&chars, i, '=', Token::EqEq)?,
            '&' => pair(&chars, i, '&', Token::AndAnd)?,
            '|' => pair(&chars, i, '|', Token::OrOr)?,
            other => return Err(EvalError::UnexpectedChar { found: other, position }),
        };

        tokens.push(Spanned { token, position });
        i = next;
    }

    Ok(tokens)
}

/// Two-character operator if the next char matches, single-character one otherwise
fn pick(chars: &[char], i: usize, second: char, long: Token, short: Token) -> (Token, usize) {
    if chars.get(i + 1).copied() == Some(second) {
        (long, i + 2)
    } else {
        (short, i + 1)
    }
}

/// Operator that is only valid doubled (`==`, `&&`, `||`)
fn pair(chars: &[char], i: usize, second: char, token: Token) -> Result<(Token, usize), EvalError> {
    match chars.get(i + 1).copied() {
        Some(c) if c == second => Ok((token, i + 2)),
        _ => Err(EvalError::UnexpectedChar { found: chars[i], position: i }),
    }
}

fn parse_number(chars: &[char], mut i: usize) -> Result<(Token, usize), EvalError> {
    let start = i;
    let mut is_float = false;

    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if chars.get(i).copied() == Some('.') {
        is_float = true;
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    if matches!(chars.get(i).copied(), Some('e' | 'E')) {
        is_float = true;
        i += 1;
        if matches!(chars.get(i).copied(), Some('+' | '-')) {
            i += 1;
        }
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    // reject things like "12abc" instead of reading them as two tokens
    while chars.get(i).is_some_and(|c| c.is_alphanumeric() || *c == '_' || *c == '.') {
        i += 1;
    }

    let literal: String = chars[start..i].iter().collect();
    let invalid = || EvalError::InvalidNumber { literal: literal.clone(), position: start };

    let token = if is_float {
        Token::Float(literal.parse::<f64>().map_err(|_| invalid())?)
    } else {
        match literal.parse::<i64>() {
            Ok(v) => Token::Integer(v),
            Err(_) if literal.chars().all(|c| c.is_ascii_digit()) => {
                // too large for an integer, keep it as a float
                Token::Float(literal.parse::<f64>().map_err(|_| invalid())?)
            }
            Err(_) => return Err(invalid()),
        }
    };

    if let Token::Float(v) = &token {
        if !v.is_finite() {
            return Err(invalid());
        }
    }

    Ok((token, i))
}

fn parse_string(chars: &[char], mut i: usize, quote_char: char) -> Result<(Token, usize), EvalError> {
    let start = i;
    let mut text = String::new();
    i += 1;

    loop {
        let Some(&ch) = chars.get(i) else {
            return Err(EvalError::UnterminatedString { position: start });
        };

        match ch {
            c if c == quote_char => return Ok((Token::Text(text), i + 1)),
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err(EvalError::UnterminatedString { position: start });
                };
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                i += 2;
            }
            other => {
                text.push(other);
                i += 1;
            }
        }
    }
}

fn parse_identifier(chars: &[char], mut i: usize) -> Result<(Token, usize), EvalError> {
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        i += 1;
    }

    let name: String = chars[start..i].iter().collect();
    let token = match name.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => return Err(EvalError::UnknownIdentifier { name, position: start }),
    };

    Ok((token, i))
}
