//! Tokens of the formula language, produced with logos.

use crate::error::{ParseError, ParseErrorKind};
use logos::Logos;
use std::fmt;
use std::ops::Range;

/// Formula token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("True")]
    True,
    #[token("False")]
    False,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    /// Numeric literal; `_` digit separators are accepted.
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9]+)?", parse_number)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// Quoted key, single or double quotes, without escapes.
    #[regex(r#"'[^'\\\n]*'"#, strip_quotes)]
    #[regex(r#""[^"\\\n]*""#, strip_quotes)]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse().ok()
}

fn strip_quotes(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

/// Words that can never name a quantity.
pub const KEYWORDS: [&str; 7] = ["and", "or", "not", "if", "else", "True", "False"];

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::If => "if",
            Token::Else => "else",
            Token::True => "True",
            Token::False => "False",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::DoubleStar => "**",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Number(n) => return write!(f, "{n}"),
            Token::Str(s) => return write!(f, "'{s}'"),
            Token::Ident(id) => return write!(f, "{id}"),
        };
        f.write_str(s)
    }
}

/// Split `source` into tokens paired with their byte spans.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, ParseError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let message = format!("invalid character sequence `{}`", &source[span.clone()]);
                return Err(ParseError::new(ParseErrorKind::InvalidToken, span, message));
            }
        }
    }
    Ok(tokens)
}
