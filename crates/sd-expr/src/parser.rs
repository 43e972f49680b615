//! Recursive descent parser with precedence climbing for binary operators.
//!
//! Precedence, loosest first: `x if c else y`, `or`, `and`, `not`, comparisons,
//! `+ -`, `* / // %`, unary `+ -`, `**`.

use crate::ast::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::error::{ParseError, ParseErrorKind};
use crate::functions::{namespace_constant, Function, NAMESPACES};
use crate::lexer::{tokenize, Token};
use std::ops::Range;

/// Operand precedence of `not`: binds comparisons, not `and` / `or`.
const NOT_OPERAND: u8 = 30;
/// Operand precedence of unary minus: binds `**`, not `*`.
const UNARY_OPERAND: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Logical(LogicalOp),
    Compare(CompareOp),
    Arith(BinaryOp),
}

fn infix_info(token: &Token) -> Option<(u8, Assoc, Infix)> {
    let info = match token {
        Token::Or => (10, Assoc::Left, Infix::Logical(LogicalOp::Or)),
        Token::And => (20, Assoc::Left, Infix::Logical(LogicalOp::And)),
        Token::Plus => (40, Assoc::Left, Infix::Arith(BinaryOp::Add)),
        Token::Minus => (40, Assoc::Left, Infix::Arith(BinaryOp::Sub)),
        Token::Star => (50, Assoc::Left, Infix::Arith(BinaryOp::Mul)),
        Token::Slash => (50, Assoc::Left, Infix::Arith(BinaryOp::Div)),
        Token::DoubleSlash => (50, Assoc::Left, Infix::Arith(BinaryOp::FloorDiv)),
        Token::Percent => (50, Assoc::Left, Infix::Arith(BinaryOp::Mod)),
        Token::DoubleStar => (70, Assoc::Right, Infix::Arith(BinaryOp::Pow)),
        other => (30, Assoc::Left, Infix::Compare(compare_op(other)?)),
    };
    Some(info)
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token {
        Token::Lt => Some(CompareOp::Lt),
        Token::LtEq => Some(CompareOp::Le),
        Token::Gt => Some(CompareOp::Gt),
        Token::GtEq => Some(CompareOp::Ge),
        Token::EqEq => Some(CompareOp::Eq),
        Token::BangEq => Some(CompareOp::Ne),
        _ => None,
    }
}

/// Token cursor with one token of lookahead.
struct TokenStream<'src> {
    tokens: &'src [(Token, Range<usize>)],
    pos: usize,
    end: usize,
}

impl<'src> TokenStream<'src> {
    fn new(tokens: &'src [(Token, Range<usize>)], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&'src Token> {
        let tokens = self.tokens;
        tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn advance(&mut self) -> Option<&'src Token> {
        let tokens = self.tokens;
        let token = tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if t == expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn current_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.clone())
            .unwrap_or(self.end..self.end)
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{context}, expected `{expected}`")))
        }
    }

    /// Error for the current token (or end of input).
    fn unexpected(&self, context: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.current_span(),
                format!("unexpected `{token}` {context}"),
            ),
            None => ParseError::new(
                ParseErrorKind::UnexpectedEof,
                self.current_span(),
                format!("unexpected end of formula {context}"),
            ),
        }
    }
}

/// Parse a complete formula.
pub(crate) fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut stream = TokenStream::new(&tokens, source.len());
    let expr = parse_expr(&mut stream)?;
    if !stream.at_end() {
        return Err(stream.unexpected("after end of expression"));
    }
    Ok(expr)
}

fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let then = parse_binary(stream, 0)?;
    if !stream.eat(&Token::If) {
        return Ok(then);
    }
    let condition = parse_binary(stream, 0)?;
    stream.expect(Token::Else, "in conditional expression")?;
    let otherwise = parse_expr(stream)?;
    Ok(Expr::Conditional {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

fn parse_binary(stream: &mut TokenStream, min_prec: u8) -> Result<Expr, ParseError> {
    let mut left = parse_prefix(stream)?;

    while let Some(token) = stream.peek() {
        let Some((prec, assoc, infix)) = infix_info(token) else {
            break;
        };
        if prec < min_prec {
            break;
        }
        stream.advance();
        let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };

        left = match infix {
            Infix::Compare(op) => {
                let mut rest = vec![(op, parse_binary(stream, next_prec)?)];
                while let Some(op) = stream.peek().and_then(compare_op) {
                    stream.advance();
                    rest.push((op, parse_binary(stream, next_prec)?));
                }
                Expr::Compare {
                    first: Box::new(left),
                    rest,
                }
            }
            Infix::Logical(op) => Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(parse_binary(stream, next_prec)?),
            },
            Infix::Arith(op) => Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(parse_binary(stream, next_prec)?),
            },
        };
    }

    Ok(left)
}

fn parse_prefix(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let (op, operand_prec) = match stream.peek() {
        Some(Token::Minus) => (UnaryOp::Neg, UNARY_OPERAND),
        Some(Token::Plus) => (UnaryOp::Pos, UNARY_OPERAND),
        Some(Token::Not) => (UnaryOp::Not, NOT_OPERAND),
        _ => return parse_atom(stream),
    };
    stream.advance();
    let operand = parse_binary(stream, operand_prec)?;
    Ok(Expr::Unary {
        op,
        operand: Box::new(operand),
    })
}

fn parse_atom(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let span = stream.current_span();
    match stream.peek() {
        Some(Token::Number(n)) => {
            stream.advance();
            Ok(Expr::Number(*n))
        }
        Some(Token::True) => {
            stream.advance();
            Ok(Expr::Number(1.0))
        }
        Some(Token::False) => {
            stream.advance();
            Ok(Expr::Number(0.0))
        }
        Some(Token::LParen) => {
            stream.advance();
            let inner = parse_expr(stream)?;
            stream.expect(Token::RParen, "in parenthesized expression")?;
            Ok(inner)
        }
        Some(Token::Ident(name)) => {
            stream.advance();
            parse_name(stream, name, span)
        }
        Some(Token::Str(_)) => Err(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            span,
            "string literals are only allowed as a parameter key",
        )),
        _ => Err(stream.unexpected("in expression")),
    }
}

/// Everything that can follow an identifier: a call, a namespaced function or
/// constant, a keyed lookup, or nothing.
fn parse_name(
    stream: &mut TokenStream,
    name: &str,
    span: Range<usize>,
) -> Result<Expr, ParseError> {
    if stream.check(&Token::Dot) {
        if !NAMESPACES.contains(&name) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSyntax,
                span,
                format!("attribute access on `{name}` is not supported"),
            ));
        }
        stream.advance();
        let member_span = stream.current_span();
        let member = match stream.advance() {
            Some(Token::Ident(member)) => member,
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidSyntax,
                    member_span,
                    format!("expected a member name after `{name}.`"),
                ))
            }
        };
        if stream.check(&Token::LParen) {
            return parse_call(stream, member, member_span);
        }
        return namespace_constant(member)
            .map(Expr::Number)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidSyntax,
                    member_span,
                    format!("`{name}.{member}` is not an available constant"),
                )
            });
    }

    if stream.check(&Token::LParen) {
        return parse_call(stream, name, span);
    }

    if stream.eat(&Token::LBracket) {
        let key_span = stream.current_span();
        let key = match stream.advance() {
            Some(Token::Str(key)) => key.clone(),
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidSyntax,
                    key_span,
                    format!("`{name}[...]` requires a quoted key"),
                ))
            }
        };
        stream.expect(Token::RBracket, "after key")?;
        return Ok(Expr::Keyed {
            name: name.to_string(),
            key,
        });
    }

    Ok(Expr::Name(name.to_string()))
}

fn parse_call(
    stream: &mut TokenStream,
    name: &str,
    span: Range<usize>,
) -> Result<Expr, ParseError> {
    let function = Function::lookup(name).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::UnknownFunction,
            span.clone(),
            format!("`{name}` is not an allowed function"),
        )
    })?;

    stream.expect(Token::LParen, "in call")?;
    let mut args = Vec::new();
    if !stream.eat(&Token::RParen) {
        loop {
            args.push(parse_expr(stream)?);
            if stream.eat(&Token::Comma) {
                // trailing comma
                if stream.eat(&Token::RParen) {
                    break;
                }
                continue;
            }
            stream.expect(Token::RParen, "in argument list")?;
            break;
        }
    }

    if !function.arity().accepts(args.len()) {
        return Err(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            span,
            format!(
                "`{}` does not accept {} argument(s)",
                function.name(),
                args.len()
            ),
        ));
    }
    Ok(Expr::Call { function, args })
}
