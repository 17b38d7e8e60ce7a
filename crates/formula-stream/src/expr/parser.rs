use crate::error::{StreamError, StreamResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Identifier(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Concat,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    String(String),
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Ampersand,
    Bang,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    AndAnd,
    OrOr,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let peeked = chars.next();
        Self {
            input,
            chars,
            peeked,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peeked.take();
        self.peeked = self.chars.next();
        current
    }

    fn peek(&self) -> Option<char> {
        self.peeked
    }

    fn consume_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buf.push(ch);
            self.bump();
        }
        buf
    }

    /// Consumes `ch` and returns `double` if the next character is `second`, else `single`.
    fn one_or_two(&mut self, second: char, double: Token, single: Token) -> Token {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            double
        } else {
            single
        }
    }

    fn next_token(&mut self) -> StreamResult<Token> {
        self.consume_while(char::is_whitespace);
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        let simple = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '^' => Some(Token::Caret),
            _ => None,
        };
        if let Some(token) = simple {
            self.bump();
            return Ok(token);
        }

        match ch {
            '=' => Ok(self.one_or_two('=', Token::Equals, Token::Equals)),
            '!' => Ok(self.one_or_two('=', Token::NotEquals, Token::Bang)),
            '&' => Ok(self.one_or_two('&', Token::AndAnd, Token::Ampersand)),
            '>' => Ok(self.one_or_two('=', Token::GreaterEquals, Token::Greater)),
            '<' => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        Ok(Token::LessEquals)
                    }
                    Some('>') => {
                        self.bump();
                        Ok(Token::NotEquals)
                    }
                    _ => Ok(Token::Less),
                }
            }
            '|' => {
                self.bump();
                if self.peek() == Some('|') {
                    self.bump();
                    Ok(Token::OrOr)
                } else {
                    Err(StreamError::Parse(format!(
                        "unexpected character '|' in {:?}",
                        self.input
                    )))
                }
            }
            '"' => {
                self.bump();
                let mut out = String::new();
                loop {
                    match self.bump() {
                        None => return Err(StreamError::Parse("unterminated string".into())),
                        Some('"') => {
                            if self.peek() == Some('"') {
                                self.bump();
                                out.push('"');
                                continue;
                            }
                            break;
                        }
                        Some(c) => out.push(c),
                    }
                }
                Ok(Token::String(out))
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num_str = self.consume_while(|c| c.is_ascii_digit() || c == '.');
                if matches!(self.peek(), Some('e' | 'E')) {
                    if let Some(exp) = self.bump() {
                        num_str.push(exp);
                    }
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        self.bump();
                        num_str.push(sign);
                    }
                    let exp_digits = self.consume_while(|c| c.is_ascii_digit());
                    if exp_digits.is_empty() {
                        return Err(StreamError::Parse(format!(
                            "invalid number {num_str:?} (expected exponent digits)"
                        )));
                    }
                    num_str.push_str(&exp_digits);
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| StreamError::Parse(format!("invalid number {num_str:?}")))?;
                Ok(Token::Number(num))
            }
            c if is_ident_start(c) => Ok(Token::Identifier(self.consume_while(is_ident_part))),
            other => Err(StreamError::Parse(format!(
                "unexpected character {other:?} in {:?}",
                self.input
            ))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Deepest expression tree the parser accepts. Evaluation recurses over the tree, so this also
/// bounds the evaluator's stack use.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> StreamResult<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Self {
            lexer,
            lookahead,
            nesting: 0,
        })
    }

    fn bump(&mut self) -> StreamResult<Token> {
        let current = std::mem::replace(&mut self.lookahead, Token::Eof);
        self.lookahead = self.lexer.next_token()?;
        Ok(current)
    }

    fn expect(&mut self, token: Token) -> StreamResult<()> {
        if self.lookahead == token {
            self.bump()?;
            Ok(())
        } else {
            Err(StreamError::Parse(format!(
                "expected {token:?}, found {:?}",
                self.lookahead
            )))
        }
    }

    fn parse(&mut self) -> StreamResult<Expr> {
        let (expr, _) = self.parse_expr(0)?;
        if self.lookahead != Token::Eof {
            return Err(StreamError::Parse(format!(
                "unexpected token {:?}",
                self.lookahead
            )));
        }
        Ok(expr)
    }

    /// Parses an expression and returns it with the height of its tree.
    fn parse_expr(&mut self, min_prec: u8) -> StreamResult<(Expr, usize)> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(too_deep());
        }
        let result = self.parse_binary(min_prec);
        self.nesting -= 1;
        result
    }

    fn parse_binary(&mut self, min_prec: u8) -> StreamResult<(Expr, usize)> {
        let (mut left, mut height) = self.parse_prefix()?;
        while let Some((op, prec, right_assoc)) = self.infix_binding_power() {
            if prec < min_prec {
                break;
            }
            self.bump()?;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let (right, right_height) = self.parse_expr(next_min)?;
            height = height.max(right_height) + 1;
            if height > MAX_DEPTH {
                return Err(too_deep());
            }
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok((left, height))
    }

    fn parse_prefix(&mut self) -> StreamResult<(Expr, usize)> {
        match &self.lookahead {
            Token::Minus => {
                self.bump()?;
                // Binds looser than `^` so that `-2^2` is `-(2^2)`.
                let (expr, height) = self.parse_expr(7)?;
                let expr = Expr::UnaryOp {
                    op: UnaryOp::Negate,
                    expr: Box::new(expr),
                };
                Ok((expr, height + 1))
            }
            Token::Plus => {
                self.bump()?;
                self.parse_expr(7)
            }
            Token::Bang => {
                self.bump()?;
                let (expr, height) = self.parse_expr(7)?;
                let expr = Expr::UnaryOp {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                };
                Ok((expr, height + 1))
            }
            Token::Number(n) => {
                let n = *n;
                self.bump()?;
                Ok((Expr::Number(n), 1))
            }
            Token::String(s) => {
                let s = s.clone();
                self.bump()?;
                Ok((Expr::Text(s), 1))
            }
            Token::Identifier(_) => self.parse_ident_like(),
            Token::LParen => {
                self.bump()?;
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(StreamError::Parse(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }

    fn parse_ident_like(&mut self) -> StreamResult<(Expr, usize)> {
        let ident = match self.bump()? {
            Token::Identifier(ident) => ident,
            other => {
                debug_assert!(false, "parse_ident_like called with lookahead={other:?}");
                return Err(StreamError::Parse("expected identifier".into()));
            }
        };

        if self.lookahead != Token::LParen {
            if ident.eq_ignore_ascii_case("true") {
                return Ok((Expr::Boolean(true), 1));
            }
            if ident.eq_ignore_ascii_case("false") {
                return Ok((Expr::Boolean(false), 1));
            }
            return Ok((Expr::Identifier(ident), 1));
        }

        self.bump()?;
        let mut args = Vec::new();
        let mut height = 0;
        if self.lookahead != Token::RParen {
            loop {
                let (arg, arg_height) = self.parse_expr(0)?;
                args.push(arg);
                height = height.max(arg_height);
                if self.lookahead == Token::Comma {
                    self.bump()?;
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok((Expr::Call { name: ident, args }, height + 1))
    }

    /// Returns the operator, its precedence and whether it is right-associative.
    fn infix_binding_power(&self) -> Option<(BinaryOp, u8, bool)> {
        // Higher binds tighter:  ^  >  * / %  >  + -  >  &  >  comparisons  >  &&  >  ||
        match self.lookahead {
            Token::OrOr => Some((BinaryOp::Or, 1, false)),
            Token::AndAnd => Some((BinaryOp::And, 2, false)),
            Token::Equals => Some((BinaryOp::Equals, 3, false)),
            Token::NotEquals => Some((BinaryOp::NotEquals, 3, false)),
            Token::Less => Some((BinaryOp::Less, 3, false)),
            Token::LessEquals => Some((BinaryOp::LessEquals, 3, false)),
            Token::Greater => Some((BinaryOp::Greater, 3, false)),
            Token::GreaterEquals => Some((BinaryOp::GreaterEquals, 3, false)),
            Token::Ampersand => Some((BinaryOp::Concat, 4, false)),
            Token::Plus => Some((BinaryOp::Add, 5, false)),
            Token::Minus => Some((BinaryOp::Subtract, 5, false)),
            Token::Star => Some((BinaryOp::Multiply, 6, false)),
            Token::Slash => Some((BinaryOp::Divide, 6, false)),
            Token::Percent => Some((BinaryOp::Modulo, 6, false)),
            Token::Caret => Some((BinaryOp::Power, 8, true)),
            _ => None,
        }
    }
}

pub fn parse(input: &str) -> StreamResult<Expr> {
    Parser::new(input)?.parse()
}

fn too_deep() -> StreamError {
    StreamError::Parse(format!("expression nests deeper than {MAX_DEPTH} levels"))
}
