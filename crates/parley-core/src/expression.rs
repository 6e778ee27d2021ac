//! Restricted arithmetic evaluator.
//!
//! Input is parsed into a small expression tree and folded. Only numeric literals and the
//! binary operators `+ - * / **` evaluate; names, calls, unary operators and the remaining
//! operators parse but are rejected during the fold. Every `^` is stripped before parsing,
//! so `2^3` reads as `23`.
//!
//! Integer results that leave the `i64` range continue as floats. Parser nesting and tree
//! height are bounded, so oversized input is a syntax error rather than unbounded recursion.

use std::fmt;
use thiserror::Error;

/// Deepest allowed nesting of parentheses, unary signs and `**` exponents.
pub const MAX_NESTING: usize = 200;
/// Tallest allowed expression tree (a flat `1+1+...` chain grows one level per operator).
pub const MAX_TREE_HEIGHT: usize = 1000;

/// Numeric result. Integers stay integers until mixed with a float or divided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Renders a float the way a shortest-repr float printer does: always with a decimal
/// point or exponent, scientific below 1e-4 and from 1e16 up.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let abs = x.abs();
    if !(1e-4..1e16).contains(&abs) {
        let sci = format!("{:e}", x);
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            None => sci,
        };
    }
    let plain = format!("{}", x);
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticError {
    DivisionByZero,
    Overflow,
    NonReal,
}

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticError::DivisionByZero => f.write_str("division by zero"),
            ArithmeticError::Overflow => f.write_str("numeric overflow"),
            ArithmeticError::NonReal => f.write_str("result is not a real number"),
        }
    }
}

/// Why a string did not evaluate to a number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Input is not a well-formed expression.
    #[error("syntax error at offset {offset}: {reason}")]
    Syntax { offset: usize, reason: &'static str },
    /// Well-formed, but uses a construct outside the allowed grammar.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("arithmetic error: {0}")]
    Arithmetic(ArithmeticError),
}

impl EvalError {
    fn syntax(offset: usize, reason: &'static str) -> Self {
        EvalError::Syntax { offset, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

type OpFn = fn(Number, Number) -> Result<Number, ArithmeticError>;

/// Operator table. Operators absent here parse but do not evaluate.
fn operator_fn(op: BinaryOp) -> Option<OpFn> {
    match op {
        BinaryOp::Add => Some(add),
        BinaryOp::Sub => Some(sub),
        BinaryOp::Mul => Some(mul),
        BinaryOp::Div => Some(div),
        BinaryOp::Pow => Some(pow),
        BinaryOp::FloorDiv | BinaryOp::Mod => None,
    }
}

fn add(a: Number, b: Number) -> Result<Number, ArithmeticError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => match x.checked_add(y) {
            Some(n) => Ok(Number::Int(n)),
            None => finite(x as f64 + y as f64),
        },
        _ => finite(a.as_f64() + b.as_f64()),
    }
}

fn sub(a: Number, b: Number) -> Result<Number, ArithmeticError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => match x.checked_sub(y) {
            Some(n) => Ok(Number::Int(n)),
            None => finite(x as f64 - y as f64),
        },
        _ => finite(a.as_f64() - b.as_f64()),
    }
}

fn mul(a: Number, b: Number) -> Result<Number, ArithmeticError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => match x.checked_mul(y) {
            Some(n) => Ok(Number::Int(n)),
            None => finite(x as f64 * y as f64),
        },
        _ => finite(a.as_f64() * b.as_f64()),
    }
}

/// Float result; an infinite value is an overflow.
fn finite(x: f64) -> Result<Number, ArithmeticError> {
    if x.is_infinite() {
        Err(ArithmeticError::Overflow)
    } else {
        Ok(Number::Float(x))
    }
}

/// True division: always a float.
fn div(a: Number, b: Number) -> Result<Number, ArithmeticError> {
    let divisor = b.as_f64();
    if divisor == 0.0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    finite(a.as_f64() / divisor)
}

fn pow(a: Number, b: Number) -> Result<Number, ArithmeticError> {
    if let (Number::Int(base), Number::Int(exp)) = (a, b) {
        if let Some(n) = u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)) {
            return Ok(Number::Int(n));
        }
    }
    let (base, exp) = (a.as_f64(), b.as_f64());
    if base == 0.0 && exp < 0.0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    let out = base.powf(exp);
    if out.is_nan() && !base.is_nan() && !exp.is_nan() {
        return Err(ArithmeticError::NonReal);
    }
    if out.is_infinite() && base.is_finite() && exp.is_finite() {
        return Err(ArithmeticError::Overflow);
    }
    Ok(Number::Float(out))
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Number),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: char,
        operand: Box<Expr>,
    },
    Name(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Recursive fold. Anything but literals and tabled binary operators is rejected.
    /// Trees from [`parse`] are at most [`MAX_TREE_HEIGHT`] tall.
    pub fn eval(&self) -> Result<Number, EvalError> {
        match self {
            Expr::Literal(n) => Ok(*n),
            Expr::Binary { op, left, right } => {
                let apply = operator_fn(*op)
                    .ok_or_else(|| EvalError::Unsupported(format!("operator `{}`", op.symbol())))?;
                let l = left.eval()?;
                let r = right.eval()?;
                apply(l, r).map_err(EvalError::Arithmetic)
            }
            Expr::Unary { op, .. } => Err(EvalError::Unsupported(format!("unary `{}`", op))),
            Expr::Name(name) => Err(EvalError::Unsupported(format!("name `{}`", name))),
            Expr::Call { name, .. } => Err(EvalError::Unsupported(format!("call to `{}`", name))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Name(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            text,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn tokens(mut self) -> Result<Vec<(usize, Token)>, EvalError> {
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                b' ' | b'\t' | 0x0c => {
                    self.pos += 1;
                    continue;
                }
                b'0'..=b'9' => out.push((start, Token::Num(self.number()?))),
                b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    out.push((start, Token::Num(self.number()?)))
                }
                b'+' => {
                    self.pos += 1;
                    out.push((start, Token::Op(BinaryOp::Add)));
                }
                b'-' => {
                    self.pos += 1;
                    out.push((start, Token::Op(BinaryOp::Sub)));
                }
                b'*' => {
                    if self.peek_at(1) == Some(b'*') {
                        self.pos += 2;
                        out.push((start, Token::Op(BinaryOp::Pow)));
                    } else {
                        self.pos += 1;
                        out.push((start, Token::Op(BinaryOp::Mul)));
                    }
                }
                b'/' => {
                    if self.peek_at(1) == Some(b'/') {
                        self.pos += 2;
                        out.push((start, Token::Op(BinaryOp::FloorDiv)));
                    } else {
                        self.pos += 1;
                        out.push((start, Token::Op(BinaryOp::Div)));
                    }
                }
                b'%' => {
                    self.pos += 1;
                    out.push((start, Token::Op(BinaryOp::Mod)));
                }
                b'(' => {
                    self.pos += 1;
                    out.push((start, Token::LParen));
                }
                b')' => {
                    self.pos += 1;
                    out.push((start, Token::RParen));
                }
                b',' => {
                    self.pos += 1;
                    out.push((start, Token::Comma));
                }
                _ => {
                    let ch = self.text[start..].chars().next().unwrap_or('\0');
                    if ch == '_' || ch.is_alphabetic() {
                        out.push((start, Token::Name(self.name())));
                    } else {
                        return Err(EvalError::syntax(start, "unexpected character"));
                    }
                }
            }
        }
        Ok(out)
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        let len: usize = self.text[start..]
            .chars()
            .take_while(|c| *c == '_' || c.is_alphanumeric())
            .map(char::len_utf8)
            .sum();
        self.pos += len;
        self.text[start..self.pos].to_string()
    }

    /// Digits with single underscores allowed between them. Returns the digits without underscores.
    fn digits(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c as char);
                self.pos += 1;
            } else if c == b'_' && !out.is_empty() && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Result<Number, EvalError> {
        let start = self.pos;
        let int_part = self.digits();
        let mut frac_part = None;
        let mut exp_part = None;

        if self.peek() == Some(b'.') {
            self.pos += 1;
            frac_part = Some(self.digits());
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            let mut sign = "";
            if let Some(s @ (b'+' | b'-')) = self.peek() {
                sign = if s == b'-' { "-" } else { "+" };
                self.pos += 1;
            }
            let digits = self.digits();
            if digits.is_empty() {
                self.pos = mark;
                return Err(EvalError::syntax(mark, "malformed exponent"));
            }
            exp_part = Some(format!("{}{}", sign, digits));
        }
        if let Some(c) = self.text[self.pos..].chars().next() {
            if c == '_' || c.is_alphanumeric() {
                return Err(EvalError::syntax(self.pos, "invalid numeric literal"));
            }
        }

        if frac_part.is_none() && exp_part.is_none() {
            if int_part.len() > 1 && int_part.starts_with('0') && int_part.bytes().any(|b| b != b'0') {
                return Err(EvalError::syntax(start, "leading zeros in integer literal"));
            }
            if let Ok(n) = int_part.parse::<i64>() {
                return Ok(Number::Int(n));
            }
            return int_part
                .parse::<f64>()
                .map_err(|_| EvalError::syntax(start, "invalid integer literal"))
                .and_then(|x| finite(x).map_err(EvalError::Arithmetic));
        }

        let normalized = format!(
            "{}.{}e{}",
            if int_part.is_empty() { "0" } else { &int_part },
            frac_part.filter(|f| !f.is_empty()).unwrap_or_else(|| "0".to_string()),
            exp_part.unwrap_or_else(|| "0".to_string())
        );
        normalized
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| EvalError::syntax(start, "invalid float literal"))
    }
}

/// Subtree with its height (a literal is 1).
struct Node {
    expr: Expr,
    height: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }
}

/// Precedence-climbing parser over the token stream.
struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token, reason: &'static str) -> Result<(), EvalError> {
        if self.peek() == Some(&want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(EvalError::syntax(self.offset(), reason))
        }
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, EvalError>) -> Result<T, EvalError> {
        if self.nesting >= MAX_NESTING {
            return Err(EvalError::syntax(self.offset(), "expression nested too deeply"));
        }
        self.nesting += 1;
        let out = f(self);
        self.nesting -= 1;
        out
    }

    fn binary(&self, op: BinaryOp, left: Node, right: Node, offset: usize) -> Result<Node, EvalError> {
        let height = 1 + left.height.max(right.height);
        if height > MAX_TREE_HEIGHT {
            return Err(EvalError::syntax(offset, "expression too long"));
        }
        Ok(Node {
            expr: Expr::Binary {
                op,
                left: Box::new(left.expr),
                right: Box::new(right.expr),
            },
            height,
        })
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Node, EvalError> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            let offset = self.offset();
            self.pos += 1;
            let right = self.term()?;
            left = self.binary(op, left, right, offset)?;
        }
        Ok(left)
    }

    // term := factor (('*' | '/' | '//' | '%') factor)*
    fn term(&mut self) -> Result<Node, EvalError> {
        let mut left = self.factor()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod))) =
            self.peek().cloned()
        {
            let offset = self.offset();
            self.pos += 1;
            let right = self.factor()?;
            left = self.binary(op, left, right, offset)?;
        }
        Ok(left)
    }

    // factor := ('+' | '-') factor | power
    fn factor(&mut self) -> Result<Node, EvalError> {
        match self.peek() {
            Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) => {
                let op = if *op == BinaryOp::Add { '+' } else { '-' };
                self.pos += 1;
                let operand = self.nested(Self::factor)?;
                Ok(Node {
                    expr: Expr::Unary {
                        op,
                        operand: Box::new(operand.expr),
                    },
                    height: operand.height + 1,
                })
            }
            _ => self.power(),
        }
    }

    // power := atom ['**' factor]   (right-associative, binds tighter than unary on the left)
    fn power(&mut self) -> Result<Node, EvalError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Op(BinaryOp::Pow)) {
            let offset = self.offset();
            self.pos += 1;
            let exponent = self.nested(Self::factor)?;
            return self.binary(BinaryOp::Pow, base, exponent, offset);
        }
        Ok(base)
    }

    // atom := NUMBER | NAME ['(' args ')'] | '(' expr ')'
    fn atom(&mut self) -> Result<Node, EvalError> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::Num(n)) => Ok(Node::leaf(Expr::Literal(n))),
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Node::leaf(Expr::Name(name)));
                }
                self.pos += 1;
                let args = self.nested(Self::call_args)?;
                self.expect(Token::RParen, "unclosed call")?;
                let height = 1 + args.iter().map(|a| a.height).max().unwrap_or(0);
                Ok(Node {
                    expr: Expr::Call {
                        name,
                        args: args.into_iter().map(|a| a.expr).collect(),
                    },
                    height,
                })
            }
            Some(Token::LParen) => {
                let inner = self.nested(Self::expr)?;
                self.expect(Token::RParen, "unclosed parenthesis")?;
                Ok(inner)
            }
            Some(_) => Err(EvalError::syntax(offset, "unexpected token")),
            None => Err(EvalError::syntax(offset, "unexpected end of input")),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Node>, EvalError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                if self.peek() == Some(&Token::RParen) {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(args)
    }
}

/// Parses `text` (after stripping `^`) into an expression tree.
pub fn parse(text: &str) -> Result<Expr, EvalError> {
    let cleaned = text.replace('^', "");
    let source = cleaned.trim();
    let tokens = Lexer::new(source).tokens()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        nesting: 0,
    };
    let node = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(EvalError::syntax(parser.offset(), "trailing input"));
    }
    Ok(node.expr)
}

/// Parses and evaluates `text`.
pub fn evaluate(text: &str) -> Result<Number, EvalError> {
    parse(text)?.eval()
}

/// `Some(number)` when `text` is an allowed arithmetic expression, `None` otherwise.
pub fn evaluate_opt(text: &str) -> Option<Number> {
    evaluate(text).ok()
}
