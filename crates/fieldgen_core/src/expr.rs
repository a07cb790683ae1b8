use crate::error::EngineError;
use nalgebra::DMatrix;
use std::f64::consts::{E, PI};

/// OpCodes for the stack-based expression VM.
///
/// The VM operates on a stack of values: `f64` in checked scalar mode,
/// whole `DMatrix<f64>` lattices in broadcast grid mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the current binding of the free variable `x`.
    LoadX,
    /// Pushes the current binding of the free variable `y`.
    LoadY,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ** b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
}

/// A compiled sequence of operations for one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based virtual machine for evaluating compiled expressions.
///
/// The VM is stateless; both execution modes take all necessary context.
/// Scalar execution checks each operation and reports singularities as
/// typed errors. Grid execution is elementwise over whole lattices and
/// never errors: division by zero and domain exits become IEEE inf/NaN,
/// which the field renderer tolerates per lattice point.
pub struct VM;

impl VM {
    /// Executes the bytecode with scalar bindings for `x` and `y`.
    ///
    /// `stack` is a reusable scratch buffer; it is cleared on entry.
    pub fn execute_scalar(
        bytecode: &Bytecode,
        x: f64,
        y: f64,
        stack: &mut Vec<f64>,
    ) -> Result<f64, EngineError> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(*val),
                OpCode::LoadX => stack.push(x),
                OpCode::LoadY => stack.push(y),
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    if b == 0.0 {
                        return Err(EngineError::DivisionByZero);
                    }
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    if a == 0.0 && b < 0.0 {
                        return Err(EngineError::DivisionByZero);
                    }
                    if a < 0.0 && b.fract() != 0.0 {
                        return Err(EngineError::DomainError(format!(
                            "fractional power {b} of negative base {a}"
                        )));
                    }
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = stack.pop().unwrap();
                    stack.push(a.cos());
                }
                OpCode::Tan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.tan());
                }
                OpCode::Arcsin => {
                    let a = stack.pop().unwrap();
                    if a.abs() > 1.0 {
                        return Err(EngineError::DomainError(format!(
                            "arcsin argument {a} outside [-1, 1]"
                        )));
                    }
                    stack.push(a.asin());
                }
                OpCode::Arccos => {
                    let a = stack.pop().unwrap();
                    if a.abs() > 1.0 {
                        return Err(EngineError::DomainError(format!(
                            "arccos argument {a} outside [-1, 1]"
                        )));
                    }
                    stack.push(a.acos());
                }
                OpCode::Arctan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.atan());
                }
            }
        }

        // The compiler only emits balanced bytecode, so exactly one value remains.
        Ok(stack.pop().unwrap_or(0.0))
    }

    /// Executes the bytecode elementwise over lattice bindings for `x` and `y`.
    ///
    /// `x` and `y` must have identical shape. No numeric checking is done;
    /// singular lattice points come back as inf/NaN sentinels.
    pub fn execute_grid(bytecode: &Bytecode, x: &DMatrix<f64>, y: &DMatrix<f64>) -> DMatrix<f64> {
        let (nrows, ncols) = x.shape();
        let mut stack: Vec<DMatrix<f64>> = Vec::new();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(DMatrix::from_element(nrows, ncols, *val)),
                OpCode::LoadX => stack.push(x.clone()),
                OpCode::LoadY => stack.push(y.clone()),
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.zip_map(&b, |p, q| p * q));
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.zip_map(&b, |p, q| p / q));
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.zip_map(&b, f64::powf));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::sin));
                }
                OpCode::Cos => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::cos));
                }
                OpCode::Tan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::tan));
                }
                OpCode::Arcsin => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::asin));
                }
                OpCode::Arccos => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::acos));
                }
                OpCode::Arctan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.map(f64::atan));
                }
            }
        }

        stack
            .pop()
            .unwrap_or_else(|| DMatrix::from_element(nrows, ncols, 0.0))
    }
}

// --- AST & Compiler ---

/// Binary operators of the restricted grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Abstract syntax tree for the restricted expression grammar.
#[derive(Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// Numeric negation, the only unary operator.
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an AST into bytecode, resolving names against the fixed
/// vocabulary: variables `x`/`y`, constants `e`/`pi` (folded to literals),
/// and the six whitelisted unary functions. Anything else is an
/// `UndefinedSymbol`.
pub fn compile(expr: &Expr) -> Result<Bytecode, EngineError> {
    let mut ops = Vec::new();
    compile_recursive(expr, &mut ops)?;
    Ok(Bytecode { ops })
}

/// Parses and compiles a textual expression in one step.
pub fn compile_expression(text: &str) -> Result<Bytecode, EngineError> {
    compile(&parse(text)?)
}

fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EngineError> {
    match expr {
        Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
        Expr::Variable(name) => match name.as_str() {
            "x" => ops.push(OpCode::LoadX),
            "y" => ops.push(OpCode::LoadY),
            "e" => ops.push(OpCode::LoadConst(E)),
            "pi" => ops.push(OpCode::LoadConst(PI)),
            _ => return Err(EngineError::UndefinedSymbol(name.clone())),
        },
        Expr::Binary(left, op, right) => {
            compile_recursive(left, ops)?;
            compile_recursive(right, ops)?;
            ops.push(match op {
                BinOp::Add => OpCode::Add,
                BinOp::Sub => OpCode::Sub,
                BinOp::Mul => OpCode::Mul,
                BinOp::Div => OpCode::Div,
                BinOp::Pow => OpCode::Pow,
            });
        }
        Expr::Neg(operand) => {
            compile_recursive(operand, ops)?;
            ops.push(OpCode::Neg);
        }
        Expr::Call(func, arg) => {
            compile_recursive(arg, ops)?;
            ops.push(match func.as_str() {
                "sin" => OpCode::Sin,
                "cos" => OpCode::Cos,
                "tan" => OpCode::Tan,
                "arcsin" => OpCode::Arcsin,
                "arccos" => OpCode::Arccos,
                "arctan" => OpCode::Arctan,
                _ => return Err(EngineError::UndefinedSymbol(func.clone())),
            });
        }
    }
    Ok(())
}

// --- Parser ---

/// Parses a textual expression into an AST.
///
/// The grammar is the closed vocabulary of the engine: numeric literals
/// (with optional fraction and exponent), identifiers, `+ - * / **`,
/// parentheses, and unary minus. `**` is right-associative and binds
/// tighter than unary minus on its left, so `-x**2` is `-(x**2)` and
/// `2**-1` is `0.5`.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EngineError::InvalidArgument("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(EngineError::InvalidArgument(format!(
            "unexpected trailing input in expression `{input}`"
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Optional exponent: `e`/`E` followed by an optionally signed digit.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| {
                EngineError::InvalidArgument(format!("malformed numeric literal `{literal}`"))
            })?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Identifier(chars[start..i].iter().collect()));
        } else {
            match c {
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '*' => {
                    if chars.get(i + 1) == Some(&'*') {
                        tokens.push(Token::StarStar);
                        i += 1;
                    } else {
                        tokens.push(Token::Star);
                    }
                }
                '/' => tokens.push(Token::Slash),
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                _ => {
                    return Err(EngineError::InvalidArgument(format!(
                        "unexpected character `{c}` in expression"
                    )))
                }
            }
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, EngineError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, EngineError> {
        let left = self.parse_primary()?;

        if let Some(Token::StarStar) = self.peek() {
            self.consume();
            // The right operand may itself be unary; recursing through
            // parse_unary also makes `**` right-associative.
            let right = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(left), BinOp::Pow, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => Ok(Expr::Call(name, Box::new(arg))),
                        _ => Err(EngineError::InvalidArgument(format!(
                            "expected `)` after argument of `{name}`"
                        ))),
                    }
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(EngineError::InvalidArgument(
                        "expected `)` to close parenthesized expression".to_string(),
                    )),
                }
            }
            other => Err(EngineError::InvalidArgument(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}
