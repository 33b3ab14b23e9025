//! Selection expressions over tree branches.
//!
//! The grammar covers what ntuple cut strings use in practice: arithmetic
//! (`+ - * / %`), comparisons, `&& || !`, parentheses, and a handful of
//! functions (`abs sqrt log exp pow min max`, their `TMath::` spellings and
//! `fabs`). Identifiers are branch names and may contain dots.
//!
//! A value is "true" when it is nonzero. An empty expression is the
//! constant `1`.

use crate::error::{Result, RootError};

#[derive(Debug, Clone)]
enum Node {
    Number(f64),
    Var(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "abs" | "fabs" | "TMath::Abs" => Func::Abs,
            "sqrt" | "TMath::Sqrt" => Func::Sqrt,
            "log" | "TMath::Log" => Func::Log,
            "exp" | "TMath::Exp" => Func::Exp,
            "pow" | "TMath::Power" => Func::Pow,
            "min" | "TMath::Min" => Func::Min,
            "max" | "TMath::Max" => Func::Max,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

/// A compiled expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: Node,
    /// Branch names referenced by this expression, in order of first use.
    pub required_branches: Vec<String>,
}

impl CompiledExpr {
    /// Parse an expression. Whitespace-only input compiles to the constant `1`.
    pub fn compile(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self { root: Node::Number(1.0), required_branches: Vec::new() });
        }
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens: &tokens, pos: 0, branches: Vec::new() };
        let root = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(RootError::Expression(format!(
                "unexpected {tok:?} after expression in '{input}'"
            )));
        }
        Ok(Self { root, required_branches: parser.branches })
    }

    /// Evaluate for one row. `values` follows the order of `required_branches`.
    pub fn eval_row(&self, values: &[f64]) -> f64 {
        eval(&self.root, values)
    }

    /// Evaluate every row of `n_rows`, column-wise.
    ///
    /// `columns` follows the order of `required_branches`; each column holds
    /// at least `n_rows` values.
    pub fn eval_bulk(&self, columns: &[&[f64]], n_rows: usize) -> Vec<f64> {
        let mut row = vec![0.0; columns.len()];
        (0..n_rows)
            .map(|i| {
                for (slot, col) in row.iter_mut().zip(columns) {
                    *slot = col[i];
                }
                eval(&self.root, &row)
            })
            .collect()
    }

    /// Rows for which the expression is nonzero.
    pub fn eval_mask(&self, columns: &[&[f64]], n_rows: usize) -> Vec<bool> {
        self.eval_bulk(columns, n_rows).into_iter().map(|v| v != 0.0).collect()
    }
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn eval(node: &Node, vals: &[f64]) -> f64 {
    match node {
        Node::Number(n) => *n,
        Node::Var(i) => vals[*i],
        Node::Neg(a) => -eval(a, vals),
        Node::Not(a) => truth(eval(a, vals) == 0.0),
        Node::Binary(op, a, b) => {
            let (l, r) = (eval(a, vals), eval(b, vals));
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
                Op::Mod => {
                    // integer remainder, as C++ `%` on the truncated operands
                    let (li, ri) = (l as i64, r as i64);
                    if ri == 0 { 0.0 } else { (li % ri) as f64 }
                }
                Op::Eq => truth(l == r),
                Op::Ne => truth(l != r),
                Op::Lt => truth(l < r),
                Op::Le => truth(l <= r),
                Op::Gt => truth(l > r),
                Op::Ge => truth(l >= r),
                Op::And => truth(l != 0.0 && r != 0.0),
                Op::Or => truth(l != 0.0 || r != 0.0),
            }
        }
        Node::Call(f, args) => {
            let x = eval(&args[0], vals);
            match f {
                Func::Abs => x.abs(),
                Func::Sqrt => x.sqrt(),
                Func::Log => x.ln(),
                Func::Exp => x.exp(),
                Func::Pow => x.powf(eval(&args[1], vals)),
                Func::Min => x.min(eval(&args[1], vals)),
                Func::Max => x.max(eval(&args[1], vals)),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(Op),
    Not,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = match (c, next) {
            ('&', Some('&')) => Some(Token::Op(Op::And)),
            ('|', Some('|')) => Some(Token::Op(Op::Or)),
            ('=', Some('=')) => Some(Token::Op(Op::Eq)),
            ('!', Some('=')) => Some(Token::Op(Op::Ne)),
            ('<', Some('=')) => Some(Token::Op(Op::Le)),
            ('>', Some('=')) => Some(Token::Op(Op::Ge)),
            _ => None,
        };
        if let Some(tok) = two {
            tokens.push(tok);
            i += 2;
            continue;
        }

        let one = match c {
            '+' => Some(Token::Op(Op::Add)),
            '-' => Some(Token::Op(Op::Sub)),
            '*' => Some(Token::Op(Op::Mul)),
            '/' => Some(Token::Op(Op::Div)),
            '%' => Some(Token::Op(Op::Mod)),
            '<' => Some(Token::Op(Op::Lt)),
            '>' => Some(Token::Op(Op::Gt)),
            '!' => Some(Token::Not),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = one {
            tokens.push(tok);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() {
                let ch = chars[i];
                let exponent_sign = (ch == '+' || ch == '-')
                    && i > start
                    && matches!(chars[i - 1], 'e' | 'E');
                if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| RootError::Expression(format!("invalid number '{text}'")))?;
            tokens.push(Token::Num(n));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() {
                let ch = chars[i];
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                    i += 1;
                } else if ch == ':' && chars.get(i + 1) == Some(&':') {
                    i += 2;
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        return Err(RootError::Expression(format!("unexpected character '{c}' in '{input}'")));
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    branches: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token) -> Result<()> {
        match self.next() {
            Some(t) if &t == want => Ok(()),
            got => Err(RootError::Expression(format!("expected {want:?}, got {got:?}"))),
        }
    }

    fn var(&mut self, name: String) -> Node {
        let idx = match self.branches.iter().position(|b| *b == name) {
            Some(i) => i,
            None => {
                self.branches.push(name);
                self.branches.len() - 1
            }
        };
        Node::Var(idx)
    }

    /// Parse one left-associative precedence level.
    fn binary_level(
        &mut self,
        ops: &[Op],
        next: fn(&mut Self) -> Result<Node>,
    ) -> Result<Node> {
        let mut lhs = next(self)?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Node> {
        self.binary_level(&[Op::Or], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Node> {
        self.binary_level(&[Op::And], Self::parse_cmp)
    }

    fn parse_cmp(&mut self) -> Result<Node> {
        self.binary_level(&[Op::Eq, Op::Ne, Op::Lt, Op::Le, Op::Gt, Op::Ge], Self::parse_add)
    }

    fn parse_add(&mut self) -> Result<Node> {
        self.binary_level(&[Op::Add, Op::Sub], Self::parse_mul)
    }

    fn parse_mul(&mut self) -> Result<Node> {
        self.binary_level(&[Op::Mul, Op::Div, Op::Mod], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.parse_unary()
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Node::Number(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) if matches!(self.peek(), Some(Token::LParen)) => {
                self.pos += 1;
                let func = Func::lookup(&name)
                    .ok_or_else(|| RootError::Expression(format!("unknown function '{name}'")))?;
                let mut args = vec![self.parse_or()?];
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.pos += 1;
                    args.push(self.parse_or()?);
                }
                self.expect(&Token::RParen)?;
                if args.len() != func.arity() {
                    return Err(RootError::Expression(format!(
                        "{name} takes {} argument(s), got {}",
                        func.arity(),
                        args.len()
                    )));
                }
                Ok(Node::Call(func, args))
            }
            Some(Token::Ident(name)) => Ok(self.var(name)),
            other => Err(RootError::Expression(format!(
                "expected number, identifier or '(', got {other:?}"
            ))),
        }
    }
}
