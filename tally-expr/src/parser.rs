use {
    tally_common::Value,
    crate::{
        error::EvalError,
        token::{Spanned, Token, tokenize},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Plus => "+",
            Self::Not => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Deepest nesting an expression may have, counting parentheses and operators.
/// Parsing and evaluation recurse once per level, so this keeps both off the end of the stack.
pub const MAX_DEPTH: usize = 128;

pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let mut parser = Parser::new(tokenize(input)?);
    let node = parser.expr()?;

    match parser.peek() {
        None => Ok(node.expr),
        Some(spanned) => Err(unexpected(spanned)),
    }
}

/// Expression together with the height of its tree.
struct Node {
    expr: Expr,
    height: usize,
}

impl Node {
    fn literal(value: Value) -> Self {
        Self {
            expr: Expr::Literal(value),
            height: 1,
        }
    }

    fn unary(op: UnaryOp, operand: Node, position: usize) -> Result<Self, EvalError> {
        Ok(Self {
            height: checked_height(operand.height + 1, position)?,
            expr: Expr::Unary {
                op,
                operand: Box::new(operand.expr),
            },
        })
    }

    fn binary(op: BinaryOp, left: Node, right: Node, position: usize) -> Result<Self, EvalError> {
        Ok(Self {
            height: checked_height(left.height.max(right.height) + 1, position)?,
            expr: Expr::binary(op, left.expr, right.expr),
        })
    }
}

fn checked_height(height: usize, position: usize) -> Result<usize, EvalError> {
    if height > MAX_DEPTH {
        return Err(EvalError::TooDeep { position });
    }
    Ok(height)
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Spanned, EvalError> {
        let spanned = self.tokens.get(self.position).cloned().ok_or(EvalError::UnexpectedEnd)?;
        self.position += 1;
        Ok(spanned)
    }

    /// Consumes the next token if `f` maps it to an operator. Returns the operator and its position.
    fn take_op<T>(&mut self, f: impl Fn(&Token) -> Option<T>) -> Option<(T, usize)> {
        let spanned = self.peek()?;
        let op = f(&spanned.token)?;
        let position = spanned.position;
        self.position += 1;
        Some((op, position))
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, position: usize, f: impl FnOnce(&mut Self) -> Result<T, EvalError>) -> Result<T, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep { position });
        }

        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Node, EvalError> {
        self.or()
    }

    /// Parses one left-associative precedence level.
    fn left_assoc(
        &mut self,
        operand: fn(&mut Self) -> Result<Node, EvalError>,
        ops: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Node, EvalError> {
        let mut left = operand(self)?;
        while let Some((op, position)) = self.take_op(ops) {
            let right = operand(self)?;
            left = Node::binary(op, left, right, position)?;
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::and, |token| match token {
            Token::OrOr => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn and(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::equality, |token| match token {
            Token::AndAnd => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn equality(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::comparison, |token| match token {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::BangEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::additive, |token| match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::term, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Node, EvalError> {
        self.left_assoc(Self::power, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn power(&mut self) -> Result<Node, EvalError> {
        let base = self.unary()?;
        if let Some(((), position)) = self.take_op(|token| matches!(token, Token::StarStar).then_some(())) {
            // right associative: 2 ** 3 ** 2 == 2 ** 9
            let exponent = self.nested(position, Self::power)?;
            return Node::binary(BinaryOp::Pow, base, exponent, position);
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Node, EvalError> {
        let op = self.take_op(|token| match token {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Plus => Some(UnaryOp::Plus),
            Token::Bang => Some(UnaryOp::Not),
            _ => None,
        });

        match op {
            Some((op, position)) => {
                let operand = self.nested(position, Self::unary)?;
                Node::unary(op, operand, position)
            },
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, EvalError> {
        let spanned = self.next()?;
        let value = match spanned.token {
            Token::Integer(v) => Value::Integer(v),
            Token::Float(v) => Value::Float(v),
            Token::Text(v) => Value::Text(v),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::LParen => {
                let inner = self.nested(spanned.position, Self::expr)?;
                let closing = self.next()?;
                if closing.token != Token::RParen {
                    return Err(unexpected(&closing));
                }
                return Ok(inner);
            }
            _ => return Err(unexpected(&spanned)),
        };
        Ok(Node::literal(value))
    }
}

fn unexpected(spanned: &Spanned) -> EvalError {
    EvalError::UnexpectedToken {
        found: spanned.token.describe(),
        position: spanned.position,
    }
}
