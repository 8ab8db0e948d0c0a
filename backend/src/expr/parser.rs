//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, loosest first:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := additive (cmp_op additive | ["not"] "in" list)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | primary
//! primary    := number | string | true | false | field | call | "(" or_expr ")"
//! call       := ("abs" | "round" | "min" | "max") "(" args ")"
//! list       := ("[" | "(") [or_expr ("," or_expr)*] ("]" | ")")
//! ```

use super::lexer::{tokenize, Spanned, Token};
use super::Value;
use crate::error::{EvalError, EvalResult};

/// Deepest nesting accepted, counting parentheses, prefix operators and
/// chained binary operators.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Functions callable from an expression. Nothing else is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Round,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "round" => Some(Function::Round),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    fn accepts(&self, arity: usize) -> bool {
        match self {
            Function::Abs => arity == 1,
            Function::Round => arity == 1 || arity == 2,
            Function::Min | Function::Max => arity >= 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Field(String),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Membership {
        negated: bool,
        needle: Box<Node>,
        list: Vec<Node>,
    },
    Call {
        function: Function,
        args: Vec<Node>,
    },
}

impl Node {
    /// Push every referenced field name, in order of appearance.
    pub fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Node::Literal(_) => {}
            Node::Field(name) => {
                if !out.iter().any(|f| f == name) {
                    out.push(name.clone());
                }
            }
            Node::Unary { operand, .. } => operand.collect_fields(out),
            Node::Binary { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Node::Membership { needle, list, .. } => {
                needle.collect_fields(out);
                for item in list {
                    item.collect_fields(out);
                }
            }
            Node::Call { args, .. } => {
                for arg in args {
                    arg.collect_fields(out);
                }
            }
        }
    }
}

/// Parse `source` into an AST.
pub fn parse(source: &str) -> EvalResult<Node> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".into()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.chars().count(),
    };
    let node = parser.or_expr()?;

    match parser.peek() {
        None => Ok(node),
        Some(extra) => Err(EvalError::Syntax(format!(
            "unexpected '{}' at position {}",
            extra.token.describe(),
            extra.position
        ))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> EvalResult<()> {
        match self.advance() {
            Some(found) if &found.token == token => Ok(()),
            Some(found) => Err(EvalError::Syntax(format!(
                "expected '{}' but found '{}' at position {}",
                token.describe(),
                found.token.describe(),
                found.position
            ))),
            None => Err(EvalError::Syntax(format!(
                "expected '{}' at end of expression",
                token.describe()
            ))),
        }
    }

    fn check_depth(&self, extra: usize) -> EvalResult<()> {
        if self.depth + extra > MAX_DEPTH {
            return Err(EvalError::TooComplex(MAX_DEPTH));
        }
        Ok(())
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        self.depth += 1;
        let result = self.check_depth(0).and_then(|_| f(self));
        self.depth -= 1;
        result
    }

    /// Left-associative chain of `op`s over `operand`.
    fn binary_chain(
        &mut self,
        operand: fn(&mut Self) -> EvalResult<Node>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> EvalResult<Node> {
        let mut left = operand(self)?;
        let mut chained = 0;

        while let Some(op) = self.peek_token().and_then(op_for) {
            self.pos += 1;
            chained += 1;
            self.check_depth(chained)?;
            let right = operand(self)?;
            left = Node::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn or_expr(&mut self) -> EvalResult<Node> {
        self.binary_chain(Self::and_expr, |t| matches!(t, Token::Or).then_some(BinaryOp::Or))
    }

    fn and_expr(&mut self) -> EvalResult<Node> {
        self.binary_chain(Self::not_expr, |t| matches!(t, Token::And).then_some(BinaryOp::And))
    }

    fn not_expr(&mut self) -> EvalResult<Node> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Node::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EvalResult<Node> {
        let left = self.additive()?;

        let negated = match (self.peek_token(), self.tokens.get(self.pos + 1).map(|s| &s.token)) {
            (Some(Token::In), _) => Some(false),
            (Some(Token::Not), Some(Token::In)) => Some(true),
            _ => None,
        };
        if let Some(negated) = negated {
            self.pos += if negated { 2 } else { 1 };
            let list = self.nested(Self::list)?;
            return Ok(Node::Membership {
                negated,
                needle: Box::new(left),
                list,
            });
        }

        let op = match self.peek_token() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;

        Ok(Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn list(&mut self) -> EvalResult<Vec<Node>> {
        let close = match self.advance() {
            Some(Spanned { token: Token::LBracket, .. }) => Token::RBracket,
            Some(Spanned { token: Token::LParen, .. }) => Token::RParen,
            Some(found) => {
                return Err(EvalError::Syntax(format!(
                    "expected a list after 'in' at position {}",
                    found.position
                )))
            }
            None => return Err(EvalError::Syntax("expected a list after 'in'".into())),
        };
        self.items(close)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn items(&mut self, close: Token) -> EvalResult<Vec<Node>> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.or_expr()?);
            if self.eat(&Token::Comma) {
                if self.eat(&close) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(&close)?;
            return Ok(items);
        }
    }

    fn additive(&mut self) -> EvalResult<Node> {
        self.binary_chain(Self::term, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> EvalResult<Node> {
        self.binary_chain(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn unary(&mut self) -> EvalResult<Node> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::unary)?;
            return Ok(Node::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> EvalResult<Node> {
        let Some(next) = self.advance() else {
            return Err(EvalError::Syntax(format!(
                "unexpected end of expression at position {}",
                self.end
            )));
        };

        match next.token {
            Token::Number(n) => Ok(Node::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Node::Literal(Value::Text(s))),
            Token::True => Ok(Node::Literal(Value::Bool(true))),
            Token::False => Ok(Node::Literal(Value::Bool(false))),
            Token::Field(name) => Ok(Node::Field(name)),
            Token::Ident(name) => {
                if self.peek_token() != Some(&Token::LParen) {
                    return Ok(Node::Field(name));
                }
                let function = Function::from_name(&name).ok_or(EvalError::UnsupportedToken {
                    token: name.clone(),
                    position: next.position,
                })?;
                self.pos += 1;
                let args = self.nested(|p| p.items(Token::RParen))?;
                if !function.accepts(args.len()) {
                    return Err(EvalError::Syntax(format!(
                        "{}() does not take {} argument(s)",
                        function.name(),
                        args.len()
                    )));
                }
                Ok(Node::Call { function, args })
            }
            Token::LParen => {
                let inner = self.nested(Self::or_expr)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(EvalError::Syntax(format!(
                "unexpected '{}' at position {}",
                other.describe(),
                next.position
            ))),
        }
    }
}
