//! Expression parser.
//!
//! Recursive descent over the token stream, lowest precedence first:
//! assignment, pipe, ternary, `||`, `&&`, equality, relational, additive,
//! multiplicative, unary, postfix (member access, `++`/`--`), primary.
//!
//! Filter arguments parse at the logical-or level so the `:` separator
//! never collides with the ternary `:`.
//!
//! The grammar is deliberately closed: no call syntax, no access to
//! anything beyond the supplied scope. Object and array literals exist
//! because `state` initial expressions need them.

use serde_json::Value;

use super::lexer::{Token, tokenize};

// =============================================================================
// AST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// An assignable target: a scope name plus member segments
/// (`user.address[0].city` → root `user`, segments `address`, `0`, `city`).
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub root: String,
    pub segments: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    /// Member access; the key expression is a string literal for dot access.
    Member(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logic(LogicOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(PathExpr, Box<Expr>),
    IncDec {
        path: PathExpr,
        increment: bool,
        prefix: bool,
    },
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Pipe(Box<Expr>, Vec<FilterCall>),
}

/// Parse expression text into an AST. The result is cached per unique text
/// by the engine; parse errors are cached too, so malformed bindings are
/// diagnosed once and evaluate to `Null` thereafter.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.assignment()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("unexpected token `{}`", parser.tokens[parser.pos]));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => Err(format!("expected `{token}`, found `{found}`")),
                None => Err(format!("expected `{token}`, found end of input")),
            }
        }
    }

    fn assignment(&mut self) -> Result<Expr, String> {
        let left = self.pipe()?;
        if self.eat(&Token::Assign) {
            let path = as_path(&left).ok_or("left side of `=` must be a name or path")?;
            let value = self.assignment()?;
            return Ok(Expr::Assign(path, Box::new(value)));
        }
        Ok(left)
    }

    fn pipe(&mut self) -> Result<Expr, String> {
        let mut expr = self.ternary()?;
        let mut filters = Vec::new();
        while self.eat(&Token::Pipe) {
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                _ => return Err("expected filter name after `|`".to_string()),
            };
            let mut args = Vec::new();
            while self.eat(&Token::Colon) {
                args.push(self.logical_or()?);
            }
            filters.push(FilterCall { name, args });
        }
        if !filters.is_empty() {
            expr = Expr::Pipe(Box::new(expr), filters);
        }
        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, String> {
        let cond = self.logical_or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(&Token::Colon)?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> Result<Expr, String> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.logical_and()?;
            left = Expr::Logic(LogicOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, String> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Logic(LogicOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, String> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, String> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                let operand = self.unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                let operand = self.unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Some(Token::PlusPlus | Token::MinusMinus) => {
                let increment = self.peek() == Some(&Token::PlusPlus);
                self.pos += 1;
                let operand = self.postfix_chain()?;
                let path = as_path(&operand)
                    .ok_or("`++`/`--` requires a name or path operand")?;
                Ok(Expr::IncDec {
                    path,
                    increment,
                    prefix: true,
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let expr = self.postfix_chain()?;
        match self.peek() {
            Some(Token::PlusPlus | Token::MinusMinus) => {
                let increment = self.peek() == Some(&Token::PlusPlus);
                let path = as_path(&expr)
                    .ok_or("`++`/`--` requires a name or path operand")?;
                self.pos += 1;
                Ok(Expr::IncDec {
                    path,
                    increment,
                    prefix: false,
                })
            }
            _ => Ok(expr),
        }
    }

    fn postfix_chain(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let key = match self.advance() {
                    Some(Token::Ident(name)) => Expr::Literal(Value::String(name)),
                    Some(Token::Number(n)) => Expr::Literal(Value::from(n as u64)),
                    _ => return Err("expected member name after `.`".to_string()),
                };
                expr = Expr::Member(Box::new(expr), Box::new(key));
            } else if self.eat(&Token::LBracket) {
                let key = self.assignment()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Member(Box::new(expr), Box::new(key));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ => Ok(Expr::Ident(name)),
            },
            Some(Token::LParen) => {
                let expr = self.assignment()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBrace) => self.object_literal(),
            Some(Token::LBracket) => self.array_literal(),
            Some(found) => Err(format!("unexpected token `{found}`")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn object_literal(&mut self) -> Result<Expr, String> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(Token::Str(s)) => s,
                _ => return Err("expected object key".to_string()),
            };
            self.expect(&Token::Colon)?;
            let value = self.ternary()?;
            entries.push((key, value));
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RBrace)?;
            return Ok(Expr::Object(entries));
        }
    }

    fn array_literal(&mut self) -> Result<Expr, String> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Array(items));
        }
        loop {
            items.push(self.ternary()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RBracket)?;
            return Ok(Expr::Array(items));
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Convert an ident/member chain into an assignable path.
fn as_path(expr: &Expr) -> Option<PathExpr> {
    match expr {
        Expr::Ident(name) => Some(PathExpr {
            root: name.clone(),
            segments: Vec::new(),
        }),
        Expr::Member(base, key) => {
            let mut path = as_path(base)?;
            path.segments.push((**key).clone());
            Some(path)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arithmetic_precedence() {
        let expr = parse("a + b * 2").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Add, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_member_chain_as_assignment_target() {
        let expr = parse("user.name = 'ada'").unwrap();
        match expr {
            Expr::Assign(path, _) => {
                assert_eq!(path.root, "user");
                assert_eq!(path.segments.len(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_postfix_increment() {
        let expr = parse("count++").unwrap();
        assert!(matches!(
            expr,
            Expr::IncDec {
                increment: true,
                prefix: false,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_filter_pipe_with_args() {
        let expr = parse("price | currency:'USD':2").unwrap();
        match expr {
            Expr::Pipe(_, filters) => {
                assert_eq!(filters.len(), 1);
                assert_eq!(filters[0].name, "currency");
                assert_eq!(filters[0].args.len(), 2);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_object_literal() {
        let expr = parse("{count: 0, user: {name: 'ada'}}").unwrap();
        match expr {
            Expr::Object(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].0, "count");
                assert_eq!(entries[0].1, Expr::Literal(json!(0)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ternary_inside_pipe() {
        // The pipe is looser than the ternary, so the whole conditional
        // feeds the filter.
        let expr = parse("ok ? 'yes' : 'no' | uppercase").unwrap();
        assert!(matches!(expr, Expr::Pipe(_, _)));
    }

    #[test]
    fn test_parse_rejects_calls_and_trailing_junk() {
        assert!(parse("foo(1)").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("3 = x").is_err());
    }
}
