use super::{BinaryOp, Expr, ExpressionError, UnaryOp};

/// Maximum accepted expression length in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 4096;
/// Maximum nesting of parentheses and unary operators.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(value) => value.to_string(),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Plus => "+".into(),
            TokenKind::Minus => "-".into(),
            TokenKind::Star => "*".into(),
            TokenKind::Slash => "/".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::Lt => "<".into(),
            TokenKind::Gt => ">".into(),
            TokenKind::Le => "<=".into(),
            TokenKind::Ge => ">=".into(),
            TokenKind::EqEq => "==".into(),
            TokenKind::NotEq => "!=".into(),
            TokenKind::AndAnd => "&&".into(),
            TokenKind::OrOr => "||".into(),
            TokenKind::Bang => "!".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        let position = index;

        if byte.is_ascii_whitespace() {
            index += 1;
            continue;
        }

        if byte.is_ascii_digit() || byte == b'.' {
            let start = index;
            while index < bytes.len() && (bytes[index].is_ascii_digit() || bytes[index] == b'.') {
                index += 1;
            }
            let raw = &input[start..index];
            let value = raw
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber {
                    raw: raw.to_string(),
                    position,
                })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position,
            });
            continue;
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            let start = index;
            while index < bytes.len() && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_')
            {
                index += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(input[start..index].to_string()),
                position,
            });
            continue;
        }

        let next = bytes.get(index + 1).copied();
        let (kind, width) = match (byte, next) {
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            _ => {
                let ch = input[index..].chars().next().unwrap_or('\u{fffd}');
                return Err(ExpressionError::UnexpectedChar { ch, position });
            }
        };
        tokens.push(Token { kind, position });
        index += width;
    }

    Ok(tokens)
}

/// Parse an expression over the fixed arithmetic/boolean grammar.
///
/// Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* /`, unary `- !`.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    if input.len() > MAX_EXPRESSION_BYTES {
        return Err(ExpressionError::TooLong {
            max_bytes: MAX_EXPRESSION_BYTES,
            actual_bytes: input.len(),
        });
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
        end: input.len(),
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ExpressionError::UnexpectedToken {
            expected: "end of expression",
            found: token.kind.describe(),
            position: token.position,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|token| &token.kind) == Some(kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self, position: usize) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExpressionError::NestingTooDeep {
                max_depth: MAX_NESTING,
                position,
            });
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_comparison()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Minus,
                position,
            }) => Some((UnaryOp::Neg, *position)),
            Some(Token {
                kind: TokenKind::Bang,
                position,
            }) => Some((UnaryOp::Not, *position)),
            _ => None,
        };

        match op {
            Some((op, position)) => {
                self.cursor += 1;
                self.enter(position)?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let end = self.end;
        let Some(token) = self.advance() else {
            return Err(ExpressionError::UnexpectedEnd { position: end });
        };

        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => Ok(Expr::Variable {
                name,
                position: token.position,
            }),
            TokenKind::LParen => {
                self.enter(token.position)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if !self.eat(&TokenKind::RParen) {
                    return Err(match self.peek() {
                        Some(next) => ExpressionError::UnexpectedToken {
                            expected: "`)`",
                            found: next.kind.describe(),
                            position: next.position,
                        },
                        None => ExpressionError::UnexpectedEnd { position: end },
                    });
                }
                Ok(inner)
            }
            other => Err(ExpressionError::UnexpectedToken {
                expected: "number, variable, or `(`",
                found: other.describe(),
                position: token.position,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_operator_precedence() {
        let expr = parse("1 + 2 * 3").expect("parses");
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                Expr::binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0)),
            )
        );
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        let expr = parse("a > 1 && b <= 2 || !c").expect("parses");
        match expr {
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                ..
            } => assert!(matches!(
                *left,
                Expr::Binary {
                    op: BinaryOp::And,
                    ..
                }
            )),
            other => panic!("expected top-level or, got {other:?}"),
        }
    }

    #[test]
    fn rejects_characters_outside_grammar() {
        match parse("baseScore * 1000; drop()") {
            Err(ExpressionError::UnexpectedChar { ch: ';', position }) => assert_eq!(position, 16),
            other => panic!("expected unexpected char, got {other:?}"),
        }
        assert!(matches!(
            parse("a = 1"),
            Err(ExpressionError::UnexpectedChar { ch: '=', .. })
        ));
        assert!(matches!(
            parse("'1' + 2"),
            Err(ExpressionError::UnexpectedChar { ch: '\'', .. })
        ));
    }

    #[test]
    fn rejects_malformed_structure() {
        assert!(matches!(parse("   "), Err(ExpressionError::Empty)));
        assert!(matches!(
            parse("(1 + 2"),
            Err(ExpressionError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse("1 2"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("1..2"),
            Err(ExpressionError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse("* 3"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn limits_nesting_and_length() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(
            parse(&deep),
            Err(ExpressionError::NestingTooDeep { .. })
        ));

        let long = "1+".repeat(MAX_EXPRESSION_BYTES);
        assert!(matches!(parse(&long), Err(ExpressionError::TooLong { .. })));
    }
}
