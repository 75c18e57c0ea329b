//! Recursive-descent parser for set and map notation.
//!
//! Grammar:
//! ```text
//! set     := [params '->'] '{' tuple [':' formula] '}'
//! map     := [params '->'] '{' tuple '->' image '}'
//! params  := '[' [ident (',' ident)*] ']'
//! tuple   := [ident] '[' [ident (',' ident)*] ']'
//! image   := [ident] '[' [expr (',' expr)*] ']'
//! formula := conj ('or' conj)*
//! conj    := chain ('and' chain)*
//! chain   := expr (cmp expr)+            cmp: < <= > >= =
//! expr    := term (('+' | '-') term)*
//! term    := unary ('*' unary)*
//! unary   := '-' unary | integer | ident | '(' expr ')'
//! ```
//!
//! Every expression must be affine in the tuple dimensions and the
//! parameters; anything else is reported as [`ParseErrorKind::NonAffine`]
//! or [`ParseErrorKind::UnknownIdentifier`].

use crate::frontend::lexer::tokenize;
use crate::frontend::token::{Token, TokenKind};
use crate::polyhedral::{AffineExpr, AffineMap, Constraint, IntegerSet, Space, UnionSet};
use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::location::Span;

/// A tuple header such as `S0[i, j]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tuple {
    name: Option<String>,
    dims: Vec<String>,
}

/// Parser state over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    known_params: Vec<String>,
    params: Vec<String>,
    dims: Vec<String>,
}

impl Parser {
    /// Create a parser. `params` are the model's parameters; when empty, the
    /// parameters are taken from the notation's own `[..] ->` header.
    pub fn new(source: &str, params: &[String]) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            known_params: params.to_vec(),
            params: params.to_vec(),
            dims: Vec::new(),
        })
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let found = self.peek().clone();
        let kind_of_error = if found.is_eof() { ParseErrorKind::UnexpectedEof } else { ParseErrorKind::ExpectedToken };
        Err(ParseError {
            message: format!("Expected {}", kind.describe()),
            span: found.span,
            kind: kind_of_error,
            expected: vec![kind.describe().to_string()],
            found: Some(found.to_string()),
        })
    }

    fn expect_identifier(&mut self) -> Result<Token, ParseError> {
        if self.check(TokenKind::Identifier) {
            return Ok(self.advance());
        }
        let found = self.peek().clone();
        Err(ParseError {
            message: "Expected identifier".to_string(),
            span: found.span,
            kind: ParseErrorKind::ExpectedIdentifier,
            expected: vec!["identifier".to_string()],
            found: Some(found.to_string()),
        })
    }

    /// Parse an optional `[N, M] ->` parameter header.
    fn parse_param_header(&mut self) -> Result<(), ParseError> {
        if !(self.check(TokenKind::LeftBracket)) {
            return Ok(());
        }
        self.advance();
        let mut header = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                let ident = self.expect_identifier()?;
                if !self.known_params.is_empty() && !self.known_params.contains(&ident.lexeme) {
                    return Err(ParseError::new(
                        ParseErrorKind::UnknownIdentifier,
                        format!("Unknown parameter {}", ident.lexeme),
                        ident.span,
                    ));
                }
                header.push(ident.lexeme);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket)?;
        self.expect(TokenKind::Arrow)?;
        if self.known_params.is_empty() {
            self.params = header;
        }
        Ok(())
    }

    fn parse_tuple(&mut self) -> Result<Tuple, ParseError> {
        let name = if self.check(TokenKind::Identifier) { Some(self.advance().lexeme) } else { None };
        self.expect(TokenKind::LeftBracket)?;
        let mut dims: Vec<String> = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                let ident = self.expect_identifier()?;
                if dims.contains(&ident.lexeme) || self.params.contains(&ident.lexeme) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        format!("Duplicate name {}", ident.lexeme),
                        ident.span,
                    ));
                }
                dims.push(ident.lexeme);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket)?;
        Ok(Tuple { name, dims })
    }

    fn space_for(&self, tuple: &Tuple) -> Space {
        let mut space = Space::set_with_params(tuple.dims.len(), self.params.len())
            .with_dim_names(tuple.dims.clone())
            .with_param_names(self.params.clone());
        space.tuple_name = tuple.name.clone();
        space
    }

    /// Parse a complete set.
    pub fn parse_set(&mut self) -> Result<UnionSet, ParseError> {
        self.parse_param_header()?;
        self.expect(TokenKind::LeftBrace)?;
        let tuple = self.parse_tuple()?;
        self.dims = tuple.dims.clone();
        let space = self.space_for(&tuple);

        let disjuncts = if self.consume(TokenKind::Colon) {
            self.parse_formula()?
        } else {
            vec![Vec::new()]
        };
        self.expect(TokenKind::RightBrace)?;
        self.expect(TokenKind::Eof)?;

        let pieces = disjuncts
            .into_iter()
            .map(|constraints| IntegerSet::from_constraints(space.clone(), constraints))
            .collect();
        Ok(UnionSet::from_pieces(space, pieces))
    }

    /// Parse a complete map whose image is a list of affine expressions.
    pub fn parse_map(&mut self) -> Result<AffineMap, ParseError> {
        self.parse_param_header()?;
        self.expect(TokenKind::LeftBrace)?;
        let domain = self.parse_tuple()?;
        self.dims = domain.dims.clone();
        self.expect(TokenKind::Arrow)?;

        let range_name = if self.check(TokenKind::Identifier) { Some(self.advance().lexeme) } else { None };
        self.expect(TokenKind::LeftBracket)?;
        let mut outputs = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                let (expr, _) = self.parse_expr()?;
                outputs.push(expr);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket)?;
        if self.check(TokenKind::Colon) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSyntax,
                "Constraints on access relations are not supported",
                self.peek().span,
            ));
        }
        self.expect(TokenKind::RightBrace)?;
        self.expect(TokenKind::Eof)?;

        let mut space = Space::map_with_params(domain.dims.len(), outputs.len(), self.params.len())
            .with_in_names(domain.dims.clone())
            .with_param_names(self.params.clone());
        space.in_tuple_name = domain.name;
        space.tuple_name = range_name;
        Ok(AffineMap::from_outputs(domain.dims.len(), self.params.len(), outputs).with_space(space))
    }

    fn parse_formula(&mut self) -> Result<Vec<Vec<Constraint>>, ParseError> {
        let mut disjuncts = vec![self.parse_conjunction()?];
        while self.consume(TokenKind::Or) {
            disjuncts.push(self.parse_conjunction()?);
        }
        Ok(disjuncts)
    }

    fn parse_conjunction(&mut self) -> Result<Vec<Constraint>, ParseError> {
        let mut constraints = self.parse_chain()?;
        while self.consume(TokenKind::And) {
            constraints.extend(self.parse_chain()?);
        }
        Ok(constraints)
    }

    fn parse_chain(&mut self) -> Result<Vec<Constraint>, ParseError> {
        let (mut lhs, _) = self.parse_expr()?;
        if !self.peek().is_comparison() {
            let found = self.peek().clone();
            return Err(ParseError {
                message: "Expected comparison".to_string(),
                span: found.span,
                kind: ParseErrorKind::ExpectedToken,
                expected: vec!["<".into(), "<=".into(), ">".into(), ">=".into(), "=".into()],
                found: Some(found.to_string()),
            });
        }
        let mut constraints = Vec::new();
        while self.peek().is_comparison() {
            let op = self.advance().kind;
            let (rhs, span) = self.parse_expr()?;
            check_comparable(&lhs, &rhs, span)?;
            constraints.push(match op {
                TokenKind::Less => Constraint::lt(lhs.clone(), rhs.clone()),
                TokenKind::LessEqual => Constraint::le(lhs.clone(), rhs.clone()),
                TokenKind::Greater => Constraint::lt(rhs.clone(), lhs.clone()),
                TokenKind::GreaterEqual => Constraint::ge(lhs.clone(), rhs.clone()),
                _ => Constraint::eq(lhs.clone(), rhs.clone()),
            });
            lhs = rhs;
        }
        Ok(constraints)
    }

    fn parse_expr(&mut self) -> Result<(AffineExpr, Span), ParseError> {
        let (mut expr, mut span) = self.parse_term()?;
        loop {
            let negate = match self.peek_kind() {
                TokenKind::Plus => false,
                TokenKind::Minus => true,
                _ => break,
            };
            self.advance();
            let (rhs, rhs_span) = self.parse_term()?;
            span = span.merge(&rhs_span);
            let combined = if negate { expr.checked_sub(&rhs) } else { expr.checked_add(&rhs) };
            expr = combined.ok_or_else(|| overflow(span))?;
        }
        Ok((expr, span))
    }

    fn parse_term(&mut self) -> Result<(AffineExpr, Span), ParseError> {
        let (mut expr, mut span) = self.parse_unary()?;
        while self.consume(TokenKind::Star) {
            let (rhs, rhs_span) = self.parse_unary()?;
            span = span.merge(&rhs_span);
            let product = match (expr.as_constant(), rhs.as_constant()) {
                (Some(c), _) => rhs.checked_scale(c),
                (_, Some(c)) => expr.checked_scale(c),
                (None, None) => {
                    return Err(ParseError::new(
                        ParseErrorKind::NonAffine,
                        "Product of two non-constant terms",
                        span,
                    ))
                }
            };
            expr = product.ok_or_else(|| overflow(span))?;
        }
        Ok((expr, span))
    }

    fn parse_unary(&mut self) -> Result<(AffineExpr, Span), ParseError> {
        let n_dim = self.dims.len();
        let n_param = self.params.len();
        let token = self.advance();
        match token.kind {
            TokenKind::Minus => {
                let (inner, span) = self.parse_unary()?;
                let span = token.span.merge(&span);
                Ok((inner.checked_scale(-1).ok_or_else(|| overflow(span))?, span))
            }
            TokenKind::Integer => {
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidSyntax, "Invalid integer", token.span)
                })?;
                Ok((AffineExpr::constant(value, n_dim, n_param), token.span))
            }
            TokenKind::Identifier => {
                if let Some(k) = self.dims.iter().position(|d| *d == token.lexeme) {
                    Ok((AffineExpr::var(k, n_dim, n_param), token.span))
                } else if let Some(j) = self.params.iter().position(|p| *p == token.lexeme) {
                    Ok((AffineExpr::param(j, n_dim, n_param), token.span))
                } else if self.peek_kind() == TokenKind::LeftBracket || self.peek_kind() == TokenKind::LeftParen {
                    Err(ParseError::new(
                        ParseErrorKind::NonAffine,
                        format!("Indirect or call term {} is not affine", token.lexeme),
                        token.span,
                    ))
                } else {
                    Err(ParseError::new(
                        ParseErrorKind::UnknownIdentifier,
                        format!("Unknown identifier {}", token.lexeme),
                        token.span,
                    ))
                }
            }
            TokenKind::LeftParen => {
                let (inner, span) = self.parse_expr()?;
                let close = self.expect(TokenKind::RightParen)?;
                Ok((inner, token.span.merge(&span).merge(&close.span)))
            }
            _ => Err(ParseError {
                message: "Expected expression".to_string(),
                span: token.span,
                kind: if token.is_eof() { ParseErrorKind::UnexpectedEof } else { ParseErrorKind::ExpectedExpression },
                expected: vec!["integer".into(), "identifier".into(), "(".into()],
                found: Some(token.to_string()),
            }),
        }
    }
}

fn overflow(span: Span) -> ParseError {
    ParseError::new(ParseErrorKind::Overflow, "Coefficient out of the 64-bit range", span)
}

/// A comparison becomes `rhs - lhs` or `lhs - rhs`, less one when strict.
fn check_comparable(lhs: &AffineExpr, rhs: &AffineExpr, span: Span) -> Result<(), ParseError> {
    let fits = |d: Option<AffineExpr>| d.is_some_and(|d| d.constant.checked_sub(1).is_some());
    if fits(rhs.checked_sub(lhs)) && fits(lhs.checked_sub(rhs)) {
        Ok(())
    } else {
        Err(overflow(span))
    }
}

/// Parse set notation into a union of convex sets.
pub fn parse_set(source: &str, params: &[String]) -> Result<UnionSet, ParseError> {
    Parser::new(source, params)?.parse_set()
}

/// Parse map notation into an affine map.
pub fn parse_map(source: &str, params: &[String]) -> Result<AffineMap, ParseError> {
    Parser::new(source, params)?.parse_map()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_rectangular_domain() {
        let set = parse_set("[N, M] -> { S[i, j] : 0 <= i < N and 0 <= j < M }", &[]).unwrap();
        assert_eq!(set.dim(), 2);
        assert_eq!(set.n_param(), 2);
        assert_eq!(set.pieces().len(), 1);
        assert_eq!(set.space.tuple_name.as_deref(), Some("S"));
        assert!(set.contains(&[0, 0], &[4, 4]));
        assert!(set.contains(&[3, 3], &[4, 4]));
        assert!(!set.contains(&[4, 0], &[4, 4]));
        assert!(!set.contains(&[0, -1], &[4, 4]));
    }

    #[test]
    fn test_parse_uses_model_params() {
        let set = parse_set("{ S[i] : 2*i + 1 <= N }", &names(&["N"])).unwrap();
        assert!(set.contains(&[2], &[5]));
        assert!(!set.contains(&[3], &[5]));
    }

    #[test]
    fn test_parse_union() {
        let set = parse_set("{ S[i] : 0 <= i <= 2 or 5 <= i <= 6 }", &[]).unwrap();
        assert_eq!(set.pieces().len(), 2);
        assert_eq!(set.points(&[], 100).unwrap().len(), 5);
    }

    #[test]
    fn test_parse_universe_set() {
        let set = parse_set("{ S[] }", &[]).unwrap();
        assert_eq!(set.dim(), 0);
        assert!(set.contains(&[], &[]));
    }

    #[test]
    fn test_parse_map() {
        let map = parse_map("[N] -> { S[i, j] -> A[i, j - 1 + N] }", &[]).unwrap();
        assert_eq!(map.n_in(), 2);
        assert_eq!(map.n_out(), 2);
        assert_eq!(map.range_name(), Some("A"));
        assert_eq!(map.apply(&[3, 4], &[10]), vec![3, 13]);
    }

    #[test]
    fn test_non_affine_product() {
        let err = parse_set("{ S[i, j] : i * j <= 10 }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NonAffine);
        assert!(err.is_non_affine());
    }

    #[test]
    fn test_unknown_identifier() {
        let err = parse_set("{ S[i] : i < K }", &names(&["N"])).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownIdentifier);
        let err = parse_set("[K] -> { S[i] : i < K }", &names(&["N"])).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownIdentifier);
    }

    #[test]
    fn test_indirect_subscript_is_non_affine() {
        let err = parse_map("{ S[i] -> A[B[i]] }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NonAffine);
    }

    #[test]
    fn test_coefficient_overflow() {
        let err = parse_set("{ S[i] : 0 <= i < 4611686018427387904 * 4 }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Overflow);
        let err = parse_set("{ S[i] : 9223372036854775807 + i >= 9223372036854775807 + 1 }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Overflow);
        let err = parse_map("{ S[i] -> A[-9223372036854775807 - 2] }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Overflow);
        assert!(!err.is_non_affine());
        assert!(parse_set("{ S[i] : 0 <= i < 4611686018427387904 }", &[]).is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_set("{ S[i] : 0 <= i ", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
        let err = parse_set("{ S[i] : i }", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedToken);
    }
}
