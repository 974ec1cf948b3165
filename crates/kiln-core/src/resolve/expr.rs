//! Label expressions as written in job configurations and queue reasons.
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! expr  := and ( "||" and )*
//! and   := unary ( "&&" unary )*
//! unary := "!" unary | "(" expr ")" | label
//! label := bare-word | "\"" quoted "\""
//! ```

use std::fmt;

use kiln_model::{Catalog, NodeType};

use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelExpr {
    Label(String),
    Not(Box<LabelExpr>),
    And(Vec<LabelExpr>),
    Or(Vec<LabelExpr>),
}

impl LabelExpr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            Some(tok) => Err(ExprError::Unexpected(tok.to_string())),
            None => Ok(expr),
        }
    }

    /// Evaluate against the label set of a node type.
    pub fn matches(&self, node: &NodeType) -> bool {
        match self {
            LabelExpr::Label(label) => node.has_label(label),
            LabelExpr::Not(inner) => !inner.matches(node),
            LabelExpr::And(terms) => terms.iter().all(|t| t.matches(node)),
            LabelExpr::Or(terms) => terms.iter().any(|t| t.matches(node)),
        }
    }

    /// Node types satisfying the expression, in catalog order.
    pub fn matching<'a>(&'a self, catalog: &'a Catalog) -> impl Iterator<Item = &'a NodeType> {
        catalog.iter().filter(move |n| self.matches(n))
    }
}

/// First catalog key whose labels satisfy `expr`; unparseable expressions match nothing.
pub fn match_expression<'a>(expr: &str, catalog: &'a Catalog) -> Option<&'a str> {
    let parsed = LabelExpr::parse(expr).ok()?;
    catalog
        .iter()
        .find(|n| parsed.matches(n))
        .map(|n| n.name.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Label(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Label(l) => write!(f, "{l}"),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
        }
    }
}

fn is_label_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '&' | '|' | '!' | '(' | ')' | '"')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&c).is_none() {
                    return Err(ExprError::SingleOperator(c));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '"' => {
                chars.next();
                let mut label = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => label.push(ch),
                        None => return Err(ExprError::UnterminatedQuote),
                    }
                }
                tokens.push(Token::Label(label));
            }
            _ => {
                let mut label = String::new();
                while let Some(ch) = chars.next_if(|ch| is_label_char(*ch)) {
                    label.push(ch);
                }
                tokens.push(Token::Label(label));
            }
        }
    }
    Ok(tokens)
}

/// Deepest nesting of `!` and parentheses accepted.
pub const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<LabelExpr, ExprError> {
        let mut terms = vec![self.and()?];
        while self.eat(&Token::Or) {
            terms.push(self.and()?);
        }
        Ok(collapse(terms, LabelExpr::Or))
    }

    fn and(&mut self) -> Result<LabelExpr, ExprError> {
        let mut terms = vec![self.unary()?];
        while self.eat(&Token::And) {
            terms.push(self.unary()?);
        }
        Ok(collapse(terms, LabelExpr::And))
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn unary(&mut self) -> Result<LabelExpr, ExprError> {
        match self.bump() {
            Some(Token::Not) => {
                let inner = self.nested(Self::unary)?;
                Ok(LabelExpr::Not(Box::new(inner)))
            }
            Some(Token::Label(label)) => Ok(LabelExpr::Label(label)),
            Some(Token::Open) => {
                let inner = self.nested(Self::or)?;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    Some(tok) => Err(ExprError::Unexpected(tok.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(tok) => Err(ExprError::Unexpected(tok.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn collapse(mut terms: Vec<LabelExpr>, wrap: fn(Vec<LabelExpr>) -> LabelExpr) -> LabelExpr {
    if terms.len() == 1 {
        terms.swap_remove(0)
    } else {
        wrap(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(l: &str) -> LabelExpr {
        LabelExpr::Label(l.to_string())
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            NodeType::new("centos").with_labels(["x86_64", "centos", "centos6"]),
            NodeType::new("xenial").with_labels(["x86_64", "xenial", "huge"]),
            NodeType::new("arm").with_labels(["arm64", "xenial"]),
        ])
    }

    #[test]
    fn rejects_runaway_nesting() {
        let deep = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(LabelExpr::parse(&deep), Err(ExprError::TooDeep(MAX_DEPTH)));
        let negated = format!("{}a", "!".repeat(MAX_DEPTH + 1));
        assert_eq!(LabelExpr::parse(&negated), Err(ExprError::TooDeep(MAX_DEPTH)));

        let ok = format!("{}a{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(LabelExpr::parse(&ok).unwrap(), label("a"));
    }

    #[test]
    fn parses_bare_label() {
        assert_eq!(LabelExpr::parse("x86_64").unwrap(), label("x86_64"));
    }

    #[test]
    fn parses_conjunction_with_and_without_spaces() {
        let expected = LabelExpr::And(vec![label("amd64"), label("debian")]);
        assert_eq!(LabelExpr::parse("amd64&&debian").unwrap(), expected);
        assert_eq!(LabelExpr::parse(" amd64 && debian ").unwrap(), expected);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = LabelExpr::parse("a && b || c").unwrap();
        assert_eq!(
            parsed,
            LabelExpr::Or(vec![LabelExpr::And(vec![label("a"), label("b")]), label("c")])
        );
    }

    #[test]
    fn parentheses_negation_and_quotes() {
        let parsed = LabelExpr::parse("!\"my label\" && (a || b)").unwrap();
        assert_eq!(
            parsed,
            LabelExpr::And(vec![
                LabelExpr::Not(Box::new(label("my label"))),
                LabelExpr::Or(vec![label("a"), label("b")]),
            ])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(LabelExpr::parse("   "), Err(ExprError::Empty));
        assert_eq!(LabelExpr::parse("a & b"), Err(ExprError::SingleOperator('&')));
        assert_eq!(LabelExpr::parse("a &&"), Err(ExprError::UnexpectedEnd));
        assert_eq!(LabelExpr::parse("(a && b"), Err(ExprError::UnexpectedEnd));
        assert_eq!(LabelExpr::parse("a b"), Err(ExprError::Unexpected("b".into())));
        assert_eq!(LabelExpr::parse("\"open"), Err(ExprError::UnterminatedQuote));
    }

    #[test]
    fn conjunction_needs_every_label() {
        let catalog = catalog();
        assert_eq!(match_expression("x86_64&&centos", &catalog), Some("centos"));
        assert_eq!(match_expression("x86_64&&centos&&centos6", &catalog), Some("centos"));
        assert_eq!(match_expression("x86_64&&rhel", &catalog), None);
    }

    #[test]
    fn ties_resolve_in_catalog_order() {
        let catalog = catalog();
        assert_eq!(match_expression("xenial", &catalog), Some("xenial"));
        let all: Vec<_> = LabelExpr::parse("xenial")
            .unwrap()
            .matching(&catalog)
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(all, vec!["xenial", "arm"]);
    }

    #[test]
    fn disjunction_and_negation() {
        let catalog = catalog();
        assert_eq!(match_expression("xenial && !x86_64", &catalog), Some("arm"));
        assert_eq!(match_expression("(rhel || centos6) && x86_64", &catalog), Some("centos"));
        assert_eq!(match_expression("a &", &catalog), None);
    }
}
