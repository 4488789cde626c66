//! Label selector evaluation.
//!
//! Supports Kubernetes `LabelSelector`, plain map selectors (Service, Istio workload selectors)
//! and the Calico selector expression language.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub type Labels = BTreeMap<String, String>;

/// Every pair of `selector` is present in `labels`. An empty selector matches everything.
pub fn map_matches(selector: &Labels, labels: &Labels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// `inner` is a subset of `outer`: every pod selected by `outer` is also selected by `inner`.
pub fn is_subset(inner: &Labels, outer: &Labels) -> bool {
    map_matches(inner, outer)
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: Labels,
    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        map_matches(&self.match_labels, labels)
            && self.match_expressions.iter().all(|req| req.matches(labels))
    }
}

impl LabelSelectorRequirement {
    fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator.as_str() {
            "In" => value.is_some_and(|v| self.values.contains(v)),
            "NotIn" => value.is_none_or(|v| !self.values.contains(v)),
            "Exists" => value.is_some(),
            "DoesNotExist" => value.is_none(),
            // An unknown operator selects nothing, mirroring the API server's rejection.
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid selector at offset {offset}: {message}")]
pub struct SelectorParseError {
    pub offset: usize,
    pub message: String,
}

/// Parsed Calico selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalicoSelector {
    All,
    Has(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Not(Box<CalicoSelector>),
    And(Box<CalicoSelector>, Box<CalicoSelector>),
    Or(Box<CalicoSelector>, Box<CalicoSelector>),
}

impl CalicoSelector {
    /// Parse a selector. An empty string is equivalent to `all()`.
    pub fn parse(input: &str) -> Result<CalicoSelector, SelectorParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(CalicoSelector::All);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some((offset, token)) => Err(SelectorParseError {
                offset: *offset,
                message: format!("unexpected token {:?}", token),
            }),
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            CalicoSelector::All => true,
            CalicoSelector::Has(k) => labels.contains_key(k),
            CalicoSelector::Equals(k, v) => labels.get(k) == Some(v),
            CalicoSelector::NotEquals(k, v) => labels.get(k) != Some(v),
            CalicoSelector::In(k, set) => labels.get(k).is_some_and(|v| set.contains(v)),
            CalicoSelector::NotIn(k, set) => labels.get(k).is_none_or(|v| !set.contains(v)),
            CalicoSelector::Not(inner) => !inner.matches(labels),
            CalicoSelector::And(a, b) => a.matches(labels) && b.matches(labels),
            CalicoSelector::Or(a, b) => a.matches(labels) || b.matches(labels),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, CalicoSelector::All)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    Ne,
    And,
    Or,
    Bang,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SelectorParseError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((offset, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((offset, Token::RParen));
                i += 1;
            }
            '{' => {
                tokens.push((offset, Token::LBrace));
                i += 1;
            }
            '}' => {
                tokens.push((offset, Token::RBrace));
                i += 1;
            }
            ',' => {
                tokens.push((offset, Token::Comma));
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push((offset, Token::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((offset, Token::Ne));
                i += 2;
            }
            '!' => {
                tokens.push((offset, Token::Bang));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((offset, Token::And));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((offset, Token::Or));
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].1 != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(SelectorParseError {
                        offset,
                        message: "unterminated string".to_string(),
                    });
                }
                let value: String = chars[start..end].iter().map(|(_, c)| *c).collect();
                tokens.push((offset, Token::Str(value)));
                i = end + 1;
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i].1) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                tokens.push((offset, Token::Ident(ident)));
            }
            other => {
                return Err(SelectorParseError {
                    offset,
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or_else(|| {
            self.tokens.last().map(|(o, _)| *o + 1).unwrap_or(0)
        })
    }

    fn error(&self, message: impl Into<String>) -> SelectorParseError {
        SelectorParseError { offset: self.offset(), message: message.into() }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SelectorParseError> {
        match self.next() {
            Some((_, token)) if token == expected => Ok(()),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected {:?}", expected)))
            }
        }
    }

    fn parse_or(&mut self) -> Result<CalicoSelector, SelectorParseError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some((_, Token::Or))) {
            self.next();
            let right = self.parse_and()?;
            left = CalicoSelector::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<CalicoSelector, SelectorParseError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some((_, Token::And))) {
            self.next();
            let right = self.parse_unary()?;
            left = CalicoSelector::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CalicoSelector, SelectorParseError> {
        if matches!(self.peek(), Some((_, Token::Bang))) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(CalicoSelector::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CalicoSelector, SelectorParseError> {
        match self.next() {
            Some((_, Token::LParen)) => {
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some((_, Token::Ident(ident))) => match ident.as_str() {
                "all" if matches!(self.peek(), Some((_, Token::LParen))) => {
                    self.expect(Token::LParen)?;
                    self.expect(Token::RParen)?;
                    Ok(CalicoSelector::All)
                }
                "has" if matches!(self.peek(), Some((_, Token::LParen))) => {
                    self.expect(Token::LParen)?;
                    let key = self.parse_ident()?;
                    self.expect(Token::RParen)?;
                    Ok(CalicoSelector::Has(key))
                }
                _ => self.parse_comparison(ident),
            },
            Some((offset, token)) => Err(SelectorParseError {
                offset,
                message: format!("unexpected token {:?}", token),
            }),
            None => Err(self.error("unexpected end of selector")),
        }
    }

    fn parse_comparison(&mut self, key: String) -> Result<CalicoSelector, SelectorParseError> {
        match self.next() {
            Some((_, Token::Eq)) => Ok(CalicoSelector::Equals(key, self.parse_string()?)),
            Some((_, Token::Ne)) => Ok(CalicoSelector::NotEquals(key, self.parse_string()?)),
            Some((_, Token::Ident(word))) if word == "in" => {
                Ok(CalicoSelector::In(key, self.parse_set()?))
            }
            Some((_, Token::Ident(word))) if word == "not" => match self.next() {
                Some((_, Token::Ident(word))) if word == "in" => {
                    Ok(CalicoSelector::NotIn(key, self.parse_set()?))
                }
                _ => Err(self.error("expected 'in' after 'not'")),
            },
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected operator after '{}'", key)))
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorParseError> {
        match self.next() {
            Some((_, Token::Ident(ident))) => Ok(ident),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected label key"))
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, SelectorParseError> {
        match self.next() {
            Some((_, Token::Str(value))) => Ok(value),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected quoted value"))
            }
        }
    }

    fn parse_set(&mut self) -> Result<BTreeSet<String>, SelectorParseError> {
        self.expect(Token::LBrace)?;
        let mut values = BTreeSet::new();
        if matches!(self.peek(), Some((_, Token::RBrace))) {
            self.next();
            return Ok(values);
        }
        loop {
            values.insert(self.parse_string()?);
            match self.next() {
                Some((_, Token::Comma)) => continue,
                Some((_, Token::RBrace)) => return Ok(values),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected ',' or '}'"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_map_selector_subset() {
        let service = labels(&[("app", "reviews")]);
        let deny = labels(&[("app", "reviews"), ("version", "v1")]);
        assert!(is_subset(&service, &deny));
        assert!(!is_subset(&deny, &service));
        assert!(map_matches(&Labels::new(), &service));
    }

    #[test]
    fn test_label_selector_expressions() {
        let selector = LabelSelector {
            match_labels: labels(&[("app", "web")]),
            match_expressions: vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: vec!["frontend".to_string(), "edge".to_string()],
                },
                LabelSelectorRequirement {
                    key: "canary".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: vec![],
                },
            ],
        };

        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "edge")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("tier", "backend")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("tier", "edge"), ("canary", "yes")])));
        assert!(LabelSelector::default().matches(&Labels::new()));
    }

    #[test]
    fn test_calico_selector_parse_and_match() {
        let selector = CalicoSelector::parse("app == 'web' && has(tier) && env not in {'dev', 'test'}")
            .expect("selector should parse");

        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "fe"), ("env", "prod")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("tier", "fe"), ("env", "dev")])));
        assert!(!selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_calico_selector_or_not_and_parens() {
        let selector =
            CalicoSelector::parse("!(app == \"db\") || role in {'admin'}").expect("should parse");
        assert!(selector.matches(&labels(&[("app", "web")])));
        assert!(!selector.matches(&labels(&[("app", "db")])));
        assert!(selector.matches(&labels(&[("app", "db"), ("role", "admin")])));
    }

    #[test]
    fn test_calico_selector_all_and_empty() {
        assert!(CalicoSelector::parse("all()").unwrap().is_all());
        assert!(CalicoSelector::parse("   ").unwrap().is_all());
        assert!(CalicoSelector::parse("projectcalico.org/name == 'kube-system'").is_ok());
    }

    #[test]
    fn test_calico_selector_errors() {
        assert!(CalicoSelector::parse("app = 'web'").is_err());
        assert!(CalicoSelector::parse("app == web").is_err());
        assert!(CalicoSelector::parse("app == 'web").is_err());
        assert!(CalicoSelector::parse("has(app").is_err());
        assert!(CalicoSelector::parse("app == 'a' &&").is_err());
    }
}
