//! Expressões booleanas sobre nomes de critérios.
//!
//! Gramática, da menor para a maior precedência:
//!
//! ```text
//! expr    := and ( ("OR" | "||") and )*
//! and     := unary ( ("AND" | "&&" | ",") unary )*
//! unary   := ("NOT" | "!") unary | "(" expr ")" | NAME
//! NAME    := [A-Za-z0-9_]+
//! ```
//!
//! Palavras-chave não diferenciam maiúsculas. Vírgula é conjunção, então as
//! listas `criterion_1,criterion_2` de execuções anteriores continuam válidas.

use std::collections::HashMap;
use std::fmt;

use crate::error::{BenchError, Result};
use crate::judgment::Outcome;
use crate::rubric::Rubric;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaExpr {
    Criterion(String),
    Not(Box<CriteriaExpr>),
    And(Box<CriteriaExpr>, Box<CriteriaExpr>),
    Or(Box<CriteriaExpr>, Box<CriteriaExpr>),
}

impl CriteriaExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(BenchError::InvalidExpression("expression is empty".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(BenchError::InvalidExpression(format!("unexpected `{tok}`")));
        }
        Ok(expr)
    }

    /// Conjunção de todos os critérios da rubrica.
    pub fn all(rubric: &Rubric) -> Self {
        let mut names = rubric.names().map(|n| CriteriaExpr::Criterion(n.to_string()));
        // Rubrica nunca é vazia.
        let first = names
            .next()
            .unwrap_or_else(|| CriteriaExpr::Criterion(String::new()));
        names.fold(first, |acc, next| CriteriaExpr::And(Box::new(acc), Box::new(next)))
    }

    /// Interpreta `input`, ou usa [`CriteriaExpr::all`] quando ausente, e
    /// confere cada nome contra a rubrica.
    pub fn from_config(input: Option<&str>, rubric: &Rubric) -> Result<Self> {
        let expr = match input.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Self::parse(text)?,
            None => Self::all(rubric),
        };
        expr.validate(rubric)?;
        Ok(expr)
    }

    pub fn validate(&self, rubric: &Rubric) -> Result<()> {
        for name in self.names() {
            rubric.require(name)?;
        }
        Ok(())
    }

    /// Nomes de critérios referenciados, na ordem em que aparecem.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            CriteriaExpr::Criterion(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            CriteriaExpr::Not(inner) => inner.collect_names(out),
            CriteriaExpr::And(a, b) | CriteriaExpr::Or(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
        }
    }

    /// Um critério é verdadeiro só quando o resultado é exatamente `Pass`.
    /// Critérios ausentes e resultados `Error` são falsos.
    pub fn evaluate(&self, outcomes: &HashMap<&str, Outcome>) -> bool {
        match self {
            CriteriaExpr::Criterion(name) => outcomes
                .get(name.as_str())
                .is_some_and(|o| o.is_pass()),
            CriteriaExpr::Not(inner) => !inner.evaluate(outcomes),
            CriteriaExpr::And(a, b) => a.evaluate(outcomes) && b.evaluate(outcomes),
            CriteriaExpr::Or(a, b) => a.evaluate(outcomes) || b.evaluate(outcomes),
        }
    }
}

impl fmt::Display for CriteriaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriteriaExpr::Criterion(name) => write!(f, "{name}"),
            CriteriaExpr::Not(inner) => match inner.as_ref() {
                CriteriaExpr::Criterion(_) | CriteriaExpr::Not(_) => write!(f, "NOT {inner}"),
                _ => write!(f, "NOT ({inner})"),
            },
            CriteriaExpr::And(a, b) => {
                write_operand(f, a, matches!(a.as_ref(), CriteriaExpr::Or(..)))?;
                write!(f, " AND ")?;
                write_operand(f, b, matches!(b.as_ref(), CriteriaExpr::Or(..) | CriteriaExpr::And(..)))
            }
            CriteriaExpr::Or(a, b) => {
                write_operand(f, a, false)?;
                write!(f, " OR ")?;
                write_operand(f, b, matches!(b.as_ref(), CriteriaExpr::Or(..)))
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &CriteriaExpr, parens: bool) -> fmt::Result {
    if parens { write!(f, "({e})") } else { write!(f, "{e}") }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(n) => write!(f, "{n}"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            ',' => {
                tokens.push(Token::And);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(BenchError::InvalidExpression(format!(
                        "expected `{c}{c}` at position {i}"
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Name(word),
                });
            }
            other => {
                return Err(BenchError::InvalidExpression(format!(
                    "unexpected character `{other}` at position {i}"
                )));
            }
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

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<CriteriaExpr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = CriteriaExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<CriteriaExpr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = CriteriaExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CriteriaExpr> {
        match self.next() {
            Some(Token::Not) => Ok(CriteriaExpr::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(BenchError::InvalidExpression("missing `)`".into())),
                }
            }
            Some(Token::Name(name)) => Ok(CriteriaExpr::Criterion(name)),
            Some(tok) => Err(BenchError::InvalidExpression(format!("unexpected `{tok}`"))),
            None => Err(BenchError::InvalidExpression("unexpected end of expression".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::Criterion;

    fn name(n: &str) -> Box<CriteriaExpr> {
        Box::new(CriteriaExpr::Criterion(n.into()))
    }

    fn rubric3() -> Rubric {
        Rubric::new(vec![
            Criterion::new("criterion_1", "a"),
            Criterion::new("criterion_2", "b"),
            Criterion::new("criterion_3", "c"),
        ])
        .unwrap()
    }

    fn outcomes(pairs: &[(&'static str, Outcome)]) -> HashMap<&'static str, Outcome> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn comma_list_is_a_conjunction() {
        let e = CriteriaExpr::parse("criterion_1,criterion_2").unwrap();
        assert_eq!(e, CriteriaExpr::And(name("criterion_1"), name("criterion_2")));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = CriteriaExpr::parse("a OR b and c").unwrap();
        assert_eq!(
            e,
            CriteriaExpr::Or(name("a"), Box::new(CriteriaExpr::And(name("b"), name("c"))))
        );
    }

    #[test]
    fn not_and_parentheses() {
        let e = CriteriaExpr::parse("!(a || b) && c").unwrap();
        assert_eq!(
            e,
            CriteriaExpr::And(
                Box::new(CriteriaExpr::Not(Box::new(CriteriaExpr::Or(name("a"), name("b"))))),
                name("c"),
            )
        );
        assert_eq!(e.to_string(), "NOT (a OR b) AND c");
    }

    #[test]
    fn display_reparses_to_same_tree() {
        for src in ["a AND (b OR c)", "(a OR b) AND NOT c", "a OR b OR c", "NOT NOT a"] {
            let e = CriteriaExpr::parse(src).unwrap();
            assert_eq!(CriteriaExpr::parse(&e.to_string()).unwrap(), e, "{src}");
        }
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for src in ["", "a AND", "(a OR b", "a b", "a & b", "a; b", ")"] {
            assert!(
                matches!(CriteriaExpr::parse(src), Err(BenchError::InvalidExpression(_))),
                "{src:?} should not parse"
            );
        }
    }

    #[test]
    fn error_and_missing_criteria_are_false() {
        let e = CriteriaExpr::parse("criterion_1").unwrap();
        assert!(!e.evaluate(&outcomes(&[("criterion_1", Outcome::Error)])));
        assert!(!e.evaluate(&outcomes(&[])));
        assert!(e.evaluate(&outcomes(&[("criterion_1", Outcome::Pass)])));

        // A negação se aplica ao booleano, então uma avaliação com erro satisfaz NOT.
        let not = CriteriaExpr::parse("NOT criterion_1").unwrap();
        assert!(not.evaluate(&outcomes(&[("criterion_1", Outcome::Error)])));
    }

    #[test]
    fn evaluate_combinations() {
        let e = CriteriaExpr::parse("criterion_1 AND (criterion_2 OR NOT criterion_3)").unwrap();
        let o = outcomes(&[
            ("criterion_1", Outcome::Pass),
            ("criterion_2", Outcome::Fail),
            ("criterion_3", Outcome::Fail),
        ]);
        assert!(e.evaluate(&o));
        let o = outcomes(&[
            ("criterion_1", Outcome::Pass),
            ("criterion_2", Outcome::Fail),
            ("criterion_3", Outcome::Pass),
        ]);
        assert!(!e.evaluate(&o));
    }

    #[test]
    fn default_is_conjunction_of_rubric() {
        let e = CriteriaExpr::from_config(None, &rubric3()).unwrap();
        assert_eq!(e.to_string(), "criterion_1 AND criterion_2 AND criterion_3");
        assert_eq!(e.names(), vec!["criterion_1", "criterion_2", "criterion_3"]);
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let err = CriteriaExpr::from_config(Some("criterion_1 AND criterion_4"), &rubric3()).unwrap_err();
        assert!(matches!(err, BenchError::UnknownCriterion { ref name, .. } if name == "criterion_4"));
        assert!(err.is_configuration());
    }
}
