// src/config/condition.rs

//! Conditions attached to variables, components and steps.
//!
//! Grammar (`&&` binds tighter than `||`, no parentheses):
//!
//! ```text
//! condition := clause ( "||" clause )*
//! clause    := term ( "&&" term )*
//! term      := name | "!" name | name "==" literal | name "!=" literal
//! literal   := 'text' | "text" | integer | true | false
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::types::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Is(String),
    Not(String),
    Eq(String, Value),
    Ne(String, Value),
}

impl Term {
    fn variable(&self) -> &str {
        match self {
            Term::Is(n) | Term::Not(n) | Term::Eq(n, _) | Term::Ne(n, _) => n,
        }
    }
}

/// A parsed condition in disjunctive normal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    clauses: Vec<Vec<Term>>,
}

impl Condition {
    /// Parse a condition. The error is a human-readable reason.
    pub fn parse(source: &str) -> Result<Self, String> {
        if source.trim().is_empty() {
            return Err("empty condition".to_string());
        }

        let mut clauses = Vec::new();
        for clause in source.split("||") {
            let mut terms = Vec::new();
            for term in clause.split("&&") {
                terms.push(parse_term(term.trim())?);
            }
            clauses.push(terms);
        }

        Ok(Self {
            source: source.trim().to_string(),
            clauses,
        })
    }

    /// Names of all variables this condition reads.
    pub fn variables(&self) -> BTreeSet<String> {
        self.clauses
            .iter()
            .flatten()
            .map(|t| t.variable().to_string())
            .collect()
    }

    /// Evaluate against resolved values.
    ///
    /// Every variable referenced must be resolvable through `lookup`; an
    /// unknown variable or a type mismatch is an error, never `false`.
    pub fn evaluate<'v, F>(&self, lookup: F) -> Result<bool, String>
    where
        F: Fn(&str) -> Option<&'v Value>,
    {
        // Resolve all terms even when short-circuiting would allow skipping,
        // so that a bad reference is reported regardless of other values.
        let mut any = false;
        for clause in &self.clauses {
            let mut all = true;
            for term in clause {
                all &= eval_term(term, &lookup)?;
            }
            any |= all;
        }
        Ok(any)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval_term<'v, F>(term: &Term, lookup: &F) -> Result<bool, String>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    let name = term.variable();
    let value = lookup(name).ok_or_else(|| format!("unknown variable '{name}'"))?;

    match term {
        Term::Is(_) | Term::Not(_) => {
            let b = value
                .as_bool()
                .ok_or_else(|| format!("variable '{name}' is not a bool"))?;
            Ok(if matches!(term, Term::Is(_)) { b } else { !b })
        }
        Term::Eq(_, lit) | Term::Ne(_, lit) => {
            if std::mem::discriminant(value) != std::mem::discriminant(lit) {
                return Err(format!(
                    "cannot compare variable '{name}' (value {value}) with {lit}"
                ));
            }
            let equal = value == lit;
            Ok(if matches!(term, Term::Eq(..)) { equal } else { !equal })
        }
    }
}

fn parse_term(term: &str) -> Result<Term, String> {
    if term.is_empty() {
        return Err("empty term".to_string());
    }

    // The operator is the first `==` / `!=`; literals may contain either.
    let op = [("==", false), ("!=", true)]
        .into_iter()
        .filter_map(|(op, negate)| term.find(op).map(|pos| (pos, negate)))
        .min_by_key(|(pos, _)| *pos);

    if let Some((pos, negate)) = op {
        let name = parse_name(term[..pos].trim())?;
        let lit = parse_literal(term[pos + 2..].trim())?;
        return Ok(if negate {
            Term::Ne(name, lit)
        } else {
            Term::Eq(name, lit)
        });
    }

    match term.strip_prefix('!') {
        Some(rest) => Ok(Term::Not(parse_name(rest.trim())?)),
        None => Ok(Term::Is(parse_name(term)?)),
    }
}

fn parse_name(s: &str) -> Result<String, String> {
    if is_valid_name(s) {
        Ok(s.to_string())
    } else {
        Err(format!("invalid variable name '{s}'"))
    }
}

fn parse_literal(s: &str) -> Result<Value, String> {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return Ok(Value::Str(s[1..s.len() - 1].to_string()));
        }
    }
    match s {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("invalid literal '{s}' (strings must be quoted)")),
    }
}

/// Variable, component and step names: `[A-Za-z_][A-Za-z0-9_-]*`.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
