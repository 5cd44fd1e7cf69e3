//! Predicate builder for structural search over JSON attribute payloads
//!
//! A [`Condition`] is a typed expression tree of comparisons combined with
//! `And`/`Or`/`Not`. It compiles to a SQL boolean expression plus its bound
//! parameters in one of two modes:
//!
//! - [`SearchMode::Direct`]: the key is a (dotted) path into the payload,
//!   `json_extract(body, '$."a"."b"') = ?`
//! - [`SearchMode::Tree`]: the key may appear at any depth, matched by
//!   walking the payload with `json_tree`
//!
//! The flat clause list (`{key, predicate, joiner}` plus one binding per
//! clause) is also accepted and folded left-to-right into a `Condition`.

use crate::storage::SqlValue;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    #[serde(rename = "=", alias = "==")]
    Equals,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
}

impl Predicate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Predicate::Equals => "=",
            Predicate::Like => "LIKE",
            Predicate::GreaterThan => ">",
            Predicate::LessThan => "<",
        }
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "=" | "==" | "EQ" => Ok(Predicate::Equals),
            "LIKE" => Ok(Predicate::Like),
            ">" | "GT" => Ok(Predicate::GreaterThan),
            "<" | "LT" => Ok(Predicate::LessThan),
            other => Err(Error::MalformedQuery(format!("Unknown predicate: {}", other))),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a clause attaches to the clauses before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Joiner {
    /// First clause of a list
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
    /// `AND NOT`, or a plain negation on the first clause
    #[serde(rename = "NOT", alias = "not")]
    Not,
}

impl FromStr for Joiner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "" => Ok(Joiner::None),
            "AND" => Ok(Joiner::And),
            "OR" => Ok(Joiner::Or),
            "NOT" | "AND NOT" => Ok(Joiner::Not),
            other => Err(Error::MalformedQuery(format!("Unknown joiner: {}", other))),
        }
    }
}

/// One element of a flat clause list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub key: String,
    pub predicate: Predicate,
    #[serde(default)]
    pub joiner: Joiner,
}

impl Clause {
    pub fn new(key: impl Into<String>, predicate: Predicate, joiner: Joiner) -> Self {
        Self {
            key: key.into(),
            predicate,
            joiner,
        }
    }
}

/// Where a clause key is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Dotted path from the payload root
    #[default]
    Direct,
    /// Key matched at any nesting depth
    Tree,
}

/// Typed predicate expression
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        key: String,
        predicate: Predicate,
        value: Value,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(key: impl Into<String>, predicate: Predicate, value: impl Into<Value>) -> Self {
        Condition::Compare {
            key: key.into(),
            predicate,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Predicate::Equals, value)
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(key, Predicate::Like, Value::String(pattern.into()))
    }

    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Predicate::GreaterThan, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Predicate::LessThan, value)
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Fold a clause list and its bindings left-to-right
    ///
    /// `[a, OR b, AND c]` becomes `((a OR b) AND c)`. Only the first clause may
    /// have an empty joiner; a leading `NOT` negates the first clause.
    pub fn from_clauses(clauses: &[Clause], bindings: &[Value]) -> Result<Self> {
        if clauses.is_empty() {
            return Err(Error::MalformedQuery("empty clause list".to_string()));
        }
        if clauses.len() != bindings.len() {
            return Err(Error::MalformedQuery(format!(
                "{} clauses but {} bindings",
                clauses.len(),
                bindings.len()
            )));
        }

        let mut acc: Option<Condition> = None;
        for (i, (clause, binding)) in clauses.iter().zip(bindings).enumerate() {
            let term = Condition::compare(clause.key.clone(), clause.predicate, binding.clone());
            acc = Some(match (acc, clause.joiner) {
                (None, Joiner::None) => term,
                (None, Joiner::Not) => term.negate(),
                (None, joiner) => {
                    return Err(Error::MalformedQuery(format!(
                        "first clause cannot start with {:?}",
                        joiner
                    )))
                }
                (Some(_), Joiner::None) => {
                    return Err(Error::MalformedQuery(format!("clause {} has no joiner", i)))
                }
                (Some(prev), Joiner::And) => prev.and(term),
                (Some(prev), Joiner::Or) => prev.or(term),
                (Some(prev), Joiner::Not) => prev.and(term.negate()),
            });
        }

        acc.ok_or_else(|| Error::MalformedQuery("empty clause list".to_string()))
    }

    /// Compile against `<table>.<column>` holding the JSON payload
    pub fn compile(&self, mode: SearchMode, table: &str, column: &str) -> Result<CompiledCondition> {
        let mut params = Vec::new();
        let sql = self.write_sql(mode, &format!("{}.{}", table, column), &mut params)?;
        Ok(CompiledCondition { sql, params })
    }

    fn write_sql(&self, mode: SearchMode, target: &str, params: &mut Vec<SqlValue>) -> Result<String> {
        match self {
            Condition::Compare { key, predicate, value } => {
                if key.trim().is_empty() {
                    return Err(Error::MalformedQuery("clause key must not be empty".to_string()));
                }
                match mode {
                    SearchMode::Direct => {
                        params.push(SqlValue::Text(json_path(key)?));
                        params.push(SqlValue::from_json(value));
                        Ok(format!("json_extract({}, ?) {} ?", target, predicate.as_sql()))
                    }
                    SearchMode::Tree => {
                        params.push(SqlValue::Text(key.clone()));
                        params.push(SqlValue::from_json(value));
                        Ok(format!(
                            "EXISTS (SELECT 1 FROM json_tree({}) AS t WHERE t.key = ? AND t.value {} ?)",
                            target,
                            predicate.as_sql()
                        ))
                    }
                }
            }
            Condition::And(left, right) => Ok(format!(
                "({} AND {})",
                left.write_sql(mode, target, params)?,
                right.write_sql(mode, target, params)?
            )),
            Condition::Or(left, right) => Ok(format!(
                "({} OR {})",
                left.write_sql(mode, target, params)?,
                right.write_sql(mode, target, params)?
            )),
            Condition::Not(inner) => Ok(format!("(NOT {})", inner.write_sql(mode, target, params)?)),
        }
    }
}

/// SQL boolean expression with anonymous `?` placeholders, in binding order
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// `a.b` -> `$."a"."b"`
fn json_path(key: &str) -> Result<String> {
    let mut path = String::from("$");
    for segment in key.split('.') {
        if segment.is_empty() || segment.contains('"') {
            return Err(Error::MalformedQuery(format!("invalid key path: {}", key)));
        }
        path.push_str(".\"");
        path.push_str(segment);
        path.push('"');
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_compile() {
        let cond = Condition::eq("name", "Ada").and(Condition::gt("meta.age", 30));
        let compiled = cond.compile(SearchMode::Direct, "nodes", "body").unwrap();
        assert_eq!(
            compiled.sql,
            "(json_extract(nodes.body, ?) = ? AND json_extract(nodes.body, ?) > ?)"
        );
        assert_eq!(
            compiled.params,
            vec![
                SqlValue::Text("$.\"name\"".into()),
                SqlValue::Text("Ada".into()),
                SqlValue::Text("$.\"meta\".\"age\"".into()),
                SqlValue::Integer(30),
            ]
        );
    }

    #[test]
    fn test_tree_compile() {
        let compiled = Condition::like("city", "Par%")
            .compile(SearchMode::Tree, "nodes", "body")
            .unwrap();
        assert_eq!(
            compiled.sql,
            "EXISTS (SELECT 1 FROM json_tree(nodes.body) AS t WHERE t.key = ? AND t.value LIKE ?)"
        );
        assert_eq!(compiled.params[0], SqlValue::Text("city".into()));
    }

    #[test]
    fn test_clauses_fold_left_to_right() {
        let clauses = vec![
            Clause::new("a", Predicate::Equals, Joiner::None),
            Clause::new("b", Predicate::Equals, Joiner::Or),
            Clause::new("c", Predicate::Like, Joiner::And),
            Clause::new("d", Predicate::LessThan, Joiner::Not),
        ];
        let cond = Condition::from_clauses(&clauses, &[json!(1), json!(2), json!("x%"), json!(9)]).unwrap();
        let expected = Condition::eq("a", 1)
            .or(Condition::eq("b", 2))
            .and(Condition::like("c", "x%"))
            .and(Condition::lt("d", 9).negate());
        assert_eq!(cond, expected);

        let sql = cond.compile(SearchMode::Direct, "n", "body").unwrap().sql;
        assert!(sql.starts_with("(((json_extract"));
        assert!(sql.ends_with("(NOT json_extract(n.body, ?) < ?))"));
    }

    #[test]
    fn test_malformed_clause_lists() {
        let a = Clause::new("a", Predicate::Equals, Joiner::None);
        let b_missing = Clause::new("b", Predicate::Equals, Joiner::None);
        let leading_and = Clause::new("a", Predicate::Equals, Joiner::And);

        assert!(Condition::from_clauses(&[], &[]).is_err());
        assert!(Condition::from_clauses(&[a.clone()], &[]).is_err());
        assert!(Condition::from_clauses(&[a, b_missing], &[json!(1), json!(2)]).is_err());
        assert!(Condition::from_clauses(&[leading_and], &[json!(1)]).is_err());
        assert!(Condition::eq("", 1).compile(SearchMode::Direct, "n", "b").is_err());
        assert!(Condition::eq("a..b", 1).compile(SearchMode::Direct, "n", "b").is_err());
    }

    #[test]
    fn test_clause_deserialize() {
        let clauses: Vec<Clause> = serde_json::from_value(json!([
            {"key": "name", "predicate": "LIKE"},
            {"key": "age", "predicate": ">", "joiner": "AND"},
            {"key": "role", "predicate": "=", "joiner": "NOT"}
        ]))
        .unwrap();
        assert_eq!(clauses[0].joiner, Joiner::None);
        assert_eq!(clauses[1].predicate, Predicate::GreaterThan);
        assert_eq!(clauses[2].joiner, Joiner::Not);
        assert_eq!("like".parse::<Predicate>().unwrap(), Predicate::Like);
        assert!("~".parse::<Predicate>().is_err());
    }
}
