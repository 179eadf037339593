//! Query interface of the harness.
//!
//! A [`Session`] executes [`Statement`]s at an optional consistency level and
//! returns ordered rows. Sessions are shared between the main scenario flow and
//! background checkers, so implementations must be safe to call concurrently.
mod cqlsh;
mod value;
pub use cqlsh::*;
pub use value::*;

use std::fmt;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::QueryError;
use crate::Result;

/// One result row, column order as selected
pub type Row = Vec<Value>;

pub type Rows = Vec<Row>;

/// How many replicas must acknowledge before a request completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl fmt::Display for Consistency {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::LocalOne => "LOCAL_ONE",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub consistency: Option<Consistency>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            consistency: None,
        }
    }

    pub fn with_consistency(
        mut self,
        consistency: Consistency,
    ) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Client-side binding of `?` placeholders to CQL literals.
    ///
    /// `?` inside single-quoted string literals is left alone.
    pub fn bound(
        template: &str,
        values: &[Value],
    ) -> Result<Self> {
        let mut query = String::with_capacity(template.len());
        let mut values_iter = values.iter();
        let mut in_literal = false;

        for c in template.chars() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    query.push(c);
                }
                '?' if !in_literal => match values_iter.next() {
                    Some(v) => query.push_str(&v.to_cql_literal()),
                    None => {
                        return Err(QueryError::Bind(format!(
                            "`{template}` has more placeholders than the {} value(s) given",
                            values.len()
                        ))
                        .into())
                    }
                },
                _ => query.push(c),
            }
        }

        if values_iter.next().is_some() {
            return Err(QueryError::Bind(format!(
                "`{template}` has fewer placeholders than the {} value(s) given",
                values.len()
            ))
            .into());
        }

        Ok(Self::new(query))
    }

    /// Wraps statements in a logged batch.
    pub fn batch<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Statement>,
    {
        let mut query = String::from("BEGIN BATCH\n");
        for s in statements {
            let s: Statement = s.into();
            query.push_str(s.query.trim().trim_end_matches(';'));
            query.push_str(";\n");
        }
        query.push_str("APPLY BATCH");
        Self::new(query)
    }
}

impl From<&str> for Statement {
    fn from(query: &str) -> Self {
        Statement::new(query)
    }
}

impl From<String> for Statement {
    fn from(query: String) -> Self {
        Statement::new(query)
    }
}

impl From<&String> for Statement {
    fn from(query: &String) -> Self {
        Statement::new(query.as_str())
    }
}

impl fmt::Display for Statement {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.consistency {
            Some(cl) => write!(f, "{} [{}]", self.query, cl),
            None => f.write_str(&self.query),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Executes one statement and returns its rows (empty for writes and DDL).
    ///
    /// # Errors
    /// `Error::Query` when the server rejects or fails the statement.
    async fn execute(
        &self,
        statement: Statement,
    ) -> Result<Rows>;
}
