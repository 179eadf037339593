//! Result checks over a [`Session`].
//!
//! Every check takes either a query string or a [`Statement`] carrying a
//! consistency level, and fails with an [`AssertionError`] naming the query.

use tracing::trace;

use crate::AssertionError;
use crate::Error;
use crate::QueryError;
use crate::Result;
use crate::Row;
use crate::Rows;
use crate::Session;
use crate::Statement;

async fn rows_of(
    session: &dyn Session,
    statement: Statement,
) -> Result<(String, Rows)> {
    let query = statement.to_string();
    let rows = session.execute(statement).await?;
    trace!(%query, rows = rows.len(), "assertion query");
    Ok((query, rows))
}

/// Exactly one row, equal to `expected`.
pub async fn assert_one(
    session: &dyn Session,
    statement: impl Into<Statement>,
    expected: Row,
) -> Result<()> {
    let (query, mut rows) = rows_of(session, statement.into()).await?;
    if rows.len() != 1 {
        return Err(AssertionError::RowCount {
            query,
            expected: 1,
            actual: rows.len(),
            rows,
        }
        .into());
    }
    let actual = rows.remove(0);
    if actual != expected {
        return Err(AssertionError::RowMismatch {
            query,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

pub async fn assert_none(
    session: &dyn Session,
    statement: impl Into<Statement>,
) -> Result<()> {
    assert_row_count(session, statement, 0).await
}

pub async fn assert_row_count(
    session: &dyn Session,
    statement: impl Into<Statement>,
    expected: usize,
) -> Result<()> {
    let (query, rows) = rows_of(session, statement.into()).await?;
    if rows.len() != expected {
        return Err(AssertionError::RowCount {
            query,
            expected,
            actual: rows.len(),
            rows,
        }
        .into());
    }
    Ok(())
}

/// Exactly `expected`, in order unless `ignore_order`.
pub async fn assert_all(
    session: &dyn Session,
    statement: impl Into<Statement>,
    expected: Rows,
    ignore_order: bool,
) -> Result<()> {
    let (query, actual) = rows_of(session, statement.into()).await?;
    let matches = if ignore_order {
        same_multiset(&expected, &actual)
    } else {
        expected == actual
    };
    if !matches {
        return Err(AssertionError::RowsMismatch {
            query,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

// Rows hold floats, so no sort: match each expected row against a remaining one.
fn same_multiset(
    expected: &[Row],
    actual: &[Row],
) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    let mut remaining: Vec<&Row> = actual.iter().collect();
    expected.iter().all(|row| match remaining.iter().position(|r| *r == row) {
        Some(i) => {
            remaining.swap_remove(i);
            true
        }
        None => false,
    })
}

/// The statement must be refused by the server; the refusal is returned.
///
/// Operational failures (timeouts, unavailable replicas, connection errors)
/// are not refusals and propagate unchanged.
pub async fn assert_invalid(
    session: &dyn Session,
    statement: impl Into<Statement>,
) -> Result<QueryError> {
    let statement = statement.into();
    let query = statement.to_string();
    match session.execute(statement).await {
        Ok(rows) => Err(AssertionError::UnexpectedSuccess { query, rows }.into()),
        Err(Error::Query(rejection @ QueryError::Rejected { .. })) => Ok(rejection),
        Err(e) => Err(e),
    }
}

/// Like [`assert_invalid`], and the refusal must mention `fragment`.
pub async fn assert_invalid_with(
    session: &dyn Session,
    statement: impl Into<Statement>,
    fragment: &str,
) -> Result<QueryError> {
    let statement = statement.into();
    let query = statement.to_string();
    let rejection = assert_invalid(session, statement).await?;
    let message = match &rejection {
        QueryError::Rejected { message, .. } => message.as_str(),
        _ => "",
    };
    if !message.contains(fragment) {
        return Err(AssertionError::RejectionMismatch {
            query,
            expected: fragment.to_string(),
            actual: message.to_string(),
        }
        .into());
    }
    Ok(rejection)
}

/// `|a - b| <= error * max(|a|, |b|)`; `error` must be non-negative.
pub fn assert_almost_equal(
    a: f64,
    b: f64,
    error: f64,
) -> Result<()> {
    if error.is_nan() || error < 0.0 {
        return Err(AssertionError::InvalidTolerance(error).into());
    }
    if (a - b).abs() <= error * a.abs().max(b.abs()) {
        Ok(())
    } else {
        Err(AssertionError::NotAlmostEqual { a, b, error }.into())
    }
}
