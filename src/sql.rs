use std::collections::HashMap;

use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::engine::EngineError;
use crate::limits::DEFAULT_SLOT_DURATION;
use crate::model::*;

/// Parsed command from SQL input. Every command is a read.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectAvailability {
        candidate: Candidate,
    },
    SelectSlots {
        resource_id: ResourceId,
        date: NaiveDate,
        duration: Minute,
    },
    SelectFreeWindows {
        resource_id: ResourceId,
        date: NaiveDate,
        min_duration: Option<Minute>,
    },
    SelectClosures {
        date: Option<NaiveDate>,
    },
    SelectResources,
    SelectAffectedAreas {
        raw: String,
    },
    SelectPendingReviews,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// The table a `SELECT` reads from, if the statement is one.
pub fn table_name(sql: &str) -> Option<String> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let Some(Statement::Query(query)) = stmts.first() else {
        return None;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return None;
    };
    table_factor_name(&select.from.first()?.relation).ok()
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }

    match table.as_str() {
        "availability" => {
            let resource_id = filters.required_i64("resource_id")?;
            let interval = TimeInterval::parse(
                filters.required("date")?,
                filters.required("start_time")?,
                filters.required("end_time")?,
            )?;
            let mut candidate = Candidate::new(resource_id, interval);
            if let Some(id) = filters.optional_i64("exclude_booking")? {
                candidate = candidate.excluding(id);
            }
            Ok(Command::SelectAvailability { candidate })
        }
        "slots" => Ok(Command::SelectSlots {
            resource_id: filters.required_i64("resource_id")?,
            date: filters.required_date("date")?,
            duration: filters.optional_minutes("duration")?.unwrap_or(DEFAULT_SLOT_DURATION),
        }),
        "free_windows" => Ok(Command::SelectFreeWindows {
            resource_id: filters.required_i64("resource_id")?,
            date: filters.required_date("date")?,
            min_duration: filters.optional_minutes("min_duration")?,
        }),
        "closures" => Ok(Command::SelectClosures {
            date: filters.optional("date").map(parse_date).transpose()?,
        }),
        "resources" => Ok(Command::SelectResources),
        "affected_areas" => Ok(Command::SelectAffectedAreas {
            raw: filters.required("raw")?.to_string(),
        }),
        "pending_reviews" => Ok(Command::SelectPendingReviews),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `column = literal` pairs from an AND-chain in the WHERE clause.
#[derive(Debug, Default)]
struct Filters {
    values: HashMap<String, String>,
}

impl Filters {
    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner)?,
            Expr::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And => {
                    self.collect(left)?;
                    self.collect(right)?;
                }
                ast::BinaryOperator::Eq => {
                    if let Some(col) = expr_column_name(left)
                        && let Some(value) = literal_text(right)?
                    {
                        self.values.insert(col, value);
                    }
                }
                other => return Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
            },
            other => return Err(SqlError::Unsupported(format!("WHERE expression {other}"))),
        }
        Ok(())
    }

    fn optional(&self, col: &'static str) -> Option<&str> {
        self.values.get(col).map(String::as_str)
    }

    fn required(&self, col: &'static str) -> Result<&str, SqlError> {
        self.optional(col).ok_or(SqlError::MissingFilter(col))
    }

    fn optional_i64(&self, col: &'static str) -> Result<Option<i64>, SqlError> {
        self.optional(col)
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|e| SqlError::Parse(format!("{col}: bad integer {raw:?}: {e}")))
            })
            .transpose()
    }

    fn required_i64(&self, col: &'static str) -> Result<i64, SqlError> {
        self.optional_i64(col)?.ok_or(SqlError::MissingFilter(col))
    }

    fn optional_minutes(&self, col: &'static str) -> Result<Option<Minute>, SqlError> {
        self.optional_i64(col)?
            .map(|v| Minute::try_from(v).map_err(|_| SqlError::Parse(format!("{col}: {v} out of range"))))
            .transpose()
    }

    fn required_date(&self, col: &'static str) -> Result<NaiveDate, SqlError> {
        Ok(parse_date(self.required(col)?)?)
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

/// The text of a literal; `None` for `NULL`.
fn literal_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(None),
            Value::Number(s, _) | Value::SingleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!("expected number or string, got {value:?}"))),
        },
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => Ok(literal_text(expr)?.map(|s| format!("-{s}"))),
        _ => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    MissingFilter(&'static str),
    /// Syntactically fine, but the values do not make a valid request.
    Invalid(EngineError),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SqlError {}

impl From<EngineError> for SqlError {
    fn from(e: EngineError) -> Self {
        SqlError::Invalid(e)
    }
}
