use crate::db::error::DbError;
use deadpool_postgres::Pool;
use postgres_types::ToSql;
use tokio_postgres::Row;

mod migrations;
mod pool;

pub mod error;
pub mod repo;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone, Debug)]
pub struct Db {
    pub(crate) pool: Pool,
}

impl Db {
    pub async fn get_client(&self) -> DbResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }
}

pub fn map_row_opt<T, F>(row_opt: Option<Row>, f: F, ctx: &str) -> DbResult<Option<T>>
where
    F: FnOnce(&Row) -> DbResult<T>,
{
    match row_opt {
        Some(row) => match f(&row) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::error!(error = %e, context = %ctx, "row mapping failed");
                Err(e)
            }
        },
        None => Ok(None),
    }
}

pub fn map_rows<T, F>(rows: Vec<Row>, f: F, ctx: &str) -> DbResult<Vec<T>>
where
    F: Fn(&Row) -> DbResult<T>,
{
    rows.iter()
        .map(|row| {
            f(row).inspect_err(|e| {
                tracing::error!(error = %e, context = %ctx, "row mapping failed");
            })
        })
        .collect()
}

/// Incrementally built `WHERE` clause with positional parameters.
#[derive(Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl SqlFilter {
    /// Adds a clause; `clause` receives the placeholder (`$n`) bound to `value`.
    pub fn push<V>(&mut self, value: V, clause: impl FnOnce(&str) -> String)
    where
        V: ToSql + Sync + Send + 'static,
    {
        self.params.push(Box::new(value));
        let placeholder = format!("${}", self.params.len());
        self.clauses.push(clause(&placeholder));
    }

    /// Binds an extra parameter that is not part of the `WHERE` clause (LIMIT, OFFSET, ...).
    pub fn bind<V>(&mut self, value: V) -> String
    where
        V: ToSql + Sync + Send + 'static,
    {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
    }
}

/// Escapes `%`, `_` and `\` so user input can be embedded in an ILIKE pattern.
pub(crate) fn like_contains(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
