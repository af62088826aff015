//! Building blocks for statements whose shape depends on which optional
//! criteria or fields a caller supplied.
//!
//! Column names only ever come from `&'static str` values owned by the
//! gateway modules; caller input is always bound as a positional parameter.

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ToSql;
use rusqlite::{Connection, ParamsFromIter};

/// Registers the SQL functions predicates rely on. Must run on every pooled
/// connection.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    // LIKE only folds ASCII, so "Кинопоиск" would not match "кинопоиск"
    conn.create_scalar_function(
        "contains_ci",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let haystack = ctx.get::<Option<String>>(0)?;
            let needle = ctx.get::<Option<String>>(1)?;
            Ok(match (haystack, needle) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            })
        },
    )
}

/// `AND`-joined conditions plus their positional parameters. With no
/// conditions the predicate matches every row.
#[derive(Default)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its 1-based placeholder index.
    pub fn bind(&mut self, value: impl ToSql + 'static) -> usize {
        self.params.push(Box::new(value));
        self.params.len()
    }

    pub fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    pub fn eq(&mut self, column: &'static str, value: impl ToSql + 'static) {
        let idx = self.bind(value);
        self.push(format!("{column} = ?{idx}"));
    }

    /// Case-insensitive substring match over full Unicode. `needle` is
    /// matched literally, wildcards included.
    pub fn contains(&mut self, column: &'static str, needle: &str) {
        let idx = self.bind(needle.to_string());
        self.push(format!("contains_ci({column}, ?{idx})"));
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// `LIMIT`/`OFFSET` tail. Non-positive values mean "not requested".
    pub fn paginate(&mut self, limit: Option<i64>, offset: Option<i64>) -> String {
        let limit = limit.filter(|l| *l > 0);
        let offset = offset.filter(|o| *o > 0);

        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT ?{}", self.bind(limit)),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET ?{}", self.bind(offset)),
            (Some(limit), Some(offset)) => {
                let limit_idx = self.bind(limit);
                let offset_idx = self.bind(offset);
                format!(" LIMIT ?{limit_idx} OFFSET ?{offset_idx}")
            }
        }
    }

    pub fn params(&self) -> ParamsFromIter<impl Iterator<Item = &dyn ToSql> + '_> {
        rusqlite::params_from_iter(self.params.iter().map(|p| p.as_ref()))
    }
}

/// A column that may appear on the left-hand side of an `UPDATE ... SET`.
pub trait Column: Copy {
    fn name(self) -> &'static str;
}

/// The fields a partial update touches, each drawn from a fixed column set.
pub struct ChangeSet<C> {
    fields: Vec<(C, Box<dyn ToSql>)>,
}

impl<C: Column> Default for ChangeSet<C> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<C: Column> ChangeSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: C, value: impl ToSql + 'static) {
        self.fields.push((column, Box::new(value)));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders `UPDATE {table} SET <fields>, updated_at = ? WHERE {key_column} = ?`
    /// together with its parameters, in placeholder order.
    pub fn into_update(
        self,
        table: &'static str,
        key_column: &'static str,
        key: impl ToSql + 'static,
        updated_at: String,
    ) -> (String, Vec<Box<dyn ToSql>>) {
        let mut assignments = Vec::with_capacity(self.fields.len() + 1);
        let mut params: Vec<Box<dyn ToSql>> = Vec::with_capacity(self.fields.len() + 2);

        for (column, value) in self.fields {
            params.push(value);
            assignments.push(format!("{} = ?{}", column.name(), params.len()));
        }

        params.push(Box::new(updated_at));
        assignments.push(format!("updated_at = ?{}", params.len()));
        params.push(Box::new(key));

        let sql = format!(
            "UPDATE {table} SET {} WHERE {key_column} = ?{}",
            assignments.join(", "),
            params.len()
        );
        (sql, params)
    }
}
