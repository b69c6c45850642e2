//! Statement text for the generic data operations.
//!
//! Table and column names come from [`Record`](crate::db::Record) constants and
//! are trusted. Filters are written with `?` placeholders and rewritten for
//! backends that need numbered ones.

use crate::models::DatabaseType;

/// Placeholder for the `index`-th (1-based) bind value.
pub(crate) fn placeholder(db_type: DatabaseType, index: usize) -> String {
    if db_type.uses_numbered_placeholders() {
        format!("${}", index)
    } else {
        "?".to_string()
    }
}

/// Rewrite `?` placeholders to the backend syntax, numbering from `offset + 1`.
///
/// Question marks inside quoted literals or identifiers are left alone.
pub(crate) fn rewrite_placeholders(sql: &str, db_type: DatabaseType, offset: usize) -> String {
    if !db_type.uses_numbered_placeholders() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = offset;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push_str(&placeholder(db_type, index));
                }
                _ => out.push(c),
            },
        }
    }
    out
}

fn where_clause(filter: &str, db_type: DatabaseType, offset: usize) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", rewrite_placeholders(filter, db_type, offset))
    }
}

/// `SELECT` of the record columns, optionally filtered and limited.
pub(crate) fn select(
    table: &str,
    columns: &[&str],
    filter: &str,
    db_type: DatabaseType,
    limit: Option<u32>,
) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}{}",
        columns.join(", "),
        table,
        where_clause(filter, db_type, 0)
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

/// `INSERT` of every record column.
pub(crate) fn insert(table: &str, columns: &[&str], db_type: DatabaseType) -> String {
    let values: Vec<String> = (1..=columns.len())
        .map(|i| placeholder(db_type, i))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        values.join(", ")
    )
}

/// `UPDATE` of `set_columns`, keyed by `key`; the key binds last.
pub(crate) fn update(
    table: &str,
    set_columns: &[&str],
    key: &str,
    db_type: DatabaseType,
) -> String {
    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = {}", column, placeholder(db_type, i + 1)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        assignments.join(", "),
        key,
        placeholder(db_type, set_columns.len() + 1)
    )
}

/// `DELETE` filtered by `filter`.
pub(crate) fn delete(table: &str, filter: &str, db_type: DatabaseType) -> String {
    format!("DELETE FROM {}{}", table, where_clause(filter, db_type, 0))
}
