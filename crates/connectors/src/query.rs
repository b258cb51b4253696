use crate::pool::StoreKind;
use std::fmt::Write;

/// Placeholder for the `n`-th positional parameter (1-based).
fn placeholder(kind: StoreKind, n: usize) -> String {
    match kind {
        StoreKind::MySql => "?".to_string(),
        StoreKind::Postgres => format!("${n}"),
    }
}

fn placeholders(kind: StoreKind, count: usize, start: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&placeholder(kind, start + i));
    }
    out
}

pub fn quote_ident(kind: StoreKind, name: &str) -> String {
    match kind {
        StoreKind::MySql => format!("`{}`", name.replace('`', "``")),
        StoreKind::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

fn column_list(kind: StoreKind, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(kind, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT cols FROM t WHERE id = ? LIMIT 1` — the primary-key lookup. No
/// other clauses: the lookup must stay independent of any scan position.
pub fn select_by_id(kind: StoreKind, table: &str, columns: &[&str], id_column: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
        column_list(kind, columns),
        quote_ident(kind, table),
        quote_ident(kind, id_column),
        placeholder(kind, 1),
    )
}

/// The `offset`-th row of the table in primary-key order.
pub fn select_nth(
    kind: StoreKind,
    table: &str,
    columns: &[&str],
    id_column: &str,
    offset: u64,
) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT 1 OFFSET {offset}",
        column_list(kind, columns),
        quote_ident(kind, table),
        quote_ident(kind, id_column),
    )
}

/// The `offset`-th row among those modified at or after the bound parameter,
/// in modification-time order (primary key breaks ties to keep the walk
/// stable).
pub fn select_nth_modified(
    kind: StoreKind,
    table: &str,
    columns: &[&str],
    utime_column: &str,
    id_column: &str,
    offset: u64,
) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} >= {} ORDER BY {}, {} LIMIT 1 OFFSET {offset}",
        column_list(kind, columns),
        quote_ident(kind, table),
        quote_ident(kind, utime_column),
        placeholder(kind, 1),
        quote_ident(kind, utime_column),
        quote_ident(kind, id_column),
    )
}

/// One page of primary keys in ascending order.
pub fn select_id_page(
    kind: StoreKind,
    table: &str,
    id_column: &str,
    limit: usize,
    offset: u64,
) -> String {
    let id = quote_ident(kind, id_column);
    format!(
        "SELECT {id} FROM {} ORDER BY {id} LIMIT {limit} OFFSET {offset}",
        quote_ident(kind, table),
    )
}

pub fn select_by_ids(
    kind: StoreKind,
    table: &str,
    columns: &[&str],
    id_column: &str,
    id_count: usize,
) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        column_list(kind, columns),
        quote_ident(kind, table),
        quote_ident(kind, id_column),
        placeholders(kind, id_count, 1),
    )
}

/// Insert that overwrites `overwrite` columns when the primary key already
/// exists. Rendered per dialect: `ON DUPLICATE KEY UPDATE` for MySQL,
/// `ON CONFLICT .. DO UPDATE` for Postgres.
pub fn upsert(
    kind: StoreKind,
    table: &str,
    columns: &[&str],
    id_column: &str,
    overwrite: &[String],
) -> String {
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(kind, table),
        column_list(kind, columns),
        placeholders(kind, columns.len(), 1),
    );
    match kind {
        StoreKind::MySql => {
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            for (i, column) in overwrite.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let ident = quote_ident(kind, column);
                let _ = write!(sql, "{ident} = VALUES({ident})");
            }
        }
        StoreKind::Postgres => {
            let _ = write!(sql, " ON CONFLICT ({}) DO UPDATE SET ", quote_ident(kind, id_column));
            for (i, column) in overwrite.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let ident = quote_ident(kind, column);
                let _ = write!(sql, "{ident} = EXCLUDED.{ident}");
            }
        }
    }
    sql
}

pub fn delete_by_id(kind: StoreKind, table: &str, id_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_ident(kind, table),
        quote_ident(kind, id_column),
        placeholder(kind, 1),
    )
}
