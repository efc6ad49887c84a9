//! Keep-set reconciliation.
//!
//! Full-mode apply deletes every row of a kind whose key is absent from the
//! bundle. The table/column identifiers are interpolated into SQL, so they
//! are validated against a static allow-list first; values are always bound.

use std::collections::HashSet;

use sqlx::SqliteConnection;

use crate::{Catalog, CatalogError, Result};

/// (table, key column) pairs `delete_by_key_not_in` may touch.
const ALLOWED: &[(&str, &str)] = &[
    ("pages", "name"),
    ("components", "name"),
    ("style_bundles", "name"),
    ("assets", "filename"),
];

/// Stay well under SQLite's classic 999 bound-variable ceiling; the scope id
/// takes one slot.
const MAX_INLINE_KEYS: usize = 900;

impl Catalog {
    /// Delete rows in `table` scoped to `website_id` whose `key_col` is not
    /// in `keep`. Returns the number of rows deleted.
    ///
    /// Above [`MAX_INLINE_KEYS`] the single-statement form would blow the
    /// bound-variable budget, so the helper degrades to reading the scoped
    /// keys and deleting row by row.
    pub async fn delete_by_key_not_in(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        key_col: &str,
        website_id: i64,
        keep: &[String],
    ) -> Result<u64> {
        if !ALLOWED.iter().any(|(t, c)| *t == table && *c == key_col) {
            return Err(CatalogError::DisallowedIdentifier(format!(
                "{table}.{key_col}"
            )));
        }

        if keep.is_empty() {
            let deleted = sqlx::query(&format!("DELETE FROM {table} WHERE website_id = ?"))
                .bind(website_id)
                .execute(conn)
                .await?
                .rows_affected();
            return Ok(deleted);
        }

        if keep.len() <= MAX_INLINE_KEYS {
            let placeholders = vec!["?"; keep.len()].join(", ");
            let sql = format!(
                "DELETE FROM {table} WHERE website_id = ? AND {key_col} NOT IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(website_id);
            for key in keep {
                query = query.bind(key);
            }
            return Ok(query.execute(conn).await?.rows_affected());
        }

        // Fallback: read the scoped keys, diff in memory, delete one by one.
        let existing: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT {key_col} FROM {table} WHERE website_id = ?"
        ))
        .bind(website_id)
        .fetch_all(&mut *conn)
        .await?;

        let keep_set: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let mut deleted = 0;
        for key in existing {
            if keep_set.contains(key.as_str()) {
                continue;
            }
            deleted += sqlx::query(&format!(
                "DELETE FROM {table} WHERE website_id = ? AND {key_col} = ?"
            ))
            .bind(website_id)
            .bind(&key)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        }
        Ok(deleted)
    }
}
