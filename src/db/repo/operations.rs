//! Operation log for the repository. Rows are only ever inserted.

use crate::domain::{Address, Decimal, NewOperation, Operation, OperationType, TimeMs, TxHash};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::Repository;

impl Repository {
    /// Append an operation on its own.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_operation(&self, op: &NewOperation) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert_operation(&mut *conn, op, TimeMs::now()).await
    }

    /// Most recent operations for a wallet, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_operations(
        &self,
        wallet: &Address,
        limit: u32,
        type_filter: Option<OperationType>,
    ) -> Result<Vec<Operation>, sqlx::Error> {
        let (sql, binds_type) = if type_filter.is_some() {
            (
                r#"
                SELECT id, operation_type, wallet, pool, bin_id, amount_x, amount_y,
                       tx_hash, note, created_at_ms
                FROM operations
                WHERE wallet = ? AND operation_type = ?
                ORDER BY created_at_ms DESC, id DESC
                LIMIT ?
                "#,
                true,
            )
        } else {
            (
                r#"
                SELECT id, operation_type, wallet, pool, bin_id, amount_x, amount_y,
                       tx_hash, note, created_at_ms
                FROM operations
                WHERE wallet = ?
                ORDER BY created_at_ms DESC, id DESC
                LIMIT ?
                "#,
                false,
            )
        };

        let mut query = sqlx::query(sql).bind(wallet.as_str());
        if binds_type {
            if let Some(op_type) = type_filter {
                query = query.bind(op_type.as_str());
            }
        }
        query = query.bind(i64::from(limit));

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().filter_map(operation_from_row).collect())
    }
}

pub(super) async fn insert_operation(
    conn: &mut SqliteConnection,
    op: &NewOperation,
    now: TimeMs,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO operations (
            operation_type, wallet, pool, bin_id, amount_x, amount_y,
            tx_hash, note, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(op.operation_type.as_str())
    .bind(op.wallet.as_str())
    .bind(op.pool.as_str())
    .bind(op.bin_id)
    .bind(op.amount_x.map(|d| d.to_canonical_string()))
    .bind(op.amount_y.map(|d| d.to_canonical_string()))
    .bind(op.tx_hash.as_str())
    .bind(op.note.as_deref())
    .bind(now.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

fn operation_from_row(row: &SqliteRow) -> Option<Operation> {
    let id: i64 = row.get("id");
    let type_str: String = row.get("operation_type");
    let operation_type = match OperationType::from_str(&type_str) {
        Ok(t) => t,
        Err(e) => {
            warn!(operation_id = id, error = %e, "Skipping operation with unknown type");
            return None;
        }
    };

    let parse_amount = |column: &str| -> Option<Decimal> {
        let raw: Option<String> = row.get(column);
        raw.and_then(|s| match Decimal::from_str(&s) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(operation_id = id, column, value = %s, error = %e, "Failed to parse operation amount, ignoring");
                None
            }
        })
    };

    Some(Operation {
        id,
        operation_type,
        wallet: Address::new(row.get::<String, _>("wallet")),
        pool: Address::new(row.get::<String, _>("pool")),
        bin_id: row.get("bin_id"),
        amount_x: parse_amount("amount_x"),
        amount_y: parse_amount("amount_y"),
        tx_hash: TxHash::new(row.get::<String, _>("tx_hash")),
        note: row.get("note"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    })
}
