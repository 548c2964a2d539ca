//! Position row operations for the repository.

use crate::domain::{Address, Decimal, NewPosition, Position, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::Repository;

/// The (wallet, pool) pair every position query is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreScope {
    pub wallet: Address,
    pub pool: Address,
}

impl StoreScope {
    pub fn new(wallet: &Address, pool: &Address) -> Self {
        Self {
            wallet: wallet.clone(),
            pool: pool.clone(),
        }
    }
}

const POSITION_COLUMNS: &str =
    "id, wallet, pool, bin_id, amount, token_x, token_y, updated_at_ms, active";

impl Repository {
    /// Insert a position, or refresh the amount of the active row for the same bin.
    ///
    /// Returns the row id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn upsert_position(&self, position: &NewPosition) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = upsert(&mut *tx, position, TimeMs::now()).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Refresh the LP amount of an active row.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn update_position_amount(&self, id: i64, amount: Decimal) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        set_amount(&mut *conn, id, amount, TimeMs::now()).await
    }

    /// Mark a row inactive with a zero amount.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn deactivate_position(&self, id: i64) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        deactivate(&mut *conn, id, TimeMs::now()).await
    }

    /// Active positions for a wallet in a pool, ordered by bin id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_active_positions(
        &self,
        scope: &StoreScope,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE wallet = ? AND pool = ? AND active = 1 ORDER BY bin_id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(scope.wallet.as_str())
            .bind(scope.pool.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    /// Deactivated positions, most recently closed first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_inactive_positions(
        &self,
        scope: &StoreScope,
        limit: u32,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE wallet = ? AND pool = ? AND active = 0 \
             ORDER BY updated_at_ms DESC, id DESC LIMIT ?",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(scope.wallet.as_str())
            .bind(scope.pool.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    /// The active row for one bin, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_position(
        &self,
        scope: &StoreScope,
        bin_id: i32,
    ) -> Result<Option<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE wallet = ? AND pool = ? AND bin_id = ? AND active = 1",
            POSITION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(scope.wallet.as_str())
            .bind(scope.pool.as_str())
            .bind(bin_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(position_from_row))
    }
}

pub(super) async fn find_active_id(
    conn: &mut SqliteConnection,
    wallet: &str,
    pool: &str,
    bin_id: i32,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id FROM positions WHERE wallet = ? AND pool = ? AND bin_id = ? AND active = 1",
    )
    .bind(wallet)
    .bind(pool)
    .bind(bin_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get::<i64, _>("id")))
}

pub(super) async fn upsert(
    conn: &mut SqliteConnection,
    position: &NewPosition,
    now: TimeMs,
) -> Result<i64, sqlx::Error> {
    let existing = find_active_id(
        conn,
        position.wallet.as_str(),
        position.pool.as_str(),
        position.bin_id,
    )
    .await?;

    if let Some(id) = existing {
        set_amount(conn, id, position.amount, now).await?;
        return Ok(id);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO positions (wallet, pool, bin_id, amount, token_x, token_y, updated_at_ms, active)
        VALUES (?, ?, ?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(position.wallet.as_str())
    .bind(position.pool.as_str())
    .bind(position.bin_id)
    .bind(position.amount.to_canonical_string())
    .bind(position.token_x.as_str())
    .bind(position.token_y.as_str())
    .bind(now.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(super) async fn set_amount(
    conn: &mut SqliteConnection,
    id: i64,
    amount: Decimal,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE positions SET amount = ?, updated_at_ms = ? WHERE id = ? AND active = 1")
        .bind(amount.to_canonical_string())
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn deactivate(
    conn: &mut SqliteConnection,
    id: i64,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE positions SET amount = '0', active = 0, updated_at_ms = ? WHERE id = ?")
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn position_from_row(row: &SqliteRow) -> Position {
    let id: i64 = row.get("id");
    let amount_str: String = row.get("amount");
    let amount = Decimal::from_str(&amount_str).unwrap_or_else(|e| {
        warn!(
            position_id = id,
            amount = %amount_str,
            error = %e,
            "Failed to parse position amount decimal, using zero"
        );
        Decimal::zero()
    });

    Position {
        id,
        wallet: Address::new(row.get::<String, _>("wallet")),
        pool: Address::new(row.get::<String, _>("pool")),
        bin_id: row.get("bin_id"),
        amount,
        token_x: Address::new(row.get::<String, _>("token_x")),
        token_y: Address::new(row.get::<String, _>("token_y")),
        updated_at: TimeMs::new(row.get("updated_at_ms")),
        active: row.get::<i64, _>("active") != 0,
    }
}
