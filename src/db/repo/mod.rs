//! Repository layer for the Position Store.
//!
//! Methods are organized across submodules by record kind:
//! - `positions.rs` - position rows (upsert, deactivate, lookups)
//! - `operations.rs` - append-only operation log
//!
//! The `record_*` methods here write an operation together with the position
//! rows it touched in a single transaction.

mod operations;
mod positions;

use crate::domain::{Decimal, NewOperation, NewPosition, TimeMs};
use sqlx::sqlite::SqlitePool;

pub use positions::StoreScope;

/// Post-transaction LP balance of a bin touched by a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRemainder {
    pub bin_id: i32,
    pub remaining: Decimal,
}

impl BinRemainder {
    pub fn emptied(bin_id: i32) -> Self {
        Self {
            bin_id,
            remaining: Decimal::zero(),
        }
    }
}

/// Repository for Position Store operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Append a withdrawal operation and apply the resulting balances.
    ///
    /// Bins whose remainder is zero are deactivated; the rest get their
    /// amount refreshed. Bins without a stored row are left alone.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written in that case.
    pub async fn record_withdrawal(
        &self,
        op: &NewOperation,
        remainders: &[BinRemainder],
    ) -> Result<i64, sqlx::Error> {
        let now = TimeMs::now();
        let mut tx = self.pool.begin().await?;

        let op_id = operations::insert_operation(&mut *tx, op, now).await?;
        for remainder in remainders {
            let existing = positions::find_active_id(
                &mut *tx,
                op.wallet.as_str(),
                op.pool.as_str(),
                remainder.bin_id,
            )
            .await?;
            let Some(id) = existing else { continue };
            if remainder.remaining.is_positive() {
                positions::set_amount(&mut *tx, id, remainder.remaining, now).await?;
            } else {
                positions::deactivate(&mut *tx, id, now).await?;
            }
        }

        tx.commit().await?;
        Ok(op_id)
    }

    /// Append a deposit operation and upsert the position it produced.
    ///
    /// `position` is `None` when the post-deposit LP balance could not be read;
    /// the next reconciliation picks the row up instead.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written in that case.
    pub async fn record_deposit(
        &self,
        op: &NewOperation,
        position: Option<&NewPosition>,
    ) -> Result<i64, sqlx::Error> {
        let now = TimeMs::now();
        let mut tx = self.pool.begin().await?;

        let op_id = operations::insert_operation(&mut *tx, op, now).await?;
        if let Some(position) = position.filter(|p| p.amount.is_positive()) {
            positions::upsert(&mut *tx, position, now).await?;
        }

        tx.commit().await?;
        Ok(op_id)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::{OperationType, TxHash};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_record_withdrawal_deactivates_and_refreshes() {
        let (repo, _temp) = setup_repo().await;
        repo.upsert_position(&new_position(99, "2")).await.unwrap();
        repo.upsert_position(&new_position(101, "3")).await.unwrap();

        let op = NewOperation::new(OperationType::RemoveAll, wallet(), pool(), TxHash::new("0xaa"))
            .with_note("Removed liquidity from bins: 99, 101");
        repo.record_withdrawal(
            &op,
            &[
                BinRemainder::emptied(99),
                BinRemainder {
                    bin_id: 101,
                    remaining: d("0.5"),
                },
                BinRemainder::emptied(250),
            ],
        )
        .await
        .unwrap();

        let scope = StoreScope::new(&wallet(), &pool());
        let active = repo.list_active_positions(&scope).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].bin_id, 101);
        assert_eq!(active[0].amount, d("0.5"));

        let ops = repo.list_operations(&wallet(), 10, None).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, OperationType::RemoveAll);
        assert_eq!(ops[0].bin_id, None);
    }

    #[tokio::test]
    async fn test_record_deposit_upserts_position() {
        let (repo, _temp) = setup_repo().await;
        let op = NewOperation::new(OperationType::Add, wallet(), pool(), TxHash::new("0xbb"))
            .with_bin(104)
            .with_amounts(d("1.5"), d("0"));

        repo.record_deposit(&op, Some(&new_position(104, "1.5")))
            .await
            .unwrap();
        repo.record_deposit(&op, Some(&new_position(104, "3")))
            .await
            .unwrap();

        let scope = StoreScope::new(&wallet(), &pool());
        let found = repo.find_position(&scope, 104).await.unwrap().unwrap();
        assert_eq!(found.amount, d("3"));
        assert_eq!(repo.list_active_positions(&scope).await.unwrap().len(), 1);
        assert_eq!(repo.list_operations(&wallet(), 10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_deposit_without_position_only_logs() {
        let (repo, _temp) = setup_repo().await;
        let op = NewOperation::new(OperationType::Add, wallet(), pool(), TxHash::new("0xcc"))
            .with_bin(104);

        repo.record_deposit(&op, None).await.unwrap();

        let scope = StoreScope::new(&wallet(), &pool());
        assert!(repo.list_active_positions(&scope).await.unwrap().is_empty());
        assert_eq!(repo.list_operations(&wallet(), 10, None).await.unwrap().len(), 1);
    }
}
