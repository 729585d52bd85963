//! Wallet ledger: balance mutation with an append-only transaction chain
//!
//! Every balance change goes through [`Ledger::credit`] or [`Ledger::debit`],
//! which write the new balance and append a `WalletTransaction` carrying
//! `balance_before`/`balance_after` in the same database transaction. The
//! chain of those pairs across a wallet, ordered by (created_at, seq), is a
//! contiguous sum; `verify_chain` audits it.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{DbUser, DbWallet, DbWalletTransaction};
use crate::db::queries::WalletQueries;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::pricing::OUTPUT_DP;
use crate::services::users::ensure_admin;
use crate::types::{Page, TxKind};

/// Transaction-scoped ledger primitives.
///
/// Callers hold the wallet row lock and an open transaction; the primitives
/// only compute and write.
pub struct Ledger;

impl Ledger {
    /// Credit `amount` to the wallet and append the ledger entry.
    pub async fn credit<C: deadpool_postgres::GenericClient>(
        conn: &C,
        wallet: &DbWallet,
        amount: Decimal,
        kind: TxKind,
        reference_id: Option<Uuid>,
        description: &str,
    ) -> CoreResult<DbWalletTransaction> {
        let amount = amount.round_dp(OUTPUT_DP);
        let balance_before = wallet.balance;
        let balance_after = balance_before + amount;

        WalletQueries::set_balance(conn, wallet.id, balance_after).await?;
        let tx = WalletQueries::append_transaction(
            conn,
            wallet.id,
            kind,
            amount,
            balance_before,
            balance_after,
            description,
            reference_id,
        )
        .await?;

        Ok(tx)
    }

    /// Debit `amount` from the wallet, failing if the balance would go
    /// negative, and append the ledger entry with a signed (negative) amount.
    pub async fn debit<C: deadpool_postgres::GenericClient>(
        conn: &C,
        wallet: &DbWallet,
        amount: Decimal,
        kind: TxKind,
        reference_id: Option<Uuid>,
        description: &str,
    ) -> CoreResult<DbWalletTransaction> {
        let amount = amount.round_dp(OUTPUT_DP);
        let balance_before = wallet.balance;
        let balance_after = balance_before - amount;
        if balance_after < Decimal::ZERO {
            return Err(CoreError::InsufficientFunds {
                required: amount,
                available: balance_before,
            });
        }

        WalletQueries::set_balance(conn, wallet.id, balance_after).await?;
        let tx = WalletQueries::append_transaction(
            conn,
            wallet.id,
            kind,
            -amount,
            balance_before,
            balance_after,
            description,
            reference_id,
        )
        .await?;

        Ok(tx)
    }

    /// Debit the fee-inclusive cost of a buy.
    pub async fn deduct_for_trade<C: deadpool_postgres::GenericClient>(
        conn: &C,
        wallet: &DbWallet,
        amount: Decimal,
        market_id: Uuid,
    ) -> CoreResult<DbWalletTransaction> {
        Self::debit(
            conn,
            wallet,
            amount,
            TxKind::Trade,
            Some(market_id),
            &format!("trade debit on market {market_id}"),
        )
        .await
    }

    /// Credit the net proceeds of a sell.
    pub async fn add_from_trade<C: deadpool_postgres::GenericClient>(
        conn: &C,
        wallet: &DbWallet,
        amount: Decimal,
        market_id: Uuid,
    ) -> CoreResult<DbWalletTransaction> {
        Self::credit(
            conn,
            wallet,
            amount,
            TxKind::Trade,
            Some(market_id),
            &format!("trade credit on market {market_id}"),
        )
        .await
    }

    /// Credit the payout of a winning position at resolution.
    pub async fn settle_position<C: deadpool_postgres::GenericClient>(
        conn: &C,
        wallet: &DbWallet,
        amount: Decimal,
        market_id: Uuid,
    ) -> CoreResult<DbWalletTransaction> {
        Self::credit(
            conn,
            wallet,
            amount,
            TxKind::Settlement,
            Some(market_id),
            &format!("settlement payout on market {market_id}"),
        )
        .await
    }
}

/// A break in a wallet's ledger chain found by the self-audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChainViolation {
    /// balance_after != balance_before + amount on one entry
    Arithmetic { seq: i64 },
    /// balance_before does not continue the previous entry's balance_after
    BrokenLink { seq: i64 },
    /// The wallet balance does not equal the last entry's balance_after
    BalanceMismatch { expected: Decimal, actual: Decimal },
}

/// Audit a wallet's ledger: per-entry arithmetic, link contiguity, and the
/// final balance. Entries must be in (created_at, seq) order.
pub fn verify_chain(
    transactions: &[DbWalletTransaction],
    current_balance: Decimal,
) -> Vec<ChainViolation> {
    let mut violations = Vec::new();

    let mut previous_after: Option<Decimal> = None;
    for tx in transactions {
        if tx.balance_after != tx.balance_before + tx.amount {
            violations.push(ChainViolation::Arithmetic { seq: tx.seq });
        }
        if let Some(previous) = previous_after {
            if tx.balance_before != previous {
                violations.push(ChainViolation::BrokenLink { seq: tx.seq });
            }
        }
        previous_after = Some(tx.balance_after);
    }

    let expected = previous_after.unwrap_or(Decimal::ZERO);
    if expected != current_balance {
        violations.push(ChainViolation::BalanceMismatch {
            expected,
            actual: current_balance,
        });
    }

    violations
}

/// Wallet operations exposed to the request layer.
pub struct WalletService {
    db: Arc<Database>,
}

impl WalletService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn get_by_user(&self, user_id: Uuid) -> CoreResult<DbWallet> {
        let conn = self.db.acquire().await?;
        WalletQueries::get_by_user(&conn, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("wallet for user {user_id}")))
    }

    /// Credit external funds into the user's wallet.
    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<DbWalletTransaction> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(
                "deposit amount must be positive".into(),
            ));
        }

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open deposit transaction")?;
        let wallet = WalletQueries::lock_by_user(&txn, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("wallet for user {user_id}")))?;
        let tx = Ledger::credit(&txn, &wallet, amount, TxKind::Deposit, None, "deposit").await?;
        txn.commit().await.context("commit deposit")?;

        info!(wallet_id = %wallet.id, %amount, "deposit credited");
        Ok(tx)
    }

    /// Withdraw funds; the full balance may be withdrawn, leaving zero.
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<DbWalletTransaction> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(
                "withdrawal amount must be positive".into(),
            ));
        }

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open withdrawal transaction")?;
        let wallet = WalletQueries::lock_by_user(&txn, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("wallet for user {user_id}")))?;
        let tx = Ledger::debit(&txn, &wallet, amount, TxKind::Withdraw, None, "withdrawal").await?;
        txn.commit().await.context("commit withdrawal")?;

        info!(wallet_id = %wallet.id, %amount, "withdrawal debited");
        Ok(tx)
    }

    /// Administrative wallet credit.
    pub async fn admin_credit(
        &self,
        actor: &DbUser,
        wallet_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> CoreResult<DbWalletTransaction> {
        ensure_admin(actor)?;
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(
                "credit amount must be positive".into(),
            ));
        }

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open admin credit transaction")?;
        let wallet = WalletQueries::lock(&txn, wallet_id)
            .await?
            .ok_or_else(|| CoreError::not_found("wallet", wallet_id))?;
        let tx = Ledger::credit(&txn, &wallet, amount, TxKind::Deposit, None, description).await?;
        txn.commit().await.context("commit admin credit")?;

        info!(admin = %actor.id, wallet_id = %wallet.id, %amount, "admin credit applied");
        Ok(tx)
    }

    /// A user's ledger entries, newest first.
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> CoreResult<Vec<DbWalletTransaction>> {
        let conn = self.db.acquire().await?;
        let wallet = WalletQueries::get_by_user(&conn, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("wallet for user {user_id}")))?;
        let txs =
            WalletQueries::list_transactions(&conn, wallet.id, page.limit(), page.offset()).await?;
        Ok(txs)
    }

    /// All wallets, for the admin surface.
    pub async fn list(&self, actor: &DbUser, page: Page) -> CoreResult<Vec<DbWallet>> {
        ensure_admin(actor)?;
        let conn = self.db.acquire().await?;
        let wallets = WalletQueries::list(&conn, page.limit(), page.offset()).await?;
        Ok(wallets)
    }

    /// Self-audit of one wallet's ledger chain.
    pub async fn audit(&self, wallet_id: Uuid) -> CoreResult<Vec<ChainViolation>> {
        let conn = self.db.acquire().await?;
        let wallet = WalletQueries::get(&conn, wallet_id)
            .await?
            .ok_or_else(|| CoreError::not_found("wallet", wallet_id))?;
        let chain = WalletQueries::chain(&conn, wallet_id).await?;
        Ok(verify_chain(&chain, wallet.balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tx(
        seq: i64,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
    ) -> DbWalletTransaction {
        DbWalletTransaction {
            id: Uuid::new_v4(),
            seq,
            wallet_id: Uuid::new_v4(),
            kind: if amount >= Decimal::ZERO {
                TxKind::Deposit
            } else {
                TxKind::Withdraw
            },
            amount,
            balance_before,
            balance_after,
            description: String::new(),
            reference_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn contiguous_chain_passes() {
        let chain = vec![
            tx(1, dec!(100), dec!(0), dec!(100)),
            tx(2, dec!(-40), dec!(100), dec!(60)),
            tx(3, dec!(25), dec!(60), dec!(85)),
        ];
        assert!(verify_chain(&chain, dec!(85)).is_empty());
    }

    #[test]
    fn empty_chain_requires_zero_balance() {
        assert!(verify_chain(&[], dec!(0)).is_empty());
        assert_eq!(
            verify_chain(&[], dec!(5)),
            vec![ChainViolation::BalanceMismatch {
                expected: dec!(0),
                actual: dec!(5),
            }]
        );
    }

    #[test]
    fn detects_arithmetic_violation() {
        let chain = vec![tx(1, dec!(100), dec!(0), dec!(99))];
        let violations = verify_chain(&chain, dec!(99));
        assert_eq!(violations, vec![ChainViolation::Arithmetic { seq: 1 }]);
    }

    #[test]
    fn detects_broken_link() {
        let chain = vec![
            tx(1, dec!(100), dec!(0), dec!(100)),
            tx(2, dec!(-10), dec!(90), dec!(80)),
        ];
        let violations = verify_chain(&chain, dec!(80));
        assert_eq!(violations, vec![ChainViolation::BrokenLink { seq: 2 }]);
    }

    #[test]
    fn detects_final_balance_mismatch() {
        let chain = vec![tx(1, dec!(100), dec!(0), dec!(100))];
        let violations = verify_chain(&chain, dec!(90));
        assert_eq!(
            violations,
            vec![ChainViolation::BalanceMismatch {
                expected: dec!(100),
                actual: dec!(90),
            }]
        );
    }
}
