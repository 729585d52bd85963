//! User registration and bootstrap
//!
//! Password hashing lives in the authentication layer; the core stores the
//! digest it is handed. Role and status administration are out of scope, so
//! the only mutations here are registration and the idempotent admin seed.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use crate::config::AdminSeedConfig;
use crate::db::models::{DbUser, DbWallet};
use crate::db::queries::{UserQueries, WalletQueries};
use crate::db::Database;
use crate::error::{map_db_conflict, CoreError, CoreResult};
use crate::services::wallet::Ledger;
use crate::types::{TxKind, UserRole};

/// Reject callers whose account is inactive.
pub fn ensure_active(user: &DbUser) -> CoreResult<()> {
    if !user.is_active {
        return Err(CoreError::Unauthorized("account is deactivated".into()));
    }
    Ok(())
}

/// Reject callers without the admin role.
pub fn ensure_admin(user: &DbUser) -> CoreResult<()> {
    ensure_active(user)?;
    if user.role != UserRole::Admin {
        return Err(CoreError::Forbidden("administrator role required".into()));
    }
    Ok(())
}

pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a user and their wallet in one transaction.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password_digest: &str,
    ) -> CoreResult<(DbUser, DbWallet)> {
        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open registration transaction")?;

        let user = UserQueries::create(&txn, email, username, password_digest, UserRole::User)
            .await
            .map_err(|e| map_db_conflict(e, "email or username already registered"))?;
        let wallet = WalletQueries::create(&txn, user.id).await?;

        txn.commit().await.context("commit registration")?;

        info!(user_id = %user.id, %username, "user registered");
        Ok((user, wallet))
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<DbUser> {
        let conn = self.db.acquire().await?;
        UserQueries::get(&conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    /// Seed the configured administrator, applying the optional bootstrap
    /// credit exactly once. Re-running against an existing admin is a no-op.
    pub async fn bootstrap_admin(&self, seed: &AdminSeedConfig) -> CoreResult<DbUser> {
        let mut conn = self.db.acquire().await?;

        if let Some(existing) = UserQueries::get_by_email(&conn, &seed.email).await? {
            return Ok(existing);
        }

        let txn = conn
            .transaction()
            .await
            .context("open admin bootstrap transaction")?;
        let admin = UserQueries::create(
            &txn,
            &seed.email,
            &seed.username,
            &seed.password_digest,
            UserRole::Admin,
        )
        .await
        .map_err(|e| map_db_conflict(e, "admin seed collides with an existing account"))?;
        let wallet = WalletQueries::create(&txn, admin.id).await?;

        if let Some(credit) = seed.bootstrap_credit {
            Ledger::credit(&txn, &wallet, credit, TxKind::Deposit, None, "bootstrap credit")
                .await?;
        }

        txn.commit().await.context("commit admin bootstrap")?;

        info!(admin_id = %admin.id, email = %seed.email, "admin account seeded");
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: UserRole, is_active: bool) -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            email: "trader@example.com".into(),
            username: "trader".into(),
            password_digest: "digest".into(),
            role,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn active_user_passes() {
        assert!(ensure_active(&user(UserRole::User, true)).is_ok());
    }

    #[test]
    fn inactive_user_is_unauthorized() {
        let err = ensure_active(&user(UserRole::User, false)).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn non_admin_is_forbidden() {
        let err = ensure_admin(&user(UserRole::User, true)).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(ensure_admin(&user(UserRole::Admin, true)).is_ok());
    }

    #[test]
    fn inactive_admin_is_unauthorized_before_forbidden() {
        let err = ensure_admin(&user(UserRole::Admin, false)).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
