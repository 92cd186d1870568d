//! Signup and login gate
//!
//! Accounts live in the durable account table. Failed logins are counted per
//! account; reaching the configured threshold locks the account until the
//! lockout elapses. Expiry is evaluated lazily on the next login attempt.

mod password;
mod token;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::metrics;
use crate::store::AccountTable;

pub use password::{hash_password, verify_password, PasswordPolicy};
pub use token::{load_or_create_secret, Claims, SessionToken, TokenSigner};

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._@-]{1,64}$").expect("identity regex is valid"));

/// Verified against on logins for unknown identities, matching the argon2 cost
/// of a real check
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("corral-no-such-account").ok());

/// Reasons a signup or login is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    LockedOut { until: DateTime<Utc> },

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("User already exists")]
    UserExists,

    #[error("Account is waiting for administrator approval")]
    SignupPending,

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A user account as stored in the account table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub identity: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub failed_login_count: u32,
    #[serde(default)]
    pub lockout_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signup_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful signup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub identity: String,
    pub approved: bool,
    pub is_admin: bool,
}

pub struct AuthGate {
    config: AuthConfig,
    policy: PasswordPolicy,
    accounts: Arc<AccountTable>,
    signer: TokenSigner,
    /// Serializes counter/lockout updates per account
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuthGate {
    pub fn new(config: AuthConfig, accounts: Arc<AccountTable>, secret: &[u8]) -> Self {
        Self {
            policy: PasswordPolicy::from_config(&config),
            signer: TokenSigner::new(secret, config.token_expiration_seconds),
            config,
            accounts,
            locks: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(identity) {
            return lock.clone();
        }
        self.locks
            .write()
            .await
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Create an account
    pub async fn signup(&self, identity: &str, password: &str) -> Result<AccountCreated, AuthError> {
        if !IDENTITY_RE.is_match(identity) {
            return Err(AuthError::InvalidUsername(
                "use 1-64 letters, digits or ._@-".to_string(),
            ));
        }

        if self.accounts.contains(identity).await {
            return Err(AuthError::UserExists);
        }

        self.policy.check(password)?;

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;

        let is_admin = self.config.is_admin(identity);
        let account = UserAccount {
            identity: identity.to_string(),
            password_hash,
            is_admin,
            failed_login_count: 0,
            lockout_until: None,
            signup_approved: self.config.open_signup || is_admin,
            created_at: Utc::now(),
        };
        let approved = account.signup_approved;

        let inserted = self
            .accounts
            .insert_new(identity, account)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !inserted {
            return Err(AuthError::UserExists);
        }

        info!(identity = %identity, approved, is_admin, "Account created");
        metrics::record_signup(approved);

        Ok(AccountCreated {
            identity: identity.to_string(),
            approved,
            is_admin,
        })
    }

    /// Check credentials and issue a token
    pub async fn login(&self, identity: &str, password: &str) -> Result<SessionToken, AuthError> {
        self.login_at(identity, password, Utc::now()).await
    }

    pub(crate) async fn login_at(
        &self,
        identity: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, AuthError> {
        // only existing accounts get a lock entry
        if !self.accounts.contains(identity).await {
            return self.reject_unknown(password).await;
        }

        let lock = self.lock_for(identity).await;
        let _guard = lock.lock().await;

        let Some(mut account) = self.accounts.get(identity).await else {
            return self.reject_unknown(password).await;
        };

        if let Some(until) = account.lockout_until {
            if until > now {
                metrics::record_login("locked_out");
                return Err(AuthError::LockedOut { until });
            }
            // lockout elapsed: start counting afresh
            account.failed_login_count = 0;
            account.lockout_until = None;
        }

        let candidate = password.to_string();
        let hash = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&candidate, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if !matches {
            account.failed_login_count += 1;
            let result = if account.failed_login_count >= self.config.allowed_failed_logins {
                let until = now + self.config.lockout_duration();
                account.lockout_until = Some(until);
                warn!(
                    identity = %identity,
                    failed = account.failed_login_count,
                    until = %until,
                    "Account locked after repeated failed logins"
                );
                metrics::record_lockout();
                Err(AuthError::LockedOut { until })
            } else {
                metrics::record_login("invalid_credentials");
                Err(AuthError::InvalidCredentials)
            };
            self.save(account).await?;
            return result;
        }

        account.failed_login_count = 0;
        account.lockout_until = None;
        let approved = account.signup_approved;
        let is_admin = account.is_admin;
        self.save(account).await?;

        if !approved {
            metrics::record_login("pending");
            return Err(AuthError::SignupPending);
        }

        metrics::record_login("success");
        info!(identity = %identity, "Login succeeded");
        self.signer.issue(identity, is_admin)
    }

    async fn reject_unknown(&self, password: &str) -> Result<SessionToken, AuthError> {
        let candidate = password.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            DUMMY_HASH
                .as_deref()
                .map(|hash| verify_password(&candidate, hash))
        })
        .await;

        metrics::record_login("unknown_user");
        Err(AuthError::InvalidCredentials)
    }

    /// Mark an account as administrator. Idempotent.
    pub async fn elevate(&self, identity: &str) -> Result<(), AuthError> {
        self.update(identity, |account| {
            if account.is_admin {
                return false;
            }
            account.is_admin = true;
            true
        })
        .await?;
        info!(identity = %identity, "Account elevated to administrator");
        Ok(())
    }

    /// Approve a pending signup. Idempotent.
    pub async fn approve(&self, identity: &str) -> Result<(), AuthError> {
        self.update(identity, |account| {
            if account.signup_approved {
                return false;
            }
            account.signup_approved = true;
            true
        })
        .await?;
        info!(identity = %identity, "Account approved");
        Ok(())
    }

    /// Elevate and approve every configured admin identity that has an account
    pub async fn elevate_configured_admins(&self) -> Result<(), AuthError> {
        for identity in &self.config.admin_users {
            if !self.accounts.contains(identity).await {
                continue;
            }
            self.elevate(identity).await?;
            self.approve(identity).await?;
        }
        Ok(())
    }

    /// Validate a token previously issued by [`AuthGate::login`]
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.signer.verify(token)
    }

    pub async fn account(&self, identity: &str) -> Option<UserAccount> {
        self.accounts.get(identity).await
    }

    /// Apply `change` under the account lock, saving only if it reports a change
    async fn update<F>(&self, identity: &str, change: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut UserAccount) -> bool,
    {
        if !self.accounts.contains(identity).await {
            return Err(AuthError::UnknownUser(identity.to_string()));
        }

        let lock = self.lock_for(identity).await;
        let _guard = lock.lock().await;

        let mut account = self
            .accounts
            .get(identity)
            .await
            .ok_or_else(|| AuthError::UnknownUser(identity.to_string()))?;

        if change(&mut account) {
            self.save(account).await?;
        }
        Ok(())
    }

    async fn save(&self, account: UserAccount) -> Result<(), AuthError> {
        let identity = account.identity.clone();
        self.accounts
            .upsert(&identity, account)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret";

    async fn gate(config: AuthConfig) -> (Arc<AuthGate>, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let accounts = Arc::new(AccountTable::open(temp_dir.path(), "accounts.json").await.unwrap());
        (Arc::new(AuthGate::new(config, accounts, SECRET)), temp_dir)
    }

    fn open_config() -> AuthConfig {
        AuthConfig {
            open_signup: true,
            ..AuthConfig::default()
        }
    }

    #[tokio::test]
    async fn test_signup_rules() {
        let (gate, _dir) = gate(open_config()).await;

        assert!(matches!(
            gate.signup("alice", "short").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            gate.signup("alice", "password123").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            gate.signup("al ice", "correct horse").await,
            Err(AuthError::InvalidUsername(_))
        ));

        let created = gate.signup("alice", "correct horse").await.unwrap();
        assert!(created.approved);
        assert!(!created.is_admin);

        assert_eq!(
            gate.signup("alice", "another horse").await,
            Err(AuthError::UserExists)
        );
    }

    #[tokio::test]
    async fn test_closed_signup_requires_approval() {
        let config = AuthConfig {
            admin_users: vec!["root".to_string()],
            ..AuthConfig::default()
        };
        let (gate, _dir) = gate(config).await;

        let created = gate.signup("dave", "correct horse").await.unwrap();
        assert!(!created.approved);
        assert_eq!(
            gate.login("dave", "correct horse").await.unwrap_err(),
            AuthError::SignupPending
        );

        gate.approve("dave").await.unwrap();
        assert!(gate.login("dave", "correct horse").await.is_ok());

        // configured admins skip approval
        let admin = gate.signup("root", "correct horse").await.unwrap();
        assert!(admin.approved && admin.is_admin);
    }

    #[tokio::test]
    async fn test_lockout_scenario() {
        let (gate, _dir) = gate(open_config()).await;
        gate.signup("alice", "correct horse").await.unwrap();
        let now = Utc::now();

        assert_eq!(
            gate.login_at("alice", "wrong", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            gate.login_at("alice", "wrong", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        let until = match gate.login_at("alice", "wrong", now).await {
            Err(AuthError::LockedOut { until }) => until,
            other => panic!("expected lockout, got {:?}", other),
        };
        assert_eq!(until, now + Duration::minutes(15));

        // correct password is refused while locked, and does not move the lockout
        let later = now + Duration::minutes(5);
        assert_eq!(
            gate.login_at("alice", "correct horse", later).await.unwrap_err(),
            AuthError::LockedOut { until }
        );
        assert_eq!(
            gate.login_at("alice", "wrong", later).await.unwrap_err(),
            AuthError::LockedOut { until }
        );
        let account = gate.account("alice").await.unwrap();
        assert_eq!(account.failed_login_count, 3);
        assert_eq!(account.lockout_until, Some(until));

        let after = until + Duration::seconds(1);
        let token = gate.login_at("alice", "correct horse", after).await.unwrap();
        assert_eq!(gate.verify_token(&token.token).unwrap().sub, "alice");

        let account = gate.account("alice").await.unwrap();
        assert_eq!(account.failed_login_count, 0);
        assert_eq!(account.lockout_until, None);
    }

    #[tokio::test]
    async fn test_expired_lockout_counts_afresh() {
        let (gate, _dir) = gate(open_config()).await;
        gate.signup("erin", "correct horse").await.unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            let _ = gate.login_at("erin", "wrong", now).await;
        }

        let after = now + Duration::minutes(16);
        assert_eq!(
            gate.login_at("erin", "wrong", after).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(gate.account("erin").await.unwrap().failed_login_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let (gate, _dir) = gate(open_config()).await;
        gate.signup("frank", "correct horse").await.unwrap();

        let attempts: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.login("frank", "wrong").await })
            })
            .collect();
        for attempt in attempts {
            assert!(attempt.await.unwrap().is_err());
        }

        let account = gate.account("frank").await.unwrap();
        assert_eq!(account.failed_login_count, 3);
        assert!(account.lockout_until.is_some());
    }

    #[tokio::test]
    async fn test_unknown_user_and_elevate() {
        let (gate, _dir) = gate(open_config()).await;
        assert_eq!(
            gate.login("nobody", "whatever!").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            gate.elevate("nobody").await,
            Err(AuthError::UnknownUser(_))
        ));

        gate.signup("grace", "correct horse").await.unwrap();
        gate.elevate("grace").await.unwrap();
        gate.elevate("grace").await.unwrap();
        assert!(gate.account("grace").await.unwrap().is_admin);

        let token = gate.login("grace", "correct horse").await.unwrap();
        assert!(gate.verify_token(&token.token).unwrap().admin);
    }

    #[tokio::test]
    async fn test_unknown_identities_leave_no_lock_entries() {
        let (gate, _dir) = gate(open_config()).await;
        gate.signup("heidi", "correct horse").await.unwrap();

        for i in 0..50 {
            let identity = format!("ghost{}", i);
            assert_eq!(
                gate.login(&identity, "whatever!").await.unwrap_err(),
                AuthError::InvalidCredentials
            );
            assert!(gate.approve(&identity).await.is_err());
        }
        assert!(gate.locks.read().await.is_empty());

        let _ = gate.login("heidi", "wrong").await;
        let locks = gate.locks.read().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("heidi"));
    }

    #[test]
    fn test_dummy_hash_rejects_passwords() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(!verify_password("whatever!", hash));
    }
}
