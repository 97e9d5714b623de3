//! Password hashing and audited credential checks.
//!
//! Hashes are Argon2id in PHC string form. Every audited check records an
//! auth event; a user with too many failures inside the rolling window is
//! refused before the password is even looked at.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock;
use crate::error::Result;
use crate::row;
use crate::store::schema::AUTH_EVENTS;
use crate::store::{get_i64, get_str, Row, StoreContext, StoreError};
use crate::workflows::users::User;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("user_id {user_id} has entered too many bad passwords")]
    TooManyRecentFailures { user_id: i64 },

    #[error("failed to hash password: {0}")]
    Hashing(String),

    #[error("{setting} = {value} does not give a usable time window")]
    WindowOutOfRange { setting: &'static str, value: i64 },
}

/// Stored form of `now - amount * unit_secs`, for a configured positive window.
pub(crate) fn window_start(
    now: chrono::DateTime<chrono::Utc>,
    setting: &'static str,
    amount: i64,
    unit_secs: i64,
) -> std::result::Result<String, CredentialError> {
    let out_of_range = || CredentialError::WindowOutOfRange {
        setting,
        value: amount,
    };
    if amount <= 0 {
        return Err(out_of_range());
    }
    let seconds = amount.checked_mul(unit_secs).ok_or_else(out_of_range)?;
    clock::timestamp_before(now, seconds).ok_or_else(out_of_range)
}

/// Kinds of entries in the auth event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SessionCreated,
    SessionKilled,
    SessionCleaned,
    PasswordCheckSuccess,
    PasswordCheckFail,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SessionCreated => "session_created",
            AuthEvent::SessionKilled => "session_killed",
            AuthEvent::SessionCleaned => "session_cleaned",
            AuthEvent::PasswordCheckSuccess => "password_check_success",
            AuthEvent::PasswordCheckFail => "password_check_fail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            AuthEvent::SessionCreated,
            AuthEvent::SessionKilled,
            AuthEvent::SessionCleaned,
            AuthEvent::PasswordCheckSuccess,
            AuthEvent::PasswordCheckFail,
        ]
        .into_iter()
        .find(|e| e.as_str() == value)
    }
}

/// One row of the auth event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEventEntry {
    pub auth_event_id: i64,
    pub user_id: i64,
    pub auth_event: String,
    pub auth_event_date: String,
}

impl AuthEventEntry {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = AUTH_EVENTS.name;
        Ok(Self {
            auth_event_id: get_i64(row, table, "auth_event_id")?,
            user_id: get_i64(row, table, "user_id")?,
            auth_event: get_str(row, table, "auth_event")?,
            auth_event_date: get_str(row, table, "auth_event_date")?,
        })
    }
}

pub fn hash_password(password: &str) -> std::result::Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hashing(e.to_string()))
}

/// An unparseable stored hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Unaudited comparison against the user's stored hash.
pub fn check_password(user: &User, password: &str) -> bool {
    verify_password(password, &user.encrypted_password)
}

pub fn record_auth_event(
    ctx: &StoreContext<'_>,
    user_id: i64,
    event: AuthEvent,
    at: &str,
) -> std::result::Result<i64, StoreError> {
    ctx.relational.insert(
        &AUTH_EVENTS,
        &row! {
            "user_id" => user_id,
            "auth_event" => event.as_str(),
            "auth_event_date" => at,
        },
    )
}

/// Newest first.
pub fn auth_events_for_user(ctx: &StoreContext<'_>, user_id: i64) -> Result<Vec<AuthEventEntry>> {
    let rows = ctx.relational.select(
        AUTH_EVENTS.name,
        &row! { "user_id" => user_id },
        Some("auth_event_date desc"),
    )?;
    Ok(rows
        .iter()
        .map(AuthEventEntry::from_row)
        .collect::<std::result::Result<Vec<_>, StoreError>>()?)
}

/// Failed checks recorded for `user_id` inside the configured window.
pub fn recent_failure_count(ctx: &StoreContext<'_>, user_id: i64) -> Result<i64> {
    let window_start = window_start(
        clock::now(),
        "password_check_window_mins",
        ctx.security.password_check_window_mins,
        60,
    )?;
    let rows = ctx.relational.query(
        "SELECT COUNT(auth_event_id) AS recent_fail_count FROM auth_events \
         WHERE user_id = :user_id AND auth_event = :auth_event \
         AND auth_event_date >= :window_start",
        &row! {
            "user_id" => user_id,
            "auth_event" => AuthEvent::PasswordCheckFail.as_str(),
            "window_start" => window_start,
        },
    )?;
    Ok(rows
        .first()
        .and_then(|r| r.get("recent_fail_count"))
        .and_then(Value::as_i64)
        .unwrap_or(0))
}

/// Whether the user is still below the failure limit.
pub fn can_check_password(ctx: &StoreContext<'_>, user: &User) -> Result<bool> {
    let failures = recent_failure_count(ctx, user.user_id)?;
    Ok(failures < i64::from(ctx.security.password_check_max_failures))
}

/// Check a password and record the outcome.
///
/// Over the failure limit nothing is checked or recorded: the call raises
/// [`CredentialError::TooManyRecentFailures`], or returns `false` when
/// `raise_on_lockout` is off.
pub fn check_password_audited(
    ctx: &StoreContext<'_>,
    user: &User,
    password: &str,
    raise_on_lockout: bool,
) -> Result<bool> {
    if !can_check_password(ctx, user)? {
        warn!(user_id = user.user_id, "Password check refused, too many recent failures");
        if raise_on_lockout {
            return Err(CredentialError::TooManyRecentFailures {
                user_id: user.user_id,
            }
            .into());
        }
        return Ok(false);
    }

    let matched = check_password(user, password);
    let event = if matched {
        AuthEvent::PasswordCheckSuccess
    } else {
        AuthEvent::PasswordCheckFail
    };
    record_auth_event(ctx, user.user_id, event, &clock::timestamp_now())?;
    debug!(user_id = user.user_id, event = event.as_str(), "Password checked");
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse-battery-staple", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_password("password", "not-a-valid-hash"));
    }

    #[test]
    fn test_window_start_rejects_unusable_windows() {
        let now = clock::now();
        for mins in [0, -10, 200_000_000_000_000, i64::MAX] {
            let err = window_start(now, "password_check_window_mins", mins, 60).unwrap_err();
            assert!(matches!(
                err,
                CredentialError::WindowOutOfRange { value, .. } if value == mins
            ));
        }
        let start = window_start(now, "password_check_window_mins", 10, 60).unwrap();
        assert!(start < clock::to_timestamp(now));
    }

    #[test]
    fn test_auth_event_names() {
        assert_eq!(AuthEvent::PasswordCheckFail.as_str(), "password_check_fail");
        assert_eq!(AuthEvent::parse("session_cleaned"), Some(AuthEvent::SessionCleaned));
        assert_eq!(AuthEvent::parse("logged_in"), None);
    }
}
