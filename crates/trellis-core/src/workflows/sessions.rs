//! Login sessions.
//!
//! Session IDs are `<user_id>,<random token>`; the user prefix keeps tokens
//! from colliding across users. A session expires after
//! `session_max_idle_secs` without a visit or `session_max_age_secs` after
//! creation, whichever comes first.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock;
use crate::error::Result;
use crate::row;
use crate::store::schema::SESSIONS;
use crate::store::{get_i64, get_str, with_transaction, Row, StoreContext, StoreError};
use crate::token;
use crate::workflows::credentials::{record_auth_event, window_start, AuthEvent};
use trellis_config::SecurityConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub creation_date: String,
    pub last_visit: String,
}

impl Session {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = SESSIONS.name;
        Ok(Self {
            session_id: get_str(row, table, "session_id")?,
            user_id: get_i64(row, table, "user_id")?,
            creation_date: get_str(row, table, "creation_date")?,
            last_visit: get_str(row, table, "last_visit")?,
        })
    }

    pub fn is_valid(&self, security: &SecurityConfig) -> bool {
        self.is_valid_at(clock::now(), security)
    }

    /// Validity at a given instant. Unparseable timestamps are never valid.
    pub fn is_valid_at(&self, at: DateTime<Utc>, security: &SecurityConfig) -> bool {
        let (Some(created), Some(last_visit)) = (
            clock::parse_timestamp(&self.creation_date),
            clock::parse_timestamp(&self.last_visit),
        ) else {
            return false;
        };
        (at - last_visit).num_seconds() < security.session_max_idle_secs
            && (at - created).num_seconds() < security.session_max_age_secs
    }
}

fn new_session_id(user_id: i64, token_len: usize) -> String {
    format!("{},{}", user_id, token::random_url_safe(token_len))
}

pub fn create_session(ctx: &StoreContext<'_>, user_id: i64) -> Result<Session> {
    let created = clock::timestamp_now();
    let session = Session {
        session_id: new_session_id(user_id, ctx.security.session_token_len),
        user_id,
        creation_date: created.clone(),
        last_visit: created,
    };
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.insert(
            &SESSIONS,
            &row! {
                "session_id" => session.session_id.as_str(),
                "user_id" => user_id,
                "creation_date" => session.creation_date.as_str(),
                "last_visit" => session.last_visit.as_str(),
            },
        )?;
        record_auth_event(ctx, user_id, AuthEvent::SessionCreated, &session.creation_date)?;
        Ok(())
    })?;
    debug!(user_id, "Session created");
    Ok(session)
}

pub fn get_session(ctx: &StoreContext<'_>, session_id: &str) -> Result<Option<Session>> {
    let rows = ctx
        .relational
        .select(SESSIONS.name, &row! { "session_id" => session_id }, None)?;
    Ok(rows.first().map(Session::from_row).transpose()?)
}

/// Record a visit now.
pub fn touch_session(ctx: &StoreContext<'_>, session: &mut Session) -> Result<()> {
    let now = clock::timestamp_now();
    ctx.relational.update(
        SESSIONS.name,
        &row! { "session_id" => session.session_id.as_str() },
        &row! { "last_visit" => now.as_str() },
    )?;
    session.last_visit = now;
    Ok(())
}

pub fn kill_session(ctx: &StoreContext<'_>, session: Session) -> Result<()> {
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.delete(
            SESSIONS.name,
            &row! { "session_id" => session.session_id.as_str() },
        )?;
        record_auth_event(ctx, session.user_id, AuthEvent::SessionKilled, &clock::timestamp_now())?;
        Ok(())
    })?;
    debug!(user_id = session.user_id, "Session killed");
    Ok(())
}

/// Kill every session of a user; returns how many were removed.
pub fn kill_sessions_for_user(ctx: &StoreContext<'_>, user_id: i64) -> Result<usize> {
    let killed = with_transaction(ctx.relational, || -> Result<usize> {
        let killed = ctx
            .relational
            .delete(SESSIONS.name, &row! { "user_id" => user_id })?;
        record_auth_event(ctx, user_id, AuthEvent::SessionKilled, &clock::timestamp_now())?;
        Ok(killed)
    })?;
    debug!(user_id, killed, "Sessions killed for user");
    Ok(killed)
}

/// Replace all of a user's sessions with a fresh one.
pub fn force_create_session(ctx: &StoreContext<'_>, user_id: i64) -> Result<Session> {
    kill_sessions_for_user(ctx, user_id)?;
    create_session(ctx, user_id)
}

/// Delete sessions older than twice the maximum age, recording a
/// `session_cleaned` event for each.
pub fn cleanup_old_sessions(ctx: &StoreContext<'_>) -> Result<usize> {
    let now = clock::now();
    let cutoff = window_start(
        now,
        "session_max_age_secs",
        ctx.security.session_max_age_secs,
        2,
    )?;
    let params = row! { "cutoff" => cutoff };
    let stale = ctx.relational.query(
        "SELECT * FROM sessions WHERE creation_date < :cutoff",
        &params,
    )?;
    if stale.is_empty() {
        return Ok(0);
    }

    let stamp = clock::to_timestamp(now);
    let removed = with_transaction(ctx.relational, || -> Result<usize> {
        for row in &stale {
            let session = Session::from_row(row)?;
            record_auth_event(ctx, session.user_id, AuthEvent::SessionCleaned, &stamp)?;
        }
        Ok(ctx
            .relational
            .execute("DELETE FROM sessions WHERE creation_date < :cutoff", &params)?)
    })?;
    info!(removed, "Cleaned up old sessions");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::workflows::credentials::auth_events_for_user;
    use chrono::Duration;

    fn session_at(created: DateTime<Utc>, last_visit: DateTime<Utc>) -> Session {
        Session {
            session_id: "1,abc".to_string(),
            user_id: 1,
            creation_date: clock::to_timestamp(created),
            last_visit: clock::to_timestamp(last_visit),
        }
    }

    #[test]
    fn test_validity_windows() {
        let security = SecurityConfig::default();
        let start = clock::now();
        let session = session_at(start, start);

        assert!(session.is_valid_at(start + Duration::seconds(10), &security));
        // Idle too long
        assert!(!session.is_valid_at(start + Duration::seconds(3600), &security));

        // Active but too old
        let busy = session_at(start, start + Duration::seconds(43_000));
        assert!(busy.is_valid_at(start + Duration::seconds(43_100), &security));
        assert!(!busy.is_valid_at(start + Duration::seconds(43_200), &security));
    }

    #[test]
    fn test_garbage_timestamps_are_invalid() {
        let mut session = session_at(clock::now(), clock::now());
        session.last_visit = "never".to_string();
        assert!(!session.is_valid(&SecurityConfig::default()));
    }

    #[test]
    fn test_session_lifecycle_is_audited() {
        let fx = Fixture::new();
        let ctx = fx.ctx();

        let mut session = create_session(&ctx, 42).unwrap();
        assert!(session.session_id.starts_with("42,"));
        assert_eq!(session.session_id.len(), "42,".len() + 40);
        assert!(session.is_valid(&fx.security));

        touch_session(&ctx, &mut session).unwrap();
        assert_eq!(get_session(&ctx, &session.session_id).unwrap(), Some(session.clone()));

        let id = session.session_id.clone();
        kill_session(&ctx, session).unwrap();
        assert_eq!(get_session(&ctx, &id).unwrap(), None);

        let events: Vec<String> = auth_events_for_user(&ctx, 42)
            .unwrap()
            .into_iter()
            .map(|e| e.auth_event)
            .collect();
        assert!(events.contains(&"session_created".to_string()));
        assert!(events.contains(&"session_killed".to_string()));
    }

    #[test]
    fn test_force_create_replaces_sessions() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let first = create_session(&ctx, 5).unwrap();
        let second = create_session(&ctx, 5).unwrap();

        let fresh = force_create_session(&ctx, 5).unwrap();
        assert_eq!(get_session(&ctx, &first.session_id).unwrap(), None);
        assert_eq!(get_session(&ctx, &second.session_id).unwrap(), None);
        assert!(get_session(&ctx, &fresh.session_id).unwrap().is_some());
    }

    #[test]
    fn test_cleanup_removes_only_ancient_sessions() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let current = create_session(&ctx, 9).unwrap();

        let ancient = clock::timestamp_before(clock::now(), fx.security.session_max_age_secs * 3)
            .unwrap();
        ctx.relational
            .insert(
                &SESSIONS,
                &row! {
                    "session_id" => "9,ancient",
                    "user_id" => 9,
                    "creation_date" => ancient.as_str(),
                    "last_visit" => ancient.as_str(),
                },
            )
            .unwrap();

        assert_eq!(cleanup_old_sessions(&ctx).unwrap(), 1);
        assert!(get_session(&ctx, "9,ancient").unwrap().is_none());
        assert!(get_session(&ctx, &current.session_id).unwrap().is_some());
        assert!(auth_events_for_user(&ctx, 9)
            .unwrap()
            .iter()
            .any(|e| e.auth_event == "session_cleaned"));
        assert_eq!(cleanup_old_sessions(&ctx).unwrap(), 0);
    }
}
