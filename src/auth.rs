//! Sign-up, password sign-in and session tracking.
//!
//! Session changes are published as [`SessionEvent`]s on a single channel;
//! the route guard is its only consumer.

use crate::config::AuthConfig;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::Role;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::mpsc::{channel, Receiver, Sender};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    /// Raw stored role string.
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(SessionUser),
    SignedOut,
    /// Result of re-reading the session; `None` means no session.
    Refreshed(Option<SessionUser>),
}

#[derive(Debug, Clone)]
struct ActiveSession {
    token_hash: String,
    user: SessionUser,
}

#[derive(Debug, Default)]
pub struct Auth {
    current: Option<ActiveSession>,
    listener: Option<Sender<SessionEvent>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub token: String,
    pub user: SessionUser,
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Other(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn new_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::bad_params("email is not valid"));
    }
    Ok(email)
}

fn load_session_user(conn: &Connection, user_id: &str) -> AppResult<Option<SessionUser>> {
    Ok(conn
        .query_row(
            "SELECT id, email, full_name, role FROM users WHERE id = ?",
            [user_id],
            |r| {
                Ok(SessionUser {
                    user_id: r.get(0)?,
                    email: r.get(1)?,
                    full_name: r.get(2)?,
                    role: r.get(3)?,
                })
            },
        )
        .optional()?)
}

impl Auth {
    /// Hands out the session-change receiver. A later call replaces the
    /// previous subscriber.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = channel();
        self.listener = Some(tx);
        rx
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(tx) = &self.listener {
            if tx.send(event).is_err() {
                log::debug!("session listener dropped");
            }
        }
    }

    pub fn current_user(&self) -> Option<&SessionUser> {
        self.current.as_ref().map(|s| &s.user)
    }

    /// Requires a signed-in user whose role is one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> AppResult<&SessionUser> {
        let user = self
            .current_user()
            .ok_or_else(|| AppError::Unauthorized("sign in first".into()))?;
        match Role::parse(&user.role) {
            Some(role) if roles.contains(&role) => Ok(user),
            _ => Err(AppError::Forbidden(format!(
                "role {} may not perform this action",
                user.role
            ))),
        }
    }

    /// Drops the in-memory session without touching storage, e.g. when the
    /// workspace changes.
    pub fn reset(&mut self) {
        if self.current.take().is_some() {
            self.publish(SessionEvent::SignedOut);
        }
    }

    /// Creates the account and signs it in. The first account in a workspace
    /// becomes `admin`; every later one starts `pending`.
    pub fn sign_up(
        &mut self,
        conn: &Connection,
        cfg: &AuthConfig,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> AppResult<SignedIn> {
        let email = normalize_email(email)?;
        if password.chars().count() < cfg.min_password_len {
            return Err(AppError::bad_params(format!(
                "password must be at least {} characters",
                cfg.min_password_len
            )));
        }
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::bad_params("fullName must not be empty"));
        }
        let taken = conn
            .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if taken {
            return Err(AppError::Conflict("email is already registered".into()));
        }
        let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        let role = if user_count == 0 { Role::Admin } else { Role::Pending };

        let user_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO users(id, email, full_name, password_hash, role, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &user_id,
                &email,
                full_name,
                hash_password(password)?,
                role.as_str(),
                db::now_timestamp(),
            ),
        )?;
        log::info!("registered user {} as {}", user_id, role.as_str());
        self.start_session(conn, &user_id)
    }

    pub fn sign_in_with_password(
        &mut self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> AppResult<SignedIn> {
        let email = normalize_email(email)?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE email = ?",
                [&email],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((user_id, hash)) = row else {
            return Err(AppError::Unauthorized("invalid email or password".into()));
        };
        if !verify_password(password, &hash) {
            log::info!("rejected sign-in for {}", user_id);
            return Err(AppError::Unauthorized("invalid email or password".into()));
        }
        self.start_session(conn, &user_id)
    }

    fn start_session(&mut self, conn: &Connection, user_id: &str) -> AppResult<SignedIn> {
        let user = load_session_user(conn, user_id)?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        let token = new_token();
        let hashed = token_hash(&token);
        conn.execute(
            "INSERT INTO sessions(token_hash, user_id, created_at) VALUES(?, ?, ?)",
            (&hashed, user_id, db::now_timestamp()),
        )?;
        self.current = Some(ActiveSession {
            token_hash: hashed,
            user: user.clone(),
        });
        log::info!("session started for {}", user_id);
        self.publish(SessionEvent::SignedIn(user.clone()));
        Ok(SignedIn { token, user })
    }

    pub fn sign_out(&mut self, conn: &Connection) -> AppResult<()> {
        if let Some(session) = self.current.take() {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?",
                [&session.token_hash],
            )?;
            log::info!("session ended for {}", session.user.user_id);
        }
        self.publish(SessionEvent::SignedOut);
        Ok(())
    }

    /// Returns the signed-in user with a freshly read role. A `token` from an
    /// earlier run restores that session when none is active.
    pub fn get_session(
        &mut self,
        conn: &Connection,
        token: Option<&str>,
    ) -> AppResult<Option<SessionUser>> {
        let token_hash = match (&self.current, token) {
            (_, Some(t)) => Some(token_hash(t)),
            (Some(s), None) => Some(s.token_hash.clone()),
            (None, None) => None,
        };
        let user = match &token_hash {
            Some(h) => {
                let user_id: Option<String> = conn
                    .query_row(
                        "SELECT user_id FROM sessions WHERE token_hash = ?",
                        [h],
                        |r| r.get(0),
                    )
                    .optional()?;
                match user_id {
                    Some(id) => load_session_user(conn, &id)?,
                    None => None,
                }
            }
            None => None,
        };
        self.current = match (&user, token_hash) {
            (Some(u), Some(h)) => Some(ActiveSession {
                token_hash: h,
                user: u.clone(),
            }),
            _ => None,
        };
        self.publish(SessionEvent::Refreshed(user.clone()));
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("memory db");
        db::init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn first_user_is_admin_then_pending() {
        let conn = conn();
        let cfg = AuthConfig::default();
        let mut auth = Auth::default();
        let first = auth
            .sign_up(&conn, &cfg, "Admin@School.test", "secret1", "Ada Admin")
            .expect("first");
        assert_eq!(first.user.role, "admin");
        assert_eq!(first.user.email, "admin@school.test");
        let second = auth
            .sign_up(&conn, &cfg, "t@school.test", "secret2", "Tom Teacher")
            .expect("second");
        assert_eq!(second.user.role, "pending");
    }

    #[test]
    fn duplicate_email_and_short_password_are_rejected() {
        let conn = conn();
        let cfg = AuthConfig::default();
        let mut auth = Auth::default();
        auth.sign_up(&conn, &cfg, "a@school.test", "secret1", "A").expect("first");
        let dup = auth
            .sign_up(&conn, &cfg, "A@school.test", "secret1", "A")
            .expect_err("dup");
        assert_eq!(dup.code(), "conflict");
        let short = auth
            .sign_up(&conn, &cfg, "b@school.test", "123", "B")
            .expect_err("short");
        assert_eq!(short.code(), "bad_params");
    }

    #[test]
    fn sign_in_checks_password_and_events_reach_subscriber() {
        let conn = conn();
        let cfg = AuthConfig::default();
        let mut auth = Auth::default();
        let rx = auth.subscribe();
        auth.sign_up(&conn, &cfg, "a@school.test", "secret1", "A").expect("sign up");
        auth.sign_out(&conn).expect("sign out");
        assert!(auth.current_user().is_none());

        let bad = auth
            .sign_in_with_password(&conn, "a@school.test", "wrong-pass")
            .expect_err("bad password");
        assert_eq!(bad.code(), "unauthorized");
        auth.sign_in_with_password(&conn, "a@school.test", "secret1")
            .expect("sign in");

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], SessionEvent::SignedIn(_)));
        assert_eq!(events[1], SessionEvent::SignedOut);
        assert!(matches!(events[2], SessionEvent::SignedIn(_)));
    }

    #[test]
    fn token_restores_session_and_sign_out_revokes_it() {
        let conn = conn();
        let cfg = AuthConfig::default();
        let mut auth = Auth::default();
        let signed = auth.sign_up(&conn, &cfg, "a@school.test", "secret1", "A").expect("sign up");

        let mut fresh = Auth::default();
        let restored = fresh.get_session(&conn, Some(&signed.token)).expect("restore");
        assert_eq!(restored.map(|u| u.user_id), Some(signed.user.user_id.clone()));

        fresh.sign_out(&conn).expect("sign out");
        let mut third = Auth::default();
        assert!(third.get_session(&conn, Some(&signed.token)).expect("lookup").is_none());
    }

    #[test]
    fn only_hashes_of_tokens_are_stored() {
        let conn = conn();
        let mut auth = Auth::default();
        let signed = auth
            .sign_up(&conn, &AuthConfig::default(), "a@school.test", "secret1", "A")
            .expect("sign up");
        let stored: String = conn
            .query_row("SELECT token_hash FROM sessions", [], |r| r.get(0))
            .expect("session row");
        assert_ne!(stored, signed.token);
        assert_eq!(stored, token_hash(&signed.token));
    }
}
