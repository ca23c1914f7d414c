//! Role-gated route resolution.
//!
//! The guard starts in `Loading` and moves only on [`SessionEvent`]s drained
//! from its receiver. Resolution always ends in admit or redirect.

use crate::auth::{SessionEvent, SessionUser};
use crate::model::Role;
use serde::Serialize;
use std::sync::mpsc::Receiver;

pub const SIGN_IN_PATH: &str = "/sign-in";
pub const SIGN_UP_PATH: &str = "/sign-up";
pub const PENDING_PATH: &str = "/pending-activation";

const PUBLIC_PATHS: [&str; 3] = [SIGN_IN_PATH, SIGN_UP_PATH, PENDING_PATH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Unauthenticated,
    Pending,
    Active(Role),
    Admin,
}

impl GuardState {
    /// Maps a session to a state. Role strings that do not parse count as
    /// unauthenticated.
    pub fn from_session(user: Option<&SessionUser>) -> GuardState {
        let Some(user) = user else {
            return GuardState::Unauthenticated;
        };
        match Role::parse(&user.role) {
            Some(Role::Pending) => GuardState::Pending,
            Some(Role::Admin) => GuardState::Admin,
            Some(role @ (Role::Student | Role::Teacher | Role::Coordinator)) => {
                GuardState::Active(role)
            }
            None => GuardState::Unauthenticated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GuardState::Loading => "loading",
            GuardState::Unauthenticated => "unauthenticated",
            GuardState::Pending => "pending",
            GuardState::Active(_) => "active",
            GuardState::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "path", rename_all = "lowercase")]
pub enum Decision {
    Admit(String),
    Redirect(String),
}

pub fn is_public(path: &str) -> bool {
    let p = path.trim_end_matches('/');
    PUBLIC_PATHS.iter().any(|pub_path| *pub_path == p)
}

/// Pure decision for a resolved state. `Loading` is treated as no session.
pub fn decide(state: GuardState, path: &str) -> Decision {
    if is_public(path) {
        return Decision::Admit(path.to_string());
    }
    match state {
        GuardState::Loading | GuardState::Unauthenticated => {
            Decision::Redirect(SIGN_IN_PATH.to_string())
        }
        GuardState::Pending => Decision::Redirect(PENDING_PATH.to_string()),
        GuardState::Admin | GuardState::Active(_) => Decision::Admit(path.to_string()),
    }
}

pub struct RouteGuard {
    state: GuardState,
    events: Receiver<SessionEvent>,
}

impl RouteGuard {
    pub fn new(events: Receiver<SessionEvent>) -> Self {
        Self {
            state: GuardState::Loading,
            events,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Applies every pending session event, returning the resulting state.
    pub fn sync(&mut self) -> GuardState {
        for event in self.events.try_iter() {
            self.state = match event {
                SessionEvent::SignedIn(user) => GuardState::from_session(Some(&user)),
                SessionEvent::SignedOut => GuardState::Unauthenticated,
                SessionEvent::Refreshed(user) => GuardState::from_session(user.as_ref()),
            };
        }
        self.state
    }

    pub fn resolve(&mut self, path: &str) -> Decision {
        decide(self.sync(), path)
    }
}
