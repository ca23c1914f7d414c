use crate::error::AppResult;
use crate::guard::GuardState;
use crate::ipc::helpers::{conn, optional_str, required_password, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_sign_up(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let email = required_str(&req.params, "email")?;
    let password = required_password(&req.params, "password")?;
    let full_name = required_str(&req.params, "fullName")?;
    let signed_in = state
        .auth
        .sign_up(conn, &state.config.auth, &email, &password, &full_name)?;
    state.cache.invalidate(&crate::cache::CacheKey::Users);
    to_json(&signed_in)
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let email = required_str(&req.params, "email")?;
    let password = required_password(&req.params, "password")?;
    let signed_in = state.auth.sign_in_with_password(conn, &email, &password)?;
    to_json(&signed_in)
}

fn handle_sign_out(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    state.auth.sign_out(conn)?;
    Ok(json!({ "signedOut": true }))
}

fn handle_session(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let token = optional_str(&req.params, "token")?;
    let user = state.auth.get_session(conn, token.as_deref())?;
    Ok(json!({ "user": user }))
}

fn handle_route_resolve(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let path = required_str(&req.params, "path")?;
    if state.guard.sync() == GuardState::Loading {
        if let Some(conn) = state.db.as_ref() {
            state.auth.get_session(conn, None)?;
        }
    }
    let decision = state.guard.resolve(&path);
    let mut out = to_json(&decision)?;
    out["state"] = json!(state.guard.state().label());
    log::debug!("route {} -> {:?}", path, decision);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.signUp" => handle_sign_up(state, req),
        "auth.signIn" => handle_sign_in(state, req),
        "auth.signOut" => handle_sign_out(state, req),
        "auth.session" => handle_session(state, req),
        "route.resolve" => handle_route_resolve(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
