use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Family = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: [Family; 11] = [
    handlers::core::try_handle,
    handlers::auth::try_handle,
    handlers::users::try_handle,
    handlers::quarters::try_handle,
    handlers::levels::try_handle,
    handlers::classrooms::try_handle,
    handlers::students::try_handle,
    handlers::teachers::try_handle,
    handlers::attendance::try_handle,
    handlers::grading::try_handle,
    handlers::reports::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for family in FAMILIES {
        if let Some(resp) = family(state, &req) {
            return resp;
        }
    }
    log::debug!("unknown method {}", req.method);
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
