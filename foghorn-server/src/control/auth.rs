//! Bearer-token gate for the control-plane socket and the few admin routes
//! that require it. When no `SERVICE_TOKEN` is configured the gate is a
//! no-op, matching a local/dev deployment with nothing to check against.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;

pub async fn require_service_token(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = state.settings.service_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let token = extract_bearer_token(&request).ok_or(StatusCode::UNAUTHORIZED)?;
    if token != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}
