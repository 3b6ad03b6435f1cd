//! Chat connection upgrade handler.
//!
//! `GET /chat/ws?token=<jwt>`
//!
//! Checks run in order and all of them happen before the hub sees anything:
//!
//! 1. Origin must be one of the configured origins (403 otherwise)
//! 2. The token, if any, is verified; a bad or missing token means anonymous
//! 3. Authenticated users get their display name from the user directory
//!    (502 if that fails)
//!
//! Then the connection is upgraded and handed to a session.

use crate::errors::ChatError;
use crate::hub::session;
use crate::models::Identity;
use crate::observability::metrics::record_upgrade;
use crate::routes::AppState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ChatConnectParams {
    /// Bearer access token. Optional.
    pub token: Option<String>,
}

/// Handler for GET /chat/ws
#[instrument(skip_all, name = "chat.handlers.upgrade")]
pub async fn chat_upgrade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ChatConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ChatError> {
    if let Err(e) = check_origin(&headers, &state.config.allowed_origins) {
        record_upgrade("forbidden_origin");
        return Err(e);
    }

    let identity = match resolve_identity(&state, params.token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            record_upgrade("identity_error");
            return Err(e);
        }
    };

    record_upgrade("accepted");
    debug!(
        target: "chat.handlers",
        username = %identity,
        is_authenticated = identity.can_publish(),
        "Upgrading chat connection"
    );

    let hub = state.hub.clone();
    let chat = state.chat.clone();
    let session_config = state.config.session_config();

    Ok(ws
        .max_message_size(session_config.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            session::serve(sink, stream, identity, hub, chat, session_config).await;
        }))
}

/// Accept only requests whose `Origin` is in `allowed`.
///
/// A missing or unreadable header is rejected too. Trailing slashes are
/// ignored.
pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), ChatError> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        warn!(target: "chat.handlers", "Upgrade without Origin header rejected");
        return Err(ChatError::Forbidden("Origin not allowed".to_string()));
    };

    let origin = origin.to_str().unwrap_or_default().trim_end_matches('/');
    if allowed.iter().any(|candidate| candidate == origin) {
        return Ok(());
    }

    warn!(target: "chat.handlers", origin, "Upgrade from disallowed origin rejected");
    Err(ChatError::Forbidden("Origin not allowed".to_string()))
}

async fn resolve_identity(state: &AppState, token: Option<&str>) -> Result<Identity, ChatError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        debug!(target: "chat.handlers", "No credential presented, connecting anonymously");
        return Ok(Identity::Anonymous);
    };

    let claims = match state.jwt_validator.validate(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(target: "chat.handlers", error = %e, "Credential rejected, connecting anonymously");
            return Ok(Identity::Anonymous);
        }
    };

    let username = state.identity.display_name(claims.user_id).await?;
    Ok(Identity::Authenticated {
        user_id: claims.user_id,
        username,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn allowed() -> Vec<String> {
        vec![
            "http://localhost:5173".to_string(),
            "https://forum.example.com".to_string(),
        ]
    }

    fn with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn test_allowed_origin() {
        assert!(check_origin(&with_origin("http://localhost:5173"), &allowed()).is_ok());
        assert!(check_origin(&with_origin("https://forum.example.com/"), &allowed()).is_ok());
    }

    #[test]
    fn test_disallowed_origin() {
        let result = check_origin(&with_origin("https://evil.example.com"), &allowed());
        assert!(matches!(result, Err(ChatError::Forbidden(_))));
    }

    #[test]
    fn test_origin_must_match_exactly() {
        assert!(check_origin(&with_origin("http://localhost:5174"), &allowed()).is_err());
        assert!(check_origin(&with_origin("https://localhost:5173"), &allowed()).is_err());
    }

    #[test]
    fn test_missing_origin_rejected() {
        let result = check_origin(&HeaderMap::new(), &allowed());
        assert!(matches!(result, Err(ChatError::Forbidden(_))));
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let err = check_origin(&HeaderMap::new(), &allowed()).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.client_message(), "Origin not allowed");
    }
}
