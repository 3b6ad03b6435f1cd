//! Identity resolution: numeric forum user id to display name.
//!
//! Consulted once per authenticated session at admission time. The display
//! name is then denormalized into every message that session writes.

use crate::errors::ChatError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Timeout for user directory requests in seconds.
const USER_DIRECTORY_TIMEOUT_SECS: u64 = 5;

/// Resolves display names for authenticated sessions.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn display_name(&self, user_id: i64) -> Result<String, ChatError>;
}

#[derive(Debug, Deserialize)]
struct UserProfileResponse {
    username: String,
}

/// HTTP client for the forum user directory.
///
/// `GET {base_url}/users/{id}` returning `{"username": "..."}`.
#[derive(Clone)]
pub struct UserDirectoryClient {
    client: Client,
    base_url: String,
}

impl UserDirectoryClient {
    /// # Errors
    ///
    /// Returns `ChatError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(USER_DIRECTORY_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| {
                error!(target: "chat.identity", error = %e, "Failed to build HTTP client");
                ChatError::Internal(format!("http client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl IdentityResolver for UserDirectoryClient {
    #[instrument(skip(self))]
    async fn display_name(&self, user_id: i64) -> Result<String, ChatError> {
        let url = format!("{}/users/{}", self.base_url, user_id);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(target: "chat.identity", error = %e, "User directory request failed");
            ChatError::Identity("user directory is unavailable".to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            let profile: UserProfileResponse = response.json().await.map_err(|e| {
                error!(target: "chat.identity", error = %e, "Failed to parse user directory response");
                ChatError::Identity("malformed user directory response".to_string())
            })?;

            if profile.username.trim().is_empty() {
                warn!(target: "chat.identity", user_id, "User directory returned empty username");
                return Err(ChatError::Identity("empty username".to_string()));
            }

            Ok(profile.username)
        } else if status == StatusCode::NOT_FOUND {
            warn!(target: "chat.identity", user_id, "User not found in directory");
            Err(ChatError::Identity(format!("user {user_id} not found")))
        } else {
            warn!(target: "chat.identity", status = %status, "Unexpected user directory response");
            Err(ChatError::Identity(format!("user directory returned {status}")))
        }
    }
}

/// Mock identity resolver for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolves from a fixed table. Unknown ids fail.
    pub struct MockIdentityResolver {
        names: HashMap<i64, String>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl MockIdentityResolver {
        pub fn with_names<I, S>(names: I) -> Self
        where
            I: IntoIterator<Item = (i64, S)>,
            S: Into<String>,
        {
            Self {
                names: names
                    .into_iter()
                    .map(|(id, name)| (id, name.into()))
                    .collect(),
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// A resolver whose every lookup fails.
        pub fn failing() -> Self {
            Self {
                names: HashMap::new(),
                call_count: AtomicUsize::new(0),
                return_error: true,
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for MockIdentityResolver {
        async fn display_name(&self, user_id: i64) -> Result<String, ChatError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.return_error {
                return Err(ChatError::Identity("mock identity failure".to_string()));
            }

            self.names
                .get(&user_id)
                .cloned()
                .ok_or_else(|| ChatError::Identity(format!("user {user_id} not found")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockIdentityResolver;
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_display_name_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "alice"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = UserDirectoryClient::new(server.uri()).unwrap();
        assert_eq!(client.display_name(42).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "bob"})),
            )
            .mount(&server)
            .await;

        let client = UserDirectoryClient::new(format!("{}/", server.uri())).unwrap();
        assert_eq!(client.display_name(7).await.unwrap(), "bob");
    }

    #[tokio::test]
    async fn test_display_name_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = UserDirectoryClient::new(server.uri()).unwrap();
        let result = client.display_name(404).await;
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }

    #[tokio::test]
    async fn test_display_name_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = UserDirectoryClient::new(server.uri()).unwrap();
        let result = client.display_name(1).await;
        assert!(matches!(result, Err(ChatError::Identity(msg)) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_display_name_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = UserDirectoryClient::new(server.uri()).unwrap();
        assert!(client.display_name(1).await.is_err());
    }

    #[tokio::test]
    async fn test_display_name_unreachable() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = UserDirectoryClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            client.display_name(1).await,
            Err(ChatError::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_resolver() {
        let resolver = MockIdentityResolver::with_names([(1, "alice")]);
        assert_eq!(resolver.display_name(1).await.unwrap(), "alice");
        assert!(resolver.display_name(2).await.is_err());
        assert_eq!(resolver.call_count(), 2);

        let failing = MockIdentityResolver::failing();
        assert!(failing.display_name(1).await.is_err());
    }
}
