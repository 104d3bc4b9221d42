use crate::error::{ClientError, Result};
use crate::interceptor::{Interceptor, default_interceptors};
use crate::session::SessionManager;
use chatcore::graphql::{GraphQLRequest, GraphQLResponse, Operation};
use chatcore::net::{HttpClient, HttpRequest};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// GraphQL-over-HTTP client. Every request passes through the interceptor
/// chain in order, and every response is shown to each interceptor before it
/// is interpreted.
pub struct Client {
    http: Arc<dyn HttpClient>,
    graphql_url: String,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Client {
    pub fn new(
        http: Arc<dyn HttpClient>,
        graphql_url: impl Into<String>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        Self {
            http,
            graphql_url: graphql_url.into(),
            interceptors,
        }
    }

    /// Client with the standard auth and 401 interceptors for `session`.
    pub fn with_session(
        http: Arc<dyn HttpClient>,
        graphql_url: impl Into<String>,
        session: &Arc<SessionManager>,
    ) -> Self {
        Self::new(http, graphql_url, default_interceptors(session))
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        variables: impl Serialize,
    ) -> Result<T> {
        let body = GraphQLRequest::new(operation, variables)?;
        let mut request = HttpRequest::post(&self.graphql_url).with_json_body(&body)?;
        for interceptor in &self.interceptors {
            request = interceptor.on_request(request);
        }

        debug!("--> {} {}", operation.name, body.variables);
        let response = self.http.execute(request).await?;
        debug!("<-- {} status {}", operation.name, response.status_code);

        for interceptor in &self.interceptors {
            interceptor.on_response(&response).await;
        }

        if response.status_code == 401 {
            return Err(ClientError::Unauthorized);
        }

        if !response.is_success() {
            // GraphQL servers report validation failures as 400 with an errors body.
            if let Ok(parsed) = serde_json::from_slice::<GraphQLResponse<Value>>(&response.body)
                && parsed.has_errors()
            {
                return Err(ClientError::GraphQL(parsed.errors));
            }
            return Err(ClientError::Status {
                status: response.status_code,
                body: response.body_string(),
            });
        }

        let parsed: GraphQLResponse<T> = serde_json::from_slice(&response.body)?;
        if parsed.has_errors() {
            for error in &parsed.errors {
                warn!("{} failed: {error}", operation.name);
            }
            return Err(ClientError::GraphQL(parsed.errors));
        }
        parsed.data.ok_or(ClientError::MissingData(operation.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHttpClient, logged_in_session};
    use chatcore::events::{Event, EventHandler};
    use chatcore::graphql::{GET_USERS, GetUsersData, NoVariables};
    use chatcore::net::AUTHORIZATION;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_execute_attaches_stored_auth_header() {
        let http = Arc::new(MockHttpClient::new());
        http.respond("GetUsers", json!({"data": {"users": [{"id": "1"}]}}));
        let session = logged_in_session("me").await;
        let client = Client::with_session(http.clone(), "http://test/graphql", &session);

        let data: GetUsersData = client.execute(&GET_USERS, NoVariables {}).await.unwrap();
        assert_eq!(data.users[0].id, "1");

        let sent = http.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header(AUTHORIZATION), Some("Basic bWU6cGFzcw=="));
        assert_eq!(sent[0].url, "http://test/graphql");
    }

    #[tokio::test]
    async fn test_graphql_errors_are_surfaced() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(
            "GetUsers",
            json!({"data": null, "errors": [{"message": "boom"}]}),
        );
        let session = logged_in_session("me").await;
        let client = Client::with_session(http, "http://test/graphql", &session);

        let err = client
            .execute::<GetUsersData>(&GET_USERS, NoVariables {})
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::GraphQL(ref errors) if errors[0].message == "boom"));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session_and_notifies() {
        #[derive(Default)]
        struct Seen(Mutex<Vec<String>>);
        impl EventHandler for Seen {
            fn handle_event(&self, event: &Event) {
                self.0.lock().unwrap().push(format!("{event:?}"));
            }
        }

        let http = Arc::new(MockHttpClient::new());
        http.respond_status("GetUsers", 401, json!({}));
        let session = logged_in_session("me").await;
        let seen = Arc::new(Seen::default());
        session.event_bus().add_handler(seen.clone());
        let client = Client::with_session(http, "http://test/graphql", &session);

        let err = client
            .execute::<GetUsersData>(&GET_USERS, NoVariables {})
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized));
        assert!(!session.is_logged_in());
        assert!(session.user().is_none());
        assert_eq!(
            *seen.0.lock().unwrap(),
            ["LoggedOut { reason: Unauthorized }"]
        );
    }

    #[tokio::test]
    async fn test_bad_request_with_errors_body() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_status(
            "GetUsers",
            400,
            json!({"errors": [{"message": "Cannot query field"}]}),
        );
        let session = logged_in_session("me").await;
        let client = Client::with_session(http, "http://test/graphql", &session);

        let err = client
            .execute::<GetUsersData>(&GET_USERS, NoVariables {})
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::GraphQL(_)));
    }

    #[tokio::test]
    async fn test_missing_data() {
        let http = Arc::new(MockHttpClient::new());
        http.respond("GetUsers", json!({"data": null}));
        let session = logged_in_session("me").await;
        let client = Client::with_session(http, "http://test/graphql", &session);

        let err = client
            .execute::<GetUsersData>(&GET_USERS, NoVariables {})
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingData("GetUsers")));
    }
}
