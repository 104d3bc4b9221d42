//! Hooks run around every GraphQL HTTP request.

use crate::session::SessionManager;
use async_trait::async_trait;
use chatcore::events::LogoutReason;
use chatcore::net::{AUTHORIZATION, HttpRequest, HttpResponse};
use log::{error, warn};
use std::sync::Arc;

#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Rewrites an outgoing request.
    fn on_request(&self, request: HttpRequest) -> HttpRequest {
        request
    }

    /// Observes a response before the client interprets it.
    async fn on_response(&self, _response: &HttpResponse) {}
}

/// Attaches the stored auth header to requests that do not carry one.
pub struct AuthInterceptor {
    session: Arc<SessionManager>,
}

impl AuthInterceptor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    fn on_request(&self, request: HttpRequest) -> HttpRequest {
        if request.header(AUTHORIZATION).is_some() {
            return request;
        }
        match self.session.auth_header() {
            Some(header) => request.with_header(AUTHORIZATION, header),
            None => request,
        }
    }
}

/// Forces a logout when the server answers 401, so no stale credential or
/// user record survives.
pub struct UnauthorizedInterceptor {
    session: Arc<SessionManager>,
}

impl UnauthorizedInterceptor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Interceptor for UnauthorizedInterceptor {
    async fn on_response(&self, response: &HttpResponse) {
        if response.status_code != 401 {
            return;
        }
        warn!("Server answered 401, clearing session");
        if let Err(e) = self.session.logout(LogoutReason::Unauthorized).await {
            error!("Failed to clear session after 401: {e}");
        }
    }
}

/// The standard chain: attach credentials, log out on 401.
pub fn default_interceptors(session: &Arc<SessionManager>) -> Vec<Arc<dyn Interceptor>> {
    vec![
        Arc::new(AuthInterceptor::new(session.clone())),
        Arc::new(UnauthorizedInterceptor::new(session.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logged_in_session;

    #[tokio::test]
    async fn test_auth_header_added_once() {
        let auth = AuthInterceptor::new(logged_in_session("me").await);

        let request = auth.on_request(HttpRequest::post("http://test/graphql"));
        assert_eq!(request.header(AUTHORIZATION), Some("Basic bWU6cGFzcw=="));

        // A caller-supplied header wins, whatever its spelling.
        let request = HttpRequest::post("http://test/graphql").with_header("authorization", "Bearer t");
        let request = auth.on_request(request);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header(AUTHORIZATION), Some("Bearer t"));
    }
}
