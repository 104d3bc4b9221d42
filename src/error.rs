use chatcore::graphql::GraphQLError;
use chatcore::store::StoreError;
use thiserror::Error;

/// Errors from GraphQL requests and the operations built on them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] anyhow::Error),

    #[error("Server rejected the credentials (401)")]
    Unauthorized,

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL request failed: {}", join_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response for {0} carried no data")]
    MissingData(&'static str),

    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

fn join_errors(errors: &[GraphQLError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    messages.join(", ")
}

pub type Result<T> = std::result::Result<T, ClientError>;
