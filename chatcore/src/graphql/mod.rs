pub mod documents;
pub mod operations;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use operations::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// A named GraphQL document. Documents are a fixed contract with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub kind: OperationKind,
    pub document: &'static str,
}

/// Body of a GraphQL request, as sent over HTTP or inside a `start` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub operation_name: String,
    pub query: String,
    pub variables: Value,
}

impl GraphQLRequest {
    pub fn new(operation: &Operation, variables: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            operation_name: operation.name.to_string(),
            query: operation.document.to_string(),
            variables: serde_json::to_value(variables)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQLErrorExtensions {
    pub code: Option<String>,
    #[serde(default)]
    pub exception: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(u64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default)]
    pub extensions: Option<GraphQLErrorExtensions>,
}

impl GraphQLError {
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.code.as_deref()
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code() == Some("UNAUTHENTICATED")
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "GraphQL error ({code}): {}", self.message)?,
            None => write!(f, "GraphQL error: {}", self.message)?,
        }
        if let Some(path) = &self.path {
            let joined: Vec<String> = path.iter().map(ToString::to_string).collect();
            write!(f, " at {}", joined.join("."))?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

impl<T> GraphQLResponse<T> {
    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
