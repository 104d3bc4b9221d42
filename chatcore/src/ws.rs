//! Frames of the `graphql-ws` WebSocket sub-protocol
//! (subscriptions-transport-ws).

use crate::graphql::{GraphQLError, GraphQLRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SUBPROTOCOL: &str = "graphql-ws";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Start {
        id: String,
        payload: GraphQLRequest,
    },
    Stop {
        id: String,
    },
    ConnectionTerminate,
}

/// Payload of a `data` frame: a regular GraphQL response body.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPayload {
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    ConnectionError {
        #[serde(default)]
        payload: Option<Value>,
    },
    #[serde(rename = "ka")]
    KeepAlive,
    Data {
        id: String,
        payload: DataPayload,
    },
    Error {
        id: String,
        #[serde(default)]
        payload: Option<Value>,
    },
    Complete {
        id: String,
    },
}

#[derive(Debug, Error)]
pub enum WsProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("server rejected the connection: {0}")]
    ConnectionRejected(String),
    #[error("server sent {0} before connection_ack")]
    NotAcknowledged(&'static str),
}

impl ClientMessage {
    pub fn to_text(&self) -> Result<String, WsProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, WsProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionAck => "connection_ack",
            ServerMessage::ConnectionError { .. } => "connection_error",
            ServerMessage::KeepAlive => "ka",
            ServerMessage::Data { .. } => "data",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Complete { .. } => "complete",
        }
    }
}
