//! Typed operations and the GraphQL request/response envelopes.

use crate::error::{ClientError, ErrorCode};
use crate::http::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The kind of GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// A generated operation.
///
/// Implemented by the marker struct generated for each operation; `DOCUMENT`
/// is the exact text sent to the server.
pub trait GraphqlOperation {
    /// The variables struct, or `()` for operations without variables.
    type Variables: Serialize;

    /// The `data` of a successful response.
    type ResponseData: DeserializeOwned;

    const NAME: &'static str;

    const KIND: OperationKind;

    const DOCUMENT: &'static str;
}

/// A GraphQL request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    pub operation_name: String,
}

impl Request {
    /// Builds the request for operation `O`.
    pub fn new<O: GraphqlOperation>(variables: &O::Variables) -> Result<Self, ClientError> {
        let variables = serde_json::to_value(variables)
            .map_err(|error| ClientError::serialize(format!("variables of {}: {error}", O::NAME)))?;
        Ok(Self {
            query: O::DOCUMENT.to_string(),
            variables: (!variables.is_null()).then_some(variables),
            operation_name: O::NAME.to_string(),
        })
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    #[serde(default)]
    pub extensions: Option<Map<String, Value>>,
}

impl Response<Value> {
    /// Decodes `data` into the response type of an operation.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Response<T>, ClientError> {
        let data = match self.data {
            None | Some(Value::Null) => None,
            Some(data) => Some(
                serde_json::from_value(data)
                    .map_err(|error| ClientError::deserialize(error.to_string()))?,
            ),
        };
        Ok(Response {
            data,
            errors: self.errors,
            extensions: self.extensions,
        })
    }
}

impl<T> Response<T> {
    /// Returns the data if the server reported no errors.
    pub fn into_result(self) -> Result<T, ClientError> {
        if !self.errors.is_empty() {
            return Err(ClientError::graphql(self.errors));
        }
        self.data
            .ok_or_else(|| ClientError::new(ErrorCode::NoData, "response has no data"))
    }
}

/// An error reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

impl fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            let path = self
                .path
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            write!(f, "{path}: ")?;
        }
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One step of an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Executes a query or mutation over `client`.
///
/// GraphQL errors are returned in the response, not as `Err`; use
/// [`Response::into_result`] to treat them as failures.
pub async fn execute<O, C>(
    client: &C,
    variables: O::Variables,
) -> Result<Response<O::ResponseData>, ClientError>
where
    O: GraphqlOperation,
    C: Client + ?Sized,
{
    if O::KIND == OperationKind::Subscription {
        return Err(ClientError::new(
            ErrorCode::UnsupportedOperation,
            format!("{} is a subscription; use a WebSocketClient", O::NAME),
        ));
    }
    let request = Request::new::<O>(&variables)?;
    tracing::debug!(operation = O::NAME, "executing operation");
    client.post(&request).await?.decode()
}
