//! Request message types.
//!
//! Defines the message format for requests sent from the client to the
//! controller.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::identifiers::MessageId;

use super::{Attribute, Command};

// ============================================================================
// RequestObject
// ============================================================================

/// What a request wants from a single object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestBody {
    /// Attribute keys to read (or subscribe to).
    Keys(Vec<Attribute>),
    /// Attribute values to write.
    Params(BTreeMap<Attribute, String>),
}

/// A single object named in a request.
///
/// # Format
///
/// ```json
/// { "objnam": "C0001", "keys": ["STATUS", "SNAME"] }
/// { "objnam": "C0001", "params": { "STATUS": "ON" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestObject {
    /// Name of the remote object.
    #[serde(rename = "objnam")]
    pub object_name: String,

    /// Keys to read or values to write.
    #[serde(flatten)]
    pub body: RequestBody,
}

impl RequestObject {
    /// Creates an object entry that reads the given keys.
    #[must_use]
    pub fn read(
        object_name: impl Into<String>,
        keys: impl IntoIterator<Item = Attribute>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            body: RequestBody::Keys(keys.into_iter().collect()),
        }
    }

    /// Creates an object entry that writes the given values.
    #[must_use]
    pub fn write(
        object_name: impl Into<String>,
        params: impl IntoIterator<Item = (Attribute, String)>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            body: RequestBody::Params(params.into_iter().collect()),
        }
    }

    /// Returns the attribute keys this entry reads or writes.
    #[must_use]
    pub fn keys(&self) -> Vec<Attribute> {
        match &self.body {
            RequestBody::Keys(keys) => keys.clone(),
            RequestBody::Params(params) => params.keys().cloned().collect(),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A request from the client to the controller.
///
/// The `messageID` is stamped at submission time; a request is never reused
/// after it has been submitted.
///
/// # Format
///
/// ```json
/// {
///   "messageID": "uuid",
///   "command": "GetParamList",
///   "condition": "OBJTYP = CIRCUIT",
///   "objectList": [ { "objnam": "INCR", "keys": ["SNAME"] } ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Correlation token, assigned on submit.
    #[serde(rename = "messageID", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    /// Command to run.
    pub command: Command,

    /// Optional filter condition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Query name (GetQuery only).
    #[serde(rename = "queryName", skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,

    /// Query arguments (GetQuery only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    /// Objects the command applies to.
    #[serde(rename = "objectList", skip_serializing_if = "Vec::is_empty")]
    pub object_list: Vec<RequestObject>,
}

impl Request {
    /// Creates a request for the given command and objects.
    #[inline]
    #[must_use]
    pub fn new(command: Command, object_list: Vec<RequestObject>) -> Self {
        Self {
            message_id: None,
            command,
            condition: None,
            query_name: None,
            arguments: None,
            object_list,
        }
    }

    /// Creates a `GetParamList` request.
    #[inline]
    #[must_use]
    pub fn get_param_list(object_list: Vec<RequestObject>) -> Self {
        Self::new(Command::GetParamList, object_list)
    }

    /// Creates a `SetParamList` request.
    #[inline]
    #[must_use]
    pub fn set_param_list(object_list: Vec<RequestObject>) -> Self {
        Self::new(Command::SetParamList, object_list)
    }

    /// Creates a `GetQuery` request.
    #[must_use]
    pub fn get_query(query_name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            query_name: Some(query_name.into()),
            arguments: Some(arguments.into()),
            ..Self::new(Command::GetQuery, Vec::new())
        }
    }

    /// Creates a `RequestParamList` (subscribe) request.
    #[inline]
    #[must_use]
    pub fn request_param_list(object_list: Vec<RequestObject>) -> Self {
        Self::new(Command::RequestParamList, object_list)
    }

    /// Creates a `ReleaseParamList` (unsubscribe) request.
    #[inline]
    #[must_use]
    pub fn release_param_list(object_list: Vec<RequestObject>) -> Self {
        Self::new(Command::ReleaseParamList, object_list)
    }

    /// Sets the filter condition.
    #[inline]
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Returns the names of all objects in the request.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.object_list.iter().map(|o| o.object_name.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
