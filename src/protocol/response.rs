//! Response message types.
//!
//! Every line the controller sends decodes to a [`Response`]: replies to
//! requests carry the request's `messageID`, pushes arrive as `NotifyList`
//! without one.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use rustc_hash::FxHashMap;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

use super::{Attribute, AttributeValue, Command};

// ============================================================================
// Constants
// ============================================================================

/// Response code for a successful request.
pub const RESPONSE_OK: &str = "200";

// ============================================================================
// ResponseObject
// ============================================================================

/// Wire shape of an object before its attributes are validated.
#[derive(Deserialize)]
struct RawObject {
    objnam: String,
    #[serde(default)]
    params: Map<String, Value>,
}

/// An object and its attributes, as reported by the controller.
///
/// # Format
///
/// ```json
/// { "objnam": "C0001", "params": { "STATUS": "ON", "SNAME": "Pool Light" } }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseObject {
    /// Name of the remote object.
    pub object_name: String,

    /// Attribute values keyed by attribute.
    pub attributes: FxHashMap<Attribute, AttributeValue>,
}

impl<'de> Deserialize<'de> for ResponseObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let raw = RawObject::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(de::Error::custom)
    }
}

impl ResponseObject {
    /// Validates every attribute of a raw object.
    fn from_raw(raw: RawObject) -> Result<Self> {
        let mut attributes = FxHashMap::default();
        attributes.reserve(raw.params.len());

        for (key, value) in raw.params {
            let value = AttributeValue::try_from(value).map_err(|e| {
                Error::decode(format!("{}.{key}: {e}", raw.objnam))
            })?;
            attributes.insert(Attribute::from(key), value);
        }

        Ok(Self {
            object_name: raw.objnam,
            attributes,
        })
    }
}

impl ResponseObject {
    /// Creates an object with no attributes.
    #[inline]
    #[must_use]
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            attributes: FxHashMap::default(),
        }
    }

    /// Adds an attribute value.
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute, value: AttributeValue) -> Self {
        self.attributes.insert(attribute, value);
        self
    }

    /// Returns the value of an attribute.
    #[inline]
    #[must_use]
    pub fn get(&self, attribute: &Attribute) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    /// Returns the text value of an attribute.
    #[inline]
    #[must_use]
    pub fn text(&self, attribute: &Attribute) -> Option<&str> {
        self.get(attribute).and_then(AttributeValue::as_text)
    }

    /// Returns the numeric value of an attribute.
    #[inline]
    #[must_use]
    pub fn number(&self, attribute: &Attribute) -> Option<f64> {
        self.get(attribute).and_then(AttributeValue::as_number)
    }

    /// Returns the nested objects of an attribute (usually `OBJLIST`).
    #[inline]
    #[must_use]
    pub fn objects(&self, attribute: &Attribute) -> &[ResponseObject] {
        self.get(attribute)
            .and_then(AttributeValue::as_objects)
            .unwrap_or_default()
    }

    /// Returns the `STATUS` attribute as on/off.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<bool> {
        self.get(&Attribute::Status).and_then(AttributeValue::as_bool)
    }
}

// ============================================================================
// Response
// ============================================================================

/// A line received from the controller.
///
/// # Format
///
/// Reply:
/// ```json
/// {
///   "messageID": "uuid",
///   "command": "SendParamList",
///   "response": "200",
///   "objectList": [ ... ]
/// }
/// ```
///
/// Notification:
/// ```json
/// {
///   "command": "NotifyList",
///   "objectList": [ { "objnam": "C0001", "params": { "STATUS": "ON" } } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Response {
    /// Echoed correlation token (absent for notifications).
    #[serde(rename = "messageID", default)]
    pub message_id: Option<MessageId>,

    /// Command name. Replies may use names outside [`Command`].
    #[serde(default)]
    pub command: String,

    /// Transport-level status, `"200"` on success.
    #[serde(rename = "response", default)]
    pub response_code: String,

    /// Human-readable status description.
    #[serde(default)]
    pub description: Option<String>,

    /// Object data.
    #[serde(rename = "objectList", default)]
    pub object_list: Vec<ResponseObject>,

    /// Query results (GetQuery replies).
    #[serde(default)]
    pub answer: Vec<ResponseObject>,
}

impl Response {
    /// Returns the correlation token, treating an empty token as absent.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        self.message_id.as_ref().filter(|id| !id.is_empty())
    }

    /// Returns `true` if the response code is `"200"`.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_code == RESPONSE_OK
    }

    /// Returns `true` if this is an unsolicited `NotifyList` push.
    #[inline]
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.command == Command::NotifyList.as_str()
    }

    /// Returns the object with the given name from `objectList`.
    #[must_use]
    pub fn object(&self, object_name: &str) -> Option<&ResponseObject> {
        self.object_list
            .iter()
            .find(|o| o.object_name == object_name)
    }

    /// Converts a non-success response into [`Error::ResponseCode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseCode`] if the code is not `"200"`.
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::response_code(
                self.response_code,
                self.description.unwrap_or_default(),
            ))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
