//! Attribute vocabulary and typed attribute values.
//!
//! Controller objects expose attributes under short upper-case keys
//! (`STATUS`, `SNAME`, `OBJLIST`, ...). Values are validated into
//! [`AttributeValue`] when a line is decoded, so consumers match on a variant
//! instead of casting on access.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::ResponseObject;

// ============================================================================
// Attribute
// ============================================================================

macro_rules! attributes {
    ($( $(#[$doc:meta])* $variant:ident => $key:literal, )+) => {
        /// An attribute key from the controller's vocabulary.
        ///
        /// Keys outside the known vocabulary decode to [`Attribute::Other`]
        /// so newer firmware never breaks decoding.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum Attribute {
            $( $(#[$doc])* $variant, )+
            /// Any key not in the known vocabulary.
            Other(String),
        }

        impl Attribute {
            /// Returns the wire key of the attribute.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $key, )+
                    Self::Other(key) => key,
                }
            }
        }

        impl From<&str> for Attribute {
            fn from(key: &str) -> Self {
                match key {
                    $( $key => Self::$variant, )+
                    other => Self::Other(other.to_string()),
                }
            }
        }
    };
}

attributes! {
    /// On/off status of a circuit, body or feature.
    Status => "STATUS",
    /// Display name.
    Sname => "SNAME",
    /// Object type (BODY, CIRCUIT, PUMP, ...).
    Objtyp => "OBJTYP",
    /// Object subtype.
    Subtyp => "SUBTYP",
    /// Ordering hint for UIs.
    Listord => "LISTORD",
    /// Parent object name.
    Parent => "PARENT",
    /// Nested list of child objects.
    Objlist => "OBJLIST",
    /// Current temperature.
    Temp => "TEMP",
    /// Low set point.
    Lotmp => "LOTMP",
    /// High set point.
    Hitmp => "HITMP",
    /// Active heat mode.
    Htmode => "HTMODE",
    /// Selected heat source.
    Htsrc => "HTSRC",
    /// Controller mode or unit system.
    Mode => "MODE",
    /// Firmware version.
    Ver => "VER",
    /// Property name.
    Propname => "PROPNAME",
    /// Postal code.
    Zip => "ZIP",
    /// Time zone offset.
    Timzon => "TIMZON",
    /// Longitude.
    Locx => "LOCX",
    /// Latitude.
    Locy => "LOCY",
    /// Pump speed in RPM.
    Rpm => "RPM",
    /// Pump flow in GPM.
    Gpm => "GPM",
    /// Pump power draw.
    Pwr => "PWR",
    /// Speed selection unit.
    Select => "SELECT",
    /// Light show or color selection.
    Use => "USE",
    /// Freeze protection flag.
    Freeze => "FREEZE",
    /// Salt level.
    Salt => "SALT",
    /// pH reading.
    Phval => "PHVAL",
    /// ORP reading.
    Orpval => "ORPVAL",
    /// Body an object belongs to.
    Body => "BODY",
    /// Circuit an object drives.
    Circuit => "CIRCUIT",
    /// Heater object name.
    Heater => "HEATER",
    /// Hostname or network name.
    Hname => "HNAME",
}

impl From<String> for Attribute {
    fn from(key: String) -> Self {
        match Self::from(key.as_str()) {
            Self::Other(_) => Self::Other(key),
            known => known,
        }
    }
}

impl From<Attribute> for String {
    fn from(attribute: Attribute) -> Self {
        match attribute {
            Attribute::Other(key) => key,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AttributeValue
// ============================================================================

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Text value. Most controller values arrive as strings.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Nested object list (for example `OBJLIST`).
    Objects(Vec<ResponseObject>),
}

impl AttributeValue {
    /// Returns the text value, if this is [`AttributeValue::Text`].
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the value as a number.
    ///
    /// Numeric text such as `"82"` is parsed as well.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    ///
    /// `"ON"`/`"OFF"` status strings are accepted.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(text) => match text.as_str() {
                "ON" => Some(true),
                "OFF" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the nested objects, if this is [`AttributeValue::Objects`].
    #[inline]
    #[must_use]
    pub fn as_objects(&self) -> Option<&[ResponseObject]> {
        match self {
            Self::Objects(objects) => Some(objects),
            _ => None,
        }
    }
}

impl TryFrom<Value> for AttributeValue {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| Error::decode(format!("Number out of range: {n}"))),
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    if item.is_object() {
                        serde_json::from_value::<ResponseObject>(item)
                            .map_err(|e| Error::decode(e.to_string()))
                    } else {
                        Err(Error::decode(format!("Expected object in list, got {item}")))
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Objects),
            Value::Null => Err(Error::decode("Attribute value is null")),
            Value::Object(_) => Err(Error::decode("Attribute value is a bare object")),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Objects(objects) => write!(f, "[{} objects]", objects.len()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
