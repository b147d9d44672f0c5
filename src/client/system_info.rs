//! Controller system information.
//!
//! Fetched once right after connecting from the controller's system object.

use crate::error::{Error, Result};
use crate::protocol::{Attribute, Request, RequestObject, Response};

/// Name of the controller's system object.
pub const SYSTEM_OBJECT: &str = "_5451";

/// Keys requested from the system object.
const SYSTEM_KEYS: [Attribute; 8] = [
    Attribute::Propname,
    Attribute::Ver,
    Attribute::Sname,
    Attribute::Mode,
    Attribute::Zip,
    Attribute::Timzon,
    Attribute::Locx,
    Attribute::Locy,
];

// ============================================================================
// SystemInfo
// ============================================================================

/// Read-only snapshot of the controller's identity and locale.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    /// Property (installation) name.
    pub property_name: String,
    /// Firmware version.
    pub version: String,
    /// Controller name.
    pub name: String,
    /// Unit system, `"ENGLISH"` or `"METRIC"`.
    pub mode: String,
    /// Postal code.
    pub zip: String,
    /// Time zone offset as reported.
    pub time_zone: String,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Latitude.
    pub latitude: Option<f64>,
}

impl SystemInfo {
    /// Builds the `GetParamList` request for the system object.
    #[must_use]
    pub fn request() -> Request {
        Request::get_param_list(vec![RequestObject::read(SYSTEM_OBJECT, SYSTEM_KEYS)])
    }

    /// Extracts system information from a reply to [`SystemInfo::request`].
    ///
    /// Missing text attributes become empty strings.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseCode`] if the reply is not `"200"`
    /// - [`Error::Protocol`] if the system object is missing
    pub fn from_response(response: Response) -> Result<Self> {
        let response = response.into_success()?;
        let object = response.object(SYSTEM_OBJECT).ok_or_else(|| {
            Error::protocol(format!("Reply does not contain object {SYSTEM_OBJECT}"))
        })?;

        let text = |attribute: Attribute| -> String {
            object.text(&attribute).unwrap_or_default().to_string()
        };

        Ok(Self {
            property_name: text(Attribute::Propname),
            version: text(Attribute::Ver),
            name: text(Attribute::Sname),
            mode: text(Attribute::Mode),
            zip: text(Attribute::Zip),
            time_zone: text(Attribute::Timzon),
            longitude: object.number(&Attribute::Locx),
            latitude: object.number(&Attribute::Locy),
        })
    }

    /// Returns `true` if the controller reports metric units.
    #[inline]
    #[must_use]
    pub fn is_metric(&self) -> bool {
        self.mode.eq_ignore_ascii_case("METRIC")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::Command;

    fn reply(value: serde_json::Value) -> Response {
        serde_json::from_value(value).expect("response")
    }

    #[test]
    fn test_request_shape() {
        let request = SystemInfo::request();
        assert_eq!(request.command, Command::GetParamList);
        assert_eq!(request.object_list[0].object_name, "_5451");

        let keys: Vec<_> = request.object_list[0]
            .keys()
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(
            keys,
            ["PROPNAME", "VER", "SNAME", "MODE", "ZIP", "TIMZON", "LOCX", "LOCY"]
        );
    }

    #[test]
    fn test_from_response() {
        let info = SystemInfo::from_response(reply(json!({
            "messageID": "m-1",
            "command": "SendParamList",
            "response": "200",
            "objectList": [{
                "objnam": "_5451",
                "params": {
                    "PROPNAME": "Backyard",
                    "VER": "1.064",
                    "SNAME": "IntelliCenter",
                    "MODE": "ENGLISH",
                    "ZIP": "34102",
                    "TIMZON": "-5",
                    "LOCX": "-81.79",
                    "LOCY": "26.14"
                }
            }]
        })))
        .expect("info");

        assert_eq!(info.property_name, "Backyard");
        assert_eq!(info.version, "1.064");
        assert_eq!(info.time_zone, "-5");
        assert_eq!(info.longitude, Some(-81.79));
        assert_eq!(info.latitude, Some(26.14));
        assert!(!info.is_metric());
    }

    #[test]
    fn test_error_code_rejected() {
        let err = SystemInfo::from_response(reply(json!({
            "command": "SendParamList",
            "response": "400",
            "description": "bad request"
        })))
        .expect_err("non-200");
        assert!(matches!(err, Error::ResponseCode { .. }));
    }

    #[test]
    fn test_missing_object_rejected() {
        let err = SystemInfo::from_response(reply(json!({
            "command": "SendParamList",
            "response": "200",
            "objectList": []
        })))
        .expect_err("missing object");
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
