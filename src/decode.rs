use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{CloudApiError, Result};

/// Wire encoding of a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Yaml,
}

impl ResponseFormat {
    /// `Yaml` when the content type mentions yaml, `Json` otherwise.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(value) if value.to_ascii_lowercase().contains("yaml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Success statuses that never carry a body to decode.
pub fn is_bodiless(status: StatusCode) -> bool {
    matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
}

/// Decodes a response body into `T`.
///
/// Empty bodies and a top-level `null` fail with
/// [`CloudApiError::NullResponse`] instead of producing a default value.
pub fn decode_body<T: DeserializeOwned>(body: &[u8], format: ResponseFormat) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CloudApiError::NullResponse);
    }

    match format {
        ResponseFormat::Json => decode_json(body),
        ResponseFormat::Yaml => decode_yaml(body),
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let raw: serde_json::Value = serde_json::from_slice(body).map_err(|err| {
        CloudApiError::Decode(format!(
            "invalid JSON response: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })?;
    if raw.is_null() {
        return Err(CloudApiError::NullResponse);
    }
    serde_json::from_value(raw)
        .map_err(|err| CloudApiError::Decode(format!("unexpected JSON response shape: {err}")))
}

fn decode_yaml<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let raw: serde_yaml::Value = serde_yaml::from_slice(body).map_err(|err| {
        CloudApiError::Decode(format!(
            "invalid YAML response: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })?;
    if raw.is_null() {
        return Err(CloudApiError::NullResponse);
    }
    serde_yaml::from_value(raw)
        .map_err(|err| CloudApiError::Decode(format!("unexpected YAML response shape: {err}")))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde::Deserialize;

    use super::{decode_body, is_bodiless, ResponseFormat};
    use crate::CloudApiError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Message {
        message: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn format_detection() {
        assert_eq!(ResponseFormat::from_content_type(None), ResponseFormat::Json);
        assert_eq!(
            ResponseFormat::from_content_type(Some("application/json; charset=utf-8")),
            ResponseFormat::Json
        );
        assert_eq!(
            ResponseFormat::from_content_type(Some("application/x-yaml")),
            ResponseFormat::Yaml
        );
        assert_eq!(
            ResponseFormat::from_content_type(Some("Application/YAML")),
            ResponseFormat::Yaml
        );
        assert_eq!(
            ResponseFormat::from_content_type(Some("text/plain")),
            ResponseFormat::Json
        );
    }

    #[test]
    fn decodes_json() {
        let decoded: Message = decode_body(br#"{"message":"success"}"#, ResponseFormat::Json).unwrap();
        assert_eq!(decoded.message, "success");
    }

    #[test]
    fn decodes_yaml() {
        let decoded: Message = decode_body(b"message: success\n", ResponseFormat::Yaml).unwrap();
        assert_eq!(decoded.message, "success");
    }

    #[test]
    fn null_body_is_rejected() {
        for (body, format) in [
            (&b"null"[..], ResponseFormat::Json),
            (&b"  null \n"[..], ResponseFormat::Json),
            (&b"~"[..], ResponseFormat::Yaml),
            (&b"null"[..], ResponseFormat::Yaml),
        ] {
            let err = decode_body::<Message>(body, format).unwrap_err();
            assert!(matches!(err, CloudApiError::NullResponse), "{body:?}");
        }
    }

    #[test]
    fn null_is_rejected_even_for_optional_targets() {
        let err = decode_body::<Option<Message>>(b"null", ResponseFormat::Json).unwrap_err();
        assert!(matches!(err, CloudApiError::NullResponse));
    }

    #[test]
    fn empty_body_is_rejected() {
        for body in [&b""[..], &b" \n\t"[..]] {
            let err = decode_body::<Message>(body, ResponseFormat::Json).unwrap_err();
            assert!(matches!(err, CloudApiError::NullResponse));
        }
    }

    #[test]
    fn type_mismatch_is_decode_error() {
        let err = decode_body::<Counter>(br#"{"count":"five"}"#, ResponseFormat::Json).unwrap_err();
        assert!(matches!(err, CloudApiError::Decode(_)));

        let err = decode_body::<Message>(br#"{"message":5}"#, ResponseFormat::Json).unwrap_err();
        assert!(matches!(err, CloudApiError::Decode(_)));

        let err = decode_body::<Counter>(b"count: five\n", ResponseFormat::Yaml).unwrap_err();
        assert!(matches!(err, CloudApiError::Decode(_)));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = decode_body::<Message>(b"{\"message\":", ResponseFormat::Json).unwrap_err();
        match err {
            CloudApiError::Decode(message) => assert!(message.contains("invalid JSON")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn bodiless_statuses() {
        assert!(is_bodiless(StatusCode::NO_CONTENT));
        assert!(is_bodiless(StatusCode::RESET_CONTENT));
        assert!(!is_bodiless(StatusCode::OK));
        assert!(!is_bodiless(StatusCode::CREATED));
    }
}
