//! Human-readable messages from backend error bodies

use reqwest::StatusCode;
use serde::Deserialize;

/// Error body: `{"detail": ...}`
#[derive(Deserialize)]
struct ErrorBody {
    detail: Detail,
}

/// The three shapes `detail` takes
#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    /// `{"detail": "x"}`
    Text(String),
    /// `{"detail": {"code": "c", "message": "m", "extra": {...}}}`
    Coded { message: String },
    /// `{"detail": [{"loc": [...], "msg": "bad field", "type": "..."}]}`
    Validation(Vec<FieldError>),
}

#[derive(Deserialize)]
struct FieldError {
    msg: String,
}

/// Message to surface for a non-2xx response.
///
/// Falls back to `"<code> <reason>"` when the body is not a recognized
/// error shape or carries an empty message.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Detail::Text(text),
        }) => text,
        Ok(ErrorBody {
            detail: Detail::Coded { message },
        }) => message,
        Ok(ErrorBody {
            detail: Detail::Validation(errors),
        }) => errors
            .into_iter()
            .map(|e| e.msg)
            .collect::<Vec<_>>()
            .join("; "),
        Err(_) => String::new(),
    };

    if message.trim().is_empty() {
        format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim()
        .to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_string() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"detail":"x"}"#),
            "x"
        );
    }

    #[test]
    fn test_detail_object() {
        assert_eq!(
            error_message(
                StatusCode::CONFLICT,
                r#"{"detail":{"code":"c","message":"m","extra":{"k":1}}}"#
            ),
            "m"
        );
    }

    #[test]
    fn test_detail_list() {
        assert_eq!(
            error_message(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"detail":[{"loc":["body","q"],"msg":"bad field","type":"value_error"}]}"#
            ),
            "bad field"
        );
        assert_eq!(
            error_message(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"detail":[{"loc":[],"msg":"a","type":"t"},{"loc":[],"msg":"b","type":"t"}]}"#
            ),
            "a; b"
        );
    }

    #[test]
    fn test_query_too_long() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"detail":"query too long"}"#),
            "query too long"
        );
    }

    #[test]
    fn test_fallback_to_status_line() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>upstream down</html>"),
            "502 Bad Gateway"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":[]}"#),
            "500 Internal Server Error"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, ""),
            "404 Not Found"
        );
    }
}
