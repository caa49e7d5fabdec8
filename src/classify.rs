use reqwest::StatusCode;

/// Returns `true` for statuses worth retrying: `429` and every `5xx`.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` for the `2xx` range.
pub fn is_success_status(status: StatusCode) -> bool {
    status.is_success()
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{is_retryable_status, is_success_status};

    #[test]
    fn retryable_statuses() {
        let cases = [
            (500, true),
            (501, true),
            (502, true),
            (503, true),
            (504, true),
            (599, true),
            (429, true),
            (400, false),
            (401, false),
            (403, false),
            (404, false),
            (409, false),
            (422, false),
            (200, false),
            (204, false),
            (301, false),
        ];

        for (code, expected) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(is_retryable_status(status), expected, "status {code}");
        }
    }

    #[test]
    fn success_range() {
        assert!(is_success_status(StatusCode::OK));
        assert!(is_success_status(StatusCode::CREATED));
        assert!(is_success_status(StatusCode::NO_CONTENT));
        assert!(!is_success_status(StatusCode::MULTIPLE_CHOICES));
        assert!(!is_success_status(StatusCode::NOT_FOUND));
    }
}
