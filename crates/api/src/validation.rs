use crate::error::ApiError;
use validator::Validate;

pub const MAX_CONNECTION_ID_LEN: usize = 128;

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    Ok(())
}

/// Client-chosen subscription ids: bounded length, URL-safe charset only.
pub fn valid_connection_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CONNECTION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_charset_is_enforced() {
        assert!(valid_connection_id("conn-1"));
        assert!(valid_connection_id("user:42.session_a"));
        assert!(!valid_connection_id(""));
        assert!(!valid_connection_id("bad id"));
        assert!(!valid_connection_id("bad%20id"));
        assert!(!valid_connection_id(&"x".repeat(MAX_CONNECTION_ID_LEN + 1)));
    }
}
