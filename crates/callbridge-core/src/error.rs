use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Portal credentials rejected or missing. The user has to log in again.
    #[error("portal auth error: {0}")]
    Auth(String),
    /// Google credential missing, expired or revoked. The user has to re-consent.
    #[error("spreadsheet auth error: {0}")]
    SheetAuth(String),
    /// Portal markup or response shape no longer matches what we scrape.
    #[error("portal protocol error: {0}")]
    Protocol(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("could not understand date: {0}")]
    DateParse(String),
    #[error("session expired")]
    SessionExpired,
    #[error("telegram error: {0}")]
    Telegram(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("http error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("integration error: {0}")]
    Integration(String),
}

impl BridgeError {
    /// True when retrying the same request could succeed without user input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Export(_) | Self::Protocol(_) | Self::Http { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status() {
        let err = BridgeError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "http error (502): bad gateway");
    }

    #[test]
    fn test_auth_is_not_retryable() {
        assert!(!BridgeError::Auth("wrong password".into()).is_retryable());
        assert!(!BridgeError::SheetAuth("revoked".into()).is_retryable());
        assert!(BridgeError::Export("status 500".into()).is_retryable());
    }
}
