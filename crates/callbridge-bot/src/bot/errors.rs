use callbridge_core::error::BridgeError;

/// The one place errors become chat text. Every message names a next step.
pub fn user_message(err: &BridgeError) -> String {
    match err {
        BridgeError::Auth(_) => {
            "The portal rejected your login. Please enter your portal email again.".to_string()
        }
        BridgeError::SheetAuth(_) => {
            "Google access for this chat is missing or expired. Open the new link to reconnect."
                .to_string()
        }
        BridgeError::Protocol(_) => {
            "The portal answered in a way I did not expect. Please try /fetch again later."
                .to_string()
        }
        BridgeError::Export(_) => {
            "Downloading the report failed. Please try /fetch again.".to_string()
        }
        BridgeError::DateParse(input) => format!(
            "I could not understand the date \"{input}\". Use today, yesterday or YYYY-MM-DD."
        ),
        BridgeError::SessionExpired => {
            "Your session expired. Let's start again.".to_string()
        }
        BridgeError::Telegram(_)
        | BridgeError::Database(_)
        | BridgeError::Config(_)
        | BridgeError::Http { .. }
        | BridgeError::Integration(_) => {
            "Something went wrong on my side. Please try again, or /start over.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_details_are_not_leaked() {
        let msg = user_message(&BridgeError::Database("no such table: kv".into()));
        assert!(!msg.contains("kv"));
        let msg = user_message(&BridgeError::Export("report download returned status 500".into()));
        assert!(msg.contains("/fetch"));
    }

    #[test]
    fn test_date_parse_echoes_input() {
        let msg = user_message(&BridgeError::DateParse("someday".into()));
        assert!(msg.contains("\"someday\""));
    }
}
