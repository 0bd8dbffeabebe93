use thiserror::Error;

/// Failures raised by the snapshot, stream and headline adapters.
///
/// A zero baseline price is not an error: `AssetTable::apply_push`
/// reports it as `PushOutcome::ZeroBaseline`.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Transport failure (DNS, connect, timeout, reset).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status.
    #[error("endpoint returned status {status}")]
    Status { status: u16 },

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A push frame that is not a JSON object of id -> price.
    #[error("malformed push message: {0}")]
    MalformedMessage(String),

    /// One entry of a push frame whose price is unusable.
    #[error("malformed price for {id}: {raw}")]
    MalformedEntry { id: String, raw: String },

    #[error("price stream connection lost: {0}")]
    ConnectionLost(String),
}

impl FeedError {
    /// Text shown in place of the dashboard section when a snapshot fails.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(err) => err.to_string(),
            Self::Status { status } => format!("Request failed with status code {status}"),
            Self::Decode(_) => "Failed to fetch crypto data".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_names_the_code() {
        let err = FeedError::Status { status: 429 };
        assert_eq!(err.user_message(), "Request failed with status code 429");
        assert_eq!(err.to_string(), "endpoint returned status 429");
    }

    #[test]
    fn malformed_entry_display() {
        let err = FeedError::MalformedEntry {
            id: "bitcoin".to_string(),
            raw: "\"abc\"".to_string(),
        };
        assert_eq!(err.to_string(), "malformed price for bitcoin: \"abc\"");
    }
}
