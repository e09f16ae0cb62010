//! Secret redaction for configuration values.
//!
//! [`Redacted`] wraps relay API keys, signing keys and database URLs so they
//! never reach logs, error reports or serialized output.

use std::fmt::{self, Debug, Display};

/// Wrapper that renders its inner value as `"<redacted>"`.
///
/// ```ignore
/// use burnmint_relayer::redact::Redacted;
///
/// tracing::info!(api_key = %Redacted(&config.relay.api_key), "Relay client ready");
/// // Logs: api_key = <redacted>
/// ```
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_formatting() {
        let key = Redacted("0xdeadbeef");
        assert_eq!(format!("{}", key), "<redacted>");
        assert_eq!(format!("{:?}", key), "<redacted>");
    }

    #[test]
    fn test_redacted_serialize() {
        let json = serde_json::to_string(&Redacted("sponsor-key")).unwrap();
        assert_eq!(json, "\"<redacted>\"");
    }
}
