use std::time::Duration;

/// Classified failure of a single platform call.
///
/// The platform reports most conditions as free-form descriptions; the
/// variants here are the distinctions the workflows branch on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("already a participant")]
    AlreadyParticipant,

    #[error("not a participant")]
    NotParticipant,

    /// The acting identity was just promoted but the platform does not see
    /// it as an administrator yet.
    #[error("acting identity is not recognised as an administrator yet")]
    OperatorNotRecognized,

    #[error("grant refused: {0}")]
    GrantDenied(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("join request sent; the channel requires admin approval")]
    JoinApprovalRequired,

    #[error("channel is gone or inaccessible: {0}")]
    ChannelGone(String),

    #[error("not supported by this identity: {0}")]
    Unsupported(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform error {code}: {description}")]
    Api { code: i32, description: String },
}

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

impl PlatformError {
    /// Map an error code/description pair (plus the optional `retry_after`
    /// response parameter) onto a variant.
    pub fn classify(code: i32, description: &str, retry_after: Option<u64>) -> Self {
        let upper = description.to_ascii_uppercase();

        if code == 429 || retry_after.is_some() || upper.contains("FLOOD_WAIT") {
            let secs = retry_after
                .or_else(|| trailing_number(&upper))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return PlatformError::RateLimited {
                retry_after: Duration::from_secs(secs),
            };
        }
        if upper.contains("USER_ALREADY_PARTICIPANT")
            || upper.contains("ALREADY A PARTICIPANT")
            || upper.contains("ALREADY A MEMBER")
        {
            return PlatformError::AlreadyParticipant;
        }
        if upper.contains("INVITE_REQUEST_SENT") {
            return PlatformError::JoinApprovalRequired;
        }
        if upper.contains("CHAT_ADMIN_REQUIRED") {
            return PlatformError::OperatorNotRecognized;
        }
        if upper.contains("USER_NOT_PARTICIPANT")
            || upper.contains("PARTICIPANT_ID_INVALID")
            || upper.contains("USER NOT FOUND")
            || upper.contains("MEMBER NOT FOUND")
        {
            return PlatformError::NotParticipant;
        }
        if upper.contains("RIGHT_FORBIDDEN")
            || upper.contains("USER_ADMIN_INVALID")
            || upper.contains("CAN'T PROMOTE")
            || upper.contains("CAN'T DEMOTE")
            || upper.contains("ADMINS_TOO_MUCH")
        {
            return PlatformError::GrantDenied(description.to_string());
        }
        if upper.contains("CHANNEL_PRIVATE")
            || upper.contains("CHANNEL_INVALID")
            || upper.contains("CHAT NOT FOUND")
            || upper.contains("PEER_ID_INVALID")
            || upper.contains("KICKED")
            || upper.contains("CHAT_FORBIDDEN")
            || upper.contains("UPGRADED TO A SUPERGROUP")
        {
            return PlatformError::ChannelGone(description.to_string());
        }
        if code == 403 || upper.contains("NOT ENOUGH RIGHTS") || upper.starts_with("FORBIDDEN") {
            return PlatformError::PermissionDenied(description.to_string());
        }
        PlatformError::Api {
            code,
            description: description.to_string(),
        }
    }

    /// Mandated wait when this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// A just-granted right that the platform does not reflect yet.
    pub fn is_propagation_lag(&self) -> bool {
        matches!(self, PlatformError::OperatorNotRecognized)
    }

    /// The platform refused to apply a capability grant.
    pub fn is_grant_refusal(&self) -> bool {
        matches!(
            self,
            PlatformError::GrantDenied(_) | PlatformError::PermissionDenied(_)
        )
    }

    pub fn is_channel_gone(&self) -> bool {
        matches!(self, PlatformError::ChannelGone(_))
    }
}

fn trailing_number(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.chars().rev().collect::<String>().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_prefers_response_parameter() {
        let err = PlatformError::classify(429, "Too Many Requests: retry after 7", Some(12));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn rate_limit_parses_description_when_parameter_missing() {
        let err = PlatformError::classify(420, "FLOOD_WAIT_33", None);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(33)));

        let err = PlatformError::classify(429, "Too Many Requests: retry after 7", None);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn admin_required_is_propagation_lag() {
        let err = PlatformError::classify(400, "Bad Request: CHAT_ADMIN_REQUIRED", None);
        assert!(err.is_propagation_lag());
        assert!(!err.is_grant_refusal());
    }

    #[test]
    fn already_participant_and_not_participant() {
        assert_eq!(
            PlatformError::classify(400, "USER_ALREADY_PARTICIPANT", None),
            PlatformError::AlreadyParticipant
        );
        assert_eq!(
            PlatformError::classify(400, "Bad Request: USER_NOT_PARTICIPANT", None),
            PlatformError::NotParticipant
        );
    }

    #[test]
    fn grant_refusals() {
        assert!(PlatformError::classify(400, "RIGHT_FORBIDDEN", None).is_grant_refusal());
        assert!(
            PlatformError::classify(400, "Bad Request: not enough rights", None)
                .is_grant_refusal()
        );
    }

    #[test]
    fn gone_channels() {
        assert!(PlatformError::classify(400, "Bad Request: chat not found", None).is_channel_gone());
        assert!(
            PlatformError::classify(403, "Forbidden: bot was kicked from the channel chat", None)
                .is_channel_gone()
        );
    }

    #[test]
    fn join_approval() {
        assert_eq!(
            PlatformError::classify(400, "INVITE_REQUEST_SENT", None),
            PlatformError::JoinApprovalRequired
        );
    }

    #[test]
    fn unknown_errors_keep_code_and_text() {
        assert_eq!(
            PlatformError::classify(500, "Internal", None),
            PlatformError::Api {
                code: 500,
                description: "Internal".to_string()
            }
        );
    }
}
