//! Transport identities.

use std::fmt;

/// Credentials a connection authenticates with.
///
/// Resolved once per upload request. Downstream code depends only on the
/// authenticated connection, never on which variant produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// The owning user, authenticated with their stored session.
    User { user_id: i64, session: String },
    /// A delegated service account, authenticated with its token.
    Delegated { token: String },
}

impl Identity {
    /// Attribution recorded for observability: the user id, or the bot id
    /// carried before the `:` of a delegated token.
    pub fn attribution(&self) -> String {
        match self {
            Self::User { user_id, .. } => user_id.to_string(),
            Self::Delegated { token } => token
                .split_once(':')
                .map(|(id, _)| id)
                .unwrap_or(token.as_str())
                .to_string(),
        }
    }

    /// Key used to share per-identity state such as rate limits.
    pub fn key(&self) -> String {
        match self {
            Self::User { user_id, .. } => format!("user:{user_id}"),
            Self::Delegated { .. } => format!("bot:{}", self.attribution()),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { user_id, .. } => write!(f, "Identity::User({user_id}, [REDACTED])"),
            Self::Delegated { .. } => {
                write!(f, "Identity::Delegated({}, [REDACTED])", self.attribution())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribution() {
        let user = Identity::User {
            user_id: 42,
            session: "s".into(),
        };
        assert_eq!(user.attribution(), "42");
        assert_eq!(user.key(), "user:42");

        let bot = Identity::Delegated {
            token: "123456:AAE-secret".into(),
        };
        assert_eq!(bot.attribution(), "123456");
        assert_eq!(bot.key(), "bot:123456");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let bot = Identity::Delegated {
            token: "123456:AAE-secret".into(),
        };
        let debug = format!("{bot:?}");
        assert!(!debug.contains("AAE-secret"));
        assert!(debug.contains("123456"));
    }
}
