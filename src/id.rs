//! Identifier types for subscriptions, streams, and backend user tokens.

use std::sync::Arc;

/// Declares a cheap-to-clone string identifier backed by `Arc<str>`.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifier of a command or event subscription.
    ///
    /// Unique within one dispatcher. Cloning is an `Arc` pointer copy, so ids
    /// can be handed to delivery threads freely.
    ///
    /// # Example
    ///
    /// ```
    /// use stream_bridge::SubscriptionId;
    ///
    /// let score = SubscriptionId::new("score");
    /// assert_eq!(score, SubscriptionId::from("score"));
    /// assert_eq!(score.to_string(), "score");
    /// ```
    SubscriptionId
}

string_id! {
    /// Identifier of an outbound stream (video, audio, game data).
    StreamId
}

/// Opaque value threaded through backend subscribe calls and handed back
/// with every delivery.
///
/// The bridge never interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserToken(u64);

impl UserToken {
    /// Creates a token wrapping the given raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}
