//! Relay error types. None of these are ever reported to a client.

use thiserror::Error;

use crate::protocol::SignalKind;

/// Why a signaling frame was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// `from` or `to` is absent or empty.
    #[error("`{kind}` message is missing `{field}`")]
    MissingField {
        /// Message type.
        kind: SignalKind,
        /// The missing routing field.
        field: &'static str,
    },
    /// No participant is registered under the destination handle.
    #[error("no participant registered as `{to}`")]
    UnknownRecipient {
        /// Destination handle.
        to: String,
    },
    /// The destination is registered but its connection is closed or saturated.
    #[error("recipient `{to}` is not accepting messages")]
    RecipientUnavailable {
        /// Destination handle.
        to: String,
    },
}

impl RouteError {
    /// Metric label for the drop reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::UnknownRecipient { .. } => "unknown_recipient",
            Self::RecipientUnavailable { .. } => "recipient_unavailable",
        }
    }
}

/// The hub task has stopped and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("relay hub has stopped")]
pub struct RelayClosed;
