use std::time::Duration;

use {
    chatdesk_common::{ModelId, ProviderId},
    thiserror::Error,
};

use crate::{
    enforcer::Violation,
    status::{Operation, ProviderStatus},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: ProviderId },

    #[error("model {model} is not in the {provider} catalog")]
    UnknownModel {
        provider: ProviderId,
        model: ModelId,
    },

    #[error("cannot {operation} while {provider} is {status}")]
    InvalidTransition {
        provider: ProviderId,
        operation: Operation,
        status: ProviderStatus,
    },

    #[error("{provider} has no API key to test")]
    MissingCredentials { provider: ProviderId },

    #[error("{provider} must be saved before its models can be changed")]
    NotPersisted { provider: ProviderId },

    #[error("no model catalog loaded for {provider}")]
    CatalogNotLoaded { provider: ProviderId },

    #[error(transparent)]
    Invariant(#[from] Violation),

    /// The request never got a usable response.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The backend answered with an error; its message is kept verbatim.
    #[error("{message}")]
    Application {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {}s", .after.as_secs_f64())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{applied} of {total} update batches were applied before failing: {source}")]
    PartiallyApplied {
        applied: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(operation: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            message: source.to_string(),
        }
    }

    #[must_use]
    pub fn application(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Application {
            operation,
            message: message.into(),
        }
    }

    /// Rejected before reaching the network: an illegal transition, a bad
    /// argument, or a flag change that would break an invariant.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider { .. }
                | Self::UnknownModel { .. }
                | Self::InvalidTransition { .. }
                | Self::MissingCredentials { .. }
                | Self::NotPersisted { .. }
                | Self::CatalogNotLoaded { .. }
                | Self::Invariant(_)
        )
    }

    /// A network-side failure that retrying may fix.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Application { .. }
                | Self::Timeout { .. }
                | Self::PartiallyApplied { .. }
        )
    }
}

impl chatdesk_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

impl From<Error> for chatdesk_service_traits::ServiceError {
    fn from(err: Error) -> Self {
        if err.is_rejection() {
            Self::rejected(err)
        } else {
            Self::message(err)
        }
    }
}

chatdesk_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
