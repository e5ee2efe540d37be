//! Error types for the scan pipeline.
//!
//! Library code returns [`ScanError`]; the decoder boundary has its own
//! [`DecodeError`] because a decode failure is reported per call and never
//! fails the transaction that produced it.

use thiserror::Error;

/// Errors that can occur while scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Chain RPC unreachable or returned an unusable response.
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    /// Checkpoint store read or write failed.
    #[error("progress store error: {0}")]
    Store(#[source] anyhow::Error),

    /// The movement sink refused a record.
    #[error("sink error: {0}")]
    Sink(String),

    /// Malformed configuration (bad address, bad name, ...).
    #[error("config error: {0}")]
    Config(String),

    /// Registration rejected by the scheduler.
    #[error("registration rejected for {chain}:{protocol}: {reason}")]
    Registration {
        chain: String,
        protocol: String,
        reason: String,
    },
}

impl ScanError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        Self::Store(err.into())
    }

    /// Returns `true` for errors the scan loop retries on its next pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Store(_) | Self::Sink(_))
    }
}

/// Errors produced by an [`AssetDecoder`](crate::decoder::AssetDecoder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown call type '{0}'")]
    UnknownCallType(String),

    #[error("call has no type tag")]
    MissingCallType,

    #[error("malformed call payload: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScanError::transport(anyhow::anyhow!("timeout")).is_transient());
        assert!(ScanError::store(anyhow::anyhow!("io")).is_transient());
        assert!(!ScanError::Config("bad address".into()).is_transient());
        let registration = ScanError::Registration {
            chain: "Ethereum".into(),
            protocol: "EtherFi".into(),
            reason: "already registered".into(),
        };
        assert!(!registration.is_transient());
    }

    #[test]
    fn test_registration_message() {
        let err = ScanError::Registration {
            chain: "Ethereum".into(),
            protocol: "EtherFi".into(),
            reason: "scheduler already started".into(),
        };
        assert_eq!(
            err.to_string(),
            "registration rejected for Ethereum:EtherFi: scheduler already started"
        );
    }
}
