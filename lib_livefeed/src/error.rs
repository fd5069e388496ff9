use thiserror::Error;

/// Failure taxonomy for the live feed client.
///
/// `Transport` and `Protocol` are contained inside the connection driver and
/// the dispatcher; subscribers never observe them directly. The variants that
/// do cross the public API are `ExhaustedRetries`, `Closed` and `Endpoint`.
#[derive(Debug, Error, Clone)]
pub enum FeedError {
    /// Socket-level failure or connection drop. Fed into the reconnection
    /// policy and retried up to the attempt cap.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame or envelope. The offending frame is dropped; there is
    /// nothing to retry.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The reconnection policy ran out of attempts. Terminal for the current
    /// connect sequence; a later explicit connect starts a fresh one.
    #[error("gave up connecting after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    /// The feed service was torn down while a call was pending.
    #[error("feed service is shut down")]
    Closed,

    /// The configured endpoint could not be turned into a feed URL.
    #[error("invalid feed endpoint '{url}': {reason}")]
    Endpoint { url: String, reason: String },
}
