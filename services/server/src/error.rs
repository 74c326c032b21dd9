use thiserror::Error;

/// Errors surfaced while dispatching one inbound request. Every variant is
/// converted into a response envelope on the originating `Client` before
/// this type ever escapes the request task — nothing here propagates past
/// the per-request `Context`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("action not registered: {0}")]
    ActionNotFound(String),

    #[error("client is rate limited")]
    RateLimited,

    #[error("client's user is banned until {0:?}")]
    Banned(Option<chrono::DateTime<chrono::Utc>>),

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("malformed request envelope: {0}")]
    MalformedEnvelope(String),
}

/// Fatal configuration-time errors. These always `panic!` at registration
/// (fail-fast, matching the original's `panic(...)` semantics) rather than
/// being returned as a `Result` — kept here only so the panic messages are
/// consistent and testable via `#[should_panic]`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    #[error("error code {0} already exists, please choose another one")]
    DuplicateErrorCode(i64),
}
