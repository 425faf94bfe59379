//! Boundary conversions into the contract error shape.

use config_inject::InjectError;
use engine_client::EngineError;
use runtime_core::{ErrorKind, RuntimeError};

/// Wrap an engine failure for `op`, preserving its classification and
/// retry hint.
pub(crate) fn engine_err(op: &'static str, bot_id: Option<&str>, err: EngineError) -> RuntimeError {
    let kind = match &err {
        EngineError::NotFound(_) => ErrorKind::NotFound,
        EngineError::Conflict(_) => ErrorKind::AlreadyExists,
        EngineError::Timeout => ErrorKind::Timeout,
        EngineError::Connection(_) => ErrorKind::Connection,
        EngineError::TransportBuild(_) | EngineError::UnsupportedAddress(_) => {
            ErrorKind::InvalidConfig
        }
        EngineError::Api { .. } | EngineError::Parse(_) | EngineError::Pull(_) => ErrorKind::Engine,
    };
    let retryable = err.is_retryable();

    let mut wrapped = RuntimeError::new(op, kind)
        .with_message(err.to_string())
        .with_source(err)
        .with_retryable(retryable);
    if let Some(id) = bot_id {
        wrapped = wrapped.with_bot(id);
    }
    wrapped
}

/// Wrap a config-injection failure for `op`.
pub(crate) fn inject_err(op: &'static str, bot_id: &str, err: InjectError) -> RuntimeError {
    let kind = match &err {
        InjectError::InvalidId(_) => ErrorKind::InvalidConfig,
        _ => ErrorKind::Io,
    };
    RuntimeError::new(op, kind)
        .with_bot(bot_id)
        .with_message(err.to_string())
        .with_source(err)
}
