//! Progress reporting and cancellation helpers.
//!
//! Progress is approximate UI feedback, not part of the correctness
//! contract. Cancellation is: every stage entry checks the token, and
//! streaming loops re-check it on every chunk.

use tokio_util::sync::CancellationToken;
use tracing::info;

use sibyl_common::PipelineError;

/// Host-side progress sink.
pub trait ProgressHost: Send + Sync {
    /// Report an approximate incremental percentage with a short message.
    fn report(&self, increment: u8, message: &str);
}

/// Discards all progress reports.
pub struct NullProgress;

impl ProgressHost for NullProgress {
    fn report(&self, _increment: u8, _message: &str) {}
}

/// Forwards progress reports to the log.
pub struct LogProgress;

impl ProgressHost for LogProgress {
    fn report(&self, increment: u8, message: &str) {
        info!(increment, "{}", message);
    }
}

/// Raise [`PipelineError::Cancelled`] if the token is already set.
pub fn check_cancelled(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_cancelled_reflects_token_state() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token).is_ok());
        token.cancel();
        assert!(matches!(check_cancelled(&token), Err(PipelineError::Cancelled)));
    }
}
