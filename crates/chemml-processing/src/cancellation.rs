//! Cooperative cancellation shared by feature extraction and model training.
//!
//! Long-running loops call [`CancellationToken::check`] between units of work
//! (molecules, folds, trees) and propagate the resulting [`Cancelled`] with `?`.
//!
//! ```
//! use chemml_processing::CancellationToken;
//!
//! let token = CancellationToken::new();
//! assert!(token.check().is_ok());
//!
//! token.cancel();
//! assert!(token.check().is_err());
//!
//! token.reset();
//! assert!(!token.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Cancelled;

/// A clonable flag; every clone observes the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can guard another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns a closure polling this token, for callers that only accept
    /// a plain predicate.
    pub fn as_check_fn(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let cancelled = self.cancelled.clone();
        move || cancelled.load(Ordering::SeqCst)
    }
}

/// Check an optional token; `None` never cancels.
pub(crate) fn checkpoint(token: Option<&CancellationToken>) -> Result<(), Cancelled> {
    token.map_or(Ok(()), CancellationToken::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn test_cancellation_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn test_cancellation_token_reset() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_checkpoint_without_token() {
        assert!(checkpoint(None).is_ok());

        let token = CancellationToken::new();
        token.cancel();
        assert!(checkpoint(Some(&token)).is_err());
    }

    #[test]
    fn test_cancellation_from_other_thread() {
        let token = CancellationToken::new();
        let check = token.as_check_fn();
        let remote = token.clone();

        std::thread::spawn(move || remote.cancel()).join().unwrap();

        assert!(check());
    }
}
