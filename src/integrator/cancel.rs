use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable flag for aborting in-flight integrations.
///
/// Cloning yields a handle to the same flag. The integrator polls it
/// between batches; a cancelled point resolves as
/// [`LowConfidence`](crate::IntegralStatus::LowConfidence) (or
/// [`Failed`](crate::IntegralStatus::Failed) if it never saw a nonzero
/// weight) instead of blocking the generation barrier.
///
/// # Examples
///
/// ```
/// use rapid_pe::integrator::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every integration holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
