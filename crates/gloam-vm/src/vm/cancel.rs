//! Hierarchical cancellation
//!
//! Every execution unit owns a token; a coroutine's token is a child of the
//! token of the unit that created it. Cancelling a token cancels all of its
//! descendants. Tokens are cheap to clone and safe to trip from any thread.

use crate::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is cancelled whenever `self` is
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        let mut parent = self.inner.parent.as_ref();
        while let Some(token) = parent {
            if token.inner.cancelled.load(Ordering::Acquire) {
                return true;
            }
            parent = token.inner.parent.as_ref();
        }
        false
    }
}
