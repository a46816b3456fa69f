//! Disconnect notification plumbing.
//!
//! The owner of a binding keeps the handler alive in an `Arc`; the binding only
//! holds a [`DisconnectCallback`], a weak reference it upgrades when it detects
//! that the underlying connection is gone.

use super::error::{BindingError, BindingResult};
use std::fmt;
use std::sync::{Arc, Weak};

/// Handler invoked when a binding loses its connection.
pub type DisconnectFn = dyn Fn() + Send + Sync;

/// Non-owning reference to a disconnect handler.
#[derive(Clone)]
pub struct DisconnectCallback {
    handler: Weak<DisconnectFn>,
}

impl DisconnectCallback {
    /// Reference `handler` without taking ownership of it.
    pub fn new(handler: &Arc<DisconnectFn>) -> Self {
        Self {
            handler: Arc::downgrade(handler),
        }
    }

    /// Whether the handler is still alive.
    pub fn is_invocable(&self) -> bool {
        self.handler.strong_count() > 0
    }

    /// Invoke the handler. Returns `false` if its owner already dropped it.
    pub fn invoke(&self) -> bool {
        match self.handler.upgrade() {
            Some(handler) => {
                handler();
                true
            }
            None => {
                tracing::warn!("Disconnect detected but the handler has been dropped");
                false
            }
        }
    }
}

impl fmt::Debug for DisconnectCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectCallback")
            .field("invocable", &self.is_invocable())
            .finish()
    }
}

/// Construction options shared by every driver.
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    pub disconnect: Option<DisconnectCallback>,
}

impl BindingOptions {
    pub fn new(disconnect: DisconnectCallback) -> Self {
        Self {
            disconnect: Some(disconnect),
        }
    }

    /// Options referencing `handler`.
    pub fn with_handler(handler: &Arc<DisconnectFn>) -> Self {
        Self::new(DisconnectCallback::new(handler))
    }

    /// Check the options and extract the callback a driver stores.
    pub fn validate(self) -> BindingResult<DisconnectCallback> {
        let disconnect = self
            .disconnect
            .ok_or_else(|| BindingError::invalid_argument("\"disconnect\" is not a function"))?;
        if !disconnect.is_invocable() {
            return Err(BindingError::invalid_argument(
                "\"disconnect\" handler has already been dropped",
            ));
        }
        Ok(disconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler() -> (Arc<DisconnectFn>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: Arc<DisconnectFn> = Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn test_invoke_reaches_handler() {
        let (handler, count) = counting_handler();
        let callback = DisconnectCallback::new(&handler);

        assert!(callback.is_invocable());
        assert!(callback.invoke());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_does_not_own_handler() {
        let (handler, count) = counting_handler();
        let callback = DisconnectCallback::new(&handler);
        drop(handler);

        assert!(!callback.is_invocable());
        assert!(!callback.invoke());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_validate() {
        let (handler, _) = counting_handler();
        assert!(BindingOptions::with_handler(&handler).validate().is_ok());

        assert!(matches!(
            BindingOptions::default().validate(),
            Err(BindingError::InvalidArgument(_))
        ));

        let dangling = BindingOptions::with_handler(&handler);
        drop(handler);
        assert!(matches!(
            dangling.validate(),
            Err(BindingError::InvalidArgument(_))
        ));
    }
}
