//! Session State
//!
//! Single responsibility: the single source of truth for "are we
//! authenticated, and as what," observable by any number of independent
//! consumers.
//!
//! # Observer Contract
//!
//! - Notification order is subscription order.
//! - `subscribe` does NOT fire with the current value; a consumer that needs
//!   it reads `token()` itself.
//! - `subscribe` returns a [`TokenWatch`] handle so an observer can be removed
//!   again; without it, observers would leak across component remounts.
//! - `set_token` snapshots the observer list before notifying, so an observer
//!   that triggers another `set_token` mid-notification cannot corrupt the
//!   iteration.
//!
//! Observers run synchronously and outside the session lock; the lock itself
//! is never held across an await point.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

type TokenObserver = Arc<dyn Fn(Option<&str>) + Send + Sync>;

struct Inner {
    token: Option<String>,
    /// Observer set; insertion order is notification order.
    observers: Vec<(u64, TokenObserver)>,
    next_key: u64,
}

/// Holds the current credential token and broadcasts its changes.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

/// Subscription handle returned by [`Session::subscribe`].
///
/// Dropping the handle does NOT remove the observer; call [`TokenWatch::cancel`]
/// to stop receiving notifications.
pub struct TokenWatch {
    key: u64,
    inner: Weak<Mutex<Inner>>,
}

impl TokenWatch {
    /// Remove the observer this handle was returned for.
    pub fn cancel(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.observers.retain(|(key, _)| *key != self.key);
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                token: None,
                observers: Vec::new(),
                next_key: 1,
            })),
        }
    }

    /// Current token; `None` means unauthenticated.
    pub fn token(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.token.clone()
    }

    /// Register an observer for token changes.
    ///
    /// The observer is appended to the set and will be invoked, in
    /// subscription order, on every subsequent `set_token`. It is not invoked
    /// with the current value.
    pub fn subscribe(&self, observer: impl Fn(Option<&str>) + Send + Sync + 'static) -> TokenWatch {
        let observer: TokenObserver = Arc::new(observer);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let key = inner.next_key;
        inner.next_key += 1;
        inner.observers.push((key, observer));

        TokenWatch {
            key,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Replace the token and notify every observer with the new value.
    pub fn set_token(&self, token: Option<String>) {
        let snapshot: Vec<TokenObserver> = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.token = token.clone();
            inner.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        debug!(
            authenticated = token.is_some(),
            observers = snapshot.len(),
            "session token changed"
        );

        // Lock released: an observer may read token() or call set_token again.
        for observer in snapshot {
            observer(token.as_deref());
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observers_fire_in_subscription_order() {
        let session = Session::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            session.subscribe(move |token| {
                order
                    .lock()
                    .unwrap()
                    .push((label, token.map(str::to_string)));
            });
        }

        session.set_token(Some("tok123".to_string()));

        let seen = order.lock().unwrap();
        let labels: Vec<&str> = seen.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, ["first", "second", "third"]);
        assert!(seen
            .iter()
            .all(|(_, t)| t.as_deref() == Some("tok123")));
    }

    #[test]
    fn subscribe_does_not_fire_retroactively() {
        let session = Session::new();
        session.set_token(Some("early".to_string()));

        let fired = Arc::new(Mutex::new(0u32));
        let fired_in_observer = Arc::clone(&fired);
        session.subscribe(move |_| {
            *fired_in_observer.lock().unwrap() += 1;
        });

        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(session.token().as_deref(), Some("early"));

        session.set_token(None);
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn cancelled_observer_stops_firing() {
        let session = Session::new();
        let count = Arc::new(Mutex::new(0u32));

        let count_in_observer = Arc::clone(&count);
        let watch = session.subscribe(move |_| {
            *count_in_observer.lock().unwrap() += 1;
        });

        session.set_token(Some("a".to_string()));
        watch.cancel();
        session.set_token(Some("b".to_string()));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn reentrant_set_token_does_not_corrupt_notification() {
        let session = Session::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reentrant_session = session.clone();
        session.subscribe(move |token| {
            // Flip the first change back to None from inside the observer.
            if token == Some("transient") {
                reentrant_session.set_token(None);
            }
        });

        let seen_in_observer = Arc::clone(&seen);
        session.subscribe(move |token| {
            seen_in_observer
                .lock()
                .unwrap()
                .push(token.map(str::to_string));
        });

        session.set_token(Some("transient".to_string()));

        // The reentrant call completed its own full notification pass first,
        // then the outer pass continued with the value it snapshotted.
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("transient".to_string())]
        );
        assert_eq!(session.token(), None);
    }
}
