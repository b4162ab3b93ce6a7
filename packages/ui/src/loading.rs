//! Loading/error flags shared by the service states.

use tokio::sync::watch;

/// A service state carrying `loading` and `error` flags.
pub(crate) trait Flags {
    fn set_loading(&mut self, loading: bool);
    fn set_error(&mut self, error: Option<String>);
}

/// Marks the state loading (and clears the previous error) for its lifetime.
/// `loading` is reset on drop, whichever way the operation ends.
pub(crate) struct LoadingGuard<'a, S: Flags> {
    state: &'a watch::Sender<S>,
    owns: Option<Box<dyn Fn() -> bool + Send + Sync + 'a>>,
}

impl<'a, S: Flags> LoadingGuard<'a, S> {
    pub(crate) fn begin(state: &'a watch::Sender<S>) -> Self {
        state.send_modify(|s| {
            s.set_loading(true);
            s.set_error(None);
        });
        Self { state, owns: None }
    }

    /// Like [`begin`](Self::begin), but on drop `loading` is left alone
    /// unless `owns` still holds; another operation may have taken it over.
    pub(crate) fn begin_while(
        state: &'a watch::Sender<S>,
        owns: impl Fn() -> bool + Send + Sync + 'a,
    ) -> Self {
        let mut guard = Self::begin(state);
        guard.owns = Some(Box::new(owns));
        guard
    }
}

impl<S: Flags> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        let owns = &self.owns;
        self.state.send_if_modified(|s| {
            if owns.as_ref().is_some_and(|owns| !owns()) {
                return false;
            }
            s.set_loading(false);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct State {
        loading: bool,
        error: Option<String>,
    }

    impl Flags for State {
        fn set_loading(&mut self, loading: bool) {
            self.loading = loading;
        }
        fn set_error(&mut self, error: Option<String>) {
            self.error = error;
        }
    }

    #[test]
    fn test_guard_clears_loading_on_every_exit() {
        let (tx, rx) = watch::channel(State {
            loading: false,
            error: Some("stale".to_string()),
        });

        fn fails(tx: &watch::Sender<State>) -> Result<(), String> {
            let _loading = LoadingGuard::begin(tx);
            assert!(tx.borrow().loading);
            Err("boom".to_string())
        }

        assert!(fails(&tx).is_err());
        assert!(!rx.borrow().loading);
        assert!(rx.borrow().error.is_none());
    }

    #[test]
    fn test_guard_leaves_loading_it_no_longer_owns() {
        let (tx, rx) = watch::channel(State::default());
        let owner = AtomicBool::new(true);

        let guard = LoadingGuard::begin_while(&tx, || owner.load(Ordering::SeqCst));
        owner.store(false, Ordering::SeqCst);
        drop(guard);
        assert!(rx.borrow().loading);

        let guard = LoadingGuard::begin_while(&tx, || true);
        drop(guard);
        assert!(!rx.borrow().loading);
    }
}
