//! One-shot completion latch
//!
//! Each selection whose server principal was unknown at insertion time
//! owns one of these. The background resolver signals it once the
//! server is known; session cancellation trips every latch at once.
//! Waiters observe either completion or cancellation, never a torn
//! state: `signal` is idempotent and `cancel` is sticky, and a waiter
//! that races with `cancel` always reports failure.

use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct LatchState {
    signaled: bool,
    canceled: bool,
}

#[derive(Debug)]
pub(crate) struct CompletionLatch {
    state: Mutex<LatchState>,
    notify: Notify,
}

impl CompletionLatch {
    /// A latch for a selection whose server is still unresolved.
    pub(crate) fn pending() -> Self {
        Self {
            state: Mutex::new(LatchState::default()),
            notify: Notify::new(),
        }
    }

    /// A pre-signalled latch for a selection whose server was known at
    /// insertion time.
    pub(crate) fn signaled() -> Self {
        Self {
            state: Mutex::new(LatchState {
                signaled: true,
                canceled: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Releases all current and future waiters. Idempotent.
    pub(crate) fn signal(&self) {
        let mut state = self.state.lock().expect("latch lock poisoned");
        state.signaled = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Marks the latch canceled and releases all waiters. Sticky: a
    /// canceled latch reports failure even if it was, or later is,
    /// signalled.
    pub(crate) fn cancel(&self) {
        let mut state = self.state.lock().expect("latch lock poisoned");
        state.canceled = true;
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.state.lock().expect("latch lock poisoned").canceled
    }

    /// Waits until the latch is signalled or canceled. Returns `true`
    /// on completion, `false` on cancellation; cancellation wins a race
    /// with completion.
    pub(crate) async fn wait(&self) -> bool {
        loop {
            // Arm the notification before re-checking state so a signal
            // between the check and the await is not lost.
            let notified = self.notify.notified();
            {
                let state = self.state.lock().expect("latch lock poisoned");
                if state.canceled {
                    return false;
                }
                if state.signaled {
                    return true;
                }
            }
            notified.await;
        }
    }
}
