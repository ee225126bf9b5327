use std::collections::VecDeque;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug)]
struct Waiter {
    id: u64,
    wake: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct LockState {
    held: bool,
    waiters: VecDeque<Waiter>,
    counter: u64,
}

/// A fair lock for async sections that must not interleave.
///
/// It guards no data: it gives a total order to "read state, await
/// something, mutate state, notify" regions. Waiters are served in
/// arrival order.
#[derive(Debug)]
pub struct FairMutex {
    name: String,
    state: Mutex<LockState>,
}

impl FairMutex {
    pub fn new<S: Into<String>>(name: S) -> Self {
        FairMutex {
            name: name.into(),
            state: Mutex::new(LockState::default()),
        }
    }

    /// Wait until the lock is ours. Must be paired with [`FairMutex::release`],
    /// prefer [`FairMutex::lock`] or [`FairMutex::with_lock`].
    pub async fn acquire(&self) {
        let wake = {
            let mut state = self.state.lock();
            state.counter += 1;
            let id = state.counter;
            if !state.held {
                state.held = true;
                log::debug!("Mutex '{}': acquired lock-{} immediately", self.name, id);
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, wake: tx });
            log::debug!(
                "Mutex '{}': queueing lock-{} (queue length: {})",
                self.name,
                id,
                state.waiters.len()
            );
            rx
        };

        let mut pending = PendingAcquire {
            mutex: self,
            wake,
            done: false,
        };
        pending.wait().await
    }

    /// Hand the lock to the oldest waiter, or mark it free.
    ///
    /// Panics if the lock isn't held: that is a bug in the caller.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if !state.held {
            panic!(
                "Mutex '{}': attempted to release an unlocked mutex",
                self.name
            );
        }

        // waiters that gave up are skipped
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.wake.send(()).is_ok() {
                log::debug!(
                    "Mutex '{}': passing lock to lock-{} (queue remaining: {})",
                    self.name,
                    waiter.id,
                    state.waiters.len()
                );
                return;
            }
        }

        state.held = false;
        log::debug!("Mutex '{}': released without waiters", self.name);
    }

    pub async fn lock(&self) -> FairMutexGuard<'_> {
        self.acquire().await;
        FairMutexGuard { mutex: self }
    }

    /// Run `body` while holding the lock. The lock is released on every
    /// exit path, including errors returned by `body` and panics.
    pub async fn with_lock<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock().await;
        body().await
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().held
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct FairMutexGuard<'a> {
    mutex: &'a FairMutex,
}

impl Drop for FairMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

/// A queued acquisition. If it is dropped after `release` handed it the
/// lock but before it observed the hand-off, the lock is passed on.
struct PendingAcquire<'a> {
    mutex: &'a FairMutex,
    wake: oneshot::Receiver<()>,
    done: bool,
}

impl PendingAcquire<'_> {
    async fn wait(&mut self) {
        // senders are only dropped by `release`, after a failed send to a
        // receiver that is gone, so this can't be an error for a live waiter
        let handed_over = (&mut self.wake).await;
        debug_assert!(handed_over.is_ok());
        self.done = true;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.wake.close();
        if self.wake.try_recv().is_ok() {
            log::debug!(
                "Mutex '{}': waiter cancelled after hand-off, passing the lock on",
                self.mutex.name
            );
            self.mutex.release();
        }
    }
}
