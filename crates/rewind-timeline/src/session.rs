//! Per-chunk session exclusion.
//!
//! At most one live `ChunkTimeline` may exist per chunk. `require` blocks
//! until the current holder releases; a closed registry fails fast so
//! shutdown cannot be starved by new arrivals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use rewind_delta::DimChunk;

use crate::error::TimelineError;

#[derive(Default)]
struct SessionState {
    closed: bool,
    live: HashSet<DimChunk>,
}

/// Registry of chunks with a live timeline session.
#[derive(Default)]
pub struct SessionRegistry {
    state: Mutex<SessionState>,
    cond: Condvar,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the session for `pos`, blocking while another holder exists.
    /// Fails with [`TimelineError::DatabaseClosed`] once the registry closed.
    pub fn require(self: &Arc<Self>, pos: DimChunk) -> Result<SessionToken, TimelineError> {
        let mut state = self.state.lock().expect("session lock poisoned");
        loop {
            if state.closed {
                return Err(TimelineError::DatabaseClosed);
            }
            if !state.live.contains(&pos) {
                break;
            }
            state = self.cond.wait(state).expect("session lock poisoned");
        }
        state.live.insert(pos);

        Ok(SessionToken {
            registry: Arc::downgrade(self),
            pos,
            released: AtomicBool::new(false),
        })
    }

    fn release(&self, pos: DimChunk) {
        let mut state = self.state.lock().expect("session lock poisoned");
        state.live.remove(&pos);
        self.cond.notify_all();
    }

    /// Refuse new sessions from now on. Existing holders are unaffected.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("session lock poisoned");
        state.closed = true;
        self.cond.notify_all();
    }

    /// Block until every live session has been released.
    pub fn wait_drain(&self) {
        let mut state = self.state.lock().expect("session lock poisoned");
        while !state.live.is_empty() {
            state = self.cond.wait(state).expect("session lock poisoned");
        }
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        self.state.lock().expect("session lock poisoned").live.len()
    }
}

/// Proof of session ownership for one chunk. Releasing is idempotent and
/// also happens on drop; the token holds only a weak registry reference, so
/// a token outliving its database releases into nothing.
pub struct SessionToken {
    registry: Weak<SessionRegistry>,
    pos: DimChunk,
    released: AtomicBool,
}

impl SessionToken {
    pub fn pos(&self) -> DimChunk {
        self.pos
    }

    /// Release the session, waking any waiter on the same chunk.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.pos);
        }
    }
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        self.release();
    }
}
