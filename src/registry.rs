// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Waiter registry: per-channel sets of parked `select` tokens, split by
// direction (§3 Data Model — "Waiter registry"; §4.4 "Lock ordering").
//
// Grounded on the C source's `semaphore_select_list` (a linked list of
// `sem_t*`, guarded by `select_mutex`, walked by `signal_semaphore_select` on
// every successful send/receive/close) and on the teacher's `Waiter`
// (condvar + mutex combo used to park/wake threads). The source spec
// generalizes the single undifferentiated list into two sets — one per
// direction — so a send only wakes receive-side waiters and vice versa
// (§4.1, §4.3), which the C source does not need because it has no
// direction-aware select wakeup (its single list is posted on every op).
//
// `reg_lock` here is the `Mutex` inside `WaiterRegistry`; it is always
// acquired after the channel's main `lock` has already been released,
// never nested inside it — see channel.rs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Which half of a channel an operation (or a `select` intent) acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Recv,
}

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A level-triggered "something changed" signal owned by one `select`
/// invocation (§3 "Notification token"). Posted by registry signallers,
/// waited on only by the owning `select`.
pub(crate) struct Token {
    id: u64,
    count: Mutex<u64>,
    cv: Condvar,
}

impl Token {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            count: Mutex::new(0),
            cv: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Current post count, used by `select` to capture a baseline before
    /// scanning so a post that lands between the scan and the wait is never
    /// missed.
    pub(crate) fn snapshot(&self) -> u64 {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wake every thread parked in `wait_since`.
    pub(crate) fn post(&self) {
        let mut n = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *n = n.wrapping_add(1);
        self.cv.notify_all();
    }

    /// Block until the post count has advanced past `baseline`, then return
    /// the new count (the caller's next baseline).
    pub(crate) fn wait_since(&self, baseline: u64) -> u64 {
        let guard = self.count.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .cv
            .wait_while(guard, |n| *n == baseline)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

#[derive(Default)]
struct Sets {
    send: HashMap<u64, Arc<Token>>,
    recv: HashMap<u64, Arc<Token>>,
}

impl Sets {
    fn set_mut(&mut self, dir: Direction) -> &mut HashMap<u64, Arc<Token>> {
        match dir {
            Direction::Send => &mut self.send,
            Direction::Recv => &mut self.recv,
        }
    }
}

/// Per-channel registry of parked `select` tokens, split by direction.
pub(crate) struct WaiterRegistry {
    sets: Mutex<Sets>,
}

impl WaiterRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sets: Mutex::new(Sets::default()),
        }
    }

    pub(crate) fn register(&self, dir: Direction, token: &Arc<Token>) {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        sets.set_mut(dir).insert(token.id(), Arc::clone(token));
    }

    pub(crate) fn unregister(&self, dir: Direction, token: &Arc<Token>) {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        sets.set_mut(dir).remove(&token.id());
    }

    /// Post every token registered for `dir`. Called after the channel's
    /// main lock has already been released (§4.4 Lock ordering).
    pub(crate) fn notify(&self, dir: Direction) {
        let sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        let tokens = match dir {
            Direction::Send => &sets.send,
            Direction::Recv => &sets.recv,
        };
        for token in tokens.values() {
            token.post();
        }
    }

    /// Post every registered token, regardless of direction (used on close).
    pub(crate) fn notify_all_directions(&self) {
        let sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        for token in sets.send.values().chain(sets.recv.values()) {
            token.post();
        }
    }

    /// Whether any `select` has a token registered for `dir` — used by the
    /// unbuffered non-blocking send/receive to decide whether a rendezvous
    /// is imminent (§4.3 "Non-blocking variants").
    pub(crate) fn has_any(&self, dir: Direction) -> bool {
        let sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        !match dir {
            Direction::Send => &sets.send,
            Direction::Recv => &sets.recv,
        }
        .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_only_wakes_registered_direction() {
        let registry = WaiterRegistry::new();
        let send_token = Token::new();
        let recv_token = Token::new();
        registry.register(Direction::Send, &send_token);
        registry.register(Direction::Recv, &recv_token);

        let recv_baseline = recv_token.snapshot();
        registry.notify(Direction::Send);
        assert_eq!(send_token.snapshot(), 1);
        assert_eq!(recv_token.snapshot(), recv_baseline);
    }

    #[test]
    fn unregister_stops_future_notifications() {
        let registry = WaiterRegistry::new();
        let token = Token::new();
        registry.register(Direction::Recv, &token);
        registry.unregister(Direction::Recv, &token);
        registry.notify(Direction::Recv);
        assert_eq!(token.snapshot(), 0);
    }
}
