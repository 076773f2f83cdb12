// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Channel synchronization core: the buffered bounded-queue path and the
// unbuffered rendezvous state machine (§4.1, §4.3).
//
// Grounded on the teacher's `Waiter` (a condvar parked behind a predicate,
// woken by `notify`/`broadcast`) generalized from its single boolean quit
// flag into the richer `Stage` state machine the source spec describes, and
// on the C source's `channel_send`/`channel_receive` for the buffered
// path's lock-wait-mutate-signal shape. The rendezvous protocol in
// `unbuffered_send`/`unbuffered_recv` has no counterpart in the C source
// (which only implements the buffered path) — it follows spec.md §4.3's
// numbered state machine directly, modeled as an explicit loop over
// `Stage` per §9's "goto-based retry" design note rather than a label.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use log::{trace, warn};

use crate::buffer::RingBuffer;
use crate::error::{ChannelError, ChannelResult};
use crate::registry::{Direction, WaiterRegistry};

/// How far along the unbuffered rendezvous protocol is (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Initiated(Direction),
    Committing,
}

struct Rendezvous<T> {
    stage: Stage,
    slot: Option<T>,
    send_waiters: usize,
    recv_waiters: usize,
}

impl<T> Rendezvous<T> {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            slot: None,
            send_waiters: 0,
            recv_waiters: 0,
        }
    }
}

enum Mode<T> {
    Buffered(RingBuffer<T>),
    Unbuffered(Rendezvous<T>),
}

struct Shared<T> {
    closed: bool,
    mode: Mode<T>,
}

/// How long a non-blocking unbuffered send/receive waits for a same-direction
/// peer to reach `INITIATED` before giving up (§4.3 "Non-blocking variants").
const BRIEF_WAIT: Duration = Duration::from_millis(1);

pub(crate) struct Inner<T> {
    state: Mutex<Shared<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    stage_free: Condvar,
    stage_done: Condvar,
    pub(crate) registry: WaiterRegistry,
}

impl<T> Inner<T> {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        let mode = if capacity == 0 {
            Mode::Unbuffered(Rendezvous::new())
        } else {
            Mode::Buffered(RingBuffer::new(capacity))
        };
        Arc::new(Self {
            state: Mutex::new(Shared {
                closed: false,
                mode,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            stage_free: Condvar::new(),
            stage_done: Condvar::new(),
            registry: WaiterRegistry::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `send(value, true)` blocks; `send(value, false)` is `try_send`.
    pub(crate) fn send(&self, value: T, block: bool) -> ChannelResult<()> {
        self.send_reclaim(value, block).map_err(|(e, _)| e)
    }

    /// Same as `send`, but on failure hands the value back instead of
    /// dropping it — `select`'s scan loop needs its original value intact
    /// to retry a `Send` intent on the next pass. The public API never
    /// exposes this: `ChannelError` deliberately carries no payload, to
    /// match the source spec's single closed status enum (see DESIGN.md).
    pub(crate) fn send_reclaim(&self, value: T, block: bool) -> Result<(), (ChannelError, Option<T>)> {
        let guard = self.lock();
        match &guard.mode {
            Mode::Buffered(_) => self.buffered_send(guard, value, block),
            Mode::Unbuffered(_) => self.unbuffered_send(guard, value, block),
        }
    }

    /// `recv(true)` blocks; `recv(false)` is `try_recv`.
    pub(crate) fn recv(&self, block: bool) -> ChannelResult<T> {
        let guard = self.lock();
        match &guard.mode {
            Mode::Buffered(_) => self.buffered_recv(guard, block),
            Mode::Unbuffered(_) => self.unbuffered_recv(guard, block),
        }
    }

    pub(crate) fn close(&self) -> ChannelResult<()> {
        let mut guard = self.lock();
        if guard.closed {
            return Err(ChannelError::Closed);
        }
        guard.closed = true;
        drop(guard);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        self.stage_free.notify_all();
        self.stage_done.notify_all();
        self.registry.notify_all_directions();
        trace!("channel closed");
        Ok(())
    }

    // ---- buffered path (§4.1) ----

    fn buffered_send(
        &self,
        mut guard: MutexGuard<'_, Shared<T>>,
        value: T,
        block: bool,
    ) -> Result<(), (ChannelError, Option<T>)> {
        let mut value = Some(value);
        loop {
            if guard.closed {
                return Err((ChannelError::Closed, value.take()));
            }
            let Mode::Buffered(buf) = &mut guard.mode else {
                unreachable!("buffered_send called on unbuffered channel")
            };
            if buf.is_full() {
                if !block {
                    return Err((ChannelError::Full, value.take()));
                }
                guard = self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner());
                continue;
            }
            buf.push(value.take().expect("value consumed at most once"))
                .expect("just checked not full");
            drop(guard);
            self.not_empty.notify_one();
            self.registry.notify(Direction::Recv);
            trace!("buffered send committed");
            return Ok(());
        }
    }

    fn buffered_recv(
        &self,
        mut guard: MutexGuard<'_, Shared<T>>,
        block: bool,
    ) -> ChannelResult<T> {
        loop {
            if guard.closed {
                return Err(ChannelError::Closed);
            }
            let Mode::Buffered(buf) = &mut guard.mode else {
                unreachable!("buffered_recv called on unbuffered channel")
            };
            if let Some(value) = buf.pop() {
                drop(guard);
                self.not_full.notify_one();
                self.registry.notify(Direction::Send);
                trace!("buffered receive committed");
                return Ok(value);
            }
            if !block {
                return Err(ChannelError::Empty);
            }
            guard = self.not_empty.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    // ---- unbuffered rendezvous (§4.3) ----

    fn unbuffered_send(
        &self,
        mut guard: MutexGuard<'_, Shared<T>>,
        value: T,
        block: bool,
    ) -> Result<(), (ChannelError, Option<T>)> {
        let mut value = Some(value);
        loop {
            if guard.closed {
                return Err((ChannelError::Closed, value.take()));
            }
            let Mode::Unbuffered(r) = &mut guard.mode else {
                unreachable!("unbuffered_send called on buffered channel")
            };
            match r.stage {
                Stage::Idle => {
                    if !block {
                        return self.try_unbuffered_send_fallback(guard, value.take());
                    }
                    r.stage = Stage::Initiated(Direction::Send);
                    r.slot = value.take();
                    drop(guard);
                    self.not_empty.notify_all();
                    self.registry.notify(Direction::Recv);
                    trace!("send became initiator, parking on stage_done");
                    return self.initiator_wait_send().map_err(|e| (e, None));
                }
                Stage::Initiated(Direction::Recv) => {
                    r.slot = value.take();
                    r.stage = Stage::Committing;
                    drop(guard);
                    self.stage_done.notify_all();
                    trace!("send became completer");
                    return Ok(());
                }
                Stage::Initiated(Direction::Send) | Stage::Committing => {
                    if !block {
                        return self.try_unbuffered_send_fallback(guard, value.take());
                    }
                    warn!("send parking on stage_free, same-direction or mid-teardown collision");
                    r.send_waiters += 1;
                    guard = self
                        .stage_free
                        .wait(guard)
                        .unwrap_or_else(|e| e.into_inner());
                    if let Mode::Unbuffered(r) = &mut guard.mode {
                        r.send_waiters -= 1;
                    }
                    continue;
                }
            }
        }
    }

    /// Non-blocking send's "wait briefly" carve-out (§4.3): if receivers are
    /// parked awaiting a slot and nobody holds it yet, give the scheduler a
    /// moment to let one of them reach `INITIATED` before reporting `Full`.
    ///
    /// Every `registry.has_any` query below happens with `lock` already
    /// released — `reg_lock` (inside `has_any`) must never be held while
    /// `lock` is (§4.4 Lock ordering) — so this drops and re-acquires
    /// `guard` around each one rather than querying the registry with the
    /// channel's main lock still held.
    fn try_unbuffered_send_fallback(
        &self,
        guard: MutexGuard<'_, Shared<T>>,
        mut value: Option<T>,
    ) -> Result<(), (ChannelError, Option<T>)> {
        let (stage, recv_waiters) = {
            let Mode::Unbuffered(r) = &guard.mode else {
                unreachable!()
            };
            (r.stage, r.recv_waiters)
        };
        drop(guard);

        let should_wait =
            recv_waiters > 0 && stage == Stage::Idle && !self.registry.has_any(Direction::Recv);

        let mut guard = self.lock();
        if should_wait {
            if guard.closed {
                return Err((ChannelError::Closed, value.take()));
            }
            guard = match self.not_full.wait_timeout(guard, BRIEF_WAIT) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        if guard.closed {
            return Err((ChannelError::Closed, value.take()));
        }

        let stage_now = {
            let Mode::Unbuffered(r) = &guard.mode else {
                unreachable!()
            };
            r.stage
        };

        if matches!(stage_now, Stage::Initiated(Direction::Recv)) {
            let Mode::Unbuffered(r) = &mut guard.mode else {
                unreachable!()
            };
            r.slot = value.take();
            r.stage = Stage::Committing;
            drop(guard);
            self.stage_done.notify_all();
            trace!("non-blocking send became completer after brief wait");
            return Ok(());
        }
        if stage_now != Stage::Idle {
            return Err((ChannelError::Full, value.take()));
        }

        drop(guard);
        if !self.registry.has_any(Direction::Recv) {
            return Err((ChannelError::Full, value.take()));
        }

        let mut guard = self.lock();
        if guard.closed {
            return Err((ChannelError::Closed, value.take()));
        }
        let Mode::Unbuffered(r) = &mut guard.mode else {
            unreachable!()
        };
        if r.stage != Stage::Idle {
            // Lost the race for the slot while `lock` was released to
            // query the registry; report Full rather than disturb
            // whatever now holds it.
            return Err((ChannelError::Full, value.take()));
        }
        r.stage = Stage::Initiated(Direction::Send);
        r.slot = value.take();
        drop(guard);
        self.registry.notify(Direction::Recv);
        trace!("non-blocking send became initiator for a pending select receiver");
        self.initiator_wait_send().map_err(|e| (e, None))
    }

    fn unbuffered_recv(
        &self,
        mut guard: MutexGuard<'_, Shared<T>>,
        block: bool,
    ) -> ChannelResult<T> {
        loop {
            if guard.closed {
                return Err(ChannelError::Closed);
            }
            let Mode::Unbuffered(r) = &mut guard.mode else {
                unreachable!("unbuffered_recv called on buffered channel")
            };
            match r.stage {
                Stage::Idle => {
                    if !block {
                        return self.try_unbuffered_recv_fallback(guard);
                    }
                    r.stage = Stage::Initiated(Direction::Recv);
                    drop(guard);
                    self.not_full.notify_all();
                    self.registry.notify(Direction::Send);
                    trace!("receive became initiator, parking on stage_done");
                    return self.initiator_wait_recv();
                }
                Stage::Initiated(Direction::Send) => {
                    let value = r.slot.take().expect("initiator must have published slot");
                    r.stage = Stage::Committing;
                    drop(guard);
                    self.stage_done.notify_all();
                    trace!("receive became completer");
                    return Ok(value);
                }
                Stage::Initiated(Direction::Recv) | Stage::Committing => {
                    if !block {
                        return self.try_unbuffered_recv_fallback(guard);
                    }
                    warn!("receive parking on stage_free, same-direction or mid-teardown collision");
                    r.recv_waiters += 1;
                    guard = self
                        .stage_free
                        .wait(guard)
                        .unwrap_or_else(|e| e.into_inner());
                    if let Mode::Unbuffered(r) = &mut guard.mode {
                        r.recv_waiters -= 1;
                    }
                    continue;
                }
            }
        }
    }

    /// Symmetric with `try_unbuffered_send_fallback`, including the same
    /// lock-then-release discipline around every `registry.has_any` query
    /// (§4.4 Lock ordering — `reg_lock` must never be held while `lock` is).
    fn try_unbuffered_recv_fallback(&self, guard: MutexGuard<'_, Shared<T>>) -> ChannelResult<T> {
        let (stage, send_waiters) = {
            let Mode::Unbuffered(r) = &guard.mode else {
                unreachable!()
            };
            (r.stage, r.send_waiters)
        };
        drop(guard);

        let should_wait =
            send_waiters > 0 && stage == Stage::Idle && !self.registry.has_any(Direction::Send);

        let mut guard = self.lock();
        if should_wait {
            if guard.closed {
                return Err(ChannelError::Closed);
            }
            guard = match self.not_empty.wait_timeout(guard, BRIEF_WAIT) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        if guard.closed {
            return Err(ChannelError::Closed);
        }

        let stage_now = {
            let Mode::Unbuffered(r) = &guard.mode else {
                unreachable!()
            };
            r.stage
        };

        if matches!(stage_now, Stage::Initiated(Direction::Send)) {
            let Mode::Unbuffered(r) = &mut guard.mode else {
                unreachable!()
            };
            let value = r.slot.take().expect("initiator must have published slot");
            r.stage = Stage::Committing;
            drop(guard);
            self.stage_done.notify_all();
            trace!("non-blocking receive became completer after brief wait");
            return Ok(value);
        }
        if stage_now != Stage::Idle {
            return Err(ChannelError::Empty);
        }

        drop(guard);
        if !self.registry.has_any(Direction::Send) {
            return Err(ChannelError::Empty);
        }

        let mut guard = self.lock();
        if guard.closed {
            return Err(ChannelError::Closed);
        }
        let Mode::Unbuffered(r) = &mut guard.mode else {
            unreachable!()
        };
        if r.stage != Stage::Idle {
            return Err(ChannelError::Empty);
        }
        r.stage = Stage::Initiated(Direction::Recv);
        drop(guard);
        self.registry.notify(Direction::Send);
        trace!("non-blocking receive became initiator for a pending select sender");
        self.initiator_wait_recv()
    }

    /// Send-initiator tail: park on `stage_done` until a completer commits
    /// the transfer, or the channel closes before anyone does.
    fn initiator_wait_send(&self) -> ChannelResult<()> {
        let mut guard = self.lock();
        loop {
            if let Mode::Unbuffered(r) = &guard.mode {
                if matches!(r.stage, Stage::Committing) {
                    if let Mode::Unbuffered(r) = &mut guard.mode {
                        r.stage = Stage::Idle;
                    }
                    drop(guard);
                    self.stage_free.notify_all();
                    trace!("send initiator observed completion, stage freed");
                    return Ok(());
                }
            }
            if guard.closed {
                if let Mode::Unbuffered(r) = &mut guard.mode {
                    r.stage = Stage::Idle;
                    r.slot = None;
                }
                drop(guard);
                self.stage_free.notify_all();
                trace!("send initiator backed out on close");
                return Err(ChannelError::Closed);
            }
            guard = self
                .stage_done
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Receive-initiator tail: identical state machine, returns the value
    /// the completer wrote into the slot.
    fn initiator_wait_recv(&self) -> ChannelResult<T> {
        let mut guard = self.lock();
        loop {
            if let Mode::Unbuffered(r) = &mut guard.mode {
                if matches!(r.stage, Stage::Committing) {
                    let value = r.slot.take().expect("completer must have written slot");
                    r.stage = Stage::Idle;
                    drop(guard);
                    self.stage_free.notify_all();
                    trace!("receive initiator observed completion, stage freed");
                    return Ok(value);
                }
            }
            if guard.closed {
                if let Mode::Unbuffered(r) = &mut guard.mode {
                    r.stage = Stage::Idle;
                    r.slot = None;
                }
                drop(guard);
                self.stage_free.notify_all();
                trace!("receive initiator backed out on close");
                return Err(ChannelError::Closed);
            }
            guard = self
                .stage_done
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let closed = self.state.lock().map(|g| g.closed).unwrap_or(true);
        if closed {
            trace!("channel dropped after close");
        } else {
            trace!("channel dropped while still open");
        }
    }
}

/// The sending half of a channel. Cloning shares the same underlying
/// channel (`Arc`) rather than creating a new one — many-producer is
/// expressed the same way `std::sync::mpsc::Sender` does it.
pub struct Sender<T> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Blocks until the value is delivered (buffered: enqueued; unbuffered:
    /// handed to a matching receiver) or the channel closes.
    pub fn send(&self, value: T) -> ChannelResult<()> {
        self.inner.send(value, true)
    }

    /// Delivers `value` only if it can do so without blocking.
    pub fn try_send(&self, value: T) -> ChannelResult<()> {
        self.inner.send(value, false)
    }

    /// Closes the channel. A second call from either half reports `Closed`.
    pub fn close(&self) -> ChannelResult<()> {
        self.inner.close()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The receiving half of a channel. Cloning shares the same underlying
/// channel, for many-consumer fan-out.
pub struct Receiver<T> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Receiver<T> {
    /// Blocks until a value is available or the channel closes.
    pub fn recv(&self) -> ChannelResult<T> {
        self.inner.recv(true)
    }

    /// Returns a value only if one is immediately available.
    pub fn try_recv(&self) -> ChannelResult<T> {
        self.inner.recv(false)
    }

    /// Closes the channel. A second call from either half reports `Closed`.
    pub fn close(&self) -> ChannelResult<()> {
        self.inner.close()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Creates a channel. `capacity == 0` selects the unbuffered (rendezvous)
/// variant; any other value selects the bounded buffered variant.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let inner = Inner::new(capacity);
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver { inner },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn buffered_fifo_roundtrip() {
        let (tx, rx) = channel::<i32>(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert_eq!(tx.try_send(3), Err(ChannelError::Full));
        assert_eq!(rx.try_recv(), Ok(1));
        tx.try_send(3).unwrap();
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Ok(3));
        assert_eq!(rx.try_recv(), Err(ChannelError::Empty));
    }

    #[test]
    fn buffered_close_fails_future_ops() {
        let (tx, rx) = channel::<i32>(1);
        tx.send(1).unwrap();
        tx.close().unwrap();
        assert_eq!(tx.close(), Err(ChannelError::Closed));
        assert_eq!(tx.try_send(2), Err(ChannelError::Closed));
        assert_eq!(rx.try_recv(), Err(ChannelError::Closed));
    }

    #[test]
    fn unbuffered_rendezvous_hands_off_exactly_one_value() {
        let (tx, rx) = channel::<&'static str>(0);
        let sender = thread::spawn(move || tx.send("x").unwrap());
        let received = rx.recv().unwrap();
        sender.join().unwrap();
        assert_eq!(received, "x");
    }

    #[test]
    fn unbuffered_non_blocking_send_without_receiver_is_full() {
        let (tx, _rx) = channel::<i32>(0);
        assert_eq!(tx.try_send(1), Err(ChannelError::Full));
    }

    #[test]
    fn three_senders_three_receivers_all_pair_up() {
        let (tx, rx) = channel::<i32>(0);
        let mut senders = Vec::new();
        for v in [1, 2, 3] {
            let tx = tx.clone();
            senders.push(thread::spawn(move || tx.send(v).unwrap()));
        }
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().unwrap());
        }
        for s in senders {
            s.join().unwrap();
        }
        received.sort_unstable();
        assert_eq!(received, vec![1, 2, 3]);
    }
}
