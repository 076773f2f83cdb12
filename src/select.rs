// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Multi-channel wait with first-ready commit (§4.4).
//
// Grounded on the C source's `channel_select`/`init_semaphore_select`/
// `cleanup_semaphore_select`: register one semaphore with every listed
// channel, loop scanning each intent with the non-blocking primitive, wait
// on the semaphore when nothing was ready. `registry::Token` plays the role
// of that semaphore; `WaiterRegistry` plays the role of
// `add_semaphore_select_list`/`remove_semaphore_select_list`. Unlike the C
// source (whose `channel_select` only drives the buffered path),
// non-blocking send/receive here also covers the unbuffered rendezvous, so
// select works uniformly across both channel kinds.
//
// The C source's intents are untyped pointers the caller already owns —
// there's nothing for `channel_select` to hand back on failure. Generics
// (§0 of SPEC_FULL) make `Send` intents carry real owned `T`s, so unlike
// the source this module must not let a `Send` payload vanish when select
// fails to commit any intent: every `Send` intent that never got to hand
// its value off comes back to the caller via `SelectError::unsent`
// (mirrors `aria_channel::SendError<T>`/`std::sync::mpsc`'s convention of
// returning the value the channel couldn't take). `SelectError` carries
// owned values only, not borrowed intents — a version holding
// `Vec<SelectIntent<'a, T>>` would tie the error to the lifetime of the
// `Sender`/`Receiver` references passed in, which breaks the common
// pattern of returning a `select` outcome out of a spawned thread
// (`thread::spawn` requires the closure's return type to be `'static`).

use log::trace;

use crate::channel::{Receiver, Sender};
use crate::error::ChannelError;
use crate::registry::{Direction, Token};

/// One entry in a `select` call: a channel half paired with the value to
/// send, or a slot to receive into (§3 "Select intent").
pub enum SelectIntent<'a, T> {
    Send(&'a Sender<T>, T),
    Recv(&'a Receiver<T>),
}

/// The outcome of a `select` call: which intent completed, and — for a
/// `Recv` intent — the value it received.
#[derive(Debug)]
pub struct Selected<T> {
    pub index: usize,
    pub value: Option<T>,
}

/// Returned when no intent could be committed — the matching channel for
/// `index` reported a terminal status (`Closed`, or a `Generic` failure).
/// `unsent` hands back the original value of every `Send` intent that
/// never got to hand it to a channel, paired with that intent's original
/// list position, in list order: nothing a caller passed in is ever
/// dropped silently.
#[derive(Debug)]
pub struct SelectError<T> {
    pub error: ChannelError,
    pub index: usize,
    pub unsent: Vec<(usize, T)>,
}

/// Internal per-intent bookkeeping: a `Send` intent's payload moves in and
/// out of `Option` across scan passes, since a `Full`/`Empty` retry needs
/// the original value back (see `Inner::send_reclaim`).
enum Work<'a, T> {
    Send(&'a Sender<T>, Option<T>),
    Recv(&'a Receiver<T>),
}

/// Waits across every listed intent and commits to the first one that can
/// complete without blocking, in list order; if any intent instead observes
/// a terminal status, returns immediately with the offending index and
/// every unsent `Send` payload handed back uncommitted (§4.4).
pub fn select<T>(intents: Vec<SelectIntent<'_, T>>) -> Result<Selected<T>, SelectError<T>> {
    if intents.is_empty() {
        return Err(SelectError {
            error: ChannelError::Generic("select called with an empty intent list".into()),
            index: 0,
            unsent: Vec::new(),
        });
    }

    let mut work: Vec<Work<'_, T>> = intents
        .into_iter()
        .map(|intent| match intent {
            SelectIntent::Send(tx, value) => Work::Send(tx, Some(value)),
            SelectIntent::Recv(rx) => Work::Recv(rx),
        })
        .collect();

    let token = Token::new();
    for item in &work {
        match item {
            Work::Send(tx, _) => tx.inner.registry.register(Direction::Send, &token),
            Work::Recv(rx) => rx.inner.registry.register(Direction::Recv, &token),
        }
    }

    let outcome = run_scan_loop(&mut work, &token);

    for item in &work {
        match item {
            Work::Send(tx, _) => tx.inner.registry.unregister(Direction::Send, &token),
            Work::Recv(rx) => rx.inner.registry.unregister(Direction::Recv, &token),
        }
    }

    match outcome {
        Ok(selected) => Ok(selected),
        Err((error, index)) => Err(SelectError {
            error,
            index,
            unsent: work
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Work::Send(_, Some(value)) => Some((i, value)),
                    Work::Send(_, None) | Work::Recv(_) => None,
                })
                .collect(),
        }),
    }
}

fn run_scan_loop<T>(
    work: &mut [Work<'_, T>],
    token: &std::sync::Arc<Token>,
) -> Result<Selected<T>, (ChannelError, usize)> {
    let mut baseline = token.snapshot();
    loop {
        for (index, item) in work.iter_mut().enumerate() {
            let outcome = match item {
                Work::Send(tx, slot) => {
                    let value = slot.take().expect("send intent value present unless already sent");
                    match tx.inner.send_reclaim(value, false) {
                        Ok(()) => Ok(None),
                        Err((status, reclaimed)) => {
                            *slot = reclaimed;
                            Err(status)
                        }
                    }
                }
                Work::Recv(rx) => match rx.try_recv() {
                    Ok(v) => Ok(Some(v)),
                    Err(status) => Err(status),
                },
            };
            match outcome {
                Ok(value) => {
                    trace!("select committed at index {index}");
                    return Ok(Selected { index, value });
                }
                Err(ChannelError::Full) | Err(ChannelError::Empty) => continue,
                Err(other) => {
                    trace!("select observed {other:?} at index {index}");
                    return Err((other, index));
                }
            }
        }
        baseline = token.wait_since(baseline);
    }
}
