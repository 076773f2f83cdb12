// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Select coordinator: first-ready commit, close propagation, wake-up across
// buffered and unbuffered channels.

use std::thread;
use std::time::Duration;

use taskchan::{channel, select, ChannelError, SelectIntent};

#[test]
fn picks_first_ready_channel_in_listed_order() {
    // §8 scenario 5.
    let (tx1, rx1) = channel::<&'static str>(1);
    let (_tx2, rx2) = channel::<&'static str>(1);
    tx1.try_send("v").unwrap();

    let result = select(vec![SelectIntent::Recv(&rx1), SelectIntent::Recv(&rx2)]).unwrap();
    assert_eq!(result.index, 0);
    assert_eq!(result.value, Some("v"));
}

#[test]
fn select_first_match_is_the_smallest_ready_index_when_both_ready() {
    let (tx1, rx1) = channel::<u32>(1);
    let (tx2, rx2) = channel::<u32>(1);
    tx1.try_send(1).unwrap();
    tx2.try_send(2).unwrap();

    let result = select(vec![SelectIntent::Recv(&rx1), SelectIntent::Recv(&rx2)]).unwrap();
    assert_eq!(result.index, 0);
    assert_eq!(result.value, Some(1));
}

#[test]
fn select_on_send_intent_reports_closed_with_offending_index() {
    // §8 scenario 6.
    let (tx, rx) = channel::<u32>(0);
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        rx.close().unwrap();
    });
    let err = select(vec![SelectIntent::Send(&tx, 1)]).unwrap_err();
    assert_eq!(err.error, ChannelError::Closed);
    assert_eq!(err.index, 0);
    // The unsent value comes back to the caller rather than vanishing.
    assert_eq!(err.unsent, vec![(0, 1)]);
    closer.join().unwrap();
}

#[test]
fn select_blocks_until_a_listed_channel_becomes_ready() {
    let (tx, rx) = channel::<u32>(1);
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        tx.send(42).unwrap();
    });
    let result = select(vec![SelectIntent::Recv(&rx)]).unwrap();
    assert_eq!(result.value, Some(42));
    sender.join().unwrap();
}

#[test]
fn select_send_intent_completes_against_a_parked_receiver() {
    let (tx, rx) = channel::<u32>(0);
    let receiver = thread::spawn(move || rx.recv().unwrap());
    thread::sleep(Duration::from_millis(20));
    let result = select(vec![SelectIntent::Send(&tx, 5)]).unwrap();
    assert_eq!(result.index, 0);
    assert_eq!(result.value, None);
    assert_eq!(receiver.join().unwrap(), 5);
}

#[test]
fn concurrent_selects_never_double_commit_the_same_value() {
    let (tx, rx) = channel::<u32>(1);
    tx.try_send(1).unwrap();
    let rx2 = rx.clone();

    let a = thread::spawn(move || select(vec![SelectIntent::Recv(&rx)]));
    let b = thread::spawn(move || select(vec![SelectIntent::Recv(&rx2)]));
    // Only one value is available and nobody sends another; close the
    // channel shortly after so whichever select lost the race wakes with
    // Closed instead of waiting forever.
    thread::sleep(Duration::from_millis(30));
    tx.close().unwrap();

    let results: Vec<_> = vec![a.join().unwrap(), b.join().unwrap()];
    let values: Vec<u32> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().and_then(|s| s.value))
        .collect();
    assert_eq!(values, vec![1]);
    let closed = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.error == ChannelError::Closed))
        .count();
    assert_eq!(closed, 1);
}
