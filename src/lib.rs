// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Thread-safe, generic, CSP-style channels: a many-producer many-consumer
// conduit with buffered (bounded-FIFO) and unbuffered (rendezvous) variants,
// blocking and non-blocking operations, explicit close, and a `select` that
// picks the first ready among a set of send/receive intents.

mod buffer;
mod registry;

mod error;
pub use error::{ChannelError, ChannelResult};

mod channel;
pub use channel::{channel, Receiver, Sender};

mod select;
pub use select::{select, SelectError, SelectIntent, Selected};
