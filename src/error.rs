// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Status surface for channel operations.
//
// Mirrors the C source's `enum channel_status` (SUCCESS / CLOSED_ERROR /
// CHANNEL_FULL / CHANNEL_EMPTY / DESTROY_ERROR / GENERIC_ERROR) as a single
// closed `thiserror` enum, rather than splitting into per-operation error
// types the way e.g. `aria_channel` does — the source spec models one status
// surface shared by every entry point, including `select`.

use thiserror::Error;

/// Every fallible outcome a channel operation can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed; no further send/receive/select can succeed.
    #[error("channel is closed")]
    Closed,

    /// A non-blocking send (or a `select` send intent) found the channel
    /// momentarily full and did not block.
    #[error("channel is full")]
    Full,

    /// A non-blocking receive (or a `select` receive intent) found the
    /// channel momentarily empty and did not block.
    #[error("channel is empty")]
    Empty,

    /// Misuse: an operation that requires the channel to be closed and
    /// quiescent was attempted while it was still open.
    #[error("channel is not closed")]
    NotClosed,

    /// An underlying primitive (lock, allocation) failed in a way that
    /// could not be recovered. Never a predictable outcome of in-range,
    /// valid usage — see SPEC_FULL.md §0.1.
    #[error("generic channel error: {0}")]
    Generic(String),
}

/// Result alias used by every blocking entry point.
pub type ChannelResult<T> = Result<T, ChannelError>;
