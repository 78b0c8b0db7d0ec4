//! The top-level error returned by [`crate::Session::run`].

use std::io;

use thiserror::Error;

use oxmilter_common::ProtocolError;

use crate::session::State;

/// Errors that can terminate a single session.
///
/// All variants are local to one connection; nothing here is shared across
/// sessions.
#[derive(Debug, Error)]
pub enum SessionError<AppError> {
    /// A wire-level problem: malformed/truncated/oversized frame, or a
    /// command/payload that failed to decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A command arrived that is not legal from the session's current state.
    #[error("received a {command} command while in state {state:?}")]
    ProtocolViolation {
        /// The state the session was in when the offending command arrived
        state: State,
        /// A short name for the command that violated the transition table
        command: &'static str,
    },

    /// An application hook did not respond within its configured deadline.
    #[error("hook exceeded its deadline")]
    HookDeadline,

    /// An application hook returned an error.
    #[error(transparent)]
    HookFailure(AppError),

    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The acceptor asked this session to stop during a graceful shutdown.
    #[error("session was cancelled during shutdown")]
    Shutdown,
}
