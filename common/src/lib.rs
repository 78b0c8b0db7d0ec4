//! Wire types, codecs and option negotiation primitives for speaking the
//! Milter v6 protocol (the protocol `sendmail`/Postfix use to talk to a
//! mail filter).
//!
//! This crate only concerns itself with de/encoding and the shapes of
//! commands, actions and modification requests. Session orchestration,
//! the connection acceptor and the hook dispatch loop live in
//! `oxmilter-server`.

pub mod actions;
pub mod commands;
pub mod decoding;
pub mod encoding;
pub mod esmtp_args;
pub mod modifications;
pub mod optneg;

mod error;

pub use encoding::ServerMessage;

pub use error::{InvalidData, NotEnoughData, ProtocolError};

pub use modifications::{
    body::ReplaceBody,
    headers::{AddHeader, ChangeHeader, InsertHeader},
    quarantine::Quarantine,
    recipients::{AddRecipient, AddRecipientWithArgs, DeleteRecipient},
    sender::ChangeFrom,
};
