//! Async Milter v6 server runtime.
//!
//! The pieces compose bottom-up: a framing codec turns a byte stream into
//! length-prefixed packets; [`negotiate`] turns an MTA's offer and an
//! application's [`AppDecl`] into the flags effective for a session;
//! [`Session`] sequences commands against those flags and calls into a
//! [`Hooks`] implementation; [`Acceptor`] binds a socket and runs many
//! sessions concurrently with graceful shutdown.

pub mod acceptor;
mod codec;
pub mod config;
pub mod error;
pub mod hooks;
pub mod macros;
mod negotiate;
pub mod session;

#[cfg(feature = "_fuzzing")]
pub mod fuzzing;

pub use acceptor::Acceptor;
pub use config::ServerConfig;
pub use error::SessionError;
pub use hooks::{AppDecl, AppDeclBuilder, HookFlags, Hooks, HooksFactory};
pub use macros::{MacroAccumulator, MacroSnapshot};
pub use negotiate::negotiate;
pub use session::{Session, State};

pub(crate) use self::codec::MilterCodec;
