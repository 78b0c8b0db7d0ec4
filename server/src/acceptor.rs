//! Binds a listening socket and drives accepted connections to completion.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::compat::TokioAsyncReadCompatExt;

use oxmilter_utils::{debug, warn};

use crate::config::ServerConfig;
use crate::hooks::HooksFactory;
use crate::session::Session;

/// Binds one listening socket, configures `SO_REUSEADDR` and a custom
/// backlog, and spawns a [`crate::Session`] per accepted connection.
///
/// There is no shared mutable state across sessions: each spawned task owns
/// its [`crate::Session`] outright. The only state this type keeps past
/// `bind` is the [`JoinSet`] of running tasks, consulted solely to drain
/// them on shutdown.
pub struct Acceptor<F: HooksFactory> {
    listener: TcpListener,
    factory: F,
    config: ServerConfig,
}

impl<F> Acceptor<F>
where
    F: HooksFactory + 'static,
    F::Hooks: 'static,
{
    /// Bind a listening socket at `config.bind_host`/`config.bind_port` with
    /// `SO_REUSEADDR` set and `config.backlog` as the listen backlog.
    ///
    /// `tokio::net::TcpListener::bind` does not expose either knob, so the
    /// socket is built with `socket2` and handed to tokio afterwards.
    ///
    /// # Errors
    /// Returns an error if `bind_host`/`bind_port` do not parse as a socket
    /// address, or if any of socket creation, `SO_REUSEADDR`, bind or listen
    /// fails at the OS level.
    pub fn bind(factory: F, config: ServerConfig) -> io::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.bind_host, config.bind_port)
            .parse()
            .map_err(|source| io::Error::new(io::ErrorKind::InvalidInput, source))?;

        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from_std(socket.into())?;

        Ok(Self {
            listener,
            factory,
            config,
        })
    }

    /// The address actually bound, including the OS-assigned port when
    /// `config.bind_port` was `0`.
    ///
    /// # Errors
    /// Propagates any I/O error from the underlying `getsockname` call.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections, spawning one task per session, until `shutdown`
    /// resolves. Each live session is then given up to
    /// `config.drain_timeout` to finish its current command and close
    /// before being aborted outright.
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()>) {
        let Self {
            listener,
            factory,
            config,
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    debug!("acceptor shutting down, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let id = new_session_id();
                            let hooks = factory.create(&id);
                            let mut session = Session::new(hooks, id, config.clone());
                            let rx = shutdown_rx.clone();

                            sessions.spawn(async move {
                                if let Err(source) = session.run_until_shutdown(stream.compat(), rx).await {
                                    warn!(session = %session.id(), peer = %peer, "session ended with an error: {source}");
                                }
                            });
                        }
                        Err(source) => {
                            warn!("failed to accept a connection: {source}");
                        }
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        drain(&mut sessions, config.drain_timeout).await;
    }
}

/// Wait for already-running sessions to finish on their own, up to
/// `timeout`, then abort whatever is left.
async fn drain(sessions: &mut JoinSet<()>, timeout: std::time::Duration) {
    let remaining = sessions.len();
    if remaining == 0 {
        return;
    }
    debug!(sessions = remaining, "draining in-flight sessions");

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        if sessions.is_empty() {
            return;
        }

        tokio::select! {
            biased;
            () = &mut deadline => break,
            joined = sessions.join_next() => {
                if joined.is_none() {
                    return;
                }
            }
        }
    }

    let abandoned = sessions.len();
    if abandoned > 0 {
        warn!(sessions = abandoned, "drain timeout elapsed, aborting remaining sessions");
    }
    sessions.shutdown().await;
}

fn new_session_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
