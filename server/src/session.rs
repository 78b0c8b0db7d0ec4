//! Sequences commands for one connection, invokes application hooks, and
//! serializes responses back to the MTA.

use std::collections::VecDeque;
use std::time::Duration;

use asynchronous_codec::Framed;
use futures::{AsyncRead, AsyncWrite, FutureExt, SinkExt, StreamExt};
use tokio::sync::watch;

use oxmilter_common::{
    actions::{Action, Continue, Tempfail},
    decoding::ClientCommand,
    encoding::ServerMessage,
    optneg::{Capability, Protocol},
};
use oxmilter_utils::{debug, warn};

use crate::codec::MilterCodec;
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::hooks::Hooks;
use crate::macros::MacroAccumulator;
use crate::negotiate::negotiate;

/// Where a session currently is in the Milter stage sequence.
///
/// See [`State::advance`] for the transition table this enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the initial options-negotiate exchange.
    AwaitingOptions,
    /// Options negotiated, no connection reported yet.
    Negotiated,
    /// Connection info received.
    Connected,
    /// HELO/EHLO received.
    Helo,
    /// `MAIL FROM` received.
    MailFrom,
    /// One or more `RCPT TO` received.
    RcptTo,
    /// `DATA` received, headers may follow.
    Data,
    /// At least one header received.
    Header,
    /// All headers received.
    EndOfHeaders,
    /// At least one body chunk received.
    Body,
    /// The message was fully received and a verdict was sent.
    EndOfMessage,
    /// The in-progress transaction was aborted.
    Aborted,
    /// The MTA asked to close the connection.
    Quit,
    /// The socket is closed; terminal.
    Closed,
}

/// The category of an incoming domain command, used to drive [`State::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Connect,
    Helo,
    Mail,
    Rcpt,
    Data,
    Header,
    EndOfHeaders,
    Body,
    EndOfMessage,
    Abort,
    Quit,
    /// An SMTP verb not otherwise modeled; never advances the machine.
    Unknown,
}

impl State {
    fn advance(self, step: Step) -> Option<State> {
        use State::{
            Aborted, Body, Connected, Data, EndOfHeaders, EndOfMessage, Header, Helo, MailFrom,
            Negotiated, Quit, RcptTo,
        };
        use Step::{
            Abort as AbortStep, Body as BodyStep, Connect, Data as DataStep,
            EndOfHeaders as EndOfHeadersStep, EndOfMessage as EndOfMessageStep,
            Header as HeaderStep, Helo as HeloStep, Mail as MailStep, Quit as QuitStep, Rcpt,
            Unknown,
        };

        if step == Unknown {
            return Some(self);
        }

        let next = match (self, step) {
            (Negotiated, Connect) => Connected,
            (Negotiated, QuitStep) => Quit,

            (Connected, HeloStep) => Helo,
            (Connected, MailStep) => MailFrom,
            (Connected, AbortStep) => Aborted,
            (Connected, QuitStep) => Quit,

            (Helo, MailStep) => MailFrom,
            (Helo, AbortStep) => Aborted,
            (Helo, QuitStep) => Quit,

            (MailFrom, Rcpt) => RcptTo,
            (MailFrom, AbortStep) => Aborted,
            (MailFrom, QuitStep) => Quit,

            (RcptTo, Rcpt) => RcptTo,
            (RcptTo, DataStep) => Data,
            (RcptTo, AbortStep) => Aborted,
            (RcptTo, QuitStep) => Quit,

            (Data, HeaderStep) => Header,
            (Data, EndOfHeadersStep) => EndOfHeaders,
            (Data, AbortStep) => Aborted,
            (Data, QuitStep) => Quit,

            (Header, HeaderStep) => Header,
            (Header, EndOfHeadersStep) => EndOfHeaders,
            (Header, AbortStep) => Aborted,
            (Header, QuitStep) => Quit,

            (EndOfHeaders, BodyStep) => State::Body,
            (EndOfHeaders, EndOfMessageStep) => EndOfMessage,
            (EndOfHeaders, AbortStep) => Aborted,
            (EndOfHeaders, QuitStep) => Quit,

            (Body, BodyStep) => State::Body,
            (Body, EndOfMessageStep) => EndOfMessage,
            (Body, AbortStep) => Aborted,
            (Body, QuitStep) => Quit,

            (EndOfMessage, Connect) => Connected,
            (EndOfMessage, AbortStep) => Aborted,
            (EndOfMessage, QuitStep) => Quit,

            // Double-abort tolerated: MTAs are known to send it twice after a
            // `Continue` at end-of-body.
            (Aborted, AbortStep) => Aborted,
            (Aborted, Connect) => Connected,
            (Aborted, MailStep) => MailFrom,
            (Aborted, QuitStep) => Quit,

            _ => return None,
        };
        Some(next)
    }
}

/// Drives one accepted connection to completion.
pub struct Session<H: Hooks> {
    hooks: H,
    id: String,
    config: ServerConfig,
    state: State,
    protocol: Protocol,
    capabilities: Capability,
    macros: MacroAccumulator,
}

impl<H: Hooks> Session<H> {
    /// Create a new session for `id` with the given `hooks` implementation.
    #[must_use]
    pub fn new(hooks: H, id: String, config: ServerConfig) -> Self {
        Self {
            hooks,
            id,
            config,
            state: State::AwaitingOptions,
            protocol: Protocol::empty(),
            capabilities: Capability::empty(),
            macros: MacroAccumulator::new(),
        }
    }

    /// This session's correlation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the session to completion: negotiate, then dispatch commands
    /// until the MTA quits or the socket closes.
    ///
    /// # Errors
    /// See [`SessionError`] for the ways this can fail.
    pub async fn run<RW: AsyncRead + AsyncWrite + Unpin + Send>(
        &mut self,
        socket: RW,
    ) -> Result<(), SessionError<H::Error>> {
        let (_tx, rx) = watch::channel(false);
        self.run_until_shutdown(socket, rx).await
    }

    /// Like [`Session::run`], but also exits once `shutdown` is set to
    /// `true` and no command is already queued, so the acceptor's drain
    /// phase can let a session finish whatever it is doing and stop
    /// without waiting for the MTA to send `QUIT`.
    ///
    /// # Errors
    /// See [`SessionError`] for the ways this can fail.
    pub async fn run_until_shutdown<RW: AsyncRead + AsyncWrite + Unpin + Send>(
        &mut self,
        socket: RW,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError<H::Error>> {
        let mut codec = MilterCodec::new(self.config.max_buffer_size);
        let mut framed = Framed::new(socket, &mut codec);
        let mut queue: VecDeque<ClientCommand> = VecDeque::with_capacity(self.config.command_queue_capacity);

        'outer: loop {
            // Top up the queue without blocking, up to its configured
            // capacity, so a burst of already-buffered commands doesn't
            // wait on the hook loop one at a time.
            while queue.len() < self.config.command_queue_capacity {
                match framed.next().now_or_never() {
                    Some(Some(command)) => queue.push_back(command?),
                    Some(None) => break,
                    None => break,
                }
            }

            let command = if let Some(command) = queue.pop_front() {
                command
            } else if *shutdown.borrow() {
                break 'outer;
            } else {
                tokio::select! {
                    biased;
                    command = framed.next() => match command {
                        Some(command) => command?,
                        None => break 'outer,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                }
            };

            debug!(session = %self.id, "received {:?}", command);

            if self.dispatch(command, &mut framed).await? {
                break 'outer;
            }
        }

        Ok(())
    }

    /// Handle one decoded command. Returns `Ok(true)` if the session should
    /// stop reading further commands (quit or terminal error).
    async fn dispatch<RW: AsyncRead + AsyncWrite + Unpin>(
        &mut self,
        command: ClientCommand,
        framed: &mut Framed<RW, &mut MilterCodec>,
    ) -> Result<bool, SessionError<H::Error>> {
        use oxmilter_common::commands::Command as DomainCommand;

        match command {
            ClientCommand::OptNeg(offer) => {
                if self.state != State::AwaitingOptions {
                    return Err(SessionError::ProtocolViolation {
                        state: self.state,
                        command: "OptNeg",
                    });
                }
                let decl = H::declare();
                let reply = negotiate(&offer, &decl, self.config.header_leading_space)?;
                self.protocol = reply.protocol;
                self.capabilities = reply.capabilities;
                self.state = State::Negotiated;
                framed.send(&ServerMessage::from(reply)).await?;
                Ok(false)
            }
            ClientCommand::Macro(macro_) => {
                self.macros.ingest(&macro_);
                Ok(false)
            }
            ClientCommand::Abort(_) => {
                self.advance(Step::Abort, "Abort")?;
                self.hooks.on_abort().await.map_err(SessionError::HookFailure)?;
                Ok(false)
            }
            ClientCommand::Quit(_) | ClientCommand::QuitNc(_) => {
                self.advance(Step::Quit, "Quit")?;
                self.hooks.on_quit().await.map_err(SessionError::HookFailure)?;
                Ok(true)
            }
            ClientCommand::Connect(connect) => {
                self.advance(Step::Connect, "Connect")?;
                Self::dispatch_optional(
                    DomainCommand::Connect(connect.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_connect(connect, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::Helo(helo) => {
                self.advance(Step::Helo, "Helo")?;
                Self::dispatch_optional(
                    DomainCommand::Helo(helo.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_helo(helo, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::Mail(mail) => {
                self.advance(Step::Mail, "Mail")?;
                Self::dispatch_optional(
                    DomainCommand::Mail(mail.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_mail(mail, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::Recipient(rcpt) => {
                self.advance(Step::Rcpt, "Recipient")?;
                Self::dispatch_optional(
                    DomainCommand::Recipient(rcpt.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_rcpt(rcpt, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::Data(_) => {
                self.advance(Step::Data, "Data")?;
                let snapshot = self.macros.snapshot();
                Self::dispatch_optional(
                    DomainCommand::Data(oxmilter_common::commands::Data),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_data(&snapshot),
                    framed,
                )
                .await
            }
            ClientCommand::Header(header) => {
                self.advance(Step::Header, "Header")?;
                Self::dispatch_optional(
                    DomainCommand::Header(header.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_header(header, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::EndOfHeader(_) => {
                self.advance(Step::EndOfHeaders, "EndOfHeader")?;
                let snapshot = self.macros.snapshot();
                Self::dispatch_optional(
                    DomainCommand::EndOfHeader(oxmilter_common::commands::EndOfHeader),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_end_of_header(&snapshot),
                    framed,
                )
                .await
            }
            ClientCommand::Body(body) => {
                self.advance(Step::Body, "Body")?;
                Self::dispatch_optional(
                    DomainCommand::Body(body.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_body(body, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
            ClientCommand::EndOfBody(_) => {
                self.advance(Step::EndOfMessage, "EndOfBody")?;

                let snapshot = self.macros.snapshot();
                let deadline = self.config.hook_deadline;
                let outcome = with_deadline(deadline, self.hooks.on_end_of_message(&snapshot)).await;

                let mut response = match outcome {
                    Ok(Ok(response)) => response,
                    Ok(Err(source)) => return Err(SessionError::HookFailure(source)),
                    Err(_timeout) => {
                        warn!(session = %self.id, "end-of-message hook missed its deadline");
                        oxmilter_common::modifications::ModificationResponse::builder()
                            .build(self.config.eom_deadline_verdict.clone())
                    }
                };

                response.filter_mods_by_caps(self.capabilities);

                let messages: Vec<ServerMessage> = response.into();
                for message in messages {
                    framed.send(&message).await?;
                }
                Ok(false)
            }
            ClientCommand::Unknown(unknown) => {
                Self::dispatch_optional(
                    DomainCommand::Unknown(unknown.clone()),
                    self.protocol,
                    self.config.hook_deadline,
                    &self.id,
                    self.hooks.on_unknown(unknown, &self.macros.snapshot()),
                    framed,
                )
                .await
            }
        }
    }

    fn advance(&mut self, step: Step, name: &'static str) -> Result<(), SessionError<H::Error>> {
        match self.state.advance(step) {
            Some(next) => {
                self.state = next;
                Ok(())
            }
            None => Err(SessionError::ProtocolViolation {
                state: self.state,
                command: name,
            }),
        }
    }

    /// Run a hook that may be skipped (not declared) or silenced (no-reply
    /// negotiated), await it under the configured deadline, and write its
    /// response unless the stage's no-reply bit was negotiated.
    ///
    /// Takes its inputs by value/by-reference rather than `&mut self` so the
    /// caller can pass a hook future that already holds a mutable borrow of
    /// `self.hooks`.
    async fn dispatch_optional<RW, F>(
        command: oxmilter_common::commands::Command,
        protocol: Protocol,
        deadline: Duration,
        session_id: &str,
        hook: F,
        framed: &mut Framed<RW, &mut MilterCodec>,
    ) -> Result<bool, SessionError<H::Error>>
    where
        RW: AsyncRead + AsyncWrite + Unpin,
        F: std::future::Future<Output = Result<Option<Action>, H::Error>>,
    {
        use oxmilter_common::commands::Command as DomainCommand;

        let skip_reply = protocol.should_skip_response(&command);

        let outcome = with_deadline(deadline, hook).await;

        let mut action: Action = match outcome {
            Ok(Ok(Some(action))) => action,
            Ok(Ok(None)) => Continue.into(),
            Ok(Err(source)) => return Err(SessionError::HookFailure(source)),
            Err(_timeout) => {
                warn!(session = %session_id, "hook missed its deadline");
                Tempfail.into()
            }
        };

        if matches!(command, DomainCommand::Body(_))
            && matches!(action, Action::Skip(_))
            && !protocol.contains(Protocol::SMFIP_SKIP)
        {
            warn!(session = %session_id, "hook returned Skip but SMFIP_SKIP was not negotiated, degrading to Continue");
            action = Continue.into();
        }

        if !skip_reply {
            framed.send(&ServerMessage::from(action)).await?;
        }

        Ok(false)
    }
}

async fn with_deadline<F: std::future::Future>(deadline: Duration, fut: F) -> Result<F::Output, ()> {
    tokio::time::timeout(deadline, fut).await.map_err(|_| ())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(State::Negotiated, Step::Connect, Some(State::Connected))]
    #[case(State::Connected, Step::Helo, Some(State::Helo))]
    #[case(State::Connected, Step::Mail, Some(State::MailFrom))]
    #[case(State::Helo, Step::Mail, Some(State::MailFrom))]
    #[case(State::MailFrom, Step::Rcpt, Some(State::RcptTo))]
    #[case(State::RcptTo, Step::Rcpt, Some(State::RcptTo))]
    #[case(State::RcptTo, Step::Data, Some(State::Data))]
    #[case(State::Data, Step::Header, Some(State::Header))]
    #[case(State::Header, Step::Header, Some(State::Header))]
    #[case(State::Header, Step::EndOfHeaders, Some(State::EndOfHeaders))]
    #[case(State::EndOfHeaders, Step::Body, Some(State::Body))]
    #[case(State::Body, Step::Body, Some(State::Body))]
    #[case(State::Body, Step::EndOfMessage, Some(State::EndOfMessage))]
    #[case(State::EndOfMessage, Step::Connect, Some(State::Connected))]
    #[case(State::RcptTo, Step::Abort, Some(State::Aborted))]
    #[case(State::Aborted, Step::Abort, Some(State::Aborted))]
    #[case(State::Aborted, Step::Connect, Some(State::Connected))]
    #[case(State::Connected, Step::Quit, Some(State::Quit))]
    fn advances_along_declared_transitions(
        #[case] from: State,
        #[case] step: Step,
        #[case] expected: Option<State>,
    ) {
        assert_eq!(from.advance(step), expected);
    }

    #[rstest]
    #[case(State::AwaitingOptions, Step::Connect)]
    #[case(State::Negotiated, Step::Helo)]
    #[case(State::Data, Step::Rcpt)]
    #[case(State::Quit, Step::Helo)]
    fn rejects_out_of_order_transitions(#[case] from: State, #[case] step: Step) {
        assert_eq!(from.advance(step), None);
    }

    #[test]
    fn unknown_step_never_changes_state() {
        assert_eq!(State::Data.advance(Step::Unknown), Some(State::Data));
        assert_eq!(State::Quit.advance(Step::Unknown), Some(State::Quit));
    }
}
