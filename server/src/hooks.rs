//! The narrow interface a [`crate::Session`] uses to call into user logic.

use async_trait::async_trait;
use bitflags::bitflags;

use oxmilter_common::{
    actions::Action,
    commands::{Body, Connect, Header, Helo, Mail, Recipient, Unknown},
    modifications::ModificationResponse,
    optneg::{Capability, MacroStage, MacroStages},
};

use crate::macros::MacroSnapshot;

bitflags! {
    /// Which optional callbacks an application provides.
    ///
    /// A bit that is unset means the hook is absent: the negotiator asks the
    /// MTA to skip sending that stage entirely, and the session never calls
    /// the corresponding method even though the trait provides a default
    /// body for it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HookFlags: u16 {
        /// `on_connect`
        const CONNECT = 1 << 0;
        /// `on_helo`
        const HELO = 1 << 1;
        /// `on_mail`
        const MAIL = 1 << 2;
        /// `on_rcpt`
        const RCPT = 1 << 3;
        /// `on_data`
        const DATA = 1 << 4;
        /// `on_header`
        const HEADER = 1 << 5;
        /// `on_end_of_header`
        const END_OF_HEADER = 1 << 6;
        /// `on_body`
        const BODY = 1 << 7;
        /// `on_unknown`
        const UNKNOWN = 1 << 8;
    }
}

/// The static declaration an application makes before the acceptor starts.
///
/// This drives options negotiation (the negotiator never looks at a live
/// [`Hooks`] instance, only at this declaration) and is produced once per
/// implementing type, not once per session.
#[derive(Debug, Clone)]
pub struct AppDecl {
    /// Which stages this application provides a callback for.
    pub hooks: HookFlags,
    /// Subset of `hooks` for which the callback does not need its response
    /// waited for or written back (the MTA is told not to expect a reply).
    pub no_reply: HookFlags,
    /// Manipulation capabilities this application requires at end-of-message.
    pub capabilities: Capability,
    /// Whether this application wants to see recipients the MTA already
    /// rejected.
    pub include_rejected_rcpts: bool,
    /// Macros requested per stage, merged into the negotiation reply's
    /// trailing symbol-list payload.
    pub macro_stages: MacroStages,
}

impl Default for AppDecl {
    fn default() -> Self {
        Self {
            hooks: HookFlags::empty(),
            no_reply: HookFlags::empty(),
            capabilities: Capability::empty(),
            include_rejected_rcpts: false,
            macro_stages: MacroStages::default(),
        }
    }
}

/// Builder for [`AppDecl`].
#[derive(Debug, Clone, Default)]
pub struct AppDeclBuilder {
    decl: AppDecl,
}

impl AppDeclBuilder {
    /// Start a fresh declaration with no hooks and no capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that the application implements the given hook.
    #[must_use]
    pub fn with_hook(mut self, hook: HookFlags) -> Self {
        self.decl.hooks |= hook;
        self
    }

    /// Declare that the given (already-declared) hook does not need a
    /// reply written back to the MTA.
    #[must_use]
    pub fn no_reply(mut self, hook: HookFlags) -> Self {
        self.decl.no_reply |= hook;
        self
    }

    /// Declare required end-of-message manipulation capabilities.
    #[must_use]
    pub fn requires(mut self, capabilities: Capability) -> Self {
        self.decl.capabilities |= capabilities;
        self
    }

    /// Ask to also see recipients the MTA already rejected.
    #[must_use]
    pub fn include_rejected_rcpts(mut self) -> Self {
        self.decl.include_rejected_rcpts = true;
        self
    }

    /// Request the given macro symbols at `stage`.
    #[must_use]
    pub fn request_macros<S: ToString>(mut self, stage: MacroStage, macros: &[S]) -> Self {
        self.decl.macro_stages.with_stage(stage, macros);
        self
    }

    /// Finish building the declaration.
    #[must_use]
    pub fn build(self) -> AppDecl {
        self.decl
    }
}

/// User-supplied decision logic for one Milter session.
///
/// One instance is created per accepted connection. Implement only the
/// stages your application cares about; [`Self::declare`] tells the
/// negotiator which of the default bodies below are actually reachable —
/// a stage not included in [`Self::declare`]'s [`HookFlags`] is asked to be
/// skipped by the MTA and its method is never invoked even though it has a
/// default implementation here.
#[async_trait]
pub trait Hooks: Send {
    /// An application error propagated out of [`crate::Session::run`] as
    /// [`crate::SessionError::HookFailure`].
    type Error: Send;

    /// Which hooks this type provides and which capabilities it needs.
    ///
    /// Called once per application type before any session starts; it must
    /// not depend on per-connection state.
    fn declare() -> AppDecl
    where
        Self: Sized;

    /// Connection information about the SMTP client.
    async fn on_connect(
        &mut self,
        _connect: Connect,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// The HELO/EHLO name sent by the SMTP client.
    async fn on_helo(
        &mut self,
        _helo: Helo,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// The envelope sender of the message being transacted.
    async fn on_mail(
        &mut self,
        _mail: Mail,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// One envelope recipient; called once per `RCPT TO`.
    async fn on_rcpt(
        &mut self,
        _recipient: Recipient,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// Called before headers are sent.
    async fn on_data(&mut self, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// A single header; may be called multiple times.
    async fn on_header(
        &mut self,
        _header: Header,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// Called once all headers have been delivered.
    async fn on_end_of_header(
        &mut self,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// A body chunk; may be called multiple times.
    async fn on_body(
        &mut self,
        _body: Body,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// Called once the whole body has been received. This is the only
    /// stage at which manipulations may be returned.
    async fn on_end_of_message(
        &mut self,
        _macros: &MacroSnapshot,
    ) -> Result<ModificationResponse, Self::Error> {
        Ok(ModificationResponse::empty_continue())
    }

    /// An SMTP verb this implementation does not otherwise model.
    async fn on_unknown(
        &mut self,
        _unknown: Unknown,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        Ok(None)
    }

    /// The in-progress transaction was aborted; any per-message state
    /// should be reset. Macros are retained by the session.
    async fn on_abort(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// The MTA is closing this connection.
    async fn on_quit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Produces one [`Hooks`] instance per accepted connection.
pub trait HooksFactory: Send + Sync {
    /// The application type this factory produces.
    type Hooks: Hooks;

    /// Create a fresh application instance for the session identified by
    /// `session_id`.
    fn create(&self, session_id: &str) -> Self::Hooks;
}

impl<F, H> HooksFactory for F
where
    F: Fn(&str) -> H + Send + Sync,
    H: Hooks,
{
    type Hooks = H;

    fn create(&self, session_id: &str) -> H {
        self(session_id)
    }
}
