//! A milter that prints callback arguments for every stage.

use std::env;

use async_trait::async_trait;

use oxmilter_common::{
    actions::{Action, Continue},
    commands::{Body, Connect, Header, Helo, Mail, Recipient, Unknown},
};
use oxmilter_server::{Acceptor, AppDecl, AppDeclBuilder, HookFlags, Hooks, MacroSnapshot, ServerConfig};

struct PrintHooks;

#[async_trait]
impl Hooks for PrintHooks {
    type Error = &'static str;

    fn declare() -> AppDecl {
        AppDeclBuilder::new().with_hook(HookFlags::all()).build()
    }

    async fn on_connect(
        &mut self,
        connect: Connect,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== CONNECT ========");
        println!("  hostname: {}", connect.hostname());
        println!("  address: {:?}:{:?}", connect.address(), connect.port);
        Ok(Some(Continue.into()))
    }

    async fn on_helo(
        &mut self,
        helo: Helo,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== HELO ========");
        println!("  hostname: {}", helo.helo());
        Ok(Some(Continue.into()))
    }

    async fn on_mail(
        &mut self,
        mail: Mail,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== MAIL ========");
        println!("  sender: {}", mail.sender());
        for (key, value) in mail.esmtp_args().iter() {
            println!("  esmtp_args: {key:?}={value:?}");
        }
        Ok(Some(Continue.into()))
    }

    async fn on_rcpt(
        &mut self,
        recipient: Recipient,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== RCPT ========");
        println!("  recipient: {}", recipient.recipient());
        for (key, value) in recipient.esmtp_args().iter() {
            println!("  esmtp_args: {key:?}={value:?}");
        }
        Ok(Some(Continue.into()))
    }

    async fn on_data(&mut self, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        println!("\n======== DATA ========");
        Ok(Some(Continue.into()))
    }

    async fn on_header(
        &mut self,
        header: Header,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== HEADER ========");
        println!("  {}: {}", header.name(), header.value());
        Ok(Some(Continue.into()))
    }

    async fn on_end_of_header(
        &mut self,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== EOH ========");
        Ok(Some(Continue.into()))
    }

    async fn on_body(
        &mut self,
        body: Body,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== BODY ========");
        println!("  body part: {}", String::from_utf8_lossy(body.as_bytes()));
        Ok(Some(Continue.into()))
    }

    async fn on_unknown(
        &mut self,
        unknown: Unknown,
        _macros: &MacroSnapshot,
    ) -> Result<Option<Action>, Self::Error> {
        println!("\n======== UNKNOWN ========");
        println!("  raw: {unknown:?}");
        Ok(Some(Continue.into()))
    }

    async fn on_abort(&mut self) -> Result<(), Self::Error> {
        println!("\n======== ABORT ========");
        Ok(())
    }

    async fn on_quit(&mut self) -> Result<(), Self::Error> {
        println!("\n======== QUIT ========");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = ServerConfig {
        bind_host: env::var("LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        bind_port: env::var("LISTEN_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(8080),
        ..ServerConfig::default()
    };

    let acceptor = Acceptor::bind(|_session_id: &str| PrintHooks, config)?;
    println!("\n======== Bound to {} ========", acceptor.local_addr()?);

    acceptor
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}
