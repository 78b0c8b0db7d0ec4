//! A milter that tags the last header and upper-cases every body chunk.

use std::env;

use async_trait::async_trait;

use oxmilter_common::{
    actions::Replycode,
    commands::{Body, Header},
    modifications::{body::ReplaceBody, headers::ChangeHeader, ModificationResponse},
    optneg::Capability,
};
use oxmilter_server::{Acceptor, AppDecl, AppDeclBuilder, HookFlags, Hooks, MacroSnapshot, ServerConfig};

#[derive(Default)]
struct ModifyHooks {
    headers: Vec<Header>,
    body_parts: Vec<Body>,
}

#[async_trait]
impl Hooks for ModifyHooks {
    type Error = &'static str;

    fn declare() -> AppDecl {
        AppDeclBuilder::new()
            .with_hook(HookFlags::HEADER | HookFlags::BODY)
            .requires(Capability::SMFIF_CHGHDRS | Capability::SMFIF_CHGBODY)
            .build()
    }

    async fn on_header(
        &mut self,
        header: Header,
        _macros: &MacroSnapshot,
    ) -> Result<Option<oxmilter_common::actions::Action>, Self::Error> {
        self.headers.push(header);
        Ok(None)
    }

    async fn on_body(
        &mut self,
        body: Body,
        _macros: &MacroSnapshot,
    ) -> Result<Option<oxmilter_common::actions::Action>, Self::Error> {
        self.body_parts.push(body);
        Ok(None)
    }

    async fn on_end_of_message(
        &mut self,
        _macros: &MacroSnapshot,
    ) -> Result<ModificationResponse, Self::Error> {
        let mut builder = ModificationResponse::builder();

        if let Some(last_header) = self.headers.last() {
            let new_value = format!("{} was changed", last_header.value());
            builder.push(ChangeHeader::new(
                u32::try_from(self.headers.len()).map_err(|_| "too many headers")?,
                last_header.name().as_bytes(),
                new_value.as_bytes(),
            ));
        }

        for body_part in &self.body_parts {
            let upper = String::from_utf8_lossy(body_part.as_bytes()).to_uppercase();
            builder.push(ReplaceBody::from_iter(upper.as_bytes()));
        }

        self.headers.clear();
        self.body_parts.clear();

        Ok(builder.build(Replycode::new(550, Some([5, 7, 1]), "What a message!")))
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

    let acceptor = Acceptor::bind(|_session_id: &str| ModifyHooks::default(), config)?;
    println!("listening on {}", acceptor.local_addr()?);

    acceptor
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}
