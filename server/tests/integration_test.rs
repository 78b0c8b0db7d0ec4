//! Drives a bound [`Acceptor`] over a real TCP socket with hand-built
//! Milter frames, standing in for an MTA without depending on one.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use oxmilter_common::actions::{Action, Continue};
use oxmilter_common::commands::{Connect, Header, Helo, Mail, Recipient};
use oxmilter_server::{Acceptor, AppDecl, AppDeclBuilder, HookFlags, Hooks, MacroSnapshot, ServerConfig};

/// Records every callback invocation it sees, replying `Continue` to each.
#[derive(Default)]
struct RecordingHooks {
    connects: Vec<String>,
    helos: Vec<String>,
    mails: Vec<String>,
    rcpts: Vec<String>,
    headers: Vec<(String, String)>,
}

#[async_trait]
impl Hooks for RecordingHooks {
    type Error = &'static str;

    fn declare() -> AppDecl {
        AppDeclBuilder::new()
            .with_hook(HookFlags::CONNECT | HookFlags::HELO | HookFlags::MAIL | HookFlags::RCPT | HookFlags::HEADER)
            .build()
    }

    async fn on_connect(&mut self, connect: Connect, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        self.connects.push(connect.hostname().into_owned());
        Ok(Some(Continue.into()))
    }

    async fn on_helo(&mut self, helo: Helo, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        self.helos.push(helo.helo().into_owned());
        Ok(Some(Continue.into()))
    }

    async fn on_mail(&mut self, mail: Mail, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        self.mails.push(mail.sender().into_owned());
        Ok(Some(Continue.into()))
    }

    async fn on_rcpt(&mut self, recipient: Recipient, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        self.rcpts.push(recipient.recipient().into_owned());
        Ok(Some(Continue.into()))
    }

    async fn on_header(&mut self, header: Header, _macros: &MacroSnapshot) -> Result<Option<Action>, Self::Error> {
        self.headers
            .push((header.name().to_string(), header.value().into_owned()));
        Ok(Some(Continue.into()))
    }
}

/// `length (code + body) | code | body`, the wire framing `MilterCodec`
/// both reads and writes.
fn frame(code: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + body.len());
    #[allow(clippy::cast_possible_truncation)]
    let len = (1 + body.len()) as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.push(code);
    out.extend_from_slice(body);
    out
}

async fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut len_buf = [0_u8; 4];
    stream.read_exact(&mut len_buf).await.expect("reading frame length");
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0_u8; len];
    stream.read_exact(&mut payload).await.expect("reading frame payload");
    (payload[0], payload[1..].to_vec())
}

fn optneg_offer() -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(6); // version
    body.put_u32(0); // capabilities
    body.put_u32(0); // protocol
    frame(b'O', &body)
}

fn connect_body() -> Vec<u8> {
    let mut body = BytesMut::new();
    body.extend_from_slice(b"mail.example.com\0");
    body.put_u8(b'4');
    body.put_u16(2525);
    body.extend_from_slice(b"127.0.0.1");
    body.to_vec()
}

#[tokio::test]
async fn drives_a_full_session_over_a_real_socket() {
    let config = ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        ..ServerConfig::default()
    };
    let acceptor = Acceptor::bind(|_session_id: &str| RecordingHooks::default(), config).expect("bind");
    let addr = acceptor.local_addr().expect("local_addr");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        acceptor
            .serve(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(&optneg_offer()).await.expect("send optneg");
    let (code, _body) = read_frame(&mut client).await;
    assert_eq!(code, b'O', "expected an options-negotiate reply");

    client.write_all(&frame(b'C', &connect_body())).await.expect("send connect");
    let (code, body) = read_frame(&mut client).await;
    assert_eq!(code, b'c', "connect should be answered with Continue");
    assert!(body.is_empty());

    client
        .write_all(&frame(b'H', b"client.example.com\0"))
        .await
        .expect("send helo");
    let (code, _) = read_frame(&mut client).await;
    assert_eq!(code, b'c');

    client
        .write_all(&frame(b'M', b"<sender@example.com>\0"))
        .await
        .expect("send mail");
    let (code, _) = read_frame(&mut client).await;
    assert_eq!(code, b'c');

    client
        .write_all(&frame(b'R', b"<rcpt@example.com>\0"))
        .await
        .expect("send rcpt");
    let (code, _) = read_frame(&mut client).await;
    assert_eq!(code, b'c');

    client.write_all(&frame(b'T', b"")).await.expect("send data");
    let (code, _) = read_frame(&mut client).await;
    assert_eq!(code, b'c');

    let mut header_body = BytesMut::new();
    header_body.extend_from_slice(b"Subject\0");
    header_body.extend_from_slice(b"hello\0");
    client.write_all(&frame(b'L', &header_body)).await.expect("send header");
    let (code, _) = read_frame(&mut client).await;
    assert_eq!(code, b'c');

    // No reply expected for Quit: the session closes the socket instead.
    client.write_all(&frame(b'Q', b"")).await.expect("send quit");

    let mut trailing = [0_u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut trailing))
        .await
        .expect("server should close promptly after quit")
        .expect("read after quit");
    assert_eq!(read, 0, "server should close the connection after Quit");

    let _ = shutdown_tx.send(());
    server.await.expect("acceptor task should not panic");
}

#[tokio::test]
async fn rejects_an_unsupported_protocol_version() {
    let config = ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        ..ServerConfig::default()
    };
    let acceptor = Acceptor::bind(|_session_id: &str| RecordingHooks::default(), config).expect("bind");
    let addr = acceptor.local_addr().expect("local_addr");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        acceptor
            .serve(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    let mut client = TcpStream::connect(addr).await.expect("connect");

    let mut body = BytesMut::new();
    body.put_u32(2); // version below what this implementation supports
    body.put_u32(0);
    body.put_u32(0);
    client.write_all(&frame(b'O', &body)).await.expect("send optneg");

    let mut trailing = [0_u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut trailing))
        .await
        .expect("server should close promptly on an incompatible offer")
        .expect("read after rejected optneg");
    assert_eq!(read, 0, "server should close the connection on a version mismatch");

    let _ = shutdown_tx.send(());
    server.await.expect("acceptor task should not panic");
}
