//! The byte-oriented TCP front end of the LX200 protocol.
//!
//! Commands arrive framed as `:<cmd><args>#`. A lone `\x06` is an
//! "are-you-there" probe answered with `A`, and a stray `#` is ignored;
//! both are sent liberally by planetarium clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::controller::responder::{CommandResponder, Reply};
use crate::errors::Result;

/// TCP port of the LX200 protocol server.
pub const PORT: u16 = 11880;

const ARE_YOU_THERE: u8 = 0x06;
/// Pause between the parts of a multi-part reply.
const SEND_COMMAND_SLEEP: Duration = Duration::from_millis(10);

/// Accept loop. Clients are served one at a time; the protocol is a strict
/// command/reply sequence and planetarium software reconnects freely.
pub async fn run(responder: Arc<CommandResponder>, listener: TcpListener) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Server started.");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "Client connected.");
        match handle_client(&responder, stream).await {
            Ok(()) => debug!(%peer, "Client disconnected."),
            Err(e) => debug!(%peer, "Client connection ended: {e}"),
        }
    }
}

async fn handle_client(responder: &CommandResponder, stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte).await? == 0 {
            return Ok(());
        }
        match byte[0] {
            ARE_YOU_THERE => {
                writer.write_all(b"A").await?;
                writer.flush().await?;
            }
            // AstroPlanner terminates every command with a stray '#'.
            b'#' => {}
            b':' => {
                let mut buf = Vec::new();
                if reader.read_until(b'#', &mut buf).await? == 0 {
                    return Ok(());
                }
                if buf.last() == Some(&b'#') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf);
                match responder.process_command(line.trim()).await {
                    Ok(reply) => write_reply(&mut writer, &reply).await?,
                    Err(e) => error!("Command {line:?} failed: {e}"),
                }
            }
            other => debug!("Ignoring byte {other:#04x}."),
        }
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> Result<()> {
    match reply {
        Reply::Sequence(parts) => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(SEND_COMMAND_SLEEP).await;
                }
                write_part(writer, part).await?;
            }
            Ok(())
        }
        part => write_part(writer, part).await,
    }
}

/// Write a single non-sequence reply part. Sequences never nest.
async fn write_part<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> Result<()> {
    match reply {
        Reply::None | Reply::Sequence(_) => {}
        Reply::Bare(text) => {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
        Reply::Terminated(text) => {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"#").await?;
            writer.flush().await?;
        }
    }
    Ok(())
}
