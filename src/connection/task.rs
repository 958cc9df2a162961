//! Connection I/O Task
//!
//! One tokio task per connection: TCP connect, IRC registration, then an
//! event loop multiplexing inbound server lines with allocator commands.
//! The task owns the reconnect policy; the allocator only learns about the
//! connection once it has identified.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::allocator::ConnectionAllocator;
use crate::config::IrcConfig;
use crate::connection::{ConnectionCommand, ConnectionHandle};
use crate::metrics::Metrics;
use crate::pool::{Pool, ServerId};
use crate::protocol::{self, ClientMessage, ServerEvent};
use crate::Result;

/// Drive one connection until its reconnect policy says stop.
///
/// The nickname is allocated up front and revalidated before every attempt:
/// reused if still free, freshly allocated otherwise.
pub async fn run(
    server: ServerId,
    allocator: Arc<Mutex<ConnectionAllocator>>,
    irc: IrcConfig,
    metrics: Arc<Metrics>,
    pool: Weak<Pool>,
) {
    let auto_reconnect = Arc::new(AtomicBool::new(true));
    let mut nick: Option<String> = None;

    loop {
        let current = {
            let alloc = allocator.lock().await;
            match nick.take().filter(|n| !alloc.name_in_use(n)) {
                Some(previous) => previous,
                None => match alloc.allocate_name() {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        // Running out of names implies stuck connections;
                        // nothing sensible left to do for this server.
                        error!(server = %server, error = %e, "cannot name connection, giving up");
                        return;
                    }
                },
            }
        };
        nick = Some(current.clone());

        match session(&server, &current, &irc, &allocator, &auto_reconnect, &metrics).await {
            Ok(()) => debug!(server = %server, connection = %current, "session closed"),
            Err(e) => {
                warn!(server = %server, connection = %current, error = %e, "session failed")
            }
        }

        if !auto_reconnect.load(Ordering::Relaxed) {
            break;
        }
        debug!(server = %server, connection = %current,
               "reconnecting in {:?}", irc.reconnect_delay);
        tokio::time::sleep(irc.reconnect_delay).await;
    }

    // This task may have been the last thing keeping the server entry
    // around; finish the release the remove path deferred.
    if let Some(pool) = pool.upgrade() {
        pool.release_if_drained(&server).await;
    }
    debug!(server = %server, "connection task finished");
}

/// One TCP session: connect, register, run the event loop, and report the
/// disconnect to the allocator if the session had identified.
async fn session(
    server: &ServerId,
    nick: &str,
    irc: &IrcConfig,
    allocator: &Arc<Mutex<ConnectionAllocator>>,
    auto_reconnect: &Arc<AtomicBool>,
    metrics: &Arc<Metrics>,
) -> Result<()> {
    debug!(server = %server, connection = %nick, "connecting");
    let stream = TcpStream::connect((server.host.as_str(), server.port))
        .await
        .with_context(|| format!("failed to connect to {server}"))?;
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    send_line(
        &mut writer,
        &ClientMessage::Nick {
            nickname: nick.to_string(),
        },
    )
    .await?;
    send_line(
        &mut writer,
        &ClientMessage::User {
            username: irc.username.clone(),
            realname: irc.realname.clone(),
        },
    )
    .await?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let mut identified = false;

    let outcome = drive(
        server,
        nick,
        irc,
        allocator,
        auto_reconnect,
        metrics,
        &mut lines,
        &mut writer,
        cmd_tx,
        cmd_rx,
        &mut identified,
    )
    .await;

    if identified {
        metrics.connection_closed();
        allocator.lock().await.on_disconnected(nick);
    }
    outcome
}

/// The session event loop. Returns when the socket closes, the server sends
/// ERROR, or a quit command is processed.
#[allow(clippy::too_many_arguments)]
async fn drive(
    server: &ServerId,
    nick: &str,
    irc: &IrcConfig,
    allocator: &Arc<Mutex<ConnectionAllocator>>,
    auto_reconnect: &Arc<AtomicBool>,
    metrics: &Arc<Metrics>,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
    mut cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    identified: &mut bool,
) -> Result<()> {
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("socket read failed")? else {
                    debug!(server = %server, connection = %nick, "server closed the connection");
                    return Ok(());
                };
                match protocol::parse_line(&line) {
                    Some(ServerEvent::Welcome) if !*identified => {
                        *identified = true;
                        metrics.connection_opened();
                        info!(server = %server, connection = %nick, "identified");
                        let handle = ConnectionHandle::new(
                            nick.to_string(),
                            cmd_tx.clone(),
                            Arc::clone(auto_reconnect),
                        );
                        allocator.lock().await.on_connected(handle);
                    }
                    Some(ServerEvent::Joined { nick: who, channel }) if who == nick => {
                        metrics.channel_joined();
                        allocator.lock().await.on_joined(nick, &channel);
                    }
                    Some(ServerEvent::Parted { nick: who, channel }) if who == nick => {
                        metrics.channel_parted();
                        allocator.lock().await.on_left(nick, &channel);
                    }
                    Some(ServerEvent::Kicked { target, channel }) if target == nick => {
                        warn!(server = %server, connection = %nick, channel, "kicked from channel");
                        metrics.channel_parted();
                        allocator.lock().await.on_left(nick, &channel);
                    }
                    Some(ServerEvent::Ping { token }) => {
                        send_line(writer, &ClientMessage::Pong { token }).await?;
                    }
                    Some(ServerEvent::Error { message }) => {
                        warn!(server = %server, connection = %nick, message, "server error");
                        return Ok(());
                    }
                    _ => {}
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::Join { channel }) => {
                        send_line(writer, &ClientMessage::Join { channel }).await?;
                    }
                    Some(ConnectionCommand::Leave { channel }) => {
                        send_line(writer, &ClientMessage::Part { channel }).await?;
                    }
                    Some(ConnectionCommand::Send { channel, text }) => {
                        send_line(writer, &ClientMessage::Privmsg { channel, text }).await?;
                    }
                    Some(ConnectionCommand::Quit) => {
                        debug!(server = %server, connection = %nick, "quitting on request");
                        // Best effort; the disconnect is what matters
                        let _ = send_line(writer, &ClientMessage::Quit {
                            message: irc.quit_message.clone(),
                        }).await;
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, message: &ClientMessage) -> Result<()> {
    writer
        .write_all(message.to_line().as_bytes())
        .await
        .context("socket write failed")?;
    Ok(())
}
