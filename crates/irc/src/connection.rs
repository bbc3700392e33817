//! An IRC session over any byte stream.
//!
//! [`IrcConnection::start`] registers with the server and spawns two tasks:
//!
//! - the **writer** drains a queue of outbound [`Message`]s onto the stream;
//!   it shuts the stream down after sending `QUIT`,
//! - the **reader** answers `PING` itself and turns everything the announcer
//!   cares about into [`ChatEvent`]s.
//!
//! The reader emits exactly one [`ChatEvent::Disconnected`], as its last event,
//! when the server sends `ERROR` or closes the stream.
//!
//! Servers relay other users' bytes unchanged, so inbound lines are decoded
//! lossily rather than rejected. Lines longer than [`MAX_LINE_LENGTH`] are
//! dropped whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use announcer::{ChannelName, ChatConnection, ChatError, ChatEvent, ChatSession, Nickname};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::message::Message;

const RPL_WELCOME: &str = "001";
const ERR_NICKNAMEINUSE: &str = "433";

/// Longest inbound line accepted, terminator included.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Identity sent when registering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Requested nickname.
    pub nickname: Nickname,
    /// Free-form real name.
    pub realname: String,
    /// Server password, sent with `PASS` when set.
    pub password: Option<String>,
}

impl Registration {
    fn messages(&self) -> Vec<Message> {
        let nickname = self.nickname.as_str();
        let mut messages = Vec::with_capacity(3);
        if let Some(password) = &self.password {
            messages.push(Message::new("PASS", [password.as_str()]));
        }
        messages.push(Message::new("NICK", [nickname]));
        messages.push(Message::new("USER", [nickname, "0", "*", self.realname.as_str()]));
        messages
    }
}

/// Handle to a live session. Cheap to share; all methods queue and return.
pub struct IrcConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    nickname: Mutex<Nickname>,
}

impl IrcConnection {
    /// Registers over `stream` and starts the session tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(stream: S, registration: &Registration) -> ChatSession
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing, queue) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        for message in registration.messages() {
            let _ = outgoing.send(message);
        }

        tokio::spawn(write_loop(write_half, queue));
        tokio::spawn(read_loop(
            read_half,
            outgoing.clone(),
            events_tx,
            connected.clone(),
        ));

        let connection = Arc::new(Self {
            outgoing,
            connected,
            nickname: Mutex::new(registration.nickname.clone()),
        });
        ChatSession { connection, events }
    }

    fn queue(&self, message: Message) -> Result<(), ChatError> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        self.outgoing
            .send(message)
            .map_err(|_| ChatError::NotConnected)
    }
}

impl ChatConnection for IrcConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn nickname(&self) -> Nickname {
        self.nickname
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_nickname(&self, nickname: &Nickname) -> Result<(), ChatError> {
        self.queue(Message::new("NICK", [nickname.as_str()]))?;
        *self.nickname.lock().unwrap_or_else(PoisonError::into_inner) = nickname.clone();
        Ok(())
    }

    fn join(&self, channel: &ChannelName) -> Result<(), ChatError> {
        self.queue(Message::new("JOIN", [channel.as_str()]))
    }

    fn send(&self, channel: &ChannelName, text: &str) -> Result<(), ChatError> {
        // A line break would end the command early and inject the rest.
        let text = text.replace(['\r', '\n'], " ");
        self.queue(Message::new("PRIVMSG", [channel.as_str(), text.as_str()]))
    }

    fn disconnect(&self, message: &str) -> Result<(), ChatError> {
        self.queue(Message::new("QUIT", [message]))?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

async fn write_loop<W>(mut writer: W, mut queue: mpsc::UnboundedReceiver<Message>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        let line = format!("{message}\r\n");
        trace!(line = line.trim_end(), "sending");
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to write to server");
            return;
        }
        if message.command == "QUIT" {
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "failed to shut down connection");
    }
}

async fn read_loop<R>(
    reader: R,
    outgoing: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedSender<ChatEvent>,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    let reason = loop {
        let line = match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break None,
            Err(e) => {
                warn!(error = %e, "failed to read from server");
                break Some(e.to_string());
            }
        };
        trace!(%line, "received");

        let message = match Message::parse(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "ignoring unparsable line");
                continue;
            }
        };

        match message.command.as_str() {
            "PING" => {
                let _ = outgoing.send(Message::new("PONG", message.params));
            }
            RPL_WELCOME => {
                info!("registered with server");
                let _ = events.send(ChatEvent::Welcome);
            }
            ERR_NICKNAMEINUSE => {
                let _ = events.send(ChatEvent::NicknameInUse);
            }
            "PRIVMSG" => {
                if let Some(event) = public_message(&message) {
                    let _ = events.send(event);
                }
            }
            "ERROR" => break message.params.last().cloned(),
            _ => {}
        }
    };

    connected.store(false, Ordering::SeqCst);
    info!(reason = reason.as_deref().unwrap_or_default(), "connection closed");
    let _ = events.send(ChatEvent::Disconnected { reason });
}

/// Reads one line without its terminator. `Ok(None)` at end of stream.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut overlong = false;
    loop {
        buf.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        let complete = buf.last() == Some(&b'\n');
        if overlong {
            // Still inside a line that was already dropped.
            overlong = !complete;
            continue;
        }
        if !complete && read == MAX_LINE_LENGTH {
            warn!(limit = MAX_LINE_LENGTH, "dropping overlong line from server");
            overlong = true;
            continue;
        }
        let line = String::from_utf8_lossy(buf);
        return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()));
    }
}

fn public_message(message: &Message) -> Option<ChatEvent> {
    let target = message.param(0)?;
    if !target.starts_with(['#', '&']) {
        return None;
    }
    Some(ChatEvent::PublicMessage {
        channel: target.to_string(),
        sender: message.source_nickname().unwrap_or_default().to_string(),
        text: message.param(1).unwrap_or_default().to_string(),
    })
}
