//! Opening TCP sessions to an IRC server.

use announcer::{ChatConnector, ChatError, ChatSession, Nickname};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::info;

use crate::connection::{IrcConnection, Registration};

/// Server the announcer connects to unless configured otherwise.
pub const DEFAULT_SERVER: &str = "irc.freenode.net";

/// Plain-text IRC port.
pub const DEFAULT_PORT: u16 = 6667;

/// [`ChatConnector`] dialling a single server over plain TCP.
#[derive(Debug, Clone)]
pub struct IrcConnector {
    server: String,
    port: u16,
    registration: Registration,
}

impl IrcConnector {
    /// Connects to `server:port` as `nickname`. The real name defaults to the
    /// nickname.
    pub fn new(server: impl Into<String>, port: u16, nickname: Nickname) -> Self {
        let realname = nickname.to_string();
        Self {
            server: server.into(),
            port,
            registration: Registration {
                nickname,
                realname,
                password: None,
            },
        }
    }

    /// Sets the real name sent with `USER`.
    pub fn with_realname(mut self, realname: impl Into<String>) -> Self {
        self.registration.realname = realname.into();
        self
    }

    /// Sends `password` with `PASS` before registering.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.registration.password = Some(password.into());
        self
    }

    /// `host:port` this connector dials.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

#[async_trait]
impl ChatConnector for IrcConnector {
    async fn connect(&self) -> Result<ChatSession, ChatError> {
        let address = self.address();
        info!(server = %address, nickname = %self.registration.nickname, "connecting");
        let stream = TcpStream::connect((self.server.as_str(), self.port))
            .await
            .map_err(|source| ChatError::Connect {
                server: address.clone(),
                source,
            })?;
        Ok(IrcConnection::start(stream, &self.registration))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    fn bot() -> Nickname {
        Nickname::new("commit-bot").unwrap()
    }

    #[tokio::test]
    async fn registers_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = IrcConnector::new("127.0.0.1", port, bot()).with_password("secret");
        let (session, accepted) = tokio::join!(connector.connect(), listener.accept());
        let _session = session.unwrap();
        let (stream, _) = accepted.unwrap();

        let mut lines = BufReader::new(stream).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("PASS secret"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("NICK commit-bot"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("USER commit-bot 0 * commit-bot")
        );
    }

    #[tokio::test]
    async fn refused_connection_names_the_server() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = IrcConnector::new("127.0.0.1", port, bot())
            .connect()
            .await
            .err()
            .unwrap();

        match err {
            ChatError::Connect { server, .. } => assert_eq!(server, format!("127.0.0.1:{port}")),
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_match_the_public_network() {
        let connector = IrcConnector::new(DEFAULT_SERVER, DEFAULT_PORT, bot());
        assert_eq!(connector.address(), "irc.freenode.net:6667");
    }
}
