//! IRC Message Formatting and Parsing

use super::constants::*;
use std::fmt;

/// Outbound client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Nick { nickname: String },
    User { username: String, realname: String },
    Join { channel: String },
    Part { channel: String },
    Privmsg { channel: String, text: String },
    Pong { token: String },
    Quit { message: String },
}

impl fmt::Display for ClientMessage {
    /// Render the message as a wire line, without the trailing CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Nick { nickname } => write!(f, "{} {}", CMD_NICK, nickname),
            ClientMessage::User { username, realname } => {
                write!(f, "{} {} 0 * :{}", CMD_USER, username, realname)
            }
            ClientMessage::Join { channel } => write!(f, "{} {}", CMD_JOIN, channel),
            ClientMessage::Part { channel } => write!(f, "{} {}", CMD_PART, channel),
            ClientMessage::Privmsg { channel, text } => {
                write!(f, "{} {} :{}", CMD_PRIVMSG, channel, text)
            }
            ClientMessage::Pong { token } => write!(f, "{} :{}", CMD_PONG, token),
            ClientMessage::Quit { message } => write!(f, "{} :{}", CMD_QUIT, message),
        }
    }
}

impl ClientMessage {
    /// Wire form including the line terminator. Overlong lines are cut at
    /// the nearest character boundary under the limit.
    pub fn to_line(&self) -> String {
        let mut line = self.to_string();
        let max = MAX_LINE_LENGTH - LINE_TERMINATOR.len();
        if line.len() > max {
            let mut cut = max;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        line.push_str(LINE_TERMINATOR);
        line
    }
}

/// Inbound lifecycle signals the state machine reacts to. All other server
/// traffic parses to `None` and is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// RPL_WELCOME: registration accepted, the connection is identified.
    Welcome,
    /// Someone joined a channel (the nick is taken from the prefix).
    Joined { nick: String, channel: String },
    /// Someone parted a channel.
    Parted { nick: String, channel: String },
    /// Someone was kicked out of a channel.
    Kicked { target: String, channel: String },
    /// Server liveness probe; must be answered with PONG.
    Ping { token: String },
    /// Server-initiated termination notice.
    Error { message: String },
}

/// Parse one inbound line into a lifecycle event, if it is one.
pub fn parse_line(line: &str) -> Option<ServerEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    // PING and ERROR arrive without a prefix
    if let Some(rest) = line.strip_prefix(CMD_PING) {
        let token = rest.trim_start().trim_start_matches(':').to_string();
        return Some(ServerEvent::Ping { token });
    }
    if let Some(rest) = line.strip_prefix(CMD_ERROR) {
        let message = rest.trim_start().trim_start_matches(':').to_string();
        return Some(ServerEvent::Error { message });
    }

    // ":prefix COMMAND params [:trailing]"
    let (prefix, rest) = match line.strip_prefix(':') {
        Some(rest) => {
            let mut parts = rest.splitn(2, ' ');
            let prefix = parts.next()?;
            (prefix, parts.next()?.trim_start())
        }
        None => ("", line),
    };

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?;
    let params = parts.next().unwrap_or("").trim_start();

    match command {
        RPL_WELCOME => Some(ServerEvent::Welcome),
        CMD_JOIN => Some(ServerEvent::Joined {
            nick: prefix_nick(prefix)?,
            channel: first_param(params)?,
        }),
        CMD_PART => Some(ServerEvent::Parted {
            nick: prefix_nick(prefix)?,
            channel: first_param(params)?,
        }),
        CMD_KICK => {
            // "KICK #channel nick :reason"
            let mut fields = params.split_whitespace();
            let channel = fields.next()?.to_string();
            let target = fields.next()?.to_string();
            Some(ServerEvent::Kicked { target, channel })
        }
        _ => None,
    }
}

/// Extract the nickname from a "nick!user@host" prefix.
fn prefix_nick(prefix: &str) -> Option<String> {
    let nick = prefix.split('!').next()?;
    if nick.is_empty() {
        None
    } else {
        Some(nick.to_string())
    }
}

/// First parameter, stripping a leading ':' (servers differ on whether the
/// channel of a JOIN is trailing or not).
fn first_param(params: &str) -> Option<String> {
    let param = params.split_whitespace().next()?;
    Some(param.trim_start_matches(':').to_string())
}
