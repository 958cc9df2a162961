//! IRC Protocol Constants

// Registration / lifecycle numerics and commands
pub const RPL_WELCOME: &str = "001";

pub const CMD_NICK: &str = "NICK";
pub const CMD_USER: &str = "USER";
pub const CMD_JOIN: &str = "JOIN";
pub const CMD_PART: &str = "PART";
pub const CMD_KICK: &str = "KICK";
pub const CMD_PRIVMSG: &str = "PRIVMSG";
pub const CMD_PING: &str = "PING";
pub const CMD_PONG: &str = "PONG";
pub const CMD_QUIT: &str = "QUIT";
pub const CMD_ERROR: &str = "ERROR";

// Line framing
pub const LINE_TERMINATOR: &str = "\r\n";

// RFC 2812 limit; lines beyond this are truncated by most servers
pub const MAX_LINE_LENGTH: usize = 512;
