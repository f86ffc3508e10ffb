//! Line protocol commands.
//!
//! One command per line. The keyword is case-insensitive; room names and
//! connection ids are single whitespace-free tokens; message text runs to the
//! end of the line.

use std::str::FromStr;

use roomcast_core::ConnectionId;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `JOIN <room>`
    Join(String),
    /// `LEAVE <room>`
    Leave(String),
    /// `LEAVEALL`
    LeaveAll,
    /// `SAY <room> <text>`: emit to a room, excluding the sender
    Say {
        /// Target room
        room: String,
        /// Message text
        text: String,
    },
    /// `ALL <text>`: broadcast to every connection
    All(String),
    /// `TELL <id> <text>`: direct message to one connection
    Tell {
        /// Recipient connection
        to: ConnectionId,
        /// Message text
        text: String,
    },
    /// `ROOMS`
    Rooms,
    /// `WHO <room>`
    Who(String),
    /// `ID`
    Id,
    /// `QUIT`
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Blank line
    #[error("empty command")]
    Empty,

    /// Keyword not recognized
    #[error("unknown command: {0}")]
    Unknown(String),

    /// Required argument absent
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    /// Argument given to a command that takes fewer
    #[error("unexpected argument for {0}")]
    UnexpectedArgument(&'static str),

    /// Line bytes are not UTF-8
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

impl Command {
    /// Parse one raw line as read from the socket.
    pub fn from_line(line: &[u8]) -> Result<Self, ParseError> {
        std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?.parse()
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (keyword, rest) = split_token(line);
        match keyword.to_ascii_uppercase().as_str() {
            "JOIN" => Ok(Self::Join(single_token("JOIN", rest)?)),
            "LEAVE" => Ok(Self::Leave(single_token("LEAVE", rest)?)),
            "LEAVEALL" => no_argument("LEAVEALL", rest, Self::LeaveAll),
            "SAY" => {
                let (room, text) = token_and_text("SAY", rest)?;
                Ok(Self::Say { room, text })
            },
            "ALL" => {
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument("ALL"));
                }
                Ok(Self::All(rest.to_owned()))
            },
            "TELL" => {
                let (to, text) = token_and_text("TELL", rest)?;
                Ok(Self::Tell { to: ConnectionId::new(to), text })
            },
            "ROOMS" => no_argument("ROOMS", rest, Self::Rooms),
            "WHO" => Ok(Self::Who(single_token("WHO", rest)?)),
            "ID" => no_argument("ID", rest, Self::Id),
            "QUIT" => no_argument("QUIT", rest, Self::Quit),
            _ => Err(ParseError::Unknown(keyword.to_owned())),
        }
    }
}

/// Split off the first whitespace-delimited token.
fn split_token(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (input, ""),
    }
}

fn single_token(command: &'static str, rest: &str) -> Result<String, ParseError> {
    let (token, extra) = split_token(rest);
    if token.is_empty() {
        return Err(ParseError::MissingArgument(command));
    }
    if !extra.is_empty() {
        return Err(ParseError::UnexpectedArgument(command));
    }
    Ok(token.to_owned())
}

fn token_and_text(command: &'static str, rest: &str) -> Result<(String, String), ParseError> {
    let (token, text) = split_token(rest);
    if token.is_empty() || text.is_empty() {
        return Err(ParseError::MissingArgument(command));
    }
    Ok((token.to_owned(), text.to_owned()))
}

fn no_argument(command: &'static str, rest: &str, parsed: Command) -> Result<Command, ParseError> {
    if rest.is_empty() { Ok(parsed) } else { Err(ParseError::UnexpectedArgument(command)) }
}
