//! Minimal STOMP 1.2 frame codec
//!
//! The broker side of this protocol is a STOMP 1.2 endpoint reached over a
//! raw WebSocket (subprotocol `v12.stomp`, no SockJS). A frame is a command
//! line, zero or more `name:value` header lines, a blank line, an optional
//! body, and a NUL terminator:
//!
//! ```text
//! SUBSCRIBE
//! id:sub-0
//! destination:/topic/runs/42/status
//!
//! \0
//! ```
//!
//! A bare EOL is a heartbeat frame. Header names and values are escaped in
//! every frame except CONNECT and CONNECTED, per the STOMP 1.2 rules.
//!
//! Parsing never panics: malformed input comes back as `Err` and the caller
//! decides whether to drop the frame or fail the connection.

use crate::error::{Result, TopicSocketError};
use std::time::Duration;

/// STOMP frame commands used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client -> broker
    Connect,
    Subscribe,
    Unsubscribe,
    Send,
    Disconnect,
    // broker -> client
    Connected,
    Message,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Command> {
        match line {
            "CONNECT" => Ok(Command::Connect),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "SEND" => Ok(Command::Send),
            "DISCONNECT" => Ok(Command::Disconnect),
            "CONNECTED" => Ok(Command::Connected),
            "MESSAGE" => Ok(Command::Message),
            "ERROR" => Ok(Command::Error),
            other => Err(TopicSocketError::Frame(format!(
                "unknown command: {:?}",
                other
            ))),
        }
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// The STOMP heartbeat frame: a single EOL
    pub const HEARTBEAT: &'static str = "\n";

    pub fn new(
        command: Command,
        headers: Vec<(String, String)>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            command,
            headers,
            body: body.into(),
        }
    }

    /// CONNECT frame opening a STOMP session
    ///
    /// `heartbeat` is advertised symmetrically (outgoing and incoming).
    pub fn connect(host: &str, heartbeat: Duration) -> Self {
        let millis = heartbeat.as_millis();
        Self::new(
            Command::Connect,
            vec![
                ("accept-version".into(), "1.2".into()),
                ("host".into(), host.into()),
                ("heart-beat".into(), format!("{},{}", millis, millis)),
            ],
            "",
        )
    }

    /// SUBSCRIBE frame registering interest in a destination
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(
            Command::Subscribe,
            vec![
                ("id".into(), id.into()),
                ("destination".into(), destination.into()),
            ],
            "",
        )
    }

    /// UNSUBSCRIBE frame tearing down a wire-level subscription
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe, vec![("id".into(), id.into())], "")
    }

    /// SEND frame publishing a JSON body to a destination
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(
            Command::Send,
            vec![
                ("destination".into(), destination.into()),
                ("content-type".into(), "application/json".into()),
            ],
            body,
        )
    }

    /// DISCONNECT frame closing the session cleanly
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect, Vec::new(), "")
    }

    /// First value of the named header, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the frame to its wire form
    pub fn encode(&self) -> String {
        // CONNECT and CONNECTED headers are transmitted verbatim; all other
        // frames escape per STOMP 1.2
        let escaped = !matches!(self.command, Command::Connect | Command::Connected);

        let mut out = String::with_capacity(
            self.command.as_str().len() + self.headers.len() * 16 + self.body.len() + 4,
        );
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escaped {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse a raw WebSocket text payload into a frame
    ///
    /// Returns `Ok(None)` for a heartbeat. The trailing NUL is optional on
    /// input; lines may end in either `\n` or `\r\n`.
    pub fn parse(raw: &str) -> Result<Option<Frame>> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        if raw.is_empty() || raw == "\n" || raw == "\r\n" {
            return Ok(None);
        }

        let (command_line, mut rest) = next_line(raw).ok_or_else(|| {
            TopicSocketError::Frame("frame has no command line".into())
        })?;
        let command = Command::parse(command_line)?;
        let escaped = !matches!(command, Command::Connect | Command::Connected);

        let mut headers = Vec::new();
        loop {
            let (line, remainder) = next_line(rest).ok_or_else(|| {
                TopicSocketError::Frame("frame missing header terminator".into())
            })?;
            rest = remainder;
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                TopicSocketError::Frame(format!("malformed header line: {:?}", line))
            })?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Some(Frame {
            command,
            headers,
            body: rest.to_string(),
        }))
    }
}

/// Split off the next line, accepting both `\n` and `\r\n` endings
fn next_line(input: &str) -> Option<(&str, &str)> {
    let (line, rest) = input.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(TopicSocketError::Frame(format!(
                    "invalid escape sequence: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe() {
        let frame = Frame::subscribe("sub-0", "/topic/runs/42/status");
        assert_eq!(
            frame.encode(),
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/runs/42/status\n\n\0"
        );
    }

    #[test]
    fn test_encode_connect_advertises_heartbeat() {
        let frame = Frame::connect("example.org", Duration::from_secs(10));
        let wire = frame.encode();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("accept-version:1.2\n"));
        assert!(wire.contains("heart-beat:10000,10000\n"));
    }

    #[test]
    fn test_parse_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/a\nsubscription:sub-3\n\n{\"x\":1}\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("destination"), Some("/topic/a"));
        assert_eq!(frame.header("subscription"), Some("sub-3"));
        assert_eq!(frame.body, "{\"x\":1}");
    }

    #[test]
    fn test_parse_accepts_crlf_and_missing_nul() {
        let raw = "CONNECTED\r\nversion:1.2\r\n\r\n";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
    }

    #[test]
    fn test_heartbeat_is_not_a_frame() {
        assert_eq!(Frame::parse("\n").unwrap(), None);
        assert_eq!(Frame::parse("\r\n").unwrap(), None);
        assert_eq!(Frame::parse("").unwrap(), None);
    }

    #[test]
    fn test_header_escaping_round_trip() {
        let frame = Frame::new(
            Command::Send,
            vec![("weird:name".into(), "line\nbreak\\and:colon".into())],
            "body",
        );
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_body_may_contain_anything_after_blank_line() {
        let raw = "MESSAGE\ndestination:/topic/a\n\nnot json: {]\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.body, "not json: {]");
    }

    #[test]
    fn test_malformed_frames_error_instead_of_panicking() {
        assert!(Frame::parse("BOGUS\n\n\0").is_err());
        assert!(Frame::parse("SUBSCRIBE\nid=oops\n\n\0").is_err());
        assert!(Frame::parse("SUBSCRIBE\nid:sub-0").is_err());
    }

    #[test]
    fn test_first_header_occurrence_wins() {
        let raw = "MESSAGE\ndestination:/topic/a\ndestination:/topic/b\n\n\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.header("destination"), Some("/topic/a"));
    }
}
