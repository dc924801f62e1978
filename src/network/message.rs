//! OMEGA wire format
//!
//! Blocks travel as one text line each:
//!
//! ```text
//! id|epoch_micros|origin|parent1,parent2,...|message
//! ```
//!
//! Commands are sent as `OMEGA <CMD>` followed by encoded blocks, one per
//! line, joined by `\r\n`. Nothing is escaped: a message containing `|` or
//! `\r\n` cannot be decoded, and callers must not mint such blocks.

use crate::core::Block;
use chrono::DateTime;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol prefix of every node-to-node request
pub const PROTOCOL_TAG: &str = "OMEGA";

/// Line separator inside a frame
pub const RECORD_SEPARATOR: &str = "\r\n";

/// Field separator inside an encoded block
pub const FIELD_SEPARATOR: char = '|';

/// Separator of the parent id list
pub const PARENT_SEPARATOR: char = ',';

/// Number of fields in an encoded block
pub const BLOCK_FIELDS: usize = 5;

/// Literal reply to `OMEGA PING`
pub const PING_REPLY: &str = "hi";

/// Wire decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Malformed wire record: {0}")]
    MalformedWireRecord(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Node-to-node commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Pull,
    Push,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Pull => "PULL",
            Command::Push => "PUSH",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PING" => Ok(Command::Ping),
            "PULL" => Ok(Command::Pull),
            "PUSH" => Ok(Command::Push),
            other => Err(WireError::UnknownCommand(other.to_string())),
        }
    }
}

/// Encode a block as a single wire line
pub fn encode_block(block: &Block) -> String {
    format!(
        "{id}{sep}{micros}{sep}{origin}{sep}{parents}{sep}{message}",
        id = block.id(),
        micros = block.timestamp_micros(),
        origin = block.origin(),
        parents = block.parents().join(","),
        message = block.message(),
        sep = FIELD_SEPARATOR,
    )
}

/// Decode a single wire line into a block
///
/// The hash is recomputed from the decoded fields; the wire does not carry it.
pub fn decode_block(line: &str) -> Result<Block, WireError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != BLOCK_FIELDS {
        return Err(WireError::MalformedWireRecord(format!(
            "expected {} fields, found {}",
            BLOCK_FIELDS,
            fields.len()
        )));
    }

    let micros: i64 = fields[1].trim().parse().map_err(|_| {
        WireError::MalformedWireRecord(format!("non-numeric timestamp {:?}", fields[1]))
    })?;
    let created_at = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        WireError::MalformedWireRecord(format!("timestamp out of range: {}", micros))
    })?;

    let parents = fields[3]
        .split(PARENT_SEPARATOR)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Block::with_fields(
        fields[0],
        created_at,
        fields[4],
        fields[2],
        parents,
    ))
}

/// Encode a command envelope: `OMEGA <CMD>` then one block per line
pub fn encode_command(command: Command, blocks: &[Block]) -> String {
    let mut lines = Vec::with_capacity(blocks.len() + 1);
    lines.push(format!("{} {}", PROTOCOL_TAG, command));
    lines.extend(blocks.iter().map(encode_block));
    lines.join(RECORD_SEPARATOR)
}

/// Like [`encode_command`], leaving out blocks that would push the frame past
/// `max_len` bytes; returns the frame and how many blocks were left out
pub fn encode_command_within(
    command: Command,
    blocks: &[Block],
    max_len: usize,
) -> (String, usize) {
    join_within(format!("{} {}", PROTOCOL_TAG, command), blocks, max_len)
}

/// Encode a bare block list (the PULL reply body), bounded the same way as
/// [`encode_command_within`]
pub fn encode_blocks_within(blocks: &[Block], max_len: usize) -> (String, usize) {
    join_within(String::new(), blocks, max_len)
}

fn join_within(mut frame: String, blocks: &[Block], max_len: usize) -> (String, usize) {
    let mut skipped = 0;
    for block in blocks {
        let line = encode_block(block);
        let separator = if frame.is_empty() { 0 } else { RECORD_SEPARATOR.len() };
        if frame.len() + separator + line.len() > max_len {
            skipped += 1;
            continue;
        }
        if separator > 0 {
            frame.push_str(RECORD_SEPARATOR);
        }
        frame.push_str(&line);
    }
    (frame, skipped)
}

/// Non-empty lines of a frame
pub fn frame_lines(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .map(|line| line.trim_end_matches(&['\r', '\n'][..]))
        .filter(|line| !line.is_empty())
}

/// An inbound request, classified by its first line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// `OMEGA <CMD>` followed by payload lines
    Omega {
        command: Result<Command, WireError>,
        payload: Vec<&'a str>,
    },
    /// HTTP-style request line
    Http { method: &'a str, path: &'a str },
    /// Anything else
    Invalid(String),
}

impl<'a> Request<'a> {
    pub fn parse(frame: &'a str) -> Self {
        let mut lines = frame_lines(frame);
        let Some(first) = lines.next() else {
            return Request::Invalid("empty request".to_string());
        };

        if first.starts_with(PROTOCOL_TAG) {
            let token = first.split_whitespace().nth(1).unwrap_or_default();
            return Request::Omega {
                command: token.parse(),
                payload: lines.collect(),
            };
        }

        let mut parts = first.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(method), Some(path)) if first.starts_with("GET") || looks_like_http(first) => {
                Request::Http { method, path }
            }
            _ => Request::Invalid(format!("unrecognised request line {:?}", first)),
        }
    }
}

/// `<METHOD> <path> HTTP/x.y`
fn looks_like_http(line: &str) -> bool {
    line.split_whitespace()
        .nth(2)
        .map(|version| version.starts_with("HTTP/"))
        .unwrap_or(false)
}
