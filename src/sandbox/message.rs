//! Worker channel protocol.
//!
//! The controller and its workers exchange one tagged message type as
//! JSON lines over the worker's stdio. The add-on process speaks the
//! same protocol on its own stdio, so prompt traffic can be relayed
//! through the worker without reframing.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::addon::AddonDescriptor;
use crate::error::{Error, Result};
use crate::nav::NavigationState;

/// A message on the worker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Controller -> worker: run one callback url.
    Execute {
        addon: AddonDescriptor,
        deps: Vec<AddonDescriptor>,
        cache_root: PathBuf,
        home: PathBuf,
        interpreter: String,
        url: String,
    },
    /// Worker -> controller: the add-on wants user input; blocks until
    /// a reply arrives.
    Prompt { text: String },
    /// Controller -> worker: the user's answer to a prompt.
    PromptReply { text: String },
    /// Controller -> worker: shut down cleanly.
    Stop,
    /// Worker -> controller: the invocation finished.
    Result {
        success: bool,
        state: Option<NavigationState>,
    },
}

/// Writes one message as a JSON line and flushes.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let line = serde_json::to_string(message)
        .map_err(|e| Error::ChannelProtocol(e.to_string()))?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Reads one message line. `Ok(None)` signals a closed channel.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<Message>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::ChannelProtocol(format!("{}: {}", e, trimmed)))
}

/// Attempts to parse a line as a protocol message; plain add-on output
/// returns `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<Message> {
    serde_json::from_str(line.trim()).ok()
}
