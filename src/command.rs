//! Companion command grammar.
//!
//! The command characteristic accepts a short ASCII string, truncated at
//! the first NUL and bounded by [`COMMAND_MAX_BYTES`]. Unrecognized input
//! is dropped; the protocol has no error reply channel, so the companion
//! app learns nothing about a bad command.

use crate::config::COMMAND_MAX_BYTES;
use heapless::String;

/// One parsed companion command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompanionCommand {
    /// `GET:<filename>` - stream the named file back over the stream
    /// characteristic.
    Get(String<COMMAND_MAX_BYTES>),
    /// `PUMP` - pulse the pump output.
    Pump,
    /// `LIST` - reserved; logged only.
    List,
}

/// Parse one raw command write. Returns `None` for anything the grammar
/// does not recognize.
pub fn parse(data: &[u8]) -> Option<CompanionCommand> {
    // Bound the buffer, then truncate at the first NUL terminator.
    let data = &data[..data.len().min(COMMAND_MAX_BYTES)];
    let data = match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    };
    let text = core::str::from_utf8(data).ok()?;

    if let Some(name) = text.strip_prefix("GET:") {
        let mut filename = String::new();
        // Cannot overflow: the source is already bounded.
        let _ = filename.push_str(name);
        return Some(CompanionCommand::Get(filename));
    }
    match text {
        "PUMP" => Some(CompanionCommand::Pump),
        "LIST" => Some(CompanionCommand::List),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
