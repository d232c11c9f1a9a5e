//! Wire channel naming.
//!
//! Four channel names are derived from the configured prefix and the side's
//! role so that a server/client pair land on matching channels: whatever one
//! side emits calls on, the other side receives calls on, and likewise for
//! responses.

/// The four channels one engine uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    /// Calls this side sends.
    pub cmd_to: String,
    /// Responses to calls this side sent.
    pub cmd_to_ret: String,
    /// Calls arriving from the peer.
    pub cmd_from: String,
    /// Responses this side sends for arrived calls.
    pub cmd_from_ret: String,
}

fn leg(is_server: bool, cmd: bool) -> &'static str {
    match (is_server, cmd) {
        (true, true) => "a",
        (true, false) => "b",
        (false, true) => "c",
        (false, false) => "d",
    }
}

/// Derive the channel set for one side.
pub fn derive(prefix: &str, is_server: bool) -> ChannelNames {
    let name = |is_server, cmd| format!("{prefix}{}", leg(is_server, cmd));
    ChannelNames {
        cmd_to: name(is_server, true),
        cmd_to_ret: name(is_server, false),
        cmd_from: name(!is_server, true),
        cmd_from_ret: name(!is_server, false),
    }
}
