//! Frame kinds.
//!
//! The kind field keeps header and body frames in step: a reader that expects
//! one and sees the other knows the stream is desynchronized.

/// Connection handshake (options), JSON encoded regardless of codec.
pub const OPTION: u16 = 0;

/// Request or response header, encoded by the negotiated codec.
pub const HEADER: u16 = 1;

/// Request argument or response reply, encoded by the negotiated codec.
pub const BODY: u16 = 2;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        OPTION => "option",
        HEADER => "header",
        BODY => "body",
        _ => "unknown",
    }
}
