//! Protocol-level constants.

/// Upper bound on a single control-channel message, per the wire contract.
pub const MAX_MESSAGE_BYTES: usize = crate::frame::MAX_MESSAGE_BYTES;
