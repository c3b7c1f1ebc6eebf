//! tether-protocol: in-band control framing for tether sessions
//!
//! One direction of a tether connection may carry a lightweight control
//! channel next to the payload bytes: the byte `0xFF` is reserved to
//! introduce fixed-length command frames (window size, ping, pong), and
//! literal `0xFF` payload bytes travel doubled. This crate defines the
//! wire format ([`ControlFrame`]) and the three buffer disciplines the
//! relay drives ([`RawBuffer`], [`FrameEncoder`], [`FrameDecoder`]).

pub mod buffer;
pub mod wire;

// Re-export main types at crate root
pub use buffer::{ControlHandler, FrameDecoder, FrameEncoder, RawBuffer, StreamBuffer};
pub use wire::{CodecError, ControlFrame, ESCAPE, TAG_PING, TAG_PONG, TAG_WINDOW_SIZE};
