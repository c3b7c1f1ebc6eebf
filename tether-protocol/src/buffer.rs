//! Stream buffer disciplines
//!
//! Every copy direction stages its bytes in one of three disciplines
//! sharing a single contract: `write` appends input (transforming it if
//! the discipline calls for it), `peek` exposes the staged bytes as one
//! contiguous view, and `ack` consumes however much the caller managed
//! to flush. The relay only ever talks to [`StreamBuffer`], so a
//! direction's discipline is fixed at wiring time and invisible after.

use bytes::{Buf, BufMut, BytesMut};

use crate::wire::{self, CodecError, ControlFrame, ESCAPE};

/// Callbacks for command frames recognized by a [`FrameDecoder`].
///
/// Injected at decoder construction. All methods default to no-ops so a
/// driver implements only the frames it reacts to.
pub trait ControlHandler {
    /// The remote terminal changed size.
    fn window_size(&mut self, rows: u16, cols: u16) {
        let _ = (rows, cols);
    }

    /// The remote sent a liveness probe.
    fn ping(&mut self, cookie: u32) {
        let _ = cookie;
    }

    /// The remote answered a probe.
    fn pong(&mut self, cookie: u32) {
        let _ = cookie;
    }
}

fn ack_staged(data: &mut BytesMut, n: usize) -> Result<(), CodecError> {
    if n > data.len() {
        return Err(CodecError::AckOverrun {
            requested: n,
            staged: data.len(),
        });
    }
    data.advance(n);
    Ok(())
}

/// Passthrough staging: bytes go out exactly as they came in.
#[derive(Debug, Default)]
pub struct RawBuffer {
    data: BytesMut,
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, input: &[u8]) {
        self.data.extend_from_slice(input);
    }

    pub fn peek(&self) -> &[u8] {
        &self.data
    }

    pub fn ack(&mut self, n: usize) -> Result<(), CodecError> {
        ack_staged(&mut self.data, n)
    }
}

/// Escaping encoder: doubles the escape byte in payload data and appends
/// already well-formed control frames verbatim.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    data: BytesMut,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, input: &[u8]) {
        for &b in input {
            self.data.put_u8(b);
            if b == ESCAPE {
                self.data.put_u8(b);
            }
        }
    }

    /// Stage a window-size frame.
    pub fn window_size(&mut self, rows: u16, cols: u16) {
        ControlFrame::WindowSize { rows, cols }.encode_into(&mut self.data);
    }

    /// Stage a ping frame.
    pub fn ping(&mut self, cookie: u32) {
        ControlFrame::Ping { cookie }.encode_into(&mut self.data);
    }

    /// Stage a pong frame.
    pub fn pong(&mut self, cookie: u32) {
        ControlFrame::Pong { cookie }.encode_into(&mut self.data);
    }

    pub fn peek(&self) -> &[u8] {
        &self.data
    }

    pub fn ack(&mut self, n: usize) -> Result<(), CodecError> {
        ack_staged(&mut self.data, n)
    }
}

/// De-escaping decoder.
///
/// Literal data lands in the staged output; command frames are parsed
/// and dispatched to the handler, contributing no staged bytes. An
/// in-progress frame lives in a scratch buffer that `peek` never
/// exposes, so frames split across reads reassemble transparently.
pub struct FrameDecoder {
    data: BytesMut,
    scratch: Vec<u8>,
    handler: Box<dyn ControlHandler>,
}

impl FrameDecoder {
    pub fn new(handler: Box<dyn ControlHandler>) -> Self {
        Self {
            data: BytesMut::new(),
            scratch: Vec::with_capacity(6),
            handler,
        }
    }

    /// Push raw wire bytes through the decoder.
    ///
    /// Works on copies and commits at the end: a framing error leaves
    /// both the staged output and the scratch state untouched. Handler
    /// callbacks for frames completed earlier in the chunk have already
    /// fired by then; the session is over either way.
    pub fn write(&mut self, input: &[u8]) -> Result<(), CodecError> {
        let mut staged: Vec<u8> = Vec::with_capacity(input.len());
        let mut scratch = self.scratch.clone();

        for &b in input {
            // Fast path: literal data outside any frame.
            if scratch.is_empty() && b != ESCAPE {
                staged.push(b);
                continue;
            }

            scratch.push(b);
            if scratch.len() == 1 {
                continue;
            }

            let tag = scratch[1];
            let want = wire::frame_len(tag).ok_or(CodecError::InvalidFraming { tag })?;
            if scratch.len() < want {
                continue;
            }

            match ControlFrame::parse(&scratch)? {
                ControlFrame::LiteralEscape => staged.push(ESCAPE),
                ControlFrame::WindowSize { rows, cols } => self.handler.window_size(rows, cols),
                ControlFrame::Ping { cookie } => self.handler.ping(cookie),
                ControlFrame::Pong { cookie } => self.handler.pong(cookie),
            }
            scratch.clear();
        }

        self.scratch = scratch;
        self.data.extend_from_slice(&staged);
        Ok(())
    }

    pub fn peek(&self) -> &[u8] {
        &self.data
    }

    pub fn ack(&mut self, n: usize) -> Result<(), CodecError> {
        ack_staged(&mut self.data, n)
    }
}

/// One stage buffer with its discipline fixed at construction.
///
/// The closed set of disciplines is an enum rather than a trait object:
/// the relay dispatches on it without allocation and nothing outside
/// this crate can add a fourth variant.
pub enum StreamBuffer {
    Raw(RawBuffer),
    Encoder(FrameEncoder),
    Decoder(FrameDecoder),
}

impl StreamBuffer {
    pub fn raw() -> Self {
        StreamBuffer::Raw(RawBuffer::new())
    }

    pub fn encoder() -> Self {
        StreamBuffer::Encoder(FrameEncoder::new())
    }

    pub fn decoder(handler: Box<dyn ControlHandler>) -> Self {
        StreamBuffer::Decoder(FrameDecoder::new(handler))
    }

    /// Append input, transformed per the discipline. Only the decoder
    /// can fail (on a framing violation).
    pub fn write(&mut self, input: &[u8]) -> Result<(), CodecError> {
        match self {
            StreamBuffer::Raw(b) => {
                b.write(input);
                Ok(())
            }
            StreamBuffer::Encoder(b) => {
                b.write(input);
                Ok(())
            }
            StreamBuffer::Decoder(b) => b.write(input),
        }
    }

    /// All currently staged bytes, in flush order.
    pub fn peek(&self) -> &[u8] {
        match self {
            StreamBuffer::Raw(b) => b.peek(),
            StreamBuffer::Encoder(b) => b.peek(),
            StreamBuffer::Decoder(b) => b.peek(),
        }
    }

    /// Drop the first `n` staged bytes (they were flushed downstream).
    pub fn ack(&mut self, n: usize) -> Result<(), CodecError> {
        match self {
            StreamBuffer::Raw(b) => b.ack(n),
            StreamBuffer::Encoder(b) => b.ack(n),
            StreamBuffer::Decoder(b) => b.ack(n),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peek().is_empty()
    }

    /// Access the encoder discipline, for staging control frames into a
    /// direction the relay is draining. `None` for the other variants.
    pub fn as_encoder_mut(&mut self) -> Option<&mut FrameEncoder> {
        match self {
            StreamBuffer::Encoder(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        WindowSize(u16, u16),
        Ping(u32),
        Pong(u32),
    }

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl ControlHandler for Recorder {
        fn window_size(&mut self, rows: u16, cols: u16) {
            self.events.borrow_mut().push(Event::WindowSize(rows, cols));
        }

        fn ping(&mut self, cookie: u32) {
            self.events.borrow_mut().push(Event::Ping(cookie));
        }

        fn pong(&mut self, cookie: u32) {
            self.events.borrow_mut().push(Event::Pong(cookie));
        }
    }

    fn recording_decoder() -> (FrameDecoder, Rc<RefCell<Vec<Event>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let decoder = FrameDecoder::new(Box::new(Recorder {
            events: events.clone(),
        }));
        (decoder, events)
    }

    #[test]
    fn test_raw_buffer_write_peek_ack() {
        let mut buf = RawBuffer::new();
        buf.write(b"h");
        buf.write(b"ello");
        assert_eq!(buf.peek(), b"hello");
        assert_eq!(buf.peek(), b"hello");
        buf.ack(3).unwrap();
        assert_eq!(buf.peek(), b"lo");
    }

    #[test]
    fn test_raw_buffer_ack_overrun() {
        let mut buf = RawBuffer::new();
        buf.write(b"abc");
        let err = buf.ack(4).unwrap_err();
        assert!(matches!(
            err,
            CodecError::AckOverrun {
                requested: 4,
                staged: 3
            }
        ));
        // Bounds error must not consume anything.
        assert_eq!(buf.peek(), b"abc");
    }

    #[test]
    fn test_raw_buffer_full_ack_empties() {
        let mut buf = RawBuffer::new();
        buf.write(b"abc");
        buf.ack(3).unwrap();
        assert!(buf.peek().is_empty());
    }

    #[test]
    fn test_encoder_passthrough() {
        let mut buf = FrameEncoder::new();
        buf.write(b"he");
        buf.write(b"llo");
        assert_eq!(buf.peek(), b"hello");
    }

    #[test]
    fn test_encoder_doubles_escape() {
        let mut buf = FrameEncoder::new();
        buf.write(b"y\xFFo");
        assert_eq!(buf.peek(), b"y\xFF\xFFo");
    }

    #[test]
    fn test_encoder_ping_after_data() {
        let mut buf = FrameEncoder::new();
        buf.write(b"y\xFFo");
        buf.ping(0x41424344);
        assert_eq!(buf.peek(), b"y\xFF\xFFo\xFF\x02ABCD");
    }

    #[test]
    fn test_encoder_pong() {
        let mut buf = FrameEncoder::new();
        buf.pong(0x44434241);
        assert_eq!(buf.peek(), b"\xFF\x03DCBA");
    }

    #[test]
    fn test_encoder_window_size_between_writes() {
        let mut buf = FrameEncoder::new();
        buf.write(b"yo");
        buf.window_size(0x4142, 0x4344);
        buf.write(b"plait");
        assert_eq!(buf.peek(), b"yo\xFF\x01\x41\x42\x43\x44plait");
    }

    #[test]
    fn test_decoder_passthrough() {
        let (mut buf, events) = recording_decoder();
        buf.write(b"he").unwrap();
        buf.write(b"llo").unwrap();
        assert_eq!(buf.peek(), b"hello");
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_decoder_literal_escape_split_across_writes() {
        let (mut buf, _) = recording_decoder();
        buf.write(b"y\xFF").unwrap();
        // Half a frame stays in scratch, never in the staged view.
        assert_eq!(buf.peek(), b"y");
        buf.write(b"\xFFo").unwrap();
        assert_eq!(buf.peek(), b"y\xFFo");
    }

    #[test]
    fn test_decoder_frames_and_order() {
        let (mut buf, events) = recording_decoder();
        buf.write(b"\xFF\x01\x00\x18\x00\x50").unwrap();
        buf.write(b"\xFF\x02ABCD").unwrap();
        buf.write(b"\xFF\x03DCBA").unwrap();
        assert!(buf.peek().is_empty());
        assert_eq!(
            *events.borrow(),
            vec![
                Event::WindowSize(24, 80),
                Event::Ping(0x41424344),
                Event::Pong(0x44434241),
            ]
        );
    }

    #[test]
    fn test_decoder_frame_split_across_writes() {
        let (mut buf, events) = recording_decoder();
        buf.write(b"\xFF\x03").unwrap();
        assert!(events.borrow().is_empty());
        buf.write(b"DCBA").unwrap();
        assert_eq!(*events.borrow(), vec![Event::Pong(0x44434241)]);
        assert!(buf.peek().is_empty());
    }

    #[test]
    fn test_decoder_data_around_frame() {
        let (mut buf, events) = recording_decoder();
        buf.write(b"yo\xFF\x01\x41\x42\x43\x44plait").unwrap();
        assert_eq!(buf.peek(), b"yoplait");
        assert_eq!(*events.borrow(), vec![Event::WindowSize(0x4142, 0x4344)]);
    }

    #[test]
    fn test_decoder_invalid_tag() {
        let (mut buf, _) = recording_decoder();
        let err = buf.write(b"\xFF\x09").unwrap_err();
        assert!(matches!(err, CodecError::InvalidFraming { tag: 0x09 }));
    }

    #[test]
    fn test_decoder_error_leaves_staged_untouched() {
        let (mut buf, _) = recording_decoder();
        buf.write(b"ok").unwrap();
        // The whole chunk is rejected, including the literal prefix.
        assert!(buf.write(b"ab\xFF\x09").is_err());
        assert_eq!(buf.peek(), b"ok");
        // Scratch was not poisoned either; clean input still decodes.
        buf.write(b"!").unwrap();
        assert_eq!(buf.peek(), b"ok!");
    }

    #[test]
    fn test_round_trip_with_escapes() {
        let payload: Vec<u8> = (0u8..=255).chain([0xFF, 0xFF, 0x41, 0xFF]).collect();
        let mut enc = FrameEncoder::new();
        enc.write(&payload);
        let (mut dec, events) = recording_decoder();
        dec.write(enc.peek()).unwrap();
        assert_eq!(dec.peek(), &payload[..]);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_chunk_boundary_independence() {
        // Encoded stream mixing payload escapes and all three commands.
        let mut enc = FrameEncoder::new();
        enc.write(b"a\xFFb");
        enc.window_size(24, 80);
        enc.ping(0x41424344);
        enc.pong(0x44434241);
        enc.write(b"\xFF");
        let encoded = enc.peek().to_vec();

        let (mut whole, whole_events) = recording_decoder();
        whole.write(&encoded).unwrap();

        for split in 0..=encoded.len() {
            let (mut dec, events) = recording_decoder();
            dec.write(&encoded[..split]).unwrap();
            dec.write(&encoded[split..]).unwrap();
            assert_eq!(dec.peek(), whole.peek(), "split at {}", split);
            assert_eq!(*events.borrow(), *whole_events.borrow(), "split at {}", split);
        }
    }

    #[test]
    fn test_stream_buffer_dispatch() {
        let mut raw = StreamBuffer::raw();
        raw.write(b"\xFF").unwrap();
        assert_eq!(raw.peek(), b"\xFF");
        assert!(!raw.is_empty());

        let mut enc = StreamBuffer::encoder();
        enc.write(b"\xFF").unwrap();
        assert_eq!(enc.peek(), b"\xFF\xFF");
        assert!(enc.as_encoder_mut().is_some());
        assert!(raw.as_encoder_mut().is_none());

        enc.ack(2).unwrap();
        assert!(enc.is_empty());
    }

    #[test]
    fn test_stream_buffer_ack_overrun() {
        let mut buf = StreamBuffer::encoder();
        buf.write(b"ab").unwrap();
        assert!(matches!(
            buf.ack(3),
            Err(CodecError::AckOverrun {
                requested: 3,
                staged: 2
            })
        ));
    }
}
