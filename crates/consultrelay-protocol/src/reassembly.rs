//! Stream reassembly: turning arbitrary transport chunks into whole frames.
//!
//! TCP hands over bytes in whatever pieces it likes. A frame header, its
//! extended length or its payload may each be split across reads, and one
//! read may carry several frames. [`FrameAccumulator`] keeps the pending
//! bytes and only releases frames once they are fully received.

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{Frame, decode_frame, parse_header};

/// Looks for a complete frame at the front of `buf`.
///
/// Returns `Ok(Some((frame, rest)))` when one is present, `Ok(None)` when
/// more bytes are needed, and [`ProtocolError::FrameTooLarge`] as soon as
/// the header declares a payload over `max_payload`. The size check runs
/// before any payload is buffered, so an oversized frame is rejected on its
/// header alone. No extensions are negotiated, so any RSV bit fails with
/// [`ProtocolError::ReservedBits`] the same way.
pub fn split_frame(buf: &[u8], max_payload: u64) -> ProtocolResult<Option<(&[u8], &[u8])>> {
    let Some(header) = parse_header(buf) else {
        return Ok(None);
    };

    if header.rsv != 0 {
        return Err(ProtocolError::ReservedBits(header.rsv));
    }

    if header.payload_len > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            size: header.payload_len,
            max: max_payload,
        });
    }

    let payload_len = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
    let total = header.header_len.saturating_add(payload_len);
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some(buf.split_at(total)))
}

/// Per-connection buffer of bytes not yet resolved into a frame.
///
/// After every [`next_frame`](Self::next_frame) call that returns `Ok(None)`
/// the buffer holds at most one partial frame.
#[derive(Debug)]
pub struct FrameAccumulator {
    pending: Vec<u8>,
    max_payload: u64,
    require_mask: bool,
}

impl FrameAccumulator {
    /// Creates an empty accumulator that rejects payloads over `max_payload`.
    pub fn new(max_payload: u64) -> Self {
        Self {
            pending: Vec::new(),
            max_payload,
            require_mask: false,
        }
    }

    /// Rejects unmasked frames with [`ProtocolError::UnmaskedFrame`]. Servers
    /// use this for client traffic.
    pub fn requiring_mask(mut self) -> Self {
        self.require_mask = true;
        self
    }

    /// Appends a chunk received from the transport.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Extracts and decodes the next complete frame.
    ///
    /// On success exactly the frame's bytes are removed from the front of
    /// the buffer. `Ok(None)` leaves the buffer untouched.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        if self.require_mask
            && let Some(header) = parse_header(&self.pending)
            && header.mask.is_none()
        {
            return Err(ProtocolError::UnmaskedFrame);
        }

        let (frame, consumed) = match split_frame(&self.pending, self.max_payload)? {
            Some((raw, _rest)) => (decode_frame(raw)?, raw.len()),
            None => return Ok(None),
        };
        self.pending.drain(..consumed);
        Ok(Some(frame))
    }

    /// Extracts every complete frame currently buffered, in arrival order.
    pub fn drain_frames(&mut self) -> ProtocolResult<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn max_payload(&self) -> u64 {
        self.max_payload
    }

    pub fn requires_mask(&self) -> bool {
        self.require_mask
    }
}
