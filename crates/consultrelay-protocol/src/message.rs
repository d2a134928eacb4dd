//! Message assembly on top of individual frames.
//!
//! Data messages may be fragmented: a Text or Binary frame with FIN cleared,
//! followed by Continuation frames, the last of which has FIN set. Control
//! frames (Close, Ping, Pong) are never fragmented but may appear between
//! the fragments of a data message.

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{Frame, MAX_CONTROL_PAYLOAD, Opcode};

/// Status code and reason carried by a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// A complete message as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close request; `None` when the peer sent no status code.
    Close(Option<CloseFrame>),
}

impl Message {
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}

/// Parses a Close payload: optional 2-byte status code followed by a UTF-8
/// reason. An empty payload yields `None`.
pub fn parse_close_payload(payload: &[u8]) -> ProtocolResult<Option<CloseFrame>> {
    match payload {
        [] => Ok(None),
        [_] => Err(ProtocolError::TruncatedCloseCode),
        [hi, lo, reason @ ..] => {
            let code = u16::from_be_bytes([*hi, *lo]);
            if !is_valid_close_code(code) {
                return Err(ProtocolError::InvalidCloseCode(code));
            }
            Ok(Some(CloseFrame {
                code,
                reason: String::from_utf8(reason.to_vec())?,
            }))
        }
    }
}

/// Returns `true` for status codes a peer may put in a Close frame.
///
/// 1004-1006 and 1015 are reserved for local use, 1012-2999 are
/// unassigned or extension-owned, and 3000-4999 belong to registered
/// libraries and applications.
pub fn is_valid_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
}

/// Folds a frame sequence into messages.
#[derive(Debug)]
pub struct MessageAssembler {
    /// Opcode and bytes collected so far for a fragmented data message.
    partial: Option<(Opcode, Vec<u8>)>,
    max_message_size: u64,
}

impl MessageAssembler {
    /// Creates an assembler that rejects reassembled messages over
    /// `max_message_size` bytes.
    pub fn new(max_message_size: u64) -> Self {
        Self {
            partial: None,
            max_message_size,
        }
    }

    /// Returns `true` while a fragmented message is being collected.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Feeds one frame. Returns a message when the frame completes one.
    pub fn push(&mut self, frame: Frame) -> ProtocolResult<Option<Message>> {
        match frame.opcode {
            Opcode::Reserved(value) => Err(ProtocolError::ReservedOpcode(value)),

            Opcode::Close | Opcode::Ping | Opcode::Pong => {
                if !frame.fin || frame.payload.len() > MAX_CONTROL_PAYLOAD {
                    return Err(ProtocolError::InvalidControlFrame {
                        opcode: frame.opcode.as_u8(),
                    });
                }
                Ok(Some(match frame.opcode {
                    Opcode::Ping => Message::Ping(frame.payload),
                    Opcode::Pong => Message::Pong(frame.payload),
                    _ => Message::Close(parse_close_payload(&frame.payload)?),
                }))
            }

            Opcode::Text | Opcode::Binary => {
                if self.partial.is_some() {
                    return Err(ProtocolError::UnfinishedMessage);
                }
                self.check_size(frame.payload.len())?;
                if frame.fin {
                    return finish(frame.opcode, frame.payload).map(Some);
                }
                self.partial = Some((frame.opcode, frame.payload));
                Ok(None)
            }

            Opcode::Continuation => {
                let (opcode, mut collected) = self
                    .partial
                    .take()
                    .ok_or(ProtocolError::UnexpectedContinuation)?;
                self.check_size(collected.len() + frame.payload.len())?;
                collected.extend_from_slice(&frame.payload);
                if frame.fin {
                    return finish(opcode, collected).map(Some);
                }
                self.partial = Some((opcode, collected));
                Ok(None)
            }
        }
    }

    fn check_size(&self, size: usize) -> ProtocolResult<()> {
        if size as u64 > self.max_message_size {
            return Err(ProtocolError::FrameTooLarge {
                size: size as u64,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

fn finish(opcode: Opcode, payload: Vec<u8>) -> ProtocolResult<Message> {
    match opcode {
        Opcode::Text => Ok(Message::Text(String::from_utf8(payload)?)),
        _ => Ok(Message::Binary(payload)),
    }
}
