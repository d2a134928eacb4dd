//! WebSocket wire protocol for the consultation relay.
//!
//! This crate holds everything that touches bytes on the wire, with no IO
//! of its own:
//!
//! - [`handshake`]: HTTP/1.1 upgrade request parsing and the
//!   `Sec-WebSocket-Accept` computation.
//! - [`framing`]: encoding and decoding of single frames.
//! - [`reassembly`]: turning arbitrary transport chunks into whole frames.
//! - [`message`]: folding frames into messages (fragments, control frames).
//! - [`types`]: the JSON signaling messages carried in text frames.
//!
//! # Example
//!
//! ```rust
//! use consultrelay_protocol::{FrameAccumulator, Inbound, encode_masked, Opcode};
//!
//! let bytes = encode_masked(
//!     Opcode::Text,
//!     br#"{"type":"join","roomId":"room1","username":"budi"}"#,
//!     [1, 2, 3, 4],
//! );
//!
//! let mut acc = FrameAccumulator::new(consultrelay_protocol::DEFAULT_MAX_FRAME_SIZE);
//! acc.extend(&bytes[..7]);
//! assert!(acc.next_frame().unwrap().is_none());
//! acc.extend(&bytes[7..]);
//!
//! let frame = acc.next_frame().unwrap().unwrap();
//! let text = String::from_utf8(frame.payload).unwrap();
//! assert!(matches!(Inbound::parse(&text).unwrap(), Inbound::Join(_)));
//! ```

mod error;
pub mod framing;
pub mod handshake;
pub mod message;
pub mod reassembly;
pub mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    Frame, FrameHeader, Opcode, close_code, decode_frame, decode_text, encode_close,
    encode_frame, encode_masked, encode_text,
};
pub use handshake::{HttpRequest, accept_key, http_response, parse_request, switching_protocols};
pub use message::{
    CloseFrame, Message, MessageAssembler, is_valid_close_code, parse_close_payload,
};
pub use reassembly::{FrameAccumulator, split_frame};
pub use types::{Inbound, JoinRequest, MessageKind, Outbound, RelayMessage};

/// Default limit on a single frame's payload (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1024 * 1024;
