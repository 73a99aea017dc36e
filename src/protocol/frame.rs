//! Frame codec
//!
//! Maps a [`Message`] onto a CAN frame with a 29-bit extended
//! identifier, and a CAN frame onto the 13-byte form used by
//! CAN-over-TCP gateways.
//!
//! ## Identifier Layout
//! ```text
//!  28    25 24          17  16  15                 0
//! ┌────────┬──────────────┬───┬────────────────────┐
//! │ prio 0 │    opcode    │ R │        hash        │
//! └────────┴──────────────┴───┴────────────────────┘
//! ```
//!
//! ## Gateway Wire Format
//! ```text
//! ┌─────────────┬─────────┬──────────────────────┐
//! │ Id (4, BE)  │ Dlc (1) │ Data (8, zero-padded)│
//! └─────────────┴─────────┴──────────────────────┘
//! ```

use super::message::{Message, MAX_PAYLOAD};
use crate::error::ParseError;

/// Mask of a 29-bit extended CAN identifier
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Bit position of the opcode within the identifier
const OPCODE_SHIFT: u32 = 17;

/// Bit carrying the response flag
const RESPONSE_BIT: u32 = 1 << 16;

/// Size of one frame on a CAN-over-TCP gateway link
pub const WIRE_SIZE: usize = 13;

/// A transport-level CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Extended (29-bit) identifier
    pub id: u32,

    /// Data length code as reported by the transport
    pub dlc: u8,

    /// Data bytes; only the first `dlc` are meaningful
    pub data: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Build a frame from an identifier and data bytes (at most 8 are kept)
    pub fn new(id: u32, data: &[u8]) -> Self {
        let len = data.len().min(MAX_PAYLOAD);
        let mut frame = Self {
            id: id & EXTENDED_ID_MASK,
            dlc: len as u8,
            data: [0; MAX_PAYLOAD],
        };
        frame.data[..len].copy_from_slice(&data[..len]);
        frame
    }

    /// Whether the frame respects the classic CAN bounds
    pub fn is_well_formed(&self) -> bool {
        self.id <= EXTENDED_ID_MASK && (self.dlc as usize) <= MAX_PAYLOAD
    }
}

// =============================================================================
// Message <-> Frame
// =============================================================================

/// Pack a message into a CAN frame
pub fn encode_frame(message: &Message) -> Frame {
    let id = ((message.opcode as u32) << OPCODE_SHIFT)
        | if message.response { RESPONSE_BIT } else { 0 }
        | message.hash as u32;

    Frame::new(id, message.payload())
}

/// Unpack a CAN frame into a message
///
/// Fails only when the transport reports more than 8 data bytes.
pub fn decode_frame(frame: &Frame) -> Result<Message, ParseError> {
    if frame.dlc as usize > MAX_PAYLOAD {
        return Err(ParseError::LengthOutOfRange(frame.dlc));
    }

    let mut message = Message {
        opcode: ((frame.id >> OPCODE_SHIFT) & 0xff) as u8,
        hash: (frame.id & 0xffff) as u16,
        response: frame.id & RESPONSE_BIT != 0,
        length: frame.dlc,
        data: [0; MAX_PAYLOAD],
    };
    let len = frame.dlc as usize;
    message.data[..len].copy_from_slice(&frame.data[..len]);

    Ok(message)
}

// =============================================================================
// Frame <-> gateway wire bytes
// =============================================================================

/// Encode a frame into the 13-byte gateway format
pub fn encode_wire(frame: &Frame) -> [u8; WIRE_SIZE] {
    let mut out = [0u8; WIRE_SIZE];
    out[..4].copy_from_slice(&(frame.id & EXTENDED_ID_MASK).to_be_bytes());
    out[4] = frame.dlc;
    out[5..].copy_from_slice(&frame.data);
    out
}

/// Decode a frame from the 13-byte gateway format
///
/// The dlc is passed through unchecked; [`decode_frame`] rejects
/// out-of-range values.
pub fn decode_wire(bytes: &[u8]) -> Result<Frame, ParseError> {
    if bytes.len() < WIRE_SIZE {
        return Err(ParseError::TooShort {
            expected: WIRE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut frame = Frame {
        id: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & EXTENDED_ID_MASK,
        dlc: bytes[4],
        data: [0; MAX_PAYLOAD],
    };
    frame.data.copy_from_slice(&bytes[5..WIRE_SIZE]);

    Ok(frame)
}
