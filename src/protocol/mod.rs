//! Protocol Module
//!
//! The message model of the track bus and its two encodings.
//!
//! ## Message
//! opcode (8 bits), hash (16 bits), response flag, length (0..=8),
//! up to 8 payload bytes.
//!
//! ## Encodings
//! - Text: `HHHH R CC L DD ..`, for traffic dumps and typed commands
//! - Frame: 29-bit CAN identifier `opcode << 17 | R << 16 | hash` plus
//!   the payload as frame data
//!
//! ### Opcodes
//! - 0x00: system (power, emergency stop, status)
//! - 0x04: loco speed
//! - 0x05: loco direction
//! - 0x06: loco function
//! - 0x07: config read
//! - 0x08: config write
//! - 0x0b: accessory
//! - 0x18: version
//! - 0x1b: bring-up

mod message;
mod text;
mod frame;
pub mod opcode;

pub use message::{Message, MAX_PAYLOAD};
pub use text::{encode_text, decode_text, text_len, MIN_TEXT_LEN};
pub use frame::{
    Frame, encode_frame, decode_frame, encode_wire, decode_wire,
    EXTENDED_ID_MASK, WIRE_SIZE,
};
