//! Message definition
//!
//! The canonical in-memory form of one bus message.

/// Maximum number of payload bytes in a message
pub const MAX_PAYLOAD: usize = 8;

/// One message on the track bus
///
/// Only the first `length` bytes of `data` are meaningful. Equality
/// ignores the bytes past `length`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Message {
    /// Command family, shared by a request and its reply
    pub opcode: u8,

    /// Correlation tag identifying the sending controller
    pub hash: u16,

    /// Set on replies, cleared on requests
    pub response: bool,

    /// Number of valid payload bytes (0..=8)
    pub length: u8,

    /// Payload bytes
    pub data: [u8; MAX_PAYLOAD],
}

impl Message {
    /// Create a request with the given opcode and payload length,
    /// payload zeroed
    ///
    /// Lengths beyond 8 are clamped.
    pub fn new(opcode: u8, length: u8) -> Self {
        Self {
            opcode,
            length: length.min(MAX_PAYLOAD as u8),
            ..Self::default()
        }
    }

    /// Create a request carrying the given payload
    ///
    /// Payloads longer than 8 bytes are truncated.
    pub fn with_payload(opcode: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD);
        let mut message = Self::new(opcode, len as u8);
        message.data[..len].copy_from_slice(&payload[..len]);
        message
    }

    /// Reset every field to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether the length field is within 0..=8
    pub fn is_valid(&self) -> bool {
        (self.length as usize) <= MAX_PAYLOAD
    }

    /// The meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.length as usize).min(MAX_PAYLOAD)]
    }

    /// Turn a request into the matching reply shape (response flag set)
    pub fn into_response(mut self, hash: u16) -> Self {
        self.response = true;
        self.hash = hash;
        self
    }

    // -------------------------------------------------------------------------
    // Payload field helpers (big-endian, the bus byte order)
    // -------------------------------------------------------------------------

    /// Read a big-endian u16 at `offset`
    ///
    /// Returns `None` if the field lies beyond `length`.
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.payload().get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian u32 at `offset`
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes = self.payload().get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read the byte at `offset`
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.payload().get(offset).copied()
    }

    /// Write a big-endian u16 at `offset` (must be below 7)
    pub fn set_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian u32 at `offset` (must be below 5)
    pub fn set_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Target address, stored in bytes 2..4
    pub fn address(&self) -> Option<u16> {
        self.u16_at(2)
    }

    /// Set the target address in bytes 2..4
    pub fn set_address(&mut self, address: u16) {
        self.set_u16(2, address);
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.hash == other.hash
            && self.response == other.response
            && self.length == other.length
            && self.payload() == other.payload()
    }
}

impl Eq for Message {}
