//! Opcode catalog
//!
//! Command families understood by the track-format processor. Payload
//! bytes 0..4 carry a device uid (commonly zero) or a target address
//! in bytes 2..4; the rest is command specific.

/// System commands: power, emergency stop, status (sub-command in byte 4)
pub const SYSTEM: u8 = 0x00;

/// Locomotive speed get/set
pub const LOCO_SPEED: u8 = 0x04;

/// Locomotive direction get/set
pub const LOCO_DIRECTION: u8 = 0x05;

/// Locomotive function get/set
pub const LOCO_FUNCTION: u8 = 0x06;

/// Configuration value read
pub const CONFIG_READ: u8 = 0x07;

/// Configuration value write
pub const CONFIG_WRITE: u8 = 0x08;

/// Accessory get/set
pub const ACCESSORY: u8 = 0x0b;

/// Firmware version query (ping)
pub const VERSION: u8 = 0x18;

/// Bring-up/reset sequence
pub const BRINGUP: u8 = 0x1b;

/// Sub-commands of [`SYSTEM`], carried in payload byte 4
pub mod system {
    /// Track power off
    pub const STOP: u8 = 0x00;

    /// Track power on
    pub const GO: u8 = 0x01;

    /// Stop a single locomotive
    pub const LOCO_EMERGENCY_STOP: u8 = 0x03;

    /// Prepare track protocol (sent before power-on)
    pub const TRACK_PROTOCOL: u8 = 0x08;

    /// Switching time of the track signal (sent before power-on)
    pub const SWITCHING_TIME: u8 = 0x09;

    /// Read a status channel
    pub const STATUS: u8 = 0x0b;
}

/// Human-readable name of an opcode, for logs
pub fn name(opcode: u8) -> &'static str {
    match opcode {
        SYSTEM => "system",
        LOCO_SPEED => "loco-speed",
        LOCO_DIRECTION => "loco-direction",
        LOCO_FUNCTION => "loco-function",
        CONFIG_READ => "config-read",
        CONFIG_WRITE => "config-write",
        ACCESSORY => "accessory",
        VERSION => "version",
        BRINGUP => "bringup",
        _ => "unknown",
    }
}
