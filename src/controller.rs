//! Track Controller
//!
//! One call per supported operation. Each call builds a [`Message`],
//! runs it through the [`Exchanger`] and reads the result out of the
//! reply payload.
//!
//! ## Payload Conventions
//! - bytes 0..4: device uid (zero when addressing locos/accessories)
//! - bytes 2..4: target address (big-endian)
//! - bytes 4..:  command specific fields
//!
//! ## Timeouts
//! Interactive operations use the short tier
//! ([`Config::default_timeout_ms`]); configuration read/write uses the
//! long tier ([`Config::config_timeout_ms`]).

use std::time::Duration;

use crate::config::Config;
use crate::error::{RailError, Result};
use crate::exchange::{Clock, Exchanger, SystemClock};
use crate::protocol::{opcode, Message};
use crate::transport::BusTransport;

// =============================================================================
// Constants
// =============================================================================

/// Protocol base addresses
pub mod address {
    /// MM2 locomotive
    pub const MM2: u16 = 0x0000;
    /// Selectrix (old) locomotive
    pub const SX1: u16 = 0x0800;
    /// MFX locomotive
    pub const MFX: u16 = 0x4000;
    /// Selectrix (new) locomotive
    pub const SX2: u16 = 0x8000;
    /// DCC locomotive
    pub const DCC: u16 = 0xC000;
    /// Selectrix (old) magnetic accessory
    pub const ACC_SX1: u16 = 0x2000;
    /// MM2 magnetic accessory
    pub const ACC_MM2: u16 = 0x2FFF;
    /// DCC magnetic accessory
    pub const ACC_DCC: u16 = 0x3800;

    /// Classic MM2 Delta addresses
    pub const DELTA1: u16 = 78;
    pub const DELTA2: u16 = 72;
    pub const DELTA3: u16 = 60;
    pub const DELTA4: u16 = 24;
}

/// Accessory positions, with the usual aliases
pub mod position {
    pub const OFF: u8 = 0;
    pub const ROUND: u8 = 0;
    pub const RED: u8 = 0;
    pub const RIGHT: u8 = 0;
    pub const HP0: u8 = 0;

    pub const ON: u8 = 1;
    pub const GREEN: u8 = 1;
    pub const STRAIGHT: u8 = 1;
    pub const HP1: u8 = 1;

    pub const YELLOW: u8 = 2;
    pub const LEFT: u8 = 2;
    pub const HP2: u8 = 2;

    pub const WHITE: u8 = 3;
    pub const SH0: u8 = 3;
}

/// Highest speed value the protocol carries
pub const MAX_SPEED: u16 = 1023;

/// Speed change per accelerate/decelerate step (1/14 of the range)
pub const SPEED_STEP: u16 = 77;

/// Device type reported by a track-format processor in version replies
const TRACK_FORMAT_PROCESSOR: [u8; 2] = [0x00, 0x10];

/// Locomotive direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Keep the current direction
    Current = 0,
    Forward = 1,
    Reverse = 2,
    /// Flip the current direction
    Change = 3,
}

impl TryFrom<u8> for Direction {
    type Error = RailError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Direction::Current),
            1 => Ok(Direction::Forward),
            2 => Ok(Direction::Reverse),
            3 => Ok(Direction::Change),
            _ => Err(RailError::UnexpectedReply {
                opcode: opcode::LOCO_DIRECTION,
                reason: format!("unknown direction {}", value),
            }),
        }
    }
}

/// Firmware version of a track-format processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

/// Accessory state as reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryState {
    pub position: u8,
    pub power: u8,
}

// =============================================================================
// Controller
// =============================================================================

/// High-level controller for a track-format processor
pub struct TrackController<T: BusTransport, C: Clock = SystemClock> {
    exchanger: Exchanger<T, C>,
    config: Config,
}

impl<T: BusTransport> TrackController<T, SystemClock> {
    /// Create a controller on the wall clock
    pub fn new(transport: T, config: Config) -> Self {
        let exchanger = Exchanger::new(transport, &config);
        Self { exchanger, config }
    }
}

impl<T: BusTransport, C: Clock> TrackController<T, C> {
    /// Create a controller around a prepared exchanger
    pub fn from_exchanger(exchanger: Exchanger<T, C>, config: Config) -> Self {
        Self { exchanger, config }
    }

    /// The underlying exchanger
    pub fn exchanger(&mut self) -> &mut Exchanger<T, C> {
        &mut self.exchanger
    }

    /// The session configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn short(&self) -> Duration {
        self.config.default_timeout()
    }

    fn long(&self) -> Duration {
        self.config.config_timeout()
    }

    /// Message addressed at `address` (bytes 2..4)
    fn addressed(opcode: u8, length: u8, address: u16) -> Message {
        let mut message = Message::new(opcode, length);
        message.set_address(address);
        message
    }

    fn byte_field(reply: &Message, offset: usize) -> Result<u8> {
        reply.byte_at(offset).ok_or_else(|| RailError::UnexpectedReply {
            opcode: reply.opcode,
            reason: format!("reply length {} lacks byte {}", reply.length, offset),
        })
    }

    fn word_field(reply: &Message, offset: usize) -> Result<u16> {
        reply.u16_at(offset).ok_or_else(|| RailError::UnexpectedReply {
            opcode: reply.opcode,
            reason: format!("reply length {} lacks word at {}", reply.length, offset),
        })
    }

    // =========================================================================
    // Device
    // =========================================================================

    /// Wait for the hardware to settle, then send the bring-up frame
    pub fn init(&mut self) -> Result<()> {
        self.exchanger
            .pause(Duration::from_millis(self.config.bringup_delay_ms));

        let mut message = Message::new(opcode::BRINGUP, 5);
        message.data[4] = 0x11;
        self.exchanger.send(&mut message)?;

        tracing::info!("Track controller initialised (hash 0x{:04x})", self.exchanger.hash());
        Ok(())
    }

    /// Query the firmware version
    ///
    /// Collects replies for the configured window and takes the first
    /// one coming from a track-format processor.
    pub fn get_version(&mut self) -> Result<Version> {
        let mut message = Message::new(opcode::VERSION, 0);
        self.exchanger.send(&mut message)?;

        let window = Duration::from_millis(self.config.version_window_ms);
        let reply = self.exchanger.await_reply(opcode::VERSION, window, |m| {
            m.opcode == opcode::VERSION
                && m.response
                && m.length >= 8
                && m.data[6..8] == TRACK_FORMAT_PROCESSOR[..]
        })?;

        Ok(Version {
            major: reply.data[4],
            minor: reply.data[5],
        })
    }

    /// Read a status channel of the processor with the given uid
    ///
    /// A uid of 0 addresses the only processor on the bus.
    pub fn get_system_status(&mut self, uid: u32, channel: u8) -> Result<u16> {
        let mut message = Message::new(opcode::SYSTEM, 6);
        message.set_u32(0, uid);
        message.data[4] = opcode::system::STATUS;
        message.data[5] = channel;

        let reply = self.exchanger.exchange(&message, self.short())?;
        if reply.length != 8 {
            return Err(RailError::UnexpectedReply {
                opcode: opcode::SYSTEM,
                reason: format!("status reply has length {}, expected 8", reply.length),
            });
        }

        Self::word_field(&reply, 6)
    }

    // =========================================================================
    // Power
    // =========================================================================

    /// Switch track power
    ///
    /// Switching off stops every locomotive, which remembers its speed
    /// and direction; switching on resumes them. Power-on is preceded by
    /// two preparatory system commands whose failures are only logged.
    pub fn set_power(&mut self, on: bool) -> Result<()> {
        if on {
            let mut switching_time = Message::new(opcode::SYSTEM, 7);
            switching_time.data[4] = opcode::system::SWITCHING_TIME;
            switching_time.data[6] = 0x0d;
            if let Err(e) = self.exchanger.exchange(&switching_time, self.short()) {
                tracing::warn!("Preparing track signal failed: {}", e);
            }

            let mut track_protocol = Message::new(opcode::SYSTEM, 6);
            track_protocol.data[4] = opcode::system::TRACK_PROTOCOL;
            track_protocol.data[5] = 0x07;
            if let Err(e) = self.exchanger.exchange(&track_protocol, self.short()) {
                tracing::warn!("Enabling track protocols failed: {}", e);
            }
        }

        let message = Self::power_message(on);
        self.exchanger.exchange(&message, self.short())?;
        Ok(())
    }

    /// Switch track power without waiting for a reply
    pub fn send_power(&mut self, on: bool) -> Result<()> {
        let mut message = Self::power_message(on);
        self.exchanger.send(&mut message)
    }

    /// Ask for the power state without waiting for a reply
    pub fn request_power_state(&mut self) -> Result<()> {
        let mut message = Message::new(opcode::SYSTEM, 4);
        self.exchanger.send(&mut message)
    }

    fn power_message(on: bool) -> Message {
        let mut message = Message::new(opcode::SYSTEM, 5);
        message.data[4] = if on {
            opcode::system::GO
        } else {
            opcode::system::STOP
        };
        message
    }

    // =========================================================================
    // Locomotive direction
    // =========================================================================

    /// Set the direction of a locomotive
    ///
    /// The locomotive is emergency-stopped first.
    pub fn set_loco_direction(&mut self, address: u16, direction: Direction) -> Result<()> {
        let mut stop = Self::addressed(opcode::SYSTEM, 5, address);
        stop.data[4] = opcode::system::LOCO_EMERGENCY_STOP;
        if let Err(e) = self.exchanger.exchange(&stop, self.short()) {
            tracing::warn!("Emergency stop of loco {} failed: {}", address, e);
        }

        let mut message = Self::addressed(opcode::LOCO_DIRECTION, 5, address);
        message.data[4] = direction as u8;
        self.exchanger.exchange(&message, self.short())?;
        Ok(())
    }

    /// Reverse a locomotive (includes a full stop)
    pub fn toggle_loco_direction(&mut self, address: u16) -> Result<()> {
        self.set_loco_direction(address, Direction::Change)
    }

    /// Query the direction of a locomotive
    pub fn get_loco_direction(&mut self, address: u16) -> Result<Direction> {
        let message = Self::addressed(opcode::LOCO_DIRECTION, 4, address);
        let reply = self.exchanger.exchange(&message, self.short())?;
        Direction::try_from(Self::byte_field(&reply, 4)?)
    }

    // =========================================================================
    // Locomotive speed
    // =========================================================================

    /// Set the speed of a locomotive
    ///
    /// Speeds above [`MAX_SPEED`] are sent as [`MAX_SPEED`]; the hardware
    /// itself caps at 1000.
    pub fn set_loco_speed(&mut self, address: u16, speed: u16) -> Result<()> {
        let mut message = Self::addressed(opcode::LOCO_SPEED, 6, address);
        message.set_u16(4, speed.min(MAX_SPEED));
        self.exchanger.exchange(&message, self.short())?;
        Ok(())
    }

    /// Query the speed of a locomotive
    pub fn get_loco_speed(&mut self, address: u16) -> Result<u16> {
        let message = Self::addressed(opcode::LOCO_SPEED, 4, address);
        let reply = self.exchanger.exchange(&message, self.short())?;
        Self::word_field(&reply, 4)
    }

    /// Raise the speed by one step, capped at [`MAX_SPEED`]
    ///
    /// Returns the speed that was set.
    pub fn accelerate_loco(&mut self, address: u16) -> Result<u16> {
        let speed = self.get_loco_speed(address)?;
        let target = speed.saturating_add(SPEED_STEP).min(MAX_SPEED);
        self.set_loco_speed(address, target)?;
        Ok(target)
    }

    /// Lower the speed by one step, stopping at zero
    ///
    /// Returns the speed that was set.
    pub fn decelerate_loco(&mut self, address: u16) -> Result<u16> {
        let speed = self.get_loco_speed(address)?;
        let target = speed.saturating_sub(SPEED_STEP);
        self.set_loco_speed(address, target)?;
        Ok(target)
    }

    // =========================================================================
    // Locomotive functions
    // =========================================================================

    /// Set a function (0..=31) of a locomotive or function decoder
    ///
    /// `power` is 0 (off) to 31; most protocols only know 0 and 1.
    pub fn set_loco_function(&mut self, address: u16, function: u8, power: u8) -> Result<()> {
        let mut message = Self::addressed(opcode::LOCO_FUNCTION, 6, address);
        message.data[4] = function;
        message.data[5] = power;
        self.exchanger.exchange(&message, self.short())?;
        Ok(())
    }

    /// Query a function; the hardware reports only 0 or 1
    pub fn get_loco_function(&mut self, address: u16, function: u8) -> Result<u8> {
        let mut message = Self::addressed(opcode::LOCO_FUNCTION, 5, address);
        message.data[4] = function;
        let reply = self.exchanger.exchange(&message, self.short())?;
        Self::byte_field(&reply, 5)
    }

    /// Flip a function; returns the new power value
    pub fn toggle_loco_function(&mut self, address: u16, function: u8) -> Result<u8> {
        let power = self.get_loco_function(address, function)?;
        let target = if power == 0 { 1 } else { 0 };
        self.set_loco_function(address, function, target)?;
        Ok(target)
    }

    // =========================================================================
    // Accessories
    // =========================================================================

    /// Switch a magnetic accessory
    ///
    /// With a non-zero `pulse_ms` the accessory is released again after
    /// that many milliseconds; coils left energised may burn out, and
    /// 20 ms suits most turnouts. A failed release is logged only.
    pub fn set_accessory(&mut self, address: u16, position: u8, power: u8, pulse_ms: u16) -> Result<()> {
        let message = Self::accessory_message(address, position, power);
        self.exchanger.exchange(&message, self.short())?;

        if pulse_ms != 0 {
            self.exchanger.pause(Duration::from_millis(pulse_ms as u64));

            let release = Self::accessory_message(address, position, 0);
            if let Err(e) = self.exchanger.exchange(&release, self.short()) {
                tracing::warn!("Releasing accessory {} failed: {}", address, e);
            }
        }

        Ok(())
    }

    /// Switch a magnetic accessory without waiting for a reply
    pub fn send_accessory(&mut self, address: u16, position: u8, power: u8) -> Result<()> {
        let mut message = Self::accessory_message(address, position, power);
        self.exchanger.send(&mut message)
    }

    /// Set a turnout straight or round
    pub fn set_turnout(&mut self, address: u16, straight: bool) -> Result<()> {
        let position = if straight {
            position::STRAIGHT
        } else {
            position::ROUND
        };
        self.set_accessory(address, position, 1, 0)
    }

    /// Query an accessory; power is reported as 0 or 1
    pub fn get_accessory(&mut self, address: u16) -> Result<AccessoryState> {
        let message = Self::addressed(opcode::ACCESSORY, 4, address);
        let reply = self.exchanger.exchange(&message, self.short())?;
        Ok(AccessoryState {
            position: Self::byte_field(&reply, 4)?,
            power: Self::byte_field(&reply, 5)?,
        })
    }

    /// Ask for an accessory's state without waiting for a reply
    pub fn request_accessory_state(&mut self, address: u16) -> Result<()> {
        let mut message = Self::addressed(opcode::ACCESSORY, 4, address);
        self.exchanger.send(&mut message)
    }

    /// Whether a turnout is set straight
    pub fn get_turnout(&mut self, address: u16) -> Result<bool> {
        let state = self.get_accessory(address)?;
        Ok(state.position == position::STRAIGHT)
    }

    fn accessory_message(address: u16, position: u8, power: u8) -> Message {
        let mut message = Self::addressed(opcode::ACCESSORY, 6, address);
        message.data[4] = position;
        message.data[5] = power;
        message
    }

    // =========================================================================
    // Configuration values
    // =========================================================================

    /// Write a configuration value of a locomotive
    pub fn write_config(&mut self, address: u16, number: u16, value: u8) -> Result<()> {
        let mut message = Self::addressed(opcode::CONFIG_WRITE, 8, address);
        message.set_u16(4, number);
        message.data[6] = value;
        self.exchanger.exchange(&message, self.long())?;
        Ok(())
    }

    /// Read a configuration value of a locomotive
    pub fn read_config(&mut self, address: u16, number: u16) -> Result<u8> {
        let mut message = Self::addressed(opcode::CONFIG_READ, 7, address);
        message.set_u16(4, number);
        message.data[6] = 0x01;
        let reply = self.exchanger.exchange(&message, self.long())?;
        Self::byte_field(&reply, 6)
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Exchange an arbitrary message on the short tier
    pub fn exchange_raw(&mut self, message: &Message) -> Result<Message> {
        self.exchanger.exchange(message, self.short())
    }
}
