//! Track-format processor simulator
//!
//! A software model of the hardware at the far end of the bus. It
//! answers every opcode the controller issues, which makes it usable
//! behind a [`MockBus`](crate::transport::MockBus) in tests and behind
//! the TCP gateway [`Server`](crate::network::Server) for manual runs.
//!
//! ## Behaviour
//! - Requests get exactly the replies real hardware would send; replies
//!   and unknown opcodes are ignored.
//! - Speeds above 1000 are stored as 1000.
//! - Changing direction stops the locomotive.
//! - Power-off keeps locomotive state; nothing moves until power-on.

use std::collections::HashMap;

use crate::protocol::{decode_frame, encode_frame, opcode, Frame, Message};

/// Highest speed the hardware accepts
pub const HARDWARE_MAX_SPEED: u16 = 1000;

/// State of one locomotive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocoState {
    pub speed: u16,
    /// 1 = forward, 2 = reverse
    pub direction: u8,
    pub functions: [u8; 32],
}

impl Default for LocoState {
    fn default() -> Self {
        Self {
            speed: 0,
            direction: 1,
            functions: [0; 32],
        }
    }
}

/// Simulated track-format processor
#[derive(Debug, Clone)]
pub struct TrackBox {
    /// Hash carried by every reply
    hash: u16,

    /// Device uid
    uid: u32,

    /// Firmware version (major, minor)
    version: (u8, u8),

    /// Track power
    power: bool,

    /// Set once the bring-up frame was seen
    initialised: bool,

    locos: HashMap<u16, LocoState>,
    accessories: HashMap<u16, (u8, u8)>,
    config_values: HashMap<(u16, u16), u8>,
    status_channels: HashMap<u8, u16>,
}

impl Default for TrackBox {
    fn default() -> Self {
        Self::new(0x4711, 0x4747_5346)
    }
}

impl TrackBox {
    /// Create a box replying with `hash` and identifying as `uid`
    pub fn new(hash: u16, uid: u32) -> Self {
        Self {
            hash,
            uid,
            version: (1, 39),
            power: false,
            initialised: false,
            locos: HashMap::new(),
            accessories: HashMap::new(),
            config_values: HashMap::new(),
            status_channels: HashMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Inspection / setup
    // -------------------------------------------------------------------------

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn power(&self) -> bool {
        self.power
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// State of a locomotive (defaults if never addressed)
    pub fn loco(&self, address: u16) -> LocoState {
        self.locos.get(&address).copied().unwrap_or_default()
    }

    /// (position, power) of an accessory
    pub fn accessory(&self, address: u16) -> (u8, u8) {
        self.accessories.get(&address).copied().unwrap_or((0, 0))
    }

    pub fn config_value(&self, address: u16, number: u16) -> u8 {
        self.config_values.get(&(address, number)).copied().unwrap_or(0)
    }

    pub fn set_config_value(&mut self, address: u16, number: u16, value: u8) {
        self.config_values.insert((address, number), value);
    }

    pub fn set_status(&mut self, channel: u8, value: u16) {
        self.status_channels.insert(channel, value);
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.version = (major, minor);
    }

    pub fn set_loco_speed(&mut self, address: u16, speed: u16) {
        self.locos.entry(address).or_default().speed = speed.min(HARDWARE_MAX_SPEED);
    }

    // -------------------------------------------------------------------------
    // Request handling
    // -------------------------------------------------------------------------

    /// Handle a raw frame; undecodable frames are ignored
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Frame> {
        match decode_frame(frame) {
            Ok(message) => self.handle(&message).iter().map(encode_frame).collect(),
            Err(e) => {
                tracing::debug!("Simulator ignoring malformed frame: {}", e);
                Vec::new()
            }
        }
    }

    /// Handle one request and return the replies
    pub fn handle(&mut self, request: &Message) -> Vec<Message> {
        if request.response {
            return Vec::new();
        }

        let reply = match request.opcode {
            opcode::SYSTEM => self.system(request),
            opcode::LOCO_SPEED => self.loco_speed(request),
            opcode::LOCO_DIRECTION => self.loco_direction(request),
            opcode::LOCO_FUNCTION => self.loco_function(request),
            opcode::CONFIG_READ => self.config_read(request),
            opcode::CONFIG_WRITE => self.config_write(request),
            opcode::ACCESSORY => self.accessory_request(request),
            opcode::VERSION => Some(self.version_reply()),
            opcode::BRINGUP => {
                self.initialised = true;
                None
            }
            other => {
                tracing::debug!("Simulator ignoring opcode 0x{:02x}", other);
                None
            }
        };

        reply
            .map(|message| vec![message.into_response(self.hash)])
            .unwrap_or_default()
    }

    fn system(&mut self, request: &Message) -> Option<Message> {
        if request.length < 5 {
            let mut reply = *request;
            reply.length = 5;
            reply.data[4] = self.power as u8;
            return Some(reply);
        }

        match request.data[4] {
            opcode::system::STOP => self.power = false,
            opcode::system::GO => self.power = true,
            opcode::system::LOCO_EMERGENCY_STOP => {
                let address = request.address()?;
                self.locos.entry(address).or_default().speed = 0;
            }
            opcode::system::STATUS => return self.status(request),
            _ => {}
        }

        Some(*request)
    }

    fn status(&self, request: &Message) -> Option<Message> {
        let uid = request.u32_at(0)?;
        if uid != 0 && uid != self.uid {
            return None;
        }

        let channel = request.byte_at(5)?;
        let mut reply = *request;
        if let Some(value) = self.status_channels.get(&channel) {
            reply.length = 8;
            reply.set_u16(6, *value);
        }
        Some(reply)
    }

    fn loco_speed(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;

        match request.u16_at(4) {
            Some(speed) => {
                self.set_loco_speed(address, speed);
                Some(*request)
            }
            None => {
                let mut reply = *request;
                reply.length = 6;
                reply.set_u16(4, self.loco(address).speed);
                Some(reply)
            }
        }
    }

    fn loco_direction(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;
        let loco = self.locos.entry(address).or_default();

        if let Some(direction) = request.byte_at(4) {
            let next = match direction {
                0 => loco.direction,
                1 | 2 => direction,
                3 => 3 - loco.direction,
                _ => return None,
            };
            if next != loco.direction {
                loco.speed = 0;
            }
            loco.direction = next;
        }

        let mut reply = *request;
        reply.length = 5;
        reply.data[4] = loco.direction;
        Some(reply)
    }

    fn loco_function(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;
        let function = request.byte_at(4)? as usize;
        if function >= 32 {
            return None;
        }

        let loco = self.locos.entry(address).or_default();
        if let Some(power) = request.byte_at(5) {
            loco.functions[function] = power;
            return Some(*request);
        }

        let mut reply = *request;
        reply.length = 6;
        reply.data[5] = (loco.functions[function] != 0) as u8;
        Some(reply)
    }

    fn config_read(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;
        let number = request.u16_at(4)?;

        let mut reply = *request;
        reply.length = 7;
        reply.data[6] = self.config_value(address, number);
        Some(reply)
    }

    fn config_write(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;
        let number = request.u16_at(4)?;
        let value = request.byte_at(6)?;

        self.set_config_value(address, number, value);
        Some(*request)
    }

    fn accessory_request(&mut self, request: &Message) -> Option<Message> {
        let address = request.address()?;

        if let (Some(position), Some(power)) = (request.byte_at(4), request.byte_at(5)) {
            self.accessories.insert(address, (position, power));
            return Some(*request);
        }

        let (position, power) = self.accessory(address);
        let mut reply = *request;
        reply.length = 6;
        reply.data[4] = position;
        reply.data[5] = (power != 0) as u8;
        Some(reply)
    }

    fn version_reply(&self) -> Message {
        let mut reply = Message::new(opcode::VERSION, 8);
        reply.set_u32(0, self.uid);
        reply.data[4] = self.version.0;
        reply.data[5] = self.version.1;
        reply.data[6] = 0x00;
        reply.data[7] = 0x10;
        reply
    }
}
