//! Tests for TrackController
//!
//! These tests verify:
//! - The request each operation puts on the bus
//! - Reply field extraction against the simulator
//! - Timeout tiers and recovery paths
//! - Non-waiting variants

use std::sync::{Arc, Mutex};
use std::time::Duration;

use railcan::config::{Config, PollStrategy};
use railcan::controller::{AccessoryState, Version, MAX_SPEED, SPEED_STEP};
use railcan::exchange::{Exchanger, ManualClock};
use railcan::protocol::{decode_frame, encode_frame, opcode, Frame, Message};
use railcan::sim::TrackBox;
use railcan::transport::MockBus;
use railcan::{Direction, RailError, TrackController};

// =============================================================================
// Helper Functions
// =============================================================================

const LOCO: u16 = 0x4001;
const TURNOUT: u16 = 0x3000;

type Controller = TrackController<MockBus, ManualClock>;

fn config() -> Config {
    Config::builder()
        .hash(0xdf24)
        .poll(PollStrategy::Sleep { micros: 1000 })
        .build()
}

fn controller_on(bus: MockBus) -> (Controller, ManualClock) {
    let clock = ManualClock::new(Duration::ZERO);
    let config = config();
    let exchanger = Exchanger::with_clock(bus, clock.clone(), &config);
    (TrackController::from_exchanger(exchanger, config), clock)
}

/// Controller wired to a simulator that answers every request
fn setup() -> (Controller, Arc<Mutex<TrackBox>>, ManualClock) {
    let track_box = Arc::new(Mutex::new(TrackBox::default()));
    let shared = Arc::clone(&track_box);
    let bus = MockBus::with_responder(move |frame| shared.lock().unwrap().handle_frame(frame));
    let (controller, clock) = controller_on(bus);
    (controller, track_box, clock)
}

/// Controller wired to a simulator whose replies pass through `filter`
fn setup_filtered<F>(filter: F) -> (Controller, Arc<Mutex<TrackBox>>, ManualClock)
where
    F: Fn(&Message, Message) -> Option<Message> + Send + 'static,
{
    let track_box = Arc::new(Mutex::new(TrackBox::default()));
    let shared = Arc::clone(&track_box);
    let bus = MockBus::with_responder(move |frame| {
        let request = match decode_frame(frame) {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };
        let replies = shared.lock().unwrap().handle(&request);
        replies
            .into_iter()
            .filter_map(|reply| filter(&request, reply))
            .map(|reply| encode_frame(&reply))
            .collect()
    });
    let (controller, clock) = controller_on(bus);
    (controller, track_box, clock)
}

fn sent(controller: &mut Controller) -> Vec<Message> {
    controller
        .exchanger()
        .transport()
        .sent()
        .iter()
        .map(|frame| decode_frame(frame).unwrap())
        .collect()
}

fn reply_frame(opcode: u8, payload: &[u8]) -> Frame {
    encode_frame(&Message::with_payload(opcode, payload).into_response(0x4711))
}

// =============================================================================
// Device Tests
// =============================================================================

#[test]
fn test_init_waits_then_sends_bringup() {
    let (mut controller, track_box, clock) = setup();

    controller.init().unwrap();

    assert_eq!(clock.elapsed(), Duration::from_millis(500));
    let sent = sent(&mut controller);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, opcode::BRINGUP);
    assert_eq!(sent[0].length, 5);
    assert_eq!(sent[0].data[4], 0x11);
    assert_eq!(sent[0].hash, 0xdf24);
    assert!(track_box.lock().unwrap().is_initialised());
}

#[test]
fn test_get_version() {
    let (mut controller, track_box, _clock) = setup();
    track_box.lock().unwrap().set_version(2, 7);

    assert_eq!(controller.get_version().unwrap(), Version { major: 2, minor: 7 });
}

#[test]
fn test_get_version_skips_other_devices() {
    let mut bus = MockBus::new();
    // Another device type answers first
    bus.push_inbound(reply_frame(opcode::VERSION, &[0, 0, 0, 1, 3, 5, 0x00, 0x33]));
    bus.push_inbound(reply_frame(opcode::VERSION, &[0x47, 0x47, 0x53, 0x46, 1, 39, 0x00, 0x10]));
    let (mut controller, _clock) = controller_on(bus);

    assert_eq!(controller.get_version().unwrap(), Version { major: 1, minor: 39 });
}

#[test]
fn test_get_version_times_out_after_window() {
    let mut bus = MockBus::new();
    bus.push_inbound(reply_frame(opcode::VERSION, &[0, 0, 0, 1, 3, 5, 0x00, 0x33]));
    let (mut controller, clock) = controller_on(bus);

    let err = controller.get_version().unwrap_err();

    assert!(matches!(err, RailError::Timeout { opcode: opcode::VERSION, timeout_ms: 500 }));
    assert_eq!(clock.elapsed(), Duration::from_millis(500));
}

#[test]
fn test_get_system_status() {
    let (mut controller, track_box, _clock) = setup();
    let uid = {
        let mut track_box = track_box.lock().unwrap();
        track_box.set_status(1, 0x0123);
        track_box.uid()
    };

    assert_eq!(controller.get_system_status(0, 1).unwrap(), 0x0123);
    assert_eq!(controller.get_system_status(uid, 1).unwrap(), 0x0123);

    let request = sent(&mut controller)[1];
    assert_eq!(request.opcode, opcode::SYSTEM);
    assert_eq!(request.u32_at(0), Some(uid));
    assert_eq!(request.data[4], opcode::system::STATUS);
    assert_eq!(request.data[5], 1);
}

#[test]
fn test_get_system_status_unknown_channel() {
    let (mut controller, _track_box, _clock) = setup();

    let err = controller.get_system_status(0, 9).unwrap_err();
    assert!(matches!(err, RailError::UnexpectedReply { opcode: 0x00, .. }));
}

#[test]
fn test_get_system_status_wrong_uid() {
    let (mut controller, track_box, clock) = setup();
    track_box.lock().unwrap().set_status(1, 5);

    let err = controller.get_system_status(0x1234_5678, 1).unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
}

// =============================================================================
// Power Tests
// =============================================================================

#[test]
fn test_set_power_on_prepares_track() {
    let (mut controller, track_box, clock) = setup();

    controller.set_power(true).unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].data[4], opcode::system::SWITCHING_TIME);
    assert_eq!(sent[0].length, 7);
    assert_eq!(sent[1].data[4], opcode::system::TRACK_PROTOCOL);
    assert_eq!(sent[1].length, 6);
    assert_eq!(sent[2].payload(), &[0, 0, 0, 0, opcode::system::GO]);
    assert!(track_box.lock().unwrap().power());
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn test_set_power_off() {
    let (mut controller, track_box, _clock) = setup();
    controller.set_power(true).unwrap();

    controller.set_power(false).unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[3].payload(), &[0, 0, 0, 0, opcode::system::STOP]);
    assert!(!track_box.lock().unwrap().power());
}

#[test]
fn test_set_power_survives_failed_preparation() {
    let (mut controller, track_box, clock) = setup_filtered(|request, reply| {
        match (request.opcode, request.byte_at(4)) {
            (opcode::SYSTEM, Some(opcode::system::SWITCHING_TIME))
            | (opcode::SYSTEM, Some(opcode::system::TRACK_PROTOCOL)) => None,
            _ => Some(reply),
        }
    });

    controller.set_power(true).unwrap();

    assert!(track_box.lock().unwrap().power());
    assert_eq!(clock.elapsed(), Duration::from_millis(2000));
}

#[test]
fn test_set_power_fails_without_reply() {
    let (mut controller, clock) = controller_on(MockBus::new());

    let err = controller.set_power(false).unwrap_err();

    assert!(matches!(err, RailError::Timeout { opcode: 0x00, timeout_ms: 1000 }));
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
}

#[test]
fn test_send_power_does_not_wait() {
    let (mut controller, clock) = controller_on(MockBus::new());

    controller.send_power(true).unwrap();
    controller.request_power_state().unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent[0].payload(), &[0, 0, 0, 0, opcode::system::GO]);
    assert_eq!(sent[1].opcode, opcode::SYSTEM);
    assert_eq!(sent[1].length, 4);
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

// =============================================================================
// Locomotive Speed Tests
// =============================================================================

#[test]
fn test_set_and_get_speed() {
    let (mut controller, track_box, _clock) = setup();

    controller.set_loco_speed(LOCO, 512).unwrap();

    assert_eq!(controller.get_loco_speed(LOCO).unwrap(), 512);
    assert_eq!(track_box.lock().unwrap().loco(LOCO).speed, 512);

    let request = sent(&mut controller)[0];
    assert_eq!(request.payload(), &[0, 0, 0x40, 0x01, 0x02, 0x00]);
}

#[test]
fn test_speed_is_clamped_on_the_wire() {
    let (mut controller, track_box, _clock) = setup();

    controller.set_loco_speed(LOCO, 5000).unwrap();

    assert_eq!(sent(&mut controller)[0].u16_at(4), Some(MAX_SPEED));
    // The hardware itself stops at 1000
    assert_eq!(controller.get_loco_speed(LOCO).unwrap(), 1000);
    assert_eq!(track_box.lock().unwrap().loco(LOCO).speed, 1000);
}

#[test]
fn test_accelerate() {
    let (mut controller, track_box, _clock) = setup();
    controller.set_loco_speed(LOCO, 100).unwrap();

    assert_eq!(controller.accelerate_loco(LOCO).unwrap(), 100 + SPEED_STEP);
    assert_eq!(track_box.lock().unwrap().loco(LOCO).speed, 177);
}

#[test]
fn test_accelerate_clamps_to_max() {
    let (mut controller, _track_box, _clock) = setup();
    controller.set_loco_speed(LOCO, 1000).unwrap();

    assert_eq!(controller.accelerate_loco(LOCO).unwrap(), MAX_SPEED);
}

#[test]
fn test_decelerate_stops_at_zero() {
    let (mut controller, track_box, _clock) = setup();
    controller.set_loco_speed(LOCO, 50).unwrap();

    assert_eq!(controller.decelerate_loco(LOCO).unwrap(), 0);
    assert_eq!(track_box.lock().unwrap().loco(LOCO).speed, 0);

    controller.set_loco_speed(LOCO, 300).unwrap();
    assert_eq!(controller.decelerate_loco(LOCO).unwrap(), 223);
}

#[test]
fn test_get_speed_times_out_on_short_tier() {
    let (mut controller, clock) = controller_on(MockBus::new());

    let err = controller.get_loco_speed(LOCO).unwrap_err();

    assert!(matches!(err, RailError::Timeout { opcode: 0x04, timeout_ms: 1000 }));
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
}

#[test]
fn test_get_speed_ignores_unrelated_traffic() {
    let (mut controller, track_box, _clock) = setup();
    track_box.lock().unwrap().set_loco_speed(LOCO, 640);
    controller.exchanger().transport_mut().extend_inbound([
        reply_frame(opcode::ACCESSORY, &[0, 0, 0x30, 0x00, 1, 1]),
        reply_frame(opcode::LOCO_DIRECTION, &[0, 0, 0x40, 0x01, 2]),
        encode_frame(&Message::with_payload(opcode::LOCO_SPEED, &[0, 0, 0x40, 0x01, 0, 7])),
    ]);

    assert_eq!(controller.get_loco_speed(LOCO).unwrap(), 640);
}

#[test]
fn test_get_speed_rejects_short_reply() {
    let mut bus = MockBus::new();
    bus.push_inbound(reply_frame(opcode::LOCO_SPEED, &[0, 0, 0x40, 0x01]));
    let (mut controller, _clock) = controller_on(bus);

    let err = controller.get_loco_speed(LOCO).unwrap_err();
    assert!(matches!(err, RailError::UnexpectedReply { opcode: 0x04, .. }));
}

// =============================================================================
// Locomotive Direction Tests
// =============================================================================

#[test]
fn test_set_direction_stops_first() {
    let (mut controller, track_box, _clock) = setup();
    controller.set_loco_speed(LOCO, 300).unwrap();
    controller.exchanger().transport_mut().clear_sent();

    controller.set_loco_direction(LOCO, Direction::Reverse).unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].opcode, opcode::SYSTEM);
    assert_eq!(sent[0].payload(), &[0, 0, 0x40, 0x01, opcode::system::LOCO_EMERGENCY_STOP]);
    assert_eq!(sent[1].payload(), &[0, 0, 0x40, 0x01, 2]);

    let loco = track_box.lock().unwrap().loco(LOCO);
    assert_eq!(loco.direction, 2);
    assert_eq!(loco.speed, 0);
    assert_eq!(controller.get_loco_direction(LOCO).unwrap(), Direction::Reverse);
}

#[test]
fn test_toggle_direction() {
    let (mut controller, _track_box, _clock) = setup();

    controller.toggle_loco_direction(LOCO).unwrap();
    assert_eq!(controller.get_loco_direction(LOCO).unwrap(), Direction::Reverse);

    controller.toggle_loco_direction(LOCO).unwrap();
    assert_eq!(controller.get_loco_direction(LOCO).unwrap(), Direction::Forward);

    assert!(sent(&mut controller)
        .iter()
        .filter(|m| m.opcode == opcode::LOCO_DIRECTION && m.length == 5)
        .all(|m| m.data[4] == Direction::Change as u8));
}

#[test]
fn test_set_direction_tolerates_failed_stop() {
    let (mut controller, track_box, clock) = setup_filtered(|request, reply| {
        if request.opcode == opcode::SYSTEM {
            None
        } else {
            Some(reply)
        }
    });

    controller.set_loco_direction(LOCO, Direction::Reverse).unwrap();

    assert_eq!(track_box.lock().unwrap().loco(LOCO).direction, 2);
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
}

#[test]
fn test_get_direction_rejects_unknown_value() {
    let mut bus = MockBus::new();
    bus.push_inbound(reply_frame(opcode::LOCO_DIRECTION, &[0, 0, 0x40, 0x01, 7]));
    let (mut controller, _clock) = controller_on(bus);

    let err = controller.get_loco_direction(LOCO).unwrap_err();
    assert!(matches!(err, RailError::UnexpectedReply { opcode: 0x05, .. }));
}

// =============================================================================
// Locomotive Function Tests
// =============================================================================

#[test]
fn test_set_and_get_function() {
    let (mut controller, track_box, _clock) = setup();

    controller.set_loco_function(LOCO, 3, 1).unwrap();

    assert_eq!(controller.get_loco_function(LOCO, 3).unwrap(), 1);
    assert_eq!(controller.get_loco_function(LOCO, 4).unwrap(), 0);
    assert_eq!(track_box.lock().unwrap().loco(LOCO).functions[3], 1);
}

#[test]
fn test_function_power_is_reported_as_bit() {
    let (mut controller, track_box, _clock) = setup();

    controller.set_loco_function(LOCO, 0, 17).unwrap();

    assert_eq!(track_box.lock().unwrap().loco(LOCO).functions[0], 17);
    assert_eq!(controller.get_loco_function(LOCO, 0).unwrap(), 1);
}

#[test]
fn test_toggle_function() {
    let (mut controller, _track_box, _clock) = setup();

    assert_eq!(controller.toggle_loco_function(LOCO, 2).unwrap(), 1);
    assert_eq!(controller.get_loco_function(LOCO, 2).unwrap(), 1);
    assert_eq!(controller.toggle_loco_function(LOCO, 2).unwrap(), 0);
    assert_eq!(controller.get_loco_function(LOCO, 2).unwrap(), 0);
}

// =============================================================================
// Accessory Tests
// =============================================================================

#[test]
fn test_set_accessory_without_pulse() {
    let (mut controller, track_box, clock) = setup();

    controller.set_accessory(TURNOUT, 2, 1, 0).unwrap();

    assert_eq!(sent(&mut controller).len(), 1);
    assert_eq!(track_box.lock().unwrap().accessory(TURNOUT), (2, 1));
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn test_set_accessory_with_pulse_releases() {
    let (mut controller, track_box, clock) = setup();

    controller.set_accessory(TURNOUT, 1, 1, 20).unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload(), &[0, 0, 0x30, 0x00, 1, 1]);
    assert_eq!(sent[1].payload(), &[0, 0, 0x30, 0x00, 1, 0]);
    assert_eq!(clock.elapsed(), Duration::from_millis(20));
    assert_eq!(track_box.lock().unwrap().accessory(TURNOUT), (1, 0));
    assert_eq!(
        controller.get_accessory(TURNOUT).unwrap(),
        AccessoryState { position: 1, power: 0 }
    );
}

#[test]
fn test_set_accessory_reports_activation_failure() {
    let (mut controller, clock) = controller_on(MockBus::new());

    let err = controller.set_accessory(TURNOUT, 1, 1, 20).unwrap_err();

    assert!(err.is_timeout());
    // No release attempt after a failed activation
    assert_eq!(sent(&mut controller).len(), 1);
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
}

#[test]
fn test_turnout() {
    let (mut controller, _track_box, _clock) = setup();

    controller.set_turnout(TURNOUT, true).unwrap();
    assert!(controller.get_turnout(TURNOUT).unwrap());
    assert_eq!(
        controller.get_accessory(TURNOUT).unwrap(),
        AccessoryState { position: 1, power: 1 }
    );

    controller.set_turnout(TURNOUT, false).unwrap();
    assert!(!controller.get_turnout(TURNOUT).unwrap());
}

#[test]
fn test_send_accessory_does_not_wait() {
    let (mut controller, clock) = controller_on(MockBus::new());

    controller.send_accessory(TURNOUT, 1, 1).unwrap();
    controller.request_accessory_state(TURNOUT).unwrap();

    let sent = sent(&mut controller);
    assert_eq!(sent[0].payload(), &[0, 0, 0x30, 0x00, 1, 1]);
    assert_eq!(sent[1].payload(), &[0, 0, 0x30, 0x00]);
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

// =============================================================================
// Configuration Value Tests
// =============================================================================

#[test]
fn test_write_and_read_config() {
    let (mut controller, track_box, _clock) = setup();

    controller.write_config(LOCO, 3, 42).unwrap();

    assert_eq!(track_box.lock().unwrap().config_value(LOCO, 3), 42);
    assert_eq!(controller.read_config(LOCO, 3).unwrap(), 42);

    let sent = sent(&mut controller);
    assert_eq!(sent[0].opcode, opcode::CONFIG_WRITE);
    assert_eq!(sent[0].payload(), &[0, 0, 0x40, 0x01, 0, 3, 42, 0]);
    assert_eq!(sent[1].opcode, opcode::CONFIG_READ);
    assert_eq!(sent[1].payload(), &[0, 0, 0x40, 0x01, 0, 3, 1]);
}

#[test]
fn test_read_config_uses_long_tier() {
    let (mut controller, clock) = controller_on(MockBus::new());

    let err = controller.read_config(LOCO, 1).unwrap_err();

    assert!(matches!(err, RailError::Timeout { opcode: 0x07, timeout_ms: 10000 }));
    assert_eq!(clock.elapsed(), Duration::from_millis(10000));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_send_failure_surfaces() {
    let (mut controller, _track_box, clock) = setup();
    controller.exchanger().transport_mut().set_fail_sends(true);

    let err = controller.get_loco_speed(LOCO).unwrap_err();

    assert!(matches!(err, RailError::SendFailed { opcode: 0x04, .. }));
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn test_exchange_raw() {
    let (mut controller, _track_box, _clock) = setup();

    let request = Message::with_payload(opcode::LOCO_SPEED, &[0, 0, 0x40, 0x01, 0x01, 0x00]);
    let reply = controller.exchange_raw(&request).unwrap();

    assert!(reply.response);
    assert_eq!(reply.hash, 0x4711);
    assert_eq!(reply.u16_at(4), Some(256));
}
