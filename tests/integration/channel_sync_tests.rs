//! Channel value propagation: dirty-slot drains, dedup, triggers and
//! server-initiated set-value requests.

use std::sync::Arc;

use libsupla::channel::{Channel, ChannelConfig, ChannelOptions};
use libsupla::proto::messages::{ChannelNewValue, DeviceMessage, ServerMessage};
use libsupla::proto::values::RelayValue;
use libsupla::proto::{ChannelType, action_cap, ev_kind, func};

use crate::harness::Rig;

fn thermometer(sync_on_change: bool) -> Arc<Channel> {
    let mut cfg = ChannelConfig::new(ChannelType::Thermometer, func::THERMOMETER);
    cfg.options = ChannelOptions::Value {
        supported_functions: func::THERMOMETER,
        sync_values_on_change: sync_on_change,
        validity_time_sec: 60,
    };
    Channel::new(cfg).unwrap()
}

fn value_changed_frames(sent: &[DeviceMessage]) -> Vec<&DeviceMessage> {
    sent.iter()
        .filter(|m| matches!(m, DeviceMessage::ChannelValueChanged(_)))
        .collect()
}

#[test]
fn value_propagates_on_next_tick() {
    let rig = Rig::new();
    let ch = thermometer(false);
    rig.dev.add_channel(&ch).unwrap();
    rig.go_online();

    // Application thread writes; the tick drains it.
    ch.set_double_value(22.5).unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let frame = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelValueChanged(v) => Some(v),
            _ => None,
        })
        .expect("value change pushed");
    assert_eq!(frame.channel_number, 0);
    assert_eq!(frame.offline, 0);
    assert_eq!(frame.validity_time_sec, 60);
    assert_eq!(f64::from_le_bytes(frame.value), 22.5);

    // Slot is clean afterwards: no repeat on the next tick.
    rig.dev.iterate().unwrap();
    assert!(value_changed_frames(&rig.server.take_sent()).is_empty());
}

#[test]
fn sync_on_change_dedups_identical_writes() {
    let rig = Rig::new();
    let ch = thermometer(true);
    rig.dev.add_channel(&ch).unwrap();
    rig.go_online();

    ch.set_double_value(22.5).unwrap();
    rig.dev.iterate().unwrap();
    let first = rig.server.take_sent();
    assert_eq!(value_changed_frames(&first).len(), 1);

    // Identical write after the drain stays silent.
    ch.set_double_value(22.5).unwrap();
    rig.dev.iterate().unwrap();
    assert!(value_changed_frames(&rig.server.take_sent()).is_empty());

    // A different value goes out again.
    ch.set_double_value(23.0).unwrap();
    rig.dev.iterate().unwrap();
    assert_eq!(value_changed_frames(&rig.server.take_sent()).len(), 1);
}

#[test]
fn two_writes_between_ticks_produce_one_frame() {
    let rig = Rig::new();
    let ch = thermometer(true);
    rig.dev.add_channel(&ch).unwrap();
    rig.go_online();

    ch.set_double_value(22.5).unwrap();
    ch.set_double_value(22.5).unwrap();
    rig.dev.iterate().unwrap();
    assert_eq!(value_changed_frames(&rig.server.take_sent()).len(), 1);
}

#[test]
fn action_trigger_emits_with_assigned_number() {
    let rig = Rig::new();
    let relay = Channel::new(ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH))
        .unwrap();
    rig.dev.add_channel(&relay).unwrap();

    let mut cfg = ChannelConfig::new(ChannelType::ActionTrigger, func::ACTION_TRIGGER);
    cfg.options = ChannelOptions::ActionTrigger {
        caps: action_cap::SHORT_PRESS_X1 | action_cap::SHORT_PRESS_X2,
        conflicts: action_cap::SHORT_PRESS_X2,
        related_channel: Some(Arc::downgrade(&relay)),
    };
    let trigger = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&trigger).unwrap();
    rig.go_online();

    trigger.emit_action(action_cap::SHORT_PRESS_X2).unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let at = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ActionTrigger(at) => Some(at),
            _ => None,
        })
        .expect("action trigger pushed");
    assert_eq!(at.action, action_cap::SHORT_PRESS_X2);
    assert_eq!(at.channel_number, 1);
}

#[test]
fn extended_value_uses_its_own_call() {
    let rig = Rig::new();
    let relay = Channel::new(ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH))
        .unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();

    relay
        .set_timer_state_extvalue(libsupla::proto::values::TimerStateExtValue {
            remaining_time_ms: 5000,
            sender_id: 0,
            target_value: [0; 8],
        })
        .unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let ev = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelExtendedValueChanged(e) => Some(e),
            _ => None,
        })
        .expect("extended value pushed");
    assert_eq!(ev.channel_number, 0);
    assert_eq!(ev.extended_value.kind, ev_kind::TIMER_STATE_V1);
}

fn relay_set_value(ch: &Channel, new_value: &ChannelNewValue) -> bool {
    ch.set_relay_value(RelayValue {
        on: new_value.value[0] != 0,
        flags: 0,
    })
    .is_ok()
}

#[test]
fn server_set_value_invokes_callback_and_replies() {
    let rig = Rig::new();
    let mut cfg = ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH);
    cfg.callbacks.on_set_value = Some(relay_set_value);
    let relay = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();

    let mut value = [0u8; 8];
    value[0] = 1;
    rig.server.push(&ServerMessage::ChannelSetValue(ChannelNewValue {
        sender_id: 42,
        channel_number: 0,
        duration_ms: 0,
        value,
    }));
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let result = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelSetValueResult(r) => Some(r),
            _ => None,
        })
        .expect("set-value result sent");
    assert!(result.success);
    assert_eq!(result.sender_id, 42);
    assert_eq!(result.channel_number, 0);

    // The callback wrote the relay slot; the next tick pushes it back.
    rig.dev.iterate().unwrap();
    let sent = rig.server.take_sent();
    let frame = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelValueChanged(v) => Some(v),
            _ => None,
        })
        .expect("relay state pushed after callback");
    assert_eq!(frame.value[0], 1);
}

#[test]
fn set_value_for_unknown_channel_reports_failure() {
    let rig = Rig::new();
    rig.go_online();

    rig.server.push(&ServerMessage::ChannelSetValue(ChannelNewValue {
        sender_id: 7,
        channel_number: 3,
        duration_ms: 0,
        value: [0; 8],
    }));
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let result = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelSetValueResult(r) => Some(r),
            _ => None,
        })
        .expect("set-value result sent");
    assert!(!result.success);
}

#[test]
fn group_set_value_repacks_to_plain_dispatch() {
    let rig = Rig::new();
    let mut cfg = ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH);
    cfg.callbacks.on_set_value = Some(relay_set_value);
    let relay = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();

    rig.server.push(&ServerMessage::ChannelGroupSetValue(
        libsupla::proto::messages::ChannelGroupNewValue {
            group_id: 11,
            channel_number: 0,
            duration_ms: 0,
            value: [1, 0, 0, 0, 0, 0, 0, 0],
        },
    ));
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let result = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelSetValueResult(r) => Some(r),
            _ => None,
        })
        .expect("set-value result sent");
    assert!(result.success);
    assert_eq!(result.sender_id, 0);
}

#[test]
fn registration_carries_current_channel_values() {
    let rig = Rig::new();
    let ch = thermometer(false);
    rig.dev.add_channel(&ch).unwrap();
    ch.set_double_value(19.0).unwrap();

    rig.dev.start().unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let reg = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::RegisterDevice(reg) => Some(reg),
            _ => None,
        })
        .expect("register call sent");
    assert_eq!(reg.channels.len(), 1);
    match &reg.channels[0].details {
        libsupla::proto::messages::ChannelRegistrationDetails::Value { value, .. } => {
            assert_eq!(f64::from_le_bytes(*value), 19.0);
        }
        libsupla::proto::messages::ChannelRegistrationDetails::ActionTrigger { .. } => {
            panic!("expected value details")
        }
    }
}
