//! Facade behaviour driven over the scripted link: post-registration
//! exchange, notifications, channel state, functions and time sync.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use libsupla::channel::{Channel, ChannelConfig};
use libsupla::proto::messages::{
    ChannelConfigUpdate, ChannelFunctions, ChannelState, ChannelStateRequest, DeviceConfigUpdate,
    DeviceMessage, ServerMessage, UserLocalTime,
};
use libsupla::proto::{ChannelType, func, notification_field, state_field};
use libsupla::{Device, DeviceConfig};

use crate::harness::{Rig, test_config};

#[test]
fn post_registration_sends_caption_and_config_requests() {
    fn config_recv(_: &Channel, _: &ChannelConfigUpdate) {}
    fn time_sync(_: &Device, _: &UserLocalTime) -> bool {
        true
    }

    let rig = Rig::new();
    rig.dev.set_server_time_sync_callback(Some(time_sync));

    let mut cfg = ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH);
    cfg.default_caption = Some("Living room".into());
    cfg.callbacks.on_config_recv = Some(config_recv);
    let relay = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&relay).unwrap();

    rig.dev.start().unwrap();
    rig.dev.iterate().unwrap();
    rig.server.take_sent();
    rig.accept_registration(120);
    rig.dev.iterate().unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    assert!(sent
        .iter()
        .any(|m| matches!(m, DeviceMessage::GetUserLocalTime)));
    assert!(sent.iter().any(|m| matches!(
        m,
        DeviceMessage::SetChannelCaption(c) if c.caption == "Living room" && c.channel_number == 0
    )));
    assert!(sent
        .iter()
        .any(|m| matches!(m, DeviceMessage::GetChannelFunctions)));
    assert!(sent.iter().any(|m| matches!(
        m,
        DeviceMessage::GetChannelConfig(c) if c.channel_number == 0
    )));
}

#[test]
fn notifications_register_and_send() {
    let rig = Rig::new();
    rig.dev
        .enable_notifications(notification_field::SOUND);
    rig.go_online();

    // Context registration happened during the Registered tick; it was
    // drained by go_online, so exercise the send path.
    rig.dev
        .send_notification(-1, "Leak", "Water detected", 4)
        .unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let n = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::PushNotification(n) => Some(n),
            _ => None,
        })
        .expect("notification pushed");
    assert_eq!(n.context, -1);
    assert_eq!(n.title.as_deref(), Some("Leak"));
    assert_eq!(n.body.as_deref(), Some("Water detected"));
    // Sound is server-managed and therefore absent.
    assert_eq!(n.sound_id, None);
}

#[test]
fn notification_context_registered_after_registration() {
    let rig = Rig::new();
    rig.dev.enable_notifications(0);

    rig.dev.start().unwrap();
    rig.dev.iterate().unwrap();
    rig.server.take_sent();
    rig.accept_registration(120);
    rig.dev.iterate().unwrap();
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    assert!(sent.iter().any(|m| matches!(
        m,
        DeviceMessage::RegisterPushNotification(r) if r.context == -1
    )));
}

#[test]
fn channel_functions_result_updates_active_functions() {
    let rig = Rig::new();
    let relay = Channel::new(ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH))
        .unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();

    rig.server
        .push(&ServerMessage::ChannelFunctionsResult(ChannelFunctions {
            functions: vec![func::POWER_SWITCH],
        }));
    rig.dev.iterate().unwrap();
    assert_eq!(relay.active_function(), func::POWER_SWITCH);
}

#[test]
fn channel_config_update_invokes_callback() {
    static RECEIVED_FUNC: AtomicU32 = AtomicU32::new(0);
    fn config_recv(_: &Channel, update: &ChannelConfigUpdate) {
        RECEIVED_FUNC.store(update.function, Ordering::SeqCst);
    }

    let rig = Rig::new();
    let mut cfg = ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH);
    cfg.callbacks.on_config_recv = Some(config_recv);
    let relay = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();
    rig.server.take_sent();

    rig.server.push(&ServerMessage::ChannelConfig(ChannelConfigUpdate {
        channel_number: 0,
        function: func::POWER_SWITCH,
        config_type: 0,
        config: vec![1, 2],
    }));
    rig.dev.iterate().unwrap();

    assert_eq!(RECEIVED_FUNC.load(Ordering::SeqCst), func::POWER_SWITCH);
    assert_eq!(relay.active_function(), func::POWER_SWITCH);
}

fn common_state(_: &Device, state: &mut ChannelState) {
    state.fields |= state_field::BATTERY_LEVEL;
    state.battery_level = 75;
}

fn light_state(_: &Channel, state: &mut ChannelState) {
    state.fields |= state_field::LIGHT_SOURCE_OPERATING_TIME;
    state.light_source_operating_time = 123;
}

#[test]
fn channel_state_request_combines_device_and_channel_fields() {
    let rig = Rig::new();
    rig.dev.set_common_channel_state_callback(Some(common_state));

    let mut cfg = ChannelConfig::new(ChannelType::Relay, func::LIGHT_SWITCH);
    cfg.callbacks.on_get_state = Some(light_state);
    let relay = Channel::new(cfg).unwrap();
    rig.dev.add_channel(&relay).unwrap();
    rig.go_online();

    rig.clock.advance(42);
    rig.dev.iterate().unwrap();
    rig.server.take_sent();

    rig.server
        .push(&ServerMessage::ChannelStateRequest(ChannelStateRequest {
            sender_id: 17,
            channel_number: 0,
        }));
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let state = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::ChannelStateResult(s) => Some(s),
            _ => None,
        })
        .expect("channel state reply sent");

    assert_eq!(state.receiver_id, 17);
    assert_ne!(state.fields & state_field::UPTIME, 0);
    assert_ne!(state.fields & state_field::CONNECTION_UPTIME, 0);
    assert_eq!(state.uptime, 42);
    assert_eq!(state.connection_uptime, 42);
    assert_eq!(state.battery_level, 75);
    assert_eq!(state.light_source_operating_time, 123);
}

#[test]
fn time_sync_callback_preserves_counters() {
    static SYNCED: AtomicBool = AtomicBool::new(false);
    fn time_sync(_: &Device, lt: &UserLocalTime) -> bool {
        SYNCED.store(lt.year == 2026, Ordering::SeqCst);
        true
    }

    let rig = Rig::new();
    rig.dev.set_server_time_sync_callback(Some(time_sync));
    rig.go_online();

    rig.clock.advance(100);
    rig.dev.iterate().unwrap();
    let uptime_before = rig.dev.uptime();

    rig.server
        .push(&ServerMessage::UserLocalTimeResult(UserLocalTime {
            year: 2026,
            month: 8,
            day: 1,
            day_of_week: 6,
            hour: 12,
            min: 0,
            sec: 0,
            timezone: "Europe/Warsaw".into(),
        }));
    rig.dev.iterate().unwrap();

    assert!(SYNCED.load(Ordering::SeqCst));
    assert_eq!(rig.dev.uptime(), uptime_before);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.connection_uptime(), 100);
}

#[test]
fn device_config_push_is_acknowledged() {
    let rig = Rig::new();
    rig.go_online();

    rig.server
        .push(&ServerMessage::SetDeviceConfig(DeviceConfigUpdate {
            end_of_data: true,
            fields: 0x3,
            config: vec![0, 1],
        }));
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    assert!(sent
        .iter()
        .any(|m| matches!(m, DeviceMessage::SetDeviceConfigResult(_))));
}

#[test]
fn restart_request_invokes_callback() {
    static RESTARTED: AtomicBool = AtomicBool::new(false);
    fn restart(_: &Device) {
        RESTARTED.store(true, Ordering::SeqCst);
    }

    let rig = Rig::new();
    rig.dev.set_restart_request_callback(Some(restart));
    rig.go_online();

    rig.server.push(&ServerMessage::RestartRequest);
    rig.dev.iterate().unwrap();
    assert!(RESTARTED.load(Ordering::SeqCst));
}

#[test]
fn config_json_with_mandatory_fields_gets_defaults() -> anyhow::Result<()> {
    let json = r#"{
        "email": "u@e.com",
        "auth_key": [170,170,170,170,170,170,170,170,170,170,170,170,170,170,170,170],
        "guid": [187,187,187,187,187,187,187,187,187,187,187,187,187,187,187,187],
        "server": "svr.supla.org"
    }"#;
    let config: DeviceConfig = serde_json::from_str(json)?;
    assert!(!config.ssl);
    assert_eq!(config.port, 0);
    assert_eq!(config.reconnect_delay_secs, 5);

    let dev = Device::new(None, None);
    dev.set_config(config)?;
    let stored = dev.config().expect("config stored");
    assert_eq!(stored.port, 2015);
    assert_eq!(stored.activity_timeout, 120);
    Ok(())
}

#[test]
fn state_change_callback_sees_every_transition() {
    use std::sync::Mutex;
    static STATES: Mutex<Vec<libsupla::DeviceState>> = Mutex::new(Vec::new());
    fn on_state(_: &Device, state: libsupla::DeviceState) {
        STATES.lock().unwrap().push(state);
    }

    let clock = Arc::new(libsupla::time::ManualClock::new());
    let dev = Device::with_clock(None, None, Box::new(clock));
    dev.set_config(test_config()).unwrap();
    let server = crate::mock_link::MockServer::new();
    dev.set_transport(Box::new(server.link()));
    dev.set_state_change_callback(Some(on_state));

    dev.start().unwrap();
    dev.iterate().unwrap();
    server.push(&ServerMessage::RegisterResult(
        libsupla::proto::messages::RegisterDeviceResult {
            result_code: 3,
            activity_timeout: 120,
            version: 23,
            version_min: 12,
        },
    ));
    dev.iterate().unwrap();
    dev.iterate().unwrap();

    use libsupla::DeviceState::{Connected, Init, Online, Registered};
    assert_eq!(
        STATES.lock().unwrap().clone(),
        vec![Init, Connected, Registered, Online]
    );
}
