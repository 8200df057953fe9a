//! Session lifecycle tests: registration, liveness, reconnect, calcfg.

use libsupla::DeviceState;
use libsupla::proto::messages::{
    CalCfgRequest, DeviceMessage, RegisterDeviceResult, ServerMessage,
};
use libsupla::proto::{ResetCause, calcfg};

use crate::harness::Rig;

#[test]
fn happy_path_reaches_online() {
    let rig = Rig::new();
    assert_eq!(rig.dev.state(), DeviceState::Idle);

    rig.dev.start().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Init);

    // First tick connects and sends the registration call.
    rig.clock.advance(1);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Connected);

    let sent = rig.server.take_sent();
    let reg = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::RegisterDevice(reg) => Some(reg),
            _ => None,
        })
        .expect("register call sent on connect");
    assert_eq!(reg.email, "u@e.com");
    assert_eq!(reg.auth_key, [0xAA; 16]);
    assert_eq!(reg.guid, [0xBB; 16]);
    assert_eq!(reg.server_name, "svr.supla.org");

    rig.accept_registration(120);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Registered);

    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Online);

    // Post-registration exchange includes the channel function query.
    let sent = rig.server.take_sent();
    assert!(sent
        .iter()
        .any(|m| matches!(m, DeviceMessage::GetChannelFunctions)));

    rig.clock.advance(5);
    assert!(rig.dev.uptime() > 0);
    rig.dev.iterate().unwrap();
    assert!(rig.dev.connection_uptime() >= 5);
    assert!(rig.dev.uptime() >= rig.dev.connection_uptime());
}

#[test]
fn connect_failure_backs_off_before_retrying() {
    let rig = Rig::new();
    rig.server.fail_next_connects(1);
    rig.dev.start().unwrap();

    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Init);
    assert_eq!(rig.server.connect_count(), 1);

    // Within the back-off window nothing happens.
    rig.clock.advance(2);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.server.connect_count(), 1);

    // Past the 5 s delay the engine tries again and succeeds.
    rig.clock.advance(4);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.server.connect_count(), 2);
    assert_eq!(rig.dev.state(), DeviceState::Connected);
}

#[test]
fn register_rejection_keeps_connected_until_timeout() {
    let rig = Rig::new();
    rig.dev.start().unwrap();
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Connected);

    // Bad credentials: log only, no state change.
    rig.server
        .push(&ServerMessage::RegisterResult(RegisterDeviceResult {
            result_code: 5,
            activity_timeout: 0,
            version: 23,
            version_min: 12,
        }));
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Connected);

    // The 10 s register timeout then forces a reconnect.
    rig.clock.advance(11);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Init);
    assert_eq!(
        rig.dev.last_connection_reset_cause(),
        ResetCause::ServerConnectionLost
    );
}

#[test]
fn activity_timeout_pings_then_resets() {
    let rig = Rig::new();
    rig.go_online();

    // Ping goes out once the lead window opens (timeout - 5 s).
    rig.clock.advance(115);
    rig.dev.iterate().unwrap();
    let sent = rig.server.take_sent();
    assert!(sent.iter().any(|m| matches!(m, DeviceMessage::Ping)));

    // No response at all: at timeout + 10 s the watchdog trips.
    rig.clock.advance(15);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Init);
    assert_eq!(
        rig.dev.last_connection_reset_cause(),
        ResetCause::ActivityTimeout
    );
    assert_eq!(rig.dev.connection_uptime(), 0);
}

#[test]
fn ping_response_keeps_session_alive() {
    let rig = Rig::new();
    rig.go_online();

    rig.clock.advance(115);
    rig.dev.iterate().unwrap();

    rig.server.push(&ServerMessage::PingResult);
    rig.dev.iterate().unwrap();

    // Well past the original deadline, but the response reset the clock.
    rig.clock.advance(20);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Online);
}

#[test]
fn lost_link_reconnects_with_server_lost_cause() {
    let rig = Rig::new();
    rig.go_online();

    rig.server.drop_link();
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Init);
    assert_eq!(
        rig.dev.last_connection_reset_cause(),
        ResetCause::ServerConnectionLost
    );

    // Reconnect happens after the back-off and registers again.
    rig.clock.advance(6);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Connected);
    let sent = rig.server.take_sent();
    assert!(sent
        .iter()
        .any(|m| matches!(m, DeviceMessage::RegisterDevice(_))));
}

#[test]
fn calcfg_enter_config_mode() {
    let rig = Rig::new();
    rig.go_online();

    rig.server.push(&ServerMessage::CalCfgRequest(CalCfgRequest {
        sender_id: 5,
        channel_number: -1,
        command: calcfg::CMD_ENTER_CFG_MODE,
        super_user_authorized: true,
        data_type: 0,
        data: Vec::new(),
    }));
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Config);

    let sent = rig.server.take_sent();
    let reply = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::CalCfgResult(r) => Some(r),
            _ => None,
        })
        .expect("calcfg result sent");
    assert_eq!(reply.receiver_id, 5);
    assert_eq!(reply.result, 2); // done

    // Config is quiescent; exit leads to Idle.
    rig.dev.exit_config_mode().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Idle);
}

#[test]
fn calcfg_without_authorization_is_rejected() {
    let rig = Rig::new();
    rig.go_online();

    rig.server.push(&ServerMessage::CalCfgRequest(CalCfgRequest {
        sender_id: 9,
        channel_number: -1,
        command: calcfg::CMD_ENTER_CFG_MODE,
        super_user_authorized: false,
        data_type: 0,
        data: Vec::new(),
    }));
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Online);

    let sent = rig.server.take_sent();
    let reply = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::CalCfgResult(r) => Some(r),
            _ => None,
        })
        .expect("calcfg result sent");
    assert_eq!(reply.result, 104); // unauthorized
}

#[test]
fn stop_short_circuits_iteration() {
    let rig = Rig::new();
    rig.go_online();

    rig.dev.stop().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Idle);

    // Further ticks do nothing; no traffic is produced.
    rig.clock.advance(500);
    rig.dev.iterate().unwrap();
    assert_eq!(rig.dev.state(), DeviceState::Idle);
    assert!(rig.server.take_sent().is_empty());
}

#[test]
fn activity_timeout_renegotiated_when_configured_differs() {
    let mut config = crate::harness::test_config();
    config.activity_timeout = 30;
    let rig = Rig::with_config(config);

    rig.dev.start().unwrap();
    rig.dev.iterate().unwrap();
    rig.server.take_sent();

    // Server confirms registration with its default 120 s window.
    rig.accept_registration(120);
    rig.dev.iterate().unwrap();

    let sent = rig.server.take_sent();
    let renegotiation = sent
        .iter()
        .find_map(|m| match m {
            DeviceMessage::SetActivityTimeout(t) => Some(t),
            _ => None,
        })
        .expect("device renegotiates its configured timeout");
    assert_eq!(renegotiation.activity_timeout, 30);
}
