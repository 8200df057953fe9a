//! Shared test rig: a device wired to a scripted link and a manual clock.

use std::sync::Arc;

use libsupla::proto::messages::{RegisterDeviceResult, ServerMessage};
use libsupla::time::ManualClock;
use libsupla::{Device, DeviceConfig, DeviceState};

use crate::mock_link::MockServer;

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        email: "u@e.com".into(),
        auth_key: [0xAA; 16],
        guid: [0xBB; 16],
        server: "svr.supla.org".into(),
        ssl: true,
        port: 0,
        activity_timeout: 0,
        reconnect_delay_secs: 0,
    }
}

pub struct Rig {
    pub dev: Device,
    pub server: MockServer,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: DeviceConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = Arc::new(ManualClock::new());
        let dev = Device::with_clock(Some("test device"), Some("0.0-test"), Box::new(clock.clone()));
        dev.set_config(config).unwrap();
        let server = MockServer::new();
        dev.set_transport(Box::new(server.link()));
        Self { dev, server, clock }
    }

    /// Script a successful registration verdict.
    pub fn accept_registration(&self, activity_timeout: u8) {
        self.server
            .push(&ServerMessage::RegisterResult(RegisterDeviceResult {
                result_code: 3,
                activity_timeout,
                version: 23,
                version_min: 12,
            }));
    }

    /// Drive the device from Idle all the way to Online, discarding the
    /// handshake traffic.
    pub fn go_online(&self) {
        self.dev.start().unwrap();
        self.dev.iterate().unwrap();
        assert_eq!(self.dev.state(), DeviceState::Connected);

        self.accept_registration(120);
        self.dev.iterate().unwrap();
        assert_eq!(self.dev.state(), DeviceState::Registered);

        self.dev.iterate().unwrap();
        assert_eq!(self.dev.state(), DeviceState::Online);
        self.server.take_sent();
    }
}
