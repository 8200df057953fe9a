//! Device facade: channel registry, configuration, callbacks and the
//! thread-safety envelope around the session engine.
//!
//! A [`Device`] is created once, configured, populated with channels and
//! then driven by a single thread calling
//! [`iterate`](Device::iterate) in a loop. Every public method is safe to
//! call concurrently from other threads; value updates travel through the
//! channel slots and are pushed by the next tick.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::proto::messages::{ChannelState, UserLocalTime};
use crate::proto::{
    ACTIVITY_TIMEOUT_DEFAULT, CHANNELMAXCOUNT, DEVICE_NAME_MAXSIZE, NOTIFICATION_CTX_DEVICE,
    PORT_PLAIN, PORT_TLS, ResetCause, notification_field,
};
use crate::rpc::Dispatcher;
use crate::time::{Clock, SystemClock};
use crate::transport::{NullTransport, TcpTransport, TlsTransport, Transport, default_tls_config};

/// Seconds to wait before retrying a failed connect.
pub const DEFAULT_RECONNECT_DELAY_SECS: u32 = 5;

fn default_reconnect_delay() -> u32 {
    DEFAULT_RECONNECT_DELAY_SECS
}

// ── Lifecycle state ──────────────────────────────────────────

/// Session lifecycle of one device-to-cloud relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Local configuration mode; no cloud activity.
    Config,
    /// Quiescent; waiting for `start`.
    Idle,
    /// (Re)connecting to the server.
    Init,
    /// Transport up, registration sent, waiting for the verdict.
    Connected,
    /// Registration accepted; post-registration exchange pending.
    Registered,
    /// Fully operational: syncing values, answering calls, pinging.
    Online,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Idle => "IDLE",
            Self::Init => "INIT",
            Self::Connected => "CONNECTED",
            Self::Registered => "REGISTERED",
            Self::Online => "ONLINE",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Configuration ────────────────────────────────────────────

/// Cloud connection credentials and tunables.
///
/// `port`, `activity_timeout` and `reconnect_delay_secs` may be left at
/// zero/absent; [`Device::set_config`] fills protocol defaults.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub email: String,
    pub auth_key: [u8; 16],
    pub guid: [u8; 16],
    pub server: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub activity_timeout: u8,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u32,
}

impl fmt::Debug for DeviceConfig {
    // Credentials stay out of log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("email", &self.email)
            .field("server", &self.server)
            .field("ssl", &self.ssl)
            .field("port", &self.port)
            .field("activity_timeout", &self.activity_timeout)
            .finish_non_exhaustive()
    }
}

/// Manufacturer and product identifiers announced at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManufacturerData {
    pub manufacturer_id: i16,
    pub product_id: i16,
}

// ── Device callbacks ─────────────────────────────────────────

pub type StateChangeFn = fn(&Device, DeviceState);
pub type CommonChannelStateFn = fn(&Device, &mut ChannelState);
/// Returns `true` when the host accepted the server time; the device then
/// re-anchors its uptime counters.
pub type TimeSyncFn = fn(&Device, &UserLocalTime) -> bool;
pub type RestartRequestFn = fn(&Device);

#[derive(Clone, Copy, Default)]
pub(crate) struct DeviceCallbacks {
    pub on_state_change: Option<StateChangeFn>,
    pub on_common_channel_state: Option<CommonChannelStateFn>,
    pub on_server_time_sync: Option<TimeSyncFn>,
    pub on_restart_request: Option<RestartRequestFn>,
}

// ── Notifications ────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
pub(crate) struct NotificationPolicy {
    pub enabled: bool,
    pub server_managed_fields: u8,
}

pub(crate) struct PendingNotification {
    pub context: i32,
    pub title: Option<String>,
    pub body: Option<String>,
    pub sound_id: Option<i32>,
}

// ── Internal state ───────────────────────────────────────────

pub(crate) struct DeviceCore {
    pub name: String,
    pub soft_ver: String,
    pub state: DeviceState,
    pub config: Option<DeviceConfig>,
    pub flags: u32,
    pub manufacturer: ManufacturerData,
    pub callbacks: DeviceCallbacks,
    pub notifications: NotificationPolicy,
    pub pending_notifications: VecDeque<PendingNotification>,

    /// Monotonic seconds at device creation.
    pub init_time: u64,
    /// Monotonic seconds of the last registration attempt/acceptance.
    pub register_time: Option<u64>,
    pub last_ping: u64,
    pub last_response: u64,
    pub uptime: u64,
    pub connection_uptime: u64,
    pub reset_cause: ResetCause,

    /// Effective (negotiated) activity timeout, seconds.
    pub activity_timeout: u8,
    /// Back-off deadline for the next connect attempt.
    pub retry_at: Option<u64>,
}

pub(crate) struct SessionLink {
    pub transport: Box<dyn Transport>,
    pub dispatcher: Dispatcher,
    /// Host-injected transport; `start` must not replace it.
    pub custom_transport: bool,
}

/// SUPLA device instance.
pub struct Device {
    pub(crate) core: Mutex<DeviceCore>,
    pub(crate) channels: Mutex<Vec<Arc<Channel>>>,
    pub(crate) link: Mutex<SessionLink>,
    pub(crate) clock: Box<dyn Clock>,
}

impl Device {
    /// Create a device with the default monotonic clock.
    ///
    /// `None` falls back to `"SUPLA device"` / `"libsupla <version>"`.
    pub fn new(name: Option<&str>, soft_ver: Option<&str>) -> Self {
        Self::with_clock(name, soft_ver, Box::new(SystemClock::new()))
    }

    /// Create a device with an injected clock (tests, simulation).
    pub fn with_clock(name: Option<&str>, soft_ver: Option<&str>, clock: Box<dyn Clock>) -> Self {
        let init_time = clock.monotonic_secs();
        Self {
            core: Mutex::new(DeviceCore {
                name: truncate(name.unwrap_or("SUPLA device"), DEVICE_NAME_MAXSIZE),
                soft_ver: soft_ver
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| format!("libsupla {}", env!("CARGO_PKG_VERSION"))),
                state: DeviceState::Idle,
                config: None,
                flags: 0,
                manufacturer: ManufacturerData::default(),
                callbacks: DeviceCallbacks::default(),
                notifications: NotificationPolicy::default(),
                pending_notifications: VecDeque::new(),
                init_time,
                register_time: None,
                last_ping: init_time,
                last_response: init_time,
                uptime: 0,
                connection_uptime: 0,
                reset_cause: ResetCause::None,
                activity_timeout: ACTIVITY_TIMEOUT_DEFAULT,
                retry_at: None,
            }),
            channels: Mutex::new(Vec::new()),
            link: Mutex::new(SessionLink {
                transport: Box::new(NullTransport),
                dispatcher: Dispatcher::new(),
                custom_transport: false,
            }),
            clock,
        }
    }

    pub(crate) fn lock_core(&self) -> MutexGuard<'_, DeviceCore> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn lock_link(&self) -> MutexGuard<'_, SessionLink> {
        match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn lock_channels(&self) -> MutexGuard<'_, Vec<Arc<Channel>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── Identity accessors ────────────────────────────────────

    pub fn name(&self) -> String {
        self.lock_core().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.lock_core().name = truncate(name, DEVICE_NAME_MAXSIZE);
    }

    pub fn software_version(&self) -> String {
        self.lock_core().soft_ver.clone()
    }

    pub fn state(&self) -> DeviceState {
        self.lock_core().state
    }

    pub fn flags(&self) -> u32 {
        self.lock_core().flags
    }

    pub fn set_flags(&self, flags: u32) {
        self.lock_core().flags = flags;
    }

    pub fn manufacturer_data(&self) -> ManufacturerData {
        self.lock_core().manufacturer
    }

    pub fn set_manufacturer_data(&self, data: ManufacturerData) {
        self.lock_core().manufacturer = data;
    }

    /// Seconds since device creation.
    pub fn uptime(&self) -> u64 {
        let core = self.lock_core();
        self.clock.monotonic_secs() - core.init_time
    }

    /// Seconds since the current registration; 0 while not online.
    pub fn connection_uptime(&self) -> u64 {
        self.lock_core().connection_uptime
    }

    pub fn last_connection_reset_cause(&self) -> ResetCause {
        self.lock_core().reset_cause
    }

    // ── Callback installers ───────────────────────────────────

    pub fn set_state_change_callback(&self, callback: Option<StateChangeFn>) {
        self.lock_core().callbacks.on_state_change = callback;
    }

    pub fn set_common_channel_state_callback(&self, callback: Option<CommonChannelStateFn>) {
        self.lock_core().callbacks.on_common_channel_state = callback;
    }

    pub fn set_server_time_sync_callback(&self, callback: Option<TimeSyncFn>) {
        self.lock_core().callbacks.on_server_time_sync = callback;
    }

    pub fn set_restart_request_callback(&self, callback: Option<RestartRequestFn>) {
        self.lock_core().callbacks.on_restart_request = callback;
    }

    // ── Channel registry ──────────────────────────────────────

    /// Append a channel and assign its number (= current count).
    ///
    /// The channel becomes co-owned by the device; keep your own `Arc` for
    /// value updates.
    pub fn add_channel(&self, channel: &Arc<Channel>) -> Result<u8> {
        let mut channels = self.lock_channels();
        if channels.len() >= CHANNELMAXCOUNT {
            return Err(Error::ChannelMax);
        }
        if channel.assigned_number() >= 0 {
            return Err(Error::InvalidArgument("channel already added"));
        }
        let number = channels.len() as i32;
        channel.assign_number(number);
        channel.resolve_trigger_properties();
        channels.push(Arc::clone(channel));
        debug!(
            "[{}] [{}] added new {:?} channel",
            self.lock_core().name,
            number,
            channel.channel_type()
        );
        Ok(number as u8)
    }

    pub fn channel_count(&self) -> usize {
        self.lock_channels().len()
    }

    pub fn channel_by_number(&self, number: i32) -> Option<Arc<Channel>> {
        self.lock_channels()
            .iter()
            .find(|ch| ch.assigned_number() == number)
            .cloned()
    }

    // ── Configuration ─────────────────────────────────────────

    /// Validate credentials and store the connection config, filling the
    /// default port and activity timeout.
    pub fn set_config(&self, config: DeviceConfig) -> Result<()> {
        let mut config = config;
        if config.email.is_empty() {
            return Err(Error::InvalidArgument("email not set"));
        }
        if config.auth_key == [0; 16] {
            return Err(Error::AuthKeyError);
        }
        if config.guid == [0; 16] {
            return Err(Error::GuidError);
        }
        if config.server.is_empty() {
            return Err(Error::InvalidArgument("server not set"));
        }
        if config.port == 0 {
            config.port = if config.ssl { PORT_TLS } else { PORT_PLAIN };
        }
        if config.activity_timeout == 0 {
            config.activity_timeout = ACTIVITY_TIMEOUT_DEFAULT;
        }
        if config.reconnect_delay_secs == 0 {
            config.reconnect_delay_secs = DEFAULT_RECONNECT_DELAY_SECS;
        }

        let mut core = self.lock_core();
        core.activity_timeout = config.activity_timeout;
        core.config = Some(config);
        info!("[{}] setup completed", core.name);
        Ok(())
    }

    pub fn config(&self) -> Option<DeviceConfig> {
        self.lock_core().config.clone()
    }

    /// Replace the transport adapter. The default is built from the
    /// config at `start`; tests and embedded hosts inject their own.
    pub fn set_transport(&self, transport: Box<dyn Transport>) {
        let mut link = self.lock_link();
        link.transport = transport;
        link.custom_transport = true;
        link.dispatcher.reset();
    }

    // ── Notifications ─────────────────────────────────────────

    /// Enable device-level push notifications. `server_managed_fields`
    /// names the parts the server composes itself
    /// ([`notification_field`](crate::proto::notification_field)).
    pub fn enable_notifications(&self, server_managed_fields: u8) {
        let mut core = self.lock_core();
        core.notifications = NotificationPolicy {
            enabled: true,
            server_managed_fields,
        };
    }

    pub fn disable_notifications(&self) {
        self.lock_core().notifications = NotificationPolicy::default();
    }

    /// Queue a push notification; it leaves on the next Online tick.
    ///
    /// `ctx` = -1 targets the device, otherwise the channel with that
    /// assigned number. Server-managed fields are stripped before the
    /// notification is queued.
    pub fn send_notification(
        &self,
        ctx: i32,
        title: &str,
        body: &str,
        sound_id: i32,
    ) -> Result<()> {
        if ctx != NOTIFICATION_CTX_DEVICE && self.channel_by_number(ctx).is_none() {
            return Err(Error::InvalidArgument(
                "no channel for notification context",
            ));
        }

        let mut core = self.lock_core();
        if !core.notifications.enabled {
            return Err(Error::InvalidState("notifications disabled"));
        }
        let managed = core.notifications.server_managed_fields;
        core.pending_notifications.push_back(PendingNotification {
            context: ctx,
            title: (managed & notification_field::TITLE == 0).then(|| title.to_owned()),
            body: (managed & notification_field::BODY == 0).then(|| body.to_owned()),
            sound_id: (managed & notification_field::SOUND == 0).then_some(sound_id),
        });
        Ok(())
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Begin cloud activity. Only the Idle→Init edge does anything;
    /// repeated calls are no-ops.
    pub fn start(&self) -> Result<()> {
        let (state, config) = {
            let core = self.lock_core();
            (core.state, core.config.clone())
        };
        let Some(config) = config else {
            return Err(Error::NotConfigured);
        };
        if state != DeviceState::Idle {
            return Ok(());
        }

        {
            let mut link = self.lock_link();
            if !link.custom_transport {
                link.transport = build_transport(&config);
            }
        }
        self.set_state(DeviceState::Init);
        Ok(())
    }

    /// Force Idle from any state and drop the connection.
    pub fn stop(&self) -> Result<()> {
        self.set_state(DeviceState::Idle);
        let mut link = self.lock_link();
        link.transport.disconnect();
        link.dispatcher.reset();
        let mut core = self.lock_core();
        core.retry_at = None;
        core.connection_uptime = 0;
        Ok(())
    }

    /// Switch into local configuration mode. Idempotent; ticks are
    /// quiescent until the mode is left and the device restarted.
    pub fn enter_config_mode(&self) -> Result<()> {
        self.set_state(DeviceState::Config);
        Ok(())
    }

    /// Leave configuration mode into Idle. Fails in any other state.
    pub fn exit_config_mode(&self) -> Result<()> {
        if self.state() != DeviceState::Config {
            return Err(Error::InvalidState("not in config mode"));
        }
        self.set_state(DeviceState::Idle);
        Ok(())
    }

    /// Change state and fire the state-change callback outside the lock.
    pub(crate) fn set_state(&self, new_state: DeviceState) {
        let callback = {
            let mut core = self.lock_core();
            if core.state == new_state {
                return;
            }
            info!("[{}] state -> {}", core.name, new_state);
            core.state = new_state;
            core.callbacks.on_state_change
        };
        if let Some(cb) = callback {
            cb(self, new_state);
        }
    }
}

impl Drop for Device {
    // Clean termination: the link goes down with the device.
    fn drop(&mut self) {
        self.lock_link().transport.disconnect();
    }
}

fn truncate(s: &str, max: usize) -> String {
    let mut end = s.len().min(max);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

fn build_transport(config: &DeviceConfig) -> Box<dyn Transport> {
    if config.ssl {
        Box::new(TlsTransport::new(
            config.server.clone(),
            config.port,
            default_tls_config(),
        ))
    } else {
        Box::new(TcpTransport::new(config.server.clone(), config.port))
    }
}
