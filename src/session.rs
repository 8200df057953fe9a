//! Session engine: the lifecycle tick and the inbound call handlers.
//!
//! ```text
//!  IDLE ──start()──▶ INIT ──connect+register──▶ CONNECTED
//!    ▲                 ▲                            │
//!    │          [lost/timeout]              [register accepted]
//!  stop()               │                            ▼
//!    │                  └──────── ONLINE ◀──── REGISTERED
//!    │                               │
//!  CONFIG ◀──[calcfg enter-config-mode / enter_config_mode()]
//! ```
//!
//! [`Device::iterate`] advances the machine by one tick: it reads the
//! monotonic clock once, performs the state's work, then runs a
//! dispatcher pass and demuxes whatever the server sent. All transient
//! failures (unreachable server, lost link, corrupt stream) resolve into
//! the Init state with a recorded reset cause; `iterate` itself only
//! errors on caller mistakes such as a missing configuration.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::channel::Channel;
use crate::device::{Device, DeviceState, PendingNotification, SessionLink};
use crate::error::{Error, Result};
use crate::proto::messages::{
    CalCfgRequest, CalCfgResult, ChannelNewValue, ChannelSetValueResult, ChannelState,
    ChannelStateRequest, DeviceMessage, GetChannelConfig, PushNotification, RegisterDevice,
    RegisterDeviceResult, RegisterPushNotification, ServerMessage, SetActivityTimeout,
    SetChannelCaption, SetDeviceConfigResult, UserLocalTime,
};
use crate::proto::{
    CalCfgResultCode, NOTIFICATION_CTX_DEVICE, PROTO_VERSION, RegisterResultCode, ResetCause,
    calcfg, state_field,
};

/// Seconds the device waits in Connected for a register verdict.
const REGISTER_TIMEOUT_SECS: u64 = 10;

/// Ping lead time before the activity timeout expires.
const PING_LEAD_SECS: u64 = 5;

/// Grace period past the activity timeout before the link is declared
/// dead.
const RESPONSE_GRACE_SECS: u64 = 10;

impl Device {
    /// Advance the session by one tick.
    ///
    /// Call this in a loop from a single driver thread. Returns an error
    /// only for caller mistakes (no configuration); transport and
    /// protocol failures are handled internally via reconnect.
    pub fn iterate(&self) -> Result<()> {
        let now = self.clock.monotonic_secs();

        let state = {
            let mut core = self.lock_core();
            if core.config.is_none() {
                return Err(Error::NotConfigured);
            }
            core.uptime = now - core.init_time;
            core.state
        };

        match state {
            DeviceState::Idle | DeviceState::Config => return Ok(()),
            DeviceState::Init => {
                if !self.tick_init(now) {
                    return Ok(());
                }
            }
            DeviceState::Connected => self.tick_connected(now),
            DeviceState::Registered => self.tick_registered(),
            DeviceState::Online => self.tick_online(now),
        }

        self.pump(now);
        Ok(())
    }

    // ── Per-state ticks ───────────────────────────────────────

    /// Reconnect attempt. Returns whether the link is up afterwards.
    fn tick_init(&self, now: u64) -> bool {
        let (server, port, reconnect_delay) = {
            let mut core = self.lock_core();
            if let Some(retry_at) = core.retry_at {
                if now < retry_at {
                    return false;
                }
            }
            core.retry_at = None;
            core.register_time = None;
            core.last_ping = now;
            core.last_response = now;
            core.connection_uptime = 0;
            let cfg = core.config.as_ref().map(|c| {
                (
                    c.server.clone(),
                    c.port,
                    u64::from(c.reconnect_delay_secs),
                )
            });
            match cfg {
                Some(c) => c,
                None => return false,
            }
        };

        info!("Connecting to {server}:{port}");
        let connected = {
            let mut link = self.lock_link();
            link.dispatcher.reset();
            link.transport.disconnect();
            match link.transport.connect() {
                Ok(()) => true,
                Err(e) => {
                    warn!("connect failed: {e}");
                    false
                }
            }
        };

        if !connected {
            self.lock_core().retry_at = Some(now + reconnect_delay);
            return false;
        }

        info!("Connected to server");
        let register = self.build_register_device();
        let queued = {
            let mut link = self.lock_link();
            link.dispatcher
                .queue(&DeviceMessage::RegisterDevice(register))
                .is_ok()
        };
        if !queued {
            self.connection_lost(now, ResetCause::ServerConnectionLost, true);
            return false;
        }

        self.lock_core().register_time = Some(now);
        self.set_state(DeviceState::Connected);
        true
    }

    /// Waiting for the registration verdict.
    fn tick_connected(&self, now: u64) {
        let register_time = self.lock_core().register_time;
        let expired = match register_time {
            Some(t) => now.saturating_sub(t) > REGISTER_TIMEOUT_SECS,
            None => true,
        };
        if expired {
            warn!("registration timed out");
            self.connection_lost(now, ResetCause::ServerConnectionLost, false);
        }
    }

    /// One-shot post-registration exchange, then Online.
    fn tick_registered(&self) {
        let (time_sync, notifications) = {
            let core = self.lock_core();
            (
                core.callbacks.on_server_time_sync.is_some(),
                core.notifications,
            )
        };
        let channels: Vec<Arc<Channel>> = self.lock_channels().clone();

        {
            let mut link = self.lock_link();
            if time_sync {
                let _ = link.dispatcher.queue(&DeviceMessage::GetUserLocalTime);
            }

            for ch in &channels {
                if let Some(caption) = &ch.config().default_caption {
                    let _ = link.dispatcher.queue(&DeviceMessage::SetChannelCaption(
                        SetChannelCaption {
                            channel_number: ch.assigned_number().max(0) as u8,
                            caption: caption.clone(),
                        },
                    ));
                }
            }

            let _ = link.dispatcher.queue(&DeviceMessage::GetChannelFunctions);

            for ch in &channels {
                if ch.config().callbacks.on_config_recv.is_some() {
                    let _ = link.dispatcher.queue(&DeviceMessage::GetChannelConfig(
                        GetChannelConfig {
                            channel_number: ch.assigned_number().max(0) as u8,
                            config_type: 0,
                        },
                    ));
                }
            }

            if notifications.enabled {
                let _ = link.dispatcher.queue(&DeviceMessage::RegisterPushNotification(
                    RegisterPushNotification {
                        context: NOTIFICATION_CTX_DEVICE,
                        server_managed_fields: notifications.server_managed_fields,
                    },
                ));
            }
        }

        self.set_state(DeviceState::Online);
    }

    /// Steady state: watchdog, ping, slot drain, notification drain.
    fn tick_online(&self, now: u64) {
        let mut send_ping = false;
        {
            let mut core = self.lock_core();
            if let Some(register_time) = core.register_time {
                core.connection_uptime = now - register_time;
            }

            let timeout = u64::from(core.activity_timeout);
            if timeout > 0 {
                if now.saturating_sub(core.last_response) >= timeout + RESPONSE_GRACE_SECS {
                    drop(core);
                    error!("ping timeout");
                    self.connection_lost(now, ResetCause::ActivityTimeout, false);
                    return;
                }
                if now.saturating_sub(core.last_ping) >= timeout.saturating_sub(PING_LEAD_SECS) {
                    send_ping = true;
                    core.last_ping = now;
                }
            }
        }

        let pending: Vec<PendingNotification> = {
            let mut core = self.lock_core();
            core.pending_notifications.drain(..).collect()
        };
        let channels: Vec<Arc<Channel>> = self.lock_channels().clone();

        let mut link = self.lock_link();
        if send_ping {
            let _ = link.dispatcher.queue(&DeviceMessage::Ping);
        }
        for ch in &channels {
            ch.sync(&mut link.dispatcher);
        }
        for n in pending {
            let _ = link
                .dispatcher
                .queue(&DeviceMessage::PushNotification(PushNotification {
                    context: n.context,
                    title: n.title,
                    body: n.body,
                    sound_id: n.sound_id,
                }));
        }
    }

    // ── Dispatcher pass ───────────────────────────────────────

    /// Flush outbound bytes and demux everything the server sent.
    fn pump(&self, now: u64) {
        let messages = {
            let mut link = self.lock_link();
            if !link.transport.is_connected() {
                return;
            }
            let SessionLink {
                transport,
                dispatcher,
                ..
            } = &mut *link;
            dispatcher.iterate(transport.as_mut())
        };

        let messages = match messages {
            Ok(messages) => messages,
            Err(e) => {
                warn!("srpc iterate failed: {e}");
                self.connection_lost(now, ResetCause::ServerConnectionLost, true);
                return;
            }
        };

        for msg in messages {
            self.handle_server_message(msg, now);
            self.lock_core().last_response = now;
        }

        // Push replies queued by the handlers in the same tick.
        let flushed = {
            let mut link = self.lock_link();
            let SessionLink {
                transport,
                dispatcher,
                ..
            } = &mut *link;
            dispatcher.flush(transport.as_mut())
        };
        if let Err(e) = flushed {
            warn!("srpc flush failed: {e}");
            self.connection_lost(now, ResetCause::ServerConnectionLost, true);
        }
    }

    /// Tear the link down and schedule a reconnect.
    fn connection_lost(&self, now: u64, cause: ResetCause, back_off: bool) {
        {
            let mut core = self.lock_core();
            core.reset_cause = cause;
            core.connection_uptime = 0;
            if back_off {
                let delay = core
                    .config
                    .as_ref()
                    .map_or(5, |c| u64::from(c.reconnect_delay_secs));
                core.retry_at = Some(now + delay);
            }
        }
        {
            let mut link = self.lock_link();
            link.transport.disconnect();
            link.dispatcher.reset();
        }
        self.set_state(DeviceState::Init);
    }

    fn queue_reply(&self, msg: &DeviceMessage) {
        let mut link = self.lock_link();
        if let Err(e) = link.dispatcher.queue(msg) {
            warn!("cannot queue reply call_id={}: {e}", msg.call_id());
        }
    }

    // ── Inbound handlers ──────────────────────────────────────

    fn handle_server_message(&self, msg: ServerMessage, now: u64) {
        match msg {
            ServerMessage::VersionError(e) => {
                error!(
                    "protocol version error: srv[{}-{}] dev:{}",
                    e.server_version_min, e.server_version, PROTO_VERSION
                );
            }
            ServerMessage::PingResult => debug!("ping result"),
            ServerMessage::RegisterResult(res) => self.handle_register_result(&res, now),
            ServerMessage::ChannelSetValue(nv) => self.handle_set_value(&nv),
            ServerMessage::ChannelGroupSetValue(gv) => {
                debug!(
                    "channel group[{}] set value request for ch[{}]",
                    gv.group_id, gv.channel_number
                );
                self.handle_set_value(&ChannelNewValue {
                    sender_id: 0,
                    channel_number: gv.channel_number,
                    duration_ms: gv.duration_ms,
                    value: gv.value,
                });
            }
            ServerMessage::SetActivityTimeoutResult(res) => {
                info!(
                    "received activity timeout={}s allowed[{}-{}]",
                    res.activity_timeout, res.min, res.max
                );
                let mut core = self.lock_core();
                core.activity_timeout = res.activity_timeout;
                if let Some(cfg) = core.config.as_mut() {
                    cfg.activity_timeout = res.activity_timeout;
                }
            }
            ServerMessage::UserLocalTimeResult(lt) => self.handle_time_sync(&lt, now),
            ServerMessage::CalCfgRequest(req) => self.handle_calcfg(&req),
            ServerMessage::ChannelStateRequest(req) => self.handle_channel_state_request(&req),
            ServerMessage::ChannelFunctionsResult(funcs) => {
                for (number, function) in funcs.functions.iter().enumerate() {
                    match self.channel_by_number(number as i32) {
                        Some(ch) => {
                            if ch.set_active_function(*function).is_ok() {
                                debug!("channel[{number}] active function={function}");
                            }
                        }
                        None => warn!("channel[{number}] not found"),
                    }
                }
            }
            ServerMessage::ChannelConfig(update) => {
                match self.channel_by_number(i32::from(update.channel_number)) {
                    Some(ch) => {
                        let _ = ch.set_active_function(update.function);
                        if let Some(cb) = ch.config().callbacks.on_config_recv {
                            cb(&ch, &update);
                        }
                    }
                    None => warn!("channel[{}] not found", update.channel_number),
                }
            }
            ServerMessage::SetDeviceConfig(_) => {
                // No local device-config policy yet; acknowledge as applied.
                self.queue_reply(&DeviceMessage::SetDeviceConfigResult(SetDeviceConfigResult {
                    result: 0,
                }));
            }
            ServerMessage::FirmwareUpdateUrlResult(res) => {
                info!("firmware update url result: exists={}", res.exists);
            }
            ServerMessage::RegistrationEnabledResult(_) => {
                debug!("registration enabled result received");
            }
            ServerMessage::ChannelCaptionResult(res) => {
                debug!(
                    "channel[{}] caption result={}",
                    res.channel_number, res.result
                );
            }
            ServerMessage::RestartRequest => {
                let callback = self.lock_core().callbacks.on_restart_request;
                match callback {
                    Some(cb) => cb(self),
                    None => info!("restart request received, no handler installed"),
                }
            }
            ServerMessage::Unknown(call_id) => {
                debug!("received unknown call_id={call_id} from server");
            }
        }
    }

    fn handle_register_result(&self, res: &RegisterDeviceResult, now: u64) {
        let code = RegisterResultCode::from_raw(res.result_code);
        if code != RegisterResultCode::Accepted {
            warn!("registration rejected: {}", register_failure_text(code));
            return;
        }

        let (name, configured_timeout) = {
            let mut core = self.lock_core();
            core.activity_timeout = res.activity_timeout;
            core.register_time = Some(now);
            (
                core.name.clone(),
                core.config.as_ref().map_or(0, |c| c.activity_timeout),
            )
        };
        info!(
            "[{}] registered: srv ver {}(min={}), activity timeout={}s",
            name, res.version, res.version_min, res.activity_timeout
        );

        if configured_timeout != res.activity_timeout {
            debug!("setting activity timeout to {configured_timeout}s");
            self.queue_reply(&DeviceMessage::SetActivityTimeout(SetActivityTimeout {
                activity_timeout: configured_timeout,
            }));
        }

        self.set_state(DeviceState::Registered);
    }

    fn handle_set_value(&self, new_value: &ChannelNewValue) {
        debug!("channel[{}] set value request", new_value.channel_number);
        let success = match self.channel_by_number(i32::from(new_value.channel_number)) {
            Some(ch) => ch.handle_new_value(new_value),
            None => {
                warn!("channel[{}] not found", new_value.channel_number);
                false
            }
        };
        self.queue_reply(&DeviceMessage::ChannelSetValueResult(ChannelSetValueResult {
            channel_number: new_value.channel_number,
            sender_id: new_value.sender_id,
            success,
        }));
    }

    fn handle_time_sync(&self, localtime: &UserLocalTime, now: u64) {
        debug!(
            "received user localtime: {:04}-{:02}-{:02} {:02}:{:02}:{:02} {}",
            localtime.year,
            localtime.month,
            localtime.day,
            localtime.hour,
            localtime.min,
            localtime.sec,
            localtime.timezone
        );
        let Some(cb) = self.lock_core().callbacks.on_server_time_sync else {
            return;
        };
        if cb(self, localtime) {
            // Re-anchor both clocks so uptime and connection uptime
            // survive the host's wall-clock jump.
            let mut core = self.lock_core();
            core.init_time = now - core.uptime;
            if core.register_time.is_some() {
                core.register_time = Some(now - core.connection_uptime);
            }
            info!("device time sync success");
        } else {
            warn!("device time sync rejected by host");
        }
    }

    fn handle_calcfg(&self, req: &CalCfgRequest) {
        debug!(
            "calcfg from server: ch={} cmd={} auth={} datasize={}",
            req.channel_number,
            req.command,
            req.super_user_authorized,
            req.data.len()
        );

        let result = if !req.super_user_authorized {
            CalCfgResultCode::Unauthorized.as_raw()
        } else if req.channel_number == -1 {
            if req.command == calcfg::CMD_ENTER_CFG_MODE {
                info!("calcfg enter config mode received");
                self.set_state(DeviceState::Config);
                CalCfgResultCode::Done.as_raw()
            } else {
                CalCfgResultCode::NotSupported.as_raw()
            }
        } else {
            match self.channel_by_number(req.channel_number) {
                Some(ch) => match ch.config().callbacks.on_calcfg {
                    Some(cb) => cb(&ch, req).as_raw(),
                    None => CalCfgResultCode::NotSupported.as_raw(),
                },
                None => {
                    warn!("channel[{}] not found", req.channel_number);
                    CalCfgResultCode::IdNotExists.as_raw()
                }
            }
        };

        self.queue_reply(&DeviceMessage::CalCfgResult(CalCfgResult {
            receiver_id: req.sender_id,
            channel_number: req.channel_number,
            command: req.command,
            result,
            data: Vec::new(),
        }));
    }

    fn handle_channel_state_request(&self, req: &ChannelStateRequest) {
        debug!("get channel[{}] state", req.channel_number);
        let mut state = ChannelState {
            receiver_id: req.sender_id,
            channel_number: req.channel_number,
            ..Default::default()
        };

        let common = {
            let core = self.lock_core();
            state.fields |= state_field::UPTIME
                | state_field::CONNECTION_UPTIME
                | state_field::LAST_CONNECTION_RESET_CAUSE;
            state.uptime = core.uptime as u32;
            state.connection_uptime = core.connection_uptime as u32;
            state.last_connection_reset_cause = core.reset_cause as u8;
            core.callbacks.on_common_channel_state
        };
        if let Some(cb) = common {
            cb(self, &mut state);
        }

        match self.channel_by_number(req.channel_number) {
            Some(ch) => {
                if let Some(cb) = ch.config().callbacks.on_get_state {
                    cb(&ch, &mut state);
                }
            }
            None => warn!("channel[{}] not found", req.channel_number),
        }

        self.queue_reply(&DeviceMessage::ChannelStateResult(state));
    }

    // ── Registration builder ──────────────────────────────────

    fn build_register_device(&self) -> RegisterDevice {
        let (email, auth_key, guid, name, soft_ver, server_name, flags, manufacturer) = {
            let core = self.lock_core();
            let cfg = core.config.as_ref();
            (
                cfg.map(|c| c.email.clone()).unwrap_or_default(),
                cfg.map(|c| c.auth_key).unwrap_or_default(),
                cfg.map(|c| c.guid).unwrap_or_default(),
                core.name.clone(),
                core.soft_ver.clone(),
                cfg.map(|c| c.server.clone()).unwrap_or_default(),
                core.flags,
                core.manufacturer,
            )
        };

        let channels = self
            .lock_channels()
            .iter()
            .map(|ch| ch.to_registration())
            .collect();

        info!("[{name}] register device...");
        RegisterDevice {
            email,
            auth_key,
            guid,
            name,
            soft_ver,
            server_name,
            flags,
            manufacturer_id: manufacturer.manufacturer_id,
            product_id: manufacturer.product_id,
            channels,
        }
    }
}

fn register_failure_text(code: RegisterResultCode) -> &'static str {
    match code {
        RegisterResultCode::BadCredentials => "bad credentials",
        RegisterResultCode::TemporarilyUnavailable => "temporarily unavailable",
        RegisterResultCode::LocationConflict => "location conflict",
        RegisterResultCode::ChannelConflict => "channel conflict",
        RegisterResultCode::DeviceDisabled => "device is disabled",
        RegisterResultCode::LocationDisabled => "location is disabled",
        RegisterResultCode::DeviceLimitExceeded => "device limit exceeded",
        RegisterResultCode::GuidError => "incorrect device GUID",
        RegisterResultCode::RegistrationDisabled => "registration disabled",
        RegisterResultCode::AuthKeyError => "incorrect auth key",
        RegisterResultCode::NoLocationAvailable => "no location available",
        RegisterResultCode::UserConflict => "user conflict",
        RegisterResultCode::CountryRejected => "country rejected",
        RegisterResultCode::Accepted | RegisterResultCode::Unknown(_) => "unknown result code",
    }
}
