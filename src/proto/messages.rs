//! Typed SRPC payloads and the two message enums the dispatcher speaks.
//!
//! [`DeviceMessage`] covers every call this device originates,
//! [`ServerMessage`] every call it understands from the server. Both sides
//! implement encode *and* decode so the test harness can play the server
//! role against the real codec.

use super::wire::{Reader, Writer};
use super::{
    CALCFG_DATA_MAXSIZE, CAPTION_MAXSIZE, CHANNELEXTENDEDVALUE_SIZE, CHANNELMAXCOUNT,
    CHANNELVALUE_SIZE, CHANNEL_CONFIG_MAXSIZE, DEVICE_CONFIG_MAXSIZE, DEVICE_NAME_MAXSIZE,
    EMAIL_MAXSIZE, SERVER_NAME_MAXSIZE, SOFTVER_MAXSIZE, TIMEZONE_MAXSIZE, URL_MAXSIZE, call,
};
use crate::error::{Error, Result};
use crate::value::ExtendedValue;

// ── Registration ─────────────────────────────────────────────

/// Device registration call, sent right after the transport connects.
#[derive(Debug, Clone)]
pub struct RegisterDevice {
    pub email: String,
    pub auth_key: [u8; 16],
    pub guid: [u8; 16],
    pub name: String,
    pub soft_ver: String,
    pub server_name: String,
    pub flags: u32,
    pub manufacturer_id: i16,
    pub product_id: i16,
    pub channels: Vec<ChannelRegistration>,
}

/// One channel entry inside [`RegisterDevice`].
#[derive(Debug, Clone)]
pub struct ChannelRegistration {
    pub number: u8,
    pub channel_type: u32,
    pub default_function: u32,
    pub flags: u32,
    pub details: ChannelRegistrationDetails,
}

/// Kind-specific tail of a channel registration entry.
#[derive(Debug, Clone)]
pub enum ChannelRegistrationDetails {
    Value {
        supported_functions: u32,
        value: [u8; CHANNELVALUE_SIZE],
    },
    ActionTrigger {
        caps: u32,
        properties: ActionTriggerProperties,
    },
}

/// Static action-trigger metadata announced at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionTriggerProperties {
    /// Related channel's assigned number + 1; 0 when unset.
    pub related_channel_number: u32,
    /// Capability bits whose local handling the server may disable.
    pub disables_local_operation: u32,
}

impl RegisterDevice {
    fn encode(&self, w: &mut Writer) {
        w.put_str(&self.email, EMAIL_MAXSIZE);
        w.put_bytes(&self.auth_key);
        w.put_bytes(&self.guid);
        w.put_str(&self.name, DEVICE_NAME_MAXSIZE);
        w.put_str(&self.soft_ver, SOFTVER_MAXSIZE);
        w.put_str(&self.server_name, SERVER_NAME_MAXSIZE);
        w.put_u32(self.flags);
        w.put_i16(self.manufacturer_id);
        w.put_i16(self.product_id);
        w.put_u8(self.channels.len() as u8);
        for ch in &self.channels {
            ch.encode(w);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let email = r.str(EMAIL_MAXSIZE)?;
        let auth_key = r.array()?;
        let guid = r.array()?;
        let name = r.str(DEVICE_NAME_MAXSIZE)?;
        let soft_ver = r.str(SOFTVER_MAXSIZE)?;
        let server_name = r.str(SERVER_NAME_MAXSIZE)?;
        let flags = r.u32()?;
        let manufacturer_id = r.i16()?;
        let product_id = r.i16()?;
        let count = r.u8()? as usize;
        if count > CHANNELMAXCOUNT {
            return Err(Error::Codec("channel count over protocol limit"));
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(ChannelRegistration::decode(r)?);
        }
        Ok(Self {
            email,
            auth_key,
            guid,
            name,
            soft_ver,
            server_name,
            flags,
            manufacturer_id,
            product_id,
            channels,
        })
    }
}

impl ChannelRegistration {
    fn encode(&self, w: &mut Writer) {
        w.put_u8(self.number);
        w.put_u32(self.channel_type);
        w.put_u32(self.default_function);
        w.put_u32(self.flags);
        match &self.details {
            ChannelRegistrationDetails::Value {
                supported_functions,
                value,
            } => {
                w.put_u8(0);
                w.put_u32(*supported_functions);
                w.put_bytes(value);
            }
            ChannelRegistrationDetails::ActionTrigger { caps, properties } => {
                w.put_u8(1);
                w.put_u32(*caps);
                w.put_u32(properties.related_channel_number);
                w.put_u32(properties.disables_local_operation);
            }
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let number = r.u8()?;
        let channel_type = r.u32()?;
        let default_function = r.u32()?;
        let flags = r.u32()?;
        let details = match r.u8()? {
            0 => ChannelRegistrationDetails::Value {
                supported_functions: r.u32()?,
                value: r.array()?,
            },
            1 => ChannelRegistrationDetails::ActionTrigger {
                caps: r.u32()?,
                properties: ActionTriggerProperties {
                    related_channel_number: r.u32()?,
                    disables_local_operation: r.u32()?,
                },
            },
            _ => return Err(Error::Codec("unknown channel registration kind")),
        };
        Ok(Self {
            number,
            channel_type,
            default_function,
            flags,
            details,
        })
    }
}

/// Server verdict on a registration attempt.
#[derive(Debug, Clone, Copy)]
pub struct RegisterDeviceResult {
    pub result_code: i32,
    pub activity_timeout: u8,
    pub version: u8,
    pub version_min: u8,
}

/// Protocol version mismatch report; the server closes after sending it.
#[derive(Debug, Clone, Copy)]
pub struct VersionError {
    pub server_version_min: u8,
    pub server_version: u8,
}

// ── Channel values ───────────────────────────────────────────

/// New value pushed by the server to one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelNewValue {
    pub sender_id: i32,
    pub channel_number: u8,
    pub duration_ms: u32,
    pub value: [u8; CHANNELVALUE_SIZE],
}

/// Group variant of [`ChannelNewValue`]; repacked before dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ChannelGroupNewValue {
    pub group_id: i32,
    pub channel_number: u8,
    pub duration_ms: u32,
    pub value: [u8; CHANNELVALUE_SIZE],
}

/// Reply to a server-initiated set-value.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSetValueResult {
    pub channel_number: u8,
    pub sender_id: i32,
    pub success: bool,
}

/// Locally originated value update drained from a dirty slot.
#[derive(Debug, Clone, Copy)]
pub struct ChannelValueChanged {
    pub channel_number: u8,
    pub value: [u8; CHANNELVALUE_SIZE],
    pub offline: u8,
    pub validity_time_sec: u32,
}

/// Locally originated extended value update.
#[derive(Debug, Clone)]
pub struct ChannelExtendedValueChanged {
    pub channel_number: u8,
    pub extended_value: ExtendedValue,
}

/// Action emitted upstream by an action-trigger channel.
#[derive(Debug, Clone, Copy)]
pub struct ActionTriggered {
    pub channel_number: u8,
    pub action: u32,
}

// ── Liveness ─────────────────────────────────────────────────

/// Activity timeout (re)negotiation request.
#[derive(Debug, Clone, Copy)]
pub struct SetActivityTimeout {
    pub activity_timeout: u8,
}

/// Server's confirmation of the negotiated activity timeout.
#[derive(Debug, Clone, Copy)]
pub struct SetActivityTimeoutResult {
    pub activity_timeout: u8,
    pub min: u8,
    pub max: u8,
}

// ── Time sync ────────────────────────────────────────────────

/// User-local wall time reported by the server.
#[derive(Debug, Clone)]
pub struct UserLocalTime {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub day_of_week: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub timezone: String,
}

// ── Calcfg ───────────────────────────────────────────────────

/// Out-of-band device/channel configuration request.
#[derive(Debug, Clone)]
pub struct CalCfgRequest {
    pub sender_id: i32,
    /// -1 addresses the device itself.
    pub channel_number: i32,
    pub command: i32,
    pub super_user_authorized: bool,
    pub data_type: i32,
    pub data: Vec<u8>,
}

/// Reply carrying the calcfg outcome.
#[derive(Debug, Clone)]
pub struct CalCfgResult {
    pub receiver_id: i32,
    pub channel_number: i32,
    pub command: i32,
    pub result: i32,
    pub data: Vec<u8>,
}

// ── Channel state ────────────────────────────────────────────

/// State request addressed to one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelStateRequest {
    pub sender_id: i32,
    pub channel_number: i32,
}

/// Channel state report. `fields` marks which members carry data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelState {
    pub receiver_id: i32,
    pub channel_number: i32,
    pub fields: u32,
    pub ipv4: u32,
    pub mac: [u8; 6],
    pub battery_level: u8,
    pub battery_powered: u8,
    pub wifi_rssi: i8,
    pub wifi_signal_strength: u8,
    pub bridge_node_online: u8,
    pub bridge_node_signal_strength: u8,
    pub uptime: u32,
    pub connection_uptime: u32,
    pub battery_health: u8,
    pub last_connection_reset_cause: u8,
    pub light_source_lifespan: u16,
    pub light_source_operating_time: i32,
}

// ── Channel functions and config ─────────────────────────────

/// Active functions for every registered channel, ordered by number.
#[derive(Debug, Clone)]
pub struct ChannelFunctions {
    pub functions: Vec<u32>,
}

/// Channel configuration pushed by the server (set-channel-config or a
/// get-channel-config result; same layout either way).
#[derive(Debug, Clone)]
pub struct ChannelConfigUpdate {
    pub channel_number: u8,
    pub function: u32,
    pub config_type: u8,
    pub config: Vec<u8>,
}

/// Request for the server-side configuration of one channel.
#[derive(Debug, Clone, Copy)]
pub struct GetChannelConfig {
    pub channel_number: u8,
    pub config_type: u8,
}

/// Default caption announcement for one channel.
#[derive(Debug, Clone)]
pub struct SetChannelCaption {
    pub channel_number: u8,
    pub caption: String,
}

/// Server acknowledgement of a caption announcement.
#[derive(Debug, Clone)]
pub struct SetChannelCaptionResult {
    pub channel_number: u8,
    pub result: i32,
}

/// Device-level configuration pushed by the server.
#[derive(Debug, Clone)]
pub struct DeviceConfigUpdate {
    pub end_of_data: bool,
    pub fields: u64,
    pub config: Vec<u8>,
}

/// Acknowledgement of a device config push.
#[derive(Debug, Clone, Copy)]
pub struct SetDeviceConfigResult {
    pub result: u8,
}

// ── Firmware / registration info ─────────────────────────────

/// Firmware update URL lookup result; forwarded to the log only.
#[derive(Debug, Clone)]
pub struct FirmwareUpdateUrlResult {
    pub exists: bool,
    pub url: String,
}

/// Cloud registration windows; forwarded to the log only.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationEnabledResult {
    pub client_timestamp: u32,
    pub iodevice_timestamp: u32,
}

// ── Push notifications ───────────────────────────────────────

/// Declares a notification context the device may post to.
#[derive(Debug, Clone, Copy)]
pub struct RegisterPushNotification {
    pub context: i32,
    pub server_managed_fields: u8,
}

/// A notification posted by the device. Fields managed by the server are
/// absent.
#[derive(Debug, Clone)]
pub struct PushNotification {
    pub context: i32,
    pub title: Option<String>,
    pub body: Option<String>,
    pub sound_id: Option<i32>,
}

// ── Message enums ────────────────────────────────────────────

/// Every call this device can send.
#[derive(Debug, Clone)]
pub enum DeviceMessage {
    RegisterDevice(RegisterDevice),
    Ping,
    SetActivityTimeout(SetActivityTimeout),
    GetUserLocalTime,
    ChannelValueChanged(ChannelValueChanged),
    ChannelExtendedValueChanged(ChannelExtendedValueChanged),
    ActionTrigger(ActionTriggered),
    ChannelSetValueResult(ChannelSetValueResult),
    CalCfgResult(CalCfgResult),
    ChannelStateResult(ChannelState),
    GetChannelFunctions,
    GetChannelConfig(GetChannelConfig),
    SetChannelCaption(SetChannelCaption),
    SetDeviceConfigResult(SetDeviceConfigResult),
    RegisterPushNotification(RegisterPushNotification),
    PushNotification(PushNotification),
}

impl DeviceMessage {
    pub fn call_id(&self) -> u32 {
        match self {
            Self::RegisterDevice(_) => call::DS_REGISTER_DEVICE,
            Self::Ping => call::DCS_PING_SERVER,
            Self::SetActivityTimeout(_) => call::DCS_SET_ACTIVITY_TIMEOUT,
            Self::GetUserLocalTime => call::DCS_GET_USER_LOCALTIME,
            Self::ChannelValueChanged(_) => call::DS_CHANNEL_VALUE_CHANGED,
            Self::ChannelExtendedValueChanged(_) => call::DS_CHANNEL_EXTENDEDVALUE_CHANGED,
            Self::ActionTrigger(_) => call::DS_ACTION_TRIGGER,
            Self::ChannelSetValueResult(_) => call::DS_CHANNEL_SET_VALUE_RESULT,
            Self::CalCfgResult(_) => call::DS_DEVICE_CALCFG_RESULT,
            Self::ChannelStateResult(_) => call::DSC_CHANNEL_STATE_RESULT,
            Self::GetChannelFunctions => call::DS_GET_CHANNEL_FUNCTIONS,
            Self::GetChannelConfig(_) => call::DS_GET_CHANNEL_CONFIG,
            Self::SetChannelCaption(_) => call::DCS_SET_CHANNEL_CAPTION,
            Self::SetDeviceConfigResult(_) => call::DS_SET_DEVICE_CONFIG_RESULT,
            Self::RegisterPushNotification(_) => call::DS_REGISTER_PUSH_NOTIFICATION,
            Self::PushNotification(_) => call::DS_SEND_PUSH_NOTIFICATION,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(64);
        match self {
            Self::RegisterDevice(m) => m.encode(&mut w),
            Self::Ping | Self::GetUserLocalTime | Self::GetChannelFunctions => {}
            Self::SetActivityTimeout(m) => w.put_u8(m.activity_timeout),
            Self::ChannelValueChanged(m) => {
                w.put_u8(m.channel_number);
                w.put_bytes(&m.value);
                w.put_u8(m.offline);
                w.put_u32(m.validity_time_sec);
            }
            Self::ChannelExtendedValueChanged(m) => {
                w.put_u8(m.channel_number);
                w.put_u8(m.extended_value.kind);
                w.put_blob(&m.extended_value.data, CHANNELEXTENDEDVALUE_SIZE);
            }
            Self::ActionTrigger(m) => {
                w.put_u8(m.channel_number);
                w.put_u32(m.action);
            }
            Self::ChannelSetValueResult(m) => {
                w.put_u8(m.channel_number);
                w.put_i32(m.sender_id);
                w.put_u8(u8::from(m.success));
            }
            Self::CalCfgResult(m) => {
                w.put_i32(m.receiver_id);
                w.put_i32(m.channel_number);
                w.put_i32(m.command);
                w.put_i32(m.result);
                w.put_blob(&m.data, CALCFG_DATA_MAXSIZE);
            }
            Self::ChannelStateResult(m) => encode_channel_state(m, &mut w),
            Self::GetChannelConfig(m) => {
                w.put_u8(m.channel_number);
                w.put_u8(m.config_type);
            }
            Self::SetChannelCaption(m) => {
                w.put_u8(m.channel_number);
                w.put_str(&m.caption, CAPTION_MAXSIZE);
            }
            Self::SetDeviceConfigResult(m) => w.put_u8(m.result),
            Self::RegisterPushNotification(m) => {
                w.put_i32(m.context);
                w.put_u8(m.server_managed_fields);
            }
            Self::PushNotification(m) => {
                w.put_i32(m.context);
                w.put_str(m.title.as_deref().unwrap_or(""), CAPTION_MAXSIZE);
                w.put_str(m.body.as_deref().unwrap_or(""), CAPTION_MAXSIZE);
                w.put_i32(m.sound_id.unwrap_or(0));
            }
        }
        w.into_bytes()
    }

    /// Decode a device-originated call; used by the test-side server.
    pub fn decode(call_id: u32, data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let msg = match call_id {
            call::DS_REGISTER_DEVICE => Self::RegisterDevice(RegisterDevice::decode(&mut r)?),
            call::DCS_PING_SERVER => Self::Ping,
            call::DCS_SET_ACTIVITY_TIMEOUT => Self::SetActivityTimeout(SetActivityTimeout {
                activity_timeout: r.u8()?,
            }),
            call::DCS_GET_USER_LOCALTIME => Self::GetUserLocalTime,
            call::DS_CHANNEL_VALUE_CHANGED => Self::ChannelValueChanged(ChannelValueChanged {
                channel_number: r.u8()?,
                value: r.array()?,
                offline: r.u8()?,
                validity_time_sec: r.u32()?,
            }),
            call::DS_CHANNEL_EXTENDEDVALUE_CHANGED => {
                let channel_number = r.u8()?;
                let kind = r.u8()?;
                let data = r.blob(CHANNELEXTENDEDVALUE_SIZE)?;
                Self::ChannelExtendedValueChanged(ChannelExtendedValueChanged {
                    channel_number,
                    extended_value: ExtendedValue::new(kind, &data)?,
                })
            }
            call::DS_ACTION_TRIGGER => Self::ActionTrigger(ActionTriggered {
                channel_number: r.u8()?,
                action: r.u32()?,
            }),
            call::DS_CHANNEL_SET_VALUE_RESULT => {
                Self::ChannelSetValueResult(ChannelSetValueResult {
                    channel_number: r.u8()?,
                    sender_id: r.i32()?,
                    success: r.u8()? != 0,
                })
            }
            call::DS_DEVICE_CALCFG_RESULT => Self::CalCfgResult(CalCfgResult {
                receiver_id: r.i32()?,
                channel_number: r.i32()?,
                command: r.i32()?,
                result: r.i32()?,
                data: r.blob(CALCFG_DATA_MAXSIZE)?,
            }),
            call::DSC_CHANNEL_STATE_RESULT => Self::ChannelStateResult(decode_channel_state(&mut r)?),
            call::DS_GET_CHANNEL_FUNCTIONS => Self::GetChannelFunctions,
            call::DS_GET_CHANNEL_CONFIG => Self::GetChannelConfig(GetChannelConfig {
                channel_number: r.u8()?,
                config_type: r.u8()?,
            }),
            call::DCS_SET_CHANNEL_CAPTION => Self::SetChannelCaption(SetChannelCaption {
                channel_number: r.u8()?,
                caption: r.str(CAPTION_MAXSIZE)?,
            }),
            call::DS_SET_DEVICE_CONFIG_RESULT => {
                Self::SetDeviceConfigResult(SetDeviceConfigResult { result: r.u8()? })
            }
            call::DS_REGISTER_PUSH_NOTIFICATION => {
                Self::RegisterPushNotification(RegisterPushNotification {
                    context: r.i32()?,
                    server_managed_fields: r.u8()?,
                })
            }
            call::DS_SEND_PUSH_NOTIFICATION => {
                let context = r.i32()?;
                let title = r.str(CAPTION_MAXSIZE)?;
                let body = r.str(CAPTION_MAXSIZE)?;
                let sound_id = r.i32()?;
                Self::PushNotification(PushNotification {
                    context,
                    title: (!title.is_empty()).then_some(title),
                    body: (!body.is_empty()).then_some(body),
                    sound_id: (sound_id != 0).then_some(sound_id),
                })
            }
            _ => return Err(Error::Codec("unknown device call id")),
        };
        Ok(msg)
    }
}

/// Every call the device understands from the server.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    VersionError(VersionError),
    PingResult,
    RegisterResult(RegisterDeviceResult),
    ChannelSetValue(ChannelNewValue),
    ChannelGroupSetValue(ChannelGroupNewValue),
    SetActivityTimeoutResult(SetActivityTimeoutResult),
    UserLocalTimeResult(UserLocalTime),
    CalCfgRequest(CalCfgRequest),
    ChannelStateRequest(ChannelStateRequest),
    ChannelFunctionsResult(ChannelFunctions),
    ChannelConfig(ChannelConfigUpdate),
    SetDeviceConfig(DeviceConfigUpdate),
    FirmwareUpdateUrlResult(FirmwareUpdateUrlResult),
    RegistrationEnabledResult(RegistrationEnabledResult),
    ChannelCaptionResult(SetChannelCaptionResult),
    RestartRequest,
    /// Unrecognised call id; logged and skipped.
    Unknown(u32),
}

impl ServerMessage {
    pub fn call_id(&self) -> u32 {
        match self {
            Self::VersionError(_) => call::SDC_VERSION_ERROR,
            Self::PingResult => call::SDC_PING_SERVER_RESULT,
            Self::RegisterResult(_) => call::SD_REGISTER_DEVICE_RESULT,
            Self::ChannelSetValue(_) => call::SD_CHANNEL_SET_VALUE,
            Self::ChannelGroupSetValue(_) => call::SD_CHANNELGROUP_SET_VALUE,
            Self::SetActivityTimeoutResult(_) => call::SDC_SET_ACTIVITY_TIMEOUT_RESULT,
            Self::UserLocalTimeResult(_) => call::SDC_GET_USER_LOCALTIME_RESULT,
            Self::CalCfgRequest(_) => call::SD_DEVICE_CALCFG_REQUEST,
            Self::ChannelStateRequest(_) => call::CSD_GET_CHANNEL_STATE,
            Self::ChannelFunctionsResult(_) => call::SD_GET_CHANNEL_FUNCTIONS_RESULT,
            Self::ChannelConfig(_) => call::SD_SET_CHANNEL_CONFIG,
            Self::SetDeviceConfig(_) => call::SD_SET_DEVICE_CONFIG,
            Self::FirmwareUpdateUrlResult(_) => call::SD_GET_FIRMWARE_UPDATE_URL_RESULT,
            Self::RegistrationEnabledResult(_) => call::SDC_GET_REGISTRATION_ENABLED_RESULT,
            Self::ChannelCaptionResult(_) => call::SDC_SET_CHANNEL_CAPTION_RESULT,
            Self::RestartRequest => call::SD_RESTART_REQUEST,
            Self::Unknown(id) => *id,
        }
    }

    /// Encode a server-originated call; used by the test-side server.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(32);
        match self {
            Self::VersionError(m) => {
                w.put_u8(m.server_version_min);
                w.put_u8(m.server_version);
            }
            Self::PingResult | Self::RestartRequest | Self::Unknown(_) => {}
            Self::RegisterResult(m) => {
                w.put_i32(m.result_code);
                w.put_u8(m.activity_timeout);
                w.put_u8(m.version);
                w.put_u8(m.version_min);
            }
            Self::ChannelSetValue(m) => {
                w.put_i32(m.sender_id);
                w.put_u8(m.channel_number);
                w.put_u32(m.duration_ms);
                w.put_bytes(&m.value);
            }
            Self::ChannelGroupSetValue(m) => {
                w.put_i32(m.group_id);
                w.put_u8(m.channel_number);
                w.put_u32(m.duration_ms);
                w.put_bytes(&m.value);
            }
            Self::SetActivityTimeoutResult(m) => {
                w.put_u8(m.activity_timeout);
                w.put_u8(m.min);
                w.put_u8(m.max);
            }
            Self::UserLocalTimeResult(m) => {
                w.put_i16(m.year);
                w.put_u8(m.month);
                w.put_u8(m.day);
                w.put_u8(m.day_of_week);
                w.put_u8(m.hour);
                w.put_u8(m.min);
                w.put_u8(m.sec);
                w.put_str(&m.timezone, TIMEZONE_MAXSIZE);
            }
            Self::CalCfgRequest(m) => {
                w.put_i32(m.sender_id);
                w.put_i32(m.channel_number);
                w.put_i32(m.command);
                w.put_u8(u8::from(m.super_user_authorized));
                w.put_i32(m.data_type);
                w.put_blob(&m.data, CALCFG_DATA_MAXSIZE);
            }
            Self::ChannelStateRequest(m) => {
                w.put_i32(m.sender_id);
                w.put_i32(m.channel_number);
            }
            Self::ChannelFunctionsResult(m) => {
                w.put_u8(m.functions.len() as u8);
                for f in &m.functions {
                    w.put_u32(*f);
                }
            }
            Self::ChannelConfig(m) => {
                w.put_u8(m.channel_number);
                w.put_u32(m.function);
                w.put_u8(m.config_type);
                w.put_blob(&m.config, CHANNEL_CONFIG_MAXSIZE);
            }
            Self::SetDeviceConfig(m) => {
                w.put_u8(u8::from(m.end_of_data));
                w.put_u64(m.fields);
                w.put_blob(&m.config, DEVICE_CONFIG_MAXSIZE);
            }
            Self::FirmwareUpdateUrlResult(m) => {
                w.put_u8(u8::from(m.exists));
                w.put_str(&m.url, URL_MAXSIZE);
            }
            Self::RegistrationEnabledResult(m) => {
                w.put_u32(m.client_timestamp);
                w.put_u32(m.iodevice_timestamp);
            }
            Self::ChannelCaptionResult(m) => {
                w.put_u8(m.channel_number);
                w.put_i32(m.result);
            }
        }
        w.into_bytes()
    }

    /// Decode an inbound call. Unknown call ids are not an error.
    pub fn decode(call_id: u32, data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let msg = match call_id {
            call::SDC_VERSION_ERROR => Self::VersionError(VersionError {
                server_version_min: r.u8()?,
                server_version: r.u8()?,
            }),
            call::SDC_PING_SERVER_RESULT => Self::PingResult,
            call::SD_REGISTER_DEVICE_RESULT => Self::RegisterResult(RegisterDeviceResult {
                result_code: r.i32()?,
                activity_timeout: r.u8()?,
                version: r.u8()?,
                version_min: r.u8()?,
            }),
            call::SD_CHANNEL_SET_VALUE => Self::ChannelSetValue(ChannelNewValue {
                sender_id: r.i32()?,
                channel_number: r.u8()?,
                duration_ms: r.u32()?,
                value: r.array()?,
            }),
            call::SD_CHANNELGROUP_SET_VALUE => Self::ChannelGroupSetValue(ChannelGroupNewValue {
                group_id: r.i32()?,
                channel_number: r.u8()?,
                duration_ms: r.u32()?,
                value: r.array()?,
            }),
            call::SDC_SET_ACTIVITY_TIMEOUT_RESULT => {
                Self::SetActivityTimeoutResult(SetActivityTimeoutResult {
                    activity_timeout: r.u8()?,
                    min: r.u8()?,
                    max: r.u8()?,
                })
            }
            call::SDC_GET_USER_LOCALTIME_RESULT => Self::UserLocalTimeResult(UserLocalTime {
                year: r.i16()?,
                month: r.u8()?,
                day: r.u8()?,
                day_of_week: r.u8()?,
                hour: r.u8()?,
                min: r.u8()?,
                sec: r.u8()?,
                timezone: r.str(TIMEZONE_MAXSIZE)?,
            }),
            call::SD_DEVICE_CALCFG_REQUEST => Self::CalCfgRequest(CalCfgRequest {
                sender_id: r.i32()?,
                channel_number: r.i32()?,
                command: r.i32()?,
                super_user_authorized: r.u8()? == 1,
                data_type: r.i32()?,
                data: r.blob(CALCFG_DATA_MAXSIZE)?,
            }),
            call::CSD_GET_CHANNEL_STATE => Self::ChannelStateRequest(ChannelStateRequest {
                sender_id: r.i32()?,
                channel_number: r.i32()?,
            }),
            call::SD_GET_CHANNEL_FUNCTIONS_RESULT => {
                let count = r.u8()? as usize;
                if count > CHANNELMAXCOUNT {
                    return Err(Error::Codec("channel count over protocol limit"));
                }
                let mut functions = Vec::with_capacity(count);
                for _ in 0..count {
                    functions.push(r.u32()?);
                }
                Self::ChannelFunctionsResult(ChannelFunctions { functions })
            }
            call::SD_SET_CHANNEL_CONFIG | call::SD_GET_CHANNEL_CONFIG_RESULT => {
                Self::ChannelConfig(ChannelConfigUpdate {
                    channel_number: r.u8()?,
                    function: r.u32()?,
                    config_type: r.u8()?,
                    config: r.blob(CHANNEL_CONFIG_MAXSIZE)?,
                })
            }
            call::SD_SET_DEVICE_CONFIG => Self::SetDeviceConfig(DeviceConfigUpdate {
                end_of_data: r.u8()? != 0,
                fields: r.u64()?,
                config: r.blob(DEVICE_CONFIG_MAXSIZE)?,
            }),
            call::SD_GET_FIRMWARE_UPDATE_URL_RESULT => {
                Self::FirmwareUpdateUrlResult(FirmwareUpdateUrlResult {
                    exists: r.u8()? != 0,
                    url: r.str(URL_MAXSIZE)?,
                })
            }
            call::SDC_GET_REGISTRATION_ENABLED_RESULT => {
                Self::RegistrationEnabledResult(RegistrationEnabledResult {
                    client_timestamp: r.u32()?,
                    iodevice_timestamp: r.u32()?,
                })
            }
            call::SDC_SET_CHANNEL_CAPTION_RESULT => {
                Self::ChannelCaptionResult(SetChannelCaptionResult {
                    channel_number: r.u8()?,
                    result: r.i32()?,
                })
            }
            call::SD_RESTART_REQUEST => Self::RestartRequest,
            other => Self::Unknown(other),
        };
        Ok(msg)
    }
}

fn encode_channel_state(m: &ChannelState, w: &mut Writer) {
    w.put_i32(m.receiver_id);
    w.put_i32(m.channel_number);
    w.put_u32(m.fields);
    w.put_u32(m.ipv4);
    w.put_bytes(&m.mac);
    w.put_u8(m.battery_level);
    w.put_u8(m.battery_powered);
    w.put_i8(m.wifi_rssi);
    w.put_u8(m.wifi_signal_strength);
    w.put_u8(m.bridge_node_online);
    w.put_u8(m.bridge_node_signal_strength);
    w.put_u32(m.uptime);
    w.put_u32(m.connection_uptime);
    w.put_u8(m.battery_health);
    w.put_u8(m.last_connection_reset_cause);
    w.put_u16(m.light_source_lifespan);
    w.put_i32(m.light_source_operating_time);
}

fn decode_channel_state(r: &mut Reader<'_>) -> Result<ChannelState> {
    Ok(ChannelState {
        receiver_id: r.i32()?,
        channel_number: r.i32()?,
        fields: r.u32()?,
        ipv4: r.u32()?,
        mac: r.array()?,
        battery_level: r.u8()?,
        battery_powered: r.u8()?,
        wifi_rssi: r.i8()?,
        wifi_signal_strength: r.u8()?,
        bridge_node_online: r.u8()?,
        bridge_node_signal_strength: r.u8()?,
        uptime: r.u32()?,
        connection_uptime: r.u32()?,
        battery_health: r.u8()?,
        last_connection_reset_cause: r.u8()?,
        light_source_lifespan: r.u16()?,
        light_source_operating_time: r.i32()?,
    })
}
