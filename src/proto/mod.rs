//! SRPC protocol catalogue: sizes, call ids, result codes, channel types
//! and the typed payload structs exchanged with the SUPLA server.
//!
//! The numeric constants define the wire contract; the session engine and
//! dispatcher only ever refer to them through this module. Payload structs
//! and their little-endian codecs live in [`messages`].

pub mod messages;
pub mod values;
pub mod wire;

/// Protocol version announced in every outgoing packet.
pub const PROTO_VERSION: u8 = 23;

// ── Field and buffer limits ──────────────────────────────────

pub const GUID_SIZE: usize = 16;
pub const AUTHKEY_SIZE: usize = 16;
pub const DEVICE_NAME_MAXSIZE: usize = 200;
pub const SOFTVER_MAXSIZE: usize = 20;
pub const EMAIL_MAXSIZE: usize = 255;
pub const SERVER_NAME_MAXSIZE: usize = 64;
pub const CAPTION_MAXSIZE: usize = 400;
pub const TIMEZONE_MAXSIZE: usize = 50;
pub const URL_MAXSIZE: usize = 200;
pub const CALCFG_DATA_MAXSIZE: usize = 128;
pub const CHANNEL_CONFIG_MAXSIZE: usize = 512;
pub const DEVICE_CONFIG_MAXSIZE: usize = 512;

/// Maximum number of channels one device may register.
pub const CHANNELMAXCOUNT: usize = 32;

/// Fixed channel value payload size.
pub const CHANNELVALUE_SIZE: usize = 8;

/// Maximum extended value payload size.
pub const CHANNELEXTENDEDVALUE_SIZE: usize = 1024;

// ── Connection defaults ──────────────────────────────────────

pub const PORT_PLAIN: u16 = 2015;
pub const PORT_TLS: u16 = 2016;

/// Negotiated inactivity window default, seconds.
pub const ACTIVITY_TIMEOUT_DEFAULT: u8 = 120;

// ── Call ids ─────────────────────────────────────────────────
//
// Prefix convention follows the protocol's direction tags:
// `dcs` device/client → server, `sdc` server → device/client,
// `ds` device → server, `sd` server → device.

pub mod call {
    pub const SDC_VERSION_ERROR: u32 = 30;
    pub const DCS_PING_SERVER: u32 = 40;
    pub const SDC_PING_SERVER_RESULT: u32 = 50;
    pub const DS_REGISTER_DEVICE: u32 = 65;
    pub const SD_REGISTER_DEVICE_RESULT: u32 = 70;
    pub const SD_CHANNEL_SET_VALUE: u32 = 110;
    pub const SD_CHANNELGROUP_SET_VALUE: u32 = 115;
    pub const DS_CHANNEL_SET_VALUE_RESULT: u32 = 120;
    pub const DS_CHANNEL_VALUE_CHANGED: u32 = 130;
    pub const DS_CHANNEL_EXTENDEDVALUE_CHANGED: u32 = 132;
    pub const DS_ACTION_TRIGGER: u32 = 140;
    pub const DCS_SET_ACTIVITY_TIMEOUT: u32 = 150;
    pub const SDC_SET_ACTIVITY_TIMEOUT_RESULT: u32 = 160;
    pub const DCS_GET_USER_LOCALTIME: u32 = 170;
    pub const SDC_GET_USER_LOCALTIME_RESULT: u32 = 180;
    pub const SD_DEVICE_CALCFG_REQUEST: u32 = 190;
    pub const DS_DEVICE_CALCFG_RESULT: u32 = 200;
    pub const CSD_GET_CHANNEL_STATE: u32 = 210;
    pub const DSC_CHANNEL_STATE_RESULT: u32 = 220;
    pub const DS_GET_CHANNEL_FUNCTIONS: u32 = 230;
    pub const SD_GET_CHANNEL_FUNCTIONS_RESULT: u32 = 240;
    pub const DS_GET_CHANNEL_CONFIG: u32 = 250;
    pub const SD_GET_CHANNEL_CONFIG_RESULT: u32 = 260;
    pub const SD_SET_CHANNEL_CONFIG: u32 = 270;
    pub const DCS_SET_CHANNEL_CAPTION: u32 = 280;
    pub const SDC_SET_CHANNEL_CAPTION_RESULT: u32 = 290;
    pub const SD_SET_DEVICE_CONFIG: u32 = 300;
    pub const DS_SET_DEVICE_CONFIG_RESULT: u32 = 310;
    pub const SD_GET_FIRMWARE_UPDATE_URL_RESULT: u32 = 320;
    pub const SDC_GET_REGISTRATION_ENABLED_RESULT: u32 = 330;
    pub const DS_REGISTER_PUSH_NOTIFICATION: u32 = 340;
    pub const DS_SEND_PUSH_NOTIFICATION: u32 = 350;
    pub const SD_RESTART_REQUEST: u32 = 360;
}

// ── Registration result codes ────────────────────────────────

/// Server verdict carried by a register-device result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterResultCode {
    Accepted,
    TemporarilyUnavailable,
    BadCredentials,
    LocationConflict,
    ChannelConflict,
    DeviceDisabled,
    LocationDisabled,
    DeviceLimitExceeded,
    GuidError,
    RegistrationDisabled,
    AuthKeyError,
    NoLocationAvailable,
    UserConflict,
    CountryRejected,
    Unknown(i32),
}

impl RegisterResultCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            3 => Self::Accepted,
            4 => Self::TemporarilyUnavailable,
            5 => Self::BadCredentials,
            6 => Self::LocationConflict,
            7 => Self::ChannelConflict,
            8 => Self::DeviceDisabled,
            10 => Self::LocationDisabled,
            13 => Self::DeviceLimitExceeded,
            14 => Self::GuidError,
            17 => Self::RegistrationDisabled,
            20 => Self::AuthKeyError,
            21 => Self::NoLocationAvailable,
            22 => Self::UserConflict,
            23 => Self::CountryRejected,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Accepted => 3,
            Self::TemporarilyUnavailable => 4,
            Self::BadCredentials => 5,
            Self::LocationConflict => 6,
            Self::ChannelConflict => 7,
            Self::DeviceDisabled => 8,
            Self::LocationDisabled => 10,
            Self::DeviceLimitExceeded => 13,
            Self::GuidError => 14,
            Self::RegistrationDisabled => 17,
            Self::AuthKeyError => 20,
            Self::NoLocationAvailable => 21,
            Self::UserConflict => 22,
            Self::CountryRejected => 23,
            Self::Unknown(raw) => raw,
        }
    }
}

// ── Calcfg ───────────────────────────────────────────────────

pub mod calcfg {
    /// Device-level command: switch the device into local config mode.
    pub const CMD_ENTER_CFG_MODE: i32 = 7000;
}

/// Outcome of a calcfg request, as replied to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CalCfgResultCode {
    False = 0,
    True = 1,
    Done = 2,
    InProgress = 3,
    NotSupported = 102,
    IdNotExists = 103,
    Unauthorized = 104,
}

impl CalCfgResultCode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

// ── Channel state field bits ─────────────────────────────────

pub mod state_field {
    pub const IPV4: u32 = 0x0001;
    pub const MAC: u32 = 0x0002;
    pub const BATTERY_LEVEL: u32 = 0x0004;
    pub const BATTERY_POWERED: u32 = 0x0008;
    pub const WIFI_RSSI: u32 = 0x0010;
    pub const WIFI_SIGNAL_STRENGTH: u32 = 0x0020;
    pub const BRIDGE_NODE_ONLINE: u32 = 0x0040;
    pub const BRIDGE_NODE_SIGNAL_STRENGTH: u32 = 0x0080;
    pub const UPTIME: u32 = 0x0100;
    pub const CONNECTION_UPTIME: u32 = 0x0200;
    pub const BATTERY_HEALTH: u32 = 0x0400;
    pub const LAST_CONNECTION_RESET_CAUSE: u32 = 0x0800;
    pub const LIGHT_SOURCE_LIFESPAN: u32 = 0x1000;
    pub const LIGHT_SOURCE_OPERATING_TIME: u32 = 0x2000;
}

// ── Connection reset causes ──────────────────────────────────

/// Why the last connection was torn down, reported in channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ResetCause {
    #[default]
    None = 0,
    ActivityTimeout = 1,
    WifiConnectionLost = 2,
    ServerConnectionLost = 3,
}

// ── Device and channel flags ─────────────────────────────────

pub mod device_flag {
    /// Device accepts the enter-config-mode calcfg command.
    pub const CALCFG_ENTER_CFG_MODE: u32 = 0x0010;
    pub const SLEEP_MODE_ENABLED: u32 = 0x0020;
    pub const DEVICE_CONFIG_SUPPORTED: u32 = 0x0040;
}

pub mod channel_flag {
    /// Channel answers channel-state requests.
    pub const CHANNELSTATE: u32 = 0x0001_0000;
    pub const LIGHTSOURCELIFESPAN_SETTABLE: u32 = 0x0002_0000;
    pub const COUNTDOWN_TIMER_SUPPORTED: u32 = 0x0004_0000;
}

// ── Action trigger capability bits ───────────────────────────

pub mod action_cap {
    pub const TURN_ON: u32 = 0x0001;
    pub const TURN_OFF: u32 = 0x0002;
    pub const TOGGLE_X1: u32 = 0x0004;
    pub const TOGGLE_X2: u32 = 0x0008;
    pub const TOGGLE_X3: u32 = 0x0010;
    pub const TOGGLE_X4: u32 = 0x0020;
    pub const TOGGLE_X5: u32 = 0x0040;
    pub const HOLD: u32 = 0x0080;
    pub const SHORT_PRESS_X1: u32 = 0x0100;
    pub const SHORT_PRESS_X2: u32 = 0x0200;
    pub const SHORT_PRESS_X3: u32 = 0x0400;
    pub const SHORT_PRESS_X4: u32 = 0x0800;
    pub const SHORT_PRESS_X5: u32 = 0x1000;
}

// ── Channel functions ────────────────────────────────────────

pub mod func {
    pub const NONE: u32 = 0;
    pub const THERMOMETER: u32 = 40;
    pub const HUMIDITY: u32 = 42;
    pub const HUMIDITY_AND_TEMPERATURE: u32 = 45;
    pub const OPENING_SENSOR_DOOR: u32 = 60;
    pub const CONTROLLING_THE_ROLLER_SHUTTER: u32 = 90;
    pub const CONTROLLING_THE_FACADE_BLIND: u32 = 95;
    pub const POWER_SWITCH: u32 = 130;
    pub const LIGHT_SWITCH: u32 = 140;
    pub const DIMMER: u32 = 180;
    pub const RGB_LIGHTING: u32 = 190;
    pub const DIMMER_AND_RGB_LIGHTING: u32 = 200;
    pub const DEPTH_SENSOR: u32 = 210;
    pub const DISTANCE_SENSOR: u32 = 220;
    pub const WIND_SENSOR: u32 = 250;
    pub const PRESSURE_SENSOR: u32 = 260;
    pub const RAIN_SENSOR: u32 = 270;
    pub const WEIGHT_SENSOR: u32 = 280;
    pub const ELECTRICITY_METER: u32 = 310;
    pub const IC_ELECTRICITY_METER: u32 = 315;
    pub const IC_WATER_METER: u32 = 330;
    pub const THERMOSTAT: u32 = 400;
    pub const VALVE_OPENCLOSE: u32 = 500;
    pub const VALVE_PERCENTAGE: u32 = 510;
    pub const GENERAL_PURPOSE_MEASUREMENT: u32 = 520;
    pub const ACTION_TRIGGER: u32 = 700;
}

// ── Push notification field bits ─────────────────────────────

pub mod notification_field {
    /// Title text is managed by the server; client-supplied titles are
    /// suppressed.
    pub const TITLE: u8 = 0x01;
    pub const BODY: u8 = 0x02;
    pub const SOUND: u8 = 0x04;
}

/// Notification context addressing the whole device rather than a channel.
pub const NOTIFICATION_CTX_DEVICE: i32 = -1;

// ── Extended value kinds ─────────────────────────────────────

pub mod ev_kind {
    pub const NONE: u8 = 0;
    pub const ELECTRICITY_METER_MEASUREMENT_V2: u8 = 12;
    pub const THERMOSTAT_DETAILS_V1: u8 = 20;
    pub const TIMER_STATE_V1: u8 = 60;
}

// ── Channel types ────────────────────────────────────────────

/// Hardware class of a channel. The discriminant is the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChannelType {
    SensorNo = 1000,
    SensorNc = 1010,
    DistanceSensor = 1020,
    CallButton = 1500,
    Relay = 2900,
    ThermometerDs18b20 = 3000,
    Dht11 = 3010,
    Dht22 = 3020,
    Dht21 = 3022,
    Am2302 = 3030,
    Am2301 = 3032,
    Thermometer = 3034,
    HumiditySensor = 3036,
    HumidityAndTempSensor = 3038,
    WindSensor = 3042,
    PressureSensor = 3044,
    RainSensor = 3048,
    WeightSensor = 3050,
    WeatherStation = 3100,
    Dimmer = 4000,
    RgbLedController = 4010,
    DimmerAndRgbLed = 4020,
    ElectricityMeter = 5000,
    ImpulseCounter = 5010,
    Thermostat = 6000,
    ValveOpenClose = 7000,
    ValvePercentage = 7010,
    GeneralPurposeMeasurement = 9000,
    Engine = 10000,
    ActionTrigger = 11000,
}

impl ChannelType {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Relays, meters, counters and thermostats carry an extended value
    /// slot next to the plain value slot.
    pub fn has_extended_value(self) -> bool {
        matches!(
            self,
            Self::Relay | Self::ElectricityMeter | Self::ImpulseCounter | Self::Thermostat
        )
    }

    pub fn is_action_trigger(self) -> bool {
        matches!(self, Self::ActionTrigger)
    }
}
