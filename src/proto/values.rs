//! Typed channel value layouts.
//!
//! Each struct mirrors one fixed wire layout inside the 8-byte channel
//! value, plus the extended-value payloads for relays, meters and
//! thermostats. The typed setters on
//! [`Channel`](crate::channel::Channel) accept these instead of raw bytes.

use super::wire::Writer;
use crate::error::Result;
use crate::proto::{CHANNELVALUE_SIZE, ev_kind};
use crate::value::ExtendedValue;

/// Relay / power switch state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayValue {
    pub on: bool,
    pub flags: u16,
}

impl RelayValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = u8::from(self.on);
        out[1..3].copy_from_slice(&self.flags.to_le_bytes());
        out
    }
}

/// Dimmer / RGB(W) controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbwValue {
    pub brightness: u8,
    pub color_brightness: u8,
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub on_off: u8,
}

impl RgbwValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = self.brightness;
        out[1] = self.color_brightness;
        out[2] = self.b;
        out[3] = self.g;
        out[4] = self.r;
        out[5] = self.on_off;
        out
    }
}

/// Roller shutter position. `position` is -1 (unknown) or 0–100 %.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollerShutterValue {
    pub position: i8,
    pub flags: u16,
}

impl RollerShutterValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = self.position as u8;
        out[1..3].copy_from_slice(&self.flags.to_le_bytes());
        out
    }
}

/// Facade blind position and slat tilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacadeBlindValue {
    pub position: i8,
    pub tilt: i8,
    pub flags: u16,
}

impl FacadeBlindValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = self.position as u8;
        out[1] = self.tilt as u8;
        out[2..4].copy_from_slice(&self.flags.to_le_bytes());
        out
    }
}

/// Monotonic pulse counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpulseCounterValue {
    pub counter: u64,
}

impl ImpulseCounterValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        self.counter.to_le_bytes()
    }
}

/// Electricity meter headline reading (0.01 kWh units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElectricityMeterValue {
    pub flags: u8,
    pub total_forward_active_energy: u32,
}

impl ElectricityMeterValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = self.flags;
        out[1..5].copy_from_slice(&self.total_forward_active_energy.to_le_bytes());
        out
    }
}

/// Thermostat state. Temperatures in 0.01 °C units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThermostatValue {
    pub is_on: bool,
    pub flags: u8,
    pub measured_temperature: i16,
    pub preset_temperature: i16,
}

impl ThermostatValue {
    pub fn to_channel_value(self) -> [u8; CHANNELVALUE_SIZE] {
        let mut out = [0; CHANNELVALUE_SIZE];
        out[0] = u8::from(self.is_on);
        out[1] = self.flags;
        out[2..4].copy_from_slice(&self.measured_temperature.to_le_bytes());
        out[4..6].copy_from_slice(&self.preset_temperature.to_le_bytes());
        out
    }
}

/// Combined humidity/temperature layout: temperature milli-units in bytes
/// 0..4, humidity milli-units in bytes 4..8, both little-endian `i32`.
pub fn humid_temp_bytes(humid: f64, temp: f64) -> [u8; CHANNELVALUE_SIZE] {
    let t = (temp * 1000.0).round() as i32;
    let h = (humid * 1000.0).round() as i32;
    let mut out = [0; CHANNELVALUE_SIZE];
    out[..4].copy_from_slice(&t.to_le_bytes());
    out[4..].copy_from_slice(&h.to_le_bytes());
    out
}

// ── Extended value payloads ──────────────────────────────────

/// Countdown timer snapshot attached to a relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStateExtValue {
    pub remaining_time_ms: u32,
    pub sender_id: i32,
    pub target_value: [u8; CHANNELVALUE_SIZE],
}

impl TimerStateExtValue {
    pub fn to_extended_value(self) -> Result<ExtendedValue> {
        let mut w = Writer::with_capacity(16);
        w.put_u32(self.remaining_time_ms);
        w.put_i32(self.sender_id);
        w.put_bytes(&self.target_value);
        ExtendedValue::new(ev_kind::TIMER_STATE_V1, &w.into_bytes())
    }
}

/// Per-phase electricity meter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElectricityMeterExtValue {
    /// 0.00001 kWh units per phase.
    pub total_forward_active_energy: [u32; 3],
    pub total_reverse_active_energy: [u32; 3],
    /// 0.01 V units per phase.
    pub voltage: [u16; 3],
    /// 0.001 A units per phase.
    pub current: [u16; 3],
    /// Bitmask of which measurements are present.
    pub measured_values: u32,
    pub period_sec: u16,
    pub total_cost: i32,
    pub price_per_unit: i32,
    pub currency: [u8; 3],
}

impl ElectricityMeterExtValue {
    pub fn to_extended_value(self) -> Result<ExtendedValue> {
        let mut w = Writer::with_capacity(64);
        for e in self.total_forward_active_energy {
            w.put_u32(e);
        }
        for e in self.total_reverse_active_energy {
            w.put_u32(e);
        }
        for v in self.voltage {
            w.put_u16(v);
        }
        for c in self.current {
            w.put_u16(c);
        }
        w.put_u32(self.measured_values);
        w.put_u16(self.period_sec);
        w.put_i32(self.total_cost);
        w.put_i32(self.price_per_unit);
        w.put_bytes(&self.currency);
        ExtendedValue::new(ev_kind::ELECTRICITY_METER_MEASUREMENT_V2, &w.into_bytes())
    }
}

/// Thermostat detail block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThermostatExtValue {
    pub fields: u8,
    pub flags: u8,
    pub measured_temperature: i16,
    pub preset_temperature: i16,
}

impl ThermostatExtValue {
    pub fn to_extended_value(self) -> Result<ExtendedValue> {
        let mut w = Writer::with_capacity(8);
        w.put_u8(self.fields);
        w.put_u8(self.flags);
        w.put_i16(self.measured_temperature);
        w.put_i16(self.preset_temperature);
        ExtendedValue::new(ev_kind::THERMOSTAT_DETAILS_V1, &w.into_bytes())
    }
}
