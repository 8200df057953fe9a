//! Typed channel objects: configuration, identity, user callbacks and
//! slot ownership.
//!
//! A channel is created from a [`ChannelConfig`], added to a
//! [`Device`](crate::device::Device) (which assigns its number) and then
//! fed from the application through the typed setters. Every setter only
//! flips slot state — the session engine pushes dirty slots to the server
//! on its next Online tick.
//!
//! Callbacks are plain `fn` pointers in an optional-member table; per
//! channel context travels through the opaque user data instead of
//! closures, so the whole table stays `Copy`.

use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::proto::messages::{
    ActionTriggerProperties, CalCfgRequest, ChannelConfigUpdate, ChannelNewValue,
    ChannelRegistration, ChannelRegistrationDetails, ChannelState, ChannelValueChanged,
    DeviceMessage,
};
use crate::proto::values::{
    ElectricityMeterExtValue, ElectricityMeterValue, FacadeBlindValue, ImpulseCounterValue,
    RelayValue, RgbwValue, RollerShutterValue, ThermostatExtValue, ThermostatValue,
    TimerStateExtValue, humid_temp_bytes,
};
use crate::proto::{CalCfgResultCode, ChannelType, channel_flag};
use crate::rpc::Dispatcher;
use crate::value::{ActionTriggerSlot, ExtendedValue, ExtendedValueSlot, ValueSlot};

// ── Callback table ───────────────────────────────────────────

/// Called on a set-value request from the server. The returned flag is
/// reported back as the set-channel-result success code.
pub type SetValueFn = fn(&Channel, &ChannelNewValue) -> bool;

/// Called on a channel state request; augments the prefilled state.
pub type GetStateFn = fn(&Channel, &mut ChannelState);

/// Called on a channel-addressed calcfg request.
pub type CalCfgFn = fn(&Channel, &CalCfgRequest) -> CalCfgResultCode;

/// Called when the server pushes this channel's configuration.
pub type ConfigRecvFn = fn(&Channel, &ChannelConfigUpdate);

/// Optional-member callback table. Absent members mean "not handled".
#[derive(Clone, Copy, Default)]
pub struct ChannelCallbacks {
    pub on_set_value: Option<SetValueFn>,
    pub on_get_state: Option<GetStateFn>,
    pub on_calcfg: Option<CalCfgFn>,
    pub on_config_recv: Option<ConfigRecvFn>,
}

// ── Configuration ────────────────────────────────────────────

/// Kind-specific channel options. The variant must match the channel
/// type: exactly one of the two shapes exists per channel.
#[derive(Clone)]
pub enum ChannelOptions {
    Value {
        /// Bitmask of functions the server may activate.
        supported_functions: u32,
        /// Push values only when they actually change.
        sync_values_on_change: bool,
        /// Measurement validity window for offline sensors, seconds.
        validity_time_sec: u32,
    },
    ActionTrigger {
        /// Action capability bits ([`action_cap`](crate::proto::action_cap)).
        caps: u32,
        /// Capabilities whose local handling the server may disable.
        conflicts: u32,
        /// Channel this trigger belongs to, resolved to its assigned
        /// number at registration time.
        related_channel: Option<Weak<Channel>>,
    },
}

/// Immutable channel configuration. Only the active function and the
/// opaque user data change after creation.
#[derive(Clone)]
pub struct ChannelConfig {
    pub channel_type: ChannelType,
    pub default_function: u32,
    pub flags: u32,
    pub options: ChannelOptions,
    pub callbacks: ChannelCallbacks,
    /// Caption announced once after registration, if set.
    pub default_caption: Option<String>,
}

impl ChannelConfig {
    /// Config skeleton with kind-matching default options.
    pub fn new(channel_type: ChannelType, default_function: u32) -> Self {
        let options = if channel_type.is_action_trigger() {
            ChannelOptions::ActionTrigger {
                caps: 0,
                conflicts: 0,
                related_channel: None,
            }
        } else {
            ChannelOptions::Value {
                supported_functions: default_function,
                sync_values_on_change: false,
                validity_time_sec: 0,
            }
        };
        Self {
            channel_type,
            default_function,
            flags: 0,
            options,
            callbacks: ChannelCallbacks::default(),
            default_caption: None,
        }
    }
}

// ── Channel ──────────────────────────────────────────────────

enum Slots {
    Value {
        value: ValueSlot,
        extended: Option<ExtendedValueSlot>,
    },
    Trigger(ActionTriggerSlot),
}

struct ChannelInner {
    /// Assigned by the device at add time; -1 before that.
    number: i32,
    /// Current function as reported by the server.
    active_function: u32,
    data: Option<Arc<dyn Any + Send + Sync>>,
    slots: Slots,
}

/// A logical endpoint owned by one device.
pub struct Channel {
    config: ChannelConfig,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    /// Validate the configuration and allocate the matching slot kind.
    pub fn new(mut config: ChannelConfig) -> Result<Arc<Self>> {
        let slots = match (&config.options, config.channel_type.is_action_trigger()) {
            (ChannelOptions::ActionTrigger { conflicts, .. }, true) => {
                let mut slot = ActionTriggerSlot::new();
                slot.set_properties(ActionTriggerProperties {
                    related_channel_number: 0,
                    disables_local_operation: *conflicts,
                });
                Slots::Trigger(slot)
            }
            (
                ChannelOptions::Value {
                    sync_values_on_change,
                    ..
                },
                false,
            ) => Slots::Value {
                value: ValueSlot::new(*sync_values_on_change),
                extended: config
                    .channel_type
                    .has_extended_value()
                    .then(|| ExtendedValueSlot::new(*sync_values_on_change)),
            },
            (ChannelOptions::Value { .. }, true) => {
                return Err(Error::ChannelConflict(
                    "action trigger channel needs trigger options",
                ));
            }
            (ChannelOptions::ActionTrigger { .. }, false) => {
                return Err(Error::ChannelConflict(
                    "value channel cannot carry trigger options",
                ));
            }
        };

        // A state callback implies the CHANNELSTATE capability flag.
        if config.callbacks.on_get_state.is_some() {
            config.flags |= channel_flag::CHANNELSTATE;
        }

        Ok(Arc::new(Self {
            inner: Mutex::new(ChannelInner {
                number: -1,
                active_function: config.default_function,
                data: None,
                slots,
            }),
            config,
        }))
    }

    /// The configuration snapshot this channel was created from (with the
    /// CHANNELSTATE flag applied).
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn channel_type(&self) -> ChannelType {
        self.config.channel_type
    }

    /// Assigned channel number, or -1 before the channel joins a device.
    pub fn assigned_number(&self) -> i32 {
        self.lock().number
    }

    pub fn active_function(&self) -> u32 {
        self.lock().active_function
    }

    /// Opaque user context, typically read back inside callbacks.
    pub fn data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lock().data.clone()
    }

    pub fn set_data(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        self.lock().data = data;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn require_type(&self, allowed: &[ChannelType], what: &'static str) -> Result<()> {
        if allowed.contains(&self.config.channel_type) {
            Ok(())
        } else {
            warn!(
                "ch[{}] {}: bad channel type {:?}",
                self.assigned_number(),
                what,
                self.config.channel_type
            );
            Err(Error::ChannelConflict(what))
        }
    }

    // ── Typed value setters ───────────────────────────────────

    /// Raw write into the value slot. Typed setters funnel through here
    /// after validating the channel type.
    pub fn set_value(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        match &mut inner.slots {
            Slots::Value { value, .. } => value.set(bytes),
            Slots::Trigger(_) => Err(Error::ChannelConflict(
                "action trigger channel has no value slot",
            )),
        }
    }

    pub fn set_binary_value(&self, on: bool) -> Result<()> {
        self.require_type(
            &[
                ChannelType::SensorNo,
                ChannelType::SensorNc,
                ChannelType::CallButton,
                ChannelType::ValveOpenClose,
            ],
            "cannot set binary value",
        )?;
        self.set_value(&[u8::from(on)])
    }

    pub fn set_double_value(&self, value: f64) -> Result<()> {
        self.require_type(
            &[
                ChannelType::DistanceSensor,
                ChannelType::ThermometerDs18b20,
                ChannelType::Thermometer,
                ChannelType::WindSensor,
                ChannelType::PressureSensor,
                ChannelType::RainSensor,
                ChannelType::WeightSensor,
                ChannelType::WeatherStation,
                ChannelType::GeneralPurposeMeasurement,
                ChannelType::ValvePercentage,
                ChannelType::Engine,
            ],
            "cannot set double value",
        )?;
        self.set_value(&value.to_le_bytes())
    }

    pub fn set_humid_temp_value(&self, humid: f64, temp: f64) -> Result<()> {
        self.require_type(
            &[
                ChannelType::Dht11,
                ChannelType::Dht22,
                ChannelType::Dht21,
                ChannelType::Am2302,
                ChannelType::Am2301,
                ChannelType::HumiditySensor,
                ChannelType::HumidityAndTempSensor,
            ],
            "cannot set humidity/temperature value",
        )?;
        self.set_value(&humid_temp_bytes(humid, temp))
    }

    pub fn set_relay_value(&self, relay: RelayValue) -> Result<()> {
        self.require_type(&[ChannelType::Relay], "cannot set relay value")?;
        self.set_value(&relay.to_channel_value())
    }

    pub fn set_rgbw_value(&self, rgbw: RgbwValue) -> Result<()> {
        self.require_type(
            &[
                ChannelType::Dimmer,
                ChannelType::RgbLedController,
                ChannelType::DimmerAndRgbLed,
            ],
            "cannot set rgbw value",
        )?;
        self.set_value(&rgbw.to_channel_value())
    }

    pub fn set_impulse_counter_value(&self, ic: ImpulseCounterValue) -> Result<()> {
        self.require_type(
            &[ChannelType::ImpulseCounter],
            "cannot set impulse counter value",
        )?;
        self.set_value(&ic.to_channel_value())
    }

    pub fn set_roller_shutter_value(&self, rs: RollerShutterValue) -> Result<()> {
        self.require_type(&[ChannelType::Relay], "cannot set roller shutter value")?;
        self.set_value(&rs.to_channel_value())
    }

    pub fn set_facade_blind_value(&self, fb: FacadeBlindValue) -> Result<()> {
        self.require_type(&[ChannelType::Relay], "cannot set facade blind value")?;
        self.set_value(&fb.to_channel_value())
    }

    pub fn set_electricity_meter_value(&self, em: ElectricityMeterValue) -> Result<()> {
        self.require_type(
            &[ChannelType::ElectricityMeter],
            "cannot set electricity meter value",
        )?;
        self.set_value(&em.to_channel_value())
    }

    pub fn set_thermostat_value(&self, th: ThermostatValue) -> Result<()> {
        self.require_type(&[ChannelType::Thermostat], "cannot set thermostat value")?;
        self.set_value(&th.to_channel_value())
    }

    // ── Extended value setters ────────────────────────────────

    /// Raw write into the extended value slot.
    pub fn set_extended_value(&self, extval: ExtendedValue) -> Result<()> {
        let mut inner = self.lock();
        match &mut inner.slots {
            Slots::Value {
                extended: Some(slot),
                ..
            } => {
                slot.set(extval);
                Ok(())
            }
            _ => Err(Error::ChannelConflict(
                "channel has no extended value slot",
            )),
        }
    }

    pub fn set_timer_state_extvalue(&self, timer: TimerStateExtValue) -> Result<()> {
        self.require_type(&[ChannelType::Relay], "cannot set timer state extvalue")?;
        self.set_extended_value(timer.to_extended_value()?)
    }

    pub fn set_electricity_meter_extvalue(&self, em: ElectricityMeterExtValue) -> Result<()> {
        self.require_type(
            &[ChannelType::ElectricityMeter],
            "cannot set electricity meter extvalue",
        )?;
        self.set_extended_value(em.to_extended_value()?)
    }

    pub fn set_thermostat_extvalue(&self, th: ThermostatExtValue) -> Result<()> {
        self.require_type(&[ChannelType::Thermostat], "cannot set thermostat extvalue")?;
        self.set_extended_value(th.to_extended_value()?)
    }

    // ── Action triggers ───────────────────────────────────────

    /// Record an action for upstream delivery on the next tick.
    pub fn emit_action(&self, action: u32) -> Result<()> {
        self.require_type(&[ChannelType::ActionTrigger], "cannot emit action")?;
        let mut inner = self.lock();
        if inner.number < 0 {
            return Err(Error::InvalidState("channel not added to a device"));
        }
        let number = inner.number as u8;
        match &mut inner.slots {
            Slots::Trigger(slot) => slot.emit(number, action),
            Slots::Value { .. } => unreachable!("trigger type always owns a trigger slot"),
        }
    }

    // ── Device-side plumbing ──────────────────────────────────

    pub(crate) fn assign_number(&self, number: i32) {
        self.lock().number = number;
    }

    /// Server-driven function update. Triggers keep their function fixed.
    pub(crate) fn set_active_function(&self, function: u32) -> Result<()> {
        if self.config.channel_type.is_action_trigger() {
            return Err(Error::ChannelConflict(
                "action trigger function is immutable",
            ));
        }
        self.lock().active_function = function;
        Ok(())
    }

    /// Refresh the trigger slot's wire properties from the related
    /// channel's current assigned number.
    pub(crate) fn resolve_trigger_properties(&self) {
        let ChannelOptions::ActionTrigger {
            conflicts,
            related_channel,
            ..
        } = &self.config.options
        else {
            return;
        };

        let related_number = related_channel
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|ch| ch.assigned_number())
            .filter(|n| *n >= 0)
            .map_or(0, |n| (n + 1) as u32);

        let mut inner = self.lock();
        if let Slots::Trigger(slot) = &mut inner.slots {
            slot.set_properties(ActionTriggerProperties {
                related_channel_number: related_number,
                disables_local_operation: *conflicts,
            });
        }
    }

    /// Build this channel's registration entry.
    pub(crate) fn to_registration(&self) -> ChannelRegistration {
        self.resolve_trigger_properties();
        let inner = self.lock();
        let details = match (&inner.slots, &self.config.options) {
            (Slots::Trigger(slot), ChannelOptions::ActionTrigger { caps, .. }) => {
                ChannelRegistrationDetails::ActionTrigger {
                    caps: *caps,
                    properties: slot.properties(),
                }
            }
            (
                Slots::Value { value, .. },
                ChannelOptions::Value {
                    supported_functions,
                    ..
                },
            ) => ChannelRegistrationDetails::Value {
                supported_functions: *supported_functions,
                value: value.payload(),
            },
            _ => unreachable!("slot kind always matches options"),
        };
        ChannelRegistration {
            number: inner.number.max(0) as u8,
            channel_type: self.config.channel_type.as_raw(),
            default_function: self.config.default_function,
            flags: self.config.flags,
            details,
        }
    }

    /// Drain dirty slots into outbound frames; slots go clean once the
    /// dispatcher has accepted the frame.
    pub(crate) fn sync(&self, disp: &mut Dispatcher) {
        let mut inner = self.lock();
        let number = inner.number.max(0) as u8;
        let validity_time_sec = match &self.config.options {
            ChannelOptions::Value {
                validity_time_sec, ..
            } => *validity_time_sec,
            ChannelOptions::ActionTrigger { .. } => 0,
        };

        match &mut inner.slots {
            Slots::Value { value, extended } => {
                if value.is_dirty() {
                    debug!("sync channel[{number}] value");
                    let msg = DeviceMessage::ChannelValueChanged(ChannelValueChanged {
                        channel_number: number,
                        value: value.payload(),
                        offline: 0,
                        validity_time_sec,
                    });
                    if disp.queue(&msg).is_ok() {
                        value.mark_clean();
                    }
                }
                if let Some(slot) = extended {
                    if slot.is_dirty() {
                        debug!("sync channel[{number}] extval");
                        let msg = DeviceMessage::ChannelExtendedValueChanged(
                            crate::proto::messages::ChannelExtendedValueChanged {
                                channel_number: number,
                                extended_value: slot.value().clone(),
                            },
                        );
                        if disp.queue(&msg).is_ok() {
                            slot.mark_clean();
                        }
                    }
                }
            }
            Slots::Trigger(slot) => {
                if slot.is_dirty() {
                    let (channel_number, action) = slot.pending();
                    debug!("sync channel[{number}] action 0x{action:x}");
                    let msg = DeviceMessage::ActionTrigger(
                        crate::proto::messages::ActionTriggered {
                            channel_number,
                            action,
                        },
                    );
                    if disp.queue(&msg).is_ok() {
                        slot.mark_clean();
                    }
                }
            }
        }
    }

    /// Dispatch a server-initiated set-value to the user callback.
    pub(crate) fn handle_new_value(&self, new_value: &ChannelNewValue) -> bool {
        match self.config.callbacks.on_set_value {
            Some(cb) => cb(self, new_value),
            None => false,
        }
    }
}
