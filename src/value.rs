//! Per-channel value cells with dirty-bit synchronisation tracking.
//!
//! A slot never performs I/O; it records the latest payload and whether it
//! still needs to be pushed to the server. The session engine drains dirty
//! slots on each Online tick and marks them clean once the dispatcher has
//! accepted the frame. Superseded values may be dropped between drains —
//! the protocol transports current state, not an event history.

use crate::error::{Error, Result};
use crate::proto::messages::ActionTriggerProperties;
use crate::proto::{CHANNELEXTENDEDVALUE_SIZE, CHANNELVALUE_SIZE, ev_kind};

/// Schema-variable payload for meters, thermostats and countdown timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedValue {
    /// One of [`ev_kind`](crate::proto::ev_kind).
    pub kind: u8,
    pub data: heapless::Vec<u8, CHANNELEXTENDEDVALUE_SIZE>,
}

impl ExtendedValue {
    pub fn new(kind: u8, data: &[u8]) -> Result<Self> {
        let mut buf = heapless::Vec::new();
        buf.extend_from_slice(data)
            .map_err(|()| Error::InvalidArgument("extended value over protocol limit"))?;
        Ok(Self { kind, data: buf })
    }
}

impl Default for ExtendedValue {
    fn default() -> Self {
        Self {
            kind: ev_kind::NONE,
            data: heapless::Vec::new(),
        }
    }
}

// ── Plain value slot ─────────────────────────────────────────

/// Fixed-size channel value with a needs-push flag.
#[derive(Debug)]
pub struct ValueSlot {
    payload: [u8; CHANNELVALUE_SIZE],
    dirty: bool,
    sync_on_change: bool,
}

impl ValueSlot {
    pub fn new(sync_on_change: bool) -> Self {
        Self {
            payload: [0; CHANNELVALUE_SIZE],
            dirty: false,
            sync_on_change,
        }
    }

    /// Store a new payload prefix and update the dirty flag.
    ///
    /// With sync-on-change enabled the slot only goes dirty when the bytes
    /// actually differ; otherwise every write marks it for push.
    pub fn set(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > CHANNELVALUE_SIZE {
            return Err(Error::InvalidArgument("value over channel payload size"));
        }
        let changed = self.payload[..bytes.len()] != *bytes;
        self.payload[..bytes.len()].copy_from_slice(bytes);
        if !self.sync_on_change || changed {
            self.dirty = true;
        }
        Ok(())
    }

    pub fn payload(&self) -> [u8; CHANNELVALUE_SIZE] {
        self.payload
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called once the dispatcher has accepted the outbound frame.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

// ── Extended value slot ──────────────────────────────────────

/// Like [`ValueSlot`] but holding a schema-variable payload.
#[derive(Debug)]
pub struct ExtendedValueSlot {
    value: ExtendedValue,
    dirty: bool,
    sync_on_change: bool,
}

impl ExtendedValueSlot {
    pub fn new(sync_on_change: bool) -> Self {
        Self {
            value: ExtendedValue::default(),
            dirty: false,
            sync_on_change,
        }
    }

    pub fn set(&mut self, value: ExtendedValue) {
        let changed = self.value != value;
        self.value = value;
        if !self.sync_on_change || changed {
            self.dirty = true;
        }
    }

    pub fn value(&self) -> &ExtendedValue {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

// ── Action trigger slot ──────────────────────────────────────

/// Most recent emitted action plus the static trigger properties.
///
/// Latest-wins: an emit before the previous one was drained overwrites it.
/// Callers that must not lose discrete actions space emissions by at least
/// one tick.
#[derive(Debug, Default)]
pub struct ActionTriggerSlot {
    properties: ActionTriggerProperties,
    channel_number: u8,
    action: u32,
    dirty: bool,
}

impl ActionTriggerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, channel_number: u8, action: u32) -> Result<()> {
        if action == 0 {
            return Err(Error::InvalidArgument("action code must be non-zero"));
        }
        self.channel_number = channel_number;
        self.action = action;
        self.dirty = true;
        Ok(())
    }

    pub fn pending(&self) -> (u8, u32) {
        (self.channel_number, self.action)
    }

    pub fn properties(&self) -> ActionTriggerProperties {
        self.properties
    }

    pub fn set_properties(&mut self, properties: ActionTriggerProperties) {
        self.properties = properties;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
