//! SUPLA device client library.
//!
//! Implements the device side of the SUPLA home-automation cloud
//! protocol: the session lifecycle (connect, register, ping, reconnect),
//! typed channels with deferred sync-on-change value delivery, and the
//! SRPC call dispatcher. Transport and clock are injected, so the whole
//! engine runs against mock links in tests.
//!
//! Typical program flow:
//!
//! ```no_run
//! use libsupla::channel::{Channel, ChannelConfig};
//! use libsupla::proto::{ChannelType, func};
//! use libsupla::{Device, DeviceConfig};
//!
//! # fn main() -> libsupla::Result<()> {
//! let dev = Device::new(Some("Example Device"), None);
//! dev.set_config(DeviceConfig {
//!     email: "user@example.com".into(),
//!     auth_key: [0x01; 16],
//!     guid: [0x02; 16],
//!     server: "svr.supla.org".into(),
//!     ssl: true,
//!     port: 0,
//!     activity_timeout: 0,
//!     reconnect_delay_secs: 0,
//! })?;
//!
//! let thermometer = Channel::new(ChannelConfig::new(
//!     ChannelType::Thermometer,
//!     func::THERMOMETER,
//! ))?;
//! dev.add_channel(&thermometer)?;
//! dev.start()?;
//!
//! for _ in 0..100 {
//!     dev.iterate()?;
//!     thermometer.set_double_value(21.5)?;
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! dev.stop()?;
//! # Ok(())
//! # }
//! ```

#![deny(unused_must_use)]

pub mod channel;
pub mod device;
pub mod proto;
pub mod rpc;
pub mod time;
pub mod transport;
pub mod value;

mod error;
mod session;

pub use channel::{Channel, ChannelCallbacks, ChannelConfig, ChannelOptions};
pub use device::{Device, DeviceConfig, DeviceState, ManufacturerData};
pub use error::{Error, Result, TransportError};
