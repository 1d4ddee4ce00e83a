//! # spatial-pal - hardware interface driver for the Spatial USB IMU
//!
//! A platform-abstraction-layer interface that plugs into a robotics host
//! framework. Provides:
//! - Device discovery, open and rate configuration over hidapi
//! - Rate-gated live sampling, or replay of recorded samples from a queue
//! - Loss detection and bounded-rate reconnection with validation
//! - Parameter synchronization with the host's persistent store
//! - Option, parameter and minimal-config descriptors for host tooling
//!
//! ## Quick Start
//! ```no_run
//! use spatial_pal::{PalInterface, SpatialInterface};
//! # fn run(host: &mut dyn spatial_pal::Host) {
//! let mut iface = SpatialInterface::with_hid();
//! assert!(iface.configure(host).is_ok());
//! assert!(iface.init(host).is_ok());
//! loop {
//!     if host.active_fault().is_none() {
//!         let _ = iface.poll_for_data(host);
//!         let _ = iface.log_data(host);
//!         let _ = iface.process_data(host);
//!     } else {
//!         let _ = iface.handle_state(host);
//!     }
//! #   break;
//! }
//! let _ = iface.release(host);
//! # }
//! ```

pub mod error;
pub mod types;
pub mod clock;
pub mod protocol;
pub mod hid;
pub mod device;
pub mod reader;
pub mod diagnostics;
pub mod params;
pub mod config;
pub mod support;
pub mod message;
pub mod host;
pub mod interface;

#[cfg(test)]
mod testing;

pub use error::PalError;
pub use types::*;
pub use device::{list_devices, DeviceManager, HidBackend, SensorBackend, SensorConnection};
pub use host::{
    Dtc, HookStatus, Host, InterfaceCommand, InterfaceDescriptor, InterfaceSetup, PalInterface,
    ParameterCommand, ParameterStore,
};
pub use interface::SpatialInterface;
pub use message::ImuMessage;
pub use params::{ConfigVariables, ParamValue};
pub use reader::ReplayFilter;

/// Result type alias for interface operations.
pub type Result<T> = std::result::Result<T, PalError>;
