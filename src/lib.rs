//! Rust library for controlling Monoprice 6-zone whole-home audio amplifiers
//!
//! The amplifier is driven over RS-232 with a small ASCII protocol. This
//! library provides an async API on top of an already opened channel. It
//! supports:
//!
//! - Reading the status of every zone at startup
//! - Power, mute, volume, treble, bass, balance and source control per zone
//! - Refreshing a zone after it was changed from a wall keypad
//! - Resynchronizing with the device after a transport error
//! - Subscriptions to zone state changes
//!
//! # Quick Start
//!
//! ```no_run
//! use monoprice_amp::Amplifier;
//!
//! # async fn open_serial_port() -> std::io::Result<tokio::io::DuplexStream> {
//! #     Ok(tokio::io::duplex(1024).0)
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Opening and configuring the port (9600 baud, 8N1) is up to the application.
//!     let port = open_serial_port().await?;
//!     let amp = Amplifier::from_stream(port).await?;
//!
//!     if let Some(zone) = amp.zone(1) {
//!         zone.set_power(true).await?;
//!         zone.set_volume(20).await?;
//!         zone.set_source_channel(3).await?;
//!
//!         zone.refresh().await?;
//!         println!("Zone {}: {:?}", zone.id(), zone.state());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Amplifier**: Owns the channel, discovers the zones of a unit, resets
//! - **Zone**: Per-zone control API and cached state
//! - **Connection**: Exclusive write/echo/read exchanges over the channel
//! - **Protocol**: Command encoding and reply decoding
//! - **Mock**: In-memory channel for tests

mod amplifier;
mod config;
mod connection;
mod error;
pub mod mock;
pub mod protocol;
mod subscription;
mod types;
mod zone;

// Public exports
pub use amplifier::Amplifier;
pub use config::{AmpConfig, MAX_UNITS};
pub use connection::{Channel, LineChannel};
pub use error::{AmpError, ParseError, Result, TransportError};
pub use subscription::{UpdateReceiver, ZoneUpdate};
pub use types::{ActionCode, ControlId, State, UnitId, ZoneId, ZONES_PER_UNIT};
pub use zone::Zone;
