//! BLE driver for the Move toy hub.
//!
//! Discovers the hub by its advertised service identifier, manages the
//! connection lifecycle, and encodes motor/LED commands into the hub's
//! fixed binary frames, written to a single control characteristic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       HubSession                         │
//! │   (lifecycle state machine - public command API)         │
//! └──────────┬──────────────────────────────┬───────────────┘
//!            │                              │
//!            ▼                              ▼
//! ┌────────────────────┐          ┌──────────────────┐
//! │    HubTransport    │          │     protocol     │
//! │                    │          │                  │
//! │ - connect/subscribe│          │ - UUIDs          │
//! │ - write/notify     │          │ - ports, colors  │
//! │ - BtleTransport    │          │ - frame encoder  │
//! └────────────────────┘          └──────────────────┘
//!            ▲
//! ┌──────────┴─────────┐
//! │     HubScanner     │
//! │ - advertisement    │
//! │   filter, HubFound │
//! └────────────────────┘
//! ```
//!
//! Lifecycle and data events ([`HubEvent`]) are delivered on a
//! `tokio::sync::mpsc` channel supplied at construction. A typical flow:
//!
//! ```rust,no_run
//! use movehub::{BtleTransport, HubScanner, HubSession, Port};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let mut scanner = HubScanner::new(events.clone()).await?;
//! let (device, peripheral) = scanner.find_first(Duration::from_secs(10)).await?;
//!
//! let mut session = HubSession::new(device, BtleTransport::new(peripheral), events);
//! session.connect().await?;
//! session.run_motor_for_duration(Port::A, 1000, 100).await?;
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod scanner;
pub mod session;
pub mod transport;

pub use config::HubSettings;
pub use error::{HubError, ProtocolError, TransportError};
pub use models::{HubDevice, HubEvent, SessionState};
pub use protocol::{Command, LedColor, Port};
pub use scanner::{is_hub_advertisement, Advertisement, HubScanner};
pub use session::{HubSession, SessionConfig};
pub use transport::{BtleTransport, HubTransport};
