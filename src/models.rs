//! Shared value types: discovered devices, lifecycle events, session states.

/// A discovered hub, built from its advertisement at discovery time.
///
/// Immutable; a re-discovery produces a fresh instance.
#[derive(Debug, Clone)]
pub struct HubDevice {
    /// Platform-specific peripheral identifier.
    pub id: String,
    /// Bluetooth address (may be all zeroes on macOS).
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength at discovery time, in dBm.
    pub rssi: Option<i16>,
}

/// Lifecycle and data notifications delivered to external consumers.
#[derive(Debug, Clone)]
pub enum HubEvent {
    ScanningStateChanged(bool),
    HubFound(HubDevice),
    /// The session reached `Ready`: connected and subscribed.
    Connected,
    Disconnected,
    Error(String),
    /// Raw notification bytes from the hub, passed through unmodified.
    DataReceived(Vec<u8>),
}

/// Connection lifecycle states of a [`crate::session::HubSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    /// GATT-connected, control characteristic not yet usable.
    Connected,
    Subscribing,
    Ready,
    Disconnected,
}
