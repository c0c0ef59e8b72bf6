//! Transport seam between the session and the BLE stack.
//!
//! The session only needs five primitives from the transport: connect,
//! characteristic enumeration, subscribe, write-with-response and
//! disconnect, plus a stream of raw notification payloads. [`HubTransport`]
//! captures exactly that surface; [`BtleTransport`] backs it with btleplug.

use crate::error::TransportError;
use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// The supplied BLE capability the session drives.
///
/// Implementations are single-connection: one transport value maps to one
/// peripheral.
#[async_trait]
pub trait HubTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Full service/characteristic enumeration. Returns the characteristic
    /// identifiers found on the peripheral.
    async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError>;

    /// Enable notifications on a characteristic.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Write a frame with response-required semantics.
    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<(), TransportError>;

    /// Raw notification payloads from the peripheral, undecoded.
    async fn notifications(&mut self) -> Result<BoxStream<'static, Vec<u8>>, TransportError>;
}

/// btleplug-backed transport for a single peripheral.
pub struct BtleTransport {
    peripheral: Peripheral,
    characteristics: BTreeSet<Characteristic>,
}

impl BtleTransport {
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: BTreeSet::new(),
        }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicUnavailable(uuid))
    }
}

#[async_trait]
impl HubTransport for BtleTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError> {
        self.peripheral.discover_services().await?;
        self.characteristics = self.peripheral.characteristics();
        debug!(count = self.characteristics.len(), "characteristics enumerated");
        Ok(self.characteristics.iter().map(|c| c.uuid).collect())
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?.clone();
        self.peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?.clone();
        self.peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn notifications(&mut self) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        let stream = self.peripheral.notifications().await?;
        Ok(stream.map(|notification| notification.value).boxed())
    }
}
