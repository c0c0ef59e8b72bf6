//! Hub discovery.
//!
//! Recognizing the hub is a pure predicate over advertisement data
//! ([`is_hub_advertisement`]); [`HubScanner`] drives the adapter, runs
//! discovered peripherals through the predicate and surfaces matches as
//! [`HubEvent::HubFound`].

use crate::error::{HubError, TransportError};
use crate::models::{HubDevice, HubEvent};
use crate::protocol;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// The advertisement fields the discovery filter inspects.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Advertised service identifiers, in advertisement order.
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
}

/// Whether an advertisement belongs to the hub class.
///
/// The match key is the first advertised service identifier; a hub UUID in
/// any later position does not match.
pub fn is_hub_advertisement(advertisement: &Advertisement) -> bool {
    advertisement.service_uuids.first() == Some(&protocol::HUB_SERVICE_UUID)
}

/// BLE scanner for discovering hubs.
pub struct HubScanner {
    adapter: Adapter,
    event_sender: mpsc::UnboundedSender<HubEvent>,
    scanning: bool,
}

impl HubScanner {
    /// Create a scanner on the first available Bluetooth adapter.
    pub async fn new(event_sender: mpsc::UnboundedSender<HubEvent>) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::AdapterUnavailable)?;
        Ok(Self {
            adapter,
            event_sender,
            scanning: false,
        })
    }

    /// Start scanning for advertisements.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        if self.scanning {
            return Ok(());
        }
        info!("starting BLE scan");
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.scanning = true;
        let _ = self.event_sender.send(HubEvent::ScanningStateChanged(true));
        Ok(())
    }

    /// Stop scanning.
    pub async fn stop(&mut self) -> Result<(), TransportError> {
        if !self.scanning {
            return Ok(());
        }
        info!("stopping BLE scan");
        self.adapter.stop_scan().await?;
        self.scanning = false;
        let _ = self.event_sender.send(HubEvent::ScanningStateChanged(false));
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Scan until the first hub advertisement is seen or the timeout
    /// elapses. Emits exactly one `HubFound` for the match and returns the
    /// peripheral for the caller to open a session on.
    pub async fn find_first(
        &mut self,
        scan_timeout: Duration,
    ) -> Result<(HubDevice, Peripheral), HubError> {
        let mut events = self.adapter.events().await.map_err(TransportError::from)?;
        self.start().await?;

        let matched = tokio::time::timeout(scan_timeout, async {
            while let Some(event) = events.next().await {
                let CentralEvent::DeviceDiscovered(id) = event else {
                    continue;
                };
                let peripheral = self.adapter.peripheral(&id).await?;
                let Some(advertisement) = advertisement_of(&peripheral).await? else {
                    continue;
                };
                if is_hub_advertisement(&advertisement) {
                    let device = hub_device(&peripheral, &advertisement);
                    info!(address = %device.address, name = ?device.name, "hub found");
                    let _ = self.event_sender.send(HubEvent::HubFound(device.clone()));
                    return Ok(Some((device, peripheral)));
                }
                debug!(address = %advertisement.address, "ignoring non-hub advertisement");
            }
            Ok::<_, TransportError>(None)
        })
        .await;

        self.stop().await?;

        match matched {
            Ok(Ok(Some(found))) => Ok(found),
            Ok(Ok(None)) | Err(_) => Err(TransportError::Timeout(scan_timeout).into()),
            Ok(Err(err)) => Err(err.into()),
        }
    }

    /// Scan for a fixed duration and return every hub visible at the end of
    /// it, emitting one `HubFound` per hub.
    pub async fn scan_for(&mut self, duration: Duration) -> Result<Vec<HubDevice>, HubError> {
        self.start().await?;
        tokio::time::sleep(duration).await;

        let mut hubs = Vec::new();
        for peripheral in self.adapter.peripherals().await.map_err(TransportError::from)? {
            if let Some(advertisement) = advertisement_of(&peripheral).await? {
                if is_hub_advertisement(&advertisement) {
                    let device = hub_device(&peripheral, &advertisement);
                    let _ = self.event_sender.send(HubEvent::HubFound(device.clone()));
                    hubs.push(device);
                }
            }
        }

        self.stop().await?;
        Ok(hubs)
    }
}

impl Drop for HubScanner {
    fn drop(&mut self) {
        if self.scanning {
            let adapter = self.adapter.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = adapter.stop_scan().await;
                });
            }
        }
    }
}

async fn advertisement_of(
    peripheral: &Peripheral,
) -> Result<Option<Advertisement>, TransportError> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    Ok(Some(Advertisement {
        service_uuids: properties.services,
        local_name: properties.local_name,
        address: properties.address.to_string(),
        rssi: properties.rssi,
    }))
}

fn hub_device(peripheral: &Peripheral, advertisement: &Advertisement) -> HubDevice {
    HubDevice {
        id: format!("{:?}", peripheral.id()),
        address: advertisement.address.clone(),
        name: advertisement.local_name.clone(),
        rssi: advertisement.rssi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(service_uuids: Vec<Uuid>) -> Advertisement {
        Advertisement {
            service_uuids,
            local_name: Some("Move Hub".to_string()),
            address: "00:11:22:33:44:55".to_string(),
            rssi: Some(-60),
        }
    }

    #[test]
    fn matches_hub_service_in_first_position() {
        assert!(is_hub_advertisement(&advertisement(vec![
            protocol::HUB_SERVICE_UUID
        ])));
        assert!(is_hub_advertisement(&advertisement(vec![
            protocol::HUB_SERVICE_UUID,
            Uuid::from_u128(0x1234),
        ])));
    }

    #[test]
    fn rejects_other_services_and_empty_lists() {
        assert!(!is_hub_advertisement(&advertisement(vec![])));
        assert!(!is_hub_advertisement(&advertisement(vec![Uuid::from_u128(
            0x180f
        )])));
        // hub service present but not first: not a match
        assert!(!is_hub_advertisement(&advertisement(vec![
            Uuid::from_u128(0x180f),
            protocol::HUB_SERVICE_UUID,
        ])));
    }
}
