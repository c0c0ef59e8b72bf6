//! Hub session lifecycle.
//!
//! A [`HubSession`] owns one transport and walks it through
//! `Idle -> Connecting -> Connected -> Subscribing -> Ready`, with
//! `Disconnected` reachable from every non-idle state. Commands are only
//! accepted in `Ready`; anything else is an [`HubError::InvalidState`]
//! precondition failure and never touches the transport.
//!
//! The `&mut self` receivers double as the concurrency model: at most one
//! connect/subscribe/write is outstanding per session, by construction.

use crate::error::{HubError, TransportError};
use crate::models::{HubDevice, HubEvent, SessionState};
use crate::protocol::{self, Command, LedColor, Port};
use crate::transport::HubTransport;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Control characteristic to subscribe and write to.
    pub control_characteristic: Uuid,
    /// Optional ceiling on each transport call. Without it a hung transport
    /// parks the session in its current transitional state indefinitely.
    pub operation_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            control_characteristic: protocol::CONTROL_CHARACTERISTIC_UUID,
            operation_timeout: None,
        }
    }
}

/// One discovery-to-disconnect lifecycle with a hub.
pub struct HubSession<T: HubTransport> {
    device: HubDevice,
    transport: T,
    config: SessionConfig,
    state: SessionState,
    /// Write channel, present only once discovered on the peripheral.
    control: Option<Uuid>,
    event_sender: mpsc::UnboundedSender<HubEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl<T: HubTransport> HubSession<T> {
    pub fn new(
        device: HubDevice,
        transport: T,
        event_sender: mpsc::UnboundedSender<HubEvent>,
    ) -> Self {
        Self::with_config(device, transport, event_sender, SessionConfig::default())
    }

    pub fn with_config(
        device: HubDevice,
        transport: T,
        event_sender: mpsc::UnboundedSender<HubEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            device,
            transport,
            config,
            state: SessionState::Idle,
            control: None,
            event_sender,
            forwarder: None,
        }
    }

    pub fn device(&self) -> &HubDevice {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connected, subscribed and accepting commands.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Connect the transport, enumerate characteristics and subscribe to
    /// the control characteristic.
    ///
    /// Valid from `Idle` and `Disconnected` only. A transport connect
    /// failure moves the session to `Disconnected`. Enumeration failures
    /// and a missing control characteristic are non-fatal: the session
    /// stays `Connected` without a write path and this returns `Ok`.
    pub async fn connect(&mut self) -> Result<(), HubError> {
        match self.state {
            SessionState::Idle | SessionState::Disconnected => {}
            actual => {
                return Err(HubError::InvalidState {
                    expected: "Idle or Disconnected",
                    actual,
                })
            }
        }

        self.state = SessionState::Connecting;
        info!(address = %self.device.address, "connecting to hub");
        let limit = self.config.operation_timeout;

        if let Err(err) = with_timeout(limit, self.transport.connect()).await {
            self.state = SessionState::Disconnected;
            self.report_error(&err);
            return Err(err.into());
        }
        self.state = SessionState::Connected;
        debug!("transport connected, enumerating characteristics");

        let characteristics =
            match with_timeout(limit, self.transport.discover_characteristics()).await {
                Ok(characteristics) => characteristics,
                Err(err) => {
                    warn!("characteristic enumeration failed: {err}");
                    self.report_error(&err);
                    return Ok(());
                }
            };

        let control = self.config.control_characteristic;
        if !characteristics.contains(&control) {
            warn!(%control, "control characteristic missing, hub will not accept commands");
            return Ok(());
        }
        self.control = Some(control);
        self.state = SessionState::Subscribing;

        // Register the observer before enabling notifications so that no
        // early data is dropped.
        match with_timeout(limit, self.transport.notifications()).await {
            Ok(stream) => self.spawn_forwarder(stream),
            Err(err) => {
                warn!("notification stream unavailable: {err}");
                self.report_error(&err);
                return Err(err.into());
            }
        }

        if let Err(err) = with_timeout(limit, self.transport.subscribe(control)).await {
            // Stays parked in Subscribing; no automatic retry.
            warn!("subscribe failed: {err}");
            self.report_error(&err);
            return Err(err.into());
        }

        self.state = SessionState::Ready;
        info!("hub ready");
        let _ = self.event_sender.send(HubEvent::Connected);
        Ok(())
    }

    /// Encode a command and write it to the control characteristic.
    ///
    /// Valid only in `Ready`; never retried automatically.
    pub async fn write(&mut self, command: &Command) -> Result<(), HubError> {
        if self.state != SessionState::Ready {
            return Err(HubError::InvalidState {
                expected: "Ready",
                actual: self.state,
            });
        }
        let control = self.control.ok_or(HubError::ControlCharacteristicMissing)?;
        let frame = command.encode()?;
        trace!(?command, frame = ?frame, "writing command frame");
        let limit = self.config.operation_timeout;
        with_timeout(limit, self.transport.write(control, &frame)).await?;
        Ok(())
    }

    /// Run the motor on `port` for `duration_ms` milliseconds.
    pub async fn run_motor_for_duration(
        &mut self,
        port: Port,
        duration_ms: u32,
        duty_cycle: i8,
    ) -> Result<(), HubError> {
        self.write(&Command::MotorTime {
            port,
            duration_ms,
            duty_cycle,
        })
        .await
    }

    /// Run the motor on `port` to `angle` encoder units.
    pub async fn run_motor_to_angle(
        &mut self,
        port: Port,
        angle: u32,
        duty_cycle: i8,
    ) -> Result<(), HubError> {
        self.write(&Command::MotorAngle {
            port,
            angle,
            duty_cycle,
        })
        .await
    }

    /// Set the hub LED. Accepts a [`LedColor`] or a bool (white/off).
    pub async fn set_led(&mut self, color: impl Into<LedColor>) -> Result<(), HubError> {
        self.write(&Command::Led {
            color: color.into(),
        })
        .await
    }

    /// Disconnect the transport. No-op unless connected; the notification
    /// forwarder is stopped first so late completions cannot reach
    /// consumers after the disconnect notification.
    pub async fn disconnect(&mut self) -> Result<(), HubError> {
        match self.state {
            SessionState::Connected | SessionState::Subscribing | SessionState::Ready => {}
            _ => return Ok(()),
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.control = None;

        let limit = self.config.operation_timeout;
        let result = with_timeout(limit, self.transport.disconnect()).await;

        self.state = SessionState::Disconnected;
        info!(address = %self.device.address, "disconnected from hub");
        let _ = self.event_sender.send(HubEvent::Disconnected);

        result.map_err(HubError::from)
    }

    fn spawn_forwarder(&mut self, mut stream: BoxStream<'static, Vec<u8>>) {
        let sender = self.event_sender.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(bytes) = stream.next().await {
                trace!(len = bytes.len(), "notification received");
                if sender.send(HubEvent::DataReceived(bytes)).is_err() {
                    break;
                }
            }
        }));
    }

    fn report_error(&self, err: &TransportError) {
        let _ = self.event_sender.send(HubEvent::Error(err.to_string()));
    }
}

async fn with_timeout<O>(
    limit: Option<Duration>,
    operation: impl Future<Output = Result<O, TransportError>>,
) -> Result<O, TransportError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| TransportError::Timeout(limit))?,
        None => operation.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockTransport {
        fail_connect: bool,
        fail_discover: bool,
        fail_subscribe: bool,
        omit_control: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
        writes: Arc<Mutex<Vec<(Uuid, Vec<u8>)>>>,
        notify_receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    }

    impl MockTransport {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn with_notifications(mut self) -> (Self, mpsc::UnboundedSender<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.notify_receiver = Some(rx);
            (self, tx)
        }
    }

    #[async_trait]
    impl HubTransport for MockTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.record("connect");
            if self.fail_connect {
                return Err(TransportError::Ble(btleplug::Error::NotConnected));
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            self.record("disconnect");
            Ok(())
        }

        async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError> {
            self.record("discover");
            if self.fail_discover {
                return Err(TransportError::Ble(btleplug::Error::NotConnected));
            }
            let mut characteristics = vec![Uuid::from_u128(0x2a00)];
            if !self.omit_control {
                characteristics.push(protocol::CONTROL_CHARACTERISTIC_UUID);
            }
            Ok(characteristics)
        }

        async fn subscribe(&mut self, _characteristic: Uuid) -> Result<(), TransportError> {
            self.record("subscribe");
            if self.fail_subscribe {
                return Err(TransportError::Ble(btleplug::Error::NotConnected));
            }
            Ok(())
        }

        async fn write(
            &mut self,
            characteristic: Uuid,
            payload: &[u8],
        ) -> Result<(), TransportError> {
            self.record("write");
            self.writes
                .lock()
                .unwrap()
                .push((characteristic, payload.to_vec()));
            Ok(())
        }

        async fn notifications(&mut self) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
            self.record("notifications");
            let receiver = match self.notify_receiver.take() {
                Some(receiver) => receiver,
                None => mpsc::unbounded_channel().1,
            };
            let stream = futures::stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|bytes| (bytes, receiver))
            });
            Ok(stream.boxed())
        }
    }

    fn device() -> HubDevice {
        HubDevice {
            id: "mock".to_string(),
            address: "00:11:22:33:44:55".to_string(),
            name: Some("Move Hub".to_string()),
            rssi: Some(-55),
        }
    }

    fn session(
        transport: MockTransport,
    ) -> (
        HubSession<MockTransport>,
        mpsc::UnboundedReceiver<HubEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HubSession::new(device(), transport, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<HubEvent>) -> Vec<HubEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_reaches_ready_and_notifies() {
        let transport = MockTransport::default();
        let calls = transport.calls.clone();
        let (mut session, mut rx) = session(transport);

        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.is_ready());
        assert_eq!(
            *calls.lock().unwrap(),
            ["connect", "discover", "notifications", "subscribe"]
        );
        assert!(matches!(drain(&mut rx).as_slice(), [HubEvent::Connected]));
    }

    #[tokio::test]
    async fn connect_failure_reports_and_disconnects() {
        let transport = MockTransport {
            fail_connect: true,
            ..Default::default()
        };
        let (mut session, mut rx) = session(transport);

        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, HubError::Transport(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(drain(&mut rx).as_slice(), [HubEvent::Error(_)]));
    }

    #[tokio::test]
    async fn subscribe_failure_parks_session_non_ready() {
        let transport = MockTransport {
            fail_subscribe: true,
            ..Default::default()
        };
        let (mut session, mut rx) = session(transport);

        assert!(session.connect().await.is_err());

        assert_eq!(session.state(), SessionState::Subscribing);
        assert!(!session.is_ready());
        // still disconnectable from the parked state
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [HubEvent::Error(_), HubEvent::Disconnected]
        ));
    }

    #[tokio::test]
    async fn enumeration_failure_is_non_fatal() {
        let transport = MockTransport {
            fail_discover: true,
            ..Default::default()
        };
        let (mut session, mut rx) = session(transport);

        // discovery errors are reported but do not fail the connect
        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert!(!session.is_ready());
        assert!(matches!(drain(&mut rx).as_slice(), [HubEvent::Error(_)]));
    }

    #[tokio::test]
    async fn missing_control_characteristic_is_non_fatal() {
        let transport = MockTransport {
            omit_control: true,
            ..Default::default()
        };
        let writes = transport.writes.clone();
        let (mut session, _rx) = session(transport);

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let err = session.set_led(LedColor::Red).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidState { .. }));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_before_ready_is_invalid_state_without_transport_write() {
        let transport = MockTransport::default();
        let writes = transport.writes.clone();
        let (mut session, _rx) = session(transport);

        let err = session
            .run_motor_for_duration(Port::A, 1000, -50)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HubError::InvalidState {
                expected: "Ready",
                actual: SessionState::Idle,
            }
        ));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ready_session_writes_encoded_frame() {
        let transport = MockTransport::default();
        let writes = transport.writes.clone();
        let (mut session, _rx) = session(transport);

        session.connect().await.unwrap();
        session
            .run_motor_for_duration(Port::A, 1000, -50)
            .await
            .unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, protocol::CONTROL_CHARACTERISTIC_UUID);
        assert_eq!(
            writes[0].1,
            [0x0c, 0x00, 0x81, 0x37, 0x11, 0x09, 0x40, 0x42, 0xcd, 0x64, 0x7f, 0x03]
        );
    }

    #[tokio::test]
    async fn invalid_duty_cycle_is_rejected_before_the_transport() {
        let transport = MockTransport::default();
        let writes = transport.writes.clone();
        let (mut session, _rx) = session(transport);

        session.connect().await.unwrap();
        let err = session.run_motor_to_angle(Port::B, 90, 120).await.unwrap_err();

        assert!(matches!(err, HubError::Protocol(_)));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_pass_through_unmodified() {
        let (transport, notify) = MockTransport::default().with_notifications();
        let (mut session, mut rx) = session(transport);

        session.connect().await.unwrap();
        drain(&mut rx);

        notify.send(vec![0x05, 0x00, 0x82, 0x32, 0x0a]).unwrap();
        let event = rx.recv().await.unwrap();
        match event {
            HubEvent::DataReceived(bytes) => assert_eq!(bytes, [0x05, 0x00, 0x82, 0x32, 0x0a]),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_stops_forwarding_and_notifies() {
        let (transport, notify) = MockTransport::default().with_notifications();
        let (mut session, mut rx) = session(transport);

        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [HubEvent::Connected, HubEvent::Disconnected]
        ));

        // the forwarder is gone; a late notification must not surface
        let _ = notify.send(vec![0xff]);
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let transport = MockTransport::default();
        let calls = transport.calls.clone();
        let (mut session, mut rx) = session(transport);

        session.disconnect().await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(calls.lock().unwrap().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn connect_while_connected_is_invalid_state() {
        let transport = MockTransport::default();
        let (mut session, _rx) = session(transport);

        session.connect().await.unwrap();
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, HubError::InvalidState { .. }));
        // still usable afterwards
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn reconnect_after_disconnect_is_allowed() {
        let transport = MockTransport::default();
        let (mut session, _rx) = session(transport);

        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        session.connect().await.unwrap();

        assert!(session.is_ready());
    }
}
