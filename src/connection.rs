// Disconnected -> Connecting -> Discovering -> Subscribing -> Connected, and back
// to Disconnected only through the disconnect observer or a failed connect.

use crate::error::{Error, Result};
use crate::events::{Event, EventHub};
use crate::firmware::CHANNEL_COUNT;
use crate::lock;
use crate::pipeline::SensorPipeline;
use crate::protocol;
use crate::topology::{FrameHandler, ServiceSpec, TOPOLOGY};
use crate::transport::{
    CharacteristicHandle, Device, DisconnectObserver, Selector, Transport, ValueHandler,
};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Discovering,
    Subscribing,
    Connected,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Disconnected => "disconnected",
            State::Connecting => "connecting",
            State::Discovering => "discovering",
            State::Subscribing => "subscribing",
            State::Connected => "connected",
        };
        f.write_str(name)
    }
}

// Everything callbacks from the transport need to reach.
struct Shared<D> {
    state: Mutex<State>,
    device: Mutex<Option<Arc<D>>>,
    command: Mutex<Option<CharacteristicHandle>>,
    pipeline: Mutex<SensorPipeline>,
    events: EventHub,
}

impl<D> Shared<D> {
    fn state(&self) -> State {
        *lock(&self.state)
    }

    fn set_state(&self, state: State) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!("state {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Claims the connection for a new connect sequence. Fails with the
    /// current state unless disconnected.
    fn begin(&self) -> std::result::Result<(), State> {
        let mut current = lock(&self.state);
        if *current != State::Disconnected {
            return Err(*current);
        }
        debug!("state {} -> {}", *current, State::Connecting);
        *current = State::Connecting;
        Ok(())
    }

    /// Moves a running connect sequence forward, unless the link has
    /// already been reported down in the meantime.
    fn advance(&self, state: State) -> Result<()> {
        let mut current = lock(&self.state);
        if *current == State::Disconnected {
            return Err(Error::ConnectionLost);
        }
        if *current != state {
            debug!("state {} -> {}", *current, state);
            *current = state;
        }
        Ok(())
    }

    fn on_disconnected(&self) {
        info!("disconnected");
        self.set_state(State::Disconnected);
        lock(&self.device).take();
        lock(&self.command).take();
        self.events.publish(&Event::Disconnected);
    }

    fn on_value(&self, handler: FrameHandler, payload: &[u8]) {
        let events = {
            let mut pipeline = lock(&self.pipeline);
            handler(&mut *pipeline, payload)
        };
        for event in &events {
            self.events.publish(event);
        }
    }
}

pub struct Connection<T: Transport> {
    transport: T,
    topology: &'static [ServiceSpec],
    channel_count: usize,
    shared: Arc<Shared<T::Device>>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self::with_topology(transport, TOPOLOGY, CHANNEL_COUNT)
    }

    pub fn with_topology(
        transport: T,
        topology: &'static [ServiceSpec],
        channel_count: usize,
    ) -> Self {
        Self {
            transport,
            topology,
            channel_count,
            shared: Arc::new(Shared {
                state: Mutex::new(State::Disconnected),
                device: Mutex::new(None),
                command: Mutex::new(None),
                pipeline: Mutex::new(SensorPipeline::new(channel_count)),
                events: EventHub::new(),
            }),
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.shared.events
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == State::Connected
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Selects a device, connects and subscribes to every notifying
    /// characteristic in the topology. Does nothing when already connected
    /// or while another connect is running.
    pub async fn connect(&self, selector: &Selector) -> Result<()> {
        info!("attempting to connect...");
        match self.shared.begin() {
            Ok(()) => {}
            Err(State::Connected) => {
                info!("already connected");
                return Ok(());
            }
            Err(state) => {
                info!("connect already in progress ({state})");
                return Ok(());
            }
        }

        let result = self.establish(selector).await;
        if let Err(err) = &result {
            warn!("connection attempt failed: {err}");
            self.shared.set_state(State::Disconnected);
            lock(&self.shared.device).take();
            lock(&self.shared.command).take();
        }
        result
    }

    async fn establish(&self, selector: &Selector) -> Result<()> {
        info!("getting device ({selector})...");
        let device = Arc::new(self.transport.request_device(selector).await?);
        info!("got device {:?}", device.name());

        *lock(&self.shared.pipeline) = SensorPipeline::new(self.channel_count);
        *lock(&self.shared.device) = Some(Arc::clone(&device));

        device.connect(self.disconnect_observer()).await?;
        self.shared.advance(State::Discovering)?;

        self.subscribe_all(device.as_ref()).await?;

        self.shared.advance(State::Connected)?;
        info!("connection complete!");
        self.shared.events.publish(&Event::Connected);
        Ok(())
    }

    async fn subscribe_all(&self, device: &T::Device) -> Result<()> {
        for service_spec in self.topology.iter().filter(|s| !s.ignore) {
            debug!("getting {:?} service...", service_spec.name);
            let service = device.primary_service(service_spec.uuid).await?;

            for spec in service_spec.characteristics.iter().filter(|c| !c.ignore) {
                debug!("getting {:?} characteristic...", spec.name);
                let characteristic = device.characteristic(&service, spec.uuid).await?;

                if spec.commands && characteristic.write {
                    *lock(&self.shared.command) = Some(characteristic.clone());
                }
                if !characteristic.notify {
                    continue;
                }
                let Some(handler) = spec.on_value else {
                    debug!("no handler for {:?} notifications", spec.name);
                    continue;
                };

                self.shared.advance(State::Subscribing)?;
                device
                    .on_value_changed(&characteristic, self.value_handler(handler))
                    .await?;
                info!("starting {:?} notifications...", spec.name);
                device.start_notifications(&characteristic).await?;
                debug!("started {:?} notifications", spec.name);
            }
        }
        Ok(())
    }

    fn disconnect_observer(&self) -> DisconnectObserver {
        let shared: Weak<Shared<T::Device>> = Arc::downgrade(&self.shared);
        Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.on_disconnected();
            }
        })
    }

    // Frames are processed as soon as notifications start, which can be
    // before the sequence reaches Connected.
    fn value_handler(&self, handler: FrameHandler) -> ValueHandler {
        let shared: Weak<Shared<T::Device>> = Arc::downgrade(&self.shared);
        Arc::new(move |payload: &[u8]| {
            if let Some(shared) = shared.upgrade() {
                shared.on_value(handler, payload);
            }
        })
    }

    /// Asks the peripheral to drop the link. The state only changes once the
    /// transport confirms through the disconnect observer.
    pub async fn disconnect(&self) -> Result<()> {
        info!("attempting to disconnect...");
        if self.state() == State::Disconnected {
            info!("already disconnected");
            return Ok(());
        }
        let device = lock(&self.shared.device).clone();
        match device {
            Some(device) => device.disconnect().await,
            None => Ok(()),
        }
    }

    /// Writes a 16-bit configuration word to the command characteristic.
    /// Ignored unless connected.
    pub async fn send_config(&self, value: u16) -> Result<()> {
        if !self.is_connected() {
            debug!("not connected, dropping config value {value}");
            return Ok(());
        }
        let device = lock(&self.shared.device).clone();
        let command = lock(&self.shared.command).clone();
        let (Some(device), Some(command)) = (device, command) else {
            warn!("no writable characteristic, dropping config value {value}");
            return Ok(());
        };
        device.write(&command, &protocol::encode_config(value)).await
    }

    /// A rate of 0 selects the firmware default of 1000 Hz.
    pub async fn set_sample_rate(&self, rate: u16) -> Result<()> {
        let rate = protocol::sample_rate(rate);
        info!("setting sample rate to {rate} Hz");
        self.send_config(rate).await
    }
}
