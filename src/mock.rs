// In-memory peripheral for tests and the `simulate` command.

use crate::error::{Error, Result};
use crate::firmware::{DEVICE_NAME, MAIN_CHARACTERISTIC_UUID, MAIN_SERVICE_UUID};
use crate::lock;
use crate::transport::{
    CharacteristicHandle, Device, DisconnectObserver, Selector, ServiceHandle, Transport,
    ValueHandler,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone)]
pub struct MockTransport {
    device: MockDevice,
    requests: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(device: MockDevice) -> Self {
        Self {
            device,
            requests: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }

    /// Number of device selections performed so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Makes subsequent selections fail as if the user cancelled them.
    pub fn refuse_selection(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Device = MockDevice;

    async fn request_device(&self, selector: &Selector) -> Result<MockDevice> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let advertised = [MAIN_SERVICE_UUID];
        if self.refuse.load(Ordering::SeqCst)
            || !selector.accepts(Some(self.device.name().as_str()), &advertised)
        {
            return Err(Error::DeviceNotFound);
        }
        Ok(self.device.clone())
    }
}

/// A device method invocation, in the order the mock saw them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    PrimaryService(Uuid),
    Characteristic(Uuid),
    OnValueChanged(Uuid),
    StartNotifications(Uuid),
    Write(Uuid),
}

pub type CallHook = Arc<dyn Fn(&Call) + Send + Sync>;

#[derive(Default)]
struct State {
    connected: bool,
    connects: usize,
    calls: Vec<Call>,
    observer: Option<DisconnectObserver>,
    handlers: HashMap<Uuid, ValueHandler>,
    notifying: HashSet<Uuid>,
    writes: Vec<(Uuid, Vec<u8>)>,
}

#[derive(Clone)]
pub struct MockDevice {
    name: String,
    characteristics: Arc<Vec<CharacteristicHandle>>,
    confirm_disconnect: bool,
    yielding: bool,
    hook: Option<CallHook>,
    state: Arc<Mutex<State>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_characteristics(vec![CharacteristicHandle {
            service: MAIN_SERVICE_UUID,
            uuid: MAIN_CHARACTERISTIC_UUID,
            notify: true,
            write: true,
        }])
    }

    pub fn with_characteristics(characteristics: Vec<CharacteristicHandle>) -> Self {
        Self {
            name: DEVICE_NAME.to_string(),
            characteristics: Arc::new(characteristics),
            confirm_disconnect: true,
            yielding: false,
            hook: None,
            state: Arc::default(),
        }
    }

    /// When false, `disconnect()` is accepted but the link never reports
    /// going down.
    pub fn confirm_disconnect(mut self, confirm: bool) -> Self {
        self.confirm_disconnect = confirm;
        self
    }

    /// Makes every device method yield to the scheduler before it runs.
    pub fn yielding(mut self, yielding: bool) -> Self {
        self.yielding = yielding;
        self
    }

    /// Runs `hook` after each device method succeeds.
    pub fn on_call(mut self, hook: impl Fn(&Call) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    async fn record(&self, call: Call) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
        lock(&self.state).calls.push(call);
    }

    fn done(&self, call: Call) -> Result<()> {
        if let Some(hook) = &self.hook {
            hook(&call);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn connects(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn is_notifying(&self, characteristic: Uuid) -> bool {
        lock(&self.state).notifying.contains(&characteristic)
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        lock(&self.state).writes.clone()
    }

    /// Delivers a value notification. Returns false if nobody is listening.
    pub fn notify(&self, characteristic: Uuid, payload: &[u8]) -> bool {
        let handler = {
            let state = lock(&self.state);
            if !state.notifying.contains(&characteristic) {
                return false;
            }
            state.handlers.get(&characteristic).cloned()
        };
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Simulates the peripheral going away on its own.
    pub fn drop_link(&self) {
        let observer = {
            let mut state = lock(&self.state);
            state.connected = false;
            state.notifying.clear();
            state.handlers.clear();
            state.observer.take()
        };
        if let Some(observer) = observer {
            observer();
        }
    }

    fn require_connected(&self) -> Result<()> {
        if lock(&self.state).connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Device for MockDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn connect(&self, on_disconnect: DisconnectObserver) -> Result<()> {
        self.record(Call::Connect).await;
        {
            let mut state = lock(&self.state);
            state.connected = true;
            state.connects += 1;
            state.observer = Some(on_disconnect);
        }
        self.done(Call::Connect)
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(Call::Disconnect).await;
        if self.confirm_disconnect {
            self.drop_link();
        }
        self.done(Call::Disconnect)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceHandle> {
        self.record(Call::PrimaryService(uuid)).await;
        self.require_connected()?;
        if !self.characteristics.iter().any(|c| c.service == uuid) {
            return Err(Error::ServiceNotFound(uuid));
        }
        self.done(Call::PrimaryService(uuid))?;
        Ok(ServiceHandle { uuid })
    }

    async fn characteristic(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<CharacteristicHandle> {
        self.record(Call::Characteristic(uuid)).await;
        self.require_connected()?;
        let found = self
            .characteristics
            .iter()
            .find(|c| c.service == service.uuid && c.uuid == uuid)
            .cloned()
            .ok_or(Error::CharacteristicNotFound(uuid))?;
        self.done(Call::Characteristic(uuid))?;
        Ok(found)
    }

    async fn on_value_changed(
        &self,
        characteristic: &CharacteristicHandle,
        handler: ValueHandler,
    ) -> Result<()> {
        self.record(Call::OnValueChanged(characteristic.uuid)).await;
        lock(&self.state)
            .handlers
            .insert(characteristic.uuid, handler);
        self.done(Call::OnValueChanged(characteristic.uuid))
    }

    async fn start_notifications(&self, characteristic: &CharacteristicHandle) -> Result<()> {
        self.record(Call::StartNotifications(characteristic.uuid)).await;
        self.require_connected()?;
        lock(&self.state).notifying.insert(characteristic.uuid);
        self.done(Call::StartNotifications(characteristic.uuid))
    }

    async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()> {
        self.record(Call::Write(characteristic.uuid)).await;
        self.require_connected()?;
        lock(&self.state)
            .writes
            .push((characteristic.uuid, data.to_vec()));
        self.done(Call::Write(characteristic.uuid))
    }
}
