use crate::error::{Error, Result};
use crate::lock;
use crate::prelude::App;
use crate::transport::{
    CharacteristicHandle, Device, DisconnectObserver, Selector, ServiceHandle, Transport,
    ValueHandler,
};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

/// Name and address of a peripheral seen during a scan.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub address: String,
}

/// Selects peripherals through the host's BLE adapters.
#[derive(Clone, Debug)]
pub struct BleTransport {
    scantime: Duration,
}

impl BleTransport {
    pub fn new(app: &App) -> Self {
        Self {
            scantime: Duration::from_secs_f32(app.scantime.max(0.0)),
        }
    }
}

async fn adapters() -> Result<Vec<Adapter>> {
    let manager = Manager::new().await?;
    let adapter_list = manager.adapters().await?;
    if adapter_list.is_empty() {
        return Err(Error::NoAdapter);
    }
    Ok(adapter_list)
}

/// Scans one adapter for `scantime` and returns the peripherals `selector` accepts.
async fn scan_adapter(
    adapter: &Adapter,
    selector: &Selector,
    scantime: Duration,
) -> Result<Vec<(Peripheral, PeripheralProperties)>> {
    debug!("trying bluetooth adapter {}...", adapter.adapter_info().await?);
    adapter
        .start_scan(ScanFilter {
            services: selector.services(),
        })
        .await?;
    time::sleep(scantime).await;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let properties = peripheral.properties().await?;
        trace!("{:?}", properties);
        if let Some(properties) = properties {
            if selector.accepts(properties.local_name.as_deref(), &properties.services) {
                found.push((peripheral, properties));
            }
        }
    }
    if let Err(err) = adapter.stop_scan().await {
        debug!("failed to stop scan: {err}");
    }
    Ok(found)
}

/// Lists every peripheral matching the configured selector without connecting.
pub async fn scan(app: &App) -> Result<Vec<DeviceInfo>> {
    info!("Scanning...");
    let selector = app.selector();
    let scantime = Duration::from_secs_f32(app.scantime.max(0.0));

    let mut devices = Vec::new();
    for adapter in adapters().await?.iter() {
        for (_, properties) in scan_adapter(adapter, &selector, scantime).await? {
            devices.push(DeviceInfo {
                name: properties.local_name,
                address: properties.address.to_string(),
            });
        }
    }
    Ok(devices)
}

#[async_trait]
impl Transport for BleTransport {
    type Device = BleDevice;

    async fn request_device(&self, selector: &Selector) -> Result<BleDevice> {
        info!("Scanning...");
        for adapter in adapters().await? {
            let found = scan_adapter(&adapter, selector, self.scantime).await?;
            if let Some((peripheral, properties)) = found.into_iter().next() {
                info!("Found device with address {}", properties.address);
                return Ok(BleDevice::new(adapter, peripheral, properties));
            }
        }
        Err(Error::DeviceNotFound)
    }
}

pub struct BleDevice {
    pub name: String,
    pub address: String,
    adapter: Adapter,
    peripheral: Peripheral,
    handlers: Arc<Mutex<HashMap<Uuid, ValueHandler>>>,
    pumping: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BleDevice {
    fn new(adapter: Adapter, peripheral: Peripheral, properties: PeripheralProperties) -> Self {
        Self {
            name: properties.local_name.unwrap_or_default(),
            address: properties.address.to_string(),
            adapter,
            peripheral,
            handlers: Arc::default(),
            pumping: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn find(&self, handle: &CharacteristicHandle) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == handle.service && c.uuid == handle.uuid)
            .ok_or(Error::CharacteristicNotFound(handle.uuid))
    }

    /// Forwards the peripheral's notification stream to the registered handlers.
    async fn start_pump(&self) -> Result<()> {
        if self.pumping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut notifications = match self.peripheral.notifications().await {
            Ok(notifications) => notifications,
            Err(err) => {
                self.pumping.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        let handlers = Arc::clone(&self.handlers);
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let handler = lock(&handlers).get(&notification.uuid).cloned();
                match handler {
                    Some(handler) => handler(&notification.value),
                    None => trace!("unhandled notification from {}", notification.uuid),
                }
            }
        });
        lock(&self.tasks).push(task);
        Ok(())
    }
}

impl Drop for BleDevice {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl Device for BleDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn connect(&self, on_disconnect: DisconnectObserver) -> Result<()> {
        let mut events = self.adapter.events().await?;
        self.peripheral.connect().await?;

        let id = self.peripheral.id();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(peripheral) = event {
                    if peripheral == id {
                        on_disconnect();
                        break;
                    }
                }
            }
        });
        lock(&self.tasks).push(task);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceHandle> {
        if self.peripheral.services().is_empty() {
            self.peripheral.discover_services().await?;
        }
        self.peripheral
            .services()
            .iter()
            .find(|s| s.uuid == uuid)
            .map(|s| ServiceHandle { uuid: s.uuid })
            .ok_or(Error::ServiceNotFound(uuid))
    }

    async fn characteristic(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<CharacteristicHandle> {
        let characteristic = self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service.uuid)
            .flat_map(|s| s.characteristics)
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid))?;

        let properties = characteristic.properties;
        Ok(CharacteristicHandle {
            service: service.uuid,
            uuid,
            notify: properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
            write: properties
                .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        })
    }

    async fn on_value_changed(
        &self,
        characteristic: &CharacteristicHandle,
        handler: ValueHandler,
    ) -> Result<()> {
        lock(&self.handlers).insert(characteristic.uuid, handler);
        Ok(())
    }

    async fn start_notifications(&self, characteristic: &CharacteristicHandle) -> Result<()> {
        let characteristic = self.find(characteristic)?;
        self.start_pump().await?;
        self.peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()> {
        let characteristic = self.find(characteristic)?;
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        debug!("writing {data:?} to {}", characteristic.uuid);
        self.peripheral.write(&characteristic, data, write_type).await?;
        Ok(())
    }
}
