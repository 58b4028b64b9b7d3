use crate::error::Result;
use crate::firmware::MAIN_SERVICE_UUID;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Called once when the link goes down, whoever initiated it.
pub type DisconnectObserver = Arc<dyn Fn() + Send + Sync>;

/// Called with the new value of a characteristic.
pub type ValueHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// How to pick a peripheral during device selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Exact advertised local name.
    Name(String),
    /// Any device advertising at least one of these services.
    Services(Vec<Uuid>),
    AcceptAll,
}

impl Default for Selector {
    fn default() -> Self {
        Selector::Services(vec![MAIN_SERVICE_UUID])
    }
}

impl Selector {
    pub fn accepts(&self, name: Option<&str>, services: &[Uuid]) -> bool {
        match self {
            Selector::Name(wanted) => name == Some(wanted.as_str()),
            Selector::Services(wanted) => services.iter().any(|s| wanted.contains(s)),
            Selector::AcceptAll => true,
        }
    }

    /// Services to pass to a scan filter, if the selector restricts them.
    pub fn services(&self) -> Vec<Uuid> {
        match self {
            Selector::Services(wanted) => wanted.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => write!(f, "name {name:?}"),
            Selector::Services(services) => {
                write!(f, "services [")?;
                for (i, uuid) in services.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{uuid}")?;
                }
                write!(f, "]")
            }
            Selector::AcceptAll => write!(f, "any device"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceHandle {
    pub uuid: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub uuid: Uuid,
    pub notify: bool,
    pub write: bool,
}

#[async_trait]
pub trait Transport: Send + Sync {
    type Device: Device;

    /// Picks a peripheral. Fails with [`crate::Error::DeviceNotFound`] when
    /// nothing matched or the selection was abandoned.
    async fn request_device(&self, selector: &Selector) -> Result<Self::Device>;
}

#[async_trait]
pub trait Device: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Establishes the link. `on_disconnect` fires when the link later drops.
    async fn connect(&self, on_disconnect: DisconnectObserver) -> Result<()>;

    /// Requests teardown. Completion is reported through the observer.
    async fn disconnect(&self) -> Result<()>;

    async fn primary_service(&self, uuid: Uuid) -> Result<ServiceHandle>;

    async fn characteristic(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<CharacteristicHandle>;

    async fn on_value_changed(
        &self,
        characteristic: &CharacteristicHandle,
        handler: ValueHandler,
    ) -> Result<()>;

    async fn start_notifications(&self, characteristic: &CharacteristicHandle) -> Result<()>;

    async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_selector_matches_exactly() {
        let selector = Selector::Name("NanoPaint".into());
        assert!(selector.accepts(Some("NanoPaint"), &[]));
        assert!(!selector.accepts(Some("NanoPaint 2"), &[]));
        assert!(!selector.accepts(None, &[MAIN_SERVICE_UUID]));
        assert!(selector.services().is_empty());
    }

    #[test]
    fn service_selector_needs_an_advertised_service() {
        let selector = Selector::default();
        assert!(selector.accepts(None, &[Uuid::nil(), MAIN_SERVICE_UUID]));
        assert!(!selector.accepts(Some("NanoPaint"), &[]));
        assert_eq!(selector.services(), vec![MAIN_SERVICE_UUID]);
    }

    #[test]
    fn accept_all() {
        assert!(Selector::AcceptAll.accepts(None, &[]));
        assert_eq!(Selector::AcceptAll.to_string(), "any device");
    }
}
