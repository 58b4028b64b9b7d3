use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no bluetooth adapters found")]
    NoAdapter,

    /// Device selection finished without picking a peripheral.
    #[error("no matching device found")]
    DeviceNotFound,

    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The link dropped while a connect sequence was still running.
    #[error("connection lost")]
    ConnectionLost,

    #[error("not connected")]
    NotConnected,

    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identifier() {
        let uuid = crate::firmware::MAIN_CHARACTERISTIC_UUID;
        let e = Error::CharacteristicNotFound(uuid);
        assert_eq!(e.to_string(), format!("characteristic {uuid} not found"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
