pub mod bluetooth;
pub mod calibration;
pub mod connection;
pub mod error;
pub mod events;
pub mod firmware;
pub mod mock;
pub mod pipeline;
pub mod protocol;
pub mod topology;
pub mod transport;

pub use error::{Error, Result};

use std::sync::{Mutex, MutexGuard, PoisonError};

// A panicking event handler must not take the connection down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub mod prelude {
    pub use crate::connection::{Connection, State};
    pub use crate::events::{Event, EventHub, EventKind, Handler};
    pub use crate::transport::Selector;
    pub use crate::{
        bluetooth, calibration, connection, events, firmware, mock, pipeline, protocol, topology,
        transport,
    };
    pub use crate::{Error, Result};

    #[derive(Clone, Debug, Default)]
    pub struct App {
        pub verbose: u8,
        pub scantime: f32,
        pub name: Option<String>,
    }

    impl App {
        /// Match by name when one was given, otherwise by the sensor service.
        pub fn selector(&self) -> Selector {
            match &self.name {
                Some(name) => Selector::Name(name.clone()),
                None => Selector::default(),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn selector_prefers_name() {
            let mut app = App::default();
            assert_eq!(app.selector(), Selector::default());
            app.name = Some("NanoPaint".into());
            assert_eq!(app.selector(), Selector::Name("NanoPaint".into()));
        }
    }
}
