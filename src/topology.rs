// GATT layout the connection subscribes to.

use crate::events::Event;
use crate::firmware::{MAIN_CHARACTERISTIC_UUID, MAIN_SERVICE_UUID};
use crate::pipeline::SensorPipeline;
use uuid::Uuid;

/// Handles one notification payload and returns the events to publish.
pub type FrameHandler = fn(&mut SensorPipeline, &[u8]) -> Vec<Event>;

#[derive(Clone, Copy)]
pub struct ServiceSpec {
    pub name: &'static str,
    pub uuid: Uuid,
    pub ignore: bool,
    pub characteristics: &'static [CharacteristicSpec],
}

#[derive(Clone, Copy)]
pub struct CharacteristicSpec {
    pub name: &'static str,
    pub uuid: Uuid,
    pub ignore: bool,
    pub on_value: Option<FrameHandler>,
    /// Configuration commands are written to this characteristic.
    pub commands: bool,
}

pub static TOPOLOGY: &[ServiceSpec] = &[ServiceSpec {
    name: "main",
    uuid: MAIN_SERVICE_UUID,
    ignore: false,
    characteristics: &[CharacteristicSpec {
        name: "main",
        uuid: MAIN_CHARACTERISTIC_UUID,
        ignore: false,
        on_value: Some(SensorPipeline::process),
        commands: true,
    }],
}];
