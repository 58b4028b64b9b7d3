use presslink::prelude::*;
use presslink::mock::{MockDevice, MockTransport};
use std::sync::{Arc, Mutex};

fn record_all(events: &EventHub) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let clone = Arc::clone(&seen);
    let handler = Handler::new(move |event| clone.lock().unwrap().push(event.clone()));
    for kind in [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::RawValues,
        EventKind::NormalizedRawValues,
        EventKind::Values,
        EventKind::NormalizedValues,
    ] {
        events.subscribe(kind, &handler);
    }
    seen
}

fn frame(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[tokio::test]
async fn full_session() {
    let transport = MockTransport::new(MockDevice::new());
    let device = transport.device().clone();
    let connection = Connection::new(transport);
    let seen = record_all(connection.events());

    connection.connect(&Selector::default()).await.unwrap();
    assert!(connection.is_connected());

    let low = [0x1100u16; 16];
    let high = [0x1300u16; 16];
    let mid = [0x1200u16; 16];
    for samples in [&low, &high, &mid] {
        assert!(device.notify(firmware::MAIN_CHARACTERISTIC_UUID, &frame(samples)));
    }

    connection.set_sample_rate(0).await.unwrap();
    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), State::Disconnected);

    let seen = seen.lock().unwrap();
    let kinds: Vec<EventKind> = seen.iter().map(Event::kind).collect();
    assert_eq!(kinds.first(), Some(&EventKind::Connected));
    assert_eq!(kinds.last(), Some(&EventKind::Disconnected));
    assert_eq!(kinds.len(), 2 + 3 * 4);

    // The third frame sits halfway between the first two on every channel.
    let normalized_raw: Vec<&Event> = seen
        .iter()
        .filter(|e| e.kind() == EventKind::NormalizedRawValues)
        .collect();
    assert_eq!(normalized_raw[0].values().unwrap(), &[0.0; 16][..]);
    assert_eq!(normalized_raw[1].values().unwrap(), &[1.0; 16][..]);
    assert_eq!(normalized_raw[2].values().unwrap(), &[0.5; 16][..]);

    for event in seen.iter() {
        if let Some(values) = event.values() {
            assert_eq!(values.len(), 16);
            if event.kind() == EventKind::NormalizedValues {
                assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    assert_eq!(
        device.writes(),
        vec![(firmware::MAIN_CHARACTERISTIC_UUID, vec![0x03, 0xe8])]
    );
}

#[tokio::test]
async fn name_selector_must_match() {
    let transport = MockTransport::new(MockDevice::new());
    let connection = Connection::new(transport);

    let err = connection
        .connect(&Selector::Name("SomethingElse".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound));
    assert_eq!(connection.state(), State::Disconnected);

    connection
        .connect(&Selector::Name(firmware::DEVICE_NAME.into()))
        .await
        .unwrap();
    assert!(connection.is_connected());
}

#[tokio::test]
async fn nothing_is_delivered_after_the_link_drops() {
    let transport = MockTransport::new(MockDevice::new());
    let device = transport.device().clone();
    let connection = Connection::new(transport);
    connection.connect(&Selector::AcceptAll).await.unwrap();

    device.drop_link();
    assert!(!device.notify(firmware::MAIN_CHARACTERISTIC_UUID, &frame(&[0x1064; 16])));
    assert!(!connection.is_connected());
}
