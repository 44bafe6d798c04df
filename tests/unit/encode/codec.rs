use super::*;

fn audio_format() -> TrackFormat {
    TrackFormat::Audio {
        sample_rate_hz: 48_000,
        channel_count: 2,
        bit_rate: 320_000,
    }
}

const T: Duration = Duration::from_millis(1);

#[test]
fn refuses_use_before_start() {
    let mut codec = PassthroughCodec::new(audio_format());
    assert!(matches!(
        codec.dequeue_input(T),
        Err(MontageError::Codec(_))
    ));
}

#[test]
fn announces_format_then_config_then_data() {
    let mut codec = PassthroughCodec::new(audio_format());
    codec.start().unwrap();
    assert_eq!(codec.dequeue_output(T).unwrap(), OutputEvent::TryAgainLater);

    let slot = codec.dequeue_input(T).unwrap().unwrap();
    // Only one slot is out at a time.
    assert_eq!(codec.dequeue_input(T).unwrap(), None);
    codec.queue_input(slot, &[1, 2, 3], 42).unwrap();

    assert_eq!(
        codec.dequeue_output(T).unwrap(),
        OutputEvent::FormatChanged(audio_format())
    );
    let OutputEvent::Packet(config) = codec.dequeue_output(T).unwrap() else {
        panic!("expected codec config packet");
    };
    assert!(config.codec_config);
    let OutputEvent::Packet(data) = codec.dequeue_output(T).unwrap() else {
        panic!("expected data packet");
    };
    assert_eq!(data.data, vec![1, 2, 3]);
    assert_eq!(data.pts_us, 42);
    assert!(!data.codec_config);
    assert_eq!(codec.dequeue_output(T).unwrap(), OutputEvent::TryAgainLater);
}

#[test]
fn end_of_stream_follows_pending_output() {
    let mut codec = PassthroughCodec::new(audio_format());
    codec.start().unwrap();
    let slot = codec.dequeue_input(T).unwrap().unwrap();
    codec.queue_input(slot, &[9], 1).unwrap();
    codec.signal_end_of_input().unwrap();

    let mut events = Vec::new();
    loop {
        let e = codec.dequeue_output(T).unwrap();
        if e == OutputEvent::TryAgainLater {
            break;
        }
        events.push(e);
    }
    assert_eq!(events.len(), 4);
    assert!(matches!(
        events.last(),
        Some(OutputEvent::Packet(EncodedPacket {
            end_of_stream: true,
            ..
        }))
    ));
    assert!(codec.dequeue_input(T).is_err());
}

#[test]
fn stall_refuses_a_fixed_number_of_claims() {
    let mut codec = PassthroughCodec::new(audio_format()).with_input_stall(2);
    codec.start().unwrap();
    assert_eq!(codec.dequeue_input(T).unwrap(), None);
    assert_eq!(codec.dequeue_input(T).unwrap(), None);
    assert!(codec.dequeue_input(T).unwrap().is_some());
}

#[test]
fn unclaimed_slot_is_rejected() {
    let mut codec = PassthroughCodec::new(audio_format());
    codec.start().unwrap();
    assert!(codec.queue_input(7, &[0], 0).is_err());
}
