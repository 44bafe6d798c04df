use super::*;
use crate::encode::codec::{PassthroughCodec, TrackFormat};
use crate::encode::muxer::{InMemoryMuxer, MuxEvent};

fn audio() -> TrackFormat {
    TrackFormat::Audio {
        sample_rate_hz: 48_000,
        channel_count: 2,
        bit_rate: 320_000,
    }
}

fn feed(codec: &mut PassthroughCodec, data: &[u8], pts_us: i64) {
    let slot = codec.dequeue_input(DRAIN_TIMEOUT).unwrap().unwrap();
    codec.queue_input(slot, data, pts_us).unwrap();
}

#[test]
fn single_track_registers_and_writes_data_packets_only() {
    let (backend, log) = InMemoryMuxer::new();
    let muxer = Muxer::new(Box::new(backend), 1).unwrap();
    let mut codec = PassthroughCodec::new(audio());
    codec.start().unwrap();
    let mut state = DrainState::new("audio");

    feed(&mut codec, &[1, 2, 3, 4], 100);
    state.drain(&mut codec, &muxer, false).unwrap();
    feed(&mut codec, &[5, 6], 200);
    state.drain(&mut codec, &muxer, true).unwrap();

    assert_eq!(state.track(), Some(0));
    assert_eq!(state.samples_written(), 2);
    let events = log.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            MuxEvent::TrackAdded {
                index: 0,
                video: false
            },
            MuxEvent::Started,
            MuxEvent::Sample {
                track: 0,
                pts_us: 100,
                len: 4
            },
            MuxEvent::Sample {
                track: 0,
                pts_us: 200,
                len: 2
            },
        ]
    );
}

#[test]
fn packets_before_the_container_runs_are_dropped() {
    let (backend, log) = InMemoryMuxer::new();
    // A second track never registers, so the container never starts.
    let muxer = Muxer::new(Box::new(backend), 2).unwrap();
    let mut codec = PassthroughCodec::new(audio());
    codec.start().unwrap();
    let mut state = DrainState::new("audio");

    feed(&mut codec, &[1, 2], 0);
    state.drain(&mut codec, &muxer, false).unwrap();

    assert_eq!(state.samples_written(), 0);
    assert_eq!(state.samples_dropped(), 1);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn eos_drain_fails_when_the_codec_never_finishes() {
    struct Silent;
    impl EncoderCodec for Silent {
        fn start(&mut self) -> MontageResult<()> {
            Ok(())
        }
        fn dequeue_input(&mut self, _: Duration) -> MontageResult<Option<usize>> {
            Ok(None)
        }
        fn queue_input(&mut self, _: usize, _: &[u8], _: i64) -> MontageResult<()> {
            Ok(())
        }
        fn signal_end_of_input(&mut self) -> MontageResult<()> {
            Ok(())
        }
        fn dequeue_output(&mut self, _: Duration) -> MontageResult<OutputEvent> {
            Ok(OutputEvent::TryAgainLater)
        }
        fn stop(&mut self) -> MontageResult<()> {
            Ok(())
        }
    }

    let (backend, _log) = InMemoryMuxer::new();
    let muxer = Muxer::new(Box::new(backend), 1).unwrap();
    let mut state = DrainState::new("video");
    let mut codec = Silent;
    assert!(state.drain(&mut codec, &muxer, false).is_ok());
    assert!(matches!(
        state.drain(&mut codec, &muxer, true),
        Err(MontageError::Codec(_))
    ));
}

#[test]
fn queue_retries_through_a_busy_codec() {
    let mut codec = PassthroughCodec::new(audio()).with_input_stall(3);
    codec.start().unwrap();
    queue_input_with_retry(&mut codec, &[1, 2], 5).unwrap();
    assert!(matches!(
        codec.dequeue_output(DRAIN_TIMEOUT).unwrap(),
        OutputEvent::FormatChanged(_)
    ));

    let mut stuck = PassthroughCodec::new(audio()).with_input_stall(MAX_INPUT_ATTEMPTS);
    stuck.start().unwrap();
    assert!(queue_input_with_retry(&mut stuck, &[1], 0).is_err());
}
