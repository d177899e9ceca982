use cutline::types::{AppMessage, Color, ControlSignal, Envelope, Payload, ProcessId};
use cutline::{
    ColorStrategy, Delivery, MarkerStrategy, Process, ProcessError, ProtocolViolation,
    SnapshotStrategy, channel,
};

const CAPACITY: usize = 10;

fn marker_from(initiator: u32) -> Envelope {
    ControlSignal::Marker {
        initiator: ProcessId(initiator),
    }
    .into()
}

#[tokio::test]
async fn first_marker_is_forwarded_and_duplicate_is_rejected() {
    let (_tx12, rx12) = channel(ProcessId(1), ProcessId(2), CAPACITY);
    let (_tx32, rx32) = channel(ProcessId(3), ProcessId(2), CAPACITY);
    let (tx21, mut rx21) = channel(ProcessId(2), ProcessId(1), CAPACITY);
    let mut p2 = Process::new(
        ProcessId(2),
        "init2",
        Box::new(MarkerStrategy::new(ProcessId(2))),
        vec![rx12, rx32],
        vec![tx21],
    );

    let applied = p2.dispatch(AppMessage::plain(ProcessId(1), "A").into(), ProcessId(1));
    assert_eq!(applied, Ok(Delivery::Applied));

    assert_eq!(
        p2.dispatch(marker_from(1), ProcessId(1)),
        Ok(Delivery::Started)
    );
    assert_eq!(rx21.recv().await, Some(marker_from(1)));

    let snapshot = p2.strategy().snapshot_record().expect("recording");
    assert_eq!(snapshot.recorded_local_state.render(), "init2|A");

    let err = p2
        .dispatch(marker_from(1), ProcessId(1))
        .expect_err("channel already closed");
    assert_eq!(
        err,
        ProcessError::Protocol(ProtocolViolation::DuplicateMarker {
            process: ProcessId(2),
            source: ProcessId(1),
        })
    );

    // the record survives the violation untouched
    assert!(p2.strategy().is_recording());
    assert_eq!(
        p2.strategy()
            .snapshot_record()
            .map(|r| r.recorded_local_state.render()),
        Some("init2|A".to_owned())
    );
}

#[tokio::test]
async fn sends_are_tagged_and_counted() {
    let (tx12, mut rx12) = channel(ProcessId(1), ProcessId(2), CAPACITY);
    let (_tx21, rx21) = channel(ProcessId(2), ProcessId(1), CAPACITY);
    let mut p1 = Process::new(
        ProcessId(1),
        "init1",
        Box::new(ColorStrategy::new(ProcessId(1))),
        vec![rx21],
        vec![tx12],
    );

    p1.send(ProcessId(2), Payload::from("A")).await.expect("white send");
    assert_eq!(p1.initiate_snapshot(), Ok(Delivery::Started));
    p1.send(ProcessId(2), Payload::from("E")).await.expect("red send");

    assert_eq!(
        rx12.recv().await,
        Some(AppMessage::colored(ProcessId(1), "A", Color::White).into())
    );
    assert_eq!(
        rx12.recv().await,
        Some(AppMessage::colored(ProcessId(1), "E", Color::Red).into())
    );
    assert_eq!(p1.local_state().sent_to(ProcessId(2)), 2);

    let recorded = p1.strategy().snapshot_record().expect("red");
    assert_eq!(recorded.recorded_local_state.sent_to(ProcessId(2)), 1);

    let err = p1
        .send(ProcessId(3), Payload::from("nowhere"))
        .await
        .expect_err("no such channel");
    assert_eq!(
        err,
        ProcessError::UnknownPeer {
            process: ProcessId(1),
            peer: ProcessId(3),
        }
    );
}

#[tokio::test]
async fn marker_under_colour_strategy_is_a_violation() {
    let (_tx21, rx21) = channel(ProcessId(2), ProcessId(1), CAPACITY);
    let mut p1 = Process::new(
        ProcessId(1),
        "init1",
        Box::new(ColorStrategy::new(ProcessId(1))),
        vec![rx21],
        Vec::new(),
    );
    let err = p1
        .dispatch(marker_from(2), ProcessId(2))
        .expect_err("colour strategy never sends markers");
    assert!(matches!(
        err,
        ProcessError::Protocol(ProtocolViolation::UnexpectedControlSignal { .. })
    ));
    assert_eq!(p1.local_state().render(), "init1");
}
