use pufreader::{
    app::{
        driver::{MeasurementDriver, RunSummary},
        monitor::LiveMonitor,
        session::Runner,
    },
    keygen::{generate_key_with, PositionList},
    power::{Level, PowerSwitch, RecordingPowerLine},
    protocol::Marker,
    serial::fake::{FakeSerialEntry, FakeSerialPort},
    Error, KeyExtractionError,
};
use std::time::Duration;
use tempfile::tempdir;

fn completed(payload: &[u8]) -> FakeSerialEntry {
    FakeSerialEntry::immediate(
        [
            &Marker::Start.bytes()[..],
            payload,
            &Marker::End.bytes()[..],
            &Marker::Finished.bytes()[..],
        ]
        .concat(),
    )
}

fn panicked(payload: &[u8]) -> FakeSerialEntry {
    FakeSerialEntry::immediate(
        [&Marker::Start.bytes()[..], payload, &Marker::Panic.bytes()[..]].concat(),
    )
}

fn driver(
    script: Vec<FakeSerialEntry>,
    max_measures: u32,
    prefix: String,
) -> (MeasurementDriver<FakeSerialPort, RecordingPowerLine>, RecordingPowerLine) {
    let line = RecordingPowerLine::default();
    let runner = Runner::new(
        FakeSerialPort::with_script(script),
        Vec::new(),
        max_measures,
        Duration::from_millis(1),
    )
    .with_monitor(LiveMonitor::silent());
    let driver = MeasurementDriver::new(
        runner,
        PowerSwitch::new(line.clone(), Level::High),
        Duration::from_millis(1),
        prefix,
    );
    (driver, line)
}

#[test]
fn run_stops_at_limit_and_retries_after_panic() {
    let dir = tempdir().unwrap();
    let prefix = format!("{}/m_", dir.path().display());
    let script = vec![
        completed(b"first"),
        panicked(b"broken"),
        completed(b"second"),
        completed(b"third"),
        completed(b"never read"),
    ];
    let (mut driver, line) = driver(script, 3, prefix.clone());

    let summary = driver.run_forever().unwrap();
    assert_eq!(
        summary,
        RunSummary {
            completed: 3,
            power_cycles: 4,
            panics: 1,
        }
    );
    assert_eq!(driver.runner().measurement_count(), 3);
    assert_eq!(driver.runner().link().remaining(), 1);
    assert_eq!(line.off_count(Level::High), 4);
    assert_eq!(line.levels().len(), 8);

    // The panicked attempt reused index 1, so its file was overwritten.
    assert_eq!(std::fs::read(format!("{prefix}0.bin")).unwrap(), b"first");
    assert_eq!(std::fs::read(format!("{prefix}1.bin")).unwrap(), b"second");
    assert_eq!(std::fs::read(format!("{prefix}2.bin")).unwrap(), b"third");
    assert!(!dir.path().join("m_3.bin").exists());
}

#[test]
fn finished_without_capture_leaves_empty_file_and_continues() {
    let dir = tempdir().unwrap();
    let prefix = format!("{}/m_", dir.path().display());
    let script = vec![
        FakeSerialEntry::immediate(Marker::Finished.bytes().to_vec()),
        completed(b"data"),
    ];
    let (mut driver, _line) = driver(script, 1, prefix.clone());

    let summary = driver.run_forever().unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.power_cycles, 2);
    assert_eq!(summary.panics, 0);
    assert_eq!(std::fs::read(format!("{prefix}0.bin")).unwrap(), b"data");
}

#[test]
fn run_surfaces_link_errors() {
    let dir = tempdir().unwrap();
    let prefix = format!("{}/m_", dir.path().display());
    let (mut driver, _line) = driver(vec![completed(b"ok")], 0, prefix);
    let err = driver.run_forever().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn capture_once_retries_until_complete() {
    let script = vec![panicked(b"x"), panicked(b"y"), completed(b"HDR,\xa5")];
    let (mut driver, line) = driver(script, 0, "unused_".into());

    let raw = driver.capture_once().unwrap();
    assert_eq!(raw, b"HDR,\xa5");
    assert_eq!(line.off_count(Level::High), 3);
}

#[test]
fn key_generation_end_to_end() {
    let (mut driver, _line) = driver(vec![completed(b"HDR,\x80\x40")], 0, "unused_".into());
    let positions = PositionList::parse("0 1\n8 9\n").unwrap();
    let key = generate_key_with(&mut driver, &positions, 4).unwrap();
    assert_eq!(key, "1001");
}

#[test]
fn key_generation_rejects_bad_positions_before_capturing() {
    let (mut driver, line) = driver(vec![completed(b"HDR,\xff")], 0, "unused_".into());
    let positions = PositionList::parse("5 2").unwrap();
    let err = generate_key_with(&mut driver, &positions, 2).unwrap_err();
    assert!(matches!(
        err,
        Error::KeyExtraction(KeyExtractionError::NotAscending { previous: 5, offset: 2 })
    ));
    assert!(line.levels().is_empty());
}

#[test]
fn key_generation_reports_short_response() {
    let (mut driver, _line) = driver(vec![completed(b"HDR,\xff")], 0, "unused_".into());
    let positions = PositionList::parse("0 16").unwrap();
    let err = generate_key_with(&mut driver, &positions, 2).unwrap_err();
    assert!(matches!(
        err,
        Error::KeyExtraction(KeyExtractionError::OutOfRange { offset: 16, available: 8 })
    ));
}
