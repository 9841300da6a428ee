//! Integration tests for the acquisition session lifecycle
//!
//! All tests run against the mock driver; no hardware is required.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mccdaq::hardware::mock::{MockBoardSpec, MockDriver, Waveform};
use mccdaq::{AcquisitionSession, DaqConfig, DaqError, SessionState};

fn two_channels() -> BTreeMap<u32, String> {
    BTreeMap::from([(0, "ch0".to_string()), (1, "ch1".to_string())])
}

fn session_on(driver: &MockDriver, interval: Duration) -> AcquisitionSession {
    AcquisitionSession::new(0, two_channels(), Arc::new(driver.clone()), interval).unwrap()
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_construct_valid_maps() {
    let maps = [
        BTreeMap::from([(0, "a".to_string())]),
        two_channels(),
        BTreeMap::from([(7, "probe".to_string()), (2, "coil".to_string())]),
    ];
    for channels in maps {
        let session = AcquisitionSession::new(
            3,
            channels.clone(),
            Arc::new(MockDriver::default()),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.snapshot().is_empty());
        assert_eq!(session.channels(), &channels);
        assert_eq!(session.board_id(), 3);
    }
}

#[test]
fn test_construct_invalid_maps() {
    let driver = Arc::new(MockDriver::default());
    let duplicate = BTreeMap::from([(0, "x".to_string()), (1, "x".to_string())]);
    for channels in [BTreeMap::new(), duplicate] {
        let result =
            AcquisitionSession::new(0, channels, driver.clone(), Duration::from_millis(10));
        assert!(matches!(result, Err(DaqError::InvalidChannelMap(_))));
    }
}

// =============================================================================
// State machine
// =============================================================================

#[test]
fn test_double_start_is_rejected() {
    let driver = MockDriver::default();
    let mut session = session_on(&driver, Duration::from_millis(5));
    session.start().unwrap();
    thread::sleep(Duration::from_millis(30));

    let err = session.start().unwrap_err();
    assert!(matches!(
        err,
        DaqError::InvalidState {
            operation: "start",
            state: SessionState::Running
        }
    ));
    assert_eq!(err.to_string(), "Cannot start while session is Running");
    assert_eq!(session.state(), SessionState::Running);
    // The rejected call neither cleared the buffer nor opened the board again.
    assert!(!session.snapshot().is_empty());
    assert_eq!(driver.opens(), 1);

    session.stop().unwrap();
}

#[test]
fn test_stop_before_start_is_rejected() {
    let mut session = session_on(&MockDriver::default(), Duration::from_millis(5));
    assert!(matches!(
        session.stop(),
        Err(DaqError::InvalidState {
            operation: "stop",
            state: SessionState::Idle
        })
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_stop_twice_is_rejected() {
    let mut session = session_on(&MockDriver::default(), Duration::from_millis(5));
    session.start().unwrap();
    session.stop().unwrap();
    assert!(matches!(
        session.stop(),
        Err(DaqError::InvalidState {
            state: SessionState::Stopped,
            ..
        })
    ));
}

// =============================================================================
// Sampling
// =============================================================================

#[test]
fn test_one_second_acquisition() {
    let driver = MockDriver::default();
    let mut session = session_on(&driver, Duration::from_millis(10));

    session.start().unwrap();
    thread::sleep(Duration::from_secs(1));
    session.stop().unwrap();

    let table = session.snapshot();
    assert!(!table.is_empty());
    assert_eq!(table.columns(), ["ch0", "ch1"]);
    assert_eq!(session.state(), SessionState::Stopped);

    let times = table.times_secs();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert!(times.iter().all(|&t| (0.0..=1.0).contains(&t)));
    assert!(table.rows().iter().all(|r| r.values.len() == 2));
}

#[test]
fn test_rows_follow_channel_order() {
    let driver = MockDriver::builder()
        .board(MockBoardSpec::new(0, "sim", 4))
        .waveform(Waveform::constant(2.5))
        .build();
    let channels = BTreeMap::from([(3, "last".to_string()), (1, "first".to_string())]);
    let mut session =
        AcquisitionSession::new(0, channels, Arc::new(driver), Duration::from_millis(5)).unwrap();

    session.start().unwrap();
    thread::sleep(Duration::from_millis(40));
    session.stop().unwrap();

    let table = session.snapshot();
    assert_eq!(table.columns(), ["first", "last"]);
    assert!(table.column("last").unwrap().iter().all(|&v| v == 2.5));
}

#[test]
fn test_snapshot_is_idempotent_after_stop() {
    let mut session = session_on(&MockDriver::default(), Duration::from_millis(5));
    session.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    session.stop().unwrap();

    let first = session.snapshot();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(session.snapshot(), first);
    assert_eq!(session.snapshot(), first);
}

#[test]
fn test_snapshot_while_running_from_another_thread() {
    let mut session = session_on(&MockDriver::default(), Duration::from_millis(2));
    let reader = session.reader();
    session.start().unwrap();

    let watcher = thread::spawn(move || {
        let mut last = 0;
        for _ in 0..10 {
            let table = reader.snapshot();
            assert!(table.len() >= last);
            assert!(table.rows().iter().all(|r| r.values.len() == 2));
            last = table.len();
            thread::sleep(Duration::from_millis(5));
        }
        last
    });
    let seen = watcher.join().unwrap();
    session.stop().unwrap();

    assert!(seen > 0);
    assert!(session.snapshot().len() >= seen);
}

// =============================================================================
// Restart and resources
// =============================================================================

#[test]
fn test_restart_cycle() {
    let driver = MockDriver::default();
    let mut session = session_on(&driver, Duration::from_millis(5));

    session.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    session.stop().unwrap();
    let first_run = session.snapshot();
    assert!(!driver.is_open(0));

    session.start().unwrap();
    assert!(driver.is_open(0));
    thread::sleep(Duration::from_millis(30));
    session.stop().unwrap();

    assert_eq!(driver.opens(), 2);
    assert_eq!(driver.closes(), 2);
    assert!(!driver.is_open(0));

    // Restart clears the previous run; timestamps restart near zero.
    let second_run = session.snapshot();
    assert!(!second_run.is_empty());
    assert!(second_run.rows()[0].elapsed < first_run.rows()[first_run.len() - 1].elapsed);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_board_is_exclusive_between_sessions() {
    let driver = MockDriver::default();
    let mut first = session_on(&driver, Duration::from_millis(5));
    let mut second = session_on(&driver, Duration::from_millis(5));

    first.start().unwrap();
    assert!(matches!(
        second.start(),
        Err(DaqError::DeviceUnavailable { board_id: 0, .. })
    ));
    assert_eq!(second.state(), SessionState::Idle);

    first.stop().unwrap();
    second.start().unwrap();
    second.stop().unwrap();
}

#[test]
fn test_faulted_session_keeps_board() {
    let driver = MockDriver::builder()
        .board(MockBoardSpec::e1608(0))
        .fail_reads_after(4)
        .build();
    let mut first = session_on(&driver, Duration::from_millis(2));
    let mut second = session_on(&driver, Duration::from_millis(2));

    first.start().unwrap();
    thread::sleep(Duration::from_millis(40));
    assert!(first.fault().unwrap().contains("injected read failure"));
    assert_eq!(first.state(), SessionState::Running);

    assert!(matches!(
        second.start(),
        Err(DaqError::DeviceUnavailable { board_id: 0, .. })
    ));

    first.stop().unwrap();
    assert!(!driver.is_open(0));
    second.start().unwrap();
    second.stop().unwrap();
}

#[test]
fn test_close_error_surfaces_from_stop() {
    let driver = MockDriver::builder()
        .board(MockBoardSpec::e1608(0))
        .fail_close()
        .build();
    let mut session = session_on(&driver, Duration::from_millis(5));
    session.start().unwrap();
    thread::sleep(Duration::from_millis(20));

    let err = session.stop().unwrap_err();
    assert_eq!(err.to_string(), "Driver error: injected close failure on board 0");
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.fault(), None);
}

#[test]
fn test_missing_board() {
    let driver = MockDriver::builder().build();
    let mut session = session_on(&driver, Duration::from_millis(5));
    assert!(matches!(
        session.start(),
        Err(DaqError::DeviceUnavailable { .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_stop_returns_promptly_with_long_interval() {
    let mut session = session_on(&MockDriver::default(), Duration::from_secs(30));
    session.start().unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = std::time::Instant::now();
    session.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(session.snapshot().len(), 1);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_session_from_config_resolves_device_name() {
    let driver = MockDriver::builder()
        .board(MockBoardSpec::new(0, "USB-1208FS", 4))
        .board(MockBoardSpec::e1608(2))
        .build();
    let mut config = DaqConfig::new(0, 200.0).with_channel(0, "coil");
    config.board.device_name = Some("E-1608-394C95".to_string());

    let session = AcquisitionSession::from_config(&config, Arc::new(driver)).unwrap();
    assert_eq!(session.board_id(), 2);
    assert_eq!(session.sample_interval(), Duration::from_millis(5));
}

#[test]
fn test_session_from_config_unknown_device() {
    let mut config = DaqConfig::new(0, 200.0).with_channel(0, "coil");
    config.board.device_name = Some("E-1608-000000".to_string());
    let result = AcquisitionSession::from_config(&config, Arc::new(MockDriver::default()));
    assert!(matches!(result, Err(DaqError::DeviceNotFound(_))));
}
