mod common;

use helios::{
    error::ErrorClass,
    protocol::Command,
    session::{CameraSession, SessionState},
    DeviceError,
};

use common::*;

fn session(attempts: u32) -> (MockChannel, MockDevice, CameraSession<MockChannel, MockDevice>) {
    let channel = MockChannel::new();
    let device = MockDevice::new();
    let session = CameraSession::new(channel.clone(), device.clone(), timing(attempts));
    (channel, device, session)
}

#[test]
fn open_runs_full_sequence_before_ready() {
    let (channel, device, mut session) = session(3);
    assert_eq!(session.state(), SessionState::Closed);

    session.open().unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.initializations(), 1);
    // init sequence, then the silent NUC + discarded frame
    let mut expected = INIT_COMMANDS.to_vec();
    expected.push(Command::ManualNuc);
    assert_eq!(channel.sent(), expected);
    assert_eq!(device.log.borrow().opens, 1);
    assert_eq!(device.log.borrow().reads, 1);
}

#[test]
fn capture_on_closed_session_initializes_first() {
    let (channel, _device, mut session) = session(3);

    let frame = session.capture().unwrap();

    assert_eq!(frame, test_frame());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(&channel.sent()[..3], &INIT_COMMANDS);
    assert_eq!(channel.count(Command::ManualNuc), 2);
}

#[test]
fn read_failures_are_retried_without_another_nuc() {
    let (channel, device, mut session) = session(5);
    session.open().unwrap();
    let nucs = channel.count(Command::ManualNuc);
    let reads = device.log.borrow().reads;

    device.fail_next_reads(4);
    let frame = session.capture().unwrap();

    assert_eq!(frame, test_frame());
    assert_eq!(channel.count(Command::ManualNuc), nucs + 1);
    assert_eq!(device.log.borrow().reads, reads + 5);
    assert_eq!(session.initializations(), 1);
}

#[test]
fn exhausted_retries_fail_the_capture() {
    let (_channel, device, mut session) = session(5);
    session.open().unwrap();

    device.fail_next_reads(5);
    let err = session.capture().unwrap_err();

    match DeviceError::find(&err) {
        Some(e @ DeviceError::CaptureExhausted { attempts: 5, .. }) => {
            assert_eq!(e.class(), ErrorClass::FatalPerRun)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(device.log.borrow().releases, 1);
}

#[test]
fn capture_after_failed_capture_reinitializes() {
    let (channel, device, mut session) = session(3);
    session.open().unwrap();
    device.fail_next_reads(3);
    assert!(session.capture().is_err());

    let frame = session.capture().unwrap();

    assert_eq!(frame, test_frame());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.initializations(), 2);
    assert_eq!(channel.count(Command::SelectY16), 2);
    let log = device.log.borrow();
    assert_eq!(log.opens, 2);
    assert_eq!(log.reads_while_released, 0);
}

#[test]
fn unplug_during_capture_reopens_and_repeats() {
    let (channel, device, mut session) = session(10);
    session.open().unwrap();
    device.unplug_on_reads(&[2]);

    let frame = session.capture().unwrap();

    assert_eq!(frame, test_frame());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.initializations(), 2);
    // initial NUC, the interrupted capture, the reopen and the
    // repeated capture
    assert_eq!(channel.count(Command::ManualNuc), 4);
    let log = device.log.borrow();
    assert_eq!(log.reads, 4);
    assert_eq!(log.opens, 2);
    assert_eq!(log.releases, 1);
    assert_eq!(log.reads_while_released, 0);
}

#[test]
fn repeated_unplug_is_a_transient_failure() {
    let (_channel, device, mut session) = session(10);
    session.open().unwrap();
    device.unplug_on_reads(&[2, 4]);

    let err = session.capture().unwrap_err();

    assert_eq!(
        DeviceError::classify(&err),
        Some(ErrorClass::RecoverableTransient)
    );
    assert_eq!(session.state(), SessionState::Closed);
    let log = device.log.borrow();
    assert_eq!(log.reads, 4);
    assert_eq!(log.opens, log.releases);
}

#[test]
fn unplugged_camera_is_reinitialized() {
    let (channel, device, mut session) = session(3);
    session.open().unwrap();

    device.log.borrow_mut().unplugged = true;
    assert!(!session.is_ready());
    session.capture().unwrap();

    assert_eq!(session.initializations(), 2);
    assert_eq!(channel.count(Command::DisableAutoNuc), 2);
    assert_eq!(channel.count(Command::SetHighGain), 2);
    let log = device.log.borrow();
    assert_eq!(log.opens, 2);
    assert_eq!(log.releases, 1);
    assert_eq!(log.reads_while_released, 0);
}

#[test]
fn unopenable_video_leaves_session_closed() {
    let (channel, device, mut session) = session(3);
    device.log.borrow_mut().refuse_open = true;

    let err = session.capture().unwrap_err();

    assert!(matches!(
        DeviceError::find(&err),
        Some(DeviceError::VideoUnavailable { .. })
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(channel.count(Command::ManualNuc), 0);
}

#[test]
fn failed_initial_capture_releases_the_source() {
    let (_channel, device, mut session) = session(2);
    device.fail_next_reads(2);

    assert!(session.open().is_err());

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.initializations(), 0);
    let log = device.log.borrow();
    assert_eq!(log.opens, 1);
    assert_eq!(log.releases, 1);
}

#[test]
fn close_restores_auto_nuc_and_releases_video() {
    let (channel, device, mut session) = session(3);
    session.open().unwrap();

    let _channel = session.close();

    assert_eq!(channel.sent().last(), Some(&Command::EnableAutoNuc));
    assert_eq!(device.log.borrow().releases, 1);
    assert_eq!(channel.closes(), 0);
}

#[test]
fn close_survives_failed_auto_nuc_restore() {
    let (channel, device, mut session) = session(3);
    session.open().unwrap();
    channel.log.borrow_mut().failing.push(Command::EnableAutoNuc);

    let _channel = session.close();

    assert_eq!(channel.count(Command::EnableAutoNuc), 1);
    assert_eq!(device.log.borrow().releases, 1);
}
