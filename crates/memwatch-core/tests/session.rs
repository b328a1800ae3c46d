//! End-to-end tests of a session backed by a temporary file standing in for
//! the memory device.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use memwatch_core::config::{DeviceAccess, WatchConfig};
use memwatch_core::fault::FaultKind;
use memwatch_core::mapper::page_size;
use memwatch_core::report::ChangeReporter;
use memwatch_core::types::{AccessWidth, Address};
use memwatch_core::{Session, WatchError};
use tempfile::NamedTempFile;

fn fake_device(pages: usize) -> NamedTempFile
{
    let page = page_size().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&vec![0u8; pages * page]).unwrap();
    file.flush().unwrap();
    file
}

fn open(path: &Path, access: DeviceAccess) -> Session
{
    let config = WatchConfig {
        run_priority: None,
        ..WatchConfig::with_device(path)
    };
    Session::open(config, access).unwrap()
}

#[test]
fn test_missing_device_is_an_open_error()
{
    let err = Session::open(WatchConfig::with_device("/nonexistent/memwatch"), DeviceAccess::ReadOnly).unwrap_err();
    assert!(matches!(err, WatchError::DeviceOpen { .. }));
}

#[test]
fn test_repeated_peeks_reuse_the_mapping()
{
    let device = fake_device(2);
    let mut session = open(device.path(), DeviceAccess::ReadOnly);

    for _ in 0..16 {
        session.peek(Address::new(0x80), AccessWidth::Quad).unwrap();
    }
    assert_eq!(session.mapper().map_calls(), 1);
}

#[test]
fn test_write_read_round_trip_per_width()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadWrite);

    let cases = [
        (AccessWidth::Byte, Address::new(0x11), 0x5a),
        (AccessWidth::Word, Address::new(0x22), 0xbeef),
        (AccessWidth::Long, Address::new(0x44), 0xdead_beef),
        (AccessWidth::Quad, Address::new(0x88), 0x0123_4567_89ab_cdef),
    ];
    for (width, address, value) in cases {
        session.poke(address, width, value).unwrap();
        assert_eq!(session.peek(address, width).unwrap(), value, "{width} at {address}");
    }
}

#[test]
fn test_writes_reach_the_device()
{
    let device = fake_device(1);
    {
        let mut session = open(device.path(), DeviceAccess::ReadWrite);
        session.poke(Address::new(4), AccessWidth::Long, 0x0403_0201).unwrap();
    }
    let bytes = std::fs::read(device.path()).unwrap();
    assert_eq!(u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 0x0403_0201);
}

#[test]
fn test_write_through_read_only_session_is_contained()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadOnly);

    let err = session.poke(Address::new(0), AccessWidth::Byte, 1).unwrap_err();
    assert!(matches!(
        err,
        WatchError::Fault {
            kind: FaultKind::Segmentation,
            ..
        }
    ));
    assert_eq!(session.peek(Address::new(0), AccessWidth::Byte).unwrap(), 0);
}

#[test]
fn test_timed_constant_value_reports_nothing_under_a_huge_threshold()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadOnly);

    let samples = session
        .sample_timed(Address::new(0x40), AccessWidth::Long, Duration::from_micros(200))
        .unwrap();
    assert!(!samples.is_empty());
    assert_eq!(samples.len() % 8, 0);
    assert!(samples.windows(2).all(|pair| pair[0].time <= pair[1].time));

    let reporter = ChangeReporter::new(AccessWidth::Long, u64::MAX, i64::MAX);
    let mut out = Vec::new();
    assert_eq!(reporter.write_timed(&mut out, &samples).unwrap(), 0);
    assert!(out.is_empty());
}

#[test]
fn test_burst_of_sixteen()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadWrite);
    session.poke(Address::new(0x10), AccessWidth::Word, 0x1234).unwrap();

    let burst = session.sample_burst(Address::new(0x10), AccessWidth::Word, 16).unwrap();
    assert_eq!(burst.values.len(), 16);
    assert!(burst.values.iter().all(|value| *value == 0x1234));
    assert!(burst.end > burst.start);
}

#[test]
fn test_burst_count_rounds_up_and_rejects_zero()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadOnly);

    let burst = session.sample_burst(Address::new(0), AccessWidth::Byte, 9).unwrap();
    assert_eq!(burst.values.len(), 16);

    let err = session.sample_burst(Address::new(0), AccessWidth::Byte, 0).unwrap_err();
    assert!(matches!(err, WatchError::InvalidArgument(_)));
}

#[test]
fn test_sampling_past_the_device_faults()
{
    let device = fake_device(1);
    let mut session = open(device.path(), DeviceAccess::ReadOnly);
    let beyond = Address::new(8 * page_size().unwrap() as u64);

    let err = session.sample_burst(beyond, AccessWidth::Long, 8).unwrap_err();
    assert!(matches!(err, WatchError::Fault { kind: FaultKind::Bus, address } if address == beyond));
    assert_eq!(err.to_string(), format!("Bus error at {beyond}"));

    let err = session.sample_timed(beyond, AccessWidth::Long, Duration::from_micros(50)).unwrap_err();
    assert!(matches!(err, WatchError::Fault { .. }));
}

#[test]
fn test_unmappable_device_uses_positioned_io()
{
    let path = Path::new("/proc/self/cmdline");
    let expected = std::fs::read(path).unwrap();
    let mut session = open(path, DeviceAccess::ReadOnly);

    let values = session.peek_many(Address::new(0), AccessWidth::Byte, 1, 4.min(expected.len())).unwrap();
    let expected: Vec<u64> = expected.iter().take(values.len()).map(|byte| u64::from(*byte)).collect();
    assert_eq!(values, expected);

    let burst = session.sample_burst(Address::new(0), AccessWidth::Byte, 8).unwrap();
    assert!(burst.values.iter().all(|value| *value == expected[0]));
    assert!(session.mapper().is_unsupported());
}
