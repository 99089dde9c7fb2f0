// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed command operations and their argument validation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use padlink::platform::memory::MemoryBackend;
use padlink::wire::DeviceCommand;
use padlink::{
    Connection, DeviceIndex, HostAddress, InteropConfig, InteropError, NtStatus, SimulatedDriver,
};
use proptest::prelude::*;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn setup(prefix: &str) -> (MemoryBackend, SimulatedDriver, Connection) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let config = InteropConfig::with_prefix(&format!("Local\\{prefix}_cmd_{n}_"));
    let backend = MemoryBackend::new();
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
    let conn = Connection::open_with(&backend, config).expect("open");
    (backend, driver, conn)
}

fn dev(i: u32) -> DeviceIndex {
    DeviceIndex::new(i).expect("device index")
}

#[test]
fn player_index_bounds() {
    let (_backend, driver, conn) = setup("player_bounds");

    for bad in [0u8, 8, 255] {
        let err = conn.set_player_index(1, bad).unwrap_err();
        assert!(matches!(err, InteropError::PlayerIndexOutOfRange(v) if v == bad), "got {err:?}");
    }
    assert_eq!(driver.mutex().lock_attempts(), 0);
    assert_eq!(driver.request_count(), 0);

    assert_eq!(conn.set_player_index(1, 1).expect("player 1"), NtStatus::SUCCESS);
    assert_eq!(driver.player_index(dev(1)), Some(1));
    assert_eq!(conn.set_player_index(1, 7).expect("player 7"), NtStatus::SUCCESS);
    assert_eq!(driver.player_index(dev(1)), Some(7));

    let payloads: Vec<_> = driver.requests().into_iter().map(|r| r.payload).collect();
    assert_eq!(payloads, vec![vec![1], vec![7]]);
}

#[test]
fn device_index_checked_before_player_index() {
    let (_backend, _driver, conn) = setup("check_order");
    let err = conn.set_player_index(0, 9).unwrap_err();
    assert!(matches!(err, InteropError::InvalidDeviceIndex(0)), "got {err:?}");
}

#[test]
fn player_status_is_passed_through() {
    let (_backend, driver, conn) = setup("player_status");
    driver.set_player_status(NtStatus(0xC000_0010));
    let status = conn.set_player_index(3, 2).expect("player");
    assert_eq!(status, NtStatus(0xC000_0010));
    assert!(!status.is_success());
}

#[test]
fn set_host_address_forwards_octets() {
    let (_backend, driver, conn) = setup("pair");
    let address: HostAddress = "AA:BB:CC:DD:EE:FF".parse().expect("address");

    let result = conn.set_host_address(2, address).expect("pair");
    assert!(result.write_status.is_success());
    assert!(result.read_status.is_success());
    assert_eq!(driver.host_address(dev(2)), Some(address));

    let req = &driver.requests()[0];
    assert_eq!(req.header.command, DeviceCommand::PairTo as u32);
    assert_eq!(req.header.target_index, 2);
    assert_eq!(req.header.size, 26);
    assert_eq!(req.payload, vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
}

#[test]
fn clearing_host_address_sends_zeros() {
    let (_backend, driver, conn) = setup("unpair");
    conn.set_host_address(5, HostAddress::CLEARED).expect("unpair");
    assert_eq!(driver.host_address(dev(5)), Some(HostAddress::CLEARED));
    assert_eq!(driver.requests()[0].payload, vec![0; 6]);
}

#[test]
fn pair_statuses_are_passed_through() {
    let (_backend, driver, conn) = setup("pair_status");
    driver.set_pair_status(NtStatus(0xC000_0001), NtStatus(0x0000_0103));
    let result = conn.set_host_address(1, HostAddress([1, 2, 3, 4, 5, 6])).expect("pair");
    assert_eq!(result.write_status, NtStatus(0xC000_0001));
    assert_eq!(result.read_status, NtStatus(0x0000_0103));
}

fn invalid_device_index() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), 256u32..=u32::MAX]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Out-of-range indices fail before the mutex or the regions are touched.
    #[test]
    fn prop_invalid_device_index_touches_nothing(index in invalid_device_index()) {
        let (_backend, driver, conn) = setup("prop_invalid");

        let errors = [
            conn.set_host_address(index, HostAddress::CLEARED).map(|_| ()).unwrap_err(),
            conn.set_player_index(index, 1).map(|_| ()).unwrap_err(),
            conn.get_wait_handle(index).map(|_| ()).unwrap_err(),
            conn.get_raw_input_report(index, None).map(|_| ()).unwrap_err(),
            conn.get_raw_input_report(index, Some(Duration::from_millis(1)))
                .map(|_| ())
                .unwrap_err(),
        ];
        for err in errors {
            prop_assert!(
                matches!(err, InteropError::InvalidDeviceIndex(i) if i == index),
                "index {} gave {:?}", index, err
            );
        }

        prop_assert_eq!(driver.mutex().lock_attempts(), 0);
        prop_assert_eq!(driver.mapping().accesses(), 0);
        prop_assert_eq!(driver.request_count(), 0);
    }
}
