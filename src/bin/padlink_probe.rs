// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Command-line probe for the driver channel.
//
// Usage:
//   padlink_probe [--simulate] ping
//   padlink_probe [--simulate] pair <device> <host-address>
//   padlink_probe [--simulate] player <device> <1..7>
//   padlink_probe [--simulate] watch <device> <count>
//
// `--simulate` runs against an in-process simulated driver instead of the
// installed one. Set RUST_LOG=padlink=trace to see every exchange.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use padlink::platform::memory::MemoryBackend;
use padlink::{
    Connection, DeviceIndex, HostAddress, InteropConfig, PacketCounter, RawInputReport,
    SimulatedDriver,
};
use tracing_subscriber::EnvFilter;

const WATCH_TIMEOUT: Duration = Duration::from_millis(100);

fn usage() -> ! {
    eprintln!("usage: padlink_probe [--simulate] ping");
    eprintln!("       padlink_probe [--simulate] pair <device> <host-address>");
    eprintln!("       padlink_probe [--simulate] player <device> <1..7>");
    eprintln!("       padlink_probe [--simulate] watch <device> <count>");
    std::process::exit(1);
}

fn run(conn: &Connection, args: &[String]) -> padlink::Result<()> {
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_else(|| usage());
    match arg(0) {
        "ping" => {
            conn.ping()?;
            println!("driver answered ping");
        }
        "pair" => {
            let device: u32 = arg(1).parse().unwrap_or_else(|_| usage());
            let address: HostAddress = arg(2).parse().unwrap_or_else(|_| usage());
            let result = conn.set_host_address(device, address)?;
            println!(
                "pair {device} -> {address}: write {}, read {}",
                result.write_status, result.read_status
            );
        }
        "player" => {
            let device: u32 = arg(1).parse().unwrap_or_else(|_| usage());
            let player: u8 = arg(2).parse().unwrap_or_else(|_| usage());
            let status = conn.set_player_index(device, player)?;
            println!("player {device} -> {player}: {status}");
        }
        "watch" => {
            let device: u32 = arg(1).parse().unwrap_or_else(|_| usage());
            let count: usize = arg(2).parse().unwrap_or_else(|_| usage());
            let index = DeviceIndex::new(device)?;
            let mut packets = PacketCounter::new();
            for _ in 0..count {
                match conn.get_raw_input_report(device, Some(WATCH_TIMEOUT))? {
                    Some(report) => {
                        let n = packets.observe(index, &report);
                        println!(
                            "#{n:<5} buttons {:?} L {:?} R {:?} battery {:?}",
                            report.buttons(),
                            report.left_thumb(),
                            report.right_thumb(),
                            report.battery()
                        );
                    }
                    None => {
                        packets.reset(index);
                        println!("device {device} disconnected");
                    }
                }
            }
        }
        _ => usage(),
    }
    Ok(())
}

/// Feeds the simulated driver a slowly drifting left stick.
fn spawn_feeder(
    driver: Arc<SimulatedDriver>,
    device: u32,
    quit: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut raw = RawInputReport::default().0;
        raw[0] = 0x01;
        let mut x = 0u8;
        while !quit.load(Ordering::Acquire) {
            raw[6] = x;
            raw[7] = 0x80;
            raw[30] = 0x05;
            if driver.publish_input_report(device, &RawInputReport(raw)).is_err() {
                return;
            }
            x = x.wrapping_add(8);
            thread::sleep(Duration::from_millis(5));
        }
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let simulate = args.first().is_some_and(|a| a == "--simulate");
    if simulate {
        args.remove(0);
    }
    if args.is_empty() {
        usage();
    }

    let result = if simulate {
        let backend = MemoryBackend::new();
        let config = InteropConfig::with_prefix("Local\\padlink_probe_");
        let driver = match SimulatedDriver::install(&backend, config.clone()) {
            Ok(driver) => Arc::new(driver),
            Err(e) => {
                eprintln!("error: cannot start simulated driver: {e}");
                std::process::exit(1);
            }
        };
        let quit = Arc::new(AtomicBool::new(false));
        let feeder = match (args[0].as_str(), args.get(1).and_then(|d| d.parse().ok())) {
            ("watch", Some(device)) => {
                Some(spawn_feeder(Arc::clone(&driver), device, Arc::clone(&quit)))
            }
            _ => None,
        };
        let result = Connection::open_with(&backend, config).and_then(|conn| run(&conn, &args));
        quit.store(true, Ordering::Release);
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        result
    } else {
        if !Connection::probe() {
            eprintln!("driver not present");
            std::process::exit(2);
        }
        Connection::open().and_then(|conn| run(&conn, &args))
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
