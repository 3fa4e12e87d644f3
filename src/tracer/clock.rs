//! Host clock and CPU/GPU clock reconciliation
//!
//! Device activity records carry timestamps from the runtime's clock; host
//! events use ours. The reconciler measures a signed offset such that
//! `host_ns ≈ device_ns + skew`, by sandwiching each device timestamp
//! between two host timestamps and averaging over a fixed number of rounds.

use std::sync::atomic::{fence, Ordering};

use crate::backend::roctracer::RoctracerResult;

/// Rounds averaged by the reconciler
const SKEW_ITERATIONS: i64 = 10;

/// Host wall-clock timestamp in nanoseconds
#[cfg(unix)]
pub fn host_clock_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // The runtime's timestamp clock ticks in the monotonic domain; only
    // differences of this value are ever consumed.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(not(unix))]
pub fn host_clock_ns() -> u64 {
    use once_cell::sync::Lazy;
    use std::time::Instant;
    static ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);
    ANCHOR.elapsed().as_nanos() as u64
}

/// Measure the host-minus-device clock offset in nanoseconds
///
/// One warm-up sample pair is discarded, then each of the N rounds takes
/// host, device, host timestamps (fenced so the reads are not reordered) and
/// contributes `avg(host_pair) - device`. Returns `None` if any device
/// timestamp query fails; the caller maps that to "skew = 0, tracing
/// continues".
pub fn measure_skew_ns<H, D>(mut host_now: H, mut device_now: D) -> Option<i64>
where
    H: FnMut() -> u64,
    D: FnMut() -> RoctracerResult<u64>,
{
    // warm up caches and any lazy initialization in either clock path
    let _ = host_now();
    if device_now().is_err() {
        return None;
    }

    let mut host_avg: i64 = 0;
    let mut device_avg: i64 = 0;
    let mut diff: i64 = 0;
    for _ in 0..SKEW_ITERATIONS {
        fence(Ordering::SeqCst);
        let host_before = host_now();
        fence(Ordering::SeqCst);
        let device = match device_now() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!("device timestamp query failed mid-measurement: {err}");
                return None;
            }
        };
        fence(Ordering::SeqCst);
        let host_after = host_now();

        let host = (host_before / 2 + host_after / 2) as i64;
        diff += host - device as i64;
        host_avg += host / SKEW_ITERATIONS;
        device_avg += (device as i64) / SKEW_ITERATIONS;
    }

    let skew = diff / SKEW_ITERATIONS;
    tracing::debug!(
        host_avg,
        device_avg,
        skew,
        "CPU/GPU timestamp reconciliation"
    );
    Some(skew)
}

/// Apply a signed skew to a device timestamp, clamping below zero
pub fn apply_skew(device_ns: u64, skew: i64) -> u64 {
    let shifted = device_ns as i64 + skew;
    shifted.max(0) as u64
}
