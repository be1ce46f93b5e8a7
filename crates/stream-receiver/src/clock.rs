use std::time::Instant;

use tracing::trace;

/// Timestamps attached to one delivered access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSample {
    /// RTP timestamp extended past 32-bit wraparound, in stream clock ticks.
    pub rtp_extended_timestamp: u64,
    /// Sender wall clock at capture, in microseconds. 0 when unknown.
    pub ntp_timestamp: u64,
    /// Receiver monotonic clock when the AU became ready, in microseconds.
    pub local_timestamp: u64,
}

/// Source of the receiver-local monotonic timestamp.
pub trait LocalClock: Send {
    /// Current time in microseconds.
    fn now_us(&self) -> u64;
}

/// Microseconds elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Extends 32-bit RTP timestamps into a 64-bit monotonic timeline.
///
/// A raw value is interpreted relative to the last committed one as a signed
/// 32-bit delta, so a regression of more than half the wrap range reads as a
/// forward step into the next wrap epoch.
#[derive(Debug, Clone, Default)]
pub struct RtpTimestampExtender {
    last: Option<(u32, u64)>,
}

impl RtpTimestampExtender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extended value for `raw`, without committing it.
    pub fn extend(&self, raw: u32) -> u64 {
        match self.last {
            None => raw as u64,
            Some((last_raw, last_ext)) => {
                let delta = raw.wrapping_sub(last_raw) as i32 as i64;
                last_ext.saturating_add_signed(delta)
            }
        }
    }

    /// Make `raw`/`ext` the reference for later values.
    pub fn commit(&mut self, raw: u32, ext: u64) {
        if let Some((_, last_ext)) = self.last {
            if ext >> 32 != last_ext >> 32 {
                trace!(raw, ext, "RTP timestamp entered new wrap epoch");
            }
        }
        self.last = Some((raw, ext));
    }

    pub fn last_extended(&self) -> Option<u64> {
        self.last.map(|(_, ext)| ext)
    }
}

/// NTP/RTP correspondence taken from an RTCP sender report.
///
/// The report keeps its raw RTP timestamp. An AU timestamp is placed relative
/// to it as a signed 32-bit delta, so the mapping holds across the wrap no
/// matter which side of it the report landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReportMapping {
    pub ntp_us: u64,
    pub rtp_timestamp: u32,
}

impl SenderReportMapping {
    /// Sender wall clock for a raw RTP timestamp, in microseconds.
    pub fn ntp_for(&self, rtp_timestamp: u32, clock_rate: u32) -> u64 {
        if clock_rate == 0 {
            return 0;
        }
        let rate = clock_rate as i128;
        let ticks = rtp_timestamp.wrapping_sub(self.rtp_timestamp) as i32 as i128;
        let delta_us = (ticks * 1_000_000 + rate / 2).div_euclid(rate);
        (self.ntp_us as i128 + delta_us).clamp(0, u64::MAX as i128) as u64
    }
}
