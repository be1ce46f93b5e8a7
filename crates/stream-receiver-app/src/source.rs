use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use h264_nal::{AvcDecoderConfig, START_CODE};
use stream_receiver::AccessUnit;

/// 90 kHz ticks per frame at the given rate.
pub fn ticks_per_frame(fps: u32) -> u32 {
    90_000 / fps.max(1)
}

/// Wall-clock spacing between frames, never shorter than a microsecond.
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_micros((1_000_000 / fps.max(1) as u64).max(1))
}

/// Synthetic H.264 elementary stream.
///
/// Emits an IDR every `gop` frames and skips the RTP sequence numbers of every
/// `loss_every`-th frame to simulate network loss. The RTP timestamp starts
/// just below the 32-bit wrap point.
pub struct SyntheticSource {
    frame: u64,
    gop: u64,
    loss_every: u64,
    seq: u16,
    rtp_timestamp: u32,
    ticks_per_frame: u32,
    packets_per_frame: u16,
}

impl SyntheticSource {
    pub fn new(fps: u32, gop: u64, loss_every: u64) -> Self {
        let ticks = ticks_per_frame(fps);
        SyntheticSource {
            frame: 0,
            gop: gop.max(1),
            loss_every,
            seq: 0xFFF0,
            rtp_timestamp: u32::MAX - ticks * 10,
            ticks_per_frame: ticks,
            packets_per_frame: 3,
        }
    }

    /// Out-of-band decoder configuration for this stream.
    pub fn decoder_config(&self) -> AvcDecoderConfig {
        AvcDecoderConfig {
            profile: 0x42,
            level: 0x1F,
            sps: vec![Bytes::from_static(&[0x67, 0x42, 0x00, 0x1F, 0x96, 0x54])],
            pps: vec![Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80])],
            nalu_length_size: 4,
        }
    }

    /// Next access unit and the sender wall clock for it, in microseconds.
    pub fn next_au(&mut self, ntp_base_us: u64) -> AccessUnit {
        let index = self.frame;
        self.frame += 1;

        let is_idr = index % self.gop == 0;
        if self.loss_every > 0 && index > 0 && index % self.loss_every == 0 {
            // the previous frame's packets never arrived
            self.seq = self.seq.wrapping_add(self.packets_per_frame);
        }

        let first = self.seq;
        let last = first.wrapping_add(self.packets_per_frame - 1);
        self.seq = last.wrapping_add(1);

        let ts = self.rtp_timestamp;
        self.rtp_timestamp = self.rtp_timestamp.wrapping_add(self.ticks_per_frame);

        let ntp = ntp_base_us + index * self.ticks_per_frame as u64 * 1_000_000 / 90_000;
        AccessUnit::from_annexb(self.payload(index, is_idr), ts)
            .with_seq_range(first, last)
            .with_ntp(ntp)
    }

    fn payload(&self, index: u64, is_idr: bool) -> Bytes {
        let mut out = BytesMut::with_capacity(64);
        out.put_slice(&START_CODE);
        out.put_slice(&[0x09, 0xF0]); // access unit delimiter
        out.put_slice(&START_CODE);
        out.put_u8(if is_idr { 0x65 } else { 0x41 });
        // frame counter in 7-bit groups with the top bit set, so it never
        // contains a zero byte and cannot form a start code
        for shift in (0..10).rev() {
            out.put_u8(0x80 | ((index >> (shift * 7)) & 0x7F) as u8);
        }
        out.put_bytes(0xA5, if is_idr { 48 } else { 16 });
        out.freeze()
    }
}
