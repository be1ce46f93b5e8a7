use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use h264_nal::{split_annexb, split_avcc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use stream_receiver::{
    AuSyncType, ClockSample, DecoderBuffer, ReceiverListener, SlotIndex, SlotReleaser,
};

/// One staged access unit handed to the decode task.
#[derive(Debug)]
pub struct ReadyAu {
    pub slot: SlotIndex,
    pub sample: ClockSample,
    pub sync: AuSyncType,
    pub buffer: DecoderBuffer,
}

type FreeList = Arc<Mutex<VecDeque<SlotIndex>>>;

/// Decoder-side listener: allocates the input buffers, keeps the free list
/// and forwards ready slots to the decode task.
pub struct LoopbackDecoder {
    pool_size: usize,
    buffer_capacity: usize,
    buffers: Vec<DecoderBuffer>,
    free: FreeList,
    ready_tx: mpsc::UnboundedSender<ReadyAu>,
}

impl LoopbackDecoder {
    /// `nalu_length_size` is set when the receiver stages length-prefixed
    /// NAL units instead of Annex-B.
    pub fn new(
        pool_size: usize,
        buffer_capacity: usize,
        nalu_length_size: Option<u8>,
    ) -> (Self, DecodeTask) {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let free: FreeList = Arc::default();
        let listener = LoopbackDecoder {
            pool_size,
            buffer_capacity,
            buffers: Vec::new(),
            free: Arc::clone(&free),
            ready_tx,
        };
        let task = DecodeTask {
            ready_rx,
            free,
            nalu_length_size,
        };
        (listener, task)
    }
}

impl ReceiverListener for LoopbackDecoder {
    fn on_codec_config_ready(&mut self, sps: &Bytes, pps: &Bytes) -> Vec<DecoderBuffer> {
        info!(
            sps_len = sps.len(),
            pps_len = pps.len(),
            pool_size = self.pool_size,
            "decoder configured"
        );
        self.buffers = (0..self.pool_size)
            .map(|_| DecoderBuffer::with_capacity(self.buffer_capacity))
            .collect();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.clear();
        free.extend((0..self.pool_size).map(SlotIndex::new));
        self.buffers.clone()
    }

    fn get_free_buffer(&mut self) -> Option<SlotIndex> {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn on_buffer_ready(&mut self, slot: SlotIndex, sample: ClockSample, sync: AuSyncType) {
        let Some(buffer) = self.buffers.get(slot.get()).cloned() else {
            warn!(%slot, "ready slot has no buffer");
            return;
        };
        let ready = ReadyAu {
            slot,
            sample,
            sync,
            buffer,
        };
        if self.ready_tx.send(ready).is_err() {
            debug!(%slot, "decode task gone, ready slot not forwarded");
        }
    }
}

/// Consumer context: "decodes" staged AUs and releases their slots.
pub struct DecodeTask {
    ready_rx: mpsc::UnboundedReceiver<ReadyAu>,
    free: FreeList,
    nalu_length_size: Option<u8>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeSummary {
    pub decoded: u64,
    pub nal_units: u64,
    pub sync_points: u64,
    pub after_loss: u64,
    pub bytes: u64,
}

impl DecodeTask {
    /// Run until the receiver side hangs up.
    pub async fn run(
        mut self,
        releaser: oneshot::Receiver<SlotReleaser>,
        decode_time: Duration,
    ) -> DecodeSummary {
        let mut summary = DecodeSummary::default();
        let Ok(releaser) = releaser.await else {
            warn!("receiver never configured, decode task exiting");
            return summary;
        };

        while let Some(au) = self.ready_rx.recv().await {
            if !decode_time.is_zero() {
                tokio::time::sleep(decode_time).await;
            }

            let (len, nal_units) = au
                .buffer
                .with_contents(|data| (data.len(), self.count_nal_units(data)));
            summary.decoded += 1;
            summary.nal_units += nal_units as u64;
            summary.bytes += len as u64;
            if au.sync.is_sync() {
                summary.sync_points += 1;
            }
            if au.sync.frame_lost() {
                summary.after_loss += 1;
            }
            trace!(
                slot = %au.slot,
                len,
                nal_units,
                rtp_ts = au.sample.rtp_extended_timestamp,
                ntp = au.sample.ntp_timestamp,
                local = au.sample.local_timestamp,
                sync = ?au.sync,
                "decoded access unit"
            );

            if let Err(e) = releaser.release(au.slot) {
                warn!(%e, "slot release rejected");
                continue;
            }
            self.free
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(au.slot);
        }

        summary
    }

    fn count_nal_units(&self, data: &[u8]) -> usize {
        match self.nalu_length_size {
            None => split_annexb(data).len(),
            Some(size) => match split_avcc(data, size) {
                Ok(units) => units.len(),
                Err(e) => {
                    warn!(%e, "malformed length-prefixed access unit");
                    0
                }
            },
        }
    }
}
