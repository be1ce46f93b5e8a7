use bytes::Bytes;

use crate::buffer::DecoderBuffer;
use crate::clock::ClockSample;
use crate::pool::SlotIndex;
use crate::sync::AuSyncType;

/// Decoder-side callbacks driven by a [`StreamReceiver`](crate::StreamReceiver).
pub trait ReceiverListener: Send {
    /// SPS/PPS are available. Initialize the decoder and return its input
    /// buffers; their order defines the slot indices. Called at most once.
    fn on_codec_config_ready(&mut self, sps: &Bytes, pps: &Bytes) -> Vec<DecoderBuffer>;

    /// Index of a free input buffer, or `None` if all are in use.
    fn get_free_buffer(&mut self) -> Option<SlotIndex>;

    /// An access unit has been staged in `slot`. The slot stays busy until
    /// the decoder side releases it.
    fn on_buffer_ready(&mut self, slot: SlotIndex, sample: ClockSample, sync: AuSyncType);
}

type ConfigReadyFn = Box<dyn FnMut(&Bytes, &Bytes) -> Vec<DecoderBuffer> + Send>;
type FreeBufferFn = Box<dyn FnMut() -> Option<SlotIndex> + Send>;
type BufferReadyFn = Box<dyn FnMut(SlotIndex, ClockSample, AuSyncType) + Send>;

/// Listener assembled from three independent closures.
pub struct ListenerFns {
    on_codec_config_ready: ConfigReadyFn,
    get_free_buffer: FreeBufferFn,
    on_buffer_ready: BufferReadyFn,
}

impl ListenerFns {
    pub fn new<C, F, R>(on_codec_config_ready: C, get_free_buffer: F, on_buffer_ready: R) -> Self
    where
        C: FnMut(&Bytes, &Bytes) -> Vec<DecoderBuffer> + Send + 'static,
        F: FnMut() -> Option<SlotIndex> + Send + 'static,
        R: FnMut(SlotIndex, ClockSample, AuSyncType) + Send + 'static,
    {
        ListenerFns {
            on_codec_config_ready: Box::new(on_codec_config_ready),
            get_free_buffer: Box::new(get_free_buffer),
            on_buffer_ready: Box::new(on_buffer_ready),
        }
    }

    /// Same as [`ListenerFns::new`], with a free-buffer query that answers
    /// with an index or a negative "none available" value.
    pub fn with_sentinel<C, F, R>(
        on_codec_config_ready: C,
        mut get_free_buffer: F,
        on_buffer_ready: R,
    ) -> Self
    where
        C: FnMut(&Bytes, &Bytes) -> Vec<DecoderBuffer> + Send + 'static,
        F: FnMut() -> i32 + Send + 'static,
        R: FnMut(SlotIndex, ClockSample, AuSyncType) + Send + 'static,
    {
        Self::new(
            on_codec_config_ready,
            move || SlotIndex::from_sentinel(get_free_buffer()),
            on_buffer_ready,
        )
    }
}

impl ReceiverListener for ListenerFns {
    fn on_codec_config_ready(&mut self, sps: &Bytes, pps: &Bytes) -> Vec<DecoderBuffer> {
        (self.on_codec_config_ready)(sps, pps)
    }

    fn get_free_buffer(&mut self) -> Option<SlotIndex> {
        (self.get_free_buffer)()
    }

    fn on_buffer_ready(&mut self, slot: SlotIndex, sample: ClockSample, sync: AuSyncType) {
        (self.on_buffer_ready)(slot, sample, sync)
    }
}
