pub mod access_unit;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod listener;
pub mod pool;
pub mod receiver;
pub mod stats;
pub mod sync;

pub use access_unit::AccessUnit;
pub use buffer::DecoderBuffer;
pub use clock::{ClockSample, LocalClock, MonotonicClock, RtpTimestampExtender, SenderReportMapping};
pub use config::ReceiverConfig;
pub use error::ReceiverError;
pub use gate::{CodecConfigGate, GateResult};
pub use listener::{ListenerFns, ReceiverListener};
pub use pool::{BufferPool, SlotIndex, SlotReleaser, SlotState};
pub use receiver::{AuOutcome, DiscardReason, ReceiverState, StreamReceiver};
pub use stats::ReceiverStats;
pub use sync::{AuSyncType, ContinuityTracker};
