use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::access_unit::AccessUnit;
use crate::clock::{
    ClockSample, LocalClock, MonotonicClock, RtpTimestampExtender, SenderReportMapping,
};
use crate::config::ReceiverConfig;
use crate::error::ReceiverError;
use crate::gate::{CodecConfigGate, GateResult};
use crate::listener::ReceiverListener;
use crate::pool::{BufferPool, SlotIndex, SlotReleaser};
use crate::stats::ReceiverStats;
use crate::sync::{AuSyncType, ContinuityTracker};

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingConfig,
    Ready,
    /// Waiting on the decoder side for a free slot.
    Acquiring,
    /// Handing a staged AU to the decoder side.
    Delivering,
    /// Terminal. All further input is discarded.
    Halted,
}

/// Why an AU was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Paused,
    AwaitingConfig,
    OutOfOrder,
    Incomplete,
    Oversize,
}

/// Result of submitting one AU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuOutcome {
    Delivered {
        slot: SlotIndex,
        sample: ClockSample,
        sync: AuSyncType,
    },
    /// No free slot; counted in `dropped_au_count`.
    Dropped,
    Discarded(DiscardReason),
    /// The receiver is halted.
    Ignored,
}

/// Drives the receiver-to-decoder handoff for one stream session.
///
/// Producer-side calls take `&mut self` and are therefore processed one at a
/// time in arrival order. Slot release happens on the decoder side through a
/// [`SlotReleaser`].
pub struct StreamReceiver {
    config: ReceiverConfig,
    listener: Box<dyn ReceiverListener>,
    clock: Box<dyn LocalClock>,
    state: ReceiverState,
    paused: bool,
    gate: CodecConfigGate,
    pool: Option<BufferPool>,
    /// Slot handed out by the decoder side whose AU was never delivered.
    reserved: Option<SlotIndex>,
    extender: RtpTimestampExtender,
    continuity: ContinuityTracker,
    sender_report: Option<SenderReportMapping>,
    stats: ReceiverStats,
}

impl StreamReceiver {
    pub fn new(config: ReceiverConfig, listener: Box<dyn ReceiverListener>) -> Self {
        Self::with_clock(config, listener, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        config: ReceiverConfig,
        listener: Box<dyn ReceiverListener>,
        clock: Box<dyn LocalClock>,
    ) -> Self {
        let gate = CodecConfigGate::new(config.max_parameter_set_size);
        StreamReceiver {
            config,
            listener,
            clock,
            state: ReceiverState::AwaitingConfig,
            paused: false,
            gate,
            pool: None,
            reserved: None,
            extender: RtpTimestampExtender::new(),
            continuity: ContinuityTracker::new(),
            sender_report: None,
            stats: ReceiverStats::default(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == ReceiverState::Halted
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// The applied SPS/PPS pair, once the codec configuration has fired.
    pub fn parameter_sets(&self) -> Option<(Bytes, Bytes)> {
        if self.gate.has_fired() {
            self.gate.parameter_sets()
        } else {
            None
        }
    }

    /// Release handle for the decoder side, available once configured.
    pub fn releaser(&self) -> Option<SlotReleaser> {
        self.pool.as_ref().map(BufferPool::releaser)
    }

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    /// Feed SPS and/or PPS. Returns the state after processing.
    ///
    /// Invalid parameter sets are rejected and leave the receiver waiting.
    /// Once configured, identical sets are accepted silently and differing
    /// ones are rejected with [`ReceiverError::AlreadyConfigured`].
    pub fn submit_parameter_sets(
        &mut self,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    ) -> Result<ReceiverState, ReceiverError> {
        match self.state {
            ReceiverState::Halted => {
                trace!("halted, parameter sets ignored");
                Ok(self.state)
            }
            ReceiverState::AwaitingConfig => {
                self.gate.hold(sps, pps)?;
                if !self.paused {
                    self.fire_gate()?;
                }
                Ok(self.state)
            }
            _ => {
                let applied = self.gate.parameter_sets();
                let same = applied.is_some_and(|(cur_sps, cur_pps)| {
                    sps.as_ref().map_or(true, |s| *s == cur_sps)
                        && pps.as_ref().map_or(true, |p| *p == cur_pps)
                });
                if same {
                    trace!("repeated parameter sets");
                    Ok(self.state)
                } else {
                    warn!("parameter sets changed after configuration");
                    Err(ReceiverError::AlreadyConfigured)
                }
            }
        }
    }

    /// Record an RTCP sender report mapping sender wall clock to RTP time.
    pub fn on_sender_report(&mut self, ntp_us: u64, rtp_timestamp: u32) {
        if self.is_halted() {
            return;
        }
        debug!(ntp_us, rtp_timestamp, "sender report");
        self.sender_report = Some(SenderReportMapping {
            ntp_us,
            rtp_timestamp,
        });
    }

    /// Process one access unit.
    ///
    /// Buffer exhaustion, loss and reordering are reported through the
    /// returned [`AuOutcome`]. An `Err` is only returned for a fatal
    /// condition, once; the receiver is then halted.
    pub fn submit_access_unit(&mut self, au: AccessUnit) -> Result<AuOutcome, ReceiverError> {
        if self.is_halted() {
            trace!(rtp_ts = au.rtp_timestamp, "halted, access unit ignored");
            return Ok(AuOutcome::Ignored);
        }
        self.stats.total_au_count += 1;

        if self.state == ReceiverState::AwaitingConfig
            && self.config.extract_in_band_parameter_sets
        {
            self.extract_parameter_sets(&au.payload)?;
        }

        if self.paused {
            return Ok(self.discard(DiscardReason::Paused, true));
        }

        if self.state == ReceiverState::AwaitingConfig {
            if self.config.wait_for_sync {
                return Ok(self.discard(DiscardReason::AwaitingConfig, true));
            }
            return Err(self.halt_with(ReceiverError::NotConfigured));
        }

        let rtp_extended = self.extender.extend(au.rtp_timestamp);
        if let Some(last) = self.extender.last_extended() {
            if rtp_extended <= last {
                debug!(
                    rtp_ts = au.rtp_timestamp,
                    rtp_extended,
                    last,
                    "access unit out of order"
                );
                return Ok(self.discard(DiscardReason::OutOfOrder, false));
            }
        }
        self.extender.commit(au.rtp_timestamp, rtp_extended);
        self.continuity.observe(au.seq_range);

        if !au.is_complete {
            self.stats.incomplete_au_count += 1;
            if !self.config.output_incomplete_au {
                return Ok(self.discard(DiscardReason::Incomplete, true));
            }
        }

        let payload = h264_nal::rewrite_access_unit(&au.payload, &self.config.rewrite_options());

        let Some(pool) = self.pool.as_ref() else {
            return Err(self.halt_with(ReceiverError::NotConfigured));
        };

        self.state = ReceiverState::Acquiring;
        let slot = match self.reserved.take() {
            Some(slot) => slot,
            None => {
                let listener = &mut self.listener;
                match pool.acquire_free(|| listener.get_free_buffer()) {
                    Some(slot) => slot,
                    None => {
                        debug!(
                            rtp_ts = au.rtp_timestamp,
                            dropped = self.stats.dropped_au_count + 1,
                            "no free buffer, access unit dropped"
                        );
                        return Ok(self.drop_au());
                    }
                }
            }
        };

        let staged = pool.buffer(slot).is_some_and(|buf| buf.fill(&payload));
        if !staged {
            // the decoder side already handed this slot out; reuse it for the next AU
            warn!(%slot, len = payload.len(), "access unit does not fit decoder buffer");
            self.reserved = Some(slot);
            self.state = ReceiverState::Ready;
            return Ok(self.discard(DiscardReason::Oversize, true));
        }

        let ntp_timestamp = match (au.ntp_timestamp, self.sender_report) {
            (0, Some(sr)) => sr.ntp_for(au.rtp_timestamp, self.config.clock_rate),
            (ntp, _) => ntp,
        };
        let sample = ClockSample {
            rtp_extended_timestamp: rtp_extended,
            ntp_timestamp,
            local_timestamp: self.clock.now_us(),
        };
        if let Err(e) = pool.mark_busy(slot, payload.len(), sample) {
            warn!(%slot, %e, "slot released before delivery, access unit dropped");
            return Ok(self.drop_au());
        }

        let sync = self.continuity.on_delivered(au.is_sync, !au.is_complete);
        if sync.frame_lost() {
            self.stats.missed_au_count += 1;
        }

        self.state = ReceiverState::Delivering;
        trace!(%slot, rtp_ext = rtp_extended, ntp = ntp_timestamp, ?sync, "access unit ready");
        self.listener.on_buffer_ready(slot, sample, sync);
        self.stats.output_au_count += 1;
        self.state = ReceiverState::Ready;

        Ok(AuOutcome::Delivered { slot, sample, sync })
    }

    /// Stop invoking the listener. AUs received while paused are discarded.
    pub fn pause(&mut self) {
        if self.is_halted() || self.paused {
            return;
        }
        self.paused = true;
        info!("receiver paused");
    }

    /// Resume delivery. Fires the config gate if the pair arrived while paused.
    pub fn resume(&mut self) -> Result<ReceiverState, ReceiverError> {
        if self.is_halted() || !self.paused {
            return Ok(self.state);
        }
        self.paused = false;
        info!("receiver resumed");
        if self.state == ReceiverState::AwaitingConfig {
            self.fire_gate()?;
        }
        Ok(self.state)
    }

    /// Stop for good. No listener call happens after this returns.
    pub fn halt(&mut self) {
        if self.is_halted() {
            return;
        }
        self.state = ReceiverState::Halted;
        info!("receiver halted");
        self.stats.log();
    }

    fn fire_gate(&mut self) -> Result<(), ReceiverError> {
        let listener = &mut self.listener;
        match self.gate.try_fire(|sps, pps| listener.on_codec_config_ready(sps, pps)) {
            Ok(GateResult::Pending) => Ok(()),
            Ok(GateResult::Ready { pool, .. }) => {
                info!(pool_size = pool.size(), "receiver ready");
                self.pool = Some(pool);
                self.state = ReceiverState::Ready;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(self.halt_with(e)),
            Err(e) => Err(e),
        }
    }

    fn extract_parameter_sets(&mut self, payload: &Bytes) -> Result<(), ReceiverError> {
        let (sps, pps) = h264_nal::find_parameter_sets(payload);
        if sps.is_none() && pps.is_none() {
            return Ok(());
        }
        let sps = sps.map(|s| payload.slice_ref(s));
        let pps = pps.map(|p| payload.slice_ref(p));
        match self.submit_parameter_sets(sps, pps) {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(%e, "in-band parameter sets rejected");
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }

    fn drop_au(&mut self) -> AuOutcome {
        self.stats.dropped_au_count += 1;
        self.continuity.mark_lost();
        self.state = ReceiverState::Ready;
        AuOutcome::Dropped
    }

    fn discard(&mut self, reason: DiscardReason, lost: bool) -> AuOutcome {
        self.stats.discarded_au_count += 1;
        if lost {
            self.continuity.mark_lost();
        }
        trace!(?reason, "access unit discarded");
        AuOutcome::Discarded(reason)
    }

    fn halt_with(&mut self, err: ReceiverError) -> ReceiverError {
        error!(%err, "receiver halted on fatal error");
        self.state = ReceiverState::Halted;
        err
    }
}
