use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::buffer::DecoderBuffer;
use crate::error::ReceiverError;
use crate::pool::BufferPool;

/// Outcome of a parameter set submission.
#[derive(Debug)]
pub enum GateResult {
    /// Still waiting for the SPS, the PPS, or both.
    Pending,
    /// The pair was complete and the decoder side provided its buffers.
    Ready {
        sps: Bytes,
        pps: Bytes,
        pool: BufferPool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Fired,
    Failed,
}

/// Holds SPS/PPS until both are present, then provisions the buffer pool
/// exactly once.
#[derive(Debug)]
pub struct CodecConfigGate {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    state: GateState,
    max_parameter_set_size: usize,
}

impl CodecConfigGate {
    pub fn new(max_parameter_set_size: usize) -> Self {
        CodecConfigGate {
            sps: None,
            pps: None,
            state: GateState::Pending,
            max_parameter_set_size,
        }
    }

    /// Store the given parameter sets and fire if the pair is complete.
    ///
    /// `on_ready` is the decoder-side provisioning callback; it runs at most
    /// once over the gate's lifetime.
    pub fn submit<F>(
        &mut self,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
        on_ready: F,
    ) -> Result<GateResult, ReceiverError>
    where
        F: FnOnce(&Bytes, &Bytes) -> Vec<DecoderBuffer>,
    {
        self.hold(sps, pps)?;
        self.try_fire(on_ready)
    }

    /// Validate and store parameter sets without firing.
    ///
    /// Both are validated before either is stored, so a rejected submission
    /// leaves the gate as it was.
    pub fn hold(&mut self, sps: Option<Bytes>, pps: Option<Bytes>) -> Result<(), ReceiverError> {
        if self.state != GateState::Pending {
            return Err(ReceiverError::AlreadyConfigured);
        }

        if let Some(sps) = &sps {
            self.validate("SPS", sps)?;
        }
        if let Some(pps) = &pps {
            self.validate("PPS", pps)?;
        }

        if let Some(sps) = sps {
            debug!(len = sps.len(), "SPS held");
            self.sps = Some(sps);
        }
        if let Some(pps) = pps {
            debug!(len = pps.len(), "PPS held");
            self.pps = Some(pps);
        }
        Ok(())
    }

    /// Fire if both parameter sets are held.
    pub fn try_fire<F>(&mut self, on_ready: F) -> Result<GateResult, ReceiverError>
    where
        F: FnOnce(&Bytes, &Bytes) -> Vec<DecoderBuffer>,
    {
        if self.state != GateState::Pending {
            return Err(ReceiverError::AlreadyConfigured);
        }

        let (sps, pps) = match (&self.sps, &self.pps) {
            (Some(sps), Some(pps)) => (sps.clone(), pps.clone()),
            _ => return Ok(GateResult::Pending),
        };

        let buffers = on_ready(&sps, &pps);
        if buffers.is_empty() {
            self.state = GateState::Failed;
            error!("decoder returned no input buffers");
            return Err(ReceiverError::NoDecoderBuffers);
        }

        self.state = GateState::Fired;
        info!(
            sps_len = sps.len(),
            pps_len = pps.len(),
            buffers = buffers.len(),
            "codec configuration applied"
        );

        Ok(GateResult::Ready {
            sps,
            pps,
            pool: BufferPool::new(buffers),
        })
    }

    pub fn has_fired(&self) -> bool {
        self.state == GateState::Fired
    }

    pub fn has_failed(&self) -> bool {
        self.state == GateState::Failed
    }

    /// The held SPS/PPS pair, if both are present.
    pub fn parameter_sets(&self) -> Option<(Bytes, Bytes)> {
        Some((self.sps.clone()?, self.pps.clone()?))
    }

    fn validate(&self, kind: &'static str, data: &Bytes) -> Result<(), ReceiverError> {
        let len = data.len();
        if len == 0 || len > self.max_parameter_set_size {
            warn!(kind, len, max = self.max_parameter_set_size, "rejecting parameter set");
            return Err(ReceiverError::InvalidParameter { kind, len });
        }
        Ok(())
    }
}
