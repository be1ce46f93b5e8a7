use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::nal::{split_annexb, NalUnitType, START_CODE};

/// Per-AU rewriting applied before the payload is staged for the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Drop SPS and PPS NAL units.
    pub filter_out_sps_pps: bool,
    /// Drop SEI NAL units.
    pub filter_out_sei: bool,
    /// Replace each start code with the 4-byte big-endian NAL unit size.
    pub replace_start_codes_with_nalu_size: bool,
}

impl RewriteOptions {
    pub fn is_passthrough(&self) -> bool {
        !self.filter_out_sps_pps && !self.filter_out_sei && !self.replace_start_codes_with_nalu_size
    }
}

/// Rewrite an Annex-B access unit according to `opts`.
///
/// Payloads without any start code are returned unchanged.
pub fn rewrite_access_unit(payload: &Bytes, opts: &RewriteOptions) -> Bytes {
    if opts.is_passthrough() {
        return payload.clone();
    }

    let units = split_annexb(payload);
    if units.is_empty() {
        trace!(len = payload.len(), "no start code found, payload passed through");
        return payload.clone();
    }

    let mut out = BytesMut::with_capacity(payload.len());
    for nalu in units {
        let nal_type = NalUnitType::from_header(nalu[0]);
        if opts.filter_out_sps_pps && nal_type.is_parameter_set() {
            continue;
        }
        if opts.filter_out_sei && nal_type == NalUnitType::Sei {
            continue;
        }
        if opts.replace_start_codes_with_nalu_size {
            out.put_u32(nalu.len() as u32);
        } else {
            out.put_slice(&START_CODE);
        }
        out.put_slice(nalu);
    }

    out.freeze()
}
