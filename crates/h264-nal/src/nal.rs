use thiserror::Error;
use tracing::trace;

/// 4-byte Annex-B start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// H.264 NAL unit type, taken from the low 5 bits of the NAL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    NonIdrSlice,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl NalUnitType {
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::NonIdrSlice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            t => NalUnitType::Other(t),
        }
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NalUnitType::Sps | NalUnitType::Pps)
    }
}

/// Errors for malformed length-prefixed input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NalError {
    #[error("unsupported NAL length size {0}")]
    LengthSize(u8),

    #[error("truncated NAL length at offset {0}")]
    TruncatedLength(usize),

    #[error("NAL length {len} at offset {offset} exceeds payload")]
    TruncatedData { offset: usize, len: usize },

    #[error("truncated avcC record: {0}")]
    TruncatedRecord(&'static str),

    #[error("unexpected avcC version {0}")]
    Version(u8),
}

/// Split an Annex-B byte stream into NAL units (start codes stripped).
///
/// Accepts both 3-byte and 4-byte start codes. Trailing zero bytes before a
/// start code belong to the start code, not to the preceding NAL unit.
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            if let Some(s) = start {
                push_unit(&mut units, &data[s..i]);
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    if let Some(s) = start {
        push_unit(&mut units, &data[s..]);
    }

    units
}

fn push_unit<'a>(units: &mut Vec<&'a [u8]>, unit: &'a [u8]) {
    let end = unit.iter().rposition(|&b| b != 0x00).map_or(0, |p| p + 1);
    if end > 0 {
        units.push(&unit[..end]);
    }
}

/// Split AVCC-framed data: [len][NAL1][len][NAL2]...
pub fn split_avcc(data: &[u8], length_size: u8) -> Result<Vec<&[u8]>, NalError> {
    if !(1..=4).contains(&length_size) {
        return Err(NalError::LengthSize(length_size));
    }
    let length_size = length_size as usize;

    let mut units = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + length_size > data.len() {
            return Err(NalError::TruncatedLength(pos));
        }
        let len = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        pos += length_size;
        if pos + len > data.len() {
            return Err(NalError::TruncatedData { offset: pos, len });
        }
        if len > 0 {
            units.push(&data[pos..pos + len]);
        }
        pos += len;
    }

    Ok(units)
}

/// True if the Annex-B access unit carries an IDR slice (a decode entry point).
pub fn contains_idr(payload: &[u8]) -> bool {
    split_annexb(payload)
        .iter()
        .any(|nalu| NalUnitType::from_header(nalu[0]) == NalUnitType::IdrSlice)
}

/// First SPS and first PPS NAL unit found in an Annex-B access unit.
pub fn find_parameter_sets(payload: &[u8]) -> (Option<&[u8]>, Option<&[u8]>) {
    let mut sps = None;
    let mut pps = None;

    for nalu in split_annexb(payload) {
        match NalUnitType::from_header(nalu[0]) {
            NalUnitType::Sps if sps.is_none() => sps = Some(nalu),
            NalUnitType::Pps if pps.is_none() => pps = Some(nalu),
            _ => {}
        }
        if sps.is_some() && pps.is_some() {
            break;
        }
    }

    trace!(has_sps = sps.is_some(), has_pps = pps.is_some(), "in-band parameter set scan");
    (sps, pps)
}
