use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::nal::NalError;

/// H.264 decoder configuration (SPS + PPS) carried out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub profile: u8,
    pub level: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub nalu_length_size: u8,
}

impl AvcDecoderConfig {
    /// Parse an AVCDecoderConfigurationRecord.
    ///
    /// Format (ISO 14496-15):
    ///   byte 0: version (always 1)
    ///   byte 1: profile
    ///   byte 2: profile compat
    ///   byte 3: level
    ///   byte 4: 0b111111xx where xx = (nalu_length_size - 1)
    ///   byte 5: 0b111xxxxx where xxxxx = num_sps
    ///   For each SPS: 2-byte length, then data
    ///   1 byte: num_pps
    ///   For each PPS: 2-byte length, then data
    pub fn parse(record: &[u8]) -> Result<Self, NalError> {
        if record.len() < 6 {
            warn!(len = record.len(), "avcC record too short");
            return Err(NalError::TruncatedRecord("header"));
        }

        let version = record[0];
        if version != 1 {
            warn!(version, "unexpected AVCDecoderConfigurationRecord version");
            return Err(NalError::Version(version));
        }

        let profile = record[1];
        let level = record[3];
        let nalu_length_size = (record[4] & 0x03) + 1;

        let num_sps = (record[5] & 0x1F) as usize;
        let mut pos = 6;
        let sps = read_parameter_sets(record, &mut pos, num_sps, "SPS")?;

        if pos >= record.len() {
            return Err(NalError::TruncatedRecord("PPS count"));
        }
        let num_pps = record[pos] as usize;
        pos += 1;
        let pps = read_parameter_sets(record, &mut pos, num_pps, "PPS")?;

        debug!(
            profile,
            level,
            nalu_length_size,
            num_sps = sps.len(),
            num_pps = pps.len(),
            "parsed avcC record"
        );

        Ok(AvcDecoderConfig {
            profile,
            level,
            sps,
            pps,
            nalu_length_size,
        })
    }

    /// The first SPS/PPS pair, if the record carries both.
    pub fn first_pair(&self) -> Option<(Bytes, Bytes)> {
        Some((self.sps.first()?.clone(), self.pps.first()?.clone()))
    }

    /// Serialize back into an avcC record.
    pub fn to_record(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(1);
        out.put_u8(self.profile);
        out.put_u8(0x00);
        out.put_u8(self.level);
        out.put_u8(0xFC | (self.nalu_length_size.saturating_sub(1) & 0x03));
        out.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            out.put_u16(sps.len() as u16);
            out.put_slice(sps);
        }
        out.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            out.put_u16(pps.len() as u16);
            out.put_slice(pps);
        }
        out.freeze()
    }
}

fn read_parameter_sets(
    record: &[u8],
    pos: &mut usize,
    count: usize,
    what: &'static str,
) -> Result<Vec<Bytes>, NalError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if *pos + 2 > record.len() {
            warn!(what, "truncated parameter set length");
            return Err(NalError::TruncatedRecord(what));
        }
        let len = u16::from_be_bytes([record[*pos], record[*pos + 1]]) as usize;
        *pos += 2;
        if *pos + len > record.len() {
            warn!(what, len, "truncated parameter set data");
            return Err(NalError::TruncatedRecord(what));
        }
        sets.push(Bytes::copy_from_slice(&record[*pos..*pos + len]));
        *pos += len;
    }
    Ok(sets)
}
