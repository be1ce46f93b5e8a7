use bytes::Bytes;

/// One access unit as handed over by the network side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub payload: Bytes,
    /// Raw 32-bit RTP timestamp.
    pub rtp_timestamp: u32,
    /// Sender wall clock in microseconds, 0 if the sender gave none.
    pub ntp_timestamp: u64,
    /// First and last RTP sequence numbers of the packets carrying the AU.
    pub seq_range: Option<(u16, u16)>,
    /// Decode entry point (IDR).
    pub is_sync: bool,
    /// False if some packets of the AU were missing.
    pub is_complete: bool,
}

impl AccessUnit {
    pub fn new(payload: Bytes, rtp_timestamp: u32) -> Self {
        AccessUnit {
            payload,
            rtp_timestamp,
            ntp_timestamp: 0,
            seq_range: None,
            is_sync: false,
            is_complete: true,
        }
    }

    /// Build from an Annex-B payload, flagging it as sync if it carries an IDR.
    pub fn from_annexb(payload: Bytes, rtp_timestamp: u32) -> Self {
        let is_sync = h264_nal::contains_idr(&payload);
        AccessUnit {
            is_sync,
            ..Self::new(payload, rtp_timestamp)
        }
    }

    pub fn with_ntp(mut self, ntp_timestamp: u64) -> Self {
        self.ntp_timestamp = ntp_timestamp;
        self
    }

    pub fn with_seq_range(mut self, first: u16, last: u16) -> Self {
        self.seq_range = Some((first, last));
        self
    }

    pub fn with_sync(mut self, is_sync: bool) -> Self {
        self.is_sync = is_sync;
        self
    }

    pub fn with_complete(mut self, is_complete: bool) -> Self {
        self.is_complete = is_complete;
        self
    }
}
