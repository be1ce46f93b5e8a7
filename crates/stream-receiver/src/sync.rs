use tracing::debug;

/// Synchronization classification attached to each delivered AU.
///
/// The discriminants match the values used by callers that exchange the
/// classification as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AuSyncType {
    /// Decode entry point, no loss since the previous AU.
    Sync = 0,
    /// Decode entry point following a detected loss.
    SyncFrameLost = 1,
    /// Regular AU, no loss since the previous AU.
    NonSync = 2,
    /// Regular AU following a detected loss.
    NonSyncFrameLost = 3,
}

impl AuSyncType {
    pub fn classify(is_sync: bool, frame_lost: bool) -> Self {
        match (is_sync, frame_lost) {
            (true, false) => AuSyncType::Sync,
            (true, true) => AuSyncType::SyncFrameLost,
            (false, false) => AuSyncType::NonSync,
            (false, true) => AuSyncType::NonSyncFrameLost,
        }
    }

    pub fn is_sync(self) -> bool {
        matches!(self, AuSyncType::Sync | AuSyncType::SyncFrameLost)
    }

    pub fn frame_lost(self) -> bool {
        matches!(self, AuSyncType::SyncFrameLost | AuSyncType::NonSyncFrameLost)
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(AuSyncType::Sync),
            1 => Some(AuSyncType::SyncFrameLost),
            2 => Some(AuSyncType::NonSync),
            3 => Some(AuSyncType::NonSyncFrameLost),
            _ => None,
        }
    }
}

/// Tracks sequence continuity between consecutive AUs.
///
/// Loss is latched until the next delivered AU consumes it, so an AU dropped
/// for lack of a buffer shows up in the classification of its successor.
#[derive(Debug, Clone, Default)]
pub struct ContinuityTracker {
    expected_seq: Option<u16>,
    pending_loss: bool,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the RTP sequence range of an in-order AU. Returns true on a gap.
    pub fn observe(&mut self, seq_range: Option<(u16, u16)>) -> bool {
        let Some((first, last)) = seq_range else {
            return false;
        };

        let gap = match self.expected_seq {
            Some(expected) if expected != first => {
                let missing = first.wrapping_sub(expected);
                debug!(expected, first, missing, "sequence gap");
                true
            }
            _ => false,
        };

        self.expected_seq = Some(last.wrapping_add(1));
        if gap {
            self.pending_loss = true;
        }
        gap
    }

    /// An AU was not delivered.
    pub fn mark_lost(&mut self) {
        self.pending_loss = true;
    }

    pub fn has_pending_loss(&self) -> bool {
        self.pending_loss
    }

    /// Classify an AU about to be delivered and clear the latched loss.
    pub fn on_delivered(&mut self, is_sync: bool, incomplete: bool) -> AuSyncType {
        let lost = self.pending_loss || incomplete;
        self.pending_loss = false;
        AuSyncType::classify(is_sync, lost)
    }
}
