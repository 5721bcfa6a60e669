//! One-shot timer bookkeeping.
//!
//! The controller never touches hardware timers; it emits
//! `StartTimer`/`CancelTimer` commands carrying a [`TimerTag`], and the
//! event loop owns a [`TimerSet`] mapping each tag to at most one pending
//! deadline. Scheduling a tag that is already pending replaces the old
//! deadline, so a timer can never fire twice for one arming.

/// Identity of every one-shot timer in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerTag {
    /// Advertising window: sync window or log interval, mode dependent.
    Mode,
    /// Settle delay between stopping advertising and starting the scan.
    ScanDelay,
    /// Next file-stream chunk is due.
    StreamChunk,
    /// Pump pulse is over.
    PumpOff,
}

impl TimerTag {
    pub const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            TimerTag::Mode => 0,
            TimerTag::ScanDelay => 1,
            TimerTag::StreamChunk => 2,
            TimerTag::PumpOff => 3,
        }
    }
}

/// Pending one-shot deadlines, one slot per tag. Deadlines are absolute
/// milliseconds on whatever clock the event loop uses.
#[derive(Debug, Default)]
pub struct TimerSet {
    deadlines: [Option<u64>; TimerTag::COUNT],
}

impl TimerSet {
    pub const fn new() -> Self {
        Self {
            deadlines: [None; TimerTag::COUNT],
        }
    }

    /// Arm `tag` to fire at `at`, replacing any pending deadline.
    pub fn schedule(&mut self, tag: TimerTag, at: u64) {
        self.deadlines[tag.index()] = Some(at);
    }

    /// Withdraw a pending timer. Harmless if the tag is not armed.
    pub fn cancel(&mut self, tag: TimerTag) {
        self.deadlines[tag.index()] = None;
    }

    pub fn is_pending(&self, tag: TimerTag) -> bool {
        self.deadlines[tag.index()].is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.deadlines.iter().filter(|d| d.is_some()).count()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Pop one due timer at `now`, earliest deadline first. Returns `None`
    /// when nothing is due yet.
    pub fn pop_due(&mut self, now: u64) -> Option<TimerTag> {
        const TAGS: [TimerTag; TimerTag::COUNT] = [
            TimerTag::Mode,
            TimerTag::ScanDelay,
            TimerTag::StreamChunk,
            TimerTag::PumpOff,
        ];
        let mut best: Option<(TimerTag, u64)> = None;
        for tag in TAGS {
            if let Some(at) = self.deadlines[tag.index()] {
                if at <= now && best.map_or(true, |(_, b)| at < b) {
                    best = Some((tag, at));
                }
            }
        }
        let (tag, _) = best?;
        self.cancel(tag);
        Some(tag)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
