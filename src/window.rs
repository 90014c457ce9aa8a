/// Sliding replay window for DTLS record sequence numbers (RFC 6347 4.1.2.6).
///
/// Maintains the latest accepted sequence number and a 64-bit bitmap of the
/// last 64 seen sequence numbers to reject duplicates and old records.
///
/// Each epoch has its own `ReplayWindow`. Checking and marking are separate
/// so a record is only marked once it has been authenticated; a forged record
/// must not be able to advance the window.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    max_seq: u64,
    window: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `seqno` has not been seen and is not too old.
    pub fn is_fresh(&self, seqno: u64) -> bool {
        if seqno > self.max_seq || self.window == 0 {
            return true;
        }
        let offset = self.max_seq - seqno;
        if offset >= 64 {
            return false; // too old
        }
        self.window & (1u64 << offset) == 0
    }

    /// Record `seqno` as seen.
    pub fn mark(&mut self, seqno: u64) {
        if seqno > self.max_seq || self.window == 0 {
            let delta = seqno.saturating_sub(self.max_seq);
            self.window = if delta >= 64 {
                1
            } else {
                (self.window << delta) | 1
            };
            self.max_seq = seqno;
        } else {
            let offset = self.max_seq - seqno;
            if offset < 64 {
                self.window |= 1u64 << offset;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ReplayWindow {
        fn check_and_update(&mut self, seqno: u64) -> bool {
            let fresh = self.is_fresh(seqno);
            if fresh {
                self.mark(seqno);
            }
            fresh
        }
    }

    #[test]
    fn accepts_fresh_and_rejects_duplicate() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(0));
        assert!(!w.check_and_update(0)); // duplicate
        assert!(w.check_and_update(1));
        assert!(!w.check_and_update(1));
        assert!(w.check_and_update(2)); // next fresh
    }

    #[test]
    fn accepts_out_of_order_within_window() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(10)); // establish max=10
        assert!(w.check_and_update(8)); // unseen within 64
        assert!(!w.check_and_update(8)); // duplicate now
        assert!(w.check_and_update(9)); // unseen within 64
    }

    #[test]
    fn rejects_too_old() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(100));
        // offset = 64 -> too old
        assert!(!w.check_and_update(36));
        // offset = 63 -> allowed once
        assert!(w.check_and_update(37));
        assert!(!w.check_and_update(37));
    }

    #[test]
    fn large_jump_clears_history() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(1));
        assert!(w.check_and_update(80));
        assert!(w.check_and_update(79));
        assert!(!w.check_and_update(15));
        assert!(!w.check_and_update(80));
    }

    #[test]
    fn check_does_not_mark() {
        let mut w = ReplayWindow::new();
        assert!(w.is_fresh(5));
        assert!(w.is_fresh(5));
        w.mark(5);
        assert!(!w.is_fresh(5));
        assert!(w.is_fresh(4));
    }
}
