use crate::foundation::CosignerId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// Unseen peers start at a middling RTT so they are neither preferred over
// proven-fast peers nor starved of traffic.
const DEFAULT_RTT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
struct HealthMark {
    rtt: Duration,
    failed: bool,
}

/// Tracks per-peer responsiveness from live signing traffic. The validator
/// picks its participant set from the fastest peers that have not recently
/// faulted.
pub struct CosignerHealth {
    marks: Mutex<HashMap<CosignerId, HealthMark>>,
}

impl CosignerHealth {
    pub fn new(peer_ids: impl IntoIterator<Item = CosignerId>) -> Self {
        let marks = peer_ids.into_iter().map(|id| (id, HealthMark { rtt: DEFAULT_RTT, failed: false })).collect();
        Self { marks: Mutex::new(marks) }
    }

    pub fn record_success(&self, id: CosignerId, rtt: Duration) {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        marks.insert(id, HealthMark { rtt, failed: false });
    }

    pub fn record_failure(&self, id: CosignerId) {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        let rtt = marks.get(&id).map(|mark| mark.rtt).unwrap_or(DEFAULT_RTT);
        marks.insert(id, HealthMark { rtt, failed: true });
    }

    /// The `count` best peers, recently-failed ones last.
    pub fn fastest(&self, count: usize) -> Vec<CosignerId> {
        let marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        let mut ranked: Vec<(CosignerId, HealthMark)> = marks.iter().map(|(id, mark)| (*id, *mark)).collect();
        ranked.sort_by_key(|(id, mark)| (mark.failed, mark.rtt, *id));
        ranked.into_iter().take(count).map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> CosignerId {
        CosignerId::new(raw)
    }

    #[test]
    fn fastest_prefers_low_rtt_and_demotes_failures() {
        let health = CosignerHealth::new([id(2), id(3), id(4)]);
        health.record_success(id(3), Duration::from_millis(5));
        health.record_success(id(2), Duration::from_millis(20));
        health.record_failure(id(4));

        assert_eq!(health.fastest(2), vec![id(3), id(2)]);
        assert_eq!(health.fastest(3), vec![id(3), id(2), id(4)]);
    }

    #[test]
    fn recovered_peer_is_ranked_by_rtt_again() {
        let health = CosignerHealth::new([id(2), id(3)]);
        health.record_failure(id(2));
        assert_eq!(health.fastest(1), vec![id(3)]);

        health.record_success(id(2), Duration::from_millis(1));
        assert_eq!(health.fastest(1), vec![id(2)]);
    }
}
