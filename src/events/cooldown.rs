//! Per-`(camera_id, class_name)` cooldown gate.

use std::collections::HashMap;

use parking_lot::Mutex;

pub struct CooldownTable {
    last_accepted: Mutex<HashMap<(i64, String), f64>>,
    cooldown_seconds: f64,
}

impl CooldownTable {
    pub fn new(cooldown_seconds: f64) -> Self {
        CooldownTable {
            last_accepted: Mutex::new(HashMap::new()),
            cooldown_seconds,
        }
    }

    /// Atomically checks whether `(camera_id, class_name)` is out of
    /// cooldown at `now`, and if so records `now` as the new baseline.
    /// Check-and-update happen under a single lock acquisition so two
    /// concurrent callers can never both observe "not in cooldown".
    pub fn try_accept(&self, camera_id: i64, class_name: &str, now: f64) -> bool {
        let mut table = self.last_accepted.lock();
        let key = (camera_id, class_name.to_string());
        match table.get(&key) {
            Some(&last) if now - last < self.cooldown_seconds => false,
            _ => {
                table.insert(key, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn rejects_within_cooldown_then_accepts_after() {
        let table = CooldownTable::new(30.0);
        assert!(table.try_accept(1, "person", 100.0));
        assert!(!table.try_accept(1, "person", 110.0));
        assert!(!table.try_accept(1, "person", 129.9));
        assert!(table.try_accept(1, "person", 130.0));
    }

    /// Boundary table for spec §8 property 5: a second event at exactly
    /// `last + cooldown` is accepted, anything strictly before is rejected.
    #[rstest]
    #[case(100.0, 129.999, false)]
    #[case(100.0, 130.0, true)]
    #[case(100.0, 130.001, true)]
    #[case(100.0, 100.0, false)]
    fn cooldown_boundary_table(#[case] first: f64, #[case] second: f64, #[case] second_accepted: bool) {
        let table = CooldownTable::new(30.0);
        assert!(table.try_accept(1, "person", first));
        assert_eq!(table.try_accept(1, "person", second), second_accepted);
    }

    #[test]
    fn cooldown_is_independent_per_camera_and_class() {
        let table = CooldownTable::new(30.0);
        assert!(table.try_accept(1, "person", 100.0));
        assert!(table.try_accept(2, "person", 100.0));
        assert!(table.try_accept(1, "car", 100.0));
    }
}
