//! Per-peer Lamport clock registry (§3, §4.5).
//!
//! Two independent maps: publisher clocks, keyed by station `id`, and
//! reader clocks, keyed by the remote socket endpoint string (§9 flags this
//! as fragile across connection reuse/NAT, but it is the contract the
//! source enforces). Both maps are owned exclusively by the pipeline task
//! (§3 "Ownership"), so no internal locking is needed here -- callers must
//! not share a `ClockRegistry` across tasks.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ClockRegistry {
    publisher_clocks: HashMap<String, u64>,
    reader_clocks: HashMap<String, u64>,
}

/// Outcome of checking an incoming clock value against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCheck {
    /// Strictly greater than the prior value; the registry has been
    /// advanced to `incoming`. `was_first_contact` is true when the prior
    /// value was the implicit zero (no entry existed yet).
    Accepted { was_first_contact: bool },
    /// Not strictly greater than the prior value; the registry is
    /// unchanged.
    Rejected,
}

impl ClockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `incoming` against the publisher's prior value and advances
    /// the registry on acceptance (§4.4 step 3-4).
    pub fn check_and_advance_publisher(&mut self, id: &str, incoming: u64) -> ClockCheck {
        check_and_advance(&mut self.publisher_clocks, id, incoming)
    }

    /// Checks `incoming` against the reader's prior value and advances the
    /// registry on acceptance (§4.4 GET step 1-2).
    pub fn check_and_advance_reader(&mut self, peer: &str, incoming: u64) -> ClockCheck {
        check_and_advance(&mut self.reader_clocks, peer, incoming)
    }

    /// Removes a publisher's entry (called when that station's record
    /// expires, so the next PUT from it is treated as first contact; §4.6).
    /// Reader-clock entries are never removed this way (§4.6).
    pub fn forget_publisher(&mut self, id: &str) {
        self.publisher_clocks.remove(id);
    }

    /// Clears both maps en masse (shutdown; §3).
    pub fn clear(&mut self) {
        self.publisher_clocks.clear();
        self.reader_clocks.clear();
    }

    #[cfg(test)]
    pub fn publisher_clock(&self, id: &str) -> Option<u64> {
        self.publisher_clocks.get(id).copied()
    }
}

fn check_and_advance(map: &mut HashMap<String, u64>, key: &str, incoming: u64) -> ClockCheck {
    let prior = map.get(key).copied().unwrap_or(0);
    if incoming <= prior {
        return ClockCheck::Rejected;
    }
    let was_first_contact = prior == 0;
    map.insert(key.to_owned(), incoming);
    ClockCheck::Accepted { was_first_contact }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_put_from_a_station_is_first_contact() {
        let mut reg = ClockRegistry::new();
        assert_eq!(
            reg.check_and_advance_publisher("VIC01", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
    }

    #[test]
    fn subsequent_strictly_increasing_clock_is_accepted_but_not_first_contact() {
        let mut reg = ClockRegistry::new();
        reg.check_and_advance_publisher("VIC01", 1);
        assert_eq!(
            reg.check_and_advance_publisher("VIC01", 2),
            ClockCheck::Accepted {
                was_first_contact: false
            }
        );
    }

    #[test]
    fn replayed_equal_clock_is_rejected_and_registry_unchanged() {
        let mut reg = ClockRegistry::new();
        reg.check_and_advance_publisher("VIC01", 2);
        assert_eq!(reg.check_and_advance_publisher("VIC01", 2), ClockCheck::Rejected);
        assert_eq!(reg.publisher_clock("VIC01"), Some(2));
    }

    #[test]
    fn different_publishers_are_independent() {
        let mut reg = ClockRegistry::new();
        assert_eq!(
            reg.check_and_advance_publisher("SA01", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
        assert_eq!(
            reg.check_and_advance_publisher("QLD01", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
    }

    #[test]
    fn forget_publisher_resets_to_first_contact() {
        let mut reg = ClockRegistry::new();
        reg.check_and_advance_publisher("WA02", 1);
        reg.forget_publisher("WA02");
        assert_eq!(
            reg.check_and_advance_publisher("WA02", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
    }

    #[test]
    fn reader_and_publisher_clocks_are_independent_maps() {
        let mut reg = ClockRegistry::new();
        reg.check_and_advance_publisher("VIC01", 5);
        assert_eq!(
            reg.check_and_advance_reader("VIC01", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
    }

    #[test]
    fn clear_resets_both_maps() {
        let mut reg = ClockRegistry::new();
        reg.check_and_advance_publisher("VIC01", 1);
        reg.check_and_advance_reader("127.0.0.1:9", 1);
        reg.clear();
        assert_eq!(
            reg.check_and_advance_publisher("VIC01", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
        assert_eq!(
            reg.check_and_advance_reader("127.0.0.1:9", 1),
            ClockCheck::Accepted {
                was_first_contact: true
            }
        );
    }
}
