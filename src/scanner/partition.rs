//! Work unit partitioning
//!
//! Up to `cap` usernames each get their own unit. Past the cap, usernames are
//! dealt round-robin across exactly `cap` units, so unit sizes differ by at
//! most one and input order is kept inside every unit.

/// Default cap on the number of work units per run
pub const DEFAULT_MAX_UNITS: usize = 200;

/// An ordered batch of usernames scanned sequentially by one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Unit index, stable for a given input
    pub id: usize,

    /// Usernames in input order
    pub usernames: Vec<String>,
}

impl WorkUnit {
    /// Number of usernames in this unit
    pub fn len(&self) -> usize {
        self.usernames.len()
    }

    /// Check if the unit holds no usernames
    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }
}

/// Split `usernames` into `min(len, cap)` non-empty units
///
/// A `cap` of zero is treated as one.
pub fn partition(usernames: &[String], cap: usize) -> Vec<WorkUnit> {
    let units = usernames.len().min(cap.max(1));
    let mut out: Vec<WorkUnit> = (0..units)
        .map(|id| WorkUnit {
            id,
            usernames: Vec::with_capacity(usernames.len().div_ceil(units.max(1))),
        })
        .collect();

    for (i, username) in usernames.iter().enumerate() {
        out[i % units].usernames.push(username.clone());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user{i}")).collect()
    }

    #[test]
    fn test_one_per_unit_below_cap() {
        let units = partition(&names(3), 200);
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.len() == 1));
        assert_eq!(units[2].usernames, vec!["user2".to_string()]);
    }

    #[test]
    fn test_round_robin_above_cap() {
        let units = partition(&names(7), 3);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].usernames, vec!["user0", "user3", "user6"]);
        assert_eq!(units[1].usernames, vec!["user1", "user4"]);
        assert_eq!(units[2].usernames, vec!["user2", "user5"]);
    }

    #[test]
    fn test_completeness() {
        for (u, c) in [(0, 5), (1, 1), (5, 5), (450, 200), (199, 200), (1000, 7)] {
            let input = names(u);
            let units = partition(&input, c);
            assert_eq!(units.len(), u.min(c));
            assert!(units.iter().all(|unit| !unit.is_empty()));

            let flat: Vec<&String> = units.iter().flat_map(|unit| &unit.usernames).collect();
            assert_eq!(flat.len(), u);
            let unique: HashSet<&String> = flat.into_iter().collect();
            assert_eq!(unique.len(), u);

            let sizes: Vec<usize> = units.iter().map(WorkUnit::len).collect();
            if let (Some(min), Some(max)) = (sizes.iter().min(), sizes.iter().max()) {
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let input = names(57);
        assert_eq!(partition(&input, 10), partition(&input, 10));
    }

    #[test]
    fn test_zero_cap() {
        let units = partition(&names(4), 0);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].len(), 4);
    }
}
