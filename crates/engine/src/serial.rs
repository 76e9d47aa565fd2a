// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide Ogg serial number generator (spec.md §5 "Vorbis encoder
//! serial-number selection: under a process-wide serial mutex").

use std::sync::Mutex;

use rand::Rng;

static SEEN: Mutex<Vec<i32>> = Mutex::new(Vec::new());

/// Returns a random serial number guaranteed distinct from every serial
/// handed out by this process so far. Collisions across restarts of the same
/// process are vanishingly unlikely (libogg itself makes no stronger
/// guarantee); uniqueness only needs to hold among concurrently open
/// streams.
pub fn next_serial() -> i32 {
    #[allow(clippy::unwrap_used)]
    let mut seen = SEEN.lock().unwrap();
    loop {
        let candidate = rand::thread_rng().gen::<i32>();
        if !seen.contains(&candidate) {
            seen.push(candidate);
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn serials_are_unique_across_many_calls() {
        let mut set = HashSet::new();
        for _ in 0..256 {
            assert!(set.insert(next_serial()));
        }
    }
}
