//! Confidence bookkeeping for device identification. Probes vote by adding
//! or subtracting points per candidate model; a hard match pins the score.

use tracing::{debug, trace};

use crate::devices::DeviceKind;

/// Score assigned when a probe proves the model outright
pub const CONFIRMED: i32 = 100;

/// A candidate must score strictly above this to be reported
pub const THRESHOLD: i32 = 50;

/// Running scores, kept in the order candidates first appeared.
#[derive(Debug, Default)]
pub struct ConfidenceTable {
    entries: Vec<(DeviceKind, i32)>,
}

impl ConfidenceTable {
    pub fn new() -> Self {
        ConfidenceTable::default()
    }

    /// Adjust the score for `kind`, creating the entry on first mention.
    /// `delta` may be negative.
    pub fn add(&mut self, kind: DeviceKind, delta: i32) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 += delta;
        } else {
            self.entries.push((kind, delta));
        }
        trace!("confidence for {kind} now {}", self.score(kind));
    }

    /// Pin `kind` at exactly [`CONFIRMED`], discarding accumulated points.
    pub fn confirm(&mut self, kind: DeviceKind) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 = CONFIRMED;
        } else {
            self.entries.push((kind, CONFIRMED));
        }
        debug!("{kind} confirmed");
    }

    pub fn score(&self, kind: DeviceKind) -> i32 {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, score)| *score)
    }

    pub fn any_confirmed(&self) -> bool {
        self.entries.iter().any(|(_, score)| *score >= CONFIRMED)
    }

    /// Best candidate scoring strictly above [`THRESHOLD`]. When two
    /// candidates tie, the one seen first wins.
    pub fn winner(&self) -> Option<DeviceKind> {
        let mut best = None;
        let mut high = THRESHOLD;
        for &(kind, score) in &self.entries {
            if score > high {
                high = score;
                best = Some(kind);
            }
        }
        best
    }

    pub fn scores(&self) -> &[(DeviceKind, i32)] {
        &self.entries
    }
}
