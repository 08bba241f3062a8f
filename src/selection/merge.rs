//! Decides how a select-by-value call combines with the current selection.
//!
//! Repeated radius-limited select-by-value clicks only need to clear the
//! region the previous click selected, rather than the whole selection.
//! After any other operation, or when the selection mode has changed in
//! between, the full selection must be cleared first.

use log::debug;

use crate::volume::Region;

/// Kind of selection operation performed by interaction code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOp {
    /// Manual brush selection.
    Select,
    /// Manual brush deselection.
    Deselect,
    /// Select-by-value (intensity) selection.
    SelectByValue,
}

/// How the next select-by-value call should treat the existing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Clear the selection (or the current slice) before selecting.
    Clear,
    /// Overwrite without clearing.
    Skip,
    /// Clear only this region before selecting.
    Merge(Region),
}

#[derive(Debug, Clone, Copy)]
struct Recorded {
    op: SelectionOp,
    is_3d: bool,
    limit_to_radius: bool,
}

/// Remembers the last selection operation.
#[derive(Debug, Default)]
pub struct MergeAdvisor {
    last: Option<Recorded>,
    region: Option<Region>,
}

impl MergeAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed operation. A manual [`SelectionOp::Select`]
    /// sticks until the next [`decide`](Self::decide).
    pub fn record(&mut self, op: SelectionOp, region: Option<Region>, is_3d: bool, limit_to_radius: bool) {
        if matches!(self.last, Some(Recorded { op: SelectionOp::Select, .. })) {
            return;
        }

        self.last = Some(Recorded {
            op,
            is_3d,
            limit_to_radius,
        });
        self.region = match op {
            SelectionOp::SelectByValue if limit_to_radius => region,
            _ => None,
        };
    }

    /// Decision for the select-by-value call about to run. Resets the
    /// recorded state.
    pub fn decide(&mut self, is_3d: bool, limit_to_radius: bool) -> MergeDecision {
        let last = self.last.take();
        let region = self.region.take();

        let decision = if !limit_to_radius {
            MergeDecision::Skip
        } else {
            match last {
                None => MergeDecision::Clear,
                Some(Recorded { op: SelectionOp::Select, .. }) => MergeDecision::Clear,
                Some(r) if r.is_3d != is_3d || r.limit_to_radius != limit_to_radius => MergeDecision::Clear,
                Some(_) => region.map_or(MergeDecision::Clear, MergeDecision::Merge),
            }
        };

        debug!("merge decision {decision:?} (last {last:?})");
        decision
    }

    /// Forget everything recorded.
    pub fn reset(&mut self) {
        self.last = None;
        self.region = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        Region::new([2, 2, 2], [3, 3, 3])
    }

    #[test]
    fn test_without_radius_limit_skips() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::SelectByValue, Some(region()), false, true);
        assert_eq!(advisor.decide(false, false), MergeDecision::Skip);
    }

    #[test]
    fn test_nothing_recorded_clears() {
        let mut advisor = MergeAdvisor::new();
        assert_eq!(advisor.decide(true, true), MergeDecision::Clear);
    }

    #[test]
    fn test_repeated_select_by_value_merges() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::SelectByValue, Some(region()), true, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Merge(region()));
    }

    #[test]
    fn test_manual_select_forces_clear() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::Select, None, true, true);
        // A later record does not override the manual select
        advisor.record(SelectionOp::SelectByValue, Some(region()), true, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Clear);

        advisor.record(SelectionOp::SelectByValue, Some(region()), true, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Merge(region()));
    }

    #[test]
    fn test_mode_change_clears() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::SelectByValue, Some(region()), false, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Clear);
    }

    #[test]
    fn test_region_only_kept_for_radius_limited_select_by_value() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::Deselect, Some(region()), true, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Clear);
    }

    #[test]
    fn test_decide_is_one_shot() {
        let mut advisor = MergeAdvisor::new();
        advisor.record(SelectionOp::SelectByValue, Some(region()), true, true);
        advisor.decide(true, true);
        assert_eq!(advisor.decide(true, true), MergeDecision::Clear);
    }
}
