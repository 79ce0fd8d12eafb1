//! Active-set selection
//!
//! Two independent passes run every cycle:
//! - rotation: pick the single primary target from the ordered candidates
//! - capacity: recruit one extra waiting node when the primary runs hot,
//!   or offer every waiting node for release when it does not

use super::classifier::{Candidate, Classification};
use crate::models::SmoothedValue;
use std::cmp::Ordering;

/// Smoothed CPU or memory of the primary at which extra capacity is recruited
pub const RECRUIT_THRESHOLD: f64 = 60.0;

/// Outcome of the rotation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Newly designated primary active node
    pub primary: Option<Candidate>,
    /// Every other candidate, in ranking order
    pub waiting: Vec<Candidate>,
}

/// Outcome of the capacity pass
#[derive(Debug, Clone, PartialEq)]
pub enum CapacityPlan {
    /// No primary was chosen, or the primary is hot with nothing to recruit
    Hold,
    /// Bring this waiting node up as additional active capacity
    Recruit(Candidate),
    /// Power down these waiting nodes where it is safe to do so
    Release(Vec<Candidate>),
}

/// Order candidates: reporting standby nodes by `(cpu, mem)` descending, ties
/// in enumeration order, then powered-off nodes in fleet order
pub fn rank_candidates(classification: &Classification) -> Vec<Candidate> {
    let mut ranked = classification.standby.clone();
    ranked.sort_by(|a, b| compare_utilization(b, a));
    ranked.extend(classification.powered_off.iter().cloned());
    ranked
}

fn compare_utilization(a: &Candidate, b: &Candidate) -> Ordering {
    let (a_cpu, a_mem) = a.utilization.unwrap_or_default();
    let (b_cpu, b_mem) = b.utilization.unwrap_or_default();
    a_cpu
        .total_cmp(&b_cpu)
        .then_with(|| a_mem.total_cmp(&b_mem))
}

/// Rotation pass: the head of the ranking becomes primary, the rest wait
pub fn select(classification: &Classification) -> Selection {
    let mut ranked = rank_candidates(classification).into_iter();
    let primary = ranked.next();
    Selection {
        primary,
        waiting: ranked.collect(),
    }
}

/// Capacity pass, driven by the primary's smoothed utilization
///
/// A primary without smoothed values (it was powered off and reports no
/// metrics) counts as idle.
pub fn plan_capacity(
    selection: &Selection,
    primary_smoothed: Option<SmoothedValue>,
) -> CapacityPlan {
    if selection.primary.is_none() {
        return CapacityPlan::Hold;
    }

    let load = primary_smoothed.unwrap_or(SmoothedValue::new(0.0, 0.0));
    if load.ewma_cpu >= RECRUIT_THRESHOLD || load.ewma_mem >= RECRUIT_THRESHOLD {
        match selection.waiting.first() {
            Some(next) => CapacityPlan::Recruit(next.clone()),
            None => CapacityPlan::Hold,
        }
    } else {
        CapacityPlan::Release(selection.waiting.clone())
    }
}
