//! Adaptive control logic
//!
//! Pure, side-effect free pieces of a controller cycle:
//! - EWMA smoothing of raw utilization
//! - per-node adaptive overload thresholds
//! - classification into overloaded / standby / powered-off candidates
//! - active-set selection and the capacity recruit/release plan

mod classifier;
mod selector;
mod smoother;
mod threshold;

pub use classifier::{classify, Candidate, Classification, ScoredNode};
pub use selector::{
    plan_capacity, rank_candidates, select, CapacityPlan, Selection, RECRUIT_THRESHOLD,
};
pub use smoother::{Smoother, BIAS_MARGIN, EWMA_ALPHA};
pub use threshold::{ThresholdState, INITIAL_THRESHOLD, SATURATION_CPU};
