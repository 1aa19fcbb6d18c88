//! Scheduled analysis.

use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::Serialize;
use ssa_testing::gen_alpha;
use ssa_wait::WaitOptions;
use tracing::{info, warn};

use crate::appliance::{Appliance, ControlApi, Target};
use crate::scan::wait_for_analysis;
use crate::SmartStateError;

pub const FILTER_SINGLE_VM: &str = "A single VM";
pub const RUN_ONCE: &str = "Once";
pub const TIME_ZONE_UTC: &str = "(GMT+00:00) UTC";

/// Hour and minute a schedule starts at, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    pub hour: u32,
    pub minute: u32,
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Unpadded, as the schedule form expects.
        write!(f, "{}:{}", self.hour, self.minute)
    }
}

/// The next five-minute boundary at least three minutes after `now`.
///
/// Boundaries closer than three minutes are skipped.
pub fn next_schedule_slot(now: DateTime<Utc>) -> ScheduleSlot {
    let mut delta = 5 - i64::from(now.minute() % 5);
    if delta < 3 {
        delta += 5;
    }
    let at = now + ChronoDuration::minutes(delta);
    ScheduleSlot {
        hour: at.hour(),
        minute: at.minute(),
    }
}

/// A run-once analysis schedule for a single VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRequest {
    pub name: String,
    pub description: String,
    pub active: bool,
    pub filter_level1: String,
    pub filter_level2: String,
    pub run_type: String,
    pub time_zone: String,
    pub start_hour: String,
    pub start_minute: String,
}

impl ScheduleRequest {
    /// Schedule an analysis of `vm_name` at the next slot after `now`.
    pub fn single_vm_once(vm_name: &str, now: DateTime<Utc>) -> Self {
        let slot = next_schedule_slot(now);
        Self {
            name: format!("test_ssa_schedule{}", gen_alpha(8)),
            description: "Testing SSA via Schedule".to_string(),
            active: true,
            filter_level1: FILTER_SINGLE_VM.to_string(),
            filter_level2: vm_name.to_string(),
            run_type: RUN_ONCE.to_string(),
            time_zone: TIME_ZONE_UTC.to_string(),
            start_hour: slot.hour.to_string(),
            start_minute: slot.minute.to_string(),
        }
    }
}

/// Create a schedule analysing `target` once, then wait for the analysis.
///
/// Returns the created request so the caller can delete it. If the wait
/// fails the schedule is deleted before the error is returned.
pub async fn schedule_analysis<C, A>(
    control: &C,
    appliance: &A,
    target: &Target,
    now: DateTime<Utc>,
    opts: &WaitOptions,
) -> Result<ScheduleRequest, SmartStateError>
where
    C: ControlApi + ?Sized,
    A: Appliance + ?Sized,
{
    let request = ScheduleRequest::single_vm_once(&target.name, now);
    info!(
        schedule = %request.name,
        vm = %target.name,
        hour = %request.start_hour,
        minute = %request.start_minute,
        "Creating analysis schedule"
    );
    control.create_schedule(&request).await?;
    if let Err(err) = wait_for_analysis(appliance, &target.name, opts).await {
        if let Err(delete_err) = control.delete_schedule(&request.name).await {
            warn!(schedule = %request.name, error = %delete_err, "Failed to delete schedule");
        }
        return Err(err);
    }
    Ok(request)
}
