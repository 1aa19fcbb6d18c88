//! Schedule slot calculation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use ssa_smartstate::schedule::{next_schedule_slot, ScheduleSlot};

use super::CommandContext;
use crate::output::{print_fields, Field};

/// Print the start time a scheduled analysis would use.
#[derive(Debug, Args)]
pub struct ScheduleSlotCommand {
    /// Reference time (RFC 3339); defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct SlotInfo {
    now: DateTime<Utc>,
    slot: ScheduleSlot,
}

impl ScheduleSlotCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let now = self.at.unwrap_or_else(Utc::now);
        let info = SlotInfo {
            now,
            slot: next_schedule_slot(now),
        };
        let fields = vec![
            Field::new("now", now.format("%H:%M:%S UTC")),
            Field::new("start_hour", info.slot.hour),
            Field::new("start_minute", info.slot.minute),
        ];
        print_fields(&info, &fields, ctx.format);
        Ok(())
    }
}
