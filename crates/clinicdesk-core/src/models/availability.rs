use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookable time slot on the doctor's calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct AvailabilitySlot {
    pub id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// A slot to create; the server assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct NewSlot {
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub id: String,
}

/// Body of `POST availability/update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    #[serde(rename = "addedSlots")]
    pub added_slots: Vec<NewSlot>,
    #[serde(rename = "removedSlots")]
    pub removed_slots: Vec<SlotRef>,
}

impl AvailabilityUpdate {
    /// Build an update from calendar edits: added slots lose their ids,
    /// removed slots keep only theirs.
    pub fn from_edits(added: &[AvailabilitySlot], removed: &[AvailabilitySlot]) -> Self {
        Self {
            added_slots: added
                .iter()
                .map(|slot| NewSlot {
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                })
                .collect(),
            removed_slots: removed
                .iter()
                .map(|slot| SlotRef {
                    id: slot.id.clone(),
                })
                .collect(),
        }
    }
}
