use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString, VariantArray};
use time::{Date, OffsetDateTime};

/// Outcome a user records for a slot. Unmarked slots carry no status at all.
#[derive(
    Serialize,
    Deserialize,
    EnumString,
    VariantArray,
    Display,
    AsRefStr,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompletionStatus {
    Followed,
    Adjusted,
    Skipped,
    Replaced,
    Social,
}

#[derive(EnumString, Display, AsRefStr, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum SlotActionKind {
    Complete,
    Uncomplete,
}

/// A user intent against a single slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotAction {
    Complete(CompletionStatus),
    Uncomplete,
}

impl SlotAction {
    pub fn kind(&self) -> SlotActionKind {
        match self {
            SlotAction::Complete(_) => SlotActionKind::Complete,
            SlotAction::Uncomplete => SlotActionKind::Uncomplete,
        }
    }

    pub fn status(&self) -> Option<CompletionStatus> {
        match self {
            SlotAction::Complete(status) => Some(*status),
            SlotAction::Uncomplete => None,
        }
    }

    /// Rebuilds an action from its stored parts. A `complete` without a
    /// status is not a valid action.
    pub fn from_parts(kind: SlotActionKind, status: Option<CompletionStatus>) -> Option<Self> {
        match (kind, status) {
            (SlotActionKind::Complete, Some(status)) => Some(SlotAction::Complete(status)),
            (SlotActionKind::Uncomplete, _) => Some(SlotAction::Uncomplete),
            (SlotActionKind::Complete, None) => None,
        }
    }
}

impl fmt::Display for SlotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotAction::Complete(status) => write!(f, "complete-{status}"),
            SlotAction::Uncomplete => f.write_str("uncomplete"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DayTemplate {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SlotMealType {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SlotMeal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub portion_description: String,
    #[serde(default)]
    pub calories_kcal: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub id: String,
    pub position: i32,
    #[serde(default)]
    pub meal_type: Option<SlotMealType>,
    #[serde(default)]
    pub meal: Option<SlotMeal>,
    /// What was eaten instead, for adjusted or replaced slots.
    #[serde(default)]
    pub actual_meal: Option<SlotMeal>,
    #[serde(default)]
    pub completion_status: Option<CompletionStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Derived locally, whatever the server sent.
    #[serde(default)]
    pub is_next: bool,
    #[serde(default)]
    pub is_adhoc: bool,
    #[serde(default)]
    pub is_manual_override: bool,
}

impl Slot {
    pub fn is_completed(&self) -> bool {
        self.completion_status.is_some()
    }

    pub fn display_name(&self) -> &str {
        match (&self.actual_meal, &self.meal, &self.meal_type) {
            (Some(meal), _, _) | (None, Some(meal), _) => &meal.name,
            (None, None, Some(meal_type)) => &meal_type.name,
            (None, None, None) => &self.id,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TodayStats {
    pub completed: u32,
    pub total: u32,
    #[serde(default)]
    pub streak_days: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TodaySnapshot {
    #[serde(default)]
    pub date: Option<Date>,
    #[serde(default)]
    pub weekday: String,
    #[serde(default)]
    pub template: Option<DayTemplate>,
    #[serde(default)]
    pub is_override: bool,
    #[serde(default)]
    pub override_reason: Option<String>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub stats: TodayStats,
}

impl TodaySnapshot {
    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    pub fn next_slot(&self) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.is_next)
    }

    pub fn unmarked_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|slot| !slot.is_completed())
    }

    pub fn is_day_complete(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(Slot::is_completed)
    }
}
