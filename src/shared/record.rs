//! Record Types
//!
//! Tables, identifiers and typed views over the five collections the app
//! keeps (expenses, habits, notes, budgets, savings).
//!
//! The queue treats records as opaque attribute bags ([`Record`]); the typed
//! structs here exist for reading the cache and for building patches.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Attribute bag for one row
pub type Record = serde_json::Map<String, Value>;

/// Prefix marking identifiers generated locally for records created offline
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Default primary key field
pub const DEFAULT_MATCH_FIELD: &str = "id";

/// Convert a JSON object into a [`Record`]; anything else yields an empty record
pub fn record_from(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Logical collection a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Expenses,
    Habits,
    Notes,
    Budgets,
    Savings,
}

/// Ordering a collection is fetched in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: &'static str,
    pub ascending: bool,
}

impl Table {
    /// Every collection, in refetch order
    pub const ALL: [Table; 5] = [
        Table::Expenses,
        Table::Habits,
        Table::Notes,
        Table::Budgets,
        Table::Savings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Expenses => "expenses",
            Table::Habits => "habits",
            Table::Notes => "notes",
            Table::Budgets => "budgets",
            Table::Savings => "savings",
        }
    }

    /// Server-side ordering used when the whole collection is fetched
    pub fn default_order(&self) -> Option<SortOrder> {
        match self {
            Table::Expenses => Some(SortOrder { field: "date", ascending: false }),
            Table::Habits => Some(SortOrder { field: "created_at", ascending: false }),
            Table::Notes => Some(SortOrder { field: "updated_at", ascending: false }),
            Table::Budgets => None,
            Table::Savings => Some(SortOrder { field: "created_at", ascending: true }),
        }
    }

    /// Newest-first collections receive optimistic inserts at the front
    pub fn inserts_at_front(&self) -> bool {
        self.default_order().map(|order| !order.ascending).unwrap_or(false)
    }

    pub fn parse(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|table| table.as_str() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a record: numeric or textual, real or temporary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    /// Fresh placeholder id for a record created locally
    pub fn temporary() -> Self {
        RecordId::Text(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, RecordId::Text(text) if text.starts_with(TEMP_ID_PREFIX))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(RecordId::Number),
            Value::String(text) => Some(RecordId::Text(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Number(number) => Value::from(*number),
            RecordId::Text(text) => Value::from(text.clone()),
        }
    }

    /// Read the identifier stored under `field`
    pub fn of(record: &Record, field: &str) -> Option<Self> {
        record.get(field).and_then(RecordId::from_value)
    }

    /// Whether `value` holds this identifier
    pub fn matches(&self, value: &Value) -> bool {
        RecordId::from_value(value).as_ref() == Some(self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(number) => write!(f, "{}", number),
            RecordId::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        RecordId::Number(value.into())
    }
}

/// A typed row bound to its collection
pub trait TableRecord: DeserializeOwned {
    const TABLE: Table;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Food,
    Transport,
    Shopping,
    Bills,
    Health,
    Entertainment,
    Others,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: RecordId,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<String>,
    pub category: ExpenseCategory,
}

impl TableRecord for Expense {
    const TABLE: Table = Table::Expenses;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitCategory {
    Health,
    Productivity,
    Learning,
    Spirituality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub category: Option<HabitCategory>,
    #[serde(default)]
    pub reminder_time: Option<String>,
}

impl TableRecord for Habit {
    const TABLE: Table = Table::Habits;
}

/// Result of toggling a habit for one day
#[derive(Debug, Clone, PartialEq)]
pub struct HabitToggle {
    pub completed_dates: Vec<NaiveDate>,
    pub streak: u32,
    /// True when the toggle marked the day as done
    pub completed: bool,
}

impl HabitToggle {
    /// UPDATE payload for the habit row
    pub fn to_patch(&self) -> Record {
        let mut patch = Record::new();
        let dates = self
            .completed_dates
            .iter()
            .map(|date| Value::from(date.format("%Y-%m-%d").to_string()))
            .collect();
        patch.insert("completed_dates".to_string(), Value::Array(dates));
        patch.insert("streak".to_string(), Value::from(self.streak));
        patch
    }
}

impl Habit {
    pub fn is_completed_on(&self, day: NaiveDate) -> bool {
        self.completed_dates.contains(&day)
    }

    /// Flip completion for `today` and recompute the streak
    pub fn toggle(&self, today: NaiveDate) -> HabitToggle {
        let completed = !self.is_completed_on(today);
        let completed_dates: Vec<NaiveDate> = if completed {
            let mut dates = self.completed_dates.clone();
            dates.push(today);
            dates
        } else {
            self.completed_dates.iter().copied().filter(|d| *d != today).collect()
        };
        let streak = streak_ending(&completed_dates, today);
        HabitToggle {
            completed_dates,
            streak,
            completed,
        }
    }
}

/// Consecutive completed days ending today, or ending yesterday when today is not done yet
pub fn streak_ending(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let done: HashSet<NaiveDate> = dates.iter().copied().collect();
    let mut day = if done.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    while done.contains(&day) {
        streak += 1;
        day = match day.pred_opt() {
            Some(previous) => previous,
            None => break,
        };
    }
    streak
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TableRecord for Note {
    const TABLE: Table = Table::Notes;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: RecordId,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub month_year: Option<String>,
}

impl TableRecord for Budget {
    const TABLE: Table = Table::Budgets;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saving {
    pub id: RecordId,
    pub name: String,
    pub target: f64,
    #[serde(default)]
    pub current: f64,
}

impl TableRecord for Saving {
    const TABLE: Table = Table::Savings;
}

impl Saving {
    /// Whether adding `amount` crosses the target for the first time
    pub fn reaches_target_with(&self, amount: f64) -> bool {
        self.current < self.target && self.current + amount >= self.target
    }
}
