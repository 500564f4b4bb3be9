use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::schedule;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Facility identifier embedded in the class-calendar path.
    pub facility_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Wall clock the facility schedules against.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// When set, every booked slot is appended here as a JSON line.
    pub summary_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Fixed horizon re-poll cadence in minutes. Unset means "wake at the
    /// top of the next hour".
    pub horizon_interval_minutes: Option<u64>,
    #[serde(default = "default_crawl_interval")]
    pub crawl_interval_secs: u64,
    #[serde(default = "default_auth_backoff")]
    pub auth_backoff_minutes: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_minutes: u64,
    /// Overrides the per-class-type day-rollover offset when set.
    pub rollover_offset_minutes: Option<i64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            horizon_interval_minutes: None,
            crawl_interval_secs: default_crawl_interval(),
            auth_backoff_minutes: default_auth_backoff(),
            retry_backoff_minutes: default_retry_backoff(),
            rollover_offset_minutes: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_crawl_interval() -> u64 {
    30
}

fn default_auth_backoff() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub preferences: Vec<Preference>,
}

/// A standing booking rule: one weekday, the acceptable start times in
/// preference order, and companions who must also fit in the slot.
#[derive(Debug, Clone, Deserialize)]
pub struct Preference {
    pub class_type: ClassType,
    pub weekday: String,
    pub times: Vec<String>,
    #[serde(default)]
    pub companions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    Gym,
    Swimming,
    Tennis,
}

impl ClassType {
    pub const ALL: [ClassType; 3] = [ClassType::Gym, ClassType::Swimming, ClassType::Tennis];

    /// Name of the class type on the remote API.
    pub fn api_name(&self) -> &'static str {
        match self {
            ClassType::Gym => "gymClass",
            ClassType::Swimming => "swimmingClass",
            ClassType::Tennis => "tennisClass",
        }
    }

    /// Minutes past midnight at which the remote calendar rolls over to the
    /// next operating day for this class type.
    pub fn rollover_offset_min(&self) -> i64 {
        match self {
            ClassType::Gym | ClassType::Swimming => 55,
            ClassType::Tennis => 835,
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassType::Gym => "gym",
            ClassType::Swimming => "swimming",
            ClassType::Tennis => "tennis",
        };
        f.write_str(name)
    }
}

/// Raw upcoming-booking record as the remote service returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct UpcomingBooking {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: String,
    pub class: UpcomingClass,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpcomingClass {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "classDate")]
    pub date: String,
    #[serde(rename = "classTime")]
    pub time: String,
}

/// One calendar day of the slot inventory; `id` encodes the day's date.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotGroup {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub classes: Vec<RemoteSlot>,
}

/// A real bookable class instance with capacity and activity state.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSlot {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "classDate")]
    pub date: String,
    #[serde(rename = "classTime")]
    pub time: String,
    pub limit: u32,
    #[serde(rename = "joinedUsers")]
    pub joined_users: u32,
    pub active: bool,
    #[serde(default, rename = "attendanceList")]
    pub attendance: Vec<Attendance>,
}

impl RemoteSlot {
    pub fn available(&self) -> u32 {
        self.limit.saturating_sub(self.joined_users)
    }

    /// Whether this user previously cancelled their attendance on the slot.
    pub fn cancelled_by(&self, user_id: &str) -> bool {
        self.attendance
            .iter()
            .any(|a| a.user == user_id && a.status.eq_ignore_ascii_case("cancelled"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attendance {
    pub user: String,
    pub status: String,
}

/// Normalized view of an active remote reservation, used to exclude
/// matching candidates.
#[derive(Debug, Clone)]
pub struct ScheduledClass {
    pub booking_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub time: String,
}

impl ScheduledClass {
    pub fn from_remote(b: &UpcomingBooking) -> Result<Self, ApiError> {
        let date = schedule::parse_remote_date(&b.class.date)?;
        Ok(Self {
            booking_id: b.id.clone(),
            class_id: b.class.id.clone(),
            date,
            weekday: date.weekday(),
            time: b.class.time.clone(),
        })
    }
}

/// A concrete booking attempt derived from a preference for one date.
/// Regenerated from remote state every cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub time: String,
    pub companions: Vec<String>,
}

impl Candidate {
    /// Spots the slot must have free: the user plus every companion.
    pub fn required_spots(&self) -> u32 {
        1 + self.companions.len() as u32
    }
}

/// A candidate resolved against a live slot, ready to book.
#[derive(Debug, Clone)]
pub struct MatchedSlot {
    pub class_id: String,
    pub date: NaiveDate,
    pub time: String,
}
