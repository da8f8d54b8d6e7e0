use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Inactive,
    Visitor,
}

impl MemberStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "visitor" => Some(Self::Visitor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    Adult,
    Child,
}

impl MemberType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "adult" => Some(Self::Adult),
            "child" => Some(Self::Child),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub status: Option<MemberStatus>,
    pub member_type: Option<MemberType>,
    pub birth_date: Option<NaiveDate>,
    pub anniversary_date: Option<NaiveDate>,
    pub join_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    /// Family ids in relationship-creation order.
    pub family_ids: Vec<Uuid>,
}

impl MemberRecord {
    /// Only the first relationship is attributed; later ones are ignored.
    pub fn primary_family(&self) -> Option<Uuid> {
        self.family_ids.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub member_id: Option<Uuid>,
    pub status: String,
}

impl AttendanceEntry {
    pub fn is_present(&self) -> bool {
        matches!(self.status.as_str(), "checked-in" | "attending")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub title: String,
    pub event_type: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub needs_volunteers: bool,
    pub attendance: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub id: Uuid,
    pub amount: f64,
    pub date: NaiveDate,
    pub donation_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Uuid,
    pub title: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConversation {
    pub id: Uuid,
    pub title: Option<String>,
    pub conversation_type: Option<String>,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyRecord {
    pub id: Uuid,
    pub name: String,
}

/// The six result sets of one dashboard fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDatasets {
    pub members: Vec<MemberRecord>,
    pub events: Vec<EventRecord>,
    pub donations: Vec<DonationRecord>,
    pub tasks: Vec<TaskRecord>,
    pub sms_conversations: Vec<SmsConversation>,
    pub families: Vec<FamilyRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub visitors: usize,
    pub recent: usize,
    pub adults: usize,
    pub children: usize,
    pub engagement_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total: usize,
    pub upcoming: usize,
    pub past: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub needing_volunteers: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    pub total: f64,
    pub monthly: f64,
    pub weekly: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub overdue: usize,
    pub completion_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub sunday_service: usize,
    pub bible_study: usize,
    pub fellowship: usize,
    pub sunday_service_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CelebrationStats {
    pub upcoming_birthdays: usize,
    pub upcoming_anniversaries: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsStats {
    pub total_conversations: usize,
    pub total_messages: i64,
    pub recent: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStats {
    pub total_families: usize,
    pub members_in_families: usize,
    /// Active members minus members in families; negative when inactive
    /// members hold the family relationships.
    pub members_without_families: i64,
    pub registered_families: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub members: MemberStats,
    pub donations: DonationStats,
    pub events: EventStats,
    pub tasks: TaskStats,
    pub celebrations: CelebrationStats,
    pub sms: SmsStats,
    pub attendance: AttendanceStats,
    pub family: FamilyStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendIndicator {
    pub direction: TrendDirection,
    pub percent_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDonation {
    pub week_start: NaiveDate,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationTrendAnalysis {
    pub weekly: Vec<WeeklyDonation>,
    pub current_week: f64,
    pub previous_week: f64,
    pub average_week: f64,
    pub trend: TrendIndicator,
}

/// Capped prefixes of the raw datasets kept for secondary displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSlices {
    pub members: Vec<MemberRecord>,
    pub donations: Vec<DonationRecord>,
    pub events: Vec<EventRecord>,
    pub tasks: Vec<TaskRecord>,
    pub sms_conversations: Vec<SmsConversation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub organization_id: Uuid,
    pub stats: DashboardStats,
    pub raw: RawSlices,
    pub donation_trends: DonationTrendAnalysis,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAttendance {
    pub service_type: String,
    pub total_attendance: usize,
}
