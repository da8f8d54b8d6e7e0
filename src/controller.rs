use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::DashboardError;
use crate::models::{
    AttendanceStats, DashboardSnapshot, DashboardStats, DonationRecord, DonationTrendAnalysis,
    EventRecord, MemberRecord, ServiceAttendance, SmsConversation, TaskRecord, WeeklyDonation,
};
use crate::service::DashboardService;
use crate::stats::ServiceBucket;

pub const UPCOMING_EVENT_LIMIT: usize = 5;
pub const RECENT_PEOPLE_LIMIT: usize = 5;

const BLOCKED_TITLE: &str = "Organization required";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn success(title: &str, message: &str) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.to_string(),
            message: message.to_string(),
        }
    }

    /// Blocking errors get their own title; refreshing will not clear them.
    fn error(title: &str, err: &DashboardError) -> Self {
        let title = if err.is_blocking() {
            BLOCKED_TITLE
        } else {
            title
        };
        Self {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: err.to_string(),
        }
    }
}

/// User-facing notifications (toasts in a UI, stderr lines in the CLI).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Error => error!(title = %notice.title, "{}", notice.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardViewModel {
    pub members: Vec<MemberRecord>,
    pub donations: Vec<DonationRecord>,
    pub events: Vec<EventRecord>,
    pub tasks: Vec<TaskRecord>,
    pub sms_conversations: Vec<SmsConversation>,
    pub personal_tasks: Vec<TaskRecord>,
    pub stats: DashboardStats,
    pub upcoming_events: Vec<EventRecord>,
    pub recent_people: Vec<MemberRecord>,
    pub weekly_donations: Vec<WeeklyDonation>,
    pub donation_trend_analysis: Option<DonationTrendAnalysis>,
    pub is_loading: bool,
    pub organization_id: Option<Uuid>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DashboardViewModel {
    pub fn compose(
        snapshot: DashboardSnapshot,
        personal_tasks: Vec<TaskRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut upcoming_events: Vec<EventRecord> = snapshot
            .raw
            .events
            .iter()
            .filter(|event| event.start_date >= now)
            .cloned()
            .collect();
        upcoming_events.sort_by_key(|event| event.start_date);
        upcoming_events.truncate(UPCOMING_EVENT_LIMIT);

        let mut recent_people = snapshot.raw.members.clone();
        recent_people.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_people.truncate(RECENT_PEOPLE_LIMIT);

        Self {
            members: snapshot.raw.members,
            donations: snapshot.raw.donations,
            events: snapshot.raw.events,
            tasks: snapshot.raw.tasks,
            sms_conversations: snapshot.raw.sms_conversations,
            personal_tasks,
            stats: snapshot.stats,
            upcoming_events,
            recent_people,
            weekly_donations: snapshot.donation_trends.weekly.clone(),
            donation_trend_analysis: Some(snapshot.donation_trends),
            is_loading: false,
            organization_id: Some(snapshot.organization_id),
            last_updated: Some(snapshot.last_updated),
        }
    }

    /// Per-service attendance in the shape older dashboard widgets expect.
    pub fn attendance_stats(&self) -> Vec<ServiceAttendance> {
        service_breakdown(&self.stats.attendance)
    }
}

pub fn service_breakdown(attendance: &AttendanceStats) -> Vec<ServiceAttendance> {
    [
        (ServiceBucket::SundayService, attendance.sunday_service),
        (ServiceBucket::BibleStudy, attendance.bible_study),
        (ServiceBucket::Fellowship, attendance.fellowship),
    ]
    .into_iter()
    .map(|(bucket, total_attendance)| ServiceAttendance {
        service_type: bucket.label().to_string(),
        total_attendance,
    })
    .collect()
}

/// Holds the dashboard view-model and drives loads through the service.
///
/// A failed load keeps whatever was shown before; the error goes to the
/// notifier instead of blanking the dashboard.
pub struct DashboardController {
    service: Arc<DashboardService>,
    notifier: Arc<dyn Notifier>,
    state: LoadState,
    view: DashboardViewModel,
}

impl DashboardController {
    pub fn new(service: Arc<DashboardService>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            service,
            notifier,
            state: LoadState::Idle,
            view: DashboardViewModel::default(),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn view_model(&self) -> &DashboardViewModel {
        &self.view
    }

    pub fn attendance_stats(&self) -> Vec<ServiceAttendance> {
        self.view.attendance_stats()
    }

    /// Initial load: silent on success, notifies on failure.
    pub async fn load(&mut self) {
        if let Err(err) = self.load_data().await {
            self.notifier.notify(Notice::error("Failed to load dashboard", &err));
        }
    }

    pub async fn refresh(&mut self) {
        self.service.clear_cache();
        match self.load_data().await {
            Ok(()) => self
                .notifier
                .notify(Notice::success("Dashboard refreshed", "Latest data loaded")),
            Err(err) => self
                .notifier
                .notify(Notice::error("Failed to refresh dashboard", &err)),
        }
    }

    async fn load_data(&mut self) -> Result<(), DashboardError> {
        self.state = LoadState::Loading;
        self.view.is_loading = true;

        match self.service.get_all_dashboard_data().await {
            Ok(snapshot) => {
                let personal_tasks = self
                    .service
                    .get_personal_tasks(snapshot.organization_id)
                    .await;
                let now = self.service.now();
                self.view = DashboardViewModel::compose(snapshot, personal_tasks, now);
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(err) => {
                self.view.is_loading = false;
                self.state = LoadState::Error(err.to_string());
                Err(err)
            }
        }
    }
}
