//! Fakes and fixtures shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::cache::Clock;
use crate::controller::{Notice, Notifier};
use crate::error::Dataset;
use crate::models::{
    AttendanceEntry, DonationRecord, EventRecord, FamilyRecord, MemberRecord, MemberStatus,
    MemberType, RawDatasets, SmsConversation, TaskRecord, TaskStatus,
};
use crate::source::DataSource;

/// Wednesday 2026-03-18 15:00 UTC.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 18, 15, 0, 0).unwrap()
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(test_now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn member(status: MemberStatus, family_ids: Vec<Uuid>) -> MemberRecord {
    MemberRecord {
        id: Uuid::new_v4(),
        first_name: "Avery".to_string(),
        last_name: "Lee".to_string(),
        status: Some(status),
        member_type: Some(MemberType::Adult),
        birth_date: None,
        anniversary_date: None,
        join_date: None,
        created_at: test_now() - Duration::days(3),
        family_ids,
    }
}

pub fn attendance(member_id: Option<Uuid>, status: &str) -> AttendanceEntry {
    AttendanceEntry {
        member_id,
        status: status.to_string(),
    }
}

pub fn event(
    event_type: &str,
    start: DateTime<Utc>,
    attendance: Vec<AttendanceEntry>,
) -> EventRecord {
    EventRecord {
        id: Uuid::new_v4(),
        title: event_type.to_string(),
        event_type: Some(event_type.to_string()),
        start_date: start,
        end_date: Some(start + Duration::hours(2)),
        needs_volunteers: false,
        attendance,
    }
}

pub fn donation(amount: f64, date: NaiveDate) -> DonationRecord {
    DonationRecord {
        id: Uuid::new_v4(),
        amount,
        date,
        donation_type: Some("tithe".to_string()),
        notes: None,
    }
}

pub fn task(status: TaskStatus, due_date: Option<DateTime<Utc>>) -> TaskRecord {
    TaskRecord {
        id: Uuid::new_v4(),
        title: "Call new visitors".to_string(),
        status: Some(status),
        priority: Some("medium".to_string()),
        due_date,
        assigned_to: None,
        requested_by: None,
        created_at: test_now() - Duration::days(7),
    }
}

pub fn sms(status: Option<&str>, updated_at: DateTime<Utc>, message_count: i64) -> SmsConversation {
    SmsConversation {
        id: Uuid::new_v4(),
        title: Some("Prayer chain".to_string()),
        conversation_type: Some("group".to_string()),
        status: status.map(str::to_string),
        updated_at,
        message_count,
    }
}

pub fn family(name: &str) -> FamilyRecord {
    FamilyRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
    }
}

/// In-memory [`DataSource`] that counts calls per dataset.
pub struct FakeSource {
    pub organization: Option<Uuid>,
    pub member: Option<Uuid>,
    pub datasets: RawDatasets,
    pub personal_tasks: Vec<TaskRecord>,
    fail_on: Mutex<Option<Dataset>>,
    pub fail_personal_tasks: bool,
    pub delay: Option<StdDuration>,
    pub resolve_delay: Option<StdDuration>,
    calls: [AtomicUsize; 6],
    resolve_calls: AtomicUsize,
    personal_calls: AtomicUsize,
    scoped_to: Mutex<Vec<Uuid>>,
}

impl FakeSource {
    pub fn new(organization: Uuid, datasets: RawDatasets) -> Self {
        Self {
            organization: Some(organization),
            member: None,
            datasets,
            personal_tasks: Vec::new(),
            fail_on: Mutex::new(None),
            fail_personal_tasks: false,
            delay: None,
            resolve_delay: None,
            calls: Default::default(),
            resolve_calls: AtomicUsize::new(0),
            personal_calls: AtomicUsize::new(0),
            scoped_to: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failure(&self, dataset: Option<Dataset>) {
        *self.fail_on.lock() = dataset;
    }

    pub fn calls(&self, dataset: Dataset) -> usize {
        self.calls[Self::slot(dataset)].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        Dataset::ALL.iter().map(|dataset| self.calls(*dataset)).sum()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn personal_calls(&self) -> usize {
        self.personal_calls.load(Ordering::SeqCst)
    }

    pub fn scoped_organizations(&self) -> Vec<Uuid> {
        self.scoped_to.lock().clone()
    }

    fn slot(dataset: Dataset) -> usize {
        Dataset::ALL
            .iter()
            .position(|candidate| *candidate == dataset)
            .unwrap_or_default()
    }

    async fn record(&self, dataset: Dataset, organization_id: Uuid) -> anyhow::Result<()> {
        self.calls[Self::slot(dataset)].fetch_add(1, Ordering::SeqCst);
        self.scoped_to.lock().push(organization_id);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on.lock() == Some(dataset) {
            anyhow::bail!("{dataset} table unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn resolve_organization(&self) -> anyhow::Result<Option<Uuid>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.organization)
    }

    async fn current_member(&self, _organization_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        Ok(self.member)
    }

    async fn fetch_members(&self, organization_id: Uuid) -> anyhow::Result<Vec<MemberRecord>> {
        self.record(Dataset::Members, organization_id).await?;
        Ok(self.datasets.members.clone())
    }

    async fn fetch_events(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventRecord>> {
        self.record(Dataset::Events, organization_id).await?;
        Ok(self
            .datasets
            .events
            .iter()
            .filter(|event| event.start_date >= from && event.start_date <= to)
            .cloned()
            .collect())
    }

    async fn fetch_donations(
        &self,
        organization_id: Uuid,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<DonationRecord>> {
        self.record(Dataset::Donations, organization_id).await?;
        Ok(self
            .datasets
            .donations
            .iter()
            .filter(|donation| donation.date >= since)
            .cloned()
            .collect())
    }

    async fn fetch_tasks(&self, organization_id: Uuid) -> anyhow::Result<Vec<TaskRecord>> {
        self.record(Dataset::Tasks, organization_id).await?;
        Ok(self.datasets.tasks.clone())
    }

    async fn fetch_sms_conversations(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<SmsConversation>> {
        self.record(Dataset::SmsConversations, organization_id).await?;
        Ok(self
            .datasets
            .sms_conversations
            .iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn fetch_families(&self, organization_id: Uuid) -> anyhow::Result<Vec<FamilyRecord>> {
        self.record(Dataset::Families, organization_id).await?;
        Ok(self.datasets.families.clone())
    }

    async fn fetch_personal_tasks(
        &self,
        _organization_id: Uuid,
        _member_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<TaskRecord>> {
        self.personal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_personal_tasks {
            anyhow::bail!("tasks view timed out");
        }
        Ok(self
            .personal_tasks
            .iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
