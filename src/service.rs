use std::future::Future;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Months, Utc};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{dashboard_cache_key, CacheStore, Clock};
use crate::error::{DashboardError, Dataset, FanOutError};
use crate::models::{DashboardSnapshot, RawDatasets, RawSlices, TaskRecord};
use crate::source::DataSource;
use crate::stats;

pub const MEMBER_SLICE: usize = 100;
pub const DONATION_SLICE: usize = 50;
pub const EVENT_SLICE: usize = 50;
pub const TASK_SLICE: usize = 20;
pub const SMS_SLICE: usize = 5;

pub const SMS_FETCH_LIMIT: i64 = 10;
pub const PERSONAL_TASK_LIMIT: i64 = 10;
pub const EVENT_LOOKBACK_MONTHS: u32 = 6;
pub const DONATION_LOOKBACK_MONTHS: u32 = 12;
pub const DEFAULT_QUERY_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Deadline for the whole six-query fan-out.
    pub query_timeout: StdDuration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Date bounds applied to the windowed dashboard queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub events_from: DateTime<Utc>,
    pub events_to: DateTime<Utc>,
    pub donations_since: chrono::NaiveDate,
}

impl QueryWindow {
    pub fn ending_at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let events_from = now
            .checked_sub_months(Months::new(EVENT_LOOKBACK_MONTHS))
            .unwrap_or_else(|| now - Duration::days(183));
        let events_to = today
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|end_of_day| end_of_day.and_utc())
            .unwrap_or(now);
        let donations_since = today
            .checked_sub_months(Months::new(DONATION_LOOKBACK_MONTHS))
            .unwrap_or_else(|| today - Duration::days(365));

        Self {
            events_from,
            events_to,
            donations_since,
        }
    }
}

async fn tagged<T>(
    dataset: Dataset,
    query: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, FanOutError> {
    query.await.map_err(|err| FanOutError::new(dataset, err))
}

/// Runs the six organization-scoped reads concurrently. The first failure
/// short-circuits the join and the other results are dropped.
pub async fn fetch_datasets(
    source: &dyn DataSource,
    organization_id: Uuid,
    window: QueryWindow,
) -> Result<RawDatasets, FanOutError> {
    let (members, events, donations, tasks, sms_conversations, families) = tokio::try_join!(
        tagged(Dataset::Members, source.fetch_members(organization_id)),
        tagged(
            Dataset::Events,
            source.fetch_events(organization_id, window.events_from, window.events_to),
        ),
        tagged(
            Dataset::Donations,
            source.fetch_donations(organization_id, window.donations_since),
        ),
        tagged(Dataset::Tasks, source.fetch_tasks(organization_id)),
        tagged(
            Dataset::SmsConversations,
            source.fetch_sms_conversations(organization_id, SMS_FETCH_LIMIT),
        ),
        tagged(Dataset::Families, source.fetch_families(organization_id)),
    )?;

    Ok(RawDatasets {
        members,
        events,
        donations,
        tasks,
        sms_conversations,
        families,
    })
}

pub fn raw_slices(raw: &RawDatasets) -> RawSlices {
    fn head<T: Clone>(rows: &[T], n: usize) -> Vec<T> {
        rows.iter().take(n).cloned().collect()
    }

    RawSlices {
        members: head(&raw.members, MEMBER_SLICE),
        donations: head(&raw.donations, DONATION_SLICE),
        events: head(&raw.events, EVENT_SLICE),
        tasks: head(&raw.tasks, TASK_SLICE),
        sms_conversations: head(&raw.sms_conversations, SMS_SLICE),
    }
}

pub fn build_snapshot(
    organization_id: Uuid,
    raw: &RawDatasets,
    now: DateTime<Utc>,
) -> DashboardSnapshot {
    DashboardSnapshot {
        organization_id,
        stats: stats::process_all_data(raw, now),
        raw: raw_slices(raw),
        donation_trends: stats::donation_trends(&raw.donations, now),
        last_updated: now,
    }
}

/// Aggregates everything the dashboard shows for the session's organization,
/// at most once per cache TTL unless the cache is cleared.
pub struct DashboardService {
    source: Arc<dyn DataSource>,
    cache: Mutex<CacheStore<DashboardSnapshot>>,
    organization: OnceCell<Uuid>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl DashboardService {
    pub fn new(
        source: Arc<dyn DataSource>,
        cache: CacheStore<DashboardSnapshot>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            source,
            cache: Mutex::new(cache),
            organization: OnceCell::new(),
            clock,
            config,
        }
    }

    /// The session's organization, looked up once and reused for the life of
    /// the service. A missing organization is not remembered, so a later call
    /// can pick up a membership created in the meantime.
    pub async fn resolve_organization(&self) -> Result<Uuid, DashboardError> {
        self.organization
            .get_or_try_init(|| async {
                let lookup = self.source.resolve_organization();
                let resolved = tokio::time::timeout(self.config.query_timeout, lookup)
                    .await
                    .map_err(|_| DashboardError::Timeout {
                        after: self.config.query_timeout,
                    })?
                    .map_err(|err| DashboardError::Session(err.into()))?
                    .ok_or(DashboardError::NoOrganization)?;
                debug!(organization_id = %resolved, "session organization resolved");
                Ok::<_, DashboardError>(resolved)
            })
            .await
            .copied()
    }

    pub async fn get_all_dashboard_data(&self) -> Result<DashboardSnapshot, DashboardError> {
        let organization_id = self.resolve_organization().await?;
        let key = dashboard_cache_key(organization_id);

        {
            let cache = self.cache.lock();
            if cache.is_valid(&key) {
                if let Some(snapshot) = cache.get(&key) {
                    debug!(%organization_id, "dashboard cache hit");
                    return Ok(snapshot);
                }
            }
        }
        debug!(%organization_id, "dashboard cache miss");

        let now = self.clock.now();
        let started = Instant::now();
        let fan_out = fetch_datasets(
            self.source.as_ref(),
            organization_id,
            QueryWindow::ending_at(now),
        );

        let raw = match tokio::time::timeout(self.config.query_timeout, fan_out).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                warn!(
                    %organization_id,
                    dataset = %err.dataset,
                    error = %err.source,
                    "dashboard query failed"
                );
                return Err(err.into());
            }
            Err(_) => {
                warn!(
                    %organization_id,
                    timeout_secs = self.config.query_timeout.as_secs(),
                    "dashboard queries timed out"
                );
                return Err(DashboardError::Timeout {
                    after: self.config.query_timeout,
                });
            }
        };

        info!(
            %organization_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            members = raw.members.len(),
            events = raw.events.len(),
            donations = raw.donations.len(),
            "dashboard datasets loaded"
        );

        let snapshot = build_snapshot(organization_id, &raw, now);
        self.cache.lock().set(key, snapshot.clone());
        Ok(snapshot)
    }

    /// Open tasks assigned to the session's member. Never cached; failures
    /// yield an empty list.
    pub async fn get_personal_tasks(&self, organization_id: Uuid) -> Vec<TaskRecord> {
        let lookup = self.fetch_personal_tasks(organization_id);
        match tokio::time::timeout(self.config.query_timeout, lookup).await {
            Ok(Ok(tasks)) => tasks,
            Ok(Err(err)) => {
                warn!(%organization_id, error = %err, "failed to load personal tasks");
                Vec::new()
            }
            Err(_) => {
                warn!(%organization_id, "personal tasks query timed out");
                Vec::new()
            }
        }
    }

    async fn fetch_personal_tasks(&self, organization_id: Uuid) -> anyhow::Result<Vec<TaskRecord>> {
        let Some(member_id) = self.source.current_member(organization_id).await? else {
            return Ok(Vec::new());
        };
        self.source
            .fetch_personal_tasks(organization_id, member_id, PERSONAL_TASK_LIMIT)
            .await
    }

    /// Drops cached dashboards for every organization.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        debug!("dashboard cache cleared");
    }

    pub fn is_cached(&self, organization_id: Uuid) -> bool {
        self.cache.lock().is_valid(&dashboard_cache_key(organization_id))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemberStatus, TaskStatus};
    use crate::testing::{
        donation, event, family, member, task, test_now, FakeSource, ManualClock,
    };

    fn service_with(
        source: Arc<FakeSource>,
        clock: Arc<ManualClock>,
        config: ServiceConfig,
    ) -> DashboardService {
        let cache = CacheStore::with_default_ttl(clock.clone());
        DashboardService::new(source, cache, clock, config)
    }

    fn sample_datasets() -> RawDatasets {
        let now = test_now();
        let household = family("Moreno");
        RawDatasets {
            members: vec![
                member(MemberStatus::Active, vec![household.id]),
                member(MemberStatus::Visitor, vec![household.id]),
            ],
            events: vec![event("Sunday Worship", now - Duration::days(3), vec![])],
            donations: vec![donation(100.0, now.date_naive())],
            tasks: vec![task(TaskStatus::Pending, None)],
            families: vec![household],
            ..RawDatasets::default()
        }
    }

    #[tokio::test]
    async fn second_load_within_ttl_hits_cache() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, sample_datasets()));
        let clock = Arc::new(ManualClock::default());
        let service = service_with(source.clone(), clock.clone(), ServiceConfig::default());

        let first = service.get_all_dashboard_data().await.unwrap();
        clock.advance(Duration::minutes(4));
        let second = service.get_all_dashboard_data().await.unwrap();

        assert_eq!(source.total_calls(), 6);
        for dataset in Dataset::ALL {
            assert_eq!(source.calls(dataset), 1, "{dataset}");
        }
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn organization_is_resolved_once_per_session() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, sample_datasets()));
        let clock = Arc::new(ManualClock::default());
        let service = service_with(source.clone(), clock.clone(), ServiceConfig::default());

        for _ in 0..3 {
            service.get_all_dashboard_data().await.unwrap();
        }
        assert_eq!(source.resolve_calls(), 1);
        assert_eq!(source.total_calls(), 6);

        service.clear_cache();
        clock.advance(Duration::minutes(10));
        service.get_all_dashboard_data().await.unwrap();
        assert_eq!(source.resolve_calls(), 1);
        assert_eq!(source.total_calls(), 12);
    }

    #[tokio::test]
    async fn missing_organization_is_looked_up_again() {
        let mut fake = FakeSource::new(Uuid::new_v4(), sample_datasets());
        fake.organization = None;
        let source = Arc::new(fake);
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        assert!(service.get_all_dashboard_data().await.is_err());
        assert!(service.get_all_dashboard_data().await.is_err());
        assert_eq!(source.resolve_calls(), 2);
    }

    #[tokio::test]
    async fn slow_session_lookup_hits_the_deadline() {
        let org = Uuid::new_v4();
        let mut fake = FakeSource::new(org, sample_datasets());
        fake.resolve_delay = Some(StdDuration::from_millis(500));
        let source = Arc::new(fake);
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig {
                query_timeout: StdDuration::from_millis(20),
            },
        );

        let err = service.get_all_dashboard_data().await.unwrap_err();
        assert!(matches!(err, DashboardError::Timeout { .. }));
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn expired_or_cleared_cache_refetches() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, sample_datasets()));
        let clock = Arc::new(ManualClock::default());
        let service = service_with(source.clone(), clock.clone(), ServiceConfig::default());

        service.get_all_dashboard_data().await.unwrap();
        clock.advance(Duration::minutes(5));
        let refreshed = service.get_all_dashboard_data().await.unwrap();
        assert_eq!(source.total_calls(), 12);
        assert_eq!(refreshed.last_updated, test_now() + Duration::minutes(5));

        service.clear_cache();
        assert!(!service.is_cached(org));
        service.get_all_dashboard_data().await.unwrap();
        assert_eq!(source.total_calls(), 18);
    }

    #[tokio::test]
    async fn every_query_is_scoped_to_the_organization() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, sample_datasets()));
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        let snapshot = service.get_all_dashboard_data().await.unwrap();
        assert_eq!(snapshot.organization_id, org);
        let scoped = source.scoped_organizations();
        assert_eq!(scoped.len(), 6);
        assert!(scoped.iter().all(|id| *id == org));
    }

    #[tokio::test]
    async fn missing_organization_fails_without_queries() {
        let mut fake = FakeSource::new(Uuid::new_v4(), sample_datasets());
        fake.organization = None;
        let source = Arc::new(fake);
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        let err = service.get_all_dashboard_data().await.unwrap_err();
        assert!(matches!(err, DashboardError::NoOrganization));
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn one_failed_query_fails_the_batch() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, sample_datasets()));
        source.set_failure(Some(Dataset::Donations));
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        let err = service.get_all_dashboard_data().await.unwrap_err();
        match err {
            DashboardError::Query { dataset, .. } => assert_eq!(dataset, Dataset::Donations),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!service.is_cached(org));
    }

    #[tokio::test]
    async fn slow_queries_hit_the_deadline() {
        let org = Uuid::new_v4();
        let mut fake = FakeSource::new(org, sample_datasets());
        fake.delay = Some(StdDuration::from_millis(500));
        let service = service_with(
            Arc::new(fake),
            Arc::new(ManualClock::default()),
            ServiceConfig {
                query_timeout: StdDuration::from_millis(20),
            },
        );

        let err = service.get_all_dashboard_data().await.unwrap_err();
        assert!(matches!(err, DashboardError::Timeout { .. }));
        assert!(!service.is_cached(org));
    }

    #[tokio::test]
    async fn windows_bound_events_and_donations() {
        let org = Uuid::new_v4();
        let now = test_now();
        let datasets = RawDatasets {
            events: vec![
                event("Sunday Worship", now - Duration::days(3), vec![]),
                event("Sunday Worship", now - Duration::days(200), vec![]),
                event("Evening prayer", now + Duration::hours(2), vec![]),
                event("Retreat", now + Duration::days(10), vec![]),
            ],
            donations: vec![
                donation(10.0, now.date_naive()),
                donation(20.0, now.date_naive() - Duration::days(400)),
            ],
            ..RawDatasets::default()
        };
        let source = Arc::new(FakeSource::new(org, datasets));
        let service = service_with(
            source,
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        let snapshot = service.get_all_dashboard_data().await.unwrap();
        assert_eq!(snapshot.stats.events.total, 2);
        assert_eq!(snapshot.stats.events.upcoming, 1);
        assert_eq!(snapshot.stats.donations.total, 10.0);
    }

    #[test]
    fn query_window_bounds() {
        let window = QueryWindow::ending_at(test_now());
        assert_eq!(
            window.events_from,
            chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 9, 18, 15, 0, 0).unwrap()
        );
        assert_eq!(window.events_to.date_naive(), test_now().date_naive());
        assert_eq!(
            window.donations_since,
            chrono::NaiveDate::from_ymd_opt(2025, 3, 18).unwrap()
        );
    }

    #[tokio::test]
    async fn raw_slices_are_capped() {
        let org = Uuid::new_v4();
        let datasets = RawDatasets {
            members: (0..150).map(|_| member(MemberStatus::Active, vec![])).collect(),
            tasks: (0..30).map(|_| task(TaskStatus::Pending, None)).collect(),
            ..RawDatasets::default()
        };
        let source = Arc::new(FakeSource::new(org, datasets));
        let service = service_with(
            source,
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        let snapshot = service.get_all_dashboard_data().await.unwrap();
        assert_eq!(snapshot.raw.members.len(), MEMBER_SLICE);
        assert_eq!(snapshot.raw.tasks.len(), TASK_SLICE);
        assert_eq!(snapshot.stats.members.total, 150);
        assert_eq!(snapshot.stats.tasks.total, 30);
    }

    #[tokio::test]
    async fn personal_tasks_are_live_and_capped() {
        let org = Uuid::new_v4();
        let mut fake = FakeSource::new(org, RawDatasets::default());
        fake.member = Some(Uuid::new_v4());
        fake.personal_tasks = (0..15).map(|_| task(TaskStatus::Pending, None)).collect();
        let source = Arc::new(fake);
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        assert_eq!(service.get_personal_tasks(org).await.len(), 10);
        assert_eq!(service.get_personal_tasks(org).await.len(), 10);
        assert_eq!(source.personal_calls(), 2);
    }

    #[tokio::test]
    async fn personal_task_failures_are_swallowed() {
        let org = Uuid::new_v4();
        let mut fake = FakeSource::new(org, RawDatasets::default());
        fake.member = Some(Uuid::new_v4());
        fake.fail_personal_tasks = true;
        let service = service_with(
            Arc::new(fake),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        assert!(service.get_personal_tasks(org).await.is_empty());
    }

    #[tokio::test]
    async fn personal_tasks_need_a_session_member() {
        let org = Uuid::new_v4();
        let source = Arc::new(FakeSource::new(org, RawDatasets::default()));
        let service = service_with(
            source.clone(),
            Arc::new(ManualClock::default()),
            ServiceConfig::default(),
        );

        assert!(service.get_personal_tasks(org).await.is_empty());
        assert_eq!(source.personal_calls(), 0);
    }
}
