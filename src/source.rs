use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    DonationRecord, EventRecord, FamilyRecord, MemberRecord, SmsConversation, TaskRecord,
};

/// Read-only access to the hosted store backing the dashboard.
///
/// Every dataset method is scoped to one organization and implementations
/// must apply that filter on every query.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Organization attached to the current session, if any.
    async fn resolve_organization(&self) -> anyhow::Result<Option<Uuid>>;

    /// Member record linked to the current session, if any.
    async fn current_member(&self, organization_id: Uuid) -> anyhow::Result<Option<Uuid>>;

    /// Members holding at least one family relationship.
    async fn fetch_members(&self, organization_id: Uuid) -> anyhow::Result<Vec<MemberRecord>>;

    async fn fetch_events(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventRecord>>;

    async fn fetch_donations(
        &self,
        organization_id: Uuid,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<DonationRecord>>;

    async fn fetch_tasks(&self, organization_id: Uuid) -> anyhow::Result<Vec<TaskRecord>>;

    async fn fetch_sms_conversations(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<SmsConversation>>;

    async fn fetch_families(&self, organization_id: Uuid) -> anyhow::Result<Vec<FamilyRecord>>;

    /// Open tasks assigned to `member_id`, newest first.
    async fn fetch_personal_tasks(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<TaskRecord>>;
}
