use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AttendanceEntry, DonationRecord, EventRecord, FamilyRecord, MemberRecord, MemberStatus,
    MemberType, SmsConversation, TaskRecord, TaskStatus,
};
use crate::source::DataSource;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// [`DataSource`] backed by Postgres, acting on behalf of one signed-in user.
#[derive(Clone)]
pub struct PgDataSource {
    pool: PgPool,
    user_id: Uuid,
}

impl PgDataSource {
    pub fn new(pool: PgPool, user_id: Uuid) -> Self {
        Self { pool, user_id }
    }
}

/// Open tasks assigned to one member. A task with no status has never been
/// started, so it counts as open.
const PERSONAL_TASKS_QUERY: &str = r#"
    SELECT id, title, status, priority, due_date, assigned_to, requested_by, created_at
    FROM congregation.tasks
    WHERE organization_id = $1
      AND assigned_to = $2
      AND COALESCE(status, 'pending') NOT IN ('completed', 'cancelled')
    ORDER BY created_at DESC
    LIMIT $3
"#;

fn task_from_row(row: &PgRow) -> TaskRecord {
    TaskRecord {
        id: row.get("id"),
        title: row.get("title"),
        status: row
            .get::<Option<String>, _>("status")
            .as_deref()
            .and_then(TaskStatus::parse),
        priority: row.get("priority"),
        due_date: row.get("due_date"),
        assigned_to: row.get("assigned_to"),
        requested_by: row.get("requested_by"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn resolve_organization(&self) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT organization_id
            FROM congregation.organization_users
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to resolve organization")?;

        Ok(row.map(|row| row.get("organization_id")))
    }

    async fn current_member(&self, organization_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT id
            FROM congregation.members
            WHERE organization_id = $1 AND user_id = $2
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("id")))
    }

    async fn fetch_members(&self, organization_id: Uuid) -> anyhow::Result<Vec<MemberRecord>> {
        // Inner join: members without any family relationship are not returned.
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.first_name, m.last_name, m.status, m.member_type,
                   m.birth_date, m.anniversary_date, m.join_date, m.created_at,
                   array_agg(fr.family_id ORDER BY fr.created_at, fr.id) AS family_ids
            FROM congregation.members m
            JOIN congregation.family_relationships fr ON fr.member_id = m.id
            WHERE m.organization_id = $1
            GROUP BY m.id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            members.push(MemberRecord {
                id: row.get("id"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                status: row
                    .get::<Option<String>, _>("status")
                    .as_deref()
                    .and_then(MemberStatus::parse),
                member_type: row
                    .get::<Option<String>, _>("member_type")
                    .as_deref()
                    .and_then(MemberType::parse),
                birth_date: row.get("birth_date"),
                anniversary_date: row.get("anniversary_date"),
                join_date: row.get("join_date"),
                created_at: row.get("created_at"),
                family_ids: row.get("family_ids"),
            });
        }

        Ok(members)
    }

    async fn fetch_events(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.title, e.event_type, e.start_date, e.end_date, e.needs_volunteers,
                   a.member_id AS attendee_id, a.status AS attendance_status
            FROM congregation.events e
            LEFT JOIN congregation.event_attendance a ON a.event_id = e.id
            WHERE e.organization_id = $1 AND e.start_date BETWEEN $2 AND $3
            ORDER BY e.start_date DESC, e.id
            "#,
        )
        .bind(organization_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut events: Vec<EventRecord> = Vec::new();
        let mut index: HashMap<Uuid, usize> = HashMap::new();

        for row in rows {
            let id: Uuid = row.get("id");
            let slot = *index.entry(id).or_insert_with(|| {
                events.push(EventRecord {
                    id,
                    title: row.get("title"),
                    event_type: row.get("event_type"),
                    start_date: row.get("start_date"),
                    end_date: row.get("end_date"),
                    needs_volunteers: row.get("needs_volunteers"),
                    attendance: Vec::new(),
                });
                events.len() - 1
            });

            if let Some(status) = row.get::<Option<String>, _>("attendance_status") {
                events[slot].attendance.push(AttendanceEntry {
                    member_id: row.get("attendee_id"),
                    status,
                });
            }
        }

        Ok(events)
    }

    async fn fetch_donations(
        &self,
        organization_id: Uuid,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<DonationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, amount::float8 AS amount, date, donation_type, notes
            FROM congregation.donations
            WHERE organization_id = $1 AND date >= $2
            ORDER BY date DESC
            "#,
        )
        .bind(organization_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DonationRecord {
                id: row.get("id"),
                amount: row.get("amount"),
                date: row.get("date"),
                donation_type: row.get("donation_type"),
                notes: row.get("notes"),
            })
            .collect())
    }

    async fn fetch_tasks(&self, organization_id: Uuid) -> anyhow::Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, status, priority, due_date, assigned_to, requested_by, created_at
            FROM congregation.tasks
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    async fn fetch_sms_conversations(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<SmsConversation>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.title, c.conversation_type, c.status, c.updated_at,
                   COUNT(msg.id) AS message_count
            FROM congregation.sms_conversations c
            LEFT JOIN congregation.sms_messages msg ON msg.conversation_id = c.id
            WHERE c.organization_id = $1
            GROUP BY c.id
            ORDER BY c.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SmsConversation {
                id: row.get("id"),
                title: row.get("title"),
                conversation_type: row.get("conversation_type"),
                status: row.get("status"),
                updated_at: row.get("updated_at"),
                message_count: row.get("message_count"),
            })
            .collect())
    }

    async fn fetch_families(&self, organization_id: Uuid) -> anyhow::Result<Vec<FamilyRecord>> {
        let rows =
            sqlx::query("SELECT id, name FROM congregation.families WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|row| FamilyRecord {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn fetch_personal_tasks(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<TaskRecord>> {
        let rows = sqlx::query(PERSONAL_TASKS_QUERY)
            .bind(organization_id)
            .bind(member_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }
}

const SEED_ORGANIZATION: &str = "8c1f6a0e-5b7d-4f0e-9a51-2f3c4d5e6f70";

/// Inserts a demo congregation linked to `user_id`. Dates are relative to
/// `today` so the dashboard has current figures; fixed ids keep it idempotent.
pub async fn seed(pool: &PgPool, user_id: Uuid, today: NaiveDate) -> anyhow::Result<Uuid> {
    let organization_id = Uuid::parse_str(SEED_ORGANIZATION)?;
    let now = today
        .and_hms_opt(12, 0, 0)
        .context("invalid seed time")?
        .and_utc();

    sqlx::query(
        r#"
        INSERT INTO congregation.organizations (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(organization_id)
    .bind("Grace Community Church")
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO congregation.organization_users (user_id, organization_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, organization_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(organization_id)
    .execute(pool)
    .await?;

    let families = vec![
        (Uuid::parse_str("5a0c9e3e-1d2b-4c8e-9f6a-0b1c2d3e4f50")?, "Lee"),
        (Uuid::parse_str("6b1d0f4f-2e3c-4d9f-8a7b-1c2d3e4f5061")?, "Moreno"),
    ];

    for (id, name) in &families {
        sqlx::query(
            r#"
            INSERT INTO congregation.families (id, organization_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let members = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            Some(user_id),
            "Avery",
            "Lee",
            "active",
            "adult",
            Some(today - Duration::days(340)),
            Some(today + Duration::days(12)),
            0usize,
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            None,
            "Jules",
            "Moreno",
            "active",
            "adult",
            Some(today + Duration::days(5) - Duration::days(365 * 41)),
            None,
            1,
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            None,
            "Kiara",
            "Moreno",
            "visitor",
            "child",
            None,
            None,
            1,
        ),
    ];

    for (id, member_user, first, last, status, member_type, birth, anniversary, family_idx) in
        &members
    {
        sqlx::query(
            r#"
            INSERT INTO congregation.members
            (id, organization_id, user_id, first_name, last_name, status, member_type,
             birth_date, anniversary_date, join_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(member_user)
        .bind(first)
        .bind(last)
        .bind(status)
        .bind(member_type)
        .bind(birth)
        .bind(anniversary)
        .bind(today - Duration::days(400))
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO congregation.family_relationships (id, family_id, member_id, relationship)
            VALUES ($1, $2, $3, 'member')
            ON CONFLICT (family_id, member_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(families[*family_idx].0)
        .bind(id)
        .execute(pool)
        .await?;
    }

    let events = vec![
        (
            Uuid::parse_str("a1e2b3c4-d5e6-4f70-8192-a3b4c5d6e7f8")?,
            "Sunday Worship",
            "sunday_service",
            now - Duration::days(4),
            false,
        ),
        (
            Uuid::parse_str("b2f3c4d5-e6f7-4081-92a3-b4c5d6e7f809")?,
            "Wednesday Bible Study",
            "bible_study",
            now - Duration::days(8),
            false,
        ),
        (
            Uuid::parse_str("c3a4d5e6-f708-4192-a3b4-c5d6e7f8091a")?,
            "Community Dinner",
            "fellowship",
            now + Duration::hours(6),
            true,
        ),
    ];

    for (id, title, event_type, start, needs_volunteers) in &events {
        sqlx::query(
            r#"
            INSERT INTO congregation.events
            (id, organization_id, title, event_type, start_date, end_date, needs_volunteers)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(title)
        .bind(event_type)
        .bind(start)
        .bind(*start + Duration::hours(2))
        .bind(needs_volunteers)
        .execute(pool)
        .await?;
    }

    let attendance = vec![
        ("e0000000-0000-4000-8000-000000000001", 0usize, 0usize, "checked-in"),
        ("e0000000-0000-4000-8000-000000000002", 0, 1, "checked-in"),
        ("e0000000-0000-4000-8000-000000000003", 1, 0, "attending"),
    ];

    for (id, event_idx, member_idx, status) in attendance {
        sqlx::query(
            r#"
            INSERT INTO congregation.event_attendance (id, event_id, member_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(events[event_idx].0)
        .bind(members[member_idx].0)
        .bind(status)
        .execute(pool)
        .await?;
    }

    let donations = vec![
        ("d0000000-0000-4000-8000-000000000001", 250.0_f64, today, "tithe"),
        ("d0000000-0000-4000-8000-000000000002", 75.5, today - Duration::days(9), "offering"),
        (
            "d0000000-0000-4000-8000-000000000003",
            1200.0,
            today - Duration::days(60),
            "building_fund",
        ),
    ];

    for (id, amount, date, donation_type) in donations {
        sqlx::query(
            r#"
            INSERT INTO congregation.donations (id, organization_id, amount, date, donation_type)
            VALUES ($1, $2, $3::float8::numeric, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(organization_id)
        .bind(amount)
        .bind(date)
        .bind(donation_type)
        .execute(pool)
        .await?;
    }

    let tasks = vec![
        (
            "f0000000-0000-4000-8000-000000000001",
            "Follow up with Kiara's family",
            "pending",
            "high",
            now - Duration::days(1),
        ),
        (
            "f0000000-0000-4000-8000-000000000002",
            "Order communion supplies",
            "in_progress",
            "medium",
            now + Duration::days(3),
        ),
        (
            "f0000000-0000-4000-8000-000000000003",
            "Update volunteer roster",
            "completed",
            "low",
            now - Duration::days(5),
        ),
    ];

    for (id, title, status, priority, due) in tasks {
        sqlx::query(
            r#"
            INSERT INTO congregation.tasks
            (id, organization_id, title, status, priority, due_date, assigned_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(organization_id)
        .bind(title)
        .bind(status)
        .bind(priority)
        .bind(due)
        .bind(members[0].0)
        .execute(pool)
        .await?;
    }

    let conversation_id = Uuid::parse_str("c0000000-0000-4000-8000-000000000001")?;
    sqlx::query(
        r#"
        INSERT INTO congregation.sms_conversations
        (id, organization_id, title, conversation_type, status, updated_at)
        VALUES ($1, $2, 'Prayer chain', 'group', 'active', $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(conversation_id)
    .bind(organization_id)
    .bind(now - Duration::days(2))
    .execute(pool)
    .await?;

    for (id, body) in [
        ("c1000000-0000-4000-8000-000000000001", "Please keep the Moreno family in prayer."),
        ("c1000000-0000-4000-8000-000000000002", "Dinner sign-up sheet is in the lobby."),
    ] {
        sqlx::query(
            r#"
            INSERT INTO congregation.sms_messages (id, conversation_id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(conversation_id)
        .bind(body)
        .execute(pool)
        .await?;
    }

    Ok(organization_id)
}
