use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::metrics;
use crate::models::{
    AttendanceStats, CelebrationStats, DashboardStats, DonationRecord, DonationStats,
    DonationTrendAnalysis, EventRecord, EventStats, FamilyRecord, FamilyStats, MemberRecord,
    MemberStats, MemberStatus, MemberType, RawDatasets, SmsConversation, SmsStats, TaskRecord,
    TaskStats, TaskStatus, WeeklyDonation,
};

pub const RECENT_WINDOW_DAYS: i64 = 30;
pub const CELEBRATION_WINDOW_DAYS: i64 = 30;
pub const UPCOMING_WEEK_DAYS: i64 = 7;
pub const TREND_WEEKS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceBucket {
    SundayService,
    BibleStudy,
    Fellowship,
}

impl ServiceBucket {
    pub fn label(self) -> &'static str {
        match self {
            ServiceBucket::SundayService => "Sunday Service",
            ServiceBucket::BibleStudy => "Bible Study",
            ServiceBucket::Fellowship => "Fellowship",
        }
    }
}

/// Event-type classification table. Evaluated top to bottom; the first
/// bucket with a matching substring wins.
pub const SERVICE_BUCKETS: [(&[&str], ServiceBucket); 3] = [
    (&["sunday", "worship"], ServiceBucket::SundayService),
    (&["bible", "study"], ServiceBucket::BibleStudy),
    (&["fellowship"], ServiceBucket::Fellowship),
];

pub fn classify_event_type(event_type: &str) -> Option<ServiceBucket> {
    let lowered = event_type.to_lowercase();
    SERVICE_BUCKETS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|(_, bucket)| *bucket)
}

/// Rounded percentage, 0 when the denominator is 0.
pub fn percent(numerator: usize, denominator: usize) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (numerator as f64 / denominator as f64 * 100.0).round() as u32
}

/// Sunday on or before `today`.
pub fn week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
}

pub fn process_all_data(raw: &RawDatasets, now: DateTime<Utc>) -> DashboardStats {
    let members = member_stats(&raw.members, now);
    DashboardStats {
        members,
        donations: donation_stats(&raw.donations, now),
        events: event_stats(&raw.events, now),
        tasks: task_stats(&raw.tasks, now),
        celebrations: celebration_stats(&raw.members, now),
        sms: sms_stats(&raw.sms_conversations, now),
        attendance: attendance_stats(&raw.events, members.active, now),
        family: family_stats(&raw.members, &raw.families, members.active),
    }
}

pub fn member_stats(members: &[MemberRecord], now: DateTime<Utc>) -> MemberStats {
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
    let mut stats = MemberStats {
        total: members.len(),
        ..MemberStats::default()
    };

    for member in members {
        match member.status {
            Some(MemberStatus::Active) => stats.active += 1,
            Some(MemberStatus::Inactive) => stats.inactive += 1,
            Some(MemberStatus::Visitor) => {
                stats.visitors += 1;
                if member.created_at >= recent_cutoff {
                    stats.recent += 1;
                }
            }
            None => {}
        }
        match member.member_type {
            Some(MemberType::Adult) => stats.adults += 1,
            Some(MemberType::Child) => stats.children += 1,
            None => {}
        }
    }

    stats.engagement_rate = percent(stats.active, stats.total);
    stats
}

pub fn event_stats(events: &[EventRecord], now: DateTime<Utc>) -> EventStats {
    let week_end = now + Duration::days(UPCOMING_WEEK_DAYS);
    let mut stats = EventStats {
        total: events.len(),
        ..EventStats::default()
    };

    for event in events {
        if event.start_date >= now {
            stats.upcoming += 1;
            if event.start_date <= week_end {
                stats.this_week += 1;
            }
            if event.needs_volunteers {
                stats.needing_volunteers += 1;
            }
        } else {
            stats.past += 1;
        }

        if event.start_date.year() == now.year() && event.start_date.month() == now.month() {
            stats.this_month += 1;
        }
    }

    stats
}

pub fn donation_stats(donations: &[DonationRecord], now: DateTime<Utc>) -> DonationStats {
    let today = now.date_naive();
    let week_start = week_start(today);
    let mut stats = DonationStats {
        count: donations.len(),
        ..DonationStats::default()
    };

    for donation in donations {
        stats.total += donation.amount;
        if donation.date.year() == today.year() && donation.date.month() == today.month() {
            stats.monthly += donation.amount;
        }
        if donation.date >= week_start {
            stats.weekly += donation.amount;
        }
    }

    stats
}

pub fn task_stats(tasks: &[TaskRecord], now: DateTime<Utc>) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        ..TaskStats::default()
    };

    for task in tasks {
        match task.status {
            Some(TaskStatus::Pending) => stats.pending += 1,
            Some(TaskStatus::InProgress) => stats.in_progress += 1,
            Some(TaskStatus::Completed) => stats.completed += 1,
            Some(TaskStatus::Cancelled) => stats.cancelled += 1,
            None => {}
        }

        let open = task.status != Some(TaskStatus::Completed);
        if open && task.due_date.is_some_and(|due| due < now) {
            stats.overdue += 1;
        }
    }

    stats.completion_rate = percent(stats.completed, stats.total);
    stats
}

pub fn attendance_stats(
    events: &[EventRecord],
    active_members: usize,
    now: DateTime<Utc>,
) -> AttendanceStats {
    let mut stats = AttendanceStats::default();
    let mut sunday_attendees: HashSet<Uuid> = HashSet::new();

    for event in events.iter().filter(|event| event.start_date < now) {
        let Some(bucket) = event.event_type.as_deref().and_then(classify_event_type) else {
            continue;
        };

        let present = event.attendance.iter().filter(|entry| entry.is_present());
        match bucket {
            ServiceBucket::SundayService => {
                for entry in present {
                    stats.sunday_service += 1;
                    if let Some(member_id) = entry.member_id {
                        sunday_attendees.insert(member_id);
                    }
                }
            }
            ServiceBucket::BibleStudy => stats.bible_study += present.count(),
            ServiceBucket::Fellowship => stats.fellowship += present.count(),
        }
    }

    // Attendees may include members who are no longer active.
    stats.sunday_service_rate = percent(sunday_attendees.len(), active_members).min(100);
    stats
}

pub fn celebration_stats(members: &[MemberRecord], now: DateTime<Utc>) -> CelebrationStats {
    let today = now.date_naive();
    CelebrationStats {
        upcoming_birthdays: members
            .iter()
            .filter_map(|member| member.birth_date)
            .filter(|date| is_upcoming_celebration(*date, today))
            .count(),
        upcoming_anniversaries: members
            .iter()
            .filter_map(|member| member.anniversary_date)
            .filter(|date| is_upcoming_celebration(*date, today))
            .count(),
    }
}

/// True when the month/day of `date` next falls within the coming
/// [`CELEBRATION_WINDOW_DAYS`] days, today included.
pub fn is_upcoming_celebration(date: NaiveDate, today: NaiveDate) -> bool {
    match next_occurrence(date, today) {
        Some(next) => (next - today).num_days() <= CELEBRATION_WINDOW_DAYS,
        None => false,
    }
}

fn next_occurrence(date: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = project_onto_year(date, today.year())?;
    if this_year >= today {
        Some(this_year)
    } else {
        project_onto_year(date, today.year() + 1)
    }
}

// Feb 29 lands on Feb 28 outside leap years.
fn project_onto_year(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
}

pub fn sms_stats(conversations: &[SmsConversation], now: DateTime<Utc>) -> SmsStats {
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
    SmsStats {
        total_conversations: conversations.len(),
        total_messages: conversations.iter().map(|c| c.message_count).sum(),
        recent: conversations
            .iter()
            .filter(|c| c.updated_at >= recent_cutoff)
            .count(),
        active: conversations
            .iter()
            .filter(|c| c.status.as_deref() == Some("active"))
            .count(),
    }
}

pub fn family_stats(
    members: &[MemberRecord],
    families: &[FamilyRecord],
    active_members: usize,
) -> FamilyStats {
    let primary: Vec<Uuid> = members
        .iter()
        .filter_map(MemberRecord::primary_family)
        .collect();
    let distinct: HashSet<&Uuid> = primary.iter().collect();

    FamilyStats {
        total_families: distinct.len(),
        members_in_families: primary.len(),
        members_without_families: active_members as i64 - primary.len() as i64,
        registered_families: families.len(),
    }
}

/// Weekly donation totals for the last [`TREND_WEEKS`] Sunday-start weeks,
/// oldest first, plus the current-vs-previous week trend.
pub fn donation_trends(donations: &[DonationRecord], now: DateTime<Utc>) -> DonationTrendAnalysis {
    let current_start = week_start(now.date_naive());
    let mut weekly: Vec<WeeklyDonation> = (0..TREND_WEEKS)
        .rev()
        .map(|weeks_back| WeeklyDonation {
            week_start: current_start - Duration::weeks(weeks_back as i64),
            total: 0.0,
            count: 0,
        })
        .collect();

    for donation in donations {
        if let Some(week) = weekly.iter_mut().find(|week| {
            donation.date >= week.week_start && donation.date < week.week_start + Duration::weeks(1)
        }) {
            week.total += donation.amount;
            week.count += 1;
        }
    }

    let current_week = weekly.last().map(|week| week.total).unwrap_or_default();
    let previous_week = weekly
        .len()
        .checked_sub(2)
        .and_then(|idx| weekly.get(idx))
        .map(|week| week.total)
        .unwrap_or_default();
    let average_week = weekly.iter().map(|week| week.total).sum::<f64>() / TREND_WEEKS as f64;

    DonationTrendAnalysis {
        trend: metrics::trend_indicator(current_week, Some(previous_week)),
        weekly,
        current_week,
        previous_week,
        average_week,
    }
}
