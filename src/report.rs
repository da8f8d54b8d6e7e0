use std::fmt::Write;

use serde::Serialize;

use crate::controller::DashboardViewModel;
use crate::metrics::{self, StatusColor};
use crate::models::{TrendDirection, WeeklyDonation};

const ENGAGEMENT_TARGET: f64 = 75.0;

fn trend_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Up => "up",
        TrendDirection::Down => "down",
        TrendDirection::Stable => "stable",
    }
}

fn color_label(color: StatusColor) -> &'static str {
    match color {
        StatusColor::Green => "healthy",
        StatusColor::Yellow => "fair",
        StatusColor::Orange => "needs attention",
        StatusColor::Red => "critical",
    }
}

pub fn build_report(view: &DashboardViewModel) -> String {
    let stats = &view.stats;
    let mut output = String::new();

    let _ = writeln!(output, "# Congregation Dashboard");
    match (view.organization_id, view.last_updated) {
        (Some(organization_id), Some(updated)) => {
            let _ = writeln!(
                output,
                "Organization {} as of {}",
                organization_id,
                updated.format("%Y-%m-%d %H:%M UTC")
            );
        }
        _ => {
            let _ = writeln!(output, "No dashboard data loaded.");
        }
    }

    let engagement = metrics::health_score(
        f64::from(stats.members.engagement_rate),
        ENGAGEMENT_TARGET,
        false,
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## People");
    let _ = writeln!(
        output,
        "- {} members: {} active, {} inactive, {} visitors ({} new in the last 30 days)",
        stats.members.total,
        stats.members.active,
        stats.members.inactive,
        stats.members.visitors,
        stats.members.recent
    );
    let _ = writeln!(
        output,
        "- Engagement {}% ({})",
        stats.members.engagement_rate,
        color_label(metrics::status_color(engagement))
    );
    let _ = writeln!(
        output,
        "- {} families covering {} members; {} active members without a family",
        stats.family.total_families,
        stats.family.members_in_families,
        stats.family.members_without_families
    );
    let _ = writeln!(
        output,
        "- Upcoming: {} birthdays, {} anniversaries",
        stats.celebrations.upcoming_birthdays, stats.celebrations.upcoming_anniversaries
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Giving");
    let _ = writeln!(
        output,
        "- Total {} across {} gifts; {} this month, {} this week",
        metrics::format_currency(stats.donations.total),
        stats.donations.count,
        metrics::format_currency(stats.donations.monthly),
        metrics::format_currency(stats.donations.weekly)
    );
    if let Some(trend) = &view.donation_trend_analysis {
        let _ = writeln!(
            output,
            "- Week over week: {} ({:+.1}%), weekly average {}",
            trend_label(trend.trend.direction),
            trend.trend.percent_change,
            metrics::format_currency(trend.average_week)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Events & Attendance");
    let _ = writeln!(
        output,
        "- {} upcoming ({} this week, {} needing volunteers), {} this month",
        stats.events.upcoming,
        stats.events.this_week,
        stats.events.needing_volunteers,
        stats.events.this_month
    );
    for service in view.attendance_stats() {
        let _ = writeln!(
            output,
            "- {}: {} check-ins",
            service.service_type,
            metrics::abbreviate_number(service.total_attendance as f64)
        );
    }
    let _ = writeln!(
        output,
        "- Sunday attendance rate {}%",
        stats.attendance.sunday_service_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tasks");
    let _ = writeln!(
        output,
        "- {} tasks: {} pending, {} in progress, {} completed ({}% done), {} overdue",
        stats.tasks.total,
        stats.tasks.pending,
        stats.tasks.in_progress,
        stats.tasks.completed,
        stats.tasks.completion_rate,
        stats.tasks.overdue
    );
    if !view.personal_tasks.is_empty() {
        let _ = writeln!(output, "- Assigned to you:");
        for task in view.personal_tasks.iter() {
            let _ = writeln!(output, "  - {}", task.title);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Messaging");
    let _ = writeln!(
        output,
        "- {} conversations ({} active, {} updated in the last 30 days), {} messages",
        stats.sms.total_conversations,
        stats.sms.active,
        stats.sms.recent,
        stats.sms.total_messages
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Up");
    if view.upcoming_events.is_empty() {
        let _ = writeln!(output, "No upcoming events on the calendar.");
    } else {
        for event in view.upcoming_events.iter() {
            let _ = writeln!(
                output,
                "- {} on {}",
                event.title,
                event.start_date.format("%a %b %-d, %H:%M")
            );
        }
    }

    output
}

#[derive(Serialize)]
struct WeeklyDonationRow {
    week_start: String,
    total: f64,
    count: usize,
}

pub fn write_weekly_donations_csv<W: std::io::Write>(
    writer: W,
    weekly: &[WeeklyDonation],
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for week in weekly {
        csv_writer.serialize(WeeklyDonationRow {
            week_start: week.week_start.to_string(),
            total: week.total,
            count: week.count,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
