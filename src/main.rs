use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use congregation_dashboard::cache::{CacheStore, SystemClock};
use congregation_dashboard::config::DashboardConfig;
use congregation_dashboard::controller::{DashboardController, LoadState, LogNotifier};
use congregation_dashboard::db::{self, PgDataSource};
use congregation_dashboard::logging;
use congregation_dashboard::metrics;
use congregation_dashboard::report;
use congregation_dashboard::service::DashboardService;

#[derive(Parser)]
#[command(name = "congregation-dashboard")]
#[command(
    about = "Congregation dashboard statistics over a church management database",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    config: DashboardConfig,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo congregation for the configured user
    Seed,
    /// Load the dashboard once and print its statistics
    Stats {
        /// Print the full view-model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Export weekly donation totals as CSV
    ExportDonations {
        #[arg(long, default_value = "weekly_donations.csv")]
        out: PathBuf,
    },
}

async fn load_controller(
    config: &DashboardConfig,
    pool: sqlx::PgPool,
) -> anyhow::Result<DashboardController> {
    let user_id = config.require_user()?;
    let clock = Arc::new(SystemClock);
    let service = DashboardService::new(
        Arc::new(PgDataSource::new(pool, user_id)),
        CacheStore::with_default_ttl(clock.clone()),
        clock,
        config.service_config(),
    );

    let mut controller = DashboardController::new(Arc::new(service), Arc::new(LogNotifier));
    controller.load().await;
    if let LoadState::Error(message) = controller.state() {
        anyhow::bail!("dashboard failed to load: {message}");
    }
    Ok(controller)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let pool = PgPoolOptions::new()
        .max_connections(cli.config.max_connections)
        .connect(&cli.config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let user_id = cli.config.require_user()?;
            let today = chrono::Utc::now().date_naive();
            let organization_id = db::seed(&pool, user_id, today).await?;
            println!("Seed data inserted for organization {organization_id}.");
        }
        Commands::Stats { json } => {
            let controller = load_controller(&cli.config, pool).await?;
            let view = controller.view_model();

            if json {
                println!("{}", serde_json::to_string_pretty(view)?);
                return Ok(());
            }

            let stats = &view.stats;
            println!(
                "Members:   {} ({}% engaged)",
                stats.members.total, stats.members.engagement_rate
            );
            println!(
                "Giving:    {} total, {} this month, {} this week",
                metrics::format_currency(stats.donations.total),
                metrics::format_currency(stats.donations.monthly),
                metrics::format_currency(stats.donations.weekly)
            );
            println!(
                "Events:    {} upcoming, {} this month",
                stats.events.upcoming, stats.events.this_month
            );
            println!(
                "Tasks:     {} open, {} overdue, {}% complete",
                stats.tasks.pending + stats.tasks.in_progress,
                stats.tasks.overdue,
                stats.tasks.completion_rate
            );
            println!(
                "Messages:  {} across {} conversations",
                metrics::abbreviate_number(stats.sms.total_messages as f64),
                stats.sms.total_conversations
            );
            for service in controller.attendance_stats() {
                let label = format!("{}:", service.service_type);
                println!("{:<10} {} check-ins", label, service.total_attendance);
            }
        }
        Commands::Report { out } => {
            let controller = load_controller(&cli.config, pool).await?;
            let report = report::build_report(controller.view_model());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::ExportDonations { out } => {
            let controller = load_controller(&cli.config, pool).await?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_weekly_donations_csv(file, &controller.view_model().weekly_donations)?;
            println!("Weekly donations written to {}.", out.display());
        }
    }

    Ok(())
}
