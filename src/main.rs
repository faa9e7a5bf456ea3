use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use glucose_log::{
    AuthService, Clock, Credentials, Database, NewReading, ReadingFilter, ReadingStatus,
    ReadingStore, ReadingType, Session, SignupRequest, SystemClock, UserStore,
    analytics::{self, window_start},
    classify::status_for,
    config::AppConfig,
    report,
};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "glucose-log")]
#[command(about = "Blood glucose reading tracker")]
struct Args {
    /// Account email
    #[arg(long, global = true, env = "GLUCOSE_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "GLUCOSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print structured output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        profile_image_url: Option<String>,
    },
    /// Record a reading (date and time default to now)
    Add {
        #[arg(long = "type")]
        reading_type: ReadingType,
        #[arg(long)]
        level: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        time: Option<NaiveTime>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List readings, latest first
    History {
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum rows (defaults to analytics.history_limit)
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        limit: Option<i64>,
    },
    /// Dashboard statistics over the trailing window
    Stats {
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        days: Option<i64>,
    },
    /// Month calendar with daily averages
    Calendar {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Per-day, per-type averages for the trend chart
    Chart {
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        days: Option<i64>,
    },
    /// Export readings
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Build a WhatsApp share message and link
    Share {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Administrator views
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Totals and per-user activity
    Overview,
    /// Statistics for one user
    User {
        #[arg(long)]
        id: i32,
    },
    /// Dump every reading to a timestamped CSV in export.output_dir
    Dump,
}

#[derive(ClapArgs, Debug, Default)]
struct FilterArgs {
    #[arg(long = "type")]
    reading_type: Option<ReadingType>,
    #[arg(long)]
    status: Option<ReadingStatus>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl From<FilterArgs> for ReadingFilter {
    fn from(args: FilterArgs) -> Self {
        ReadingFilter {
            reading_type: args.reading_type,
            status: args.status,
            search: args.search,
            from: args.from,
            to: args.to,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Csv,
    Table,
    Text,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("glucose_log=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    tracing::debug!("Connecting to database...");
    let database = Database::new(config.database_url()?).await?;
    let auth = AuthService::new(database.clone(), &config.admin.bootstrap_emails);
    let credentials = credentials(&args)?;
    let clock = SystemClock;
    let json = args.json;

    match args.command {
        Command::Signup {
            name,
            profile_image_url,
        } => {
            let user = auth
                .signup(&SignupRequest {
                    name,
                    email: credentials.email,
                    password: credentials.password,
                    profile_image_url,
                })
                .await?;
            if json {
                print_json(&user)?;
            } else {
                println!("Created account {} ({})", user.email, user.role);
            }
        }
        Command::Add {
            reading_type,
            level,
            date,
            time,
            notes,
        } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let now = clock.now_local();
            let new_reading = NewReading::new(
                reading_type,
                level,
                date.unwrap_or_else(|| now.date_naive()),
                time.unwrap_or_else(|| now.time().with_nanosecond(0).unwrap_or(now.time())),
                notes,
            )?;
            let reading = database
                .insert_reading(session.user_id, &new_reading)
                .await?;
            tracing::info!(reading_id = reading.id, "Reading saved");

            if json {
                print_json(&reading)?;
            } else {
                println!(
                    "Saved {} reading of {} mg/dL ({})",
                    reading.reading_type.label(),
                    reading.level,
                    status_for(reading.level, reading.reading_type)
                );
            }
        }
        Command::History { filter, limit } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let limit = limit.unwrap_or(config.analytics.history_limit);
            let readings = database
                .readings_for_user(session.user_id, Some(limit))
                .await?;
            let readings = ReadingFilter::from(filter).apply(&readings);

            if json {
                print_json(&report::to_table(&readings))?;
            } else {
                println!("{}", report::to_plain_text_block(&readings));
            }
        }
        Command::Stats { days } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let window = days.unwrap_or(config.analytics.stats_window_days);
            let readings = database.readings_for_user(session.user_id, None).await?;
            let summary = analytics::dashboard_summary(
                &readings,
                window,
                config.analytics.recent_count,
                clock.today(),
            );

            if json {
                print_json(&summary)?;
            } else {
                print_dashboard(&summary);
            }
        }
        Command::Calendar { year, month } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let today = clock.today();
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let readings = database.readings_for_user(session.user_id, None).await?;
            let days = analytics::month_calendar(year, month, &readings);
            if days.is_empty() {
                anyhow::bail!("Invalid month: {year}-{month}");
            }
            let summary = analytics::month_summary(year, month, &readings);

            if json {
                print_json(&CalendarOutput {
                    days: &days,
                    summary: &summary,
                })?;
            } else {
                for day in days.iter().filter(|d| d.reading_count > 0) {
                    println!(
                        "{} {:<9} avg {:>3} mg/dL  {} reading(s)  {:?}",
                        day.date,
                        analytics::weekday_name(day.date),
                        day.average.unwrap_or_default(),
                        day.reading_count,
                        day.band
                    );
                }
                println!(
                    "Total: {}  Normal: {}  High: {}  Days logged: {}",
                    summary.total_readings,
                    summary.normal_readings,
                    summary.high_readings,
                    summary.days_with_readings
                );
            }
        }
        Command::Chart { days } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let window = days.unwrap_or(config.analytics.stats_window_days);
            let today = clock.today();
            let readings = database
                .readings_since(session.user_id, window_start(today, window))
                .await?;
            let points = analytics::daily_type_averages(&readings, window, today);

            if json {
                print_json(&points)?;
            } else {
                for p in &points {
                    println!("{} {:<11} {:.1}", p.date, p.reading_type, p.average);
                }
            }
        }
        Command::Export {
            format,
            output,
            filter,
        } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let readings = database.readings_for_user(session.user_id, None).await?;
            let readings = ReadingFilter::from(filter).apply(&readings);

            let body = match format {
                ExportFormat::Csv => report::to_csv(&readings),
                ExportFormat::Text => report::to_plain_text_block(&readings),
                ExportFormat::Table => serde_json::to_string_pretty(&report::to_table(&readings))
                    .context("Failed to serialize table rows")?,
            };

            match output {
                Some(path) => {
                    tokio::fs::write(&path, body)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Exported {} readings to {}", readings.len(), path.display());
                }
                None => println!("{body}"),
            }
        }
        Command::Share { filter } => {
            let session = Session::acquire(&auth, &credentials).await?;
            let readings = database.readings_for_user(session.user_id, None).await?;
            let readings = ReadingFilter::from(filter).apply(&readings);
            let message = report::share_message(&readings);
            let link = report::share_link(&message)?;

            if json {
                print_json(&ShareOutput {
                    message: &message,
                    link: link.as_str(),
                })?;
            } else {
                println!("{message}\n\n{link}");
            }
        }
        Command::Admin { command } => {
            let session = auth.admin_login(&credentials).await?;
            run_admin(command, &session, &database, &config, &clock, json).await?;
        }
    }

    Ok(())
}

async fn run_admin<C: Clock>(
    command: AdminCommand,
    session: &Session,
    database: &Database,
    config: &AppConfig,
    clock: &C,
    json: bool,
) -> Result<()> {
    session.require_admin()?;

    match command {
        AdminCommand::Overview => {
            let users = database.list_users().await?;
            let readings = database.all_readings(None).await?;
            let overview = analytics::admin_overview(&users, &readings);

            if json {
                print_json(&overview)?;
            } else {
                println!(
                    "Users: {}  Readings: {}  Active: {}  Avg/user: {}",
                    overview.total_users,
                    overview.total_readings,
                    overview.active_users,
                    overview.avg_readings_per_user
                );
                for u in &overview.users {
                    let latest = u.latest.as_ref().map_or_else(
                        || "-".to_string(),
                        |r| format!("{} mg/dL on {}", r.level, r.date),
                    );
                    println!(
                        "{:>4}  {:<24} {:<32} {:>4}  {}",
                        u.user_id, u.name, u.email, u.reading_count, latest
                    );
                }
            }
        }
        AdminCommand::User { id } => {
            let user = database
                .find_user_by_id(id)
                .await?
                .with_context(|| format!("User {id} not found"))?;
            let readings = database.readings_for_user(id, None).await?;
            let detail = analytics::user_detail(
                &readings,
                config.analytics.stats_window_days,
                clock.today(),
            );

            if json {
                print_json(&UserDetailOutput {
                    detail: &detail,
                    readings: report::to_table(&readings),
                })?;
            } else {
                println!("{} <{}> ({})", user.name, user.email, user.role);
                println!(
                    "Readings: {} total, {} in the last {} days",
                    detail.total_readings,
                    detail.readings_in_window,
                    config.analytics.stats_window_days
                );
                for stat in detail.stats.values() {
                    println!(
                        "{:<11} avg {:>3}  min {:>3}  max {:>3}  ({} readings)",
                        stat.reading_type.label(),
                        stat.rounded_average(),
                        stat.min,
                        stat.max,
                        stat.count
                    );
                }
                println!();
                println!("{}", report::to_plain_text_block(&readings));
            }
        }
        AdminCommand::Dump => {
            let dir = config.ensure_export_dir()?;
            let path = database.export_to_csv(dir, clock).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn credentials(args: &Args) -> Result<Credentials> {
    let email = args
        .email
        .clone()
        .context("An email is required (--email or GLUCOSE_EMAIL)")?;
    let password = args
        .password
        .clone()
        .context("A password is required (--password or GLUCOSE_PASSWORD)")?;
    Ok(Credentials::new(email, password))
}

#[derive(Serialize)]
struct CalendarOutput<'a> {
    days: &'a [analytics::CalendarDay],
    summary: &'a analytics::MonthSummary,
}

#[derive(Serialize)]
struct UserDetailOutput<'a> {
    detail: &'a analytics::UserDetail,
    readings: Vec<report::ReportRow>,
}

#[derive(Serialize)]
struct ShareOutput<'a> {
    message: &'a str,
    link: &'a str,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn print_dashboard(summary: &analytics::DashboardSummary) {
    println!("Last {} days", summary.window_days);
    for stat in summary.stats.values() {
        println!(
            "  {:<11} avg {:>3} mg/dL  ({} readings, {}-{})",
            stat.reading_type.label(),
            stat.rounded_average(),
            stat.count,
            stat.min,
            stat.max
        );
    }
    match summary.in_range_percentage {
        Some(pct) => println!("  In range: {pct}%"),
        None => println!("  In range: no readings"),
    }

    if let Some(latest) = &summary.latest {
        println!(
            "Latest: {} mg/dL ({}) on {} at {}",
            latest.level,
            latest.reading_type.label(),
            latest.date,
            latest.time.format("%H:%M")
        );
    }
    if !summary.recent.is_empty() {
        println!();
        println!("{}", report::to_plain_text_block(&summary.recent));
    }
}
