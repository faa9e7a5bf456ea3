//! Glucose Log Library
//!
//! Blood glucose reading classification, statistics and report formatting,
//! with the auth and storage layers used by the `glucose-log` CLI.

pub mod analytics;
pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod reading;
pub mod report;
pub mod store;
pub mod traits;
pub mod user;

// Re-export commonly used types
pub use analytics::{
    // View types
    AdminOverview,
    CalendarDay,
    ChartPoint,
    DashboardSummary,
    DayGroup,
    MonthSummary,
    ReadingFilter,
    StatSummary,
    UserActivity,
    UserDetail,
    // Views
    admin_overview,
    // Aggregation
    aggregate_by_date,
    aggregate_by_type,
    aggregate_by_type_on,
    aggregate_by_type_with_clock,
    count_in_window,
    daily_type_averages,
    dashboard_summary,
    in_range_percentage,
    // Ordering
    latest_reading,
    month_calendar,
    month_summary,
    sort_latest_first,
    user_detail,
    // Utility functions
    weekday_name,
    window_start,
};
pub use auth::{AuthError, AuthService, Credentials, Session, SignupRequest};
pub use classify::{Classification, DayBand, ReadingStatus, StatusColor, classify, classify_raw};
pub use config::AppConfig;
pub use db::Database;
pub use reading::{NewReading, Reading, ReadingType, ValidationError};
pub use report::{ReportRow, share_link, share_message, to_csv, to_plain_text_block, to_table};
pub use store::{MemoryStore, ReadingStore, UserStore};
pub use traits::{Clock, MockClock, SystemClock};
pub use user::{Role, User};
