//! Integration tests for the sign-up, record and report flow using mock
//! dependencies.
//!
//! These tests drive auth, storage and analytics through `MemoryStore` and
//! `MockClock` for deterministic, reproducible results.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use glucose_log::{
    AuthError, AuthService, Clock, Credentials, DayBand, MemoryStore, MockClock, NewReading,
    ReadingFilter, ReadingStatus, ReadingStore, ReadingType, Role, Session, SignupRequest,
    UserStore, aggregate_by_type_with_clock, analytics, report,
};

const ADMIN_EMAIL: &str = "clinic-admin@example.com";

fn auth_service() -> AuthService<MemoryStore> {
    AuthService::new(MemoryStore::new(), &[ADMIN_EMAIL.to_string()])
}

fn signup(name: &str, email: &str) -> SignupRequest {
    SignupRequest {
        name: name.to_string(),
        email: email.to_string(),
        password: "pa55word".to_string(),
        profile_image_url: None,
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn reading(kind: ReadingType, level: i32, day: u32, hour: u32, notes: Option<&str>) -> NewReading {
    NewReading::new(
        kind,
        level,
        date(day),
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        notes.map(str::to_string),
    )
    .unwrap()
}

/// Signs up a patient and records a small March history.
async fn seeded_patient(auth: &AuthService<MemoryStore>) -> Session {
    auth.signup(&signup("Ayesha", "ayesha@example.com"))
        .await
        .unwrap();
    let session = Session::acquire(auth, &Credentials::new("ayesha@example.com", "pa55word"))
        .await
        .unwrap();

    let store = auth.store();
    for new in [
        reading(ReadingType::Fasting, 92, 1, 7, None),
        reading(ReadingType::AfterMeal, 210, 1, 14, Some("biryani")),
        reading(ReadingType::Fasting, 65, 10, 7, None),
        reading(ReadingType::BeforeMeal, 120, 20, 12, None),
        reading(ReadingType::AfterMeal, 150, 20, 15, Some("rice, dal")),
        reading(ReadingType::Random, 110, 28, 18, None),
    ] {
        store.insert_reading(session.user_id, &new).await.unwrap();
    }
    session
}

// ==================== Session Tests ====================

#[tokio::test]
async fn test_patient_session_is_not_admin() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;

    assert_eq!(session.role, Role::User);
    assert!(matches!(session.require_admin(), Err(AuthError::NotAdmin)));
}

#[tokio::test]
async fn test_bootstrap_admin_can_log_in_as_admin() {
    let auth = auth_service();
    auth.signup(&signup("Admin", "Clinic-Admin@Example.com"))
        .await
        .unwrap();

    let session = auth
        .admin_login(&Credentials::new(ADMIN_EMAIL, "pa55word"))
        .await
        .unwrap();
    assert!(session.is_admin());
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let auth = auth_service();
    seeded_patient(&auth).await;

    let result = Session::acquire(&auth, &Credentials::new("ayesha@example.com", "guess")).await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

// ==================== Dashboard Tests ====================

#[tokio::test]
async fn test_dashboard_over_trailing_window() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let clock = MockClock::on_date(date(30));

    let readings = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    // A 14 day window starting March 16 keeps the last three readings.
    let summary = analytics::dashboard_summary(&readings, 14, 5, clock.today());
    assert_eq!(summary.stats.len(), 3);
    assert!(!summary.stats.contains_key(&ReadingType::Fasting));
    assert_eq!(summary.stats[&ReadingType::AfterMeal].rounded_average(), 150);
    // before-meal 120 normal, after-meal 150 elevated, random 110 normal.
    assert_eq!(summary.in_range_percentage, Some(67));

    let latest = summary.latest.as_ref().unwrap();
    assert_eq!(latest.level, 110);
    assert_eq!(summary.recent.len(), 5);
    assert_eq!(summary.recent[0].level, 110);
}

#[tokio::test]
async fn test_window_moves_with_clock() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let readings = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    let clock = MockClock::on_date(date(10));
    let early = aggregate_by_type_with_clock(&readings, 9, &clock);
    assert_eq!(early[&ReadingType::Fasting].count, 2);
    assert_eq!(early[&ReadingType::Fasting].min, 65);
    assert_eq!(early[&ReadingType::Fasting].max, 92);

    clock.advance(ChronoDuration::days(20));
    let late = aggregate_by_type_with_clock(&readings, 9, &clock);
    assert!(!late.contains_key(&ReadingType::Fasting));
    assert_eq!(late[&ReadingType::Random].count, 1);
}

#[tokio::test]
async fn test_readings_since_matches_window() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let clock = MockClock::on_date(date(30));

    let start = analytics::window_start(clock.today(), 14);
    let windowed = auth
        .store()
        .readings_since(session.user_id, start)
        .await
        .unwrap();
    let everything = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    assert_eq!(
        windowed.len(),
        analytics::count_in_window(&everything, 14, clock.today())
    );
}

// ==================== Calendar Tests ====================

#[tokio::test]
async fn test_month_calendar_bands() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let readings = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    let days = analytics::month_calendar(2024, 3, &readings);
    assert_eq!(days.len(), 31);

    // (92 + 210) / 2 = 151
    assert_eq!(days[0].average, Some(151));
    assert_eq!(days[0].band, DayBand::High);
    assert_eq!(days[9].band, DayBand::Low);
    assert_eq!(days[19].average, Some(135));
    assert_eq!(days[19].band, DayBand::InRange);
    assert_eq!(days[1].band, DayBand::NoData);

    let summary = analytics::month_summary(2024, 3, &readings);
    assert_eq!(summary.total_readings, 6);
    assert_eq!(summary.normal_readings, 3);
    assert_eq!(summary.high_readings, 2);
    assert_eq!(summary.days_with_readings, 4);
    assert_eq!(analytics::month_summary(2024, 4, &readings).total_readings, 0);
}

// ==================== Report Tests ====================

#[tokio::test]
async fn test_filtered_csv_export() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let readings = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    let filter = ReadingFilter {
        reading_type: Some(ReadingType::AfterMeal),
        ..Default::default()
    };
    let csv = report::to_csv(&filter.apply(&readings));
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Date,Day,Time,Type,Level,Status,Notes",
            "2024-03-20,Wednesday,15:00,after-meal,150,elevated,\"rice, dal\"",
            "2024-03-01,Friday,14:00,after-meal,210,high,\"biryani\"",
        ]
    );
}

#[tokio::test]
async fn test_share_link_for_status_filter() {
    let auth = auth_service();
    let session = seeded_patient(&auth).await;
    let readings = auth
        .store()
        .readings_for_user(session.user_id, None)
        .await
        .unwrap();

    let filter = ReadingFilter {
        status: Some(ReadingStatus::Low),
        ..Default::default()
    };
    let message = report::share_message(&filter.apply(&readings));
    assert!(message.contains("2024-03-10 | 07:00   | fasting   |    65 | low    | No notes"));

    let link = report::share_link(&message).unwrap();
    let (_, text) = link.query_pairs().next().unwrap();
    assert_eq!(text, message);
}

// ==================== Admin Tests ====================

#[tokio::test]
async fn test_admin_overview_and_detail() {
    let auth = auth_service();
    let patient = seeded_patient(&auth).await;
    auth.signup(&signup("Idle", "idle@example.com"))
        .await
        .unwrap();
    auth.signup(&signup("Admin", ADMIN_EMAIL)).await.unwrap();

    let admin = auth
        .admin_login(&Credentials::new(ADMIN_EMAIL, "pa55word"))
        .await
        .unwrap();
    admin.require_admin().unwrap();

    let store = auth.store();
    let users = store.list_users().await.unwrap();
    let readings = store.all_readings(None).await.unwrap();
    let overview = analytics::admin_overview(&users, &readings);

    assert_eq!(overview.total_users, 3);
    assert_eq!(overview.total_readings, 6);
    assert_eq!(overview.active_users, 1);
    assert_eq!(overview.avg_readings_per_user, 2);
    // Newest account first.
    assert_eq!(overview.users[0].email, ADMIN_EMAIL);
    let patient_row = overview
        .users
        .iter()
        .find(|u| u.user_id == patient.user_id)
        .unwrap();
    assert_eq!(patient_row.latest.as_ref().unwrap().date, date(28));

    let clock = MockClock::on_date(date(30));
    let own = store
        .readings_for_user(patient.user_id, None)
        .await
        .unwrap();
    let detail = analytics::user_detail(&own, 30, clock.today());
    assert_eq!(detail.total_readings, 6);
    assert_eq!(detail.readings_in_window, 6);
    assert_eq!(detail.stats.len(), 4);
}
