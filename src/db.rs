use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::{
    reading::{NewReading, Reading, ValidationError},
    report::write_csv_dump,
    store::{DuplicateEmail, ReadingStore, UserStore},
    traits::Clock,
    user::{NewUser, Role, User, UserCredentials},
};

/// Raw `sugar_readings` row as stored.
#[derive(Debug, Clone, FromRow)]
struct ReadingRow {
    id: i32,
    user_id: i32,
    reading_type: String,
    sugar_level: i32,
    reading_date: NaiveDate,
    reading_time: NaiveTime,
    notes: Option<String>,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = ValidationError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(Reading {
            id: row.id,
            user_id: row.user_id,
            reading_type: row.reading_type.parse()?,
            level: row.sugar_level,
            date: row.reading_date,
            time: row.reading_time,
            notes: row.notes,
        })
    }
}

/// Convert rows at the storage boundary, dropping any that do not parse.
fn into_readings(rows: Vec<ReadingRow>) -> Vec<Reading> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Reading::try_from(row) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    tracing::warn!(reading_id = id, "Skipping malformed reading row: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: String,
    password_hash: String,
    profile_image_url: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_credentials(self) -> Result<UserCredentials> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid role for user {}", self.id))?;
        Ok(UserCredentials {
            user: User {
                id: self.id,
                email: self.email,
                name: self.name,
                profile_image_url: self.profile_image_url,
                role,
                created_at: self.created_at,
            },
            password_hash: self.password_hash,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self { pool })
    }

    /// Export every reading to a timestamped CSV file in `output_dir`.
    ///
    /// Returns the path of the created file.
    pub async fn export_to_csv<C: Clock>(&self, output_dir: &Path, clock: &C) -> Result<PathBuf> {
        let readings = self
            .all_readings(None)
            .await
            .context("Failed to fetch readings for export")?;

        let export_time = clock.now_utc();
        let filename = format!(
            "glucose_log_export_{}.csv",
            export_time.format("%Y%m%d_%H%M%S")
        );
        let output_path = output_dir.join(&filename);

        let path = output_path.clone();
        let count = readings.len();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv_dump(file, &readings)
        })
        .await
        .context("CSV export task failed")??;

        tracing::info!("Exported {} readings to {}", count, output_path.display());
        Ok(output_path)
    }
}

impl UserStore for Database {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, name, password_hash, profile_image_url, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, name, password_hash, profile_image_url, role, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.profile_image_url)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                anyhow::Error::new(DuplicateEmail(user.email.clone()))
            }
            _ => anyhow::Error::new(e).context("Failed to create user"),
        })?;

        Ok(row.into_credentials()?.user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, profile_image_url, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up user by email")?;

        row.map(UserRow::into_credentials).transpose()
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, profile_image_url, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up user by id")?;

        Ok(row
            .map(UserRow::into_credentials)
            .transpose()?
            .map(|c| c.user))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, profile_image_url, role, created_at
            FROM users
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.into_iter()
            .map(|row| row.into_credentials().map(|c| c.user))
            .collect()
    }
}

impl ReadingStore for Database {
    async fn insert_reading(&self, user_id: i32, reading: &NewReading) -> Result<Reading> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            INSERT INTO sugar_readings
                (user_id, reading_type, sugar_level, reading_date, reading_time, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, reading_type, sugar_level, reading_date, reading_time, notes
            "#,
        )
        .bind(user_id)
        .bind(reading.reading_type().as_str())
        .bind(reading.level())
        .bind(reading.date())
        .bind(reading.time())
        .bind(reading.notes())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save reading")?;

        Ok(Reading::try_from(row)?)
    }

    async fn readings_for_user(&self, user_id: i32, limit: Option<i64>) -> Result<Vec<Reading>> {
        // LIMIT NULL means no limit in PostgreSQL.
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, user_id, reading_type, sugar_level, reading_date, reading_time, notes
            FROM sugar_readings
            WHERE user_id = $1
            ORDER BY reading_date DESC, reading_time DESC, id ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch readings")?;

        Ok(into_readings(rows))
    }

    async fn readings_since(&self, user_id: i32, since: NaiveDate) -> Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, user_id, reading_type, sugar_level, reading_date, reading_time, notes
            FROM sugar_readings
            WHERE user_id = $1 AND reading_date >= $2
            ORDER BY reading_date DESC, reading_time DESC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch readings in window")?;

        Ok(into_readings(rows))
    }

    async fn all_readings(&self, limit: Option<i64>) -> Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, user_id, reading_type, sugar_level, reading_date, reading_time, notes
            FROM sugar_readings
            ORDER BY reading_date DESC, reading_time DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch all readings")?;

        Ok(into_readings(rows))
    }
}
