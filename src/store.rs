//! Storage seams for users and readings.
//!
//! [`crate::db::Database`] implements these against PostgreSQL; [`MemoryStore`]
//! keeps everything in process for tests and dry runs.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::{
    analytics::sort_latest_first,
    reading::{NewReading, Reading},
    user::{NewUser, User, UserCredentials},
};

/// Returned from [`UserStore::create_user`] when the email is already
/// registered. Stores surface it inside `anyhow::Error` so callers can
/// downcast.
#[derive(Debug, Error)]
#[error("user with email {0} already exists")]
pub struct DuplicateEmail(pub String);

pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with [`DuplicateEmail`] if the email is taken.
    fn create_user(&self, user: &NewUser) -> impl Future<Output = Result<User>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserCredentials>>> + Send;

    fn find_user_by_id(&self, id: i32) -> impl Future<Output = Result<Option<User>>> + Send;

    /// All users, newest first.
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;
}

pub trait ReadingStore: Send + Sync {
    /// Insert a reading owned by `user_id`. The user must exist.
    fn insert_reading(
        &self,
        user_id: i32,
        reading: &NewReading,
    ) -> impl Future<Output = Result<Reading>> + Send;

    /// A user's readings, latest first.
    fn readings_for_user(
        &self,
        user_id: i32,
        limit: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Reading>>> + Send;

    /// A user's readings dated on or after `since`, latest first.
    fn readings_since(
        &self,
        user_id: i32,
        since: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Reading>>> + Send;

    /// Readings across all users, latest first.
    fn all_readings(&self, limit: Option<i64>) -> impl Future<Output = Result<Vec<Reading>>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<UserCredentials>,
    readings: Vec<Reading>,
    next_user_id: i32,
    next_reading_id: i32,
}

/// In-memory store for testing and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

fn take_limit(mut readings: Vec<Reading>, limit: Option<i64>) -> Vec<Reading> {
    sort_latest_first(&mut readings);
    if let Some(limit) = limit {
        readings.truncate(usize::try_from(limit).unwrap_or(0));
    }
    readings
}

impl UserStore for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut state = self.lock()?;
        if state.users.iter().any(|u| u.user.email == user.email) {
            return Err(DuplicateEmail(user.email.clone()).into());
        }

        state.next_user_id += 1;
        let created = User {
            id: state.next_user_id,
            email: user.email.clone(),
            name: user.name.clone(),
            profile_image_url: user.profile_image_url.clone(),
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.push(UserCredentials {
            user: created.clone(),
            password_hash: user.password_hash.clone(),
        });
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|u| u.user.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.user.id == id)
            .map(|u| u.user.clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let state = self.lock()?;
        // Ids are assigned in creation order.
        let mut users: Vec<User> = state.users.iter().map(|u| u.user.clone()).collect();
        users.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(users)
    }
}

impl ReadingStore for MemoryStore {
    async fn insert_reading(&self, user_id: i32, reading: &NewReading) -> Result<Reading> {
        let mut state = self.lock()?;
        if !state.users.iter().any(|u| u.user.id == user_id) {
            bail!("cannot add reading for unknown user {user_id}");
        }

        state.next_reading_id += 1;
        let stored = reading.clone().into_reading(state.next_reading_id, user_id);
        state.readings.push(stored.clone());
        Ok(stored)
    }

    async fn readings_for_user(&self, user_id: i32, limit: Option<i64>) -> Result<Vec<Reading>> {
        let state = self.lock()?;
        let readings = state
            .readings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(take_limit(readings, limit))
    }

    async fn readings_since(&self, user_id: i32, since: NaiveDate) -> Result<Vec<Reading>> {
        let state = self.lock()?;
        let readings = state
            .readings
            .iter()
            .filter(|r| r.user_id == user_id && r.date >= since)
            .cloned()
            .collect();
        Ok(take_limit(readings, None))
    }

    async fn all_readings(&self, limit: Option<i64>) -> Result<Vec<Reading>> {
        let state = self.lock()?;
        Ok(take_limit(state.readings.clone(), limit))
    }
}
