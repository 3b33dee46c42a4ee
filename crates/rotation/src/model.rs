//! Static role records and the views built from them

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RotationConfig;
use crate::error::{RotationError, RotationResult};
use crate::secret::SecureString;

/// Longest role name accepted, in bytes
///
/// Leaves room for the journal prefix inside the key limit of the file
/// store.
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// A username/password pair in an external system, rotated on a fixed period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRole {
    /// Unique role name
    pub name: String,
    /// Connection profile of the external system holding the user
    pub target_db: String,
    /// Username in the external system
    pub username: String,
    /// Secret currently set in the external system
    pub current_secret: SecureString,
    #[serde(with = "humantime_serde")]
    pub rotation_period: Duration,
    /// Time of the last successful rotation, `None` until the first one
    pub last_rotation_time: Option<DateTime<Utc>>,
    /// Opaque statements handed to the provider on every rotation
    #[serde(default)]
    pub rotation_statements: Vec<String>,
    /// Revoke the external user when the role is deleted
    #[serde(default)]
    pub revoke_on_delete: bool,
}

impl StaticRole {
    /// When the next rotation is due: one period after the last rotation, or
    /// immediately for a role that was never rotated
    pub fn next_rotation_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_rotation_time {
            Some(last) => add_period(last, self.rotation_period),
            None => now,
        }
    }

    /// Read-only credential view as of `now`
    pub fn credential(&self, now: DateTime<Utc>) -> StaticCredential {
        let ttl = (self.next_rotation_due(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        StaticCredential {
            username: self.username.clone(),
            password: self.current_secret.clone(),
            last_rotation_time: self.last_rotation_time,
            rotation_period: self.rotation_period,
            ttl,
        }
    }
}

/// Credentials as handed out to a reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticCredential {
    pub username: String,
    pub password: SecureString,
    pub last_rotation_time: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub rotation_period: Duration,
    /// Time left until the next scheduled rotation, zero when overdue
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// Everything needed to create a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub target_db: String,
    pub username: String,
    #[serde(with = "humantime_serde")]
    pub rotation_period: Duration,
    #[serde(default)]
    pub rotation_statements: Vec<String>,
    #[serde(default)]
    pub revoke_on_delete: bool,
    /// Secret the external user has right now, if known
    #[serde(default)]
    pub initial_secret: Option<SecureString>,
}

impl RoleDefinition {
    pub fn new(
        name: impl Into<String>,
        target_db: impl Into<String>,
        username: impl Into<String>,
        rotation_period: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            username: username.into(),
            rotation_period,
            rotation_statements: Vec::new(),
            revoke_on_delete: false,
            initial_secret: None,
        }
    }

    pub fn with_statements(mut self, statements: Vec<String>) -> Self {
        self.rotation_statements = statements;
        self
    }

    pub fn with_revoke_on_delete(mut self, revoke: bool) -> Self {
        self.revoke_on_delete = revoke;
        self
    }

    pub fn with_initial_secret(mut self, secret: SecureString) -> Self {
        self.initial_secret = Some(secret);
        self
    }

    /// Reject definitions the manager cannot schedule
    pub fn validate(&self, config: &RotationConfig) -> RotationResult<()> {
        validate_name(&self.name)?;
        if self.username.trim().is_empty() {
            return Err(RotationError::invalid_role(&self.name, "username is required"));
        }
        if self.target_db.trim().is_empty() {
            return Err(RotationError::invalid_role(&self.name, "target_db is required"));
        }
        validate_period(&self.name, self.rotation_period, config)
    }

    /// Role record as first persisted, never rotated yet
    pub fn into_role(self) -> StaticRole {
        StaticRole {
            name: self.name,
            target_db: self.target_db,
            username: self.username,
            current_secret: self.initial_secret.unwrap_or_else(|| SecureString::new("")),
            rotation_period: self.rotation_period,
            last_rotation_time: None,
            rotation_statements: self.rotation_statements,
            revoke_on_delete: self.revoke_on_delete,
        }
    }
}

/// Partial change to an existing role
///
/// `username` and `target_db` may be supplied but must match the stored
/// values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleUpdate {
    pub username: Option<String>,
    pub target_db: Option<String>,
    #[serde(with = "humantime_serde")]
    pub rotation_period: Option<Duration>,
    pub rotation_statements: Option<Vec<String>>,
    pub revoke_on_delete: Option<bool>,
}

impl RoleUpdate {
    pub fn with_rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = Some(period);
        self
    }

    pub fn with_statements(mut self, statements: Vec<String>) -> Self {
        self.rotation_statements = Some(statements);
        self
    }

    pub fn with_revoke_on_delete(mut self, revoke: bool) -> Self {
        self.revoke_on_delete = Some(revoke);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_target_db(mut self, target_db: impl Into<String>) -> Self {
        self.target_db = Some(target_db.into());
        self
    }

    /// Apply to `role`, returning whether the rotation period changed
    pub fn apply(self, role: &mut StaticRole, config: &RotationConfig) -> RotationResult<bool> {
        if self.username.as_ref().is_some_and(|u| *u != role.username) {
            return Err(RotationError::ImmutableField {
                role: role.name.clone(),
                field: "username",
            });
        }
        if self.target_db.as_ref().is_some_and(|db| *db != role.target_db) {
            return Err(RotationError::ImmutableField {
                role: role.name.clone(),
                field: "target_db",
            });
        }

        let mut period_changed = false;
        if let Some(period) = self.rotation_period {
            validate_period(&role.name, period, config)?;
            period_changed = period != role.rotation_period;
            role.rotation_period = period;
        }
        if let Some(statements) = self.rotation_statements {
            role.rotation_statements = statements;
        }
        if let Some(revoke) = self.revoke_on_delete {
            role.revoke_on_delete = revoke;
        }
        Ok(period_changed)
    }
}

impl From<RoleDefinition> for RoleUpdate {
    fn from(def: RoleDefinition) -> Self {
        Self {
            username: Some(def.username),
            target_db: Some(def.target_db),
            rotation_period: Some(def.rotation_period),
            rotation_statements: Some(def.rotation_statements),
            revoke_on_delete: Some(def.revoke_on_delete),
        }
    }
}

fn validate_name(name: &str) -> RotationResult<()> {
    if name.is_empty() {
        return Err(RotationError::invalid_role(name, "name cannot be empty"));
    }
    if name.len() > MAX_ROLE_NAME_LEN {
        return Err(RotationError::invalid_role(
            name,
            format!("name is longer than {MAX_ROLE_NAME_LEN} bytes"),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RotationError::invalid_role(
            name,
            "name cannot contain whitespace or control characters",
        ));
    }
    Ok(())
}

fn validate_period(role: &str, period: Duration, config: &RotationConfig) -> RotationResult<()> {
    if period < config.min_rotation_period {
        return Err(RotationError::invalid_role(
            role,
            format!(
                "rotation_period {period:?} is below the minimum of {:?}",
                config.min_rotation_period
            ),
        ));
    }
    Ok(())
}

/// `at + period`, saturating at the largest representable time
pub(crate) fn add_period(at: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(period)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Rotation timestamp for an attempt finishing at `now`
///
/// Always strictly after `previous`, even when the clock stands still or
/// steps backwards.
pub(crate) fn advance_rotation_time(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev
            .checked_add_signed(TimeDelta::microseconds(1))
            .unwrap_or(prev),
        _ => now,
    }
}
