//! Expiration classes and lapse evaluation

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{KeyStoreError, Result};
use crate::provider::Provider;
use crate::storage::{Purpose, Scope, StorageBackend};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Longest duration a class may be configured with: 100 years
pub const MAX_DURATION_MS: u64 = 36_500 * DAY_MS;

/// Named expiry policy chosen when a credential is stored
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ExpirationClass {
    #[default]
    #[serde(rename = "never")]
    Never,
    /// Ends with the session scope; no instant is recorded
    #[serde(rename = "session")]
    Session,
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "7days")]
    SevenDays,
    #[serde(rename = "30days")]
    ThirtyDays,
    /// Written by older releases; not in the default duration table
    #[serde(rename = "90days")]
    NinetyDays,
}

impl ExpirationClass {
    /// Classes offered for new writes with the default table
    pub const CANONICAL: [ExpirationClass; 5] = [
        ExpirationClass::Never,
        ExpirationClass::Session,
        ExpirationClass::OneDay,
        ExpirationClass::SevenDays,
        ExpirationClass::ThirtyDays,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpirationClass::Never => "never",
            ExpirationClass::Session => "session",
            ExpirationClass::OneDay => "1day",
            ExpirationClass::SevenDays => "7days",
            ExpirationClass::ThirtyDays => "30days",
            ExpirationClass::NinetyDays => "90days",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "never" => Some(ExpirationClass::Never),
            "session" | "session-bound" => Some(ExpirationClass::Session),
            "1day" => Some(ExpirationClass::OneDay),
            "7days" => Some(ExpirationClass::SevenDays),
            "30days" => Some(ExpirationClass::ThirtyDays),
            "90days" => Some(ExpirationClass::NinetyDays),
            _ => None,
        }
    }

    /// Whether the class never yields an explicit instant
    pub fn is_open_ended(self) -> bool {
        matches!(self, ExpirationClass::Never | ExpirationClass::Session)
    }
}

impl fmt::Display for ExpirationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpirationClass {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s).ok_or_else(|| KeyStoreError::UnsupportedExpiration(s.to_string()))
    }
}

/// Default duration table: 1, 7 and 30 days
pub fn default_durations_ms() -> BTreeMap<ExpirationClass, u64> {
    BTreeMap::from([
        (ExpirationClass::OneDay, DAY_MS),
        (ExpirationClass::SevenDays, 7 * DAY_MS),
        (ExpirationClass::ThirtyDays, 30 * DAY_MS),
    ])
}

/// Format an instant the way it is stored
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339()
}

/// Parse a stored instant: RFC 3339, or epoch milliseconds as older releases wrote
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ms) = value.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Converts classes to instants and decides whether records have lapsed
pub struct ExpirationPolicy {
    durations: BTreeMap<ExpirationClass, Duration>,
    clock: Arc<dyn Clock>,
}

impl ExpirationPolicy {
    pub fn new(durations_ms: &BTreeMap<ExpirationClass, u64>, clock: Arc<dyn Clock>) -> Self {
        let durations = durations_ms
            .iter()
            .filter(|(class, _)| !class.is_open_ended())
            .filter_map(|(class, ms)| match i64::try_from(*ms) {
                Ok(ms) => Some((*class, Duration::milliseconds(ms))),
                Err(_) => {
                    warn!("Ignoring out-of-range duration for expiration class '{}'", class);
                    None
                }
            })
            .collect();

        Self { durations, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Configured duration of a class
    pub fn duration(&self, class: ExpirationClass) -> Option<Duration> {
        self.durations.get(&class).copied()
    }

    /// Classes that can be used for new writes
    pub fn supported_classes(&self) -> Vec<ExpirationClass> {
        let mut classes = vec![ExpirationClass::Never, ExpirationClass::Session];
        classes.extend(self.durations.keys().copied());
        classes
    }

    /// Absolute expiry for a class stored now
    ///
    /// `never` and `session` have none; a class without a configured duration,
    /// or one that runs past the representable range, fails with
    /// [`KeyStoreError::UnsupportedExpiration`].
    pub fn expiry_instant(&self, class: ExpirationClass) -> Result<Option<DateTime<Utc>>> {
        if class.is_open_ended() {
            return Ok(None);
        }

        let duration = self
            .duration(class)
            .ok_or_else(|| KeyStoreError::UnsupportedExpiration(class.to_string()))?;

        self.now()
            .checked_add_signed(duration)
            .map(Some)
            .ok_or_else(|| KeyStoreError::UnsupportedExpiration(class.to_string()))
    }

    /// Whether a stored expiry value has passed
    ///
    /// Absent means the record does not expire. An unreadable value counts as
    /// lapsed.
    pub fn has_lapsed(&self, stored_instant: Option<&str>) -> bool {
        match stored_instant {
            None => false,
            Some(value) => match parse_instant(value) {
                Some(instant) => self.now() >= instant,
                None => true,
            },
        }
    }

    /// Whether the provider's record in `scope` has expired
    ///
    /// Session scope never expires by instant; its lifetime is the session's.
    pub async fn is_expired(
        &self,
        backend: &StorageBackend,
        provider: &dyn Provider,
        scope: Scope,
    ) -> Result<bool> {
        if scope == Scope::Session {
            return Ok(false);
        }

        let stored = backend
            .get(Purpose::ExpiryInstant, provider, Some(Scope::Durable))
            .await?;
        let expired = self.has_lapsed(stored.as_deref());

        if expired {
            debug!("Credential for '{}' has expired", provider.id());
        }
        Ok(expired)
    }
}
