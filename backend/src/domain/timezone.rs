//! Per-user timezone resolution.
//!
//! Stored timezone strings come from client devices and may be legacy
//! abbreviations (`PDT`, `EST`, ...). Resolution never fails: anything that
//! cannot be mapped to an IANA zone falls back to UTC.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::warn;

use super::UserId;
use super::ports::UserProfileRepository;

/// Legacy abbreviations rewritten before validation.
///
/// Several of these (`EST`, `MST`) are valid fixed-offset zones in the IANA
/// database; rewriting first keeps daylight-saving rules for those users.
const LEGACY_ABBREVIATIONS: [(&str, &str); 8] = [
    ("PDT", "America/Los_Angeles"),
    ("PST", "America/Los_Angeles"),
    ("MDT", "America/Denver"),
    ("MST", "America/Denver"),
    ("CDT", "America/Chicago"),
    ("CST", "America/Chicago"),
    ("EDT", "America/New_York"),
    ("EST", "America/New_York"),
];

/// Error returned when a stored timezone cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timezone '{input}'")]
pub struct TimezoneResolutionFailure {
    /// The rejected input after trimming.
    pub input: String,
}

/// Map a stored timezone string to an IANA zone.
///
/// # Examples
/// ```
/// use chrono_tz::Tz;
/// use penalty_engine::domain::parse_timezone;
///
/// assert_eq!(parse_timezone("pdt"), Ok(Tz::America__Los_Angeles));
/// assert_eq!(parse_timezone("Europe/Paris"), Ok(Tz::Europe__Paris));
/// assert!(parse_timezone("Mars/Olympus").is_err());
/// ```
pub fn parse_timezone(raw: &str) -> Result<Tz, TimezoneResolutionFailure> {
    let trimmed = raw.trim();
    let canonical = LEGACY_ABBREVIATIONS
        .iter()
        .find(|(abbreviation, _)| abbreviation.eq_ignore_ascii_case(trimmed))
        .map_or(trimmed, |(_, zone)| *zone);

    canonical
        .parse::<Tz>()
        .map_err(|_| TimezoneResolutionFailure {
            input: trimmed.to_owned(),
        })
}

/// Resolves a user's canonical timezone from their stored profile.
#[derive(Clone)]
pub struct TimezoneResolver {
    profiles: Arc<dyn UserProfileRepository>,
}

impl TimezoneResolver {
    /// Build a resolver reading from `profiles`.
    pub fn new(profiles: Arc<dyn UserProfileRepository>) -> Self {
        Self { profiles }
    }

    /// Resolve the timezone for `user_id`, falling back to UTC.
    pub async fn resolve(&self, user_id: &UserId) -> Tz {
        let stored = match self.profiles.find_profile(user_id).await {
            Ok(Some(profile)) => profile.timezone,
            Ok(None) => {
                warn!(user_id = %user_id, "no profile for habit owner; using UTC");
                return Tz::UTC;
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "profile lookup failed; using UTC");
                return Tz::UTC;
            }
        };

        let Some(raw) = stored.filter(|value| !value.trim().is_empty()) else {
            return Tz::UTC;
        };

        match parse_timezone(&raw) {
            Ok(zone) => zone,
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "invalid stored timezone; using UTC");
                Tz::UTC
            }
        }
    }
}
