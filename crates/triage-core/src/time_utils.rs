use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly – no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── ReferenceClock ────────────────────────────────────────────────────────────

/// Decides which calendar day counts as "today" for age computations.
///
/// The rules compare whole calendar days, so the only thing that matters is
/// the local date in the analysts' timezone.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    tz: Tz,
}

impl ReferenceClock {
    /// Create a clock for the given IANA timezone name.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "ReferenceClock: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { tz }
    }

    /// The current local date.
    pub fn today(&self) -> NaiveDate {
        self.date_at(Utc::now())
    }

    /// The local date at instant `now`.
    pub fn date_at(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
