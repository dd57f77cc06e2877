use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveDate, NaiveTime, Weekday};
use tracing::warn;

use crate::policy::{Band, WindowConfig};

const DEFAULT_OFFSET_HOURS: i32 = -3;
const DEFAULT_COHORTS: [&str; 3] = ["fullstack", "ia-gen", "ia-soft"];

/// Runtime configuration, read once from the process environment.
/// Absent or malformed values log a warning and fall back to defaults;
/// startup never halts over configuration.
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub admin: Option<AdminCredential>,
    pub offset: FixedOffset,
    pub windows: WindowConfig,
    pub cohort_locked: bool,
    pub cohorts: Vec<String>,
}

/// Administrator login pair, supplied via environment rather than
/// compiled in. When unset, admin login is disabled.
pub struct AdminCredential {
    pub email: String,
    pub birth_date: NaiveDate,
}

impl Config {
    pub fn load() -> Self {
        let db_path = match env::var("ROLLCALL_DB") {
            Ok(p) => PathBuf::from(p),
            Err(_) => {
                warn!("ROLLCALL_DB not set; falling back to ./rollcall.sqlite3");
                PathBuf::from("rollcall.sqlite3")
            }
        };

        let admin = load_admin();
        if admin.is_none() {
            warn!("admin credentials not configured; admin login is disabled");
        }

        let hours: i32 = parse_or("ROLLCALL_UTC_OFFSET_HOURS", DEFAULT_OFFSET_HOURS);
        let offset = match FixedOffset::east_opt(hours * 3600) {
            Some(o) => o,
            None => {
                warn!("ROLLCALL_UTC_OFFSET_HOURS out of range: {hours}; using {DEFAULT_OFFSET_HOURS}");
                default_offset()
            }
        };

        let weekday = match env::var("ROLLCALL_CLASS_WEEKDAY") {
            Err(_) => Weekday::Mon,
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("invalid ROLLCALL_CLASS_WEEKDAY: {raw:?}; using mon");
                Weekday::Mon
            }),
        };

        let windows = WindowConfig {
            weekday,
            check_in: load_band("ROLLCALL_CHECKIN_WINDOW", default_check_in()),
            check_out: load_band("ROLLCALL_CHECKOUT_WINDOW", default_check_out()),
        };

        let cohorts = match env::var("ROLLCALL_COHORTS") {
            Err(_) => DEFAULT_COHORTS.iter().map(|c| c.to_string()).collect(),
            Ok(raw) => raw
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        };

        Self {
            port: parse_or("ROLLCALL_PORT", 3001),
            db_path,
            admin,
            offset,
            windows,
            cohort_locked: parse_or("ROLLCALL_COHORT_LOCKED", true),
            cohorts,
        }
    }
}

fn load_admin() -> Option<AdminCredential> {
    let email = env::var("ROLLCALL_ADMIN_EMAIL").ok()?;
    let raw = env::var("ROLLCALL_ADMIN_BIRTHDATE").ok()?;
    match raw.trim().parse::<NaiveDate>() {
        Ok(birth_date) => Some(AdminCredential {
            email: email.trim().to_lowercase(),
            birth_date,
        }),
        Err(_) => {
            warn!("invalid ROLLCALL_ADMIN_BIRTHDATE: {raw:?}; admin login disabled");
            None
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("invalid value for {key}: {raw:?}; using default");
            default
        }
    }
}

fn load_band(key: &str, default: Band) -> Band {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match parse_band(&raw) {
        Some(band) => band,
        None => {
            warn!("invalid value for {key}: {raw:?} (expected HH:MM-HH:MM); using default");
            default
        }
    }
}

fn parse_band(raw: &str) -> Option<Band> {
    let (start, end) = raw.trim().split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    if start >= end {
        return None;
    }
    Some(Band { start, end })
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_OFFSET_HOURS * 3600).expect("default offset in range")
}

fn default_check_in() -> Band {
    Band {
        start: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
    }
}

fn default_check_out() -> Band {
    Band {
        start: NaiveTime::from_hms_opt(21, 30, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(23, 30, 0).expect("valid time"),
    }
}
