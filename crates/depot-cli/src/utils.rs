use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use chrono::{DateTime, Utc};
use nu_ansi_term::Color;

pub struct Icons;

impl Icons {
    pub const CALENDAR: &str = "📅";
    pub const CHECK: &str = "✓";
    pub const CHECKSUM: &str = "🔏";
    pub const CROSS: &str = "✗";
    pub const DESCRIPTION: &str = "📝";
    pub const HOME: &str = "🏠";
    pub const LICENSE: &str = "📜";
    pub const LINK: &str = "🔗";
    pub const MAINTAINER: &str = "👤";
    pub const PACKAGE: &str = "📦";
    pub const SIZE: &str = "💾";
    pub const TYPE: &str = "📁";
    pub const VERSION: &str = "🏁";
    pub const WARNING: &str = "⚠";
}

pub fn term_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub fn set_flag(flag: &RwLock<bool>, value: bool) {
    if let Ok(mut guard) = flag.write() {
        *guard = value;
    }
}

pub fn progress_enabled() -> bool {
    PROGRESS.read().map(|enabled| *enabled).unwrap_or(false)
}

fn color_enabled() -> bool {
    COLOR.read().map(|enabled| *enabled).unwrap_or(false)
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if color_enabled() {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Render a millisecond timestamp as a calendar date; zero means unknown.
pub fn format_date(millis: i64) -> String {
    if millis <= 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_datetime(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|date| date.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
