//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, link) and shared utilities (open_db)
//! - `sync` - Provider sync command
//! - `analyze` - Pattern analysis and recurring-charge commands
//! - `feedback` - Category correction command
//! - `status` - Database/link/token status command

pub mod analyze;
pub mod core;
pub mod feedback;
pub mod status;
pub mod sync;

// Re-export command functions for main.rs
pub use analyze::*;
pub use core::*;
pub use feedback::*;
pub use status::*;
pub use sync::*;

/// Format signed integer cents as dollars, e.g. -1599 -> "-$15.99"
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(-1599), "-$15.99");
        assert_eq!(format_cents(1599), "$15.99");
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(-5), "-$0.05");
        assert_eq!(format_cents(100_000), "$1000.00");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer string", 10), "a much ...");
    }
}
