//! Data layer module
//!
//! Handles all data persistence and caching:
//! - SQLite database connection and `BEGIN IMMEDIATE` transactions
//! - Per-entity queries (users, graph, posts, clans, messages, notifications)
//! - Substring search patterns
//! - Profile cache (volatile)

mod cache;
mod database;
mod models;

pub mod clans;
pub mod graph;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod users;

pub use cache::ProfileCache;
pub use database::{Database, ImmediateTx};
pub use models::*;

/// `LIKE` pattern matching `needle` anywhere; wildcards are escaped with `\`
pub(crate) fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod database_test;

#[cfg(test)]
mod tests {
    use super::like_contains;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_contains("ru"), "%ru%");
        assert_eq!(like_contains("50%_off"), "%50\\%\\_off%");
    }
}
