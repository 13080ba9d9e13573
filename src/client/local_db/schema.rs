//! Database Schema Definitions
//!
//! Schema version bookkeeping and the well-known storage keys.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Pending offline mutations
pub const QUEUE_KEY: &str = "zenith_offline_queue";
/// Entries parked for manual resolution
pub const DEAD_LETTER_KEY: &str = "zenith_dead_letters";
/// Temporary id to server id mappings
pub const ID_REMAP_KEY: &str = "zenith_id_remap";
/// Time of the last fully successful drain
pub const LAST_SYNC_KEY: &str = "zenith_last_sync";

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
