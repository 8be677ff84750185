//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite checkpoint store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per pagination stream
CREATE TABLE IF NOT EXISTS checkpoints (
    job_key TEXT PRIMARY KEY,
    last_committed_page INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
