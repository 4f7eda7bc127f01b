//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes. Safe to run on
/// every startup.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    // Job table and its id sequence
    db.query(JOB_SCHEMA).await?.check()?;
    db.query(SEQUENCE_SCHEMA).await?.check()?;

    // Reporting tables
    db.query(REQUESTER_SCHEMA).await?.check()?;
    db.query(DOWNLOAD_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
const JOB_SCHEMA: &str = r#"
-- Jobs are never deleted; finished rows stay for auditing
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS seq ON job TYPE int;
DEFINE FIELD IF NOT EXISTS user_id ON job TYPE int;
DEFINE FIELD IF NOT EXISTS chat_id ON job TYPE int;
DEFINE FIELD IF NOT EXISTS reply_to ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS url ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string
    ASSERT $value IN ["queued", "running", "done", "error"];
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE datetime;
DEFINE FIELD IF NOT EXISTS started_at ON job TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS finished_at ON job TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS bytes_sent ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS error ON job TYPE option<string>;

DEFINE INDEX IF NOT EXISTS job_seq ON job FIELDS seq UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_status_seq ON job FIELDS status, seq;
"#;

/// Counter records handing out monotonically increasing ids and tracking
/// the number of queued jobs.
const SEQUENCE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS sequence SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS last ON sequence TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS queued ON sequence TYPE int DEFAULT 0;
"#;

/// Users seen by the bot.
const REQUESTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS requester SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS user_id ON requester TYPE int;
DEFINE FIELD IF NOT EXISTS username ON requester TYPE option<string>;
DEFINE FIELD IF NOT EXISTS first_name ON requester TYPE option<string>;
DEFINE FIELD IF NOT EXISTS last_name ON requester TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON requester TYPE datetime;
"#;

/// Delivery history for statistics.
const DOWNLOAD_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS download SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS user_id ON download TYPE int;
DEFINE FIELD IF NOT EXISTS chat_id ON download TYPE int;
DEFINE FIELD IF NOT EXISTS url ON download TYPE string;
DEFINE FIELD IF NOT EXISTS bytes_sent ON download TYPE int;
DEFINE FIELD IF NOT EXISTS ok ON download TYPE bool;
DEFINE FIELD IF NOT EXISTS ts ON download TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS download_user ON download FIELDS user_id;
DEFINE INDEX IF NOT EXISTS download_chat ON download FIELDS chat_id;
"#;
