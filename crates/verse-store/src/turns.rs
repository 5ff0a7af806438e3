use chrono::{DateTime, Utc};
use rusqlite::Row;

use verse_core::ids::{TurnId, UserId};
use verse_core::ChatTurn;

use crate::database::Database;
use crate::error::StoreError;

/// Append-only repository for chat turns.
///
/// Timestamps are assigned here at append time and clamped
/// non-decreasing against the user's latest stored turn, so a backwards
/// clock step cannot produce out-of-order history.
pub struct TurnRepo {
    db: Database,
}

impl TurnRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new immutable turn for `user_id`, stamping the server's
    /// current time. Returns the stored turn.
    pub fn append(
        &self,
        user_id: &UserId,
        message: &str,
        response: &str,
    ) -> Result<ChatTurn, StoreError> {
        let id = TurnId::new();
        let now = Utc::now();

        self.db.with_conn(|conn| {
            let latest: Option<String> = conn
                .query_row(
                    "SELECT timestamp FROM chat_turns WHERE user_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    [user_id.as_str()],
                    |row| row.get(0),
                )
                .ok();

            let timestamp = match latest.as_deref().and_then(parse_timestamp) {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            // Store and return the same (truncated) instant.
            let encoded = encode_timestamp(timestamp);
            let timestamp = parse_timestamp(&encoded).unwrap_or(timestamp);

            conn.execute(
                "INSERT INTO chat_turns (id, user_id, message, response, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), user_id.as_str(), message, response, encoded],
            )?;

            Ok(ChatTurn {
                id: id.clone(),
                user_id: user_id.clone(),
                message: message.to_string(),
                response: response.to_string(),
                timestamp,
            })
        })
    }

    /// All turns for `user_id`, oldest first.
    pub fn history(&self, user_id: &UserId) -> Result<Vec<ChatTurn>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message, response, timestamp
                 FROM chat_turns WHERE user_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_id.as_str()], row_to_turn)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: u64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_turns WHERE user_id = ?1",
                [user_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Administrative clear of all turns. Returns the number deleted.
    pub fn reset(&self) -> Result<usize, StoreError> {
        self.db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM chat_turns", [])?))
    }
}

/// Fixed-width RFC 3339 (microseconds, Z suffix) so lexicographic TEXT
/// ordering in SQL matches chronological ordering.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<ChatTurn> {
    let raw_ts: String = row.get(4)?;
    let timestamp = parse_timestamp(&raw_ts).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("bad timestamp: {raw_ts}").into(),
        )
    })?;

    Ok(ChatTurn {
        id: TurnId::from_raw(row.get::<_, String>(0)?),
        user_id: UserId::from_raw(row.get::<_, String>(1)?),
        message: row.get(2)?,
        response: row.get(3)?,
        timestamp,
    })
}
