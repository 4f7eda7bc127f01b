//! Reporting tables: users seen and delivery history.
//!
//! Nothing here takes part in scheduling; a failure to record a row never
//! affects job state.

use std::collections::HashSet;

use serde::Deserialize;

use super::take_last;
use crate::{Database, DbError};

/// Profile of a user registering with the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewRequester {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl NewRequester {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

/// Count and byte total of successful deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadTotals {
    pub count: u64,
    pub bytes: u64,
}

/// Per-user totals for leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTotals {
    pub user_id: i64,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct TotalsRow {
    user_id: Option<i64>,
    count: i64,
    bytes: Option<i64>,
}

impl TotalsRow {
    fn totals(&self) -> DownloadTotals {
        DownloadTotals {
            count: self.count.max(0) as u64,
            bytes: self.bytes.unwrap_or(0).max(0) as u64,
        }
    }
}

/// Repository for statistics persistence operations.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    db: Database,
}

impl StatsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a user. Repeat registrations leave the first profile as is.
    pub async fn add_user(&self, user: &NewRequester) -> Result<(), DbError> {
        let response = self
            .db
            .query(
                r#"
                INSERT IGNORE INTO requester {
                    id: $user_id,
                    user_id: $user_id,
                    username: $username,
                    first_name: $first_name,
                    last_name: $last_name,
                    created_at: time::now()
                } RETURN NONE;
                "#,
            )
            .bind(("user_id", user.user_id))
            .bind(("username", user.username.clone()))
            .bind(("first_name", user.first_name.clone()))
            .bind(("last_name", user.last_name.clone()))
            .await?;

        response.check()?;
        Ok(())
    }

    /// Profile stored for a user, if registered.
    pub async fn user(&self, user_id: i64) -> Result<Option<NewRequester>, DbError> {
        let response = self
            .db
            .query(
                "SELECT user_id, username, first_name, last_name \
                 FROM type::thing('requester', $user_id)",
            )
            .bind(("user_id", user_id))
            .await?;

        let rows: Vec<NewRequester> = take_last(response)?;
        Ok(rows.into_iter().next())
    }

    /// Record one delivery attempt.
    pub async fn add_download(
        &self,
        user_id: i64,
        chat_id: i64,
        url: &str,
        bytes_sent: u64,
        ok: bool,
    ) -> Result<(), DbError> {
        let response = self
            .db
            .query(
                r#"
                CREATE download CONTENT {
                    user_id: $user_id,
                    chat_id: $chat_id,
                    url: $url,
                    bytes_sent: $bytes_sent,
                    ok: $ok
                } RETURN NONE;
                "#,
            )
            .bind(("user_id", user_id))
            .bind(("chat_id", chat_id))
            .bind(("url", url.to_string()))
            .bind(("bytes_sent", bytes_sent as i64))
            .bind(("ok", ok))
            .await?;

        response.check()?;
        Ok(())
    }

    /// Successful deliveries requested by a user, across all chats.
    pub async fn user_stats(&self, user_id: i64) -> Result<DownloadTotals, DbError> {
        self.totals("user_id", user_id).await
    }

    /// Successful deliveries into a chat.
    pub async fn chat_stats(&self, chat_id: i64) -> Result<DownloadTotals, DbError> {
        self.totals("chat_id", chat_id).await
    }

    async fn totals(&self, field: &'static str, value: i64) -> Result<DownloadTotals, DbError> {
        let query = format!(
            "SELECT count() AS count, math::sum(bytes_sent) AS bytes FROM download \
             WHERE {field} = $needle AND ok = true GROUP ALL"
        );

        let response = self.db.query(query).bind(("needle", value)).await?;
        let rows: Vec<TotalsRow> = take_last(response)?;

        Ok(rows.first().map(TotalsRow::totals).unwrap_or_default())
    }

    /// Users with the most successful deliveries, optionally within one chat.
    pub async fn top_users(
        &self,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<UserTotals>, DbError> {
        let chat_clause = if chat_id.is_some() {
            "AND chat_id = $chat_id"
        } else {
            ""
        };
        let query = format!(
            "SELECT user_id, count() AS count, math::sum(bytes_sent) AS bytes FROM download \
             WHERE ok = true {chat_clause} GROUP BY user_id"
        );

        let mut request = self.db.query(query);
        if let Some(chat_id) = chat_id {
            request = request.bind(("chat_id", chat_id));
        }
        let rows: Vec<TotalsRow> = take_last(request.await?)?;

        let mut users: Vec<UserTotals> = rows
            .iter()
            .filter_map(|row| {
                let totals = row.totals();
                row.user_id.map(|user_id| UserTotals {
                    user_id,
                    count: totals.count,
                    bytes: totals.bytes,
                })
            })
            .collect();
        users.sort_by(|a, b| b.count.cmp(&a.count).then(a.user_id.cmp(&b.user_id)));
        users.truncate(limit);

        Ok(users)
    }

    /// Number of distinct users ever registered.
    pub async fn total_users(&self) -> Result<u64, DbError> {
        let response = self
            .db
            .query("SELECT count() AS count FROM requester GROUP ALL")
            .await?;
        let rows: Vec<CountRow> = take_last(response)?;

        Ok(rows.first().map_or(0, |r| r.count.max(0) as u64))
    }

    /// Distinct users with at least one successful delivery in a chat.
    pub async fn group_active_users(&self, chat_id: i64) -> Result<u64, DbError> {
        let response = self
            .db
            .query("SELECT VALUE user_id FROM download WHERE chat_id = $chat_id AND ok = true")
            .bind(("chat_id", chat_id))
            .await?;

        let user_ids: Vec<i64> = take_last(response)?;
        let distinct: HashSet<i64> = user_ids.into_iter().collect();
        Ok(distinct.len() as u64)
    }
}
