//! Repository implementations for database operations.

mod job_repo;
mod stats_repo;

pub use job_repo::{Enqueued, JobStore};
pub use stats_repo::{DownloadTotals, NewRequester, StatsRepository, UserTotals};

use serde::de::DeserializeOwned;
use surrealdb::Response;
use surrealdb::opt::QueryResult;

use crate::DbError;

/// Surface the first failed statement, then take the output of the final one.
///
/// Transaction markers produce no output, so the final index is the last
/// data statement of the batch.
pub(crate) fn take_last<R>(mut response: Response) -> Result<R, DbError>
where
    R: DeserializeOwned,
    usize: QueryResult<R>,
{
    let mut errors: Vec<_> = response.take_errors().into_iter().collect();
    errors.sort_by_key(|(index, _)| *index);
    if let Some((_, err)) = errors.into_iter().next() {
        return Err(err.into());
    }

    let last = response.num_statements().saturating_sub(1);
    Ok(response.take(last)?)
}
