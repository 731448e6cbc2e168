//! Lazy query plan over a stream of events.
//!
//! Every stage wraps the previous one and does no work. The source is read once,
//! in a single pass, when `collect` is called on the final stage.
//!
//! ```ignore
//! let rows = EventPlan::scan(CsvEventReader::new(path)?)
//!     .clean(CleaningFilter::new())
//!     .group_by_platform_user()
//!     .top_n(top_n)
//!     .collect()?;
//! ```

use anyhow::Result;
use log::info;

use crate::aggregator::{rank_partition, SessionIndex, TopN, UserSessions};
use crate::cleaning::CleaningFilter;
use crate::event::{ActivityEvent, RankingRow};

/// Stage producing events.
pub struct EventPlan<I> {
    source: I,
}

impl<I> EventPlan<I>
where
    I: Iterator<Item = Result<ActivityEvent>>,
{
    pub fn scan(source: I) -> Self {
        Self { source }
    }

    /// Keep the events matching `predicate`. Read errors always pass through.
    pub fn filter<P>(self, mut predicate: P) -> EventPlan<impl Iterator<Item = Result<ActivityEvent>>>
    where
        P: FnMut(&ActivityEvent) -> bool,
    {
        EventPlan {
            source: self.source.filter(move |item| match item {
                Ok(event) => predicate(event),
                Err(_) => true,
            }),
        }
    }

    /// Keep the events accepted by the cleaning filter.
    pub fn clean(self, filter: CleaningFilter) -> EventPlan<impl Iterator<Item = Result<ActivityEvent>>> {
        self.filter(move |event| filter.is_valid(event))
    }

    /// Drop the columns the ranking does not use.
    pub fn project(self) -> EventPlan<impl Iterator<Item = Result<ActivityEvent>>> {
        EventPlan {
            source: self.source.map(|item| item.map(|event| event.project())),
        }
    }

    /// Group by `(platform, user_id)`, the global shape.
    pub fn group_by_platform_user(self) -> GroupedPlan<I> {
        GroupedPlan {
            source: self.source,
            partition: None,
        }
    }

    /// Group by `user_id` only, every row belongs to `platform`.
    pub fn group_by_user(self, platform: &str) -> GroupedPlan<I> {
        GroupedPlan {
            source: self.source,
            partition: Some(platform.to_string()),
        }
    }

    /// Run the plan and return the events.
    pub fn collect(self) -> Result<Vec<ActivityEvent>> {
        self.source.collect()
    }
}

/// Stage grouping events and counting distinct sessions.
pub struct GroupedPlan<I> {
    source: I,

    /// Platform of the partition when grouping by user only.
    partition: Option<String>,
}

impl<I> GroupedPlan<I>
where
    I: Iterator<Item = Result<ActivityEvent>>,
{
    /// Sort each group by count descending, `user_id` ascending, and keep `top_n`.
    pub fn top_n(self, top_n: TopN) -> RankingPlan<I> {
        RankingPlan {
            grouped: self,
            top_n,
        }
    }
}

/// Final stage, sorted and truncated ranking.
pub struct RankingPlan<I> {
    grouped: GroupedPlan<I>,
    top_n: TopN,
}

impl<I> RankingPlan<I>
where
    I: Iterator<Item = Result<ActivityEvent>>,
{
    /// Execute the whole plan.
    ///
    /// The first read error aborts the pass, no partial ranking is returned.
    pub fn collect(self) -> Result<Vec<RankingRow>> {
        let GroupedPlan { source, partition } = self.grouped;

        match partition {
            None => {
                let mut index = SessionIndex::new();
                for event in source {
                    index.insert(&event?);
                }

                let rows = index.rank(self.top_n);
                let stats = index.stats();

                info!(
                    "ranked events, accepted: {}, skipped: {}, rows: {}",
                    stats.accepted,
                    stats.skipped,
                    rows.len()
                );

                Ok(rows)
            }
            Some(platform) => {
                let mut users = UserSessions::new();
                let mut skipped = 0u64;

                for event in source {
                    let event = event?;
                    match (&event.user_id, &event.session_id) {
                        (Some(user_id), Some(session_id)) => users.insert(user_id, session_id),
                        _ => skipped += 1,
                    }
                }

                let rows = rank_partition(&platform, &users, self.top_n);

                info!(
                    "ranked partition, platform: {}, users: {}, skipped: {}, rows: {}",
                    platform,
                    users.len(),
                    skipped,
                    rows.len()
                );

                Ok(rows)
            }
        }
    }
}
