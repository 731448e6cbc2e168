//! Group, rank and truncate.
//!
//! Distinct sessions are accumulated per `(platform, user_id)`. After the full
//! pass each platform keeps its best `N` users, ordered by unique session count
//! descending, ties broken by ascending `user_id`.
//!
//! Two shapes produce the same rows:
//!
//! 1. `SessionIndex`, the global shape: one pass over events of every platform.
//! 2. `UserSessions` of one partition, grouped by `user_id` only, with the platform
//!    reattached by `rank_partition`. Partitions are disjoint by platform, so they
//!    can be ranked in parallel and concatenated.
//!
//! `StreamingAggregator` is the per-event path of the live feed. It can be called
//! concurrently from the consumer and from the producer's direct dispatch.

use anyhow::Result;
use dashmap::DashMap;
use likely_stable::unlikely;
use log::{debug, info};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::cleaning::CleaningFilter;
use crate::error::InspectorError;
use crate::event::{ActivityEvent, RankingRow};

/// Number of users kept per platform. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopN(NonZeroUsize);

impl TopN {
    /// Rejects `n <= 0`.
    pub fn new(n: i64) -> Result<Self> {
        usize::try_from(n)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
            .ok_or_else(|| InspectorError::InvalidTopN(n).into())
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

/// A ranked user. `Ord` puts the better candidate last: more sessions, then the
/// smaller `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    count: u64,
    user_id: String,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.user_id.cmp(&self.user_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keep the best `n` of `candidates`, best first.
///
/// A min-heap of size `n` holds the current best, the worst of them on top, so
/// every candidate costs `O(log n)`.
fn select_top_n<I: Iterator<Item = (String, u64)>>(candidates: I, top_n: TopN) -> Vec<(String, u64)> {
    let n = top_n.get();
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(n + 1);

    for (user_id, count) in candidates {
        heap.push(Reverse(Candidate { count, user_id }));

        if heap.len() > n {
            heap.pop();
        }
    }

    // Ascending order of `Reverse` is best first.
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(c)| (c.user_id, c.count))
        .collect()
}

/// Distinct sessions of every user of one platform.
#[derive(Default, Debug, Clone)]
pub struct UserSessions {
    sessions: HashMap<String, HashSet<String>>,
}

impl UserSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: &str, session_id: &str) {
        match self.sessions.get_mut(user_id) {
            Some(sessions) => {
                if !sessions.contains(session_id) {
                    sessions.insert(session_id.to_string());
                }
            }
            None => {
                let mut sessions = HashSet::new();
                sessions.insert(session_id.to_string());
                self.sessions.insert(user_id.to_string(), sessions);
            }
        }
    }

    /// Number of distinct users.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Unique session count of one user, 0 if unknown.
    pub fn unique_session_count(&self, user_id: &str) -> u64 {
        self.sessions.get(user_id).map_or(0, |s| s.len() as u64)
    }

    /// Best `top_n` users, `(user_id, unique_session_count)`, best first.
    pub fn top_n(&self, top_n: TopN) -> Vec<(String, u64)> {
        select_top_n(
            self.sessions
                .iter()
                .map(|(user_id, sessions)| (user_id.clone(), sessions.len() as u64)),
            top_n,
        )
    }
}

/// Counters of one aggregation pass.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStats {
    /// Events accumulated.
    pub accepted: u64,

    /// Events without a usable group key.
    pub skipped: u64,
}

/// Global shape: distinct sessions per `(platform, user_id)` over every platform.
#[derive(Default, Debug, Clone)]
pub struct SessionIndex {
    platforms: BTreeMap<String, UserSessions>,
    stats: AggregateStats,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one event.
    ///
    /// Events missing `platform`, `user_id` or `session_id` cannot be grouped and
    /// are skipped.
    pub fn insert(&mut self, event: &ActivityEvent) {
        match (&event.platform, &event.user_id, &event.session_id) {
            (Some(platform), Some(user_id), Some(session_id)) => {
                match self.platforms.get_mut(platform) {
                    Some(users) => users.insert(user_id, session_id),
                    None => {
                        let mut users = UserSessions::new();
                        users.insert(user_id, session_id);
                        self.platforms.insert(platform.clone(), users);
                    }
                }

                self.stats.accepted += 1;
            }
            _ => {
                debug!("skip event without group key: {:?}", event);
                self.stats.skipped += 1;
            }
        }
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    /// Rank every platform: platform ascending, then count descending, then
    /// `user_id` ascending, at most `top_n` rows per platform.
    pub fn rank(&self, top_n: TopN) -> Vec<RankingRow> {
        self.platforms
            .iter()
            .flat_map(|(platform, users)| rank_partition(platform, users, top_n))
            .collect()
    }
}

/// Per-partition shape: rank the users of one partition and reattach the platform.
pub fn rank_partition(platform: &str, users: &UserSessions, top_n: TopN) -> Vec<RankingRow> {
    users
        .top_n(top_n)
        .into_iter()
        .map(|(user_id, count)| RankingRow {
            platform: platform.to_string(),
            user_id,
            unique_session_count: count,
        })
        .collect()
}

/// Receives events one by one.
///
/// Implementations must be safe to call from several tasks at the same time.
pub trait EventProcessor: Send + Sync + 'static {
    fn process(&self, event: ActivityEvent) -> Result<()>;
}

/// Concurrent per-event aggregator used by the live feed.
///
/// Live events come from an untrusted generator, the same `CleaningFilter` as the
/// csv path is applied before accumulation.
pub struct StreamingAggregator {
    platforms: DashMap<String, UserSessions>,
    filter: CleaningFilter,
    top_n: TopN,

    /// Calls to `process`, dropped events included.
    invocations: AtomicU64,

    /// Events dropped by the cleaning filter.
    dropped: AtomicU64,
}

impl StreamingAggregator {
    pub fn new(top_n: TopN) -> Self {
        Self {
            platforms: DashMap::new(),
            filter: CleaningFilter::new(),
            top_n,
            invocations: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(AtomicOrdering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(AtomicOrdering::Relaxed)
    }

    /// Ranking of everything accumulated so far, same order as `SessionIndex::rank`.
    pub fn snapshot(&self) -> Vec<RankingRow> {
        let mut ranked: Vec<(String, Vec<RankingRow>)> = self
            .platforms
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    rank_partition(entry.key(), entry.value(), self.top_n),
                )
            })
            .collect();

        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let rows = ranked.into_iter().flat_map(|(_, rows)| rows).collect::<Vec<_>>();

        info!(
            "streaming snapshot, invocations: {}, dropped: {}, rows: {}",
            self.invocations(),
            self.dropped(),
            rows.len()
        );

        rows
    }
}

impl EventProcessor for StreamingAggregator {
    fn process(&self, event: ActivityEvent) -> Result<()> {
        self.invocations.fetch_add(1, AtomicOrdering::Relaxed);

        if unlikely(!self.filter.is_valid(&event)) {
            self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(());
        }

        if let (Some(platform), Some(user_id), Some(session_id)) =
            (event.platform, event.user_id, event.session_id)
        {
            self.platforms
                .entry(platform)
                .or_default()
                .insert(&user_id, &session_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top(n: i64) -> TopN {
        TopN::new(n).unwrap()
    }

    fn sample_events() -> Vec<ActivityEvent> {
        vec![
            ActivityEvent::new("u1", "s1", "iOS"),
            ActivityEvent::new("u1", "s2", "iOS"),
            ActivityEvent::new("u1", "s3", "iOS"),
            ActivityEvent::new("u2", "s4", "iOS"),
            ActivityEvent::new("u1", "s5", "Android"),
        ]
    }

    #[test]
    fn test_top_n_rejects_non_positive() {
        assert!(TopN::new(0).is_err());
        assert!(TopN::new(-3).is_err());
        assert_eq!(top(1).get(), 1);
    }

    #[test]
    fn test_rank_top_one() {
        let mut index = SessionIndex::new();
        for event in sample_events() {
            index.insert(&event);
        }

        let rows = index.rank(top(1));

        assert_eq!(
            rows,
            vec![
                RankingRow::new("Android", "u1", 1),
                RankingRow::new("iOS", "u1", 3),
            ]
        );
    }

    #[test]
    fn test_duplicate_sessions_counted_once() {
        let mut users = UserSessions::new();
        users.insert("u1", "s1");
        users.insert("u1", "s1");
        users.insert("u1", "s2");

        assert_eq!(users.unique_session_count("u1"), 2);
        assert_eq!(users.unique_session_count("u2"), 0);
    }

    #[test]
    fn test_ties_broken_by_user_id() {
        let mut users = UserSessions::new();
        for user_id in ["c", "a", "d", "b"] {
            users.insert(user_id, "s1");
            users.insert(user_id, "s2");
        }
        users.insert("z", "s1");

        assert_eq!(
            users.top_n(top(3)),
            vec![
                ("a".to_string(), 2),
                ("b".to_string(), 2),
                ("c".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_fewer_users_than_n() {
        let mut users = UserSessions::new();
        users.insert("u1", "s1");

        assert_eq!(users.top_n(top(5)), vec![("u1".to_string(), 1)]);
        assert!(UserSessions::new().top_n(top(5)).is_empty());
    }

    #[test]
    fn test_skip_events_without_key() {
        let mut index = SessionIndex::new();
        index.insert(&ActivityEvent::new("u1", "s1", "Web"));
        index.insert(&ActivityEvent {
            user_id: Some("u2".to_string()),
            ..Default::default()
        });

        assert_eq!(
            index.stats(),
            AggregateStats {
                accepted: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_streaming_aggregator_matches_index() -> Result<()> {
        let aggregator = StreamingAggregator::new(top(2));
        let mut index = SessionIndex::new();

        for event in sample_events() {
            index.insert(&event);
            aggregator.process(event)?;
        }

        aggregator.process(ActivityEvent::new("u9", "invalid_session", "Web"))?;

        assert_eq!(aggregator.snapshot(), index.rank(top(2)));
        assert_eq!(aggregator.invocations(), 6);
        assert_eq!(aggregator.dropped(), 1);

        Ok(())
    }
}
