//! Invalidation planning.
//!
//! Merges a batch of mutation events into the set of query keys whose cached
//! results must be marked stale.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{MutationEvent, MutationKind};
use super::keys::{QueryKey, QueryKind};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Invalidation targets; a target without a parameter covers its kind.
    pub targets: BTreeSet<QueryKey>,
    /// Events folded into this plan after dedupe.
    pub event_count: usize,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ events: {}, targets: [",
            self.event_count
        )?;
        for (index, target) in self.targets.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{target}")?;
        }
        f.write_str("] }")
    }
}

impl InvalidationPlan {
    /// Dedupe events by id and collect their targets.
    pub fn from_events(events: Vec<MutationEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events {
            if !seen_ids.insert(event.id) {
                continue;
            }
            plan.event_count += 1;
            plan.targets.extend(targets_for(&event.kind));
        }

        plan.collapse();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Drop parameterized targets already covered by a kind-wide target.
    fn collapse(&mut self) {
        let kind_wide: HashSet<QueryKind> = self
            .targets
            .iter()
            .filter(|target| target.param.is_none())
            .map(|target| target.kind)
            .collect();
        self.targets
            .retain(|target| target.param.is_none() || !kind_wide.contains(&target.kind));
    }
}

/// Cached reads affected by one mutation.
pub fn targets_for(kind: &MutationKind) -> Vec<QueryKey> {
    let home_feed = QueryKey::all(QueryKind::RecentPosts);
    match kind {
        MutationKind::PostCreated { .. } | MutationKind::PostDeleted { .. } => vec![home_feed],
        MutationKind::PostLiked { post_id } => vec![
            QueryKey::post_by_id(post_id),
            home_feed,
            QueryKey::current_user(),
        ],
        MutationKind::PostSaved { .. } | MutationKind::SaveDeleted { .. } => {
            vec![home_feed, QueryKey::current_user()]
        }
        MutationKind::PostUpdated { post_id } => vec![QueryKey::post_by_id(post_id)],
        MutationKind::UserUpdated { user_id } => {
            vec![QueryKey::current_user(), QueryKey::user_by_id(user_id)]
        }
        MutationKind::FollowChanged { .. } => vec![QueryKey::all(QueryKind::UserFollowing)],
    }
}
