//! Per-asset status tracking for the polling endpoints.
//!
//! Every read is a single `DashMap` lookup and never waits for a task. The
//! scheduler is the only writer.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use kitspace_core::types::identity::{AssetId, ContentIdentity, HEAD_REF};
use kitspace_entity::task::TaskStatus;

/// Aggregate state of one identity's processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Every asset is done or failed.
    pub finished: bool,
    /// Every asset is done.
    pub complete: bool,
    /// At least one asset failed.
    pub failed: bool,
    /// Status of each asset by name.
    pub assets: BTreeMap<String, TaskStatus>,
}

impl RunSummary {
    fn from_assets(assets: BTreeMap<String, TaskStatus>) -> Self {
        Self {
            finished: assets.values().all(TaskStatus::is_terminal),
            complete: assets.values().all(|s| *s == TaskStatus::Done),
            failed: assets.values().any(|s| *s == TaskStatus::Failed),
            assets,
        }
    }
}

/// Lock-free view of asset readiness and the latest commit per repository.
#[derive(Debug, Default)]
pub struct StatusTracker {
    assets: DashMap<AssetId, TaskStatus>,
    identities: DashMap<ContentIdentity, Vec<String>>,
    heads: DashMap<(String, String), String>,
}

impl StatusTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status of every asset in `names` under `identity`.
    pub fn set(&self, identity: &ContentIdentity, names: &[String], status: TaskStatus) {
        {
            let mut known = self.identities.entry(identity.clone()).or_default();
            for name in names {
                if !known.contains(name) {
                    known.push(name.clone());
                }
            }
        }
        for name in names {
            self.assets.insert(identity.asset(name.as_str()), status);
        }
    }

    /// Drop `names` of `identity`, and the identity once it has no assets left.
    pub fn forget(&self, identity: &ContentIdentity, names: &[String]) {
        for name in names {
            self.assets.remove(&identity.asset(name.as_str()));
        }
        self.identities.remove_if_mut(identity, |_, known| {
            known.retain(|name| !names.contains(name));
            known.is_empty()
        });
    }

    /// Status of one asset, if it is known.
    pub fn status(&self, asset: &AssetId) -> Option<TaskStatus> {
        self.assets.get(asset).map(|s| *s)
    }

    /// Resolve a request path to the asset address the tracker knows about.
    ///
    /// `HEAD` paths are resolved to the latest processed commit first.
    pub fn resolve(&self, candidates: &[AssetId]) -> Option<AssetId> {
        candidates
            .iter()
            .map(|c| self.resolve_head(c))
            .find(|c| self.assets.contains_key(c))
    }

    /// Aggregate state of an identity's run.
    pub fn summary(&self, identity: &ContentIdentity) -> Option<RunSummary> {
        let identity = self.resolve_identity(identity);
        let names = self.identities.get(&identity)?.clone();
        let assets = names
            .into_iter()
            .filter_map(|name| {
                let status = self.status(&identity.asset(name.as_str()))?;
                Some((name, status))
            })
            .collect();
        Some(RunSummary::from_assets(assets))
    }

    /// Whether every asset of `identity` is terminal.
    pub fn is_finished(&self, identity: &ContentIdentity) -> bool {
        self.summary(identity).is_some_and(|s| s.finished)
    }

    /// Whether every asset of `identity` is done.
    pub fn is_complete(&self, identity: &ContentIdentity) -> bool {
        self.summary(identity).is_some_and(|s| s.complete)
    }

    /// Whether any asset of `identity` failed.
    pub fn has_failed(&self, identity: &ContentIdentity) -> bool {
        self.summary(identity).is_some_and(|s| s.failed)
    }

    /// Record the latest processed commit of a repository.
    ///
    /// Returns the commit it replaces, if the head moved.
    pub fn set_head(&self, owner: &str, repo: &str, git_ref: &str) -> Option<String> {
        self.heads
            .insert(
                (owner.to_lowercase(), repo.to_lowercase()),
                git_ref.to_string(),
            )
            .filter(|previous| previous != git_ref)
    }

    /// Latest processed commit of a repository.
    pub fn head(&self, owner: &str, repo: &str) -> Option<String> {
        self.heads
            .get(&(owner.to_lowercase(), repo.to_lowercase()))
            .map(|r| r.clone())
    }

    /// Whether `identity` is at its repository's latest processed commit.
    pub fn is_current(&self, identity: &ContentIdentity) -> bool {
        self.head(identity.owner(), identity.repo())
            .is_some_and(|head| head == identity.git_ref())
    }

    /// Replace a `HEAD` ref with the tracked commit, if there is one.
    pub fn resolve_identity(&self, identity: &ContentIdentity) -> ContentIdentity {
        if !identity.is_head() {
            return identity.clone();
        }
        match self.head(identity.owner(), identity.repo()) {
            Some(head) if head != HEAD_REF => identity.at_ref(head),
            _ => identity.clone(),
        }
    }

    fn resolve_head(&self, asset: &AssetId) -> AssetId {
        let identity = self.resolve_identity(asset.identity());
        identity.asset(asset.name())
    }

    /// Number of tracked assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
