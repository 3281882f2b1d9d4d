use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::section::{
    build_heights_from_sections, build_sections_from_heights, find_gaps_in_sections,
    merge_sections, remove_sections, Section, Sections,
};
use crate::store::TrackerStore;

/// Returning this from `get_missing` means "no limit, return every gap".
pub const NO_RETURN_LIMIT: u64 = 0;

const WIP_SUFFIX: &str = "_wip";

fn wip_scope(id: &str) -> String {
    format!("{id}{WIP_SUFFIX}")
}

/// The interval tracker. Every public method is serialized behind a single
/// mutex spanning the full read-modify-write-commit cycle against `S`,
/// matching spec.md's "single process-wide mutex" requirement — in an
/// async runtime the critical section includes the `.await`ed store round
/// trip, so this has to be a `tokio::sync::Mutex`, not a `std::sync::Mutex`
/// which cannot be held across suspension points.
pub struct Tracker<S: TrackerStore> {
    store: Arc<S>,
    lock: Mutex<()>,
}

impl<S: TrackerStore> Tracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, lock: Mutex::new(()) }
    }

    /// Merges `heights` into the tracked set for `id`.
    #[instrument(skip(self, heights))]
    pub async fn update_tracked(&self, heights: &[u64], id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.update_tracked_locked(heights, id).await
    }

    async fn update_tracked_locked(&self, heights: &[u64], id: &str) -> Result<()> {
        let existing = self.store.read(id).await?;
        let incoming = build_sections_from_heights(heights);
        let mut combined = Vec::with_capacity(existing.len() + incoming.len());
        combined.extend(incoming);
        combined.extend(existing);
        let merged = merge_sections(combined);
        self.store.write(id, &merged).await
    }

    /// Removes `heights` from the tracked set for `id`. Heights not
    /// currently tracked are silently ignored.
    #[instrument(skip(self, heights))]
    pub async fn remove_heights(&self, heights: &[u64], id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let to_remove: Sections = heights.iter().map(|h| Section::single(*h)).collect();
        self.remove_sections_locked(&to_remove, id).await
    }

    async fn remove_sections_locked(&self, to_remove: &Sections, id: &str) -> Result<()> {
        let existing = self.store.read(id).await?;
        let remaining = remove_sections(&existing, to_remove);
        self.store.write(id, &remaining).await
    }

    /// Marks (or unmarks) `heights` as in-progress for `id` by mutating
    /// the sibling `<id>_wip` scope.
    #[instrument(skip(self, heights))]
    pub async fn mark_in_progress(&self, heights: &[u64], id: &str, in_progress: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let scope = wip_scope(id);
        if in_progress {
            self.update_tracked_locked(heights, &scope).await
        } else {
            let to_remove: Sections = heights.iter().map(|h| Section::single(*h)).collect();
            self.remove_sections_locked(&to_remove, &scope).await
        }
    }

    /// Truncates the `<id>_wip` scope entirely. Called at controller
    /// startup so heights left in-progress by a prior crashed run are
    /// re-discovered as gaps rather than staying stuck.
    #[instrument(skip(self))]
    pub async fn clear_wip(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.delete_scope(&wip_scope(id)).await
    }

    /// Commits `heights` as durably tracked and releases them from wip in
    /// one locked step. This is the exactly-once point against the
    /// tracker: a height leaves wip exactly when (and only when) it's
    /// folded into the tracked set here.
    #[instrument(skip(self, heights))]
    pub async fn commit_and_release_wip(&self, heights: &[u64], id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.update_tracked_locked(heights, id).await?;
        let to_remove: Sections = heights.iter().map(|h| Section::single(*h)).collect();
        self.remove_sections_locked(&to_remove, &wip_scope(id)).await
    }

    /// Every height `h` with `genesis <= h <= tip` that is in neither the
    /// tracked nor the wip set for `id`, newest first. `limit == 0` means
    /// unlimited.
    #[instrument(skip(self))]
    pub async fn get_missing(&self, tip: u64, genesis: u64, limit: u64, id: &str) -> Result<Vec<u64>> {
        let _guard = self.lock.lock().await;
        let tracked = self.store.read(id).await?;
        let wip = self.store.read(&wip_scope(id)).await?;

        let mut combined = Vec::with_capacity(tracked.len() + wip.len() + 2);
        combined.extend(tracked);
        combined.extend(wip);
        combined.push(Section::single(genesis));
        combined.push(Section::single(tip));

        let mut missing = find_gaps_in_sections(&combined);
        debug!(total_missing = missing.len(), id, "computed gap set");
        if limit != NO_RETURN_LIMIT && (missing.len() as u64) > limit {
            missing.truncate(limit as usize);
        }
        Ok(missing)
    }

    /// Every height currently tracked for `id`, ascending.
    #[instrument(skip(self))]
    pub async fn get_tracked(&self, id: &str) -> Result<Vec<u64>> {
        let _guard = self.lock.lock().await;
        let sections = self.store.read(id).await?;
        Ok(build_heights_from_sections(&sections))
    }

    /// The canonical section set currently tracked for `id` (without
    /// expanding to individual heights).
    #[instrument(skip(self))]
    pub async fn get_tracked_sections(&self, id: &str) -> Result<Sections> {
        let _guard = self.lock.lock().await;
        self.store.read(id).await
    }

    /// `MAX(end_idx)` across the tracked set for `id`, or `0` if empty.
    #[instrument(skip(self))]
    pub async fn get_tip(&self, id: &str) -> Result<u64> {
        let _guard = self.lock.lock().await;
        self.store.tracked_tip(id).await
    }
}
