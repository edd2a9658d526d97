//! Client-side state for the tracker UI.
//!
//! `Tracker` owns the in-memory collections the UI renders, applies edits to
//! them optimistically, and hands each edit to the collection's
//! `FlushScheduler`. Reads are served from the local `SnapshotCache` first
//! (even when stale) while a background task refreshes from the server;
//! results come back over an mpsc channel and are applied by
//! `check_background_tasks`.
//!
//! A failed sync never rolls back the optimistic state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::models::{Project, Resource, ResourceKind, Skill, SkillStatus};
use crate::sync::{BatchSink, FlushOutcome, FlushScheduler, FlushTrigger, SyncNotice};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background refresh channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Read side of the server, normally `ApiClient`.
#[async_trait]
pub trait CollectionSource: Send + Sync + 'static {
    async fn fetch_collection(&self, kind: ResourceKind) -> Result<Vec<Value>>;
}

/// Everything the tracker needs from the server.
pub trait Remote: BatchSink + CollectionSource + Clone {}

impl<T: BatchSink + CollectionSource + Clone> Remote for T {}

/// Reasons an edit is rejected before it reaches the queue.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{kind} '{id}' not found")]
    UnknownEntity { kind: ResourceKind, id: String },

    #[error("skill '{0}' cannot be mastered until a linked project is completed")]
    MasteryRequiresCompletedProject(String),

    #[error("could not encode {kind} '{id}': {source}")]
    Unencodable {
        kind: ResourceKind,
        id: String,
        source: serde_json::Error,
    },
}

/// Message from a background refresh task
#[derive(Debug)]
pub enum RefreshResult {
    Collection {
        kind: ResourceKind,
        documents: Vec<Value>,
    },
    Failed {
        kind: ResourceKind,
        error: String,
    },
}

pub struct Tracker<R: Remote> {
    remote: R,
    snapshots: SnapshotCache,
    user_id: String,

    pub skills: Vec<Skill>,
    pub projects: Vec<Project>,
    pub resources: Vec<Resource>,

    skill_sync: FlushScheduler<R>,
    project_sync: FlushScheduler<R>,
    resource_sync: FlushScheduler<R>,

    // Background task channel
    refresh_rx: mpsc::Receiver<RefreshResult>,
    refresh_tx: mpsc::Sender<RefreshResult>,
    refreshing: HashSet<ResourceKind>,

    pub status_message: Option<String>,
}

impl<R: Remote> Tracker<R> {
    pub fn new(
        remote: R,
        snapshots: SnapshotCache,
        user_id: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        Self {
            skill_sync: FlushScheduler::with_delay(ResourceKind::Skills, remote.clone(), debounce),
            project_sync: FlushScheduler::with_delay(
                ResourceKind::Projects,
                remote.clone(),
                debounce,
            ),
            resource_sync: FlushScheduler::with_delay(
                ResourceKind::Resources,
                remote.clone(),
                debounce,
            ),
            remote,
            snapshots,
            user_id: user_id.into(),
            skills: Vec::new(),
            projects: Vec::new(),
            resources: Vec::new(),
            refresh_rx: rx,
            refresh_tx: tx,
            refreshing: HashSet::new(),
            status_message: None,
        }
    }

    /// Build from a loaded [`Config`]: snapshot directory and TTL, acting
    /// user and debounce all come from it. Fails when no user is configured.
    pub fn from_config(remote: R, config: &Config) -> Result<Self> {
        let user_id = config
            .user()
            .ok_or_else(|| anyhow!("No user configured; set DEVTRACK_USER or userId"))?;
        let snapshots = config.snapshot_cache()?;
        Ok(Self::new(remote, snapshots, user_id, config.debounce()))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Local snapshot key, same shape as the server's collection cache key
    pub fn snapshot_key(&self, kind: ResourceKind) -> String {
        format!("{}:{}", kind, self.user_id)
    }

    pub fn scheduler(&self, kind: ResourceKind) -> &FlushScheduler<R> {
        match kind {
            ResourceKind::Skills => &self.skill_sync,
            ResourceKind::Projects => &self.project_sync,
            ResourceKind::Resources => &self.resource_sync,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Install whatever the snapshot cache holds, then refresh every
    /// collection that was missing or stale in the background.
    ///
    /// Returns the collections being refreshed.
    pub fn load(&mut self) -> Vec<ResourceKind> {
        let mut refreshing = Vec::new();

        for kind in ResourceKind::ALL {
            let key = self.snapshot_key(kind);
            let fresh = match kind {
                ResourceKind::Skills => self.snapshots.load::<Vec<Skill>>(&key).map(|l| {
                    self.skills = l.data;
                    !l.is_stale
                }),
                ResourceKind::Projects => self.snapshots.load::<Vec<Project>>(&key).map(|l| {
                    self.projects = l.data;
                    !l.is_stale
                }),
                ResourceKind::Resources => self.snapshots.load::<Vec<Resource>>(&key).map(|l| {
                    self.resources = l.data;
                    !l.is_stale
                }),
            };

            if fresh != Some(true) {
                debug!(%kind, cached = fresh.is_some(), "Snapshot missing or stale, revalidating");
                self.refresh_background(kind);
                refreshing.push(kind);
            }
        }

        refreshing
    }

    /// Spawn a background fetch of one collection. No-op while one is running.
    pub fn refresh_background(&mut self, kind: ResourceKind) {
        if !self.refreshing.insert(kind) {
            return;
        }

        let tx = self.refresh_tx.clone();
        let remote = self.remote.clone();

        tokio::spawn(async move {
            let result = match remote.fetch_collection(kind).await {
                Ok(documents) => RefreshResult::Collection { kind, documents },
                Err(e) => {
                    warn!(%kind, error = %e, "Background refresh failed");
                    RefreshResult::Failed {
                        kind,
                        error: e.to_string(),
                    }
                }
            };
            Self::send_result(&tx, result).await;
        });

        self.status_message = Some("Refreshing data...".to_string());
    }

    pub fn refresh_all(&mut self) {
        info!("Starting background refresh of all collections");
        for kind in ResourceKind::ALL {
            self.refresh_background(kind);
        }
    }

    /// Helper to send refresh results, logging any channel errors
    async fn send_result(tx: &mpsc::Sender<RefreshResult>, result: RefreshResult) {
        if let Err(e) = tx.send(result).await {
            error!(error = %e, "Failed to send refresh result - channel closed");
        }
    }

    /// Apply completed background refreshes. Returns how many were applied.
    pub fn check_background_tasks(&mut self) -> usize {
        let mut results = Vec::new();
        while let Ok(result) = self.refresh_rx.try_recv() {
            results.push(result);
        }

        let count = results.len();
        for result in results {
            self.process_refresh_result(result);
        }
        count
    }

    /// Wait for the next background refresh and apply it.
    pub async fn wait_for_refresh(&mut self) -> bool {
        match self.refresh_rx.recv().await {
            Some(result) => {
                self.process_refresh_result(result);
                true
            }
            None => false,
        }
    }

    fn process_refresh_result(&mut self, result: RefreshResult) {
        match result {
            RefreshResult::Collection { kind, documents } => {
                self.refreshing.remove(&kind);
                let documents = self.overlay_pending(kind, documents);
                match kind {
                    ResourceKind::Skills => self.skills = Self::parse_documents(kind, documents),
                    ResourceKind::Projects => {
                        self.projects = Self::parse_documents(kind, documents)
                    }
                    ResourceKind::Resources => {
                        self.resources = Self::parse_documents(kind, documents)
                    }
                }
                self.save_collection(kind);
                self.status_message = None;
            }
            RefreshResult::Failed { kind, error } => {
                self.refreshing.remove(&kind);
                self.status_message = Some(format!("Refresh of {} failed: {}", kind, error));
            }
        }
    }

    /// Server data does not include edits still waiting to be flushed;
    /// re-apply them so a refresh never reverts what the user sees.
    fn overlay_pending(&self, kind: ResourceKind, mut documents: Vec<Value>) -> Vec<Value> {
        let pending = self.scheduler(kind).pending_payloads();
        if pending.is_empty() {
            return documents;
        }

        for doc in documents.iter_mut() {
            let Some(id) = doc.get("id").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            if let (Some(Value::Object(fields)), Value::Object(target)) = (pending.get(&id), &mut *doc) {
                for (field, value) in fields {
                    target.insert(field.clone(), value.clone());
                }
            }
        }
        documents
    }

    fn parse_documents<T: DeserializeOwned>(kind: ResourceKind, documents: Vec<Value>) -> Vec<T> {
        documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(%kind, error = %e, "Skipping malformed document");
                    None
                }
            })
            .collect()
    }

    fn save_collection(&self, kind: ResourceKind) {
        let key = self.snapshot_key(kind);
        let saved = match kind {
            ResourceKind::Skills => self.snapshots.save(&key, &self.skills),
            ResourceKind::Projects => self.snapshots.save(&key, &self.projects),
            ResourceKind::Resources => self.snapshots.save(&key, &self.resources),
        };
        if let Err(e) = saved {
            warn!(%kind, error = %e, "Failed to save snapshot");
        }
    }

    // =========================================================================
    // Optimistic Edits
    // =========================================================================

    /// The full record minus its id, as sent in a batch update
    fn payload<T: Serialize>(kind: ResourceKind, id: &str, entity: &T) -> Result<Value, ValidationError> {
        let mut value = serde_json::to_value(entity).map_err(|source| ValidationError::Unencodable {
            kind,
            id: id.to_string(),
            source,
        })?;
        if let Value::Object(fields) = &mut value {
            fields.remove("id");
        }
        Ok(value)
    }

    fn enqueue<T: Serialize>(&mut self, kind: ResourceKind, id: &str, entity: &T) -> Result<(), ValidationError> {
        let payload = Self::payload(kind, id, entity)?;
        self.scheduler(kind).enqueue(id, payload);
        self.save_collection(kind);
        Ok(())
    }

    fn unknown(kind: ResourceKind, id: &str) -> ValidationError {
        ValidationError::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    }

    /// Change a skill's status. Mastery requires a completed linked project.
    pub fn set_skill_status(&mut self, skill_id: &str, status: SkillStatus) -> Result<(), ValidationError> {
        let skill = self
            .skills
            .iter_mut()
            .find(|s| s.id == skill_id)
            .ok_or_else(|| Self::unknown(ResourceKind::Skills, skill_id))?;

        if status == SkillStatus::Mastered && !skill.can_master(&self.projects) {
            return Err(ValidationError::MasteryRequiresCompletedProject(skill_id.to_string()));
        }

        skill.status = status;
        skill.updated_at = Some(Utc::now().to_rfc3339());
        let skill = skill.clone();
        self.enqueue(ResourceKind::Skills, skill_id, &skill)
    }

    pub fn update_skill(&mut self, mut skill: Skill) -> Result<(), ValidationError> {
        if skill.status == SkillStatus::Mastered && !skill.can_master(&self.projects) {
            return Err(ValidationError::MasteryRequiresCompletedProject(skill.id));
        }
        let slot = self
            .skills
            .iter_mut()
            .find(|s| s.id == skill.id)
            .ok_or_else(|| Self::unknown(ResourceKind::Skills, &skill.id))?;

        skill.updated_at = Some(Utc::now().to_rfc3339());
        *slot = skill.clone();
        self.enqueue(ResourceKind::Skills, &skill.id, &skill)
    }

    pub fn update_project(&mut self, mut project: Project) -> Result<(), ValidationError> {
        let slot = self
            .projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or_else(|| Self::unknown(ResourceKind::Projects, &project.id))?;

        project.updated_at = Some(Utc::now().to_rfc3339());
        *slot = project.clone();
        self.enqueue(ResourceKind::Projects, &project.id, &project)
    }

    pub fn update_resource(&mut self, mut resource: Resource) -> Result<(), ValidationError> {
        let slot = self
            .resources
            .iter_mut()
            .find(|r| r.id == resource.id)
            .ok_or_else(|| Self::unknown(ResourceKind::Resources, &resource.id))?;

        resource.updated_at = Some(Utc::now().to_rfc3339());
        *slot = resource.clone();
        self.enqueue(ResourceKind::Resources, &resource.id, &resource)
    }

    pub fn toggle_resource_completed(&mut self, resource_id: &str) -> Result<(), ValidationError> {
        let mut resource = self
            .resources
            .iter()
            .find(|r| r.id == resource_id)
            .cloned()
            .ok_or_else(|| Self::unknown(ResourceKind::Resources, resource_id))?;
        resource.completed = !resource.completed;
        self.update_resource(resource)
    }

    // =========================================================================
    // Sync Lifecycle
    // =========================================================================

    pub fn on_visibility_change(&self, hidden: bool) {
        for kind in ResourceKind::ALL {
            self.scheduler(kind).on_visibility_change(hidden);
        }
    }

    pub fn on_unload(&self) {
        for kind in ResourceKind::ALL {
            self.scheduler(kind).on_unload();
        }
    }

    /// Flush every collection now and wait for the results.
    pub async fn flush_all(&self) -> HashMap<ResourceKind, FlushOutcome> {
        let (skills, projects, resources) = tokio::join!(
            self.skill_sync.flush_now(FlushTrigger::Manual),
            self.project_sync.flush_now(FlushTrigger::Manual),
            self.resource_sync.flush_now(FlushTrigger::Manual),
        );
        HashMap::from([
            (ResourceKind::Skills, skills),
            (ResourceKind::Projects, projects),
            (ResourceKind::Resources, resources),
        ])
    }

    /// Tear down: fire a last flush for every collection.
    pub fn unmount(self) -> Vec<JoinHandle<FlushOutcome>> {
        vec![
            self.skill_sync.unmount(),
            self.project_sync.unmount(),
            self.resource_sync.unmount(),
        ]
    }

    pub fn has_pending_changes(&self) -> bool {
        ResourceKind::ALL
            .iter()
            .any(|kind| self.scheduler(*kind).has_pending())
    }

    /// Sync status line. An error on any collection takes precedence.
    pub fn sync_notice(&self) -> Option<SyncNotice> {
        let notices: Vec<SyncNotice> = ResourceKind::ALL
            .iter()
            .filter_map(|kind| self.scheduler(*kind).last_notice())
            .collect();
        notices
            .iter()
            .find(|n| n.is_error())
            .or_else(|| notices.first())
            .cloned()
    }

    /// Human readable snapshot age for the status bar
    pub fn cache_age(&self, kind: ResourceKind) -> String {
        self.snapshots
            .age(&self.snapshot_key(kind))
            .unwrap_or_else(|| "never".to_string())
    }
}

impl Tracker<ApiClient> {
    /// Tracker talking to the configured server as the configured user.
    pub fn connect(config: &Config) -> Result<Self> {
        Self::from_config(ApiClient::from_config(config)?, config)
    }
}
