//! Per-application replica sets and write locks
//!
//! Each application id maps to one live [`AppEntry`]: the replica set chosen
//! by its last replica request, plus an exclusive write lock that is taken and
//! released by separate RPC calls. The aggregate map is only locked briefly to
//! look entries up or swap them; waiting for a write lock happens on the
//! entry's own semaphore, so a busy application never blocks another one.
//!
//! A grant reports the entry generation it was made on. A release that names
//! a generation only applies to that entry, so a holder whose replica set was
//! replaced cannot free the new holder's lock. Releases without a generation
//! apply to whatever entry is live.
//!
//! A caller that acquires and never releases starves every later caller,
//! unless a lease is configured. [`LockTable::close_all`] fails every waiter
//! so shutdown is never held up by a queued acquire.

use crate::common::{timestamp_now_millis, Error, ReplacePolicy, Result};
use crate::manager::registry::CargoNode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Ordered replica set; index `i` of every sequence refers to the same node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    cargo_ids: Vec<String>,
    hosts: Vec<String>,
    ports: Vec<u16>,
}

impl ReplicaSet {
    pub fn from_nodes(nodes: &[CargoNode]) -> Self {
        Self {
            cargo_ids: nodes.iter().map(|n| n.id.clone()).collect(),
            hosts: nodes.iter().map(|n| n.host.clone()).collect(),
            ports: nodes.iter().map(|n| n.port).collect(),
        }
    }

    pub fn cargo_ids(&self) -> &[String] {
        &self.cargo_ids
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.cargo_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cargo_ids.is_empty()
    }
}

#[derive(Debug, Default)]
struct HolderState {
    locked: bool,
    /// Bumped on every grant so a lease timer only expires its own grant.
    token: u64,
    acquired_at: u64,
    retired: bool,
}

/// One application's replica set and write lock
#[derive(Debug)]
pub struct AppEntry {
    app_id: String,
    generation: u64,
    replicas: ReplicaSet,
    created_at: u64,
    permit: Semaphore,
    state: Mutex<HolderState>,
}

impl AppEntry {
    fn new(app_id: String, generation: u64, replicas: ReplicaSet) -> Self {
        Self {
            app_id,
            generation,
            replicas,
            created_at: timestamp_now_millis(),
            permit: Semaphore::new(1),
            state: Mutex::new(HolderState::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, HolderState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal(format!("lock state poisoned for {}", self.app_id)))
    }

    fn is_held(&self) -> Result<bool> {
        Ok(self.state()?.locked || self.permit.available_permits() == 0)
    }

    /// Mark the entry dead and fail everyone still queued on it.
    fn retire(&self) -> Result<()> {
        let mut state = self.state()?;
        state.retired = true;
        self.permit.close();
        Ok(())
    }

    /// Release the grant identified by `token` if it is still the current one.
    fn expire(&self, token: u64) -> Result<bool> {
        let mut state = self.state()?;
        if !state.locked || state.token != token || state.retired {
            return Ok(false);
        }
        state.locked = false;
        self.permit.add_permits(1);
        Ok(true)
    }

    fn view(&self) -> Result<AppView> {
        let state = self.state()?;
        Ok(AppView {
            app_id: self.app_id.clone(),
            generation: self.generation,
            created_at: self.created_at,
            locked: state.locked,
            locked_since: state.locked.then_some(state.acquired_at),
            replicas: self.replicas.clone(),
        })
    }
}

/// Read-only view of an entry for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppView {
    pub app_id: String,
    pub generation: u64,
    pub created_at: u64,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_since: Option<u64>,
    pub replicas: ReplicaSet,
}

/// Table of application entries
pub struct LockTable {
    entries: RwLock<HashMap<String, Arc<AppEntry>>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
    policy: ReplacePolicy,
    lease: Option<Duration>,
}

impl LockTable {
    pub fn new(policy: ReplacePolicy, lease: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            policy,
            lease,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<AppEntry>>>> {
        self.entries
            .read()
            .map_err(|_| Error::Internal("lock table poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<AppEntry>>>> {
        self.entries
            .write()
            .map_err(|_| Error::Internal("lock table poisoned".into()))
    }

    fn entry(&self, app_id: &str) -> Result<Arc<AppEntry>> {
        self.read()?
            .get(app_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("application {}", app_id)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shutting_down() -> Error {
        Error::Unavailable("lock table is shutting down".into())
    }

    /// Why a wait on `app_id` ended without a grant
    fn abandoned(&self, app_id: &str) -> Error {
        if self.is_closed() {
            Self::shutting_down()
        } else {
            Error::Retired(app_id.to_string())
        }
    }

    /// Install a fresh, unlocked entry for `app_id`; returns its generation.
    ///
    /// With [`ReplacePolicy::Reject`] a held lock makes this fail with
    /// [`Error::Locked`]. With [`ReplacePolicy::Replace`] the old entry is
    /// retired and its waiters fail with [`Error::Retired`].
    pub fn create_or_replace(&self, app_id: &str, replicas: ReplicaSet) -> Result<u64> {
        let mut entries = self.write()?;
        if self.is_closed() {
            return Err(Self::shutting_down());
        }

        if let Some(existing) = entries.get(app_id) {
            if existing.is_held()? {
                match self.policy {
                    ReplacePolicy::Reject => {
                        tracing::warn!(app_id, "Refusing to replace replica set while write-locked");
                        return Err(Error::Locked(app_id.to_string()));
                    }
                    ReplacePolicy::Replace => {
                        tracing::warn!(
                            app_id,
                            generation = existing.generation,
                            "Replacing write-locked replica set"
                        );
                    }
                }
            }
            existing.retire()?;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replica_count = replicas.len();
        entries.insert(
            app_id.to_string(),
            Arc::new(AppEntry::new(app_id.to_string(), generation, replicas)),
        );

        tracing::info!(app_id, generation, replicas = replica_count, "Installed replica set");
        Ok(generation)
    }

    /// Wait for the application's write lock and take it; returns the
    /// generation of the entry the grant was made on.
    ///
    /// `wait` bounds the time spent queued. Dropping the returned future
    /// leaves the queue without taking the lock.
    pub async fn acquire(&self, app_id: &str, wait: Option<Duration>) -> Result<u64> {
        if self.is_closed() {
            return Err(Self::shutting_down());
        }
        let entry = self.entry(app_id)?;

        let acquired = match wait {
            Some(limit) => tokio::time::timeout(limit, entry.permit.acquire())
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "write lock for {} not granted within {:?}",
                        app_id, limit
                    ))
                })?,
            None => entry.permit.acquire().await,
        };
        let permit = acquired.map_err(|_| self.abandoned(app_id))?;
        // Ownership of the permit now lives in `HolderState` until release.
        permit.forget();

        let token = {
            let mut state = entry.state()?;
            if state.retired {
                return Err(self.abandoned(app_id));
            }
            state.locked = true;
            state.token += 1;
            state.acquired_at = timestamp_now_millis();
            state.token
        };

        tracing::info!(app_id, generation = entry.generation, "Write lock acquired");

        if let Some(lease) = self.lease {
            let entry = entry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(lease).await;
                match entry.expire(token) {
                    Ok(true) => tracing::warn!(
                        app_id = %entry.app_id,
                        lease_ms = lease.as_millis() as u64,
                        "Write lock lease expired"
                    ),
                    Ok(false) => {}
                    Err(e) => tracing::error!("Lease expiry failed: {}", e),
                }
            });
        }

        Ok(entry.generation)
    }

    /// Release the application's write lock.
    ///
    /// Returns `false` if the lock was not held, or if `generation` names an
    /// entry that has since been replaced; the call never adds a second permit.
    pub fn release(&self, app_id: &str, generation: Option<u64>) -> Result<bool> {
        let entry = self.entry(app_id)?;
        if let Some(generation) = generation.filter(|&g| g != entry.generation) {
            tracing::warn!(
                app_id,
                generation,
                current = entry.generation,
                "Ignoring release for a replaced replica set"
            );
            return Ok(false);
        }
        let mut state = entry.state()?;
        if !state.locked {
            tracing::debug!(app_id, "Release of an unheld write lock");
            return Ok(false);
        }
        state.locked = false;
        entry.permit.add_permits(1);
        drop(state);

        tracing::info!(app_id, generation = entry.generation, "Write lock released");
        Ok(true)
    }

    /// Current replica set for `app_id`
    pub fn replicas(&self, app_id: &str) -> Result<ReplicaSet> {
        Ok(self.entry(app_id)?.replicas.clone())
    }

    pub fn describe(&self, app_id: &str) -> Result<AppView> {
        self.entry(app_id)?.view()
    }

    pub fn is_locked(&self, app_id: &str) -> Result<bool> {
        Ok(self.entry(app_id)?.state()?.locked)
    }

    /// All entries, ordered by application id
    pub fn snapshot(&self) -> Result<Vec<AppView>> {
        let entries: Vec<Arc<AppEntry>> = self.read()?.values().cloned().collect();
        let mut views = entries
            .iter()
            .map(|e| e.view())
            .collect::<Result<Vec<_>>>()?;
        views.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        Ok(views)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Stop granting locks: queued and future acquires fail with
    /// [`Error::Unavailable`], as do new replica sets. Held locks can still
    /// be released.
    pub fn close_all(&self) -> Result<()> {
        let entries = self.write()?;
        self.closed.store(true, Ordering::Release);
        for entry in entries.values() {
            entry.permit.close();
        }
        tracing::info!(applications = entries.len(), "Lock table closed");
        Ok(())
    }
}
