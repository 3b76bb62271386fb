//! Transactional change notification
//!
//! Changes raised while an operation runs are queued and merged. They reach the
//! observers once, when the outermost transaction of that operation's thread
//! closes. Changes raised outside any transaction (an instance updating a sensor
//! value on its own) are delivered right away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};

use crate::path::Path;

/// Observer of one object tree
pub trait ObjectListener: Send + Sync {
    fn instances_added(&self, object_id: u16, instance_ids: &[u16]);
    fn instances_removed(&self, object_id: u16, instance_ids: &[u16]);
    fn resources_changed(&self, paths: &[Path]);
}

/// Changes accumulated by one top-level operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    instances_added: Vec<u16>,
    instances_removed: Vec<u16>,
    resources_changed: Vec<Path>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.instances_added.is_empty()
            && self.instances_removed.is_empty()
            && self.resources_changed.is_empty()
    }

    pub fn instances_added(&self) -> &[u16] {
        &self.instances_added
    }

    pub fn instances_removed(&self) -> &[u16] {
        &self.instances_removed
    }

    pub fn resources_changed(&self) -> &[Path] {
        &self.resources_changed
    }

    fn add_instances(&mut self, object_id: u16, instance_ids: &[u16]) {
        for id in instance_ids {
            if !self.instances_added.contains(id) {
                self.instances_added.push(*id);
            }
        }
        // resources of a new instance are reported through the instance itself
        self.resources_changed.retain(|p| {
            !instance_ids
                .iter()
                .any(|id| Path::Instance(object_id, *id).contains(p))
        });
    }

    fn remove_instances(&mut self, object_id: u16, instance_ids: &[u16]) {
        for id in instance_ids {
            if let Some(pos) = self.instances_added.iter().position(|added| added == id) {
                // created and removed by the same operation
                self.instances_added.remove(pos);
            } else if !self.instances_removed.contains(id) {
                self.instances_removed.push(*id);
            }
        }
        self.resources_changed.retain(|p| {
            !instance_ids
                .iter()
                .any(|id| Path::Instance(object_id, *id).contains(p))
        });
    }

    fn change_resources(&mut self, object_id: u16, paths: &[Path]) {
        for path in paths {
            let in_new_instance = path.object_id() == Some(object_id)
                && path
                    .object_instance_id()
                    .is_some_and(|id| self.instances_added.contains(&id));
            if !in_new_instance && !self.resources_changed.contains(path) {
                self.resources_changed.push(*path);
            }
        }
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    depth: usize,
    pending: ChangeSet,
}

/// Change notifier of one object enabler
///
/// Transactions nest and belong to the thread that opened them: only the close
/// that brings that thread's depth back to zero hands its merged change set out
/// for delivery. Changes raised on a thread with no open transaction are
/// delivered right away on that thread.
pub struct TransactionalListener {
    object_id: u16,
    state: Mutex<HashMap<ThreadId, TransactionState>>,
    listeners: RwLock<Vec<Arc<dyn ObjectListener>>>,
}

impl TransactionalListener {
    pub fn new(object_id: u16) -> Self {
        Self {
            object_id,
            state: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, HashMap<ThreadId, TransactionState>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Transaction state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ObjectListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ObjectListener>) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Nesting depth on the calling thread, 0 outside any transaction
    pub fn depth(&self) -> usize {
        self.lock_state()
            .get(&thread::current().id())
            .map_or(0, |state| state.depth)
    }

    pub fn begin_transaction(&self) {
        self.lock_state()
            .entry(thread::current().id())
            .or_default()
            .depth += 1;
    }

    /// Close one level; returns the merged changes when the outermost level closes
    #[must_use]
    pub fn end_transaction(&self) -> Option<ChangeSet> {
        let thread_id = thread::current().id();
        let mut states = self.lock_state();
        let Some(state) = states.get_mut(&thread_id) else {
            log::warn!(
                "Object {}: end of transaction without a matching begin",
                self.object_id
            );
            return None;
        };
        if state.depth > 1 {
            state.depth -= 1;
            return None;
        }
        let changes = states
            .remove(&thread_id)
            .map(|state| state.pending)
            .unwrap_or_default();
        (!changes.is_empty()).then_some(changes)
    }

    /// Queue into the calling thread's transaction, or fire when it has none
    fn record(&self, apply: impl FnOnce(&mut ChangeSet)) {
        let immediate = {
            let mut states = self.lock_state();
            match states.get_mut(&thread::current().id()) {
                Some(state) => {
                    apply(&mut state.pending);
                    None
                }
                None => {
                    let mut changes = ChangeSet::default();
                    apply(&mut changes);
                    Some(changes)
                }
            }
        };
        if let Some(changes) = immediate {
            self.fire(&changes);
        }
    }

    pub fn instances_added(&self, instance_ids: &[u16]) {
        if !instance_ids.is_empty() {
            self.record(|changes| changes.add_instances(self.object_id, instance_ids));
        }
    }

    pub fn instances_removed(&self, instance_ids: &[u16]) {
        if !instance_ids.is_empty() {
            self.record(|changes| changes.remove_instances(self.object_id, instance_ids));
        }
    }

    pub fn resources_changed(&self, paths: &[Path]) {
        if !paths.is_empty() {
            self.record(|changes| changes.change_resources(self.object_id, paths));
        }
    }

    /// Deliver a change set to every listener
    ///
    /// Must be called without holding the enabler's lock.
    pub fn fire(&self, changes: &ChangeSet) {
        let listeners: Vec<Arc<dyn ObjectListener>> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for listener in &listeners {
            if !changes.instances_added.is_empty() {
                listener.instances_added(self.object_id, &changes.instances_added);
            }
            if !changes.instances_removed.is_empty() {
                listener.instances_removed(self.object_id, &changes.instances_removed);
            }
            if !changes.resources_changed.is_empty() {
                listener.resources_changed(&changes.resources_changed);
            }
        }
    }
}
