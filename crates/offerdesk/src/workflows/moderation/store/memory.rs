use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::{
    Created, StatusTransition, StoreError, SubmissionFilter, SubmissionPatch, SubmissionStore,
    TransitionOutcome,
};
use crate::workflows::moderation::domain::{SubmissionId, SubmissionKind, SubmissionRecord};
use crate::workflows::moderation::idempotency::IdempotencyKey;

struct Entry {
    record: SubmissionRecord,
    sender: watch::Sender<SubmissionRecord>,
}

impl Entry {
    fn new(record: SubmissionRecord) -> Self {
        let (sender, _) = watch::channel(record.clone());
        Self { record, sender }
    }

    fn publish(&self) {
        self.sender.send_replace(self.record.clone());
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<SubmissionId, Entry>,
    keys: HashMap<IdempotencyKey, SubmissionId>,
    counted_offers: HashSet<(SubmissionId, SubmissionId)>,
}

/// Process-local store backed by a mutex-guarded map with one watch channel per record.
///
/// All mutations happen under a single lock, which gives `transition` its compare-and-swap
/// semantics and makes `increment_response_count` atomic.
#[derive(Default, Clone)]
pub struct MemorySubmissionStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl SubmissionStore for MemorySubmissionStore {
    fn create(&self, record: SubmissionRecord) -> Result<Created, StoreError> {
        let mut inner = self.lock()?;

        if let Some(key) = &record.idempotency_key {
            if let Some(existing_id) = inner.keys.get(key) {
                let existing = inner
                    .records
                    .get(existing_id)
                    .map(|entry| entry.record.clone())
                    .ok_or(StoreError::NotFound)?;
                return Ok(Created {
                    record: existing,
                    replayed: true,
                });
            }
        }

        if inner.records.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }

        if let Some(key) = &record.idempotency_key {
            inner.keys.insert(key.clone(), record.id.clone());
        }
        inner
            .records
            .insert(record.id.clone(), Entry::new(record.clone()));

        Ok(Created {
            record,
            replayed: false,
        })
    }

    fn get(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.records.get(id).map(|entry| entry.record.clone()))
    }

    fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .keys
            .get(key)
            .and_then(|id| inner.records.get(id))
            .map(|entry| entry.record.clone()))
    }

    fn update(
        &self,
        id: &SubmissionId,
        patch: SubmissionPatch,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut inner = self.lock()?;
        let entry = inner.records.get_mut(id).ok_or(StoreError::NotFound)?;

        if patch.only_if_pending && entry.record.status.is_terminal() {
            return Err(StoreError::Terminal(entry.record.status));
        }

        let moderation = &mut entry.record.moderation;
        if let Some(flag) = patch.is_duplicate {
            moderation.is_duplicate = flag;
        }
        if let Some(matches) = patch.duplicate_matches {
            moderation.duplicate_matches = matches;
        }
        if let Some(flag) = patch.requires_manual_review {
            moderation.requires_manual_review = flag;
        }
        if let Some(notes) = patch.moderator_notes {
            moderation.moderator_notes = notes;
        }
        if let Some(assessment) = patch.oracle {
            moderation.oracle = Some(assessment);
        }

        entry.publish();
        Ok(entry.record.clone())
    }

    fn transition(
        &self,
        id: &SubmissionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut inner = self.lock()?;
        let entry = inner.records.get_mut(id).ok_or(StoreError::NotFound)?;
        let kind = entry.record.kind;

        if !transition.to.is_terminal() || !transition.to.valid_for(kind) {
            return Err(StoreError::InvalidTransition {
                kind,
                to: transition.to,
            });
        }

        if entry.record.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal(entry.record.clone()));
        }

        let record = &mut entry.record;
        record.status = transition.to;
        record.moderation.moderator_notes = transition.notes;
        record.moderation.reviewed_at = Some(transition.at);
        record.moderation.decided_by = Some(transition.source);
        record.updated_at = transition.at;
        if transition.enable_chat && kind == SubmissionKind::Offer {
            record.chat_enabled = true;
        }

        entry.publish();
        Ok(TransitionOutcome::Applied(entry.record.clone()))
    }

    fn increment_response_count(
        &self,
        request_id: &SubmissionId,
        offer_id: &SubmissionId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let pair = (request_id.clone(), offer_id.clone());
        if inner.counted_offers.contains(&pair) {
            return Ok(false);
        }

        let entry = inner
            .records
            .get_mut(request_id)
            .ok_or(StoreError::NotFound)?;
        if entry.record.kind != SubmissionKind::Request {
            return Err(StoreError::NotFound);
        }
        entry.record.response_count = entry.record.response_count.saturating_add(1);
        entry.publish();

        inner.counted_offers.insert(pair);
        Ok(true)
    }

    fn subscribe(
        &self,
        id: &SubmissionId,
    ) -> Result<watch::Receiver<SubmissionRecord>, StoreError> {
        let inner = self.lock()?;
        inner
            .records
            .get(id)
            .map(|entry| entry.sender.subscribe())
            .ok_or(StoreError::NotFound)
    }

    fn query(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<SubmissionRecord> = inner
            .records
            .values()
            .filter(|entry| filter.matches(&entry.record))
            .map(|entry| entry.record.clone())
            .collect();

        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }

        Ok(records)
    }

    fn purge_all(&self) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let purged = inner.records.len();
        inner.records.clear();
        inner.keys.clear();
        inner.counted_offers.clear();
        Ok(purged)
    }
}
