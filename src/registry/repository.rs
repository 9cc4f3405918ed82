//! Resident record repository.
//!
//! Owns the two-part record invariant: a resident hash exists iff its id is
//! in the membership set. Without multi-key transactions the invariant is
//! kept by ordering:
//!
//! - **create**: write every field, then add to the set (a crash leaves an
//!   orphan hash that no reader can see)
//! - **delete**: remove from the set, then delete the hash (a crash again
//!   leaves only an orphan hash)
//!
//! Orphan hashes are pruned by reconciliation. A set member whose hash is
//! empty is treated as missing by every reader. Create reads its hash back
//! after the set add and update re-checks membership after its writes, so
//! neither reports success across a concurrent prune or delete.

use crate::models::{FieldSet, Resident, ResidentField, ResidentId};
use crate::storage::{KeySpace, KeyValueStore};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A resident before and after an update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Record as read before any field was written.
    pub before: Resident,
    /// Record with the update's fields merged in.
    pub after: Resident,
}

/// CRUD over resident hashes and the membership set.
#[derive(Clone)]
pub struct ResidentRepository {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
}

impl ResidentRepository {
    /// Creates a repository over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Returns the key space.
    #[must_use]
    pub const fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Creates a resident with a fresh identifier.
    ///
    /// Caller fields are written in order, then every remaining schema field
    /// is written as `""`, then the id joins the membership set.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if normalization rejects a value
    /// - [`Error::StoreUnavailable`] if the first write fails
    /// - [`Error::PartialMutation`] if a later call fails, or the hash was
    ///   removed before the set add; the partial record is unlinked
    ///   best-effort
    pub fn create(&self, fields: FieldSet) -> Result<Resident> {
        let fields = fields.normalize()?;
        let id = ResidentId::generate();
        let key = self.keys.resident(&id);

        let mut hash: HashMap<String, String> = fields
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), value.to_string()))
            .collect();
        let padding = ResidentField::all()
            .iter()
            .filter(|field| !fields.contains(**field))
            .map(|field| (*field, ""));

        for (written, (field, value)) in fields.iter().chain(padding).enumerate() {
            if let Err(e) = self.store.hash_set(&key, field.as_str(), value) {
                if written == 0 {
                    return Err(e);
                }
                let rolled_back = self.discard_hash(&key);
                return Err(partial("create_resident", &e, rolled_back));
            }
            hash.entry(field.as_str().to_string()).or_default();
        }

        if let Err(e) = self.store.set_add(&self.keys.members(), id.as_str()) {
            // The add may have applied before the error surfaced.
            let unlinked = self
                .store
                .set_remove(&self.keys.members(), id.as_str())
                .is_ok();
            let rolled_back = unlinked && self.discard_hash(&key);
            return Err(partial("create_resident", &e, rolled_back));
        }

        // A reconcile pass may have taken the hash for an orphan before the
        // set add landed.
        match self.store.hash_get_all(&key) {
            Ok(stored) if stored.is_empty() => {
                let rolled_back = self
                    .store
                    .set_remove(&self.keys.members(), id.as_str())
                    .is_ok();
                let lost = Error::store("create_resident", "record removed before it was linked");
                return Err(partial("create_resident", &lost, rolled_back));
            },
            Ok(_) => {},
            Err(e) => {
                warn!(resident_id = %id, error = %e, "Could not confirm created record");
            },
        }

        debug!(resident_id = %id, fields = fields.len(), "Created resident record");
        Ok(Resident::from_hash(id, hash))
    }

    /// Reads one resident.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is not a member or its hash is
    /// empty, or a store error.
    pub fn get(&self, id: &ResidentId) -> Result<Resident> {
        if !self.is_member(id)? {
            return Err(Error::NotFound(id.to_string()));
        }
        self.read_hash(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Returns true if the id is in the membership set.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn is_member(&self, id: &ResidentId) -> Result<bool> {
        self.store.set_contains(&self.keys.members(), id.as_str())
    }

    /// Lists the membership set.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn ids(&self) -> Result<Vec<ResidentId>> {
        Ok(self
            .store
            .set_members(&self.keys.members())?
            .into_iter()
            .map(ResidentId::from)
            .collect())
    }

    /// Returns a lazy, single-pass iterator over live residents.
    ///
    /// The membership set is snapshotted up front; each record is read when
    /// the iterator reaches it. Members whose hash is empty are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the membership set cannot be read.
    pub fn iter(&self) -> Result<ResidentIter<'_>> {
        Ok(ResidentIter {
            repository: self,
            ids: self.ids()?.into_iter(),
        })
    }

    /// Lists every live resident.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn list(&self) -> Result<Vec<Resident>> {
        self.iter()?.collect()
    }

    /// Merges fields into an existing resident.
    ///
    /// Only the listed fields are written; everything else keeps its value.
    /// Membership is checked again after the writes, so an update racing a
    /// delete never leaves the record behind.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is not a live member, before or after
    ///   the writes
    /// - [`Error::InvalidInput`] if normalization rejects a value
    /// - [`Error::StoreUnavailable`] if the first write fails
    /// - [`Error::PartialMutation`] if a later write fails, in which case
    ///   fields already written are restored best-effort, or if membership
    ///   cannot be confirmed after the writes
    pub fn update(&self, id: &ResidentId, fields: FieldSet) -> Result<UpdateOutcome> {
        let fields = fields.normalize()?;
        if !self.is_member(id)? {
            return Err(Error::NotFound(id.to_string()));
        }
        let before = self
            .read_hash(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let key = self.keys.resident(id);
        let mut written: Vec<ResidentField> = Vec::with_capacity(fields.len());
        for (field, value) in fields.iter() {
            if let Err(e) = self.store.hash_set(&key, field.as_str(), value) {
                if written.is_empty() {
                    return Err(e);
                }
                let rolled_back = self.restore_fields(&key, &before, &written);
                return Err(partial("update_resident", &e, rolled_back));
            }
            written.push(field);
        }

        // A delete that landed after the membership check leaves these writes
        // on an orphan hash.
        match self.is_member(id) {
            Ok(true) => {},
            Ok(false) => {
                self.discard_hash(&key);
                debug!(resident_id = %id, "Resident deleted during update");
                return Err(Error::NotFound(id.to_string()));
            },
            Err(e) => return Err(partial("update_resident", &e, false)),
        }

        let mut after = before.clone();
        for (field, value) in fields.iter() {
            after
                .fields
                .insert(field.as_str().to_string(), value.to_string());
        }

        debug!(resident_id = %id, fields = written.len(), "Updated resident record");
        Ok(UpdateOutcome { before, after })
    }

    /// Deletes a resident, returning its last snapshot.
    ///
    /// Of two concurrent deletes of the same id exactly one succeeds; the
    /// other sees [`Error::NotFound`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is not a live member
    /// - [`Error::StoreUnavailable`] if the snapshot read or set removal fails
    /// - [`Error::PartialMutation`] if the hash delete fails after the set
    ///   removal; the set entry is restored best-effort
    pub fn delete(&self, id: &ResidentId) -> Result<Resident> {
        if !self.is_member(id)? {
            return Err(Error::NotFound(id.to_string()));
        }
        let Some(snapshot) = self.read_hash(id)? else {
            self.prune_member(id);
            return Err(Error::NotFound(id.to_string()));
        };

        if !self.store.set_remove(&self.keys.members(), id.as_str())? {
            // Lost a race with another delete.
            return Err(Error::NotFound(id.to_string()));
        }

        if let Err(e) = self.store.hash_delete(&self.keys.resident(id)) {
            let rolled_back = self
                .store
                .set_add(&self.keys.members(), id.as_str())
                .is_ok();
            return Err(partial("delete_resident", &e, rolled_back));
        }

        debug!(resident_id = %id, "Deleted resident record");
        Ok(snapshot)
    }

    /// Reads a resident hash; `None` when empty.
    fn read_hash(&self, id: &ResidentId) -> Result<Option<Resident>> {
        let hash = self.store.hash_get_all(&self.keys.resident(id))?;
        if hash.is_empty() {
            warn!(resident_id = %id, "Membership set lists a resident with no record");
            return Ok(None);
        }
        Ok(Some(Resident::from_hash(id.clone(), hash)))
    }

    /// Removes a dangling set entry, logging instead of failing.
    pub(crate) fn prune_member(&self, id: &ResidentId) -> bool {
        match self.store.set_remove(&self.keys.members(), id.as_str()) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(resident_id = %id, error = %e, "Failed to prune dangling member");
                false
            },
        }
    }

    /// Deletes a partially written hash.
    fn discard_hash(&self, key: &str) -> bool {
        match self.store.hash_delete(key) {
            Ok(_) => true,
            Err(e) => {
                warn!(key, error = %e, "Rollback failed; orphan hash left for reconciliation");
                false
            },
        }
    }

    /// Writes back previous values of fields an update already changed.
    fn restore_fields(&self, key: &str, before: &Resident, written: &[ResidentField]) -> bool {
        written.iter().all(|field| {
            self.store
                .hash_set(key, field.as_str(), before.field(*field))
                .inspect_err(|e| {
                    warn!(key, field = field.as_str(), error = %e, "Rollback of field failed");
                })
                .is_ok()
        })
    }
}

/// Lazy iterator over live residents. See [`ResidentRepository::iter`].
pub struct ResidentIter<'a> {
    repository: &'a ResidentRepository,
    ids: std::vec::IntoIter<ResidentId>,
}

impl Iterator for ResidentIter<'_> {
    type Item = Result<Resident>;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            match self.repository.read_hash(&id) {
                Ok(Some(resident)) => return Some(Ok(resident)),
                Ok(None) => {},
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

fn partial(operation: &str, cause: &Error, rolled_back: bool) -> Error {
    warn!(operation, rolled_back, error = %cause, "Multi-step mutation failed part way");
    Error::PartialMutation {
        operation: operation.to_string(),
        cause: cause.to_string(),
        rolled_back,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VoterStatus;
    use crate::storage::InMemoryStore;

    fn repository() -> (Arc<InMemoryStore>, ResidentRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repo = ResidentRepository::new(store.clone(), KeySpace::new("t"));
        (store, repo)
    }

    fn juan() -> FieldSet {
        FieldSet::new()
            .with(ResidentField::FirstName, "Juan")
            .with(ResidentField::Gender, "Male")
            .with(ResidentField::VotersStatus, "Registered")
            .with(ResidentField::Purok, "1")
    }

    #[test]
    fn test_create_pads_every_schema_field() {
        let (store, repo) = repository();
        let resident = repo.create(juan()).unwrap();

        let hash = store.hash_get_all(&repo.keys().resident(&resident.id)).unwrap();
        assert_eq!(hash.len(), ResidentField::all().len());
        assert_eq!(hash.get("email").map(String::as_str), Some(""));
        assert_eq!(
            resident.field(ResidentField::VotersStatus),
            VoterStatus::Registered.as_str()
        );
        assert!(repo.is_member(&resident.id).unwrap());
    }

    #[test]
    fn test_create_with_no_fields_is_still_readable() {
        let (_, repo) = repository();
        let resident = repo.create(FieldSet::new()).unwrap();
        let fetched = repo.get(&resident.id).unwrap();
        assert_eq!(fetched.field(ResidentField::FirstName), "");
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let (_, repo) = repository();
        let err = repo.get(&ResidentId::new("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_merges_listed_fields_only() {
        let (_, repo) = repository();
        let resident = repo.create(juan()).unwrap();

        let outcome = repo
            .update(
                &resident.id,
                FieldSet::new().with(ResidentField::Occupation, "Farmer"),
            )
            .unwrap();
        assert_eq!(outcome.before.field(ResidentField::Occupation), "");
        assert_eq!(outcome.after.field(ResidentField::Occupation), "Farmer");
        assert_eq!(outcome.after.field(ResidentField::FirstName), "Juan");

        let stored = repo.get(&resident.id).unwrap();
        assert_eq!(stored, outcome.after);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let (_, repo) = repository();
        let err = repo
            .update(&ResidentId::new("nope"), FieldSet::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_returns_snapshot_and_removes_both_parts() {
        let (store, repo) = repository();
        let resident = repo.create(juan()).unwrap();

        let snapshot = repo.delete(&resident.id).unwrap();
        assert_eq!(snapshot.field(ResidentField::Purok), "1");
        assert!(repo.get(&resident.id).unwrap_err().is_not_found());
        assert!(repo.delete(&resident.id).unwrap_err().is_not_found());
        assert!(store.hash_get_all(&repo.keys().resident(&resident.id)).unwrap().is_empty());
    }

    #[test]
    fn test_list_skips_dangling_members() {
        let (store, repo) = repository();
        let live = repo.create(juan()).unwrap();
        store.set_add(&repo.keys().members(), "ghost").unwrap();

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, live.id);
        assert!(repo.get(&ResidentId::new("ghost")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_prunes_dangling_member() {
        let (store, repo) = repository();
        store.set_add(&repo.keys().members(), "ghost").unwrap();

        assert!(repo.delete(&ResidentId::new("ghost")).unwrap_err().is_not_found());
        assert_eq!(store.set_cardinality(&repo.keys().members()).unwrap(), 0);
    }

    #[test]
    fn test_orphan_hash_is_invisible() {
        let (store, repo) = repository();
        store.hash_set("t:resident:orphan", "firstName", "Pedro").unwrap();

        assert!(repo.list().unwrap().is_empty());
        assert!(repo.get(&ResidentId::new("orphan")).unwrap_err().is_not_found());
    }
}
