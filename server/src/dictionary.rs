//! Dictionary containers: uniform-typed maps and game-object records.

use crate::delta::{Change, DeltaManager};
use crate::error::TreeError;
use crate::input::Input;
use crate::node::{NodeId, NodeKind};
use crate::sanitize::{sanitize, sanitize_key};
use crate::types::{DictionaryType, TypeDescriptor};
use log::debug;
use shared::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) struct DictionarySlot {
    pub(crate) ty: Arc<DictionaryType>,
    pub(crate) trackers: BTreeMap<String, NodeId>,
    pub(crate) present: bool,
}

impl DictionarySlot {
    pub(crate) fn new(ty: Arc<DictionaryType>) -> Self {
        Self {
            ty,
            trackers: BTreeMap::new(),
            present: false,
        }
    }
}

impl DeltaManager {
    fn dictionary(&self, id: NodeId) -> Result<&DictionarySlot, TreeError> {
        match &self.node(id)?.kind {
            NodeKind::Dictionary(dict) => Ok(dict),
            _ => Err(TreeError::WrongKind {
                node: id,
                expected: "dictionary",
            }),
        }
    }

    fn dictionary_mut(&mut self, id: NodeId) -> Result<&mut DictionarySlot, TreeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Dictionary(dict) => Ok(dict),
            _ => Err(TreeError::WrongKind {
                node: id,
                expected: "dictionary",
            }),
        }
    }

    pub fn keys(&self, dict: NodeId) -> Result<Vec<String>, TreeError> {
        Ok(self.dictionary(dict)?.trackers.keys().cloned().collect())
    }

    pub fn contains_key(&self, dict: NodeId, key: &str) -> bool {
        self.dictionary(dict)
            .map(|slot| slot.trackers.contains_key(key))
            .unwrap_or(false)
    }

    /// Sanitizes and stores `input` under `key`, tracking the key on first use.
    ///
    /// The key is sanitized against the dictionary's key type. A key with no
    /// declared type is a [`TreeError::UntypedKey`].
    pub fn set_key(
        &mut self,
        dict: NodeId,
        key: &str,
        input: impl Into<Input>,
    ) -> Result<NodeId, TreeError> {
        let (key, ty) = self.resolve_key(dict, key)?;
        let value = sanitize(&ty, &input.into(), self.mode())?;
        self.put_key(dict, &key, &ty, value).map(|(tracker, _)| tracker)
    }

    /// Stops tracking `key`, recording its removal.
    pub fn delete_key(&mut self, dict: NodeId, key: &str) -> Result<(), TreeError> {
        let tracker = self
            .dictionary(dict)?
            .trackers
            .get(key)
            .copied()
            .ok_or_else(|| TreeError::UntrackedKey {
                key: key.to_string(),
            })?;
        self.remove(tracker)?;
        self.dictionary_mut(dict)?.trackers.remove(key);
        self.release(tracker);
        debug!("deleted key {:?} from {}", key, dict);
        Ok(())
    }

    fn resolve_key(&self, dict: NodeId, raw: &str) -> Result<(String, TypeDescriptor), TreeError> {
        let ty = &self.dictionary(dict)?.ty;
        let key = sanitize_key(&ty.key, raw, self.mode())?;
        match ty.value_type(&key) {
            Some(value_type) => Ok((key, value_type.clone())),
            None => Err(TreeError::UntypedKey { key }),
        }
    }

    /// Stores a canonical value under an already sanitized key.
    pub(crate) fn put_key(
        &mut self,
        dict: NodeId,
        key: &str,
        ty: &TypeDescriptor,
        value: Value,
    ) -> Result<(NodeId, bool), TreeError> {
        let revived = self.revive_dictionary(dict)?;
        let existing = self.dictionary(dict)?.trackers.get(key).copied();
        let (tracker, created) = match existing {
            Some(tracker) => (tracker, false),
            None => (self.build(key, ty, Some(dict), None)?, true),
        };
        let changed = self.assign(tracker, value)?;
        Ok((tracker, changed || created || revived))
    }

    /// Replaces the whole mapping: deletes tracked keys that are missing from
    /// `entries`, then stores every entry.
    pub(crate) fn assign_dictionary(
        &mut self,
        dict: NodeId,
        entries: BTreeMap<String, Value>,
    ) -> Result<bool, TreeError> {
        let mut changed = self.revive_dictionary(dict)?;

        let stale: Vec<String> = self
            .dictionary(dict)?
            .trackers
            .keys()
            .filter(|key| !entries.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            self.delete_key(dict, &key)?;
            changed = true;
        }

        for (key, value) in entries {
            let ty = self
                .dictionary(dict)?
                .ty
                .value_type(&key)
                .cloned()
                .ok_or_else(|| TreeError::UntypedKey { key: key.clone() })?;
            changed |= self.put_key(dict, &key, &ty, value)?.1;
        }
        Ok(changed)
    }

    fn revive_dictionary(&mut self, dict: NodeId) -> Result<bool, TreeError> {
        let slot = self.dictionary_mut(dict)?;
        if slot.present {
            return Ok(false);
        }
        slot.present = true;
        self.record(dict, Change::Changed);
        Ok(true)
    }

    /// Empties the dictionary silently, freeing its trackers.
    pub(crate) fn clear_dictionary(&mut self, dict: NodeId) -> Result<(), TreeError> {
        let slot = self.dictionary_mut(dict)?;
        let trackers = std::mem::take(&mut slot.trackers);
        slot.present = false;
        for tracker in trackers.into_values() {
            self.node_mut(tracker)?.parent = None;
            self.release(tracker);
        }
        Ok(())
    }
}
