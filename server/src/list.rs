//! List containers.
//!
//! A list keeps one tracker per index in a pool that only ever grows. Slots
//! past the current length stay in the pool detached and absent, and are
//! adopted again when the list grows back, so a list that oscillates in
//! length stops allocating once it has reached its largest size.

use crate::delta::{Change, DeltaManager};
use crate::error::{SanitizeError, TreeError};
use crate::input::Input;
use crate::node::{NodeId, NodeKind};
use crate::sanitize::{sanitize, sanitize_integer};
use crate::types::TypeDescriptor;
use shared::protocol::LIST_LENGTH_ALIAS;
use shared::{Value, DELTA_LIST_LENGTH};
use std::sync::Arc;

/// Lengths travel as 32-bit integers, so no list grows past this.
const MAX_LEN: usize = i32::MAX as usize;

pub(crate) struct ListSlot {
    pub(crate) element: Arc<TypeDescriptor>,
    /// Tracker pool; the first `len` entries are attached.
    pub(crate) trackers: Vec<NodeId>,
    pub(crate) len: usize,
    pub(crate) length: NodeId,
    pub(crate) present: bool,
}

impl ListSlot {
    pub(crate) fn new(element: Arc<TypeDescriptor>, length: NodeId) -> Self {
        Self {
            element,
            trackers: Vec::new(),
            len: 0,
            length,
            present: false,
        }
    }

    pub(crate) fn live(&self) -> &[NodeId] {
        &self.trackers[..self.len]
    }
}

impl DeltaManager {
    fn list(&self, id: NodeId) -> Result<&ListSlot, TreeError> {
        match &self.node(id)?.kind {
            NodeKind::List(list) => Ok(list),
            _ => Err(TreeError::WrongKind {
                node: id,
                expected: "list",
            }),
        }
    }

    fn list_mut(&mut self, id: NodeId) -> Result<&mut ListSlot, TreeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::List(list) => Ok(list),
            _ => Err(TreeError::WrongKind {
                node: id,
                expected: "list",
            }),
        }
    }

    pub fn len(&self, list: NodeId) -> Result<usize, TreeError> {
        Ok(self.list(list)?.len)
    }

    /// Size of the tracker pool, i.e. the largest length the list has had.
    pub fn pool_size(&self, list: NodeId) -> Result<usize, TreeError> {
        Ok(self.list(list)?.trackers.len())
    }

    /// The tracker at `index`, if the index is inside the list.
    pub fn index(&self, list: NodeId, index: usize) -> Option<NodeId> {
        self.list(list).ok()?.live().get(index).copied()
    }

    pub fn set_index(
        &mut self,
        list: NodeId,
        index: usize,
        input: impl Into<Input>,
    ) -> Result<NodeId, TreeError> {
        let element = self.list(list)?.element.clone();
        let value = sanitize(&element, &input.into(), self.mode())?;
        self.put_index(list, index, value).map(|(tracker, _)| tracker)
    }

    pub fn push(&mut self, list: NodeId, input: impl Into<Input>) -> Result<NodeId, TreeError> {
        let len = self.len(list)?;
        self.set_index(list, len, input)
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self, list: NodeId) -> Result<Option<Value>, TreeError> {
        let Some(&last) = self.list(list)?.live().last() else {
            return Ok(None);
        };
        let value = self.get(last)?;
        let len = self.len(list)?;
        self.set_len(list, len - 1)?;
        Ok(Some(value))
    }

    /// Removes the element at `index`, shifting later elements down by one.
    pub fn remove_index(&mut self, list: NodeId, index: usize) -> Result<Value, TreeError> {
        let len = self.len(list)?;
        if index >= len {
            return Err(TreeError::InvalidListKey {
                key: index.to_string(),
            });
        }
        let removed = self.get(self.list(list)?.trackers[index])?;
        for i in index..len - 1 {
            let next = self.get(self.list(list)?.trackers[i + 1])?;
            self.put_index(list, i, next)?;
        }
        self.set_len(list, len - 1)?;
        Ok(removed)
    }

    /// Grows or shrinks the list.
    ///
    /// Shrinking removes trackers from the end down to `len`; growing adds
    /// absent slots.
    pub fn set_len(&mut self, list: NodeId, len: usize) -> Result<(), TreeError> {
        let len = bounded(len)?;
        self.revive_list(list)?;
        self.resize(list, len)?;
        self.sync_length(list)
    }

    /// Mutates the list by key: a decimal index, or the length key.
    pub fn set_list_key(
        &mut self,
        list: NodeId,
        key: &str,
        input: impl Into<Input>,
    ) -> Result<(), TreeError> {
        if key == DELTA_LIST_LENGTH || key == LIST_LENGTH_ALIAS {
            let len = sanitize_integer(&input.into(), self.mode())?;
            let len = usize::try_from(len)
                .map_err(|_| SanitizeError::OutOfRange { value: len as f64 })?;
            return self.set_len(list, len);
        }
        match parse_index(key) {
            Some(index) => self.set_index(list, index, input).map(|_| ()),
            None => Err(TreeError::InvalidListKey {
                key: key.to_string(),
            }),
        }
    }

    /// Stores a canonical value at `index`, growing the list as needed.
    pub(crate) fn put_index(
        &mut self,
        list: NodeId,
        index: usize,
        value: Value,
    ) -> Result<(NodeId, bool), TreeError> {
        let needed = bounded(index.saturating_add(1))?;
        let revived = self.revive_list(list)?;
        let len = self.len(list)?;
        if index >= len {
            self.resize(list, needed)?;
        }
        let tracker = self.list(list)?.trackers[index];
        let changed = self.assign(tracker, value)?;
        self.sync_length(list)?;
        Ok((tracker, changed || revived || index >= len))
    }

    /// Replaces the whole list: assigns every index, then drops the excess.
    pub(crate) fn assign_list(&mut self, list: NodeId, items: Vec<Value>) -> Result<bool, TreeError> {
        let mut changed = self.revive_list(list)?;
        let new_len = items.len();
        for (index, item) in items.into_iter().enumerate() {
            changed |= self.put_index(list, index, item)?.1;
        }
        if self.len(list)? > new_len {
            self.resize(list, new_len)?;
            changed = true;
        }
        self.sync_length(list)?;
        Ok(changed)
    }

    fn resize(&mut self, list: NodeId, new_len: usize) -> Result<(), TreeError> {
        let len = self.len(list)?;
        if new_len < len {
            for index in (new_len..len).rev() {
                let tracker = self.list(list)?.trackers[index];
                self.remove(tracker)?;
            }
        } else {
            for index in len..new_len {
                self.pool_tracker(list, index)?;
            }
        }
        self.list_mut(list)?.len = new_len;
        Ok(())
    }

    /// Attaches the pooled tracker for `index`, creating it first when the
    /// pool has never been this long.
    fn pool_tracker(&mut self, list: NodeId, index: usize) -> Result<NodeId, TreeError> {
        let (pooled, element) = {
            let slot = self.list(list)?;
            (slot.trackers.get(index).copied(), slot.element.clone())
        };
        match pooled {
            Some(tracker) => {
                self.adopt(list, tracker)?;
                Ok(tracker)
            }
            None => {
                let tracker = self.build(&index.to_string(), &element, Some(list), None)?;
                self.list_mut(list)?.trackers.push(tracker);
                Ok(tracker)
            }
        }
    }

    fn sync_length(&mut self, list: NodeId) -> Result<(), TreeError> {
        let (length, len) = {
            let slot = self.list(list)?;
            (slot.length, slot.len)
        };
        let current = Value::Int(i32::try_from(len).unwrap_or(i32::MAX));
        let changed = match &mut self.node_mut(length)?.kind {
            NodeKind::Value(slot) if slot.value.as_ref() != Some(&current) => {
                slot.value = Some(current);
                true
            }
            _ => false,
        };
        if changed {
            self.record(length, Change::Changed);
        }
        Ok(())
    }

    /// Marks an absent list present again, announcing it in the delta.
    fn revive_list(&mut self, list: NodeId) -> Result<bool, TreeError> {
        let slot = self.list_mut(list)?;
        if slot.present {
            return Ok(false);
        }
        slot.present = true;
        self.record(list, Change::Changed);
        Ok(true)
    }

    /// Empties the list silently; its pool is kept for reuse.
    pub(crate) fn clear_list(&mut self, list: NodeId) -> Result<(), TreeError> {
        let (live, length) = {
            let slot = self.list(list)?;
            (slot.live().to_vec(), slot.length)
        };
        for tracker in live.into_iter().rev() {
            self.clear(tracker)?;
            self.node_mut(tracker)?.parent = None;
        }
        let slot = self.list_mut(list)?;
        slot.len = 0;
        slot.present = false;
        if let NodeKind::Value(length) = &mut self.node_mut(length)?.kind {
            length.value = None;
        }
        Ok(())
    }
}

fn bounded(len: usize) -> Result<usize, TreeError> {
    if len > MAX_LEN {
        return Err(SanitizeError::OutOfRange { value: len as f64 }.into());
    }
    Ok(len)
}

/// Canonical decimal index: digits only, no sign, no leading zeros.
fn parse_index(key: &str) -> Option<usize> {
    let canonical = !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'));
    if canonical {
        key.parse().ok()
    } else {
        None
    }
}
