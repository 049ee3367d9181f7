//! Arena-backed tree nodes and the operations shared by every node kind.
//!
//! Nodes refer to each other through [`NodeId`] handles into a per-manager
//! arena. A handle carries a generation, so a handle to a released node is
//! rejected instead of silently aliasing whatever reuses its slot.

use crate::delta::{Change, DeltaManager};
use crate::dictionary::DictionarySlot;
use crate::error::TreeError;
use crate::input::Input;
use crate::list::ListSlot;
use crate::sanitize::{sanitize, sanitize_dictionary, sanitize_integer, sanitize_list};
use crate::types::TypeDescriptor;
use log::debug;
use shared::{Value, DELTA_LIST_LENGTH};
use std::collections::BTreeMap;
use std::fmt;

/// Generational handle to a node in a [`DeltaManager`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

pub(crate) struct Node {
    pub(crate) key: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

pub(crate) enum NodeKind {
    Root(BTreeMap<String, NodeId>),
    Value(ValueSlot),
    List(ListSlot),
    Dictionary(DictionarySlot),
}

/// A scalar or reference slot. `ty` is the slot's validator.
pub(crate) struct ValueSlot {
    pub(crate) ty: TypeDescriptor,
    pub(crate) value: Option<Value>,
}

impl ValueSlot {
    pub(crate) fn new(ty: TypeDescriptor) -> Self {
        Self { ty, value: None }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

impl DeltaManager {
    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.arena.get(id).ok_or(TreeError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.arena.get_mut(id).ok_or(TreeError::StaleNode(id))
    }

    fn value_slot_mut(&mut self, id: NodeId) -> Result<&mut ValueSlot, TreeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Value(slot) => Ok(slot),
            _ => Err(TreeError::WrongKind {
                node: id,
                expected: "value node",
            }),
        }
    }

    /// Current value of a node. Absent values read as `Null`; containers read
    /// as the list or map of their children's values.
    pub fn get(&self, id: NodeId) -> Result<Value, TreeError> {
        let node = self.node(id)?;
        Ok(match &node.kind {
            NodeKind::Root(children) => Value::Map(self.collect_children(children)?),
            NodeKind::Value(slot) => slot.value.clone().unwrap_or(Value::Null),
            NodeKind::List(list) if list.present => Value::List(
                list.live()
                    .iter()
                    .map(|tracker| self.get(*tracker))
                    .collect::<Result<_, _>>()?,
            ),
            NodeKind::Dictionary(dict) if dict.present => {
                Value::Map(self.collect_children(&dict.trackers)?)
            }
            NodeKind::List(_) | NodeKind::Dictionary(_) => Value::Null,
        })
    }

    fn collect_children(
        &self,
        children: &BTreeMap<String, NodeId>,
    ) -> Result<BTreeMap<String, Value>, TreeError> {
        children
            .iter()
            .map(|(key, child)| Ok((key.clone(), self.get(*child)?)))
            .collect()
    }

    /// The child tracked under `key` (a field, dictionary key or list index).
    pub fn child(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match &self.arena.get(id)?.kind {
            NodeKind::Root(children) => children.get(key).copied(),
            NodeKind::Dictionary(dict) => dict.trackers.get(key).copied(),
            NodeKind::List(list) if key == DELTA_LIST_LENGTH => Some(list.length),
            NodeKind::List(list) => key.parse::<usize>().ok().and_then(|i| list.live().get(i).copied()),
            NodeKind::Value(_) => None,
        }
    }

    /// The key the node sits under in its parent, or `None` for a stale handle.
    pub fn key(&self, id: NodeId) -> Option<&str> {
        self.arena.get(id).map(|node| node.key.as_str())
    }

    /// The attached parent; `None` for the root, detached nodes and stale handles.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|node| node.parent)
    }

    /// True when the node holds a game-object reference (diffed by id only).
    pub fn is_reference(&self, id: NodeId) -> bool {
        matches!(
            self.arena.get(id).map(|node| &node.kind),
            Some(NodeKind::Value(slot)) if slot.ty.is_reference()
        )
    }

    /// Sanitizes `input` against the node's declared type and stores it.
    ///
    /// Returns whether anything changed. Invalid input leaves the node
    /// untouched and is returned as [`TreeError::Invalid`].
    pub fn set(&mut self, id: NodeId, input: impl Into<Input>) -> Result<bool, TreeError> {
        let input = input.into();
        let node = self.node(id)?;
        let parent = node.parent.ok_or(TreeError::Detached(id))?;

        if node.key == DELTA_LIST_LENGTH && matches!(self.node(parent)?.kind, NodeKind::List(_)) {
            let before = self.len(parent)?;
            let len = sanitize_integer(&input, self.mode())?;
            let len = usize::try_from(len).map_err(|_| crate::error::SanitizeError::OutOfRange {
                value: len as f64,
            })?;
            self.set_len(parent, len)?;
            return Ok(before != len);
        }

        let value = match &node.kind {
            NodeKind::Value(slot) => sanitize(&slot.ty, &input, self.mode())?,
            NodeKind::List(list) => Value::List(sanitize_list(&list.element, &input, self.mode())?),
            NodeKind::Dictionary(dict) => {
                Value::Map(sanitize_dictionary(&dict.ty, &input, self.mode())?)
            }
            NodeKind::Root(_) => {
                return Err(TreeError::WrongKind {
                    node: id,
                    expected: "value node or container",
                })
            }
        };
        self.assign(id, value)
    }

    /// Stores an already canonical value, recording a change only when it
    /// differs from the current one.
    ///
    /// Null on a container makes it absent again.
    pub(crate) fn assign(&mut self, id: NodeId, value: Value) -> Result<bool, TreeError> {
        match &self.node(id)?.kind {
            NodeKind::Value(_) => {}
            NodeKind::List(list) if value.is_null() => {
                let present = list.present;
                return self.vacate(id, present);
            }
            NodeKind::Dictionary(dict) if value.is_null() => {
                let present = dict.present;
                return self.vacate(id, present);
            }
            NodeKind::List(_) => {
                let Value::List(items) = value else {
                    return Err(TreeError::WrongKind {
                        node: id,
                        expected: "list value",
                    });
                };
                return self.assign_list(id, items);
            }
            NodeKind::Dictionary(_) => {
                let Value::Map(entries) = value else {
                    return Err(TreeError::WrongKind {
                        node: id,
                        expected: "map value",
                    });
                };
                return self.assign_dictionary(id, entries);
            }
            NodeKind::Root(_) => {
                return Err(TreeError::WrongKind {
                    node: id,
                    expected: "value node or container",
                })
            }
        }

        let slot = self.value_slot_mut(id)?;
        if slot.value.as_ref() == Some(&value) {
            return Ok(false);
        }
        slot.value = Some(value);
        self.record(id, Change::Changed);
        Ok(true)
    }

    fn vacate(&mut self, id: NodeId, present: bool) -> Result<bool, TreeError> {
        if !present {
            return Ok(false);
        }
        self.record(id, Change::Removed);
        self.clear(id)?;
        Ok(true)
    }

    /// Removes a node from the tree on behalf of application logic.
    ///
    /// Top-level objects and dictionary entries are removed by key. List slots
    /// go away only by shrinking the list, and the root never does.
    pub fn delete(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root() {
            return Err(TreeError::RootDeletion);
        }
        let node = self.node(id)?;
        let parent = node.parent.ok_or(TreeError::Detached(id))?;
        let key = node.key.clone();

        match &self.node(parent)?.kind {
            NodeKind::Root(_) => self.untrack(&key),
            NodeKind::Dictionary(_) => self.delete_key(parent, &key),
            NodeKind::List(_) => Err(TreeError::ListSlot),
            NodeKind::Value(_) => Err(TreeError::WrongKind {
                node: parent,
                expected: "container",
            }),
        }
    }

    /// Records the removal of `id`, drops its value and detaches it.
    ///
    /// The caller unregisters the node from its parent's bookkeeping.
    pub(crate) fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.record(id, Change::Removed);
        self.clear(id)?;
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Makes a node and everything below it absent without recording anything.
    pub(crate) fn clear(&mut self, id: NodeId) -> Result<(), TreeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Value(slot) => {
                slot.value = None;
                Ok(())
            }
            NodeKind::List(_) => self.clear_list(id),
            NodeKind::Dictionary(_) => self.clear_dictionary(id),
            NodeKind::Root(_) => Err(TreeError::RootDeletion),
        }
    }

    /// Frees a detached node and its whole subtree, list pools included.
    pub(crate) fn release(&mut self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        match node.kind {
            NodeKind::Value(_) => {}
            NodeKind::List(list) => {
                for tracker in list.trackers {
                    self.release(tracker);
                }
                self.release(list.length);
            }
            NodeKind::Dictionary(dict) => {
                for tracker in dict.trackers.into_values() {
                    self.release(tracker);
                }
            }
            NodeKind::Root(children) => {
                for child in children.into_values() {
                    self.release(child);
                }
            }
        }
    }

    /// Attaches `child` under `parent`.
    ///
    /// Adopting under the current parent is a no-op; adopting a node that
    /// already has a different parent is refused. List parents keep their
    /// pool order themselves, so only the parent link is set for them.
    pub(crate) fn adopt(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let node = self.node(child)?;
        match node.parent {
            Some(existing) if existing == parent => return Ok(()),
            Some(_) => return Err(TreeError::AlreadyAdopted { child }),
            None => {}
        }
        let key = node.key.clone();

        match &mut self.node_mut(parent)?.kind {
            NodeKind::Root(children) => {
                children.insert(key, child);
            }
            NodeKind::Dictionary(dict) => {
                dict.trackers.insert(key, child);
            }
            NodeKind::List(_) => {}
            NodeKind::Value(_) => {
                return Err(TreeError::WrongKind {
                    node: parent,
                    expected: "container",
                })
            }
        }
        debug!("adopted {} under {}", child, parent);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }
}
