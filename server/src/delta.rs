//! The delta manager: owner of the tracked tree and of the per-turn diff.
//!
//! Every recorded change walks from the changed node up to the root and
//! writes the terminal value into the buffer at the mirrored path. List
//! levels on the way get their current length stamped under `&LEN`, so a
//! client always learns the length of any list it receives entries for.
//!
//! A removal remembers the keys the removed node held. When a container is
//! written at the same position again within the window, those keys are sent
//! as removed inside the new container, so a replica merging into the old
//! content drops them.

use crate::error::TreeError;
use crate::input::Input;
use crate::node::{Arena, Node, NodeId, NodeKind};
use crate::sanitize::{sanitize, Mode};
use crate::types::TypeDescriptor;
use log::{debug, error, info};
use shared::protocol::is_reserved_key;
use shared::{Delta, Value, DELTA_LIST_LENGTH};
use std::collections::BTreeMap;

/// What happened at the end of a recorded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    /// The node's value changed, or a container became present.
    Changed,
    /// The node was removed.
    Removed,
}

/// Keys a replica may still hold below a position, down to the leaves.
#[derive(Debug, Clone, Default, PartialEq)]
struct Shape(BTreeMap<String, Shape>);

impl Shape {
    fn merge(mut self, other: Shape) -> Shape {
        for (key, below) in other.0 {
            let merged = match self.0.remove(&key) {
                Some(existing) => existing.merge(below),
                None => below,
            };
            self.0.insert(key, merged);
        }
        self
    }

    fn into_removals(self) -> BTreeMap<String, Pending> {
        self.0
            .into_iter()
            .map(|(key, below)| (key, Pending::Removed(below)))
            .collect()
    }
}

/// One level of the buffer. Converted to a [`Delta`] when dumped.
#[derive(Debug, Clone)]
enum Pending {
    Value { value: Value, held: Shape },
    Removed(Shape),
    Object(BTreeMap<String, Pending>),
}

impl Pending {
    /// What a replica may hold at this position before the window.
    fn into_held(self) -> Shape {
        match self {
            Pending::Value { held, .. } | Pending::Removed(held) => held,
            Pending::Object(entries) => Shape(
                entries
                    .into_iter()
                    .filter(|(key, _)| key != DELTA_LIST_LENGTH)
                    .map(|(key, pending)| (key, pending.into_held()))
                    .collect(),
            ),
        }
    }

    fn to_delta(&self) -> Delta {
        match self {
            Pending::Value { value, .. } => Delta::Value(value.clone()),
            Pending::Removed(_) => Delta::Removed,
            Pending::Object(entries) => Delta::Object(object_delta(entries)),
        }
    }
}

fn object_delta(entries: &BTreeMap<String, Pending>) -> BTreeMap<String, Delta> {
    entries
        .iter()
        .map(|(key, pending)| (key.clone(), pending.to_delta()))
        .collect()
}

pub struct DeltaManager {
    pub(crate) arena: Arena,
    root: NodeId,
    buffer: BTreeMap<String, Pending>,
    mode: Mode,
}

impl Default for DeltaManager {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl DeltaManager {
    pub fn new(mode: Mode) -> Self {
        let mut arena = Arena::default();
        let root = arena.insert(Node {
            key: String::new(),
            parent: None,
            kind: NodeKind::Root(BTreeMap::new()),
        });
        Self {
            arena,
            root,
            buffer: BTreeMap::new(),
            mode,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of live nodes, pooled list trackers and the root included.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Starts tracking a top-level object under the root.
    pub fn track(
        &mut self,
        key: &str,
        ty: &TypeDescriptor,
        initial: impl Into<Input>,
    ) -> Result<NodeId, TreeError> {
        if is_reserved_key(key) {
            return Err(crate::error::SanitizeError::ReservedKey {
                key: key.to_string(),
            }
            .into());
        }
        if self.tracked(key).is_some() {
            return Err(TreeError::KeyInUse {
                key: key.to_string(),
            });
        }
        let value = sanitize(ty, &initial.into(), self.mode)?;
        let id = self.build(key, ty, Some(self.root), Some(value))?;
        info!("tracking {:?} as {}", key, ty);
        Ok(id)
    }

    /// Stops tracking a top-level object, recording its removal.
    pub fn untrack(&mut self, key: &str) -> Result<(), TreeError> {
        let child = self.tracked(key).ok_or_else(|| TreeError::UntrackedKey {
            key: key.to_string(),
        })?;
        self.remove(child)?;
        if let NodeKind::Root(children) = &mut self.node_mut(self.root)?.kind {
            children.remove(key);
        }
        self.release(child);
        Ok(())
    }

    pub fn tracked(&self, key: &str) -> Option<NodeId> {
        self.child(self.root, key)
    }

    /// The changes accumulated since the last flush. Does not clear them.
    pub fn dump(&self) -> Delta {
        Delta::Object(object_delta(&self.buffer))
    }

    /// Starts a new accumulation window.
    pub fn flush(&mut self) {
        self.buffer.clear();
    }

    /// Returns the accumulated changes and starts a new window.
    pub fn take(&mut self) -> Delta {
        let delta = self.dump();
        self.flush();
        delta
    }

    /// The whole tree as a map keyed by top-level object.
    pub fn snapshot(&self) -> Value {
        self.get(self.root).unwrap_or_else(|err| {
            error!("failed to read the tree: {}", err);
            Value::Map(BTreeMap::new())
        })
    }

    /// Nodes from the top-level object down to `id`, or `None` when `id` is
    /// not attached to the root.
    fn path_to_root(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut cursor = id;
        while cursor != self.root {
            path.push(cursor);
            cursor = self.arena.get(cursor)?.parent?;
        }
        path.reverse();
        Some(path)
    }

    /// The keys below `id` as a replica holding its current value sees them.
    fn shape(&self, id: NodeId) -> Shape {
        let children: Vec<(String, NodeId)> = match self.arena.get(id).map(|node| &node.kind) {
            Some(NodeKind::List(list)) => list
                .live()
                .iter()
                .enumerate()
                .map(|(index, tracker)| (index.to_string(), *tracker))
                .collect(),
            Some(NodeKind::Dictionary(dict)) => dict
                .trackers
                .iter()
                .map(|(key, tracker)| (key.clone(), *tracker))
                .collect(),
            _ => Vec::new(),
        };
        Shape(
            children
                .into_iter()
                .map(|(key, child)| (key, self.shape(child)))
                .collect(),
        )
    }

    pub(crate) fn record(&mut self, id: NodeId, change: Change) {
        let Some(path) = self.path_to_root(id) else {
            return;
        };
        let Some((&target, ancestors)) = path.split_last() else {
            return;
        };
        let held = match change {
            Change::Removed => self.shape(target),
            Change::Changed => Shape::default(),
        };

        let Self { arena, buffer, .. } = self;
        let mut level = buffer;
        for ancestor in ancestors {
            let Some(node) = arena.get(*ancestor) else {
                return;
            };
            level = descend(level, node);
        }

        let Some(node) = arena.get(target) else {
            return;
        };
        match (change, &node.kind) {
            (Change::Removed, _) => {
                let previous = level.remove(&node.key).map(Pending::into_held);
                let held = held.merge(previous.unwrap_or_default());
                level.insert(node.key.clone(), Pending::Removed(held));
            }
            (Change::Changed, NodeKind::Value(slot)) => {
                let held = level
                    .remove(&node.key)
                    .map(Pending::into_held)
                    .unwrap_or_default();
                let value = slot.value.clone().unwrap_or(Value::Null);
                level.insert(node.key.clone(), Pending::Value { value, held });
            }
            (Change::Changed, _) => {
                descend(level, node);
            }
        }
        debug!("{:?} {} ({})", change, node.key, target);
    }
}

/// Turns a buffered leaf or removal into an object level. Keys the replica
/// may still hold there are carried over as removals.
fn as_object(pending: &mut Pending) -> &mut BTreeMap<String, Pending> {
    if !matches!(pending, Pending::Object(_)) {
        let held = std::mem::replace(pending, Pending::Object(BTreeMap::new())).into_held();
        *pending = Pending::Object(held.into_removals());
    }
    match pending {
        Pending::Object(entries) => entries,
        Pending::Value { .. } | Pending::Removed(_) => unreachable!("replaced by an object above"),
    }
}

/// Moves one level down into `node`'s entry and stamps the length if `node`
/// is a list.
fn descend<'a>(
    level: &'a mut BTreeMap<String, Pending>,
    node: &Node,
) -> &'a mut BTreeMap<String, Pending> {
    let next = as_object(
        level
            .entry(node.key.clone())
            .or_insert_with(|| Pending::Object(BTreeMap::new())),
    );
    if let NodeKind::List(list) = &node.kind {
        next.insert(
            DELTA_LIST_LENGTH.to_string(),
            Pending::Value {
                value: Value::Int(i32::try_from(list.len).unwrap_or(i32::MAX)),
                held: Shape::default(),
            },
        );
    }
    next
}
