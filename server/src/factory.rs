use crate::delta::DeltaManager;
use crate::dictionary::DictionarySlot;
use crate::error::TreeError;
use crate::list::ListSlot;
use crate::node::{Node, NodeId, NodeKind, ValueSlot};
use crate::types::TypeDescriptor;
use shared::{Value, DELTA_LIST_LENGTH};

impl DeltaManager {
    /// Creates the node matching `ty`: a value node for scalars and
    /// references, a list or dictionary container otherwise.
    ///
    /// The node is adopted under `parent` when one is given, then assigned
    /// `initial`. Without an initial value the node starts out absent.
    pub(crate) fn build(
        &mut self,
        key: &str,
        ty: &TypeDescriptor,
        parent: Option<NodeId>,
        initial: Option<Value>,
    ) -> Result<NodeId, TreeError> {
        let id = match ty {
            TypeDescriptor::Primitive(_) | TypeDescriptor::GameObject { .. } => {
                self.arena.insert(Node {
                    key: key.to_string(),
                    parent: None,
                    kind: NodeKind::Value(ValueSlot::new(ty.clone())),
                })
            }
            TypeDescriptor::List { element } => {
                let length = self.arena.insert(Node {
                    key: DELTA_LIST_LENGTH.to_string(),
                    parent: None,
                    kind: NodeKind::Value(ValueSlot::new(TypeDescriptor::int())),
                });
                let id = self.arena.insert(Node {
                    key: key.to_string(),
                    parent: None,
                    kind: NodeKind::List(ListSlot::new(element.clone(), length)),
                });
                self.node_mut(length)?.parent = Some(id);
                id
            }
            TypeDescriptor::Dictionary(dictionary) => self.arena.insert(Node {
                key: key.to_string(),
                parent: None,
                kind: NodeKind::Dictionary(DictionarySlot::new(dictionary.clone())),
            }),
        };

        if let Some(parent) = parent {
            self.adopt(parent, id)?;
        }
        if let Some(value) = initial {
            self.assign(id, value)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Mode;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_builds_matching_node_kinds() {
        let mut manager = DeltaManager::new(Mode::Strict);
        let root = manager.root();

        let leaf = manager.build("turn", &TypeDescriptor::int(), Some(root), None).unwrap();
        let list = manager
            .build("log", &TypeDescriptor::list(TypeDescriptor::string()), Some(root), None)
            .unwrap();
        let dict = manager
            .build("tags", &TypeDescriptor::dictionary(TypeDescriptor::int()), Some(root), None)
            .unwrap();

        assert!(matches!(manager.node(leaf).unwrap().kind, NodeKind::Value(_)));
        assert!(matches!(manager.node(list).unwrap().kind, NodeKind::List(_)));
        assert!(matches!(manager.node(dict).unwrap().kind, NodeKind::Dictionary(_)));

        // a list brings its own length node
        let length = manager.child(list, DELTA_LIST_LENGTH).unwrap();
        assert_eq!(manager.parent(length), Some(list));
        assert_eq!(manager.node_count(), 5);
    }

    #[test]
    fn test_absent_until_assigned() {
        let mut manager = DeltaManager::default();
        let root = manager.root();
        let ty = TypeDescriptor::record([("hp", TypeDescriptor::int())]);
        let node = manager.build("unit", &ty, Some(root), None).unwrap();

        assert_eq!(manager.get(node).unwrap(), Value::Null);
        assert!(manager.dump().is_empty());

        let mut fields = BTreeMap::new();
        fields.insert("hp".to_string(), Value::Int(9));
        manager.assign(node, Value::Map(fields)).unwrap();
        assert_eq!(manager.dump().to_json(), json!({"unit": {"hp": 9}}));
    }

    #[test]
    fn test_detached_build_records_nothing() {
        let mut manager = DeltaManager::default();
        let node = manager
            .build("loose", &TypeDescriptor::string(), None, Some(Value::from("x")))
            .unwrap();

        assert_eq!(manager.get(node).unwrap(), Value::from("x"));
        assert_eq!(manager.parent(node), None);
        assert!(manager.dump().is_empty());
    }
}
