//! Dense node ids for recorded activity instances.
//!
//! Instance ids are interned once, in table order, so node id order equals
//! table order and the simulation graph can index plain vectors.

use rustc_hash::FxHashMap;

/// Interned instance id.
pub type NodeId = u32;

/// Two-way mapping between instance id strings and node ids.
#[derive(Debug, Clone, Default)]
pub struct InstanceInterner {
    ids: FxHashMap<String, NodeId>,
    names: Vec<String>,
}

impl InstanceInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            names: Vec::with_capacity(capacity),
        }
    }

    /// Node id of `instance_id`, assigning the next free id on first sight.
    pub fn intern(&mut self, instance_id: &str) -> NodeId {
        if let Some(&node) = self.ids.get(instance_id) {
            return node;
        }
        let node = self.names.len() as NodeId;
        self.ids.insert(instance_id.to_string(), node);
        self.names.push(instance_id.to_string());
        node
    }

    #[inline]
    pub fn get(&self, instance_id: &str) -> Option<NodeId> {
        self.ids.get(instance_id).copied()
    }

    #[inline]
    pub fn resolve(&self, node: NodeId) -> Option<&str> {
        self.names.get(node as usize).map(String::as_str)
    }

    /// Every (node, instance id) pair in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i as NodeId, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for InstanceInterner {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut interner = Self::with_capacity(iter.size_hint().0);
        for instance_id in iter {
            interner.intern(instance_id);
        }
        interner
    }
}
