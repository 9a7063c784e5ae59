use crate::builders::nodes::{NodeTreeOptions, NodeTreeWriter};
use crate::datamodel::{NodeData, PointablePool, TaggedValue};
use crate::error::{Error, Result};
use crate::names::NameCache;
use std::sync::atomic::{AtomicI32, Ordering};

/// Creates node trees for constructors and hands out tree ids.
///
/// Shared by every frame executing against one dynamic context, so ids are
/// unique across concurrent executions.
#[derive(Debug)]
pub struct NodeFactory {
    next_tree_id: AtomicI32,
    node_ids: bool,
    types: bool,
}

impl NodeFactory {
    pub fn new(node_ids: bool, types: bool) -> Self {
        Self {
            next_tree_id: AtomicI32::new(0),
            node_ids,
            types,
        }
    }

    pub fn next_tree_id(&self) -> Result<i32> {
        let id = self.next_tree_id.fetch_add(1, Ordering::Relaxed);
        if id < 0 {
            return Err(Error::system("tree id space exhausted"));
        }
        Ok(id)
    }

    /// Options for one new tree; allocates a tree id when node ids are on.
    pub fn tree_options(&self) -> Result<NodeTreeOptions> {
        Ok(NodeTreeOptions {
            dictionary: true,
            node_ids: self.node_ids,
            types: self.types,
            tree_id: if self.node_ids {
                Some(self.next_tree_id()?)
            } else {
                None
            },
        })
    }

    pub fn create(
        &self,
        node: &NodeData,
        pool: &PointablePool,
        cache: &NameCache,
    ) -> Result<TaggedValue> {
        let options = self.tree_options()?;
        NodeTreeWriter::new(pool.clone(), Some(cache)).build(node, &options)
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new(false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::NodeRef;
    use crate::datamodel::tree::{elem, text};
    use rstest::rstest;

    #[rstest]
    fn tree_ids_are_distinct() {
        let factory = NodeFactory::new(true, false);
        let pool = PointablePool::new();
        let cache = NameCache::new();
        let node = elem("a").child(text("x")).build();
        let first = NodeRef::root(factory.create(&node, &pool, &cache).unwrap()).unwrap();
        let second = NodeRef::root(factory.create(&node, &pool, &cache).unwrap()).unwrap();
        assert_eq!(first.tree_id(), Some(0));
        assert_eq!(second.tree_id(), Some(1));
        assert!(!first.is_same_node(&second));
    }
}
