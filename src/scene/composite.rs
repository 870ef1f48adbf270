//! Composite node: an ordered group of shared children

use super::{same_node, Node, NodeBase, NodeRef, Transform};
use crate::context::RenderContext;
use crate::error::SceneResult;

/// Draws its children in insertion order inside its own transform.
///
/// Children are shared handles; the same child may be added to several
/// composites, or twice to the same one, and is drawn once per occurrence.
pub struct CompositeNode {
    base: NodeBase,
    transform: Transform,
    children: Vec<NodeRef>,
    single_object_id: bool,
}

impl CompositeNode {
    pub fn new() -> Self {
        Self::with_transform(Transform::default())
    }

    pub fn with_transform(transform: Transform) -> Self {
        Self {
            base: NodeBase::new(),
            transform,
            children: Vec::new(),
            single_object_id: false,
        }
    }

    pub fn named(name: &str) -> Self {
        let mut node = Self::new();
        node.base.set_name(name);
        node
    }

    pub fn add(&mut self, child: NodeRef) {
        self.children.push(child);
    }

    /// Remove the first occurrence of `child`. Returns false if it is not a
    /// child of this node.
    pub fn remove(&mut self, child: &NodeRef) -> bool {
        match self.children.iter().position(|c| same_node(c, child)) {
            Some(index) => {
                self.children.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn at(&self, index: usize) -> Option<&NodeRef> {
        self.children.get(index)
    }

    pub fn count(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains(&self, child: &NodeRef) -> bool {
        self.children.iter().any(|c| same_node(c, child))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeRef> {
        self.children.iter()
    }

    pub fn set_single_object_id(&mut self, enabled: bool) {
        self.single_object_id = enabled;
    }
}

impl Default for CompositeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a CompositeNode {
    type Item = &'a NodeRef;
    type IntoIter = std::slice::Iter<'a, NodeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

impl Node for CompositeNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn transform(&self) -> Option<&Transform> {
        Some(&self.transform)
    }

    fn transform_mut(&mut self) -> Option<&mut Transform> {
        Some(&mut self.transform)
    }

    fn children(&self) -> Option<&[NodeRef]> {
        Some(&self.children)
    }

    fn single_object_id(&self) -> bool {
        self.single_object_id
    }

    fn is_drawable(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "CompositeNode"
    }

    fn do_draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        for child in &self.children {
            child.borrow_mut().draw(ctx)?;
        }
        Ok(())
    }
}
