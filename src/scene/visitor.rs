//! Read-only traversals over a node hierarchy

use super::{same_node, NodeRef};
use crate::bounding_box::BoundingBox;
use crate::managers::MatrixStack;
use std::collections::HashMap;
use std::fmt;

/// Strategy run over a hierarchy by [`accept`]
pub trait NodeVisitor {
    /// Called on a node before its children
    fn visit(&mut self, node: &NodeRef);

    /// Called on a node after its children
    fn leave(&mut self, _node: &NodeRef) {}
}

/// Pre-order traversal: `visit(node)`, the children in order, `leave(node)`.
pub fn accept(node: &NodeRef, visitor: &mut dyn NodeVisitor) {
    visitor.visit(node);
    // release the borrow before recursing so visitors may borrow children
    let children = node.borrow().children().map(<[NodeRef]>::to_vec);
    for child in children.iter().flatten() {
        accept(child, visitor);
    }
    visitor.leave(node);
}

/// `fmt::Write` sink that logs each complete line at `info`
#[derive(Debug, Default)]
pub struct LogSink {
    line: String,
}

impl fmt::Write for LogSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.line.push_str(s);
        while let Some(end) = self.line.find('\n') {
            log::info!("{}", &self.line[..end]);
            self.line.drain(..=end);
        }
        Ok(())
    }
}

/// Writes one indented line per node: type, picking id and name
pub struct PrintVisitor<W: fmt::Write> {
    out: W,
    depth: usize,
    result: fmt::Result,
}

impl<W: fmt::Write> PrintVisitor<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            depth: 0,
            result: Ok(()),
        }
    }

    /// The sink, or the first write error
    pub fn finish(self) -> Result<W, fmt::Error> {
        self.result.map(|_| self.out)
    }
}

impl PrintVisitor<LogSink> {
    pub fn to_log() -> Self {
        Self::new(LogSink::default())
    }
}

impl<W: fmt::Write> NodeVisitor for PrintVisitor<W> {
    fn visit(&mut self, node: &NodeRef) {
        let node = node.borrow();
        if self.result.is_ok() {
            self.result = writeln!(
                self.out,
                "{:indent$}{} #{} '{}'{}",
                "",
                node.type_name(),
                node.object_id(),
                node.name(),
                if node.is_visible() { "" } else { " (hidden)" },
                indent = self.depth * 2
            );
        }
        self.depth += 1;
    }

    fn leave(&mut self, _node: &NodeRef) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Builds a picking-id to node map.
///
/// Id 0 is never mapped. A composite with a shared id is mapped, its
/// descendants are not. Two different nodes with one id count as a
/// collision; the first one keeps the id.
#[derive(Default)]
pub struct MapVisitor {
    map: HashMap<u32, NodeRef>,
    shared_depth: usize,
    collisions: usize,
}

impl MapVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every id under `root`
    pub fn build(root: &NodeRef) -> Self {
        let mut visitor = Self::new();
        accept(root, &mut visitor);
        visitor
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Move the map out; later calls return an empty map
    pub fn take_map(&mut self) -> HashMap<u32, NodeRef> {
        std::mem::take(&mut self.map)
    }

    pub fn map(&self) -> &HashMap<u32, NodeRef> {
        &self.map
    }

    pub fn map_copy(&self) -> HashMap<u32, NodeRef> {
        self.map.clone()
    }
}

impl NodeVisitor for MapVisitor {
    fn visit(&mut self, node: &NodeRef) {
        if self.shared_depth > 0 {
            self.shared_depth += 1;
            return;
        }
        let (id, shared) = {
            let n = node.borrow();
            (n.object_id(), n.single_object_id())
        };
        if shared {
            self.shared_depth = 1;
        }
        if id == 0 {
            return;
        }
        match self.map.get(&id) {
            Some(existing) if !same_node(existing, node) => {
                self.collisions += 1;
                log::warn!(
                    "MapVisitor: id {} used by both '{}' and '{}'",
                    id,
                    existing.borrow().name(),
                    node.borrow().name()
                );
            }
            Some(_) => {}
            None => {
                self.map.insert(id, node.clone());
            }
        }
    }

    fn leave(&mut self, _node: &NodeRef) {
        self.shared_depth = self.shared_depth.saturating_sub(1);
    }
}

/// Accumulates the world-space bounding box of a hierarchy without drawing.
///
/// Transforms are composed on a private matrix stack exactly as the draw
/// traversal does. Invisible nodes and their subtrees are skipped.
pub struct ExtentVisitor {
    stack: MatrixStack,
    pushed: Vec<bool>,
    hidden_depth: usize,
    bounds: BoundingBox,
}

impl ExtentVisitor {
    pub fn new() -> Self {
        Self {
            stack: MatrixStack::new("extent", usize::MAX),
            pushed: Vec::new(),
            hidden_depth: 0,
            bounds: BoundingBox::new(),
        }
    }

    /// Bounding box of everything under `root`
    pub fn compute(root: &NodeRef) -> BoundingBox {
        let mut visitor = Self::new();
        accept(root, &mut visitor);
        visitor.bounding_box()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }
}

impl Default for ExtentVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeVisitor for ExtentVisitor {
    fn visit(&mut self, node: &NodeRef) {
        if self.hidden_depth > 0 {
            self.hidden_depth += 1;
            return;
        }
        let node = node.borrow();
        if !node.is_visible() {
            self.hidden_depth = 1;
            return;
        }

        let transform = node.transform().filter(|t| t.use_transform);
        let pushed = match transform {
            Some(transform) if self.stack.push().is_ok() => {
                transform.apply_to(&mut self.stack);
                true
            }
            _ => false,
        };
        self.pushed.push(pushed);

        let extent = node.local_extent();
        if !extent.is_empty() {
            self.bounds.add_box(&extent.transformed(&self.stack.current()));
        }
    }

    fn leave(&mut self, _node: &NodeRef) {
        if self.hidden_depth > 0 {
            self.hidden_depth -= 1;
            return;
        }
        if self.pushed.pop() == Some(true) {
            // balanced with the push in visit
            let _ = self.stack.pop();
        }
    }
}
