//! Preorder traversal over heterogeneous containers.
//!
//! Nodes are a closed set of two variants: a [`Node::Leaf`] that can be
//! encoded, and a [`Node::Composite`] that only has children. Visiting a
//! composite calls the visitor on the composite first, then recurses into
//! each child in coordinate-enumeration order, depth first.

use crate::leaf::{DynLeaf, LeafConfig};
use dls_chip::coord::{AnyCoordinate, Coordinate};
use std::fmt::Debug;

/// Shared reference to a tree node.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Encodable register block.
    Leaf(&'a (dyn DynLeaf + 'static)),
    /// Aggregate of further nodes.
    Composite(&'a (dyn Composite + 'static)),
}

/// Mutable reference to a tree node.
#[derive(Debug)]
pub enum NodeMut<'a> {
    /// Encodable register block.
    Leaf(&'a mut (dyn DynLeaf + 'static)),
    /// Aggregate of further nodes.
    Composite(&'a mut (dyn Composite + 'static)),
}

impl NodeMut<'_> {
    /// Shorter-lived copy of this reference.
    pub fn reborrow(&mut self) -> NodeMut<'_> {
        match self {
            Self::Leaf(leaf) => NodeMut::Leaf(&mut **leaf),
            Self::Composite(composite) => NodeMut::Composite(&mut **composite),
        }
    }
}

/// A container that owns child nodes but has no registers of its own.
pub trait Composite: Debug {
    /// Call `f` for each child, in canonical order.
    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(AnyCoordinate, Node<'a>));

    /// Call `f` for each child mutably, in canonical order.
    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>));
}

/// Anything that can be the root of a traversal.
pub trait Container: Debug + 'static {
    /// Coordinate class of the root.
    type Coordinate: Coordinate + Into<AnyCoordinate>;

    /// View as a tree node.
    fn as_node(&self) -> Node<'_>;

    /// View as a mutable tree node.
    fn as_node_mut(&mut self) -> NodeMut<'_>;
}

impl<T: LeafConfig> Container for T {
    type Coordinate = T::Coordinate;

    fn as_node(&self) -> Node<'_> {
        Node::Leaf(self)
    }

    fn as_node_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Leaf(self)
    }
}

/// Visit `node` and all its descendants in preorder.
pub fn visit_preorder<'a>(
    coord: AnyCoordinate,
    node: Node<'a>,
    visitor: &mut dyn FnMut(AnyCoordinate, Node<'a>),
) {
    visitor(coord, node);
    if let Node::Composite(composite) = node {
        composite.for_each_child(&mut |child_coord, child| {
            visit_preorder(child_coord, child, &mut *visitor);
        });
    }
}

/// Visit `node` and all its descendants in preorder, mutably.
pub fn visit_preorder_mut(
    coord: AnyCoordinate,
    mut node: NodeMut<'_>,
    visitor: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>),
) {
    visitor(coord, node.reborrow());
    if let NodeMut::Composite(composite) = node {
        composite.for_each_child_mut(&mut |child_coord, child| {
            visit_preorder_mut(child_coord, child, &mut *visitor);
        });
    }
}

/// Implement [`Container`] for a composite rooted at `$coord`.
macro_rules! composite_container {
    ($ty:ty, $coord:ty) => {
        impl $crate::traversal::Container for $ty {
            type Coordinate = $coord;

            fn as_node(&self) -> $crate::traversal::Node<'_> {
                $crate::traversal::Node::Composite(self)
            }

            fn as_node_mut(&mut self) -> $crate::traversal::NodeMut<'_> {
                $crate::traversal::NodeMut::Composite(self)
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::visitors::structurally_equal(self, other)
            }
        }
    };
}

pub(crate) use composite_container;
