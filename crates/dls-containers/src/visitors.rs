//! Generic visitors built on preorder traversal.
//!
//! Collecting addresses, collecting words, decoding and equality are all the
//! same walk with a different side effect, so any container shape gets them
//! for free.

use crate::error::{ConfigError, Result};
use crate::leaf::DynLeaf;
use crate::traversal::{visit_preorder, visit_preorder_mut, Container, Node, NodeMut};
use dls_chip::coord::AnyCoordinate;
use dls_chip::{Address, Word};

// Word-only walks never look at coordinates.
const ROOT: AnyCoordinate = AnyCoordinate::Unique(dls_chip::coord::Unique);

/// Leaves of `config` in traversal order, with their coordinates.
pub fn leaves<C: Container>(coord: C::Coordinate, config: &C) -> Vec<(AnyCoordinate, &dyn DynLeaf)> {
    let mut out = Vec::new();
    visit_preorder(coord.into(), config.as_node(), &mut |c, node| {
        if let Node::Leaf(leaf) = node {
            out.push((c, leaf as &dyn DynLeaf));
        }
    });
    out
}

/// Coordinates of every node (composites included) in traversal order.
pub fn coordinates<C: Container>(coord: C::Coordinate, config: &C) -> Vec<AnyCoordinate> {
    let mut out = Vec::new();
    visit_preorder(coord.into(), config.as_node(), &mut |c, _| out.push(c));
    out
}

/// Register addresses of all leaves, flattened in traversal order.
///
/// # Errors
///
/// Returns an error if a composite hands a leaf a coordinate of the wrong class.
pub fn collect_addresses<C: Container>(coord: C::Coordinate, config: &C) -> Result<Vec<Address>> {
    let mut out = Vec::new();
    let mut failure = None;
    visit_preorder(coord.into(), config.as_node(), &mut |c, node| {
        if failure.is_some() {
            return;
        }
        if let Node::Leaf(leaf) = node {
            match leaf.addresses_at(c) {
                Ok(addresses) => out.extend(addresses),
                Err(e) => failure = Some(e),
            }
        }
    });
    failure.map_or(Ok(out), Err)
}

/// Encoded words of all leaves, flattened in traversal order.
pub fn collect_words<C: Container>(config: &C) -> Vec<Word> {
    let mut out = Vec::new();
    visit_preorder(ROOT, config.as_node(), &mut |_, node| {
        if let Node::Leaf(leaf) = node {
            out.extend(leaf.encode_words());
        }
    });
    out
}

/// Total register words of `config`.
pub fn size_in_words<C: Container>(config: &C) -> usize {
    let mut total = 0;
    visit_preorder(ROOT, config.as_node(), &mut |_, node| {
        if let Node::Leaf(leaf) = node {
            total += leaf.size_in_words();
        }
    });
    total
}

/// Decode `words` into `config`, consuming them leaf by leaf in traversal order.
///
/// Leaves decoded before a failing leaf keep their new value.
///
/// # Errors
///
/// Returns an error if `words` is not exactly [`size_in_words`] long or a
/// leaf rejects its words.
pub fn decode_words<C: Container>(config: &mut C, words: &[Word]) -> Result<()> {
    let expected = size_in_words(config);
    if words.len() != expected {
        return Err(ConfigError::word_count(
            std::any::type_name::<C>(),
            expected,
            words.len(),
        ));
    }

    let mut rest = words;
    let mut failure = None;
    visit_preorder_mut(
        ROOT,
        config.as_node_mut(),
        &mut |_, node| {
            if failure.is_some() {
                return;
            }
            if let NodeMut::Leaf(leaf) = node {
                let (head, tail) = rest.split_at(leaf.size_in_words());
                rest = tail;
                if let Err(e) = leaf.decode_words(head) {
                    failure = Some(e);
                }
            }
        },
    );
    failure.map_or(Ok(()), Err)
}

fn leaf_list<C: Container>(config: &C) -> Vec<&dyn DynLeaf> {
    let mut out: Vec<&dyn DynLeaf> = Vec::new();
    visit_preorder(ROOT, config.as_node(), &mut |_, node| {
        if let Node::Leaf(leaf) = node {
            out.push(leaf);
        }
    });
    out
}

/// Structural equality: same leaves, pairwise equal, in traversal order.
pub fn structurally_equal<C: Container>(a: &C, b: &C) -> bool {
    let (la, lb) = (leaf_list(a), leaf_list(b));
    la.len() == lb.len() && la.iter().zip(&lb).all(|(x, y)| x.dyn_eq(*y))
}
