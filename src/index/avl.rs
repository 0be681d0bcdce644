//! Balanced binary search tree backend.
//!
//! A height-balanced (AVL) tree of owned nodes. Every mutation rebalances on
//! the way back up, so the height stays within ~1.44 log2(n) and all
//! operations are O(log n). `prev` and `next` are the in-order neighbours,
//! `last` is the right-most node.

use std::cmp::{max, Ordering};

use super::{IndexKind, MappingRecord, SectorIndex};
use crate::error::Result;

type Link = Option<Box<Node>>;

struct Node {
    key: u64,
    record: MappingRecord,
    height: u8,
    left: Link,
    right: Link,
}

impl Node {
    fn new(key: u64, record: MappingRecord) -> Box<Self> {
        Box::new(Self {
            key,
            record,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn update(&mut self) {
        self.height = 1 + max(height(&self.left), height(&self.right));
    }

    fn balance(&self) -> i16 {
        i16::from(height(&self.left)) - i16::from(height(&self.right))
    }
}

fn height(link: &Link) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update();
    pivot.right = Some(node);
    pivot.update();
    pivot
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update();
    pivot.left = Some(node);
    pivot.update();
    pivot
}

fn rebalance(mut node: Box<Node>) -> Box<Node> {
    node.update();
    let balance = node.balance();

    if balance > 1 {
        if let Some(left) = node.left.take() {
            node.left = Some(if left.balance() < 0 {
                rotate_left(left)
            } else {
                left
            });
        }
        return rotate_right(node);
    }

    if balance < -1 {
        if let Some(right) = node.right.take() {
            node.right = Some(if right.balance() > 0 {
                rotate_right(right)
            } else {
                right
            });
        }
        return rotate_left(node);
    }

    node
}

fn insert(link: Link, key: u64, record: MappingRecord, added: &mut bool) -> Box<Node> {
    let Some(mut node) = link else {
        *added = true;
        return Node::new(key, record);
    };

    match key.cmp(&node.key) {
        Ordering::Less => node.left = Some(insert(node.left.take(), key, record, added)),
        Ordering::Greater => node.right = Some(insert(node.right.take(), key, record, added)),
        Ordering::Equal => {
            node.record = record;
            return node;
        }
    }
    rebalance(node)
}

/// Detaches the minimum node of a subtree. Returns the rebalanced rest and the
/// detached node with both children cleared.
fn take_min(mut node: Box<Node>) -> (Link, Box<Node>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

fn remove(link: Link, key: u64, removed: &mut bool) -> Link {
    let mut node = link?;

    match key.cmp(&node.key) {
        Ordering::Less => node.left = remove(node.left.take(), key, removed),
        Ordering::Greater => node.right = remove(node.right.take(), key, removed),
        Ordering::Equal => {
            *removed = true;
            return match (node.left.take(), node.right.take()) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    let (rest, mut successor) = take_min(right);
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(rebalance(successor))
                }
            };
        }
    }
    Some(rebalance(node))
}

#[derive(Default)]
pub struct AvlTree {
    root: Link,
    len: usize,
}

impl AvlTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the tree; zero when empty.
    pub fn height(&self) -> u8 {
        height(&self.root)
    }
}

impl SectorIndex for AvlTree {
    fn kind(&self) -> IndexKind {
        IndexKind::BalancedTree
    }

    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()> {
        let mut added = false;
        self.root = Some(insert(self.root.take(), key, record, &mut added));
        if added {
            self.len += 1;
        }
        Ok(())
    }

    fn lookup(&self, key: u64) -> Option<MappingRecord> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(node.record),
            };
        }
        None
    }

    fn remove(&mut self, key: u64) {
        let mut removed = false;
        self.root = remove(self.root.take(), key, &mut removed);
        if removed {
            self.len -= 1;
        }
    }

    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)> {
        let mut best = None;
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if node.key < key {
                best = Some(node);
                current = node.right.as_deref();
            } else {
                current = node.left.as_deref();
            }
        }
        best.map(|node| (node.key, node.record))
    }

    fn next(&self, key: u64) -> Option<(u64, MappingRecord)> {
        let mut best = None;
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if node.key > key {
                best = Some(node);
                current = node.left.as_deref();
            } else {
                current = node.right.as_deref();
            }
        }
        best.map(|node| (node.key, node.record))
    }

    fn last(&self) -> Option<(u64, MappingRecord)> {
        let mut current = self.root.as_deref()?;
        while let Some(right) = current.right.as_deref() {
            current = right;
        }
        Some((current.key, current.record))
    }

    fn len(&self) -> usize {
        self.len
    }
}
