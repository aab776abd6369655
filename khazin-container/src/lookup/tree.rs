//! Persistent AVL tree.
//!
//! Insertion copies the path from the root to the new leaf and shares every
//! other node, so a tree handle is an immutable snapshot: inserting into it
//! yields a new tree while readers of the old one keep seeing the old
//! contents.

use std::cmp::Ordering;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    left: Link<K, V>,
    right: Link<K, V>,
}

pub(crate) struct AvlTree<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for AvlTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K: Ord + Clone, V: Clone> AvlTree<K, V> {
    pub(crate) fn new() -> Self {
        Self { root: None, len: 0 }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        let mut cursor = self.root.as_deref();
        while let Some(node) = cursor {
            cursor = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    /// New snapshot containing `key`, or `None` if `key` is already present.
    pub(crate) fn insert(&self, key: K, value: V) -> Option<Self> {
        let root = insert_at(&self.root, key, value)?;
        Some(Self {
            root: Some(root),
            len: self.len + 1,
        })
    }

    /// In-order traversal.
    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.descend(self.root.as_deref());
        iter
    }

    #[cfg(test)]
    fn height(&self) -> u8 {
        height(&self.root)
    }
}

pub(crate) struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn descend(&mut self, mut cursor: Option<&'a Node<K, V>>) {
        while let Some(node) = cursor {
            self.stack.push(node);
            cursor = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.descend(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}

#[inline]
fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = 1 + height(&left).max(height(&right));
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

fn insert_at<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: K, value: V) -> Link<K, V> {
    let Some(node) = link else {
        return Some(make(key, value, None, None));
    };

    match key.cmp(&node.key) {
        Ordering::Equal => None,
        Ordering::Less => {
            let left = insert_at(&node.left, key, value)?;
            Some(balance(
                node.key.clone(),
                node.value.clone(),
                Some(left),
                node.right.clone(),
            ))
        }
        Ordering::Greater => {
            let right = insert_at(&node.right, key, value)?;
            Some(balance(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                Some(right),
            ))
        }
    }
}

fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let (hl, hr) = (height(&left), height(&right));

    if hl > hr + 1 {
        let Some(l) = left.as_deref() else {
            unreachable!("left subtree taller than right must exist")
        };
        if height(&l.left) >= height(&l.right) {
            return make(
                l.key.clone(),
                l.value.clone(),
                l.left.clone(),
                Some(make(key, value, l.right.clone(), right)),
            );
        }
        let Some(lr) = l.right.as_deref() else {
            unreachable!("left-right case requires a right grandchild")
        };
        return make(
            lr.key.clone(),
            lr.value.clone(),
            Some(make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone())),
            Some(make(key, value, lr.right.clone(), right)),
        );
    }

    if hr > hl + 1 {
        let Some(r) = right.as_deref() else {
            unreachable!("right subtree taller than left must exist")
        };
        if height(&r.right) >= height(&r.left) {
            return make(
                r.key.clone(),
                r.value.clone(),
                Some(make(key, value, left, r.left.clone())),
                r.right.clone(),
            );
        }
        let Some(rl) = r.left.as_deref() else {
            unreachable!("right-left case requires a left grandchild")
        };
        return make(
            rl.key.clone(),
            rl.value.clone(),
            Some(make(key, value, left, rl.left.clone())),
            Some(make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone())),
        );
    }

    make(key, value, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(keys: impl IntoIterator<Item = u32>) -> AvlTree<u32, String> {
        let mut tree = AvlTree::new();
        for k in keys {
            tree = tree.insert(k, format!("v{k}")).unwrap();
        }
        tree
    }

    #[test]
    fn get_after_insert() {
        let tree = filled([5, 3, 8, 1, 4]);
        assert_eq!(tree.get(&4).map(String::as_str), Some("v4"));
        assert_eq!(tree.get(&7), None);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let tree = filled([1, 2]);
        assert!(tree.insert(2, "other".into()).is_none());
        assert_eq!(tree.get(&2).map(String::as_str), Some("v2"));
    }

    #[test]
    fn old_snapshot_is_untouched() {
        let before = filled(0..10);
        let after = before.insert(42, "v42".into()).unwrap();
        assert_eq!(before.get(&42), None);
        assert_eq!(before.len(), 10);
        assert_eq!(after.get(&42).map(String::as_str), Some("v42"));
        assert_eq!(after.get(&3).map(String::as_str), Some("v3"));
    }

    #[test]
    fn stays_balanced_under_sorted_inserts() {
        let ascending = filled(0..1024);
        assert!(ascending.height() <= 12);
        let descending = filled((0..1024).rev());
        assert!(descending.height() <= 12);
    }

    #[test]
    fn zig_zag_inserts_rebalance() {
        let tree = filled([10, 5, 7, 20, 15, 17]);
        assert!(tree.height() <= 3);
        let keys: Vec<u32> = tree.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![5, 7, 10, 15, 17, 20]);
    }

    #[test]
    fn iteration_is_sorted() {
        let tree = filled([9, 2, 7, 4, 1]);
        let keys: Vec<u32> = tree.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 4, 7, 9]);
    }
}
