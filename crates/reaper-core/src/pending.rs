//! Pending - reaper の待ち行列
//!
//! 構造共有する単方向リスト。`push` は既存ノードを共有したまま新しい先頭を
//! 作るだけなので、行列の長さに関係なく O(1)。
//! [`AtomicSwap::update`](crate::AtomicSwap::update) の中で何度呼ばれても
//! 副作用がない（純粋関数の契約を満たす）。

use std::fmt;
use std::sync::Arc;

/// Persistent LIFO list of queued items.
///
/// Cloning a `Pending` or pushing onto it never copies existing entries.
pub struct Pending<H> {
    head: Option<Arc<Node<H>>>,
    len: usize,
}

struct Node<H> {
    item: H,
    next: Option<Arc<Node<H>>>,
}

impl<H> Pending<H> {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// A new list with `item` in front of this one.
    pub fn push(&self, item: H) -> Self {
        Self {
            head: Some(Arc::new(Node {
                item,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Newest first.
    pub fn iter(&self) -> Iter<'_, H> {
        Iter {
            next: self.head.as_deref(),
        }
    }
}

impl<H: Clone> Pending<H> {
    /// Entries in the order they were pushed (oldest first).
    pub fn to_vec_in_push_order(&self) -> Vec<H> {
        let mut items: Vec<H> = self.iter().cloned().collect();
        items.reverse();
        items
    }
}

impl<H> Clone for Pending<H> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<H> Default for Pending<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: fmt::Debug> fmt::Debug for Pending<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// Unlink iteratively so a long list cannot overflow the stack on drop.
impl<H> Drop for Node<H> {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                // still shared by another snapshot
                Err(_) => break,
            }
        }
    }
}

pub struct Iter<'a, H> {
    next: Option<&'a Node<H>>,
}

impl<'a, H> Iterator for Iter<'a, H> {
    type Item = &'a H;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_list_is_empty() {
        let list: Pending<u32> = Pending::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn push_leaves_original_untouched() {
        let a = Pending::new().push(1);
        let b = a.push(2);

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn push_order_is_recoverable() {
        let list = Pending::new().push("a").push("b").push("c");
        assert_eq!(list.to_vec_in_push_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn dropping_a_long_list_does_not_overflow() {
        let mut list = Pending::new();
        for i in 0..200_000u32 {
            list = list.push(i);
        }
        assert_eq!(list.len(), 200_000);
        drop(list);
    }

    #[test]
    fn shared_tail_survives_drop_of_newer_list() {
        let base = Pending::new().push(1).push(2);
        let newer = base.push(3);
        drop(newer);
        assert_eq!(base.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }
}
