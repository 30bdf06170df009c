use std::cell::Cell;

use super::{ListId, TypVal, VarLock};

/// Stable handle of a node inside one List.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
pub struct ListNode {
    pub tv: TypVal,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// External iterator registration; see [`List::add_watcher`].
#[derive(Debug, Clone, Copy)]
struct Watcher {
    id: u32,
    node: Option<NodeId>,
}

/// Doubly linked sequence of values.
///
/// Nodes live in a slot vector so `NodeId`s stay valid while other nodes are
/// inserted or removed. The last looked-up `(index, node)` pair is cached to make
/// near-sequential indexing cheap.
#[derive(Debug, Clone, Default)]
pub struct List {
    nodes: Vec<Option<ListNode>>,
    free_nodes: Vec<u32>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    len: usize,
    idx_cache: Cell<Option<(usize, NodeId)>>,
    watchers: Vec<Watcher>,
    next_watcher: u32,
    pub lock: VarLock,
    pub(crate) refcount: usize,
    pub(crate) copy_id: u32,
    pub(crate) copy_target: Option<ListId>,
}

impl List {
    pub fn new() -> Self {
        Self {
            refcount: 1,
            ..Self::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    #[inline]
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    fn node(&self, node: NodeId) -> &ListNode {
        self.nodes[node.0 as usize].as_ref().expect("stale list node")
    }

    fn node_mut(&mut self, node: NodeId) -> &mut ListNode {
        self.nodes[node.0 as usize].as_mut().expect("stale list node")
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0 as usize), Some(Some(_)))
    }

    #[inline]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).next
    }

    #[inline]
    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).prev
    }

    #[inline]
    pub fn item(&self, node: NodeId) -> &TypVal {
        &self.node(node).tv
    }

    #[inline]
    pub fn item_mut(&mut self, node: NodeId) -> &mut TypVal {
        &mut self.node_mut(node).tv
    }

    /// Node at `idx`; negative indexes count from the end.
    pub fn find(&self, idx: i64) -> Option<NodeId> {
        let len = self.len as i64;
        let idx = if idx < 0 { len + idx } else { idx };
        if idx < 0 || idx >= len {
            return None;
        }
        let idx = idx as usize;

        // Walk from whichever known position is closest: first, last or the cache.
        let (mut at, mut node) = (0usize, self.first?);
        let from_last = self.len - 1 - idx;
        if from_last < idx {
            at = self.len - 1;
            node = self.last?;
        }
        if let Some((cached_idx, cached_node)) = self.idx_cache.get()
            && self.contains_node(cached_node)
            && cached_idx.abs_diff(idx) < at.abs_diff(idx)
        {
            at = cached_idx;
            node = cached_node;
        }
        while at < idx {
            node = self.next(node)?;
            at += 1;
        }
        while at > idx {
            node = self.prev(node)?;
            at -= 1;
        }
        self.idx_cache.set(Some((idx, node)));
        Some(node)
    }

    /// Position of `node` in the list.
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        let mut cur = self.first;
        let mut idx = 0;
        while let Some(n) = cur {
            if n == node {
                return Some(idx);
            }
            idx += 1;
            cur = self.next(n);
        }
        None
    }

    fn alloc_node(&mut self, tv: TypVal) -> NodeId {
        let node = ListNode {
            tv,
            prev: None,
            next: None,
        };
        if let Some(slot) = self.free_nodes.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeId(slot)
        } else {
            self.nodes.push(Some(node));
            NodeId((self.nodes.len() - 1) as u32)
        }
    }

    pub fn append(&mut self, tv: TypVal) -> NodeId {
        self.insert_before(None, tv)
    }

    /// Insert before `before`, or at the end when `before` is `None`.
    pub fn insert_before(&mut self, before: Option<NodeId>, tv: TypVal) -> NodeId {
        let node = self.alloc_node(tv);
        match before {
            None => {
                let prev = self.last;
                self.node_mut(node).prev = prev;
                match prev {
                    Some(p) => self.node_mut(p).next = Some(node),
                    None => self.first = Some(node),
                }
                self.last = Some(node);
            }
            Some(b) => {
                let prev = self.prev(b);
                {
                    let n = self.node_mut(node);
                    n.prev = prev;
                    n.next = Some(b);
                }
                self.node_mut(b).prev = Some(node);
                match prev {
                    Some(p) => self.node_mut(p).next = Some(node),
                    None => self.first = Some(node),
                }
                // Indexes at or after the insertion point shifted.
                self.idx_cache.set(None);
            }
        }
        self.len += 1;
        node
    }

    /// Unlink `node` and return its value. Watchers parked on it move to the next node.
    pub fn remove(&mut self, node: NodeId) -> TypVal {
        let (prev, next) = {
            let n = self.node(node);
            (n.prev, n.next)
        };
        for watcher in &mut self.watchers {
            if watcher.node == Some(node) {
                watcher.node = next;
            }
        }
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.last = prev,
        }
        self.idx_cache.set(None);
        self.len -= 1;
        let removed = self.nodes[node.0 as usize].take().expect("stale list node");
        self.free_nodes.push(node.0);
        removed.tv
    }

    /// Node ids in list order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.first;
        while let Some(n) = cur {
            out.push(n);
            cur = self.next(n);
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypVal> {
        ListIter {
            list: self,
            cur: self.first,
        }
    }

    /// Relink the nodes in the given order. `order` must be a permutation of
    /// [`List::node_ids`].
    pub fn reorder(&mut self, order: &[NodeId]) {
        let mut prev: Option<NodeId> = None;
        for &node in order {
            self.node_mut(node).prev = prev;
            if let Some(p) = prev {
                self.node_mut(p).next = Some(node);
            }
            prev = Some(node);
        }
        if let Some(p) = prev {
            self.node_mut(p).next = None;
        }
        self.first = order.first().copied();
        self.last = order.last().copied();
        self.idx_cache.set(None);
    }

    /// Take every value out, leaving the list empty.
    pub(crate) fn take_items(&mut self) -> Vec<TypVal> {
        let ids = self.node_ids();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.nodes[id.0 as usize].take() {
                out.push(node.tv);
            }
        }
        self.nodes.clear();
        self.free_nodes.clear();
        self.first = None;
        self.last = None;
        self.len = 0;
        self.idx_cache.set(None);
        for watcher in &mut self.watchers {
            watcher.node = None;
        }
        out
    }

    /// Register an external iterator positioned at `start`.
    pub fn add_watcher(&mut self, start: Option<NodeId>) -> u32 {
        let id = self.next_watcher;
        self.next_watcher += 1;
        self.watchers.push(Watcher { id, node: start });
        id
    }

    pub fn watcher_node(&self, id: u32) -> Option<NodeId> {
        self.watchers.iter().find(|w| w.id == id).and_then(|w| w.node)
    }

    pub fn set_watcher_node(&mut self, id: u32, node: Option<NodeId>) {
        if let Some(w) = self.watchers.iter_mut().find(|w| w.id == id) {
            w.node = node;
        }
    }

    pub fn remove_watcher(&mut self, id: u32) {
        self.watchers.retain(|w| w.id != id);
    }

    #[inline]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

struct ListIter<'a> {
    list: &'a List,
    cur: Option<NodeId>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a TypVal;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cur?;
        let n = self.list.node(node);
        self.cur = n.next;
        Some(&n.tv)
    }
}
