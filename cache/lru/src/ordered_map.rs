//! Hash map with a doubly-linked traversal order.
//!
//! # Design
//!
//! ```text
//! +------------------+
//! |  HashTable<u32>  |  <- key hash -> node handle
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |   Vec<Slot>      |  <- arena of nodes, free list through vacant slots
//! +------------------+
//!   head <-> ... <-> tail    (prev/next handles stored in each node)
//! ```
//!
//! The head is the most recently used node and the tail the least
//! recently used. The index and the order list are only ever changed
//! together (`attach_front`, `append_quiet`, `detach`), so every key in
//! the index has exactly one node in the list.
//!
//! Structural changes (a node added or removed) are reported to a
//! [`MapObserver`] in line with the mutating call. Reordering on access is
//! not a structural change and is never reported.

use std::fmt;
use std::iter::FusedIterator;

use hashbrown::HashTable;

use crate::key::{KeyStrategy, NaturalKeys};

/// Sentinel handle for "no node".
const NIL: u32 = u32::MAX;

/// Initial capacity used by [`OrderedMap::new`].
const DEFAULT_CAPACITY: usize = 16;

/// Traversal order maintained by the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Nodes stay where they were inserted.
    #[default]
    Insertion,
    /// Reads and equal-value writes move a node to the head.
    Access,
}

/// Receives structural notifications from an [`OrderedMap`].
pub trait MapObserver<K, V> {
    /// Error returned from [`on_remove`](Self::on_remove).
    type Error;

    /// A node has been linked into the map.
    fn on_add(&mut self, key: &K, value: &V);

    /// A node has been unlinked from the map. The value is dropped after
    /// this returns.
    fn on_remove(&mut self, key: &K, value: &V) -> Result<(), Self::Error>;
}

/// The no-op observer.
impl<K, V> MapObserver<K, V> for () {
    type Error = std::convert::Infallible;

    #[inline]
    fn on_add(&mut self, _key: &K, _value: &V) {}

    #[inline]
    fn on_remove(&mut self, _key: &K, _value: &V) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Decision returned by a removal predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Remove the node that was just inspected.
    pub remove: bool,
    /// End the sweep after this node.
    pub stop: bool,
}

impl Verdict {
    /// Remove the node and keep sweeping.
    pub const REMOVE: Self = Self {
        remove: true,
        stop: false,
    };

    /// Keep the node and keep sweeping.
    pub const KEEP: Self = Self {
        remove: false,
        stop: false,
    };

    /// Keep the node and end the sweep.
    pub const STOP: Self = Self {
        remove: false,
        stop: true,
    };
}

/// What [`OrderedMap::put`] did.
#[derive(Debug, PartialEq, Eq)]
pub enum PutOutcome<'a, V> {
    /// The key was absent and a node was added.
    Inserted,
    /// The key held an equal value; only its position was refreshed. Holds
    /// the stored value, which stays in place.
    Refreshed(&'a V),
    /// The key held a different value, which was removed and is returned.
    Replaced(V),
}

struct Node<K, V> {
    key: K,
    value: V,
    hash: u64,
    prev: u32,
    next: u32,
}

enum Slot<K, V> {
    Occupied(Node<K, V>),
    Vacant { next_free: u32 },
}

/// Hash map whose entries also form a doubly-linked order.
pub struct OrderedMap<K, V, Q = NaturalKeys, O = ()> {
    slots: Vec<Slot<K, V>>,
    free_head: u32,
    index: HashTable<u32>,
    head: u32,
    tail: u32,
    order: TraversalOrder,
    strategy: Q,
    observer: O,
}

impl<K, V> OrderedMap<K, V>
where
    NaturalKeys: KeyStrategy<K>,
{
    /// Create an empty map with natural key equality and no observer.
    pub fn new(order: TraversalOrder) -> Self {
        Self::with_parts(order, NaturalKeys::new(), (), DEFAULT_CAPACITY)
    }
}

impl<K, V, Q, O> OrderedMap<K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
    /// Create an empty map from its parts.
    pub fn with_parts(order: TraversalOrder, strategy: Q, observer: O, capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: NIL,
            index: HashTable::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            order,
            strategy,
            observer,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The traversal order this map maintains.
    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    /// The key strategy.
    pub fn key_strategy(&self) -> &Q {
        &self.strategy
    }

    /// The observer receiving structural notifications.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Look up a key, moving it to the head in access-order mode.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let id = self.find(key)?;
        self.touch(id);
        Some(&self.node(id).value)
    }

    /// Look up a key without changing the order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.find(key).map(|id| &self.node(id).value)
    }

    /// Returns true if the key is present. Does not change the order.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// The most recently used entry.
    pub fn front(&self) -> Option<(&K, &V)> {
        self.entry_at(self.head)
    }

    /// The least recently used entry.
    pub fn back(&self) -> Option<(&K, &V)> {
        self.entry_at(self.tail)
    }

    /// Iterate from the head (most recently used) to the tail.
    pub fn iter(&self) -> Iter<'_, K, V, Q, O> {
        Iter {
            map: self,
            front: self.head,
            back: self.tail,
            remaining: self.len(),
        }
    }

    /// Insert or replace a value.
    ///
    /// An equal value only refreshes the node's position, fires no
    /// notification and returns the stored value. A different value removes the old node (notifying the
    /// observer) before the new node is added at the head. If the removal
    /// notification fails the new value is not inserted.
    pub fn put(&mut self, key: K, value: V) -> Result<PutOutcome<'_, V>, O::Error>
    where
        V: PartialEq,
    {
        let hash = self.strategy.hash_key(&key);

        let mut replaced = None;
        if let Some(id) = self.find_hashed(hash, &key) {
            if self.node(id).value == value {
                self.touch(id);
                return Ok(PutOutcome::Refreshed(&self.node(id).value));
            }
            let old = self.detach(id);
            self.observer.on_remove(&old.key, &old.value)?;
            replaced = Some(old.value);
        }

        let id = self.attach_front(key, value, hash);
        self.notify_add(id);

        Ok(match replaced {
            Some(old) => PutOutcome::Replaced(old),
            None => PutOutcome::Inserted,
        })
    }

    /// Remove a key unconditionally, returning its value.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>, O::Error> {
        let Some(id) = self.find(key) else {
            return Ok(None);
        };
        let node = self.detach(id);
        self.observer.on_remove(&node.key, &node.value)?;
        Ok(Some(node.value))
    }

    /// Remove a key if the predicate allows it.
    ///
    /// The predicate's `stop` flag has no meaning for a single key and is
    /// ignored. Returns true if the node was removed.
    pub fn remove_if<F>(&mut self, key: &K, mut predicate: F) -> Result<bool, O::Error>
    where
        F: FnMut(&K, &V, &O) -> Verdict,
    {
        let Some(id) = self.find(key) else {
            return Ok(false);
        };

        let node = self.node(id);
        if !predicate(&node.key, &node.value, &self.observer).remove {
            return Ok(false);
        }

        let node = self.detach(id);
        self.observer.on_remove(&node.key, &node.value)?;
        Ok(true)
    }

    /// Sweep from the tail (least recently used) towards the head.
    ///
    /// Each node is offered to the predicate. Nodes it marks for removal are
    /// removed; nodes it keeps are stepped over. The sweep ends the first
    /// time the predicate sets `stop`, whether or not that node was removed,
    /// or when it runs off the head. Returns the number of nodes removed.
    pub fn clear_if<F>(&mut self, predicate: F) -> Result<usize, O::Error>
    where
        F: FnMut(&K, &V, &O) -> Verdict,
    {
        self.sweep(NIL, predicate)
    }

    /// Like [`clear_if`](Self::clear_if), but the head node is never
    /// offered to the predicate and always survives the sweep.
    pub fn clear_if_except_head<F>(&mut self, predicate: F) -> Result<usize, O::Error>
    where
        F: FnMut(&K, &V, &O) -> Verdict,
    {
        let head = self.head;
        self.sweep(head, predicate)
    }

    /// Remove every node, tail to head.
    pub fn clear(&mut self) -> Result<usize, O::Error> {
        self.clear_if(|_, _, _| Verdict::REMOVE)
    }

    /// Link a node at the tail without notifying the observer.
    ///
    /// Used to rebuild a map from a persisted head-to-tail sequence. Returns
    /// false, leaving the map unchanged, if the key is already present.
    pub fn append_quiet(&mut self, key: K, value: V) -> bool {
        let hash = self.strategy.hash_key(&key);
        if self.find_hashed(hash, &key).is_some() {
            return false;
        }

        let id = self.alloc(Node {
            key,
            value,
            hash,
            prev: self.tail,
            next: NIL,
        });
        match self.tail {
            NIL => self.head = id,
            tail => self.node_mut(tail).next = id,
        }
        self.tail = id;
        self.insert_index(hash, id);
        true
    }

    // -- internals ---------------------------------------------------------

    // Walk from the tail, stopping before `end` (NIL walks the whole list).
    // Only nodes behind the cursor are removed, so `end` stays linked.
    fn sweep<F>(&mut self, end: u32, mut predicate: F) -> Result<usize, O::Error>
    where
        F: FnMut(&K, &V, &O) -> Verdict,
    {
        let mut removed = 0;
        let mut cursor = self.tail;

        while cursor != end {
            let node = self.node(cursor);
            let prev = node.prev;
            let verdict = predicate(&node.key, &node.value, &self.observer);

            if verdict.remove {
                let node = self.detach(cursor);
                removed += 1;
                self.observer.on_remove(&node.key, &node.value)?;
            }

            if verdict.stop {
                break;
            }

            cursor = prev;
        }

        Ok(removed)
    }

    fn find(&self, key: &K) -> Option<u32> {
        self.find_hashed(self.strategy.hash_key(key), key)
    }

    fn find_hashed(&self, hash: u64, key: &K) -> Option<u32> {
        let slots = &self.slots;
        let strategy = &self.strategy;
        self.index
            .find(hash, |&id| match &slots[id as usize] {
                Slot::Occupied(node) => strategy.keys_equal(&node.key, key),
                Slot::Vacant { .. } => false,
            })
            .copied()
    }

    fn node(&self, id: u32) -> &Node<K, V> {
        match &self.slots[id as usize] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("linked handle {id} refers to a vacant slot"),
        }
    }

    fn node_mut(&mut self, id: u32) -> &mut Node<K, V> {
        match &mut self.slots[id as usize] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("linked handle {id} refers to a vacant slot"),
        }
    }

    fn notify_add(&mut self, id: u32) {
        if let Slot::Occupied(node) = &self.slots[id as usize] {
            self.observer.on_add(&node.key, &node.value);
        }
    }

    fn entry_at(&self, id: u32) -> Option<(&K, &V)> {
        if id == NIL {
            return None;
        }
        let node = self.node(id);
        Some((&node.key, &node.value))
    }

    /// Move a node to the head if this map keeps access order.
    fn touch(&mut self, id: u32) {
        if self.order == TraversalOrder::Access && self.head != id {
            self.unlink(id);
            self.link_front(id);
        }
    }

    /// Allocate a slot for a node, reusing a vacant one when possible.
    fn alloc(&mut self, node: Node<K, V>) -> u32 {
        if self.free_head != NIL {
            let id = self.free_head;
            let slot = &mut self.slots[id as usize];
            if let Slot::Vacant { next_free } = slot {
                self.free_head = *next_free;
            }
            *slot = Slot::Occupied(node);
            return id;
        }

        let id = self.slots.len();
        assert!(id < NIL as usize, "ordered map exceeds maximum node count");
        self.slots.push(Slot::Occupied(node));
        id as u32
    }

    fn insert_index(&mut self, hash: u64, id: u32) {
        let slots = &self.slots;
        self.index.insert_unique(hash, id, |&id| match &slots[id as usize] {
            Slot::Occupied(node) => node.hash,
            Slot::Vacant { .. } => 0,
        });
    }

    /// Add a node at the head of the order and to the index.
    fn attach_front(&mut self, key: K, value: V, hash: u64) -> u32 {
        let id = self.alloc(Node {
            key,
            value,
            hash,
            prev: NIL,
            next: NIL,
        });
        self.link_front(id);
        self.insert_index(hash, id);
        id
    }

    /// Remove a node from the index and the order, freeing its slot.
    fn detach(&mut self, id: u32) -> Node<K, V> {
        self.unlink(id);

        let hash = self.node(id).hash;
        if let Ok(entry) = self.index.find_entry(hash, |&other| other == id) {
            entry.remove();
        }

        let slot = std::mem::replace(
            &mut self.slots[id as usize],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = id;

        match slot {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("detached handle {id} was vacant"),
        }
    }

    fn link_front(&mut self, id: u32) {
        let old_head = self.head;
        {
            let node = self.node_mut(id);
            node.prev = NIL;
            node.next = old_head;
        }
        match old_head {
            NIL => self.tail = id,
            head => self.node_mut(head).prev = id,
        }
        self.head = id;
    }

    fn unlink(&mut self, id: u32) {
        let (prev, next) = {
            let node = self.node(id);
            (node.prev, node.next)
        };
        match prev {
            NIL => self.head = next,
            prev => self.node_mut(prev).next = next,
        }
        match next {
            NIL => self.tail = prev,
            next => self.node_mut(next).prev = prev,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, Q, O> fmt::Debug for OrderedMap<K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over an [`OrderedMap`], most recently used first.
pub struct Iter<'a, K, V, Q, O> {
    map: &'a OrderedMap<K, V, Q, O>,
    front: u32,
    back: u32,
    remaining: usize,
}

impl<'a, K, V, Q, O> Iterator for Iter<'a, K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let map = self.map;
        let node = map.node(self.front);
        self.front = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, Q, O> DoubleEndedIterator for Iter<'_, K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let map = self.map;
        let node = map.node(self.back);
        self.back = node.prev;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<K, V, Q, O> ExactSizeIterator for Iter<'_, K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
}

impl<K, V, Q, O> FusedIterator for Iter<'_, K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
}

impl<'a, K, V, Q, O> IntoIterator for &'a OrderedMap<K, V, Q, O>
where
    Q: KeyStrategy<K>,
    O: MapObserver<K, V>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, Q, O>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
