/// BoundsTree — dynamic bounding-volume hierarchy over scene items.
///
/// Nodes live in a flat arena indexed by `u32` ids (recycled through a
/// `SlotAllocator`). Leaves hold up to `max_items_per_leaf` items; internal
/// nodes hold exactly two children. Every node's bounds equal the union of
/// its children (or items) once a mutation returns.
///
/// Insertion descends toward the child whose volume grows the least.
/// Overflowing leaves are split by sweeping every split point on all three
/// axes with the cost `countLeft * volume(left) + countRight * volume(right)`,
/// ties broken by the same cost on half surface areas.
/// There is no rotation/rebalancing on removal; `rebuild()` reinserts
/// everything when the caller decides the tree has degraded.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use rustc_hash::FxHashMap;
use glam::Vec3;
use crate::camera::{Frustum, FrustumTest};
use crate::utils::SlotAllocator;
use super::aabb::AABB;
use super::item::ItemKey;
use super::scene_index::SceneIndex;

const SOURCE: &str = "galaxy3d::BoundsTree";

enum BvhNodeKind {
    Leaf(Vec<(ItemKey, AABB)>),
    Internal([u32; 2]),
}

struct BvhNode {
    /// Union of all descendant item bounds
    bounds: AABB,
    parent: Option<u32>,
    kind: BvhNodeKind,
}

impl BvhNode {
    fn free_slot() -> Self {
        Self {
            bounds: AABB::new(Vec3::ZERO, Vec3::ZERO),
            parent: None,
            kind: BvhNodeKind::Leaf(Vec::new()),
        }
    }
}

/// Best-first worklist entry. Ordered so that `BinaryHeap` pops the
/// smallest squared distance first.
struct QueueEntry {
    distance_sq: f32,
    target: QueueTarget,
}

enum QueueTarget {
    Node(u32),
    Item(ItemKey, AABB),
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance_sq.total_cmp(&self.distance_sq)
    }
}

/// Dynamic BVH spatial index.
pub struct BoundsTree {
    /// Node arena; freed slots hold an empty placeholder leaf
    nodes: Vec<BvhNode>,
    ids: SlotAllocator,
    root: Option<u32>,
    /// Item key → world AABB, used to guide removal descent
    item_bounds: FxHashMap<ItemKey, AABB>,
    max_items_per_leaf: usize,
}

impl BoundsTree {
    /// Create an empty tree. `max_items_per_leaf` is clamped to at least 1.
    pub fn new(max_items_per_leaf: usize) -> Self {
        Self {
            nodes: Vec::new(),
            ids: SlotAllocator::new(),
            root: None,
            item_bounds: FxHashMap::default(),
            max_items_per_leaf: max_items_per_leaf.max(1),
        }
    }

    // ===== ARENA =====

    fn alloc_node(&mut self, node: BvhNode) -> u32 {
        let id = self.ids.alloc();
        if id as usize == self.nodes.len() {
            self.nodes.push(node);
        } else {
            self.nodes[id as usize] = node;
        }
        id
    }

    fn free_node(&mut self, id: u32) {
        self.nodes[id as usize] = BvhNode::free_slot();
        self.ids.free(id);
    }

    // ===== INTROSPECTION =====

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.item_bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.item_bounds.contains_key(&key)
    }

    /// Bounds of the whole tree (None when empty)
    pub fn root_bounds(&self) -> Option<AABB> {
        self.root.map(|root| self.nodes[root as usize].bounds)
    }

    /// Longest root-to-leaf path, counted in nodes (0 when empty)
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else { return 0 };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let BvhNodeKind::Internal(children) = &self.nodes[id as usize].kind {
                stack.push((children[0], depth + 1));
                stack.push((children[1], depth + 1));
            }
        }
        deepest
    }

    // ===== INSERT =====

    fn insert_item(&mut self, key: ItemKey, bounds: AABB) {
        self.item_bounds.insert(key, bounds);

        let Some(root) = self.root else {
            let id = self.alloc_node(BvhNode {
                bounds,
                parent: None,
                kind: BvhNodeKind::Leaf(vec![(key, bounds)]),
            });
            self.root = Some(id);
            return;
        };

        // Grow bounds along the descent path
        let mut node = root;
        loop {
            let current = &mut self.nodes[node as usize];
            current.bounds = current.bounds.union(&bounds);
            match &current.kind {
                BvhNodeKind::Internal(children) => {
                    let children = *children;
                    node = self.cheaper_child(children, &bounds);
                }
                BvhNodeKind::Leaf(_) => break,
            }
        }

        let overflow = match &mut self.nodes[node as usize].kind {
            BvhNodeKind::Leaf(items) => {
                items.push((key, bounds));
                items.len() > self.max_items_per_leaf
            }
            BvhNodeKind::Internal(_) => false,
        };

        if overflow {
            self.split(node);
        }
    }

    /// Child whose volume grows the least when `bounds` is added.
    ///
    /// Ties (flat items all have zero volume) fall back to the growth of the
    /// half surface area, then to the distance between centers.
    fn cheaper_child(&self, children: [u32; 2], bounds: &AABB) -> u32 {
        let center = bounds.center();
        let cost = |id: u32| {
            let child = &self.nodes[id as usize].bounds;
            let merged = child.union(bounds);
            [
                merged.volume() - child.volume(),
                merged.half_area() - child.half_area(),
                child.center().distance_squared(center),
            ]
        };
        let cost_a = cost(children[0]);
        let cost_b = cost(children[1]);

        let order = cost_b
            .iter()
            .zip(&cost_a)
            .map(|(b, a)| b.total_cmp(a))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal);

        if order == Ordering::Less {
            children[1]
        } else {
            children[0]
        }
    }

    // ===== SPLIT =====

    /// Convert an overflowing leaf into an internal node with two leaves.
    fn split(&mut self, node: u32) {
        let mut items = match std::mem::replace(
            &mut self.nodes[node as usize].kind,
            BvhNodeKind::Leaf(Vec::new()),
        ) {
            BvhNodeKind::Leaf(items) => items,
            internal => {
                self.nodes[node as usize].kind = internal;
                return;
            }
        };

        let count = items.len();
        if count < 2 {
            self.nodes[node as usize].kind = BvhNodeKind::Leaf(items);
            return;
        }

        // (volume cost, area cost, imbalance, axis, split index)
        let mut best: Option<(f32, f32, usize, usize, usize)> = None;
        for axis in 0..3 {
            sort_by_center(&mut items, axis);

            let mut suffix = vec![items[count - 1].1; count];
            for i in (0..count - 1).rev() {
                suffix[i] = suffix[i + 1].union(&items[i].1);
            }

            let mut left = items[0].1;
            for split_at in 1..count {
                let (n_left, n_right) = (split_at as f32, (count - split_at) as f32);
                let cost = n_left * left.volume() + n_right * suffix[split_at].volume();
                let area_cost = n_left * left.half_area() + n_right * suffix[split_at].half_area();
                let imbalance = split_at.abs_diff(count - split_at);

                let better = match best {
                    None => true,
                    Some((best_cost, best_area, best_imbalance, _, _)) => {
                        cost < best_cost
                            || (cost == best_cost && area_cost < best_area)
                            || (cost == best_cost && area_cost == best_area && imbalance < best_imbalance)
                    }
                };
                if better {
                    best = Some((cost, area_cost, imbalance, axis, split_at));
                }
                left = left.union(&items[split_at].1);
            }
        }

        let Some((_, _, _, axis, split_at)) = best else {
            self.nodes[node as usize].kind = BvhNodeKind::Leaf(items);
            return;
        };

        sort_by_center(&mut items, axis);
        let right_items = items.split_off(split_at);
        let left_items = items;

        let left_id = self.alloc_node(BvhNode {
            bounds: union_of(&left_items),
            parent: Some(node),
            kind: BvhNodeKind::Leaf(left_items),
        });
        let right_id = self.alloc_node(BvhNode {
            bounds: union_of(&right_items),
            parent: Some(node),
            kind: BvhNodeKind::Leaf(right_items),
        });
        self.nodes[node as usize].kind = BvhNodeKind::Internal([left_id, right_id]);

        crate::engine_trace!(SOURCE, "Split node {} on axis {} at {}/{}", node, axis, split_at, count);
    }

    // ===== REMOVE =====

    /// Find the leaf holding `key`, descending only into nodes overlapping `bounds`.
    fn find_leaf(&self, key: ItemKey, bounds: &AABB) -> Option<u32> {
        let mut stack = vec![self.root?];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.bounds.intersects(bounds) {
                continue;
            }
            match &node.kind {
                BvhNodeKind::Leaf(items) => {
                    if items.iter().any(|(k, _)| *k == key) {
                        return Some(id);
                    }
                }
                BvhNodeKind::Internal(children) => stack.extend_from_slice(children),
            }
        }
        None
    }

    fn remove_item(&mut self, key: ItemKey) {
        let Some(bounds) = self.item_bounds.remove(&key) else {
            return;
        };

        let Some(leaf) = self.find_leaf(key, &bounds) else {
            crate::engine_warn!(SOURCE, "Item {:?} missing from its leaf (stale bounds), skipped", key);
            return;
        };

        let now_empty = match &mut self.nodes[leaf as usize].kind {
            BvhNodeKind::Leaf(items) => {
                if let Some(pos) = items.iter().position(|(k, _)| *k == key) {
                    items.swap_remove(pos);
                }
                items.is_empty()
            }
            BvhNodeKind::Internal(_) => false,
        };

        if !now_empty {
            self.refit_upwards(Some(leaf));
            return;
        }

        // Empty leaf: delete it and let the sibling take the parent's place
        let Some(parent) = self.nodes[leaf as usize].parent else {
            self.free_node(leaf);
            self.root = None;
            return;
        };

        let sibling = match &self.nodes[parent as usize].kind {
            BvhNodeKind::Internal([a, b]) => if *a == leaf { *b } else { *a },
            BvhNodeKind::Leaf(_) => {
                crate::engine_warn!(SOURCE, "Leaf {} has a leaf parent {}, skipped", leaf, parent);
                return;
            }
        };
        let grandparent = self.nodes[parent as usize].parent;

        self.nodes[sibling as usize].parent = grandparent;
        match grandparent {
            None => self.root = Some(sibling),
            Some(gp) => {
                if let BvhNodeKind::Internal(children) = &mut self.nodes[gp as usize].kind {
                    for child in children.iter_mut() {
                        if *child == parent {
                            *child = sibling;
                        }
                    }
                }
            }
        }

        self.free_node(leaf);
        self.free_node(parent);
        self.refit_upwards(grandparent);
    }

    /// Recompute one node's bounds from its direct children/items.
    fn recompute_bounds(&mut self, id: u32) {
        let bounds = match &self.nodes[id as usize].kind {
            BvhNodeKind::Leaf(items) if items.is_empty() => return,
            BvhNodeKind::Leaf(items) => union_of(items),
            BvhNodeKind::Internal([a, b]) => {
                self.nodes[*a as usize].bounds.union(&self.nodes[*b as usize].bounds)
            }
        };
        self.nodes[id as usize].bounds = bounds;
    }

    fn refit_upwards(&mut self, start: Option<u32>) {
        let mut current = start;
        while let Some(id) = current {
            self.recompute_bounds(id);
            current = self.nodes[id as usize].parent;
        }
    }

    // ===== REFIT / REBUILD =====

    /// Replace an item's bounds in place and refit its ancestors.
    ///
    /// Returns false (and changes nothing) if the item is unknown.
    /// The tree topology is untouched, so large moves degrade query quality;
    /// `update` only refits when the new bounds stay inside the leaf.
    pub fn refit_item(&mut self, key: ItemKey, bounds: &AABB) -> bool {
        let Some(old) = self.item_bounds.get(&key).copied() else {
            return false;
        };
        let Some(leaf) = self.find_leaf(key, &old) else {
            return false;
        };
        if let BvhNodeKind::Leaf(items) = &mut self.nodes[leaf as usize].kind {
            for entry in items.iter_mut().filter(|(k, _)| *k == key) {
                entry.1 = *bounds;
            }
        }
        self.item_bounds.insert(key, *bounds);
        self.refit_upwards(Some(leaf));
        true
    }

    /// Recompute every node's bounds bottom-up.
    pub fn refit(&mut self) {
        let Some(root) = self.root else { return };
        // Pre-order list reversed = children before parents
        let mut order = Vec::with_capacity(self.ids.len() as usize);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let BvhNodeKind::Internal(children) = &self.nodes[id as usize].kind {
                stack.extend_from_slice(children);
            }
        }
        for &id in order.iter().rev() {
            self.recompute_bounds(id);
        }
    }

    /// Reinsert every item into a fresh tree.
    pub fn rebuild(&mut self) {
        let mut items: Vec<(ItemKey, AABB)> = self.item_bounds.drain().collect();
        self.clear_nodes();
        // Largest first gives the top levels a better spatial spread
        items.sort_by(|a, b| b.1.volume().total_cmp(&a.1.volume()));
        for (key, bounds) in items {
            self.insert_item(key, bounds);
        }
        crate::engine_debug!(SOURCE, "Rebuilt tree: {} items, {} nodes, depth {}",
            self.len(), self.ids.len(), self.depth());
    }

    fn clear_nodes(&mut self) {
        self.nodes.clear();
        self.ids.clear();
        self.root = None;
    }

    // ===== TRAVERSAL =====

    /// Visit frustum-visible items front-to-back.
    ///
    /// Nodes and items share one priority worklist keyed by the squared
    /// distance from `eye` to their box, so items arrive in non-decreasing
    /// box distance. `callback` returning `false` stops the traversal.
    pub fn traverse_frustum<F>(&self, frustum: &Frustum, eye: Vec3, mut callback: F)
    where
        F: FnMut(ItemKey, &AABB) -> bool,
    {
        let Some(root) = self.root else { return };

        let mut queue = BinaryHeap::new();
        queue.push(QueueEntry {
            distance_sq: self.nodes[root as usize].bounds.distance_squared_to(eye),
            target: QueueTarget::Node(root),
        });

        while let Some(entry) = queue.pop() {
            match entry.target {
                QueueTarget::Item(key, bounds) => {
                    if !callback(key, &bounds) {
                        return;
                    }
                }
                QueueTarget::Node(id) => {
                    let node = &self.nodes[id as usize];
                    if !frustum.intersects_aabb(&node.bounds) {
                        continue;
                    }
                    match &node.kind {
                        BvhNodeKind::Internal(children) => {
                            for &child in children {
                                queue.push(QueueEntry {
                                    distance_sq: self.nodes[child as usize].bounds.distance_squared_to(eye),
                                    target: QueueTarget::Node(child),
                                });
                            }
                        }
                        BvhNodeKind::Leaf(items) => {
                            for (key, bounds) in items {
                                if frustum.intersects_aabb(bounds) {
                                    queue.push(QueueEntry {
                                        distance_sq: bounds.distance_squared_to(eye),
                                        target: QueueTarget::Item(*key, *bounds),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Unordered frustum query with 3-way classification.
    fn query_recursive(&self, id: u32, frustum: &Frustum, inside: bool, results: &mut Vec<ItemKey>) {
        let node = &self.nodes[id as usize];

        let inside = inside || match frustum.classify_aabb(&node.bounds) {
            FrustumTest::Outside => return,
            FrustumTest::Inside => true,
            FrustumTest::Partial => false,
        };

        match &node.kind {
            BvhNodeKind::Leaf(items) => {
                for (key, bounds) in items {
                    if inside || frustum.intersects_aabb(bounds) {
                        results.push(*key);
                    }
                }
            }
            BvhNodeKind::Internal([a, b]) => {
                self.query_recursive(*a, frustum, inside, results);
                self.query_recursive(*b, frustum, inside, results);
            }
        }
    }
}

impl Default for BoundsTree {
    fn default() -> Self {
        Self::new(4)
    }
}

fn sort_by_center(items: &mut [(ItemKey, AABB)], axis: usize) {
    items.sort_by(|a, b| a.1.center()[axis].total_cmp(&b.1.center()[axis]));
}

fn union_of(items: &[(ItemKey, AABB)]) -> AABB {
    items
        .iter()
        .skip(1)
        .fold(items[0].1, |acc, (_, bounds)| acc.union(bounds))
}

// ===== SCENE INDEX TRAIT =====

impl SceneIndex for BoundsTree {
    fn insert(&mut self, key: ItemKey, world_aabb: &AABB) {
        if self.item_bounds.contains_key(&key) {
            self.remove_item(key);
        }
        self.insert_item(key, *world_aabb);
    }

    fn remove(&mut self, key: ItemKey) {
        self.remove_item(key);
    }

    fn update(&mut self, key: ItemKey, world_aabb: &AABB) {
        let Some(old) = self.item_bounds.get(&key).copied() else {
            return;
        };
        // Shrinking or drifting inside the leaf keeps the topology valid
        let leaf_bounds = self.find_leaf(key, &old).map(|leaf| self.nodes[leaf as usize].bounds);
        match leaf_bounds {
            Some(leaf_bounds) if leaf_bounds.contains(world_aabb) => {
                self.refit_item(key, world_aabb);
            }
            _ => {
                self.remove_item(key);
                self.insert_item(key, *world_aabb);
            }
        }
    }

    fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<ItemKey>) {
        if let Some(root) = self.root {
            self.query_recursive(root, frustum, false, results);
        }
    }

    fn clear(&mut self) {
        self.item_bounds.clear();
        self.clear_nodes();
    }

    fn entity_count(&self) -> usize {
        self.item_bounds.len()
    }

    fn node_count(&self) -> usize {
        self.ids.len() as usize
    }
}

#[cfg(test)]
#[path = "bounds_tree_tests.rs"]
mod tests;
