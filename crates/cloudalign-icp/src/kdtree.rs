use std::collections::BinaryHeap;

use cloudalign_3d::ops::squared_euclidean_distance;

/// A balanced, static 3D k-d tree over a borrowed set of points.
///
/// The tree stores indices into the borrowed slice, never the coordinates
/// themselves, so the backing storage must outlive the tree. It is built once
/// by median splits and never mutated afterwards.
///
/// Example:
///
/// ```
/// use cloudalign_icp::kdtree::KdTree;
///
/// let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
/// let tree = KdTree::new(&points);
/// assert_eq!(tree.nearest(&[0.9, 0.1, 0.0]), 1);
/// ```
pub struct KdTree<'a> {
    points: &'a [[f64; 3]],
    root: Option<Box<Node>>,
}

struct Node {
    index: usize,
    axis: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn build(points: &[[f64; 3]], indices: &mut [usize], depth: usize) -> Option<Box<Node>> {
        if indices.is_empty() {
            return None;
        }

        // cycle through the splitting axes with depth
        let axis = depth % 3;
        indices.sort_by(|&a, &b| points[a][axis].total_cmp(&points[b][axis]));

        let median = indices.len() / 2;
        let index = indices[median];
        let (left, rest) = indices.split_at_mut(median);
        let right = &mut rest[1..];

        Some(Box::new(Node {
            index,
            axis,
            left: Node::build(points, left, depth + 1),
            right: Node::build(points, right, depth + 1),
        }))
    }
}

// Max-heap entry for k-NN queries: the top element is the current farthest
// neighbor in the candidate set.
struct Neighbor {
    sq_dist: f64,
    index: usize,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.sq_dist == other.sq_dist
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sq_dist.total_cmp(&other.sq_dist)
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> KdTree<'a> {
    /// Build a k-d tree over the given points.
    ///
    /// The points are borrowed for the lifetime of the tree and must not be
    /// mutated while the tree is alive.
    pub fn new(points: &'a [[f64; 3]]) -> Self {
        let mut indices = (0..points.len()).collect::<Vec<_>>();
        let root = Node::build(points, &mut indices, 0);
        Self { points, root }
    }

    /// Find the index of the point closest to `query`.
    ///
    /// Distances are compared squared; no square root is taken.
    ///
    /// PRECONDITION: the tree is not empty.
    pub fn nearest(&self, query: &[f64; 3]) -> usize {
        let mut best_index = 0;
        let mut best_sq_dist = f64::MAX;
        if let Some(root) = &self.root {
            self.search_nearest(root, query, &mut best_index, &mut best_sq_dist);
        }
        best_index
    }

    /// Find the indices of the `k` points closest to `query`.
    ///
    /// Returns fewer than `k` indices when the tree holds fewer points. The
    /// order of the returned indices is unspecified.
    pub fn k_nearest(&self, query: &[f64; 3], k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k);
        if let Some(root) = &self.root {
            self.search_k_nearest(root, query, k, &mut heap);
        }
        heap.into_sorted_vec()
            .into_iter()
            .map(|n| n.index)
            .collect()
    }

    fn search_nearest(
        &self,
        node: &Node,
        query: &[f64; 3],
        best_index: &mut usize,
        best_sq_dist: &mut f64,
    ) {
        let sq_dist = squared_euclidean_distance(&self.points[node.index], query);
        if sq_dist < *best_sq_dist {
            *best_sq_dist = sq_dist;
            *best_index = node.index;
        }

        let diff = query[node.axis] - self.points[node.index][node.axis];
        let (near, far) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(near) = near {
            self.search_nearest(near, query, best_index, best_sq_dist);
        }

        // the far subtree can only contain a closer point if the splitting
        // plane is closer than the current best
        if diff * diff < *best_sq_dist {
            if let Some(far) = far {
                self.search_nearest(far, query, best_index, best_sq_dist);
            }
        }
    }

    fn search_k_nearest(
        &self,
        node: &Node,
        query: &[f64; 3],
        k: usize,
        heap: &mut BinaryHeap<Neighbor>,
    ) {
        let sq_dist = squared_euclidean_distance(&self.points[node.index], query);

        if heap.len() < k {
            heap.push(Neighbor {
                sq_dist,
                index: node.index,
            });
        } else if let Some(worst) = heap.peek() {
            if sq_dist < worst.sq_dist {
                heap.pop();
                heap.push(Neighbor {
                    sq_dist,
                    index: node.index,
                });
            }
        }

        let diff = query[node.axis] - self.points[node.index][node.axis];
        let (near, far) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(near) = near {
            self.search_k_nearest(near, query, k, heap);
        }

        let worst_sq_dist = if heap.len() < k {
            f64::MAX
        } else {
            heap.peek().map_or(f64::MAX, |n| n.sq_dist)
        };
        if diff * diff < worst_sq_dist {
            if let Some(far) = far {
                self.search_k_nearest(far, query, k, heap);
            }
        }
    }
}
