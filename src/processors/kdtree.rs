//! Arena-backed k-d partition over 2D points.
//!
//! Nodes live in a single `Vec` and refer to each other by [`NodeId`].
//! Children are pushed before their parent, so the root is the last node.

/// Index of a node inside a [`Partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of the partition.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionNode {
    /// Terminal cell owning the indices of its points.
    Leaf { indices: Vec<usize> },
    /// Median split along `axis`; `left` holds the lower half.
    Internal {
        axis: usize,
        split_value: f64,
        left: NodeId,
        right: NodeId,
    },
}

/// Balanced binary space partition with bounded leaf size.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    nodes: Vec<PartitionNode>,
    root: Option<NodeId>,
    leaf_capacity: usize,
    point_count: usize,
}

impl Partition {
    /// Build a partition over `points`.
    ///
    /// A node becomes a leaf once it holds at most `leaf_capacity` points, or
    /// when all of its points coincide and no split can separate them.
    /// Otherwise it is split at the median of the axis with the largest
    /// spread. An empty point set yields a partition with no nodes.
    pub fn build(points: &[[f64; 2]], leaf_capacity: usize) -> Self {
        let leaf_capacity = leaf_capacity.max(1);
        let mut partition = Partition {
            nodes: Vec::new(),
            root: None,
            leaf_capacity,
            point_count: points.len(),
        };

        if points.is_empty() {
            return partition;
        }

        // A balanced tree has roughly 2 * N / leaf_capacity nodes
        partition
            .nodes
            .reserve(2 * points.len() / leaf_capacity + 1);

        let mut indices: Vec<usize> = (0..points.len()).collect();
        let root = partition.build_recursive(points, &mut indices);
        partition.root = Some(root);
        partition
    }

    fn build_recursive(&mut self, points: &[[f64; 2]], indices: &mut [usize]) -> NodeId {
        let count = indices.len();

        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for &i in indices.iter() {
            for axis in 0..2 {
                let v = points[i][axis];
                if v < min[axis] {
                    min[axis] = v;
                }
                if v > max[axis] {
                    max[axis] = v;
                }
            }
        }
        let spread = [max[0] - min[0], max[1] - min[1]];

        if count <= self.leaf_capacity || (spread[0] <= 0.0 && spread[1] <= 0.0) {
            return self.push(PartitionNode::Leaf {
                indices: indices.to_vec(),
            });
        }

        let axis = if spread[0] >= spread[1] { 0 } else { 1 };

        let mid = count / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| points[a][axis].total_cmp(&points[b][axis]));
        let split_value = points[indices[mid]][axis];

        let (lower, upper) = indices.split_at_mut(mid);
        let left = self.build_recursive(points, lower);
        let right = self.build_recursive(points, upper);

        self.push(PartitionNode::Internal {
            axis,
            split_value,
            left,
            right,
        })
    }

    fn push(&mut self, node: PartitionNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &PartitionNode {
        &self.nodes[id.0]
    }

    /// Total number of nodes, internal and leaf.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Number of points the partition was built over.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Leaf index sets in post-order (left subtree, right subtree, node).
    pub fn leaves(&self) -> Vec<&[usize]> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };

        // Depth-first with the right child pushed first so leaves come out
        // left to right.
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.node(id) {
                PartitionNode::Leaf { indices } => out.push(indices.as_slice()),
                PartitionNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        out
    }
}
