//! Taproot Script Trees (BIP-341)
//!
//! TapLeaf/TapBranch commitments and an arena-backed script tree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]; each node
//! records its parent so inclusion proofs can be read off by walking upward.
//! Trees may be arbitrarily unbalanced, up to a depth of 128.

use crate::crypto::curve::XOnlyPubKey;
use crate::crypto::tagged_hash::{tags, TaggedHasher};
use crate::error::{TaprootError, TaprootResult};
use crate::tx::codec::write_var_bytes;
use serde::{Deserialize, Serialize};

/// Default TapScript leaf version (0xc0)
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc0;

/// Maximum depth of a script tree (and length of a Merkle path)
pub const TAPROOT_MAX_DEPTH: usize = 128;

// MARK: - Leaves and branches

/// TapLeaf - a single script in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapLeaf {
    /// Leaf version (default 0xc0 for TapScript)
    pub version: u8,
    /// The script bytes
    pub script: Vec<u8>,
}

impl TapLeaf {
    /// Create a new TapLeaf with default version
    pub fn new(script: Vec<u8>) -> Self {
        Self {
            version: TAPSCRIPT_LEAF_VERSION,
            script,
        }
    }

    /// Create with custom version
    ///
    /// The low bit of the version byte carries the output parity in the
    /// control block, so leaf versions must be even.
    pub fn with_version(version: u8, script: Vec<u8>) -> TaprootResult<Self> {
        if version & 0x01 != 0 {
            return Err(TaprootError::MalformedScript(format!(
                "leaf version 0x{:02x} is odd",
                version
            )));
        }
        Ok(Self { version, script })
    }

    /// Calculate the leaf hash
    ///
    /// TapLeaf hash = tagged_hash("TapLeaf", version || compact_size(script) || script)
    pub fn hash(&self) -> [u8; 32] {
        self.hash_with(&TaggedHasher::new(tags::TAP_LEAF))
    }

    /// Leaf hash using a prepared "TapLeaf" hasher
    pub fn hash_with(&self, leaf_hasher: &TaggedHasher) -> [u8; 32] {
        let mut data = Vec::with_capacity(1 + 9 + self.script.len());
        data.push(self.version);
        write_var_bytes(&mut data, &self.script);
        leaf_hasher.hash(&data)
    }

    /// Key of a `<32-byte x-only key> OP_CHECKSIG` tapscript leaf
    ///
    /// Fails with `MalformedScript` for any other script or leaf version.
    pub fn checksig_key(&self) -> TaprootResult<XOnlyPubKey> {
        let key = match self.script.as_slice() {
            [0x20, key @ .., 0xac] if key.len() == 32 => Some(key),
            _ => None,
        };
        match key {
            Some(key) if self.version == TAPSCRIPT_LEAF_VERSION => XOnlyPubKey::from_slice(key),
            _ => Err(TaprootError::MalformedScript(format!(
                "leaf {} is not a single-key OP_CHECKSIG script",
                hex::encode(&self.script)
            ))),
        }
    }
}

/// Calculate TapBranch hash from two child hashes
///
/// The children are sorted lexicographically before hashing.
pub fn tap_branch_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    branch_hash_with(&TaggedHasher::new(tags::TAP_BRANCH), left, right)
}

fn branch_hash_with(branch_hasher: &TaggedHasher, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let (first, second) = if left < right {
        (left, right)
    } else {
        (right, left)
    };
    branch_hasher.hash_parts(&[first, second])
}

/// Merkle root of the script tree (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapMerkleRoot(pub [u8; 32]);

impl TapMerkleRoot {
    /// Create from 32 bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> TaprootResult<Self> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| {
            TaprootError::InvalidTree(format!("Expected 32 bytes, got {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// MARK: - Inclusion proofs

/// Fold a Merkle path (leaf to root) onto a leaf hash
pub fn compute_root_from_proof(leaf_hash: &[u8; 32], proof: &[[u8; 32]]) -> [u8; 32] {
    let branch_hasher = TaggedHasher::new(tags::TAP_BRANCH);
    proof
        .iter()
        .fold(*leaf_hash, |acc, sibling| branch_hash_with(&branch_hasher, &acc, sibling))
}

/// Check that `proof` carries `leaf_hash` up to `expected_root`
pub fn verify_merkle_proof(
    leaf_hash: &[u8; 32],
    proof: &[[u8; 32]],
    expected_root: &TapMerkleRoot,
) -> TaprootResult<()> {
    if proof.len() > TAPROOT_MAX_DEPTH {
        return Err(TaprootError::MalformedWitness(format!(
            "merkle path has {} elements, maximum is {}",
            proof.len(),
            TAPROOT_MAX_DEPTH
        )));
    }
    let root = compute_root_from_proof(leaf_hash, proof);
    if root != expected_root.0 {
        return Err(TaprootError::CommitmentMismatch(format!(
            "proof reduces to {}, expected {}",
            hex::encode(root),
            expected_root.to_hex()
        )));
    }
    Ok(())
}

// MARK: - Arena tree

/// Index of a node inside a [`TapTree`] or [`TapTreeBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(TapLeaf),
    Branch { left: NodeId, right: NodeId },
}

#[derive(Debug, Clone)]
struct TapNode {
    kind: NodeKind,
    hash: [u8; 32],
    parent: Option<NodeId>,
}

/// Explicit tree shape over a list of leaves, e.g. `[[0, 1], 2]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeShape {
    /// Index into the leaf list
    Leaf(usize),
    /// Pair of sub-shapes
    Branch(Box<TreeShape>, Box<TreeShape>),
}

impl TreeShape {
    pub fn branch(left: TreeShape, right: TreeShape) -> Self {
        TreeShape::Branch(Box::new(left), Box::new(right))
    }
}

/// Incremental builder for arbitrarily shaped script trees
pub struct TapTreeBuilder {
    nodes: Vec<TapNode>,
    leaf_hasher: TaggedHasher,
    branch_hasher: TaggedHasher,
}

impl Default for TapTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TapTreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            leaf_hasher: TaggedHasher::new(tags::TAP_LEAF),
            branch_hasher: TaggedHasher::new(tags::TAP_BRANCH),
        }
    }

    fn node(&self, id: NodeId) -> TaprootResult<&TapNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| TaprootError::InvalidTree(format!("unknown node {}", id.0)))
    }

    /// Add a detached leaf
    pub fn add_leaf(&mut self, leaf: TapLeaf) -> NodeId {
        let hash = leaf.hash_with(&self.leaf_hasher);
        self.nodes.push(TapNode {
            kind: NodeKind::Leaf(leaf),
            hash,
            parent: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Join two detached nodes under a new branch
    pub fn add_branch(&mut self, left: NodeId, right: NodeId) -> TaprootResult<NodeId> {
        if left == right {
            return Err(TaprootError::InvalidTree(
                "a node cannot be its own sibling".to_string(),
            ));
        }
        let left_hash = self.node(left)?.hash;
        let right_hash = self.node(right)?.hash;
        for child in [left, right] {
            if self.node(child)?.parent.is_some() {
                return Err(TaprootError::InvalidTree(format!(
                    "node {} already has a parent",
                    child.0
                )));
            }
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(TapNode {
            kind: NodeKind::Branch { left, right },
            hash: branch_hash_with(&self.branch_hasher, &left_hash, &right_hash),
            parent: None,
        });
        self.nodes[left.0].parent = Some(id);
        self.nodes[right.0].parent = Some(id);
        Ok(id)
    }

    /// Copy a finished tree in as a detached sub-tree, returning its new root
    pub fn add_subtree(&mut self, tree: &TapTree) -> NodeId {
        let offset = self.nodes.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);
        for node in &tree.nodes {
            let kind = match &node.kind {
                NodeKind::Leaf(leaf) => NodeKind::Leaf(leaf.clone()),
                NodeKind::Branch { left, right } => NodeKind::Branch {
                    left: shift(*left),
                    right: shift(*right),
                },
            };
            self.nodes.push(TapNode {
                kind,
                hash: node.hash,
                parent: node.parent.map(shift),
            });
        }
        shift(tree.root)
    }

    /// Add the leaves and branches described by `shape`
    ///
    /// Every index in `leaves` must appear exactly once.
    pub fn add_shape(&mut self, shape: &TreeShape, leaves: &[TapLeaf]) -> TaprootResult<NodeId> {
        let mut used = vec![false; leaves.len()];
        let id = self.add_shape_inner(shape, leaves, &mut used)?;
        if let Some(unused) = used.iter().position(|u| !u) {
            return Err(TaprootError::InvalidTree(format!(
                "leaf {} is not placed in the tree shape",
                unused
            )));
        }
        Ok(id)
    }

    fn add_shape_inner(
        &mut self,
        shape: &TreeShape,
        leaves: &[TapLeaf],
        used: &mut [bool],
    ) -> TaprootResult<NodeId> {
        match shape {
            TreeShape::Leaf(index) => {
                let leaf = leaves.get(*index).ok_or_else(|| {
                    TaprootError::InvalidTree(format!("leaf index {} out of range", index))
                })?;
                if std::mem::replace(&mut used[*index], true) {
                    return Err(TaprootError::InvalidTree(format!(
                        "leaf {} appears more than once",
                        index
                    )));
                }
                Ok(self.add_leaf(leaf.clone()))
            }
            TreeShape::Branch(left, right) => {
                let left = self.add_shape_inner(left, leaves, used)?;
                let right = self.add_shape_inner(right, leaves, used)?;
                self.add_branch(left, right)
            }
        }
    }

    /// Seal the tree under `root`
    ///
    /// Fails if any other node is left detached or the tree is deeper than 128.
    pub fn finish(self, root: NodeId) -> TaprootResult<TapTree> {
        if self.node(root)?.parent.is_some() {
            return Err(TaprootError::InvalidTree(
                "root node has a parent".to_string(),
            ));
        }
        if let Some(dangling) = self
            .nodes
            .iter()
            .enumerate()
            .position(|(i, n)| i != root.0 && n.parent.is_none())
        {
            return Err(TaprootError::InvalidTree(format!(
                "node {} is not connected to the root",
                dangling
            )));
        }

        let tree = TapTree {
            nodes: self.nodes,
            root,
        };
        for (id, _) in tree.leaves() {
            let depth = tree.depth(id)?;
            if depth > TAPROOT_MAX_DEPTH {
                return Err(TaprootError::InvalidTree(format!(
                    "leaf depth {} exceeds {}",
                    depth, TAPROOT_MAX_DEPTH
                )));
            }
        }
        Ok(tree)
    }
}

/// Immutable script tree
#[derive(Debug, Clone)]
pub struct TapTree {
    nodes: Vec<TapNode>,
    root: NodeId,
}

impl TapTree {
    /// Tree with a single leaf; its root is the leaf hash
    pub fn single(leaf: TapLeaf) -> Self {
        let mut builder = TapTreeBuilder::new();
        let id = builder.add_leaf(leaf);
        TapTree {
            nodes: builder.nodes,
            root: id,
        }
    }

    /// Pairwise-balanced tree; an odd node at any level is promoted unchanged
    pub fn balanced(leaves: Vec<TapLeaf>) -> TaprootResult<Self> {
        if leaves.is_empty() {
            return Err(TaprootError::InvalidTree("no leaves".to_string()));
        }

        let mut builder = TapTreeBuilder::new();
        let mut level: Vec<NodeId> = leaves.into_iter().map(|l| builder.add_leaf(l)).collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                match nodes.next() {
                    Some(right) => next.push(builder.add_branch(left, right)?),
                    None => next.push(left),
                }
            }
            level = next;
        }

        builder.finish(level[0])
    }

    /// Tree with an explicit shape over `leaves`
    pub fn from_shape(shape: &TreeShape, leaves: &[TapLeaf]) -> TaprootResult<Self> {
        let mut builder = TapTreeBuilder::new();
        let root = builder.add_shape(shape, leaves)?;
        builder.finish(root)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Commitment root
    pub fn root_hash(&self) -> TapMerkleRoot {
        TapMerkleRoot(self.nodes[self.root.0].hash)
    }

    /// Hash of any node
    pub fn node_hash(&self, id: NodeId) -> Option<[u8; 32]> {
        self.nodes.get(id.0).map(|n| n.hash)
    }

    /// All leaves in insertion order
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &TapLeaf)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match &n.kind {
            NodeKind::Leaf(leaf) => Some((NodeId(i), leaf)),
            NodeKind::Branch { .. } => None,
        })
    }

    pub fn leaf(&self, id: NodeId) -> Option<&TapLeaf> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Children of a branch node
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        match self.nodes.get(id.0)?.kind {
            NodeKind::Branch { left, right } => Some((left, right)),
            NodeKind::Leaf(_) => None,
        }
    }

    /// First leaf equal to `leaf`
    pub fn find_leaf(&self, leaf: &TapLeaf) -> Option<NodeId> {
        self.leaves().find(|(_, l)| *l == leaf).map(|(id, _)| id)
    }

    fn leaf_node(&self, id: NodeId) -> TaprootResult<&TapNode> {
        match self.nodes.get(id.0) {
            Some(node) if matches!(node.kind, NodeKind::Leaf(_)) => Ok(node),
            _ => Err(TaprootError::InvalidTree(format!("node {} is not a leaf", id.0))),
        }
    }

    /// Number of branches between a leaf and the root
    pub fn depth(&self, id: NodeId) -> TaprootResult<usize> {
        let mut node = self.leaf_node(id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            depth += 1;
            node = &self.nodes[parent.0];
        }
        Ok(depth)
    }

    /// Sibling hashes from the leaf up to the root
    pub fn merkle_proof(&self, id: NodeId) -> TaprootResult<Vec<[u8; 32]>> {
        let mut current = id;
        let mut node = self.leaf_node(id)?;
        let mut proof = Vec::new();

        while let Some(parent) = node.parent {
            let sibling = match self.nodes[parent.0].kind {
                NodeKind::Branch { left, right } if left == current => right,
                NodeKind::Branch { left, .. } => left,
                NodeKind::Leaf(_) => {
                    return Err(TaprootError::InvalidTree("leaf used as a parent".to_string()))
                }
            };
            proof.push(self.nodes[sibling.0].hash);
            current = parent;
            node = &self.nodes[parent.0];
        }
        Ok(proof)
    }
}
