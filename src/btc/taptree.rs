//! TapTree Construction
//!
//! Builds the script tree of a Taproot output from weighted leaves using
//! Huffman's algorithm: the two lightest nodes are combined until one root
//! remains, so frequently used leaves end up close to the root and get short
//! control blocks.
//!
//! Hashing follows BIP341:
//!
//! ```text
//! leaf   = H_TapLeaf(version || compact_size(len) || script)
//! branch = H_TapBranch(min(a, b) || max(a, b))
//! Q      = P + H_TapTweak(P || root) * G
//! ```
//!
//! Ties in weight are broken by the node hash, so the tree shape depends only
//! on the multiset of (weight, leaf) pairs and never on input order.

use crate::crypto::helpers::tagged_hash_parts;
use crate::crypto::tweak::{self, Tweak};
use crate::error::{Error, Result};
use bitcoin::consensus::encode::serialize;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::script::Builder;
use bitcoin::ScriptBuf;
use secp256kfun::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::{debug, trace};

const TAP_LEAF_TAG: &str = "TapLeaf";
const TAP_BRANCH_TAG: &str = "TapBranch";

/// Leaf version of BIP342 tapscript.
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc0;
/// Leaf version bits are the high seven bits of the first control block byte.
pub const LEAF_VERSION_MASK: u8 = 0xfe;
/// Version byte and internal key.
pub const CONTROL_BLOCK_BASE_SIZE: usize = 33;
pub const CONTROL_BLOCK_NODE_SIZE: usize = 32;
pub const CONTROL_BLOCK_MAX_DEPTH: usize = 128;

// ============================================================================
// Leaves and nodes
// ============================================================================

/// A spending script and its leaf version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TapLeaf {
    version: u8,
    script: ScriptBuf,
}

impl TapLeaf {
    /// A tapscript (0xc0) leaf.
    pub fn new(script: ScriptBuf) -> Self {
        Self {
            version: TAPSCRIPT_LEAF_VERSION,
            script,
        }
    }

    /// A leaf with an explicit version. The version must be even and must
    /// not be 0x50, which would be confused with an annex.
    pub fn with_version(script: ScriptBuf, version: u8) -> Result<Self> {
        validate_leaf_version(version)?;
        Ok(Self { version, script })
    }

    pub fn script(&self) -> &ScriptBuf {
        &self.script
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn leaf_hash(&self) -> [u8; 32] {
        tap_leaf_hash(&self.script, self.version)
    }
}

fn validate_leaf_version(version: u8) -> Result<()> {
    if version & !LEAF_VERSION_MASK != 0 || version == 0x50 {
        return Err(Error::InvalidLeafVersion(version));
    }
    Ok(())
}

/// H_TapLeaf(version || compact_size(len) || script).
pub fn tap_leaf_hash(script: &ScriptBuf, version: u8) -> [u8; 32] {
    tagged_hash_parts(TAP_LEAF_TAG, &[&[version], &serialize(script)])
}

/// H_TapBranch over the two child hashes in lexicographic order.
pub fn tap_branch_hash(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    if a <= b {
        tagged_hash_parts(TAP_BRANCH_TAG, &[a, b])
    } else {
        tagged_hash_parts(TAP_BRANCH_TAG, &[b, a])
    }
}

/// A node of the script tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapNode {
    Leaf(TapLeaf),
    Branch {
        hash: [u8; 32],
        left: Box<TapNode>,
        right: Box<TapNode>,
    },
}

impl TapNode {
    pub fn branch(left: TapNode, right: TapNode) -> Self {
        let hash = tap_branch_hash(&left.identifying_hash(), &right.identifying_hash());
        TapNode::Branch {
            hash,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The leaf hash for leaves, the branch hash for branches.
    pub fn identifying_hash(&self) -> [u8; 32] {
        match self {
            TapNode::Leaf(leaf) => leaf.leaf_hash(),
            TapNode::Branch { hash, .. } => *hash,
        }
    }

    /// Walk the subtree, recording for each leaf its sibling hashes from the
    /// leaf up to this node.
    fn collect_paths(
        &self,
        above: &mut Vec<[u8; 32]>,
        out: &mut BTreeMap<[u8; 32], LeafPath>,
    ) {
        match self {
            TapNode::Leaf(leaf) => {
                let path = above.iter().rev().copied().collect();
                out.insert(
                    leaf.leaf_hash(),
                    LeafPath {
                        leaf: leaf.clone(),
                        path,
                    },
                );
            }
            TapNode::Branch { left, right, .. } => {
                above.push(right.identifying_hash());
                left.collect_paths(above, out);
                above.pop();

                above.push(left.identifying_hash());
                right.collect_paths(above, out);
                above.pop();
            }
        }
    }
}

// ============================================================================
// Huffman queue
// ============================================================================

/// Queue entry ordered by (weight, hash).
struct Weighted {
    weight: u64,
    hash: [u8; 32],
    node: TapNode,
}

impl Weighted {
    fn new(weight: u64, node: TapNode) -> Self {
        Self {
            weight,
            hash: node.identifying_hash(),
            node,
        }
    }
}

impl PartialEq for Weighted {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Weighted {}

impl PartialOrd for Weighted {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Weighted {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.weight, self.hash).cmp(&(other.weight, other.hash))
    }
}

/// Combine weighted leaves into a single root by Huffman's algorithm.
///
/// Returns `None` for an empty leaf set.
pub fn huffman_root(leaves: Vec<(u32, TapLeaf)>) -> Result<Option<TapNode>> {
    let mut queue = BinaryHeap::new();
    let mut seen = BTreeSet::new();
    for (weight, leaf) in leaves {
        if weight == 0 {
            return Err(Error::ZeroWeight);
        }
        if !seen.insert(leaf.leaf_hash()) {
            return Err(Error::DuplicateLeaf);
        }
        queue.push(Reverse(Weighted::new(u64::from(weight), TapNode::Leaf(leaf))));
    }

    while queue.len() > 1 {
        let (Some(Reverse(a)), Some(Reverse(b))) = (queue.pop(), queue.pop()) else {
            break;
        };
        trace!(
            left_weight = a.weight,
            right_weight = b.weight,
            "combining tree nodes"
        );
        let weight = a.weight + b.weight;
        queue.push(Reverse(Weighted::new(weight, TapNode::branch(a.node, b.node))));
    }

    Ok(queue.pop().map(|Reverse(root)| root.node))
}

// ============================================================================
// Control blocks
// ============================================================================

/// Proof that a leaf is committed to by an output key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlBlock {
    pub leaf_version: u8,
    /// True when the output key has odd Y.
    pub output_key_parity: bool,
    pub internal_key: Point<EvenY>,
    /// Sibling hashes, leaf to root.
    pub merkle_branch: Vec<[u8; 32]>,
}

impl ControlBlock {
    pub fn depth(&self) -> usize {
        self.merkle_branch.len()
    }

    /// (version | parity) || internal key || path.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            CONTROL_BLOCK_BASE_SIZE + CONTROL_BLOCK_NODE_SIZE * self.merkle_branch.len(),
        );
        bytes.push(self.leaf_version | u8::from(self.output_key_parity));
        bytes.extend_from_slice(&self.internal_key.to_xonly_bytes());
        for node in &self.merkle_branch {
            bytes.extend_from_slice(node);
        }
        bytes
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CONTROL_BLOCK_BASE_SIZE {
            return Err(Error::InvalidLength {
                expected: CONTROL_BLOCK_BASE_SIZE,
                got: bytes.len(),
            });
        }
        let path_bytes = &bytes[CONTROL_BLOCK_BASE_SIZE..];
        if path_bytes.len() % CONTROL_BLOCK_NODE_SIZE != 0 {
            return Err(Error::InvalidControlBlock(format!(
                "path of {} bytes is not a multiple of 32",
                path_bytes.len()
            )));
        }
        let depth = path_bytes.len() / CONTROL_BLOCK_NODE_SIZE;
        if depth > CONTROL_BLOCK_MAX_DEPTH {
            return Err(Error::InvalidControlBlock(format!(
                "depth {depth} exceeds {CONTROL_BLOCK_MAX_DEPTH}"
            )));
        }

        let leaf_version = bytes[0] & LEAF_VERSION_MASK;
        validate_leaf_version(leaf_version)?;

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[1..CONTROL_BLOCK_BASE_SIZE]);
        let internal_key = Point::<EvenY>::from_xonly_bytes(key).ok_or(Error::InvalidPoint)?;

        let merkle_branch = path_bytes
            .chunks_exact(CONTROL_BLOCK_NODE_SIZE)
            .map(|chunk| {
                let mut node = [0u8; 32];
                node.copy_from_slice(chunk);
                node
            })
            .collect();

        Ok(Self {
            leaf_version,
            output_key_parity: bytes[0] & 1 == 1,
            internal_key,
            merkle_branch,
        })
    }

    /// Fold the path into a root hash starting from `leaf`.
    pub fn root_for(&self, leaf: &TapLeaf) -> [u8; 32] {
        self.merkle_branch
            .iter()
            .fold(leaf.leaf_hash(), |acc, sibling| tap_branch_hash(&acc, sibling))
    }

    /// Does this proof show that `leaf` is committed to by `output_key`?
    ///
    /// Checks the leaf version, recomputes the root, re-derives the tweaked
    /// key and compares both its x coordinate and its parity.
    pub fn verify(&self, output_key: &Point<EvenY>, leaf: &TapLeaf) -> bool {
        if leaf.version() != self.leaf_version {
            return false;
        }
        let root = self.root_for(leaf);
        let internal = self.internal_key.normalize();
        let derived = tweak::tap_tweak(&self.internal_key, Some(&root))
            .and_then(|t| t.tweak_add(&internal));
        match derived {
            Ok(q) => {
                let (q, odd) = q.into_point_with_even_y();
                q == *output_key && odd == self.output_key_parity
            }
            Err(_) => false,
        }
    }
}

// ============================================================================
// TapTree
// ============================================================================

#[derive(Clone, Debug)]
struct LeafPath {
    leaf: TapLeaf,
    path: Vec<[u8; 32]>,
}

/// An internal key committed to a Huffman script tree.
#[derive(Clone, Debug)]
pub struct TapTree {
    internal_key: Point<EvenY>,
    root: Option<TapNode>,
    tweak: Option<Tweak>,
    output_key: Point<EvenY>,
    output_key_parity: bool,
    /// Keyed by leaf hash.
    paths: BTreeMap<[u8; 32], LeafPath>,
}

impl TapTree {
    /// Build the tree and derive the output key.
    ///
    /// With no leaves there is no script path and the output key is the
    /// internal key itself.
    pub fn construct(internal_key: Point<EvenY>, leaves: Vec<(u32, TapLeaf)>) -> Result<Self> {
        let leaf_count = leaves.len();
        let root = huffman_root(leaves)?;

        let Some(root) = root else {
            debug!("empty script tree, output key is the internal key");
            return Ok(Self {
                internal_key,
                root: None,
                tweak: None,
                output_key: internal_key,
                output_key_parity: false,
                paths: BTreeMap::new(),
            });
        };

        let root_hash = root.identifying_hash();
        let tweak = tweak::tap_tweak(&internal_key, Some(&root_hash))?;
        let (output_key, output_key_parity) = tweak
            .tweak_add(&internal_key.normalize())?
            .into_point_with_even_y();

        let mut paths = BTreeMap::new();
        root.collect_paths(&mut Vec::new(), &mut paths);

        debug!(
            leaves = leaf_count,
            root = %hex::encode(root_hash),
            output_key = %hex::encode(output_key.to_xonly_bytes()),
            "constructed TapTree"
        );

        Ok(Self {
            internal_key,
            root: Some(root),
            tweak: Some(tweak),
            output_key,
            output_key_parity,
            paths,
        })
    }

    /// Build a tree of tapscript leaves.
    pub fn from_scripts(
        internal_key: Point<EvenY>,
        scripts: impl IntoIterator<Item = (u32, ScriptBuf)>,
    ) -> Result<Self> {
        let leaves = scripts
            .into_iter()
            .map(|(weight, script)| (weight, TapLeaf::new(script)))
            .collect();
        Self::construct(internal_key, leaves)
    }

    pub fn internal_key(&self) -> Point<EvenY> {
        self.internal_key
    }

    pub fn root(&self) -> Option<&TapNode> {
        self.root.as_ref()
    }

    pub fn root_hash(&self) -> Option<[u8; 32]> {
        self.root.as_ref().map(TapNode::identifying_hash)
    }

    /// The tweak added to the internal key, absent for an empty tree.
    pub fn tweak(&self) -> Option<Tweak> {
        self.tweak
    }

    pub fn output_key(&self) -> Point<EvenY> {
        self.output_key
    }

    /// True when the tweaked key had odd Y before normalization.
    pub fn output_key_parity(&self) -> bool {
        self.output_key_parity
    }

    /// OP_1 <32-byte output key>.
    pub fn script_pubkey(&self) -> ScriptBuf {
        Builder::new()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(self.output_key.to_xonly_bytes())
            .into_script()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &TapLeaf> {
        self.paths.values().map(|p| &p.leaf)
    }

    pub fn leaf_count(&self) -> usize {
        self.paths.len()
    }

    /// Number of branches between the leaf and the root.
    pub fn leaf_depth(&self, leaf: &TapLeaf) -> Option<usize> {
        self.paths.get(&leaf.leaf_hash()).map(|p| p.path.len())
    }

    pub fn control_block(&self, leaf: &TapLeaf) -> Option<ControlBlock> {
        self.paths.get(&leaf.leaf_hash()).map(|p| ControlBlock {
            leaf_version: p.leaf.version,
            output_key_parity: self.output_key_parity,
            internal_key: self.internal_key,
            merkle_branch: p.path.clone(),
        })
    }

    /// Control block for a tapscript leaf.
    pub fn control_block_for_script(&self, script: &ScriptBuf) -> Option<ControlBlock> {
        self.control_block(&TapLeaf::new(script.clone()))
    }

    /// Every leaf with its control block.
    pub fn control_blocks(&self) -> Vec<(TapLeaf, ControlBlock)> {
        self.leaves()
            .filter_map(|leaf| self.control_block(leaf).map(|cb| (leaf.clone(), cb)))
            .collect()
    }

    /// The trailing witness elements of a script-path spend: the script and
    /// its control block. Script inputs go in front of these.
    pub fn witness_for(&self, leaf: &TapLeaf) -> Option<Vec<Vec<u8>>> {
        let control_block = self.control_block(leaf)?;
        Some(vec![leaf.script.to_bytes(), control_block.serialize()])
    }
}
