//! Progressive Merkle tree of deposit leaves.
//!
//! Mirrors the deposit contract: leaves are appended one at a time and the root is the root of a
//! depth 32 tree with the deposit count mixed in. Proofs produced by [`DepositTree::proof`] are in
//! the form that `process_deposit` expects.

use anyhow::{ensure, Result};
use hashing::ZERO_HASHES;
use ssz::{PersistentVector, SszHash as _, H256};
use thiserror::Error;
use typenum::Unsigned as _;
use types::phase0::{
    consts::{DepositContractTreeDepth, DepositProofLength},
    containers::DepositData,
    primitives::DepositIndex,
};

const DEPTH: usize = DepositContractTreeDepth::USIZE;
const MAX_DEPOSITS: DepositIndex = 1 << DEPTH;

#[derive(Clone, Default, Debug)]
pub struct DepositTree {
    // Left siblings of the path to the next leaf, as in the deposit contract.
    branch: [H256; DEPTH],
    // Kept so that proofs can be produced for any deposit in the tree.
    leaves: Vec<H256>,
    pub deposit_count: DepositIndex,
}

impl DepositTree {
    pub fn push_and_compute_root(
        &mut self,
        deposit_index: DepositIndex,
        data: DepositData,
    ) -> Result<H256> {
        self.push(deposit_index, data)?;
        Ok(self.root())
    }

    pub fn push(&mut self, deposit_index: DepositIndex, data: DepositData) -> Result<()> {
        ensure!(deposit_index < MAX_DEPOSITS, Error::Full { deposit_index });

        ensure!(
            deposit_index == self.deposit_count,
            Error::UnexpectedIndex {
                expected: self.deposit_count,
                actual: deposit_index,
            },
        );

        let leaf = data.hash_tree_root();

        self.leaves.push(leaf);
        self.deposit_count += 1;

        let mut node = leaf;
        let mut size = self.deposit_count;

        for height in 0..DEPTH {
            if size % 2 == 1 {
                self.branch[height] = node;
                break;
            }

            node = hashing::hash_256_256(self.branch[height], node);
            size /= 2;
        }

        Ok(())
    }

    /// The root with the deposit count mixed in, as stored in `Eth1Data.deposit_root`.
    #[must_use]
    pub fn root(&self) -> H256 {
        let mut node = H256::zero();
        let mut size = self.deposit_count;

        for height in 0..DEPTH {
            node = if size % 2 == 1 {
                hashing::hash_256_256(self.branch[height], node)
            } else {
                hashing::hash_256_256(node, ZERO_HASHES[height])
            };

            size /= 2;
        }

        mix_in_count(node, self.deposit_count)
    }

    /// Returns a proof of inclusion of the deposit at `deposit_index` against [`Self::root`].
    ///
    /// The last node of the proof is the deposit count.
    pub fn proof(
        &self,
        deposit_index: DepositIndex,
    ) -> Result<PersistentVector<H256, DepositProofLength>> {
        let leaf_index = usize::try_from(deposit_index)?;

        ensure!(
            leaf_index < self.leaves.len(),
            Error::MissingDeposit {
                deposit_index,
                deposit_count: self.deposit_count,
            },
        );

        let mut proof = Vec::with_capacity(DepositProofLength::USIZE);
        let mut layer = self.leaves.clone();
        let mut index = leaf_index;

        for zero_hash in ZERO_HASHES.iter().take(DEPTH).copied() {
            let sibling = layer.get(index ^ 1).copied().unwrap_or(zero_hash);

            proof.push(sibling);

            layer = layer
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or(zero_hash);
                    hashing::hash_256_256(pair[0], right)
                })
                .collect();

            index /= 2;
        }

        proof.push(count_chunk(self.deposit_count));

        PersistentVector::try_from_iter(proof).map_err(Into::into)
    }
}

fn mix_in_count(root: H256, deposit_count: DepositIndex) -> H256 {
    hashing::hash_256_256(root, count_chunk(deposit_count))
}

fn count_chunk(deposit_count: DepositIndex) -> H256 {
    let mut chunk = H256::zero();
    chunk[..size_of::<DepositIndex>()].copy_from_slice(&deposit_count.to_le_bytes());
    chunk
}

#[derive(Debug, Error)]
enum Error {
    #[error("attempted to add deposit with index {deposit_index} to full deposit tree")]
    Full { deposit_index: DepositIndex },
    #[error("expected deposit with index {expected}, received deposit with index {actual}")]
    UnexpectedIndex {
        expected: DepositIndex,
        actual: DepositIndex,
    },
    #[error("deposit {deposit_index} is not in tree with {deposit_count} deposits")]
    MissingDeposit {
        deposit_index: DepositIndex,
        deposit_count: DepositIndex,
    },
}
