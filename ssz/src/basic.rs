use ethereum_types::{H256, H32};

use crate::porcelain::SszHash;

impl SszHash for u64 {
    const PACKING_FACTOR: usize = H256::len_bytes() / size_of::<Self>();

    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk[..size_of::<Self>()].copy_from_slice(&self.to_le_bytes());
        chunk
    }

    fn pack<'values>(values: impl IntoIterator<Item = &'values Self>) -> Vec<H256> {
        let mut chunks = vec![];

        for (position, value) in values.into_iter().enumerate() {
            let offset = position % Self::PACKING_FACTOR * size_of::<Self>();

            if offset == 0 {
                chunks.push(H256::zero());
            }

            if let Some(chunk) = chunks.last_mut() {
                chunk[offset..offset + size_of::<Self>()].copy_from_slice(&value.to_le_bytes());
            }
        }

        chunks
    }
}

impl SszHash for u8 {
    const PACKING_FACTOR: usize = H256::len_bytes();

    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk.as_mut()[0] = *self;
        chunk
    }

    fn pack<'values>(values: impl IntoIterator<Item = &'values Self>) -> Vec<H256> {
        let bytes = values.into_iter().copied().collect::<Vec<_>>();

        bytes
            .chunks(Self::PACKING_FACTOR)
            .map(|bytes| {
                let mut chunk = H256::zero();
                chunk[..bytes.len()].copy_from_slice(bytes);
                chunk
            })
            .collect()
    }
}

impl SszHash for bool {
    fn hash_tree_root(&self) -> H256 {
        u8::from(*self).hash_tree_root()
    }
}

impl SszHash for H32 {
    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk[..Self::len_bytes()].copy_from_slice(self.as_bytes());
        chunk
    }
}

impl SszHash for H256 {
    fn hash_tree_root(&self) -> H256 {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_values_are_packed_four_per_chunk() {
        let chunks = u64::pack(&[1, 2, 3, 4, 5]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][0], 1);
        assert_eq!(chunks[0][8], 2);
        assert_eq!(chunks[0][24], 4);
        assert_eq!(chunks[1][0], 5);
        assert_eq!(chunks[1][8], 0);
    }

    #[test]
    fn h32_is_left_aligned() {
        let root = H32([1, 2, 3, 4]).hash_tree_root();

        assert_eq!(&root[..4], &[1, 2, 3, 4]);
        assert!(root[4..].iter().all(|byte| *byte == 0));
    }
}
