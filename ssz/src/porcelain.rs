use ethereum_types::H256;

pub trait SszHash {
    /// Number of values of this type that fit in one 32 byte chunk.
    ///
    /// Composite types occupy a whole chunk each. Basic types are packed.
    const PACKING_FACTOR: usize = 1;

    fn hash_tree_root(&self) -> H256;

    /// Packs a homogeneous sequence into chunks.
    fn pack<'values>(values: impl IntoIterator<Item = &'values Self>) -> Vec<H256>
    where
        Self: 'values,
    {
        values.into_iter().map(Self::hash_tree_root).collect()
    }
}

impl<T: SszHash> SszHash for std::sync::Arc<T> {
    fn hash_tree_root(&self) -> H256 {
        self.as_ref().hash_tree_root()
    }
}
