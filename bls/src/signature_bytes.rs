use core::{
    fmt::{Debug, Formatter, Result as FmtResult},
    str::FromStr,
};

use derive_more::From;
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use ssz::SszHash;

use crate::error::Error;

pub const SIGNATURE_SIZE: usize = 96;

#[derive(Clone, Copy, PartialEq, Eq, Hash, From)]
pub struct SignatureBytes(pub [u8; SIGNATURE_SIZE]);

impl Default for SignatureBytes {
    fn default() -> Self {
        Self::empty()
    }
}

impl AsRef<[u8]> for SignatureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for SignatureBytes {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let digits = string.strip_prefix("0x").unwrap_or(string);
        let bytes = hex::decode(digits)?;
        let actual = bytes.len();

        bytes
            .try_into()
            .map(Self)
            .map_err(|_| Error::InvalidLength {
                expected: SIGNATURE_SIZE,
                actual,
            })
    }
}

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

impl SszHash for SignatureBytes {
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(&self.0, 4)
    }
}

impl SignatureBytes {
    /// The compressed point at infinity. Used as the signature of an empty aggregate.
    #[must_use]
    pub const fn empty() -> Self {
        let mut bytes = [0; SIGNATURE_SIZE];
        bytes[0] = 0xc0;
        Self(bytes)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }
}
