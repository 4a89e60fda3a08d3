use core::{
    fmt::{Debug, Formatter, Result as FmtResult},
    str::FromStr,
};

use derive_more::From;
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use ssz::SszHash;

use crate::error::Error;

pub const COMPRESSED_SIZE: usize = 48;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct PublicKeyBytes(pub [u8; COMPRESSED_SIZE]);

impl Default for PublicKeyBytes {
    fn default() -> Self {
        Self([0; COMPRESSED_SIZE])
    }
}

impl AsRef<[u8]> for PublicKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for PublicKeyBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKeyBytes {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let digits = string.strip_prefix("0x").unwrap_or(string);
        Self::from_slice(&hex::decode(digits)?)
    }
}

impl Serialize for PublicKeyBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for PublicKeyBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

impl SszHash for PublicKeyBytes {
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(&self.0, 2)
    }
}

impl PublicKeyBytes {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| Error::InvalidLength {
                expected: COMPRESSED_SIZE,
                actual: bytes.len(),
            })
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; COMPRESSED_SIZE] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_parses_back() {
        let public_key = PublicKeyBytes([7; COMPRESSED_SIZE]);
        let parsed = format!("{public_key:?}")
            .parse::<PublicKeyBytes>()
            .expect("debug output is valid hexadecimal");

        assert_eq!(parsed, public_key);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(PublicKeyBytes::from_slice(&[0; 47]).is_err());
    }
}
