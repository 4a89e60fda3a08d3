use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hexadecimal string")]
    InvalidHex(#[from] hex::FromHexError),
}
