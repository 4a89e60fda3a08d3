//! Signature oracle interface.
//!
//! Keys and signatures are carried around in compressed form. Whether a signature is valid is
//! decided by a [`SignatureOracle`], which wraps whatever BLS backend the node is built with.

pub use crate::{
    error::Error,
    insecure::{InsecureOracle, SecretKey},
    oracle::SignatureOracle,
    public_key_bytes::PublicKeyBytes,
    signature_bytes::SignatureBytes,
};

pub type AggregateSignatureBytes = SignatureBytes;

mod error;
mod insecure;
mod oracle;
mod public_key_bytes;
mod signature_bytes;
