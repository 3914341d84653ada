//! Agora Types - value types shared by the governance engine.
//!
//! This crate provides:
//! - Addresses (20-byte account identifiers, hex encoded)
//! - Hashes (32-byte blake3 digests used as proposal and operation ids)
//! - U256 (256-bit unsigned integer for token amounts and vote weights)

pub mod address;
pub mod hash;
pub mod u256;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use hash::{Hash, HashBuilder};
pub use u256::U256;
pub use error::TypesError;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Hash, HashBuilder, TypesError, U256};
}
