//! Call replay against the host ledger.

use agora_types::{Address, HashBuilder, Hash, U256};
use serde::{Deserialize, Serialize};

/// One opaque action: call `target` with `value` and `calldata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub target: Address,
    pub value: U256,
    #[serde(with = "hex_bytes")]
    pub calldata: Vec<u8>,
}

impl Call {
    pub fn new(target: Address, value: U256, calldata: Vec<u8>) -> Self {
        Self { target, value, calldata }
    }

    /// Zip parallel target/value/calldata sequences.
    ///
    /// Returns `None` when the lengths differ.
    pub fn zip(targets: &[Address], values: &[U256], calldatas: &[Vec<u8>]) -> Option<Vec<Call>> {
        if targets.len() != values.len() || targets.len() != calldatas.len() {
            return None;
        }
        Some(
            targets
                .iter()
                .zip(values)
                .zip(calldatas)
                .map(|((t, v), d)| Call::new(*t, *v, d.clone()))
                .collect(),
        )
    }
}

/// Feed a call batch into an identity hash.
pub(crate) fn hash_calls(builder: &mut HashBuilder, calls: &[Call]) {
    builder.count(calls.len());
    for call in calls {
        builder
            .fixed(call.target.as_bytes())
            .fixed(&call.value.to_be_bytes())
            .bytes(&call.calldata);
    }
}

/// Hash of a call batch under `domain`.
pub fn hash_batch(domain: &str, calls: &[Call]) -> Hash {
    let mut builder = HashBuilder::new(domain);
    hash_calls(&mut builder, calls);
    builder.finalize()
}

/// Host ledger able to run calls and roll back a failed batch.
pub trait CallHost {
    type Snapshot;

    /// Capture host state before a batch.
    fn snapshot(&self) -> Self::Snapshot;

    /// Restore state captured by [`CallHost::snapshot`].
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Run one call. An `Err` carries the revert reason.
    fn call(&mut self, caller: &Address, call: &Call) -> Result<Vec<u8>, String>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
