//! Proposal options.
//!
//! A proposal carries a ranked list of named options instead of a fixed
//! For/Against/Abstain triad. The proposal's [`OptionKind`] decides which
//! options are seeded at creation and what payload added options carry.

use agora_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Label of the seeded no-op option.
pub const AGAINST_LABEL: &str = "Against";
/// Label of the seeded approval option of `Single` proposals.
pub const FOR_LABEL: &str = "For";

/// Option type of a proposal. Ordinals are part of the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OptionKind {
    /// Classic Against/For vote, options carry no payload
    Single = 0,
    /// Options carry an address
    Address = 1,
    /// Options carry an unsigned 256-bit number
    UNumber = 2,
    /// Options carry a signed number
    Number = 3,
    /// Options carry a bool
    Boolean = 4,
}

impl OptionKind {
    /// Labels seeded when a proposal of this kind is created.
    pub fn seeded_labels(&self) -> &'static [&'static str] {
        match self {
            OptionKind::Single => &[AGAINST_LABEL, FOR_LABEL],
            OptionKind::Boolean => &[AGAINST_LABEL],
            OptionKind::Address | OptionKind::UNumber | OptionKind::Number => &[],
        }
    }

    /// Index of the seeded no-op option, if the kind has one.
    pub fn noop_option(&self) -> Option<u32> {
        match self {
            OptionKind::Single | OptionKind::Boolean => Some(0),
            _ => None,
        }
    }

    /// Check that `payload` fits this kind.
    pub fn check_payload(&self, payload: Option<&OptionValue>) -> Result<(), GovernanceError> {
        let ok = matches!(
            (self, payload),
            (OptionKind::Single, None)
                | (OptionKind::Boolean, Some(OptionValue::Bool(_)))
                | (OptionKind::Address, Some(OptionValue::Address(_)))
                | (OptionKind::UNumber, Some(OptionValue::UNumber(_)))
                | (OptionKind::Number, Some(OptionValue::Number(_)))
        );
        if ok {
            return Ok(());
        }
        Err(GovernanceError::InvalidOptionPayload(format!(
            "{:?} proposals take {}, got {}",
            self,
            self.expected_payload(),
            payload.map(|p| p.type_name()).unwrap_or("no payload"),
        )))
    }

    fn expected_payload(&self) -> &'static str {
        match self {
            OptionKind::Single => "no payload",
            OptionKind::Address => "an address",
            OptionKind::UNumber => "an unsigned number",
            OptionKind::Number => "a signed number",
            OptionKind::Boolean => "a bool",
        }
    }
}

impl TryFrom<u8> for OptionKind {
    type Error = GovernanceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OptionKind::Single,
            1 => OptionKind::Address,
            2 => OptionKind::UNumber,
            3 => OptionKind::Number,
            4 => OptionKind::Boolean,
            other => {
                return Err(GovernanceError::InvalidParameter(format!(
                    "unknown option kind {}",
                    other
                )))
            }
        })
    }
}

/// Typed payload attached to an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OptionValue {
    Bool(bool),
    Address(Address),
    UNumber(U256),
    Number(i128),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "a bool",
            OptionValue::Address(_) => "an address",
            OptionValue::UNumber(_) => "an unsigned number",
            OptionValue::Number(_) => "a signed number",
        }
    }

    /// Encode as a single 32-byte big-endian word (two's complement for
    /// signed numbers).
    pub fn encode_word(&self) -> [u8; 32] {
        match self {
            OptionValue::Bool(b) => U256::from(*b as u64).to_be_bytes(),
            OptionValue::Address(a) => a.to_word(),
            OptionValue::UNumber(n) => n.to_be_bytes(),
            OptionValue::Number(n) => {
                let mut word = if *n < 0 { [0xff; 32] } else { [0u8; 32] };
                word[16..].copy_from_slice(&n.to_be_bytes());
                word
            }
        }
    }
}

/// One named choice of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOption {
    /// Position in the proposal's option list
    pub index: u32,
    /// Human readable label
    pub label: String,
    /// Typed payload used when encoding the winning action
    pub payload: Option<OptionValue>,
}
