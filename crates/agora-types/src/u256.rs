use crate::error::TypesError;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// 256-bit unsigned integer for token amounts and vote weights.
///
/// Stored as four u64 limbs, least significant first. Arithmetic is exposed
/// as `checked_*` methods; the operator impls saturate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const ZERO: Self = Self([0; 4]);
    pub const ONE: Self = Self([1, 0, 0, 0]);
    pub const MAX: Self = Self([u64::MAX; 4]);

    pub const fn from_u64(val: u64) -> Self {
        Self([val, 0, 0, 0])
    }

    pub const fn from_u128(val: u128) -> Self {
        Self([val as u64, (val >> 64) as u64, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        let mut out = [0u64; 4];
        let mut carry = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(rhs.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *limb = sum;
            carry = c1 || c2;
        }
        (!carry).then_some(Self(out))
    }

    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        let (diff, borrow) = self.overflowing_sub(rhs);
        (!borrow).then_some(diff)
    }

    fn wrapping_sub(&self, rhs: &Self) -> Self {
        self.overflowing_sub(rhs).0
    }

    fn overflowing_sub(&self, rhs: &Self) -> (Self, bool) {
        let mut out = [0u64; 4];
        let mut borrow = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(rhs.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *limb = diff;
            borrow = b1 || b2;
        }
        (Self(out), borrow)
    }

    pub fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        // Schoolbook multiplication into 8 limbs; anything above limb 3 overflows.
        let mut wide = [0u64; 8];
        for i in 0..4 {
            if self.0[i] == 0 {
                continue;
            }
            let mut carry = 0u128;
            for j in 0..4 {
                let cur = wide[i + j] as u128 + self.0[i] as u128 * rhs.0[j] as u128 + carry;
                wide[i + j] = cur as u64;
                carry = cur >> 64;
            }
            wide[i + 4] = carry as u64;
        }
        if wide[4..].iter().any(|&l| l != 0) {
            return None;
        }
        Some(Self([wide[0], wide[1], wide[2], wide[3]]))
    }

    /// Division with remainder. `None` when dividing by zero.
    pub fn checked_div_rem(&self, rhs: &Self) -> Option<(Self, Self)> {
        if rhs.is_zero() {
            return None;
        }
        if self < rhs {
            return Some((Self::ZERO, *self));
        }
        if let (Ok(a), Ok(b)) = (u128::try_from(*self), u128::try_from(*rhs)) {
            return Some((Self::from_u128(a / b), Self::from_u128(a % b)));
        }

        let mut quotient = Self::ZERO;
        let mut remainder = Self::ZERO;
        for bit in (0..self.bits()).rev() {
            let spilled = remainder.0[3] >> 63 == 1;
            remainder = remainder.shl1();
            if self.bit(bit) {
                remainder.0[0] |= 1;
            }
            if spilled || remainder >= *rhs {
                remainder = remainder.wrapping_sub(rhs);
                quotient.0[(bit / 64) as usize] |= 1 << (bit % 64);
            }
        }
        Some((quotient, remainder))
    }

    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        self.checked_div_rem(rhs).map(|(q, _)| q)
    }

    pub fn checked_rem(&self, rhs: &Self) -> Option<Self> {
        self.checked_div_rem(rhs).map(|(_, r)| r)
    }

    /// `self * numerator / denominator`, failing on overflow or a zero denominator.
    pub fn mul_div(&self, numerator: &Self, denominator: &Self) -> Option<Self> {
        self.checked_mul(numerator)?.checked_div(denominator)
    }

    pub fn saturating_add(&self, rhs: &Self) -> Self {
        self.checked_add(rhs).unwrap_or(Self::MAX)
    }

    pub fn saturating_sub(&self, rhs: &Self) -> Self {
        self.checked_sub(rhs).unwrap_or(Self::ZERO)
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return i as u32 * 64 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    fn bit(&self, pos: u32) -> bool {
        (self.0[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
    }

    fn shl1(&self) -> Self {
        let mut out = [0u64; 4];
        let mut carry = 0u64;
        for (i, limb) in out.iter_mut().enumerate() {
            *limb = (self.0[i] << 1) | carry;
            carry = self.0[i] >> 63;
        }
        Self(out)
    }

    /// Big-endian 32-byte encoding.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, chunk) in bytes.chunks_exact_mut(8).enumerate() {
            chunk.copy_from_slice(&self.0[3 - i].to_be_bytes());
        }
        bytes
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(chunk);
            limbs[3 - i] = u64::from_be_bytes(limb);
        }
        Self(limbs)
    }

    /// Parse a base-10 string.
    pub fn from_dec_str(s: &str) -> Result<Self, TypesError> {
        if s.is_empty() {
            return Err(TypesError::InvalidU256String(s.to_string()));
        }
        let ten = Self::from_u64(10);
        s.bytes().try_fold(Self::ZERO, |acc, b| {
            if !b.is_ascii_digit() {
                return Err(TypesError::InvalidU256String(s.to_string()));
            }
            acc.checked_mul(&ten)
                .and_then(|v| v.checked_add(&Self::from_u64((b - b'0') as u64)))
                .ok_or(TypesError::U256Overflow)
        })
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl From<u8> for U256 {
    fn from(val: u8) -> Self {
        Self::from_u64(val as u64)
    }
}

impl From<u32> for U256 {
    fn from(val: u32) -> Self {
        Self::from_u64(val as u64)
    }
}

impl From<u64> for U256 {
    fn from(val: u64) -> Self {
        Self::from_u64(val)
    }
}

impl From<u128> for U256 {
    fn from(val: u128) -> Self {
        Self::from_u128(val)
    }
}

impl TryFrom<U256> for u128 {
    type Error = TypesError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        if value.0[2] != 0 || value.0[3] != 0 {
            return Err(TypesError::U256Overflow);
        }
        Ok(((value.0[1] as u128) << 64) | value.0[0] as u128)
    }
}

impl TryFrom<U256> for u64 {
    type Error = TypesError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        if value.0[1..].iter().any(|&l| l != 0) {
            return Err(TypesError::U256Overflow);
        }
        Ok(value.0[0])
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        // Peel off 19 decimal digits at a time.
        let chunk = Self::from_u64(10_000_000_000_000_000_000);
        let mut parts = Vec::new();
        let mut n = *self;
        while !n.is_zero() {
            let (q, r) = n.checked_div_rem(&chunk).ok_or(fmt::Error)?;
            parts.push(r.0[0]);
            n = q;
        }
        let mut out = String::new();
        for (i, part) in parts.iter().rev().enumerate() {
            if i == 0 {
                out.push_str(&part.to_string());
            } else {
                out.push_str(&format!("{:019}", part));
            }
        }
        f.pad(&out)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self)
    }
}

impl fmt::LowerHex for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_be_bytes()))
    }
}

impl FromStr for U256 {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => {
                let digits = if digits.len() % 2 == 1 {
                    format!("0{}", digits)
                } else {
                    digits.to_string()
                };
                let bytes = hex::decode(digits)?;
                if bytes.len() > 32 {
                    return Err(TypesError::U256Overflow);
                }
                let mut padded = [0u8; 32];
                padded[32 - bytes.len()..].copy_from_slice(&bytes);
                Ok(Self::from_be_bytes(padded))
            }
            None => Self::from_dec_str(&s.replace('_', "")),
        }
    }
}

impl Add for U256 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(&rhs)
    }
}

impl Sub for U256 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(&rhs)
    }
}

impl AddAssign for U256 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for U256 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::iter::Sum for U256 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + v)
    }
}
