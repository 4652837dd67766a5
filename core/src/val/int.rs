//! Arbitrary-precision integers with an i64 fast path.
//!
//! Invariant: the `Big` representation is used only for values outside the
//! i64 range, so each mathematical integer has exactly one representation.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::error::EvalError;

#[derive(Debug, Clone)]
pub enum Int {
    Small(i64),
    Big(Box<BigInt>),
}

impl Int {
    pub fn from_big(b: BigInt) -> Int {
        match b.to_i64() {
            Some(v) => Int::Small(v),
            None => Int::Big(Box::new(b)),
        }
    }

    pub fn from_str_radix(digits: &str, radix: u32) -> Result<Int, ()> {
        if let Ok(v) = i64::from_str_radix(digits, radix) {
            return Ok(Int::Small(v));
        }
        match BigInt::parse_bytes(digits.as_bytes(), radix) {
            Some(b) => Ok(Int::from_big(b)),
            None => Err(()),
        }
    }

    /// Exact conversion; `None` unless the value fits in i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Int::Small(v) => Some(*v),
            Int::Big(_) => None, // out of i64 range by invariant
        }
    }

    /// Exact conversion; `None` for negatives and values above u64::MAX.
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Int::Small(v) => u64::try_from(*v).ok(),
            Int::Big(b) => b.to_u64(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Int::Small(v) => *v as f64,
            Int::Big(b) => b.to_f64().unwrap_or(f64::INFINITY),
        }
    }

    pub fn to_big(&self) -> BigInt {
        match self {
            Int::Small(v) => BigInt::from(*v),
            Int::Big(b) => (**b).clone(),
        }
    }

    /// Exact integer from a finite float with zero fraction.
    pub fn from_f64_exact(f: f64) -> Option<Int> {
        if !f.is_finite() || f.fract() != 0.0 {
            return None;
        }
        BigInt::from_f64(f).map(Int::from_big)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int::Small(v) => *v == 0,
            Int::Big(b) => b.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Int::Small(v) => *v < 0,
            Int::Big(b) => b.is_negative(),
        }
    }

    pub fn checked_neg(&self) -> Int {
        match self {
            Int::Small(v) => match v.checked_neg() {
                Some(n) => Int::Small(n),
                None => Int::from_big(-BigInt::from(*v)),
            },
            Int::Big(b) => Int::from_big(-(**b).clone()),
        }
    }

    pub fn add(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => match a.checked_add(*b) {
                Some(v) => Int::Small(v),
                None => Int::from_big(BigInt::from(*a) + BigInt::from(*b)),
            },
            _ => Int::from_big(self.to_big() + other.to_big()),
        }
    }

    pub fn sub(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => match a.checked_sub(*b) {
                Some(v) => Int::Small(v),
                None => Int::from_big(BigInt::from(*a) - BigInt::from(*b)),
            },
            _ => Int::from_big(self.to_big() - other.to_big()),
        }
    }

    pub fn mul(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => match a.checked_mul(*b) {
                Some(v) => Int::Small(v),
                None => Int::from_big(BigInt::from(*a) * BigInt::from(*b)),
            },
            _ => Int::from_big(self.to_big() * other.to_big()),
        }
    }

    /// Python-style floored division: the result rounds toward negative
    /// infinity, so the remainder takes the divisor's sign.
    pub fn floor_div(&self, other: &Int) -> Result<Int, EvalError> {
        if other.is_zero() {
            return Err(EvalError::value("floored division by zero"));
        }
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => {
                if *a == i64::MIN && *b == -1 {
                    return Ok(Int::from_big(-BigInt::from(*a)));
                }
                Ok(Int::Small(a.div_floor(b)))
            }
            _ => Ok(Int::from_big(self.to_big().div_floor(&other.to_big()))),
        }
    }

    pub fn mod_floor(&self, other: &Int) -> Result<Int, EvalError> {
        if other.is_zero() {
            return Err(EvalError::value("integer modulo by zero"));
        }
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => {
                if *a == i64::MIN && *b == -1 {
                    return Ok(Int::Small(0));
                }
                Ok(Int::Small(a.mod_floor(b)))
            }
            _ => Ok(Int::from_big(self.to_big().mod_floor(&other.to_big()))),
        }
    }

    pub fn bitand(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a & b),
            _ => Int::from_big(self.to_big() & other.to_big()),
        }
    }

    pub fn bitor(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a | b),
            _ => Int::from_big(self.to_big() | other.to_big()),
        }
    }

    pub fn bitxor(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a ^ b),
            _ => Int::from_big(self.to_big() ^ other.to_big()),
        }
    }

    pub fn invert(&self) -> Int {
        // ~x == -x - 1
        self.checked_neg().sub(&Int::Small(1))
    }

    pub fn shl(&self, count: &Int) -> Result<Int, EvalError> {
        let n = Self::shift_count(count)?;
        match self {
            Int::Small(a) if n < 64 => match a.checked_shl(n as u32) {
                Some(v) if (v >> n) == *a => Ok(Int::Small(v)),
                _ => Ok(Int::from_big(BigInt::from(*a) << n)),
            },
            _ => Ok(Int::from_big(self.to_big() << n)),
        }
    }

    pub fn shr(&self, count: &Int) -> Result<Int, EvalError> {
        let n = Self::shift_count(count)?;
        match self {
            Int::Small(a) => {
                let shift = n.min(63);
                Ok(Int::Small(a >> shift))
            }
            Int::Big(b) => Ok(Int::from_big((**b).clone() >> n)),
        }
    }

    fn shift_count(count: &Int) -> Result<usize, EvalError> {
        if count.is_negative() {
            return Err(EvalError::value("negative shift count"));
        }
        match count.to_u64() {
            Some(n) if n < 512 => Ok(n as usize),
            _ => Err(EvalError::value("shift count too large")),
        }
    }

    pub fn cmp_int(&self, other: &Int) -> Ordering {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => a.cmp(b),
            (Int::Small(_), Int::Big(b)) => {
                if b.is_negative() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Int::Big(a), Int::Small(_)) => {
                if a.is_negative() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Int::Big(a), Int::Big(b)) => a.cmp(b),
        }
    }

    /// Deterministic 32-bit hash; stable within a process by construction.
    pub fn hash32(&self) -> u32 {
        match self {
            Int::Small(v) => {
                let mut x = *v as u64;
                x ^= x >> 33;
                x = x.wrapping_mul(0xff51afd7ed558ccd);
                x ^= x >> 33;
                (x as u32) ^ ((x >> 32) as u32)
            }
            Int::Big(b) => {
                let bytes = b.to_signed_bytes_le();
                let mut h: u32 = 0x811c_9dc5;
                for byte in bytes {
                    h = h.wrapping_mul(31).wrapping_add(byte as u32);
                }
                h
            }
        }
    }
}

impl PartialEq for Int {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_int(other) == Ordering::Equal
    }
}

impl Eq for Int {}

impl PartialOrd for Int {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_int(other))
    }
}

impl Ord for Int {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_int(other)
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::Small(v) => write!(f, "{}", v),
            Int::Big(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Int {
    fn from(v: i64) -> Int {
        Int::Small(v)
    }
}

impl From<i32> for Int {
    fn from(v: i32) -> Int {
        Int::Small(v as i64)
    }
}

impl From<u64> for Int {
    fn from(v: u64) -> Int {
        match i64::try_from(v) {
            Ok(s) => Int::Small(s),
            Err(_) => Int::Big(Box::new(BigInt::from(v))),
        }
    }
}

impl From<usize> for Int {
    fn from(v: usize) -> Int {
        Int::from(v as u64)
    }
}

impl From<BigInt> for Int {
    fn from(b: BigInt) -> Int {
        Int::from_big(b)
    }
}
