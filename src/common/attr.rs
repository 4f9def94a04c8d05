//! Attribute types and comparison operators.
//!
//! Keys and scanned attributes are raw little-endian byte strings of a fixed
//! length; [`AttrType`] says how to order them and [`CompOp`] evaluates a
//! predicate against a constant.

use std::cmp::Ordering;
use std::fmt;

/// Type of an indexed or scanned attribute.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// `i32`, 4 bytes little-endian.
    Int = 0,
    /// `f32`, 4 bytes little-endian.
    Float = 1,
    /// Fixed-length byte string, NUL-padded.
    String = 2,
}

impl AttrType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AttrType::Int),
            1 => Some(AttrType::Float),
            2 => Some(AttrType::String),
            _ => None,
        }
    }

    /// Required attribute length, if the type has one.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            AttrType::Int | AttrType::Float => Some(4),
            AttrType::String => None,
        }
    }

    /// Total order used for B+tree keys.
    ///
    /// Floats use IEEE total ordering with `-0.0` folded into `0.0`, so every
    /// key (NaN included) has a place in a node and zeros compare equal.
    /// Strings compare like `strncmp` over `a.len()` bytes.
    ///
    /// # Panics
    /// Panics if either slice is shorter than the type's fixed length.
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            AttrType::Int => read_i32(a).cmp(&read_i32(b)),
            AttrType::Float => fold_zero(read_f32(a)).total_cmp(&fold_zero(read_f32(b))),
            AttrType::String => compare_str(a, b),
        }
    }

    /// Predicate ordering: like [`compare`](Self::compare) but NaN is
    /// unordered.
    pub fn partial_compare(self, a: &[u8], b: &[u8]) -> Option<Ordering> {
        match self {
            AttrType::Float => read_f32(a).partial_cmp(&read_f32(b)),
            _ => Some(self.compare(a, b)),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Int => "INT",
            AttrType::Float => "FLOAT",
            AttrType::String => "STRING",
        };
        f.write_str(name)
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn fold_zero(v: f32) -> f32 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

fn compare_str(a: &[u8], b: &[u8]) -> Ordering {
    let len = a.len().min(b.len());
    for i in 0..len {
        match a[i].cmp(&b[i]) {
            Ordering::Equal if a[i] == 0 => return Ordering::Equal,
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Comparison operator of a scan predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    /// Matches everything.
    NoOp,
}

impl CompOp {
    /// Evaluate `lhs <op> rhs` under `attr_type`.
    pub fn eval(self, attr_type: AttrType, lhs: &[u8], rhs: &[u8]) -> bool {
        if self == CompOp::NoOp {
            return true;
        }
        let ord = attr_type.partial_compare(lhs, rhs);
        match self {
            CompOp::Eq => ord == Some(Ordering::Equal),
            CompOp::Lt => ord == Some(Ordering::Less),
            CompOp::Gt => ord == Some(Ordering::Greater),
            CompOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            CompOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            CompOp::Ne => ord != Some(Ordering::Equal),
            CompOp::NoOp => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn float(v: f32) -> [u8; 4] {
        v.to_le_bytes()
    }

    #[test]
    fn test_attr_type_from_u8() {
        assert_eq!(AttrType::from_u8(0), Some(AttrType::Int));
        assert_eq!(AttrType::from_u8(2), Some(AttrType::String));
        assert_eq!(AttrType::from_u8(9), None);
    }

    #[test]
    fn test_int_compare_is_numeric() {
        assert_eq!(AttrType::Int.compare(&int(-5), &int(3)), Ordering::Less);
        assert_eq!(AttrType::Int.compare(&int(256), &int(1)), Ordering::Greater);
        assert_eq!(AttrType::Int.compare(&int(7), &int(7)), Ordering::Equal);
    }

    #[test]
    fn test_float_compare() {
        assert_eq!(AttrType::Float.compare(&float(1.5), &float(2.25)), Ordering::Less);
        assert_eq!(AttrType::Float.partial_compare(&float(f32::NAN), &float(1.0)), None);
    }

    #[test]
    fn test_float_zeros_compare_equal() {
        let t = AttrType::Float;
        assert_eq!(t.compare(&float(-0.0), &float(0.0)), Ordering::Equal);
        assert_eq!(t.compare(&float(-0.0), &float(-1.0)), Ordering::Greater);
        assert_eq!(t.compare(&float(f32::NAN), &float(f32::NAN)), Ordering::Equal);
        assert_eq!(t.compare(&float(f32::INFINITY), &float(f32::NAN)), Ordering::Less);
        assert!(CompOp::Eq.eval(t, &float(-0.0), &float(0.0)));
    }

    #[test]
    fn test_string_compare_stops_at_nul() {
        assert_eq!(AttrType::String.compare(b"abc\0x", b"abc\0y"), Ordering::Equal);
        assert_eq!(AttrType::String.compare(b"abd\0\0", b"abc\0\0"), Ordering::Greater);
        assert_eq!(AttrType::String.compare(b"ab\0\0", b"abc\0"), Ordering::Less);
    }

    #[test]
    fn test_comp_op_eval() {
        let t = AttrType::Int;
        assert!(CompOp::Eq.eval(t, &int(4), &int(4)));
        assert!(CompOp::Lt.eval(t, &int(3), &int(4)));
        assert!(CompOp::Le.eval(t, &int(4), &int(4)));
        assert!(CompOp::Ge.eval(t, &int(5), &int(4)));
        assert!(!CompOp::Gt.eval(t, &int(4), &int(4)));
        assert!(CompOp::Ne.eval(t, &int(1), &int(4)));
        assert!(CompOp::NoOp.eval(t, &int(1), &int(4)));
    }

    #[test]
    fn test_nan_never_equal() {
        let nan = float(f32::NAN);
        assert!(!CompOp::Eq.eval(AttrType::Float, &nan, &nan));
        assert!(CompOp::Ne.eval(AttrType::Float, &nan, &nan));
        assert!(!CompOp::Le.eval(AttrType::Float, &nan, &float(0.0)));
    }
}
