//! Running checksum over primitives, strings and value graphs.
//!
//! Values are hashed as their big-endian bytes into a BLAKE3 stream. Arrays are walked
//! depth first; every array gets a structural id on its first visit and later visits
//! only hash that id, so shared and cyclic graphs hash the same way on every runtime.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::{Type, Value};

/// NaN bit pattern Java's `Double.doubleToLongBits` canonicalizes to.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

#[derive(Debug, Clone)]
pub struct Checksum {
    hasher: blake3::Hasher,
    ignored: BTreeSet<String>,
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            ignored: BTreeSet::new(),
        }
    }

    /// A checksum that skips values whose Java type name is listed.
    pub fn ignoring(types: &[String]) -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            ignored: types.iter().cloned().collect(),
        }
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    pub fn value(&self) -> u64 {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_be_bytes(bytes)
    }

    pub fn update_bool(&mut self, v: bool) {
        self.hasher.update(&[u8::from(v)]);
    }

    pub fn update_int(&mut self, v: i32) {
        self.hasher.update(&v.to_be_bytes());
    }

    pub fn update_long(&mut self, v: i64) {
        self.hasher.update(&v.to_be_bytes());
    }

    pub fn update_double(&mut self, v: f64) {
        let bits = if v.is_nan() { CANONICAL_NAN } else { v.to_bits() };
        self.hasher.update(&bits.to_be_bytes());
    }

    /// Strings hash as their UTF-16 code units.
    pub fn update_str(&mut self, s: &str) {
        for unit in s.encode_utf16() {
            self.hasher.update(&unit.to_be_bytes());
        }
    }

    pub fn update(&mut self, value: &Value) {
        let mut ids: HashMap<usize, i32> = HashMap::new();
        let mut stack: Vec<Value> = vec![value.clone()];
        while let Some(v) = stack.pop() {
            let array = match &v {
                Value::Array(a) => a,
                scalar => {
                    self.update_scalar(scalar);
                    continue;
                }
            };
            let key = Rc::as_ptr(array) as usize;
            if let Some(id) = ids.get(&key) {
                self.update_int(*id);
                continue;
            }
            let id = i32::try_from(ids.len()).unwrap_or(i32::MAX);
            ids.insert(key, id);
            self.update_int(id);
            let arr = array.borrow();
            if self.is_ignored(&Type::array_of(arr.elem.clone())) {
                continue;
            }
            stack.extend(arr.data.iter().rev().cloned());
        }
    }

    fn update_scalar(&mut self, value: &Value) {
        if self.is_ignored(&value.ty()) && !matches!(value, Value::Null) {
            return;
        }
        match value {
            Value::Bool(b) => self.update_bool(*b),
            Value::Int(i) => self.update_int(*i),
            Value::Long(l) => self.update_long(*l),
            Value::Double(d) => self.update_double(*d),
            Value::Null => self.update_str("null"),
            Value::Array(_) => {}
        }
    }

    fn is_ignored(&self, ty: &Type) -> bool {
        !self.ignored.is_empty() && self.ignored.contains(&ty.java_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(values: &[Value]) -> u64 {
        let mut cs = Checksum::new();
        for v in values {
            cs.update(v);
        }
        cs.value()
    }

    #[test]
    fn same_inputs_same_value() {
        let a = [Value::Int(1), Value::Long(2), Value::Bool(true)];
        assert_eq!(sum(&a), sum(&a));
        assert_ne!(sum(&a), sum(&[Value::Int(1), Value::Long(3), Value::Bool(true)]));
        assert_ne!(sum(&[Value::Int(1), Value::Int(2)]), sum(&[Value::Int(2), Value::Int(1)]));
    }

    #[test]
    fn nan_is_canonical() {
        let quiet = f64::from_bits(0x7ff8_0000_0000_0001);
        assert_eq!(sum(&[Value::Double(f64::NAN)]), sum(&[Value::Double(quiet)]));
    }

    #[test]
    fn cyclic_graphs_terminate() {
        let outer = Value::array_from(Type::Object, vec![Value::Null]);
        outer.store(0, outer.clone()).unwrap();
        let first = sum(&[outer.clone()]);
        assert_eq!(first, sum(&[outer]));
    }

    #[test]
    fn shared_arrays_hash_by_structure() {
        let inner = Value::array_from(Type::Int, vec![Value::Int(4)]);
        let shared = Value::array_from(
            Type::array_of(Type::Int),
            vec![inner.clone(), inner],
        );
        let distinct = Value::array_from(
            Type::array_of(Type::Int),
            vec![
                Value::array_from(Type::Int, vec![Value::Int(4)]),
                Value::array_from(Type::Int, vec![Value::Int(4)]),
            ],
        );
        assert_ne!(sum(&[shared]), sum(&[distinct]));
    }

    #[test]
    fn ignored_types_are_skipped() {
        let mut cs = Checksum::ignoring(&["double".to_string()]);
        cs.update(&Value::Int(1));
        cs.update(&Value::Double(9.5));
        assert_eq!(cs.value(), sum(&[Value::Int(1)]));
    }
}
