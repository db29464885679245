//! Runtime values and static types of template programs.

use serde::{Deserialize, Serialize};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{JattackError, JattackResult, Throwable};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Void,
    Boolean,
    Int,
    Long,
    Double,
    /// `java.lang.Object`; accepts any value.
    Object,
    Array(Box<Type>),
}

impl Type {
    pub fn array_of(elem: Type) -> Self {
        Self::Array(Box::new(elem))
    }

    /// JVM field descriptor.
    pub fn descriptor(&self) -> String {
        match self {
            Self::Void => "V".to_string(),
            Self::Boolean => "Z".to_string(),
            Self::Int => "I".to_string(),
            Self::Long => "J".to_string(),
            Self::Double => "D".to_string(),
            Self::Object => "Ljava/lang/Object;".to_string(),
            Self::Array(elem) => format!("[{}", elem.descriptor()),
        }
    }

    pub fn java_name(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Int => "int".to_string(),
            Self::Long => "long".to_string(),
            Self::Double => "double".to_string(),
            Self::Object => "Object".to_string(),
            Self::Array(elem) => format!("{}[]", elem.java_name()),
        }
    }

    /// Occupies two local slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Double)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int | Self::Long)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object | Self::Array(_))
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Self::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Assignment compatibility, including primitive widening.
    pub fn accepts(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Object, t) => *t != Self::Void,
            (Self::Long, Self::Int) => true,
            (Self::Double, Self::Int | Self::Long) => true,
            _ => false,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            Self::Boolean => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Double => Value::Double(0.0),
            Self::Void | Self::Object | Self::Array(_) => Value::Null,
        }
    }

    /// Result type of binary numeric promotion.
    pub fn promote(a: &Type, b: &Type) -> Option<Type> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        Some(if *a == Self::Double || *b == Self::Double {
            Self::Double
        } else if *a == Self::Long || *b == Self::Long {
            Self::Long
        } else {
            Self::Int
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.java_name())
    }
}

/// A literal constant as written in templates and node choices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Lit {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Null,
}

impl Lit {
    pub fn ty(&self) -> Type {
        match self {
            Self::Bool(_) => Type::Boolean,
            Self::Int(_) => Type::Int,
            Self::Long(_) => Type::Long,
            Self::Double(_) => Type::Double,
            Self::Null => Type::Object,
        }
    }

    pub fn to_value(&self) -> Value {
        match *self {
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Long(l) => Value::Long(l),
            Self::Double(d) => Value::Double(d),
            Self::Null => Value::Null,
        }
    }

    /// Builds a literal of type `ty` from an integer in range.
    pub fn integral(ty: &Type, v: i64) -> JattackResult<Lit> {
        match ty {
            Type::Int => i32::try_from(v)
                .map(Lit::Int)
                .map_err(|_| JattackError::InvalidArgument(format!("{v} does not fit in int"))),
            Type::Long => Ok(Lit::Long(v)),
            other => Err(JattackError::InvalidArgument(format!(
                "no integral literal of type {other}"
            ))),
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Double(d) if d.is_nan() => f.write_str("Double.NaN"),
            Self::Double(d) if d == f64::INFINITY => f.write_str("Double.POSITIVE_INFINITY"),
            Self::Double(d) if d == f64::NEG_INFINITY => f.write_str("Double.NEGATIVE_INFINITY"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::Null => f.write_str("null"),
        }
    }
}

pub type ArrayRef = Rc<RefCell<Array>>;

#[derive(Debug)]
pub struct Array {
    pub elem: Type,
    pub data: Vec<Value>,
}

#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Array(ArrayRef),
    Null,
}

impl Value {
    pub fn new_array(elem: Type, len: i64) -> Result<Value, Throwable> {
        if len < 0 {
            return Err(Throwable::negative_array_size(len));
        }
        let data = (0..len).map(|_| elem.default_value()).collect();
        Ok(Self::array_from(elem, data))
    }

    pub fn array_from(elem: Type, data: Vec<Value>) -> Value {
        Self::Array(Rc::new(RefCell::new(Array { elem, data })))
    }

    pub fn ty(&self) -> Type {
        match self {
            Self::Bool(_) => Type::Boolean,
            Self::Int(_) => Type::Int,
            Self::Long(_) => Type::Long,
            Self::Double(_) => Type::Double,
            Self::Array(a) => Type::array_of(a.borrow().elem.clone()),
            Self::Null => Type::Object,
        }
    }

    pub fn as_bool(&self) -> JattackResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }

    /// Integral value widened to `i64`.
    pub fn as_i64(&self) -> JattackResult<i64> {
        match self {
            Self::Int(i) => Ok(i64::from(*i)),
            Self::Long(l) => Ok(*l),
            other => Err(mismatch("integral", other)),
        }
    }

    pub fn as_f64(&self) -> JattackResult<f64> {
        match self {
            Self::Int(i) => Ok(f64::from(*i)),
            Self::Long(l) => Ok(*l as f64),
            Self::Double(d) => Ok(*d),
            other => Err(mismatch("numeric", other)),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayRef, Throwable> {
        match self {
            Self::Array(a) => Ok(a),
            _ => Err(Throwable::null_pointer()),
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(a.borrow().data.len()),
            _ => None,
        }
    }

    pub fn load(&self, index: i64) -> JattackResult<Value> {
        let arr = self.as_array()?.borrow();
        let len = arr.data.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| arr.data.get(i).cloned())
            .ok_or_else(|| Throwable::array_index(index, len).into())
    }

    pub fn store(&self, index: i64, value: Value) -> JattackResult<()> {
        let mut arr = self.as_array()?.borrow_mut();
        let len = arr.data.len();
        match usize::try_from(index).ok().filter(|i| *i < len) {
            Some(i) => {
                arr.data[i] = value;
                Ok(())
            }
            None => Err(Throwable::array_index(index, len).into()),
        }
    }

    /// Java conversion to `to`: identity, primitive widening and casts.
    pub fn convert(&self, to: &Type) -> JattackResult<Value> {
        Ok(match (to, self) {
            (Type::Int, Self::Int(_))
            | (Type::Long, Self::Long(_))
            | (Type::Double, Self::Double(_))
            | (Type::Boolean, Self::Bool(_)) => self.clone(),
            (Type::Int, Self::Long(l)) => Self::Int(*l as i32),
            (Type::Int, Self::Double(d)) => Self::Int(*d as i32),
            (Type::Long, Self::Int(i)) => Self::Long(i64::from(*i)),
            (Type::Long, Self::Double(d)) => Self::Long(*d as i64),
            (Type::Double, Self::Int(i)) => Self::Double(f64::from(*i)),
            (Type::Double, Self::Long(l)) => Self::Double(*l as f64),
            (Type::Object, v) => v.clone(),
            (Type::Array(_), Self::Null) => Self::Null,
            (Type::Array(_), Self::Array(_)) if to.accepts(&self.ty()) => self.clone(),
            (to, v) => {
                return Err(Throwable::class_cast(&v.ty().java_name(), &to.java_name()).into())
            }
        })
    }

    /// Applies binary numeric promotion to a pair of operands.
    pub fn promote(l: &Value, r: &Value) -> JattackResult<(Value, Value)> {
        let ty = Type::promote(&l.ty(), &r.ty())
            .ok_or_else(|| JattackError::InvalidArgument(format!("cannot promote {l:?} and {r:?}")))?;
        Ok((l.convert(&ty)?, r.convert(&ty)?))
    }

    /// Reference identity for arrays, value equality for primitives.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            _ => false,
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> JattackError {
    JattackError::InvalidArgument(format!("expected {expected} value, got {got:?}"))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Double(d) => write!(f, "{d:?}"),
            // Arrays may be cyclic through Object[] slots.
            Self::Array(a) => match a.try_borrow() {
                Ok(arr) => write!(f, "{}[{}]", arr.elem.java_name(), arr.data.len()),
                Err(_) => f.write_str("array(borrowed)"),
            },
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<Lit> for Value {
    fn from(lit: Lit) -> Self {
        lit.to_value()
    }
}
