// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    any::Any,
    fmt,
    rc::Rc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Readiness operations a file event can watch for or report.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

/// Values produced by coroutines and delivered by events.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<Value>),
    /// A file descriptor became ready for the operations in `ops`.
    Ready { fd: i32, ops: Interest },
    /// Member `member` of a composite event fired with `value`.
    Fired { member: usize, value: Box<Value> },
    /// Opaque application payload. Compared by identity.
    Object(Rc<dyn Any>),
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }

    /// Returns the operations present in both `self` and `other`.
    pub fn intersect(&self, other: Interest) -> Interest {
        Interest {
            readable: self.readable && other.readable,
            writable: self.writable && other.writable,
        }
    }

    /// Returns the operations present in either `self` or `other`.
    pub fn union(&self, other: Interest) -> Interest {
        Interest {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
        }
    }
}

impl Value {
    pub fn object<T: Any>(object: T) -> Self {
        Value::Object(Rc::new(object))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Downcasts an [Value::Object] payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.readable, self.writable) {
            (true, true) => write!(f, "{{read, write}}"),
            (true, false) => write!(f, "{{read}}"),
            (false, true) => write!(f, "{{write}}"),
            (false, false) => write!(f, "{{}}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Ready { fd: a, ops: x }, Value::Ready { fd: b, ops: y }) => a == b && x == y,
            (Value::Fired { member: a, value: x }, Value::Fired { member: b, value: y }) => a == b && x == y,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{:?}", b),
            Value::Int(i) => write!(f, "{:?}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Tuple(items) => {
                let mut tuple = f.debug_tuple("");
                for item in items.iter() {
                    tuple.field(item);
                }
                tuple.finish()
            },
            Value::Ready { fd, ops } => write!(f, "Ready(fd={:?}, ops={:?})", fd, ops),
            Value::Fired { member, value } => write!(f, "Fired({:?}, {:?})", member, value),
            Value::Object(object) => write!(f, "Object({:p})", Rc::as_ptr(object)),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
