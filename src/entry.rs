//! The value stored under each key in a [`crate::keyspace::Keyspace`].

use crate::sorted_set::SortedSet;

/// The payload a key can hold. New variants (e.g. lists, hashes) would be
/// added here without touching the keyspace's indexing.
pub enum Value {
    Str(Vec<u8>),
    SortedSet(SortedSet),
}

impl Value {
    /// A short, stable name for error messages and introspection.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::SortedSet(_) => "zset",
        }
    }
}

/// Returned when a command expects one value type but finds another
/// (e.g. `ZADD` against a key holding a plain string).
#[derive(Debug)]
pub struct WrongType;
