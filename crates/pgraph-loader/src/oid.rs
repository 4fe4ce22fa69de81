//! External vertex ids.

use std::fmt;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::error::{LoadError, Result};

/// A user-supplied vertex id. Integers order before strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Oid {
    Int(i64),
    Str(String),
}

impl Oid {
    /// Stable hash used by the hash partitioner.
    ///
    /// Integers hash to themselves so that partitioning by `mod fnum`
    /// follows the numeric value; strings use seeded xxHash64.
    pub fn stable_hash(&self) -> u64 {
        match self {
            Oid::Int(v) => *v as u64,
            Oid::Str(s) => string_hash(s.as_bytes()),
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Oid::Int(v) => write!(f, "{v}"),
            Oid::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Oid {
    fn from(v: i64) -> Self {
        Oid::Int(v)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Oid::Str(s.to_string())
    }
}

/// Seed of the string hash. Changing it repartitions every string id.
pub const OID_HASH_SEED: u64 = 0;

/// xxHash64 of `bytes` under [`OID_HASH_SEED`].
pub fn string_hash(bytes: &[u8]) -> u64 {
    xxh64(bytes, OID_HASH_SEED)
}

/// Whether a column of this type can hold vertex ids.
pub fn is_id_type(data_type: &DataType) -> bool {
    data_type.is_integer() || matches!(data_type, DataType::Utf8 | DataType::LargeUtf8)
}

/// Read an id column into oids, in row order. Nulls are rejected.
pub fn oids_from_column(column: &ArrayRef) -> Result<Vec<Oid>> {
    if column.null_count() > 0 {
        return Err(LoadError::Invalid(format!(
            "id column holds {} null value(s)",
            column.null_count()
        )));
    }
    let data_type = column.data_type();
    if data_type.is_integer() {
        // UInt64 above i64::MAX fails the checked cast instead of wrapping.
        let options = arrow::compute::CastOptions {
            safe: false,
            ..Default::default()
        };
        let ints = arrow::compute::cast_with_options(column, &DataType::Int64, &options)?;
        return Ok(ints
            .as_primitive::<Int64Type>()
            .values()
            .iter()
            .map(|v| Oid::Int(*v))
            .collect());
    }
    match data_type {
        DataType::Utf8 => Ok(column
            .as_string::<i32>()
            .iter()
            .flatten()
            .map(Oid::from)
            .collect()),
        DataType::LargeUtf8 => {
            let strings = cast(column, &DataType::Utf8)?;
            Ok(strings.as_string::<i32>().iter().flatten().map(Oid::from).collect())
        }
        other => Err(LoadError::Type(format!("{other} cannot be used as a vertex id type"))),
    }
}
