//! Key encodings for record and index families
//!
//! Integer keys are stored big-endian so the natural RocksDB key order is
//! numeric order; string keys are raw UTF-8. Index keys join the indexed
//! value and the primary key with a NUL byte, which cannot appear inside
//! either side.

/// Separator between the indexed value and the primary key.
pub const INDEX_SEPARATOR: u8 = 0x00;

/// A type usable as a primary key.
pub trait StoreKey: Clone + Send + Sync + 'static {
    fn encode(&self) -> Vec<u8>;
}

impl StoreKey for u32 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl StoreKey for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Full index key for (value, primary key).
pub fn index_key(value: &str, primary_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(value.len() + 1 + primary_key.len());
    key.extend_from_slice(value.as_bytes());
    key.push(INDEX_SEPARATOR);
    key.extend_from_slice(primary_key);
    key
}

/// Prefix selecting every index entry for an exact value.
pub fn index_prefix(value: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(value.len() + 1);
    prefix.extend_from_slice(value.as_bytes());
    prefix.push(INDEX_SEPARATOR);
    prefix
}

/// The primary-key suffix of a full index key, if it has the expected
/// prefix.
pub fn primary_key_of<'a>(full_key: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    full_key.strip_prefix(prefix)
}
