use crate::ConvertError;
use crate::Result;

/// Converts a `u64` to an 8-byte array in big-endian byte order.
///
/// Big-endian keys keep sled's lexicographic order identical to numeric order.
///
/// # Examples
/// ```
/// use config_relay::convert::safe_kv;
///
/// let bytes = safe_kv(0x1234_5678_9ABC_DEF0);
/// assert_eq!(bytes, [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
/// ```
pub const fn safe_kv(num: u64) -> [u8; 8] {
    num.to_be_bytes()
}

pub fn safe_vk<K: AsRef<[u8]>>(bytes: K) -> Result<u64> {
    let bytes = bytes.as_ref();
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ConvertError::InvalidLength(bytes.len()))?;
    Ok(u64::from_be_bytes(array))
}

/// Secondary index key of the release log: `watch_key 0x00 id`.
pub(crate) fn index_key(
    watch_key: &str,
    id: u64,
) -> Vec<u8> {
    let mut key = index_prefix(watch_key);
    key.extend_from_slice(&safe_kv(id));
    key
}

pub(crate) fn index_prefix(watch_key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(watch_key.len() + 9);
    prefix.extend_from_slice(watch_key.as_bytes());
    prefix.push(0);
    prefix
}

/// Extracts the id from the trailing eight bytes of an index key.
pub(crate) fn id_from_index_key(key: &[u8]) -> Result<u64> {
    if key.len() < 8 {
        return Err(ConvertError::InvalidLength(key.len()).into());
    }
    safe_vk(&key[key.len() - 8..])
}
