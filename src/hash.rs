//! Content addressing - stable surrogate keys derived from record content
//!
//! A key is the CRC-64/ISO checksum over a canonical encoding of the
//! record: numeric fields as fixed-width big-endian integers in a fixed
//! order, followed by the raw bytes of string fields. Identical content
//! always maps to the same key, so shared sub-records deduplicate and no
//! sequence has to be coordinated between writers.
//!
//! Collisions between genuinely different content are not detected.

use crc::{CRC_64_GO_ISO, Crc};

use crate::message::StoredMessageAttribute;

/// Storage-internal key of an attribute or quote row
pub type SurrogateKey = i64;

/// Reserved key meaning "no reference"; also the key of the sentinel rows
pub const NO_REFERENCE: SurrogateKey = 0;

pub(crate) static CRC64_ISO: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Accumulates the canonical encoding of one record.
///
/// Consumed by [`ContentHasher::finish`], so state never leaks between records.
#[derive(Debug, Default)]
pub struct ContentHasher {
    buf: Vec<u8>,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    /// Raw checksum of everything written so far
    pub fn checksum(&self) -> u64 {
        CRC64_ISO.checksum(&self.buf)
    }

    /// Final surrogate key, never [`NO_REFERENCE`]
    pub fn finish(self) -> SurrogateKey {
        surrogate_key(self.checksum())
    }
}

/// Reinterpret a checksum as a key, remapping zero to one
pub fn surrogate_key(checksum: u64) -> SurrogateKey {
    match checksum as i64 {
        NO_REFERENCE => 1,
        id => id,
    }
}

/// Key of an attribute row: (seq, internal id, sender uin, timestamp, sender name)
pub fn attribute_key(attr: &StoredMessageAttribute) -> SurrogateKey {
    attribute_hasher(attr).finish()
}

/// Raw checksum behind [`attribute_key`], before the zero remap
#[cfg(test)]
pub(crate) fn attribute_checksum(attr: &StoredMessageAttribute) -> u64 {
    attribute_hasher(attr).checksum()
}

fn attribute_hasher(attr: &StoredMessageAttribute) -> ContentHasher {
    let mut hasher = ContentHasher::new();
    hasher
        .write_u32(attr.message_seq as u32)
        .write_u32(attr.internal_id as u32)
        .write_u64(attr.sender_uin as u64)
        .write_u64(attr.timestamp as u64)
        .write_str(&attr.sender_name);
    hasher
}

/// Key of a quote row: (prev id, prev global id, serialized snapshot)
pub fn quote_key(prev_id: &str, prev_global_id: i32, snapshot: &str) -> SurrogateKey {
    let mut hasher = ContentHasher::new();
    hasher
        .write_str(prev_id)
        .write_u32(prev_global_id as u32)
        .write_str(snapshot);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attribute() -> StoredMessageAttribute {
        StoredMessageAttribute {
            message_seq: 1024,
            internal_id: 77,
            sender_uin: 123456789,
            sender_name: "alice".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_crc64_iso_check_value() {
        assert_eq!(CRC64_ISO.checksum(b"123456789"), 0xb90956c775a41001);
    }

    #[test]
    fn test_attribute_key_deterministic() {
        let a = sample_attribute();
        let b = sample_attribute();
        assert_eq!(attribute_key(&a), attribute_key(&a));
        assert_eq!(attribute_key(&a), attribute_key(&b));
    }

    #[test]
    fn test_attribute_key_changes_with_every_field() {
        let base = attribute_key(&sample_attribute());

        let variants = [
            StoredMessageAttribute { message_seq: 1025, ..sample_attribute() },
            StoredMessageAttribute { internal_id: 78, ..sample_attribute() },
            StoredMessageAttribute { sender_uin: 987654321, ..sample_attribute() },
            StoredMessageAttribute { sender_name: "bob".to_string(), ..sample_attribute() },
            StoredMessageAttribute { timestamp: 1_700_000_001, ..sample_attribute() },
        ];

        for variant in &variants {
            assert_ne!(attribute_key(variant), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_quote_key_field_order_matters() {
        let a = quote_key("abc", 1, "{}");
        assert_eq!(a, quote_key("abc", 1, "{}"));
        assert_ne!(a, quote_key("abd", 1, "{}"));
        assert_ne!(a, quote_key("abc", 2, "{}"));
        assert_ne!(a, quote_key("abc", 1, "[]"));
    }

    #[test]
    fn test_zero_checksum_remapped() {
        assert_eq!(surrogate_key(0), 1);
        assert_eq!(surrogate_key(5), 5);
        assert_eq!(surrogate_key(u64::MAX), -1);
    }

    #[test]
    fn test_engineered_zero_input_maps_to_one() {
        // Walk the reflected CRC register back 64 bit-steps from the value
        // that finalizes to zero, then pick the 8-byte tail that lands there.
        const POLY_REFLECTED: u64 = 0xD800_0000_0000_0000;
        let prefix = b"engineered";

        let mut target = u64::MAX;
        for _ in 0..64 {
            target = if target >> 63 == 1 {
                ((target ^ POLY_REFLECTED) << 1) | 1
            } else {
                target << 1
            };
        }
        let register = CRC64_ISO.checksum(prefix) ^ u64::MAX;

        let mut input = prefix.to_vec();
        input.extend_from_slice(&(target ^ register).to_le_bytes());

        let mut hasher = ContentHasher::new();
        hasher.write_bytes(&input);
        assert_eq!(hasher.checksum(), 0);
        assert_eq!(hasher.finish(), 1);
    }
}
