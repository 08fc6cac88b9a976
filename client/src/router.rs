//! Key routing for ring shards and cluster slots.

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

/// Route a key to a shard index using FNV-1a hash.
///
/// Single-shard case returns 0 (no hashing needed).
pub fn route_key(key: &[u8], shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    let hash = fnv1a(key);
    (hash as usize) % shard_count
}

/// FNV-1a hash (32-bit).
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Cluster hash slot for a key.
///
/// If the key contains a non-empty `{tag}`, only the tag is hashed so
/// related keys land on the same slot.
pub fn key_slot(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) % SLOT_COUNT
}

fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = memchr::memchr(b'{', key)
        && let Some(len) = memchr::memchr(b'}', &key[open + 1..])
        && len > 0
    {
        return &key[open + 1..open + 1 + len];
    }
    key
}

/// CRC16-XMODEM (poly 0x1021, init 0).
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Index of the node serving `slot` when slots are split evenly across
/// `nodes` nodes.
pub fn slot_owner(slot: u16, nodes: usize) -> usize {
    if nodes <= 1 {
        return 0;
    }
    (slot as usize * nodes) / SLOT_COUNT as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shard_always_zero() {
        assert_eq!(route_key(b"any-key", 1), 0);
        assert_eq!(route_key(b"", 1), 0);
    }

    #[test]
    fn deterministic() {
        let a = route_key(b"test-key", 3);
        let b = route_key(b"test-key", 3);
        assert_eq!(a, b);
    }

    #[test]
    fn distributes() {
        let mut counts = [0u32; 4];
        for i in 0..1000u32 {
            let key = format!("key-{i}");
            let shard = route_key(key.as_bytes(), 4);
            counts[shard] += 1;
        }
        for count in &counts {
            assert!(*count > 100, "poor distribution: {counts:?}");
        }
    }

    #[test]
    fn crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31c3);
    }

    #[test]
    fn known_slots() {
        assert_eq!(key_slot(b"foo"), 12182);
        assert_eq!(key_slot(b"bar"), 5061);
    }

    #[test]
    fn hash_tags() {
        assert_eq!(key_slot(b"{user1000}.following"), key_slot(b"user1000"));
        assert_eq!(
            key_slot(b"{user1000}.following"),
            key_slot(b"{user1000}.followers")
        );
        // Empty tag hashes the whole key.
        assert_eq!(hash_tag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(hash_tag(b"foo{{bar}}zap"), b"{bar");
    }

    #[test]
    fn slot_owner_bounds() {
        assert_eq!(slot_owner(0, 3), 0);
        assert_eq!(slot_owner(SLOT_COUNT - 1, 3), 2);
        assert_eq!(slot_owner(12182, 1), 0);
    }
}
