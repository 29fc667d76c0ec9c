//! Block state registry and runtime-ID hashing.
//!
//! Runtime IDs are FNV-1a 32-bit hashes of the network-serialized block
//! state NBT (`block_network_ids_are_hashes`), so any two parties that agree
//! on the state compound agree on the ID without a shared numbered registry.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::{BufMut, BytesMut};
use rewind_nbt::{NbtCompound, NbtValue};

/// FNV-1a 32-bit offset basis.
const FNV1_32_INIT: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
const FNV1_32_PRIME: u32 = 0x0100_0193;

/// Block state version for the 1.21.50 protocol.
pub const CURRENT_BLOCK_VERSION: i32 = 18_100_737;

/// A namespaced block identifier with its state properties.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockState {
    pub name: String,
    pub states: NbtCompound,
}

impl BlockState {
    pub fn new(name: impl Into<String>, states: NbtCompound) -> Self {
        Self {
            name: name.into(),
            states,
        }
    }

    /// A block with no state properties.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, NbtCompound::new())
    }
}

/// Compute FNV-1a 32-bit hash of a byte slice.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV1_32_INIT;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV1_32_PRIME);
    }
    hash
}

/// Compute the block runtime ID (FNV-1a hash) for a block state.
pub fn hash_block_state(state: &BlockState) -> u32 {
    fnv1a_32(&serialize_block_state_nbt(state))
}

/// Serialize a block state to network NBT bytes with deterministic key order.
///
/// Key order matches BDS: "name", "states", "version". States are walked in
/// map order, which is already sorted.
fn serialize_block_state_nbt(state: &BlockState) -> Vec<u8> {
    let mut buf = BytesMut::new();

    // Root TAG_Compound with empty name
    buf.put_u8(0x0A);
    write_net_string(&mut buf, "");

    // "name" -> TAG_String
    buf.put_u8(0x08);
    write_net_string(&mut buf, "name");
    write_net_string(&mut buf, &state.name);

    // "states" -> TAG_Compound
    buf.put_u8(0x0A);
    write_net_string(&mut buf, "states");
    write_net_compound(&mut buf, &state.states);

    // "version" -> TAG_Int (network NBT uses ZigZag VarInt for ints)
    buf.put_u8(0x03);
    write_net_string(&mut buf, "version");
    write_zigzag_varint(&mut buf, CURRENT_BLOCK_VERSION);

    // TAG_End for root compound
    buf.put_u8(0x00);

    buf.to_vec()
}

fn write_net_compound(buf: &mut BytesMut, compound: &NbtCompound) {
    for (name, value) in compound {
        buf.put_u8(value.tag_type_id());
        write_net_string(buf, name);
        write_net_value(buf, value);
    }
    buf.put_u8(0x00); // TAG_End
}

fn write_net_value(buf: &mut BytesMut, value: &NbtValue) {
    match value {
        NbtValue::Byte(v) => buf.put_i8(*v),
        NbtValue::Short(v) => buf.put_i16_le(*v),
        NbtValue::Int(v) => write_zigzag_varint(buf, *v),
        NbtValue::Long(v) => buf.put_i64_le(*v),
        NbtValue::Float(v) => buf.put_f32_le(*v),
        NbtValue::Double(v) => buf.put_f64_le(*v),
        NbtValue::ByteArray(arr) => {
            write_zigzag_varint(buf, arr.len() as i32);
            for &b in arr {
                buf.put_i8(b);
            }
        }
        NbtValue::String(s) => write_net_string(buf, s),
        NbtValue::List(list) => {
            let element_type = list.first().map_or(0, NbtValue::tag_type_id);
            buf.put_u8(element_type);
            write_zigzag_varint(buf, list.len() as i32);
            for item in list {
                write_net_value(buf, item);
            }
        }
        NbtValue::Compound(map) => write_net_compound(buf, map),
        NbtValue::IntArray(arr) => {
            write_zigzag_varint(buf, arr.len() as i32);
            for &v in arr {
                write_zigzag_varint(buf, v);
            }
        }
        NbtValue::LongArray(arr) => {
            write_zigzag_varint(buf, arr.len() as i32);
            for &v in arr {
                buf.put_i64_le(v);
            }
        }
    }
}

/// Write a network NBT string: VarUInt32(length) + UTF-8 bytes.
fn write_net_string(buf: &mut BytesMut, s: &str) {
    write_varuint32(buf, s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Write unsigned VarInt (LEB128).
fn write_varuint32(buf: &mut BytesMut, mut value: u32) {
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
}

/// Write signed VarInt (ZigZag + LEB128).
fn write_zigzag_varint(buf: &mut BytesMut, value: i32) {
    let encoded = ((value << 1) ^ (value >> 31)) as u32;
    write_varuint32(buf, encoded);
}

/// Supplies block identity to the timeline engine: the air ID, runtime-ID to
/// state resolution, and the hash of an arbitrary state.
pub trait BlockCodec: Send + Sync {
    /// Runtime ID of `minecraft:air`.
    fn air_runtime_id(&self) -> u32;

    /// Resolve a runtime ID back to its block state, if known.
    fn runtime_id_to_state(&self, id: u32) -> Option<BlockState>;

    /// Compute (and remember) the runtime ID for a block state.
    fn state_to_runtime_id(&self, state: &BlockState) -> u32;

    /// Block state version stamped into persisted palette entries.
    fn current_block_version(&self) -> i32;
}

/// [`BlockCodec`] backed by the FNV-1a hash scheme with a reverse registry.
///
/// Every state that passes through `state_to_runtime_id` is remembered so
/// the hash can later be resolved back to the state it came from.
pub struct HashBlockCodec {
    air: u32,
    by_id: RwLock<HashMap<u32, BlockState>>,
}

impl HashBlockCodec {
    pub fn new() -> Self {
        let codec = Self {
            air: 0,
            by_id: RwLock::new(HashMap::new()),
        };
        let air = codec.state_to_runtime_id(&BlockState::bare("minecraft:air"));
        codec.state_to_runtime_id(&BlockState::bare("minecraft:unknown"));
        Self { air, ..codec }
    }
}

impl Default for HashBlockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCodec for HashBlockCodec {
    fn air_runtime_id(&self) -> u32 {
        self.air
    }

    fn runtime_id_to_state(&self, id: u32) -> Option<BlockState> {
        self.by_id.read().ok()?.get(&id).cloned()
    }

    fn state_to_runtime_id(&self, state: &BlockState) -> u32 {
        let id = hash_block_state(state);
        if let Ok(mut map) = self.by_id.write() {
            map.entry(id).or_insert_with(|| state.clone());
        }
        id
    }

    fn current_block_version(&self) -> i32 {
        CURRENT_BLOCK_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        // Standard FNV-1a test vectors
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
    }

    #[test]
    fn hash_is_deterministic() {
        let a = BlockState::bare("minecraft:stone");
        let b = BlockState::bare("minecraft:stone");
        assert_eq!(hash_block_state(&a), hash_block_state(&b));
    }

    #[test]
    fn hash_depends_on_states() {
        let mut states = NbtCompound::new();
        states.insert("upper_block_bit".into(), NbtValue::Byte(1));
        let with = BlockState::new("minecraft:door", states);
        let without = BlockState::bare("minecraft:door");
        assert_ne!(hash_block_state(&with), hash_block_state(&without));
    }

    #[test]
    fn hash_ignores_state_insertion_order() {
        let mut first = NbtCompound::new();
        first.insert("a".into(), NbtValue::Int(1));
        first.insert("b".into(), NbtValue::Int(2));
        let mut second = NbtCompound::new();
        second.insert("b".into(), NbtValue::Int(2));
        second.insert("a".into(), NbtValue::Int(1));
        assert_eq!(
            hash_block_state(&BlockState::new("minecraft:x", first)),
            hash_block_state(&BlockState::new("minecraft:x", second)),
        );
    }

    #[test]
    fn codec_resolves_registered_states() {
        let codec = HashBlockCodec::new();
        let stone = BlockState::bare("minecraft:stone");
        let id = codec.state_to_runtime_id(&stone);
        assert_eq!(codec.runtime_id_to_state(id), Some(stone));
        assert!(codec.runtime_id_to_state(id ^ 1).is_none());
    }

    #[test]
    fn air_is_preregistered() {
        let codec = HashBlockCodec::new();
        let state = codec.runtime_id_to_state(codec.air_runtime_id()).unwrap();
        assert_eq!(state.name, "minecraft:air");
    }
}
