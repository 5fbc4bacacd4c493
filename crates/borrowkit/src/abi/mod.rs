//! Hand-rolled codec for the handful of contract calls the engine makes.
//!
//! This is deliberately not a general ABI library: call payloads are built from compiled-in
//! selectors plus 32-byte argument words, and responses are decoded against the fixed layouts in
//! [`layout`].

pub mod decode;
pub mod encode;
pub mod layout;

pub use decode::{
    decode_bool, decode_hex_bytes, decode_twos_complement, decode_uint, strip_hex_prefix, Words,
};
pub use encode::{
    encode_address_word, encode_call, encode_twos_complement, encode_uint_word, AbiArg,
};

/// Function selectors, `keccak256(signature)[..4]`, computed offline.
pub mod selectors {
    /// `balanceOf(address)`
    pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
    /// `allowance(address,address)`
    pub const ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
    /// `approve(address,uint256)`
    pub const APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
    /// `operate(uint256,int256,int256,address)`
    pub const OPERATE: [u8; 4] = [0x03, 0x2d, 0x22, 0x76];
    /// `positionsByUser(address)` on the vault resolver.
    pub const POSITIONS_BY_USER: [u8; 4] = [0x34, 0x7c, 0xa8, 0xbb];
    /// `getVaultConfig(address)` on the vault resolver.
    pub const GET_VAULT_CONFIG: [u8; 4] = [0xde, 0x1e, 0xb9, 0xa3];

    /// `Transfer(address,address,uint256)` event topic.
    pub const TRANSFER_TOPIC: alloy::primitives::B256 = alloy::primitives::b256!(
        "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
    );
}

/// Serialize any `Display` value as a string (addresses, 256-bit integers).
pub fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}
