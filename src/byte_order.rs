//! Helpers for explicit network byte-order conversions.
//!
//! Every length prefix in the stack is a big-endian `u32`. These helpers keep
//! Clippy expectations scoped to the conversion points so filter code can
//! remain explicit about wire endianness without repeating lint annotations.

/// Size in bytes of a length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use framechain::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use framechain::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x12, 0x34, 0x56, 0x78]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}

/// Peek the length prefix at the start of `src` without consuming it.
///
/// Returns `None` while fewer than [`LENGTH_PREFIX_SIZE`] bytes are available.
///
/// # Examples
///
/// ```
/// use framechain::byte_order::peek_length_prefix;
///
/// assert_eq!(peek_length_prefix(&[0, 0, 1, 0, 0xff]), Some(256));
/// assert_eq!(peek_length_prefix(&[0, 0]), None);
/// ```
#[must_use]
pub fn peek_length_prefix(src: &[u8]) -> Option<usize> {
    let header: [u8; LENGTH_PREFIX_SIZE] = src.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    usize::try_from(read_network_u32(header)).ok()
}
