//! AoT-Xtensa module header check (§4.4 AppTask validation pre-flight).
//!
//! The full WASM/AoT binary validator is an opaque external predicate
//! (§1 non-goal); this is only the leading-signature check the original
//! implementation performs before ever invoking that validator.

/// `[0x00, 'a', 'o', 't']` — the 4-byte AoT file magic, as defined by
/// wasm-micro-runtime's `aot_emit_aot_file.c`.
pub const AOT_HEADER: [u8; 4] = [0x00, b'a', b'o', b't'];

/// Returns `true` if `bytes` begins with the AoT magic.
pub fn has_aot_header(bytes: &[u8]) -> bool {
    bytes.starts_with(&AOT_HEADER)
}
