//! DNN model package (`.pkg`/`.rpk`) `network_id` extraction (§4.4 ModelTask,
//! §8 round-trip property).
//!
//! Layout: a 16-byte "package-version field" sits at byte offset 48. The
//! 6-char ASCII network identifier lives at offsets 4..10 of that field.
//! `.rpk` files store the field with each 4-byte group reversed relative to
//! `.pkg`; this module undoes that before reading the identifier.

const FIELD_OFFSET: usize = 48;
const FIELD_LEN: usize = 16;
const ID_OFFSET: usize = 4;
const ID_LEN: usize = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NetworkIdError {
    #[error("package is too short to contain a version field (need at least {need} bytes, got {got})")]
    TooShort { need: usize, got: usize },
    #[error("network id bytes are not valid ASCII")]
    NotAscii,
}

/// Extract the network id from a `.pkg` byte buffer.
pub fn network_id_from_pkg(bytes: &[u8]) -> Result<String, NetworkIdError> {
    extract(bytes, false)
}

/// Extract the network id from a `.rpk` byte buffer (4-byte-group reversed
/// relative to `.pkg`).
pub fn network_id_from_rpk(bytes: &[u8]) -> Result<String, NetworkIdError> {
    extract(bytes, true)
}

fn extract(bytes: &[u8], is_rpk: bool) -> Result<String, NetworkIdError> {
    let need = FIELD_OFFSET + FIELD_LEN;
    if bytes.len() < need {
        return Err(NetworkIdError::TooShort {
            need,
            got: bytes.len(),
        });
    }

    let mut field = bytes[FIELD_OFFSET..FIELD_OFFSET + FIELD_LEN].to_vec();
    if is_rpk {
        reverse_4byte_groups(&mut field);
    }

    let id_bytes = &field[ID_OFFSET..ID_OFFSET + ID_LEN];
    if !id_bytes.is_ascii() {
        return Err(NetworkIdError::NotAscii);
    }
    Ok(String::from_utf8_lossy(id_bytes).into_owned())
}

fn reverse_4byte_groups(field: &mut [u8]) {
    for chunk in field.chunks_mut(4) {
        chunk.reverse();
    }
}

/// Build a minimal package buffer with the given network id at the correct
/// offset, for use in tests and in the mock-device fixtures of
/// `orc-e2e-tests`.
pub fn fabricate_pkg(network_id: &str) -> Vec<u8> {
    assert_eq!(network_id.len(), ID_LEN, "network id must be 6 ASCII chars");
    let mut bytes = vec![0u8; FIELD_OFFSET + FIELD_LEN];
    bytes[FIELD_OFFSET + ID_OFFSET..FIELD_OFFSET + ID_OFFSET + ID_LEN]
        .copy_from_slice(network_id.as_bytes());
    bytes
}

/// Build the `.rpk` equivalent of a `.pkg` buffer produced by
/// [`fabricate_pkg`].
pub fn pkg_to_rpk(pkg: &[u8]) -> Vec<u8> {
    let mut bytes = pkg.to_vec();
    let field = &mut bytes[FIELD_OFFSET..FIELD_OFFSET + FIELD_LEN];
    reverse_4byte_groups(field);
    bytes
}
