//! Human-friendly recovery codes for exporting the key hierarchy (§4.1).
//!
//! The 64 bytes of key material (`KEK || BlockIdHmacKey`) are base-32
//! encoded, then grouped into blocks of 4 characters with a trailing
//! checksum character per group, so a transcription error in any single
//! group is caught immediately instead of silently corrupting the import.

use data_encoding::BASE32_NOPAD;

use crate::error::CryptoError;

const GROUP_LEN: usize = 4;
const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn checksum_char(group: &str) -> char {
    let sum: u32 = group
        .bytes()
        .map(|b| ALPHABET.iter().position(|&a| a == b).unwrap_or(0) as u32)
        .sum();
    char::from(ALPHABET[(sum % 32) as usize])
}

/// Encode raw key material as a dash-separated sequence of
/// `4-character-group + checksum-character` blocks.
#[must_use]
pub fn encode_recovery_code(data: &[u8]) -> String {
    let encoded = BASE32_NOPAD.encode(data);
    let groups: Vec<String> = encoded
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|chunk| {
            let group = String::from_utf8_lossy(chunk).into_owned();
            let check = checksum_char(&group);
            format!("{group}{check}")
        })
        .collect();
    groups.join("-")
}

/// Decode a recovery code produced by [`encode_recovery_code`], verifying
/// every group's checksum before decoding.
///
/// # Errors
/// Returns [`CryptoError::InvalidRecoveryCode`] if a group is malformed,
/// a checksum fails, or the reassembled base-32 payload doesn't decode.
pub fn decode_recovery_code(code: &str) -> Result<Vec<u8>, CryptoError> {
    let mut payload = String::new();
    for (i, raw_group) in code.split('-').enumerate() {
        let group = raw_group.trim().to_ascii_uppercase();
        // Every group but the last holds GROUP_LEN data characters plus a
        // checksum character; the last group can hold fewer data characters
        // when the base-32 payload length isn't a multiple of GROUP_LEN.
        if group.len() < 2 || group.len() > GROUP_LEN + 1 {
            return Err(CryptoError::InvalidRecoveryCode(format!("group {i} has wrong length")));
        }
        let (data_chars, check_char) = group.split_at(group.len() - 1);
        let expected = checksum_char(data_chars);
        let actual = check_char.chars().next().unwrap_or('?');
        if actual != expected {
            return Err(CryptoError::InvalidRecoveryCode(format!("group {i} failed its checksum")));
        }
        payload.push_str(data_chars);
    }
    BASE32_NOPAD
        .decode(payload.as_bytes())
        .map_err(|e| CryptoError::InvalidRecoveryCode(format!("base32 decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_key_material() {
        let material = [42u8; 64];
        let code = encode_recovery_code(&material);
        let decoded = decode_recovery_code(&code).unwrap();
        assert_eq!(decoded, material);
    }

    #[test]
    fn detects_single_character_typo() {
        let material = [7u8; 64];
        let mut code = encode_recovery_code(&material);
        // Flip one data character in the first group (not the checksum character).
        let first_char = code.chars().next().unwrap();
        let replacement = if first_char == 'A' { 'B' } else { 'A' };
        code.replace_range(0..1, &replacement.to_string());
        assert!(decode_recovery_code(&code).is_err());
    }

    #[test]
    fn rejects_malformed_group_length() {
        assert!(decode_recovery_code("AB-CDEFG").is_err());
    }

    #[test]
    fn is_case_insensitive() {
        let material = [1u8; 64];
        let code = encode_recovery_code(&material).to_lowercase();
        assert_eq!(decode_recovery_code(&code).unwrap(), material);
    }
}
