//! Modified UTF-8, the string encoding of `CONSTANT_Utf8` entries.
//!
//! Differs from standard UTF-8 in two ways: NUL is encoded as `C0 80`, and
//! supplementary characters are encoded as two 3-byte surrogate halves.

/// Decodes modified UTF-8. Returns `None` for malformed input or for strings
/// (such as lone surrogates) that cannot be represented as a Rust `String`.
pub fn decode(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }

    let decoded = String::from_utf16(&units).ok()?;
    // Overlong forms decode fine but would not survive a rewrite unchanged.
    if encode(&decoded) != bytes {
        return None;
    }
    Some(decoded)
}

pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let code = c as u32;
        match code {
            0x01..=0x7F => out.push(code as u8),
            0x00 | 0x80..=0x7FF => {
                out.push((0xC0 | ((code >> 6) & 0x1F)) as u8);
                out.push((0x80 | (code & 0x3F)) as u8);
            }
            0x800..=0xFFFF => push_three(&mut out, code as u16),
            _ => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    push_three(&mut out, *unit);
                }
            }
        }
    }
    out
}

fn push_three(out: &mut Vec<u8>, unit: u16) {
    out.push((0xE0 | ((unit >> 12) & 0x0F)) as u8);
    out.push((0x80 | ((unit >> 6) & 0x3F)) as u8);
    out.push((0x80 | (unit & 0x3F)) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_unchanged() {
        assert_eq!(encode("java/lang/Object"), b"java/lang/Object".to_vec());
        assert_eq!(decode(b"java/lang/Object").as_deref(), Some("java/lang/Object"));
    }

    #[test]
    fn test_nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).as_deref(), Some("a\0b"));
    }

    #[test]
    fn test_supplementary_character_uses_surrogates() {
        let s = "\u{1F600}";
        let encoded = encode(s);
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode(&encoded).as_deref(), Some(s));
    }

    #[test]
    fn test_raw_nul_byte_rejected() {
        assert_eq!(decode(&[b'a', 0x00]), None);
    }
}
