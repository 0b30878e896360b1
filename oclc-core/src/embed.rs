/*!
Embedding SPIR-V in generated C / C++ sources.

The optimized module is written as a `static const unsigned char` array initialized with one hex
literal per byte. SPIR-V is a stream of 32 bit words, so the byte length is always a multiple of 4.
*/

/// Errors.
pub mod error {
    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    pub enum EmbedError {
        /// The binary is not a whole number of words.
        #[error("binary of {len} bytes is not word aligned")]
        Unaligned { len: usize },
        /// The literal could not be parsed.
        #[error("malformed byte array literal: {msg}")]
        Malformed { msg: String },
    }
}
use error::EmbedError;

/// Formats `bytes` as a C byte array definition named `ident`.
///
/// **errors**
///
/// [`EmbedError::Unaligned`] if the length is not a multiple of 4.
pub fn encode(ident: &str, bytes: &[u8]) -> Result<String, EmbedError> {
    if bytes.len() % 4 != 0 {
        return Err(EmbedError::Unaligned { len: bytes.len() });
    }
    Ok(byte_array(ident, bytes))
}

/// Encodes a word stream, see [`encode`].
pub fn encode_words(ident: &str, words: &[u32]) -> String {
    byte_array(ident, bytemuck::cast_slice(words))
}

fn byte_array(ident: &str, bytes: &[u8]) -> String {
    let mut literal = String::with_capacity(64 + bytes.len() * 6);
    literal.push_str(&format!("static const unsigned char {ident}[] = {{\n"));
    for line in bytes.chunks(16) {
        literal.push_str("   ");
        for byte in line {
            literal.push_str(&format!(" 0x{byte:02x},"));
        }
        literal.push('\n');
    }
    literal.push_str("};\n");
    literal
}

/// Parses the initializer of a literal produced by [`encode`] back into bytes.
pub fn decode(literal: &str) -> Result<Vec<u8>, EmbedError> {
    let malformed = |msg: &str| EmbedError::Malformed {
        msg: msg.to_string(),
    };
    let start = literal.find('{').ok_or_else(|| malformed("expected `{`"))?;
    let end = literal.rfind('}').ok_or_else(|| malformed("expected `}`"))?;
    if end < start {
        return Err(malformed("expected `{` before `}`"));
    }
    let mut bytes = Vec::new();
    for item in literal[start + 1..end].split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let digits = item
            .strip_prefix("0x")
            .or_else(|| item.strip_prefix("0X"))
            .ok_or_else(|| malformed(&format!("expected hex literal, found {item:?}")))?;
        let byte = u8::from_str_radix(digits, 16)
            .map_err(|e| malformed(&format!("{item:?}: {e}")))?;
        bytes.push(byte);
    }
    if bytes.len() % 4 != 0 {
        return Err(EmbedError::Unaligned { len: bytes.len() });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for len in [0, 4, 16, 20, 1024] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let literal = encode("__bin", &bytes).unwrap();
            assert!(literal.starts_with("static const unsigned char __bin[] = {"));
            assert_eq!(decode(&literal).unwrap(), bytes);
        }
    }

    #[test]
    fn words() {
        let literal = encode_words("__bin", &[0x07230203]);
        assert_eq!(decode(&literal).unwrap(), 0x07230203u32.to_ne_bytes());
    }

    #[test]
    fn unaligned() {
        assert_eq!(
            encode("__bin", &[1, 2, 3]),
            Err(EmbedError::Unaligned { len: 3 })
        );
        assert!(decode("{ 0x01, 0x02 }").is_err());
        assert!(decode("{ 0x01, 0x02, 1, 0x04 }").is_err());
    }
}
