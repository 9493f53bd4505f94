//! Byte encoding for embedding vectors.
//!
//! Blob format: a bare little-endian `f32` array, 4 bytes per component,
//! no header. The dimensionality is implied by the blob length.
//!
//! Older catalogs stored vectors as comma-delimited decimal text
//! (`0.012300,-0.450000,...`). [`decode`] still reads those.
//!
//! Decoding never fails: an empty or malformed blob decodes to an empty
//! vector, which the catalog treats as "no embedding".

/// Bytes per encoded component.
const COMPONENT_SIZE: usize = std::mem::size_of::<f32>();

/// Encode a vector as a little-endian `f32` blob.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * COMPONENT_SIZE);
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`encode`] or by the legacy text format.
pub fn decode(blob: &[u8]) -> Vec<f32> {
    if blob.is_empty() {
        return Vec::new();
    }

    if looks_like_text(blob) {
        return decode_text(blob).unwrap_or_else(|| {
            log::debug!("discarding malformed text embedding ({} bytes)", blob.len());
            Vec::new()
        });
    }

    if blob.len() % COMPONENT_SIZE != 0 {
        log::debug!(
            "discarding embedding blob with length {} (not a multiple of {COMPONENT_SIZE})",
            blob.len()
        );
        return Vec::new();
    }

    blob.chunks_exact(COMPONENT_SIZE)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn looks_like_text(blob: &[u8]) -> bool {
    let charset_ok = blob.iter().all(|b| {
        b.is_ascii_digit() || matches!(b, b'.' | b',' | b'-' | b'+' | b'e' | b'E' | b' ' | b'\n' | b'\r' | b'\t')
    });
    charset_ok && blob.iter().any(|b| matches!(b, b'.' | b','))
}

fn decode_text(blob: &[u8]) -> Option<Vec<f32>> {
    let text = std::str::from_utf8(blob).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    text.split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}
