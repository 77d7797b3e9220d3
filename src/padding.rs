/// PKCS#7 padding

pub fn pkcs7_pad(bytes: &[u8], block_size: u8) -> Vec<u8> {
    let n_pad = block_size - (bytes.len() % block_size as usize) as u8;
    let mut out = Vec::with_capacity(bytes.len() + n_pad as usize);
    out.extend_from_slice(bytes);
    out.resize(bytes.len() + n_pad as usize, n_pad);
    out
}

/// Strip PKCS#7 padding in place. On failure the buffer is left untouched
/// and the offending last byte is returned (0 for an empty buffer).
pub fn pkcs7_unpad(bytes: &mut Vec<u8>, block_size: usize) -> Result<(), u8> {
    match padding_len(bytes, block_size) {
        Some(n_pad) => {
            bytes.truncate(bytes.len() - n_pad);
            Ok(())
        }
        None => Err(bytes.last().copied().unwrap_or(0)),
    }
}

fn padding_len(bytes: &[u8], block_size: usize) -> Option<usize> {
    let n_pad = *bytes.last()?;
    let len = n_pad as usize;
    if n_pad == 0 || len > block_size || len > bytes.len() {
        return None;
    }
    let padded = &bytes[(bytes.len() - len)..];
    if padded.iter().all(|el| *el == n_pad) {
        return Some(len);
    }
    None
}
