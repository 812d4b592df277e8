use crate::error::{Error, Result};

/// Split `text` into an ordered sequence of character windows of at most
/// `chunk_size` characters, with consecutive windows sharing `chunk_overlap`
/// characters. The final window may be shorter; empty text yields no chunks.
///
/// The split is purely positional and therefore deterministic: re-running it
/// on the same input reproduces the same sequence, which is what keeps chunk
/// index numbering stable across repeated indexing runs.
pub fn split_into_chunks(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(Error::Argument("chunk size must be at least 1".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(Error::Argument(format!(
            "chunk overlap {} must be smaller than chunk size {}",
            chunk_overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
