//! Splitting a ciphertext into fixed-size chunks.

use crate::error::{PosError, Result};

/// Split data into chunks of `chunk_size` bytes.
///
/// The last chunk may be shorter than `chunk_size`. Zero-length input yields
/// an empty set; deciding whether that is an error belongs to the caller.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    if chunk_size == 0 {
        return Err(PosError::InvalidChunkSize(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    Ok(data.chunks(chunk_size).map(<[u8]>::to_vec).collect())
}

/// Number of chunks `split_chunks` would produce for `data_len` bytes.
pub fn chunk_count(data_len: usize, chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 {
        return Err(PosError::InvalidChunkSize(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    Ok(data_len.div_ceil(chunk_size) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact() {
        let data = vec![0xAB; 4096];
        let chunks = split_chunks(&data, 1024).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 1024));
    }

    #[test]
    fn test_split_short_last_chunk() {
        let data = vec![0xCD; 3500];
        let chunks = split_chunks(&data, 1024).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].len(), 3500 - 3 * 1024);
        assert_eq!(chunk_count(3500, 1024).unwrap(), 4);
    }

    #[test]
    fn test_split_empty_input() {
        let chunks = split_chunks(&[], 1024).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(chunk_count(0, 1024).unwrap(), 0);
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(split_chunks(&[1, 2, 3], 0).is_err());
        assert!(chunk_count(3, 0).is_err());
    }

    #[test]
    fn test_split_reassembles() {
        let data: Vec<u8> = (0..=255).cycle().take(5000).collect();
        let chunks = split_chunks(&data, 512).unwrap();
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, data);
    }
}
