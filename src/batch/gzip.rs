use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};

/// Gzip a batch's text
pub fn compress(text: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(text.len() / 4), Compression::default());
    encoder.write_all(text)?;
    encoder.finish()
}

/// Inflate a batch payload back into its text, draining the whole stream
pub fn decompress(payload: &[u8]) -> io::Result<String> {
    let mut decoder = GzDecoder::new(payload);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_trailing_newline() {
        let text = "3,1710081000000,4CA2D6,37000,53.12346,-2.50000,0\n5,1710081000100,4CA2D6,36975,0\n";
        let compressed = compress(text.as_bytes()).unwrap();
        assert_ne!(compressed.as_slice(), text.as_bytes());

        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored, text);
        assert!(restored.ends_with('\n'));
    }

    #[test]
    fn test_round_trip_empty_batch() {
        let compressed = compress(b"").unwrap();
        assert!(!compressed.is_empty(), "gzip header is always present");
        assert_eq!(decompress(&compressed).unwrap(), "");
    }

    #[test]
    fn test_round_trip_large_batch() {
        let text: String = (0..5_000)
            .map(|i| format!("4,{},A{:05X},451.3,179.0,-1088\n", 1710081000000i64 + i, i))
            .collect();
        let compressed = compress(text.as_bytes()).unwrap();
        assert!(compressed.len() < text.len());
        assert_eq!(decompress(&compressed).unwrap(), text);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
