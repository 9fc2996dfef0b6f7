// Brotli compression for export payloads
use async_compression::tokio::bufread::BrotliEncoder;
use tokio::io::AsyncReadExt;

/// Compress `payload` with Brotli.
pub async fn brotli_compress(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(payload);
    let mut encoder = BrotliEncoder::new(cursor);
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed).await?;

    tracing::debug!(
        "Compressed: {} -> {} bytes ({:.1}% reduction)",
        payload.len(),
        compressed.len(),
        reduction_percent(payload.len(), compressed.len())
    );
    Ok(compressed)
}

fn reduction_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (1.0 - after as f64 / before as f64) * 100.0
}

/// True when an `accept-encoding` header value lists `br`.
pub fn accepts_brotli(accept_encoding: Option<&str>) -> bool {
    accept_encoding
        .map(|s| s.split(',').any(|enc| enc.trim().split(';').next() == Some("br")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::BrotliDecoder;

    #[tokio::test]
    async fn test_compress_round_trip() {
        let payload = "20,150,PASS,ok,900,PASS,ok,525,150,900,2\n".repeat(50);
        let compressed = brotli_compress(payload.as_bytes()).await.unwrap();
        assert!(compressed.len() < payload.len());

        let mut decoder = BrotliDecoder::new(std::io::Cursor::new(compressed));
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).await.unwrap();
        assert_eq!(restored, payload.as_bytes());
    }

    #[test]
    fn test_accepts_brotli() {
        assert!(accepts_brotli(Some("gzip, deflate, br")));
        assert!(accepts_brotli(Some("br;q=1.0")));
        assert!(!accepts_brotli(Some("gzip")));
        assert!(!accepts_brotli(None));
    }
}
