//! Optical text extraction behind a content-addressed, single-flight cache.
//!
//! ## Why cache by digest?
//!
//! Evaluation harnesses resubmit the same screenshot many times. Recognition
//! costs hundreds of milliseconds of CPU, while a SHA-256 of the upload costs
//! microseconds, so the cache is keyed by the digest of the raw bytes.
//!
//! ## Why single-flight?
//!
//! Two concurrent requests with the same never-seen image would otherwise both
//! miss and both run the recognizer. Each key maps to a `tokio::sync::OnceCell`;
//! the first caller initialises it on a blocking thread and every concurrent
//! caller awaits that same initialisation. A failed recognition leaves the cell
//! empty and drops its entry, so errors are never cached.
//!
//! Successful entries live for the whole process. There is no eviction.

use crate::error::TaError;
use crate::pipeline::encode;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Image-to-text engine. Called on a blocking thread.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, TaError>;
}

/// SHA-256 hex digest of raw image bytes. Lookup only, never authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

/// Content-addressed cache in front of a [`Recognizer`].
pub struct TextExtractionCache {
    recognizer: Arc<dyn Recognizer>,
    entries: Mutex<HashMap<CacheKey, Arc<OnceCell<String>>>>,
}

impl TextExtractionCache {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            recognizer,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the text in `image_bytes`, recognising it at most once per digest.
    pub async fn extract(&self, image_bytes: Vec<u8>) -> Result<String, TaError> {
        let key = CacheKey::of(&image_bytes);
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| TaError::Internal("extraction cache lock poisoned".into()))?;
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        if let Some(text) = cell.get() {
            debug!("OCR cache hit for {}", key);
            return Ok(text.clone());
        }

        let recognizer = Arc::clone(&self.recognizer);
        let label = key.clone();
        let result = cell
            .get_or_try_init(|| async move {
                info!("OCR cache miss for {}; recognising {} bytes", label, image_bytes.len());
                tokio::task::spawn_blocking(move || recognizer.recognize(&image_bytes))
                    .await
                    .map_err(|e| TaError::Internal(format!("OCR task panicked: {e}")))?
            })
            .await;

        match result {
            Ok(text) => Ok(text.clone()),
            Err(e) => {
                self.forget_failed(&key, &cell);
                Err(e)
            }
        }
    }

    /// Drop the entry for `key` if it is still the empty cell that just failed.
    fn forget_failed(&self, key: &CacheKey, cell: &Arc<OnceCell<String>>) {
        if let Ok(mut entries) = self.entries.lock() {
            let stale = entries
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
            if stale {
                entries.remove(key);
            }
        }
    }

    /// Number of digests with a completed recognition.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|c| c.initialized()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recognizer that shells out to the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    cmd: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            lang: lang.into(),
        }
    }
}

impl Recognizer for TesseractCli {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, TaError> {
        let png = encode::normalise_to_png(image_bytes)?;

        let mut file = tempfile::Builder::new()
            .prefix("virtual-ta-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| TaError::Internal(format!("tempfile: {e}")))?;
        file.write_all(&png)
            .and_then(|_| file.flush())
            .map_err(|e| TaError::Internal(format!("tempfile write: {e}")))?;

        // Engine failures surface as image errors, same as an unreadable upload.
        let output = Command::new(&self.cmd)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &self.lang])
            .output()
            .map_err(|e| TaError::ImageDecode {
                reason: format!("failed to run '{}': {e}", self.cmd),
            })?;

        if !output.status.success() {
            return Err(TaError::ImageDecode {
                reason: format!(
                    "'{}' exited with {}: {}",
                    self.cmd,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Counting {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    impl Recognizer for Counting {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, TaError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::thread::sleep(self.delay);
            Ok(format!("text#{n} ({} bytes)", image_bytes.len()))
        }
    }

    struct FailOnce {
        calls: AtomicUsize,
    }

    impl Recognizer for FailOnce {
        fn recognize(&self, _: &[u8]) -> Result<String, TaError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TaError::ImageDecode {
                    reason: "truncated".into(),
                })
            } else {
                Ok("recovered".into())
            }
        }
    }

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(CacheKey::of(b"abc"), CacheKey::of(b"abc"));
        assert_ne!(CacheKey::of(b"abc"), CacheKey::of(b"abd"));
        assert_eq!(
            CacheKey::of(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn second_extract_hits_cache() {
        let rec = Counting::new(Duration::ZERO);
        let cache = TextExtractionCache::new(rec.clone());

        let first = cache.extract(b"same image".to_vec()).await.unwrap();
        let second = cache.extract(b"same image".to_vec()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn distinct_images_are_recognised_separately() {
        let rec = Counting::new(Duration::ZERO);
        let cache = TextExtractionCache::new(rec.clone());

        cache.extract(b"one".to_vec()).await.unwrap();
        cache.extract(b"two".to_vec()).await.unwrap();

        assert_eq!(rec.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_recognition() {
        let rec = Counting::new(Duration::from_millis(100));
        let cache = Arc::new(TextExtractionCache::new(rec.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.extract(b"hot image".to_vec()).await })
            })
            .collect();

        let mut texts = Vec::new();
        for h in handles {
            texts.push(h.await.unwrap().unwrap());
        }

        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
        assert!(texts.iter().all(|t| t == &texts[0]));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let rec = Arc::new(FailOnce {
            calls: AtomicUsize::new(0),
        });
        let cache = TextExtractionCache::new(rec.clone());

        assert!(cache.extract(b"img".to_vec()).await.is_err());
        assert!(cache.is_empty());
        assert!(cache.entries.lock().unwrap().is_empty());
        assert_eq!(cache.extract(b"img".to_vec()).await.unwrap(), "recovered");
        assert_eq!(rec.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tesseract_rejects_non_image_before_spawning() {
        let rec = TesseractCli::new("/nonexistent/tesseract", "eng");
        let err = rec.recognize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, TaError::ImageDecode { .. }));
    }

    #[tokio::test]
    async fn failed_digests_do_not_accumulate() {
        let cache = TextExtractionCache::new(Arc::new(TesseractCli::new("tesseract", "eng")));

        for i in 0..5u8 {
            assert!(cache.extract(vec![b'x', i]).await.is_err());
        }

        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_engine_on_valid_image_is_client_error() {
        let png = {
            let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                4,
                4,
                image::Rgba([255, 255, 255, 255]),
            ));
            let mut buf = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .expect("encode");
            buf
        };

        let err = TesseractCli::new("/nonexistent", "eng")
            .recognize(&png)
            .unwrap_err();

        assert!(matches!(err, TaError::ImageDecode { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Client);
        assert!(err.to_string().starts_with("Image decoding failed"));
    }
}
