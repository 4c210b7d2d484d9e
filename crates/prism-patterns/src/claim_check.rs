//! The claim-check transform: offloading large payloads to an object-store slot
//! and replacing them with a small reference, and the inverse resolution on the
//! consumer side (§4.5, §4.6, §3 Claim).

use std::io::{Read, Write};
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prism_core::config::ConfigDocument;
use prism_core::error::CoreError;
use prism_core::ids::ClaimId;
use prism_core::interfaces::{Message, ObjectStoreBasic, CLAIM_CHECK_METADATA_KEY};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    None,
    Gzip,
}

impl CompressionAlgorithm {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("gzip") => CompressionAlgorithm::Gzip,
            _ => CompressionAlgorithm::None,
        }
    }

    fn compress(self, bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
        match self {
            CompressionAlgorithm::None => Ok(bytes.to_vec()),
            CompressionAlgorithm::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(bytes)
                    .map_err(|e| CoreError::fatal("claim_check.compress_failed", e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| CoreError::fatal("claim_check.compress_failed", e.to_string()))
            }
        }
    }

    fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
        match self {
            CompressionAlgorithm::None => Ok(bytes.to_vec()),
            CompressionAlgorithm::Gzip => {
                let mut decoder = GzDecoder::new(bytes);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| CoreError::fatal("claim_check.decompress_failed", e.to_string()))?;
                Ok(out)
            }
        }
    }
}

/// `behavior.claim_check.*` knobs, read once at Initialize (§6.3).
#[derive(Clone, Debug)]
pub struct ClaimCheckSettings {
    pub enabled: bool,
    /// Inclusive: `size == threshold` triggers offload (§4.5).
    pub threshold: u64,
    pub bucket: String,
    pub ttl: Duration,
    pub compression: CompressionAlgorithm,
    pub delete_after_read: bool,
}

impl ClaimCheckSettings {
    pub fn from_config(config: &ConfigDocument) -> Self {
        Self {
            enabled: config.behavior_bool("claim_check.enabled", false),
            threshold: config.behavior_u64("claim_check.threshold", 1_048_576),
            bucket: config
                .behavior_str("claim_check.bucket")
                .unwrap_or("default")
                .to_string(),
            ttl: Duration::from_secs(config.behavior_u64("claim_check.ttl_seconds", 3600)),
            compression: CompressionAlgorithm::parse(config.behavior_str("claim_check.compression")),
            delete_after_read: config.behavior_bool("claim_check.delete_after_read", false),
        }
    }

    pub fn should_offload(&self, payload_len: usize) -> bool {
        self.enabled && payload_len as u64 >= self.threshold
    }
}

/// The `prism-claim-check` metadata header value (§3 Claim, §4.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimCheckHeader {
    pub claim_id: String,
    pub size: u64,
    pub compression: CompressionAlgorithm,
    pub ttl_seconds: u64,
}

/// If `settings` calls for it given `message.payload`'s length, compresses and
/// writes the payload to `object_store`, replacing it with a reference descriptor
/// and stamping the `prism-claim-check` header (§4.5). Otherwise returns `message`
/// unchanged.
///
/// A write failure here is fatal for the publish (§4.5: "claim-check write failure
/// is fatal for that publish"); the caller must not fall back to inline delivery.
pub async fn maybe_offload(
    message: Message,
    settings: &ClaimCheckSettings,
    object_store: &dyn ObjectStoreBasic,
) -> Result<Message, CoreError> {
    if !settings.should_offload(message.payload.len()) {
        return Ok(message);
    }

    let original_size = message.payload.len() as u64;
    let compressed = settings.compression.compress(&message.payload)?;
    let claim_id = ClaimId::generate();

    object_store
        .put(&claim_id.to_string(), compressed, Some(settings.ttl))
        .await
        .map_err(|e| e.with_slot("object_store"))?;

    let header = ClaimCheckHeader {
        claim_id: claim_id.to_string(),
        size: original_size,
        compression: settings.compression,
        ttl_seconds: settings.ttl.as_secs(),
    };
    let header_json = serde_json::to_string(&header)
        .map_err(|e| CoreError::fatal("claim_check.header_encode_failed", e.to_string()))?;

    let mut out = message;
    out.payload = format!("claim-check-reference:{}", claim_id).into_bytes();
    out.metadata.insert(CLAIM_CHECK_METADATA_KEY.to_string(), header_json);
    Ok(out)
}

/// If `message` carries a `prism-claim-check` header, fetches the referenced
/// payload from `object_store`, decompresses it, substitutes it in place of the
/// reference, and removes the header (§4.6). Best-effort deletion of the claim
/// happens after the substitution succeeds, when `delete_after_read` is set; its
/// failure is logged, not propagated (§4.6: "the deletion may be asynchronous and
/// best-effort").
pub async fn maybe_resolve(
    message: Message,
    settings: &ClaimCheckSettings,
    object_store: &dyn ObjectStoreBasic,
) -> Result<Message, CoreError> {
    let Some(header_json) = message.metadata.get(CLAIM_CHECK_METADATA_KEY) else {
        return Ok(message);
    };
    let header: ClaimCheckHeader = serde_json::from_str(header_json)
        .map_err(|e| CoreError::fatal("claim_check.malformed_header", e.to_string()))?;

    let fetched = object_store
        .get(&header.claim_id)
        .await
        .map_err(|e| e.with_slot("object_store"))?;
    let payload = header.compression.decompress(&fetched)?;

    let mut out = message;
    out.payload = payload;
    out.metadata.remove(CLAIM_CHECK_METADATA_KEY);

    if settings.delete_after_read {
        if let Err(err) = object_store.delete(&header.claim_id).await {
            tracing::warn!(claim_id = %header.claim_id, %err, "best-effort claim deletion failed");
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use proptest::prelude::*;

    struct MemObjectStore {
        objects: DashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ObjectStoreBasic for MemObjectStore {
        async fn put(&self, id: &str, bytes: Vec<u8>, _ttl: Option<Duration>) -> Result<(), CoreError> {
            self.objects.insert(id.to_string(), bytes);
            Ok(())
        }
        async fn get(&self, id: &str) -> Result<Vec<u8>, CoreError> {
            self.objects
                .get(id)
                .map(|v| v.clone())
                .ok_or_else(|| CoreError::transient("test.missing_object", "no such object"))
        }
        async fn delete(&self, id: &str) -> Result<(), CoreError> {
            self.objects.remove(id);
            Ok(())
        }
        async fn exists(&self, id: &str) -> Result<bool, CoreError> {
            Ok(self.objects.contains_key(id))
        }
    }

    fn settings(threshold: u64) -> ClaimCheckSettings {
        ClaimCheckSettings {
            enabled: true,
            threshold,
            bucket: "test".into(),
            ttl: Duration::from_secs(60),
            compression: CompressionAlgorithm::None,
            delete_after_read: false,
        }
    }

    #[tokio::test]
    async fn payload_below_threshold_is_untouched() {
        let store = MemObjectStore {
            objects: DashMap::new(),
        };
        let message = Message::new(vec![1, 2, 3]);
        let out = maybe_offload(message.clone(), &settings(10), &store).await.unwrap();
        assert_eq!(out.payload, message.payload);
        assert!(!out.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let store = MemObjectStore {
            objects: DashMap::new(),
        };
        let payload = vec![0u8; 4];
        let message = Message::new(payload);
        let out = maybe_offload(message, &settings(4), &store).await.unwrap();
        assert!(out.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
    }

    #[tokio::test]
    async fn offload_then_resolve_round_trips_the_payload() {
        let store = MemObjectStore {
            objects: DashMap::new(),
        };
        let original = vec![42u8; 16];
        let message = Message::new(original.clone());
        let offloaded = maybe_offload(message, &settings(8), &store).await.unwrap();
        assert!(offloaded.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));

        let resolved = maybe_resolve(offloaded, &settings(8), &store).await.unwrap();
        assert_eq!(resolved.payload, original);
        assert!(!resolved.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
    }

    #[tokio::test]
    async fn gzip_round_trips() {
        let store = MemObjectStore {
            objects: DashMap::new(),
        };
        let mut cfg = settings(8);
        cfg.compression = CompressionAlgorithm::Gzip;
        let original = b"some reasonably compressible payload data data data".to_vec();
        let message = Message::new(original.clone());
        let offloaded = maybe_offload(message, &cfg, &store).await.unwrap();
        let resolved = maybe_resolve(offloaded, &cfg, &store).await.unwrap();
        assert_eq!(resolved.payload, original);
    }

    proptest! {
        /// Invariant (§8): for any payload at or above an arbitrary threshold, under
        /// either compression algorithm, offload followed by resolve reproduces the
        /// original bytes exactly and leaves no claim-check header on the result.
        #[test]
        fn offload_then_resolve_round_trips_for_arbitrary_payloads(
            payload in proptest::collection::vec(any::<u8>(), 0..4096),
            threshold in 0u64..4096,
            use_gzip: bool,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let store = MemObjectStore { objects: DashMap::new() };
                let mut cfg = settings(threshold);
                cfg.compression = if use_gzip { CompressionAlgorithm::Gzip } else { CompressionAlgorithm::None };

                let message = Message::new(payload.clone());
                let offloaded = maybe_offload(message, &cfg, &store).await.unwrap();

                if payload.len() as u64 >= threshold {
                    prop_assert!(offloaded.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
                } else {
                    prop_assert!(!offloaded.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
                    prop_assert_eq!(&offloaded.payload, &payload);
                }

                let resolved = maybe_resolve(offloaded, &cfg, &store).await.unwrap();
                prop_assert_eq!(resolved.payload, payload);
                prop_assert!(!resolved.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
                Ok(())
            })?;
        }

        /// Invariant (§8): the threshold comparison is inclusive for any threshold —
        /// a payload of exactly `threshold` bytes always offloads, one byte short
        /// never does.
        #[test]
        fn threshold_boundary_is_inclusive_for_arbitrary_thresholds(threshold in 1u64..8192) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let store = MemObjectStore { objects: DashMap::new() };
                let cfg = settings(threshold);

                let at_threshold = Message::new(vec![0u8; threshold as usize]);
                let out = maybe_offload(at_threshold, &cfg, &store).await.unwrap();
                prop_assert!(out.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));

                let below_threshold = Message::new(vec![0u8; (threshold - 1) as usize]);
                let out = maybe_offload(below_threshold, &cfg, &store).await.unwrap();
                prop_assert!(!out.metadata.contains_key(CLAIM_CHECK_METADATA_KEY));
                Ok(())
            })?;
        }
    }
}
