//! Image extractor.
//!
//! Labels come from the injected [`ImageClassifier`]; width, height and
//! format come from the image header when the `image` crate can read it.
//! Classifier calls are the expensive part of extraction, so they run under
//! a semaphore shared by every clone of the extractor.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use lens_resolver::ResolvedObject;
use lens_types::{ContentTypeLabel, FieldValue, MetadataRecord};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{ExtractError, ExtractResult};
use crate::model::{ImageClassifier, Prediction};

/// Extractor for images.
#[derive(Clone)]
pub struct ImageExtractor {
    classifier: Arc<dyn ImageClassifier>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ImageExtractor {
    /// `concurrency` caps in-flight classifier calls (minimum 1).
    pub fn new(classifier: Arc<dyn ImageClassifier>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            classifier,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
        }
    }

    /// Classifier calls that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn extract(
        &self,
        label: ContentTypeLabel,
        object: &ResolvedObject,
    ) -> ExtractResult<MetadataRecord> {
        let id = object.identifier();
        let content = object.content();
        let predictions = self.predict(object).await?;
        debug!(cid = %id, labels = predictions.len(), model = self.classifier.model_name(), "image classified");

        let labels = predictions
            .into_iter()
            .map(|p| {
                FieldValue::Map(BTreeMap::from([
                    ("label".to_string(), FieldValue::Text(p.label)),
                    ("confidence".to_string(), FieldValue::Float(p.confidence)),
                ]))
            })
            .collect();

        let mut record = MetadataRecord::new(*id, label)
            .with_field("labels", FieldValue::List(labels))
            .with_field("byte_length", content.len());

        match probe_header(content) {
            Some((width, height, format)) => {
                record.insert("width", u64::from(width));
                record.insert("height", u64::from(height));
                record.insert("format", format);
            }
            None => debug!(cid = %id, "image header not decodable"),
        }
        Ok(record)
    }

    async fn predict(&self, object: &ResolvedObject) -> ExtractResult<Vec<Prediction>> {
        let id = object.identifier();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractError::model_unavailable(id, "classifier pool closed"))?;

        match tokio::time::timeout(self.timeout, self.classifier.classify_image(object.content())).await {
            Ok(Ok(predictions)) => Ok(predictions),
            Ok(Err(e)) => {
                warn!(cid = %id, error = %e, "image classifier failed");
                Err(ExtractError::model_unavailable(id, e.to_string()))
            }
            Err(_) => {
                warn!(cid = %id, timeout = ?self.timeout, "image classifier timed out");
                Err(ExtractError::model_unavailable(
                    id,
                    format!("classifier timed out after {:?}", self.timeout),
                ))
            }
        }
    }
}

impl std::fmt::Debug for ImageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageExtractor")
            .field("model", &self.classifier.model_name())
            .field("available_permits", &self.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Read dimensions and format from the image header without decoding pixels.
fn probe_header(bytes: &[u8]) -> Option<(u32, u32, String)> {
    let reader = ::image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let format = reader.format().map(|f| format!("{f:?}").to_lowercase())?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some((width, height, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifierError, PlaceholderClassifier, UnavailableClassifier};
    use async_trait::async_trait;
    use lens_types::{Codec, ContentIdentifier, HashFunction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::DynamicImage::ImageRgb8(::image::RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ::image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    fn object(bytes: Vec<u8>) -> ResolvedObject {
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, &bytes).unwrap();
        ResolvedObject::decode(id, bytes).unwrap()
    }

    struct FixedClassifier(Vec<Prediction>);

    #[async_trait]
    impl ImageClassifier for FixedClassifier {
        async fn classify_image(&self, _: &[u8]) -> Result<Vec<Prediction>, ClassifierError> {
            Ok(self.0.clone())
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Tracks the peak number of concurrent calls.
    #[derive(Default)]
    struct SlowClassifier {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ImageClassifier for SlowClassifier {
        async fn classify_image(&self, _: &[u8]) -> Result<Vec<Prediction>, ClassifierError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![])
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    struct StalledClassifier;

    #[async_trait]
    impl ImageClassifier for StalledClassifier {
        async fn classify_image(&self, _: &[u8]) -> Result<Vec<Prediction>, ClassifierError> {
            std::future::pending().await
        }
        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn labels_keep_model_order_and_header_is_read() {
        let classifier = FixedClassifier(vec![Prediction::new("cat", 0.9), Prediction::new("dog", 0.25)]);
        let extractor = ImageExtractor::new(Arc::new(classifier), 2, Duration::from_secs(5));
        let record = extractor
            .extract(ContentTypeLabel::Image, &object(png(3, 2)))
            .await
            .unwrap();

        let labels = record.field("labels").and_then(|v| v.as_list()).unwrap();
        assert_eq!(labels.len(), 2);
        match &labels[0] {
            FieldValue::Map(m) => {
                assert_eq!(m["label"], FieldValue::from("cat"));
                assert_eq!(m["confidence"], FieldValue::Float(0.9));
            }
            other => panic!("unexpected label value {other:?}"),
        }
        assert_eq!(record.field("width").and_then(|v| v.as_integer()), Some(3));
        assert_eq!(record.field("height").and_then(|v| v.as_integer()), Some(2));
        assert_eq!(record.field("format").and_then(|v| v.as_text()), Some("png"));
    }

    #[tokio::test]
    async fn undecodable_header_still_yields_record() {
        let extractor = ImageExtractor::new(Arc::new(PlaceholderClassifier), 1, Duration::from_secs(5));
        let bytes = b"\x89PNG\r\n\x1a\ntruncated".to_vec();
        let len = bytes.len() as i64;
        let record = extractor.extract(ContentTypeLabel::Image, &object(bytes)).await.unwrap();
        assert_eq!(record.field("byte_length").and_then(|v| v.as_integer()), Some(len));
        assert!(record.field("width").is_none());
        assert_eq!(record.field("labels"), Some(&FieldValue::List(vec![])));
    }

    #[tokio::test]
    async fn classifier_failure_is_model_unavailable() {
        let extractor = ImageExtractor::new(
            Arc::new(UnavailableClassifier::new("offline")),
            1,
            Duration::from_secs(5),
        );
        let err = extractor
            .extract(ContentTypeLabel::Image, &object(png(1, 1)))
            .await
            .unwrap_err();
        assert!(err.is_model_unavailable());
    }

    #[tokio::test]
    async fn classifier_timeout_is_model_unavailable() {
        let extractor = ImageExtractor::new(Arc::new(StalledClassifier), 1, Duration::from_millis(20));
        let err = extractor
            .extract(ContentTypeLabel::Image, &object(png(1, 1)))
            .await
            .unwrap_err();
        assert!(err.is_model_unavailable());
        assert_eq!(extractor.available_permits(), 1);
    }

    #[tokio::test]
    async fn classifier_calls_are_bounded() {
        let classifier = Arc::new(SlowClassifier::default());
        let extractor = ImageExtractor::new(classifier.clone(), 2, Duration::from_secs(5));
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..6u32 {
            let extractor = extractor.clone();
            tasks.spawn(async move {
                extractor
                    .extract(ContentTypeLabel::Image, &object(png(i + 1, 1)))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(classifier.peak.load(Ordering::SeqCst), 2);
    }
}
