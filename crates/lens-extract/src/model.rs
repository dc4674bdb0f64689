//! Image classifier capability.
//!
//! The inference model behind image labelling is an external collaborator.
//! Lens only depends on the narrow [`ImageClassifier`] contract; the bundled
//! implementations cover deployments without a model.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// One label predicted for an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Errors reported by a classifier implementation.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The model is not loaded or its server cannot be reached.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The model rejected or failed on the input.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Image classification contract.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Predict labels for encoded image bytes, most confident first.
    async fn classify_image(&self, image: &[u8]) -> Result<Vec<Prediction>, ClassifierError>;

    /// Name recorded alongside the labels.
    fn model_name(&self) -> &str;
}

/// Classifier that never predicts anything.
///
/// Used when no model is configured; image records then carry an empty
/// label list plus whatever the image header reveals.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderClassifier;

impl PlaceholderClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageClassifier for PlaceholderClassifier {
    async fn classify_image(&self, image: &[u8]) -> Result<Vec<Prediction>, ClassifierError> {
        debug!(bytes = image.len(), "placeholder classifier returns no labels");
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str {
        "placeholder"
    }
}

/// Classifier whose model is permanently unreachable.
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ImageClassifier for UnavailableClassifier {
    async fn classify_image(&self, _image: &[u8]) -> Result<Vec<Prediction>, ClassifierError> {
        Err(ClassifierError::Unavailable(self.reason.clone()))
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_returns_no_labels() {
        let labels = PlaceholderClassifier::new().classify_image(b"img").await.unwrap();
        assert!(labels.is_empty());
    }

    #[tokio::test]
    async fn unavailable_always_fails() {
        let classifier = UnavailableClassifier::new("no model server");
        let err = classifier.classify_image(b"img").await.unwrap_err();
        assert!(err.to_string().contains("no model server"));
    }
}
