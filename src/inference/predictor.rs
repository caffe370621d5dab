//! Inference Predictor Module
//!
//! Runs the classifier on preprocessed images and attaches disease guidance
//! to the top prediction.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::preprocess::{ImagePreprocessor, NormalizedImage};
use crate::knowledge::DiseaseCatalog;
use crate::labels::{class_name, display_name};
use crate::model::{default_registry, ClassifierConfig, TomatoClassifier};
use crate::utils::error::{Result, TomatoLeafError};
use crate::utils::round_to;

/// Raw outcome of one forward pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index
    pub class_index: usize,

    /// Predicted class label, e.g. `Tomato___Leaf_Mold`
    pub label: String,

    /// Probability of the predicted class, 0 to 1
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl Prediction {
    /// Build from a probability vector; ties go to the lowest index
    pub fn from_probabilities(probabilities: Vec<f32>, inference_time: Duration) -> Self {
        let mut class_index = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[class_index] {
                class_index = i;
            }
        }
        let confidence = probabilities.get(class_index).copied().unwrap_or(0.0);

        Self {
            class_index,
            label: class_name(class_index).unwrap_or("Unknown").to_string(),
            confidence,
            probabilities,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        }
    }

    /// Confidence as a percentage rounded to 2 decimals
    pub fn confidence_percent(&self) -> f64 {
        round_to(self.confidence as f64 * 100.0, 2)
    }

    /// Human-readable disease name
    pub fn disease(&self) -> String {
        display_name(&self.label)
    }

    /// The `k` most likely classes as `(index, label, probability)`
    pub fn top_k(&self, k: usize) -> Vec<(usize, &'static str, f32)> {
        let mut indexed: Vec<(usize, f32)> = self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed
            .into_iter()
            .take(k)
            .map(|(idx, prob)| (idx, class_name(idx).unwrap_or("Unknown"), prob))
            .collect()
    }
}

/// Response body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Label without the `Tomato___` prefix, underscores as spaces
    pub disease: String,

    /// Percentage, 0 to 100, 2 decimals
    pub confidence: f64,

    pub cause: String,

    pub recommendations: Vec<String>,
}

/// Classifier plus disease catalog
pub struct Predictor<B: Backend> {
    classifier: TomatoClassifier<B>,
    catalog: DiseaseCatalog,
    preprocessor: ImagePreprocessor,
}

impl<B: Backend> Predictor<B> {
    /// Wrap a loaded classifier; the preprocessor follows its input size
    pub fn new(classifier: TomatoClassifier<B>, catalog: DiseaseCatalog) -> Self {
        let preprocessor =
            ImagePreprocessor::new().with_image_size(classifier.config().input_size as u32);
        for label in catalog.missing_labels() {
            warn!("No guidance for '{}', the placeholder text will be served", label);
        }
        Self {
            classifier,
            catalog,
            preprocessor,
        }
    }

    /// Load an artifact with the default registry and builtin catalog
    pub fn load(path: &Path, device: &B::Device) -> Result<Self> {
        let classifier = TomatoClassifier::load(
            path,
            &default_registry(),
            ClassifierConfig::default(),
            device,
        )?;
        Ok(Self::new(classifier, DiseaseCatalog::builtin()))
    }

    pub fn classifier(&self) -> &TomatoClassifier<B> {
        &self.classifier
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Run the classifier on one preprocessed image
    pub fn classify(&self, image: &NormalizedImage) -> Result<Prediction> {
        let start = Instant::now();
        let input = image.to_tensor::<B>(self.classifier.device());
        let probabilities: Vec<f32> = self
            .classifier
            .predict_proba(input)?
            .into_data()
            .to_vec()
            .map_err(|e| TomatoLeafError::Inference(format!("{:?}", e)))?;

        let prediction = Prediction::from_probabilities(probabilities, start.elapsed());
        debug!(
            "Predicted {} ({:.4}) in {:.2} ms",
            prediction.label, prediction.confidence, prediction.inference_time_ms
        );
        Ok(prediction)
    }

    /// Attach catalog guidance to a prediction
    pub fn describe(&self, prediction: &Prediction) -> PredictionResult {
        let info = self.catalog.lookup(&prediction.label);
        PredictionResult {
            disease: prediction.disease(),
            confidence: prediction.confidence_percent(),
            cause: info.cause.clone(),
            recommendations: info.recommendations.clone(),
        }
    }

    /// Full pipeline for uploaded bytes
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let image = self.preprocessor.preprocess_bytes(bytes)?;
        let prediction = self.classify(&image)?;
        Ok(self.describe(&prediction))
    }

    /// Classify an image file
    pub fn classify_file(&self, path: &Path) -> Result<Prediction> {
        let image = self.preprocessor.preprocess_file(path)?;
        self.classify(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{UNKNOWN_CAUSE, UNKNOWN_RECOMMENDATION};
    use crate::model::fixtures::tiny_artifact;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = crate::backend::DefaultBackend;

    fn predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let classifier = TomatoClassifier::from_artifact(
            &tiny_artifact(128),
            &default_registry(),
            ClassifierConfig::default(),
            &device,
        )
        .unwrap();
        Predictor::new(classifier, DiseaseCatalog::builtin())
    }

    fn leaf_png() -> Vec<u8> {
        let image = RgbImage::from_fn(96, 64, |x, y| Rgb([(x * 2) as u8, 120, (y * 3) as u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_argmax_and_confidence() {
        let mut probs = vec![0.02; 10];
        probs[3] = 0.81234;
        let prediction = Prediction::from_probabilities(probs, Duration::from_millis(3));

        assert_eq!(prediction.class_index, 3);
        assert_eq!(prediction.label, "Tomato___Leaf_Mold");
        assert_eq!(prediction.disease(), "Leaf Mold");
        assert_eq!(prediction.confidence_percent(), 81.23);
        assert_eq!(prediction.top_k(2)[1].1, "Tomato___Bacterial_spot");
    }

    #[test]
    fn test_ties_pick_first_index() {
        let prediction = Prediction::from_probabilities(vec![0.5, 0.5], Duration::ZERO);
        assert_eq!(prediction.class_index, 0);
    }

    #[test]
    fn test_predict_bytes_end_to_end() {
        let predictor = predictor();
        let result = predictor.predict_bytes(&leaf_png()).unwrap();

        assert!((0.0..=100.0).contains(&result.confidence));
        assert!(!result.disease.starts_with("Tomato"));
        assert!(!result.disease.contains('_'));
        assert_eq!(result.recommendations.len(), 3);
    }

    #[test]
    fn test_confidence_matches_max_probability() {
        let predictor = predictor();
        let image = predictor.preprocessor().preprocess_bytes(&leaf_png()).unwrap();
        let prediction = predictor.classify(&image).unwrap();

        let max = prediction
            .probabilities
            .iter()
            .copied()
            .fold(f32::MIN, f32::max);
        assert_eq!(prediction.confidence, max);
        assert_eq!(
            predictor.describe(&prediction).confidence,
            round_to(max as f64 * 100.0, 2)
        );
    }

    #[test]
    fn test_unknown_label_gets_placeholder() {
        let predictor = predictor();
        let prediction = Prediction {
            class_index: 42,
            label: "Tomato___Powdery_mildew".to_string(),
            confidence: 0.9,
            probabilities: vec![],
            inference_time_ms: 0.0,
        };
        let result = predictor.describe(&prediction);

        assert_eq!(result.disease, "Powdery mildew");
        assert_eq!(result.cause, UNKNOWN_CAUSE);
        assert_eq!(result.recommendations, vec![UNKNOWN_RECOMMENDATION.to_string()]);
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let predictor = predictor();
        assert!(matches!(
            predictor.predict_bytes(b"\x00\x01\x02"),
            Err(TomatoLeafError::Decode(_))
        ));
    }
}
