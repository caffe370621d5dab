//! Image preprocessing
//!
//! Turns arbitrary encoded image bytes into the fixed-size, channels-last
//! tensor the classifier expects: RGB, 128x128, values in `[0, 1]`.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{Result, TomatoLeafError};

/// Side length of the network input
pub const DEFAULT_IMAGE_SIZE: u32 = 128;

/// A preprocessed image, `[1, size, size, 3]` row-major
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    data: Vec<f32>,
    size: usize,
}

impl NormalizedImage {
    /// `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size, self.size, 3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Move the pixels onto `device`
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let data = TensorData::new(self.data.clone(), self.shape());
        Tensor::from_data(data, device)
    }
}

/// Decode, convert to RGB, resize and scale
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    image_size: u32,
    filter: FilterType,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            filter: FilterType::CatmullRom,
        }
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the output side length
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Decode bytes in any supported format
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| TomatoLeafError::Decode(e.to_string()))
    }

    /// RGB conversion, exact resize (aspect ratio not kept), scale by 1/255
    pub fn preprocess(&self, image: &DynamicImage) -> NormalizedImage {
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.image_size, self.image_size, self.filter);

        let data = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect();

        NormalizedImage {
            data,
            size: self.image_size as usize,
        }
    }

    /// Decode then preprocess
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<NormalizedImage> {
        let image = self.decode(bytes)?;
        Ok(self.preprocess(&image))
    }

    /// Load an image file and preprocess it
    pub fn preprocess_file(&self, path: &Path) -> Result<NormalizedImage> {
        let image = image::open(path)
            .map_err(|e| TomatoLeafError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        Ok(self.preprocess(&image))
    }
}
