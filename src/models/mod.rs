use image::RgbImage;
use serde::Deserialize;

use crate::errors::ImageError;

/// Decoded request image. Always three colour channels, never zero-sized.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: RgbImage,
}

impl Image {
    pub fn new(pixels: RgbImage) -> Result<Self, ImageError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(ImageError::Empty);
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u32 {
        3
    }

    pub fn shape(&self) -> ImageShape {
        ImageShape {
            height: self.height(),
            width: self.width(),
            channels: self.channels(),
        }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl From<ImageShape> for [u32; 3] {
    fn from(shape: ImageShape) -> Self {
        [shape.height, shape.width, shape.channels]
    }
}

/// Raw `/predict` body, before any field is validated.
///
/// `img` and `plate_diameter` stay as JSON values because both accept more
/// than one shape (text or byte array, number or numeric string).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PredictPayload {
    #[serde(default)]
    pub img: Option<serde_json::Value>,
    #[serde(default)]
    pub food_type: Option<String>,
    #[serde(default)]
    pub plate_diameter: Option<serde_json::Value>,
}

/// A validated estimation request.
#[derive(Debug, Clone)]
pub struct EstimationRequest {
    pub image: Image,
    pub food_type: String,
    /// Metres. `0.0` means no prior was supplied.
    pub plate_diameter: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityEntry {
    pub canonical_name: String,
    pub density_g_per_ml: f64,
}

impl DensityEntry {
    pub fn new(canonical_name: impl Into<String>, density_g_per_ml: f64) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            density_g_per_ml,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    pub food_type_match: String,
    pub weight_grams: f64,
    pub volumes_ml: Vec<f64>,
    pub density_g_per_ml: f64,
    pub image_shape: ImageShape,
}
