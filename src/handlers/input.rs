use base64::{engine::general_purpose, Engine};
use serde_json::Value;

use crate::errors::{ImageError, PipelineError};
use crate::models::Image;
use crate::services::density::DEFAULT_KEY;

/// Decodes the `img` field of a request.
///
/// Text is base64 (optionally a `data:<mime>;base64,` URL). An array must hold
/// integers in `0..=255`, one per byte of the encoded file. Absent or `null`
/// is a missing field, anything else is an invalid image.
pub fn decode_image_payload(img: Option<&Value>) -> Result<Image, PipelineError> {
    let bytes = match img {
        None | Some(Value::Null) => return Err(PipelineError::MissingField { field: "img" }),
        Some(Value::String(text)) => decode_base64(text)?,
        Some(Value::Array(values)) => bytes_from_array(values)?,
        Some(other) => {
            return Err(ImageError::ByteArray {
                reason: format!("expected text or an array, got {}", json_type(other)),
            }
            .into())
        }
    };

    Ok(decode_raster(&bytes)?)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, ImageError> {
    let encoded = match text.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => text,
    };
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(ImageError::Base64)
}

/// Every element must be an integer byte value; there is no signed wrap-around.
pub fn bytes_from_array(values: &[Value]) -> Result<Vec<u8>, ImageError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| ImageError::ByteArray {
                    reason: format!("value {} at index {} is not a byte", value, index),
                })
        })
        .collect()
}

/// Decodes an encoded raster file (PNG, JPEG, ...) into a 3-channel image.
pub fn decode_raster(bytes: &[u8]) -> Result<Image, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(ImageError::Undecodable)?;
    Image::new(decoded.into_rgb8())
}

/// Absent or blank food types resolve to the `default` catalog key.
pub fn resolve_food_type(food_type: Option<&str>) -> String {
    match food_type.map(str::trim) {
        Some(ft) if !ft.is_empty() => ft.to_string(),
        _ => DEFAULT_KEY.to_string(),
    }
}

/// Lenient parse of the optional plate diameter hint.
///
/// Numbers and numeric strings are accepted. Anything negative, non-finite or
/// non-numeric becomes `0.0` ("no prior") instead of failing the request.
pub fn parse_plate_diameter(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(d) if d.is_finite() && d >= 0.0 => d,
        Some(d) => {
            log::debug!("Ignoring out-of-range plate diameter {}", d);
            0.0
        }
        None => 0.0,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 0, 0])));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        general_purpose::STANDARD.encode(png_bytes(width, height))
    }

    #[test]
    fn test_decode_base64_png() {
        let value = json!(png_base64(200, 150));
        let image = decode_image_payload(Some(&value)).unwrap();
        assert_eq!((image.height(), image.width(), image.channels()), (150, 200, 3));
    }

    #[test]
    fn test_decode_data_url() {
        let value = json!(format!("data:image/png;base64,{}", png_base64(4, 3)));
        let image = decode_image_payload(Some(&value)).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn test_decode_byte_array() {
        let value = json!(png_bytes(5, 7));
        let image = decode_image_payload(Some(&value)).unwrap();
        assert_eq!((image.width(), image.height()), (5, 7));
    }

    #[test]
    fn test_missing_image() {
        assert!(matches!(
            decode_image_payload(None),
            Err(PipelineError::MissingField { field: "img" })
        ));
        assert!(matches!(
            decode_image_payload(Some(&Value::Null)),
            Err(PipelineError::MissingField { .. })
        ));
    }

    #[test]
    fn test_malformed_base64() {
        let err = decode_image_payload(Some(&json!("invalid_base64"))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(ImageError::Base64(_))));
        assert_eq!(err.to_string(), "Invalid base64 image data");
    }

    #[test]
    fn test_byte_array_out_of_range() {
        for value in [json!([137, 80, 300]), json!([137, -1]), json!([1.5]), json!(["a"])] {
            let err = decode_image_payload(Some(&value)).unwrap_err();
            assert!(matches!(
                err,
                PipelineError::InvalidImage(ImageError::ByteArray { .. })
            ));
        }
        let err = decode_image_payload(Some(&json!(42))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid byte array image data");
    }

    #[test]
    fn test_undecodable_bytes() {
        let value = json!(general_purpose::STANDARD.encode(b"definitely not an image"));
        let err = decode_image_payload(Some(&value)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidImage(ImageError::Undecodable(_))
        ));
        assert_eq!(err.to_string(), "Could not decode image");
    }

    #[test]
    fn test_resolve_food_type() {
        assert_eq!(resolve_food_type(None), "default");
        assert_eq!(resolve_food_type(Some("")), "default");
        assert_eq!(resolve_food_type(Some("   ")), "default");
        assert_eq!(resolve_food_type(Some(" Apple ")), "Apple");
    }

    #[test]
    fn test_plate_diameter_leniency() {
        assert_eq!(parse_plate_diameter(None), 0.0);
        assert_eq!(parse_plate_diameter(Some(&json!(24.0))), 24.0);
        assert_eq!(parse_plate_diameter(Some(&json!(30))), 30.0);
        assert_eq!(parse_plate_diameter(Some(&json!("0.27"))), 0.27);
        assert_eq!(parse_plate_diameter(Some(&json!(-5.0))), 0.0);
        assert_eq!(parse_plate_diameter(Some(&json!("wide"))), 0.0);
        assert_eq!(parse_plate_diameter(Some(&json!("NaN"))), 0.0);
        assert_eq!(parse_plate_diameter(Some(&json!(true))), 0.0);
        assert_eq!(parse_plate_diameter(Some(&Value::Null)), 0.0);
    }
}
