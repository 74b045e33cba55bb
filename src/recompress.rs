//! Decode-then-JPEG re-encoding of a single image, independent of PDF structure.

use std::fmt;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GrayImage, RgbImage};
use lopdf::ObjectId;

use crate::error::UnsupportedImage;

/// Colour layout of filter-decoded 8-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleColor {
    Gray,
    Rgb,
    Cmyk,
}

impl SampleColor {
    pub fn components(self) -> usize {
        match self {
            SampleColor::Gray => 1,
            SampleColor::Rgb => 3,
            SampleColor::Cmyk => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFormat {
    /// A self-describing encoded file (JPEG, JPEG 2000, ...), named by its PDF filter.
    Encoded { filter: String },
    /// Raw samples, row-major, 8 bits per component.
    RawSamples {
        width: u32,
        height: u32,
        color: SampleColor,
    },
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Encoded { filter } => write!(f, "/{filter} stream"),
            ImageFormat::RawSamples {
                width,
                height,
                color,
            } => write!(f, "{width}x{height} {color:?} samples"),
        }
    }
}

/// An embedded raster image pulled out of a document.
#[derive(Debug, Clone)]
pub struct ImageResource {
    pub object_id: ObjectId,
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompressedImage {
    /// Baseline JPEG, ready to become a `/DCTDecode` stream body.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub enum Recompression {
    Recompressed(RecompressedImage),
    Unsupported(UnsupportedImage),
}

/// Decode `data` as an image file and re-encode it as JPEG at `quality`.
///
/// Alpha and palette information are dropped: JPEG only carries RGB here.
pub fn recompress(data: &[u8], quality: u8) -> Recompression {
    match image::load_from_memory(data) {
        Ok(img) => encode_jpeg(&img, quality),
        Err(e) => Recompression::Unsupported(UnsupportedImage::Decode(e)),
    }
}

/// Recompress an extracted resource, building the image from raw samples
/// when the stream did not hold an encoded file.
pub fn recompress_resource(resource: &ImageResource, quality: u8) -> Recompression {
    match &resource.format {
        ImageFormat::Encoded { .. } => recompress(&resource.data, quality),
        ImageFormat::RawSamples {
            width,
            height,
            color,
        } => match image_from_samples(&resource.data, *width, *height, *color) {
            Ok(img) => encode_jpeg(&img, quality),
            Err(e) => Recompression::Unsupported(e),
        },
    }
}

fn image_from_samples(
    samples: &[u8],
    width: u32,
    height: u32,
    color: SampleColor,
) -> Result<DynamicImage, UnsupportedImage> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(color.components()))
        .unwrap_or(usize::MAX);
    if samples.len() != expected {
        return Err(UnsupportedImage::SampleLayout {
            width,
            height,
            expected,
            actual: samples.len(),
        });
    }

    let layout_error = || UnsupportedImage::SampleLayout {
        width,
        height,
        expected,
        actual: samples.len(),
    };

    let img = match color {
        SampleColor::Gray => DynamicImage::ImageLuma8(
            GrayImage::from_raw(width, height, samples.to_vec()).ok_or_else(layout_error)?,
        ),
        SampleColor::Rgb => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, samples.to_vec()).ok_or_else(layout_error)?,
        ),
        SampleColor::Cmyk => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, cmyk_to_rgb(samples)).ok_or_else(layout_error)?,
        ),
    };
    Ok(img)
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let c = cmyk[0] as f32 / 255.0;
            let m = cmyk[1] as f32 / 255.0;
            let y = cmyk[2] as f32 / 255.0;
            let k = cmyk[3] as f32 / 255.0;

            let r = (1.0 - c) * (1.0 - k);
            let g = (1.0 - m) * (1.0 - k);
            let b = (1.0 - y) * (1.0 - k);

            [
                (r * 255.0).round() as u8,
                (g * 255.0).round() as u8,
                (b * 255.0).round() as u8,
            ]
        })
        .collect()
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Recompression {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    if let Err(e) = encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8.into()) {
        return Recompression::Unsupported(UnsupportedImage::Encode(e));
    }

    log::debug!(
        "re-encoded {}x{} image as JPEG(q={}): {} bytes",
        width,
        height,
        quality,
        buffer.len()
    );

    Recompression::Recompressed(RecompressedImage {
        data: buffer,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat as FileFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn noisy_rgb(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x2545_f491;
        RgbImage::from_fn(width, height, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state & 0x3f) as u8;
            image::Rgb([
                (x as u8).wrapping_add(noise),
                (y as u8).wrapping_add(noise / 2),
                noise.wrapping_mul(3),
            ])
        })
    }

    fn jpeg_bytes(img: &RgbImage, quality: u8) -> Vec<u8> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(img)
            .unwrap();
        out
    }

    fn unwrap_recompressed(result: Recompression) -> RecompressedImage {
        match result {
            Recompression::Recompressed(img) => img,
            Recompression::Unsupported(e) => panic!("expected recompressed image, got {e}"),
        }
    }

    #[test]
    fn garbage_is_unsupported() {
        let result = recompress(b"definitely not an image", 50);
        assert!(matches!(
            result,
            Recompression::Unsupported(UnsupportedImage::Decode(_))
        ));
    }

    #[test]
    fn output_is_a_decodable_jpeg_with_same_dimensions() {
        let source = jpeg_bytes(&noisy_rgb(64, 48), 95);
        let out = unwrap_recompressed(recompress(&source, 50));

        assert_eq!((out.width, out.height), (64, 48));
        let format = image::guess_format(&out.data).unwrap();
        assert_eq!(format, FileFormat::Jpeg);
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
    }

    #[test]
    fn lower_quality_gives_smaller_output() {
        let source = jpeg_bytes(&noisy_rgb(128, 128), 95);
        let high = unwrap_recompressed(recompress(&source, 90));
        let low = unwrap_recompressed(recompress(&source, 10));
        assert!(low.data.len() < high.data.len());
    }

    #[test]
    fn alpha_is_discarded() {
        let rgba = RgbaImage::from_pixel(16, 16, Rgba([200, 10, 10, 64]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut Cursor::new(&mut png), FileFormat::Png)
            .unwrap();

        let out = unwrap_recompressed(recompress(&png, 80));
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn raw_rgb_samples_are_encoded() {
        let img = noisy_rgb(20, 10);
        let resource = ImageResource {
            object_id: (7, 0),
            data: img.into_raw(),
            format: ImageFormat::RawSamples {
                width: 20,
                height: 10,
                color: SampleColor::Rgb,
            },
        };
        let out = unwrap_recompressed(recompress_resource(&resource, 60));
        assert_eq!((out.width, out.height), (20, 10));
    }

    #[test]
    fn short_sample_buffer_is_unsupported() {
        let resource = ImageResource {
            object_id: (7, 0),
            data: vec![0; 10],
            format: ImageFormat::RawSamples {
                width: 4,
                height: 4,
                color: SampleColor::Gray,
            },
        };
        match recompress_resource(&resource, 60) {
            Recompression::Unsupported(UnsupportedImage::SampleLayout {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn oversized_declared_dimensions_are_unsupported() {
        let resource = ImageResource {
            object_id: (7, 0),
            data: vec![0; 16],
            format: ImageFormat::RawSamples {
                width: u32::MAX,
                height: u32::MAX,
                color: SampleColor::Cmyk,
            },
        };
        assert!(matches!(
            recompress_resource(&resource, 60),
            Recompression::Unsupported(UnsupportedImage::SampleLayout { .. })
        ));
    }

    #[test]
    fn formats_describe_themselves() {
        let encoded = ImageFormat::Encoded {
            filter: "DCTDecode".to_string(),
        };
        assert_eq!(encoded.to_string(), "/DCTDecode stream");
        let raw = ImageFormat::RawSamples {
            width: 3,
            height: 2,
            color: SampleColor::Gray,
        };
        assert_eq!(raw.to_string(), "3x2 Gray samples");
    }

    #[test]
    fn cmyk_conversion_endpoints() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
        assert_eq!(cmyk_to_rgb(&[255, 0, 0, 0]), vec![0, 255, 255]);
    }
}
