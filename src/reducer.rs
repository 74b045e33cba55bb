//! The size-targeting loop: recompress every image, save, measure, tighten.

use lopdf::{Document, Object, ObjectId};

use crate::config::ReduceConfig;
use crate::error::{ConfigError, ReduceError};
use crate::recompress::{recompress_resource, RecompressedImage, Recompression};
use crate::scan;

/// Summary of one parse/recompress/serialize cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub iteration: u32,
    pub quality: u8,
    pub size: u64,
    pub images_found: usize,
    pub images_recompressed: usize,
}

/// Outcome of [`reduce`]: the last attempt's document plus the history.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub bytes: Vec<u8>,
    pub size: u64,
    pub target: u64,
    pub attempts: Vec<Attempt>,
}

impl Reduction {
    pub fn target_met(&self) -> bool {
        self.size <= self.target
    }

    pub fn final_quality(&self) -> Option<u8> {
        self.attempts.last().map(|a| a.quality)
    }
}

/// Shrink `source` towards `target_size` bytes.
///
/// Every attempt starts again from `source`, so lossy re-encodes never
/// stack. Missing the target after the last attempt is not an error: the
/// last attempt is returned and [`Reduction::target_met`] reports it.
pub fn reduce(
    source: &[u8],
    target_size: u64,
    config: &ReduceConfig,
) -> Result<Reduction, ReduceError> {
    config.validate()?;

    let mut quality = config.initial_quality;
    let mut attempts = Vec::with_capacity(config.max_iterations as usize);
    let mut output = None;

    for iteration in 1..=config.max_iterations {
        let (bytes, attempt) = run_attempt(source, quality, iteration)?;
        log::info!(
            "attempt {}/{}: quality {} -> {} bytes ({}/{} images recompressed)",
            iteration,
            config.max_iterations,
            quality,
            attempt.size,
            attempt.images_recompressed,
            attempt.images_found
        );
        attempts.push(attempt);
        output = Some(bytes);

        if attempt.size <= target_size {
            break;
        }

        let next = config.next_quality(quality);
        if config.stop_at_floor && next == quality {
            log::debug!("quality floor {} reached, stopping early", quality);
            break;
        }
        quality = next;
    }

    let bytes = output.ok_or(ConfigError::InvalidIterations)?;
    let size = bytes.len() as u64;
    if size > target_size {
        log::warn!(
            "target of {} bytes not reached after {} attempts, best effort is {} bytes",
            target_size,
            attempts.len(),
            size
        );
    }

    Ok(Reduction {
        bytes,
        size,
        target: target_size,
        attempts,
    })
}

fn load(source: &[u8]) -> Result<Document, ReduceError> {
    let mut doc = Document::load_mem(source).map_err(ReduceError::MalformedDocument)?;

    // Rewritten streams would be stored in plain text under a live /Encrypt.
    if doc.is_encrypted() {
        doc.decrypt(b"").map_err(ReduceError::Encrypted)?;
    }

    Ok(doc)
}

fn run_attempt(
    source: &[u8],
    quality: u8,
    iteration: u32,
) -> Result<(Vec<u8>, Attempt), ReduceError> {
    let mut doc = load(source)?;

    let image_ids = scan::image_object_ids(&doc);
    let mut images_recompressed = 0;

    for &object_id in &image_ids {
        let outcome = match scan::extract(&doc, object_id) {
            Ok(resource) => {
                log::debug!(
                    "image {} {}: {}, {} bytes",
                    resource.object_id.0,
                    resource.object_id.1,
                    resource.format,
                    resource.data.len()
                );
                recompress_resource(&resource, quality)
            }
            Err(e) => Recompression::Unsupported(e),
        };

        match outcome {
            Recompression::Recompressed(image) => {
                replace_image(&mut doc, object_id, image);
                images_recompressed += 1;
            }
            Recompression::Unsupported(reason) => {
                log::debug!(
                    "keeping image {} {} unchanged: {}",
                    object_id.0,
                    object_id.1,
                    reason
                );
            }
        }
    }

    let mut bytes = Vec::with_capacity(source.len());
    doc.save_to(&mut bytes)?;

    let attempt = Attempt {
        iteration,
        quality,
        size: bytes.len() as u64,
        images_found: image_ids.len(),
        images_recompressed,
    };
    Ok((bytes, attempt))
}

fn replace_image(doc: &mut Document, object_id: ObjectId, image: RecompressedImage) {
    if let Some(Object::Stream(stream)) = doc.objects.get_mut(&object_id) {
        stream.set_content(image.data);
        stream
            .dict
            .set("Filter", Object::Name(b"DCTDecode".to_vec()));
        stream.dict.set("Width", Object::Integer(image.width as i64));
        stream.dict.set("Height", Object::Integer(image.height as i64));
        stream
            .dict
            .set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        stream.dict.set("BitsPerComponent", Object::Integer(8));
        stream.dict.remove(b"DecodeParms");
        stream.dict.remove(b"Decode");
        // Colour-key ranges refer to the old samples and component count.
        if let Ok(Object::Array(_)) = stream.dict.get(b"Mask") {
            stream.dict.remove(b"Mask");
        }
    }
}
