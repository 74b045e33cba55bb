//! Locating raster image XObjects and pulling their data out of a document.

use std::collections::HashSet;
use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::UnsupportedImage;
use crate::recompress::{ImageFormat, ImageResource, SampleColor};

/// Filters whose output is a complete image file rather than raw samples.
const ENCODED_FILTERS: [&[u8]; 2] = [b"DCTDecode", b"JPXDecode"];

/// Filters that decode to raw samples and are safe to undo here.
const SAMPLE_FILTERS: [&[u8]; 5] = [
    b"FlateDecode",
    b"LZWDecode",
    b"ASCII85Decode",
    b"ASCIIHexDecode",
    b"RunLengthDecode",
];

/// Raster images referenced from page resources, in page order, each once.
///
/// Form XObjects are searched through their own resources. Stencil masks
/// are left out since they carry no colour data.
pub fn image_object_ids(doc: &Document) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut visited = HashSet::new();

    for page_id in doc.get_pages().into_values() {
        if let Some(resources) = page_resources(doc, page_id) {
            collect_images(doc, resources, &mut images, &mut visited);
        }
    }

    images
}

fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    images: &mut Vec<ObjectId>,
    visited: &mut HashSet<ObjectId>,
) {
    let xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve_dict(doc, o)) {
        Some(d) => d,
        None => return,
    };

    for (name, value) in xobjects.iter() {
        let id = match value.as_reference() {
            Ok(id) => id,
            Err(_) => continue,
        };
        if !visited.insert(id) {
            continue;
        }
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(s)) => s,
            _ => continue,
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => {
                if is_stencil_mask(doc, &stream.dict) {
                    log::debug!(
                        "skipping stencil mask /{} ({} {})",
                        String::from_utf8_lossy(name),
                        id.0,
                        id.1
                    );
                } else {
                    images.push(id);
                }
            }
            Ok(b"Form") => {
                if let Some(form_resources) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve_dict(doc, o))
                {
                    collect_images(doc, form_resources, images, visited);
                }
            }
            _ => {}
        }
    }
}

/// The page's `/Resources`, inherited from the page tree when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = Some(page_id);
    let mut seen = HashSet::new();

    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let node = doc.get_dictionary(id).ok()?;
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

fn is_stencil_mask(doc: &Document, dict: &Dictionary) -> bool {
    dict.get(b"ImageMask")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

fn resolve_i64(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key)
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_i64().ok())
}

/// Replace an indirect value (or indirect array items) under `key` with the
/// objects they point at, so lopdf's filter code can read them.
fn inline_references(doc: &Document, dict: &mut Dictionary, key: &[u8]) {
    let resolved = match dict.get(key) {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok().cloned(),
        Ok(Object::Array(items)) if items.iter().any(|o| matches!(o, Object::Reference(_))) => {
            Some(Object::Array(
                items
                    .iter()
                    .map(|item| resolve(doc, item).cloned().unwrap_or(Object::Null))
                    .collect(),
            ))
        }
        _ => None,
    };

    if let Some(value) = resolved {
        dict.set(key.to_vec(), value);
    }
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let filter = match dict.get(b"Filter").ok().and_then(|o| resolve(doc, o)) {
        Some(f) => f,
        None => return Vec::new(),
    };

    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| resolve(doc, item))
            .filter_map(|item| item.as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

fn describe_filters(filters: &[Vec<u8>]) -> String {
    filters
        .iter()
        .map(|f| format!("/{}", String::from_utf8_lossy(f)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn decompress_stream(stream: &Stream) -> Result<Vec<u8>, UnsupportedImage> {
    match stream.decompressed_content() {
        Ok(c) => Ok(c),
        Err(e) => {
            if let Ok(b"FlateDecode") = stream.dict.get(b"Filter").and_then(Object::as_name) {
                let mut decoder = ZlibDecoder::new(&stream.content[..]);
                let mut buffer = Vec::new();
                decoder
                    .read_to_end(&mut buffer)
                    .map_err(|e| UnsupportedImage::Stream(format!("manual zlib failed: {e}")))?;
                Ok(buffer)
            } else {
                Err(UnsupportedImage::Stream(format!("{e:?}")))
            }
        }
    }
}

fn sample_color(doc: &Document, dict: &Dictionary) -> Result<SampleColor, UnsupportedImage> {
    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| resolve(doc, o))
        .ok_or_else(|| UnsupportedImage::ColorSpace("missing".to_string()))?;

    let from_components = |n: i64| match n {
        1 => Ok(SampleColor::Gray),
        3 => Ok(SampleColor::Rgb),
        4 => Ok(SampleColor::Cmyk),
        other => Err(UnsupportedImage::ColorSpace(format!("ICCBased with N={other}"))),
    };

    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(SampleColor::Gray),
            b"DeviceRGB" | b"CalRGB" => Ok(SampleColor::Rgb),
            b"DeviceCMYK" => Ok(SampleColor::Cmyk),
            other => Err(UnsupportedImage::ColorSpace(
                String::from_utf8_lossy(other).into_owned(),
            )),
        },
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .unwrap_or_default();
            match family {
                b"CalGray" => Ok(SampleColor::Gray),
                b"CalRGB" => Ok(SampleColor::Rgb),
                b"ICCBased" => {
                    let components = match items.get(1).and_then(|o| resolve(doc, o)) {
                        Some(Object::Stream(profile)) => resolve_i64(doc, &profile.dict, b"N"),
                        _ => None,
                    };
                    match components {
                        Some(n) => from_components(n),
                        None => Err(UnsupportedImage::ColorSpace(
                            "ICCBased without /N".to_string(),
                        )),
                    }
                }
                other => Err(UnsupportedImage::ColorSpace(
                    String::from_utf8_lossy(other).into_owned(),
                )),
            }
        }
        other => Err(UnsupportedImage::ColorSpace(format!("{other:?}"))),
    }
}

/// How an image's `/Decode` array maps samples to colour values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeMapping {
    Identity,
    Inverted,
}

fn decode_mapping(
    doc: &Document,
    dict: &Dictionary,
    components: Option<usize>,
) -> Result<DecodeMapping, UnsupportedImage> {
    let items = match dict.get(b"Decode").ok().and_then(|o| resolve(doc, o)) {
        None => return Ok(DecodeMapping::Identity),
        Some(Object::Array(items)) => items,
        Some(other) => return Err(UnsupportedImage::DecodeArray(format!("{other:?}"))),
    };

    let values: Option<Vec<f32>> = items
        .iter()
        .map(|item| match resolve(doc, item)? {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r as f32),
            _ => None,
        })
        .collect();
    let describe = || UnsupportedImage::DecodeArray(format!("{items:?}"));
    let values = values.ok_or_else(describe)?;

    let expected_len = components.map(|n| n * 2);
    if values.is_empty()
        || values.len() % 2 != 0
        || expected_len.is_some_and(|n| n != values.len())
    {
        return Err(describe());
    }

    let all_pairs = |lo: f32, hi: f32| {
        values.chunks_exact(2).all(|pair| {
            (pair[0] - lo).abs() < f32::EPSILON && (pair[1] - hi).abs() < f32::EPSILON
        })
    };

    if all_pairs(0.0, 1.0) {
        Ok(DecodeMapping::Identity)
    } else if all_pairs(1.0, 0.0) {
        Ok(DecodeMapping::Inverted)
    } else {
        Err(describe())
    }
}

/// Pull an image XObject's data out in a form the recompressor understands.
pub fn extract(doc: &Document, object_id: ObjectId) -> Result<ImageResource, UnsupportedImage> {
    let stream = match doc.get_object(object_id) {
        Ok(Object::Stream(s)) => s,
        _ => return Err(UnsupportedImage::NotAnImage),
    };

    let filters = filter_names(doc, &stream.dict);

    if let Some(last) = filters.last() {
        if ENCODED_FILTERS.contains(&last.as_slice()) {
            if filters.len() != 1 {
                return Err(UnsupportedImage::Filter(describe_filters(&filters)));
            }
            // The decoder's own colour handling cannot be reconciled with a remap.
            if decode_mapping(doc, &stream.dict, None)? != DecodeMapping::Identity {
                return Err(UnsupportedImage::DecodeArray(
                    "non-identity /Decode on encoded image".to_string(),
                ));
            }
            return Ok(ImageResource {
                object_id,
                data: stream.content.clone(),
                format: ImageFormat::Encoded {
                    filter: String::from_utf8_lossy(last).into_owned(),
                },
            });
        }
    }

    if filters
        .iter()
        .any(|f| !SAMPLE_FILTERS.contains(&f.as_slice()))
    {
        return Err(UnsupportedImage::Filter(describe_filters(&filters)));
    }

    let bits = resolve_i64(doc, &stream.dict, b"BitsPerComponent").unwrap_or(0);
    if bits != 8 {
        return Err(UnsupportedImage::BitDepth(bits));
    }

    let dimension = |key: &[u8]| {
        resolve_i64(doc, &stream.dict, key)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    };
    let (width, height) = match (dimension(b"Width"), dimension(b"Height")) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(UnsupportedImage::NotAnImage),
    };

    let color = sample_color(doc, &stream.dict)?;
    let mapping = decode_mapping(doc, &stream.dict, Some(color.components()))?;

    let mut data = if filters.is_empty() {
        stream.content.clone()
    } else {
        let mut working = stream.clone();
        inline_references(doc, &mut working.dict, b"Filter");
        inline_references(doc, &mut working.dict, b"DecodeParms");
        decompress_stream(&working)?
    };

    if mapping == DecodeMapping::Inverted {
        data.iter_mut().for_each(|v| *v = 255 - *v);
    }

    Ok(ImageResource {
        object_id,
        data,
        format: ImageFormat::RawSamples {
            width,
            height,
            color,
        },
    })
}
