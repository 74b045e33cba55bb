#![allow(dead_code)]

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use lopdf::encryption::{decrypt_object, get_encryption_key};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Deterministic noisy picture; noise keeps JPEG sizes sensitive to quality.
pub fn noisy_image(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed | 1;
    RgbImage::from_fn(width, height, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state & 0x7f) as u8;
        Rgb([
            (x as u8).wrapping_add(noise),
            (y as u8).wrapping_sub(noise / 2),
            ((x + y) as u8).wrapping_add(noise / 3),
        ])
    })
}

pub fn jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(img)
        .expect("Failed to encode test JPEG");
    out
}

pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.doc.add_object(object)
    }

    pub fn add_jpeg(&mut self, img: &RgbImage, quality: u8) -> ObjectId {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => img.width() as i64,
            "Height" => img.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        };
        self.doc.add_object(Stream::new(dict, jpeg(img, quality)))
    }

    pub fn add_image(&mut self, dict: Dictionary, content: Vec<u8>) -> ObjectId {
        let mut full = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
        };
        for (k, v) in dict.iter() {
            full.set(k.clone(), v.clone());
        }
        self.doc.add_object(Stream::new(full, content))
    }

    /// Add a page drawing each named XObject; returns (page id, content stream id).
    pub fn add_page(&mut self, xobjects: &[(&str, ObjectId)]) -> (ObjectId, ObjectId) {
        let mut ops = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET\n", self.kids.len() + 1);
        let mut xobject_dict = Dictionary::new();
        for (name, id) in xobjects {
            ops.push_str(&format!("q 200 0 0 200 72 400 cm /{} Do Q\n", name));
            xobject_dict.set(name.as_bytes().to_vec(), *id);
        }
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => xobject_dict,
            },
        });
        self.kids.push(page_id.into());
        (page_id, content_id)
    }

    /// RC4 (V1/R2) encrypt every stream added so far under the empty user
    /// password. Must be called after the last stream is added.
    pub fn encrypt_with_empty_password(&mut self) {
        // Without /U the key is derived but never checked.
        let encrypt_id = self.set_encrypt(Dictionary::new());
        let key = get_encryption_key(&self.doc, b"", false).expect("Failed to derive test key");
        for (&id, object) in self.doc.objects.iter_mut() {
            if id == encrypt_id || !matches!(object, Object::Stream(_)) {
                continue;
            }
            // RC4 is symmetric: decrypting plain text encrypts it.
            let cipher = decrypt_object(&key, id, &*object).expect("Failed to encrypt test stream");
            if let Object::Stream(stream) = object {
                stream.set_content(cipher);
            }
        }
    }

    /// Mark the document as encrypted for a user password that is not empty.
    pub fn encrypt_with_unknown_password(&mut self) {
        self.set_encrypt(dictionary! {
            "U" => hex_string(vec![0x5a; 32]),
        });
    }

    fn set_encrypt(&mut self, extra: Dictionary) -> ObjectId {
        let mut encrypt = dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => hex_string(vec![0x3c; 32]),
            "P" => -4,
        };
        for (k, v) in extra.iter() {
            encrypt.set(k.clone(), v.clone());
        }
        let encrypt_id = self.doc.add_object(encrypt);
        self.doc.trailer.set("Encrypt", encrypt_id);
        let file_id = hex_string(b"pdf-reducer-test".to_vec());
        self.doc
            .trailer
            .set("ID", vec![file_id.clone(), file_id]);
        encrypt_id
    }

    pub fn build(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).expect("Failed to save test PDF");
        buf
    }
}

fn hex_string(bytes: Vec<u8>) -> Object {
    Object::String(bytes, StringFormat::Hexadecimal)
}

pub fn stream_of(doc: &Document, id: ObjectId) -> &Stream {
    match doc.get_object(id) {
        Ok(Object::Stream(s)) => s,
        other => panic!("object {:?} is not a stream: {:?}", id, other),
    }
}

pub fn filter_of(stream: &Stream) -> Option<Vec<u8>> {
    stream
        .dict
        .get(b"Filter")
        .and_then(Object::as_name)
        .ok()
        .map(<[u8]>::to_vec)
}
