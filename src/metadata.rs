//! Camera metadata extraction.
//!
//! Raw EXIF fields are first lifted into [`ExifTags`], a small map keyed by
//! the tags we understand, and then normalized into a flat, display-ready
//! [`ImageMetadata`] mapping. Only non-empty values end up in the mapping.

use exif::{In, Reader, Tag, Value};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};
use std::collections::HashMap;
use std::io::Cursor;

/// Largest denominator used when rendering sub-second exposure times
const MAX_SHUTTER_DENOMINATOR: u128 = 8000;

/// EXIF tags the extractor knows how to interpret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExifTag {
    IsoSpeedRatings,
    IsoSpeed,
    ExposureTime,
    FNumber,
    FocalLength,
    Model,
    Make,
    LensModel,
    DateTimeOriginal,
    Software,
    Artist,
}

impl ExifTag {
    const ALL: [(Tag, ExifTag); 11] = [
        (Tag::PhotographicSensitivity, ExifTag::IsoSpeedRatings),
        (Tag::ISOSpeed, ExifTag::IsoSpeed),
        (Tag::ExposureTime, ExifTag::ExposureTime),
        (Tag::FNumber, ExifTag::FNumber),
        (Tag::FocalLength, ExifTag::FocalLength),
        (Tag::Model, ExifTag::Model),
        (Tag::Make, ExifTag::Make),
        (Tag::LensModel, ExifTag::LensModel),
        (Tag::DateTimeOriginal, ExifTag::DateTimeOriginal),
        (Tag::Software, ExifTag::Software),
        (Tag::Artist, ExifTag::Artist),
    ];

    fn from_exif(tag: Tag) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, ours)| *ours)
    }
}

/// A single raw tag value
#[derive(Debug, Clone, PartialEq)]
pub enum ExifValue {
    Rational { num: i64, den: i64 },
    Pair(f64, f64),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ExifValue {
    /// Numeric reading of the value, `None` when it has none
    pub fn to_float(&self) -> Option<f64> {
        match *self {
            ExifValue::Rational { num, den } if den != 0 => Some(num as f64 / den as f64),
            ExifValue::Pair(a, b) if b != 0.0 => Some(a / b),
            ExifValue::Integer(v) => Some(v as f64),
            ExifValue::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar JSON form of the value, used for untransformed pass-through
    fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            ExifValue::Integer(v) => Some((*v).into()),
            ExifValue::Text(s) if s.is_empty() => None,
            ExifValue::Text(s) => Some(s.clone().into()),
            other => other
                .to_float()
                .and_then(Number::from_f64)
                .map(serde_json::Value::Number),
        }
    }

    fn from_exif(value: &Value) -> Option<Self> {
        match value {
            Value::Ascii(strings) => {
                let text = strings
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes))
                    .map(|s| s.trim_end_matches('\0').trim().to_string())
                    .find(|s| !s.is_empty())?;
                Some(ExifValue::Text(text))
            }
            Value::Byte(v) => v.first().map(|&x| ExifValue::Integer(x.into())),
            Value::Short(v) => v.first().map(|&x| ExifValue::Integer(x.into())),
            Value::Long(v) => v.first().map(|&x| ExifValue::Integer(x.into())),
            Value::SShort(v) => v.first().map(|&x| ExifValue::Integer(x.into())),
            Value::SLong(v) => v.first().map(|&x| ExifValue::Integer(x.into())),
            Value::Rational(v) => v.first().map(|r| ExifValue::Rational {
                num: r.num.into(),
                den: r.denom.into(),
            }),
            Value::SRational(v) => v.first().map(|r| ExifValue::Rational {
                num: r.num.into(),
                den: r.denom.into(),
            }),
            Value::Float(v) => v.first().map(|&x| ExifValue::Float(x.into())),
            Value::Double(v) => v.first().map(|&x| ExifValue::Float(x)),
            _ => None,
        }
    }
}

/// Raw values of the recognized tags found in one image
#[derive(Debug, Clone, Default)]
pub struct ExifTags {
    values: HashMap<ExifTag, ExifValue>,
}

impl ExifTags {
    /// Read tags from an encoded image container (JPEG, TIFF, PNG, WebP).
    ///
    /// Never fails: a missing or broken metadata block yields whatever could
    /// be recovered, possibly nothing.
    pub fn read_from_bytes(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let exif = match Reader::new()
            .continue_on_error(true)
            .read_from_container(&mut cursor)
        {
            Ok(exif) => exif,
            Err(exif::Error::PartialResult(partial)) => {
                let (exif, errors) = partial.into_inner();
                log::debug!("Recovered partial EXIF data, {} field(s) skipped", errors.len());
                exif
            }
            Err(e) => {
                log::debug!("No EXIF data: {e}");
                return Self::default();
            }
        };

        let mut tags = Self::default();
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            let Some(tag) = ExifTag::from_exif(field.tag) else {
                continue;
            };
            if let Some(value) = ExifValue::from_exif(&field.value) {
                tags.values.entry(tag).or_insert(value);
            }
        }
        tags
    }

    pub fn insert(&mut self, tag: ExifTag, value: ExifValue) {
        self.values.insert(tag, value);
    }

    pub fn get(&self, tag: ExifTag) -> Option<&ExifValue> {
        self.values.get(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Flat, display-ready metadata for one image.
///
/// Keys keep insertion order when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageMetadata(Map<String, serde_json::Value>);

impl ImageMetadata {
    /// Insert a value, skipping absent values and empty strings
    pub fn insert(&mut self, key: &str, value: Option<serde_json::Value>) {
        match value {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(s)) if s.is_empty() => {}
            Some(value) => {
                self.0.insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extracts camera metadata from source images.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract metadata for a decoded image whose encoded bytes are `bytes`.
    ///
    /// Dimensions always come from the decoded pixels, never from the tags.
    pub fn extract(bytes: &[u8], image: &DynamicImage) -> ImageMetadata {
        let tags = ExifTags::read_from_bytes(bytes);
        let (width, height) = image.dimensions();
        Self::from_tags(&tags, width, height)
    }

    /// Normalize already-read tags
    pub fn from_tags(tags: &ExifTags, width: u32, height: u32) -> ImageMetadata {
        let text = |tag| tags.get(tag).and_then(ExifValue::to_json);

        let iso = tags
            .get(ExifTag::IsoSpeedRatings)
            .or_else(|| tags.get(ExifTag::IsoSpeed))
            .and_then(ExifValue::to_json);

        let mut metadata = ImageMetadata::default();
        metadata.insert("iso", iso);
        metadata.insert(
            "shutter_speed",
            tags.get(ExifTag::ExposureTime)
                .and_then(format_shutter_speed)
                .map(Into::into),
        );
        metadata.insert(
            "aperture",
            tags.get(ExifTag::FNumber).and_then(format_aperture).map(Into::into),
        );
        metadata.insert("camera_model", text(ExifTag::Model));
        metadata.insert("camera_make", text(ExifTag::Make));
        metadata.insert("lens", text(ExifTag::LensModel));
        metadata.insert(
            "focal_length",
            tags.get(ExifTag::FocalLength)
                .and_then(format_focal_length)
                .map(Into::into),
        );
        metadata.insert("datetime_original", text(ExifTag::DateTimeOriginal));
        metadata.insert("software", text(ExifTag::Software));
        metadata.insert("artist", text(ExifTag::Artist));
        metadata.insert("image_width", Some(width.into()));
        metadata.insert("image_height", Some(height.into()));
        metadata
    }
}

/// "1/250" below one second, "2.5" or "2" otherwise
pub fn format_shutter_speed(value: &ExifValue) -> Option<String> {
    let seconds = value.to_float().filter(|v| *v > 0.0)?;
    if seconds < 1.0 {
        return Some(match approximate_fraction(seconds, MAX_SHUTTER_DENOMINATOR) {
            Some((num, den)) => format!("{num}/{den}"),
            None => format!("{seconds:.6}"),
        });
    }
    let fixed = format!("{seconds:.4}");
    Some(fixed.trim_end_matches('0').trim_end_matches('.').to_string())
}

/// "f/2.8"
pub fn format_aperture(value: &ExifValue) -> Option<String> {
    value
        .to_float()
        .filter(|v| *v > 0.0)
        .map(|v| format!("f/{v:.1}"))
}

/// "50mm"
pub fn format_focal_length(value: &ExifValue) -> Option<String> {
    value
        .to_float()
        .filter(|v| *v > 0.0)
        .map(|v| format!("{v:.0}mm"))
}

/// Closest fraction to `value` with a denominator of at most `max_den`.
///
/// Works on the exact binary value of the float, using continued fractions.
/// Values too small for a 128-bit denominator round to `0/1`; `None` for
/// negative, non-finite or too-large values.
pub fn approximate_fraction(value: f64, max_den: u128) -> Option<(u128, u128)> {
    if !value.is_finite() || value < 0.0 || max_den == 0 {
        return None;
    }
    let Some((num, den)) = exact_fraction(value) else {
        return (value * max_den as f64 <= 0.5).then_some((0, 1));
    };
    if den <= max_den {
        return Some((num, den));
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0u128, 1u128, 1u128, 0u128);
    let (mut n, mut d) = (num, den);
    loop {
        let a = n / d;
        let q2 = match a.checked_mul(q1).and_then(|v| v.checked_add(q0)) {
            Some(q2) if q2 <= max_den => q2,
            _ => break,
        };
        let p2 = p0.checked_add(a.checked_mul(p1)?)?;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        (n, d) = (d, n - a * d);
        if d == 0 {
            break;
        }
    }

    if q1 == 0 {
        return None;
    }
    let k = (max_den - q0) / q1;
    let bound_den = q0 + k * q1;
    let bound_num = p0 + k * p1;
    // The convergent p1/q1 is closer unless the semiconvergent beats it.
    let prefer_convergent = d == 0
        || 2u128
            .checked_mul(d)
            .and_then(|v| v.checked_mul(bound_den))
            .is_some_and(|lhs| lhs <= den);
    if prefer_convergent {
        Some((p1, q1))
    } else {
        Some((bound_num, bound_den))
    }
}

/// Exact `num/den` of a non-negative finite float, reduced by powers of two
fn exact_fraction(value: f64) -> Option<(u128, u128)> {
    if value == 0.0 {
        return Some((0, 1));
    }
    let bits = value.to_bits();
    let exponent_bits = ((bits >> 52) & 0x7ff) as i32;
    let fraction_bits = bits & ((1u64 << 52) - 1);
    let (mut mantissa, mut exponent) = if exponent_bits == 0 {
        (fraction_bits, -1074)
    } else {
        (fraction_bits | (1u64 << 52), exponent_bits - 1075)
    };
    while mantissa & 1 == 0 && exponent < 0 {
        mantissa >>= 1;
        exponent += 1;
    }
    if exponent >= 0 {
        let num = u128::from(mantissa).checked_shl(exponent as u32)?;
        return (num >> exponent == u128::from(mantissa)).then_some((num, 1));
    }
    let shift = (-exponent) as u32;
    if shift >= 127 {
        return None;
    }
    Some((u128::from(mantissa), 1u128 << shift))
}
