//! Object keys and the variant naming convention.
//!
//! A request path is always tried verbatim as an [`ObjectKey`] first. Only when
//! that lookup misses is it reinterpreted as a [`VariantDescriptor`]: the last
//! two segments name the resize axis and the target size, the rest is the key
//! of the original object. The derived variant lives in the store at
//! `{base_key}/{axis}/{size}`, which is the only layout contract shared with
//! variants generated earlier.

use std::fmt;
use thiserror::Error;

/// Smallest accepted target size, inclusive.
pub const MIN_VARIANT_SIZE: u32 = 1;

/// Largest accepted target size, inclusive.
pub const MAX_VARIANT_SIZE: u32 = 7680;

/// Non-empty, slash-delimited store key. Used verbatim for lookups.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Returns `None` for an empty path.
    pub fn parse(path: &str) -> Option<Self> {
        if path.is_empty() {
            None
        } else {
            Some(Self(path.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single dimension a resize targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Width,
    Height,
}

impl Axis {
    /// Case-insensitive match on `width` / `height`.
    pub fn parse(segment: &str) -> Option<Self> {
        if segment.eq_ignore_ascii_case("width") {
            Some(Axis::Width)
        } else if segment.eq_ignore_ascii_case("height") {
            Some(Axis::Height)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Width => "width",
            Axis::Height => "height",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariantError {
    #[error("path `{0}` has no axis/size suffix")]
    TooFewSegments(String),
    #[error("`{0}` is not a resize axis")]
    UnknownAxis(String),
    #[error("size `{0}` must be an integer between 1 and 7680")]
    InvalidSize(String),
    #[error("variant path `{0}` has an empty original key")]
    EmptyBaseKey(String),
}

impl VariantError {
    /// Errors that mean "no resizing route here" rather than a malformed request.
    pub fn is_route_miss(&self) -> bool {
        !matches!(self, VariantError::InvalidSize(_))
    }
}

/// `{base_key, axis, size}` decoded from a key that missed the direct lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantDescriptor {
    base_key: ObjectKey,
    axis: Axis,
    size: u32,
}

impl VariantDescriptor {
    pub fn new(base_key: ObjectKey, axis: Axis, size: u32) -> Result<Self, VariantError> {
        if !(MIN_VARIANT_SIZE..=MAX_VARIANT_SIZE).contains(&size) {
            return Err(VariantError::InvalidSize(size.to_string()));
        }
        Ok(Self {
            base_key,
            axis,
            size,
        })
    }

    /// Reinterpret a key as `{base}/{axis}/{size}`.
    ///
    /// The axis is checked before the size, so `a.jpg/depth/abc` is a route
    /// miss and not a size error.
    pub fn from_key(key: &ObjectKey) -> Result<Self, VariantError> {
        let raw = key.as_str();
        let mut segments = raw.rsplitn(3, '/');
        let size_segment = segments.next().unwrap_or_default();
        let (Some(axis_segment), Some(base)) = (segments.next(), segments.next()) else {
            return Err(VariantError::TooFewSegments(raw.to_string()));
        };

        let axis = Axis::parse(axis_segment)
            .ok_or_else(|| VariantError::UnknownAxis(axis_segment.to_string()))?;
        let size = parse_size(size_segment)?;
        let base_key =
            ObjectKey::parse(base).ok_or_else(|| VariantError::EmptyBaseKey(raw.to_string()))?;

        Self::new(base_key, axis, size)
    }

    pub fn base_key(&self) -> &ObjectKey {
        &self.base_key
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Key the generated variant is written back to.
    pub fn store_key(&self) -> ObjectKey {
        ObjectKey(format!("{}/{}/{}", self.base_key, self.axis, self.size))
    }
}

/// Digits only: `200px`, `12.5` and `+10` are rejected rather than truncated.
fn parse_size(segment: &str) -> Result<u32, VariantError> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VariantError::InvalidSize(segment.to_string()));
    }
    match segment.parse::<u32>() {
        Ok(size) if (MIN_VARIANT_SIZE..=MAX_VARIANT_SIZE).contains(&size) => Ok(size),
        _ => Err(VariantError::InvalidSize(segment.to_string())),
    }
}
