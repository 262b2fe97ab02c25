//! Single-axis resizing of raster and SVG images.
//!
//! Raster images are decoded with `image`, auto-oriented from their EXIF
//! orientation, resized with Lanczos3 and re-encoded in the source format.
//! SVG documents are rasterised with `resvg` straight at the target size and
//! always come out as PNG. Text in SVGs is shaped with the system fonts.
//!
//! Output dimensions are checked before any pixel buffer is allocated: a
//! thin source pinned to a large size would otherwise blow up on its free axis.

use crate::models::key::{Axis, MAX_VARIANT_SIZE};
use bytes::Bytes;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, imageops::FilterType};
use resvg::{tiny_skia, usvg};
use std::{fmt, io::Cursor, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Largest output, in pixels: a square variant at the maximum size.
pub const MAX_OUTPUT_PIXELS: u64 = MAX_VARIANT_SIZE as u64 * MAX_VARIANT_SIZE as u64;

/// Largest output edge on either axis.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_383;

/// Installed families tried, in order, for the SVG generic `sans-serif` family.
const SANS_SERIF_CANDIDATES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
];
const SERIF_CANDIDATES: &[&str] = &[
    "DejaVu Serif",
    "Liberation Serif",
    "Noto Serif",
    "Times New Roman",
    "Times",
];
const MONOSPACE_CANDIDATES: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Courier New",
    "Courier",
];

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("could not detect image format")]
    UnknownFormat,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid svg document: {0}")]
    Svg(#[from] usvg::Error),
    #[error("cannot render svg at {width}x{height}")]
    Render { width: u32, height: u32 },
    #[error("output of {width}x{height} exceeds the size limit")]
    TooLarge { width: u32, height: u32 },
    #[error("png encoding failed: {0}")]
    PngEncode(String),
    #[error("transform task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a source object can be resized, decided from its content type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Svg,
    Raster,
}

impl SourceKind {
    /// `None` for anything that is not an `image/*` type.
    pub fn classify(content_type: Option<&str>) -> Option<Self> {
        let content_type = content_type?.to_ascii_lowercase();
        if content_type == SVG_CONTENT_TYPE {
            Some(SourceKind::Svg)
        } else if content_type.starts_with("image/") {
            Some(SourceKind::Raster)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeSpec {
    pub axis: Axis,
    pub size: u32,
}

#[derive(Clone, Debug)]
pub struct TransformedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Resizes images; cheap to clone, the SVG font database is shared.
#[derive(Clone)]
pub struct ImageTransformer {
    svg_options: Arc<usvg::Options<'static>>,
}

impl fmt::Debug for ImageTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageTransformer")
            .field("font_faces", &self.svg_options.fontdb.len())
            .finish()
    }
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransformer {
    /// Loads the system fonts once; build one transformer per worker.
    pub fn new() -> Self {
        let mut options = usvg::Options::default();
        let fontdb = options.fontdb_mut();
        fontdb.load_system_fonts();

        let sans_serif = installed_family(fontdb, SANS_SERIF_CANDIDATES);
        if let Some(family) = &sans_serif {
            fontdb.set_sans_serif_family(family.clone());
        }
        if let Some(family) = installed_family(fontdb, SERIF_CANDIDATES) {
            fontdb.set_serif_family(family);
        }
        if let Some(family) = installed_family(fontdb, MONOSPACE_CANDIDATES) {
            fontdb.set_monospace_family(family);
        }
        // text without a font-family falls back to this
        if let Some(family) = sans_serif {
            options.font_family = family;
        }
        debug!(faces = options.fontdb.len(), "loaded fonts for svg rendering");

        Self {
            svg_options: Arc::new(options),
        }
    }

    /// Resize on the blocking pool so the worker's event loop keeps serving.
    ///
    /// `content_type` is the source's declared type; raster output keeps it,
    /// SVG output is `image/png`.
    pub async fn transform(
        &self,
        source: Bytes,
        kind: SourceKind,
        content_type: &str,
        spec: ResizeSpec,
    ) -> Result<TransformedImage, TransformError> {
        let content_type = content_type.to_string();
        let svg_options = self.svg_options.clone();
        tokio::task::spawn_blocking(move || -> Result<TransformedImage, TransformError> {
            match kind {
                SourceKind::Svg => Ok(TransformedImage {
                    bytes: render_svg(&source, &svg_options, spec)?,
                    content_type: PNG_CONTENT_TYPE.to_string(),
                }),
                SourceKind::Raster => Ok(TransformedImage {
                    bytes: resize_raster(&source, spec)?,
                    content_type,
                }),
            }
        })
        .await?
    }
}

/// Target dimensions when one axis is pinned to `spec.size`.
///
/// The other axis scales proportionally, rounded, never below one pixel.
/// Saturates at `u32::MAX`; run the result through [`check_output`].
pub fn scaled_dimensions(width: f64, height: f64, spec: ResizeSpec) -> (u32, u32) {
    let target = f64::from(spec.size);
    let scale = |other: f64, pinned: f64| -> u32 {
        if pinned <= 0.0 {
            return 1;
        }
        ((other * target / pinned).round() as u32).max(1)
    };
    match spec.axis {
        Axis::Width => (spec.size, scale(height, width)),
        Axis::Height => (scale(width, height), spec.size),
    }
}

/// Reject outputs too large to allocate safely.
pub fn check_output(width: u32, height: u32) -> Result<(), TransformError> {
    let pixels = u64::from(width) * u64::from(height);
    if width > MAX_OUTPUT_DIMENSION || height > MAX_OUTPUT_DIMENSION || pixels > MAX_OUTPUT_PIXELS {
        return Err(TransformError::TooLarge { width, height });
    }
    Ok(())
}

/// First candidate the database has a face for, else any installed family.
fn installed_family(fontdb: &usvg::fontdb::Database, candidates: &[&str]) -> Option<String> {
    let has_family = |name: &str| {
        fontdb
            .faces()
            .any(|face| face.families.iter().any(|(family, _)| family == name))
    };
    candidates
        .iter()
        .find(|name| has_family(name))
        .map(|name| name.to_string())
        .or_else(|| {
            fontdb
                .faces()
                .find_map(|face| face.families.first().map(|(family, _)| family.clone()))
        })
}

fn resize_raster(source: &[u8], spec: ResizeSpec) -> Result<Bytes, TransformError> {
    let reader = ImageReader::new(Cursor::new(source)).with_guessed_format()?;
    let format = reader.format().ok_or(TransformError::UnknownFormat)?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    let (width, height) = scaled_dimensions(
        f64::from(image.width()),
        f64::from(image.height()),
        spec,
    );
    check_output(width, height)?;
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);

    encode(resized, format)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Result<Bytes, TransformError> {
    // JPEG has no alpha channel.
    let image = match format {
        ImageFormat::Jpeg if image.color().has_alpha() => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format)?;
    Ok(Bytes::from(buffer.into_inner()))
}

fn render_svg(
    source: &[u8],
    options: &usvg::Options<'_>,
    spec: ResizeSpec,
) -> Result<Bytes, TransformError> {
    let tree = usvg::Tree::from_data(source, options)?;
    let size = tree.size();
    let (width, height) = scaled_dimensions(f64::from(size.width()), f64::from(size.height()), spec);
    check_output(width, height)?;

    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(TransformError::Render { width, height })?;
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map(Bytes::from)
        .map_err(|err| TransformError::PngEncode(err.to_string()))
}
