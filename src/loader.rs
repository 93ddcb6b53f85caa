//! Decoding of TIFF containers into canonical image buffers.
//!
//! Every page of the file must be a single-sample grayscale image of the same size. Files
//! written by ImageJ carry a description of the hyperstack layout (`channels`, `slices` and
//! `frames`) in the first page; such files are arranged into (Z, T, C, H, W). Other files
//! decode to (H, W) for a single page or (pages, H, W).

use crate::buffer::AnyImageBuffer;
use crate::error::HyperstackError;
use crate::normalize::normalize;
use crate::operation::Element;

use std::io::Cursor;

use ndarray::{ArrayD, IxDyn};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{event, Level};

/// Magic numbers of little and big endian TIFF and BigTIFF files.
const TIFF_MAGIC: [&[u8; 4]; 4] = [b"II*\0", b"MM\0*", b"II+\0", b"MM\0+"];

/// Hyperstack dimensions from an ImageJ image description.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ImageJLayout {
    channels: usize,
    slices: usize,
    frames: usize,
}

impl ImageJLayout {
    /// Parse an ImageJ description. Missing dimensions default to 1.
    fn parse(description: &str) -> Option<Self> {
        if !description.starts_with("ImageJ=") {
            return None;
        }
        let mut layout = ImageJLayout {
            channels: 1,
            slices: 1,
            frames: 1,
        };
        for line in description.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().parse::<usize>();
            match (key.trim(), value) {
                ("channels", Ok(value)) => layout.channels = value,
                ("slices", Ok(value)) => layout.slices = value,
                ("frames", Ok(value)) => layout.frames = value,
                _ => (),
            }
        }
        Some(layout)
    }

    fn pages(&self) -> usize {
        self.channels
            .saturating_mul(self.slices)
            .saturating_mul(self.frames)
    }
}

/// Check that a byte stream looks like a TIFF file.
pub fn validate_tiff(bytes: &[u8]) -> Result<(), HyperstackError> {
    if bytes.is_empty() {
        return Err(HyperstackError::InvalidTiff {
            reason: "file is empty",
        });
    }
    if !TIFF_MAGIC.iter().any(|magic| bytes.starts_with(*magic)) {
        return Err(HyperstackError::InvalidTiff {
            reason: "missing TIFF header",
        });
    }
    Ok(())
}

/// Build an array from the decoded pages.
///
/// # Arguments
///
/// * `pages`: Sample data of each page
/// * `height`: Page height
/// * `width`: Page width
/// * `layout`: ImageJ hyperstack layout, if the pages are ordered as one
fn assemble<T: Element>(
    pages: Vec<Vec<T>>,
    height: usize,
    width: usize,
    layout: Option<ImageJLayout>,
) -> Result<ArrayD<T>, HyperstackError> {
    let count = pages.len();
    let pages = match layout {
        Some(layout) => imagej_order(pages, layout),
        None => pages,
    };
    let mut data = Vec::with_capacity(count * height * width);
    for page in pages {
        data.extend(page);
    }
    let array = match layout {
        Some(layout) => ArrayD::from_shape_vec(
            IxDyn(&[layout.slices, layout.frames, layout.channels, height, width]),
            data,
        )?,
        None if count == 1 => ArrayD::from_shape_vec(IxDyn(&[height, width]), data)?,
        None => ArrayD::from_shape_vec(IxDyn(&[count, height, width]), data)?,
    };
    Ok(array)
}

/// Reorder ImageJ pages into (Z, T, C) order without copying their samples.
///
/// ImageJ stores pages with channels varying fastest, then slices, then frames. The number of
/// pages must match the layout.
fn imagej_order<T>(pages: Vec<Vec<T>>, layout: ImageJLayout) -> Vec<Vec<T>> {
    let mut pages: Vec<Option<Vec<T>>> = pages.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(pages.len());
    for slice in 0..layout.slices {
        for frame in 0..layout.frames {
            for channel in 0..layout.channels {
                let index = (frame * layout.slices + slice) * layout.channels + channel;
                ordered.extend(pages[index].take());
            }
        }
    }
    ordered
}

/// Collect pages of the same sample type and convert them into a canonical buffer.
macro_rules! decode_pages {
    ($pages:expr, $height:expr, $width:expr, $layout:expr, { $($variant:ident),+ $(,)? }) => {{
        let mut pages = $pages.into_iter();
        match pages.next() {
            $(
                Some(DecodingResult::$variant(first)) => {
                    let mut data = vec![first];
                    for page in pages {
                        match page {
                            DecodingResult::$variant(page) => data.push(page),
                            _ => {
                                return Err(HyperstackError::UnsupportedSampleFormat {
                                    format: "pages with mixed sample formats".to_string(),
                                })
                            }
                        }
                    }
                    AnyImageBuffer::from(normalize(assemble(data, $height, $width, $layout)?)?)
                }
            )+
            Some(_) => {
                return Err(HyperstackError::UnsupportedSampleFormat {
                    format: "16-bit float".to_string(),
                })
            }
            None => {
                return Err(HyperstackError::InvalidTiff {
                    reason: "file contains no images",
                })
            }
        }
    }};
}

/// Returns the decoder limits for a bound on the decoded size of a file.
fn decoding_limits(max_decoded_bytes: usize) -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = max_decoded_bytes;
    limits.intermediate_buffer_size = max_decoded_bytes;
    limits
}

/// Decode a TIFF file into a canonical image buffer.
///
/// The combined size of the decoded pages is bounded by `max_decoded_bytes`, which is checked
/// against the page headers before any page is decompressed.
///
/// # Arguments
///
/// * `bytes`: Contents of the TIFF file
/// * `max_decoded_bytes`: Maximum size in bytes of the decoded image
pub fn load_tiff(
    bytes: &[u8],
    max_decoded_bytes: usize,
) -> Result<AnyImageBuffer, HyperstackError> {
    validate_tiff(bytes)?;
    let mut decoder =
        Decoder::new(Cursor::new(bytes))?.with_limits(decoding_limits(max_decoded_bytes));
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();
    let (width, height) = decoder.dimensions()?;

    let mut pages = vec![];
    let mut decoded_bytes = 0_usize;
    loop {
        let bits = match decoder.colortype()? {
            ColorType::Gray(bits) => bits,
            colortype => {
                return Err(HyperstackError::UnsupportedSampleFormat {
                    format: format!("{:?}", colortype),
                })
            }
        };
        if decoder.dimensions()? != (width, height) {
            return Err(HyperstackError::InvalidTiff {
                reason: "pages have different dimensions",
            });
        }
        decoded_bytes = usize::try_from(width)?
            .checked_mul(usize::try_from(height)?)
            .and_then(|pixels| pixels.checked_mul(usize::from(bits).div_ceil(8)))
            .and_then(|page_bytes| decoded_bytes.checked_add(page_bytes))
            .filter(|total| *total <= max_decoded_bytes)
            .ok_or(HyperstackError::InvalidTiff {
                reason: "decoded image exceeds the size limit",
            })?;
        pages.push(decoder.read_image()?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let layout = description
        .as_deref()
        .and_then(ImageJLayout::parse)
        .filter(|layout| layout.pages() == pages.len());
    event!(
        Level::DEBUG,
        "Decoded {} TIFF pages of {}x{} (ImageJ layout: {:?})",
        pages.len(),
        width,
        height,
        layout
    );

    let height = usize::try_from(height)?;
    let width = usize::try_from(width)?;
    let buffer = decode_pages!(pages, height, width, layout, {
        U8, U16, U32, U64, I8, I16, I32, I64, F32, F64
    });
    Ok(buffer)
}
