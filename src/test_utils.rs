use crate::buffer::ImageBuffer;
use crate::normalize::normalize;

use std::io::Cursor;

use ndarray::{Array, IxDyn};
use tiff::encoder::{colortype, Compression, TiffEncoder, TiffValue};
use tiff::tags::Tag;

/// Create a (2, 1, 3, 4, 4) rank 5 buffer with deterministic, non-degenerate content.
pub(crate) fn hyperstack_u16() -> ImageBuffer<u16> {
    let data = (0..96_u16).map(|i| (i * i * 7 + i * 13) % 97).collect();
    let raw = Array::from_shape_vec(IxDyn(&[2, 1, 3, 4, 4]), data).unwrap();
    normalize(raw).unwrap()
}

/// Encode pages as an uncompressed grayscale TIFF file in memory.
///
/// The description, if any, is written to the first page.
pub(crate) fn tiff_bytes<C>(
    width: u32,
    height: u32,
    pages: &[Vec<C::Inner>],
    description: Option<&str>,
) -> Vec<u8>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    compressed_tiff_bytes::<C>(width, height, pages, description, Compression::Uncompressed)
}

/// Encode pages as a grayscale TIFF file in memory, compressing every page.
pub(crate) fn compressed_tiff_bytes<C>(
    width: u32,
    height: u32,
    pages: &[Vec<C::Inner>],
    description: Option<&str>,
    compression: Compression,
) -> Vec<u8>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)
            .unwrap()
            .with_compression(compression);
        for (index, page) in pages.iter().enumerate() {
            let mut image = encoder.new_image::<C>(width, height).unwrap();
            if let (0, Some(description)) = (index, description) {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description)
                    .unwrap();
            }
            image.write_data(page).unwrap();
        }
    }
    cursor.into_inner()
}

/// Encode a rank 5 buffer as an ImageJ hyperstack TIFF file.
pub(crate) fn hyperstack_tiff(buffer: &ImageBuffer<u16>) -> Vec<u8> {
    let data = buffer.view();
    let mut pages = vec![];
    // ImageJ page order: channels fastest, then slices, then frames.
    for t in 0..buffer.t() {
        for z in 0..buffer.z() {
            for c in 0..buffer.channels() {
                let page = data.slice(ndarray::s![z, t, c, .., ..]);
                pages.push(page.iter().copied().collect());
            }
        }
    }
    let description = format!(
        "ImageJ=1.54f\nimages={}\nchannels={}\nslices={}\nframes={}\nhyperstack=true\n",
        pages.len(),
        buffer.channels(),
        buffer.z(),
        buffer.t()
    );
    tiff_bytes::<colortype::Gray16>(
        buffer.width() as u32,
        buffer.height() as u32,
        &pages,
        Some(&description),
    )
}
