//! Screenshots of a single stream

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma, Rgb, Rgba};

use crate::pixel_format::{read_normalized, PixelFormat};
use crate::stream::ImageRef;
use crate::video::VideoError;

/// `name` if nothing exists there yet, otherwise the first free `stem_N.ext`
pub fn make_unique_filename(name: impl AsRef<Path>) -> PathBuf {
    let path = name.as_ref();
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("capture");
    let ext = path.extension().and_then(|s| s.to_str());
    (1..)
        .map(|n| {
            let file = match ext {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            path.with_file_name(file)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Save one stream image; the file format follows the extension
pub fn save_image(image: ImageRef<'_>, path: &Path) -> Result<(), VideoError> {
    if !image.is_complete() {
        return Err(VideoError::SizeMismatch {
            expected: image.pitch * image.height as usize,
            actual: image.data.len(),
        });
    }
    let (w, h) = (image.width, image.height);
    let layout_err = || VideoError::open(path.display().to_string(), "image layout does not fit its buffer");

    match image.format {
        PixelFormat::GRAY8 => {
            let buf = ImageBuffer::<Luma<u8>, _>::from_raw(w, h, packed_rows(image))
                .ok_or_else(layout_err)?;
            buf.save(path)?;
        }
        PixelFormat::GRAY16LE | PixelFormat::GRAY32F => {
            let samples: Vec<u16> = (0..h)
                .flat_map(|y| {
                    let row = image.row(y);
                    let bpp = image.format.bytes_per_pixel();
                    row.chunks_exact(bpp)
                        .map(|px| (read_normalized(image.format, px, 0).clamp(0.0, 1.0) * 65535.0).round() as u16)
                        .collect::<Vec<_>>()
                })
                .collect();
            let buf = ImageBuffer::<Luma<u16>, _>::from_raw(w, h, samples).ok_or_else(layout_err)?;
            buf.save(path)?;
        }
        PixelFormat::RGB24 | PixelFormat::BGR24 => {
            let mut data = packed_rows(image);
            if image.format.is_bgr() {
                data.chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
            }
            let buf = ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).ok_or_else(layout_err)?;
            buf.save(path)?;
        }
        PixelFormat::RGBA32 | PixelFormat::BGRA32 => {
            let mut data = packed_rows(image);
            if image.format.is_bgr() {
                data.chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
            }
            let buf = ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data).ok_or_else(layout_err)?;
            buf.save(path)?;
        }
    }

    tracing::info!("Saved screenshot {}", path.display());
    Ok(())
}

/// Rows without pitch padding
fn packed_rows(image: ImageRef<'_>) -> Vec<u8> {
    let row_len = image.width as usize * image.format.bytes_per_pixel();
    let mut out = Vec::with_capacity(row_len * image.height as usize);
    for y in 0..image.height {
        out.extend_from_slice(image.row(y));
    }
    out
}
