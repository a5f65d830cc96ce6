//! Iterative downscaling of images that exceed an upload ceiling.
//!
//! Each pass scales both linear dimensions of the *original* image by a
//! further 5%, re-encoding in the source format, until the encoding fits or
//! the 80% floor is reached. Whatever the last pass produced is returned
//! even if it is still over the ceiling.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tracing::debug;

use crate::error::{Error, Result};

/// Linear reduction applied per pass, in percent of the original size.
pub const SHRINK_STEP_PERCENT: u32 = 5;

/// 4 passes of 5% puts the floor at 80% of the original dimensions.
pub const MAX_SHRINK_PASSES: u32 = 4;

#[derive(Debug)]
pub struct Shrunk {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Number of resize passes performed (0 if the input already fit).
    pub passes: u32,
    /// Whether `data` is within the ceiling.
    pub fits: bool,
}

/// Shrink `data` until it is at most `ceiling` bytes.
///
/// Animated GIFs over the ceiling are refused with [`Error::Animated`]
/// rather than flattened to their first frame.
pub fn shrink_to_fit(data: &[u8], ceiling: usize) -> Result<Shrunk> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(Error::Read)?;

    let format = reader.format().ok_or(Error::UnknownFormat)?;

    let img = reader
        .decode()
        .map_err(|source| Error::Decode { format, source })?;
    let (orig_width, orig_height) = img.dimensions();

    if data.len() <= ceiling {
        return Ok(Shrunk {
            data: data.to_vec(),
            width: orig_width,
            height: orig_height,
            passes: 0,
            fits: true,
        });
    }

    if format == ImageFormat::Gif && is_animated_gif(data) {
        return Err(Error::Animated(format));
    }

    let mut pass = 0;
    loop {
        pass += 1;
        let percent = 100 - SHRINK_STEP_PERCENT * pass;
        let width = scale(orig_width, percent);
        let height = scale(orig_height, percent);

        let encoded = encode(&img.resize_exact(width, height, FilterType::Lanczos3), format)?;
        let fits = encoded.len() <= ceiling;
        debug!(
            pass,
            width,
            height,
            bytes = encoded.len(),
            ceiling,
            "shrink pass"
        );

        let shrunk = Shrunk {
            data: encoded,
            width,
            height,
            passes: pass,
            fits,
        };
        if fits || pass >= MAX_SHRINK_PASSES {
            return Ok(shrunk);
        }
    }
}

fn is_animated_gif(data: &[u8]) -> bool {
    GifDecoder::new(Cursor::new(data))
        .map(|decoder| decoder.into_frames().take(2).count() > 1)
        .unwrap_or(false)
}

fn scale(dimension: u32, percent: u32) -> u32 {
    ((u64::from(dimension) * u64::from(percent) / 100) as u32).max(1)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut output = Cursor::new(Vec::new());
    img.write_to(&mut output, format)
        .map_err(|source| Error::Encode { format, source })?;
    Ok(output.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgb, RgbImage, Rgba, RgbaImage};

    fn noisy_png(width: u32, height: u32) -> (DynamicImage, Vec<u8>) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503))
                .wrapping_mul(2_246_822_519);
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        }));
        let data = encode(&img, ImageFormat::Png).unwrap();
        (img, data)
    }

    #[test]
    fn small_image_is_returned_untouched() {
        let (_, data) = noisy_png(16, 16);
        let shrunk = shrink_to_fit(&data, data.len()).unwrap();
        assert_eq!(shrunk.passes, 0);
        assert!(shrunk.fits);
        assert_eq!(shrunk.data, data);
    }

    #[test]
    fn stops_at_first_pass_that_fits() {
        let (img, data) = noisy_png(100, 100);
        let first_pass = encode(&img.resize_exact(95, 95, FilterType::Lanczos3), ImageFormat::Png)
            .unwrap();
        assert!(first_pass.len() < data.len());

        let shrunk = shrink_to_fit(&data, first_pass.len()).unwrap();
        assert_eq!(shrunk.passes, 1);
        assert!(shrunk.fits);
        assert_eq!((shrunk.width, shrunk.height), (95, 95));
    }

    #[test]
    fn floor_is_eighty_percent_and_result_is_best_effort() {
        let (_, data) = noisy_png(100, 50);
        let shrunk = shrink_to_fit(&data, 1).unwrap();
        assert_eq!(shrunk.passes, MAX_SHRINK_PASSES);
        assert!(!shrunk.fits);
        assert_eq!((shrunk.width, shrunk.height), (80, 40));
    }

    #[test]
    fn non_image_data_is_rejected() {
        let err = shrink_to_fit(b"definitely not an image", 1).unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));
    }

    fn two_frame_gif(size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            let frames = [0u8, 200].map(|red| {
                Frame::new(RgbaImage::from_pixel(size, size, Rgba([red, 40, 90, 255])))
            });
            encoder.encode_frames(frames).unwrap();
        }
        out
    }

    #[test]
    fn oversized_animation_is_refused_not_flattened() {
        let gif = two_frame_gif(32);
        let err = shrink_to_fit(&gif, gif.len() - 1).unwrap_err();
        assert!(matches!(err, Error::Animated(ImageFormat::Gif)));
    }

    #[test]
    fn animation_within_ceiling_passes_through() {
        let gif = two_frame_gif(8);
        let shrunk = shrink_to_fit(&gif, gif.len()).unwrap();
        assert_eq!(shrunk.passes, 0);
        assert_eq!(shrunk.data, gif);
    }

    #[test]
    fn scale_never_reaches_zero() {
        assert_eq!(scale(1, 80), 1);
        assert_eq!(scale(1000, 95), 950);
    }
}
