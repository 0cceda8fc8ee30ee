//! Component plane to packed pixel conversion.
//!
//! Each plane is rescaled to 8 bits, replicated over its subsampling block
//! and OR-ed into the output at the channel position chosen by how many
//! planes the image has:
//!
//! | planes | plane 0             | plane 1 | plane 2 | plane 3 |
//! |--------|---------------------|---------|---------|---------|
//! | 1      | gray (alpha 0)      |         |         |         |
//! | 2      | gray (alpha 0)      | alpha   |         |         |
//! | 3      | red, alpha forced FF| green   | blue    |         |
//! | 4      | red                 | green   | blue    | alpha   |
//!
//! Single-plane images keep alpha at 0, so consumers that treat the output
//! as premultiplied will show them fully transparent. This matches what the
//! cache's own viewer produced and is kept until checked against real
//! reference output.

use crate::error::{DecodeError, DecodeResult};

use super::pixels::{ComponentPlane, PackedImage};

/// Largest power-of-two reduction ever requested from the engine.
pub const MAX_REDUCTION_FACTOR: u32 = 10;

type ChannelMap = fn(u32) -> u32;

static GRAY: [ChannelMap; 1] = [gray];
static GRAY_ALPHA: [ChannelMap; 2] = [gray, alpha];
static RGB: [ChannelMap; 3] = [opaque_red, green, blue];
static RGBA: [ChannelMap; 4] = [red, green, blue, alpha];

fn gray(v: u32) -> u32 {
    (v << 16) | (v << 8) | v
}

fn opaque_red(v: u32) -> u32 {
    0xFF00_0000 | (v << 16)
}

fn red(v: u32) -> u32 {
    v << 16
}

fn green(v: u32) -> u32 {
    v << 8
}

fn blue(v: u32) -> u32 {
    v
}

fn alpha(v: u32) -> u32 {
    v << 24
}

fn channel_maps(count: usize) -> DecodeResult<&'static [ChannelMap]> {
    match count {
        1 => Ok(&GRAY[..]),
        2 => Ok(&GRAY_ALPHA[..]),
        3 => Ok(&RGB[..]),
        4 => Ok(&RGBA[..]),
        n => Err(DecodeError::UnsupportedComponents(n)),
    }
}

/// Rescale one raw sample to 8 bits.
///
/// Signed samples are shifted up by half the range, the result is clamped
/// to `0..2^precision`, then scaled: right shift above 8 bits, left shift
/// below.
pub fn rescale_sample(sample: i32, precision: u32, signed: bool) -> u32 {
    let precision = precision.clamp(1, 31);
    let max = (1i64 << precision) - 1;
    let offset = if signed { 1i64 << (precision - 1) } else { 0 };
    let value = (i64::from(sample) + offset).clamp(0, max) as u32;
    if precision >= 8 {
        value >> (precision - 8)
    } else {
        value << (8 - precision)
    }
}

/// Pick the power-of-two reduction for a thumbnail.
///
/// `floor(log2(native_max / cap))` clamped to `0..=MAX_REDUCTION_FACTOR`,
/// with integer division as the engine's callers always did. Returns 0
/// when the image already fits.
pub fn reduction_factor(native_max: u32, cap: u32) -> u32 {
    if native_max <= cap {
        return 0;
    }
    if cap == 0 {
        return MAX_REDUCTION_FACTOR;
    }
    (native_max / cap).ilog2().min(MAX_REDUCTION_FACTOR)
}

/// Size of one axis after the engine reduces it by `2^factor`.
pub fn reduced_dimension(native: u32, factor: u32) -> u32 {
    native.checked_shr(factor).unwrap_or(0).max(1)
}

/// Combine 1 to 4 planes into one packed image of `width` x `height`.
///
/// Samples that would land outside the output rectangle are dropped.
pub fn unpack(planes: &[ComponentPlane], width: u32, height: u32) -> DecodeResult<PackedImage> {
    let maps = channel_maps(planes.len())?;
    let mut image = PackedImage::blank(width, height);
    let pixels = image.pixels_mut();

    for (index, (plane, map)) in planes.iter().zip(maps).enumerate() {
        paint_plane(index, plane, *map, pixels, width as usize, height as usize)?;
    }

    Ok(image)
}

fn paint_plane(
    index: usize,
    plane: &ComponentPlane,
    map: ChannelMap,
    pixels: &mut [u32],
    width: usize,
    height: usize,
) -> DecodeResult<()> {
    let plane_width = plane.width as usize;
    let plane_height = plane.height as usize;
    let expected = plane_width * plane_height;
    if plane.samples.len() < expected {
        return Err(DecodeError::PlaneSamples {
            component: index,
            expected,
            actual: plane.samples.len(),
        });
    }

    let dx = plane.dx.max(1) as usize;
    let dy = plane.dy.max(1) as usize;

    for py in 0..plane_height {
        let top = py * dy;
        if top >= height {
            break;
        }
        let bottom = (top + dy).min(height);
        let row = &plane.samples[py * plane_width..(py + 1) * plane_width];

        for (px, &sample) in row.iter().enumerate() {
            let left = px * dx;
            if left >= width {
                break;
            }
            let right = (left + dx).min(width);
            let value = map(rescale_sample(sample, plane.precision, plane.signed));

            for y in top..bottom {
                for pixel in &mut pixels[y * width + left..y * width + right] {
                    *pixel |= value;
                }
            }
        }
    }

    Ok(())
}
