use std::path::{Path, PathBuf};

use dagal::resource::{ChannelType, ImageFormat};
use derivative::Derivative;
use image::DynamicImage;

use crate::error::ImageLoadError;

/// Side of the built-in placeholder texture
pub const PLACEHOLDER_SIZE: u32 = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl ColorFormat {
    pub fn channel_count(&self) -> u32 {
        match self {
            ColorFormat::Gray => 1,
            ColorFormat::GrayAlpha => 2,
            ColorFormat::Rgb => 3,
            ColorFormat::Rgba => 4,
        }
    }
}

/// Tightly packed pixels in native endianness
#[derive(Derivative, Clone, PartialEq)]
#[derivative(Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color: ColorFormat,
    pub channel: ChannelType,
    #[derivative(Debug = "ignore")]
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// `None` if `pixels` does not hold exactly `width * height` pixels
    pub fn new(
        width: u32,
        height: u32,
        color: ColorFormat,
        channel: ChannelType,
        pixels: Vec<u8>,
    ) -> Option<Self> {
        let image = Self {
            width,
            height,
            color,
            channel,
            pixels,
        };
        (image.pixels.len() == image.row_bytes() * height as usize).then_some(image)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.color.channel_count() as usize * self.channel.size()
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    /// Texture format the pixels are uploaded as. Three channel images gain an alpha channel
    pub fn texture_format(&self, srgb: bool) -> ImageFormat {
        match (self.channel, self.color) {
            (ChannelType::U8, ColorFormat::Gray) => ImageFormat::R8Unorm,
            (ChannelType::U8, ColorFormat::GrayAlpha) => ImageFormat::R8G8Unorm,
            (ChannelType::U8, _) if srgb => ImageFormat::R8G8B8A8Srgb,
            (ChannelType::U8, _) => ImageFormat::R8G8B8A8Unorm,
            (ChannelType::U16, ColorFormat::Gray) => ImageFormat::R16Unorm,
            (ChannelType::U16, ColorFormat::GrayAlpha) => ImageFormat::R16G16Unorm,
            (ChannelType::U16, _) => ImageFormat::R16G16B16A16Unorm,
            (ChannelType::F32, ColorFormat::Gray) => ImageFormat::R32Sfloat,
            (ChannelType::F32, ColorFormat::GrayAlpha) => ImageFormat::R32G32Sfloat,
            (ChannelType::F32, _) => ImageFormat::R32G32B32A32Sfloat,
        }
    }

    fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> DecodedImage {
        let pixel = self.bytes_per_pixel();
        let mut pixels = Vec::with_capacity(width as usize * height as usize * pixel);
        for row in y..y + height {
            let start = row as usize * self.row_bytes() + x as usize * pixel;
            pixels.extend_from_slice(&self.pixels[start..start + width as usize * pixel]);
        }
        DecodedImage {
            width,
            height,
            color: self.color,
            channel: self.channel,
            pixels,
        }
    }

    fn rotate_180(&self) -> DecodedImage {
        let pixel = self.bytes_per_pixel();
        let pixels = self
            .pixels
            .chunks_exact(pixel)
            .rev()
            .flatten()
            .copied()
            .collect();
        DecodedImage {
            pixels,
            ..self.clone()
        }
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (color, channel, pixels) = match image {
            DynamicImage::ImageLuma8(i) => (ColorFormat::Gray, ChannelType::U8, i.into_raw()),
            DynamicImage::ImageLumaA8(i) => (ColorFormat::GrayAlpha, ChannelType::U8, i.into_raw()),
            DynamicImage::ImageRgb8(i) => (ColorFormat::Rgb, ChannelType::U8, i.into_raw()),
            DynamicImage::ImageRgba8(i) => (ColorFormat::Rgba, ChannelType::U8, i.into_raw()),
            DynamicImage::ImageLuma16(i) => (
                ColorFormat::Gray,
                ChannelType::U16,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            DynamicImage::ImageLumaA16(i) => (
                ColorFormat::GrayAlpha,
                ChannelType::U16,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            DynamicImage::ImageRgb16(i) => (
                ColorFormat::Rgb,
                ChannelType::U16,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            DynamicImage::ImageRgba16(i) => (
                ColorFormat::Rgba,
                ChannelType::U16,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            DynamicImage::ImageRgb32F(i) => (
                ColorFormat::Rgb,
                ChannelType::F32,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            DynamicImage::ImageRgba32F(i) => (
                ColorFormat::Rgba,
                ChannelType::F32,
                bytemuck::cast_slice(i.as_raw()).to_vec(),
            ),
            other => (ColorFormat::Rgba, ChannelType::U8, other.to_rgba8().into_raw()),
        };
        DecodedImage {
            width,
            height,
            color,
            channel,
            pixels,
        }
    }
}

/// Where a texture load gets its pixels from
#[derive(Debug, Clone)]
pub enum TextureSource {
    File(PathBuf),
    /// Six files ordered +X, -X, +Y, -Y, +Z, -Z
    CubeFaces([PathBuf; 6]),
    /// One image holding all six faces in a horizontal or vertical cross
    CubeCross(PathBuf),
    Decoded(DecodedImage),
}

impl TextureSource {
    pub fn is_cube(&self) -> bool {
        matches!(self, TextureSource::CubeFaces(_) | TextureSource::CubeCross(_))
    }
}

pub fn decode_file(path: &Path) -> Result<DecodedImage, ImageLoadError> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageLoadError::Empty);
    }
    Ok(image.into())
}

/// Decodes every array layer of `source`
pub fn decode_source(source: &TextureSource) -> Result<Vec<DecodedImage>, ImageLoadError> {
    match source {
        TextureSource::File(path) => Ok(vec![decode_file(path)?]),
        TextureSource::CubeFaces(paths) => {
            let faces = paths
                .iter()
                .map(|path| decode_file(path))
                .collect::<Result<Vec<_>, _>>()?;
            validate_cube_faces(&faces)?;
            Ok(faces)
        }
        TextureSource::CubeCross(path) => split_cube_cross(&decode_file(path)?),
        TextureSource::Decoded(image) => {
            if image.width == 0 || image.height == 0 {
                return Err(ImageLoadError::Empty);
            }
            let expected = image.row_bytes() * image.height as usize;
            if image.pixels.len() != expected {
                return Err(ImageLoadError::PixelSizeMismatch {
                    expected,
                    actual: image.pixels.len(),
                });
            }
            Ok(vec![image.clone()])
        }
    }
}

/// Faces must be square and agree on size and pixel layout
pub fn validate_cube_faces(faces: &[DecodedImage]) -> Result<(), ImageLoadError> {
    let Some(first) = faces.first() else {
        return Err(ImageLoadError::CubeFaceMismatch);
    };
    let consistent = faces.len() == 6
        && first.width == first.height
        && faces.iter().all(|face| {
            face.width == first.width
                && face.height == first.height
                && face.color == first.color
                && face.channel == first.channel
        });
    if consistent {
        Ok(())
    } else {
        Err(ImageLoadError::CubeFaceMismatch)
    }
}

/// Cuts a cross layout into six faces ordered +X, -X, +Y, -Y, +Z, -Z
///
/// ```text
///  horizontal       vertical
///    +Y               +Y
/// -X +Z +X -Z      -X +Z +X
///    -Y               -Y
///                     -Z
/// ```
/// The -Z face of a vertical cross is stored upside down and gets rotated back.
pub fn split_cube_cross(image: &DecodedImage) -> Result<Vec<DecodedImage>, ImageLoadError> {
    let (width, height) = (image.width, image.height);
    let layout_error = ImageLoadError::CubeCrossLayout { width, height };
    let (face, vertical) = if width as u64 * 3 == height as u64 * 4 {
        (width / 4, false)
    } else if height as u64 * 3 == width as u64 * 4 {
        (width / 3, true)
    } else {
        return Err(layout_error);
    };
    if face == 0 {
        return Err(layout_error);
    }

    let cell = |column: u32, row: u32| image.crop(column * face, row * face, face, face);
    let negative_z = if vertical {
        cell(1, 3).rotate_180()
    } else {
        cell(3, 1)
    };
    Ok(vec![
        cell(2, 1),
        cell(0, 1),
        cell(1, 0),
        cell(1, 2),
        cell(1, 1),
        negative_z,
    ])
}

/// Deterministic 32x32 RGBA8 magenta and black checkerboard
pub fn placeholder() -> DecodedImage {
    const CELL: u32 = 8;
    let mut pixels = Vec::with_capacity((PLACEHOLDER_SIZE * PLACEHOLDER_SIZE * 4) as usize);
    for y in 0..PLACEHOLDER_SIZE {
        for x in 0..PLACEHOLDER_SIZE {
            let lit = ((x / CELL) + (y / CELL)) % 2 == 0;
            pixels.extend_from_slice(if lit { &[255, 0, 255, 255] } else { &[0, 0, 0, 255] });
        }
    }
    DecodedImage {
        width: PLACEHOLDER_SIZE,
        height: PLACEHOLDER_SIZE,
        color: ColorFormat::Rgba,
        channel: ChannelType::U8,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every pixel's first channel holds the index of the cross cell it sits in
    fn labelled_cross(columns: u32, rows: u32, face: u32) -> DecodedImage {
        let (width, height) = (columns * face, rows * face);
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let label = (y / face * columns + x / face) as u8;
                pixels.push(label);
                // second channel tracks the position inside the face
                pixels.push(((y % face) * face + x % face) as u8);
            }
        }
        DecodedImage::new(width, height, ColorFormat::GrayAlpha, ChannelType::U8, pixels).unwrap()
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        let first = placeholder();
        let second = placeholder();
        assert_eq!(first, second);
        assert_eq!((first.width, first.height), (32, 32));
        assert_eq!(first.texture_format(false), ImageFormat::R8G8B8A8Unorm);
        assert_eq!(&first.pixels[..4], &[255, 0, 255, 255]);
        assert_eq!(&first.pixels[8 * 4..8 * 4 + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_horizontal_cross() {
        let faces = split_cube_cross(&labelled_cross(4, 3, 2)).unwrap();
        let labels: Vec<u8> = faces.iter().map(|f| f.pixels[0]).collect();
        // +X, -X, +Y, -Y, +Z, -Z
        assert_eq!(labels, vec![6, 4, 1, 9, 5, 7]);
        assert!(faces.iter().all(|f| f.width == 2 && f.height == 2));
        validate_cube_faces(&faces).unwrap();
    }

    #[test]
    fn test_vertical_cross_rotates_negative_z() {
        let faces = split_cube_cross(&labelled_cross(3, 4, 2)).unwrap();
        let labels: Vec<u8> = faces.iter().map(|f| f.pixels[0]).collect();
        assert_eq!(labels, vec![5, 3, 1, 7, 4, 10]);
        // positions inside the -Z face are reversed
        let positions: Vec<u8> = faces[5].pixels.chunks_exact(2).map(|p| p[1]).collect();
        assert_eq!(positions, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_bad_cross_layout() {
        let image = labelled_cross(2, 2, 2);
        assert!(matches!(
            split_cube_cross(&image),
            Err(ImageLoadError::CubeCrossLayout { width: 4, height: 4 })
        ));
    }

    #[test]
    fn test_mismatched_faces() {
        let mut faces = vec![placeholder(); 6];
        validate_cube_faces(&faces).unwrap();
        faces[3] = labelled_cross(1, 1, 32);
        assert!(matches!(
            validate_cube_faces(&faces),
            Err(ImageLoadError::CubeFaceMismatch)
        ));
        assert!(validate_cube_faces(&faces[..5]).is_err());
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("dare_streaming_missing_image.png");
        assert!(matches!(decode_file(&path), Err(ImageLoadError::Io(_))));
    }

    #[test]
    fn test_dynamic_image_conversion() {
        let image = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
            2,
            1,
            image::Rgb([1u16, 2, 3]),
        ));
        let decoded = DecodedImage::from(image);
        assert_eq!(decoded.color, ColorFormat::Rgb);
        assert_eq!(decoded.channel, ChannelType::U16);
        assert_eq!(decoded.pixels.len(), 12);
        assert_eq!(decoded.texture_format(false), ImageFormat::R16G16B16A16Unorm);
    }
}
