use crate::error::Result;

/// Trait for reading grayscale intensities from an image.
pub trait PixelSource {
    /// Intensity at (x, y) in image space. Returns 0 for out-of-bounds pixels.
    fn get_pixel(&self, x: i32, y: i32) -> u8;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A row-major 8-bit grayscale buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Raster {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> u8,
    {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { data, width, height }
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

impl PixelSource for Raster {
    fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[(y as u32 * self.width + x as u32) as usize]
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Decode an encoded image (PNG, JPEG, ...) into a grayscale raster.
///
/// Fails with [`Error::Decode`](crate::Error::Decode) when the bytes are not a
/// supported raster format.
pub fn decode_raster(bytes: &[u8]) -> Result<Raster> {
    let img = image::load_from_memory(bytes)?;
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();
    Ok(Raster::new(gray.into_raw(), width, height))
}

/// Sample a pixel with bilinear interpolation for sub-pixel accuracy.
#[inline]
pub fn sample_bilinear<I: PixelSource>(image: &I, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0) as f64;
    let p10 = image.get_pixel(x1, y0) as f64;
    let p01 = image.get_pixel(x0, y1) as f64;
    let p11 = image.get_pixel(x1, y1) as f64;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat};

    use super::*;
    use crate::error::Error;

    #[test]
    fn bilinear_interpolation() {
        let img = Raster::new(vec![0, 100, 200, 50], 2, 2);

        assert!((sample_bilinear(&img, 0.0, 0.0) - 0.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 0.0) - 100.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 0.0, 1.0) - 200.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 1.0) - 50.0).abs() < 0.01);

        // (0+100+200+50)/4
        assert!((sample_bilinear(&img, 0.5, 0.5) - 87.5).abs() < 0.01);
    }

    #[test]
    fn out_of_bounds_reads_zero() {
        let img = Raster::from_fn(3, 3, |_, _| 255);
        assert_eq!(img.get_pixel(1, 1), 255);
        assert_eq!(img.get_pixel(-1, 0), 0);
        assert_eq!(img.get_pixel(3, 0), 0);
    }

    #[test]
    fn decodes_png_to_gray() {
        let rgb = image::RgbImage::from_pixel(4, 2, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let raster = decode_raster(&bytes).unwrap();
        assert_eq!((raster.width(), raster.height()), (4, 2));
        assert_eq!(raster.get_pixel(3, 1), 255);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_raster(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
