//! Grayscale page raster handed over by the media decoder.

/// A rasterized page in 8-bit grayscale.
///
/// The decoder owns color conversion; quality metrics only need luminance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl PageImage {
    /// Wrap a luminance buffer. Returns `None` when the buffer length does
    /// not match `width * height` or either dimension is zero.
    #[must_use]
    pub fn new(width: u32, height: u32, luma: Vec<u8>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        if width == 0 || height == 0 || luma.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            luma,
        })
    }

    /// Solid-fill constructor used by tests and synthetic decoders.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Option<Self> {
        let len = (width as usize).checked_mul(height as usize)?;
        Self::new(width, height, vec![value; len])
    }

    /// Page width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Page height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel area, floored at 1 to keep density ratios finite.
    #[must_use]
    pub const fn area(&self) -> u64 {
        let area = self.width as u64 * self.height as u64;
        if area == 0 { 1 } else { area }
    }

    /// Raw luminance samples in row-major order.
    #[must_use]
    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    /// Population standard deviation of the luminance samples.
    #[must_use]
    pub fn luma_stddev(&self) -> f64 {
        let n = self.luma.len() as f64;
        let mean = self.luma.iter().map(|&p| f64::from(p)).sum::<f64>() / n;
        let variance = self
            .luma
            .iter()
            .map(|&p| {
                let d = f64::from(p) - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        variance.sqrt()
    }

    /// Mean response of a 3x3 edge-detection kernel over interior pixels.
    ///
    /// The kernel is the classic 8-neighbour Laplacian (center 8, neighbours
    /// -1), with responses clamped to `0..=255`. Border pixels have no full
    /// neighbourhood and are excluded; a page thinner than 3 pixels in
    /// either dimension has no edges to measure and reports 0.
    #[must_use]
    pub fn edge_mean(&self) -> f64 {
        if self.width < 3 || self.height < 3 {
            return 0.0;
        }
        let w = self.width as usize;
        let h = self.height as usize;
        let mut total = 0.0f64;
        let mut count = 0u64;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let mut response = 8 * i32::from(self.luma[y * w + x]);
                for dy in [-1i32, 0, 1] {
                    for dx in [-1i32, 0, 1] {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let ny = (y as i32 + dy) as usize;
                        let nx = (x as i32 + dx) as usize;
                        response -= i32::from(self.luma[ny * w + nx]);
                    }
                }
                total += f64::from(response.clamp(0, 255));
                count += 1;
            }
        }
        if count == 0 { 0.0 } else { total / count as f64 }
    }
}
