//! RGBA colors and random color ranges for building surfaces.

use serde::{Deserialize, Serialize};

use crate::rng::{rand_uniform, GenRng};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);
    pub const LT_GRAY: Color = Color::rgb(0.75, 0.75, 0.75);
    pub const BROWN: Color = Color::rgb(0.5, 0.25, 0.05);
    pub const LT_BROWN: Color = Color::rgb(0.7, 0.5, 0.3);
    pub const WARM_LIGHT: Color = Color::rgb(1.0, 0.9, 0.7);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn lerp(&self, o: &Color, t: f32) -> Color {
        Color {
            r: self.r + (o.r - self.r) * t,
            g: self.g + (o.g - self.g) * t,
            b: self.b + (o.b - self.b) * t,
            a: self.a + (o.a - self.a) * t,
        }
    }

    pub fn scaled(&self, s: f32) -> Color {
        Color {
            r: self.r * s,
            g: self.g * s,
            b: self.b * s,
            a: self.a,
        }
    }

    /// Pack to 8-bit RGBA for vertex data.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

/// Color interval; `grayscale_rand` draws one random value for all channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorRange {
    pub grayscale_rand: f32,
    pub cmin: Color,
    pub cmax: Color,
}

impl Default for ColorRange {
    fn default() -> Self {
        Self {
            grayscale_rand: 0.0,
            cmin: Color::WHITE,
            cmax: Color::WHITE,
        }
    }
}

impl ColorRange {
    pub fn set_c(&mut self, c: Color) {
        self.cmin = c;
        self.cmax = c;
    }

    pub fn gen_color(&self, rng: &mut GenRng) -> Color {
        if self.cmin == self.cmax {
            return self.cmin;
        }
        let c = Color {
            r: rand_uniform(rng, self.cmin.r.min(self.cmax.r), self.cmin.r.max(self.cmax.r)),
            g: rand_uniform(rng, self.cmin.g.min(self.cmax.g), self.cmin.g.max(self.cmax.g)),
            b: rand_uniform(rng, self.cmin.b.min(self.cmax.b), self.cmin.b.max(self.cmax.b)),
            a: 1.0,
        };
        if self.grayscale_rand <= 0.0 {
            return c;
        }
        let gray = self.grayscale_rand * rand_uniform(rng, 0.0, 1.0);
        Color {
            r: (c.r + gray).min(1.0),
            g: (c.g + gray).min(1.0),
            b: (c.b + gray).min(1.0),
            a: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_for_seeds;

    #[test]
    fn fixed_range_returns_min() {
        let mut cr = ColorRange::default();
        cr.set_c(Color::BROWN);
        let mut rng = rng_for_seeds(1, 1);
        assert_eq!(cr.gen_color(&mut rng), Color::BROWN);
    }

    #[test]
    fn generated_color_within_range() {
        let cr = ColorRange {
            grayscale_rand: 0.0,
            cmin: Color::rgb(0.2, 0.3, 0.4),
            cmax: Color::rgb(0.6, 0.7, 0.8),
        };
        let mut rng = rng_for_seeds(3, 9);
        for _ in 0..50 {
            let c = cr.gen_color(&mut rng);
            assert!(c.r >= 0.2 && c.r <= 0.6);
            assert!(c.g >= 0.3 && c.g <= 0.7);
            assert!(c.b >= 0.4 && c.b <= 0.8);
        }
    }

    #[test]
    fn rgba8_packing() {
        assert_eq!(Color::WHITE.to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(Color::rgb(2.0, -1.0, 0.5).to_rgba8(), [255, 0, 128, 255]);
    }
}
