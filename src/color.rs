//! RGB pixel math and the fixed group palette.
//!
//! Every LED frame in this crate is a `Vec<Rgb>`. The palette gives each
//! device group a distinct base hue so that several devices running side by
//! side can be told apart in the trail visualizations.

/// A single LED pixel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    /// Red channel, 0-255.
    pub r: u8,
    /// Green channel, 0-255.
    pub g: u8,
    /// Blue channel, 0-255.
    pub b: u8,
}

impl Rgb {
    /// An unlit pixel.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Builds a pixel from channel values.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales all three channels by `intensity`, clamped to [0, 1].
    pub fn scaled(self, intensity: f32) -> Rgb {
        let k = intensity.clamp(0.0, 1.0);
        Rgb::new(
            (self.r as f32 * k) as u8,
            (self.g as f32 * k) as u8,
            (self.b as f32 * k) as u8,
        )
    }

    /// True if all channels are zero.
    pub fn is_unlit(self) -> bool {
        self == Rgb::BLACK
    }
}

/// Base colors assigned to device groups 1 through 5.
pub const GROUP_COLORS: [Rgb; 5] = [
    Rgb::new(255, 0, 0),   // Red
    Rgb::new(0, 255, 0),   // Green
    Rgb::new(0, 0, 255),   // Blue
    Rgb::new(255, 128, 0), // Orange
    Rgb::new(255, 0, 255), // Purple
];

/// Smallest valid group index.
pub const MIN_GROUP: u8 = 1;
/// Largest valid group index.
pub const MAX_GROUP: u8 = GROUP_COLORS.len() as u8;

/// Clamps an arbitrary host-supplied group number into the valid range.
pub fn clamp_group(group: i32) -> u8 {
    group.clamp(MIN_GROUP as i32, MAX_GROUP as i32) as u8
}

/// Looks up the base color for a (valid) group index.
pub fn group_color(group: u8) -> Rgb {
    GROUP_COLORS[(group.clamp(MIN_GROUP, MAX_GROUP) - 1) as usize]
}

/// Maps a position on the color wheel to a fully saturated hue.
///
/// The wheel is split into three linear segments (red→green, green→blue,
/// blue→red), which is plenty for a rotating rainbow on a short chain.
pub fn color_wheel(pos: u8) -> Rgb {
    if pos < 85 {
        Rgb::new(pos * 3, 255 - pos * 3, 0)
    } else if pos < 170 {
        let pos = pos - 85;
        Rgb::new(255 - pos * 3, 0, pos * 3)
    } else {
        let pos = pos - 170;
        Rgb::new(0, pos * 3, 255 - pos * 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_clamps_intensity() {
        let c = Rgb::new(100, 200, 50);
        assert_eq!(c.scaled(2.0), c);
        assert_eq!(c.scaled(-1.0), Rgb::BLACK);
        assert_eq!(c.scaled(0.5), Rgb::new(50, 100, 25));
    }

    #[test]
    fn group_clamping() {
        assert_eq!(clamp_group(0), MIN_GROUP);
        assert_eq!(clamp_group(7), MAX_GROUP);
        assert_eq!(clamp_group(3), 3);
        assert_eq!(group_color(1), Rgb::new(255, 0, 0));
        assert_eq!(group_color(5), Rgb::new(255, 0, 255));
    }

    #[test]
    fn wheel_endpoints_are_saturated() {
        assert_eq!(color_wheel(0), Rgb::new(0, 255, 0));
        let c = color_wheel(85);
        assert_eq!(c, Rgb::new(255, 0, 0));
    }
}
