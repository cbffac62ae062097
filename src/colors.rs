//! Color parsing and color space conversion.
//!
//! A [`Color`] is either an RGB or an HSV triple backed by `palette` types.
//! RGB is the canonical form: equality, interpolation and the device wire
//! values are all defined on RGB components. Every constructor clamps its
//! components into range, so a `Color` is never out of range.
//!
//! [`parse`] understands the notations accepted on the command line:
//!
//! ```text
//! color  = space "(" inner ")" | inner
//! space  = "rgb" | "hsv"
//! inner  = triple | "#" rrggbb | name
//! triple = number sep number sep number      (sep = "," and/or whitespace)
//! name   = red | green | blue | yellow | purple | cyan | white | black
//! ```
//!
//! Triples are dtype-sensitive. If any literal contains a decimal point all
//! three are read as normalized floats (0.0-1.0 for every component, hue
//! included); otherwise they are integers scaled by the space's native range
//! (255 per RGB channel, 360/100/100 for hue/saturation/value).

use core::fmt;

use palette::{FromColor, Hsv, Mix, Srgb};
use thiserror::Error;

/// Color space a [`Color`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Hsv,
}

impl ColorSpace {
    /// Divisors applied to integer literals before clamping.
    const fn integer_scale(self) -> [f32; 3] {
        match self {
            ColorSpace::Rgb => [255.0, 255.0, 255.0],
            ColorSpace::Hsv => [360.0, 100.0, 100.0],
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "rgb" => Some(ColorSpace::Rgb),
            "hsv" => Some(ColorSpace::Hsv),
            _ => None,
        }
    }
}

/// A clamped color value in either RGB or HSV form.
#[derive(Debug, Clone, Copy)]
pub enum Color {
    /// Red, green and blue in 0.0-1.0.
    Rgb(Srgb),
    /// Hue in degrees (0-360), saturation and value in 0.0-1.0.
    Hsv(Hsv),
}

pub const BLACK: Color = Color::Rgb(Srgb::new(0.0, 0.0, 0.0));
pub const WHITE: Color = Color::Rgb(Srgb::new(1.0, 1.0, 1.0));
pub const RED: Color = Color::Rgb(Srgb::new(1.0, 0.0, 0.0));
pub const GREEN: Color = Color::Rgb(Srgb::new(0.0, 1.0, 0.0));
pub const BLUE: Color = Color::Rgb(Srgb::new(0.0, 0.0, 1.0));
pub const YELLOW: Color = Color::Rgb(Srgb::new(1.0, 1.0, 0.0));
pub const PURPLE: Color = Color::Rgb(Srgb::new(1.0, 0.0, 1.0));
pub const CYAN: Color = Color::Rgb(Srgb::new(0.0, 1.0, 1.0));

/// The fixed set of color names [`parse`] recognizes.
pub const NAMED_COLORS: [(&str, Color); 8] = [
    ("red", RED),
    ("green", GREEN),
    ("blue", BLUE),
    ("yellow", YELLOW),
    ("purple", PURPLE),
    ("cyan", CYAN),
    ("white", WHITE),
    ("black", BLACK),
];

impl Color {
    /// Creates an RGB color, clamping each channel to 0.0-1.0.
    pub fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Color::Rgb(Srgb::new(unit(red), unit(green), unit(blue)))
    }

    /// Creates an HSV color from a hue in degrees and saturation/value in 0.0-1.0.
    ///
    /// The hue is clamped to 0-360 rather than wrapped, matching the clamping
    /// applied to every other component.
    pub fn hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let hue = if hue.is_nan() { 0.0 } else { hue.clamp(0.0, 360.0) };
        Color::Hsv(Hsv::new(hue, unit(saturation), unit(value)))
    }

    /// Creates an RGB color from 8-bit device channels.
    pub fn from_rgb8(red: u8, green: u8, blue: u8) -> Self {
        Color::rgb(
            f32::from(red) / 255.0,
            f32::from(green) / 255.0,
            f32::from(blue) / 255.0,
        )
    }

    /// Builds a color from three components in the space's normalized form.
    fn from_normalized(space: ColorSpace, [a, b, c]: [f32; 3]) -> Self {
        match space {
            ColorSpace::Rgb => Color::rgb(a, b, c),
            ColorSpace::Hsv => Color::hsv(unit(a) * 360.0, b, c),
        }
    }

    /// Returns the space this color is expressed in.
    pub fn space(&self) -> ColorSpace {
        match self {
            Color::Rgb(_) => ColorSpace::Rgb,
            Color::Hsv(_) => ColorSpace::Hsv,
        }
    }

    /// Returns the canonical RGB components.
    pub fn srgb(&self) -> Srgb {
        match *self {
            Color::Rgb(rgb) => rgb,
            Color::Hsv(hsv) => {
                let rgb: Srgb = Srgb::from_color(hsv);
                Srgb::new(unit(rgb.red), unit(rgb.green), unit(rgb.blue))
            }
        }
    }

    /// Converts to RGB form. Identity for RGB colors.
    pub fn to_rgb(&self) -> Color {
        Color::Rgb(self.srgb())
    }

    /// Converts to HSV form. Hue is 0 for grays.
    pub fn to_hsv(&self) -> Color {
        match *self {
            Color::Hsv(_) => *self,
            Color::Rgb(rgb) => {
                let hsv: Hsv = Hsv::from_color(rgb);
                let hue = if hsv.saturation > 0.0 {
                    hsv.hue.into_positive_degrees()
                } else {
                    0.0
                };
                Color::hsv(hue, hsv.saturation, hsv.value)
            }
        }
    }

    /// Re-expresses the color in `space`.
    pub fn in_space(&self, space: ColorSpace) -> Color {
        match space {
            ColorSpace::Rgb => self.to_rgb(),
            ColorSpace::Hsv => self.to_hsv(),
        }
    }

    /// Returns the 8-bit channels sent to the device, rounded to nearest.
    pub fn to_rgb8(&self) -> [u8; 3] {
        let rgb = self.srgb();
        [rgb.red, rgb.green, rgb.blue].map(|c| (unit(c) * 255.0).round() as u8)
    }

    /// Linear interpolation on RGB components; `factor` 0.0 yields `self`.
    pub fn lerp(&self, other: &Color, factor: f32) -> Color {
        Color::Rgb(self.srgb().mix(other.srgb(), factor))
    }

    /// Compares RGB components within `epsilon`.
    pub fn approx_eq(&self, other: &Color, epsilon: f32) -> bool {
        let (a, b) = (self.srgb(), other.srgb());
        (a.red - b.red).abs() <= epsilon
            && (a.green - b.green).abs() <= epsilon
            && (a.blue - b.blue).abs() <= epsilon
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.srgb() == other.srgb()
    }
}

impl Default for Color {
    fn default() -> Self {
        BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Rgb(rgb) => write!(
                f,
                "rgb({:.3}, {:.3}, {:.3})",
                rgb.red, rgb.green, rgb.blue
            ),
            Color::Hsv(hsv) => write!(
                f,
                "hsv({:.3}, {:.3}, {:.3})",
                hsv.hue.into_positive_degrees() / 360.0,
                hsv.saturation,
                hsv.value
            ),
        }
    }
}

impl core::str::FromStr for Color {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Creates a fully saturated, full value color from a hue in degrees.
#[inline]
pub fn hue(degrees: f32) -> Color {
    Color::hsv(degrees, 1.0, 1.0)
}

/// Color text that could not be parsed. Every variant names the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unrecognized color: '{0}'")]
    UnrecognizedColor(String),

    #[error("unrecognized color system '{system}' in '{input}'")]
    UnknownColorSpace { system: String, input: String },

    #[error("invalid number '{literal}' in '{input}'")]
    InvalidNumber { literal: String, input: String },

    #[error("expected 3 components in '{input}', found {found}")]
    ComponentCount { found: usize, input: String },
}

impl ParseError {
    /// The offending input text.
    pub fn input(&self) -> &str {
        match self {
            ParseError::UnrecognizedColor(input)
            | ParseError::UnknownColorSpace { input, .. }
            | ParseError::InvalidNumber { input, .. }
            | ParseError::ComponentCount { input, .. } => input,
        }
    }
}

/// Parses color text into a [`Color`].
///
/// A space prefix (`rgb(...)`, `hsv(...)`) selects the space of the result;
/// without one the result is RGB. No partial results are returned.
pub fn parse(text: &str) -> Result<Color, ParseError> {
    let trimmed = text.trim();

    match split_space_prefix(trimmed) {
        Some((name, inner)) => {
            let space = ColorSpace::from_name(name).ok_or_else(|| {
                ParseError::UnknownColorSpace {
                    system: name.to_string(),
                    input: text.to_string(),
                }
            })?;
            parse_inner(inner.trim(), space, text)
        }
        None => parse_inner(trimmed, ColorSpace::Rgb, text),
    }
}

/// Splits `name(inner)` into its parts. `name` must be a word.
fn split_space_prefix(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let inner = text.get(open + 1..)?.strip_suffix(')')?;
    let name = text[..open].trim_end();
    let is_word = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_word.then_some((name, inner))
}

fn parse_inner(body: &str, space: ColorSpace, input: &str) -> Result<Color, ParseError> {
    if body.contains(|c: char| c == ',' || c.is_whitespace()) {
        return parse_triple(body, space, input);
    }

    let color = match body.strip_prefix('#') {
        Some(digits) => parse_hex(digits),
        None => NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, color)| *color),
    };

    color
        .map(|color| color.in_space(space))
        .ok_or_else(|| ParseError::UnrecognizedColor(input.to_string()))
}

fn parse_triple(body: &str, space: ColorSpace, input: &str) -> Result<Color, ParseError> {
    let literals: Vec<&str> = body
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|literal| !literal.is_empty())
        .collect();

    let [a, b, c] = literals[..] else {
        return Err(ParseError::ComponentCount {
            found: literals.len(),
            input: input.to_string(),
        });
    };

    let invalid = |literal: &str| ParseError::InvalidNumber {
        literal: literal.to_string(),
        input: input.to_string(),
    };

    let mut values = [0.0f32; 3];
    if body.contains('.') {
        for (value, literal) in values.iter_mut().zip([a, b, c]) {
            *value = literal.parse::<f32>().map_err(|_| invalid(literal))?;
        }
    } else {
        let scale = space.integer_scale();
        for ((value, literal), scale) in values.iter_mut().zip([a, b, c]).zip(scale) {
            let integer = literal.parse::<i64>().map_err(|_| invalid(literal))?;
            *value = integer as f32 / scale;
        }
    }

    Ok(Color::from_normalized(space, values))
}

fn parse_hex(digits: &str) -> Option<Color> {
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let [_, r, g, b] = value.to_be_bytes();
    Some(Color::from_rgb8(r, g, b))
}

/// Clamps to 0.0-1.0, mapping NaN to 0.0.
#[inline]
fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
