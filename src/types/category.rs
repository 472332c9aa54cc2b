//! Target categories: colours and shapes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Colours the patient must recognise (and the micro:bit can report)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    Red,
    Yellow,
    Blue,
    Green,
}

impl Color {
    /// Every colour, in the order the game screens list them
    pub const ALL: [Color; 4] = [Color::Red, Color::Yellow, Color::Blue, Color::Green];

    /// Wire token sent by the micro:bit firmware
    pub fn token(&self) -> &'static str {
        match self {
            Color::Red => "RED",
            Color::Yellow => "YELLOW",
            Color::Blue => "BLUE",
            Color::Green => "GREEN",
        }
    }

    /// Exact match against the firmware vocabulary (input already upper-cased)
    pub fn from_token(token: &str) -> Option<Color> {
        match token {
            "RED" => Some(Color::Red),
            "YELLOW" => Some(Color::Yellow),
            "BLUE" => Some(Color::Blue),
            "GREEN" => Some(Color::Green),
            _ => None,
        }
    }

    /// English display name
    pub fn name_en(&self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Yellow => "Yellow",
            Color::Blue => "Blue",
            Color::Green => "Green",
        }
    }

    /// Chinese display name used on the patient screens
    pub fn name_zh(&self) -> &'static str {
        match self {
            Color::Red => "紅色",
            Color::Yellow => "黃色",
            Color::Blue => "藍色",
            Color::Green => "綠色",
        }
    }

    /// ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            Color::Red => "\x1b[31m",
            Color::Yellow => "\x1b[33m",
            Color::Blue => "\x1b[34m",
            Color::Green => "\x1b[32m",
        }
    }
}

/// Shapes used by the shape-recognition levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shape {
    Hexagon,
    Rectangle,
    Triangle,
    Square,
    Circle,
}

impl Shape {
    /// Default shape list, in grid order
    pub const ALL: [Shape; 5] = [
        Shape::Hexagon,
        Shape::Rectangle,
        Shape::Triangle,
        Shape::Square,
        Shape::Circle,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Shape::Hexagon => "HEXAGON",
            Shape::Rectangle => "RECTANGLE",
            Shape::Triangle => "TRIANGLE",
            Shape::Square => "SQUARE",
            Shape::Circle => "CIRCLE",
        }
    }

    pub fn from_token(token: &str) -> Option<Shape> {
        Shape::ALL.into_iter().find(|s| s.token() == token)
    }

    /// Shape at a grid index (cycles through `ALL`)
    pub fn at_index(index: usize) -> Shape {
        Shape::ALL[index % Shape::ALL.len()]
    }
}

/// A target class: one colour or one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Color(Color),
    Shape(Shape),
}

impl Category {
    /// The four colours
    pub fn colors() -> Vec<Category> {
        Color::ALL.into_iter().map(Category::Color).collect()
    }

    /// The five default shapes
    pub fn shapes() -> Vec<Category> {
        Shape::ALL.into_iter().map(Category::Shape).collect()
    }

    pub fn token(&self) -> &'static str {
        match self {
            Category::Color(c) => c.token(),
            Category::Shape(s) => s.token(),
        }
    }

    /// The colour, if this is a colour category
    pub fn as_color(&self) -> Option<Color> {
        match self {
            Category::Color(c) => Some(*c),
            Category::Shape(_) => None,
        }
    }
}

impl From<Color> for Category {
    fn from(c: Color) -> Self {
        Category::Color(c)
    }
}

impl From<Shape> for Category {
    fn from(s: Shape) -> Self {
        Category::Shape(s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Unknown category name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Case-insensitive; accepts single-letter colour shortcuts (r, y, b, g)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_uppercase();
        let expanded = match token.as_str() {
            "R" => "RED",
            "Y" => "YELLOW",
            "B" => "BLUE",
            "G" => "GREEN",
            other => other,
        };
        if let Some(c) = Color::from_token(expanded) {
            return Ok(Category::Color(c));
        }
        if let Some(shape) = Shape::from_token(expanded) {
            return Ok(Category::Shape(shape));
        }
        Err(UnknownCategory(s.to_string()))
    }
}

/// Result of decoding one token from the device
///
/// Decoding is total: anything outside the vocabulary becomes `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedToken {
    Color(Color),
    Unrecognized(String),
}

impl DecodedToken {
    /// Trim, upper-case and match exactly
    pub fn decode(raw: &str) -> DecodedToken {
        let token = raw.trim().to_uppercase();
        match Color::from_token(&token) {
            Some(c) => DecodedToken::Color(c),
            None => DecodedToken::Unrecognized(token),
        }
    }
}
