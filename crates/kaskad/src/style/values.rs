//! Закрытая модель CSS-значений.
//!
//! Каждое каскадируемое значение — вариант [`CssValue`]; везде по нему
//! делается исчерпывающий `match`, «протаскивания» произвольных строк
//! дальше стадии подстановки `var()` нет.

use std::fmt;

use cssparser::{Parser, ParserInput, Token};

use super::easing::EasingFunction;
use super::properties::ShorthandId;

/// Цвет в формате RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

    /// Парсит цвет из текста: `#rgb`, `#rrggbb`, `rgb()/rgba()`, имя.
    pub fn parse(text: &str) -> Option<Color> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        if text.to_ascii_lowercase().starts_with("rgb") {
            return Self::parse_rgb_function(text);
        }
        Self::from_name(text)
    }

    fn parse_hex(hex: &str) -> Option<Color> {
        match hex.len() {
            3 => {
                let r = u8::from_str_radix(&hex[0..1], 16).ok()?;
                let g = u8::from_str_radix(&hex[1..2], 16).ok()?;
                let b = u8::from_str_radix(&hex[2..3], 16).ok()?;
                Some(Color::rgb(r * 17, g * 17, b * 17))
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Color::rgb(r, g, b))
            }
            8 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                let a = u8::from_str_radix(&hex[6..8], 16).ok()?;
                Some(Color::new(r, g, b, a))
            }
            _ => None,
        }
    }

    /// Компоненты `rgb()`/`rgba()` разбираются токенами cssparser.
    fn parse_rgb_function(text: &str) -> Option<Color> {
        let mut input = ParserInput::new(text);
        let mut parser = Parser::new(&mut input);
        let name = parser.expect_function().ok()?.to_ascii_lowercase();
        if name != "rgb" && name != "rgba" {
            return None;
        }
        parser
            .parse_nested_block(|args| -> Result<Color, cssparser::ParseError<'_, ()>> {
                let mut channels = [0u8; 3];
                for (i, channel) in channels.iter_mut().enumerate() {
                    if i > 0 {
                        let _ = args.try_parse(|a| a.expect_comma());
                    }
                    *channel = match args.next()? {
                        Token::Number { value, .. } => value.round().clamp(0.0, 255.0) as u8,
                        Token::Percentage { unit_value, .. } => {
                            (unit_value * 255.0).round().clamp(0.0, 255.0) as u8
                        }
                        _ => return Err(args.new_custom_error(())),
                    };
                }
                let alpha = if args.try_parse(|a| a.expect_comma()).is_ok()
                    || args.try_parse(|a| a.expect_delim('/')).is_ok()
                {
                    match args.next()? {
                        Token::Number { value, .. } => (value * 255.0).round().clamp(0.0, 255.0) as u8,
                        Token::Percentage { unit_value, .. } => {
                            (unit_value * 255.0).round().clamp(0.0, 255.0) as u8
                        }
                        _ => return Err(args.new_custom_error(())),
                    }
                } else {
                    255
                };
                Ok(Color::new(channels[0], channels[1], channels[2], alpha))
            })
            .ok()
    }

    fn from_name(name: &str) -> Option<Color> {
        let color = match name.to_ascii_lowercase().as_str() {
            "black" => Color::rgb(0, 0, 0),
            "white" => Color::rgb(255, 255, 255),
            "red" => Color::rgb(255, 0, 0),
            "green" => Color::rgb(0, 128, 0),
            "lime" => Color::rgb(0, 255, 0),
            "blue" => Color::rgb(0, 0, 255),
            "yellow" => Color::rgb(255, 255, 0),
            "cyan" | "aqua" => Color::rgb(0, 255, 255),
            "magenta" | "fuchsia" => Color::rgb(255, 0, 255),
            "gray" | "grey" => Color::rgb(128, 128, 128),
            "silver" => Color::rgb(192, 192, 192),
            "maroon" => Color::rgb(128, 0, 0),
            "olive" => Color::rgb(128, 128, 0),
            "navy" => Color::rgb(0, 0, 128),
            "purple" => Color::rgb(128, 0, 128),
            "teal" => Color::rgb(0, 128, 128),
            "orange" => Color::rgb(255, 165, 0),
            "transparent" => Color::TRANSPARENT,
            _ => return None,
        };
        Some(color)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a as f32 / 255.0)
        }
    }
}

/// Единица длины.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Px,
    Em,
    Rem,
    Ex,
    Ch,
    Vw,
    Vh,
    Vmin,
    Vmax,
    Pt,
    Pc,
    Cm,
    Mm,
    Q,
    In,
}

impl LengthUnit {
    pub fn from_name(name: &str) -> Option<Self> {
        let unit = match name.to_ascii_lowercase().as_str() {
            "px" => Self::Px,
            "em" => Self::Em,
            "rem" => Self::Rem,
            "ex" => Self::Ex,
            "ch" => Self::Ch,
            "vw" => Self::Vw,
            "vh" => Self::Vh,
            "vmin" => Self::Vmin,
            "vmax" => Self::Vmax,
            "pt" => Self::Pt,
            "pc" => Self::Pc,
            "cm" => Self::Cm,
            "mm" => Self::Mm,
            "q" => Self::Q,
            "in" => Self::In,
            _ => return None,
        };
        Some(unit)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Px => "px",
            Self::Em => "em",
            Self::Rem => "rem",
            Self::Ex => "ex",
            Self::Ch => "ch",
            Self::Vw => "vw",
            Self::Vh => "vh",
            Self::Vmin => "vmin",
            Self::Vmax => "vmax",
            Self::Pt => "pt",
            Self::Pc => "pc",
            Self::Cm => "cm",
            Self::Mm => "mm",
            Self::Q => "q",
            Self::In => "in",
        }
    }
}

/// Контекст абсолютизации: всё, что нужно, чтобы свести длину к px.
#[derive(Debug, Clone, Copy)]
pub struct LengthContext {
    /// Размер шрифта самого элемента, px.
    pub font_size: f32,
    /// Размер шрифта корневого элемента, px.
    pub root_font_size: f32,
    /// Ширина и высота вьюпорта, px.
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for LengthContext {
    fn default() -> Self {
        Self {
            font_size: Length::DEFAULT_FONT_SIZE,
            root_font_size: Length::DEFAULT_FONT_SIZE,
            viewport_width: 800.0,
            viewport_height: 600.0,
        }
    }
}

/// Длина с единицей измерения.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f32,
    pub unit: LengthUnit,
}

impl Length {
    /// Размер шрифта по умолчанию.
    pub const DEFAULT_FONT_SIZE: f32 = 16.0;
    /// Размер моноширинного шрифта по умолчанию.
    pub const DEFAULT_MONOSPACE_FONT_SIZE: f32 = 13.0;

    pub const fn px(value: f32) -> Self {
        Self { value, unit: LengthUnit::Px }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(
            self.unit,
            LengthUnit::Px
                | LengthUnit::Pt
                | LengthUnit::Pc
                | LengthUnit::Cm
                | LengthUnit::Mm
                | LengthUnit::Q
                | LengthUnit::In
        )
    }

    /// Сводит длину к пикселям. 1in = 96px, 1pt = 4/3px (то есть px·0.75 = pt).
    pub fn to_px(&self, ctx: &LengthContext) -> f32 {
        match self.unit {
            LengthUnit::Px => self.value,
            LengthUnit::Em => self.value * ctx.font_size,
            LengthUnit::Rem => self.value * ctx.root_font_size,
            // Без метрик шрифта используем стандартные приближения.
            LengthUnit::Ex => self.value * ctx.font_size * 0.5,
            LengthUnit::Ch => self.value * ctx.font_size * 0.5,
            LengthUnit::Vw => self.value * ctx.viewport_width / 100.0,
            LengthUnit::Vh => self.value * ctx.viewport_height / 100.0,
            LengthUnit::Vmin => self.value * ctx.viewport_width.min(ctx.viewport_height) / 100.0,
            LengthUnit::Vmax => self.value * ctx.viewport_width.max(ctx.viewport_height) / 100.0,
            LengthUnit::Pt => self.value / 0.75,
            LengthUnit::Pc => self.value * 16.0,
            LengthUnit::Cm => self.value * 96.0 / 2.54,
            LengthUnit::Mm => self.value * 96.0 / 25.4,
            LengthUnit::Q => self.value * 96.0 / 25.4 / 4.0,
            LengthUnit::In => self.value * 96.0,
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.name())
    }
}

/// Каскадируемое значение свойства.
///
/// `Raw` и `Pending` — промежуточные состояния деклараций с `var()`:
/// они живут только до стадии подстановки и в вычисленном стиле не
/// встречаются.
#[derive(Debug, Clone, PartialEq)]
pub enum CssValue {
    Keyword(String),
    Length(Length),
    /// Доля, а не проценты: `120%` хранится как `1.2`. Токенайзер
    /// отдаёт дробь напрямую, без туда-обратно через умножение на 100.
    Percentage(f32),
    Number(f32),
    Integer(i32),
    Color(Color),
    /// Время в секундах.
    Time(f32),
    FontFamilies(Vec<String>),
    /// Список имён свойств (значение `transition-property`).
    Idents(Vec<String>),
    Timing(EasingFunction),
    Url(String),
    /// Непроразобранное значение лонгхенда, содержащее `var()`.
    Raw(String),
    /// Маркер подстановки для лонгхенда, пришедшего из шортхенда с `var()`.
    Pending { shorthand: ShorthandId, text: String },
    /// Результат провалившейся подстановки.
    GuaranteedInvalid,
    Initial,
    Inherit,
    Unset,
    Revert,
    RevertLayer,
}

impl CssValue {
    pub fn keyword(word: &str) -> Self {
        Self::Keyword(word.to_ascii_lowercase())
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Self::Keyword(k) if k == word)
    }

    /// Широкие ключевые слова каскада.
    pub fn is_cascade_keyword(&self) -> bool {
        matches!(
            self,
            Self::Initial | Self::Inherit | Self::Unset | Self::Revert | Self::RevertLayer
        )
    }

    /// Требует ли значение подстановки `var()`.
    pub fn needs_substitution(&self) -> bool {
        matches!(self, Self::Raw(_) | Self::Pending { .. })
    }

    pub fn as_length(&self) -> Option<Length> {
        match self {
            Self::Length(length) => Some(*length),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Self::Color(color) => Some(*color),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(n) => Some(*n as f32),
            _ => None,
        }
    }
}

impl fmt::Display for CssValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword(k) => write!(f, "{k}"),
            Self::Length(l) => write!(f, "{l}"),
            Self::Percentage(p) => write!(f, "{}%", p * 100.0),
            Self::Number(n) => write!(f, "{n}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Color(c) => write!(f, "{c}"),
            Self::Time(s) => write!(f, "{s}s"),
            Self::FontFamilies(families) => write!(f, "{}", families.join(", ")),
            Self::Idents(names) => write!(f, "{}", names.join(", ")),
            Self::Timing(easing) => write!(f, "{easing}"),
            Self::Url(url) => write!(f, "url({url})"),
            Self::Raw(text) | Self::Pending { text, .. } => write!(f, "{text}"),
            Self::GuaranteedInvalid => write!(f, ""),
            Self::Initial => write!(f, "initial"),
            Self::Inherit => write!(f, "inherit"),
            Self::Unset => write!(f, "unset"),
            Self::Revert => write!(f, "revert"),
            Self::RevertLayer => write!(f, "revert-layer"),
        }
    }
}
