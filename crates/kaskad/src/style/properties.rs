//! Таблица свойств: лонгхенды, их метаданные и разбор значений.
//!
//! Здесь же живёт раскрытие шортхендов. Декларация с `var()` не
//! разбирается сразу: лонгхенд получает [`CssValue::Raw`], а каждый
//! лонгхенд шортхенда — [`CssValue::Pending`], подстановка происходит
//! на стадии вычисления.

use cssparser::{Parser, ParserInput, Token};
use thiserror::Error;

use super::easing::EasingFunction;
use super::values::{Color, CssValue, Length, LengthUnit};

/// Ошибка разбора декларации.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyParseError {
    #[error("unknown property `{0}`")]
    UnknownProperty(String),
    #[error("invalid value `{value}` for `{property}`")]
    InvalidValue { property: String, value: String },
}

/// Декларация в том виде, в котором её выдаёт парсер таблицы стилей.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Имя свойства (для кастомных — вместе с `--`).
    pub name: String,
    /// Сырой текст значения.
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn is_custom(&self) -> bool {
        self.name.starts_with("--")
    }
}

/// Идентификатор лонгхенда.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyId {
    // Не наследуемые
    Display,
    Position,
    Float,
    Clear,
    Width,
    Height,
    MinWidth,
    MinHeight,
    MaxWidth,
    MaxHeight,
    MarginTop,
    MarginRight,
    MarginBottom,
    MarginLeft,
    PaddingTop,
    PaddingRight,
    PaddingBottom,
    PaddingLeft,
    BorderTopWidth,
    BorderRightWidth,
    BorderBottomWidth,
    BorderLeftWidth,
    Top,
    Right,
    Bottom,
    Left,
    BackgroundColor,
    BackgroundPositionX,
    BackgroundPositionY,
    OverflowX,
    OverflowY,
    Opacity,
    ZIndex,
    VerticalAlign,
    TextDecorationLine,
    RowGap,
    ColumnGap,
    TransitionProperty,
    TransitionDuration,
    TransitionTimingFunction,
    TransitionDelay,
    // Наследуемые
    Color,
    FontFamily,
    FontSize,
    FontWeight,
    FontStyle,
    LineHeight,
    LetterSpacing,
    WordSpacing,
    WhiteSpace,
    TextAlign,
    Visibility,
    MathDepth,
}

impl PropertyId {
    pub const ALL: &'static [PropertyId] = &[
        Self::Display,
        Self::Position,
        Self::Float,
        Self::Clear,
        Self::Width,
        Self::Height,
        Self::MinWidth,
        Self::MinHeight,
        Self::MaxWidth,
        Self::MaxHeight,
        Self::MarginTop,
        Self::MarginRight,
        Self::MarginBottom,
        Self::MarginLeft,
        Self::PaddingTop,
        Self::PaddingRight,
        Self::PaddingBottom,
        Self::PaddingLeft,
        Self::BorderTopWidth,
        Self::BorderRightWidth,
        Self::BorderBottomWidth,
        Self::BorderLeftWidth,
        Self::Top,
        Self::Right,
        Self::Bottom,
        Self::Left,
        Self::BackgroundColor,
        Self::BackgroundPositionX,
        Self::BackgroundPositionY,
        Self::OverflowX,
        Self::OverflowY,
        Self::Opacity,
        Self::ZIndex,
        Self::VerticalAlign,
        Self::TextDecorationLine,
        Self::RowGap,
        Self::ColumnGap,
        Self::TransitionProperty,
        Self::TransitionDuration,
        Self::TransitionTimingFunction,
        Self::TransitionDelay,
        Self::Color,
        Self::FontFamily,
        Self::FontSize,
        Self::FontWeight,
        Self::FontStyle,
        Self::LineHeight,
        Self::LetterSpacing,
        Self::WordSpacing,
        Self::WhiteSpace,
        Self::TextAlign,
        Self::Visibility,
        Self::MathDepth,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Position => "position",
            Self::Float => "float",
            Self::Clear => "clear",
            Self::Width => "width",
            Self::Height => "height",
            Self::MinWidth => "min-width",
            Self::MinHeight => "min-height",
            Self::MaxWidth => "max-width",
            Self::MaxHeight => "max-height",
            Self::MarginTop => "margin-top",
            Self::MarginRight => "margin-right",
            Self::MarginBottom => "margin-bottom",
            Self::MarginLeft => "margin-left",
            Self::PaddingTop => "padding-top",
            Self::PaddingRight => "padding-right",
            Self::PaddingBottom => "padding-bottom",
            Self::PaddingLeft => "padding-left",
            Self::BorderTopWidth => "border-top-width",
            Self::BorderRightWidth => "border-right-width",
            Self::BorderBottomWidth => "border-bottom-width",
            Self::BorderLeftWidth => "border-left-width",
            Self::Top => "top",
            Self::Right => "right",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::BackgroundColor => "background-color",
            Self::BackgroundPositionX => "background-position-x",
            Self::BackgroundPositionY => "background-position-y",
            Self::OverflowX => "overflow-x",
            Self::OverflowY => "overflow-y",
            Self::Opacity => "opacity",
            Self::ZIndex => "z-index",
            Self::VerticalAlign => "vertical-align",
            Self::TextDecorationLine => "text-decoration-line",
            Self::RowGap => "row-gap",
            Self::ColumnGap => "column-gap",
            Self::TransitionProperty => "transition-property",
            Self::TransitionDuration => "transition-duration",
            Self::TransitionTimingFunction => "transition-timing-function",
            Self::TransitionDelay => "transition-delay",
            Self::Color => "color",
            Self::FontFamily => "font-family",
            Self::FontSize => "font-size",
            Self::FontWeight => "font-weight",
            Self::FontStyle => "font-style",
            Self::LineHeight => "line-height",
            Self::LetterSpacing => "letter-spacing",
            Self::WordSpacing => "word-spacing",
            Self::WhiteSpace => "white-space",
            Self::TextAlign => "text-align",
            Self::Visibility => "visibility",
            Self::MathDepth => "math-depth",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|id| id.name() == lower)
    }

    /// Наследуется ли свойство по умолчанию.
    pub fn is_inherited(self) -> bool {
        matches!(
            self,
            Self::Color
                | Self::FontFamily
                | Self::FontSize
                | Self::FontWeight
                | Self::FontStyle
                | Self::LineHeight
                | Self::LetterSpacing
                | Self::WordSpacing
                | Self::WhiteSpace
                | Self::TextAlign
                | Self::Visibility
                | Self::MathDepth
        )
    }

    /// Интерполируется ли свойство переходами.
    pub fn is_animatable(self) -> bool {
        matches!(
            self,
            Self::Width
                | Self::Height
                | Self::MinWidth
                | Self::MinHeight
                | Self::MaxWidth
                | Self::MaxHeight
                | Self::MarginTop
                | Self::MarginRight
                | Self::MarginBottom
                | Self::MarginLeft
                | Self::PaddingTop
                | Self::PaddingRight
                | Self::PaddingBottom
                | Self::PaddingLeft
                | Self::BorderTopWidth
                | Self::BorderRightWidth
                | Self::BorderBottomWidth
                | Self::BorderLeftWidth
                | Self::Top
                | Self::Right
                | Self::Bottom
                | Self::Left
                | Self::BackgroundColor
                | Self::BackgroundPositionX
                | Self::BackgroundPositionY
                | Self::Opacity
                | Self::ZIndex
                | Self::RowGap
                | Self::ColumnGap
                | Self::Color
                | Self::FontSize
                | Self::FontWeight
                | Self::LineHeight
                | Self::LetterSpacing
                | Self::WordSpacing
        )
    }

    /// Начальное значение свойства.
    pub fn initial_value(self) -> CssValue {
        match self {
            Self::Display => CssValue::keyword("inline"),
            Self::Position => CssValue::keyword("static"),
            Self::Float | Self::Clear => CssValue::keyword("none"),
            Self::Width | Self::Height | Self::MinWidth | Self::MinHeight => {
                CssValue::keyword("auto")
            }
            Self::MaxWidth | Self::MaxHeight => CssValue::keyword("none"),
            Self::MarginTop
            | Self::MarginRight
            | Self::MarginBottom
            | Self::MarginLeft
            | Self::PaddingTop
            | Self::PaddingRight
            | Self::PaddingBottom
            | Self::PaddingLeft => CssValue::Length(Length::px(0.0)),
            // medium
            Self::BorderTopWidth
            | Self::BorderRightWidth
            | Self::BorderBottomWidth
            | Self::BorderLeftWidth => CssValue::Length(Length::px(3.0)),
            Self::Top | Self::Right | Self::Bottom | Self::Left => CssValue::keyword("auto"),
            Self::BackgroundColor => CssValue::Color(Color::TRANSPARENT),
            Self::BackgroundPositionX | Self::BackgroundPositionY => CssValue::Percentage(0.0),
            Self::OverflowX | Self::OverflowY => CssValue::keyword("visible"),
            Self::Opacity => CssValue::Number(1.0),
            Self::ZIndex => CssValue::keyword("auto"),
            Self::VerticalAlign => CssValue::keyword("baseline"),
            Self::TextDecorationLine => CssValue::keyword("none"),
            Self::RowGap | Self::ColumnGap => CssValue::keyword("normal"),
            Self::TransitionProperty => CssValue::keyword("all"),
            Self::TransitionDuration | Self::TransitionDelay => CssValue::Time(0.0),
            Self::TransitionTimingFunction => CssValue::Timing(EasingFunction::Ease),
            Self::Color => CssValue::Color(Color::BLACK),
            Self::FontFamily => CssValue::FontFamilies(vec!["serif".to_string()]),
            Self::FontSize => CssValue::Length(Length::px(Length::DEFAULT_FONT_SIZE)),
            Self::FontWeight => CssValue::Integer(400),
            Self::FontStyle => CssValue::keyword("normal"),
            Self::LineHeight => CssValue::keyword("normal"),
            Self::LetterSpacing | Self::WordSpacing => CssValue::keyword("normal"),
            Self::WhiteSpace => CssValue::keyword("normal"),
            Self::TextAlign => CssValue::keyword("start"),
            Self::Visibility => CssValue::keyword("visible"),
            Self::MathDepth => CssValue::Integer(0),
        }
    }
}

/// Идентификатор поддерживаемого шортхенда.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShorthandId {
    Margin,
    Padding,
    Inset,
    BorderWidth,
    Gap,
    BackgroundPosition,
    Transition,
}

impl ShorthandId {
    pub fn from_name(name: &str) -> Option<Self> {
        let shorthand = match name.to_ascii_lowercase().as_str() {
            "margin" => Self::Margin,
            "padding" => Self::Padding,
            "inset" => Self::Inset,
            "border-width" => Self::BorderWidth,
            "gap" => Self::Gap,
            "background-position" => Self::BackgroundPosition,
            "transition" => Self::Transition,
            _ => return None,
        };
        Some(shorthand)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Margin => "margin",
            Self::Padding => "padding",
            Self::Inset => "inset",
            Self::BorderWidth => "border-width",
            Self::Gap => "gap",
            Self::BackgroundPosition => "background-position",
            Self::Transition => "transition",
        }
    }

    pub fn longhands(self) -> &'static [PropertyId] {
        match self {
            Self::Margin => &[
                PropertyId::MarginTop,
                PropertyId::MarginRight,
                PropertyId::MarginBottom,
                PropertyId::MarginLeft,
            ],
            Self::Padding => &[
                PropertyId::PaddingTop,
                PropertyId::PaddingRight,
                PropertyId::PaddingBottom,
                PropertyId::PaddingLeft,
            ],
            Self::Inset => &[
                PropertyId::Top,
                PropertyId::Right,
                PropertyId::Bottom,
                PropertyId::Left,
            ],
            Self::BorderWidth => &[
                PropertyId::BorderTopWidth,
                PropertyId::BorderRightWidth,
                PropertyId::BorderBottomWidth,
                PropertyId::BorderLeftWidth,
            ],
            Self::Gap => &[PropertyId::RowGap, PropertyId::ColumnGap],
            Self::BackgroundPosition => &[
                PropertyId::BackgroundPositionX,
                PropertyId::BackgroundPositionY,
            ],
            Self::Transition => &[
                PropertyId::TransitionProperty,
                PropertyId::TransitionDuration,
                PropertyId::TransitionTimingFunction,
                PropertyId::TransitionDelay,
            ],
        }
    }

    /// Раскрывает шортхенд в пары лонгхенд/значение.
    pub fn expand(self, value: &str) -> Result<Vec<(PropertyId, CssValue)>, PropertyParseError> {
        let invalid = || PropertyParseError::InvalidValue {
            property: self.name().to_string(),
            value: value.to_string(),
        };

        match self {
            Self::Margin | Self::Padding | Self::Inset | Self::BorderWidth => {
                let allow_auto = matches!(self, Self::Margin | Self::Inset);
                let sides = parse_box_values(self, value, allow_auto).ok_or_else(invalid)?;
                Ok(self.longhands().iter().copied().zip(sides).collect())
            }
            Self::Gap => {
                let parts = split_component_values(value);
                let (row, column) = match parts.as_slice() {
                    [one] => (one.clone(), one.clone()),
                    [row, column] => (row.clone(), column.clone()),
                    _ => return Err(invalid()),
                };
                let row = parse_gap_value(&row).ok_or_else(invalid)?;
                let column = parse_gap_value(&column).ok_or_else(invalid)?;
                Ok(vec![(PropertyId::RowGap, row), (PropertyId::ColumnGap, column)])
            }
            Self::BackgroundPosition => {
                let parts = split_component_values(value);
                let (x_text, y_text) = match parts.as_slice() {
                    [one] => (one.clone(), "center".to_string()),
                    [x, y] => (x.clone(), y.clone()),
                    _ => return Err(invalid()),
                };
                let x = parse_position_component(&x_text, true).ok_or_else(invalid)?;
                let y = parse_position_component(&y_text, false).ok_or_else(invalid)?;
                Ok(vec![
                    (PropertyId::BackgroundPositionX, x),
                    (PropertyId::BackgroundPositionY, y),
                ])
            }
            Self::Transition => expand_transition(value).ok_or_else(invalid),
        }
    }
}

/// Раскрывает декларацию в пары лонгхенд/значение.
///
/// Широкие ключевые слова каскада применяются к каждому лонгхенду
/// шортхенда; значение с `var()` откладывается до подстановки.
pub fn expand_declaration(
    declaration: &Declaration,
) -> Result<Vec<(PropertyId, CssValue)>, PropertyParseError> {
    let name = declaration.name.as_str();
    let value = declaration.value.trim();

    if let Some(keyword) = parse_cascade_keyword(value) {
        if let Some(shorthand) = ShorthandId::from_name(name) {
            return Ok(shorthand
                .longhands()
                .iter()
                .map(|&id| (id, keyword.clone()))
                .collect());
        }
        let id = PropertyId::from_name(name)
            .ok_or_else(|| PropertyParseError::UnknownProperty(name.to_string()))?;
        return Ok(vec![(id, keyword)]);
    }

    if value_contains_var(value) {
        if let Some(shorthand) = ShorthandId::from_name(name) {
            return Ok(shorthand
                .longhands()
                .iter()
                .map(|&id| {
                    (id, CssValue::Pending { shorthand, text: value.to_string() })
                })
                .collect());
        }
        let id = PropertyId::from_name(name)
            .ok_or_else(|| PropertyParseError::UnknownProperty(name.to_string()))?;
        return Ok(vec![(id, CssValue::Raw(value.to_string()))]);
    }

    if let Some(shorthand) = ShorthandId::from_name(name) {
        return shorthand.expand(value);
    }

    let id = PropertyId::from_name(name)
        .ok_or_else(|| PropertyParseError::UnknownProperty(name.to_string()))?;
    let parsed = parse_longhand(id, value)?;
    Ok(vec![(id, parsed)])
}

/// Разбирает значение лонгхенда (без `var()` и без ключевых слов каскада).
pub fn parse_longhand(id: PropertyId, value: &str) -> Result<CssValue, PropertyParseError> {
    let invalid = || PropertyParseError::InvalidValue {
        property: id.name().to_string(),
        value: value.to_string(),
    };

    if let Some(keyword) = parse_cascade_keyword(value) {
        return Ok(keyword);
    }

    let parsed = match id {
        PropertyId::Display => parse_keyword_of(
            value,
            &[
                "none", "block", "inline", "inline-block", "flex", "inline-flex", "grid",
                "inline-grid", "flow-root", "list-item", "contents", "table", "inline-table",
            ],
        ),
        PropertyId::Position => {
            parse_keyword_of(value, &["static", "relative", "absolute", "fixed", "sticky"])
        }
        PropertyId::Float => parse_keyword_of(value, &["none", "left", "right"]),
        PropertyId::Clear => parse_keyword_of(value, &["none", "left", "right", "both"]),
        PropertyId::Width
        | PropertyId::Height
        | PropertyId::MinWidth
        | PropertyId::MinHeight
        | PropertyId::MarginTop
        | PropertyId::MarginRight
        | PropertyId::MarginBottom
        | PropertyId::MarginLeft
        | PropertyId::Top
        | PropertyId::Right
        | PropertyId::Bottom
        | PropertyId::Left => {
            parse_length_percent(value).or_else(|| parse_keyword_of(value, &["auto"]))
        }
        PropertyId::MaxWidth | PropertyId::MaxHeight => {
            parse_length_percent(value).or_else(|| parse_keyword_of(value, &["none"]))
        }
        PropertyId::PaddingTop
        | PropertyId::PaddingRight
        | PropertyId::PaddingBottom
        | PropertyId::PaddingLeft => parse_length_percent(value),
        PropertyId::BorderTopWidth
        | PropertyId::BorderRightWidth
        | PropertyId::BorderBottomWidth
        | PropertyId::BorderLeftWidth => parse_border_width(value),
        PropertyId::BackgroundColor | PropertyId::Color => Color::parse(value).map(CssValue::Color),
        PropertyId::BackgroundPositionX => parse_position_component(value, true),
        PropertyId::BackgroundPositionY => parse_position_component(value, false),
        PropertyId::OverflowX | PropertyId::OverflowY => {
            parse_keyword_of(value, &["visible", "hidden", "clip", "scroll", "auto"])
        }
        PropertyId::Opacity => parse_number_or_percent_as_number(value),
        PropertyId::ZIndex => {
            parse_integer(value).or_else(|| parse_keyword_of(value, &["auto"]))
        }
        PropertyId::VerticalAlign => parse_length_percent(value).or_else(|| {
            parse_keyword_of(
                value,
                &["baseline", "sub", "super", "top", "text-top", "middle", "bottom", "text-bottom"],
            )
        }),
        PropertyId::TextDecorationLine => parse_decoration_line(value),
        PropertyId::RowGap | PropertyId::ColumnGap => parse_gap_value(value),
        PropertyId::TransitionProperty => parse_transition_property(value),
        PropertyId::TransitionDuration | PropertyId::TransitionDelay => parse_time(value),
        PropertyId::TransitionTimingFunction => {
            EasingFunction::parse_str(value).map(CssValue::Timing)
        }
        PropertyId::FontFamily => parse_font_families(value),
        PropertyId::FontSize => parse_length_percent(value).or_else(|| {
            parse_keyword_of(
                value,
                &[
                    "xx-small", "x-small", "small", "medium", "large", "x-large", "xx-large",
                    "xxx-large", "smaller", "larger",
                ],
            )
        }),
        PropertyId::FontWeight => parse_font_weight(value),
        PropertyId::FontStyle => parse_keyword_of(value, &["normal", "italic", "oblique"]),
        PropertyId::LineHeight => parse_number(value)
            .or_else(|| parse_length_percent(value))
            .or_else(|| parse_keyword_of(value, &["normal"])),
        PropertyId::LetterSpacing | PropertyId::WordSpacing => {
            parse_length(value).or_else(|| parse_keyword_of(value, &["normal"]))
        }
        PropertyId::WhiteSpace => {
            parse_keyword_of(value, &["normal", "pre", "nowrap", "pre-wrap", "pre-line"])
        }
        PropertyId::TextAlign => parse_keyword_of(
            value,
            &["left", "right", "center", "justify", "start", "end", "match-parent"],
        ),
        PropertyId::Visibility => parse_keyword_of(value, &["visible", "hidden", "collapse"]),
        PropertyId::MathDepth => {
            parse_integer(value).or_else(|| parse_keyword_of(value, &["auto-add"]))
        }
    };

    parsed.ok_or_else(invalid)
}

fn parse_cascade_keyword(value: &str) -> Option<CssValue> {
    let keyword = match value.trim().to_ascii_lowercase().as_str() {
        "initial" => CssValue::Initial,
        "inherit" => CssValue::Inherit,
        "unset" => CssValue::Unset,
        "revert" => CssValue::Revert,
        "revert-layer" => CssValue::RevertLayer,
        _ => return None,
    };
    Some(keyword)
}

/// Есть ли в значении вызов `var()` (на любом уровне вложенности).
pub fn value_contains_var(value: &str) -> bool {
    fn scan(input: &mut Parser<'_, '_>) -> bool {
        let mut found = false;
        while let Ok(token) = input.next() {
            match token {
                Token::Function(name) if name.eq_ignore_ascii_case("var") => return true,
                Token::Function(_)
                | Token::ParenthesisBlock
                | Token::SquareBracketBlock
                | Token::CurlyBracketBlock => {
                    let nested: Result<bool, cssparser::ParseError<'_, ()>> =
                        input.parse_nested_block(|nested| Ok(scan(nested)));
                    if nested.unwrap_or(false) {
                        found = true;
                        break;
                    }
                }
                _ => {}
            }
        }
        found
    }

    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    scan(&mut parser)
}

fn parse_keyword_of(value: &str, allowed: &[&str]) -> Option<CssValue> {
    let lower = value.trim().to_ascii_lowercase();
    allowed.contains(&lower.as_str()).then(|| CssValue::Keyword(lower))
}

// cssparser токены привязаны к входу; нам хватает собственного снимка.
#[derive(Debug, Clone)]
enum ValueToken {
    Dimension { value: f32, unit: String },
    Percentage(f32),
    Number { value: f32, int_value: Option<i32> },
    Ident(String),
}

fn first_value_token(value: &str) -> Option<ValueToken> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    let token = match parser.next().ok()? {
        Token::Dimension { value, unit, .. } => ValueToken::Dimension {
            value: *value,
            unit: unit.to_string(),
        },
        Token::Percentage { unit_value, .. } => ValueToken::Percentage(*unit_value),
        Token::Number { value, int_value, .. } => ValueToken::Number {
            value: *value,
            int_value: *int_value,
        },
        Token::Ident(ident) => ValueToken::Ident(ident.to_string()),
        _ => return None,
    };
    if parser.next().is_ok() {
        return None;
    }
    Some(token)
}

fn parse_length(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Dimension { value, unit } => {
            let unit = LengthUnit::from_name(&unit)?;
            Some(CssValue::Length(Length { value, unit }))
        }
        ValueToken::Number { value, .. } if value == 0.0 => {
            Some(CssValue::Length(Length::px(0.0)))
        }
        _ => None,
    }
}

fn parse_length_percent(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Percentage(percent) => Some(CssValue::Percentage(percent)),
        _ => parse_length(value),
    }
}

fn parse_border_width(value: &str) -> Option<CssValue> {
    match value.trim().to_ascii_lowercase().as_str() {
        "thin" => return Some(CssValue::Length(Length::px(1.0))),
        "medium" => return Some(CssValue::Length(Length::px(3.0))),
        "thick" => return Some(CssValue::Length(Length::px(5.0))),
        _ => {}
    }
    parse_length(value)
}

fn parse_number(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Number { value, .. } => Some(CssValue::Number(value)),
        _ => None,
    }
}

fn parse_number_or_percent_as_number(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Number { value, .. } => Some(CssValue::Number(value)),
        ValueToken::Percentage(fraction) => Some(CssValue::Number(fraction)),
        _ => None,
    }
}

fn parse_integer(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Number { int_value: Some(n), .. } => Some(CssValue::Integer(n)),
        _ => None,
    }
}

fn parse_time(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Dimension { value, unit } => match unit.to_ascii_lowercase().as_str() {
            "s" => Some(CssValue::Time(value)),
            "ms" => Some(CssValue::Time(value / 1000.0)),
            _ => None,
        },
        ValueToken::Number { value, .. } if value == 0.0 => Some(CssValue::Time(0.0)),
        _ => None,
    }
}

fn parse_font_weight(value: &str) -> Option<CssValue> {
    match first_value_token(value)? {
        ValueToken::Number { value, .. } if (1.0..=1000.0).contains(&value) => {
            Some(CssValue::Integer(value.round() as i32))
        }
        ValueToken::Ident(ident) => match ident.to_ascii_lowercase().as_str() {
            "normal" => Some(CssValue::Integer(400)),
            "bold" => Some(CssValue::Integer(700)),
            "bolder" | "lighter" => Some(CssValue::Keyword(ident.to_ascii_lowercase())),
            _ => None,
        },
        _ => None,
    }
}

fn parse_decoration_line(value: &str) -> Option<CssValue> {
    let words: Vec<String> = value
        .split_ascii_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect();
    if words.is_empty() {
        return None;
    }
    let allowed = ["none", "underline", "overline", "line-through", "blink"];
    if words.iter().all(|w| allowed.contains(&w.as_str())) {
        Some(CssValue::Keyword(words.join(" ")))
    } else {
        None
    }
}

fn parse_gap_value(value: &str) -> Option<CssValue> {
    parse_length_percent(value).or_else(|| parse_keyword_of(value, &["normal"]))
}

fn parse_position_component(value: &str, horizontal: bool) -> Option<CssValue> {
    match value.trim().to_ascii_lowercase().as_str() {
        "left" if horizontal => return Some(CssValue::Percentage(0.0)),
        "right" if horizontal => return Some(CssValue::Percentage(1.0)),
        "top" if !horizontal => return Some(CssValue::Percentage(0.0)),
        "bottom" if !horizontal => return Some(CssValue::Percentage(1.0)),
        "center" => return Some(CssValue::Percentage(0.5)),
        _ => {}
    }
    parse_length_percent(value)
}

fn parse_font_families(value: &str) -> Option<CssValue> {
    let mut families = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        let family = if (part.starts_with('"') && part.ends_with('"') && part.len() >= 2)
            || (part.starts_with('\'') && part.ends_with('\'') && part.len() >= 2)
        {
            part[1..part.len() - 1].to_string()
        } else {
            // Несколько идентификаторов склеиваются через пробел.
            part.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
        };
        if family.is_empty() {
            return None;
        }
        families.push(family);
    }
    if families.is_empty() {
        None
    } else {
        Some(CssValue::FontFamilies(families))
    }
}

fn parse_transition_property(value: &str) -> Option<CssValue> {
    let names: Vec<String> = value
        .split(',')
        .map(|part| part.trim().to_ascii_lowercase())
        .collect();
    if names.iter().any(String::is_empty) {
        return None;
    }
    match names.as_slice() {
        [single] if single == "all" || single == "none" => Some(CssValue::Keyword(single.clone())),
        _ => Some(CssValue::Idents(names)),
    }
}

/// Разбивает значение на компоненты верхнего уровня (по пробелам,
/// не залезая внутрь функций).
fn split_component_values(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in value.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_ascii_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_box_values(
    shorthand: ShorthandId,
    value: &str,
    allow_auto: bool,
) -> Option<[CssValue; 4]> {
    let parse_side = |text: &str| -> Option<CssValue> {
        if allow_auto && text.eq_ignore_ascii_case("auto") {
            return Some(CssValue::keyword("auto"));
        }
        if shorthand == ShorthandId::BorderWidth {
            parse_border_width(text)
        } else {
            parse_length_percent(text)
        }
    };

    let parts = split_component_values(value);
    let values: Vec<CssValue> = parts
        .iter()
        .map(|p| parse_side(p))
        .collect::<Option<Vec<_>>>()?;

    // Репликация top/right/bottom/left по числу значений.
    match values.as_slice() {
        [one] => Some([one.clone(), one.clone(), one.clone(), one.clone()]),
        [vertical, horizontal] => Some([
            vertical.clone(),
            horizontal.clone(),
            vertical.clone(),
            horizontal.clone(),
        ]),
        [top, horizontal, bottom] => Some([
            top.clone(),
            horizontal.clone(),
            bottom.clone(),
            horizontal.clone(),
        ]),
        [top, right, bottom, left] => {
            Some([top.clone(), right.clone(), bottom.clone(), left.clone()])
        }
        _ => None,
    }
}

/// `transition: <property> <duration> <timing> <delay>`; времена
/// распределяются позиционно — первое это длительность, второе задержка.
fn expand_transition(value: &str) -> Option<Vec<(PropertyId, CssValue)>> {
    if value.contains(',') {
        // Поддерживается один переход на декларацию; списки не разбираем.
        tracing::debug!("multi-item transition shorthand is not supported: `{value}`");
        return None;
    }

    let mut property: Option<CssValue> = None;
    let mut duration: Option<CssValue> = None;
    let mut delay: Option<CssValue> = None;
    let mut timing: Option<CssValue> = None;

    for part in split_component_values(value) {
        if let Some(time) = parse_time(&part) {
            if duration.is_none() {
                duration = Some(time);
            } else if delay.is_none() {
                delay = Some(time);
            } else {
                return None;
            }
            continue;
        }
        if let Some(easing) = EasingFunction::parse_str(&part) {
            if timing.is_some() {
                return None;
            }
            timing = Some(CssValue::Timing(easing));
            continue;
        }
        if property.is_some() {
            return None;
        }
        property = parse_transition_property(&part);
        property.as_ref()?;
    }

    Some(vec![
        (
            PropertyId::TransitionProperty,
            property.unwrap_or_else(|| PropertyId::TransitionProperty.initial_value()),
        ),
        (
            PropertyId::TransitionDuration,
            duration.unwrap_or_else(|| PropertyId::TransitionDuration.initial_value()),
        ),
        (
            PropertyId::TransitionTimingFunction,
            timing.unwrap_or_else(|| PropertyId::TransitionTimingFunction.initial_value()),
        ),
        (
            PropertyId::TransitionDelay,
            delay.unwrap_or_else(|| PropertyId::TransitionDelay.initial_value()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, value: &str) -> Declaration {
        Declaration {
            name: name.to_string(),
            value: value.to_string(),
            important: false,
        }
    }

    #[test]
    fn test_longhand_roundtrip_names() {
        for &id in PropertyId::ALL {
            assert_eq!(PropertyId::from_name(id.name()), Some(id));
        }
    }

    #[test]
    fn test_margin_shorthand_replication() {
        let two = expand_declaration(&decl("margin", "10px 20px")).unwrap();
        assert_eq!(two.len(), 4);
        assert_eq!(two[0], (PropertyId::MarginTop, CssValue::Length(Length::px(10.0))));
        assert_eq!(two[1], (PropertyId::MarginRight, CssValue::Length(Length::px(20.0))));
        assert_eq!(two[2], (PropertyId::MarginBottom, CssValue::Length(Length::px(10.0))));
        assert_eq!(two[3], (PropertyId::MarginLeft, CssValue::Length(Length::px(20.0))));

        let three = expand_declaration(&decl("margin", "1px 2px 3px")).unwrap();
        assert_eq!(three[3], (PropertyId::MarginLeft, CssValue::Length(Length::px(2.0))));
    }

    #[test]
    fn test_margin_auto_allowed_padding_not() {
        assert!(expand_declaration(&decl("margin", "auto")).is_ok());
        assert!(expand_declaration(&decl("padding", "auto")).is_err());
    }

    #[test]
    fn test_background_position_split() {
        let expanded = expand_declaration(&decl("background-position", "left top")).unwrap();
        assert_eq!(expanded[0], (PropertyId::BackgroundPositionX, CssValue::Percentage(0.0)));
        assert_eq!(expanded[1], (PropertyId::BackgroundPositionY, CssValue::Percentage(0.0)));

        let centered = expand_declaration(&decl("background-position", "10px")).unwrap();
        assert_eq!(
            centered[0],
            (PropertyId::BackgroundPositionX, CssValue::Length(Length::px(10.0)))
        );
        assert_eq!(centered[1], (PropertyId::BackgroundPositionY, CssValue::Percentage(0.5)));
    }

    #[test]
    fn test_transition_shorthand_positional_times() {
        let expanded =
            expand_declaration(&decl("transition", "opacity 0.3s ease-in 0.1s")).unwrap();
        assert!(expanded.contains(&(
            PropertyId::TransitionProperty,
            CssValue::Idents(vec!["opacity".to_string()])
        )));
        assert!(expanded.contains(&(PropertyId::TransitionDuration, CssValue::Time(0.3))));
        assert!(expanded.contains(&(PropertyId::TransitionDelay, CssValue::Time(0.1))));
        assert!(expanded.contains(&(
            PropertyId::TransitionTimingFunction,
            CssValue::Timing(EasingFunction::EaseIn)
        )));
    }

    #[test]
    fn test_cascade_keyword_on_shorthand_hits_all_longhands() {
        let expanded = expand_declaration(&decl("margin", "unset")).unwrap();
        assert_eq!(expanded.len(), 4);
        assert!(expanded.iter().all(|(_, v)| *v == CssValue::Unset));
    }

    #[test]
    fn test_var_in_shorthand_yields_pending_markers() {
        let expanded = expand_declaration(&decl("margin", "var(--m) 4px")).unwrap();
        assert_eq!(expanded.len(), 4);
        for (_, value) in &expanded {
            assert!(matches!(value, CssValue::Pending { shorthand: ShorthandId::Margin, .. }));
        }
    }

    #[test]
    fn test_var_in_longhand_yields_raw() {
        let expanded = expand_declaration(&decl("color", "var(--fg)")).unwrap();
        assert_eq!(expanded.len(), 1);
        assert!(matches!(expanded[0].1, CssValue::Raw(_)));
    }

    #[test]
    fn test_detects_nested_var() {
        assert!(value_contains_var("calc(1px + var(--x))"));
        assert!(!value_contains_var("calc(1px + 2px)"));
        assert!(!value_contains_var("\"var(--x)\""));
    }

    #[test]
    fn test_time_units() {
        assert_eq!(parse_time("250ms"), Some(CssValue::Time(0.25)));
        assert_eq!(parse_time("2s"), Some(CssValue::Time(2.0)));
        assert_eq!(parse_time("2px"), None);
    }

    #[test]
    fn test_font_weight_values() {
        assert_eq!(parse_longhand(PropertyId::FontWeight, "bold").unwrap(), CssValue::Integer(700));
        assert_eq!(parse_longhand(PropertyId::FontWeight, "350").unwrap(), CssValue::Integer(350));
        assert!(parse_longhand(PropertyId::FontWeight, "1200").is_err());
    }

    #[test]
    fn test_font_families_quoting() {
        let families = parse_longhand(PropertyId::FontFamily, "\"PT Sans\", Arial, sans-serif")
            .unwrap();
        assert_eq!(
            families,
            CssValue::FontFamilies(vec![
                "PT Sans".to_string(),
                "Arial".to_string(),
                "sans-serif".to_string()
            ])
        );
    }

    #[test]
    fn test_unknown_property_is_error() {
        let err = expand_declaration(&decl("frobnicate", "1px")).unwrap_err();
        assert!(matches!(err, PropertyParseError::UnknownProperty(_)));
    }
}
