//! Вычисление стиля: от каскадированных значений к вычисленным.
//!
//! Порядок стадий фиксирован: подстановка `var()`, затем шрифт (размер
//! зависит от семейства), затем абсолютизация остальных длин, затем
//! структурные поправки (блокификация, парность overflow,
//! `text-align: match-parent`).

use std::collections::HashMap;

use super::cascade::CascadedValues;
use super::custom::{resolve_custom_properties, substitute};
use super::properties::{parse_longhand, PropertyId};
use super::values::{CssValue, Length, LengthContext, LengthUnit};

/// Полностью вычисленный стиль элемента.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    values: Vec<CssValue>,
    /// Вычисленные кастомные свойства (наследуются детьми).
    pub custom: HashMap<String, String>,
    /// Ключевое слово, из которого получен `font-size`, если размер
    /// не задан явной длиной. Наследуется, чтобы стадия шрифта могла
    /// перебазировать размер на моноширинные 13px у потомков.
    font_size_keyword: Option<String>,
}

impl ComputedStyle {
    /// Стиль из одних начальных значений.
    pub fn initial() -> Self {
        Self {
            values: PropertyId::ALL.iter().map(|id| id.initial_value()).collect(),
            custom: HashMap::new(),
            font_size_keyword: Some("medium".to_string()),
        }
    }

    pub fn get(&self, id: PropertyId) -> &CssValue {
        &self.values[id.index()]
    }

    pub fn set(&mut self, id: PropertyId, value: CssValue) {
        self.values[id.index()] = value;
    }

    /// Ключевое слово свойства, если оно им вычислилось.
    pub fn keyword(&self, id: PropertyId) -> Option<&str> {
        match self.get(id) {
            CssValue::Keyword(word) => Some(word),
            _ => None,
        }
    }

    /// Вычисленный размер шрифта, px.
    pub fn font_size(&self) -> f32 {
        self.get(PropertyId::FontSize)
            .as_length()
            .map(|length| length.value)
            .unwrap_or(Length::DEFAULT_FONT_SIZE)
    }

    /// Вычисленный вес шрифта.
    pub fn font_weight(&self) -> u16 {
        match self.get(PropertyId::FontWeight) {
            CssValue::Integer(weight) => (*weight).clamp(1, 1000) as u16,
            _ => 400,
        }
    }

    pub fn font_families(&self) -> &[String] {
        match self.get(PropertyId::FontFamily) {
            CssValue::FontFamilies(families) => families,
            _ => &[],
        }
    }

    /// Вычисленная математическая глубина.
    pub fn math_depth(&self) -> i32 {
        match self.get(PropertyId::MathDepth) {
            CssValue::Integer(depth) => *depth,
            _ => 0,
        }
    }
}

/// Контекст вычисления одного элемента.
#[derive(Debug, Clone, Copy)]
pub struct ComputeInput<'a> {
    pub parent: Option<&'a ComputedStyle>,
    pub is_root: bool,
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Вычисленный размер шрифта корня (для `rem`).
    pub root_font_size: f32,
}

/// Прогоняет каскадированные значения через весь конвейер.
pub fn compute_style(cascaded: &CascadedValues, input: &ComputeInput) -> ComputedStyle {
    let custom =
        resolve_custom_properties(&cascaded.custom, input.parent.map(|parent| &parent.custom));

    // Масштабирование по math-depth касается только незаданного размера.
    let font_size_specified = !matches!(
        cascaded.get(PropertyId::FontSize),
        None | Some(CssValue::Inherit | CssValue::Unset | CssValue::Revert | CssValue::RevertLayer)
    );

    // Подстановка и дефолтинг.
    let mut values: Vec<CssValue> = Vec::with_capacity(PropertyId::COUNT);
    for &id in PropertyId::ALL {
        let value = match cascaded.get(id) {
            Some(value) if value.needs_substitution() => {
                substitute_value(id, value.clone(), &custom)
            }
            Some(value) => value.clone(),
            None => CssValue::Unset,
        };
        values.push(default_value(id, value, input.parent));
    }

    let mut style = ComputedStyle { values, custom, font_size_keyword: None };

    let math_delta = compute_math_depth(&mut style, input);
    compute_font(&mut style, input, math_delta, font_size_specified);
    absolutize(&mut style, input);
    transform_box_type(&mut style, input);
    pair_overflow(&mut style);
    resolve_text_align(&mut style, input);

    style
}

/// Разворачивает `var()` и перечитывает значение лонгхенда.
fn substitute_value(
    id: PropertyId,
    value: CssValue,
    custom: &HashMap<String, String>,
) -> CssValue {
    let (text, from_shorthand) = match value {
        CssValue::Raw(text) => (text, None),
        CssValue::Pending { shorthand, text } => (text, Some(shorthand)),
        other => return other,
    };

    let substituted = match substitute(&text, custom) {
        Ok(substituted) => substituted,
        Err(err) => {
            tracing::debug!("`{}`: {err}", id.name());
            return CssValue::GuaranteedInvalid;
        }
    };

    if let Some(keyword) = cascade_keyword(&substituted) {
        return keyword;
    }

    let parsed = match from_shorthand {
        Some(shorthand) => shorthand.expand(&substituted).map(|pairs| {
            pairs
                .into_iter()
                .find(|(longhand, _)| *longhand == id)
                .map(|(_, value)| value)
                .unwrap_or(CssValue::GuaranteedInvalid)
        }),
        None => parse_longhand(id, &substituted),
    };

    match parsed {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("substituted value rejected: {err}");
            CssValue::GuaranteedInvalid
        }
    }
}

fn cascade_keyword(text: &str) -> Option<CssValue> {
    match text.trim().to_ascii_lowercase().as_str() {
        "initial" => Some(CssValue::Initial),
        "inherit" => Some(CssValue::Inherit),
        // Снимки каскада уже недоступны, остаётся поведение `unset`.
        "unset" | "revert" | "revert-layer" => Some(CssValue::Unset),
        _ => None,
    }
}

/// Дефолтинг: наследование и начальные значения.
fn default_value(id: PropertyId, value: CssValue, parent: Option<&ComputedStyle>) -> CssValue {
    match value {
        CssValue::Inherit => inherited_value(id, parent),
        CssValue::Initial => initial_for(id),
        CssValue::Unset | CssValue::GuaranteedInvalid | CssValue::Revert | CssValue::RevertLayer => {
            if id.is_inherited() {
                inherited_value(id, parent)
            } else {
                initial_for(id)
            }
        }
        other => other,
    }
}

fn inherited_value(id: PropertyId, parent: Option<&ComputedStyle>) -> CssValue {
    match parent {
        Some(parent) => {
            // Ключевая природа font-size переживает наследование:
            // потомок перечитает слово против базы своего семейства.
            if id == PropertyId::FontSize {
                if let Some(keyword) = &parent.font_size_keyword {
                    return CssValue::keyword(keyword);
                }
            }
            parent.get(id).clone()
        }
        None => initial_for(id),
    }
}

/// Начальное значение с поправкой: `font-size` остаётся ключевым
/// словом `medium`, чтобы стадия шрифта могла выбрать базу 13px для
/// моноширинного семейства.
fn initial_for(id: PropertyId) -> CssValue {
    if id == PropertyId::FontSize {
        CssValue::keyword("medium")
    } else {
        id.initial_value()
    }
}

/// Масштаб шрифта на один уровень математической вложенности.
const MATH_FONT_SCALE: f32 = 0.71;

/// Разрешает `math-depth` относительно родителя; возвращает смещение
/// глубины для стадии шрифта.
fn compute_math_depth(style: &mut ComputedStyle, input: &ComputeInput) -> i32 {
    let parent_depth = input.parent.map(|parent| parent.math_depth()).unwrap_or(0);
    let depth = match style.get(PropertyId::MathDepth) {
        CssValue::Integer(depth) => *depth,
        CssValue::Keyword(word) if word == "auto-add" => parent_depth + 1,
        _ => parent_depth,
    };
    style.set(PropertyId::MathDepth, CssValue::Integer(depth));
    depth - parent_depth
}

fn compute_font(
    style: &mut ComputedStyle,
    input: &ComputeInput,
    math_delta: i32,
    font_size_specified: bool,
) {
    let parent_font_size = input
        .parent
        .map(|parent| parent.font_size())
        .unwrap_or(Length::DEFAULT_FONT_SIZE);

    let monospace = style
        .font_families()
        .first()
        .is_some_and(|family| family.eq_ignore_ascii_case("monospace"));
    let default_size = if monospace {
        Length::DEFAULT_MONOSPACE_FONT_SIZE
    } else {
        Length::DEFAULT_FONT_SIZE
    };

    let ctx = LengthContext {
        font_size: parent_font_size,
        root_font_size: input.root_font_size,
        viewport_width: input.viewport_width,
        viewport_height: input.viewport_height,
    };

    let (mut font_size, mut keyword) = match style.get(PropertyId::FontSize) {
        CssValue::Length(length) => (length.to_px(&ctx), None),
        CssValue::Percentage(fraction) => (parent_font_size * fraction, None),
        CssValue::Keyword(keyword) => {
            match font_size_keyword(keyword, default_size, parent_font_size) {
                Some(size) => {
                    // `smaller`/`larger` относительны и слово не сохраняют.
                    let retained = match keyword.as_str() {
                        "smaller" | "larger" => None,
                        word => Some(word.to_string()),
                    };
                    (size, retained)
                }
                None => (default_size, None),
            }
        }
        _ => (default_size, None),
    };

    // Вложенный математический контент уменьшает незаданный размер.
    if math_delta != 0 && !font_size_specified {
        font_size *= MATH_FONT_SCALE.powi(math_delta);
        keyword = None;
    }

    style.set(PropertyId::FontSize, CssValue::Length(Length::px(font_size)));
    style.font_size_keyword = keyword;

    let parent_weight = input
        .parent
        .map(|parent| parent.font_weight() as i32)
        .unwrap_or(400);
    let weight = match style.get(PropertyId::FontWeight) {
        CssValue::Integer(weight) => (*weight).clamp(1, 1000),
        CssValue::Keyword(keyword) => match keyword.as_str() {
            "bolder" => {
                if parent_weight < 350 {
                    400
                } else if parent_weight < 550 {
                    700
                } else {
                    900
                }
            }
            "lighter" => {
                if parent_weight < 550 {
                    100
                } else if parent_weight < 750 {
                    400
                } else {
                    700
                }
            }
            _ => 400,
        },
        _ => 400,
    };
    style.set(PropertyId::FontWeight, CssValue::Integer(weight));
}

/// Доли базового размера для ключевых слов `font-size`.
fn font_size_keyword(keyword: &str, default_size: f32, parent_size: f32) -> Option<f32> {
    let fraction = match keyword {
        "xx-small" => 3.0 / 5.0,
        "x-small" => 3.0 / 4.0,
        "small" => 8.0 / 9.0,
        "medium" => 1.0,
        "large" => 6.0 / 5.0,
        "x-large" => 3.0 / 2.0,
        "xx-large" => 2.0,
        "xxx-large" => 3.0,
        "smaller" => return Some(parent_size * 4.0 / 5.0),
        "larger" => return Some(parent_size * 5.0 / 4.0),
        _ => return None,
    };
    Some(default_size * fraction)
}

fn absolutize(style: &mut ComputedStyle, input: &ComputeInput) {
    let font_size = style.font_size();
    let ctx = LengthContext {
        font_size,
        root_font_size: input.root_font_size,
        viewport_width: input.viewport_width,
        viewport_height: input.viewport_height,
    };

    for &id in PropertyId::ALL {
        if id == PropertyId::FontSize {
            continue;
        }
        let value = style.get(id).clone();
        let resolved = match (id, value) {
            // Число и процент в line-height считаются от своего шрифта.
            (PropertyId::LineHeight, CssValue::Number(n)) => {
                CssValue::Length(Length::px(font_size * n))
            }
            (PropertyId::LineHeight, CssValue::Percentage(fraction)) => {
                CssValue::Length(Length::px(font_size * fraction))
            }
            (_, CssValue::Length(length)) if length.unit != LengthUnit::Px => {
                CssValue::Length(Length::px(length.to_px(&ctx)))
            }
            (_, other) => other,
        };
        style.set(id, resolved);
    }
}

/// Блокификация: корень, флоаты и абсолютное позиционирование не
/// бывают строчными.
fn transform_box_type(style: &mut ComputedStyle, input: &ComputeInput) {
    let floated = style
        .keyword(PropertyId::Float)
        .is_some_and(|float| float != "none");
    let out_of_flow = matches!(
        style.keyword(PropertyId::Position),
        Some("absolute" | "fixed")
    );
    if !(input.is_root || floated || out_of_flow) {
        return;
    }

    let blockified = match style.keyword(PropertyId::Display) {
        Some("inline" | "inline-block") => "block",
        Some("inline-flex") => "flex",
        Some("inline-grid") => "grid",
        Some("inline-table") => "table",
        _ => return,
    };
    style.set(PropertyId::Display, CssValue::keyword(blockified));
}

/// `visible` в паре со скроллируемой осью становится `auto`.
fn pair_overflow(style: &mut ComputedStyle) {
    let x_visible = style.keyword(PropertyId::OverflowX) == Some("visible");
    let y_visible = style.keyword(PropertyId::OverflowY) == Some("visible");
    if x_visible && !y_visible {
        style.set(PropertyId::OverflowX, CssValue::keyword("auto"));
    } else if y_visible && !x_visible {
        style.set(PropertyId::OverflowY, CssValue::keyword("auto"));
    }
}

fn resolve_text_align(style: &mut ComputedStyle, input: &ComputeInput) {
    if style.keyword(PropertyId::TextAlign) != Some("match-parent") {
        return;
    }
    let resolved = input
        .parent
        .and_then(|parent| parent.keyword(PropertyId::TextAlign))
        .unwrap_or("start");
    style.set(PropertyId::TextAlign, CssValue::keyword(resolved));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::properties::{expand_declaration, Declaration};
    use crate::style::values::Color;

    fn cascaded(entries: &[(&str, &str)]) -> CascadedValues {
        let mut values = CascadedValues::new();
        for (name, value) in entries {
            let declaration = Declaration {
                name: name.to_string(),
                value: value.to_string(),
                important: false,
            };
            if declaration.is_custom() {
                values.custom.insert(declaration.name, declaration.value);
                continue;
            }
            for (id, value) in expand_declaration(&declaration).unwrap() {
                values.set(id, value);
            }
        }
        values
    }

    fn input<'a>(parent: Option<&'a ComputedStyle>, is_root: bool) -> ComputeInput<'a> {
        ComputeInput {
            parent,
            is_root,
            viewport_width: 800.0,
            viewport_height: 600.0,
            root_font_size: 16.0,
        }
    }

    fn root_style(entries: &[(&str, &str)]) -> ComputedStyle {
        compute_style(&cascaded(entries), &input(None, true))
    }

    fn length_px(style: &ComputedStyle, id: PropertyId) -> Option<f32> {
        style.get(id).as_length().map(|length| length.value)
    }

    #[test]
    fn test_inherited_and_initial_defaults() {
        let parent = root_style(&[("color", "red"), ("width", "100px")]);
        let child = compute_style(&cascaded(&[]), &input(Some(&parent), false));
        // color наследуется, width — нет.
        assert_eq!(child.get(PropertyId::Color).as_color(), Some(Color::rgb(255, 0, 0)));
        assert!(child.get(PropertyId::Width).is_keyword("auto"));
    }

    #[test]
    fn test_unset_dual_semantics() {
        let parent = root_style(&[("color", "red"), ("width", "100px")]);
        let child = compute_style(
            &cascaded(&[("color", "unset"), ("width", "unset")]),
            &input(Some(&parent), false),
        );
        assert_eq!(child.get(PropertyId::Color).as_color(), Some(Color::rgb(255, 0, 0)));
        assert!(child.get(PropertyId::Width).is_keyword("auto"));
    }

    #[test]
    fn test_em_and_rem_absolutization() {
        let parent = root_style(&[("font-size", "20px")]);
        let child = compute_style(
            &cascaded(&[("font-size", "2em"), ("width", "3em"), ("height", "2rem")]),
            &input(Some(&parent), false),
        );
        // em в font-size считается от родителя, в остальном — от себя.
        assert_eq!(child.font_size(), 40.0);
        assert_eq!(length_px(&child, PropertyId::Width), Some(120.0));
        assert_eq!(length_px(&child, PropertyId::Height), Some(32.0));
    }

    #[test]
    fn test_font_size_percentage_and_keywords() {
        let parent = root_style(&[("font-size", "20px")]);
        let percent = compute_style(
            &cascaded(&[("font-size", "150%")]),
            &input(Some(&parent), false),
        );
        assert_eq!(percent.font_size(), 30.0);

        let larger = compute_style(
            &cascaded(&[("font-size", "larger")]),
            &input(Some(&parent), false),
        );
        assert_eq!(larger.font_size(), 25.0);

        let xx_large = root_style(&[("font-size", "xx-large")]);
        assert_eq!(xx_large.font_size(), 32.0);
    }

    #[test]
    fn test_monospace_default_size() {
        let style = root_style(&[("font-family", "monospace")]);
        assert_eq!(style.font_size(), 13.0);

        let medium = root_style(&[("font-family", "monospace"), ("font-size", "medium")]);
        assert_eq!(medium.font_size(), 13.0);

        // Явный размер в px базой не корректируется.
        let explicit = root_style(&[("font-family", "monospace"), ("font-size", "16px")]);
        assert_eq!(explicit.font_size(), 16.0);
    }

    #[test]
    fn test_monospace_base_inherited_through_keyword() {
        let parent = root_style(&[]);
        let child = compute_style(
            &cascaded(&[("font-family", "monospace")]),
            &input(Some(&parent), false),
        );
        // Размер не задан: наследуется слово medium и перебазируется на 13px.
        assert_eq!(child.font_size(), 13.0);

        // Явная длина родителя наследуется как длина, база не меняет её.
        let sized = root_style(&[("font-size", "20px")]);
        let child = compute_style(
            &cascaded(&[("font-family", "monospace")]),
            &input(Some(&sized), false),
        );
        assert_eq!(child.font_size(), 20.0);

        // Словесный размер родителя перечитывается против базы 13px.
        let large = root_style(&[("font-size", "xx-large")]);
        let child = compute_style(
            &cascaded(&[("font-family", "monospace")]),
            &input(Some(&large), false),
        );
        assert_eq!(child.font_size(), 26.0);
    }

    #[test]
    fn test_math_depth_scales_unspecified_font_size() {
        let parent = root_style(&[]);
        let nested = compute_style(
            &cascaded(&[("math-depth", "auto-add")]),
            &input(Some(&parent), false),
        );
        assert_eq!(nested.math_depth(), 1);
        assert!((nested.font_size() - 16.0 * MATH_FONT_SCALE).abs() < 0.001);

        // Явный размер глубиной не трогается.
        let explicit = compute_style(
            &cascaded(&[("math-depth", "auto-add"), ("font-size", "20px")]),
            &input(Some(&parent), false),
        );
        assert_eq!(explicit.math_depth(), 1);
        assert_eq!(explicit.font_size(), 20.0);

        // Абсолютная глубина задаёт уровень, смещение считается от родителя.
        let deeper = compute_style(&cascaded(&[("math-depth", "2")]), &input(Some(&parent), false));
        assert_eq!(deeper.math_depth(), 2);
        assert!((deeper.font_size() - 16.0 * MATH_FONT_SCALE * MATH_FONT_SCALE).abs() < 0.001);

        // Унаследованная глубина смещения не даёт.
        let sibling_level = compute_style(&cascaded(&[]), &input(Some(&nested), false));
        assert_eq!(sibling_level.math_depth(), 1);
        assert_eq!(sibling_level.font_size(), nested.font_size());
    }

    #[test]
    fn test_pt_conversion() {
        let style = root_style(&[("font-size", "12pt")]);
        assert_eq!(style.font_size(), 16.0);
    }

    #[test]
    fn test_line_height_number_and_percent() {
        let style = root_style(&[("font-size", "20px"), ("line-height", "1.5")]);
        assert_eq!(length_px(&style, PropertyId::LineHeight), Some(30.0));

        let percent = root_style(&[("font-size", "20px"), ("line-height", "120%")]);
        assert_eq!(length_px(&percent, PropertyId::LineHeight), Some(24.0));
    }

    #[test]
    fn test_bolder_and_lighter() {
        let parent = root_style(&[("font-weight", "400")]);
        let bolder = compute_style(
            &cascaded(&[("font-weight", "bolder")]),
            &input(Some(&parent), false),
        );
        assert_eq!(bolder.font_weight(), 700);

        let heavy = root_style(&[("font-weight", "700")]);
        let lighter = compute_style(
            &cascaded(&[("font-weight", "lighter")]),
            &input(Some(&heavy), false),
        );
        assert_eq!(lighter.font_weight(), 400);
    }

    #[test]
    fn test_blockification() {
        let root = root_style(&[("display", "inline")]);
        assert_eq!(root.keyword(PropertyId::Display), Some("block"));

        let parent = root_style(&[]);
        let floated = compute_style(
            &cascaded(&[("display", "inline"), ("float", "left")]),
            &input(Some(&parent), false),
        );
        assert_eq!(floated.keyword(PropertyId::Display), Some("block"));

        let absolute = compute_style(
            &cascaded(&[("display", "inline-flex"), ("position", "absolute")]),
            &input(Some(&parent), false),
        );
        assert_eq!(absolute.keyword(PropertyId::Display), Some("flex"));

        let plain = compute_style(
            &cascaded(&[("display", "inline")]),
            &input(Some(&parent), false),
        );
        assert_eq!(plain.keyword(PropertyId::Display), Some("inline"));
    }

    #[test]
    fn test_overflow_pairing() {
        let style = root_style(&[("overflow-y", "scroll")]);
        assert_eq!(style.keyword(PropertyId::OverflowX), Some("auto"));
        assert_eq!(style.keyword(PropertyId::OverflowY), Some("scroll"));

        let both_visible = root_style(&[]);
        assert_eq!(both_visible.keyword(PropertyId::OverflowX), Some("visible"));
        assert_eq!(both_visible.keyword(PropertyId::OverflowY), Some("visible"));
    }

    #[test]
    fn test_text_align_match_parent() {
        let parent = root_style(&[("text-align", "center")]);
        let child = compute_style(
            &cascaded(&[("text-align", "match-parent")]),
            &input(Some(&parent), false),
        );
        assert_eq!(child.keyword(PropertyId::TextAlign), Some("center"));

        let root = root_style(&[("text-align", "match-parent")]);
        assert_eq!(root.keyword(PropertyId::TextAlign), Some("start"));
    }

    #[test]
    fn test_var_substitution_in_compute() {
        let style = root_style(&[("--gap", "25px"), ("margin", "var(--gap) 10px")]);
        assert_eq!(length_px(&style, PropertyId::MarginTop), Some(25.0));
        assert_eq!(length_px(&style, PropertyId::MarginRight), Some(10.0));
    }

    #[test]
    fn test_failed_substitution_behaves_as_unset() {
        let parent = root_style(&[("color", "red")]);
        let child = compute_style(
            &cascaded(&[("color", "var(--missing)"), ("width", "var(--missing)")]),
            &input(Some(&parent), false),
        );
        // color наследуемое, width падает в начальное.
        assert_eq!(child.get(PropertyId::Color).as_color(), Some(Color::rgb(255, 0, 0)));
        assert!(child.get(PropertyId::Width).is_keyword("auto"));
    }

    #[test]
    fn test_custom_properties_inherited_through_compute() {
        let parent = root_style(&[("--brand", "red")]);
        let child = compute_style(
            &cascaded(&[("color", "var(--brand)")]),
            &input(Some(&parent), false),
        );
        assert_eq!(child.get(PropertyId::Color).as_color(), Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_viewport_units() {
        let style = root_style(&[("width", "50vw"), ("height", "10vh")]);
        assert_eq!(length_px(&style, PropertyId::Width), Some(400.0));
        assert_eq!(length_px(&style, PropertyId::Height), Some(60.0));
    }
}
