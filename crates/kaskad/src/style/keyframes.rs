//! Группы ключевых кадров (`@keyframes`) и выборка значений по прогрессу.
//!
//! Кадры хранят декларации в сыром виде, как и обычные правила;
//! раскрытие в лонгхенды происходит при выборке. Интерполяция между
//! кадрами идёт тем же механизмом, что и в переходах.

use cssparser::{Parser, Token};

use super::parser::parse_declarations_from_parser;
use super::properties::{expand_declaration, Declaration, PropertyId};
use super::transitions::interpolate;
use super::values::CssValue;

/// Один ключевой кадр: позиция на шкале анимации и декларации.
#[derive(Debug, Clone)]
pub struct Keyframe {
    /// Доля длительности: 0.0 — `from`, 1.0 — `to`.
    pub offset: f32,
    pub declarations: Vec<Declaration>,
}

/// Именованная группа кадров из `@keyframes`.
#[derive(Debug, Clone)]
pub struct KeyframesRule {
    pub name: String,
    /// Кадры в порядке возрастания `offset`.
    pub keyframes: Vec<Keyframe>,
}

impl KeyframesRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), keyframes: Vec::new() }
    }

    pub fn push(&mut self, keyframe: Keyframe) {
        self.keyframes.push(keyframe);
        self.keyframes.sort_by(|a, b| a.offset.total_cmp(&b.offset));
    }

    /// Парсит тело блока `@keyframes` (после имени).
    ///
    /// Селектор кадра — проценты либо `from`/`to`, допускается список
    /// через запятую: `from, 50% { ... }` даёт два кадра с общими
    /// декларациями.
    pub(super) fn parse_block<'i>(
        name: String,
        input: &mut Parser<'i, '_>,
    ) -> Result<Self, cssparser::ParseError<'i, ()>> {
        let mut rule = Self::new(name);

        loop {
            input.skip_whitespace();
            if input.is_exhausted() {
                break;
            }

            let mut offsets = vec![parse_offset(input)?];
            while input.try_parse(|nested| nested.expect_comma()).is_ok() {
                offsets.push(parse_offset(input)?);
            }

            match input.next() {
                Ok(Token::CurlyBracketBlock) => {}
                Ok(_) => return Err(input.new_custom_error(())),
                Err(err) => return Err(err.into()),
            }
            let declarations =
                input.parse_nested_block(|nested| Ok(parse_declarations_from_parser(nested)))?;

            for offset in offsets {
                rule.push(Keyframe { offset, declarations: declarations.clone() });
            }
        }

        Ok(rule)
    }

    /// Значения свойств в точке `progress` (0..1).
    ///
    /// Для каждого свойства берутся ближайшие кадры по обе стороны от
    /// точки — кадр без этого свойства прозрачен, как того требует
    /// модель анимаций. До первого кадра и после последнего значение
    /// держится постоянным.
    pub fn sample(&self, progress: f32) -> Vec<(PropertyId, CssValue)> {
        let t = progress.clamp(0.0, 1.0);
        let frames: Vec<(f32, Vec<(PropertyId, CssValue)>)> = self
            .keyframes
            .iter()
            .map(|frame| (frame.offset, expand_keyframe(frame)))
            .collect();

        let mut out: Vec<(PropertyId, CssValue)> = Vec::new();
        for (index, (_, values)) in frames.iter().enumerate() {
            for (property, _) in values {
                if out.iter().any(|(seen, _)| seen == property) {
                    continue;
                }
                if let Some(value) = sample_property(&frames, index, *property, t) {
                    out.push((*property, value));
                }
            }
        }
        out
    }
}

/// Раскрывает декларации кадра в лонгхенды; поздние побеждают.
fn expand_keyframe(frame: &Keyframe) -> Vec<(PropertyId, CssValue)> {
    let mut values: Vec<(PropertyId, CssValue)> = Vec::new();
    for declaration in &frame.declarations {
        if declaration.is_custom() {
            continue;
        }
        let Ok(expanded) = expand_declaration(declaration) else {
            continue;
        };
        for (property, value) in expanded {
            match values.iter().position(|(seen, _)| *seen == property) {
                Some(index) => values[index].1 = value,
                None => values.push((property, value)),
            }
        }
    }
    values
}

/// Интерполирует одно свойство по окружающим его кадрам.
fn sample_property(
    frames: &[(f32, Vec<(PropertyId, CssValue)>)],
    first_index: usize,
    property: PropertyId,
    t: f32,
) -> Option<CssValue> {
    let mut prev: Option<(f32, &CssValue)> = None;
    let mut next: Option<(f32, &CssValue)> = None;
    for (offset, values) in &frames[first_index..] {
        let Some((_, value)) = values.iter().find(|(id, _)| *id == property) else {
            continue;
        };
        if *offset <= t {
            prev = Some((*offset, value));
        } else if next.is_none() {
            next = Some((*offset, value));
        }
    }

    match (prev, next) {
        (Some((from_offset, from)), Some((to_offset, to))) => {
            let range = to_offset - from_offset;
            let local = if range > 0.0 { (t - from_offset) / range } else { 1.0 };
            Some(interpolate(from, to, local))
        }
        (Some((_, value)), None) | (None, Some((_, value))) => Some(value.clone()),
        (None, None) => None,
    }
}

/// Селектор кадра: проценты или `from`/`to`.
fn parse_offset<'i>(input: &mut Parser<'i, '_>) -> Result<f32, cssparser::ParseError<'i, ()>> {
    let token = input.next()?.clone();
    match token {
        Token::Percentage { unit_value, .. } => Ok(unit_value.clamp(0.0, 1.0)),
        Token::Ident(ident) => match ident.to_ascii_lowercase().as_str() {
            "from" => Ok(0.0),
            "to" => Ok(1.0),
            _ => Err(input.new_custom_error(())),
        },
        _ => Err(input.new_custom_error(())),
    }
}
