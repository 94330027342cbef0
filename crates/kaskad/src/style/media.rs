//! Простые медиа-условия по размерам вьюпорта.
//!
//! Поддерживается прелюдия вида `screen and (min-width: 768px)`:
//! тип носителя плюс конъюнкция условий width/height.

use super::values::{Length, LengthContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaFeature {
    Width,
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaComparison {
    Min,
    Max,
    Exact,
}

#[derive(Debug, Clone, PartialEq)]
struct MediaCondition {
    feature: MediaFeature,
    comparison: MediaComparison,
    length: Length,
}

/// Медиа-запрос из прелюдии `@media`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQuery {
    /// Тип носителя (`all`/`screen`/`print`...); `None` — любой.
    media_type: Option<String>,
    conditions: Vec<MediaCondition>,
}

impl MediaQuery {
    /// Запрос, не совпадающий ни с одним вьюпортом. Используется для
    /// прелюдий с нераспознанными условиями: блок парсится, но его
    /// правила никогда не применяются.
    pub fn never() -> Self {
        Self { media_type: Some(String::new()), conditions: Vec::new() }
    }

    /// Разбирает прелюдию. Неизвестные условия делают запрос
    /// невалидным (`None`), и блок не применяется.
    pub fn parse(prelude: &str) -> Option<Self> {
        let mut media_type = None;
        let mut conditions = Vec::new();

        for part in split_on_and(prelude) {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            if part.starts_with('(') {
                let inner = part.strip_prefix('(')?.strip_suffix(')')?;
                conditions.push(parse_condition(inner)?);
            } else {
                if media_type.is_some() {
                    return None;
                }
                media_type = Some(part.to_ascii_lowercase());
            }
        }

        Some(Self { media_type, conditions })
    }

    /// Вычисляет запрос для данного вьюпорта.
    pub fn evaluate(&self, viewport_width: f32, viewport_height: f32) -> bool {
        if let Some(media_type) = &self.media_type {
            // Движок ведёт себя как экранный носитель.
            match media_type.as_str() {
                "all" | "screen" => {}
                _ => return false,
            }
        }

        let ctx = LengthContext {
            viewport_width,
            viewport_height,
            ..LengthContext::default()
        };

        self.conditions.iter().all(|condition| {
            let actual = match condition.feature {
                MediaFeature::Width => viewport_width,
                MediaFeature::Height => viewport_height,
            };
            let expected = condition.length.to_px(&ctx);
            match condition.comparison {
                MediaComparison::Min => actual >= expected,
                MediaComparison::Max => actual <= expected,
                MediaComparison::Exact => (actual - expected).abs() < 0.5,
            }
        })
    }
}

fn split_on_and(text: &str) -> Vec<&str> {
    text.split(" and ").collect()
}

fn parse_condition(inner: &str) -> Option<MediaCondition> {
    let (name, value) = inner.split_once(':')?;
    let (comparison, feature) = match name.trim().to_ascii_lowercase().as_str() {
        "min-width" => (MediaComparison::Min, MediaFeature::Width),
        "max-width" => (MediaComparison::Max, MediaFeature::Width),
        "width" => (MediaComparison::Exact, MediaFeature::Width),
        "min-height" => (MediaComparison::Min, MediaFeature::Height),
        "max-height" => (MediaComparison::Max, MediaFeature::Height),
        "height" => (MediaComparison::Exact, MediaFeature::Height),
        _ => return None,
    };

    let value = value.trim();
    let length = parse_length(value)?;
    Some(MediaCondition { feature, comparison, length })
}

fn parse_length(value: &str) -> Option<Length> {
    use super::values::CssValue;
    match super::properties::parse_longhand(super::properties::PropertyId::Width, value) {
        Ok(CssValue::Length(length)) => Some(length),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_width() {
        let query = MediaQuery::parse("(min-width: 768px)").unwrap();
        assert!(query.evaluate(800.0, 600.0));
        assert!(!query.evaluate(700.0, 600.0));
        assert!(query.evaluate(768.0, 600.0));
    }

    #[test]
    fn test_combined_conditions() {
        let query = MediaQuery::parse("screen and (min-width: 400px) and (max-height: 500px)")
            .unwrap();
        assert!(query.evaluate(500.0, 400.0));
        assert!(!query.evaluate(500.0, 600.0));
        assert!(!query.evaluate(300.0, 400.0));
    }

    #[test]
    fn test_print_never_matches() {
        let query = MediaQuery::parse("print").unwrap();
        assert!(!query.evaluate(800.0, 600.0));
    }

    #[test]
    fn test_unknown_feature_is_invalid() {
        assert!(MediaQuery::parse("(aspect-ratio: 16/9)").is_none());
    }
}
