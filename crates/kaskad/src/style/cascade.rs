//! Каскад: порядок проходов по происхождениям, слои и `revert`.
//!
//! Нормальные проходы идут от UA к автору, important-проходы — в
//! обратном порядке; внутри происхождения правила сортируются по
//! (порядок слоя, специфичность, порядок в исходнике). Снимки
//! состояния между проходами дают семантику `revert`/`revert-layer`.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::dom::Element;

use super::cache::MatchedRule;
use super::properties::{expand_declaration, Declaration, PropertyId};
use super::values::CssValue;

/// Происхождение таблицы стилей.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CascadeOrigin {
    UserAgent,
    User,
    Author,
}

impl CascadeOrigin {
    fn index(self) -> usize {
        match self {
            CascadeOrigin::UserAgent => 0,
            CascadeOrigin::User => 1,
            CascadeOrigin::Author => 2,
        }
    }
}

/// Результат каскада: значение на лонгхенд плюс карта кастомных
/// свойств (ещё сырых, до подстановки).
#[derive(Debug, Clone)]
pub struct CascadedValues {
    values: Vec<Option<CssValue>>,
    pub custom: HashMap<String, String>,
}

impl Default for CascadedValues {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadedValues {
    pub fn new() -> Self {
        Self {
            values: vec![None; PropertyId::COUNT],
            custom: HashMap::new(),
        }
    }

    pub fn get(&self, id: PropertyId) -> Option<&CssValue> {
        self.values[id.index()].as_ref()
    }

    pub fn set(&mut self, id: PropertyId, value: CssValue) {
        self.values[id.index()] = Some(value);
    }
}

/// Прогоняет совпавшие правила через все шесть проходов каскада.
///
/// `hints` — декларации презентационных атрибутов HTML: отдельная
/// ступень между пользовательским и авторским проходами. Авторский
/// `revert` откатывается сквозь неё, и important-прохода у неё нет.
/// `inline` — декларации атрибута `style`: авторское происхождение,
/// максимальная специфичность, после всех авторских правил.
pub fn cascade(
    matched: &[MatchedRule],
    hints: &[Declaration],
    inline: &[Declaration],
) -> CascadedValues {
    let mut values = CascadedValues::new();
    let mut origin_snapshots: Vec<CascadedValues> = Vec::with_capacity(3);

    for origin in [CascadeOrigin::UserAgent, CascadeOrigin::User, CascadeOrigin::Author] {
        let snapshot = values.clone();
        if origin == CascadeOrigin::Author {
            apply_declarations(&mut values, hints, false, &snapshot, &snapshot);
        }
        let mut rules: Vec<&MatchedRule> =
            matched.iter().filter(|m| m.origin == origin).collect();
        rules.sort_by_key(|m| (m.layer_order, m.specificity, m.source_order));
        apply_pass(&mut values, &rules, false, &snapshot);

        if origin == CascadeOrigin::Author {
            let layer_snapshot = values.clone();
            apply_declarations(&mut values, inline, false, &snapshot, &layer_snapshot);
        }
        origin_snapshots.push(snapshot);
    }

    for origin in [CascadeOrigin::Author, CascadeOrigin::User, CascadeOrigin::UserAgent] {
        let snapshot = origin_snapshots[origin.index()].clone();
        let mut rules: Vec<&MatchedRule> =
            matched.iter().filter(|m| m.origin == origin).collect();
        // Слои в important-проходе идут в обратном порядке, и записи
        // вне слоёв (`u32::MAX`) применяются первыми.
        rules.sort_by_key(|m| (Reverse(m.layer_order), m.specificity, m.source_order));
        apply_pass(&mut values, &rules, true, &snapshot);

        if origin == CascadeOrigin::Author {
            let layer_snapshot = values.clone();
            apply_declarations(&mut values, inline, true, &snapshot, &layer_snapshot);
        }
    }

    values
}

/// Декларации из презентационных атрибутов HTML (`width`, `height`,
/// `bgcolor`, `align`).
pub fn presentational_hints(element: &Element) -> Vec<Declaration> {
    let mut hints = Vec::new();
    let mut push = |name: &str, value: String| {
        hints.push(Declaration { name: name.to_string(), value, important: false });
    };

    if let Some(value) = element.attribute("width").and_then(dimension_hint) {
        push("width", value);
    }
    if let Some(value) = element.attribute("height").and_then(dimension_hint) {
        push("height", value);
    }
    if let Some(color) = element.attribute("bgcolor") {
        let color = color.trim();
        if !color.is_empty() {
            push("background-color", color.to_string());
        }
    }
    if let Some(align) = element.attribute("align") {
        let align = align.trim().to_ascii_lowercase();
        if matches!(align.as_str(), "left" | "right" | "center" | "justify") {
            push("text-align", align);
        }
    }
    hints
}

/// HTML-размер: голое число означает пиксели, проценты остаются.
fn dimension_hint(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        percent.parse::<f32>().ok()?;
        return Some(trimmed.to_string());
    }
    trimmed.parse::<f32>().ok().map(|pixels| format!("{pixels}px"))
}

fn apply_pass(
    values: &mut CascadedValues,
    rules: &[&MatchedRule],
    important: bool,
    origin_snapshot: &CascadedValues,
) {
    let mut layer_snapshot = values.clone();
    let mut current_layer: Option<u32> = None;

    for matched in rules {
        if current_layer != Some(matched.layer_order) {
            layer_snapshot = values.clone();
            current_layer = Some(matched.layer_order);
        }
        apply_declarations(
            values,
            &matched.rule.declarations,
            important,
            origin_snapshot,
            &layer_snapshot,
        );
    }
}

fn apply_declarations(
    values: &mut CascadedValues,
    declarations: &[Declaration],
    important: bool,
    origin_snapshot: &CascadedValues,
    layer_snapshot: &CascadedValues,
) {
    for declaration in declarations {
        if declaration.important != important {
            continue;
        }
        if declaration.is_custom() {
            values
                .custom
                .insert(declaration.name.clone(), declaration.value.clone());
            continue;
        }
        let Ok(expanded) = expand_declaration(declaration) else {
            continue;
        };
        for (id, value) in expanded {
            let resolved = match value {
                CssValue::Revert => origin_snapshot
                    .get(id)
                    .cloned()
                    .unwrap_or(CssValue::Unset),
                CssValue::RevertLayer => layer_snapshot
                    .get(id)
                    .cloned()
                    .unwrap_or(CssValue::Unset),
                other => other,
            };
            values.set(id, resolved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, ScopeId};
    use crate::style::cache::RuleCache;
    use crate::style::parser::{parse_inline_declarations, CssParseOptions, Stylesheet};
    use std::sync::Arc;

    fn cascade_with_hints(
        ua: &str,
        user: &str,
        author: &str,
        hints: &[Declaration],
        inline: &str,
    ) -> CascadedValues {
        let mut doc = Document::new();
        let root = doc.create_root("div");

        let parse = |css: &str| {
            vec![Arc::new(
                Stylesheet::parse(css, CssParseOptions::default()).unwrap(),
            )]
        };
        let author: Vec<_> = parse(author)
            .into_iter()
            .map(|sheet| (sheet, ScopeId::Document))
            .collect();
        let cache = RuleCache::build(&parse(ua), &parse(user), &author, 800.0, 600.0);
        let matched = cache.collect_matching(&doc, root, None, None);
        let inline = parse_inline_declarations(inline);
        cascade(&matched, hints, &inline)
    }

    fn cascade_for(ua: &str, user: &str, author: &str, inline: &str) -> CascadedValues {
        cascade_with_hints(ua, user, author, &[], inline)
    }

    fn width_px(values: &CascadedValues) -> Option<f32> {
        match values.get(PropertyId::Width)? {
            CssValue::Length(length) => Some(length.value),
            _ => None,
        }
    }

    #[test]
    fn test_author_beats_user_beats_ua() {
        let values = cascade_for(
            "div { width: 1px; }",
            "div { width: 2px; }",
            "div { width: 3px; }",
            "",
        );
        assert_eq!(width_px(&values), Some(3.0));
    }

    #[test]
    fn test_important_reverses_origin_order() {
        let values = cascade_for(
            "div { width: 1px !important; }",
            "div { width: 2px !important; }",
            "div { width: 3px !important; }",
            "",
        );
        assert_eq!(width_px(&values), Some(1.0));
    }

    #[test]
    fn test_layers_earlier_layer_loses() {
        let values = cascade_for(
            "",
            "",
            "@layer base, theme;\n\
             @layer theme { div { width: 2px; } }\n\
             @layer base { div { width: 1px; } }",
            "",
        );
        assert_eq!(width_px(&values), Some(2.0));
    }

    #[test]
    fn test_unlayered_beats_layered_normal() {
        let values = cascade_for(
            "",
            "",
            "@layer theme { div { width: 2px; } } div { width: 1px; }",
            "",
        );
        assert_eq!(width_px(&values), Some(1.0));
    }

    #[test]
    fn test_layered_important_beats_unlayered_important() {
        let values = cascade_for(
            "",
            "",
            "@layer theme { div { width: 2px !important; } }\n\
             div { width: 1px !important; }",
            "",
        );
        assert_eq!(width_px(&values), Some(2.0));
    }

    #[test]
    fn test_revert_rolls_back_one_origin() {
        let values = cascade_for(
            "div { width: 1px; }",
            "div { width: 2px; }",
            "div { width: revert; }",
            "",
        );
        // Автор откатывается к результату пользовательского прохода.
        assert_eq!(width_px(&values), Some(2.0));
    }

    #[test]
    fn test_revert_without_lower_snapshot_is_unset() {
        let values = cascade_for("div { width: revert; }", "", "", "");
        assert_eq!(values.get(PropertyId::Width), Some(&CssValue::Unset));
    }

    #[test]
    fn test_revert_layer_steps_one_layer() {
        let values = cascade_for(
            "",
            "",
            "@layer base, theme;\n\
             @layer base { div { width: 1px; } }\n\
             @layer theme { div { width: revert-layer; } }",
            "",
        );
        assert_eq!(width_px(&values), Some(1.0));
    }

    #[test]
    fn test_revert_layer_in_lowest_layer_sees_lower_origin() {
        let values = cascade_for(
            "div { width: 7px; }",
            "",
            "@layer base { div { width: revert-layer; } }",
            "",
        );
        assert_eq!(width_px(&values), Some(7.0));
    }

    #[test]
    fn test_inline_beats_author_rules() {
        let values = cascade_for("", "", "div { width: 1px; }", "width: 9px");
        assert_eq!(width_px(&values), Some(9.0));
    }

    #[test]
    fn test_author_important_beats_inline_normal() {
        let values = cascade_for("", "", "div { width: 1px !important; }", "width: 9px");
        assert_eq!(width_px(&values), Some(1.0));
    }

    #[test]
    fn test_specificity_then_source_order() {
        let values = cascade_for(
            "",
            "",
            "div { width: 1px; } div { width: 2px; }",
            "",
        );
        assert_eq!(width_px(&values), Some(2.0));

        let mut doc = Document::new();
        let root = doc.create_root("div");
        doc.set_attribute(root, "class", "card");
        let sheet = Arc::new(
            Stylesheet::parse(
                ".card { width: 5px; } div { width: 6px; }",
                CssParseOptions::default(),
            )
            .unwrap(),
        );
        let cache = RuleCache::build(&[], &[], &[(sheet, ScopeId::Document)], 800.0, 600.0);
        let matched = cache.collect_matching(&doc, root, None, None);
        let values = cascade(&matched, &[], &[]);
        assert_eq!(width_px(&values), Some(5.0));
    }

    fn width_hint(value: &str) -> Vec<Declaration> {
        vec![Declaration {
            name: "width".to_string(),
            value: value.to_string(),
            important: false,
        }]
    }

    #[test]
    fn test_hint_beats_user_loses_to_author() {
        let hints = width_hint("5px");
        let values = cascade_with_hints("", "div { width: 2px; }", "", &hints, "");
        assert_eq!(width_px(&values), Some(5.0));

        let values = cascade_with_hints("", "", "div { width: 3px; }", &hints, "");
        assert_eq!(width_px(&values), Some(3.0));
    }

    #[test]
    fn test_author_revert_rolls_back_past_hints() {
        let hints = width_hint("5px");
        let values = cascade_with_hints(
            "",
            "div { width: 2px; }",
            "div { width: revert; }",
            &hints,
            "",
        );
        assert_eq!(width_px(&values), Some(2.0));
    }

    #[test]
    fn test_presentational_hints_from_attributes() {
        let mut doc = Document::new();
        let root = doc.create_root("td");
        doc.set_attribute(root, "width", "120");
        doc.set_attribute(root, "height", "50%");
        doc.set_attribute(root, "bgcolor", "#ff0000");
        doc.set_attribute(root, "align", "center");
        doc.set_attribute(root, "valign", "top");

        let hints = presentational_hints(doc.element(root).unwrap());
        let value_of = |name: &str| {
            hints
                .iter()
                .find(|hint| hint.name == name)
                .map(|hint| hint.value.as_str())
        };
        assert_eq!(value_of("width"), Some("120px"));
        assert_eq!(value_of("height"), Some("50%"));
        assert_eq!(value_of("background-color"), Some("#ff0000"));
        assert_eq!(value_of("text-align"), Some("center"));
        assert_eq!(hints.len(), 4);
    }

    #[test]
    fn test_custom_property_collected() {
        let values = cascade_for("", "", "div { --brand: red; width: 1px; }", "");
        assert_eq!(values.custom.get("--brand").map(String::as_str), Some("red"));
    }
}
