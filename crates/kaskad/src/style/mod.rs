//! Движок стилей: владение таблицами, пересчёт и интеграция
//! шрифтов с переходами.
//!
//! Точка входа — [`StyleEngine`]: таблицы трёх происхождений задаются
//! явно при инициализации, пересчёт идёт одним обходом дерева с
//! фильтром предков, результат лежит в карте по
//! `(элемент, псевдоэлемент)`.

pub mod cache;
pub mod cascade;
pub mod compute;
pub mod custom;
pub mod easing;
pub mod fonts;
pub mod keyframes;
pub mod loader;
pub mod matcher;
pub mod media;
pub mod parser;
pub mod properties;
pub mod selector;
pub mod transitions;
pub mod values;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::dom::{Document, ElementId, ScopeId};

use cache::{AncestorFilter, RuleCache, StyleChange};
use cascade::{cascade, presentational_hints};
use compute::{compute_style, ComputeInput, ComputedStyle};
use fonts::{FontCache, FontSlope};
use loader::{FontLoaders, FontQueue, LoaderEvent};
use parser::{parse_inline_declarations, CssParseError, CssParseOptions, Stylesheet};
use properties::PropertyId;
use selector::PseudoElement;
use transitions::TransitionController;
use values::Length;

pub use cache::MatchedRule;
pub use cascade::CascadeOrigin;
pub use keyframes::KeyframesRule;
pub use loader::{spawn_fetcher, FontFetcher, HttpFetcher};

/// Таблица стилей по умолчанию. Намеренно маленькая: элементам
/// нужно хотя бы блочное поведение контейнеров.
const UA_STYLESHEET: &str = "\
    html, body, div, p, ul, ol, li, h1, h2, h3, h4, h5, h6,\
    header, footer, main, section, article, nav, aside, form { display: block; }\
    head, style, script, meta, link, title { display: none; }\
    body { margin: 8px; }\
    h1 { font-size: 2em; }\
    h2 { font-size: 1.5em; }\
    h3 { font-size: 1.17em; }\
    a { color: #0000ee; }\
    b, strong { font-weight: bold; }\
    i, em { font-style: italic; }\
    pre, code { font-family: monospace; white-space: pre; }\
    center { text-align: center; }";

/// Ошибка уровня движка.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error(transparent)]
    Parse(#[from] CssParseError),
}

/// Ключ вычисленного стиля.
pub type StyleKey = (ElementId, Option<PseudoElement>);

/// Движок разрешения стилей.
#[derive(Debug)]
pub struct StyleEngine {
    ua_sheets: Vec<Arc<Stylesheet>>,
    user_sheets: Vec<Arc<Stylesheet>>,
    author_sheets: Vec<(Arc<Stylesheet>, ScopeId)>,
    viewport_width: f32,
    viewport_height: f32,
    cache: Option<RuleCache>,
    computed: HashMap<StyleKey, ComputedStyle>,
    pub fonts: FontCache,
    loaders: FontLoaders,
    font_queue: Option<FontQueue>,
    transitions: TransitionController,
}

impl Default for StyleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleEngine {
    /// Движок со встроенной UA-таблицей и вьюпортом 800×600.
    pub fn new() -> Self {
        let ua = Stylesheet::parse(UA_STYLESHEET, CssParseOptions::default())
            .map(Arc::new)
            .into_iter()
            .collect();
        Self {
            ua_sheets: ua,
            user_sheets: Vec::new(),
            author_sheets: Vec::new(),
            viewport_width: 800.0,
            viewport_height: 600.0,
            cache: None,
            computed: HashMap::new(),
            fonts: FontCache::new(),
            loaders: FontLoaders::default(),
            font_queue: None,
            transitions: TransitionController::new(),
        }
    }

    /// Заменяет UA-таблицы (для тестов и нестандартных хостов).
    pub fn set_ua_stylesheet(&mut self, css: &str) -> Result<(), StyleError> {
        self.ua_sheets = vec![Arc::new(Stylesheet::parse(css, CssParseOptions::default())?)];
        self.invalidate();
        Ok(())
    }

    pub fn set_user_stylesheet(&mut self, css: &str) -> Result<(), StyleError> {
        self.user_sheets = vec![Arc::new(Stylesheet::parse(css, CssParseOptions::default())?)];
        self.invalidate();
        Ok(())
    }

    /// Добавляет авторскую таблицу документа в конец (порядок документа).
    pub fn add_author_stylesheet(&mut self, css: &str) -> Result<(), StyleError> {
        self.add_scoped_author_stylesheet(css, ScopeId::Document)
    }

    /// Добавляет авторскую таблицу, действующую только в `scope`
    /// (например, в теневом поддереве).
    pub fn add_scoped_author_stylesheet(
        &mut self,
        css: &str,
        scope: ScopeId,
    ) -> Result<(), StyleError> {
        let sheet = Arc::new(Stylesheet::parse(css, CssParseOptions::default())?);
        for face in &sheet.font_faces {
            self.fonts.register_face(face.clone());
        }
        self.author_sheets.push((sheet, scope));
        self.invalidate();
        Ok(())
    }

    pub fn clear_author_stylesheets(&mut self) {
        self.author_sheets.clear();
        self.fonts.clear_faces();
        self.invalidate();
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if (self.viewport_width, self.viewport_height) == (width, height) {
            return;
        }
        self.viewport_width = width;
        self.viewport_height = height;
        self.invalidate();
    }

    /// Подключает очередь загрузки шрифтов (см. [`spawn_fetcher`]).
    pub fn attach_font_queue(&mut self, queue: FontQueue) {
        self.font_queue = Some(queue);
    }

    fn invalidate(&mut self) {
        self.cache = None;
        self.computed.clear();
    }

    /// Может ли изменение элемента повлиять на матчинг.
    pub fn needs_restyle(&self, change: &StyleChange) -> bool {
        match &self.cache {
            Some(cache) => cache.needs_restyle(change),
            None => true,
        }
    }

    /// Вычисленный стиль элемента или его псевдоэлемента.
    pub fn computed_style(&self, element: ElementId, pseudo: Option<PseudoElement>) -> Option<&ComputedStyle> {
        self.computed.get(&(element, pseudo))
    }

    pub fn active_transition_count(&self) -> usize {
        self.transitions.active_count()
    }

    /// Группа кадров по имени из `animation-name`. Просмотр идёт в
    /// каскадном порядке таблиц, позднее определение побеждает.
    pub fn keyframes(&self, name: &str) -> Option<&KeyframesRule> {
        let sheets = self
            .ua_sheets
            .iter()
            .chain(self.user_sheets.iter())
            .chain(self.author_sheets.iter().map(|(sheet, _)| sheet));
        let mut found = None;
        for sheet in sheets {
            for rule in &sheet.keyframes {
                if rule.name == name {
                    found = Some(rule);
                }
            }
        }
        found
    }

    /// Пересчитывает стили всего дерева. `now` — секунды на монотонной
    /// шкале вызывающей стороны, двигает переходы.
    pub fn resolve_styles(&mut self, document: &Document, now: f64) {
        if self.cache.is_none() {
            self.cache = Some(RuleCache::build(
                &self.ua_sheets,
                &self.user_sheets,
                &self.author_sheets,
                self.viewport_width,
                self.viewport_height,
            ));
        }

        let mut new_computed: HashMap<StyleKey, ComputedStyle> = HashMap::new();
        let Some(root) = document.root else {
            self.computed = new_computed;
            return;
        };

        let mut filter = AncestorFilter::new();
        self.resolve_subtree(
            document,
            root,
            None,
            Length::DEFAULT_FONT_SIZE,
            &mut filter,
            &mut new_computed,
            now,
        );
        self.computed = new_computed;
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_subtree(
        &mut self,
        document: &Document,
        element_id: ElementId,
        parent_style: Option<&ComputedStyle>,
        root_font_size: f32,
        filter: &mut AncestorFilter,
        out: &mut HashMap<StyleKey, ComputedStyle>,
        now: f64,
    ) {
        let style = self.resolve_one(document, element_id, None, parent_style, root_font_size, filter, now);
        let root_font_size = if document.is_root(element_id) {
            style.font_size()
        } else {
            root_font_size
        };

        // Псевдоэлементы наследуют от порождающего элемента.
        for pseudo in PseudoElement::ALL {
            let pseudo_style = self.resolve_pseudo(
                document,
                element_id,
                *pseudo,
                &style,
                root_font_size,
                filter,
                now,
            );
            if let Some(pseudo_style) = pseudo_style {
                out.insert((element_id, Some(*pseudo)), pseudo_style);
            }
        }

        let children = document
            .element(element_id)
            .map(|element| element.children.clone())
            .unwrap_or_default();
        if !children.is_empty() {
            if let Some(element) = document.element(element_id) {
                filter.push(element);
            }
            for child in children {
                self.resolve_subtree(document, child, Some(&style), root_font_size, filter, out, now);
            }
            filter.pop();
        }

        out.insert((element_id, None), style);
    }

    fn resolve_one(
        &mut self,
        document: &Document,
        element_id: ElementId,
        pseudo: Option<PseudoElement>,
        parent_style: Option<&ComputedStyle>,
        root_font_size: f32,
        filter: &AncestorFilter,
        now: f64,
    ) -> ComputedStyle {
        let matched = match &self.cache {
            Some(cache) => cache.collect_matching(
                document,
                element_id,
                pseudo,
                Some(filter.filter()),
            ),
            None => Vec::new(),
        };

        // Презентационные атрибуты и атрибут `style` есть только у
        // самого элемента, у псевдоэлементов их нет.
        let (hints, inline) = match (pseudo, document.element(element_id)) {
            (None, Some(element)) => (
                presentational_hints(element),
                element
                    .inline_style
                    .as_deref()
                    .map(parse_inline_declarations)
                    .unwrap_or_default(),
            ),
            _ => (Vec::new(), Vec::new()),
        };

        let cascaded = cascade(&matched, &hints, &inline);
        let input = ComputeInput {
            parent: parent_style,
            is_root: pseudo.is_none() && document.is_root(element_id),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            root_font_size,
        };
        let mut style = compute_style(&cascaded, &input);

        self.request_fonts(&style);

        if let Some(old) = self.computed.get(&(element_id, pseudo)) {
            let old = old.clone();
            self.transitions.update(element_id, pseudo, &old, &style, now);
        }
        self.transitions.adjust_style(element_id, pseudo, &mut style, now);

        style
    }

    fn resolve_pseudo(
        &mut self,
        document: &Document,
        element_id: ElementId,
        pseudo: PseudoElement,
        originating: &ComputedStyle,
        root_font_size: f32,
        filter: &AncestorFilter,
        now: f64,
    ) -> Option<ComputedStyle> {
        let has_rules = match &self.cache {
            Some(cache) => !cache
                .collect_matching(document, element_id, Some(pseudo), Some(filter.filter()))
                .is_empty(),
            None => false,
        };
        if !has_rules {
            return None;
        }
        Some(self.resolve_one(
            document,
            element_id,
            Some(pseudo),
            Some(originating),
            root_font_size,
            filter,
            now,
        ))
    }

    /// Ставит в очередь загрузку начертаний, которые нужны стилю.
    fn request_fonts(&mut self, style: &ComputedStyle) {
        let Some(queue) = &mut self.font_queue else {
            return;
        };
        let weight = style.font_weight();
        let slope = style
            .keyword(PropertyId::FontStyle)
            .and_then(|keyword| FontSlope::from_str(keyword).ok())
            .unwrap_or_default();
        for family in style.font_families() {
            if let Some(face) = self.fonts.find_matching_face(family, weight, slope) {
                if !self.fonts.is_loaded(&face.key()) {
                    self.loaders.ensure_loading(face, queue);
                }
            }
        }
    }

    /// Разгребает готовые ответы загрузчика шрифтов. Возвращает
    /// события; любое из них означает, что стили стоит пересчитать.
    pub fn pump_font_events(&mut self) -> Vec<LoaderEvent> {
        let Some(queue) = &mut self.font_queue else {
            return Vec::new();
        };
        let mut events = Vec::new();
        while let Some(response) = queue.try_recv() {
            if let Some(event) = self.loaders.handle_response(response, &mut self.fonts, queue) {
                events.push(event);
            }
        }
        if !events.is_empty() {
            self.computed.clear();
        }
        events
    }

    /// Завершённые переходы убираются; возвращает их число.
    pub fn collect_finished_transitions(&mut self, now: f64) -> usize {
        self.transitions.collect_finished(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> (Document, ElementId, ElementId, ElementId) {
        let mut doc = Document::new();
        let html = doc.create_root("html");
        let body = doc.append_child(html, "body");
        let para = doc.append_child(body, "p");
        (doc, html, body, para)
    }

    #[test]
    fn test_resolve_assigns_style_to_every_element() {
        let (doc, html, body, para) = sample_document();
        let mut engine = StyleEngine::new();
        engine.resolve_styles(&doc, 0.0);
        for element in [html, body, para] {
            assert!(engine.computed_style(element, None).is_some());
        }
    }

    #[test]
    fn test_inheritance_through_tree() {
        let (doc, _, _, para) = sample_document();
        let mut engine = StyleEngine::new();
        engine
            .add_author_stylesheet("body { color: #112233; }")
            .unwrap();
        engine.resolve_styles(&doc, 0.0);
        let style = engine.computed_style(para, None).unwrap();
        assert_eq!(
            style.get(PropertyId::Color).as_color(),
            Some(values::Color::rgb(0x11, 0x22, 0x33))
        );
    }

    #[test]
    fn test_ua_display_defaults() {
        let (doc, _, body, para) = sample_document();
        let mut engine = StyleEngine::new();
        engine.resolve_styles(&doc, 0.0);
        assert_eq!(
            engine.computed_style(body, None).unwrap().keyword(PropertyId::Display),
            Some("block")
        );
        assert_eq!(
            engine.computed_style(para, None).unwrap().keyword(PropertyId::Display),
            Some("block")
        );
    }

    #[test]
    fn test_pseudo_element_style_resolved_only_when_ruled() {
        let (doc, _, _, para) = sample_document();
        let mut engine = StyleEngine::new();
        engine
            .add_author_stylesheet("p::before { color: red; }")
            .unwrap();
        engine.resolve_styles(&doc, 0.0);
        assert!(engine.computed_style(para, Some(PseudoElement::Before)).is_some());
        assert!(engine.computed_style(para, Some(PseudoElement::After)).is_none());
    }

    #[test]
    fn test_viewport_change_invalidates_media() {
        let (doc, _, _, para) = sample_document();
        let mut engine = StyleEngine::new();
        engine
            .add_author_stylesheet("@media (min-width: 1000px) { p { color: red; } }")
            .unwrap();
        engine.resolve_styles(&doc, 0.0);
        let before = engine.computed_style(para, None).unwrap().get(PropertyId::Color).clone();
        assert_eq!(before, values::CssValue::Color(values::Color::BLACK));

        engine.set_viewport(1200.0, 800.0);
        engine.resolve_styles(&doc, 0.0);
        let after = engine.computed_style(para, None).unwrap();
        assert_eq!(
            after.get(PropertyId::Color).as_color(),
            Some(values::Color::rgb(255, 0, 0))
        );
    }

    #[test]
    fn test_needs_restyle_after_resolve() {
        let (doc, _, _, _) = sample_document();
        let mut engine = StyleEngine::new();
        engine
            .add_author_stylesheet(".highlight { color: red; }")
            .unwrap();
        engine.resolve_styles(&doc, 0.0);
        assert!(engine.needs_restyle(&StyleChange::Class("highlight".to_string())));
        assert!(!engine.needs_restyle(&StyleChange::Class("missing".to_string())));
    }

    #[test]
    fn test_scoped_stylesheet_styles_only_its_subtree() {
        let (mut doc, _, body, para) = sample_document();
        let scope = doc.create_shadow_scope();
        let host = doc.append_child_in_scope(body, "div", scope);
        let inner = doc.append_child(host, "p");

        let mut engine = StyleEngine::new();
        engine.add_author_stylesheet("p { color: red; }").unwrap();
        engine
            .add_scoped_author_stylesheet("p { color: blue; }", scope)
            .unwrap();
        engine.resolve_styles(&doc, 0.0);

        let light = engine.computed_style(para, None).unwrap();
        assert_eq!(
            light.get(PropertyId::Color).as_color(),
            Some(values::Color::rgb(255, 0, 0))
        );
        let shadowed = engine.computed_style(inner, None).unwrap();
        assert_eq!(
            shadowed.get(PropertyId::Color).as_color(),
            Some(values::Color::rgb(0, 0, 255))
        );
    }

    #[test]
    fn test_keyframes_lookup_last_definition_wins() {
        let mut engine = StyleEngine::new();
        engine
            .add_author_stylesheet("@keyframes spin { from { width: 0px; } to { width: 10px; } }")
            .unwrap();
        engine
            .add_author_stylesheet("@keyframes spin { from { width: 0px; } to { width: 90px; } }")
            .unwrap();

        let rule = engine.keyframes("spin").unwrap();
        let values = rule.sample(0.5);
        assert_eq!(
            values
                .iter()
                .find(|(id, _)| *id == PropertyId::Width)
                .map(|(_, value)| value.clone()),
            Some(values::CssValue::Length(Length::px(45.0)))
        );
        assert!(engine.keyframes("missing").is_none());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let (doc, _, _, para) = sample_document();
        let css = "p { width: 4em; color: red; } body { font-size: 20px; }";

        let mut first = StyleEngine::new();
        first.add_author_stylesheet(css).unwrap();
        first.resolve_styles(&doc, 0.0);

        let mut second = StyleEngine::new();
        second.add_author_stylesheet(css).unwrap();
        second.resolve_styles(&doc, 0.0);

        assert_eq!(
            first.computed_style(para, None),
            second.computed_style(para, None)
        );
    }
}
