//! Интеграционные тесты движка: матчинг по дереву, псевдоэлементы,
//! медиазапросы, вычисление значений и переходы.

use kaskad::style::properties::PropertyId;
use kaskad::style::values::Color;
use kaskad::{Document, ElementId, ElementState, PseudoElement, StyleEngine};

fn width_of(engine: &StyleEngine, element: ElementId) -> f32 {
    engine
        .computed_style(element, None)
        .and_then(|style| style.get(PropertyId::Width).as_length())
        .map(|length| length.value)
        .unwrap_or(f32::NAN)
}

#[test]
fn test_descendant_matching_in_deep_tree() {
    let mut doc = Document::new();
    let root = doc.create_root("html");
    let body = doc.append_child(root, "body");
    let section = doc.append_child(body, "section");
    doc.set_attribute(section, "class", "content");
    let inside = doc.append_child(section, "p");
    let outside = doc.append_child(body, "p");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet(".content p { width: 7px; } p { width: 3px; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    // Фильтр предков не должен давать ложных отказов.
    assert_eq!(width_of(&engine, inside), 7.0);
    assert_eq!(width_of(&engine, outside), 3.0);
}

#[test]
fn test_child_and_sibling_combinators() {
    let mut doc = Document::new();
    let root = doc.create_root("div");
    let first = doc.append_child(root, "p");
    let second = doc.append_child(root, "p");
    let grandchild = doc.append_child(first, "p");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet("div > p { color: #00ff00; } p + p { width: 9px; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    let green = Some(Color::rgb(0, 255, 0));
    assert_eq!(
        engine
            .computed_style(first, None)
            .unwrap()
            .get(PropertyId::Color)
            .as_color(),
        green
    );
    // Внук получает цвет наследованием, но `p + p` его не матчит.
    assert_eq!(width_of(&engine, second), 9.0);
    assert!(engine
        .computed_style(grandchild, None)
        .unwrap()
        .get(PropertyId::Width)
        .is_keyword("auto"));
}

#[test]
fn test_pseudo_element_styles_are_separate() {
    let mut doc = Document::new();
    let root = doc.create_root("div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet("div { color: #111111; } div::before { color: #222222; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    assert_eq!(
        engine
            .computed_style(root, None)
            .unwrap()
            .get(PropertyId::Color)
            .as_color(),
        Some(Color::rgb(0x11, 0x11, 0x11))
    );
    let before = engine
        .computed_style(root, Some(PseudoElement::Before))
        .unwrap();
    assert_eq!(
        before.get(PropertyId::Color).as_color(),
        Some(Color::rgb(0x22, 0x22, 0x22))
    );
    // ::after никто не стилизовал, стиль для него не создаётся.
    assert!(engine.computed_style(root, Some(PseudoElement::After)).is_none());
}

#[test]
fn test_media_query_follows_viewport() {
    let mut doc = Document::new();
    let root = doc.create_root("div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet(
            "div { width: 1px; } @media (min-width: 1000px) { div { width: 2px; } }",
        )
        .unwrap();

    engine.set_viewport(800.0, 600.0);
    engine.resolve_styles(&doc, 0.0);
    assert_eq!(width_of(&engine, root), 1.0);

    engine.set_viewport(1200.0, 600.0);
    engine.resolve_styles(&doc, 0.0);
    assert_eq!(width_of(&engine, root), 2.0);
}

#[test]
fn test_em_and_rem_absolutization() {
    let mut doc = Document::new();
    let root = doc.create_root("html");
    let child = doc.append_child(root, "div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet(
            "html { font-size: 20px; } div { font-size: 2em; width: 1.5em; height: 1rem; }",
        )
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    let style = engine.computed_style(child, None).unwrap();
    // em в font-size считается от родителя, в остальных — от своего.
    assert_eq!(style.font_size(), 40.0);
    assert_eq!(style.get(PropertyId::Width).as_length().unwrap().value, 60.0);
    assert_eq!(style.get(PropertyId::Height).as_length().unwrap().value, 20.0);
}

#[test]
fn test_monospace_default_size() {
    let mut doc = Document::new();
    let root = doc.create_root("div");
    let code = doc.append_child(root, "code");

    let engine_style = |engine: &StyleEngine, id: ElementId| {
        engine.computed_style(id, None).unwrap().font_size()
    };

    let mut engine = StyleEngine::new();
    engine.resolve_styles(&doc, 0.0);
    // UA-лист даёт code monospace: базовый размер 13px вместо 16.
    assert_eq!(engine_style(&engine, code), 13.0);
    assert_eq!(engine_style(&engine, root), 16.0);
}

#[test]
fn test_root_display_blockified() {
    let mut doc = Document::new();
    let root = doc.create_root("html");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet("html { display: inline-flex; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    assert!(engine
        .computed_style(root, None)
        .unwrap()
        .get(PropertyId::Display)
        .is_keyword("flex"));
}

#[test]
fn test_overflow_visible_pairs_to_auto() {
    let mut doc = Document::new();
    let root = doc.create_root("div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet("div { overflow-x: visible; overflow-y: scroll; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);

    let style = engine.computed_style(root, None).unwrap();
    assert!(style.get(PropertyId::OverflowX).is_keyword("auto"));
    assert!(style.get(PropertyId::OverflowY).is_keyword("scroll"));
}

#[test]
fn test_restyle_after_class_change() {
    let mut doc = Document::new();
    let root = doc.create_root("div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet(".wide { width: 99px; }")
        .unwrap();
    engine.resolve_styles(&doc, 0.0);
    assert!(width_of(&engine, root).is_nan());

    doc.set_attribute(root, "class", "wide");
    assert!(engine.needs_restyle(&kaskad::style::cache::StyleChange::Class("wide".into())));
    engine.resolve_styles(&doc, 0.0);
    assert_eq!(width_of(&engine, root), 99.0);
}

#[test]
fn test_transition_runs_and_reverses() {
    let mut doc = Document::new();
    let root = doc.create_root("div");

    let mut engine = StyleEngine::new();
    engine
        .add_author_stylesheet(
            "div { width: 0px; transition: width 1s linear; }\n\
             div:hover { width: 100px; }",
        )
        .unwrap();

    engine.resolve_styles(&doc, 0.0);
    assert_eq!(width_of(&engine, root), 0.0);

    // Наведение запускает переход 0 -> 100px.
    doc.set_state(root, ElementState::HOVER);
    engine.resolve_styles(&doc, 0.25);
    assert_eq!(engine.active_transition_count(), 1);
    assert_eq!(width_of(&engine, root), 0.0);

    engine.resolve_styles(&doc, 0.75);
    assert_eq!(width_of(&engine, root), 50.0);

    // Снятие наведения на полпути: обратный переход укорачивается вдвое.
    doc.set_state(root, ElementState::empty());
    engine.resolve_styles(&doc, 0.75);
    assert_eq!(engine.active_transition_count(), 1);
    assert_eq!(width_of(&engine, root), 50.0);

    engine.resolve_styles(&doc, 1.0);
    assert_eq!(width_of(&engine, root), 25.0);

    engine.resolve_styles(&doc, 1.25);
    assert_eq!(width_of(&engine, root), 0.0);
    assert_eq!(engine.collect_finished_transitions(1.25), 1);
    assert_eq!(engine.active_transition_count(), 0);
}

#[test]
fn test_resolution_is_deterministic() {
    let css = "@layer a, b; @layer b { p { width: 2px; } }\n\
               @layer a { p { width: 1px; } }\n\
               .x p { color: #abcdef; } p { margin-top: 4px; }";

    let build = || {
        let mut doc = Document::new();
        let root = doc.create_root("div");
        doc.set_attribute(root, "class", "x");
        let p = doc.append_child(root, "p");
        let mut engine = StyleEngine::new();
        engine.add_author_stylesheet(css).unwrap();
        engine.resolve_styles(&doc, 0.0);
        engine.computed_style(p, None).unwrap().clone()
    };

    let first = build();
    let second = build();
    for &id in PropertyId::ALL {
        assert_eq!(
            format!("{:?}", first.get(id)),
            format!("{:?}", second.get(id)),
            "nondeterministic value for {}",
            id.name()
        );
    }
}
