//! Точный матчинг селекторов: справа налево по цепочке комбинаторов.

use selectors::bloom::BloomFilter;

use crate::dom::{Document, Element, ElementId, ElementState};

use super::selector::{
    ancestor_hash, AttrOperator, AttributeSelector, Combinator, ComplexSelector, Compound,
    HashKind, PseudoClass, PseudoElement, SimpleSelector,
};

/// Быстрый отсев: все хеши селектора обязаны присутствовать в фильтре
/// предков. Ложноположительные срабатывания допустимы, пропуски — нет.
pub fn may_match(selector: &ComplexSelector, filter: &BloomFilter) -> bool {
    selector
        .ancestor_hashes
        .iter()
        .all(|&hash| filter.might_contain_hash(hash))
}

/// Полная проверка комплексного селектора на элементе.
///
/// `pseudo` — запрошенный псевдоэлемент: селектор без псевдоэлемента
/// матчится только при `None`, с псевдоэлементом — только при
/// совпадении.
pub fn matches_complex(
    document: &Document,
    element: ElementId,
    selector: &ComplexSelector,
    pseudo: Option<PseudoElement>,
) -> bool {
    if selector.subject.pseudo_element != pseudo {
        return false;
    }
    if !matches_compound(document, element, &selector.subject) {
        return false;
    }
    matches_ancestors(document, element, &selector.ancestors)
}

fn matches_ancestors(
    document: &Document,
    from: ElementId,
    chain: &[(Combinator, Compound)],
) -> bool {
    let Some(((combinator, compound), rest)) = chain.split_first() else {
        return true;
    };

    match combinator {
        Combinator::Child => match document.parent_of(from) {
            Some(parent) => {
                matches_compound(document, parent, compound)
                    && matches_ancestors(document, parent, rest)
            }
            None => false,
        },
        Combinator::Descendant => {
            // Перебор с возвратом: любой подходящий предок.
            for ancestor in document.ancestors(from) {
                if matches_compound(document, ancestor, compound)
                    && matches_ancestors(document, ancestor, rest)
                {
                    return true;
                }
            }
            false
        }
        Combinator::NextSibling => match document.previous_sibling(from) {
            Some(sibling) => {
                matches_compound(document, sibling, compound)
                    && matches_ancestors(document, sibling, rest)
            }
            None => false,
        },
        Combinator::SubsequentSibling => {
            for sibling in document.earlier_siblings(from).into_iter().rev() {
                if matches_compound(document, sibling, compound)
                    && matches_ancestors(document, sibling, rest)
                {
                    return true;
                }
            }
            false
        }
    }
}

fn matches_compound(document: &Document, element: ElementId, compound: &Compound) -> bool {
    compound
        .simples
        .iter()
        .all(|simple| matches_simple(document, element, simple))
}

fn matches_simple(document: &Document, element_id: ElementId, simple: &SimpleSelector) -> bool {
    let Some(element) = document.element(element_id) else {
        return false;
    };

    match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Tag(tag) => element.tag_name == *tag,
        SimpleSelector::Id(id) => element.id.as_deref() == Some(id.as_str()),
        SimpleSelector::Class(class) => element.has_class(class),
        SimpleSelector::Attribute(attr) => matches_attribute(element, attr),
        SimpleSelector::PseudoClass(pseudo) => {
            matches_pseudo_class(document, element_id, element, pseudo)
        }
    }
}

fn matches_attribute(element: &Element, selector: &AttributeSelector) -> bool {
    let Some(actual) = element.attribute(&selector.name) else {
        return false;
    };
    let expected = selector.value.as_str();
    match selector.operator {
        AttrOperator::Exists => true,
        AttrOperator::Equals => actual == expected,
        AttrOperator::Includes => actual.split_ascii_whitespace().any(|w| w == expected),
        AttrOperator::DashMatch => {
            actual == expected
                || actual
                    .strip_prefix(expected)
                    .is_some_and(|rest| rest.starts_with('-'))
        }
        AttrOperator::Prefix => !expected.is_empty() && actual.starts_with(expected),
        AttrOperator::Suffix => !expected.is_empty() && actual.ends_with(expected),
        AttrOperator::Substring => !expected.is_empty() && actual.contains(expected),
    }
}

fn matches_pseudo_class(
    document: &Document,
    element_id: ElementId,
    element: &Element,
    pseudo: &PseudoClass,
) -> bool {
    match pseudo {
        PseudoClass::Root => document.is_root(element_id),
        PseudoClass::FirstChild => document.child_index(element_id) == Some(1),
        PseudoClass::LastChild => match document.parent_of(element_id) {
            Some(parent) => document
                .element(parent)
                .is_some_and(|p| p.children.last() == Some(&element_id)),
            None => false,
        },
        PseudoClass::OnlyChild => match document.parent_of(element_id) {
            Some(parent) => document
                .element(parent)
                .is_some_and(|p| p.children.len() == 1),
            None => false,
        },
        PseudoClass::Empty => element.children.is_empty() && !element.has_text,
        PseudoClass::NthChild(a, b) => match document.child_index(element_id) {
            Some(index) => nth_matches(*a, *b, index as i32),
            None => false,
        },
        PseudoClass::Hover => element.state.contains(ElementState::HOVER),
        PseudoClass::Focus => element.state.contains(ElementState::FOCUS),
        PseudoClass::Active => element.state.contains(ElementState::ACTIVE),
        PseudoClass::Link => element.state.contains(ElementState::LINK),
        PseudoClass::Visited => element.state.contains(ElementState::VISITED),
        PseudoClass::Not(selectors) => !selectors
            .iter()
            .any(|s| matches_complex(document, element_id, s, None)),
        PseudoClass::Is(selectors) | PseudoClass::Where(selectors) => selectors
            .iter()
            .any(|s| matches_complex(document, element_id, s, None)),
    }
}

/// Есть ли k >= 0 такое, что index == a*k + b.
fn nth_matches(a: i32, b: i32, index: i32) -> bool {
    if a == 0 {
        return index == b;
    }
    let delta = index - b;
    delta % a == 0 && delta / a >= 0
}

/// Хеши элемента для фильтра предков (те же виды, что и в селекторах).
pub fn element_filter_hashes(element: &Element) -> Vec<u32> {
    let mut hashes = Vec::with_capacity(2 + element.classes.len() + element.attributes.len());
    hashes.push(ancestor_hash(HashKind::Tag, &element.tag_name));
    if let Some(id) = &element.id {
        hashes.push(ancestor_hash(HashKind::Id, id));
    }
    for class in &element.classes {
        hashes.push(ancestor_hash(HashKind::Class, class));
    }
    for name in element.attributes.keys() {
        hashes.push(ancestor_hash(HashKind::AttributeName, name));
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::selector::SelectorList;

    fn matches(document: &Document, element: ElementId, text: &str) -> bool {
        let list = SelectorList::parse(text).unwrap();
        list.0
            .iter()
            .any(|s| matches_complex(document, element, s, None))
    }

    fn sample_document() -> (Document, ElementId, ElementId, ElementId, ElementId) {
        let mut doc = Document::new();
        let html = doc.create_root("html");
        let body = doc.append_child(html, "body");
        let list = doc.append_child(body, "ul");
        doc.set_attribute(list, "class", "menu");
        let item1 = doc.append_child(list, "li");
        doc.set_attribute(item1, "class", "item first");
        let item2 = doc.append_child(list, "li");
        doc.set_attribute(item2, "class", "item");
        doc.set_attribute(item2, "data-kind", "special");
        (doc, html, list, item1, item2)
    }

    #[test]
    fn test_simple_selectors() {
        let (doc, html, list, item1, _) = sample_document();
        assert!(matches(&doc, html, ":root"));
        assert!(matches(&doc, list, "ul.menu"));
        assert!(matches(&doc, item1, ".item"));
        assert!(!matches(&doc, item1, ".menu"));
        assert!(matches(&doc, item1, "*"));
    }

    #[test]
    fn test_combinators() {
        let (doc, _, _, item1, item2) = sample_document();
        assert!(matches(&doc, item1, "ul > li"));
        assert!(matches(&doc, item1, "body li"));
        assert!(!matches(&doc, item1, "body > li"));
        assert!(matches(&doc, item2, "li + li"));
        assert!(!matches(&doc, item1, "li + li"));
        assert!(matches(&doc, item2, ".first ~ li"));
    }

    #[test]
    fn test_attribute_operators() {
        let (doc, _, _, _, item2) = sample_document();
        assert!(matches(&doc, item2, "[data-kind]"));
        assert!(matches(&doc, item2, "[data-kind=special]"));
        assert!(matches(&doc, item2, "[data-kind^=spec]"));
        assert!(matches(&doc, item2, "[data-kind$=cial]"));
        assert!(matches(&doc, item2, "[data-kind*=eci]"));
        assert!(matches(&doc, item2, "[class~=item]"));
        assert!(!matches(&doc, item2, "[data-kind=other]"));
    }

    #[test]
    fn test_structural_pseudo_classes() {
        let (doc, _, list, item1, item2) = sample_document();
        assert!(matches(&doc, item1, "li:first-child"));
        assert!(matches(&doc, item2, "li:last-child"));
        assert!(!matches(&doc, item1, "li:last-child"));
        assert!(matches(&doc, list, ":only-child"));
        assert!(!matches(&doc, item1, ":only-child"));
        assert!(matches(&doc, item1, "li:nth-child(odd)"));
        assert!(matches(&doc, item2, "li:nth-child(2n)"));
        assert!(matches(&doc, item1, "li:empty"));
    }

    #[test]
    fn test_logical_pseudo_classes() {
        let (doc, _, _, item1, item2) = sample_document();
        assert!(matches(&doc, item1, "li:not(.menu)"));
        assert!(!matches(&doc, item2, "li:not([data-kind])"));
        assert!(matches(&doc, item2, ":is(.first, [data-kind])"));
        assert!(matches(&doc, item1, ":where(.first)"));
    }

    #[test]
    fn test_interaction_state() {
        let (mut doc, _, _, item1, _) = sample_document();
        assert!(!matches(&doc, item1, "li:hover"));
        doc.set_state(item1, ElementState::HOVER | ElementState::FOCUS);
        assert!(matches(&doc, item1, "li:hover"));
        assert!(matches(&doc, item1, "li:focus"));
        assert!(!matches(&doc, item1, "li:active"));
    }

    #[test]
    fn test_pseudo_element_requires_request() {
        let (doc, _, _, item1, _) = sample_document();
        let list = SelectorList::parse("li::before").unwrap();
        let selector = &list.0[0];
        assert!(!matches_complex(&doc, item1, selector, None));
        assert!(matches_complex(&doc, item1, selector, Some(PseudoElement::Before)));
    }

    #[test]
    fn test_bloom_filter_no_false_negatives() {
        let (doc, _, _, item1, _) = sample_document();
        // Фильтр, заполненный настоящими предками item1.
        let mut filter = BloomFilter::new();
        for ancestor in doc.ancestors(item1) {
            if let Some(element) = doc.element(ancestor) {
                for hash in element_filter_hashes(element) {
                    filter.insert_hash(hash);
                }
            }
        }
        for text in ["ul.menu li", "body .item", "html li.item", ".menu > .item"] {
            let list = SelectorList::parse(text).unwrap();
            for selector in &list.0 {
                if matches_complex(&doc, item1, selector, None) {
                    assert!(may_match(selector, &filter), "false negative for `{text}`");
                }
            }
        }
    }

    #[test]
    fn test_nth_formula() {
        assert!(nth_matches(2, 1, 1));
        assert!(nth_matches(2, 1, 3));
        assert!(!nth_matches(2, 1, 2));
        assert!(nth_matches(0, 3, 3));
        assert!(!nth_matches(0, 3, 4));
        // -n+2: только первые два
        assert!(nth_matches(-1, 2, 1));
        assert!(nth_matches(-1, 2, 2));
        assert!(!nth_matches(-1, 2, 3));
    }
}
