//! Индекс правил: вёдра по субъектному компаунду, фильтр предков и
//! наборы инвалидации.
//!
//! Кеш перестраивается при смене набора таблиц или вьюпорта: медиа
//! условия проверяются на этапе сборки, матчеру достаются только
//! применимые правила.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use selectors::bloom::BloomFilter;

use crate::dom::{Document, Element, ElementId, ScopeId};

use super::cascade::CascadeOrigin;
use super::matcher::{element_filter_hashes, matches_complex, may_match};
use super::parser::{StyleRule, Stylesheet};
use super::selector::{Compound, PseudoClass, PseudoElement, SimpleSelector};

/// Запись индекса: один комплексный селектор одного правила.
#[derive(Debug, Clone)]
struct RuleEntry {
    rule: Arc<StyleRule>,
    selector_index: usize,
    origin: CascadeOrigin,
    /// Область, в которой действует правило; `None` — во всех
    /// (UA и пользовательские таблицы).
    scope: Option<ScopeId>,
    /// Порядок слоя внутри происхождения; `u32::MAX` — вне слоёв.
    layer_order: u32,
    specificity: u32,
    source_order: u32,
}

/// Правило, прошедшее матчинг; вход сортировки каскада.
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub rule: Arc<StyleRule>,
    pub origin: CascadeOrigin,
    pub layer_order: u32,
    pub specificity: u32,
    pub source_order: u32,
}

/// Ведро, в которое попадает субъектный компаунд.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BucketKey {
    Id(String),
    Class(String),
    Tag(String),
    Attribute(String),
    Root,
    Other,
}

/// Индекс правил по субъектным компаундам.
pub struct RuleCache {
    id_buckets: HashMap<String, Vec<RuleEntry>>,
    class_buckets: HashMap<String, Vec<RuleEntry>>,
    tag_buckets: HashMap<String, Vec<RuleEntry>>,
    attribute_buckets: HashMap<String, Vec<RuleEntry>>,
    root_rules: Vec<RuleEntry>,
    pseudo_element_rules: HashMap<PseudoElement, Vec<RuleEntry>>,
    other_rules: Vec<RuleEntry>,
    invalidation: InvalidationSet,
    entry_count: usize,
}

impl fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCache")
            .field("entries", &self.entry_count)
            .field("id_buckets", &self.id_buckets.len())
            .field("class_buckets", &self.class_buckets.len())
            .field("tag_buckets", &self.tag_buckets.len())
            .finish()
    }
}

impl RuleCache {
    /// Строит индекс по таблицам всех трёх происхождений. Авторские
    /// таблицы идут с областью, в которой они действуют.
    pub fn build(
        ua: &[Arc<Stylesheet>],
        user: &[Arc<Stylesheet>],
        author: &[(Arc<Stylesheet>, ScopeId)],
        viewport_width: f32,
        viewport_height: f32,
    ) -> Self {
        let mut cache = Self {
            id_buckets: HashMap::new(),
            class_buckets: HashMap::new(),
            tag_buckets: HashMap::new(),
            attribute_buckets: HashMap::new(),
            root_rules: Vec::new(),
            pseudo_element_rules: HashMap::new(),
            other_rules: Vec::new(),
            invalidation: InvalidationSet::default(),
            entry_count: 0,
        };

        let unscoped = |sheets: &[Arc<Stylesheet>]| -> Vec<(Arc<Stylesheet>, Option<ScopeId>)> {
            sheets.iter().map(|sheet| (Arc::clone(sheet), None)).collect()
        };
        let scoped: Vec<_> = author
            .iter()
            .map(|(sheet, scope)| (Arc::clone(sheet), Some(*scope)))
            .collect();

        for (origin, sheets) in [
            (CascadeOrigin::UserAgent, unscoped(ua)),
            (CascadeOrigin::User, unscoped(user)),
            (CascadeOrigin::Author, scoped),
        ] {
            cache.add_origin(origin, &sheets, viewport_width, viewport_height);
        }

        tracing::debug!("rule cache built: {cache:?}");
        cache
    }

    fn add_origin(
        &mut self,
        origin: CascadeOrigin,
        sheets: &[(Arc<Stylesheet>, Option<ScopeId>)],
        viewport_width: f32,
        viewport_height: f32,
    ) {
        // Слои нумеруются по первому упоминанию внутри происхождения.
        let mut layer_orders: HashMap<&str, u32> = HashMap::new();
        for (sheet, _) in sheets {
            for name in &sheet.layer_names {
                let next = layer_orders.len() as u32;
                layer_orders.entry(name.as_str()).or_insert(next);
            }
        }

        let mut source_order = 0u32;
        for (sheet, scope) in sheets {
            for rule in &sheet.rules {
                self.invalidation.add_rule(rule);
                if !rule.media_matches(viewport_width, viewport_height) {
                    continue;
                }
                let layer_order = match &rule.layer {
                    Some(name) => layer_orders.get(name.as_str()).copied().unwrap_or(u32::MAX),
                    None => u32::MAX,
                };
                for (selector_index, selector) in rule.selectors.0.iter().enumerate() {
                    let entry = RuleEntry {
                        rule: Arc::clone(rule),
                        selector_index,
                        origin,
                        scope: *scope,
                        layer_order,
                        specificity: selector.specificity,
                        source_order,
                    };
                    self.add_entry(entry, &selector.subject);
                }
                source_order += 1;
            }
        }
    }

    fn add_entry(&mut self, entry: RuleEntry, subject: &Compound) {
        self.entry_count += 1;

        if let Some(pseudo) = subject.pseudo_element {
            self.pseudo_element_rules.entry(pseudo).or_default().push(entry);
            return;
        }

        match bucket_keys(subject) {
            Some(keys) => {
                for key in keys {
                    self.insert_by_key(entry.clone(), key);
                }
            }
            None => self.other_rules.push(entry),
        }
    }

    fn insert_by_key(&mut self, entry: RuleEntry, key: BucketKey) {
        match key {
            BucketKey::Id(id) => self.id_buckets.entry(id).or_default().push(entry),
            BucketKey::Class(class) => self.class_buckets.entry(class).or_default().push(entry),
            BucketKey::Tag(tag) => self.tag_buckets.entry(tag).or_default().push(entry),
            BucketKey::Attribute(name) => {
                self.attribute_buckets.entry(name).or_default().push(entry)
            }
            BucketKey::Root => self.root_rules.push(entry),
            BucketKey::Other => self.other_rules.push(entry),
        }
    }

    /// Собирает правила, совпадающие на элементе (или его
    /// псевдоэлементе). Кандидаты берутся только из подходящих вёдер,
    /// затем проходят отсев фильтром предков и точный матчинг.
    pub fn collect_matching(
        &self,
        document: &Document,
        element_id: ElementId,
        pseudo: Option<PseudoElement>,
        filter: Option<&BloomFilter>,
    ) -> Vec<MatchedRule> {
        let Some(element) = document.element(element_id) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let element_scope = element.scope;
        let mut probe = |entries: &[RuleEntry]| {
            for entry in entries {
                // Правило чужой области не видит элемент.
                if entry.scope.is_some_and(|scope| scope != element_scope) {
                    continue;
                }
                let key = (Arc::as_ptr(&entry.rule) as usize, entry.selector_index);
                if seen.contains(&key) {
                    continue;
                }
                let selector = &entry.rule.selectors.0[entry.selector_index];
                if let Some(filter) = filter {
                    if !may_match(selector, filter) {
                        continue;
                    }
                }
                if matches_complex(document, element_id, selector, pseudo) {
                    seen.insert(key);
                    matched.push(MatchedRule {
                        rule: Arc::clone(&entry.rule),
                        origin: entry.origin,
                        layer_order: entry.layer_order,
                        specificity: entry.specificity,
                        source_order: entry.source_order,
                    });
                }
            }
        };

        if let Some(pseudo) = pseudo {
            if let Some(entries) = self.pseudo_element_rules.get(&pseudo) {
                probe(entries);
            }
            return matched;
        }

        if let Some(id) = &element.id {
            if let Some(entries) = self.id_buckets.get(id) {
                probe(entries);
            }
        }
        for class in &element.classes {
            if let Some(entries) = self.class_buckets.get(class) {
                probe(entries);
            }
        }
        if let Some(entries) = self.tag_buckets.get(&element.tag_name) {
            probe(entries);
        }
        for name in element.attributes.keys() {
            if let Some(entries) = self.attribute_buckets.get(name) {
                probe(entries);
            }
        }
        if document.is_root(element_id) {
            probe(&self.root_rules);
        }
        probe(&self.other_rules);

        matched
    }

    /// Может ли данное изменение повлиять на результаты матчинга.
    pub fn needs_restyle(&self, change: &StyleChange) -> bool {
        self.invalidation.affects(change)
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entry_count
    }
}

/// Выбирает вёдра для субъектного компаунда.
///
/// Симплы перебираются с конца: побеждает первый id, иначе первый
/// класс, иначе тег, иначе имя атрибута, иначе `:root`. Субъект из
/// одного `:is()`/`:where()` с простыми компаундами-аргументами
/// раскладывается по ведру каждого аргумента.
fn bucket_keys(subject: &Compound) -> Option<Vec<BucketKey>> {
    if let Some(key) = direct_bucket_key(subject) {
        return Some(vec![key]);
    }

    if let [SimpleSelector::PseudoClass(PseudoClass::Is(args) | PseudoClass::Where(args))] =
        subject.simples.as_slice()
    {
        let mut keys = Vec::with_capacity(args.len());
        for arg in args {
            if !arg.ancestors.is_empty() || arg.subject.pseudo_element.is_some() {
                return None;
            }
            keys.push(direct_bucket_key(&arg.subject)?);
        }
        return Some(keys);
    }

    None
}

fn direct_bucket_key(subject: &Compound) -> Option<BucketKey> {
    let find = |predicate: fn(&SimpleSelector) -> Option<BucketKey>| {
        subject.simples.iter().rev().find_map(predicate)
    };

    find(|simple| match simple {
        SimpleSelector::Id(id) => Some(BucketKey::Id(id.clone())),
        _ => None,
    })
    .or_else(|| {
        find(|simple| match simple {
            SimpleSelector::Class(class) => Some(BucketKey::Class(class.clone())),
            _ => None,
        })
    })
    .or_else(|| {
        find(|simple| match simple {
            SimpleSelector::Tag(tag) => Some(BucketKey::Tag(tag.clone())),
            _ => None,
        })
    })
    .or_else(|| {
        find(|simple| match simple {
            SimpleSelector::Attribute(attr) => Some(BucketKey::Attribute(attr.name.clone())),
            _ => None,
        })
    })
    .or_else(|| {
        subject
            .simples
            .iter()
            .any(|simple| matches!(simple, SimpleSelector::PseudoClass(PseudoClass::Root)))
            .then_some(BucketKey::Root)
    })
}

/// Изменение элемента, о котором движку сообщили снаружи.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleChange {
    Id(String),
    Class(String),
    Tag(String),
    Attribute(String),
    /// Смена интерактивного состояния (hover/focus/...).
    State,
}

/// Имена, встречающиеся в селекторах: ответ на вопрос «может ли это
/// изменение что-то перематчить».
#[derive(Debug, Clone, Default)]
pub struct InvalidationSet {
    ids: HashSet<String>,
    classes: HashSet<String>,
    tags: HashSet<String>,
    attributes: HashSet<String>,
    uses_state: bool,
}

impl InvalidationSet {
    fn add_rule(&mut self, rule: &StyleRule) {
        for selector in &rule.selectors.0 {
            self.add_compound(&selector.subject);
            for (_, compound) in &selector.ancestors {
                self.add_compound(compound);
            }
        }
    }

    fn add_compound(&mut self, compound: &Compound) {
        for simple in &compound.simples {
            match simple {
                SimpleSelector::Universal => {}
                SimpleSelector::Tag(tag) => {
                    self.tags.insert(tag.clone());
                }
                SimpleSelector::Id(id) => {
                    self.ids.insert(id.clone());
                }
                SimpleSelector::Class(class) => {
                    self.classes.insert(class.clone());
                }
                SimpleSelector::Attribute(attr) => {
                    self.attributes.insert(attr.name.clone());
                }
                SimpleSelector::PseudoClass(pseudo) => self.add_pseudo(pseudo),
            }
        }
    }

    fn add_pseudo(&mut self, pseudo: &PseudoClass) {
        match pseudo {
            PseudoClass::Hover
            | PseudoClass::Focus
            | PseudoClass::Active
            | PseudoClass::Link
            | PseudoClass::Visited => self.uses_state = true,
            PseudoClass::Not(args) | PseudoClass::Is(args) | PseudoClass::Where(args) => {
                for arg in args {
                    self.add_compound(&arg.subject);
                    for (_, compound) in &arg.ancestors {
                        self.add_compound(compound);
                    }
                }
            }
            _ => {}
        }
    }

    fn affects(&self, change: &StyleChange) -> bool {
        match change {
            StyleChange::Id(id) => self.ids.contains(id),
            StyleChange::Class(class) => self.classes.contains(class),
            StyleChange::Tag(tag) => self.tags.contains(tag),
            StyleChange::Attribute(name) => self.attributes.contains(name),
            StyleChange::State => self.uses_state,
        }
    }
}

/// Счётный фильтр Блума, поддерживаемый push/pop при обходе дерева.
pub struct AncestorFilter {
    filter: BloomFilter,
    stack: Vec<Vec<u32>>,
}

impl fmt::Debug for AncestorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AncestorFilter")
            .field("depth", &self.stack.len())
            .finish()
    }
}

impl Default for AncestorFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AncestorFilter {
    pub fn new() -> Self {
        Self { filter: BloomFilter::new(), stack: Vec::new() }
    }

    /// Элемент становится предком: его хеши входят в фильтр.
    pub fn push(&mut self, element: &Element) {
        let hashes = element_filter_hashes(element);
        for &hash in &hashes {
            self.filter.insert_hash(hash);
        }
        self.stack.push(hashes);
    }

    /// Откат последнего push при возврате вверх по дереву.
    pub fn pop(&mut self) {
        if let Some(hashes) = self.stack.pop() {
            for hash in hashes {
                self.filter.remove_hash(hash);
            }
        }
    }

    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
