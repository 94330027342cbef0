//! Минимальное дерево элементов, над которым работает движок стилей.
//!
//! Движок не парсит HTML: дерево строится вызывающей стороной через
//! [`Document::create_root`] и [`Document::append_child`]. Владение —
//! древовидное: все элементы лежат в плоском массиве документа, связи
//! выражены индексами [`ElementId`], без обратных ссылок.

use std::collections::HashMap;

use bitflags::bitflags;

/// Индекс элемента внутри [`Document`].
pub type ElementId = usize;

/// Область стилей: основное дерево документа или теневое поддерево.
///
/// Авторские таблицы привязываются к области; правила из одной области
/// не видят элементы другой. UA и пользовательские таблицы действуют
/// везде.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopeId {
    #[default]
    Document,
    /// Теневой корень с порядковым номером внутри документа.
    Shadow(u32),
}

bitflags! {
    /// Интерактивное состояние элемента (для `:hover`, `:focus` и т.п.).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ElementState: u8 {
        const HOVER   = 1 << 0;
        const FOCUS   = 1 << 1;
        const ACTIVE  = 1 << 2;
        const LINK    = 1 << 3;
        const VISITED = 1 << 4;
    }
}

/// Один элемент дерева.
#[derive(Debug, Clone)]
pub struct Element {
    /// Имя тега в нижнем регистре.
    pub tag_name: String,
    /// Значение атрибута `id`, если есть.
    pub id: Option<String>,
    /// Список классов из атрибута `class`.
    pub classes: Vec<String>,
    /// Остальные атрибуты (включая исходные `id` и `class`).
    pub attributes: HashMap<String, String>,
    /// Текст атрибута `style`, если есть.
    pub inline_style: Option<String>,
    /// Интерактивное состояние.
    pub state: ElementState,
    /// Область стилей; дети наследуют её от родителя.
    pub scope: ScopeId,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    /// Есть ли у элемента текстовое содержимое (для `:empty`).
    pub has_text: bool,
}

impl Element {
    fn new(tag_name: &str, parent: Option<ElementId>) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            attributes: HashMap::new(),
            inline_style: None,
            state: ElementState::default(),
            scope: ScopeId::default(),
            parent,
            children: Vec::new(),
            has_text: false,
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Документ: плоское хранилище элементов плюс корень.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub elements: Vec<Element>,
    pub root: Option<ElementId>,
    next_shadow: u32,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создаёт корневой элемент. Предыдущее дерево отбрасывается.
    pub fn create_root(&mut self, tag_name: &str) -> ElementId {
        self.elements.clear();
        self.next_shadow = 0;
        self.elements.push(Element::new(tag_name, None));
        self.root = Some(0);
        0
    }

    /// Добавляет дочерний элемент к `parent` и возвращает его индекс.
    /// Область стилей наследуется от родителя.
    pub fn append_child(&mut self, parent: ElementId, tag_name: &str) -> ElementId {
        let id = self.elements.len();
        let scope = self.elements.get(parent).map(|p| p.scope).unwrap_or_default();
        let mut element = Element::new(tag_name, Some(parent));
        element.scope = scope;
        self.elements.push(element);
        if let Some(parent_element) = self.elements.get_mut(parent) {
            parent_element.children.push(id);
        }
        id
    }

    /// Выделяет новую теневую область стилей.
    pub fn create_shadow_scope(&mut self) -> ScopeId {
        self.next_shadow += 1;
        ScopeId::Shadow(self.next_shadow)
    }

    /// Добавляет корень теневого поддерева: сам элемент и его будущие
    /// потомки живут в `scope`.
    pub fn append_child_in_scope(
        &mut self,
        parent: ElementId,
        tag_name: &str,
        scope: ScopeId,
    ) -> ElementId {
        let id = self.append_child(parent, tag_name);
        if let Some(element) = self.elements.get_mut(id) {
            element.scope = scope;
        }
        id
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    pub fn is_root(&self, id: ElementId) -> bool {
        self.root == Some(id)
    }

    /// Устанавливает атрибут, обновляя денормализованные `id`/`classes`.
    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) {
        let Some(element) = self.elements.get_mut(id) else {
            return;
        };
        match name {
            "id" => element.id = Some(value.to_string()),
            "class" => {
                element.classes = value.split_ascii_whitespace().map(str::to_string).collect();
            }
            "style" => element.inline_style = Some(value.to_string()),
            _ => {}
        }
        element.attributes.insert(name.to_string(), value.to_string());
    }

    pub fn set_state(&mut self, id: ElementId, state: ElementState) {
        if let Some(element) = self.elements.get_mut(id) {
            element.state = state;
        }
    }

    pub fn parent_of(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(id).and_then(|e| e.parent)
    }

    /// Итератор по предкам, от родителя к корню.
    pub fn ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        let mut current = self.parent_of(id);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.parent_of(next);
            Some(next)
        })
    }

    /// Позиция элемента среди детей родителя (1-based), как в `:nth-child`.
    pub fn child_index(&self, id: ElementId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        let siblings = &self.elements.get(parent)?.children;
        siblings.iter().position(|&c| c == id).map(|i| i + 1)
    }

    /// Предыдущий соседний элемент.
    pub fn previous_sibling(&self, id: ElementId) -> Option<ElementId> {
        let index = self.child_index(id)?;
        if index < 2 {
            return None;
        }
        let parent = self.parent_of(id)?;
        self.elements.get(parent)?.children.get(index - 2).copied()
    }

    /// Все соседи до данного элемента, в порядке документа.
    pub fn earlier_siblings(&self, id: ElementId) -> Vec<ElementId> {
        let Some(parent) = self.parent_of(id) else {
            return Vec::new();
        };
        let Some(parent_element) = self.elements.get(parent) else {
            return Vec::new();
        };
        parent_element
            .children
            .iter()
            .copied()
            .take_while(|&c| c != id)
            .collect()
    }

    /// Обход дерева в порядке документа (pre-order).
    pub fn traverse(&self) -> Vec<ElementId> {
        let mut order = Vec::with_capacity(self.elements.len());
        let Some(root) = self.root else {
            return order;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(element) = self.elements.get(id) {
                for &child in element.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        order
    }
}
