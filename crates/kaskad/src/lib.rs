//! Kaskad — движок разрешения CSS-стилей.
//!
//! Крейт вычисляет стили элементов и псевдоэлементов документа:
//! матчинг селекторов с быстрым отсевом, каскад по происхождениям и
//! слоям (включая `revert`/`revert-layer`), подстановка кастомных
//! свойств, наследование и дефолтинг, подбор и асинхронная загрузка
//! шрифтов, абсолютизация единиц и CSS-переходы. Раскладка и
//! отрисовка — потребители результата, здесь их нет.
//!
//! ```no_run
//! use kaskad::{Document, StyleEngine};
//!
//! let mut doc = Document::new();
//! let html = doc.create_root("html");
//! let body = doc.append_child(html, "body");
//!
//! let mut engine = StyleEngine::new();
//! engine.add_author_stylesheet("body { color: #333; font-size: 18px; }")?;
//! engine.resolve_styles(&doc, 0.0);
//!
//! let style = engine.computed_style(body, None).unwrap();
//! assert_eq!(style.font_size(), 18.0);
//! # Ok::<(), kaskad::StyleError>(())
//! ```

pub mod dom;
pub mod style;

pub use dom::{Document, Element, ElementId, ElementState, ScopeId};
pub use style::compute::ComputedStyle;
pub use style::selector::PseudoElement;
pub use style::{CascadeOrigin, StyleEngine, StyleError};
