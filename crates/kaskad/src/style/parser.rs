//! Парсер таблиц стилей поверх `cssparser`.
//!
//! Поддерживаются обычные правила, `@media`, `@layer` (блочная форма и
//! форма-утверждение) и `@font-face`. Значения деклараций сохраняются
//! сырым текстом: раскрытие шортхендов и подстановка `var()` происходят
//! на этапе каскада.

use std::fmt;
use std::sync::Arc;

use cssparser::{CowRcStr, Parser, ParserInput, ParserState, StyleSheetParser, Token};
use thiserror::Error;

use super::fonts::FontFace;
use super::keyframes::KeyframesRule;
use super::media::MediaQuery;
use super::properties::{expand_declaration, Declaration};
use super::selector::SelectorList;

/// Настройки парсинга стилей.
#[derive(Debug, Clone, Copy)]
pub struct CssParseOptions {
    /// Разрешать ли продолжать парсинг после ошибок (по умолчанию — `true`).
    pub recover_from_errors: bool,
}

impl Default for CssParseOptions {
    fn default() -> Self {
        Self { recover_from_errors: true }
    }
}

/// Высокоуровневая ошибка парсинга CSS.
#[derive(Debug, Error, Clone)]
pub enum CssParseError {
    #[error("CSS parse error: {0}")]
    Syntax(String),
}

/// Одно правило: селекторы, декларации и условия применимости.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selectors: SelectorList,
    pub declarations: Vec<Declaration>,
    /// Полное имя слоя (`outer.inner`); `None` — вне слоёв.
    pub layer: Option<String>,
    /// Конъюнкция медиа-запросов объемлющих `@media`.
    pub media: Vec<MediaQuery>,
}

impl StyleRule {
    /// Применимо ли правило при данном вьюпорте.
    pub fn media_matches(&self, viewport_width: f32, viewport_height: f32) -> bool {
        self.media
            .iter()
            .all(|query| query.evaluate(viewport_width, viewport_height))
    }
}

/// Разобранная таблица стилей.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    pub rules: Vec<Arc<StyleRule>>,
    pub font_faces: Vec<FontFace>,
    pub keyframes: Vec<KeyframesRule>,
    /// Имена слоёв в порядке первого упоминания.
    pub layer_names: Vec<String>,
}

impl Stylesheet {
    /// Парсит текст таблицы. При `recover_from_errors` ошибки
    /// накапливаются, но уцелевшие правила сохраняются.
    pub fn parse(css: &str, options: CssParseOptions) -> Result<Self, CssParseError> {
        let mut sheet = Stylesheet::default();

        {
            let mut input = ParserInput::new(css);
            let mut parser = Parser::new(&mut input);
            let mut collector = RuleCollector {
                sheet: &mut sheet,
                layer: None,
                media: Vec::new(),
            };

            let mut rules = StyleSheetParser::new(&mut parser, &mut collector);
            for result in &mut rules {
                if let Err((err, slice)) = result {
                    let message = format!("{} (near `{}`)", err, slice.trim());
                    if options.recover_from_errors {
                        tracing::debug!("skipping rule: {message}");
                    } else {
                        return Err(CssParseError::Syntax(message));
                    }
                }
            }
        }

        Ok(sheet)
    }

    fn register_layer(&mut self, name: &str) {
        if !self.layer_names.iter().any(|existing| existing == name) {
            self.layer_names.push(name.to_string());
        }
    }
}

/// Парсит значение атрибута `style`.
pub fn parse_inline_declarations(inline: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(inline);
    let mut parser = Parser::new(&mut input);
    parse_declarations_from_parser(&mut parser)
}

#[derive(Debug, Clone)]
enum RuleParseError {
    EmptySelector,
    InvalidSelector(String),
    UnsupportedAtRule(String),
    InvalidAtRule(String),
}

impl fmt::Display for RuleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleParseError::EmptySelector => write!(f, "selector cannot be empty"),
            RuleParseError::InvalidSelector(reason) => write!(f, "{reason}"),
            RuleParseError::UnsupportedAtRule(name) => write!(f, "unsupported at-rule @{name}"),
            RuleParseError::InvalidAtRule(reason) => write!(f, "{reason}"),
        }
    }
}

/// Прелюдия at-правила.
enum AtPrelude {
    Media(MediaQuery),
    Layer(Vec<String>),
    FontFace,
    Keyframes(String),
}

/// Коллекционер правил: пишет прямо в `Stylesheet`, таща контекст
/// текущего слоя и объемлющих медиа-запросов.
struct RuleCollector<'a> {
    sheet: &'a mut Stylesheet,
    layer: Option<String>,
    media: Vec<MediaQuery>,
}

impl RuleCollector<'_> {
    fn qualified_layer(&self, name: &str) -> String {
        match &self.layer {
            Some(outer) => format!("{outer}.{name}"),
            None => name.to_string(),
        }
    }

    fn parse_nested(
        &mut self,
        input: &mut Parser<'_, '_>,
        layer: Option<String>,
        media: Vec<MediaQuery>,
    ) {
        let mut child = RuleCollector { sheet: &mut *self.sheet, layer, media };
        let mut rules = StyleSheetParser::new(input, &mut child);
        for result in &mut rules {
            if let Err((err, slice)) = result {
                tracing::debug!("skipping nested rule: {} (near `{}`)", err, slice.trim());
            }
        }
    }
}

impl<'i> cssparser::QualifiedRuleParser<'i> for RuleCollector<'_> {
    type Prelude = SelectorList;
    type QualifiedRule = ();
    type Error = RuleParseError;

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, cssparser::ParseError<'i, Self::Error>> {
        let selector_text = prelude_text(input);
        if selector_text.is_empty() {
            return Err(input.new_custom_error(RuleParseError::EmptySelector));
        }
        SelectorList::parse(&selector_text).map_err(|err| {
            input.new_custom_error(RuleParseError::InvalidSelector(err.to_string()))
        })
    }

    fn parse_block<'t>(
        &mut self,
        selectors: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, cssparser::ParseError<'i, Self::Error>> {
        let declarations = parse_declarations_from_parser(input);
        self.sheet.rules.push(Arc::new(StyleRule {
            selectors,
            declarations,
            layer: self.layer.clone(),
            media: self.media.clone(),
        }));
        Ok(())
    }
}

impl<'i> cssparser::AtRuleParser<'i> for RuleCollector<'_> {
    type Prelude = AtPrelude;
    type AtRule = ();
    type Error = RuleParseError;

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, cssparser::ParseError<'i, Self::Error>> {
        match name.to_ascii_lowercase().as_str() {
            "media" => {
                let text = prelude_text(input);
                let query = MediaQuery::parse(&text).unwrap_or_else(|| {
                    tracing::debug!("unrecognized media prelude `{text}`, never matches");
                    MediaQuery::never()
                });
                Ok(AtPrelude::Media(query))
            }
            "layer" => {
                let text = prelude_text(input);
                let names: Vec<String> = text
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .collect();
                if names.iter().any(|part| part.is_empty()) {
                    return Err(input.new_custom_error(RuleParseError::InvalidAtRule(
                        "empty layer name".to_string(),
                    )));
                }
                Ok(AtPrelude::Layer(names))
            }
            "font-face" => Ok(AtPrelude::FontFace),
            "keyframes" => {
                let name = prelude_text(input);
                if name.is_empty() {
                    return Err(input.new_custom_error(RuleParseError::InvalidAtRule(
                        "@keyframes needs a name".to_string(),
                    )));
                }
                Ok(AtPrelude::Keyframes(name))
            }
            other => Err(input.new_custom_error(RuleParseError::UnsupportedAtRule(
                other.to_string(),
            ))),
        }
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        match prelude {
            // `@layer a, b;` регистрирует порядок слоёв без правил.
            AtPrelude::Layer(names) => {
                for name in names {
                    let qualified = self.qualified_layer(&name);
                    self.sheet.register_layer(&qualified);
                }
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, cssparser::ParseError<'i, Self::Error>> {
        match prelude {
            AtPrelude::Media(query) => {
                let mut media = self.media.clone();
                media.push(query);
                self.parse_nested(input, self.layer.clone(), media);
                Ok(())
            }
            AtPrelude::Layer(names) => {
                let [name] = names.as_slice() else {
                    return Err(input.new_custom_error(RuleParseError::InvalidAtRule(
                        "block form of @layer takes a single name".to_string(),
                    )));
                };
                let qualified = self.qualified_layer(name);
                self.sheet.register_layer(&qualified);
                let media = self.media.clone();
                self.parse_nested(input, Some(qualified), media);
                Ok(())
            }
            AtPrelude::Keyframes(name) => match KeyframesRule::parse_block(name, input) {
                Ok(rule) => {
                    self.sheet.keyframes.push(rule);
                    Ok(())
                }
                Err(_) => Err(input.new_custom_error(RuleParseError::InvalidAtRule(
                    "malformed @keyframes block".to_string(),
                ))),
            },
            AtPrelude::FontFace => match FontFace::parse_block(input) {
                Ok(face) => {
                    self.sheet.font_faces.push(face);
                    Ok(())
                }
                Err(_) => Err(input.new_custom_error(RuleParseError::InvalidAtRule(
                    "malformed @font-face block".to_string(),
                ))),
            },
        }
    }
}

/// Собирает текст прелюдии до начала блока.
///
/// Позиции берутся из исходника, поэтому содержимое вложенных скобок
/// не теряется, даже когда токенайзер перескакивает блок целиком.
fn prelude_text(input: &mut Parser<'_, '_>) -> String {
    let start = input.state();
    while input.next_including_whitespace_and_comments().is_ok() {}
    input.slice_from(start.position()).trim().to_string()
}

/// Декларации тела правила. Значение захватывается сырым срезом
/// исходника, `!important` отрезается текстуально.
pub(super) fn parse_declarations_from_parser(parser: &mut Parser<'_, '_>) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    while !parser.is_exhausted() {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let name = match parser.try_parse(|input| input.expect_ident().map(|i| i.to_string())) {
            Ok(name) => name,
            Err(_) => {
                skip_until_semicolon(parser);
                continue;
            }
        };

        if parser.expect_colon().is_err() {
            skip_until_semicolon(parser);
            continue;
        }

        let value_start = parser.state();
        let mut value_end = parser.state();
        loop {
            let before = parser.state();
            let opens_block = match parser.next_including_whitespace_and_comments() {
                Ok(Token::Semicolon) => {
                    value_end = before;
                    break;
                }
                Ok(token) => matches!(
                    token,
                    Token::Function(_)
                        | Token::ParenthesisBlock
                        | Token::SquareBracketBlock
                        | Token::CurlyBracketBlock
                ),
                Err(_) => {
                    value_end = parser.state();
                    break;
                }
            };
            // Вложенный блок надо съесть сразу, иначе токенайзер
            // перескочит его внутри следующего вызова и срез значения
            // оборвётся на открывающей скобке.
            if opens_block {
                consume_nested_block(parser);
            }
        }

        let raw_value = parser
            .slice(value_start.position()..value_end.position())
            .trim();
        if raw_value.is_empty() {
            continue;
        }

        let (value, important) = split_important(raw_value);
        let declaration = Declaration {
            name,
            value: value.trim().to_string(),
            important,
        };

        // Нераспознанные свойства отбрасываются ещё здесь; кастомные
        // живут до подстановки и не проверяются.
        if !declaration.is_custom() {
            if let Err(err) = expand_declaration(&declaration) {
                tracing::debug!("dropping declaration: {err}");
                continue;
            }
        }
        declarations.push(declaration);
    }

    declarations
}

/// Доводит позицию парсера до закрывающей скобки текущего блока.
fn consume_nested_block<'i>(parser: &mut Parser<'i, '_>) {
    let result: Result<(), cssparser::ParseError<'i, ()>> = parser.parse_nested_block(|nested| {
        while nested.next_including_whitespace_and_comments().is_ok() {}
        Ok(())
    });
    let _ = result;
}

fn skip_until_semicolon(parser: &mut Parser<'_, '_>) {
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        if matches!(token, Token::Semicolon) {
            break;
        }
    }
}

fn split_important(raw: &str) -> (&str, bool) {
    let trimmed = raw.trim_end();
    let lower = trimmed.to_ascii_lowercase();
    if let Some(rest) = lower.strip_suffix("important") {
        let rest = rest.trim_end();
        if let Some(prefix) = rest.strip_suffix('!') {
            return (&trimmed[..prefix.len()], true);
        }
    }
    (raw, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(css: &str) -> Stylesheet {
        Stylesheet::parse(css, CssParseOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_basic_rule() {
        let sheet = parse("div.card { color: red; margin: 4px 8px; }");
        assert_eq!(sheet.rules.len(), 1);
        let rule = &sheet.rules[0];
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(rule.declarations[0].name, "color");
        assert_eq!(rule.declarations[0].value, "red");
        assert!(rule.layer.is_none());
        assert!(rule.media.is_empty());
    }

    #[test]
    fn test_parse_important() {
        let sheet = parse("p { color: red !important; width: 10px; }");
        let rule = &sheet.rules[0];
        assert!(rule.declarations[0].important);
        assert_eq!(rule.declarations[0].value, "red");
        assert!(!rule.declarations[1].important);
    }

    #[test]
    fn test_custom_property_kept_raw() {
        let sheet = parse(":root { --brand: #ff0000; color: var(--brand); }");
        let rule = &sheet.rules[0];
        assert_eq!(rule.declarations[0].name, "--brand");
        assert_eq!(rule.declarations[0].value, "#ff0000");
        assert_eq!(rule.declarations[1].value, "var(--brand)");
    }

    #[test]
    fn test_function_value_captured_whole() {
        let sheet = parse(
            "p { color: rgb(17, 34, 51); width: var(--w, calc(100% - 8px)); margin: 4px; }",
        );
        let rule = &sheet.rules[0];
        // Срез не должен обрываться на открывающей скобке функции.
        assert_eq!(rule.declarations[0].value, "rgb(17, 34, 51)");
        assert_eq!(rule.declarations[1].value, "var(--w, calc(100% - 8px))");
        assert_eq!(rule.declarations[2].value, "4px");
    }

    #[test]
    fn test_unknown_property_dropped() {
        let sheet = parse("p { colr: red; width: 10px; }");
        assert_eq!(sheet.rules[0].declarations.len(), 1);
        assert_eq!(sheet.rules[0].declarations[0].name, "width");
    }

    #[test]
    fn test_invalid_rule_recovered() {
        let sheet = parse("p { color: red; } ??? { } span { color: blue; }");
        assert_eq!(sheet.rules.len(), 2);
    }

    #[test]
    fn test_media_block() {
        let sheet = parse("@media screen and (min-width: 600px) { p { color: red; } }");
        let rule = &sheet.rules[0];
        assert_eq!(rule.media.len(), 1);
        assert!(rule.media_matches(800.0, 600.0));
        assert!(!rule.media_matches(400.0, 600.0));
    }

    #[test]
    fn test_unknown_media_feature_never_matches() {
        let sheet = parse("@media (aspect-ratio: 16/9) { p { color: red; } }");
        assert_eq!(sheet.rules.len(), 1);
        assert!(!sheet.rules[0].media_matches(800.0, 600.0));
    }

    #[test]
    fn test_layer_statement_and_block() {
        let sheet = parse(
            "@layer base, theme;\n\
             @layer theme { p { color: red; } }\n\
             @layer base { p { color: blue; } }",
        );
        assert_eq!(sheet.layer_names, vec!["base", "theme"]);
        assert_eq!(sheet.rules[0].layer.as_deref(), Some("theme"));
        assert_eq!(sheet.rules[1].layer.as_deref(), Some("base"));
    }

    #[test]
    fn test_nested_layer_name_is_qualified() {
        let sheet = parse("@layer outer { @layer inner { p { color: red; } } }");
        assert_eq!(sheet.rules[0].layer.as_deref(), Some("outer.inner"));
        assert!(sheet.layer_names.contains(&"outer.inner".to_string()));
    }

    #[test]
    fn test_layer_statement_inside_non_matching_media_registers() {
        let sheet = parse("@media print { @layer hidden; } @layer visible;");
        assert_eq!(sheet.layer_names, vec!["hidden", "visible"]);
    }

    #[test]
    fn test_font_face_collected() {
        let sheet = parse(
            "@font-face { font-family: 'Demo'; src: url(demo.woff2) format('woff2'); \
             font-weight: 700; }",
        );
        assert_eq!(sheet.font_faces.len(), 1);
        assert_eq!(sheet.font_faces[0].family, "Demo");
        assert_eq!(sheet.font_faces[0].weight, 700);
    }

    #[test]
    fn test_unsupported_at_rule_skipped() {
        let sheet = parse("@supports (display: grid) { div { color: red; } } p { color: red; }");
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn test_keyframes_collected() {
        let sheet = parse(
            "@keyframes slide { from { width: 0px; } to { width: 100px; } } p { color: red; }",
        );
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.keyframes.len(), 1);
        assert_eq!(sheet.keyframes[0].name, "slide");
        assert_eq!(sheet.keyframes[0].keyframes.len(), 2);
        assert_eq!(sheet.keyframes[0].keyframes[1].declarations[0].value, "100px");
    }

    #[test]
    fn test_inline_declarations() {
        let declarations = parse_inline_declarations("color: red; margin: 4px");
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[1].name, "margin");
    }

    #[test]
    fn test_strict_mode_fails_fast() {
        let options = CssParseOptions { recover_from_errors: false };
        assert!(Stylesheet::parse("??? {}", options).is_err());
    }
}
