//! Модель веб-шрифтов: @font-face, подбор начертания, кеш fontdue.
//!
//! Спецификация: https://www.w3.org/TR/css-fonts-4/

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cssparser::{ParseError, Parser, Token};

/// Формат файла шрифта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    TrueType,
    OpenType,
    Woff,
    Woff2,
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrueType => write!(f, "truetype"),
            Self::OpenType => write!(f, "opentype"),
            Self::Woff => write!(f, "woff"),
            Self::Woff2 => write!(f, "woff2"),
        }
    }
}

impl FontFormat {
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_ascii_lowercase().as_str() {
            "truetype" | "ttf" => Some(Self::TrueType),
            "opentype" | "otf" => Some(Self::OpenType),
            "woff" => Some(Self::Woff),
            "woff2" => Some(Self::Woff2),
            _ => None,
        }
    }

    /// Декодируем ли формат напрямую через fontdue.
    pub fn is_decodable(&self) -> bool {
        matches!(self, Self::TrueType | Self::OpenType)
    }
}

/// Источник шрифта из дескриптора `src`.
#[derive(Debug, Clone, PartialEq)]
pub enum FontFaceSource {
    Url { url: String, format: Option<FontFormat> },
    Local { name: String },
}

/// Наклон шрифта.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontSlope {
    #[default]
    Normal,
    Italic,
    Oblique,
}

impl fmt::Display for FontSlope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Italic => write!(f, "italic"),
            Self::Oblique => write!(f, "oblique"),
        }
    }
}

impl FromStr for FontSlope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "italic" => Ok(Self::Italic),
            "oblique" => Ok(Self::Oblique),
            _ => Err(()),
        }
    }
}

/// Unicode-диапазон подмножества шрифта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeRange {
    pub start: u32,
    pub end: u32,
}

impl UnicodeRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        (self.start..=self.end).contains(&codepoint)
    }

    /// Разбирает одиночный диапазон: `U+4E00-9FFF`, `U+26`, `U+4??`.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text
            .trim()
            .strip_prefix("U+")
            .or_else(|| text.trim().strip_prefix("u+"))?;
        if let Some((start, end)) = body.split_once('-') {
            let start = u32::from_str_radix(start, 16).ok()?;
            let end = u32::from_str_radix(end, 16).ok()?;
            (start <= end).then(|| Self::new(start, end))
        } else if body.contains('?') {
            let start = u32::from_str_radix(&body.replace('?', "0"), 16).ok()?;
            let end = u32::from_str_radix(&body.replace('?', "F"), 16).ok()?;
            Some(Self::new(start, end))
        } else {
            let point = u32::from_str_radix(body, 16).ok()?;
            Some(Self::new(point, point))
        }
    }
}

/// Ключ начертания: семейство (в нижнем регистре), вес и наклон.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontFaceKey {
    pub family: String,
    pub weight: u16,
    pub slope: FontSlope,
}

impl FontFaceKey {
    pub fn new(family: &str, weight: u16, slope: FontSlope) -> Self {
        Self {
            family: family.to_ascii_lowercase(),
            weight,
            slope,
        }
    }
}

/// Определение `@font-face`.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFace {
    pub family: String,
    pub sources: Vec<FontFaceSource>,
    pub weight: u16,
    pub slope: FontSlope,
    pub unicode_ranges: Vec<UnicodeRange>,
}

impl FontFace {
    pub fn new(family: String) -> Self {
        Self {
            family,
            sources: Vec::new(),
            weight: 400,
            slope: FontSlope::default(),
            unicode_ranges: Vec::new(),
        }
    }

    pub fn key(&self) -> FontFaceKey {
        FontFaceKey::new(&self.family, self.weight, self.slope)
    }

    /// Источники, которые загрузчик в состоянии получить и декодировать.
    pub fn loadable_sources(&self) -> Vec<FontFaceSource> {
        self.sources
            .iter()
            .filter(|source| match source {
                FontFaceSource::Url { format, .. } => {
                    format.map(|f| f.is_decodable()).unwrap_or(true)
                }
                FontFaceSource::Local { .. } => false,
            })
            .cloned()
            .collect()
    }

    /// Разбирает тело блока `@font-face`.
    pub fn parse_block<'i>(input: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i, ()>> {
        let mut family: Option<String> = None;
        let mut sources = Vec::new();
        let mut weight = 400u16;
        let mut slope = FontSlope::default();
        let mut unicode_ranges = Vec::new();

        while !input.is_exhausted() {
            input.skip_whitespace();

            let name = match input.next() {
                Ok(Token::Ident(ident)) => ident.to_ascii_lowercase(),
                Ok(_) => continue,
                Err(_) => break,
            };

            input.skip_whitespace();
            if input.expect_colon().is_err() {
                continue;
            }
            input.skip_whitespace();

            match name.as_str() {
                "font-family" => {
                    if let Ok(token) = input.next() {
                        match token {
                            Token::QuotedString(s) => family = Some(s.to_string()),
                            Token::Ident(s) => family = Some(s.to_string()),
                            _ => {}
                        }
                    }
                }
                "src" => {
                    sources = parse_sources(input)?;
                }
                "font-weight" => {
                    if let Ok(token) = input.next() {
                        let parsed = match token {
                            Token::Ident(s) => match s.to_ascii_lowercase().as_str() {
                                "normal" => Some(400),
                                "bold" => Some(700),
                                _ => None,
                            },
                            Token::Number { int_value: Some(n), .. }
                                if (1..=1000).contains(n) =>
                            {
                                Some(*n as u16)
                            }
                            _ => None,
                        };
                        if let Some(w) = parsed {
                            weight = w;
                        }
                    }
                }
                "font-style" => {
                    if let Ok(Token::Ident(s)) = input.next()
                        && let Ok(parsed) = s.as_ref().parse::<FontSlope>()
                    {
                        slope = parsed;
                    }
                }
                "unicode-range" => {
                    unicode_ranges = parse_unicode_ranges(input)?;
                }
                other => {
                    tracing::debug!("ignoring @font-face descriptor `{other}`");
                    skip_declaration_value(input);
                }
            }

            let _ = input.try_parse(|i| i.expect_semicolon());
            input.skip_whitespace();
        }

        match family {
            Some(family) if !sources.is_empty() => Ok(Self {
                family,
                sources,
                weight,
                slope,
                unicode_ranges,
            }),
            _ => Err(input.new_custom_error(())),
        }
    }
}

fn skip_declaration_value(input: &mut Parser<'_, '_>) {
    while let Ok(token) = input.next() {
        if matches!(token, Token::Semicolon) {
            break;
        }
    }
}

/// Разбирает список источников дескриптора `src`.
fn parse_sources<'i>(
    input: &mut Parser<'i, '_>,
) -> Result<Vec<FontFaceSource>, ParseError<'i, ()>> {
    let mut sources = Vec::new();

    loop {
        input.skip_whitespace();

        let source: Result<FontFaceSource, ParseError<'i, ()>> = input.try_parse(|input| {
            let source = match input.next()?.clone() {
                Token::UnquotedUrl(url) => FontFaceSource::Url { url: url.to_string(), format: None },
                Token::Function(name) => {
                    let function = name.to_ascii_lowercase();
                    input.parse_nested_block(|args| match function.as_str() {
                        "url" => match args.next()? {
                            Token::QuotedString(s) | Token::UnquotedUrl(s) => {
                                Ok(FontFaceSource::Url { url: s.to_string(), format: None })
                            }
                            _ => Err(args.new_custom_error(())),
                        },
                        "local" => match args.next()? {
                            Token::QuotedString(s) | Token::Ident(s) => {
                                Ok(FontFaceSource::Local { name: s.to_string() })
                            }
                            _ => Err(args.new_custom_error(())),
                        },
                        _ => Err(args.new_custom_error(())),
                    })?
                }
                _ => return Err(input.new_custom_error(())),
            };

            // format() стоит снаружи url().
            input.skip_whitespace();
            let format = if input
                .try_parse(|i| i.expect_function_matching("format"))
                .is_ok()
            {
                input.parse_nested_block(|args| {
                    let hint = match args.next()? {
                        Token::QuotedString(s) | Token::Ident(s) => s.to_string(),
                        _ => return Err(args.new_custom_error::<(), ()>(())),
                    };
                    Ok(FontFormat::from_hint(&hint))
                })?
            } else {
                None
            };

            Ok(match source {
                FontFaceSource::Url { url, .. } => FontFaceSource::Url { url, format },
                local => local,
            })
        });

        match source {
            Ok(source) => {
                sources.push(source);
                input.skip_whitespace();
                if input.try_parse(|i| i.expect_comma()).is_err() {
                    break;
                }
            }
            Err(_) if sources.is_empty() => return Err(input.new_custom_error(())),
            Err(_) => break,
        }
    }

    Ok(sources)
}

/// Разбирает `unicode-range` как список текстовых диапазонов.
fn parse_unicode_ranges<'i>(
    input: &mut Parser<'i, '_>,
) -> Result<Vec<UnicodeRange>, ParseError<'i, ()>> {
    // Токенизация U+XXXX капризна, поэтому читаем значение текстом.
    let start = input.position();
    while let Ok(token) = input.next() {
        if matches!(token, Token::Semicolon) {
            break;
        }
    }
    let text = input.slice_from(start);
    let text = text.trim_end_matches(';');

    let mut ranges = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match UnicodeRange::parse(part) {
            Some(range) => ranges.push(range),
            None => return Err(input.new_custom_error(())),
        }
    }
    if ranges.is_empty() {
        return Err(input.new_custom_error(()));
    }
    Ok(ranges)
}

/// Подбор веса по алгоритму font matching.
///
/// Для цели в диапазоне 400..=500: вверх до 500, затем вниз от цели,
/// затем вверх от 500. Для цели < 400 — сначала вниз, потом вверх.
/// Для цели > 500 — сначала вверх, потом вниз.
pub fn select_weight(available: &[u16], target: u16) -> Option<u16> {
    if available.is_empty() {
        return None;
    }
    let mut weights = available.to_vec();
    weights.sort_unstable();
    weights.dedup();

    if weights.binary_search(&target).is_ok() {
        return Some(target);
    }

    let below = || weights.iter().rev().find(|&&w| w < target).copied();
    let above = || weights.iter().find(|&&w| w > target).copied();

    if (400..=500).contains(&target) {
        // Вверх в пределах 500.
        if let Some(w) = weights.iter().find(|&&w| w > target && w <= 500).copied() {
            return Some(w);
        }
        below().or_else(above)
    } else if target < 400 {
        below().or_else(above)
    } else {
        above().or_else(below)
    }
}

/// Кеш шрифтов: объявленные начертания и декодированные fontdue-шрифты.
#[derive(Clone, Default)]
pub struct FontCache {
    faces: Vec<FontFace>,
    loaded: HashMap<FontFaceKey, Arc<fontdue::Font>>,
}

// fontdue::Font не реализует Debug.
impl fmt::Debug for FontCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontCache")
            .field("faces", &self.faces)
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_faces(&mut self) {
        self.faces.clear();
    }

    pub fn register_face(&mut self, face: FontFace) {
        if !self.faces.contains(&face) {
            self.faces.push(face);
        }
    }

    pub fn faces(&self) -> &[FontFace] {
        &self.faces
    }

    /// Подбирает объявленное начертание под запрошенные параметры.
    pub fn find_matching_face(
        &self,
        family: &str,
        weight: u16,
        slope: FontSlope,
    ) -> Option<&FontFace> {
        let family = family.to_ascii_lowercase();
        let candidates: Vec<&FontFace> = self
            .faces
            .iter()
            .filter(|face| face.family.eq_ignore_ascii_case(&family) && face.slope == slope)
            .collect();
        let weights: Vec<u16> = candidates.iter().map(|face| face.weight).collect();
        let chosen = select_weight(&weights, weight)?;
        candidates.into_iter().find(|face| face.weight == chosen)
    }

    pub fn insert_loaded(&mut self, key: FontFaceKey, font: Arc<fontdue::Font>) {
        self.loaded.insert(key, font);
    }

    pub fn loaded_font(&self, key: &FontFaceKey) -> Option<Arc<fontdue::Font>> {
        self.loaded.get(key).cloned()
    }

    pub fn is_loaded(&self, key: &FontFaceKey) -> bool {
        self.loaded.contains_key(key)
    }

    /// Декодирует шрифт из байтов.
    pub fn decode(bytes: &[u8]) -> Result<fontdue::Font, String> {
        fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| e.to_string())
    }
}
