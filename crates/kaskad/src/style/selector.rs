//! Закрытая модель селекторов: разбор, специфичность и хеши предков.
//!
//! Комплексный селектор хранится «хвостом вперёд»: первым идёт
//! субъектный компаунд, дальше — пары (комбинатор, компаунд) влево по
//! тексту. Такой порядок совпадает с порядком матчинга.

use cssparser::{Parser, ParserInput, Token};
use thiserror::Error;

/// Ошибка разбора селектора.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorParseError {
    #[error("selector cannot be empty")]
    Empty,
    #[error("invalid selector near `{0}`")]
    Invalid(String),
    #[error("unsupported pseudo-class `:{0}`")]
    UnsupportedPseudoClass(String),
    #[error("unsupported pseudo-element `::{0}`")]
    UnsupportedPseudoElement(String),
}

/// Комбинатор между компаундами.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

/// Оператор атрибутного селектора.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    /// `[attr]`
    Exists,
    /// `[attr=v]`
    Equals,
    /// `[attr~=v]`
    Includes,
    /// `[attr|=v]`
    DashMatch,
    /// `[attr^=v]`
    Prefix,
    /// `[attr$=v]`
    Suffix,
    /// `[attr*=v]`
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    /// Имя атрибута в нижнем регистре.
    pub name: String,
    pub operator: AttrOperator,
    pub value: String,
}

/// Поддерживаемые псевдоклассы.
#[derive(Debug, Clone, PartialEq)]
pub enum PseudoClass {
    Root,
    FirstChild,
    LastChild,
    OnlyChild,
    Empty,
    /// `:nth-child(an+b)`
    NthChild(i32, i32),
    Hover,
    Focus,
    Active,
    Link,
    Visited,
    Not(Vec<ComplexSelector>),
    Is(Vec<ComplexSelector>),
    Where(Vec<ComplexSelector>),
}

/// Поддерживаемые псевдоэлементы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
    Placeholder,
    Selection,
}

impl PseudoElement {
    pub const ALL: &'static [PseudoElement] =
        &[Self::Before, Self::After, Self::Placeholder, Self::Selection];

    pub fn from_name(name: &str) -> Option<Self> {
        let pseudo = match name.to_ascii_lowercase().as_str() {
            "before" => Self::Before,
            "after" => Self::After,
            "placeholder" => Self::Placeholder,
            "selection" => Self::Selection,
            _ => return None,
        };
        Some(pseudo)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Placeholder => "placeholder",
            Self::Selection => "selection",
        }
    }
}

/// Простой селектор.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleSelector {
    Universal,
    /// Имя тега в нижнем регистре.
    Tag(String),
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
    PseudoClass(PseudoClass),
}

/// Компаунд: набор простых селекторов без комбинаторов.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound {
    pub simples: Vec<SimpleSelector>,
    pub pseudo_element: Option<PseudoElement>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.simples.is_empty() && self.pseudo_element.is_none()
    }
}

/// Комплексный селектор: субъект плюс цепочка влево.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    pub subject: Compound,
    /// Пары (комбинатор, компаунд) от субъекта влево.
    pub ancestors: Vec<(Combinator, Compound)>,
    /// Упакованная специфичность.
    pub specificity: u32,
    /// Хеши гарантированных предков для быстрого отсева.
    pub ancestor_hashes: Vec<u32>,
}

/// Список селекторов одного правила.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

impl SelectorList {
    /// Разбирает список селекторов из текста.
    pub fn parse(text: &str) -> Result<Self, SelectorParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SelectorParseError::Empty);
        }
        let mut list = Vec::new();
        for part in split_top_level_commas(text) {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorParseError::Empty);
            }
            list.push(parse_complex(part)?);
        }
        Ok(Self(list))
    }
}

/// FNV-1a по байтам.
fn fnv1a(seed: u32, bytes: &[u8]) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

const FNV_OFFSET: u32 = 0x811c_9dc5;

/// Вид компонента, попадающего в фильтр предков.
#[derive(Debug, Clone, Copy)]
pub enum HashKind {
    Tag,
    Id,
    Class,
    AttributeName,
}

/// Хеш компонента для counting-Bloom-фильтра предков.
pub fn ancestor_hash(kind: HashKind, name: &str) -> u32 {
    let salt = match kind {
        HashKind::Tag => b't',
        HashKind::Id => b'i',
        HashKind::Class => b'c',
        HashKind::AttributeName => b'a',
    };
    let seeded = fnv1a(FNV_OFFSET, &[salt]);
    fnv1a(seeded, name.to_ascii_lowercase().as_bytes())
}

fn specificity_of_compound(compound: &Compound) -> (u32, u32, u32) {
    let mut ids = 0;
    let mut classes = 0;
    let mut tags = 0;
    for simple in &compound.simples {
        match simple {
            SimpleSelector::Universal => {}
            SimpleSelector::Tag(_) => tags += 1,
            SimpleSelector::Id(_) => ids += 1,
            SimpleSelector::Class(_) | SimpleSelector::Attribute(_) => classes += 1,
            SimpleSelector::PseudoClass(pseudo) => match pseudo {
                // `:where()` ничего не добавляет; `:is()` и `:not()`
                // берут максимум из аргументов.
                PseudoClass::Where(_) => {}
                PseudoClass::Is(args) | PseudoClass::Not(args) => {
                    let max = args.iter().map(|s| s.specificity).max().unwrap_or(0);
                    ids += (max >> 20) & 0x3ff;
                    classes += (max >> 10) & 0x3ff;
                    tags += max & 0x3ff;
                }
                _ => classes += 1,
            },
        }
    }
    if compound.pseudo_element.is_some() {
        tags += 1;
    }
    (ids, classes, tags)
}

fn pack_specificity(ids: u32, classes: u32, tags: u32) -> u32 {
    (ids.min(0x3ff) << 20) | (classes.min(0x3ff) << 10) | tags.min(0x3ff)
}

fn compute_specificity(subject: &Compound, ancestors: &[(Combinator, Compound)]) -> u32 {
    let (mut ids, mut classes, mut tags) = specificity_of_compound(subject);
    for (_, compound) in ancestors {
        let (i, c, t) = specificity_of_compound(compound);
        ids += i;
        classes += c;
        tags += t;
    }
    pack_specificity(ids, classes, tags)
}

/// Хеши для быстрого отсева: только компаунды, которые гарантированно
/// являются предками субъекта. Обход прекращается на первом
/// сиблинг-комбинаторе.
fn collect_ancestor_hashes(ancestors: &[(Combinator, Compound)]) -> Vec<u32> {
    let mut hashes = Vec::new();
    for (combinator, compound) in ancestors {
        match combinator {
            Combinator::Descendant | Combinator::Child => {}
            Combinator::NextSibling | Combinator::SubsequentSibling => break,
        }
        for simple in &compound.simples {
            match simple {
                SimpleSelector::Tag(tag) if tag != "*" => {
                    hashes.push(ancestor_hash(HashKind::Tag, tag));
                }
                SimpleSelector::Id(id) => hashes.push(ancestor_hash(HashKind::Id, id)),
                SimpleSelector::Class(class) => {
                    hashes.push(ancestor_hash(HashKind::Class, class));
                }
                SimpleSelector::Attribute(attr) => {
                    hashes.push(ancestor_hash(HashKind::AttributeName, &attr.name));
                }
                _ => {}
            }
        }
    }
    hashes
}

/// Разбивает текст по запятым верхнего уровня (вне скобок и строк).
fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        match in_string {
            Some(quote) => {
                current.push(c);
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                '"' | '\'' => {
                    in_string = Some(c);
                    current.push(c);
                }
                ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

fn parse_complex(text: &str) -> Result<ComplexSelector, SelectorParseError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);

    // Последовательность слева направо.
    let mut sequence: Vec<(Compound, Combinator)> = Vec::new();
    let mut current = Compound::default();
    let mut pending_descendant = false;

    let invalid = |what: &str| SelectorParseError::Invalid(what.to_string());

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        // Начало нового компаунда после пробела.
        let mut begin_simple = |current: &mut Compound,
                                sequence: &mut Vec<(Compound, Combinator)>,
                                pending: &mut bool|
         -> Result<(), SelectorParseError> {
            if *pending {
                if current.is_empty() {
                    return Err(invalid(text));
                }
                sequence.push((std::mem::take(current), Combinator::Descendant));
                *pending = false;
            }
            Ok(())
        };

        match token {
            Token::WhiteSpace(_) => {
                if !current.is_empty() {
                    pending_descendant = true;
                }
            }
            Token::Delim(c @ ('>' | '+' | '~')) => {
                if current.is_empty() {
                    return Err(invalid(text));
                }
                let combinator = match c {
                    '>' => Combinator::Child,
                    '+' => Combinator::NextSibling,
                    _ => Combinator::SubsequentSibling,
                };
                sequence.push((std::mem::take(&mut current), combinator));
                pending_descendant = false;
            }
            Token::Delim('.') => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                match parser.next_including_whitespace() {
                    Ok(Token::Ident(name)) => {
                        current.simples.push(SimpleSelector::Class(name.to_string()));
                    }
                    _ => return Err(invalid(text)),
                }
            }
            Token::Delim('*') => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                current.simples.push(SimpleSelector::Universal);
            }
            Token::Ident(name) => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                current
                    .simples
                    .push(SimpleSelector::Tag(name.to_ascii_lowercase()));
            }
            Token::IDHash(name) => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                current.simples.push(SimpleSelector::Id(name.to_string()));
            }
            Token::Hash(name) => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                current.simples.push(SimpleSelector::Id(name.to_string()));
            }
            Token::Colon => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                parse_pseudo(&mut parser, &mut current, text)?;
            }
            Token::SquareBracketBlock => {
                begin_simple(&mut current, &mut sequence, &mut pending_descendant)?;
                let attr = parser
                    .parse_nested_block(|args| {
                        parse_attribute(args).map_err(|_| {
                            args.new_custom_error::<(), ()>(())
                        })
                    })
                    .map_err(|_| invalid(text))?;
                current.simples.push(SimpleSelector::Attribute(attr));
            }
            _ => return Err(invalid(text)),
        }
    }

    if current.is_empty() {
        return Err(SelectorParseError::Empty);
    }

    // Разворачиваем в субъект + цепочку влево.
    let subject = current;
    let mut ancestors: Vec<(Combinator, Compound)> = Vec::with_capacity(sequence.len());
    for (compound, combinator) in sequence.into_iter().rev() {
        ancestors.push((combinator, compound));
    }

    let specificity = compute_specificity(&subject, &ancestors);
    let ancestor_hashes = collect_ancestor_hashes(&ancestors);

    Ok(ComplexSelector {
        subject,
        ancestors,
        specificity,
        ancestor_hashes,
    })
}

fn parse_pseudo(
    parser: &mut Parser<'_, '_>,
    current: &mut Compound,
    text: &str,
) -> Result<(), SelectorParseError> {
    let invalid = || SelectorParseError::Invalid(text.to_string());

    // Второе двоеточие — псевдоэлемент.
    let token = parser.next_including_whitespace().map_err(|_| invalid())?.clone();
    match token {
        Token::Colon => {
            let name = match parser.next_including_whitespace() {
                Ok(Token::Ident(name)) => name.to_string(),
                _ => return Err(invalid()),
            };
            let pseudo = PseudoElement::from_name(&name)
                .ok_or(SelectorParseError::UnsupportedPseudoElement(name))?;
            if current.pseudo_element.is_some() {
                return Err(invalid());
            }
            current.pseudo_element = Some(pseudo);
            Ok(())
        }
        Token::Ident(name) => {
            let lower = name.to_ascii_lowercase();
            // Устаревшая одноколоночная запись псевдоэлементов.
            if let Some(pseudo) = PseudoElement::from_name(&lower) {
                if current.pseudo_element.is_some() {
                    return Err(invalid());
                }
                current.pseudo_element = Some(pseudo);
                return Ok(());
            }
            let pseudo = match lower.as_str() {
                "root" => PseudoClass::Root,
                "first-child" => PseudoClass::FirstChild,
                "last-child" => PseudoClass::LastChild,
                "only-child" => PseudoClass::OnlyChild,
                "empty" => PseudoClass::Empty,
                "hover" => PseudoClass::Hover,
                "focus" => PseudoClass::Focus,
                "active" => PseudoClass::Active,
                "link" => PseudoClass::Link,
                "visited" => PseudoClass::Visited,
                _ => return Err(SelectorParseError::UnsupportedPseudoClass(lower)),
            };
            current.simples.push(SimpleSelector::PseudoClass(pseudo));
            Ok(())
        }
        Token::Function(name) => {
            let lower = name.to_ascii_lowercase();
            let args_text = parser
                .parse_nested_block(|args| {
                    let mut buffer = String::new();
                    collect_tokens_text(args, &mut buffer);
                    Ok::<String, cssparser::ParseError<'_, ()>>(buffer)
                })
                .map_err(|_| invalid())?;
            let pseudo = match lower.as_str() {
                "nth-child" => {
                    let (a, b) = parse_nth(&args_text).ok_or_else(invalid)?;
                    PseudoClass::NthChild(a, b)
                }
                "not" | "is" | "where" => {
                    let inner = SelectorList::parse(&args_text)?;
                    match lower.as_str() {
                        "not" => PseudoClass::Not(inner.0),
                        "is" => PseudoClass::Is(inner.0),
                        _ => PseudoClass::Where(inner.0),
                    }
                }
                _ => return Err(SelectorParseError::UnsupportedPseudoClass(lower)),
            };
            current.simples.push(SimpleSelector::PseudoClass(pseudo));
            Ok(())
        }
        _ => Err(invalid()),
    }
}

/// Сериализует остаток потока токенов в текст (для аргументов функций).
fn collect_tokens_text(input: &mut Parser<'_, '_>, out: &mut String) {
    use cssparser::ToCss;
    while let Ok(token) = input.next_including_whitespace() {
        let token = token.clone();
        match token {
            Token::WhiteSpace(_) => out.push(' '),
            Token::Function(ref name) => {
                out.push_str(name);
                out.push('(');
                let _ = input.parse_nested_block(|nested| {
                    collect_tokens_text(nested, out);
                    Ok::<(), cssparser::ParseError<'_, ()>>(())
                });
                out.push(')');
            }
            Token::ParenthesisBlock => {
                out.push('(');
                let _ = input.parse_nested_block(|nested| {
                    collect_tokens_text(nested, out);
                    Ok::<(), cssparser::ParseError<'_, ()>>(())
                });
                out.push(')');
            }
            Token::SquareBracketBlock => {
                out.push('[');
                let _ = input.parse_nested_block(|nested| {
                    collect_tokens_text(nested, out);
                    Ok::<(), cssparser::ParseError<'_, ()>>(())
                });
                out.push(']');
            }
            ref other => {
                let _ = other.to_css(out);
            }
        }
    }
}

/// Разбирает `an+b` из текста аргумента `:nth-child()`.
fn parse_nth(text: &str) -> Option<(i32, i32)> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let lower = compact.to_ascii_lowercase();
    match lower.as_str() {
        "odd" => return Some((2, 1)),
        "even" => return Some((2, 0)),
        _ => {}
    }

    if let Some(n_pos) = lower.find('n') {
        let a_part = &lower[..n_pos];
        let a = match a_part {
            "" | "+" => 1,
            "-" => -1,
            _ => a_part.parse().ok()?,
        };
        let b_part = &lower[n_pos + 1..];
        let b = if b_part.is_empty() { 0 } else { b_part.parse().ok()? };
        Some((a, b))
    } else {
        Some((0, lower.parse().ok()?))
    }
}

fn parse_attribute<'i>(
    input: &mut Parser<'i, '_>,
) -> Result<AttributeSelector, cssparser::ParseError<'i, ()>> {
    let name = input.expect_ident()?.to_ascii_lowercase();

    let operator = match input.next() {
        Err(_) => {
            return Ok(AttributeSelector {
                name,
                operator: AttrOperator::Exists,
                value: String::new(),
            });
        }
        Ok(Token::Delim('=')) => AttrOperator::Equals,
        Ok(Token::IncludeMatch) => AttrOperator::Includes,
        Ok(Token::DashMatch) => AttrOperator::DashMatch,
        Ok(Token::PrefixMatch) => AttrOperator::Prefix,
        Ok(Token::SuffixMatch) => AttrOperator::Suffix,
        Ok(Token::SubstringMatch) => AttrOperator::Substring,
        Ok(_) => return Err(input.new_custom_error(())),
    };

    let value = match input.next() {
        Ok(Token::Ident(value)) => value.to_string(),
        Ok(Token::QuotedString(value)) => value.to_string(),
        _ => return Err(input.new_custom_error(())),
    };

    Ok(AttributeSelector { name, operator, value })
}
