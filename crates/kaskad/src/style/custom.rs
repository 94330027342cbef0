//! Кастомные свойства и подстановка `var()`.
//!
//! Значения хранятся сырым текстом. Подстановка текстовая, но учитывает
//! строки и вложенные скобки; циклы ловятся стеком имён, разрастание —
//! бюджетом символов. Провал подстановки делает декларацию
//! guaranteed-invalid, что на этапе вычисления означает `unset`.

use std::collections::HashMap;

use thiserror::Error;

use super::properties::value_contains_var;

/// Предел суммарной длины подставляемого текста на одну декларацию.
pub const SUBSTITUTION_BUDGET: usize = 65536;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("custom property cycle through `{0}`")]
    Cycle(String),
    #[error("missing custom property `{0}` and no fallback")]
    Missing(String),
    #[error("substitution budget exceeded")]
    BudgetExceeded,
    #[error("malformed var() reference")]
    Malformed,
}

/// Карта кастомных свойств элемента: родительская карта плюс свои
/// каскадированные записи.
///
/// Широкие ключевые слова трактуются так: `initial` убирает запись,
/// остальные оставляют родительское значение. Значения со своими
/// `var()` разворачиваются сразу, чтобы дети наследовали уже
/// подставленный текст; цикл или отсутствующая ссылка делают свойство
/// недоступным.
pub fn resolve_custom_properties(
    own: &HashMap<String, String>,
    parent: Option<&HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = parent.cloned().unwrap_or_default();
    for (name, raw) in own {
        match raw.trim().to_ascii_lowercase().as_str() {
            "initial" => {
                merged.remove(name);
            }
            "inherit" | "unset" | "revert" | "revert-layer" => {}
            _ => {
                merged.insert(name.clone(), raw.clone());
            }
        }
    }

    let mut resolved = merged.clone();
    for (name, raw) in &merged {
        if !value_contains_var(raw) {
            continue;
        }
        let mut stack = vec![name.clone()];
        let mut budget = SUBSTITUTION_BUDGET;
        match substitute_with(raw, &merged, &mut stack, &mut budget) {
            Ok(text) => {
                resolved.insert(name.clone(), text);
            }
            Err(err) => {
                tracing::debug!("custom property `{name}` unavailable: {err}");
                resolved.remove(name);
            }
        }
    }
    resolved
}

/// Подставляет `var()` в значении обычного свойства.
pub fn substitute(
    value: &str,
    custom: &HashMap<String, String>,
) -> Result<String, SubstitutionError> {
    let mut stack = Vec::new();
    let mut budget = SUBSTITUTION_BUDGET;
    substitute_with(value, custom, &mut stack, &mut budget)
}

fn substitute_with(
    value: &str,
    custom: &HashMap<String, String>,
    stack: &mut Vec<String>,
    budget: &mut usize,
) -> Result<String, SubstitutionError> {
    if *budget < value.len() {
        return Err(SubstitutionError::BudgetExceeded);
    }
    *budget -= value.len();

    let mut output = String::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        let Some(ch) = value[i..].chars().next() else {
            break;
        };
        if ch == '"' || ch == '\'' {
            let end = skip_string(value, i);
            output.push_str(&value[i..end]);
            i = end;
            continue;
        }
        if is_var_start(value, i) {
            let open = i + 3;
            let close = matching_paren(value, open).ok_or(SubstitutionError::Malformed)?;
            let inner = &value[open + 1..close];
            let (name, fallback) = split_var_argument(inner);
            if !name.starts_with("--") || name.len() == 2 {
                return Err(SubstitutionError::Malformed);
            }
            if stack.iter().any(|entry| entry == name) {
                return Err(SubstitutionError::Cycle(name.to_string()));
            }
            match custom.get(name) {
                Some(raw) => {
                    stack.push(name.to_string());
                    let resolved = substitute_with(raw, custom, stack, budget)?;
                    stack.pop();
                    output.push_str(resolved.trim());
                }
                None => match fallback {
                    Some(fallback) => {
                        let resolved = substitute_with(fallback, custom, stack, budget)?;
                        output.push_str(resolved.trim());
                    }
                    None => return Err(SubstitutionError::Missing(name.to_string())),
                },
            }
            i = close + 1;
            continue;
        }
        output.push(ch);
        i += ch.len_utf8();
    }

    Ok(output)
}

/// `var(` на границе идентификатора, без учёта регистра.
fn is_var_start(value: &str, i: usize) -> bool {
    let rest = &value[i..];
    if rest.len() < 4 || !rest.is_char_boundary(4) || !rest[..4].eq_ignore_ascii_case("var(") {
        return false;
    }
    if let Some(prev) = value[..i].chars().next_back() {
        if prev.is_ascii_alphanumeric() || prev == '-' || prev == '_' {
            return false;
        }
    }
    true
}

/// Индекс закрывающей скобки, парной скобке в позиции `open`.
fn matching_paren(value: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < value.len() {
        let ch = value[i..].chars().next()?;
        match ch {
            '"' | '\'' => {
                i = skip_string(value, i);
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += ch.len_utf8();
    }
    None
}

/// Индекс сразу после закрывающей кавычки (или конец строки).
fn skip_string(value: &str, start: usize) -> usize {
    let mut chars = value[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return value.len();
    };
    let mut escaped = false;
    for (offset, ch) in chars {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return start + offset + ch.len_utf8();
        }
    }
    value.len()
}

/// Разбивает аргумент `var()` на имя и фоллбек по верхнеуровневой запятой.
fn split_var_argument(inner: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut i = 0;
    while i < inner.len() {
        let Some(ch) = inner[i..].chars().next() else {
            break;
        };
        match ch {
            '"' | '\'' => {
                i = skip_string(inner, i);
                continue;
            }
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                return (inner[..i].trim(), Some(&inner[i + 1..]));
            }
            _ => {}
        }
        i += ch.len_utf8();
    }
    (inner.trim(), None)
}
