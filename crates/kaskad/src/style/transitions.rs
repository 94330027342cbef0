//! Переходы: запуск, реверс и интерполяция вычисленных значений.
//!
//! Контроллер живёт в движке и сравнивает старый и новый вычисленные
//! стили при каждом пересчёте. Время — секунды на монотонной шкале,
//! которую задаёт вызывающая сторона.

use std::collections::HashMap;

use crate::dom::ElementId;

use super::compute::ComputedStyle;
use super::easing::EasingFunction;
use super::properties::PropertyId;
use super::selector::PseudoElement;
use super::values::{Color, CssValue, Length};

/// Ключ перехода: элемент, псевдоэлемент, свойство.
pub type TransitionKey = (ElementId, Option<PseudoElement>, PropertyId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    /// Задержка ещё не истекла.
    Pending,
    Running,
    Finished,
}

/// Один запущенный переход.
#[derive(Debug, Clone)]
pub struct Transition {
    pub start_time: f64,
    pub end_time: f64,
    pub delay: f32,
    pub duration: f32,
    pub timing: EasingFunction,
    pub from: CssValue,
    pub to: CssValue,
    /// Стартовое значение до серии реверсов; совпадение нового целевого
    /// значения с ним и означает реверс.
    pub reversing_adjusted_start_value: CssValue,
    pub reversing_shortening_factor: f32,
}

impl Transition {
    pub fn state(&self, now: f64) -> TransitionState {
        if now < self.start_time {
            TransitionState::Pending
        } else if now >= self.end_time {
            TransitionState::Finished
        } else {
            TransitionState::Running
        }
    }

    /// Доля пройденного пути после тайминг-функции.
    fn eased_progress(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        let raw = ((now - self.start_time) / self.duration as f64).clamp(0.0, 1.0) as f32;
        self.timing.apply(raw)
    }

    /// Текущее значение свойства.
    pub fn sample(&self, now: f64) -> CssValue {
        match self.state(now) {
            TransitionState::Pending => self.from.clone(),
            TransitionState::Finished => self.to.clone(),
            TransitionState::Running => {
                interpolate(&self.from, &self.to, self.eased_progress(now))
            }
        }
    }
}

/// Линейная интерполяция значений; несовместимые пары переключаются
/// дискретно на середине.
pub fn interpolate(from: &CssValue, to: &CssValue, t: f32) -> CssValue {
    let lerp = |a: f32, b: f32| a + (b - a) * t;
    match (from, to) {
        (CssValue::Number(a), CssValue::Number(b)) => CssValue::Number(lerp(*a, *b)),
        (CssValue::Integer(a), CssValue::Integer(b)) => {
            CssValue::Integer(lerp(*a as f32, *b as f32).round() as i32)
        }
        (CssValue::Percentage(a), CssValue::Percentage(b)) => CssValue::Percentage(lerp(*a, *b)),
        (CssValue::Time(a), CssValue::Time(b)) => CssValue::Time(lerp(*a, *b)),
        (CssValue::Length(a), CssValue::Length(b)) if a.unit == b.unit => {
            CssValue::Length(Length { value: lerp(a.value, b.value), unit: a.unit })
        }
        (CssValue::Color(a), CssValue::Color(b)) => {
            let channel = |x: u8, y: u8| lerp(x as f32, y as f32).round().clamp(0.0, 255.0) as u8;
            CssValue::Color(Color::new(
                channel(a.r, b.r),
                channel(a.g, b.g),
                channel(a.b, b.b),
                channel(a.a, b.a),
            ))
        }
        _ => {
            if t < 0.5 {
                from.clone()
            } else {
                to.clone()
            }
        }
    }
}

/// Настройка перехода для конкретного свойства из вычисленного стиля.
#[derive(Debug, Clone)]
struct TransitionConfig {
    duration: f32,
    delay: f32,
    timing: EasingFunction,
}

fn config_for(style: &ComputedStyle, property: PropertyId) -> Option<TransitionConfig> {
    let applies = match style.get(PropertyId::TransitionProperty) {
        CssValue::Keyword(word) => word == "all",
        CssValue::Idents(names) => names
            .iter()
            .any(|name| name == "all" || name == property.name()),
        _ => false,
    };
    if !applies {
        return None;
    }

    let time = |id: PropertyId| match style.get(id) {
        CssValue::Time(seconds) => *seconds,
        _ => 0.0,
    };
    let timing = match style.get(PropertyId::TransitionTimingFunction) {
        CssValue::Timing(easing) => easing.clone(),
        _ => EasingFunction::Ease,
    };

    Some(TransitionConfig {
        duration: time(PropertyId::TransitionDuration).max(0.0),
        delay: time(PropertyId::TransitionDelay),
        timing,
    })
}

/// Реестр активных переходов.
#[derive(Debug, Default)]
pub struct TransitionController {
    transitions: HashMap<TransitionKey, Transition>,
}

impl TransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn get(&self, key: &TransitionKey) -> Option<&Transition> {
        self.transitions.get(key)
    }

    /// Убирает все переходы элемента (например, при удалении из дерева).
    pub fn cancel_element(&mut self, element: ElementId) {
        self.transitions.retain(|(id, _, _), _| *id != element);
    }

    /// Сравнивает старый и новый стили и обновляет набор переходов
    /// по четырёхшаговому алгоритму запуска.
    pub fn update(
        &mut self,
        element: ElementId,
        pseudo: Option<PseudoElement>,
        old_style: &ComputedStyle,
        new_style: &ComputedStyle,
        now: f64,
    ) {
        for &property in PropertyId::ALL {
            if !property.is_animatable() {
                continue;
            }
            let key = (element, pseudo, property);
            let before = old_style.get(property);
            let after = new_style.get(property);
            let config = config_for(new_style, property);

            let Some(config) = config else {
                self.transitions.remove(&key);
                continue;
            };

            match self.transitions.get(&key).cloned() {
                None => {
                    self.maybe_start(key, before, after, &config, now);
                }
                Some(existing) => match existing.state(now) {
                    // Завершённый переход перезапускается, только если цель
                    // сменилась; иначе он ждёт уборки в collect_finished.
                    TransitionState::Finished => {
                        if *after != existing.to {
                            self.transitions.remove(&key);
                            self.maybe_start(key, before, after, &config, now);
                        }
                    }
                    // Ожидающий переход с устаревшей целью отменяется.
                    TransitionState::Pending => {
                        if *after != existing.to {
                            self.transitions.remove(&key);
                            self.maybe_start(key, before, after, &config, now);
                        }
                    }
                    TransitionState::Running => {
                        if *after == existing.to {
                            continue;
                        }
                        let current = existing.sample(now);
                        if *after == existing.reversing_adjusted_start_value {
                            let reversed =
                                reverse_transition(&existing, &current, after, &config, now);
                            tracing::debug!(
                                "reversing `{}` with factor {}",
                                property.name(),
                                reversed.reversing_shortening_factor,
                            );
                            self.transitions.insert(key, reversed);
                        } else {
                            self.transitions.remove(&key);
                            self.start(key, current.clone(), after.clone(), current, 1.0, &config, now);
                        }
                    }
                },
            }
        }
    }

    fn maybe_start(
        &mut self,
        key: TransitionKey,
        before: &CssValue,
        after: &CssValue,
        config: &TransitionConfig,
        now: f64,
    ) {
        if before == after || config.duration + config.delay.max(0.0) <= 0.0 {
            return;
        }
        self.start(
            key,
            before.clone(),
            after.clone(),
            before.clone(),
            1.0,
            config,
            now,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn start(
        &mut self,
        key: TransitionKey,
        from: CssValue,
        to: CssValue,
        reversing_adjusted_start_value: CssValue,
        reversing_shortening_factor: f32,
        config: &TransitionConfig,
        now: f64,
    ) {
        let start_time = now + config.delay as f64;
        self.transitions.insert(
            key,
            Transition {
                start_time,
                end_time: start_time + config.duration as f64,
                delay: config.delay,
                duration: config.duration,
                timing: config.timing.clone(),
                from,
                to,
                reversing_adjusted_start_value,
                reversing_shortening_factor,
            },
        );
    }

    /// Накладывает текущие значения переходов на вычисленный стиль.
    pub fn adjust_style(
        &self,
        element: ElementId,
        pseudo: Option<PseudoElement>,
        style: &mut ComputedStyle,
        now: f64,
    ) {
        for ((id, transition_pseudo, property), transition) in &self.transitions {
            if *id == element && *transition_pseudo == pseudo {
                style.set(*property, transition.sample(now));
            }
        }
    }

    /// Убирает завершённые переходы; возвращает их количество.
    pub fn collect_finished(&mut self, now: f64) -> usize {
        let before = self.transitions.len();
        self.transitions
            .retain(|_, transition| transition.state(now) != TransitionState::Finished);
        before - self.transitions.len()
    }
}

/// Реверс по CSS Transitions: укороченная длительность и фактор,
/// накапливающийся при повторных сменах направления.
fn reverse_transition(
    existing: &Transition,
    current: &CssValue,
    target: &CssValue,
    config: &TransitionConfig,
    now: f64,
) -> Transition {
    let progress = existing.eased_progress(now);
    let old_factor = existing.reversing_shortening_factor;
    let factor = (progress * old_factor + (1.0 - old_factor)).abs().clamp(0.0, 1.0);

    let duration = config.duration * factor;
    let delay = if config.delay < 0.0 {
        config.delay * factor
    } else {
        config.delay
    };
    let start_time = now + delay as f64;

    Transition {
        start_time,
        end_time: start_time + duration as f64,
        delay,
        duration,
        timing: config.timing.clone(),
        from: current.clone(),
        to: target.clone(),
        reversing_adjusted_start_value: existing.to.clone(),
        reversing_shortening_factor: factor,
    }
}
