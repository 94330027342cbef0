//! Easing-функции (timing functions) для переходов.
//!
//! Спецификация: https://www.w3.org/TR/css-easing-1/

use std::fmt;

use cssparser::{ParseError, Parser, Token};

/// Временная функция перехода.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EasingFunction {
    /// Линейная интерполяция (постоянная скорость)
    Linear,
    /// Плавный старт и конец (по умолчанию)
    Ease,
    /// Медленный старт
    EaseIn,
    /// Медленное завершение
    EaseOut,
    /// Медленный старт и конец (более выраженный, чем ease)
    EaseInOut,
    /// Кубическая кривая Безье: cubic-bezier(x1, y1, x2, y2)
    CubicBezier { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Пошаговая функция: steps(n, start|end)
    Steps { count: u32, jump_start: bool },
}

impl Default for EasingFunction {
    fn default() -> Self {
        Self::Ease
    }
}

impl fmt::Display for EasingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Ease => write!(f, "ease"),
            Self::EaseIn => write!(f, "ease-in"),
            Self::EaseOut => write!(f, "ease-out"),
            Self::EaseInOut => write!(f, "ease-in-out"),
            Self::CubicBezier { x1, y1, x2, y2 } => {
                write!(f, "cubic-bezier({x1}, {y1}, {x2}, {y2})")
            }
            Self::Steps { count, jump_start } => {
                write!(f, "steps({}, {})", count, if *jump_start { "start" } else { "end" })
            }
        }
    }
}

impl EasingFunction {
    /// Значение функции для прогресса `0.0..=1.0`.
    pub fn apply(&self, progress: f32) -> f32 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Ease => Self::cubic_bezier(t, 0.25, 0.1, 0.25, 1.0),
            Self::EaseIn => Self::cubic_bezier(t, 0.42, 0.0, 1.0, 1.0),
            Self::EaseOut => Self::cubic_bezier(t, 0.0, 0.0, 0.58, 1.0),
            Self::EaseInOut => Self::cubic_bezier(t, 0.42, 0.0, 0.58, 1.0),
            Self::CubicBezier { x1, y1, x2, y2 } => Self::cubic_bezier(t, *x1, *y1, *x2, *y2),
            Self::Steps { count, jump_start } => {
                let steps = (*count).max(1) as f32;
                if *jump_start {
                    ((t * steps).ceil() / steps).min(1.0)
                } else {
                    ((t * steps).floor() / steps).max(0.0)
                }
            }
        }
    }

    /// Кубическая кривая Безье: решаем x(s) = t бинарным поиском по s,
    /// затем берём y(s). Контрольные точки P0=(0,0), P3=(1,1).
    fn cubic_bezier(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        let sample = |p1: f32, p2: f32, s: f32| -> f32 {
            let s2 = s * s;
            let s3 = s2 * s;
            let ms = 1.0 - s;
            3.0 * ms * ms * s * p1 + 3.0 * ms * s2 * p2 + s3
        };

        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        let mut s = t;
        for _ in 0..32 {
            let x = sample(x1, x2, s);
            if (x - t).abs() < 1e-5 {
                break;
            }
            if x < t {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) * 0.5;
        }
        sample(y1, y2, s)
    }

    /// Парсит timing function из потока токенов.
    pub fn parse<'i>(input: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i, ()>> {
        let ident = input.try_parse(|i| -> Result<String, ParseError<'i, ()>> {
            match i.next()? {
                Token::Ident(ident) => Ok(ident.to_string()),
                _ => Err(i.new_custom_error(())),
            }
        });

        if let Ok(name) = ident {
            return match name.to_ascii_lowercase().as_str() {
                "linear" => Ok(Self::Linear),
                "ease" => Ok(Self::Ease),
                "ease-in" => Ok(Self::EaseIn),
                "ease-out" => Ok(Self::EaseOut),
                "ease-in-out" => Ok(Self::EaseInOut),
                "step-start" => Ok(Self::Steps { count: 1, jump_start: true }),
                "step-end" => Ok(Self::Steps { count: 1, jump_start: false }),
                _ => Err(input.new_custom_error(())),
            };
        }

        let function = input.expect_function()?.to_ascii_lowercase();
        input.parse_nested_block(|args| match function.as_str() {
            "cubic-bezier" => {
                let x1 = expect_number(args)?;
                args.expect_comma()?;
                let y1 = expect_number(args)?;
                args.expect_comma()?;
                let x2 = expect_number(args)?;
                args.expect_comma()?;
                let y2 = expect_number(args)?;
                Ok(Self::CubicBezier { x1, y1, x2, y2 })
            }
            "steps" => {
                let count = match args.next()? {
                    Token::Number { int_value: Some(n), .. } if *n > 0 => *n as u32,
                    _ => return Err(args.new_custom_error(())),
                };
                let jump_start = if args.try_parse(|a| a.expect_comma()).is_ok() {
                    match args.expect_ident()?.to_ascii_lowercase().as_str() {
                        "start" | "jump-start" => true,
                        "end" | "jump-end" => false,
                        _ => return Err(args.new_custom_error(())),
                    }
                } else {
                    false
                };
                Ok(Self::Steps { count, jump_start })
            }
            _ => Err(args.new_custom_error(())),
        })
    }

    /// Парсит timing function из строки целиком.
    pub fn parse_str(text: &str) -> Option<Self> {
        let mut input = cssparser::ParserInput::new(text);
        let mut parser = Parser::new(&mut input);
        let easing = Self::parse(&mut parser).ok()?;
        parser.expect_exhausted().ok()?;
        Some(easing)
    }
}

fn expect_number<'i>(input: &mut Parser<'i, '_>) -> Result<f32, ParseError<'i, ()>> {
    match input.next()? {
        Token::Number { value, .. } => Ok(*value),
        _ => Err(input.new_custom_error(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_is_identity() {
        assert_eq!(EasingFunction::Linear.apply(0.0), 0.0);
        assert_eq!(EasingFunction::Linear.apply(0.5), 0.5);
        assert_eq!(EasingFunction::Linear.apply(1.0), 1.0);
    }

    #[test]
    fn test_steps_end() {
        let easing = EasingFunction::Steps { count: 4, jump_start: false };
        assert_eq!(easing.apply(0.0), 0.0);
        assert_eq!(easing.apply(0.24), 0.0);
        assert_eq!(easing.apply(0.25), 0.25);
        assert_eq!(easing.apply(0.75), 0.75);
    }

    #[test]
    fn test_ease_in_out_is_monotonic() {
        let easing = EasingFunction::EaseInOut;
        let mut previous = 0.0;
        for i in 0..=20 {
            let value = easing.apply(i as f32 / 20.0);
            assert!(value >= previous - 1e-6);
            previous = value;
        }
        assert!((easing.apply(0.5) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_parse_keywords_and_functions() {
        assert_eq!(EasingFunction::parse_str("ease-in"), Some(EasingFunction::EaseIn));
        assert_eq!(
            EasingFunction::parse_str("cubic-bezier(0.1, 0.2, 0.3, 0.4)"),
            Some(EasingFunction::CubicBezier { x1: 0.1, y1: 0.2, x2: 0.3, y2: 0.4 })
        );
        assert_eq!(
            EasingFunction::parse_str("steps(3, start)"),
            Some(EasingFunction::Steps { count: 3, jump_start: true })
        );
        assert_eq!(EasingFunction::parse_str("bogus(1)"), None);
    }
}
