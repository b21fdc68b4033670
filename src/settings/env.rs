//! Typed reads of named environment variables.

use super::SettingsError;
use crate::nullable::parse_bool;
use std::fmt;
use std::time::Duration;

/// Parse one variable's text into a typed value.
pub trait FromEnvValue: Sized {
    fn from_env_value(raw: &str) -> Result<Self, String>;
}

impl FromEnvValue for String {
    fn from_env_value(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }
}

impl FromEnvValue for bool {
    fn from_env_value(raw: &str) -> Result<Self, String> {
        parse_bool(raw.trim()).ok_or_else(|| format!("invalid boolean '{}'", raw))
    }
}

macro_rules! from_env_number {
    ($($t:ty),*) => {
        $(
            impl FromEnvValue for $t {
                fn from_env_value(raw: &str) -> Result<Self, String> {
                    raw.trim().parse::<$t>().map_err(|e| format!("'{}': {}", raw, e))
                }
            }
        )*
    };
}

from_env_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Raw bytes of the value.
impl FromEnvValue for Vec<u8> {
    fn from_env_value(raw: &str) -> Result<Self, String> {
        Ok(raw.as_bytes().to_vec())
    }
}

/// Go-style duration: `300ms`, `1.5h`, `2h45m`. Units ns, us (µs), ms, s, m, h.
impl FromEnvValue for Duration {
    fn from_env_value(raw: &str) -> Result<Self, String> {
        parse_duration(raw.trim()).ok_or_else(|| format!("invalid duration '{}'", raw))
    }
}

impl FromEnvValue for Complex {
    fn from_env_value(raw: &str) -> Result<Self, String> {
        parse_complex(raw.trim()).ok_or_else(|| format!("invalid complex number '{}'", raw))
    }
}

pub fn parse_duration(s: &str) -> Option<Duration> {
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let n: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
        nanos += n * scale;
    }
    Some(Duration::from_nanos(nanos.round() as u64))
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}{:+}i)", self.re, self.im)
    }
}

fn parse_signed_unit(s: &str) -> Option<f64> {
    match s {
        "" | "+" => Some(1.0),
        "-" => Some(-1.0),
        s => s.parse().ok(),
    }
}

/// `3`, `2i`, `1+2i`, `-1.5e3-0.5i`, optionally wrapped in parentheses.
pub fn parse_complex(s: &str) -> Option<Complex> {
    let s = s
        .strip_prefix('(')
        .and_then(|x| x.strip_suffix(')'))
        .unwrap_or(s);
    let Some(body) = s.strip_suffix('i') else {
        return s.parse().ok().map(|re| Complex { re, im: 0.0 });
    };
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));
    match split {
        Some(i) => Some(Complex {
            re: body[..i].parse().ok()?,
            im: parse_signed_unit(&body[i..])?,
        }),
        None => Some(Complex {
            re: 0.0,
            im: parse_signed_unit(body)?,
        }),
    }
}

/// Named-variable reader over any lookup function.
pub struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Env { lookup }
    }

    /// Parse `name` into `target`. A missing variable leaves `target` unchanged.
    pub fn load<T: FromEnvValue>(&self, name: &str, target: &mut T) -> Result<(), SettingsError> {
        if let Some(raw) = (self.lookup)(name) {
            *target = T::from_env_value(&raw).map_err(|message| SettingsError::Invalid {
                name: name.to_string(),
                message,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("5d"), None);
    }

    #[test]
    fn complex_numbers() {
        assert_eq!(parse_complex("1+2i"), Some(Complex { re: 1.0, im: 2.0 }));
        assert_eq!(parse_complex("-3.5"), Some(Complex { re: -3.5, im: 0.0 }));
        assert_eq!(parse_complex("-i"), Some(Complex { re: 0.0, im: -1.0 }));
        assert_eq!(parse_complex("(1e3-2i)"), Some(Complex { re: 1000.0, im: -2.0 }));
        assert_eq!(parse_complex("1e-3+1e-3i"), Some(Complex { re: 0.001, im: 0.001 }));
        assert_eq!(parse_complex("x+yi"), None);
    }

    #[test]
    fn missing_leaves_target_and_errors_name_the_variable() {
        let vars: HashMap<&str, &str> = [("PORT", "80"), ("DEBUG", "maybe")].into();
        let env = Env::new(|k: &str| vars.get(k).map(|v| v.to_string()));

        let mut port = 5432u16;
        env.load("PORT", &mut port).unwrap();
        assert_eq!(port, 80);

        let mut host = "localhost".to_string();
        env.load("HOST", &mut host).unwrap();
        assert_eq!(host, "localhost");

        let mut debug = false;
        let err = env.load("DEBUG", &mut debug).unwrap_err();
        assert!(err.to_string().contains("DEBUG"));
    }

    #[test]
    fn bytes_and_bools() {
        assert_eq!(Vec::<u8>::from_env_value("ab").unwrap(), b"ab".to_vec());
        assert!(bool::from_env_value("T").unwrap());
        assert!(bool::from_env_value("yes").is_err());
    }
}
