//! Extended scalars, grouped the way the configuration toggles them.

use crate::wiring::{Coercing, CoercingError, ScalarType};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat};
use gqlwire_core::ScalarsConfig;
use serde_json::Value;
use std::sync::Arc;

/// Returns the scalars enabled by the configuration.
pub fn extended_scalars(config: &ScalarsConfig) -> Vec<ScalarType> {
    if !config.enabled {
        return Vec::new();
    }
    let mut scalars = Vec::new();
    if config.time_dates {
        scalars.extend(time_scalars());
    }
    if config.objects {
        scalars.extend(object_scalars());
    }
    if config.numbers {
        scalars.extend(number_scalars());
    }
    scalars
}

/// DateTime, Date, Time and LocalTime.
pub fn time_scalars() -> Vec<ScalarType> {
    vec![
        ScalarType::new("DateTime", Arc::new(TemporalCoercing(Temporal::DateTime)))
            .with_description("An RFC 3339 date-time with offset"),
        ScalarType::new("Date", Arc::new(TemporalCoercing(Temporal::Date)))
            .with_description("An RFC 3339 full-date"),
        ScalarType::new("Time", Arc::new(TemporalCoercing(Temporal::Time)))
            .with_description("An RFC 3339 full-time with offset"),
        ScalarType::new("LocalTime", Arc::new(TemporalCoercing(Temporal::LocalTime)))
            .with_description("A time of day without offset"),
    ]
}

/// Object, JSON, Url and Locale.
pub fn object_scalars() -> Vec<ScalarType> {
    vec![
        ScalarType::new("Object", Arc::new(ObjectCoercing { any: false }))
            .with_description("An arbitrary JSON object"),
        ScalarType::new("JSON", Arc::new(ObjectCoercing { any: true }))
            .with_description("An arbitrary JSON value"),
        ScalarType::new("Url", Arc::new(UrlCoercing)).with_description("An absolute URL"),
        ScalarType::new("Locale", Arc::new(LocaleCoercing))
            .with_description("An IETF BCP 47 language tag"),
    ]
}

/// Signed integer and float ranges plus Long, Short and Byte.
pub fn number_scalars() -> Vec<ScalarType> {
    let int = |name: &'static str, min: i64, max: i64| {
        ScalarType::new(name, Arc::new(IntCoercing { name, min, max }))
    };
    let float = |name: &'static str, sign: Sign| {
        ScalarType::new(name, Arc::new(FloatCoercing { name, sign }))
    };
    vec![
        int("PositiveInt", 1, i64::from(i32::MAX)),
        int("NegativeInt", i64::from(i32::MIN), -1),
        int("NonNegativeInt", 0, i64::from(i32::MAX)),
        int("NonPositiveInt", i64::from(i32::MIN), 0),
        float("PositiveFloat", Sign::Positive),
        float("NegativeFloat", Sign::Negative),
        float("NonNegativeFloat", Sign::NonNegative),
        float("NonPositiveFloat", Sign::NonPositive),
        int("Long", i64::MIN, i64::MAX),
        int("Short", i64::from(i16::MIN), i64::from(i16::MAX)),
        int("Byte", i64::from(i8::MIN), i64::from(i8::MAX)),
    ]
}

fn expect_str<'a>(value: &'a Value, scalar: &str) -> Result<&'a str, CoercingError> {
    value
        .as_str()
        .ok_or_else(|| CoercingError::new(format!("Expected a string for {scalar} but was {value}")))
}

#[derive(Debug, Clone, Copy)]
enum Temporal {
    DateTime,
    Date,
    Time,
    LocalTime,
}

#[derive(Debug)]
struct TemporalCoercing(Temporal);

impl TemporalCoercing {
    fn normalize(&self, input: &str) -> Result<String, CoercingError> {
        let invalid = |e: chrono::ParseError| CoercingError::new(format!("Invalid {:?} `{input}`: {e}", self.0));
        match self.0 {
            Temporal::DateTime => DateTime::parse_from_rfc3339(input)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .map_err(invalid),
            Temporal::Date => NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(invalid),
            Temporal::Time => {
                // Anchor to a date so the offset is parsed with RFC 3339 rules.
                DateTime::parse_from_rfc3339(&format!("1970-01-01T{input}"))
                    .map(|dt| dt.format("%H:%M:%S%.f%:z").to_string())
                    .map_err(invalid)
            }
            Temporal::LocalTime => NaiveTime::parse_from_str(input, "%H:%M:%S%.f")
                .map(|t| t.format("%H:%M:%S%.f").to_string())
                .map_err(invalid),
        }
    }
}

impl Coercing for TemporalCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        let input = expect_str(value, &format!("{:?}", self.0))?;
        self.normalize(input).map(Value::String)
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        self.serialize(input)
    }
}

#[derive(Debug)]
struct ObjectCoercing {
    any: bool,
}

impl Coercing for ObjectCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        if self.any || value.is_object() {
            Ok(value.clone())
        } else {
            Err(CoercingError::new(format!("Expected an object but was {value}")))
        }
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        self.serialize(input)
    }
}

#[derive(Debug)]
struct UrlCoercing;

impl Coercing for UrlCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        let input = expect_str(value, "Url")?;
        url::Url::parse(input)
            .map(|url| Value::String(url.to_string()))
            .map_err(|e| CoercingError::new(format!("Invalid Url `{input}`: {e}")))
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        self.serialize(input)
    }
}

#[derive(Debug)]
struct LocaleCoercing;

impl LocaleCoercing {
    fn is_valid(tag: &str) -> bool {
        let mut parts = tag.split(['-', '_']);
        let language = parts.next().unwrap_or_default();
        (2..=3).contains(&language.len())
            && language.chars().all(|c| c.is_ascii_alphabetic())
            && parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

impl Coercing for LocaleCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        let input = expect_str(value, "Locale")?;
        if Self::is_valid(input) {
            Ok(Value::String(input.replace('_', "-")))
        } else {
            Err(CoercingError::new(format!("Invalid Locale `{input}`")))
        }
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        self.serialize(input)
    }
}

#[derive(Debug)]
struct IntCoercing {
    name: &'static str,
    min: i64,
    max: i64,
}

impl Coercing for IntCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        let number = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| CoercingError::new(format!("Expected an integer for {} but was {value}", self.name)))?;
        if (self.min..=self.max).contains(&number) {
            Ok(Value::from(number))
        } else {
            Err(CoercingError::new(format!(
                "{} must be between {} and {} but was {number}",
                self.name, self.min, self.max
            )))
        }
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        if input.is_string() {
            return Err(CoercingError::new(format!("Expected an integer for {} but was {input}", self.name)));
        }
        self.serialize(input)
    }
}

#[derive(Debug, Clone, Copy)]
enum Sign {
    Positive,
    Negative,
    NonNegative,
    NonPositive,
}

impl Sign {
    fn accepts(self, n: f64) -> bool {
        match self {
            Self::Positive => n > 0.0,
            Self::Negative => n < 0.0,
            Self::NonNegative => n >= 0.0,
            Self::NonPositive => n <= 0.0,
        }
    }
}

#[derive(Debug)]
struct FloatCoercing {
    name: &'static str,
    sign: Sign,
}

impl Coercing for FloatCoercing {
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError> {
        let number = value
            .as_f64()
            .ok_or_else(|| CoercingError::new(format!("Expected a number for {} but was {value}", self.name)))?;
        if self.sign.accepts(number) {
            Ok(value.clone())
        } else {
            Err(CoercingError::new(format!("{} is not a valid {}", number, self.name)))
        }
    }

    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError> {
        self.serialize(input)
    }
}
