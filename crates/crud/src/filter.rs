use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use serde_json::Value;
use shared::domain::FieldMap;

use crate::{
    i18n::{Translator, ValidationMessage},
    record::{value_as_i64, value_as_string},
};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    StringTrim,
    StripTags,
    /// Numeric strings become JSON integers; anything else is left alone.
    ToInt,
    /// Empty strings become null.
    ToNull,
}

#[derive(Debug, Clone)]
pub enum ValidatorRule {
    StringLength {
        min: Option<usize>,
        max: Option<usize>,
    },
    Digits,
    EmailAddress,
    Between {
        min: i64,
        max: i64,
    },
    Regex(Regex),
    InArray(Vec<String>),
}

impl ValidatorRule {
    pub fn length(min: usize, max: usize) -> Self {
        ValidatorRule::StringLength {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn max_length(max: usize) -> Self {
        ValidatorRule::StringLength {
            min: None,
            max: Some(max),
        }
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ValidatorRule::Regex(Regex::new(pattern)?))
    }

    fn check(&self, value: &Value) -> Option<ValidationMessage> {
        match self {
            ValidatorRule::StringLength { min, max } => {
                let len = value_as_string(value).chars().count();
                if let Some(min) = min.filter(|min| len < *min) {
                    return Some(
                        ValidationMessage::new(
                            "stringLengthTooShort",
                            "The input is less than %min% characters long",
                        )
                        .param("min", min),
                    );
                }
                if let Some(max) = max.filter(|max| len > *max) {
                    return Some(
                        ValidationMessage::new(
                            "stringLengthTooLong",
                            "The input is more than %max% characters long",
                        )
                        .param("max", max),
                    );
                }
                None
            }
            ValidatorRule::Digits => {
                let text = value_as_string(value);
                if text.chars().all(|c| c.is_ascii_digit()) {
                    None
                } else {
                    Some(ValidationMessage::new(
                        "notDigits",
                        "The input must contain only digits",
                    ))
                }
            }
            ValidatorRule::EmailAddress => {
                if email_pattern().is_match(&value_as_string(value)) {
                    None
                } else {
                    Some(ValidationMessage::new(
                        "emailAddressInvalidFormat",
                        "The input is not a valid email address. Use the basic format local-part@hostname",
                    ))
                }
            }
            ValidatorRule::Between { min, max } => match value_as_i64(value) {
                Some(n) if (*min..=*max).contains(&n) => None,
                _ => Some(
                    ValidationMessage::new(
                        "notBetween",
                        "The input is not between '%min%' and '%max%', inclusively",
                    )
                    .param("min", min)
                    .param("max", max),
                ),
            },
            ValidatorRule::Regex(pattern) => {
                if pattern.is_match(&value_as_string(value)) {
                    None
                } else {
                    Some(
                        ValidationMessage::new(
                            "regexNotMatch",
                            "The input does not match against pattern '%pattern%'",
                        )
                        .param("pattern", pattern.as_str()),
                    )
                }
            }
            ValidatorRule::InArray(haystack) => {
                let text = value_as_string(value);
                if haystack.iter().any(|candidate| *candidate == text) {
                    None
                } else {
                    Some(ValidationMessage::new(
                        "notInArray",
                        "The input was not found in the haystack",
                    ))
                }
            }
        }
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"))
}

/// Filters and validators for one named input.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub name: String,
    pub required: bool,
    pub filters: Vec<FilterKind>,
    pub validators: Vec<ValidatorRule>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            filters: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn filter(mut self, filter: FilterKind) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn validator(mut self, rule: ValidatorRule) -> Self {
        self.validators.push(rule);
        self
    }

    fn apply_filters(&self, raw: Value) -> Value {
        self.filters.iter().fold(raw, |value, filter| match (filter, value) {
            (FilterKind::StringTrim, Value::String(s)) => Value::String(s.trim().to_string()),
            (FilterKind::StripTags, Value::String(s)) => {
                Value::String(tag_pattern().replace_all(&s, "").into_owned())
            }
            (FilterKind::ToInt, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (FilterKind::ToNull, Value::String(s)) if s.is_empty() => Value::Null,
            (_, value) => value,
        })
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Outcome of running an [`InputFilter`] over raw data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub values: FieldMap,
    pub errors: FieldErrors,
}

impl FilterOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The validation rule set of a record.
#[derive(Debug, Clone, Default)]
pub struct InputFilter {
    inputs: Vec<InputSpec>,
}

impl InputFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn get(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|spec| spec.name == name)
    }

    /// Filters every declared input, then validates it. Fields in `raw`
    /// without a matching input are dropped from the result.
    pub fn run(&self, raw: &FieldMap, translator: &dyn Translator) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for spec in &self.inputs {
            let value = spec.apply_filters(raw.get(&spec.name).cloned().unwrap_or(Value::Null));

            let messages: Vec<String> = if is_empty(&value) {
                if spec.required {
                    vec![ValidationMessage::new("isEmpty", "Value is required and can't be empty")
                        .render(translator)]
                } else {
                    Vec::new()
                }
            } else {
                spec.validators
                    .iter()
                    .filter_map(|rule| rule.check(&value))
                    .map(|message| message.render(translator))
                    .collect()
            };

            if !messages.is_empty() {
                outcome.errors.insert(spec.name.clone(), messages);
            }
            outcome.values.insert(spec.name.clone(), value);
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
