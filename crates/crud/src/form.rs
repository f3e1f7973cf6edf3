use serde::Serialize;
use serde_json::Value;
use shared::domain::FieldMap;

use crate::{
    filter::{FieldErrors, FilterOutcome, InputFilter},
    i18n::Translator,
    record::Record,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Hidden,
    Text,
    Textarea,
    Number,
    Email,
    Select,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormElement {
    pub name: String,
    pub label: Option<String>,
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormElement {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            options: Vec::new(),
        }
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        Self::new(name, ElementKind::Hidden)
    }

    pub fn labelled(name: impl Into<String>, kind: ElementKind, label: impl Into<String>) -> Self {
        Self::new(name, kind).label(label)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Layout of a form: which elements are shown and in what order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSpec {
    pub name: String,
    pub elements: Vec<FormElement>,
}

impl FormSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
        }
    }

    pub fn element(mut self, element: FormElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    #[serde(flatten)]
    pub element: FormElement,
    pub value: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Serialisable state of a bound form, handed to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub name: String,
    pub prevalidated: bool,
    pub valid: Option<bool>,
    pub elements: Vec<ElementView>,
}

/// A record bound to a form and an input filter.
///
/// Raw data set with [`set_data`](Self::set_data) stays pending until
/// [`is_valid`](Self::is_valid) runs; without pending data the bound record's
/// own fields are validated.
#[derive(Debug)]
pub struct FormBinding<R> {
    spec: FormSpec,
    record: R,
    filter: InputFilter,
    data: Option<FieldMap>,
    outcome: Option<FilterOutcome>,
    prevalidated: bool,
}

impl<R: Record> FormBinding<R> {
    pub fn bind(spec: FormSpec, record: R) -> Self {
        let filter = record.input_filter();
        Self {
            spec,
            record,
            filter,
            data: None,
            outcome: None,
            prevalidated: false,
        }
    }

    pub fn set_data(&mut self, data: FieldMap) {
        self.data = Some(data);
        self.outcome = None;
    }

    pub fn is_valid(&mut self, translator: &dyn Translator) -> bool {
        let outcome = match &self.data {
            Some(data) => self.filter.run(data, translator),
            None => self.filter.run(&self.record.to_fields(), translator),
        };
        let valid = outcome.is_valid();
        self.outcome = Some(outcome);
        valid
    }

    pub(crate) fn mark_prevalidated(&mut self, translator: &dyn Translator) {
        self.prevalidated = true;
        self.is_valid(translator);
    }

    pub fn is_prevalidated(&self) -> bool {
        self.prevalidated
    }

    /// Filtered values, available only after a successful validation.
    pub fn validated_data(&self) -> Option<&FieldMap> {
        self.outcome
            .as_ref()
            .filter(|outcome| outcome.is_valid())
            .map(|outcome| &outcome.values)
    }

    pub fn errors(&self) -> FieldErrors {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.errors.clone())
            .unwrap_or_default()
    }

    pub fn pending_data(&self) -> Option<&FieldMap> {
        self.data.as_ref()
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn into_record(self) -> R {
        self.record
    }

    /// Values to redisplay: the record's fields overlaid with pending raw data.
    pub fn values(&self) -> FieldMap {
        let mut values = self.record.to_fields();
        if let Some(data) = &self.data {
            values.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        values
    }

    pub fn view(&self) -> FormView {
        let values = self.values();
        let errors = self.errors();
        let elements = self
            .spec
            .elements
            .iter()
            .map(|element| ElementView {
                element: element.clone(),
                value: values.get(&element.name).cloned().unwrap_or(Value::Null),
                messages: errors.get(&element.name).cloned().unwrap_or_default(),
            })
            .collect();
        FormView {
            name: self.spec.name.clone(),
            prevalidated: self.prevalidated,
            valid: self.outcome.as_ref().map(FilterOutcome::is_valid),
            elements,
        }
    }
}
