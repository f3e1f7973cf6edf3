use crud::{
    filter::{FilterKind, InputFilter, InputSpec, ValidatorRule},
    form::{ElementKind, FormElement, FormSpec},
    record::{value_as_i64, value_as_string, Record},
    FormProvider, TitleProvider,
};
use serde_json::{json, Value};
use shared::domain::{FieldMap, RecordKey};

pub const COLORS: [&str; 3] = ["red", "green", "blue"];

/// Inventory item, persisted through the entity repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    pub id: Option<i64>,
    pub name: String,
    pub quantity: Option<i64>,
    pub color: Option<String>,
}

impl Record for Widget {
    fn key_fields(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("id".to_string(), self.id.map_or(Value::Null, Value::from)),
            ("name".to_string(), json!(self.name)),
            (
                "quantity".to_string(),
                self.quantity.map_or(Value::Null, Value::from),
            ),
            ("color".to_string(), json!(self.color)),
        ])
    }

    fn exchange(&mut self, data: &FieldMap) {
        if let Some(id) = data.get("id") {
            self.id = value_as_i64(id);
        }
        if let Some(name) = data.get("name") {
            self.name = value_as_string(name);
        }
        if let Some(quantity) = data.get("quantity") {
            self.quantity = value_as_i64(quantity);
        }
        if let Some(color) = data.get("color") {
            self.color = Some(value_as_string(color)).filter(|c| !c.is_empty());
        }
    }

    fn input_filter(&self) -> InputFilter {
        InputFilter::new()
            .input(InputSpec::new("id").filter(FilterKind::ToInt))
            .input(
                InputSpec::new("name")
                    .required()
                    .filter(FilterKind::StripTags)
                    .filter(FilterKind::StringTrim)
                    .validator(ValidatorRule::length(2, 80)),
            )
            .input(
                InputSpec::new("quantity")
                    .filter(FilterKind::StringTrim)
                    .filter(FilterKind::ToInt)
                    .validator(ValidatorRule::Between { min: 0, max: 10_000 }),
            )
            .input(
                InputSpec::new("color")
                    .filter(FilterKind::ToNull)
                    .validator(ValidatorRule::InArray(
                        COLORS.iter().map(|c| c.to_string()).collect(),
                    )),
            )
    }
}

pub struct WidgetController;

impl FormProvider<Widget> for WidgetController {
    fn form(&self, full: bool) -> FormSpec {
        let form = FormSpec::new("widget")
            .element(FormElement::hidden("id"))
            .element(FormElement::labelled("name", ElementKind::Text, "Name"))
            .element(FormElement::labelled("quantity", ElementKind::Number, "Quantity"))
            .element(FormElement::labelled("color", ElementKind::Select, "Color").options(COLORS));
        if full {
            form.element(FormElement::labelled("submit", ElementKind::Submit, "Save"))
        } else {
            form
        }
    }
}

impl TitleProvider for WidgetController {
    fn edit_title(&self, key: Option<&RecordKey>) -> String {
        match key {
            Some(key) => format!("Edit widget #{key}"),
            None => "New widget".to_string(),
        }
    }
}
