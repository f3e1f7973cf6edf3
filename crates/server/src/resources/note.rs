use async_trait::async_trait;
use crud::{
    filter::{FilterKind, InputFilter, InputSpec, ValidatorRule},
    form::{ElementKind, FormElement, FormSpec},
    record::{value_as_i64, value_as_string, Record, SelfPersisting},
    FormProvider, TitleProvider,
};
use serde_json::{json, Value};
use shared::{
    domain::{FieldMap, RecordKey},
    error::PersistenceError,
};
use storage::Storage;

pub const RESOURCE: &str = "note";

/// Short memo that writes itself to storage.
#[derive(Clone)]
pub struct Note {
    pub id: Option<i64>,
    pub title: String,
    pub body: String,
    pub author_email: String,
    storage: Storage,
}

impl Note {
    pub fn attached(storage: Storage) -> Self {
        Self {
            id: None,
            title: String::new(),
            body: String::new(),
            author_email: String::new(),
            storage,
        }
    }
}

impl Record for Note {
    fn key_fields(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("id".to_string(), self.id.map_or(Value::Null, Value::from)),
            ("title".to_string(), json!(self.title)),
            ("body".to_string(), json!(self.body)),
            ("author_email".to_string(), json!(self.author_email)),
        ])
    }

    fn exchange(&mut self, data: &FieldMap) {
        if let Some(id) = data.get("id") {
            self.id = value_as_i64(id);
        }
        if let Some(title) = data.get("title") {
            self.title = value_as_string(title);
        }
        if let Some(body) = data.get("body") {
            self.body = value_as_string(body);
        }
        if let Some(email) = data.get("author_email") {
            self.author_email = value_as_string(email);
        }
    }

    fn input_filter(&self) -> InputFilter {
        InputFilter::new()
            .input(InputSpec::new("id").filter(FilterKind::ToInt))
            .input(
                InputSpec::new("title")
                    .required()
                    .filter(FilterKind::StringTrim)
                    .validator(ValidatorRule::length(1, 120)),
            )
            .input(
                InputSpec::new("body")
                    .filter(FilterKind::StripTags)
                    .validator(ValidatorRule::max_length(2_000)),
            )
            .input(
                InputSpec::new("author_email")
                    .required()
                    .filter(FilterKind::StringTrim)
                    .validator(ValidatorRule::EmailAddress),
            )
    }

    fn as_self_persisting(&mut self) -> Option<&mut dyn SelfPersisting> {
        Some(self)
    }
}

#[async_trait]
impl SelfPersisting for Note {
    async fn save(&mut self) -> Result<RecordKey, PersistenceError> {
        match self.key() {
            Some(key) => {
                self.storage
                    .upsert_row(RESOURCE, &key, &self.to_fields())
                    .await
                    .map_err(PersistenceError::backend)?;
                Ok(key)
            }
            None => {
                let key = self
                    .storage
                    .insert_next(RESOURCE, "id", &self.to_fields())
                    .await
                    .map_err(PersistenceError::backend)?;
                self.set_key(&key);
                Ok(key)
            }
        }
    }

    async fn delete(&mut self) -> Result<(), PersistenceError> {
        let key = self.key().ok_or(PersistenceError::MissingKey)?;
        self.storage
            .delete_row(RESOURCE, &key)
            .await
            .map_err(PersistenceError::backend)?;
        Ok(())
    }
}

pub struct NoteController;

impl FormProvider<Note> for NoteController {
    fn form(&self, full: bool) -> FormSpec {
        let form = FormSpec::new("note")
            .element(FormElement::hidden("id"))
            .element(FormElement::labelled("title", ElementKind::Text, "Title"))
            .element(FormElement::labelled("body", ElementKind::Textarea, "Body"))
            .element(FormElement::labelled(
                "author_email",
                ElementKind::Email,
                "Author e-mail",
            ));
        if full {
            form.element(FormElement::labelled("submit", ElementKind::Submit, "Save"))
        } else {
            form
        }
    }
}

impl TitleProvider for NoteController {
    fn edit_title(&self, key: Option<&RecordKey>) -> String {
        key.map_or_else(|| "New note".to_string(), |key| format!("Edit note #{key}"))
    }
}
