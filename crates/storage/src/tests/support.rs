use std::sync::Arc;

use crud::{
    filter::{FilterKind, InputFilter, InputSpec},
    record::{value_as_i64, value_as_string, Record, RecordFactory},
};
use serde_json::{json, Value};
use shared::domain::FieldMap;

/// `shelf_mark` is stored but not declared in the input filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub pages: Option<i64>,
    pub shelf_mark: String,
}

impl Book {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Record for Book {
    fn key_fields(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("id".to_string(), self.id.map_or(Value::Null, Value::from)),
            ("title".to_string(), json!(self.title)),
            ("pages".to_string(), self.pages.map_or(Value::Null, Value::from)),
            ("shelf_mark".to_string(), json!(self.shelf_mark)),
        ])
    }

    fn exchange(&mut self, data: &FieldMap) {
        if let Some(id) = data.get("id") {
            self.id = value_as_i64(id);
        }
        if let Some(title) = data.get("title") {
            self.title = value_as_string(title);
        }
        if let Some(pages) = data.get("pages") {
            self.pages = value_as_i64(pages);
        }
        if let Some(mark) = data.get("shelf_mark") {
            self.shelf_mark = value_as_string(mark);
        }
    }

    fn input_filter(&self) -> InputFilter {
        InputFilter::new()
            .input(InputSpec::new("id").filter(FilterKind::ToInt))
            .input(InputSpec::new("title").required().filter(FilterKind::StringTrim))
            .input(InputSpec::new("pages").filter(FilterKind::ToInt))
    }
}

pub fn book_factory() -> Arc<dyn RecordFactory<Book>> {
    Arc::new(Book::default)
}

/// Two-part key, never auto-assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loan {
    pub book_id: String,
    pub member: String,
}

impl Record for Loan {
    fn key_fields(&self) -> &'static [&'static str] {
        &["book_id", "member"]
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("book_id".to_string(), json!(self.book_id)),
            ("member".to_string(), json!(self.member)),
        ])
    }

    fn exchange(&mut self, data: &FieldMap) {
        if let Some(book_id) = data.get("book_id") {
            self.book_id = value_as_string(book_id);
        }
        if let Some(member) = data.get("member") {
            self.member = value_as_string(member);
        }
    }

    fn input_filter(&self) -> InputFilter {
        InputFilter::new()
            .input(InputSpec::new("book_id").required())
            .input(InputSpec::new("member").required())
    }
}

pub fn loan_factory() -> Arc<dyn RecordFactory<Loan>> {
    Arc::new(Loan::default)
}
