use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{Action, FieldMap, PageRequest, RecordKey},
    error::PersistenceError,
};

use super::*;
use crate::{
    adapter::Query,
    dispatch::{CrudRequest, Dispatch, Outcome, RequestContext},
    filter::{FilterKind, InputFilter, InputSpec, ValidatorRule},
    form::{ElementKind, FormElement},
    i18n::MessageCatalog,
    memory::MemoryAdapter,
    record::{value_as_string, SelfPersisting},
    session::{MemorySessionStore, SessionId},
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Contact {
    id: String,
    name: String,
    email: String,
}

fn contact_filter() -> InputFilter {
    InputFilter::new()
        .input(InputSpec::new("id").filter(FilterKind::StringTrim))
        .input(
            InputSpec::new("name")
                .required()
                .filter(FilterKind::StringTrim)
                .validator(ValidatorRule::length(3, 40)),
        )
        .input(
            InputSpec::new("email")
                .required()
                .filter(FilterKind::StringTrim)
                .validator(ValidatorRule::EmailAddress),
        )
}

impl Record for Contact {
    fn key_fields(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("id".to_string(), json!(self.id)),
            ("name".to_string(), json!(self.name)),
            ("email".to_string(), json!(self.email)),
        ])
    }

    fn exchange(&mut self, data: &FieldMap) {
        if let Some(v) = data.get("id") {
            self.id = value_as_string(v);
        }
        if let Some(v) = data.get("name") {
            self.name = value_as_string(v);
        }
        if let Some(v) = data.get("email") {
            self.email = value_as_string(v);
        }
    }

    fn input_filter(&self) -> InputFilter {
        contact_filter()
    }
}

struct ContactController;

impl FormProvider<Contact> for ContactController {
    fn form(&self, full: bool) -> FormSpec {
        let form = FormSpec::new("contact")
            .element(FormElement::hidden("id"))
            .element(FormElement::labelled("name", ElementKind::Text, "Name"))
            .element(FormElement::labelled("email", ElementKind::Email, "E-mail"));
        if full {
            form.element(FormElement::new("submit", ElementKind::Submit))
        } else {
            form
        }
    }
}

impl TitleProvider for ContactController {
    fn edit_title(&self, key: Option<&RecordKey>) -> String {
        match key {
            Some(key) => format!("Edit contact {key}"),
            None => "New contact".to_string(),
        }
    }
}

struct Paths;

impl UrlBuilder for Paths {
    fn url(&self, route: &str, params: &BTreeMap<String, String>) -> String {
        match route {
            "home" => "/".to_string(),
            _ => {
                let segments: Vec<&str> = ["controller", "action", "key"]
                    .iter()
                    .filter_map(|name| params.get(*name).map(String::as_str))
                    .collect();
                format!("/{}", segments.join("/"))
            }
        }
    }
}

struct Fixture {
    controller: CrudController<Contact>,
    adapter: Arc<MemoryAdapter<Contact>>,
    sessions: MemorySessionStore,
    session_id: SessionId,
    catalog: MessageCatalog,
}

impl Fixture {
    fn new() -> Self {
        Self::with_options(ControllerOptions::default())
    }

    fn with_options(options: ControllerOptions) -> Self {
        let factory: Arc<dyn RecordFactory<Contact>> = Arc::new(Contact::default);
        let adapter = Arc::new(MemoryAdapter::new(factory.clone()));
        let controller =
            CrudController::for_provider(adapter.clone(), factory, Arc::new(ContactController))
                .with_options(options);
        Self {
            controller,
            adapter,
            sessions: MemorySessionStore::new(),
            session_id: SessionId::new("session-1"),
            catalog: MessageCatalog::new("en"),
        }
    }

    fn session(&self) -> SessionContext<'_> {
        SessionContext::new(&self.session_id, &self.sessions)
    }

    async fn seed(&self, count: usize) {
        for n in 1..=count {
            let mut contact = Contact {
                id: String::new(),
                name: format!("Contact {n:02}"),
                email: format!("c{n}@example.com"),
            };
            self.adapter.save(&mut contact).await.expect("seed");
        }
    }

    async fn save(&self, data: FieldMap) -> SaveOutcome {
        self.controller
            .save(Submission::post(data), self.session(), &self.catalog)
            .await
            .expect("save")
    }

    async fn prepare_edit(&self, key: Option<&RecordKey>) -> EditForm<Contact> {
        self.controller
            .prepare_edit(key, self.session(), &self.catalog)
            .await
            .expect("edit")
    }
}

fn posted(id: &str, name: &str, email: &str) -> FieldMap {
    FieldMap::from([
        ("id".to_string(), json!(id)),
        ("name".to_string(), json!(name)),
        ("email".to_string(), json!(email)),
    ])
}

#[test]
fn controller_is_named_after_provider_type() {
    let fixture = Fixture::new();
    assert_eq!(fixture.controller.name(), "contact");
}

#[tokio::test]
async fn valid_submission_is_persisted_and_redirects_to_index() {
    let fixture = Fixture::new();
    let outcome = fixture.save(posted("", " Ada Lovelace ", "ada@example.com")).await;

    let SaveOutcome::Saved { key, redirect } = outcome else {
        panic!("expected a saved outcome, got {outcome:?}");
    };
    assert_eq!(redirect.action(), None);
    assert_eq!(redirect.params.get("controller").map(String::as_str), Some("contact"));

    let stored = fixture
        .adapter
        .fetch_by_key(&key)
        .await
        .expect("fetch")
        .expect("stored record");
    assert_eq!(stored.name, "Ada Lovelace");
    assert_eq!(stored.email, "ada@example.com");
    assert_eq!(stored.id, key.as_str());
}

#[tokio::test]
async fn resubmitting_an_existing_key_updates_in_place() {
    let fixture = Fixture::new();
    fixture.seed(2).await;

    fixture.save(posted("2", "Renamed", "renamed@example.com")).await;

    assert_eq!(fixture.adapter.len().await, 2);
    let stored = fixture
        .adapter
        .fetch_by_key(&RecordKey::new("2"))
        .await
        .expect("fetch")
        .expect("record");
    assert_eq!(stored.name, "Renamed");
}

#[tokio::test]
async fn invalid_submission_is_stashed_and_redirects_to_edit() {
    let fixture = Fixture::new();
    let outcome = fixture.save(posted("7", "Al", "not-an-email")).await;

    assert!(matches!(outcome, SaveOutcome::Invalid { .. }));
    let redirect = outcome.redirect();
    assert_eq!(redirect.action(), Some("edit"));
    assert!(!redirect.params.contains_key("key"));
    assert_eq!(fixture.adapter.writes(), 0);
    assert!(fixture.sessions.has_pending(&fixture.session_id).await);
}

#[tokio::test]
async fn edit_after_failed_save_restores_posted_data_once() {
    let fixture = Fixture::new();
    let data = posted("", "Al", "al@example.com");
    fixture.save(data.clone()).await;

    let edit = fixture.prepare_edit(None).await;
    assert!(edit.binding.is_prevalidated());
    assert_eq!(edit.binding.record().to_fields(), data);
    let errors = edit.binding.errors();
    assert_eq!(
        errors.get("name"),
        Some(&vec!["The input is less than 3 characters long".to_string()])
    );
    assert!(!fixture.sessions.has_pending(&fixture.session_id).await);

    let again = fixture.prepare_edit(None).await;
    assert!(!again.binding.is_prevalidated());
    assert_eq!(again.binding.record(), &Contact::default());
}

#[tokio::test]
async fn restored_data_overrides_the_stored_record() {
    let fixture = Fixture::new();
    fixture.seed(1).await;
    let key = RecordKey::new("1");
    let data = posted("1", "Bo", "bo@example.com");
    fixture.save(data.clone()).await;

    let edit = fixture.prepare_edit(Some(&key)).await;
    assert_eq!(edit.binding.record().to_fields(), data);
    assert_eq!(edit.title, "Edit contact 1");
}

#[tokio::test]
async fn edit_without_key_yields_an_empty_record() {
    let fixture = Fixture::new();
    fixture.seed(3).await;

    let edit = fixture.prepare_edit(None).await;
    assert_eq!(edit.binding.record(), &Contact::default());
    assert!(!edit.binding.is_prevalidated());
    assert!(edit.binding.errors().is_empty());
    assert_eq!(edit.title, "New contact");
}

#[tokio::test]
async fn edit_loads_the_stored_record() {
    let fixture = Fixture::new();
    fixture.seed(3).await;

    let edit = fixture.prepare_edit(Some(&RecordKey::new("2"))).await;
    assert_eq!(edit.binding.record().name, "Contact 02");

    let view = edit.binding.view();
    let name = view
        .elements
        .iter()
        .find(|element| element.element.name == "name")
        .expect("name element");
    assert_eq!(name.value, json!("Contact 02"));
    assert!(view.elements.iter().any(|element| element.element.kind == ElementKind::Submit));
}

#[tokio::test]
async fn missing_record_is_reported_by_default() {
    let fixture = Fixture::new();
    let err = fixture
        .controller
        .prepare_edit(Some(&RecordKey::new("404")), fixture.session(), &fixture.catalog)
        .await
        .expect_err("should fail");
    assert!(matches!(err, CrudError::NotFound(key) if key.as_str() == "404"));
}

#[tokio::test]
async fn fresh_record_policy_substitutes_an_empty_record() {
    let fixture = Fixture::with_options(ControllerOptions {
        missing_record: MissingRecordPolicy::FreshRecord,
        ..ControllerOptions::default()
    });
    let edit = fixture.prepare_edit(Some(&RecordKey::new("404"))).await;
    assert_eq!(edit.binding.record(), &Contact::default());
}

#[tokio::test]
async fn pending_data_of_another_controller_is_discarded() {
    let fixture = Fixture::new();
    fixture
        .session()
        .stash("invoice", posted("", "Other", "other@example.com"))
        .await
        .expect("stash");

    let edit = fixture.prepare_edit(None).await;
    assert_eq!(edit.binding.record(), &Contact::default());
    assert!(!fixture.sessions.has_pending(&fixture.session_id).await);
}

#[tokio::test]
async fn get_request_to_save_only_redirects() {
    let fixture = Fixture::new();
    let outcome = fixture
        .controller
        .save(Submission::get(), fixture.session(), &fixture.catalog)
        .await
        .expect("save");
    assert!(matches!(outcome, SaveOutcome::NotSubmitted { .. }));
    assert_eq!(outcome.redirect().action(), None);
    assert_eq!(fixture.adapter.writes(), 0);
    assert!(!fixture.sessions.has_pending(&fixture.session_id).await);
}

#[tokio::test]
async fn delete_removes_the_record() {
    let fixture = Fixture::new();
    fixture.seed(2).await;
    let key = RecordKey::new("1");

    let redirect = fixture.controller.delete(Some(&key)).await.expect("delete");
    assert_eq!(redirect, fixture.controller.redirect_index());
    assert!(fixture.adapter.fetch_by_key(&key).await.expect("fetch").is_none());
    assert_eq!(fixture.adapter.len().await, 1);
}

#[tokio::test]
async fn delete_without_key_is_a_persistence_error() {
    let fixture = Fixture::new();
    let err = fixture.controller.delete(None).await.expect_err("should fail");
    assert!(matches!(
        err,
        CrudError::Persistence(PersistenceError::MissingKey)
    ));
}

#[tokio::test]
async fn lists_records_page_by_page() {
    let fixture = Fixture::new();
    fixture.seed(25).await;

    let first = fixture
        .controller
        .list_records(PageRequest::new(1, 10).expect("page"), None)
        .await
        .expect("list");
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_items, 25);
    assert_eq!(first.items[0].id, "1");

    let third = fixture
        .controller
        .list_records(PageRequest::new(3, 10).expect("page"), None)
        .await
        .expect("list");
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.items[4].id, "25");
}

#[tokio::test]
async fn base_query_replaces_the_default_selection() {
    let fixture = Fixture::new();
    fixture.seed(5).await;

    let query = Query::all().where_eq("name", "Contact 04");
    let page = fixture
        .controller
        .list_records(PageRequest::first(10).expect("page"), Some(&query))
        .await
        .expect("list");
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].email, "c4@example.com");

    let newest_first = Query::all().order_by("name", true);
    let page = fixture
        .controller
        .list_records(PageRequest::first(2).expect("page"), Some(&newest_first))
        .await
        .expect("list");
    assert_eq!(page.items[0].name, "Contact 05");
}

#[tokio::test]
async fn index_view_exposes_list_variables() {
    let fixture = Fixture::new();
    fixture.seed(12).await;

    let view = fixture.controller.index(Some(2), &Paths).await.expect("index");
    assert_eq!(view.template, "contact/index");
    assert_eq!(view.variable("controller"), Some(&json!("contact")));
    assert_eq!(view.variable("route"), Some(&json!("crud")));
    assert_eq!(view.variable("urlEdit"), Some(&json!("/contact/edit")));
    assert_eq!(view.variable("urlDelete"), Some(&json!("/contact/delete")));
    assert_eq!(view.variable("urlHomepage"), Some(&json!("/")));

    let paginator = view.variable("paginator").expect("paginator");
    assert_eq!(paginator["current_page"], json!(2));
    assert_eq!(paginator["total_items"], json!(12));
    assert_eq!(paginator["items"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn edit_view_carries_form_and_title() {
    let fixture = Fixture::new();
    let view = fixture
        .controller
        .edit(None, fixture.session(), &fixture.catalog)
        .await
        .expect("edit");
    assert_eq!(view.variable("title"), Some(&json!("New contact")));
    assert_eq!(view.variable("form").map(|form| &form["name"]), Some(&json!("contact")));
}

#[tokio::test]
async fn validation_messages_use_the_request_translator() {
    let fixture = Fixture::new();
    fixture.save(posted("", "", "x@example.com")).await;

    let catalog = MessageCatalog::new("pt_BR")
        .with_message("isEmpty", "Valor obrigatório e não pode estar vazio");
    let edit = fixture
        .controller
        .prepare_edit(None, fixture.session(), &catalog)
        .await
        .expect("edit");
    assert_eq!(
        edit.binding.errors().get("name"),
        Some(&vec!["Valor obrigatório e não pode estar vazio".to_string()])
    );
}

#[tokio::test]
async fn page_action_redirects_with_page_argument() {
    let fixture = Fixture::new();
    let redirect = fixture.controller.page(Some(&RecordKey::new("3")));
    assert_eq!(redirect.params.get("page").map(String::as_str), Some("3"));

    let fallback = fixture.controller.page(Some(&RecordKey::new("zero")));
    assert_eq!(fallback.params.get("page").map(String::as_str), Some("1"));
}

type Journal = Arc<Mutex<BTreeMap<RecordKey, FieldMap>>>;

#[derive(Clone, Default)]
struct ActiveContact {
    contact: Contact,
    journal: Journal,
}

impl Record for ActiveContact {
    fn key_fields(&self) -> &'static [&'static str] {
        self.contact.key_fields()
    }

    fn to_fields(&self) -> FieldMap {
        self.contact.to_fields()
    }

    fn exchange(&mut self, data: &FieldMap) {
        self.contact.exchange(data);
    }

    fn input_filter(&self) -> InputFilter {
        contact_filter()
    }

    fn as_self_persisting(&mut self) -> Option<&mut dyn SelfPersisting> {
        Some(self)
    }
}

#[async_trait]
impl SelfPersisting for ActiveContact {
    async fn save(&mut self) -> Result<RecordKey, PersistenceError> {
        let journal = self.journal.clone();
        let mut journal = journal.lock().expect("journal");
        let key = match self.key() {
            Some(key) => key,
            None => {
                let key = RecordKey::new((journal.len() + 1).to_string());
                self.set_key(&key);
                key
            }
        };
        journal.insert(key.clone(), self.to_fields());
        Ok(key)
    }

    async fn delete(&mut self) -> Result<(), PersistenceError> {
        let key = self.key().ok_or(PersistenceError::MissingKey)?;
        self.journal.lock().expect("journal").remove(&key);
        Ok(())
    }
}

struct ActiveContactController;

impl FormProvider<ActiveContact> for ActiveContactController {
    fn form(&self, full: bool) -> FormSpec {
        ContactController.form(full)
    }
}

impl TitleProvider for ActiveContactController {
    fn edit_title(&self, key: Option<&RecordKey>) -> String {
        ContactController.edit_title(key)
    }
}

#[tokio::test]
async fn active_record_strategy_bypasses_the_adapter() {
    let journal = Journal::default();
    let factory_journal = journal.clone();
    let factory: Arc<dyn RecordFactory<ActiveContact>> = Arc::new(move || ActiveContact {
        contact: Contact::default(),
        journal: factory_journal.clone(),
    });
    let adapter = Arc::new(MemoryAdapter::new(factory.clone()));
    let controller = CrudController::for_provider(
        adapter.clone(),
        factory,
        Arc::new(ActiveContactController),
    )
    .with_options(ControllerOptions {
        active_record_strategy: true,
        ..ControllerOptions::default()
    });
    let sessions = MemorySessionStore::new();
    let id = SessionId::new("s");
    let catalog = MessageCatalog::new("en");

    let outcome = controller
        .save(
            Submission::post(posted("", "Grace Hopper", "grace@example.com")),
            SessionContext::new(&id, &sessions),
            &catalog,
        )
        .await
        .expect("save");
    let SaveOutcome::Saved { key, .. } = outcome else {
        panic!("expected a saved outcome");
    };
    assert_eq!(controller.name(), "activecontact");
    assert_eq!(adapter.writes(), 0);
    assert_eq!(
        journal.lock().expect("journal").get(&key).map(|f| f["name"].clone()),
        Some(Value::from("Grace Hopper"))
    );

    controller.delete(Some(&key)).await.expect("delete");
    assert!(journal.lock().expect("journal").is_empty());
}

#[tokio::test]
async fn active_record_strategy_requires_self_persisting_records() {
    let fixture = Fixture::with_options(ControllerOptions {
        active_record_strategy: true,
        ..ControllerOptions::default()
    });
    let err = fixture
        .controller
        .save(
            Submission::post(posted("", "Ada Lovelace", "ada@example.com")),
            fixture.session(),
            &fixture.catalog,
        )
        .await
        .expect_err("should fail");
    assert!(matches!(
        err,
        CrudError::Persistence(PersistenceError::NotSelfPersisting)
    ));
}

#[tokio::test]
async fn dispatch_routes_actions_to_operations() {
    let fixture = Fixture::new();
    let registry: Vec<&dyn Dispatch> = vec![&fixture.controller];
    let controller = registry
        .iter()
        .find(|controller| controller.name() == "contact")
        .expect("registered");
    let ctx = RequestContext {
        session: fixture.session(),
        translator: &fixture.catalog,
        urls: &Paths,
    };

    let saved = controller
        .dispatch(
            CrudRequest::new(Action::Save).post(posted("", "Ada Lovelace", "ada@example.com")),
            ctx,
        )
        .await
        .expect("save");
    assert!(matches!(saved, Outcome::Redirect(ref r) if r.action().is_none()));

    let index = controller
        .dispatch(CrudRequest::new(Action::Index), ctx)
        .await
        .expect("index");
    let Outcome::View(view) = index else {
        panic!("expected a view");
    };
    assert_eq!(view.variable("paginator").expect("paginator")["total_items"], json!(1));

    let deleted = controller
        .dispatch(
            CrudRequest::new(Action::Delete).key(Some(RecordKey::new("1"))),
            ctx,
        )
        .await
        .expect("delete");
    assert!(matches!(deleted, Outcome::Redirect(_)));
    assert!(fixture.adapter.is_empty().await);
}
