use std::{collections::BTreeMap, sync::Arc};

use serde_json::json;
use shared::{
    domain::{FieldMap, Page, PageRequest, PageRequestError, RecordKey},
    error::PersistenceError,
    protocol::{Redirect, RenderMode, ViewModel},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    adapter::{PersistenceAdapter, Query},
    dispatch::UrlBuilder,
    form::{FormBinding, FormSpec},
    i18n::Translator,
    naming::controller_name,
    record::{Record, RecordFactory},
    session::{SessionContext, SessionError},
};

/// Supplies the form layout of a resource. `full` asks for the edit-page
/// variant, the save path uses the reduced one.
pub trait FormProvider<R>: Send + Sync {
    fn form(&self, full: bool) -> FormSpec;
}

pub trait TitleProvider: Send + Sync {
    fn edit_title(&self, key: Option<&RecordKey>) -> String;
}

/// What the edit action does when the requested key does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingRecordPolicy {
    #[default]
    NotFound,
    /// Silently edit a fresh record instead.
    FreshRecord,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub route: String,
    pub home_route: String,
    pub items_per_page: u32,
    pub page_arg: String,
    pub active_record_strategy: bool,
    pub render_mode: RenderMode,
    pub missing_record: MissingRecordPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            route: "crud".into(),
            home_route: "home".into(),
            items_per_page: 10,
            page_arg: "page".into(),
            active_record_strategy: false,
            render_mode: RenderMode::Template,
            missing_record: MissingRecordPolicy::NotFound,
        }
    }
}

#[derive(Debug, Error)]
pub enum CrudError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("record '{0}' not found")]
    NotFound(RecordKey),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Page(#[from] PageRequestError),
    #[error("failed to build view: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
}

/// Data arriving at the save action.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub method: RequestMethod,
    pub data: FieldMap,
}

impl Submission {
    pub fn post(data: FieldMap) -> Self {
        Self {
            method: RequestMethod::Post,
            data,
        }
    }

    pub fn get() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { key: RecordKey, redirect: Redirect },
    Invalid { redirect: Redirect },
    NotSubmitted { redirect: Redirect },
}

impl SaveOutcome {
    pub fn redirect(&self) -> &Redirect {
        match self {
            SaveOutcome::Saved { redirect, .. }
            | SaveOutcome::Invalid { redirect }
            | SaveOutcome::NotSubmitted { redirect } => redirect,
        }
    }

    pub fn into_redirect(self) -> Redirect {
        match self {
            SaveOutcome::Saved { redirect, .. }
            | SaveOutcome::Invalid { redirect }
            | SaveOutcome::NotSubmitted { redirect } => redirect,
        }
    }
}

/// A record bound to its form, plus the page title.
#[derive(Debug)]
pub struct EditForm<R> {
    pub binding: FormBinding<R>,
    pub title: String,
}

/// Generic CRUD workflow for one record type.
///
/// Everything resource-specific is injected: the persistence adapter, the
/// record factory, and the form and title providers.
pub struct CrudController<R> {
    name: String,
    adapter: Arc<dyn PersistenceAdapter<R>>,
    factory: Arc<dyn RecordFactory<R>>,
    forms: Arc<dyn FormProvider<R>>,
    titles: Arc<dyn TitleProvider>,
    options: ControllerOptions,
}

impl<R: Record> CrudController<R> {
    pub fn new(
        name: impl Into<String>,
        adapter: Arc<dyn PersistenceAdapter<R>>,
        factory: Arc<dyn RecordFactory<R>>,
        forms: Arc<dyn FormProvider<R>>,
        titles: Arc<dyn TitleProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            adapter,
            factory,
            forms,
            titles,
            options: ControllerOptions::default(),
        }
    }

    /// Builds a controller named after the provider type, so
    /// `WidgetController` serves the `widget` resource.
    pub fn for_provider<P>(
        adapter: Arc<dyn PersistenceAdapter<R>>,
        factory: Arc<dyn RecordFactory<R>>,
        provider: Arc<P>,
    ) -> Self
    where
        P: FormProvider<R> + TitleProvider + 'static,
    {
        Self::new(
            controller_name::<P>(),
            adapter,
            factory,
            provider.clone(),
            provider,
        )
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn redirect_index(&self) -> Redirect {
        Redirect::to_route(&self.options.route).param("controller", &self.name)
    }

    pub fn redirect_edit(&self) -> Redirect {
        self.redirect_index().param("action", "edit")
    }

    pub async fn list_records(
        &self,
        request: PageRequest,
        base_query: Option<&Query>,
    ) -> Result<Page<R>, CrudError> {
        let default_query;
        let query = match base_query {
            Some(query) => query,
            None => {
                default_query = self.adapter.default_query();
                &default_query
            }
        };
        let page = self.adapter.fetch_page(query, request).await?;
        debug!(
            controller = %self.name,
            page = page.current_page,
            items = page.items.len(),
            total = page.total_items,
            "listed records"
        );
        Ok(page)
    }

    pub async fn index(
        &self,
        page: Option<u32>,
        urls: &dyn UrlBuilder,
    ) -> Result<ViewModel, CrudError> {
        let request = PageRequest::new(page.unwrap_or(1).max(1), self.options.items_per_page)?;
        let page = self.list_records(request, None).await?;
        let page_count = page.page_count();
        let paginator = json!({
            "items": page.items.iter().map(|item| item.to_fields()).collect::<Vec<_>>(),
            "total_items": page.total_items,
            "current_page": page.current_page,
            "items_per_page": page.items_per_page,
            "page_count": page_count,
        });

        let url_edit = urls.url(&self.options.route, &self.action_params("edit"));
        let url_delete = urls.url(&self.options.route, &self.action_params("delete"));
        let url_homepage = urls.url(&self.options.home_route, &BTreeMap::new());

        Ok(
            ViewModel::new(self.options.render_mode, format!("{}/index", self.name))
                .with("controller", self.name.as_str())
                .with("paginator", paginator)
                .with("route", self.options.route.as_str())
                .with("urlEdit", url_edit)
                .with("urlDelete", url_delete)
                .with("urlHomepage", url_homepage),
        )
    }

    fn action_params(&self, action: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("controller".to_string(), self.name.clone()),
            ("action".to_string(), action.to_string()),
        ])
    }

    /// Loads or creates the record to edit and binds it to the full form.
    /// A pending submission left by a failed save is applied on top and
    /// validated at once so its messages are shown again.
    pub async fn prepare_edit(
        &self,
        key: Option<&RecordKey>,
        session: SessionContext<'_>,
        translator: &dyn Translator,
    ) -> Result<EditForm<R>, CrudError> {
        let mut record = match key {
            None => self.factory.new_record(),
            Some(key) => match self.adapter.fetch_by_key(key).await? {
                Some(record) => record,
                None => match self.options.missing_record {
                    MissingRecordPolicy::NotFound => return Err(CrudError::NotFound(key.clone())),
                    MissingRecordPolicy::FreshRecord => {
                        warn!(controller = %self.name, %key, "record not found, editing a fresh one");
                        self.factory.new_record()
                    }
                },
            },
        };

        let binding = match session.take_for(&self.name).await? {
            Some(pending) => {
                debug!(controller = %self.name, session = %session.id, "restoring pending submission");
                record.exchange(&pending);
                let mut binding = FormBinding::bind(self.forms.form(true), record);
                binding.set_data(pending);
                binding.mark_prevalidated(translator);
                binding
            }
            None => FormBinding::bind(self.forms.form(true), record),
        };

        Ok(EditForm {
            binding,
            title: self.titles.edit_title(key),
        })
    }

    pub async fn edit(
        &self,
        key: Option<&RecordKey>,
        session: SessionContext<'_>,
        translator: &dyn Translator,
    ) -> Result<ViewModel, CrudError> {
        let edit = self.prepare_edit(key, session, translator).await?;
        let form = serde_json::to_value(edit.binding.view())?;
        Ok(
            ViewModel::new(self.options.render_mode, format!("{}/edit", self.name))
                .with("form", form)
                .with("title", edit.title),
        )
    }

    /// Validates and stores a submission. Invalid input is stashed in the
    /// session and sends the client back to the edit action.
    pub async fn save(
        &self,
        submission: Submission,
        session: SessionContext<'_>,
        translator: &dyn Translator,
    ) -> Result<SaveOutcome, CrudError> {
        if submission.method != RequestMethod::Post {
            return Ok(SaveOutcome::NotSubmitted {
                redirect: self.redirect_index(),
            });
        }

        let mut binding = FormBinding::bind(self.forms.form(false), self.factory.new_record());
        binding.set_data(submission.data.clone());
        if !binding.is_valid(translator) {
            info!(
                controller = %self.name,
                fields = ?binding.errors().keys().collect::<Vec<_>>(),
                "submission failed validation"
            );
            session.stash(&self.name, submission.data).await?;
            return Ok(SaveOutcome::Invalid {
                redirect: self.redirect_edit(),
            });
        }

        let validated = binding.validated_data().cloned().unwrap_or_default();
        let mut record = binding.into_record();
        record.exchange(&validated);

        let key = if self.options.active_record_strategy {
            record
                .as_self_persisting()
                .ok_or(PersistenceError::NotSelfPersisting)?
                .save()
                .await?
        } else {
            self.adapter.save(&mut record).await?
        };
        info!(controller = %self.name, %key, "record saved");

        Ok(SaveOutcome::Saved {
            key,
            redirect: self.redirect_index(),
        })
    }

    /// Removes a record without checking that it exists.
    pub async fn delete(&self, key: Option<&RecordKey>) -> Result<Redirect, CrudError> {
        let key = key.ok_or(PersistenceError::MissingKey)?;
        if self.options.active_record_strategy {
            let mut record = self.factory.new_record();
            record.set_key(key);
            record
                .as_self_persisting()
                .ok_or(PersistenceError::NotSelfPersisting)?
                .delete()
                .await?;
        } else {
            self.adapter.delete(key).await?;
        }
        info!(controller = %self.name, %key, "record deleted");
        Ok(self.redirect_index())
    }

    /// Redirects to the index carrying the page number from the route key.
    pub fn page(&self, key: Option<&RecordKey>) -> Redirect {
        let page = key
            .and_then(|key| key.as_str().parse::<u32>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1);
        self.redirect_index()
            .param(self.options.page_arg.as_str(), page.to_string())
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
