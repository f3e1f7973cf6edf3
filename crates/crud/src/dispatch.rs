use std::collections::BTreeMap;

use async_trait::async_trait;
use shared::{
    domain::{Action, FieldMap, RecordKey},
    protocol::{Redirect, ViewModel},
};
use tracing::debug;

use crate::{
    controller::{CrudController, CrudError, RequestMethod, Submission},
    i18n::Translator,
    record::Record,
    session::SessionContext,
};

/// Builds outbound URLs from a route name and its parameters.
pub trait UrlBuilder: Send + Sync {
    fn url(&self, route: &str, params: &BTreeMap<String, String>) -> String;
}

/// A routed request, already split into action, key and payload.
#[derive(Debug, Clone)]
pub struct CrudRequest {
    pub action: Action,
    pub key: Option<RecordKey>,
    pub page: Option<u32>,
    pub method: RequestMethod,
    pub posted: FieldMap,
}

impl CrudRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            key: None,
            page: None,
            method: RequestMethod::Get,
            posted: FieldMap::new(),
        }
    }

    pub fn key(mut self, key: Option<RecordKey>) -> Self {
        self.key = key;
        self
    }

    pub fn page(mut self, page: Option<u32>) -> Self {
        self.page = page;
        self
    }

    pub fn post(mut self, posted: FieldMap) -> Self {
        self.method = RequestMethod::Post;
        self.posted = posted;
        self
    }
}

/// Collaborators scoped to a single request.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub session: SessionContext<'a>,
    pub translator: &'a dyn Translator,
    pub urls: &'a dyn UrlBuilder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    View(ViewModel),
    Redirect(Redirect),
}

/// Object-safe entry point so controllers of different record types can sit
/// in one registry.
#[async_trait]
pub trait Dispatch: Send + Sync {
    fn name(&self) -> &str;

    async fn dispatch(
        &self,
        request: CrudRequest,
        ctx: RequestContext<'_>,
    ) -> Result<Outcome, CrudError>;
}

#[async_trait]
impl<R: Record> Dispatch for CrudController<R> {
    fn name(&self) -> &str {
        CrudController::name(self)
    }

    async fn dispatch(
        &self,
        request: CrudRequest,
        ctx: RequestContext<'_>,
    ) -> Result<Outcome, CrudError> {
        debug!(
            controller = %CrudController::name(self),
            action = request.action.as_str(),
            key = ?request.key,
            "dispatching"
        );
        let key = request.key.as_ref();
        let outcome = match request.action {
            Action::Index => Outcome::View(self.index(request.page, ctx.urls).await?),
            Action::Edit => Outcome::View(self.edit(key, ctx.session, ctx.translator).await?),
            Action::Save => {
                let submission = Submission {
                    method: request.method,
                    data: request.posted.clone(),
                };
                let saved = self.save(submission, ctx.session, ctx.translator).await?;
                Outcome::Redirect(saved.into_redirect())
            }
            Action::Delete => Outcome::Redirect(self.delete(key).await?),
            Action::Page => Outcome::Redirect(self.page(key)),
        };
        Ok(outcome)
    }
}
