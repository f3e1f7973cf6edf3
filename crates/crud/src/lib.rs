//! Generic create/read/update/delete workflow.
//!
//! A [`CrudController`] binds route parameters to a [`PersistenceAdapter`],
//! renders paginated list views, re-populates forms after a failed submit via
//! the session, and redirects after save and delete. Resource specifics are
//! injected through [`RecordFactory`], [`FormProvider`] and [`TitleProvider`].

pub mod adapter;
pub mod controller;
pub mod dispatch;
pub mod filter;
pub mod form;
pub mod i18n;
pub mod memory;
pub mod naming;
pub mod record;
pub mod session;

pub use adapter::{PersistenceAdapter, Query};
pub use controller::{
    ControllerOptions, CrudController, CrudError, EditForm, FormProvider, MissingRecordPolicy,
    RequestMethod, SaveOutcome, Submission, TitleProvider,
};
pub use dispatch::{CrudRequest, Dispatch, Outcome, RequestContext, UrlBuilder};
pub use filter::{FilterKind, InputFilter, InputSpec, ValidatorRule};
pub use form::{ElementKind, FormBinding, FormElement, FormSpec, FormView};
pub use i18n::{CatalogSet, MessageCatalog, Translator};
pub use memory::MemoryAdapter;
pub use naming::{controller_name, resolve_name};
pub use record::{Record, RecordFactory, SelfPersisting};
pub use session::{MemorySessionStore, SessionContext, SessionId, SessionStore};
