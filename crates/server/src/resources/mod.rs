//! Sample resources served by the host.

use std::sync::Arc;

use crud::{ControllerOptions, CrudController, Dispatch, RecordFactory};
use shared::protocol::RenderMode;
use storage::{EntityManager, EntityRepository, Storage, TableGateway};

use crate::config::Settings;

pub mod note;
pub mod widget;

use note::{Note, NoteController};
use widget::{Widget, WidgetController};

pub fn controller_options(settings: &Settings) -> ControllerOptions {
    ControllerOptions {
        items_per_page: settings.items_per_page,
        render_mode: RenderMode::from_json_flag(settings.json_view),
        ..ControllerOptions::default()
    }
}

/// Widgets go through the entity repository; notes are listed through the
/// table gateway and persist themselves.
pub fn build_controllers(storage: &Storage, options: &ControllerOptions) -> Vec<Arc<dyn Dispatch>> {
    let widget_factory: Arc<dyn RecordFactory<Widget>> = Arc::new(Widget::default);
    let widgets = EntityRepository::new(
        Arc::new(EntityManager::new(storage.clone())),
        "widget",
        widget_factory.clone(),
    );
    let widget_controller: Arc<dyn Dispatch> = Arc::new(
        CrudController::for_provider(Arc::new(widgets), widget_factory, Arc::new(WidgetController))
            .with_options(options.clone()),
    );

    let note_storage = storage.clone();
    let note_factory: Arc<dyn RecordFactory<Note>> =
        Arc::new(move || Note::attached(note_storage.clone()));
    let notes = TableGateway::new(storage.clone(), note::RESOURCE, note_factory.clone());
    let note_controller: Arc<dyn Dispatch> = Arc::new(
        CrudController::for_provider(Arc::new(notes), note_factory, Arc::new(NoteController))
            .with_options(ControllerOptions {
                active_record_strategy: true,
                ..options.clone()
            }),
    );

    vec![widget_controller, note_controller]
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
