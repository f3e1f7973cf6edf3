const CONTROLLER_SUFFIX: &str = "Controller";

/// Derives the logical resource name of a controller from its type name:
/// every `Controller` token is removed, the last path segment is kept and
/// lowercased. `app::web::WidgetController` becomes `widget`.
pub fn resolve_name(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or_default();
    let stripped = without_generics.replace(CONTROLLER_SUFFIX, "");
    stripped
        .split("::")
        .flat_map(|segment| segment.split('\\'))
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or_default()
        .to_lowercase()
}

pub fn controller_name<T: ?Sized>() -> String {
    resolve_name(std::any::type_name::<T>())
}
