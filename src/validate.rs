//! Precondition checks used when constructing guarded values.

use {
    crate::error::{Error, Result},
    log::debug,
};


/// Returns the contained value or a [`Error::MissingArgument`] naming `name`.
pub fn require_not_null<T>(value: Option<T>, name: &'static str) -> Result<T> {
    value.ok_or_else(|| {
        debug!("required argument `{name}` is absent");
        Error::MissingArgument { name }
    })
}

/// Returns [`Error::InvalidArgument`] if `items` is empty.
pub fn require_non_empty<T>(items: &[T], name: &'static str) -> Result<()> {
    if items.is_empty() {
        debug!("argument `{name}` is empty");
        return Err(Error::InvalidArgument {
            name,
            reason: "must contain at least one element".to_owned(),
        });
    }
    Ok(())
}
