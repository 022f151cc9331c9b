use std::borrow::Cow;

/// A specialized [`TourError`] enum of this crate.
///
/// `Clone` so a single fetch outcome can be handed to every request waiting on it.
#[tourline_derive::tourline_error]
#[derive(Clone)]
pub enum TourError {
    /// The id has no entry in the resolver table.
    #[error("Tour not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The payload failed schema checks or its id differs from the requested one.
    #[error("Tour validation failed{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The resolver rejected.
    #[error("Tour fetch failed{}: {message}", format_context(.context))]
    Fetch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unknown tour category{}: {message}", format_context(.context))]
    UnknownCategory { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unknown bundle{}: {message}", format_context(.context))]
    UnknownBundle { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for invariant violations.
    #[error("Internal tour pipeline error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl TourError {
    pub(crate) fn not_found(id: &str) -> Self {
        Self::NotFound { message: id.to_owned().into(), context: None }
    }

    pub(crate) fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }
}
