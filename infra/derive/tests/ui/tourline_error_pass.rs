use std::borrow::Cow;
use tourline_derive::tourline_error;

#[tourline_error]
#[derive(Clone)]
pub enum DemoError {
    #[error("Tour not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

mod io {
    use std::borrow::Cow;

    #[tourline_derive::tourline_error]
    pub enum IoBackedError {
        #[error("IO error{}: {source}", format_context(.context))]
        Io {
            #[source]
            source: std::io::Error,
            context: Option<Cow<'static, str>>,
        },
    }
}

fn missing() -> Result<(), DemoError> {
    Err(DemoError::NotFound { message: "welcome-tour".into(), context: None })
}

fn main() {
    let err = missing().context("Loading onboarding").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    assert_eq!(err.to_string(), "Tour not found (Loading onboarding): welcome-tour");

    let cloned = err.clone();
    assert_eq!(cloned.kind(), err.kind());

    let internal: DemoError = "boom".into();
    assert_eq!(internal.kind(), "Internal");

    let io: io::IoBackedError = std::io::Error::other("disk").into();
    assert_eq!(io.kind(), "Io");
}
