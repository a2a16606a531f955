use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        tracing::debug!("validation failed: {}", err);
        invalid_input_error()
    }
}

impl Error {
    /// Errors in the 1..=99 range are plumbing failures the user cannot act on.
    pub fn is_internal(&self) -> bool {
        (1..=99).contains(&self.code)
    }

    pub fn is_invalid_state_error(&self) -> bool {
        self.code == 100
    }

    pub fn is_invalid_input_error(&self) -> bool {
        self.code == 101
    }

    pub fn is_location_unavailable_error(&self) -> bool {
        self.code == 102
    }

    pub fn is_routing_failed_error(&self) -> bool {
        self.code == 103
    }

    pub fn is_duplicate_entity_error(&self) -> bool {
        self.code == 104
    }

    pub fn is_not_found_error(&self) -> bool {
        self.code == 105
    }
}

pub fn invalid_state_error() -> Error {
    Error {
        code: 100,
        message: "invalid state".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 101,
        message: "invalid input".into(),
    }
}

pub fn location_unavailable_error() -> Error {
    Error {
        code: 102,
        message: "could not get location".into(),
    }
}

pub fn routing_failed_error() -> Error {
    Error {
        code: 103,
        message: "could not compute route".into(),
    }
}

pub fn duplicate_entity_error(entity: &str) -> Error {
    Error {
        code: 104,
        message: format!("{} already exists", entity),
    }
}

pub fn not_found_error(entity: &str) -> Error {
    Error {
        code: 105,
        message: format!("{} not found", entity),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    tracing::warn!("http request failed: {}", err);

    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

pub fn unexpected_error<T: Debug>(err: T) -> Error {
    tracing::error!("unexpected error: {:?}", err);

    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

#[test]
fn error_codes_test() {
    assert!(invalid_state_error().is_invalid_state_error());
    assert!(invalid_input_error().is_invalid_input_error());
    assert!(location_unavailable_error().is_location_unavailable_error());
    assert!(routing_failed_error().is_routing_failed_error());
    assert!(duplicate_entity_error("marker").is_duplicate_entity_error());
    assert!(not_found_error("marker").is_not_found_error());

    assert!(upstream_error().is_internal());
    assert!(!duplicate_entity_error("ride").is_internal());
}

#[test]
fn error_display_test() {
    let err = duplicate_entity_error("ride");

    assert_eq!(err.message, "ride already exists");
    assert_eq!(err.to_string(), "ride already exists (code 104)");
}
