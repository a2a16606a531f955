use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Error;

/// Account payload as the backend stores it. The username is the e-mail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Registration {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub password_confirm: String,
}

impl Registration {
    pub fn into_account(self) -> Result<Account, Error> {
        self.validate()?;

        Ok(Account {
            username: self.email.clone(),
            email: self.email,
            password: self.password_confirm,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct PasswordRetrieval {
    #[validate(email)]
    pub email: String,
}

#[test]
fn registration_test() {
    let registration = Registration {
        email: "rider@example.com".into(),
        password: "correct horse".into(),
        password_confirm: "correct horse".into(),
    };

    let account = registration.into_account().unwrap();
    assert_eq!(account.username, "rider@example.com");
    assert_eq!(account.password, "correct horse");
}

#[test]
fn registration_rejects_mismatch_test() {
    let registration = Registration {
        email: "rider@example.com".into(),
        password: "correct horse".into(),
        password_confirm: "battery staple".into(),
    };

    let err = registration.into_account().unwrap_err();
    assert!(err.is_invalid_input_error());
}

#[test]
fn credentials_test() {
    let short = Credentials {
        email: "rider@example.com".into(),
        password: "short".into(),
    };
    assert!(short.validate().is_err());

    let bad_email = PasswordRetrieval {
        email: "not-an-email".into(),
    };
    assert!(bad_email.validate().is_err());

    let ok = Credentials {
        email: "rider@example.com".into(),
        password: "long enough".into(),
    };
    assert!(ok.validate().is_ok());
}
