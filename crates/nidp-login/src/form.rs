//! Submittable forms and the credential filler.

use crate::transport::{HttpMethod, HttpRequest};
use std::collections::BTreeMap;
use std::fmt;

/// Username input on the IdP login form.
pub const USERNAME_FIELD: &str = "Ecom_User_ID";
/// Password input on the IdP login form.
pub const PASSWORD_FIELD: &str = "Ecom_Password";
/// One-time token input on the RSA form.
pub const TOKEN_FIELD: &str = "nffc";

/// A form ready to be submitted back to the IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittableForm {
    /// Where the form posts to. Never empty.
    pub url: String,
    /// Upper-cased HTTP method.
    pub method: String,
    /// Field name to value; starts as the page's hidden inputs.
    pub fields: BTreeMap<String, String>,
}

/// Secrets supplied by the user for one login attempt.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Account name for the password form.
    pub username: Option<String>,
    /// Password for the password form.
    pub password: Option<String>,
    /// RSA passcode for the first token page.
    pub one_time_code: Option<String>,
}

impl Secrets {
    /// Username and password, no one-time code yet.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            one_time_code: None,
        }
    }

    /// Attach a one-time code.
    pub fn with_one_time_code(mut self, code: impl Into<String>) -> Self {
        self.one_time_code = Some(code.into());
        self
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<redacted>"
            } else {
                "<none>"
            }
        }
        f.debug_struct("Secrets")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("one_time_code", &redact(&self.one_time_code))
            .finish()
    }
}

/// Input names the filler writes each secret to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    pub username: String,
    pub password: String,
    pub one_time_code: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            username: USERNAME_FIELD.to_string(),
            password: PASSWORD_FIELD.to_string(),
            one_time_code: TOKEN_FIELD.to_string(),
        }
    }
}

impl SubmittableForm {
    /// Fill secrets into the default NetIQ field names.
    pub fn fill(self, secrets: &Secrets) -> Self {
        self.fill_with(secrets, &FieldNames::default())
    }

    /// Add or overwrite one field per supplied secret.
    ///
    /// Absent secrets and unknown fields are left as they are.
    pub fn fill_with(mut self, secrets: &Secrets, names: &FieldNames) -> Self {
        let pairs = [
            (&names.username, &secrets.username),
            (&names.password, &secrets.password),
            (&names.one_time_code, &secrets.one_time_code),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                self.fields.insert(name.clone(), value.clone());
            }
        }
        self
    }

    /// Turn the form into the next request of the flow.
    ///
    /// `GET` forms carry their fields in the query string; everything else
    /// sends them url-encoded in the body.
    pub fn into_request(self) -> HttpRequest {
        let method = HttpMethod::from_form_method(&self.method);
        let form: Vec<(String, String)> = self.fields.into_iter().collect();
        match method {
            HttpMethod::Get => HttpRequest::get(append_query(&self.url, &form)),
            other => HttpRequest {
                method: other,
                url: self.url,
                form,
            },
        }
    }
}

fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{encoded}")
        }
    }
}
