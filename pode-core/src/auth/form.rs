//! Form-based auth: credentials posted as `application/x-www-form-urlencoded`
//! fields, typically from a login page rather than a header.

use crate::http::{Body, HttpRequest};

use super::{Challenge, Credentials, Scheme};

pub struct FormScheme {
    pub username_field: String,
    pub password_field: String,
}

impl FormScheme {
    pub fn new(username_field: impl Into<String>, password_field: impl Into<String>) -> Self {
        Self {
            username_field: username_field.into(),
            password_field: password_field.into(),
        }
    }
}

impl Default for FormScheme {
    fn default() -> Self {
        Self::new("username", "password")
    }
}

impl Scheme for FormScheme {
    fn name(&self) -> &str {
        "Form"
    }

    fn extract(&self, request: &HttpRequest) -> std::result::Result<Credentials, Challenge> {
        let Body::Form(fields) = &request.decoded_body else {
            return Err(Challenge::bad_request());
        };
        let username = fields.get(&self.username_field).cloned().ok_or_else(Challenge::bad_request)?;
        let password = fields.get(&self.password_field).cloned().ok_or_else(Challenge::bad_request)?;
        Ok(Credentials::Form { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;
    use std::collections::HashMap;

    #[test]
    fn extracts_username_and_password_from_form_body() {
        let mut fields = HashMap::new();
        fields.insert("username".to_string(), "alice".to_string());
        fields.insert("password".to_string(), "secret".to_string());

        let request = HttpRequest {
            method: Method::Post,
            raw_method: "POST".into(),
            path: "/login".into(),
            query: HashMap::new(),
            version_minor: 1,
            headers: Vec::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            decoded_body: Body::Form(fields),
            keep_alive: true,
            is_upgrade: false,
        };

        match FormScheme::default().extract(&request).unwrap() {
            Credentials::Form { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "secret");
            }
            _ => panic!("expected form credentials"),
        }
    }
}
