use std::fmt;

/// Credentials sent with every request to the CI server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Personal access token, sent as a bearer token
    Token(Token),
    /// Username and password, sent as HTTP basic auth
    Basic { username: String, password: String },
}

impl Credentials {
    /// Picks the credentials to use from the configured values.
    ///
    /// A token wins over a username/password pair. A username without a
    /// password is sent with an empty password.
    pub fn resolve(
        token: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Option<Self> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            return Some(Self::Token(Token::from(token)));
        }

        username.filter(|u| !u.is_empty()).map(|username| Self::Basic {
            username: username.to_string(),
            password: password.unwrap_or_default().to_string(),
        })
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Token(token) => request.bearer_auth(token.as_str()),
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credentials::Token(***)"),
            Self::Basic { username, .. } => write!(f, "Credentials::Basic({username}, ***)"),
        }
    }
}

/// An access token that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wins_over_basic_auth() {
        let credentials = Credentials::resolve(Some("abc"), Some("admin"), Some("secret"));
        assert_eq!(credentials, Some(Credentials::Token(Token::from("abc"))));
    }

    #[test]
    fn test_basic_auth_without_password() {
        let credentials = Credentials::resolve(None, Some("admin"), None);
        assert_eq!(
            credentials,
            Some(Credentials::Basic {
                username: "admin".to_string(),
                password: String::new(),
            })
        );
    }

    #[test]
    fn test_empty_values_mean_anonymous() {
        assert_eq!(Credentials::resolve(Some(""), Some(""), None), None);
        assert_eq!(Credentials::resolve(None, None, None), None);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let token = format!("{:?}", Credentials::Token(Token::from("very-secret")));
        assert!(!token.contains("very-secret"));

        let basic = format!(
            "{:?}",
            Credentials::Basic {
                username: "admin".to_string(),
                password: "hunter2".to_string(),
            }
        );
        assert!(basic.contains("admin"));
        assert!(!basic.contains("hunter2"));
    }
}
