/// Active database and bearer credential of a client.
///
/// Only `login`, `logout` and `use_database` change it. A failed login
/// blocks every call but `login` and `logout` until one of them succeeds.
#[derive(Clone, Debug)]
pub struct Session {
    active_database: String,
    auth_token: Option<String>,
    login_failed: bool,
}

impl Session {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            active_database: database.into(),
            auth_token: None,
            login_failed: false,
        }
    }

    pub fn active_database(&self) -> &str {
        &self.active_database
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn login_failed(&self) -> bool {
        self.login_failed
    }

    pub(crate) fn set_token(&mut self, token: String) {
        self.auth_token = Some(token);
        self.login_failed = false;
    }

    pub(crate) fn fail_login(&mut self) {
        self.auth_token = None;
        self.login_failed = true;
    }

    pub(crate) fn reset(&mut self) {
        self.auth_token = None;
        self.login_failed = false;
    }

    pub(crate) fn switch_database(&mut self, database: impl Into<String>) {
        self.active_database = database.into();
    }
}
