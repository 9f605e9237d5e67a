use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use tracing::debug;

/// One shared password for every staff client, whatever the user name.
#[derive(Debug)]
pub struct BaycheckAuthSource {
    password: String,
}

impl BaycheckAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for BaycheckAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        debug!(user = ?login.user(), "password requested");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
