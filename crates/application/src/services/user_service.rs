use std::sync::Arc;

use domain::{DisplayMode, IdentityStore, RepositoryError, UserEmail, UserRecord, Username};
use tracing::info;

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::{check_plaintext, PasswordHasher},
};

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub mode: Option<String>,
}

pub struct UserServiceDependencies {
    pub identities: Arc<dyn IdentityStore>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<UserRecord, ApplicationError> {
        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;
        check_plaintext(&request.password)?;
        let display_mode = match request.mode.as_deref() {
            Some(mode) if !mode.trim().is_empty() => mode.parse::<DisplayMode>()?,
            _ => DisplayMode::default(),
        };

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = UserRecord::register(
            username.clone(),
            email,
            password_hash,
            display_mode,
            self.deps.clock.now(),
        );

        let stored = self.deps.identities.create(user).await.map_err(|err| match err {
            RepositoryError::Conflict => ApplicationError::Domain(
                domain::DomainError::resource_already_exists("user", username.as_str()),
            ),
            other => ApplicationError::Repository(other),
        })?;
        info!(username = %stored.username, "user signed up");
        Ok(stored)
    }

    /// 用户名或密码错误统一返回 `Authentication`，不区分原因。
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, ApplicationError> {
        let username = Username::parse(username).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .identities
            .find_by_username(username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(user)
    }

    pub async fn display_mode(&self, username: &Username) -> Result<DisplayMode, ApplicationError> {
        Ok(self
            .deps
            .identities
            .find_by_username(username.clone())
            .await?
            .map(|user| user.display_mode)
            .unwrap_or_default())
    }
}
