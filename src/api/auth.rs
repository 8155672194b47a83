//! Request authentication
//!
//! Callers send `Authorization: Bearer <token>`. An [`AuthResolver`] turns
//! the token into an [`Identity`]; handlers then check it against the roles
//! allowed for the route.

use std::collections::HashMap;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::models::{Course, Role, User, UserId};
use crate::storage::Store;

use super::server::AppState;

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// `None` only for the development identity used when auth is disabled
    pub user_id: Option<UserId>,
    pub role: Role,
}

impl Identity {
    /// Identity used when authentication is disabled
    pub fn development() -> Self {
        Self {
            user_id: None,
            role: Role::Admin,
        }
    }

    /// Fail with Forbidden unless the caller has one of `roles`
    pub fn require(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::forbidden(format!("role {} may not perform this action", self.role)))
        }
    }

    pub fn is(&self, user: UserId) -> bool {
        self.user_id == Some(user)
    }

    /// The caller's own user id; the development identity has none
    pub fn own_id(&self) -> Result<UserId> {
        self.user_id
            .ok_or_else(|| Error::validation("a user id is required for this identity"))
    }

    /// Instructors may only act on courses they teach
    pub fn require_teaches(&self, course: &Course) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Instructor if self.user_id.is_some_and(|id| course.instructors.contains(&id)) => {
                Ok(())
            }
            _ => Err(Error::forbidden(format!("not an instructor of course {}", course.code))),
        }
    }
}

/// Maps a bearer token to an identity
pub trait AuthResolver: Send + Sync {
    /// `token` is `None` when the request has no bearer token
    fn resolve(&self, token: Option<&str>) -> Result<Identity>;
}

/// Static token table from configuration; roles are read from the store
pub struct StaticTokenResolver {
    enabled: bool,
    tokens: HashMap<String, UserId>,
    store: Store,
}

impl StaticTokenResolver {
    pub fn new(config: &AuthConfig, store: Store) -> Result<Self> {
        let tokens = config
            .tokens
            .iter()
            .map(|(token, user)| {
                user.parse::<UserId>()
                    .map(|id| (token.clone(), id))
                    .map_err(|e| Error::config(format!("auth token maps to {e}")))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            enabled: config.enabled,
            tokens,
            store,
        })
    }
}

impl AuthResolver for StaticTokenResolver {
    fn resolve(&self, token: Option<&str>) -> Result<Identity> {
        if !self.enabled {
            return Ok(Identity::development());
        }

        let token = token.ok_or_else(|| Error::unauthorized("missing bearer token"))?;
        let user_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or_else(|| Error::unauthorized("unknown token"))?;
        let user: User = self
            .store
            .get(user_id)?
            .ok_or_else(|| Error::unauthorized("token user no longer exists"))?;

        Ok(Identity {
            user_id: Some(user.id),
            role: user.role,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        state.auth.resolve(bearer_token(parts))
    }
}
