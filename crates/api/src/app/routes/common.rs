use std::str::FromStr;

use miam_auth::{CommandAuthorization, Permission};
use miam_core::DomainError;

use crate::app::errors::{ApiError, ApiResult};
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: impl IntoIterator<Item = Permission>) -> Self {
        Self { inner, required: required.into_iter().collect() }
    }

    /// Unwrap the command once the caller holds every required permission.
    pub fn authorize(self, principal: &PrincipalContext) -> ApiResult<C> {
        authorize_command(principal, &self)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path segment into a typed id; malformed ids are a 400.
pub fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError::from)
}
