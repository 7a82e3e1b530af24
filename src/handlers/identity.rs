use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

/// The caller's identity, taken from headers set by the fronting proxy.
/// The proxy terminates authentication; these headers are trusted as-is.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)?
            .ok_or_else(|| ServiceError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = Uuid::parse_str(user_id).map_err(|_| {
            ServiceError::Unauthorized(format!("{USER_ID_HEADER} is not a valid UUID"))
        })?;

        let email = header_str(parts, USER_EMAIL_HEADER)?.unwrap_or_default().to_string();
        let name = header_str(parts, USER_NAME_HEADER)?.unwrap_or_default().to_string();

        Ok(Identity {
            user_id,
            email,
            name,
        })
    }
}

/// An [`Identity`] whose proxy-asserted role is `admin`. Administrative
/// routes (fulfilment transitions) extract this instead of the plain
/// identity.
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let role = header_str(parts, USER_ROLE_HEADER)?
            .unwrap_or_default()
            .to_string();
        let identity = Identity::from_request_parts(parts, state).await?;
        if !role.eq_ignore_ascii_case(ADMIN_ROLE) {
            return Err(ServiceError::Forbidden(
                "administrator role required".into(),
            ));
        }
        Ok(AdminIdentity(identity))
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ServiceError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ServiceError::Unauthorized(format!("{name} header is not valid UTF-8"))),
    }
}
