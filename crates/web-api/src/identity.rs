//! 从请求中取出已认证身份
//!
//! 上游认证层可以直接把 `Identity` 放进请求扩展；否则读取
//! `X-User-Id` / `X-User-Name` 请求头。

use application::ApplicationError;
use axum::{extract::FromRequestParts, http::request::Parts};
use domain::Identity;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// 请求方身份，缺失或无效时以 400 拒绝
#[derive(Debug, Clone)]
pub struct ChatIdentity(pub Identity);

impl<S> FromRequestParts<S> for ChatIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Self(identity.clone()));
        }

        let user_id = header(parts, USER_ID_HEADER)?
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiError::bad_request("X-User-Id must be an integer"))?;
        let display_name = header(parts, USER_NAME_HEADER)?;

        Identity::new(user_id, display_name)
            .map(Self)
            .map_err(|err| ApiError::from(ApplicationError::from(err)))
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::bad_request(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ApiError::bad_request(format!("{} header is not valid text", name)))
}
