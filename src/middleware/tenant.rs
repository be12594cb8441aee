//! Tenant and actor extraction from request headers.

use crate::error::AppError;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Tenant the request acts on and the optional acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl TenantContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let raw = header_str(headers, TENANT_HEADER)
            .ok_or_else(|| AppError::BadRequest("X-Tenant-Id header is required".to_string()))?;
        let tenant_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::BadRequest(format!("Invalid X-Tenant-Id: {raw}")))?;

        let user_id = match header_str(headers, USER_HEADER) {
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::BadRequest(format!("Invalid X-User-Id: {raw}")))?,
            ),
            None => None,
        };

        Ok(Self { tenant_id, user_id })
    }
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Client IP from `X-Forwarded-For` (first hop) or `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        return forwarded
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    header_str(headers, "x-real-ip").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_tenant_and_user() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let ctx = TenantContext::from_headers(&headers(&[
            (TENANT_HEADER, &tenant.to_string()),
            (USER_HEADER, &user.to_string()),
        ]))
        .unwrap();
        assert_eq!(ctx.tenant_id, tenant);
        assert_eq!(ctx.user_id, Some(user));
    }

    #[test]
    fn test_missing_tenant_is_bad_request() {
        let err = TenantContext::from_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_invalid_ids_are_bad_request() {
        let err = TenantContext::from_headers(&headers(&[(TENANT_HEADER, "acme")])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = TenantContext::from_headers(&headers(&[
            (TENANT_HEADER, &Uuid::new_v4().to_string()),
            (USER_HEADER, "bob"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_client_ip() {
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")])),
            Some("203.0.113.7".to_string())
        );
        assert_eq!(
            client_ip(&headers(&[("x-real-ip", "198.51.100.2")])),
            Some("198.51.100.2".to_string())
        );
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
