use std::net::IpAddr;

use axum::{
    extract::{Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};

use super::{AdminCaller, AppState};
use crate::models::analytics::{ListLimit, NewVisit, VisitLog};
use crate::services::analytics::AnalyticsRequest;
use crate::services::{call, ServiceError};

const SERVICE: &str = "Analytics";

/// First hop of `x-forwarded-for`, falling back to `x-real-ip`. Anything
/// that does not parse as an address counts as absent.
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|ip| ip.trim().parse().ok()))
}

pub async fn record_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(visit): Json<NewVisit>,
) -> Result<(StatusCode, Json<VisitLog>), ServiceError> {
    let ip = client_ip(&headers);
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let log = call(&state.channels.analytics, SERVICE, |response| {
        AnalyticsRequest::RecordVisit {
            visit,
            ip,
            user_agent,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn list_visits(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(query): Query<ListLimit>,
) -> Result<Json<Vec<VisitLog>>, ServiceError> {
    let logs = call(&state.channels.analytics, SERVICE, |response| {
        AnalyticsRequest::ListVisits {
            limit: query.limit,
            response,
        }
    })
    .await?;

    Ok(Json(logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(value: &str) -> Option<IpAddr> {
        Some(value.parse().unwrap())
    }

    #[test]
    fn prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
        assert_eq!(client_ip(&headers), ip("198.51.100.1"));

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), ip("203.0.113.7"));

        headers.insert("x-forwarded-for", " 2001:db8::1 ".parse().unwrap());
        assert_eq!(client_ip(&headers), ip("2001:db8::1"));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn non_address_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "../../admin?x=1, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
        assert_eq!(client_ip(&headers), ip("198.51.100.1"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "unknown".parse().unwrap());
        assert_eq!(client_ip(&headers), None);
    }
}
