use std::net::IpAddr;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::analytics::{NewVisit, VisitLog};
use crate::models::feed::{ChangeKind, Collection};
use crate::repositories::analytics::{AnalyticsRepository, VisitRecord};
use crate::repositories::geolocation::GeolocationRepository;

pub const DEFAULT_VISIT_LIMIT: i64 = 200;
const MAX_VISIT_LIMIT: i64 = 1000;

pub enum AnalyticsRequest {
    RecordVisit {
        visit: NewVisit,
        ip: Option<IpAddr>,
        user_agent: Option<String>,
        response: Reply<VisitLog>,
    },
    ListVisits {
        limit: Option<i64>,
        response: Reply<Vec<VisitLog>>,
    },
}

#[derive(Clone)]
pub struct AnalyticsRequestHandler {
    repository: AnalyticsRepository,
    geolocation: GeolocationRepository,
    feed: ChangeFeed,
}

/// Hex SHA-256 of the client address. The address itself is never stored.
pub fn hash_ip(ip: IpAddr) -> String {
    format!("{:x}", Sha256::digest(ip.to_string().as_bytes()))
}

impl AnalyticsRequestHandler {
    pub fn new(
        sql_conn: SqlitePool,
        geolocation: GeolocationRepository,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            repository: AnalyticsRepository::new(sql_conn),
            geolocation,
            feed,
        }
    }

    pub async fn record_visit(
        &self,
        visit: &NewVisit,
        ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Result<VisitLog, ServiceError> {
        let path = visit.path.trim();
        if path.is_empty() {
            return Err(ServiceError::Validation("path is required".to_string()));
        }

        let (country, city) = self.geolocation.locate(ip).await;
        let ip_hash = ip.map(hash_ip);

        let log = self
            .repository
            .insert_visit(&VisitRecord {
                path,
                user_id: visit.user_id.as_deref(),
                ip_hash: ip_hash.as_deref(),
                country: &country,
                city: &city,
                user_agent,
            })
            .await
            .map_err(|e| ServiceError::Repository("Analytics".to_string(), e.to_string()))?;

        log::debug!("Visit to {} from {}, {}", log.path, log.city, log.country);
        self.feed
            .publish(Collection::AnalyticsLogs, &log.id, ChangeKind::Created);
        Ok(log)
    }

    pub async fn list_visits(&self, limit: Option<i64>) -> Result<Vec<VisitLog>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_VISIT_LIMIT);
        if limit <= 0 || limit > MAX_VISIT_LIMIT {
            return Err(ServiceError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_VISIT_LIMIT
            )));
        }

        self.repository
            .list_visits(limit)
            .await
            .map_err(|e| ServiceError::Repository("Analytics".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<AnalyticsRequest> for AnalyticsRequestHandler {
    async fn handle_request(&self, request: AnalyticsRequest) {
        match request {
            AnalyticsRequest::RecordVisit {
                visit,
                ip,
                user_agent,
                response,
            } => {
                let log = self
                    .record_visit(&visit, ip, user_agent.as_deref())
                    .await;
                let _ = response.send(log);
            }
            AnalyticsRequest::ListVisits { limit, response } => {
                let logs = self.list_visits(limit).await;
                let _ = response.send(logs);
            }
        }
    }
}

pub struct AnalyticsService;

impl AnalyticsService {
    pub fn new() -> Self {
        AnalyticsService {}
    }
}

#[async_trait]
impl Service<AnalyticsRequest, AnalyticsRequestHandler> for AnalyticsService {}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database;
    use crate::repositories::geolocation::UNKNOWN;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn hashes_are_stable_hex() {
        assert_eq!(
            hash_ip(ip("203.0.113.7")),
            "fec52565aa0cf18f57d7cf5b3ac728503b8992d2d6f7d46da1d1201090902b02"
        );
        assert_eq!(
            hash_ip(ip("2001:db8::1")),
            "5afd19e856d1c18d17d600dfd2b5f534992333985e126c2a951047102c1ed536"
        );
        assert_ne!(hash_ip(ip("203.0.113.7")), hash_ip(ip("203.0.113.8")));
    }

    #[tokio::test]
    async fn failed_lookup_still_records_the_visit() {
        let geolocation =
            GeolocationRepository::new("http://127.0.0.1:9".to_string(), Duration::from_millis(200))
                .unwrap();
        let handler = AnalyticsRequestHandler::new(
            database::memory_pool().await,
            geolocation,
            ChangeFeed::new(8),
        );

        let log = handler
            .record_visit(
                &NewVisit {
                    path: "/vip".to_string(),
                    user_id: None,
                },
                Some(ip("203.0.113.7")),
                Some("curl/8.0"),
            )
            .await
            .unwrap();

        assert_eq!(log.country, UNKNOWN);
        assert_eq!(log.city, UNKNOWN);
        assert_eq!(log.ip_hash, Some(hash_ip(ip("203.0.113.7"))));
        assert_eq!(handler.list_visits(None).await.unwrap().len(), 1);
        assert!(matches!(
            handler.list_visits(Some(0)).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
