use async_trait::async_trait;
use sqlx::SqlitePool;

use super::feed::ChangeFeed;
use super::{Reply, RequestHandler, Service, ServiceError};
use crate::models::content::{
    ContactRequest, ContactStatus, NewContactRequest, NewsArticle, NewsInput, SiteSettings,
    SiteSettingsPatch, SiteUpdate, SiteUpdateInput,
};
use crate::models::feed::{ChangeKind, Collection};
use crate::repositories::contacts::ContactRepository;
use crate::repositories::news::NewsRepository;
use crate::repositories::site::SiteRepository;

pub enum ContentRequest {
    ListNews {
        published_only: bool,
        response: Reply<Vec<NewsArticle>>,
    },
    CreateNews {
        article: NewsInput,
        response: Reply<NewsArticle>,
    },
    UpdateNews {
        id: String,
        article: NewsInput,
        response: Reply<NewsArticle>,
    },
    DeleteNews {
        id: String,
        response: Reply<()>,
    },
    ListSiteUpdates {
        response: Reply<Vec<SiteUpdate>>,
    },
    CreateSiteUpdate {
        update: SiteUpdateInput,
        response: Reply<SiteUpdate>,
    },
    UpdateSiteUpdate {
        id: String,
        update: SiteUpdateInput,
        response: Reply<SiteUpdate>,
    },
    DeleteSiteUpdate {
        id: String,
        response: Reply<()>,
    },
    GetSettings {
        response: Reply<SiteSettings>,
    },
    UpdateSettings {
        patch: SiteSettingsPatch,
        response: Reply<SiteSettings>,
    },
    CreateContact {
        request: NewContactRequest,
        response: Reply<ContactRequest>,
    },
    ListContacts {
        status: Option<ContactStatus>,
        response: Reply<Vec<ContactRequest>>,
    },
    ReplyContact {
        id: String,
        reply: String,
        response: Reply<ContactRequest>,
    },
    DeleteContact {
        id: String,
        response: Reply<()>,
    },
    DeleteClosedContacts {
        response: Reply<usize>,
    },
}

#[derive(Clone)]
pub struct ContentRequestHandler {
    news: NewsRepository,
    site: SiteRepository,
    contacts: ContactRepository,
    feed: ChangeFeed,
}

fn repository_error(name: &str) -> impl FnOnce(anyhow::Error) -> ServiceError + '_ {
    move |e| ServiceError::Repository(name.to_string(), e.to_string())
}

fn required(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

impl ContentRequestHandler {
    pub fn new(sql_conn: SqlitePool, feed: ChangeFeed) -> Self {
        Self {
            news: NewsRepository::new(sql_conn.clone()),
            site: SiteRepository::new(sql_conn.clone()),
            contacts: ContactRepository::new(sql_conn),
            feed,
        }
    }

    pub async fn list_news(&self, published_only: bool) -> Result<Vec<NewsArticle>, ServiceError> {
        self.news
            .list_articles(published_only)
            .await
            .map_err(repository_error("News"))
    }

    pub async fn create_news(&self, article: &NewsInput) -> Result<NewsArticle, ServiceError> {
        required("title", &article.title)?;
        required("body", &article.body)?;

        let article = self
            .news
            .insert_article(article)
            .await
            .map_err(repository_error("News"))?;

        self.feed.publish(Collection::News, &article.id, ChangeKind::Created);
        Ok(article)
    }

    pub async fn update_news(&self, id: &str, article: &NewsInput) -> Result<NewsArticle, ServiceError> {
        required("title", &article.title)?;
        required("body", &article.body)?;

        let article = self
            .news
            .update_article(id, article)
            .await
            .map_err(repository_error("News"))?
            .ok_or_else(|| ServiceError::NotFound(format!("article {}", id)))?;

        self.feed.publish(Collection::News, &article.id, ChangeKind::Updated);
        Ok(article)
    }

    pub async fn delete_news(&self, id: &str) -> Result<(), ServiceError> {
        if !self.news.delete_article(id).await.map_err(repository_error("News"))? {
            return Err(ServiceError::NotFound(format!("article {}", id)));
        }

        self.feed.publish(Collection::News, id, ChangeKind::Deleted);
        Ok(())
    }

    pub async fn list_site_updates(&self) -> Result<Vec<SiteUpdate>, ServiceError> {
        self.site
            .list_updates()
            .await
            .map_err(repository_error("Site"))
    }

    pub async fn create_site_update(
        &self,
        update: &SiteUpdateInput,
    ) -> Result<SiteUpdate, ServiceError> {
        required("title", &update.title)?;

        let update = self
            .site
            .insert_update(update)
            .await
            .map_err(repository_error("Site"))?;

        self.feed
            .publish(Collection::SiteUpdates, &update.id, ChangeKind::Created);
        Ok(update)
    }

    pub async fn update_site_update(
        &self,
        id: &str,
        update: &SiteUpdateInput,
    ) -> Result<SiteUpdate, ServiceError> {
        required("title", &update.title)?;

        let update = self
            .site
            .update_update(id, update)
            .await
            .map_err(repository_error("Site"))?
            .ok_or_else(|| ServiceError::NotFound(format!("site update {}", id)))?;

        self.feed
            .publish(Collection::SiteUpdates, &update.id, ChangeKind::Updated);
        Ok(update)
    }

    pub async fn delete_site_update(&self, id: &str) -> Result<(), ServiceError> {
        if !self.site.delete_update(id).await.map_err(repository_error("Site"))? {
            return Err(ServiceError::NotFound(format!("site update {}", id)));
        }

        self.feed.publish(Collection::SiteUpdates, id, ChangeKind::Deleted);
        Ok(())
    }

    pub async fn get_settings(&self) -> Result<SiteSettings, ServiceError> {
        self.site
            .get_settings()
            .await
            .map_err(repository_error("Site"))
    }

    pub async fn update_settings(
        &self,
        patch: &SiteSettingsPatch,
    ) -> Result<SiteSettings, ServiceError> {
        if patch.keys().any(|key| key.trim().is_empty()) {
            return Err(ServiceError::Validation("setting keys must not be blank".to_string()));
        }

        let settings = self
            .site
            .update_settings(patch)
            .await
            .map_err(repository_error("Site"))?;

        log::info!("Updated {} site settings", patch.len());
        for key in patch.keys() {
            self.feed
                .publish(Collection::SiteSettings, key, ChangeKind::Updated);
        }
        Ok(settings)
    }

    pub async fn create_contact(
        &self,
        request: &NewContactRequest,
    ) -> Result<ContactRequest, ServiceError> {
        required("name", &request.name)?;
        required("message", &request.message)?;
        if !request.email.contains('@') {
            return Err(ServiceError::Validation(format!(
                "invalid email: {}",
                request.email
            )));
        }

        let request = self
            .contacts
            .insert_request(request)
            .await
            .map_err(repository_error("Contacts"))?;

        self.feed
            .publish(Collection::ContactRequests, &request.id, ChangeKind::Created);
        Ok(request)
    }

    pub async fn list_contacts(
        &self,
        status: Option<ContactStatus>,
    ) -> Result<Vec<ContactRequest>, ServiceError> {
        self.contacts
            .list_requests(status)
            .await
            .map_err(repository_error("Contacts"))
    }

    pub async fn reply_contact(&self, id: &str, reply: &str) -> Result<ContactRequest, ServiceError> {
        required("reply", reply)?;

        let request = self
            .contacts
            .reply(id, reply.trim())
            .await
            .map_err(repository_error("Contacts"))?
            .ok_or_else(|| ServiceError::NotFound(format!("contact request {}", id)))?;

        self.feed
            .publish(Collection::ContactRequests, &request.id, ChangeKind::Updated);
        Ok(request)
    }

    pub async fn delete_contact(&self, id: &str) -> Result<(), ServiceError> {
        if !self
            .contacts
            .delete_request(id)
            .await
            .map_err(repository_error("Contacts"))?
        {
            return Err(ServiceError::NotFound(format!("contact request {}", id)));
        }

        self.feed
            .publish(Collection::ContactRequests, id, ChangeKind::Deleted);
        Ok(())
    }

    pub async fn delete_closed_contacts(&self) -> Result<usize, ServiceError> {
        let deleted = self
            .contacts
            .delete_closed()
            .await
            .map_err(repository_error("Contacts"))?;

        log::info!("Deleted {} closed contact requests", deleted.len());
        for id in &deleted {
            self.feed
                .publish(Collection::ContactRequests, id, ChangeKind::Deleted);
        }
        Ok(deleted.len())
    }
}

#[async_trait]
impl RequestHandler<ContentRequest> for ContentRequestHandler {
    async fn handle_request(&self, request: ContentRequest) {
        match request {
            ContentRequest::ListNews {
                published_only,
                response,
            } => {
                let _ = response.send(self.list_news(published_only).await);
            }
            ContentRequest::CreateNews { article, response } => {
                let _ = response.send(self.create_news(&article).await);
            }
            ContentRequest::UpdateNews {
                id,
                article,
                response,
            } => {
                let _ = response.send(self.update_news(&id, &article).await);
            }
            ContentRequest::DeleteNews { id, response } => {
                let _ = response.send(self.delete_news(&id).await);
            }
            ContentRequest::ListSiteUpdates { response } => {
                let _ = response.send(self.list_site_updates().await);
            }
            ContentRequest::CreateSiteUpdate { update, response } => {
                let _ = response.send(self.create_site_update(&update).await);
            }
            ContentRequest::UpdateSiteUpdate {
                id,
                update,
                response,
            } => {
                let _ = response.send(self.update_site_update(&id, &update).await);
            }
            ContentRequest::DeleteSiteUpdate { id, response } => {
                let _ = response.send(self.delete_site_update(&id).await);
            }
            ContentRequest::GetSettings { response } => {
                let _ = response.send(self.get_settings().await);
            }
            ContentRequest::UpdateSettings { patch, response } => {
                let _ = response.send(self.update_settings(&patch).await);
            }
            ContentRequest::CreateContact { request, response } => {
                let _ = response.send(self.create_contact(&request).await);
            }
            ContentRequest::ListContacts { status, response } => {
                let _ = response.send(self.list_contacts(status).await);
            }
            ContentRequest::ReplyContact {
                id,
                reply,
                response,
            } => {
                let _ = response.send(self.reply_contact(&id, &reply).await);
            }
            ContentRequest::DeleteContact { id, response } => {
                let _ = response.send(self.delete_contact(&id).await);
            }
            ContentRequest::DeleteClosedContacts { response } => {
                let _ = response.send(self.delete_closed_contacts().await);
            }
        }
    }
}

pub struct ContentService;

impl ContentService {
    pub fn new() -> Self {
        ContentService {}
    }
}

#[async_trait]
impl Service<ContentRequest, ContentRequestHandler> for ContentService {}
