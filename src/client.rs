//! Marathon REST client
//!
//! [`MarathonApi`] is the seam the lifecycle controller talks through;
//! [`MarathonClient`] implements it over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::models::{AppDefinition, AppEnvelope, AppInfo, Deployment, DeploymentRef};
use crate::{Error, Result};

/// The four Marathon calls a spawner needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarathonApi: Send + Sync {
    /// `POST /v2/apps`. A refusal surfaces as [`Error::SubmissionRejected`].
    async fn create_app(&self, app: &AppDefinition) -> Result<AppInfo>;

    /// `GET /v2/apps/{id}`. An unknown app surfaces as [`Error::NotFound`].
    async fn get_app(&self, app_id: &str, embed_tasks: bool) -> Result<AppInfo>;

    /// `DELETE /v2/apps/{id}`. An unknown app surfaces as [`Error::NotFound`].
    async fn delete_app(&self, app_id: &str) -> Result<DeploymentRef>;

    /// `GET /v2/deployments`
    async fn list_deployments(&self) -> Result<Vec<Deployment>>;
}

pub struct MarathonClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarathonClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn app_url(&self, app_id: &str) -> String {
        format!("{}/v2/apps/{}", self.base_url, app_id.trim_start_matches('/'))
    }
}

#[async_trait]
impl MarathonApi for MarathonClient {
    async fn create_app(&self, app: &AppDefinition) -> Result<AppInfo> {
        tracing::debug!(app = %app.id, "POST /v2/apps");
        let resp = self
            .http
            .post(format!("{}/v2/apps", self.base_url))
            .json(app)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::SubmissionRejected {
                app_id: app.id.clone(),
                reason: format!("{}: {}", status, body),
            });
        }
        Ok(resp.json().await?)
    }

    async fn get_app(&self, app_id: &str, embed_tasks: bool) -> Result<AppInfo> {
        let mut req = self.http.get(self.app_url(app_id));
        if embed_tasks {
            req = req.query(&[("embed", "app.tasks")]);
        }
        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(app_id.to_string()));
        }
        let envelope: AppEnvelope = check(resp).await?.json().await?;
        Ok(envelope.app)
    }

    async fn delete_app(&self, app_id: &str) -> Result<DeploymentRef> {
        tracing::debug!(app = %app_id, "DELETE /v2/apps");
        let resp = self.http.delete(self.app_url(app_id)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(app_id.to_string())),
            s if s.is_success() => Ok(resp.json().await?),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::SubmissionRejected {
                    app_id: app_id.to_string(),
                    reason: format!("{}: {}", status, body),
                })
            }
        }
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let resp = self
            .http
            .get(format!("{}/v2/deployments", self.base_url))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}
