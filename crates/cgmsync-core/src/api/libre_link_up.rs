//! Client for the LibreLinkUp follower cloud API.
//!
//! Login exchanges email/password for a bearer token (`authTicket`). Accounts
//! outside the default region get a redirect answer naming their region, and
//! the login is repeated once against the regional host.

use chrono::{TimeZone, Utc};
use futures::future::try_join_all;
use reqwest::{header, RequestBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::models::libre_link_up::{
    connection_readings, graph_readings, Connection, Envelope, GraphData, LoginData,
    STATUS_BAD_CREDENTIALS, STATUS_OK,
};
use crate::models::GlucoseReading;

use super::{ApiClient, AuthError, FetchError};

/// Default (US) API host
pub const DEFAULT_BASE_URL: &str = "https://api.libreview.io";

/// Regional host template, `{region}` is replaced by the region code
pub const REGION_URL_TEMPLATE: &str = "https://api-{region}.libreview.io";

/// App identity the API expects
const PRODUCT: &str = "llu.ios";
const VERSION: &str = "4.12.0";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Clone, Debug)]
pub struct LibreLinkUpClient {
    api: ApiClient,
    base_url: String,
    region_template: String,
    include_graph: bool,
}

impl LibreLinkUpClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            base_url: DEFAULT_BASE_URL.to_string(),
            region_template: REGION_URL_TEMPLATE.to_string(),
            include_graph: true,
        }
    }

    /// Override the default host (and the regional template, which then
    /// points at the same host).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.region_template = base_url.clone();
        self.base_url = base_url;
        self
    }

    pub fn with_region_template(mut self, template: impl Into<String>) -> Self {
        self.region_template = template.into();
        self
    }

    /// Also fetch the 12-hour graph for each connection
    pub fn with_graph(mut self, include_graph: bool) -> Self {
        self.include_graph = include_graph;
        self
    }

    fn base_for(&self, region: Option<&str>) -> String {
        match region {
            Some(region) if !region.is_empty() => self.region_template.replace("{region}", region),
            _ => self.base_url.clone(),
        }
    }

    fn with_app_headers(request: RequestBuilder) -> RequestBuilder {
        request
            .header("product", PRODUCT)
            .header("version", VERSION)
            .header(header::CACHE_CONTROL, "no-cache")
    }

    fn authorized(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        let request = Self::with_app_headers(request).bearer_auth(&session.token);
        match session.account_id_hash() {
            Some(hash) => request.header("account-id", hash),
            None => request,
        }
    }

    /// Exchange email/password for a session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        region: Option<&str>,
    ) -> Result<Session, AuthError> {
        let mut region = region.map(str::to_string);
        let mut redirected = false;

        loop {
            let url = format!("{}/llu/auth/login", self.base_for(region.as_deref()));
            debug!(url = %url, "Sending LibreLinkUp login");

            let request = self
                .api
                .http()
                .post(&url)
                .json(&LoginRequest { email, password });
            let response = Self::with_app_headers(request).send().await?;

            let status = response.status();
            if status.as_u16() == 401 {
                return Err(AuthError::InvalidCredentials);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %FetchError::truncate_body(&body), "Login request failed");
                return Err(AuthError::NetworkFailure(format!("HTTP status {}", status.as_u16())));
            }

            let text = response.text().await?;
            let envelope: Envelope<LoginData> = serde_json::from_str(&text)
                .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

            match envelope.status {
                STATUS_OK => {}
                STATUS_BAD_CREDENTIALS => return Err(AuthError::InvalidCredentials),
                other => {
                    let message = envelope.error.and_then(|e| e.message).unwrap_or_default();
                    warn!(status = other, message = %message, "Login rejected");
                    return Err(AuthError::Rejected { status: other });
                }
            }

            let data = envelope
                .data
                .ok_or_else(|| AuthError::MalformedResponse("missing data".to_string()))?;

            if data.redirect {
                let target = data.region.filter(|r| !r.is_empty()).ok_or_else(|| {
                    AuthError::MalformedResponse("redirect without region".to_string())
                })?;
                if redirected {
                    return Err(AuthError::MalformedResponse(format!(
                        "repeated region redirect to {}",
                        target
                    )));
                }
                info!(region = %target, "LibreLinkUp login redirected to regional API");
                redirected = true;
                region = Some(target);
                continue;
            }

            let ticket = data
                .auth_ticket
                .ok_or_else(|| AuthError::MalformedResponse("missing authTicket".to_string()))?;
            if ticket.token.is_empty() {
                return Err(AuthError::MalformedResponse("empty token".to_string()));
            }
            let expires_at = Utc
                .timestamp_opt(ticket.expires, 0)
                .single()
                .ok_or_else(|| {
                    AuthError::MalformedResponse(format!("invalid expiry {}", ticket.expires))
                })?;

            info!(expires_at = %expires_at, "LibreLinkUp login successful");
            return Ok(Session::new(ticket.token, expires_at, email)
                .with_account_id(data.user.map(|u| u.id))
                .with_region(region));
        }
    }

    fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, FetchError> {
        if envelope.status != STATUS_OK {
            let message = envelope.error.and_then(|e| e.message).unwrap_or_default();
            return Err(FetchError::Decode(format!(
                "status {} {}",
                envelope.status, message
            )));
        }
        envelope
            .data
            .ok_or_else(|| FetchError::Decode("missing data".to_string()))
    }

    /// Fetch the followed connections, each with its latest measurement.
    pub async fn fetch_connections(&self, session: &Session) -> Result<Vec<Connection>, FetchError> {
        let url = format!("{}/llu/connections", self.base_for(session.region.as_deref()));
        let request = self.authorized(self.api.http().get(&url), session);
        let envelope: Envelope<Vec<Connection>> = ApiClient::send_json(request).await?;
        Self::unwrap_envelope(envelope)
    }

    /// Fetch the last 12 hours of readings for one patient.
    pub async fn fetch_graph(
        &self,
        session: &Session,
        patient_id: &str,
    ) -> Result<GraphData, FetchError> {
        let url = format!(
            "{}/llu/connections/{}/graph",
            self.base_for(session.region.as_deref()),
            patient_id
        );
        let request = self.authorized(self.api.http().get(&url), session);
        let envelope: Envelope<GraphData> = ApiClient::send_json(request).await?;
        Self::unwrap_envelope(envelope)
    }

    /// Latest readings of every connection, plus their graphs when enabled.
    ///
    /// A decode failure anywhere fails the whole batch.
    pub async fn fetch_readings(&self, session: &Session) -> Result<Vec<GlucoseReading>, FetchError> {
        let connections = self.fetch_connections(session).await?;
        let mut readings = connection_readings(&connections).map_err(FetchError::Decode)?;

        if self.include_graph && !connections.is_empty() {
            let graphs = try_join_all(
                connections
                    .iter()
                    .map(|c| self.fetch_graph(session, &c.patient_id)),
            )
            .await?;
            for (connection, graph) in connections.iter().zip(graphs.iter()) {
                let source = connection.source();
                debug!(patient = %connection.patient_name(), points = graph.graph_data.len(), "Graph fetched");
                readings.extend(graph_readings(graph, &source).map_err(FetchError::Decode)?);
            }
        }

        info!(
            connections = connections.len(),
            count = readings.len(),
            "Fetched LibreLinkUp readings"
        );
        Ok(readings)
    }
}
