//! Whitepages Pro person search, used for an owner's personal contact details.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::gateway::ServiceGateway;
use super::http::fetch_json;
use super::{IdentityEnrichment, PersonRecord};
use crate::record::PostalAddress;
use crate::retry::{Outcome, ServiceFault};
use crate::TARGET_WEB_REQUEST;

pub const DEFAULT_WHITEPAGES_BASE_URL: &str = "https://proapi.whitepages.com/";

const PERSON_PATH: &str = "2.2/person.json";
const OPERATION: &str = "whitepages_person";

#[derive(Debug, Deserialize)]
struct PersonSearchResponse {
    #[serde(default)]
    results: Vec<WirePerson>,
}

#[derive(Debug, Deserialize)]
struct WirePerson {
    #[serde(default)]
    name: serde_json::Value,
    #[serde(default)]
    locations: Vec<WireLocation>,
    #[serde(default)]
    phones: Vec<WirePhone>,
    #[serde(default)]
    emails: Vec<WireEmail>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    #[serde(default)]
    standard_address_line1: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state_code: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhone {
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEmail {
    #[serde(default)]
    email_address: Option<String>,
}

impl WirePerson {
    fn into_person(self, queried_name: &str) -> PersonRecord {
        let name = self
            .name
            .as_str()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(queried_name)
            .to_string();

        let address = self
            .locations
            .into_iter()
            .next()
            .map(|location| PostalAddress {
                street: location.standard_address_line1.unwrap_or_default(),
                city: location.city.unwrap_or_default(),
                state: location.state_code.unwrap_or_default(),
                zip: location.postal_code.unwrap_or_default(),
            })
            .unwrap_or_default();

        PersonRecord {
            name,
            address,
            phones: self
                .phones
                .into_iter()
                .filter_map(|phone| non_blank(phone.phone_number))
                .collect(),
            emails: self
                .emails
                .into_iter()
                .filter_map(|email| non_blank(email.email_address))
                .collect(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct WhitepagesClient {
    http: reqwest::Client,
    gateway: ServiceGateway,
    endpoint: Url,
    api_key: Option<String>,
}

impl WhitepagesClient {
    pub fn new(http: reqwest::Client, gateway: ServiceGateway, api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(http, gateway, api_key, DEFAULT_WHITEPAGES_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        gateway: ServiceGateway,
        api_key: Option<String>,
        base_url: &str,
    ) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join(PERSON_PATH))
            .with_context(|| format!("Invalid Whitepages base URL: {}", base_url))?;

        Ok(WhitepagesClient {
            http,
            gateway,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Every person the service lists under `name` near `city`, `state`.
    pub async fn lookup_person(&self, name: &str, city: &str, state: &str) -> Outcome<Vec<PersonRecord>> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!(target: TARGET_WEB_REQUEST, "No Whitepages API key, skipping identity lookup");
            return Outcome::Absent;
        };

        let name = name.trim();
        let city = city.trim();
        let state = state.trim().to_uppercase();
        if name.is_empty() || city.is_empty() || state.is_empty() {
            debug!(target: TARGET_WEB_REQUEST, "Skipping identity lookup with missing name, city or state");
            return Outcome::Absent;
        }

        let name_key = name.to_lowercase();
        let city_key = city.to_lowercase();
        let state_code: String = state.chars().take(2).collect();
        let limit = self.gateway.policy().call_timeout;

        let outcome = self
            .gateway
            .call(OPERATION, &[name_key.as_str(), city_key.as_str(), state.as_str()], || {
                let request = self.http.get(self.endpoint.clone()).query(&[
                    ("api_key", api_key),
                    ("name", name),
                    ("city", city),
                    ("state_code", state_code.as_str()),
                ]);
                async move {
                    let response: PersonSearchResponse = fetch_json(request, limit).await?;
                    let persons: Vec<PersonRecord> = response
                        .results
                        .into_iter()
                        .map(|person| person.into_person(name))
                        .collect();
                    Ok::<_, ServiceFault>((!persons.is_empty()).then_some(persons))
                }
            })
            .await;

        if let Outcome::Found(persons) = &outcome {
            info!(target: TARGET_WEB_REQUEST, "Whitepages returned {} record(s) for {}", persons.len(), name);
        }
        outcome
    }
}

#[async_trait]
impl IdentityEnrichment for WhitepagesClient {
    async fn lookup(&self, owner_name: &str, city: &str, state: &str) -> Outcome<Vec<PersonRecord>> {
        self.lookup_person(owner_name, city, state).await
    }
}
