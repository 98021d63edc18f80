//! Capability interfaces for the three upstream lookups, and the adapters
//! that implement them against real providers.
//!
//! The pipeline only ever sees the traits in this module. Which provider sits
//! behind each one is decided when the pipeline is built.

mod gateway;
mod http;
mod places;
mod sonar;
mod whitepages;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::record::{Coordinates, PostalAddress};
use crate::retry::Outcome;

pub use self::gateway::ServiceGateway;
pub use self::http::{classify_status, classify_transport, create_http_client};
pub use self::places::{PlaceMatch, PlacesClient, DEFAULT_PLACES_BASE_URL, SEARCH_RADIUS_METERS};
pub use self::sonar::{
    clean_answer, parse_owner_answer, parse_trade_name_answer, SonarClient,
    DEFAULT_OPENROUTER_BASE_URL, DEFAULT_SONAR_MODEL,
};
pub use self::whitepages::{WhitepagesClient, DEFAULT_WHITEPAGES_BASE_URL};

/// A person returned by identity enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub address: PostalAddress,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

/// Resolves a business's trade name.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Name of the business found at the given coordinates.
    async fn by_location(&self, coordinates: Coordinates) -> Outcome<String>;

    /// Name inferred from the legal name and locality.
    async fn by_description(&self, legal_name: &str, city: &str, state: &str) -> Outcome<String>;
}

/// Finds the owner of a business by its trade name.
#[async_trait]
pub trait OwnerDiscovery: Send + Sync {
    async fn find_owner(&self, trade_name: &str, city: &str, state: &str) -> Outcome<String>;
}

/// Looks up personal contact details for a named person.
#[async_trait]
pub trait IdentityEnrichment: Send + Sync {
    async fn lookup(&self, owner_name: &str, city: &str, state: &str) -> Outcome<Vec<PersonRecord>>;
}

/// Name resolution backed by a nearby-places search for coordinates and a
/// search-grounded language model for descriptions.
pub struct SearchNameResolver {
    places: PlacesClient,
    sonar: Arc<SonarClient>,
}

impl SearchNameResolver {
    pub fn new(places: PlacesClient, sonar: Arc<SonarClient>) -> Self {
        SearchNameResolver { places, sonar }
    }
}

#[async_trait]
impl NameResolver for SearchNameResolver {
    async fn by_location(&self, coordinates: Coordinates) -> Outcome<String> {
        self.places
            .find_restaurant(coordinates)
            .await
            .map(|place| place.name)
    }

    async fn by_description(&self, legal_name: &str, city: &str, state: &str) -> Outcome<String> {
        self.sonar.resolve_trade_name(legal_name, city, state).await
    }
}
