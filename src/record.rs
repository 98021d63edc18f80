//! Business records, their candidate contacts, and the enrichment result section.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Input rows carry at most `name1..name10`.
pub const MAX_CANDIDATE_CONTACTS: usize = 10;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite and within -90..90 / -180..180.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Coordinates {
            latitude,
            longitude,
        })
    }
}

/// A person listed against the business in the input data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateContact {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    // 1-based column rank (`name1` => 1)
    pub rank: usize,
}

impl CandidateContact {
    pub fn new(name: &str, rank: usize) -> Self {
        CandidateContact {
            name: name.to_string(),
            phone: None,
            email: None,
            rank,
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = non_empty(phone);
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = non_empty(email);
        self
    }

    pub fn has_phone(&self) -> bool {
        self.phone.is_some()
    }
}

/// Street address, used both for businesses and for enriched owners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl PostalAddress {
    /// True when city and state match the query, ignoring case and surrounding whitespace.
    pub fn is_in(&self, city: &str, state: &str) -> bool {
        self.city.trim().eq_ignore_ascii_case(city.trim())
            && self.state.trim().to_uppercase() == state.trim().to_uppercase()
    }

    /// `"street, city, state zip"`, or empty when there is no street line.
    pub fn one_line(&self) -> String {
        if self.street.trim().is_empty() {
            return String::new();
        }
        format!("{}, {}, {} {}", self.street, self.city, self.state, self.zip)
            .trim()
            .to_string()
    }
}

/// Where the trade name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    DbaMarker,
    Location,
    Description,
    LegalName,
}

/// Which upstream origin produced the final contact fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    LocalContact,
    Enrichment,
    OwnerDiscovery,
}

impl fmt::Display for ContactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactSource::LocalContact => write!(f, "local_contact"),
            ContactSource::Enrichment => write!(f, "enrichment"),
            ContactSource::OwnerDiscovery => write!(f, "owner_discovery"),
        }
    }
}

/// The single contact chosen by the merge stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenContact {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Mutable result section filled in by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub trade_name: Option<String>,
    pub name_source: Option<NameSource>,
    pub owner_name: Option<String>,
    pub contact: Option<ChosenContact>,
    pub contact_source: Option<ContactSource>,
    pub owner_address: Option<PostalAddress>,
}

/// Ways a record can be unfit to enter the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record has no legal name")]
    MissingLegalName,

    #[error("record carries {count} candidate contacts, at most 10 are allowed")]
    TooManyContacts { count: usize },

    #[error("candidate contact at rank {rank} has no name")]
    UnnamedContact { rank: usize },
}

/// One business as read from the input, plus its enrichment result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub fein: String,
    pub legal_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: PostalAddress,
    pub phone: String,
    pub email: String,
    pub county: String,
    pub expdate: String,
    pub website: String,
    pub contacts: Vec<CandidateContact>,
    pub result: EnrichmentResult,
}

impl BusinessRecord {
    pub fn new(legal_name: &str, city: &str, state: &str) -> Self {
        BusinessRecord {
            legal_name: legal_name.to_string(),
            address: PostalAddress {
                city: city.to_string(),
                state: state.to_string(),
                ..PostalAddress::default()
            },
            ..BusinessRecord::default()
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_contact(mut self, contact: CandidateContact) -> Self {
        self.contacts.push(contact);
        self
    }

    pub fn city(&self) -> &str {
        &self.address.city
    }

    pub fn state(&self) -> &str {
        &self.address.state
    }

    /// Coordinates usable for a location lookup, if both are present and in range.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude),
            _ => None,
        }
    }

    /// Contract checks applied before a record enters the pipeline.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.legal_name.trim().is_empty() {
            return Err(RecordError::MissingLegalName);
        }
        if self.contacts.len() > MAX_CANDIDATE_CONTACTS {
            return Err(RecordError::TooManyContacts {
                count: self.contacts.len(),
            });
        }
        if let Some(contact) = self.contacts.iter().find(|c| c.name.trim().is_empty()) {
            return Err(RecordError::UnnamedContact { rank: contact.rank });
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
