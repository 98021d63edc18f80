//! Per-record resolution: trade name, owner, contact, merge.
//!
//! Stages run in a fixed order and each may come back empty. An upstream
//! failure is logged and then handled exactly like an empty answer, so a run
//! always produces a record.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::matching::IdentityMatcher;
use crate::record::{BusinessRecord, CandidateContact, ChosenContact, ContactSource, NameSource};
use crate::retry::Outcome;
use crate::services::{IdentityEnrichment, NameResolver, OwnerDiscovery, PersonRecord};
use crate::TARGET_PIPELINE;

lazy_static! {
    static ref DBA_MARKER: Regex = Regex::new(r"(?i)\bDBA\s+(.+)$").unwrap();
}

/// Trade name carried in a legal name after a "DBA" marker.
pub fn extract_dba(legal_name: &str) -> Option<String> {
    let captures = DBA_MARKER.captures(legal_name)?;
    let name = captures.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Picks one contact for a discovered owner.
///
/// A matched local contact with a phone wins, then the enrichment person, then
/// the owner name on its own.
pub fn merge(
    owner_name: &str,
    business_email: &str,
    matched: Option<&CandidateContact>,
    enrichment: Option<&PersonRecord>,
) -> (ChosenContact, ContactSource) {
    if let Some(contact) = matched.filter(|c| c.has_phone()) {
        let email = contact.email.clone().or_else(|| {
            let business_email = business_email.trim();
            (!business_email.is_empty()
                && business_email
                    .to_lowercase()
                    .contains(&contact.name.trim().to_lowercase()))
            .then(|| business_email.to_string())
        });
        return (
            ChosenContact {
                name: owner_name.to_string(),
                phone: contact.phone.clone(),
                email,
            },
            ContactSource::LocalContact,
        );
    }

    if let Some(person) = enrichment {
        return (
            ChosenContact {
                name: owner_name.to_string(),
                phone: person.phones.first().cloned(),
                email: person.emails.first().cloned(),
            },
            ContactSource::Enrichment,
        );
    }

    (
        ChosenContact {
            name: owner_name.to_string(),
            phone: None,
            email: None,
        },
        ContactSource::OwnerDiscovery,
    )
}

/// Logs a failed stage and folds it into absence.
fn settle<T>(stage: &str, legal_name: &str, outcome: Outcome<T>) -> Option<T> {
    match outcome {
        Outcome::Found(value) => Some(value),
        Outcome::Absent => {
            debug!(target: TARGET_PIPELINE, "{}: nothing found for '{}'", stage, legal_name);
            None
        }
        Outcome::Failed(fault) => {
            warn!(target: TARGET_PIPELINE, "{} failed for '{}', continuing without it: {}", stage, legal_name, fault);
            None
        }
    }
}

pub struct RecordPipeline {
    names: Arc<dyn NameResolver>,
    owners: Arc<dyn OwnerDiscovery>,
    identities: Arc<dyn IdentityEnrichment>,
    matcher: IdentityMatcher,
}

impl RecordPipeline {
    pub fn new(
        names: Arc<dyn NameResolver>,
        owners: Arc<dyn OwnerDiscovery>,
        identities: Arc<dyn IdentityEnrichment>,
    ) -> Self {
        RecordPipeline {
            names,
            owners,
            identities,
            matcher: IdentityMatcher::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: IdentityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Runs every stage for one record and returns it with its result filled in.
    pub async fn run(&self, mut record: BusinessRecord) -> BusinessRecord {
        let city = record.city().trim().to_string();
        let state = record.state().trim().to_string();

        let (trade_name, name_source) = match extract_dba(&record.legal_name) {
            Some(name) => (name, NameSource::DbaMarker),
            None => self.resolve_name(&record, &city, &state).await,
        };
        debug!(target: TARGET_PIPELINE, "'{}' trades as '{}' ({:?})", record.legal_name, trade_name, name_source);
        record.result.trade_name = Some(trade_name.clone());
        record.result.name_source = Some(name_source);

        let owner = settle(
            "Owner discovery",
            &record.legal_name,
            self.owners.find_owner(&trade_name, &city, &state).await,
        );
        let Some(owner_name) = owner else {
            info!(target: TARGET_PIPELINE, "No owner found for '{}'", trade_name);
            return record;
        };
        record.result.owner_name = Some(owner_name.clone());

        let matched = if record.contacts.is_empty() {
            None
        } else {
            self.matcher
                .best_match(&owner_name, &record.contacts)
                .map(|found| {
                    debug!(target: TARGET_PIPELINE, "'{}' matched contact '{}' (rank {}, score {})", owner_name, found.contact.name, found.contact.rank, found.score);
                    found.contact.clone()
                })
        };

        let enrichment = settle(
            "Identity enrichment",
            &record.legal_name,
            self.identities.lookup(&owner_name, &city, &state).await,
        )
        .and_then(|persons| {
            persons
                .into_iter()
                .find(|person| person.address.is_in(&city, &state))
        });

        let (contact, source) = merge(
            &owner_name,
            &record.email,
            matched.as_ref(),
            enrichment.as_ref(),
        );
        info!(target: TARGET_PIPELINE, "'{}': owner '{}' via {}", trade_name, owner_name, source);

        record.result.contact = Some(contact);
        record.result.contact_source = Some(source);
        record.result.owner_address = enrichment.map(|person| person.address);
        record
    }

    async fn resolve_name(&self, record: &BusinessRecord, city: &str, state: &str) -> (String, NameSource) {
        if let Some(coordinates) = record.coordinates() {
            let by_location = settle(
                "Location lookup",
                &record.legal_name,
                self.names.by_location(coordinates).await,
            );
            if let Some(name) = by_location {
                return (name, NameSource::Location);
            }
        }

        let by_description = settle(
            "Description lookup",
            &record.legal_name,
            self.names
                .by_description(&record.legal_name, city, state)
                .await,
        );
        match by_description {
            Some(name) => (name, NameSource::Description),
            None => (record.legal_name.clone(), NameSource::LegalName),
        }
    }
}
