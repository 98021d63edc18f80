//! Counting fakes for the resolution services.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::record::{Coordinates, PostalAddress};
use crate::retry::Outcome;
use crate::services::{IdentityEnrichment, NameResolver, OwnerDiscovery, PersonRecord};

pub fn found(value: &str) -> Outcome<String> {
    Outcome::Found(value.to_string())
}

pub fn person(name: &str, street: &str, city: &str, state: &str, phone: &str, email: &str) -> PersonRecord {
    PersonRecord {
        name: name.to_string(),
        address: PostalAddress {
            street: street.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            zip: "29401".to_string(),
        },
        phones: [phone].iter().filter(|p| !p.is_empty()).map(|p| p.to_string()).collect(),
        emails: [email].iter().filter(|e| !e.is_empty()).map(|e| e.to_string()).collect(),
    }
}

pub struct FakeNames {
    location: Outcome<String>,
    description: Outcome<String>,
    pub location_calls: AtomicUsize,
    pub description_calls: AtomicUsize,
}

impl FakeNames {
    pub fn new(location: Outcome<String>, description: Outcome<String>) -> Self {
        FakeNames {
            location,
            description,
            location_calls: AtomicUsize::new(0),
            description_calls: AtomicUsize::new(0),
        }
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }

    pub fn description_calls(&self) -> usize {
        self.description_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for FakeNames {
    async fn by_location(&self, _coordinates: Coordinates) -> Outcome<String> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        self.location.clone()
    }

    async fn by_description(&self, _legal_name: &str, _city: &str, _state: &str) -> Outcome<String> {
        self.description_calls.fetch_add(1, Ordering::SeqCst);
        self.description.clone()
    }
}

pub struct FakeOwners {
    answer: Outcome<String>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeOwners {
    pub fn new(answer: Outcome<String>) -> Self {
        FakeOwners {
            answer,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Trade names this fake was asked about, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OwnerDiscovery for FakeOwners {
    async fn find_owner(&self, trade_name: &str, _city: &str, _state: &str) -> Outcome<String> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(trade_name.to_string());
        }
        self.answer.clone()
    }
}

pub struct FakeIdentities {
    answer: Outcome<Vec<PersonRecord>>,
    pub calls: AtomicUsize,
}

impl FakeIdentities {
    pub fn new(answer: Outcome<Vec<PersonRecord>>) -> Self {
        FakeIdentities {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityEnrichment for FakeIdentities {
    async fn lookup(&self, _owner_name: &str, _city: &str, _state: &str) -> Outcome<Vec<PersonRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
