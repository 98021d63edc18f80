//! Flattening enriched records into output rows, and batch totals.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::batch::BatchReport;
use crate::record::{BusinessRecord, PostalAddress};
use crate::TARGET_PIPELINE;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    #[serde(rename = "FEIN")]
    pub fein: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "OwnerName")]
    pub owner_name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Zip")]
    pub zip: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "County")]
    pub county: String,
    #[serde(rename = "Expdate")]
    pub expdate: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "LLC_Name")]
    pub llc_name: String,
    #[serde(rename = "ContactSource")]
    pub contact_source: String,
}

impl OutputRow {
    /// The owner's home address is preferred over the business address, and
    /// the chosen contact's phone and email over the business's own.
    pub fn from_record(record: &BusinessRecord) -> Self {
        let result = &record.result;
        let address: &PostalAddress = result
            .owner_address
            .as_ref()
            .filter(|address| !address.street.trim().is_empty())
            .unwrap_or(&record.address);

        let contact = result.contact.as_ref();
        let phone = contact
            .and_then(|c| c.phone.clone())
            .unwrap_or_else(|| record.phone.clone());
        let email = contact
            .and_then(|c| c.email.clone())
            .unwrap_or_else(|| record.email.clone());

        OutputRow {
            fein: record.fein.clone(),
            name: result
                .trade_name
                .clone()
                .unwrap_or_else(|| record.legal_name.clone()),
            owner_name: result.owner_name.clone().unwrap_or_default(),
            address: address.one_line(),
            city: address.city.clone(),
            state: address.state.clone(),
            zip: address.zip.clone(),
            phone,
            email,
            county: record.county.clone(),
            expdate: record.expdate.clone(),
            website: record.website.clone(),
            llc_name: record.legal_name.clone(),
            contact_source: result
                .contact_source
                .map(|source| source.to_string())
                .unwrap_or_default(),
        }
    }
}

pub fn write_rows<W: Write>(writer: W, rows: &[OutputRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row).context("Failed to write output row")?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(())
}

pub fn write_rows_to_path(path: &Path, rows: &[OutputRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_rows(file, rows)?;
    info!(target: TARGET_PIPELINE, "Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Counts shown at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub with_owner: usize,
    pub with_phone: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_report(report: &BatchReport) -> Self {
        let with_owner = report
            .records
            .iter()
            .filter(|r| r.result.owner_name.is_some())
            .count();
        let with_phone = report
            .records
            .iter()
            .filter(|r| {
                r.result
                    .contact
                    .as_ref()
                    .map_or(false, |c| c.phone.is_some())
            })
            .count();

        BatchSummary {
            processed: report.records.len(),
            with_owner,
            with_phone,
            failed: report.failures.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RecordFailure;
    use crate::record::{ChosenContact, ContactSource, EnrichmentResult};

    fn fig() -> BusinessRecord {
        let mut record = BusinessRecord::new("BUMPER CROP LLC", "Charleston", "SC");
        record.fein = "123456789".to_string();
        record.address.street = "232 Meeting St".to_string();
        record.address.zip = "29401".to_string();
        record.phone = "843-555-0000".to_string();
        record.email = "info@fig.com".to_string();
        record
    }

    #[test]
    fn test_unenriched_record_uses_business_details() {
        let row = OutputRow::from_record(&fig());
        assert_eq!(row.name, "BUMPER CROP LLC");
        assert_eq!(row.owner_name, "");
        assert_eq!(row.address, "232 Meeting St, Charleston, SC 29401");
        assert_eq!(row.phone, "843-555-0000");
        assert_eq!(row.email, "info@fig.com");
        assert_eq!(row.contact_source, "");
    }

    #[test]
    fn test_owner_details_take_precedence() {
        let mut record = fig();
        record.result = EnrichmentResult {
            trade_name: Some("FIG".to_string()),
            owner_name: Some("Mike Lata".to_string()),
            contact: Some(ChosenContact {
                name: "Mike Lata".to_string(),
                phone: Some("843-555-0100".to_string()),
                email: None,
            }),
            contact_source: Some(ContactSource::Enrichment),
            owner_address: Some(PostalAddress {
                street: "12 Tradd St".to_string(),
                city: "Charleston".to_string(),
                state: "SC".to_string(),
                zip: "29401".to_string(),
            }),
            ..EnrichmentResult::default()
        };

        let row = OutputRow::from_record(&record);
        assert_eq!(row.name, "FIG");
        assert_eq!(row.llc_name, "BUMPER CROP LLC");
        assert_eq!(row.owner_name, "Mike Lata");
        assert_eq!(row.address, "12 Tradd St, Charleston, SC 29401");
        assert_eq!(row.phone, "843-555-0100");
        assert_eq!(row.email, "info@fig.com");
        assert_eq!(row.contact_source, "enrichment");
    }

    #[test]
    fn test_csv_header_and_row() {
        let mut buffer = Vec::new();
        write_rows(&mut buffer, &[OutputRow::from_record(&fig())]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("FEIN,Name,OwnerName,Address,City,State,Zip,Phone,Email,County,Expdate,Website,LLC_Name,ContactSource")
        );
        assert_eq!(
            lines.next(),
            Some("123456789,BUMPER CROP LLC,,\"232 Meeting St, Charleston, SC 29401\",Charleston,SC,29401,843-555-0000,info@fig.com,,,,BUMPER CROP LLC,")
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut with_phone = fig();
        with_phone.result.owner_name = Some("Mike Lata".to_string());
        with_phone.result.contact = Some(ChosenContact {
            name: "Mike Lata".to_string(),
            phone: Some("843-555-0100".to_string()),
            email: None,
        });
        let mut owner_only = fig();
        owner_only.result.owner_name = Some("Sean Brock".to_string());

        let report = BatchReport {
            records: vec![with_phone, owner_only, fig()],
            failures: vec![RecordFailure {
                index: 3,
                legal_name: String::new(),
                error: "record has no legal name".to_string(),
            }],
        };

        assert_eq!(
            BatchSummary::from_report(&report),
            BatchSummary {
                processed: 3,
                with_owner: 2,
                with_phone: 1,
                failed: 1,
            }
        );
    }
}
