//! CSV ingestion of business records.
//!
//! Column names are matched case-insensitively. Cells are trimmed and a
//! literal `nan` left over from spreadsheet exports counts as empty.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::record::{BusinessRecord, CandidateContact, PostalAddress, MAX_CANDIDATE_CONTACTS};
use crate::TARGET_PIPELINE;

struct Columns {
    positions: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.trim().to_lowercase(), i))
            .collect();
        Columns { positions }
    }

    fn cell(&self, row: &csv::StringRecord, column: &str) -> String {
        self.positions
            .get(column)
            .and_then(|&i| row.get(i))
            .map(clean_cell)
            .unwrap_or_default()
    }
}

fn clean_cell(value: &str) -> String {
    let value = value.trim();
    if value.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        value.to_string()
    }
}

/// Drops the `.0` a float round-trip leaves on an identifier.
pub fn clean_fein(value: &str) -> String {
    let value = clean_cell(value);
    match value.strip_suffix(".0") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => value,
    }
}

fn parse_coordinate(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn to_record(columns: &Columns, row: &csv::StringRecord) -> BusinessRecord {
    let contacts = (1..=MAX_CANDIDATE_CONTACTS)
        .filter_map(|rank| {
            let name = columns.cell(row, &format!("name{}", rank));
            if name.is_empty() {
                return None;
            }
            let phone = columns.cell(row, &format!("phone{}", rank));
            Some(CandidateContact::new(&name, rank).with_phone(&phone))
        })
        .collect();

    BusinessRecord {
        fein: clean_fein(&columns.cell(row, "fein")),
        legal_name: columns.cell(row, "name"),
        latitude: parse_coordinate(&columns.cell(row, "lat")),
        longitude: parse_coordinate(&columns.cell(row, "long")),
        address: PostalAddress {
            street: columns.cell(row, "address"),
            city: columns.cell(row, "city"),
            state: columns.cell(row, "state"),
            zip: columns.cell(row, "zip"),
        },
        phone: columns.cell(row, "phone"),
        email: columns.cell(row, "email1"),
        county: columns.cell(row, "county"),
        expdate: columns.cell(row, "expdate"),
        website: columns.cell(row, "website"),
        contacts,
        result: Default::default(),
    }
}

/// Parse every non-empty row of a headed CSV document.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<BusinessRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let columns = Columns::new(&headers);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read CSV row {}", index + 1))?;
        if row.iter().all(|cell| clean_cell(cell).is_empty()) {
            debug!(target: TARGET_PIPELINE, "Skipping empty row {}", index + 1);
            continue;
        }
        records.push(to_record(&columns, &row));
    }

    Ok(records)
}

pub fn read_records_from_path(path: &Path) -> Result<Vec<BusinessRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let records = read_records(file).with_context(|| format!("Failed to parse {}", path.display()))?;
    info!(target: TARGET_PIPELINE, "Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
