pub mod date;
pub mod money;

use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::record::{
    AssociationRow, MovieRow, NormalizedRecord, PendingAssociation, PendingMovie, PendingRecord,
};
use money::{Amount, Scale};

/// Quote characters that never reach storage.
const QUOTES: [char; 3] = ['"', '“', '”'];

/// Admit or reject a pending record, normalizing its dates and amounts.
pub fn normalize_record(record: PendingRecord) -> Result<NormalizedRecord, NormalizeError> {
    match record {
        PendingRecord::Movie(m) => normalize_movie(m).map(NormalizedRecord::Movie),
        PendingRecord::Association(a) => {
            normalize_association(a).map(NormalizedRecord::Association)
        }
    }
}

fn normalize_movie(movie: PendingMovie) -> Result<MovieRow, NormalizeError> {
    let title = required(movie.title, "movie", "title")?;
    let raw_date = required(movie.release_date, "movie", "release_date")?;
    let release_date = date::normalize_date(&raw_date)?;

    let budget = clean_text(movie.budget).and_then(|raw| amount(&title, "budget", &raw));
    let box_office =
        clean_text(movie.box_office).and_then(|raw| amount(&title, "box_office", &raw));

    Ok(MovieRow {
        title,
        budget,
        box_office,
        release_date,
    })
}

fn normalize_association(assoc: PendingAssociation) -> Result<AssociationRow, NormalizeError> {
    let record = assoc.kind.as_str();
    Ok(AssociationRow {
        title: required(assoc.title, record, "title")?,
        kind: assoc.kind,
        name: required(assoc.name, record, "name")?,
    })
}

fn amount(title: &str, field: &str, raw: &str) -> Option<Amount> {
    let Some(parsed) = money::normalize_money(raw) else {
        warn!(title, field, raw, "amount out of range, stored as null");
        return None;
    };
    if parsed.scale == Scale::RawUnits {
        debug!(title, field, raw, value = %parsed.value, "amount has no unit word, scaled as raw units");
    }
    Some(parsed)
}

fn required(
    value: Option<String>,
    record: &'static str,
    field: &'static str,
) -> Result<String, NormalizeError> {
    clean_text(value).ok_or(NormalizeError::MissingRequiredField { record, field })
}

/// Trim and drop embedded quotes; empty text counts as absent.
pub fn clean_text(value: Option<String>) -> Option<String> {
    let value = value?;
    let cleaned: String = value.chars().filter(|c| !QUOTES.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
