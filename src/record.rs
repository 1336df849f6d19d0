use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::normalize::money::Amount;

/// The four many-to-many edges a film can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    Actor,
    Director,
    Distributor,
    ProductionCompany,
}

impl AssociationKind {
    pub const ALL: [AssociationKind; 4] = [
        AssociationKind::Actor,
        AssociationKind::Director,
        AssociationKind::Distributor,
        AssociationKind::ProductionCompany,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssociationKind::Actor => "actor",
            AssociationKind::Director => "director",
            AssociationKind::Distributor => "distributor",
            AssociationKind::ProductionCompany => "production_company",
        }
    }
}

// ── Raw input (one JSON object per line) ──

/// Everything the extractor pulled from one film page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPage {
    #[serde(default)]
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub box_office: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub actors: Vec<Option<String>>,
    #[serde(default)]
    pub directors: Vec<Option<String>>,
    #[serde(default)]
    pub distributors: Vec<Option<String>>,
    #[serde(default)]
    pub production_companies: Vec<Option<String>>,
}

/// A single film-to-entity edge emitted on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAssociation {
    pub title: Option<String>,
    pub kind: AssociationKind,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInput {
    Association(RawAssociation),
    Page(RawPage),
}

pub fn parse_line(line: &str) -> serde_json::Result<RawInput> {
    serde_json::from_str(line)
}

// ── Pending records (built, not yet normalized) ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMovie {
    pub title: Option<String>,
    pub budget: Option<String>,
    pub box_office: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAssociation {
    pub title: Option<String>,
    pub kind: AssociationKind,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRecord {
    Movie(PendingMovie),
    Association(PendingAssociation),
}

/// Split one input line into records: the movie first, then its actors,
/// directors, distributors and production companies in page order.
pub fn build_records(input: RawInput) -> Vec<PendingRecord> {
    match input {
        RawInput::Association(a) => vec![PendingRecord::Association(PendingAssociation {
            title: a.title,
            kind: a.kind,
            name: a.name,
        })],
        RawInput::Page(page) => build_page(page),
    }
}

fn build_page(page: RawPage) -> Vec<PendingRecord> {
    let RawPage {
        url,
        title,
        budget,
        box_office,
        release_date,
        actors,
        directors,
        distributors,
        production_companies,
    } = page;

    let mut records = vec![PendingRecord::Movie(PendingMovie {
        title: title.clone(),
        budget,
        box_office,
        release_date,
    })];

    let groups = AssociationKind::ALL
        .into_iter()
        .zip([actors, directors, distributors, production_companies]);
    for (kind, names) in groups {
        records.extend(names.into_iter().map(|name| {
            PendingRecord::Association(PendingAssociation {
                title: title.clone(),
                kind,
                name,
            })
        }));
    }
    if let Some(url) = url {
        debug!(%url, records = records.len(), "expanded page");
    }
    records
}

// ── Normalized records (safe for storage) ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRow {
    pub title: String,
    pub budget: Option<Amount>,
    pub box_office: Option<Amount>,
    pub release_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationRow {
    pub title: String,
    pub kind: AssociationKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Movie(MovieRow),
    Association(AssociationRow),
}

impl NormalizedRecord {
    pub fn title(&self) -> &str {
        match self {
            NormalizedRecord::Movie(m) => &m.title,
            NormalizedRecord::Association(a) => &a.title,
        }
    }
}
