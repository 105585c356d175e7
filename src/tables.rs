// Remote reference catalogs and the place directory built from the
// downloaded places table.

use dashmap::DashMap;

use crate::schedina::{PlaceCode, PlaceLookup};

// The five catalogs the service exposes, selected by integer table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    Places,
    DocumentTypes,
    GuestRoles,
    ErrorCodes,
    Apartments,
}

impl ReferenceTable {
    pub const ALL: [ReferenceTable; 5] = [
        ReferenceTable::Places,
        ReferenceTable::DocumentTypes,
        ReferenceTable::GuestRoles,
        ReferenceTable::ErrorCodes,
        ReferenceTable::Apartments,
    ];

    pub fn id(self) -> i32 {
        match self {
            ReferenceTable::Places => 0,
            ReferenceTable::DocumentTypes => 1,
            ReferenceTable::GuestRoles => 2,
            ReferenceTable::ErrorCodes => 3,
            ReferenceTable::Apartments => 4,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.id() == id)
    }
}

// One pipe-delimited catalog row: `code|name|province[|region]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTableRow {
    pub code: String,
    pub name: String,
    pub province: String,
    pub region: Option<String>,
}

impl ReferenceTableRow {
    // Fewer than three fields is not a row.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('|');
        let code = parts.next()?.trim().to_string();
        let name = parts.next()?.trim().to_string();
        let province = parts.next()?.trim().to_string();
        let region = parts.next().map(|region| region.trim().to_string());
        Some(Self {
            code,
            name,
            province,
            region,
        })
    }
}

// Name-to-code index over the places catalog, read-mostly and shared across
// callers. Keys are upper-cased so lookups are case-insensitive; an unknown
// name resolves to the defined fallback rather than an error.
#[derive(Debug, Default)]
pub struct PlaceDirectory {
    by_name: DashMap<String, PlaceCode>,
}

impl PlaceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a ReferenceTableRow>) -> Self {
        let directory = Self::new();
        for row in rows {
            directory.insert(row);
        }
        directory
    }

    // A later row with the same name wins, matching server order semantics.
    pub fn insert(&self, row: &ReferenceTableRow) {
        self.by_name.insert(
            row.name.trim().to_uppercase(),
            PlaceCode {
                code: row.code.clone(),
                province: row.province.clone(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl PlaceLookup for PlaceDirectory {
    fn lookup_place(&self, name: &str) -> PlaceCode {
        self.by_name
            .get(&name.trim().to_uppercase())
            .map(|entry| entry.value().clone())
            .unwrap_or_else(PlaceCode::unknown)
    }
}
