// Fixed-width "schedina" record codec.
// One encoded line reports one guest for one stay. The remote service
// validates the layout byte-for-byte, so every field sits at a fixed offset
// and over-long values are rejected outright instead of truncated.

use chrono::NaiveDate;
use thiserror::Error;

// Length in bytes of every encoded record.
pub const RECORD_LEN: usize = 168;

// Code reported for Italy in the country and citizenship columns.
pub const ITALY_PLACE_CODE: &str = "100000100";

// Fallback code used when a place name cannot be resolved.
pub const UNKNOWN_PLACE_CODE: &str = "999999999";

const DATE_FORMAT: &str = "%d/%m/%Y";
const MAX_GUEST_AGE_YEARS: u32 = 120;

// The columns of an encoded record: (field, start offset, length).
pub const LAYOUT: [(RecordField, usize, usize); 14] = [
    (RecordField::Role, 0, 2),
    (RecordField::ArrivalDate, 2, 10),
    (RecordField::Nights, 12, 2),
    (RecordField::LastName, 14, 50),
    (RecordField::FirstName, 64, 30),
    (RecordField::Sex, 94, 1),
    (RecordField::BirthDate, 95, 10),
    (RecordField::BirthPlace, 105, 9),
    (RecordField::BirthProvince, 114, 2),
    (RecordField::BirthCountry, 116, 9),
    (RecordField::Citizenship, 125, 9),
    (RecordField::DocumentType, 134, 5),
    (RecordField::DocumentNumber, 139, 20),
    (RecordField::DocumentIssuePlace, 159, 9),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Role,
    ArrivalDate,
    Nights,
    LastName,
    FirstName,
    Sex,
    BirthDate,
    BirthPlace,
    BirthProvince,
    BirthCountry,
    Citizenship,
    DocumentType,
    DocumentNumber,
    DocumentIssuePlace,
}

impl RecordField {
    pub fn name(self) -> &'static str {
        match self {
            RecordField::Role => "role",
            RecordField::ArrivalDate => "arrival date",
            RecordField::Nights => "nights",
            RecordField::LastName => "last name",
            RecordField::FirstName => "first name",
            RecordField::Sex => "sex",
            RecordField::BirthDate => "birth date",
            RecordField::BirthPlace => "birth place",
            RecordField::BirthProvince => "birth province",
            RecordField::BirthCountry => "birth country",
            RecordField::Citizenship => "citizenship",
            RecordField::DocumentType => "document type",
            RecordField::DocumentNumber => "document number",
            RecordField::DocumentIssuePlace => "document issue place",
        }
    }
}

// Role of the guest within the booking party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestRole {
    HeadOfFamily,
    HeadOfGroup,
    FamilyMember,
    GroupMember,
}

impl GuestRole {
    pub fn code(self) -> u8 {
        match self {
            GuestRole::HeadOfFamily => 17,
            GuestRole::HeadOfGroup => 18,
            GuestRole::FamilyMember => 19,
            GuestRole::GroupMember => 20,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            17 => Some(GuestRole::HeadOfFamily),
            18 => Some(GuestRole::HeadOfGroup),
            19 => Some(GuestRole::FamilyMember),
            20 => Some(GuestRole::GroupMember),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn code(self) -> char {
        match self {
            Sex::Male => '1',
            Sex::Female => '2',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '1' => Some(Sex::Male),
            '2' => Some(Sex::Female),
            _ => None,
        }
    }

    // Accepts the M/F letters used by host applications.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'M' => Some(Sex::Male),
            'F' => Some(Sex::Female),
            _ => None,
        }
    }
}

// Identity document presented at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    IdentityCard,
    Passport,
    DrivingLicense,
}

impl DocumentType {
    pub fn code(self) -> &'static str {
        match self {
            DocumentType::IdentityCard => "IDENT",
            DocumentType::Passport => "PASOR",
            DocumentType::DrivingLicense => "PATEN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "IDENT" => Some(DocumentType::IdentityCard),
            "PASOR" => Some(DocumentType::Passport),
            "PATEN" => Some(DocumentType::DrivingLicense),
            _ => None,
        }
    }
}

// Resolved place code and province as they appear in the record columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCode {
    pub code: String,
    pub province: String,
}

impl PlaceCode {
    pub fn unknown() -> Self {
        Self {
            code: UNKNOWN_PLACE_CODE.to_string(),
            province: String::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.code == UNKNOWN_PLACE_CODE
    }
}

// Place-name resolution supplied by the host. Total by contract: an
// unresolvable name yields `PlaceCode::unknown()`, never an error, so that
// encoding can proceed and flag a soft warning.
pub trait PlaceLookup {
    fn lookup_place(&self, name: &str) -> PlaceCode;
}

impl<F> PlaceLookup for F
where
    F: Fn(&str) -> PlaceCode,
{
    fn lookup_place(&self, name: &str) -> PlaceCode {
        self(name)
    }
}

// One reportable person. Stay-wide fields (arrival, nights) live on
// `StayContext` so a batch applies one stay to every guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestRecord {
    pub role: GuestRole,
    pub last_name: String,
    pub first_name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub birth_place: String,
    // Nine-digit place code of the guest's citizenship; `ITALY_PLACE_CODE`
    // marks a domestic guest.
    pub nationality: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub document_issue_place: String,
}

impl GuestRecord {
    pub fn is_domestic(&self) -> bool {
        self.nationality == ITALY_PLACE_CODE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayContext {
    pub arrival: NaiveDate,
    pub nights: u8,
}

// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .field.name())]
pub struct FieldError {
    pub field: RecordField,
    pub message: String,
}

// Soft condition worth reporting without blocking the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedinaWarning {
    UnresolvedPlace { field: RecordField, name: String },
}

impl std::fmt::Display for SchedinaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedinaWarning::UnresolvedPlace { field, name } => {
                write!(f, "{}: no code found for {name:?}", field.name())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSchedina {
    pub line: String,
    pub warnings: Vec<SchedinaWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWarning {
    pub guest: usize,
    pub warning: SchedinaWarning,
}

// Validation failures for one guest of a batch, by input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordErrors {
    pub guest: usize,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedBatch {
    pub lines: Vec<String>,
    pub warnings: Vec<BatchWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is {found} bytes, expected 168")]
    WrongLength { found: usize },

    #[error("{}: field does not align on a character boundary", .field.name())]
    Misaligned { field: RecordField },

    #[error("{}: invalid value {value:?}", .field.name())]
    InvalidField { field: RecordField, value: String },
}

// Every decoded column of a record. Codes stay codes: place names are not
// recoverable from an encoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSchedina {
    pub role: GuestRole,
    pub arrival: NaiveDate,
    pub nights: u8,
    pub last_name: String,
    pub first_name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub birth_place_code: String,
    pub birth_province: String,
    pub birth_country_code: String,
    pub citizenship_code: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub document_issue_place_code: String,
}

// Field-level validation, reported as a list rather than a single error so
// the host can show every problem with a guest at once.
pub fn validate(record: &GuestRecord, stay: &StayContext) -> Vec<FieldError> {
    let mut errors = Vec::new();

    check_text(&mut errors, RecordField::LastName, &record.last_name, 50);
    check_text(&mut errors, RecordField::FirstName, &record.first_name, 30);
    check_not_empty(&mut errors, RecordField::BirthPlace, &record.birth_place);
    check_text(&mut errors, RecordField::Citizenship, &record.nationality, 9);
    check_text(
        &mut errors,
        RecordField::DocumentNumber,
        &record.document_number,
        20,
    );
    check_not_empty(
        &mut errors,
        RecordField::DocumentIssuePlace,
        &record.document_issue_place,
    );

    if stay.nights == 0 || stay.nights > 99 {
        errors.push(FieldError {
            field: RecordField::Nights,
            message: format!("must be between 1 and 99, got {}", stay.nights),
        });
    }

    match stay.arrival.years_since(record.birth_date) {
        None => errors.push(FieldError {
            field: RecordField::BirthDate,
            message: "falls after the arrival date".to_string(),
        }),
        Some(age) if age > MAX_GUEST_AGE_YEARS => errors.push(FieldError {
            field: RecordField::BirthDate,
            message: format!("implies an implausible age of {age} years"),
        }),
        Some(_) => {}
    }

    errors
}

fn check_not_empty(errors: &mut Vec<FieldError>, field: RecordField, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            field,
            message: "must not be empty".to_string(),
        });
    }
}

fn check_text(errors: &mut Vec<FieldError>, field: RecordField, value: &str, max_len: usize) {
    let rendered = value.trim().to_uppercase();
    if rendered.is_empty() {
        errors.push(FieldError {
            field,
            message: "must not be empty".to_string(),
        });
    } else if rendered.len() > max_len {
        errors.push(FieldError {
            field,
            message: format!("is {} bytes, maximum is {max_len}", rendered.len()),
        });
    }
}

// Encodes one guest into a 168-byte line. Validation runs first and every
// rendered value is re-checked against its column width, so a failure never
// produces partial output.
pub fn encode(
    record: &GuestRecord,
    stay: &StayContext,
    places: &dyn PlaceLookup,
) -> Result<EncodedSchedina, Vec<FieldError>> {
    let errors = validate(record, stay);
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut warnings = Vec::new();

    let birth_place = resolve(
        places,
        &record.birth_place,
        RecordField::BirthPlace,
        &mut warnings,
    );
    let issue_place = resolve(
        places,
        &record.document_issue_place,
        RecordField::DocumentIssuePlace,
        &mut warnings,
    );
    let country = if record.is_domestic() {
        ITALY_PLACE_CODE.to_string()
    } else {
        record.nationality.trim().to_string()
    };

    let values: [String; 14] = [
        format!("{:02}", record.role.code()),
        stay.arrival.format(DATE_FORMAT).to_string(),
        format!("{:02}", stay.nights),
        record.last_name.trim().to_uppercase(),
        record.first_name.trim().to_uppercase(),
        record.sex.code().to_string(),
        record.birth_date.format(DATE_FORMAT).to_string(),
        birth_place.code,
        birth_place.province,
        country.clone(),
        country,
        record.document_type.code().to_string(),
        record.document_number.trim().to_uppercase(),
        issue_place.code,
    ];

    let mut line = String::with_capacity(RECORD_LEN);
    for ((field, _, width), value) in LAYOUT.iter().zip(values.iter()) {
        if value.len() > *width {
            return Err(vec![FieldError {
                field: *field,
                message: format!("rendered value {value:?} exceeds {width} bytes"),
            }]);
        }
        line.push_str(value);
        for _ in value.len()..*width {
            line.push(' ');
        }
    }

    debug_assert_eq!(line.len(), RECORD_LEN);
    Ok(EncodedSchedina { line, warnings })
}

fn resolve(
    places: &dyn PlaceLookup,
    name: &str,
    field: RecordField,
    warnings: &mut Vec<SchedinaWarning>,
) -> PlaceCode {
    let place = places.lookup_place(name.trim());
    if place.is_unknown() {
        warnings.push(SchedinaWarning::UnresolvedPlace {
            field,
            name: name.trim().to_string(),
        });
    }
    place
}

// Splits an encoded line back into typed fields. The inverse of `encode`
// modulo the code mappings; used for receipts and for testing the layout.
pub fn decode(line: &str) -> Result<DecodedSchedina, DecodeError> {
    if line.len() != RECORD_LEN {
        return Err(DecodeError::WrongLength { found: line.len() });
    }

    let column = |field: RecordField, start: usize, len: usize| -> Result<&str, DecodeError> {
        line.get(start..start + len)
            .ok_or(DecodeError::Misaligned { field })
    };
    let invalid = |field: RecordField, value: &str| DecodeError::InvalidField {
        field,
        value: value.to_string(),
    };

    let mut columns = Vec::with_capacity(LAYOUT.len());
    for (field, start, len) in LAYOUT {
        columns.push(column(field, start, len)?);
    }

    let role_code: u8 = columns[0]
        .parse()
        .map_err(|_| invalid(RecordField::Role, columns[0]))?;
    let role = GuestRole::from_code(role_code).ok_or_else(|| invalid(RecordField::Role, columns[0]))?;
    let arrival = NaiveDate::parse_from_str(columns[1], DATE_FORMAT)
        .map_err(|_| invalid(RecordField::ArrivalDate, columns[1]))?;
    let nights: u8 = columns[2]
        .parse()
        .map_err(|_| invalid(RecordField::Nights, columns[2]))?;
    let sex_code = columns[5]
        .chars()
        .next()
        .ok_or_else(|| invalid(RecordField::Sex, columns[5]))?;
    let sex = Sex::from_code(sex_code).ok_or_else(|| invalid(RecordField::Sex, columns[5]))?;
    let birth_date = NaiveDate::parse_from_str(columns[6], DATE_FORMAT)
        .map_err(|_| invalid(RecordField::BirthDate, columns[6]))?;
    let document_type = DocumentType::from_code(columns[11].trim_end())
        .ok_or_else(|| invalid(RecordField::DocumentType, columns[11]))?;

    Ok(DecodedSchedina {
        role,
        arrival,
        nights,
        last_name: columns[3].trim_end().to_string(),
        first_name: columns[4].trim_end().to_string(),
        sex,
        birth_date,
        birth_place_code: columns[7].trim_end().to_string(),
        birth_province: columns[8].trim_end().to_string(),
        birth_country_code: columns[9].trim_end().to_string(),
        citizenship_code: columns[10].trim_end().to_string(),
        document_type,
        document_number: columns[12].trim_end().to_string(),
        document_issue_place_code: columns[13].trim_end().to_string(),
    })
}

// Encodes one line per guest, preserving input order. Any invalid guest
// fails the whole batch with the full per-record error list and no lines.
pub fn format_batch(
    guests: &[GuestRecord],
    stay: &StayContext,
    places: &dyn PlaceLookup,
) -> Result<FormattedBatch, Vec<RecordErrors>> {
    let mut lines = Vec::with_capacity(guests.len());
    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    for (index, guest) in guests.iter().enumerate() {
        match encode(guest, stay, places) {
            Ok(encoded) => {
                lines.push(encoded.line);
                warnings.extend(
                    encoded
                        .warnings
                        .into_iter()
                        .map(|warning| BatchWarning {
                            guest: index,
                            warning,
                        }),
                );
            }
            Err(errors) => failures.push(RecordErrors {
                guest: index,
                errors,
            }),
        }
    }

    if failures.is_empty() {
        Ok(FormattedBatch { lines, warnings })
    } else {
        Err(failures)
    }
}
