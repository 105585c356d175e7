// Client library for the Alloggiati Web guest-reporting service.

pub mod client;
pub mod response;
pub mod schedina;
pub mod session;
pub mod soap;
pub mod tables;

// Re-export key types for convenience
pub use client::{
    ClientConfig, ClientStats, HttpPost, HttpReply, HttpTransport, ReportingClient, Transport,
    TransportError, DEFAULT_TIMEOUT,
};
pub use response::{RemoteResult, ServiceError, TokenGrant};
pub use schedina::{
    decode, encode, format_batch, validate, BatchWarning, DecodeError, DecodedSchedina,
    DocumentType, EncodedSchedina, FieldError, FormattedBatch, GuestRecord, GuestRole, PlaceCode,
    PlaceLookup, RecordErrors, RecordField, SchedinaWarning, Sex, StayContext, ITALY_PLACE_CODE,
    RECORD_LEN, UNKNOWN_PLACE_CODE,
};
pub use session::{Credentials, Session, SessionManager};
pub use soap::{SoapRequest, CONTENT_TYPE};
pub use tables::{PlaceDirectory, ReferenceTable, ReferenceTableRow};
