// Decoding of the remote service's response envelopes. Every operation
// answers with one `<op>Result` element carrying an `<esito>` outcome flag,
// a payload on success, and an error triple on failure. Elements are matched
// by local name: the namespace prefixes are not under our control.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

// Outcome of any remote operation.
pub type RemoteResult<T> = Result<T, ServiceError>;

// The error taxonomy of the client. `Malformed` (we could not understand the
// service) is distinct from `Remote` (the service said no); callers decide
// retry policy per variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("could not build request: {0}")]
    Request(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service reported failure [{code}]: {description}")]
    Remote {
        code: String,
        description: String,
        detail: String,
        // Per-record error strings attached to a rejected batch, verbatim.
        record_errors: Vec<String>,
    },
}

impl ServiceError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Transport(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ServiceError::Malformed(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ServiceError::Remote { .. })
    }
}

// Payload of a successful token issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub issued: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
}

pub fn parse_generate_token(body: &str) -> RemoteResult<TokenGrant> {
    let result = require_success(extract_result(body, "GenerateTokenResult")?)?;

    let token = result
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServiceError::Malformed("GenerateTokenResult carries no token".to_string()))?;
    let expires = result
        .expires
        .as_deref()
        .ok_or_else(|| ServiceError::Malformed("GenerateTokenResult carries no expiry".to_string()))?;
    let expires = parse_timestamp(expires)?;
    let issued = match result.issued.as_deref() {
        Some(raw) => Some(parse_timestamp(raw)?),
        None => None,
    };

    Ok(TokenGrant {
        token,
        issued,
        expires,
    })
}

pub fn parse_authentication_test(body: &str) -> RemoteResult<()> {
    require_success(extract_result(body, "Authentication_TestResult")?)?;
    Ok(())
}

// Rows come back as repeated `<string>` children and are kept as raw
// delimited strings; splitting them is table-specific and happens upstream.
pub fn parse_table(body: &str) -> RemoteResult<Vec<String>> {
    let result = require_success(extract_result(body, "TabellaResult")?)?;
    Ok(result.rows)
}

pub fn parse_send(body: &str) -> RemoteResult<()> {
    require_success(extract_result(body, "SendResult")?)?;
    Ok(())
}

// Child elements of one operation result, collected by local name.
#[derive(Debug, Default)]
struct ResultElement {
    name: &'static str,
    outcome: Option<String>,
    token: Option<String>,
    issued: Option<String>,
    expires: Option<String>,
    rows: Vec<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    error_detail: Option<String>,
}

// Maps `<esito>true</esito>` to success; anything else is a remote-reported
// failure with the error triple defaulted to empty strings when absent.
fn require_success(result: ResultElement) -> Result<ResultElement, ServiceError> {
    match result.outcome.as_deref() {
        None => Err(ServiceError::Malformed(format!(
            "{} carries no esito field",
            result.name
        ))),
        Some(value) if value.trim().eq_ignore_ascii_case("true") => Ok(result),
        Some(_) => Err(ServiceError::Remote {
            code: result.error_code.unwrap_or_default(),
            description: result.error_description.unwrap_or_default(),
            detail: result.error_detail.unwrap_or_default(),
            record_errors: result.rows,
        }),
    }
}

fn extract_result(body: &str, result_name: &'static str) -> Result<ResultElement, ServiceError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == result_name.as_bytes() => {
                return collect_children(&mut reader, result_name);
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == result_name.as_bytes() => {
                return Ok(ResultElement {
                    name: result_name,
                    ..ResultElement::default()
                });
            }
            Ok(Event::Eof) => {
                return Err(ServiceError::Malformed(format!(
                    "missing {result_name} element"
                )));
            }
            Err(e) => {
                return Err(ServiceError::Malformed(format!(
                    "XML error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => (),
        }
    }
}

fn collect_children(
    reader: &mut Reader<&[u8]>,
    result_name: &'static str,
) -> Result<ResultElement, ServiceError> {
    let mut result = ResultElement {
        name: result_name,
        ..ResultElement::default()
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"esito" => result.outcome = Some(read_text(reader, &e)?),
                b"token" => result.token = Some(read_text(reader, &e)?),
                b"issued" => result.issued = Some(read_text(reader, &e)?),
                b"expires" => result.expires = Some(read_text(reader, &e)?),
                b"ErroreCod" => result.error_code = Some(read_text(reader, &e)?),
                b"ErroreDes" => result.error_description = Some(read_text(reader, &e)?),
                b"ErroreDettaglio" => result.error_detail = Some(read_text(reader, &e)?),
                b"string" => result.rows.push(read_text(reader, &e)?),
                // Row containers; their children are read in place.
                b"Righe" | b"Dettaglio" => (),
                _ => {
                    reader.read_to_end(e.name()).map_err(|e| {
                        ServiceError::Malformed(format!("unreadable element: {e}"))
                    })?;
                }
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"esito" => result.outcome = Some(String::new()),
                b"token" => result.token = Some(String::new()),
                b"issued" => result.issued = Some(String::new()),
                b"expires" => result.expires = Some(String::new()),
                b"ErroreCod" => result.error_code = Some(String::new()),
                b"ErroreDes" => result.error_description = Some(String::new()),
                b"ErroreDettaglio" => result.error_detail = Some(String::new()),
                b"string" => result.rows.push(String::new()),
                _ => (),
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == result_name.as_bytes() => {
                return Ok(result);
            }
            Ok(Event::Eof) => {
                return Err(ServiceError::Malformed(format!(
                    "unterminated {result_name} element"
                )));
            }
            Err(e) => {
                return Err(ServiceError::Malformed(format!(
                    "XML error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => (),
        }
    }
}

fn read_text(reader: &mut Reader<&[u8]>, element: &BytesStart<'_>) -> Result<String, ServiceError> {
    reader
        .read_text(element.name())
        .map(|text| text.into_owned())
        .map_err(|e| ServiceError::Malformed(format!("unreadable text content: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| ServiceError::Malformed(format!("unparseable timestamp {raw:?}: {e}")))
}
