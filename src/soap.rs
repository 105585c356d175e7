// Outbound SOAP envelopes for the four remote operations. Parameter order
// inside each body element is fixed by the service contract.

use serde::Serialize;
use thiserror::Error;

use crate::session::Credentials;

// Content type sent with every request.
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SERVICE_NS: &str = "AlloggiatiService";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

// A request ready for the transport: SOAPAction header plus serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub action: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request serialization failed: {0}")]
pub struct BuildError(String);

#[derive(Serialize)]
#[serde(rename = "soap:Envelope")]
struct Envelope<T> {
    #[serde(rename = "@xmlns:soap")]
    soap_ns: &'static str,
    #[serde(rename = "soap:Body")]
    body: T,
}

#[derive(Serialize)]
struct GenerateTokenBody<'a> {
    #[serde(rename = "GenerateToken")]
    operation: GenerateToken<'a>,
}

#[derive(Serialize)]
struct GenerateToken<'a> {
    #[serde(rename = "@xmlns")]
    ns: &'static str,
    #[serde(rename = "Utente")]
    account: &'a str,
    #[serde(rename = "Password")]
    secret: &'a str,
    #[serde(rename = "WsKey")]
    ws_key: &'a str,
}

#[derive(Serialize)]
struct AuthenticationTestBody<'a> {
    #[serde(rename = "Authentication_Test")]
    operation: AuthenticationTest<'a>,
}

#[derive(Serialize)]
struct AuthenticationTest<'a> {
    #[serde(rename = "@xmlns")]
    ns: &'static str,
    #[serde(rename = "Utente")]
    account: &'a str,
    #[serde(rename = "token")]
    token: &'a str,
}

#[derive(Serialize)]
struct TabellaBody<'a> {
    #[serde(rename = "Tabella")]
    operation: Tabella<'a>,
}

#[derive(Serialize)]
struct Tabella<'a> {
    #[serde(rename = "@xmlns")]
    ns: &'static str,
    #[serde(rename = "Utente")]
    account: &'a str,
    #[serde(rename = "token")]
    token: &'a str,
    #[serde(rename = "tipo")]
    table_id: i32,
}

#[derive(Serialize)]
struct SendBody<'a> {
    #[serde(rename = "Send")]
    operation: SendSchedine<'a>,
}

#[derive(Serialize)]
struct SendSchedine<'a> {
    #[serde(rename = "@xmlns")]
    ns: &'static str,
    #[serde(rename = "Utente")]
    account: &'a str,
    #[serde(rename = "token")]
    token: &'a str,
    #[serde(rename = "ElencoSchedine")]
    records: RecordList<'a>,
}

#[derive(Serialize)]
struct RecordList<'a> {
    #[serde(rename = "string")]
    records: &'a [String],
}

pub fn generate_token(credentials: &Credentials) -> Result<SoapRequest, BuildError> {
    envelope(
        "AlloggiatiService/GenerateToken",
        GenerateTokenBody {
            operation: GenerateToken {
                ns: SERVICE_NS,
                account: &credentials.account,
                secret: &credentials.secret,
                ws_key: &credentials.ws_key,
            },
        },
    )
}

pub fn authentication_test(account: &str, token: &str) -> Result<SoapRequest, BuildError> {
    envelope(
        "AlloggiatiService/Authentication_Test",
        AuthenticationTestBody {
            operation: AuthenticationTest {
                ns: SERVICE_NS,
                account,
                token,
            },
        },
    )
}

pub fn tabella(account: &str, token: &str, table_id: i32) -> Result<SoapRequest, BuildError> {
    envelope(
        "AlloggiatiService/Tabella",
        TabellaBody {
            operation: Tabella {
                ns: SERVICE_NS,
                account,
                token,
                table_id,
            },
        },
    )
}

pub fn send(account: &str, token: &str, records: &[String]) -> Result<SoapRequest, BuildError> {
    envelope(
        "AlloggiatiService/Send",
        SendBody {
            operation: SendSchedine {
                ns: SERVICE_NS,
                account,
                token,
                records: RecordList { records },
            },
        },
    )
}

fn envelope<T: Serialize>(action: &'static str, body: T) -> Result<SoapRequest, BuildError> {
    let envelope = Envelope {
        soap_ns: SOAP_NS,
        body,
    };
    let xml = quick_xml::se::to_string(&envelope).map_err(|e| BuildError(e.to_string()))?;
    Ok(SoapRequest {
        action,
        body: format!("{XML_DECLARATION}{xml}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            account: "ACME".to_string(),
            secret: "pw".to_string(),
            ws_key: "K1".to_string(),
        }
    }

    #[test]
    fn test_generate_token_request_shape() {
        let request = generate_token(&credentials()).unwrap();

        assert_eq!(request.action, "AlloggiatiService/GenerateToken");
        assert!(request.body.starts_with(XML_DECLARATION));
        assert!(request.body.contains("soap:Envelope"));
        assert!(request.body.contains(r#"<GenerateToken xmlns="AlloggiatiService">"#));
        assert!(request.body.contains("<Utente>ACME</Utente>"));
        assert!(request.body.contains("<Password>pw</Password>"));
        assert!(request.body.contains("<WsKey>K1</WsKey>"));
    }

    #[test]
    fn test_generate_token_parameter_order() {
        let request = generate_token(&credentials()).unwrap();

        let account = request.body.find("<Utente>").unwrap();
        let secret = request.body.find("<Password>").unwrap();
        let ws_key = request.body.find("<WsKey>").unwrap();
        assert!(account < secret && secret < ws_key);
    }

    #[test]
    fn test_authentication_test_request_shape() {
        let request = authentication_test("ACME", "T1").unwrap();

        assert_eq!(request.action, "AlloggiatiService/Authentication_Test");
        assert!(request.body.contains("<Utente>ACME</Utente>"));
        assert!(request.body.contains("<token>T1</token>"));
    }

    #[test]
    fn test_tabella_request_carries_table_id() {
        let request = tabella("ACME", "T1", 3).unwrap();

        assert_eq!(request.action, "AlloggiatiService/Tabella");
        assert!(request.body.contains("<tipo>3</tipo>"));
    }

    #[test]
    fn test_send_request_lists_each_record() {
        let records = vec!["A".repeat(168), "B".repeat(168)];

        let request = send("ACME", "T1", &records).unwrap();

        assert_eq!(request.action, "AlloggiatiService/Send");
        assert!(request.body.contains(&format!("<string>{}</string>", "A".repeat(168))));
        assert!(request.body.contains(&format!("<string>{}</string>", "B".repeat(168))));
        assert!(request.body.contains("<ElencoSchedine>"));
    }

    #[test]
    fn test_request_escapes_markup_in_values() {
        let mut credentials = credentials();
        credentials.secret = "a<b&c".to_string();

        let request = generate_token(&credentials).unwrap();

        assert!(request.body.contains("<Password>a&lt;b&amp;c</Password>"));
        assert!(!request.body.contains("a<b&c"));
    }
}
