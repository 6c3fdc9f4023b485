//! Transport implementations that execute `HttpRequest` values.
//!
//! # Design
//! `Transport` is the single I/O seam of the crate. `UreqTransport` is the
//! production implementation; `MockTransport` replays scripted responses and
//! records what it was asked to send. Both return HTTP error statuses as data
//! so status interpretation stays in the protocol layer.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::CrmConfig;
use crate::error::{CrmError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one HTTP round-trip.
///
/// Implementations return `CrmError::Connection` for failures below HTTP
/// (DNS, refused connection, timeout, TLS). Non-2xx responses are returned
/// as `Ok`.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    /// Build an agent honoring the configured timeout and TLS verification.
    ///
    /// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
    /// responses are returned as data rather than `Err`.
    pub fn new(config: &CrmConfig) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!config.verify_ssl())
            .build();
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout()))
            .tls_config(tls)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let pairs = request
            .form
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()));

        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url).query_pairs(pairs);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send_form(pairs)
            }
        };

        let mut response = result.map_err(|e| CrmError::connection(format!("{} {}: {e}", method_name(request.method), request.url)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| CrmError::connection(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn method_name(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
    }
}

/// Scripted transport for tests.
///
/// Responses are consumed in FIFO order. Running out of scripted responses
/// yields a connection error, so an unexpected extra request fails loudly.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: RefCell<VecDeque<Result<HttpResponse>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a 200 response with the given JSON body.
    pub fn push_json(&self, body: serde_json::Value) -> &Self {
        self.push_response(HttpResponse::ok(body.to_string()))
    }

    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses.borrow_mut().push_back(Ok(response));
        self
    }

    /// Queue a transport-level failure.
    pub fn push_failure(&self, message: &str) -> &Self {
        self.responses
            .borrow_mut()
            .push_back(Err(CrmError::connection(message)));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.borrow().last().cloned()
    }

    /// Decoded `rest_data` of every request so far.
    pub fn sent_payloads(&self) -> Vec<serde_json::Value> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|r| r.form_value("rest_data"))
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|r| r.form_value("method").map(str::to_string))
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(CrmError::connection("mock transport has no scripted response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost/rest.php".to_string(),
            headers: Vec::new(),
            form: vec![("method".to_string(), "logout".to_string())],
        }
    }

    #[test]
    fn mock_replays_in_order_and_records_requests() {
        let mock = MockTransport::new();
        mock.push_response(HttpResponse::ok("first"))
            .push_response(HttpResponse::ok("second"));

        assert_eq!(mock.execute(&request()).unwrap().body, "first");
        assert_eq!(mock.execute(&request()).unwrap().body, "second");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.sent_methods(), vec!["logout", "logout"]);
    }

    #[test]
    fn mock_without_script_fails_as_connection_error() {
        let mock = MockTransport::new();
        let err = mock.execute(&request()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn mock_scripted_failure() {
        let mock = MockTransport::new();
        mock.push_failure("connection refused");
        let err = mock.execute(&request()).unwrap_err();
        assert!(matches!(err, CrmError::Connection { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
