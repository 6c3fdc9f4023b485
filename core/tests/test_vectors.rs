//! Verify envelope builders and reply parsers against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Each vector file describes inputs, the expected `rest_data` payload, a
//! simulated response and the expected parse result or error variant.
//! Payloads are compared as parsed JSON, plus their key order, because the
//! server reads `rest_data` positionally.

use crm_core::protocol::{self, RestProtocol, SearchRequest};
use crm_core::{CrmError, Criteria, HttpMethod, HttpRequest, HttpResponse, Record};
use serde_json::Value;

const ENDPOINT: &str = "http://localhost:3000/service/v4_1/rest.php";

fn rest() -> RestProtocol {
    RestProtocol::new(ENDPOINT)
}

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn simulated(case: &Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse {
        status: sim["status"].as_u64().unwrap() as u16,
        headers: Vec::new(),
        body: sim["body"].as_str().unwrap().to_string(),
    }
}

fn keys(value: &Value) -> Vec<&str> {
    value
        .as_object()
        .map(|m| m.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Check the fixed envelope fields and the ordered `rest_data` payload.
fn assert_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, HttpMethod::Post, "{name}: http method");
    assert_eq!(req.url, ENDPOINT, "{name}: url");
    assert_eq!(req.form_value("method"), expected["method"].as_str(), "{name}: method");
    assert_eq!(req.form_value("input_type"), Some("JSON"), "{name}: input_type");
    assert_eq!(req.form_value("response_type"), Some("JSON"), "{name}: response_type");

    let rest_data: Value = serde_json::from_str(req.form_value("rest_data").unwrap()).unwrap();
    assert_eq!(rest_data, expected["rest_data"], "{name}: rest_data");
    assert_eq!(keys(&rest_data), keys(&expected["rest_data"]), "{name}: rest_data order");
}

fn error_variant(err: &CrmError) -> &'static str {
    match err {
        CrmError::Connection { .. } => "Connection",
        CrmError::Authentication { .. } => "Authentication",
        CrmError::Validation { .. } => "Validation",
        CrmError::RecordNotFound { .. } => "RecordNotFound",
        CrmError::Protocol { .. } => "Protocol",
        CrmError::Config(_) => "Config",
    }
}

fn assert_error<T: std::fmt::Debug>(name: &str, case: &Value, result: Result<T, CrmError>) -> Option<T> {
    match case.get("expected_error").and_then(Value::as_str) {
        Some(expected) => {
            let err = result.unwrap_err();
            assert_eq!(error_variant(&err), expected, "{name}: error variant");
            None
        }
        None => Some(result.unwrap()),
    }
}

fn as_record(value: &Value) -> Record {
    value.as_object().cloned().unwrap()
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[test]
fn login_test_vectors() {
    for case in load(include_str!("../../test-vectors/login.json")) {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let req = rest().build_login(
            input["username"].as_str().unwrap(),
            input["password"].as_str().unwrap(),
            input["application"].as_str().unwrap(),
        );
        assert_request(name, &req, &case["expected_request"]);

        let result = protocol::decode(simulated(&case)).and_then(|v| protocol::parse_login(&v));
        if let Some(session) = assert_error(name, &case, result) {
            assert_eq!(session, case["expected_result"].as_str().unwrap(), "{name}: session");
        }
    }
}

// ---------------------------------------------------------------------------
// set_entry
// ---------------------------------------------------------------------------

#[test]
fn set_entry_test_vectors() {
    for case in load(include_str!("../../test-vectors/set_entry.json")) {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let req = rest().build_set_entry(
            input["session"].as_str().unwrap(),
            input["module"].as_str().unwrap(),
            &as_record(&input["fields"]),
        );
        assert_request(name, &req, &case["expected_request"]);

        let reply = protocol::decode(simulated(&case)).unwrap();
        let id = protocol::parse_set_entry(&reply);
        assert_eq!(id.as_deref(), case["expected_result"].as_str(), "{name}: echoed id");
    }
}

// ---------------------------------------------------------------------------
// get_entry
// ---------------------------------------------------------------------------

#[test]
fn get_entry_test_vectors() {
    for case in load(include_str!("../../test-vectors/get_entry.json")) {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let module = input["module"].as_str().unwrap();
        let id = input["id"].as_str().unwrap();
        let select: Vec<&str> = input["select_fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let req = rest().build_get_entry(input["session"].as_str().unwrap(), module, id, &select);
        assert_request(name, &req, &case["expected_request"]);

        let result = protocol::decode(simulated(&case)).and_then(|v| protocol::parse_get_entry(&v, module, id));
        if let Some(found) = assert_error(name, &case, result) {
            let expected = case["expected_result"].as_object().cloned();
            assert_eq!(found, expected, "{name}: record");
            if let Some(record) = found {
                assert_eq!(record.keys().next().map(String::as_str), Some("id"), "{name}: id first");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// get_entry_list
// ---------------------------------------------------------------------------

#[test]
fn get_entry_list_test_vectors() {
    for case in load(include_str!("../../test-vectors/get_entry_list.json")) {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let query = Criteria::from_json(&input["criteria"]).unwrap().to_query().unwrap();
        let select: Vec<&str> = input["select_fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let search = SearchRequest {
            module: input["module"].as_str().unwrap(),
            query: &query,
            offset: input["offset"].as_u64().unwrap() as usize,
            select_fields: &select,
            max_results: input["max_results"].as_u64().unwrap() as usize,
            ..SearchRequest::default()
        };
        let req = rest().build_get_entry_list(input["session"].as_str().unwrap(), &search);
        assert_request(name, &req, &case["expected_request"]);

        let page = protocol::decode(simulated(&case))
            .and_then(|v| protocol::parse_search(&v))
            .unwrap();
        let expected = &case["expected_result"];
        let records: Vec<Record> = expected["records"].as_array().unwrap().iter().map(as_record).collect();
        assert_eq!(page.records, records, "{name}: records");
        assert_eq!(page.result_count as u64, expected["result_count"].as_u64().unwrap(), "{name}: result_count");
        assert_eq!(page.total_count.map(|n| n as u64), expected["total_count"].as_u64(), "{name}: total_count");
        assert_eq!(page.next_offset as u64, expected["next_offset"].as_u64().unwrap(), "{name}: next_offset");
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[test]
fn decode_test_vectors() {
    for case in load(include_str!("../../test-vectors/decode.json")) {
        let name = case["name"].as_str().unwrap();
        if let Some(value) = assert_error(name, &case, protocol::decode(simulated(&case))) {
            assert_eq!(value, case["expected_result"], "{name}: decoded body");
        }
    }
}
