//! Request builder and response parser for the legacy REST dialect.
//!
//! # Design
//! `RestProtocol` holds only the endpoint URL and carries no session state.
//! Each remote method is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` function that interprets the decoded reply,
//! so the I/O boundary stays explicit and every step is testable without a
//! server.
//!
//! The server maps the keys of `rest_data` onto positional arguments, so
//! payloads are built with `json!` on an order-preserving map and the key
//! order below follows the server's argument order exactly.

use serde_json::{json, Map, Value};

use crate::error::{CrmError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Fault, Record, RelationshipResult, SearchPage, ID_FIELD};

/// Remote method names.
pub mod method {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const SET_ENTRY: &str = "set_entry";
    pub const GET_ENTRY: &str = "get_entry";
    pub const GET_ENTRY_LIST: &str = "get_entry_list";
    pub const GET_ENTRIES_COUNT: &str = "get_entries_count";
    pub const SET_RELATIONSHIP: &str = "set_relationship";
}

const WARNING_FIELD: &str = "warning";

/// One-way digest the legacy login expects in place of the password.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}

/// Arguments of a search request after criteria compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest<'a> {
    pub module: &'a str,
    pub query: &'a str,
    pub order_by: &'a str,
    pub offset: usize,
    pub select_fields: &'a [&'a str],
    pub max_results: usize,
    pub include_deleted: bool,
}

/// Stateless envelope builder bound to one endpoint.
#[derive(Debug, Clone)]
pub struct RestProtocol {
    endpoint: String,
}

impl RestProtocol {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Wrap a payload in the fixed form fields every call shares.
    pub fn envelope(&self, method: &str, rest_data: &Value) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoint.clone(),
            headers: Vec::new(),
            form: vec![
                ("method".to_string(), method.to_string()),
                ("input_type".to_string(), "JSON".to_string()),
                ("response_type".to_string(), "JSON".to_string()),
                ("rest_data".to_string(), rest_data.to_string()),
            ],
        }
    }

    pub fn build_login(&self, username: &str, password: &str, application: &str) -> HttpRequest {
        let rest_data = json!({
            "user_auth": {
                "user_name": username,
                "password": hash_password(password),
            },
            "application_name": application,
            "name_value_list": [{"name": "notifyonsave", "value": "false"}],
        });
        self.envelope(method::LOGIN, &rest_data)
    }

    pub fn build_logout(&self, session: &str) -> HttpRequest {
        self.envelope(method::LOGOUT, &json!({ "session": session }))
    }

    /// Create when `fields` has no id, update when it does.
    pub fn build_set_entry(&self, session: &str, module: &str, fields: &Record) -> HttpRequest {
        let rest_data = json!({
            "session": session,
            "module_name": module,
            "name_value_list": name_value_list(fields),
        });
        self.envelope(method::SET_ENTRY, &rest_data)
    }

    pub fn build_get_entry(&self, session: &str, module: &str, id: &str, select_fields: &[&str]) -> HttpRequest {
        let rest_data = json!({
            "session": session,
            "module_name": module,
            "id": id,
            "select_fields": select_fields,
            "link_name_to_fields_array": [],
            "track_view": false,
        });
        self.envelope(method::GET_ENTRY, &rest_data)
    }

    pub fn build_get_entry_list(&self, session: &str, search: &SearchRequest<'_>) -> HttpRequest {
        let rest_data = json!({
            "session": session,
            "module_name": search.module,
            "query": search.query,
            "order_by": search.order_by,
            "offset": search.offset,
            "select_fields": search.select_fields,
            "link_name_to_fields_array": [],
            "max_results": search.max_results,
            "deleted": u8::from(search.include_deleted),
            "favorites": false,
        });
        self.envelope(method::GET_ENTRY_LIST, &rest_data)
    }

    pub fn build_get_entries_count(&self, session: &str, module: &str, query: &str) -> HttpRequest {
        let rest_data = json!({
            "session": session,
            "module_name": module,
            "query": query,
            "deleted": 0,
        });
        self.envelope(method::GET_ENTRIES_COUNT, &rest_data)
    }

    pub fn build_set_relationship(
        &self,
        session: &str,
        module: &str,
        id: &str,
        link_field: &str,
        related_ids: &[&str],
        remove: bool,
    ) -> HttpRequest {
        let rest_data = json!({
            "session": session,
            "module_name": module,
            "module_id": id,
            "link_field_name": link_field,
            "related_ids": related_ids,
            "name_value_list": [],
            "delete": u8::from(remove),
        });
        self.envelope(method::SET_RELATIONSHIP, &rest_data)
    }
}

/// Encode a record as the ordered `[{name, value}]` wire list.
pub fn name_value_list(fields: &Record) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

/// Decode a `name_value_list` in either the keyed-object or the array form.
pub fn decode_name_value_list(value: &Value) -> Record {
    let mut record = Record::new();
    let mut insert = |key: &str, entry: &Value| {
        let field = entry.get("name").and_then(Value::as_str).unwrap_or(key);
        let field_value = entry.get("value").cloned().unwrap_or(Value::Null);
        record.insert(field.to_string(), field_value);
    };
    match value {
        Value::Object(map) => {
            for (key, entry) in map {
                insert(key, entry);
            }
        }
        Value::Array(items) => {
            for entry in items {
                insert("", entry);
            }
        }
        _ => {}
    }
    record.remove("");
    record
}

/// Check the HTTP layer and decode the body as JSON.
///
/// Non-2xx statuses become `Connection`; undecodable bodies become
/// `Protocol`. Server faults are returned as ordinary values for the caller
/// to interpret (see `fault`).
pub fn decode(response: HttpResponse) -> Result<Value> {
    if !response.is_success() {
        return Err(CrmError::Connection {
            message: format!("server returned HTTP {}", response.status),
            status: Some(response.status),
            response: Some(response.body),
        });
    }
    if response.body.trim().is_empty() {
        return Err(CrmError::protocol("empty response body", Some(response.body)));
    }
    serde_json::from_str(&response.body)
        .map_err(|e| CrmError::protocol(format!("malformed response body: {e}"), Some(response.body)))
}

/// The fault object carried by a reply, if the reply is one.
pub fn fault(value: &Value) -> Option<Fault> {
    let obj = value.as_object()?;
    if !(obj.contains_key("number") && obj.contains_key("name")) {
        return None;
    }
    let number = as_count(obj.get("number")?)? as u32;
    Some(Fault {
        name: obj.get("name")?.as_str()?.to_string(),
        number,
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Map a fault to the matching error variant.
pub fn fault_error(fault: &Fault, value: &Value) -> CrmError {
    if fault.is_authentication() {
        CrmError::authentication(fault.to_string(), Some(value.to_string()))
    } else {
        CrmError::protocol(fault.to_string(), Some(value.to_string()))
    }
}

/// Turn a fault reply into an error and pass anything else through.
pub fn reject_fault(value: Value) -> Result<Value> {
    match fault(&value) {
        Some(f) => Err(fault_error(&f, &value)),
        None => Ok(value),
    }
}

/// Extract the session identifier from a login reply.
pub fn parse_login(value: &Value) -> Result<String> {
    if let Some(f) = fault(value) {
        return Err(CrmError::authentication(f.to_string(), Some(value.to_string())));
    }
    value
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CrmError::authentication("login response carried no session id", Some(value.to_string())))
}

/// Identifier echoed by `set_entry`, if any.
pub fn parse_set_entry(value: &Value) -> Option<String> {
    value
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty() && *id != "-1")
        .map(str::to_string)
}

/// Decode every entry of an `entry_list`, placing the id first.
pub fn parse_entry_list(value: &Value) -> Vec<Record> {
    value
        .get("entry_list")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(parse_entry).collect())
        .unwrap_or_default()
}

fn parse_entry(entry: &Value) -> Record {
    let mut record = Record::new();
    if let Some(id) = entry.get(ID_FIELD).and_then(Value::as_str) {
        record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }
    let fields = entry
        .get("name_value_list")
        .map(decode_name_value_list)
        .unwrap_or_default();
    for (name, value) in fields {
        if name == ID_FIELD && record.contains_key(ID_FIELD) {
            continue;
        }
        record.insert(name, value);
    }
    record
}

/// Interpret a `get_entry` reply.
///
/// No result list yields `None`. An entry that only carries the server's
/// access warning means the record is gone and yields `RecordNotFound`.
pub fn parse_get_entry(value: &Value, module: &str, id: &str) -> Result<Option<Record>> {
    if let Some(f) = fault(value) {
        if f.number == Fault::MODULE_NOT_FOUND {
            return Err(CrmError::RecordNotFound {
                module: module.to_string(),
                id: id.to_string(),
                response: Some(value.to_string()),
            });
        }
        return Err(fault_error(&f, value));
    }
    if !value.is_null() && !value.is_object() {
        return Err(CrmError::protocol("get_entry reply is not an object", Some(value.to_string())));
    }
    let Some(first) = parse_entry_list(value).into_iter().next() else {
        return Ok(None);
    };
    if first.contains_key(WARNING_FIELD) && first.keys().all(|k| k == WARNING_FIELD || k == ID_FIELD) {
        return Err(CrmError::RecordNotFound {
            module: module.to_string(),
            id: id.to_string(),
            response: Some(value.to_string()),
        });
    }
    Ok(Some(first))
}

/// Interpret a `get_entry_list` reply. A reply without results is an empty page.
pub fn parse_search(value: &Value) -> Result<SearchPage> {
    let value = reject_fault(value.clone())?;
    if !value.is_null() && !value.is_object() {
        return Err(CrmError::protocol("get_entry_list reply is not an object", Some(value.to_string())));
    }
    let records = parse_entry_list(&value);
    let result_count = value
        .get("result_count")
        .and_then(as_count)
        .unwrap_or(records.len());
    Ok(SearchPage {
        result_count,
        total_count: value.get("total_count").and_then(as_count),
        next_offset: value.get("next_offset").and_then(as_count).unwrap_or(0),
        records,
    })
}

pub fn parse_count(value: &Value) -> Result<usize> {
    let value = reject_fault(value.clone())?;
    value
        .get("result_count")
        .and_then(as_count)
        .ok_or_else(|| CrmError::protocol("count reply carried no result_count", Some(value.to_string())))
}

pub fn parse_relationship(value: &Value) -> Result<RelationshipResult> {
    let value = reject_fault(value.clone())?;
    let mut counters = Map::new();
    for key in ["created", "failed", "deleted"] {
        let n = value.get(key).and_then(as_count).unwrap_or(0);
        counters.insert(key.to_string(), Value::from(n));
    }
    serde_json::from_value(Value::Object(counters))
        .map_err(|e| CrmError::protocol(format!("malformed relationship reply: {e}"), Some(value.to_string())))
}

/// The server reports counts as numbers or numeric strings.
fn as_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record;

    fn protocol() -> RestProtocol {
        RestProtocol::new("http://localhost:3000/service/v4_1/rest.php")
    }

    fn rest_data(req: &HttpRequest) -> Value {
        serde_json::from_str(req.form_value("rest_data").unwrap()).unwrap()
    }

    #[test]
    fn envelope_has_fixed_form_fields() {
        let req = protocol().build_logout("sess");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/service/v4_1/rest.php");
        assert_eq!(req.form_value("method"), Some("logout"));
        assert_eq!(req.form_value("input_type"), Some("JSON"));
        assert_eq!(req.form_value("response_type"), Some("JSON"));
        assert_eq!(rest_data(&req), json!({"session": "sess"}));
    }

    #[test]
    fn login_sends_md5_digest() {
        let req = protocol().build_login("admin", "password", "tests");
        let data = rest_data(&req);
        assert_eq!(data["user_auth"]["user_name"], "admin");
        assert_eq!(data["user_auth"]["password"], "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(data["application_name"], "tests");
    }

    #[test]
    fn set_entry_keeps_argument_order() {
        let fields = record([("last_name", "Doe"), ("first_name", "Jane")]);
        let req = protocol().build_set_entry("s", "Contacts", &fields);
        let raw = req.form_value("rest_data").unwrap();
        let session_at = raw.find("\"session\"").unwrap();
        let module_at = raw.find("\"module_name\"").unwrap();
        let list_at = raw.find("\"name_value_list\"").unwrap();
        assert!(session_at < module_at && module_at < list_at);
        assert_eq!(
            rest_data(&req)["name_value_list"],
            json!([{"name": "last_name", "value": "Doe"}, {"name": "first_name", "value": "Jane"}])
        );
    }

    #[test]
    fn get_entry_list_carries_paging_fields() {
        let search = SearchRequest {
            module: "Leads",
            query: "status = 'New'",
            select_fields: &["id", "status"],
            max_results: 20,
            offset: 40,
            ..SearchRequest::default()
        };
        let data = rest_data(&protocol().build_get_entry_list("s", &search));
        assert_eq!(data["query"], "status = 'New'");
        assert_eq!(data["max_results"], 20);
        assert_eq!(data["offset"], 40);
        assert_eq!(data["deleted"], 0);
        assert_eq!(data["favorites"], false);
        assert_eq!(data["select_fields"], json!(["id", "status"]));
    }

    #[test]
    fn decode_maps_http_errors_to_connection() {
        let response = HttpResponse {
            status: 502,
            headers: Vec::new(),
            body: "bad gateway".to_string(),
        };
        let err = decode(response).unwrap_err();
        assert!(matches!(err, CrmError::Connection { status: Some(502), .. }));
        assert_eq!(err.response(), Some("bad gateway"));
    }

    #[test]
    fn decode_maps_bad_json_to_protocol() {
        let err = decode(HttpResponse::ok("<html>oops</html>")).unwrap_err();
        assert!(matches!(err, CrmError::Protocol { .. }));
        let err = decode(HttpResponse::ok("")).unwrap_err();
        assert!(matches!(err, CrmError::Protocol { .. }));
    }

    #[test]
    fn login_without_id_is_authentication_error() {
        let err = parse_login(&json!({"module_name": "Users"})).unwrap_err();
        assert!(matches!(err, CrmError::Authentication { .. }));
        let err = parse_login(&json!({"name": "Invalid Login", "number": 10, "description": "bad"})).unwrap_err();
        assert!(matches!(err, CrmError::Authentication { .. }));
        assert_eq!(parse_login(&json!({"id": "abc"})).unwrap(), "abc");
    }

    #[test]
    fn name_value_list_decodes_both_forms() {
        let keyed = json!({"name": {"name": "name", "value": "Acme"}});
        let listed = json!([{"name": "name", "value": "Acme"}]);
        assert_eq!(decode_name_value_list(&keyed), decode_name_value_list(&listed));
    }

    #[test]
    fn get_entry_without_list_is_none() {
        assert_eq!(parse_get_entry(&json!({}), "Contacts", "x").unwrap(), None);
        assert_eq!(parse_get_entry(&json!({"entry_list": []}), "Contacts", "x").unwrap(), None);
    }

    #[test]
    fn get_entry_returns_first_record() {
        let reply = json!({"entry_list": [{
            "id": "c1",
            "module_name": "Contacts",
            "name_value_list": {
                "id": {"name": "id", "value": "c1"},
                "last_name": {"name": "last_name", "value": "Doe"}
            }
        }]});
        let rec = parse_get_entry(&reply, "Contacts", "c1").unwrap().unwrap();
        assert_eq!(rec["id"], "c1");
        assert_eq!(rec["last_name"], "Doe");
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn get_entry_warning_is_not_found() {
        let reply = json!({"entry_list": [{
            "id": "gone",
            "module_name": "Contacts",
            "name_value_list": [{"name": "warning", "value": "Access to this object is denied since it has been deleted or does not exist"}]
        }]});
        let err = parse_get_entry(&reply, "Contacts", "gone").unwrap_err();
        assert!(matches!(err, CrmError::RecordNotFound { ref id, .. } if id == "gone"));
    }

    #[test]
    fn get_entry_module_fault_is_not_found() {
        let reply = json!({"name": "Module Does Not Exist", "number": 20, "description": "x"});
        let err = parse_get_entry(&reply, "Widgets", "1").unwrap_err();
        assert!(matches!(err, CrmError::RecordNotFound { .. }));
    }

    #[test]
    fn search_without_results_is_empty_page() {
        let page = parse_search(&json!({"result_count": 0, "total_count": "0", "next_offset": 0})).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, Some(0));
        let page = parse_search(&Value::Null).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn invalid_session_fault_is_authentication_error() {
        let reply = json!({"name": "Invalid Session ID", "number": 11, "description": "x"});
        assert!(matches!(parse_search(&reply), Err(CrmError::Authentication { .. })));
        assert!(matches!(parse_count(&reply), Err(CrmError::Authentication { .. })));
    }

    #[test]
    fn counts_accept_numeric_strings() {
        assert_eq!(parse_count(&json!({"result_count": "7"})).unwrap(), 7);
        let rel = parse_relationship(&json!({"created": 1, "failed": "0", "deleted": 0})).unwrap();
        assert_eq!(rel.created, 1);
    }

    #[test]
    fn set_entry_rejects_sentinel_ids() {
        assert_eq!(parse_set_entry(&json!({"id": "-1"})), None);
        assert_eq!(parse_set_entry(&json!({"id": "abc"})).as_deref(), Some("abc"));
    }
}
