//! In-memory CRM server speaking the legacy v4_1 REST dialect.
//!
//! Every call is a form POST to `REST_PATH` carrying `method`, `input_type`,
//! `response_type` and a JSON `rest_data` payload. Failures the real server
//! reports in-band (bad credentials, stale sessions, unknown modules) come
//! back as a fault object with HTTP 200; a malformed envelope is a 400.

pub mod query;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const REST_PATH: &str = "/service/v4_1/rest.php";

pub const DEMO_USER: &str = "admin";
pub const DEMO_PASSWORD: &str = "admin";

pub const INVALID_LOGIN: u32 = 10;
pub const INVALID_SESSION: u32 = 11;
pub const MODULE_NOT_FOUND: u32 = 20;
pub const UNKNOWN_METHOD: u32 = 1001;
pub const INVALID_QUERY: u32 = 1002;

/// Warning the server puts in place of a missing record's fields.
pub const MISSING_WARNING: &str = "Access to this object is denied since it has been deleted or does not exist";

const MODULES: &[&str] = &[
    "Accounts",
    "Contacts",
    "Leads",
    "Opportunities",
    "Cases",
    "Bugs",
    "Calls",
    "Meetings",
    "Tasks",
    "Notes",
    "Emails",
    "Documents",
    "Campaigns",
    "Prospects",
    "ProspectLists",
    "Project",
    "ProjectTask",
    "Users",
    "Employees",
    "AOS_Quotes",
    "AOS_Invoices",
    "AOS_Products",
    "AOS_Product_Categories",
    "AOS_Contracts",
    "AOK_KnowledgeBase",
];

pub type Record = Map<String, Value>;

/// Server state: accounts, live sessions, records and relationship links.
#[derive(Debug, Default)]
pub struct Store {
    /// Username to md5 hex digest of the password.
    users: HashMap<String, String>,
    sessions: HashSet<String>,
    /// Module name to records in insertion order.
    records: HashMap<String, Vec<Record>>,
    /// (module, id, link field) to related ids.
    links: HashMap<(String, String, String), BTreeSet<String>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users
            .insert(username.to_string(), format!("{:x}", md5::compute(password)));
        self
    }

    fn find(&self, module: &str, id: &str) -> Option<&Record> {
        self.records
            .get(module)?
            .iter()
            .find(|r| text(r, "id") == id && text(r, "deleted") != "1")
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::new().with_user(DEMO_USER, DEMO_PASSWORD))
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new().route(REST_PATH, post(rest)).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub fn fault(number: u32, name: &str, description: &str) -> Value {
    json!({"name": name, "number": number, "description": description})
}

/// Values are stored the way the server stores them: as text.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

fn text(record: &Record, field: &str) -> String {
    record.get(field).map(value_text).unwrap_or_default()
}

/// Accept both `[{name, value}]` and `{field: {name, value}}`.
fn decode_name_value_list(value: &Value) -> Record {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };
    let mut record = Record::new();
    for entry in entries {
        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            let value = entry.get("value").map(value_text).unwrap_or_default();
            record.insert(name.to_string(), Value::String(value));
        }
    }
    record
}

fn encode_name_value_list(record: &Record, select: &[String]) -> Value {
    let mut out = Map::new();
    for (name, value) in record {
        if name == "deleted" || (!select.is_empty() && name != "id" && !select.contains(name)) {
            continue;
        }
        out.insert(name.clone(), json!({"name": name, "value": value}));
    }
    Value::Object(out)
}

fn entry(module: &str, record: &Record, select: &[String]) -> Value {
    json!({
        "id": text(record, "id"),
        "module_name": module,
        "name_value_list": encode_name_value_list(record, select),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn number(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn rest(State(db): State<Db>, Form(form): Form<HashMap<String, String>>) -> Response {
    let Some(method) = form.get("method") else {
        return (StatusCode::BAD_REQUEST, "missing method").into_response();
    };
    for key in ["input_type", "response_type"] {
        if form.get(key).map(String::as_str) != Some("JSON") {
            return (StatusCode::BAD_REQUEST, format!("{key} must be JSON")).into_response();
        }
    }
    let data: Value = match form.get("rest_data").map(|raw| serde_json::from_str::<Value>(raw)) {
        Some(Ok(data)) => data,
        _ => return (StatusCode::BAD_REQUEST, "rest_data is not JSON").into_response(),
    };
    tracing::debug!(method = %method, "rest call");

    let reply = match method.as_str() {
        "login" => login(&db, &data).await,
        "logout" => logout(&db, &data).await,
        other => {
            let mut store = db.write().await;
            let session = data.get("session").and_then(Value::as_str).unwrap_or_default();
            if !store.sessions.contains(session) {
                fault(INVALID_SESSION, "Invalid Session ID", "The session ID is invalid")
            } else {
                let module = data.get("module_name").and_then(Value::as_str).unwrap_or_default();
                if !MODULES.contains(&module) {
                    fault(MODULE_NOT_FOUND, "Module Does Not Exist", "This module is not available on this server")
                } else {
                    match other {
                        "set_entry" => set_entry(&mut store, module, &data),
                        "get_entry" => get_entry(&store, module, &data),
                        "get_entry_list" => get_entry_list(&store, module, &data),
                        "get_entries_count" => get_entries_count(&store, module, &data),
                        "set_relationship" => set_relationship(&mut store, module, &data),
                        _ => fault(UNKNOWN_METHOD, "Unknown Method", other),
                    }
                }
            }
        }
    };
    Json(reply).into_response()
}

async fn login(db: &Db, data: &Value) -> Value {
    let auth = data.get("user_auth");
    let user = auth
        .and_then(|a| a.get("user_name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let password = auth
        .and_then(|a| a.get("password"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let mut store = db.write().await;
    if store.users.get(user) != Some(&password) {
        tracing::debug!(user, "login rejected");
        return fault(INVALID_LOGIN, "Invalid Login", "Login attempt failed please check the username and password");
    }
    let session = Uuid::new_v4().simple().to_string();
    store.sessions.insert(session.clone());
    json!({
        "id": session,
        "module_name": "Users",
        "name_value_list": {
            "user_name": {"name": "user_name", "value": user}
        }
    })
}

async fn logout(db: &Db, data: &Value) -> Value {
    let session = data.get("session").and_then(Value::as_str).unwrap_or_default();
    if db.write().await.sessions.remove(session) {
        Value::Null
    } else {
        fault(INVALID_SESSION, "Invalid Session ID", "The session ID is invalid")
    }
}

fn set_entry(store: &mut Store, module: &str, data: &Value) -> Value {
    let fields = decode_name_value_list(data.get("name_value_list").unwrap_or(&Value::Null));
    let requested = text(&fields, "id");
    let records = store.records.entry(module.to_string()).or_default();
    let existing = records
        .iter_mut()
        .find(|r| !requested.is_empty() && text(r, "id") == requested && text(r, "deleted") != "1");
    let record = match existing {
        Some(record) => {
            for (name, value) in fields {
                record.insert(name, value);
            }
            record.clone()
        }
        None => {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            for (name, value) in fields {
                if name != "id" {
                    record.insert(name, value);
                }
            }
            record.entry("deleted").or_insert_with(|| Value::String("0".to_string()));
            records.push(record.clone());
            record
        }
    };
    json!({
        "id": text(&record, "id"),
        "entry_list": encode_name_value_list(&record, &[]),
    })
}

fn get_entry(store: &Store, module: &str, data: &Value) -> Value {
    let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
    let select = string_list(data.get("select_fields"));
    let found = match store.find(module, id) {
        Some(record) => entry(module, record, &select),
        None => json!({
            "id": id,
            "module_name": module,
            "name_value_list": [{"name": "warning", "value": MISSING_WARNING}],
        }),
    };
    json!({"entry_list": [found], "relationship_list": []})
}

fn filtered<'s>(store: &'s Store, module: &str, data: &Value) -> Result<Vec<&'s Record>, Value> {
    let raw = data.get("query").and_then(Value::as_str).unwrap_or_default();
    let conditions = query::parse(raw).map_err(|e| fault(INVALID_QUERY, "Invalid Query", &e))?;
    let include_deleted = number(data.get("deleted")).unwrap_or(0) == 1;
    Ok(store
        .records
        .get(module)
        .map(|records| {
            records
                .iter()
                .filter(|r| include_deleted || text(r, "deleted") != "1")
                .filter(|r| query::matches(r, &conditions))
                .collect()
        })
        .unwrap_or_default())
}

fn get_entry_list(store: &Store, module: &str, data: &Value) -> Value {
    let matching = match filtered(store, module, data) {
        Ok(matching) => matching,
        Err(fault) => return fault,
    };
    let offset = number(data.get("offset")).unwrap_or(0);
    let max = number(data.get("max_results")).filter(|n| *n > 0).unwrap_or(20);
    let select = string_list(data.get("select_fields"));
    let page: Vec<Value> = matching
        .iter()
        .skip(offset)
        .take(max)
        .map(|r| entry(module, r, &select))
        .collect();
    json!({
        "result_count": page.len(),
        "total_count": matching.len().to_string(),
        "next_offset": offset + page.len(),
        "entry_list": page,
        "relationship_list": [],
    })
}

fn get_entries_count(store: &Store, module: &str, data: &Value) -> Value {
    match filtered(store, module, data) {
        Ok(matching) => json!({"result_count": matching.len().to_string()}),
        Err(fault) => fault,
    }
}

fn set_relationship(store: &mut Store, module: &str, data: &Value) -> Value {
    let id = data.get("module_id").and_then(Value::as_str).unwrap_or_default();
    let link = data.get("link_field_name").and_then(Value::as_str).unwrap_or_default();
    let related = string_list(data.get("related_ids"));
    let remove = number(data.get("delete")).unwrap_or(0) == 1;
    if store.find(module, id).is_none() || link.is_empty() {
        return json!({"created": 0, "failed": related.len(), "deleted": 0});
    }
    let linked = store
        .links
        .entry((module.to_string(), id.to_string(), link.to_string()))
        .or_default();
    let mut changed = 0;
    for rid in &related {
        if remove {
            changed += usize::from(linked.remove(rid));
        } else {
            changed += usize::from(linked.insert(rid.clone()));
        }
    }
    if remove {
        json!({"created": 0, "failed": 0, "deleted": changed})
    } else {
        json!({"created": changed, "failed": related.len() - changed, "deleted": 0})
    }
}
