//! Authenticated channel to the CRM.
//!
//! # Design
//! `SessionClient` owns the configuration, a `Transport`, and the session
//! token. It is `Unauthenticated` until `login` succeeds and returns to
//! `Unauthenticated` on `logout` or a failed login. Every data primitive
//! checks for a session before building a request, so no network call is made
//! without one.
//!
//! All calls funnel through `dispatch`, which executes the request and
//! decodes the body; interpreting the decoded reply is left to the primitive.

use serde_json::Value;

use crate::config::CrmConfig;
use crate::error::{CrmError, Result};
use crate::protocol::{self, RestProtocol, SearchRequest};
use crate::query::Criteria;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Record, RelationshipResult, SearchPage, ID_FIELD};

/// Client bound to one CRM instance and at most one session.
pub struct SessionClient<T: Transport = UreqTransport> {
    config: CrmConfig,
    protocol: RestProtocol,
    transport: T,
    session: Option<String>,
}

impl SessionClient<UreqTransport> {
    /// Create an unauthenticated client using the blocking HTTP transport.
    pub fn new(config: CrmConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(config: CrmConfig, transport: T) -> Self {
        let protocol = RestProtocol::new(&config.endpoint());
        Self {
            config,
            protocol,
            transport,
            session: None,
        }
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Log in with the configured credentials.
    pub fn connect(&mut self) -> Result<()> {
        let username = self.config.username().to_string();
        let password = self.config.password().to_string();
        self.login(&username, &password)
    }

    /// Authenticate and store the returned session.
    ///
    /// Any failure leaves the client unauthenticated. There is no retry.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.session = None;
        let request = self
            .protocol
            .build_login(username, password, self.config.application_name());
        let reply = self.dispatch(protocol::method::LOGIN, None, request).map_err(|e| match e {
            auth @ CrmError::Authentication { .. } => auth,
            other => CrmError::authentication(format!("login failed: {other}"), other.response().map(str::to_string)),
        })?;
        let session = protocol::parse_login(&reply)?;
        tracing::debug!(user = username, "logged in");
        self.session = Some(session);
        Ok(())
    }

    /// End the session. Idempotent and best-effort: never fails, and the
    /// client is unauthenticated afterwards whatever the server says.
    pub fn logout(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let request = self.protocol.build_logout(&session);
        if let Err(e) = self.dispatch(protocol::method::LOGOUT, None, request) {
            tracing::warn!(error = %e, "logout was not acknowledged by the server");
        }
    }

    /// Forget the session without contacting the server.
    pub fn clear_session(&mut self) {
        self.session = None;
    }

    /// Create a record and return its new identifier.
    pub fn create_record(&self, module: &str, fields: &Record) -> Result<String> {
        let session = self.require_session()?;
        let request = self.protocol.build_set_entry(session, module, fields);
        let reply = protocol::reject_fault(self.dispatch(protocol::method::SET_ENTRY, Some(module), request)?)?;
        let id = protocol::parse_set_entry(&reply)
            .ok_or_else(|| CrmError::protocol(format!("{module} create returned no id"), Some(reply.to_string())))?;
        if let Some(requested) = fields.get(ID_FIELD).and_then(Value::as_str) {
            if !requested.is_empty() && requested != id {
                return Err(CrmError::protocol(
                    format!("{module} create echoed id {id}, expected {requested}"),
                    Some(reply.to_string()),
                ));
            }
        }
        Ok(id)
    }

    /// Update fields of an existing record.
    ///
    /// Returns `false` when the server does not echo the identifier that was
    /// sent, which indicates the write landed elsewhere or nowhere.
    pub fn update_record(&self, module: &str, id: &str, fields: &Record) -> Result<bool> {
        let session = self.require_session()?;
        let mut payload = Record::new();
        payload.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        for (name, value) in fields {
            if name != ID_FIELD {
                payload.insert(name.clone(), value.clone());
            }
        }
        let request = self.protocol.build_set_entry(session, module, &payload);
        let reply = protocol::reject_fault(self.dispatch(protocol::method::SET_ENTRY, Some(module), request)?)?;
        match protocol::parse_set_entry(&reply) {
            Some(echoed) if echoed == id => Ok(true),
            echoed => {
                tracing::warn!(module, id, echoed = echoed.as_deref().unwrap_or(""), "update echoed a different id");
                Ok(false)
            }
        }
    }

    /// Fetch one record. `None` when the reply carries no result list.
    pub fn get_record(&self, module: &str, id: &str, fields: &[&str]) -> Result<Option<Record>> {
        let session = self.require_session()?;
        let request = self.protocol.build_get_entry(session, module, id, fields);
        let reply = self.dispatch(protocol::method::GET_ENTRY, Some(module), request)?;
        protocol::parse_get_entry(&reply, module, id)
    }

    /// Search one page; never returns `None`, an empty result is an empty vec.
    pub fn search_records(
        &self,
        module: &str,
        criteria: &Criteria,
        fields: &[&str],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>> {
        Ok(self.search_page(module, criteria, fields, limit, offset)?.records)
    }

    /// Like `search_records`, also reporting the server's paging counters.
    pub fn search_page(
        &self,
        module: &str,
        criteria: &Criteria,
        fields: &[&str],
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage> {
        let session = self.require_session()?;
        let query = criteria.to_query()?;
        let search = SearchRequest {
            module,
            query: &query,
            order_by: "",
            offset,
            select_fields: fields,
            max_results: limit,
            include_deleted: false,
        };
        let request = self.protocol.build_get_entry_list(session, &search);
        let reply = self.dispatch(protocol::method::GET_ENTRY_LIST, Some(module), request)?;
        protocol::parse_search(&reply)
    }

    pub fn count_records(&self, module: &str, criteria: &Criteria) -> Result<usize> {
        let session = self.require_session()?;
        let query = criteria.to_query()?;
        let request = self.protocol.build_get_entries_count(session, module, &query);
        let reply = self.dispatch(protocol::method::GET_ENTRIES_COUNT, Some(module), request)?;
        protocol::parse_count(&reply)
    }

    /// Soft-delete: the record is flagged deleted, not erased.
    pub fn delete_record(&self, module: &str, id: &str) -> Result<bool> {
        let session = self.require_session()?;
        let mut payload = Record::new();
        payload.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        payload.insert("deleted".to_string(), Value::from(1));
        let request = self.protocol.build_set_entry(session, module, &payload);
        let reply = protocol::reject_fault(self.dispatch(protocol::method::SET_ENTRY, Some(module), request)?)?;
        Ok(protocol::parse_set_entry(&reply).as_deref() == Some(id))
    }

    /// Link (or with `remove`, unlink) related records through a link field.
    pub fn set_relationship(
        &self,
        module: &str,
        id: &str,
        link_field: &str,
        related_ids: &[&str],
        remove: bool,
    ) -> Result<RelationshipResult> {
        let session = self.require_session()?;
        let request = self
            .protocol
            .build_set_relationship(session, module, id, link_field, related_ids, remove);
        let reply = self.dispatch(protocol::method::SET_RELATIONSHIP, Some(module), request)?;
        protocol::parse_relationship(&reply)
    }

    fn require_session(&self) -> Result<&str> {
        self.session.as_deref().ok_or_else(CrmError::not_authenticated)
    }

    /// Execute one request and decode its body.
    fn dispatch(&self, method: &str, module: Option<&str>, request: crate::http::HttpRequest) -> Result<Value> {
        tracing::debug!(method, module = module.unwrap_or(""), "crm request");
        let response = self.transport.execute(&request)?;
        if self.config.debug() {
            // The login reply carries the session token.
            let body = if method == protocol::method::LOGIN { "<redacted>" } else { response.body.as_str() };
            tracing::debug!(method, status = response.status, body = %body, "crm response");
        }
        protocol::decode(response)
    }
}

impl<T: Transport> std::fmt::Debug for SessionClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("endpoint", &self.protocol.endpoint())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
