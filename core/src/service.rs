//! Generic per-module CRUD service with declarative validation.
//!
//! # Design
//! There is one service type for every module. What differs between modules
//! lives in a `ModuleSpec`: required fields, rule map, relationship fields,
//! default values, statistics fields and three optional hooks (business rules,
//! pre-write shaping, post-read shaping). `Module::spec` supplies the built-in
//! table; callers may build their own.
//!
//! Writes run the full pipeline before any request: required fields (create
//! only), field rules, relationship existence, business rules, then the
//! prepare hook. A failing stage raises `CrmError::Validation` with every
//! message of that stage, and nothing is sent.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CrmError, Result};
use crate::modules::Module;
use crate::query::Criteria;
use crate::session::SessionClient;
use crate::transport::{Transport, UreqTransport};
use crate::types::{is_blank, value_to_text, Record, RelationshipResult, ID_FIELD};
use crate::validation::{check_required, validate_fields, Rule, RuleSet};

/// Page size used when a service walks every page of a search.
pub const PAGE_SIZE: usize = 100;

/// Which write a hook is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// Cross-field checks; returns violation messages.
pub type BusinessRule = fn(&Record, WriteKind) -> Vec<String>;

/// In-place reshaping of a record.
pub type Shaper = fn(&mut Record);

/// A field that must name an existing record in another module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// `field` holds an id in `module`.
    Fixed { field: &'static str, module: Module },
    /// `id_field` holds an id in the module named by `type_field`.
    Parent {
        type_field: &'static str,
        id_field: &'static str,
    },
}

/// Declarative description of one module.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub module: Module,
    pub required: Vec<&'static str>,
    pub rules: RuleSet,
    pub relationships: Vec<Relationship>,
    pub defaults: Vec<(&'static str, Value)>,
    pub statistics: Vec<&'static str>,
    pub business_rules: Option<BusinessRule>,
    pub prepare: Option<Shaper>,
    pub format: Option<Shaper>,
}

impl ModuleSpec {
    pub fn new(module: Module) -> Self {
        Self {
            module,
            required: Vec::new(),
            rules: Vec::new(),
            relationships: Vec::new(),
            defaults: Vec::new(),
            statistics: Vec::new(),
            business_rules: None,
            prepare: None,
            format: None,
        }
    }

    pub fn required(mut self, fields: &[&'static str]) -> Self {
        self.required.extend_from_slice(fields);
        self
    }

    pub fn rule(mut self, field: &'static str, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.push((field, rules.into_iter().collect()));
        self
    }

    pub fn references(mut self, field: &'static str, module: Module) -> Self {
        self.relationships.push(Relationship::Fixed { field, module });
        self
    }

    pub fn parent(mut self, type_field: &'static str, id_field: &'static str) -> Self {
        self.relationships
            .push(Relationship::Parent { type_field, id_field });
        self
    }

    pub fn default_value(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.defaults.push((field, value.into()));
        self
    }

    pub fn statistics(mut self, fields: &[&'static str]) -> Self {
        self.statistics.extend_from_slice(fields);
        self
    }

    pub fn business_rules(mut self, hook: BusinessRule) -> Self {
        self.business_rules = Some(hook);
        self
    }

    pub fn prepare(mut self, hook: Shaper) -> Self {
        self.prepare = Some(hook);
        self
    }

    pub fn format(mut self, hook: Shaper) -> Self {
        self.format = Some(hook);
        self
    }
}

/// Record counts for a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleStatistics {
    pub total: usize,
    /// Field name to (value to count).
    pub by_field: BTreeMap<String, BTreeMap<String, usize>>,
}

/// CRUD and validation for one module, over a borrowed session client.
pub struct ModuleService<'c, T: Transport = UreqTransport> {
    client: &'c SessionClient<T>,
    spec: ModuleSpec,
}

impl<'c, T: Transport> ModuleService<'c, T> {
    pub fn new(client: &'c SessionClient<T>, spec: ModuleSpec) -> Self {
        Self { client, spec }
    }

    /// Service configured with the built-in table for `module`.
    pub fn for_module(client: &'c SessionClient<T>, module: Module) -> Self {
        Self::new(client, module.spec())
    }

    pub fn module(&self) -> Module {
        self.spec.module
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn client(&self) -> &'c SessionClient<T> {
        self.client
    }

    /// Validate, shape and create. Returns the new record's id.
    pub fn create(&self, fields: &Record) -> Result<String> {
        let mut record = fields.clone();
        self.apply_defaults(&mut record);
        self.validate(&record, WriteKind::Create)?;
        if let Some(prepare) = self.spec.prepare {
            prepare(&mut record);
        }
        self.client.create_record(self.module().as_str(), &record)
    }

    /// Validate, shape and update; absent fields are left untouched.
    ///
    /// An update the server does not acknowledge for `id` is an error here,
    /// unlike `SessionClient::update_record`.
    pub fn update(&self, id: &str, fields: &Record) -> Result<()> {
        if id.trim().is_empty() {
            return Err(CrmError::validation("Field 'id' is required for update"));
        }
        let mut record = fields.clone();
        self.validate(&record, WriteKind::Update)?;
        if let Some(prepare) = self.spec.prepare {
            prepare(&mut record);
        }
        if self.client.update_record(self.module().as_str(), id, &record)? {
            Ok(())
        } else {
            Err(CrmError::protocol(
                format!("{} update of {id} was not acknowledged", self.module()),
                None,
            ))
        }
    }

    pub fn find_by_id(&self, id: &str, fields: &[&str]) -> Result<Option<Record>> {
        let found = self.client.get_record(self.module().as_str(), id, fields)?;
        Ok(found.map(|record| self.shape_output(record)))
    }

    pub fn search(&self, criteria: &Criteria, fields: &[&str], limit: usize, offset: usize) -> Result<Vec<Record>> {
        let records = self
            .client
            .search_records(self.module().as_str(), criteria, fields, limit, offset)?;
        Ok(records.into_iter().map(|r| self.shape_output(r)).collect())
    }

    /// Walk every page of a search.
    pub fn search_all(&self, criteria: &Criteria, fields: &[&str]) -> Result<Vec<Record>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .client
                .search_page(self.module().as_str(), criteria, fields, PAGE_SIZE, offset)?;
            let fetched = page.records.len();
            all.extend(page.records.into_iter().map(|r| self.shape_output(r)));
            if fetched < PAGE_SIZE || page.next_offset <= offset {
                break;
            }
            offset = page.next_offset;
        }
        Ok(all)
    }

    pub fn count(&self, criteria: &Criteria) -> Result<usize> {
        self.client.count_records(self.module().as_str(), criteria)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.client.delete_record(self.module().as_str(), id)
    }

    pub fn link(&self, id: &str, link_field: &str, related_ids: &[&str]) -> Result<RelationshipResult> {
        self.client
            .set_relationship(self.module().as_str(), id, link_field, related_ids, false)
    }

    pub fn unlink(&self, id: &str, link_field: &str, related_ids: &[&str]) -> Result<RelationshipResult> {
        self.client
            .set_relationship(self.module().as_str(), id, link_field, related_ids, true)
    }

    /// Count matching records grouped by the value of `field`.
    pub fn count_by(&self, field: &str, criteria: &Criteria) -> Result<BTreeMap<String, usize>> {
        let records = self.search_all(criteria, &[ID_FIELD, field])?;
        let mut counts = BTreeMap::new();
        for record in &records {
            let key = record.get(field).map(value_to_text).unwrap_or_default();
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Total plus per-value counts for each configured statistics field.
    pub fn statistics(&self) -> Result<ModuleStatistics> {
        let total = self.count(&Criteria::new())?;
        let mut by_field: BTreeMap<String, BTreeMap<String, usize>> = self
            .spec
            .statistics
            .iter()
            .map(|f| (f.to_string(), BTreeMap::new()))
            .collect();
        if !by_field.is_empty() {
            let mut select = vec![ID_FIELD];
            select.extend(self.spec.statistics.iter().copied());
            for record in self.search_all(&Criteria::new(), &select)? {
                for (field, counts) in by_field.iter_mut() {
                    let key = record.get(field).map(value_to_text).unwrap_or_default();
                    *counts.entry(key).or_insert(0) += 1;
                }
            }
        }
        Ok(ModuleStatistics { total, by_field })
    }

    /// Run every validation stage that does not write.
    pub fn validate(&self, fields: &Record, kind: WriteKind) -> Result<()> {
        let mut errors = Vec::new();
        if kind == WriteKind::Create {
            errors.extend(check_required(fields, &self.spec.required));
        }
        errors.extend(validate_fields(fields, &self.spec.rules));
        if !errors.is_empty() {
            return Err(CrmError::Validation { errors });
        }

        let errors = self.check_relationships(fields, kind)?;
        if !errors.is_empty() {
            return Err(CrmError::Validation { errors });
        }

        if let Some(rules) = self.spec.business_rules {
            let errors = rules(fields, kind);
            if !errors.is_empty() {
                return Err(CrmError::Validation { errors });
            }
        }
        Ok(())
    }

    fn apply_defaults(&self, record: &mut Record) {
        for (field, value) in &self.spec.defaults {
            if record.get(*field).map_or(true, is_blank) {
                record.insert(field.to_string(), value.clone());
            }
        }
    }

    fn shape_output(&self, mut record: Record) -> Record {
        if let Some(format) = self.spec.format {
            format(&mut record);
        }
        record
    }

    /// Verify referenced records exist.
    ///
    /// Missing sessions propagate as `Authentication`; any other failure of
    /// the lookup is reported as a violation of the field. A partial update
    /// that moves a parent id without its type cannot be resolved here and is
    /// left to the server.
    fn check_relationships(&self, fields: &Record, kind: WriteKind) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        for relationship in &self.spec.relationships {
            let (field, target) = match *relationship {
                Relationship::Fixed { field, module } => (field, module),
                Relationship::Parent { type_field, id_field } => {
                    if fields.get(id_field).map_or(true, is_blank) {
                        continue;
                    }
                    if kind == WriteKind::Update && !fields.contains_key(type_field) {
                        continue;
                    }
                    let type_name = fields.get(type_field).map(value_to_text).unwrap_or_default();
                    match Module::from_name(&type_name) {
                        Some(module) => (id_field, module),
                        None => {
                            errors.push(format!("Field '{type_field}' must name a known module, got '{type_name}'"));
                            continue;
                        }
                    }
                }
            };
            let Some(value) = fields.get(field).filter(|v| !is_blank(v)) else {
                continue;
            };
            let id = value_to_text(value);
            match self.client.get_record(target.as_str(), &id, &[ID_FIELD]) {
                Ok(Some(_)) => {}
                Ok(None) | Err(CrmError::RecordNotFound { .. }) => {
                    errors.push(format!("Field '{field}' references {target} record '{id}' which does not exist"));
                }
                Err(e @ CrmError::Authentication { .. }) => return Err(e),
                Err(e) => {
                    errors.push(format!("Field '{field}' could not be verified against {target}: {e}"));
                }
            }
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrmConfig;
    use crate::transport::MockTransport;
    use crate::types::record;
    use serde_json::json;

    fn client() -> SessionClient<MockTransport> {
        let config = CrmConfig::new("http://crm.test", "admin", "secret").unwrap();
        let mut client = SessionClient::with_transport(config, MockTransport::new());
        client.transport().push_json(json!({"id": "sess"}));
        client.connect().unwrap();
        client
    }

    fn no_negative_amount(fields: &Record, _: WriteKind) -> Vec<String> {
        match fields.get("amount").and_then(crate::validation::parse_number) {
            Some(n) if n < 0.0 => vec!["amount must not be negative".to_string()],
            _ => Vec::new(),
        }
    }

    fn upper_name(record: &mut Record) {
        if let Some(Value::String(name)) = record.get_mut("name") {
            *name = name.to_uppercase();
        }
    }

    fn spec() -> ModuleSpec {
        ModuleSpec::new(Module::Opportunities)
            .required(&["name", "amount"])
            .rule("name", [Rule::MaxLength(10)])
            .references("account_id", Module::Accounts)
            .default_value("sales_stage", "Prospecting")
            .business_rules(no_negative_amount)
            .prepare(upper_name)
    }

    #[test]
    fn missing_required_field_sends_nothing() {
        let client = client();
        let service = ModuleService::new(&client, spec());
        let err = service.create(&record([("name", "Deal")])).unwrap_err();
        assert!(err.validation_errors()[0].contains("amount"));
        assert_eq!(client.transport().call_count(), 1);
    }

    #[test]
    fn defaults_and_prepare_apply_on_create() {
        let client = client();
        client.transport().push_json(json!({"id": "opp-1"}));
        let service = ModuleService::new(&client, spec());
        let id = service.create(&record([("name", "deal"), ("amount", "10")])).unwrap();
        assert_eq!(id, "opp-1");
        let payload = client.transport().sent_payloads().pop().unwrap();
        assert_eq!(
            payload["name_value_list"],
            json!([
                {"name": "name", "value": "DEAL"},
                {"name": "amount", "value": "10"},
                {"name": "sales_stage", "value": "Prospecting"}
            ])
        );
    }

    #[test]
    fn business_rule_runs_before_network() {
        let client = client();
        let service = ModuleService::new(&client, spec());
        let err = service.update("opp-1", &record([("amount", json!(-5))])).unwrap_err();
        assert_eq!(err.validation_errors(), ["amount must not be negative"]);
        assert_eq!(client.transport().call_count(), 1);
    }

    #[test]
    fn missing_reference_names_field_and_id() {
        let client = client();
        client.transport().push_json(json!({"entry_list": []}));
        let service = ModuleService::new(&client, spec());
        let err = service
            .create(&record([("name", "Deal"), ("amount", "1"), ("account_id", "acc-404")]))
            .unwrap_err();
        let message = &err.validation_errors()[0];
        assert!(message.contains("account_id") && message.contains("acc-404"));
    }

    #[test]
    fn reference_lookup_failure_becomes_validation_error() {
        let client = client();
        client.transport().push_json(json!({"name": "Access Denied", "number": 40, "description": ""}));
        let service = ModuleService::new(&client, spec());
        let err = service
            .create(&record([("name", "Deal"), ("amount", "1"), ("account_id", "acc-1")]))
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation { .. }));
        assert!(err.validation_errors()[0].contains("Access Denied"));
    }

    #[test]
    fn unacknowledged_update_is_an_error() {
        let client = client();
        client.transport().push_json(json!({"id": "other"}));
        let service = ModuleService::new(&client, spec());
        let err = service.update("opp-1", &record([("name", "x")])).unwrap_err();
        assert!(matches!(err, CrmError::Protocol { .. }));
    }

    #[test]
    fn parent_relationship_checks_named_module() {
        let client = client();
        client.transport().push_json(json!({"entry_list": [{"id": "a1", "name_value_list": {}}]}));
        let spec = ModuleSpec::new(Module::Notes).parent("parent_type", "parent_id");
        let service = ModuleService::new(&client, spec);
        service
            .validate(&record([("parent_type", "Accounts"), ("parent_id", "a1")]), WriteKind::Create)
            .unwrap();
        let payload = client.transport().sent_payloads().pop().unwrap();
        assert_eq!(payload["module_name"], "Accounts");

        let err = service
            .validate(&record([("parent_type", "Nope"), ("parent_id", "a1")]), WriteKind::Create)
            .unwrap_err();
        assert!(err.validation_errors()[0].contains("parent_type"));
    }

    #[test]
    fn partial_update_of_parent_id_alone_skips_type_lookup() {
        let client = client();
        let spec = ModuleSpec::new(Module::Notes).parent("parent_type", "parent_id");
        let service = ModuleService::new(&client, spec);
        service
            .validate(&record([("parent_id", "a1")]), WriteKind::Update)
            .unwrap();
        assert_eq!(client.transport().call_count(), 1);

        let err = service
            .validate(&record([("parent_id", "a1")]), WriteKind::Create)
            .unwrap_err();
        assert!(err.validation_errors()[0].contains("parent_type"));
    }

    #[test]
    fn count_by_groups_values() {
        let client = client();
        client.transport().push_json(json!({
            "result_count": 3,
            "next_offset": 3,
            "entry_list": [
                {"id": "1", "name_value_list": {"status": {"name": "status", "value": "New"}}},
                {"id": "2", "name_value_list": {"status": {"name": "status", "value": "New"}}},
                {"id": "3", "name_value_list": {"status": {"name": "status", "value": "Closed"}}}
            ]
        }));
        let service = ModuleService::for_module(&client, Module::Cases);
        let counts = service.count_by("status", &Criteria::new()).unwrap();
        assert_eq!(counts.get("New"), Some(&2));
        assert_eq!(counts.get("Closed"), Some(&1));
    }
}
