//! Built-in module table.
//!
//! Each CRM module is a `Module` tag plus the `ModuleSpec` returned by
//! `Module::spec`. The specs are data; the only code here is the handful of
//! business-rule and shaping hooks they point at.

use std::fmt;

use crate::format::{add_full_name, check_order, lowercase_fields, normalize_dates, normalize_datetimes, trim_strings};
use crate::service::{ModuleSpec, WriteKind};
use crate::types::{is_blank, value_to_text, Record};
use crate::validation::{parse_number, Rule};

/// A record type on the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Module {
    Accounts,
    Contacts,
    Leads,
    Opportunities,
    Cases,
    Bugs,
    Calls,
    Meetings,
    Tasks,
    Notes,
    Emails,
    Documents,
    Campaigns,
    Prospects,
    ProspectLists,
    Projects,
    ProjectTasks,
    Users,
    Employees,
    Quotes,
    Invoices,
    Products,
    ProductCategories,
    Contracts,
    KnowledgeBase,
}

impl Module {
    pub const ALL: [Module; 25] = [
        Module::Accounts,
        Module::Contacts,
        Module::Leads,
        Module::Opportunities,
        Module::Cases,
        Module::Bugs,
        Module::Calls,
        Module::Meetings,
        Module::Tasks,
        Module::Notes,
        Module::Emails,
        Module::Documents,
        Module::Campaigns,
        Module::Prospects,
        Module::ProspectLists,
        Module::Projects,
        Module::ProjectTasks,
        Module::Users,
        Module::Employees,
        Module::Quotes,
        Module::Invoices,
        Module::Products,
        Module::ProductCategories,
        Module::Contracts,
        Module::KnowledgeBase,
    ];

    /// Name the server uses for the module.
    pub fn as_str(self) -> &'static str {
        match self {
            Module::Accounts => "Accounts",
            Module::Contacts => "Contacts",
            Module::Leads => "Leads",
            Module::Opportunities => "Opportunities",
            Module::Cases => "Cases",
            Module::Bugs => "Bugs",
            Module::Calls => "Calls",
            Module::Meetings => "Meetings",
            Module::Tasks => "Tasks",
            Module::Notes => "Notes",
            Module::Emails => "Emails",
            Module::Documents => "Documents",
            Module::Campaigns => "Campaigns",
            Module::Prospects => "Prospects",
            Module::ProspectLists => "ProspectLists",
            Module::Projects => "Project",
            Module::ProjectTasks => "ProjectTask",
            Module::Users => "Users",
            Module::Employees => "Employees",
            Module::Quotes => "AOS_Quotes",
            Module::Invoices => "AOS_Invoices",
            Module::Products => "AOS_Products",
            Module::ProductCategories => "AOS_Product_Categories",
            Module::Contracts => "AOS_Contracts",
            Module::KnowledgeBase => "AOK_KnowledgeBase",
        }
    }

    /// Look up a module by its server name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Module> {
        let name = name.trim();
        Module::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// The declarative configuration of this module.
    pub fn spec(self) -> ModuleSpec {
        let spec = ModuleSpec::new(self);
        match self {
            Module::Accounts => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(150)])
                .rule("email1", [Rule::Email])
                .rule("phone_office", [Rule::Phone])
                .rule("phone_fax", [Rule::Phone])
                .rule("website", [Rule::MaxLength(255)])
                .rule("account_type", [Rule::In(ACCOUNT_TYPES)])
                .rule("annual_revenue", [Rule::MaxLength(100)])
                .references("parent_id", Module::Accounts)
                .references("assigned_user_id", Module::Users)
                .statistics(&["account_type", "industry"])
                .prepare(prepare_contactable),
            Module::Contacts => spec
                .required(&["last_name"])
                .rule("first_name", [Rule::MaxLength(100)])
                .rule("last_name", [Rule::MaxLength(100)])
                .rule("email1", [Rule::Email])
                .rule("phone_work", [Rule::Phone])
                .rule("phone_mobile", [Rule::Phone])
                .rule("birthdate", [Rule::Date])
                .rule("lead_source", [Rule::In(LEAD_SOURCES)])
                .references("account_id", Module::Accounts)
                .references("reports_to_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .statistics(&["lead_source"])
                .prepare(prepare_contactable)
                .format(add_full_name),
            Module::Leads => spec
                .required(&["last_name"])
                .rule("first_name", [Rule::MaxLength(100)])
                .rule("last_name", [Rule::MaxLength(100)])
                .rule("email1", [Rule::Email])
                .rule("phone_work", [Rule::Phone])
                .rule("phone_mobile", [Rule::Phone])
                .rule("status", [Rule::In(LEAD_STATUSES)])
                .rule("lead_source", [Rule::In(LEAD_SOURCES)])
                .references("account_id", Module::Accounts)
                .references("contact_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .default_value("status", "New")
                .statistics(&["status", "lead_source"])
                .business_rules(lead_rules)
                .prepare(prepare_contactable)
                .format(add_full_name),
            Module::Opportunities => spec
                .required(&["name", "amount", "sales_stage", "date_closed"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("amount", [Rule::Numeric, Rule::Min(0.0)])
                .rule("probability", [Rule::Min(0.0), Rule::Max(100.0)])
                .rule("sales_stage", [Rule::In(SALES_STAGES)])
                .rule("date_closed", [Rule::Date])
                .references("account_id", Module::Accounts)
                .references("campaign_id", Module::Campaigns)
                .references("assigned_user_id", Module::Users)
                .default_value("sales_stage", "Prospecting")
                .statistics(&["sales_stage", "lead_source"])
                .prepare(prepare_opportunity),
            Module::Cases => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("priority", [Rule::In(CASE_PRIORITIES)])
                .rule("state", [Rule::In(CASE_STATES)])
                .rule("status", [Rule::In(CASE_STATUSES)])
                .rule("type", [Rule::In(CASE_TYPES)])
                .references("account_id", Module::Accounts)
                .references("contact_created_by_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .default_value("state", "Open")
                .default_value("status", "Open_New")
                .default_value("priority", "P2")
                .statistics(&["status", "priority", "type"])
                .business_rules(case_rules)
                .prepare(trim_strings),
            Module::Bugs => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("priority", [Rule::In(BUG_PRIORITIES)])
                .rule("status", [Rule::In(BUG_STATUSES)])
                .rule("type", [Rule::In(&["Defect", "Feature"])])
                .references("assigned_user_id", Module::Users)
                .default_value("status", "New")
                .default_value("type", "Defect")
                .statistics(&["status", "priority"])
                .prepare(trim_strings),
            Module::Calls => spec
                .required(&["name", "date_start"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("date_start", [Rule::DateTime])
                .rule("date_end", [Rule::DateTime])
                .rule("duration_hours", [Rule::Min(0.0)])
                .rule("duration_minutes", [Rule::Min(0.0), Rule::Max(59.0)])
                .rule("direction", [Rule::In(&["Inbound", "Outbound"])])
                .rule("status", [Rule::In(&["Planned", "Held", "Not Held"])])
                .parent("parent_type", "parent_id")
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Planned")
                .default_value("direction", "Outbound")
                .statistics(&["status", "direction"])
                .business_rules(activity_rules)
                .prepare(prepare_activity),
            Module::Meetings => spec
                .required(&["name", "date_start"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("date_start", [Rule::DateTime])
                .rule("date_end", [Rule::DateTime])
                .rule("duration_hours", [Rule::Min(0.0)])
                .rule("duration_minutes", [Rule::Min(0.0), Rule::Max(59.0)])
                .rule("status", [Rule::In(&["Planned", "Held", "Not Held"])])
                .rule("location", [Rule::MaxLength(50)])
                .parent("parent_type", "parent_id")
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Planned")
                .statistics(&["status"])
                .business_rules(activity_rules)
                .prepare(prepare_activity),
            Module::Tasks => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("date_start", [Rule::DateTime])
                .rule("date_due", [Rule::DateTime])
                .rule("priority", [Rule::In(&["High", "Medium", "Low"])])
                .rule("status", [Rule::In(TASK_STATUSES)])
                .parent("parent_type", "parent_id")
                .references("contact_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Not Started")
                .default_value("priority", "Medium")
                .statistics(&["status", "priority"])
                .business_rules(task_rules)
                .prepare(prepare_task),
            Module::Notes => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .parent("parent_type", "parent_id")
                .references("contact_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .prepare(trim_strings),
            Module::Emails => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("from_addr", [Rule::Email])
                .rule("status", [Rule::In(&["archived", "draft", "sent", "read", "unread", "replied"])])
                .rule("type", [Rule::In(&["archived", "draft", "inbound", "out"])])
                .parent("parent_type", "parent_id")
                .references("assigned_user_id", Module::Users)
                .default_value("type", "archived")
                .default_value("status", "archived")
                .statistics(&["status", "type"])
                .prepare(prepare_email),
            Module::Documents => spec
                .required(&["document_name"])
                .rule("document_name", [Rule::MaxLength(255)])
                .rule("status_id", [Rule::In(&["Active", "Draft", "FAQ", "Expired", "Under Review", "Pending"])])
                .rule("active_date", [Rule::Date])
                .rule("exp_date", [Rule::Date])
                .references("assigned_user_id", Module::Users)
                .default_value("status_id", "Active")
                .statistics(&["status_id", "category_id"])
                .business_rules(document_rules),
            Module::Campaigns => spec
                .required(&["name", "status", "campaign_type"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("status", [Rule::In(CAMPAIGN_STATUSES)])
                .rule("campaign_type", [Rule::In(CAMPAIGN_TYPES)])
                .rule("start_date", [Rule::Date])
                .rule("end_date", [Rule::Date])
                .rule("budget", [Rule::Min(0.0)])
                .rule("expected_cost", [Rule::Min(0.0)])
                .rule("actual_cost", [Rule::Min(0.0)])
                .rule("expected_revenue", [Rule::Min(0.0)])
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Planning")
                .statistics(&["status", "campaign_type"])
                .business_rules(campaign_rules),
            Module::Prospects => spec
                .required(&["last_name"])
                .rule("first_name", [Rule::MaxLength(100)])
                .rule("last_name", [Rule::MaxLength(100)])
                .rule("email1", [Rule::Email])
                .rule("phone_work", [Rule::Phone])
                .references("assigned_user_id", Module::Users)
                .prepare(prepare_contactable)
                .format(add_full_name),
            Module::ProspectLists => spec
                .required(&["name", "list_type"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("list_type", [Rule::In(&["default", "seed", "exempt_domain", "exempt_address", "exempt", "test"])])
                .default_value("list_type", "default")
                .statistics(&["list_type"]),
            Module::Projects => spec
                .required(&["name", "estimated_start_date", "estimated_end_date"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("estimated_start_date", [Rule::Date])
                .rule("estimated_end_date", [Rule::Date])
                .rule("status", [Rule::In(&["Draft", "In Review", "Underway", "On_Hold", "Completed"])])
                .rule("priority", [Rule::In(&["high", "medium", "low"])])
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Draft")
                .default_value("priority", "medium")
                .statistics(&["status", "priority"])
                .business_rules(project_rules)
                .prepare(prepare_project),
            Module::ProjectTasks => spec
                .required(&["name", "project_id"])
                .rule("name", [Rule::MaxLength(50)])
                .rule("date_start", [Rule::Date])
                .rule("date_finish", [Rule::Date])
                .rule("percent_complete", [Rule::Min(0.0), Rule::Max(100.0)])
                .rule("priority", [Rule::In(&["High", "Medium", "Low"])])
                .references("project_id", Module::Projects)
                .references("assigned_user_id", Module::Users)
                .default_value("percent_complete", "0")
                .statistics(&["status", "priority"])
                .business_rules(project_task_rules),
            Module::Users => spec
                .required(&["user_name", "last_name"])
                .rule("user_name", [Rule::MaxLength(60)])
                .rule("email1", [Rule::Email])
                .rule("status", [Rule::In(&["Active", "Inactive"])])
                .references("reports_to_id", Module::Users)
                .default_value("status", "Active")
                .statistics(&["status"])
                .prepare(prepare_contactable)
                .format(add_full_name),
            Module::Employees => spec
                .required(&["last_name"])
                .rule("email1", [Rule::Email])
                .rule("phone_work", [Rule::Phone])
                .rule("employee_status", [Rule::In(&["Active", "Terminated", "Leave of Absence"])])
                .references("reports_to_id", Module::Users)
                .default_value("employee_status", "Active")
                .statistics(&["employee_status", "department"])
                .prepare(prepare_contactable)
                .format(add_full_name),
            Module::Quotes => spec
                .required(&["name", "expiration"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("expiration", [Rule::Date])
                .rule("stage", [Rule::In(QUOTE_STAGES)])
                .rule("total_amount", [Rule::Min(0.0)])
                .rule("subtotal_amount", [Rule::Min(0.0)])
                .rule("discount_amount", [Rule::Min(0.0)])
                .rule("tax_amount", [Rule::Min(0.0)])
                .references("billing_account_id", Module::Accounts)
                .references("billing_contact_id", Module::Contacts)
                .references("opportunity_id", Module::Opportunities)
                .references("assigned_user_id", Module::Users)
                .default_value("stage", "Draft")
                .statistics(&["stage", "approval_status"])
                .prepare(prepare_quote),
            Module::Invoices => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("invoice_date", [Rule::Date])
                .rule("due_date", [Rule::Date])
                .rule("status", [Rule::In(INVOICE_STATUSES)])
                .rule("total_amount", [Rule::Min(0.0)])
                .rule("subtotal_amount", [Rule::Min(0.0)])
                .rule("discount_amount", [Rule::Min(0.0)])
                .rule("tax_amount", [Rule::Min(0.0)])
                .references("billing_account_id", Module::Accounts)
                .references("billing_contact_id", Module::Contacts)
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Unpaid")
                .statistics(&["status"])
                .business_rules(invoice_rules)
                .prepare(prepare_invoice),
            Module::Products => spec
                .required(&["name", "price"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("price", [Rule::Numeric, Rule::Min(0.0)])
                .rule("cost", [Rule::Min(0.0)])
                .rule("type", [Rule::In(&["Good", "Service"])])
                .rule("url", [Rule::MaxLength(255)])
                .references("aos_product_category_id", Module::ProductCategories)
                .default_value("type", "Good")
                .statistics(&["type", "aos_product_category_id"]),
            Module::ProductCategories => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .references("parent_category_id", Module::ProductCategories),
            Module::Contracts => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("start_date", [Rule::Date])
                .rule("end_date", [Rule::Date])
                .rule("renewal_reminder_date", [Rule::DateTime])
                .rule("status", [Rule::In(CONTRACT_STATUSES)])
                .rule("total_contract_value", [Rule::Min(0.0)])
                .references("contract_account_id", Module::Accounts)
                .references("contact_id", Module::Contacts)
                .references("opportunity_id", Module::Opportunities)
                .references("assigned_user_id", Module::Users)
                .default_value("status", "Not Started")
                .statistics(&["status", "contract_type"])
                .business_rules(contract_rules),
            Module::KnowledgeBase => spec
                .required(&["name"])
                .rule("name", [Rule::MaxLength(255)])
                .rule("status", [Rule::In(&["Draft", "Expired", "In_Review", "Published"])])
                .references("author", Module::Users)
                .references("approver", Module::Users)
                .default_value("status", "Draft")
                .statistics(&["status"]),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ACCOUNT_TYPES: &[&str] = &[
    "Analyst", "Competitor", "Customer", "Integrator", "Investor", "Partner", "Press", "Prospect",
    "Reseller", "Other",
];
const LEAD_SOURCES: &[&str] = &[
    "Cold Call", "Existing Customer", "Self Generated", "Employee", "Partner", "Public Relations",
    "Direct Mail", "Conference", "Trade Show", "Web Site", "Word of mouth", "Email", "Campaign",
    "Other",
];
const LEAD_STATUSES: &[&str] = &["New", "Assigned", "In Process", "Converted", "Recycled", "Dead"];
const SALES_STAGES: &[&str] = &[
    "Prospecting", "Qualification", "Needs Analysis", "Value Proposition", "Id. Decision Makers",
    "Perception Analysis", "Proposal/Price Quote", "Negotiation/Review", "Closed Won", "Closed Lost",
];
const CASE_PRIORITIES: &[&str] = &["P1", "P2", "P3"];
const CASE_STATES: &[&str] = &["Open", "Closed"];
const CASE_STATUSES: &[&str] = &[
    "Open_New", "Open_Assigned", "Open_Pending Input", "Closed_Closed", "Closed_Rejected",
    "Closed_Duplicate",
];
const CASE_TYPES: &[&str] = &["Administration", "Product", "User"];
const BUG_PRIORITIES: &[&str] = &["Urgent", "High", "Medium", "Low"];
const BUG_STATUSES: &[&str] = &["New", "Assigned", "Closed", "Pending", "Rejected"];
const TASK_STATUSES: &[&str] = &["Not Started", "In Progress", "Completed", "Pending Input", "Deferred"];
const CAMPAIGN_STATUSES: &[&str] = &["Planning", "Active", "Inactive", "Complete", "In Queue", "Sending"];
const CAMPAIGN_TYPES: &[&str] = &["Telesales", "Mail", "Email", "Print", "Web", "Radio", "Television", "NewsLetter", "Survey"];
const QUOTE_STAGES: &[&str] = &[
    "Draft", "Negotiation", "Delivered", "On Hold", "Confirmed", "Closed Accepted", "Closed Lost",
    "Closed Dead",
];
const INVOICE_STATUSES: &[&str] = &["Paid", "Unpaid", "Cancelled"];
const CONTRACT_STATUSES: &[&str] = &["Not Started", "In Progress", "Signed"];

fn present<'r>(record: &'r Record, field: &str) -> Option<&'r serde_json::Value> {
    record.get(field).filter(|v| !is_blank(v))
}

fn text(record: &Record, field: &str) -> Option<String> {
    present(record, field).map(value_to_text)
}

fn non_negative(record: &Record, fields: &[&str], errors: &mut Vec<String>) {
    for field in fields {
        if let Some(n) = present(record, field).and_then(parse_number) {
            if n < 0.0 {
                errors.push(format!("Field '{field}' must not be negative"));
            }
        }
    }
}

fn lead_rules(record: &Record, _: WriteKind) -> Vec<String> {
    let mut errors = Vec::new();
    if text(record, "status").as_deref() == Some("Converted") && present(record, "contact_id").is_none() {
        errors.push("Field 'contact_id' is required when status is Converted".to_string());
    }
    if text(record, "status").as_deref() == Some("Dead") && present(record, "status_description").is_none() {
        errors.push("Field 'status_description' is required when status is Dead".to_string());
    }
    errors
}

fn case_rules(record: &Record, _: WriteKind) -> Vec<String> {
    let mut errors = Vec::new();
    let state = text(record, "state");
    let status = text(record, "status");
    let closed = state.as_deref() == Some("Closed") || status.as_deref().is_some_and(|s| s.starts_with("Closed_"));
    if closed && present(record, "resolution").is_none() {
        errors.push("Field 'resolution' is required when the case is closed".to_string());
    }
    if let (Some(state), Some(status)) = (state, status) {
        if !status.starts_with(&format!("{state}_")) {
            errors.push(format!("Field 'status' value '{status}' does not belong to state '{state}'"));
        }
    }
    errors
}

fn activity_rules(record: &Record, _: WriteKind) -> Vec<String> {
    check_order(record, "date_start", "date_end").into_iter().collect()
}

fn task_rules(record: &Record, _: WriteKind) -> Vec<String> {
    check_order(record, "date_start", "date_due").into_iter().collect()
}

fn document_rules(record: &Record, _: WriteKind) -> Vec<String> {
    check_order(record, "active_date", "exp_date").into_iter().collect()
}

fn campaign_rules(record: &Record, _: WriteKind) -> Vec<String> {
    let mut errors: Vec<String> = check_order(record, "start_date", "end_date").into_iter().collect();
    if let (Some(cost), Some(budget)) = (
        present(record, "expected_cost").and_then(parse_number),
        present(record, "budget").and_then(parse_number),
    ) {
        if cost > budget {
            errors.push("Field 'expected_cost' must not exceed 'budget'".to_string());
        }
    }
    errors
}

fn project_rules(record: &Record, _: WriteKind) -> Vec<String> {
    check_order(record, "estimated_start_date", "estimated_end_date")
        .into_iter()
        .collect()
}

fn project_task_rules(record: &Record, _: WriteKind) -> Vec<String> {
    let mut errors: Vec<String> = check_order(record, "date_start", "date_finish").into_iter().collect();
    if text(record, "status").as_deref() == Some("Completed") {
        if let Some(pct) = present(record, "percent_complete").and_then(parse_number) {
            if pct < 100.0 {
                errors.push("Field 'percent_complete' must be 100 when status is Completed".to_string());
            }
        }
    }
    errors
}

fn invoice_rules(record: &Record, _: WriteKind) -> Vec<String> {
    let mut errors: Vec<String> = check_order(record, "invoice_date", "due_date").into_iter().collect();
    non_negative(record, &["shipping_amount"], &mut errors);
    errors
}

fn contract_rules(record: &Record, _: WriteKind) -> Vec<String> {
    check_order(record, "start_date", "end_date").into_iter().collect()
}

fn prepare_contactable(record: &mut Record) {
    trim_strings(record);
    lowercase_fields(record, &["email1", "email2"]);
    normalize_dates(record, &["birthdate"]);
}

fn prepare_opportunity(record: &mut Record) {
    trim_strings(record);
    normalize_dates(record, &["date_closed"]);
}

fn prepare_activity(record: &mut Record) {
    trim_strings(record);
    normalize_datetimes(record, &["date_start", "date_end"]);
}

fn prepare_task(record: &mut Record) {
    trim_strings(record);
    normalize_datetimes(record, &["date_start", "date_due"]);
}

fn prepare_email(record: &mut Record) {
    trim_strings(record);
    lowercase_fields(record, &["from_addr"]);
    normalize_datetimes(record, &["date_sent"]);
}

fn prepare_project(record: &mut Record) {
    trim_strings(record);
    normalize_dates(record, &["estimated_start_date", "estimated_end_date"]);
}

fn prepare_quote(record: &mut Record) {
    trim_strings(record);
    normalize_dates(record, &["expiration"]);
}

fn prepare_invoice(record: &mut Record) {
    trim_strings(record);
    normalize_dates(record, &["invoice_date", "due_date"]);
}
