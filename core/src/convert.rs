//! Operations that turn a record of one module into records of another.
//!
//! Each conversion copies a fixed field subset and goes through the target
//! module's service, so the usual validation pipeline applies to every
//! record it creates.

use chrono::Local;
use serde_json::Value;

use crate::crm::Crm;
use crate::error::{CrmError, Result};
use crate::modules::Module;
use crate::transport::Transport;
use crate::types::{is_blank, Record};
use crate::validation::DATE_FORMAT;

/// Lead field to contact field.
const LEAD_TO_CONTACT: &[(&str, &str)] = &[
    ("salutation", "salutation"),
    ("first_name", "first_name"),
    ("last_name", "last_name"),
    ("title", "title"),
    ("department", "department"),
    ("email1", "email1"),
    ("phone_work", "phone_work"),
    ("phone_mobile", "phone_mobile"),
    ("phone_fax", "phone_fax"),
    ("primary_address_street", "primary_address_street"),
    ("primary_address_city", "primary_address_city"),
    ("primary_address_state", "primary_address_state"),
    ("primary_address_postalcode", "primary_address_postalcode"),
    ("primary_address_country", "primary_address_country"),
    ("lead_source", "lead_source"),
    ("description", "description"),
    ("assigned_user_id", "assigned_user_id"),
];

/// Lead field to account field.
const LEAD_TO_ACCOUNT: &[(&str, &str)] = &[
    ("account_name", "name"),
    ("phone_work", "phone_office"),
    ("phone_fax", "phone_fax"),
    ("email1", "email1"),
    ("website", "website"),
    ("primary_address_street", "billing_address_street"),
    ("primary_address_city", "billing_address_city"),
    ("primary_address_state", "billing_address_state"),
    ("primary_address_postalcode", "billing_address_postalcode"),
    ("primary_address_country", "billing_address_country"),
    ("assigned_user_id", "assigned_user_id"),
];

/// Quote field to invoice field.
const QUOTE_TO_INVOICE: &[(&str, &str)] = &[
    ("name", "name"),
    ("number", "quote_number"),
    ("billing_account_id", "billing_account_id"),
    ("billing_contact_id", "billing_contact_id"),
    ("billing_address_street", "billing_address_street"),
    ("billing_address_city", "billing_address_city"),
    ("billing_address_state", "billing_address_state"),
    ("billing_address_postalcode", "billing_address_postalcode"),
    ("billing_address_country", "billing_address_country"),
    ("shipping_address_street", "shipping_address_street"),
    ("shipping_address_city", "shipping_address_city"),
    ("shipping_address_state", "shipping_address_state"),
    ("shipping_address_postalcode", "shipping_address_postalcode"),
    ("shipping_address_country", "shipping_address_country"),
    ("total_amt", "total_amt"),
    ("discount_amount", "discount_amount"),
    ("subtotal_amount", "subtotal_amount"),
    ("shipping_amount", "shipping_amount"),
    ("tax_amount", "tax_amount"),
    ("total_amount", "total_amount"),
    ("currency_id", "currency_id"),
    ("assigned_user_id", "assigned_user_id"),
];

/// What `convert_lead` creates besides the contact.
#[derive(Debug, Clone, Default)]
pub struct LeadConversion {
    /// Create an account from the lead's `account_name`. Without it, an
    /// `account_id` already on the lead is reused.
    pub create_account: bool,
    /// Fields of an opportunity to create alongside the contact.
    pub opportunity: Option<Record>,
}

/// Identifiers of the records a lead conversion produced or linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedLead {
    pub contact_id: String,
    pub account_id: Option<String>,
    pub opportunity_id: Option<String>,
}

fn copy_fields(source: &Record, mapping: &[(&str, &str)]) -> Record {
    let mut target = Record::new();
    for (from, to) in mapping {
        if let Some(value) = source.get(*from).filter(|v| !is_blank(v)) {
            target.insert(to.to_string(), value.clone());
        }
    }
    target
}

fn text_field<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn not_found(module: Module, id: &str) -> CrmError {
    CrmError::RecordNotFound {
        module: module.to_string(),
        id: id.to_string(),
        response: None,
    }
}

/// Convert a lead into a contact, optionally with an account and an
/// opportunity, then mark the lead `Converted`.
pub fn convert_lead<T: Transport>(crm: &Crm<T>, lead_id: &str, options: &LeadConversion) -> Result<ConvertedLead> {
    let leads = crm.leads();
    let lead = leads
        .find_by_id(lead_id, &[])?
        .ok_or_else(|| not_found(Module::Leads, lead_id))?;
    if text_field(&lead, "status") == Some("Converted") {
        return Err(CrmError::validation(format!("Lead '{lead_id}' is already converted")));
    }

    let account_id = if options.create_account {
        if text_field(&lead, "account_name").is_none() {
            return Err(CrmError::validation(
                "Field 'account_name' is required to create an account from a lead",
            ));
        }
        Some(crm.accounts().create(&copy_fields(&lead, LEAD_TO_ACCOUNT))?)
    } else {
        text_field(&lead, "account_id").map(str::to_string)
    };

    let mut contact = copy_fields(&lead, LEAD_TO_CONTACT);
    if let Some(account_id) = &account_id {
        contact.insert("account_id".to_string(), account_id.clone().into());
    }
    let contact_id = crm.contacts().create(&contact)?;

    let opportunity_id = match &options.opportunity {
        Some(fields) => {
            let mut opportunity = fields.clone();
            if let Some(account_id) = &account_id {
                opportunity.insert("account_id".to_string(), account_id.clone().into());
            }
            if let Some(source) = lead.get("lead_source").filter(|v| !is_blank(v)) {
                opportunity
                    .entry("lead_source")
                    .or_insert_with(|| source.clone());
            }
            Some(crm.opportunities().create(&opportunity)?)
        }
        None => None,
    };

    let mut update = Record::new();
    update.insert("status".to_string(), "Converted".into());
    update.insert("converted".to_string(), "1".into());
    update.insert("contact_id".to_string(), contact_id.clone().into());
    if let Some(account_id) = &account_id {
        update.insert("account_id".to_string(), account_id.clone().into());
    }
    if let Some(opportunity_id) = &opportunity_id {
        update.insert("opportunity_id".to_string(), opportunity_id.clone().into());
    }
    leads.update(lead_id, &update)?;
    tracing::debug!(lead = lead_id, contact = %contact_id, "lead converted");

    Ok(ConvertedLead {
        contact_id,
        account_id,
        opportunity_id,
    })
}

/// Create an unpaid invoice from a quote's billing and amount fields, then
/// flag the quote as invoiced. Returns the invoice id.
pub fn invoice_from_quote<T: Transport>(crm: &Crm<T>, quote_id: &str) -> Result<String> {
    let quotes = crm.quotes();
    let quote = quotes
        .find_by_id(quote_id, &[])?
        .ok_or_else(|| not_found(Module::Quotes, quote_id))?;

    let mut invoice = copy_fields(&quote, QUOTE_TO_INVOICE);
    invoice.insert(
        "quote_date".to_string(),
        Local::now().date_naive().format(DATE_FORMAT).to_string().into(),
    );
    invoice.insert("status".to_string(), "Unpaid".into());
    let invoice_id = crm.invoices().create(&invoice)?;

    let mut flag = Record::new();
    flag.insert("invoice_status".to_string(), "Invoiced".into());
    quotes.update(quote_id, &flag)?;
    tracing::debug!(quote = quote_id, invoice = %invoice_id, "quote invoiced");
    Ok(invoice_id)
}
