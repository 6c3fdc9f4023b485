//! Full client lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the public API over
//! real HTTP through `UreqTransport`. Validates that envelope building, form
//! encoding and reply parsing agree with an actual server implementation.

use std::net::SocketAddr;

use crm_core::{
    convert_lead, record, Crm, CrmConfig, CrmError, Criteria, LeadConversion, Module, Operator, SessionClient,
};

/// Start the mock server on a random port and return its address.
fn spawn_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_crm::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn config(addr: SocketAddr, password: &str) -> CrmConfig {
    CrmConfig::new(&format!("http://{addr}"), mock_crm::DEMO_USER, password).unwrap()
}

#[test]
fn crud_lifecycle() {
    let addr = spawn_server();

    // Step 1: wrong password is an authentication error.
    let err = Crm::connect(config(addr, "wrong")).unwrap_err();
    assert!(matches!(err, CrmError::Authentication { .. }), "{err}");

    // Step 2: connect.
    let mut crm = Crm::connect(config(addr, mock_crm::DEMO_PASSWORD)).unwrap();
    assert!(crm.is_authenticated());

    // Step 3: nothing there yet.
    let accounts = crm.accounts();
    assert!(accounts.search(&Criteria::new(), &[], 20, 0).unwrap().is_empty());

    // Step 4: create an account and a contact referencing it.
    let account_id = accounts
        .create(&record([("name", "Acme"), ("account_type", "Customer")]))
        .unwrap();
    let contacts = crm.contacts();
    let contact_id = contacts
        .create(&record([
            ("first_name", "Jane"),
            ("last_name", "Doe"),
            ("email1", " Jane@Example.COM "),
            ("account_id", account_id.as_str()),
        ]))
        .unwrap();

    // Step 5: read it back, shaped.
    let contact = contacts.find_by_id(&contact_id, &[]).unwrap().unwrap();
    assert_eq!(contact["id"], contact_id.as_str());
    assert_eq!(contact["email1"], "jane@example.com");
    assert_eq!(contact["full_name"], "Jane Doe");

    // Step 6: a dangling reference is a validation error naming field and id.
    let err = contacts
        .create(&record([("last_name", "Roe"), ("account_id", "no-such-account")]))
        .unwrap_err();
    let message = &err.validation_errors()[0];
    assert!(message.contains("account_id") && message.contains("no-such-account"), "{message}");

    // Step 7: partial update.
    contacts.update(&contact_id, &record([("title", "CTO")])).unwrap();
    let contact = contacts.find_by_id(&contact_id, &["title", "last_name"]).unwrap().unwrap();
    assert_eq!(contact["title"], "CTO");
    assert_eq!(contact["last_name"], "Doe");

    // Step 8: search and count.
    let found = contacts
        .search(&Criteria::new().op("last_name", Operator::StartsWith, "Do"), &[], 20, 0)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(contacts.count(&Criteria::new().equals("title", "CTO")).unwrap(), 1);
    assert_eq!(contacts.count(&Criteria::new().equals("title", "CEO")).unwrap(), 0);

    // Step 9: link the contact to the account.
    let linked = accounts.link(&account_id, "contacts", &[contact_id.as_str()]).unwrap();
    assert_eq!(linked.created, 1);

    // Step 10: convert a lead.
    let leads = crm.leads();
    let lead_id = leads
        .create(&record([
            ("last_name", "Smith"),
            ("account_name", "Globex"),
            ("lead_source", "Trade Show"),
        ]))
        .unwrap();
    let converted = convert_lead(&crm, &lead_id, &LeadConversion {
        create_account: true,
        opportunity: None,
    })
    .unwrap();
    let lead = leads.find_by_id(&lead_id, &[]).unwrap().unwrap();
    assert_eq!(lead["status"], "Converted");
    assert_eq!(lead["contact_id"], converted.contact_id.as_str());
    assert_eq!(crm.service(Module::Accounts).count(&Criteria::new()).unwrap(), 2);

    // Step 11: soft delete; the record then reads as not found.
    assert!(contacts.delete(&contact_id).unwrap());
    let err = contacts.find_by_id(&contact_id, &[]).unwrap_err();
    assert!(matches!(err, CrmError::RecordNotFound { .. }), "{err}");

    // Step 12: logout twice, then every call is refused locally.
    crm.logout();
    crm.logout();
    assert!(!crm.is_authenticated());
    let err = crm.accounts().search(&Criteria::new(), &[], 20, 0).unwrap_err();
    assert!(matches!(err, CrmError::Authentication { .. }));
}

#[test]
fn server_faults_map_to_error_variants() {
    let addr = spawn_server();
    let mut client = SessionClient::new(config(addr, mock_crm::DEMO_PASSWORD));
    client.connect().unwrap();

    // Unknown module on a point read is an absent record; elsewhere a protocol error.
    let err = client.get_record("Widgets", "1", &[]).unwrap_err();
    assert!(matches!(err, CrmError::RecordNotFound { .. }), "{err}");
    let err = client.search_records("Widgets", &Criteria::new(), &[], 10, 0).unwrap_err();
    assert!(matches!(err, CrmError::Protocol { .. }), "{err}");

    // Updating a record the server does not know lands elsewhere.
    let acknowledged = client
        .update_record("Accounts", "missing-id", &record([("name", "Ghost")]))
        .unwrap();
    assert!(!acknowledged);

    // An empty search is an empty vec.
    let none = client
        .search_records("Bugs", &Criteria::new().equals("status", "Rejected"), &[], 10, 0)
        .unwrap();
    assert!(none.is_empty());

    // A login that never reaches a server still fails as authentication.
    drop(client);
    let unreachable = CrmConfig::new("http://127.0.0.1:1", "admin", "admin").unwrap();
    let mut offline = SessionClient::new(unreachable);
    let err = offline.connect().unwrap_err();
    assert!(matches!(err, CrmError::Authentication { .. }), "{err}");
    assert!(!offline.is_authenticated());
}
