//! Entry point tying a session to the module table.

use crate::config::CrmConfig;
use crate::error::Result;
use crate::modules::Module;
use crate::service::ModuleService;
use crate::session::SessionClient;
use crate::transport::{Transport, UreqTransport};

/// An authenticated CRM connection with one service per module.
pub struct Crm<T: Transport = UreqTransport> {
    client: SessionClient<T>,
}

impl<T: Transport> std::fmt::Debug for Crm<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crm").field("client", &self.client).finish()
    }
}

impl Crm<UreqTransport> {
    /// Build the HTTP transport from `config` and log in.
    pub fn connect(config: CrmConfig) -> Result<Self> {
        Self::connect_with(SessionClient::new(config))
    }

    /// `CrmConfig::from_env` followed by `connect`.
    pub fn from_env() -> Result<Self> {
        Self::connect(CrmConfig::from_env()?)
    }
}

impl<T: Transport> Crm<T> {
    /// Log in with the client's configured credentials.
    pub fn connect_with(mut client: SessionClient<T>) -> Result<Self> {
        client.connect()?;
        Ok(Self { client })
    }

    /// Wrap a client as-is, authenticated or not.
    pub fn with_client(client: SessionClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SessionClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SessionClient<T> {
        &mut self.client
    }

    pub fn into_client(self) -> SessionClient<T> {
        self.client
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    pub fn service(&self, module: Module) -> ModuleService<'_, T> {
        ModuleService::for_module(&self.client, module)
    }

    pub fn accounts(&self) -> ModuleService<'_, T> {
        self.service(Module::Accounts)
    }

    pub fn contacts(&self) -> ModuleService<'_, T> {
        self.service(Module::Contacts)
    }

    pub fn leads(&self) -> ModuleService<'_, T> {
        self.service(Module::Leads)
    }

    pub fn opportunities(&self) -> ModuleService<'_, T> {
        self.service(Module::Opportunities)
    }

    pub fn cases(&self) -> ModuleService<'_, T> {
        self.service(Module::Cases)
    }

    pub fn calls(&self) -> ModuleService<'_, T> {
        self.service(Module::Calls)
    }

    pub fn meetings(&self) -> ModuleService<'_, T> {
        self.service(Module::Meetings)
    }

    pub fn tasks(&self) -> ModuleService<'_, T> {
        self.service(Module::Tasks)
    }

    pub fn projects(&self) -> ModuleService<'_, T> {
        self.service(Module::Projects)
    }

    pub fn quotes(&self) -> ModuleService<'_, T> {
        self.service(Module::Quotes)
    }

    pub fn invoices(&self) -> ModuleService<'_, T> {
        self.service(Module::Invoices)
    }

    pub fn products(&self) -> ModuleService<'_, T> {
        self.service(Module::Products)
    }

    /// End the session. Safe to call repeatedly.
    pub fn logout(&mut self) {
        self.client.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrmError;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn config() -> CrmConfig {
        CrmConfig::new("http://crm.test", "admin", "secret").unwrap()
    }

    #[test]
    fn connect_logs_in_once() {
        let transport = MockTransport::new();
        transport.push_json(json!({"id": "sess-1"}));
        let crm = Crm::connect_with(SessionClient::with_transport(config(), transport)).unwrap();
        assert!(crm.is_authenticated());
        assert_eq!(crm.client().transport().sent_methods(), ["login"]);
    }

    #[test]
    fn rejected_login_is_authentication_error() {
        let transport = MockTransport::new();
        transport.push_json(json!({"name": "Invalid Login", "number": 10, "description": "bad"}));
        let err = Crm::connect_with(SessionClient::with_transport(config(), transport)).unwrap_err();
        assert!(matches!(err, CrmError::Authentication { .. }));
    }

    #[test]
    fn shortcuts_pick_their_module() {
        let crm = Crm::with_client(SessionClient::with_transport(config(), MockTransport::new()));
        assert_eq!(crm.contacts().module(), Module::Contacts);
        assert_eq!(crm.invoices().module().as_str(), "AOS_Invoices");
        assert_eq!(crm.projects().module().as_str(), "Project");
    }

    #[test]
    fn logout_twice_sends_once() {
        let transport = MockTransport::new();
        transport.push_json(json!({"id": "sess-1"}));
        transport.push_json(json!(null));
        let mut crm = Crm::connect_with(SessionClient::with_transport(config(), transport)).unwrap();
        crm.logout();
        crm.logout();
        assert!(!crm.is_authenticated());
        assert_eq!(crm.client().transport().sent_methods(), ["login", "logout"]);
    }
}
