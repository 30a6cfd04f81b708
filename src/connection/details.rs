/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::utils::LightstreamerError;
use std::fmt::{self, Debug, Formatter};
use url::Url;

/// Used by `LightstreamerClient` to provide a basic connection properties data object.
///
/// Data object that contains the configuration settings needed to connect to a Lightstreamer
/// Server. An instance is available as the `connection_details` field of the client; its
/// values are used when the next session is created.
///
/// The session id, server instance address, server socket name and client ip are filled by
/// the client when the server reports them and are read only.
#[derive(Default, Clone)]
pub struct ConnectionDetails {
    adapter_set: Option<String>,
    client_ip: Option<String>,
    server_address: Option<String>,
    server_instance_address: Option<String>,
    server_socket_name: Option<String>,
    session_id: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl ConnectionDetails {
    /// Creates a new details object.
    ///
    /// # Errors
    ///
    /// Returns an illegal-argument error if `server_address` is not a valid http, https,
    /// ws or wss URL.
    pub fn new(
        server_address: Option<&str>,
        adapter_set: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, LightstreamerError> {
        let mut details = Self::default();
        details.set_server_address(server_address.map(str::to_string))?;
        details.set_adapter_set(adapter_set.map(str::to_string));
        details.set_user(user.map(str::to_string));
        details.set_password(password.map(str::to_string));
        Ok(details)
    }

    /// Name of the Adapter Set mounted on the server; `None` means "DEFAULT".
    pub fn get_adapter_set(&self) -> Option<&String> {
        self.adapter_set.as_ref()
    }

    /// IP address of this client as seen by the server, if a session was established.
    pub fn get_client_ip(&self) -> Option<&String> {
        self.client_ip.as_ref()
    }

    /// Configured server address.
    pub fn get_server_address(&self) -> Option<&String> {
        self.server_address.as_ref()
    }

    /// Instance address reported by the server (clustering), if any.
    pub fn get_server_instance_address(&self) -> Option<&String> {
        self.server_instance_address.as_ref()
    }

    /// Socket name reported by the server (`SERVNAME`), if any.
    pub fn get_server_socket_name(&self) -> Option<&String> {
        self.server_socket_name.as_ref()
    }

    /// Id of the current session, if any.
    pub fn get_session_id(&self) -> Option<&String> {
        self.session_id.as_ref()
    }

    /// User name used for authentication.
    pub fn get_user(&self) -> Option<&String> {
        self.user.as_ref()
    }

    /// Sets the Adapter Set used by the next session.
    pub fn set_adapter_set(&mut self, adapter_set: Option<String>) {
        self.adapter_set = adapter_set;
    }

    /// Sets the password used by the next session. There is no getter.
    pub fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    /// Sets the server address.
    ///
    /// # Errors
    ///
    /// Returns an illegal-argument error if the address cannot be parsed or its scheme is not
    /// one of http, https, ws, wss.
    pub fn set_server_address(
        &mut self,
        server_address: Option<String>,
    ) -> Result<(), LightstreamerError> {
        if let Some(address) = &server_address {
            let url = Url::parse(address).map_err(|e| {
                LightstreamerError::illegal_argument(format!(
                    "invalid server address '{}': {}",
                    address, e
                ))
            })?;
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(LightstreamerError::illegal_argument(format!(
                    "unsupported scheme '{}' in server address",
                    url.scheme()
                )));
            }
        }
        self.server_address = server_address;
        Ok(())
    }

    /// Sets the user name used by the next session.
    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    pub(crate) fn get_password(&self) -> Option<&String> {
        self.password.as_ref()
    }

    pub(crate) fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    pub(crate) fn set_client_ip(&mut self, client_ip: Option<String>) {
        self.client_ip = client_ip;
    }

    pub(crate) fn set_server_socket_name(&mut self, name: Option<String>) {
        self.server_socket_name = name;
    }

    pub(crate) fn set_server_instance_address(&mut self, address: Option<String>) {
        self.server_instance_address = address;
    }
}

impl Debug for ConnectionDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("adapter_set", &self.adapter_set)
            .field("client_ip", &self.client_ip)
            .field("server_address", &self.server_address)
            .field("server_instance_address", &self.server_instance_address)
            .field("server_socket_name", &self.server_socket_name)
            .field("session_id", &self.session_id)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
