use secrecy::SecretString;

/// Response of the external credential source. The secret is single-use,
/// short-lived, and only ever presented to the negotiation endpoint; it is
/// held as a [`SecretString`] so it cannot leak through logs or serialization.
#[derive(Debug, serde::Deserialize)]
pub struct SessionTicket {
    #[serde(default)]
    id: Option<String>,

    #[serde(rename = "clientSecret", alias = "client_secret")]
    client_secret: ClientSecret,
}

#[derive(Debug, serde::Deserialize)]
struct ClientSecret {
    value: SecretString,
}

impl SessionTicket {
    pub fn new(id: Option<String>, secret: SecretString) -> Self {
        Self {
            id,
            client_secret: ClientSecret { value: secret },
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn secret(&self) -> &SecretString {
        &self.client_secret.value
    }
}
