use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::connection::{CredentialSource, NegotiationEndpoint};
use crate::error::SessionError;
use crate::types::SessionTicket;

/// Fetches the ephemeral session credential from the external token issuer.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCredentialSource {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn issue(&self) -> Result<SessionTicket, SessionError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| SessionError::Credential(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Credential(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<SessionTicket>()
            .await
            .map_err(|err| SessionError::Credential(err.to_string()))
    }
}

/// Posts the SDP offer to the remote negotiation endpoint and returns the
/// answer. The credential is presented as a bearer token and dropped with
/// the request; it is never logged.
pub struct HttpNegotiationEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpNegotiationEndpoint {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NegotiationEndpoint for HttpNegotiationEndpoint {
    async fn exchange(
        &self,
        offer: String,
        secret: SecretString,
    ) -> Result<String, SessionError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .bearer_auth(secret.expose_secret())
            .body(offer)
            .send()
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Negotiation(format!(
                "negotiation endpoint returned {}",
                response.status()
            )));
        }

        let answer = response
            .text()
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;

        if answer.trim().is_empty() {
            return Err(SessionError::Negotiation(
                "empty answer from negotiation endpoint".to_string(),
            ));
        }

        Ok(answer)
    }
}
