use crate::error::{Error, Result};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request body understood by the remote key exchange service. The service
/// performs the actual CDM handshake against `licurl` and answers with a
/// ready to use `KID:KEY` string.
#[derive(Debug, Serialize)]
struct KeyRequest<'a> {
    pssh: &'a str,
    licurl: &'a str,
    proxy: Option<&'a str>,
    headers: Option<&'a str>,
    cookies: Option<&'a str>,
    data: Option<&'a str>,
    device: &'a str,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    message: String,
}

pub struct KeyClient {
    client: Client,
    endpoint: String,
    license_base: String,
}

impl KeyClient {
    pub fn new(client: Client, endpoint: &str, license_base: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_owned(),
            license_base: license_base.to_owned(),
        }
    }

    pub fn license_url(&self, item_id: Option<&str>, device_id: Option<&str>) -> String {
        format!(
            "{}?itemID={}&deviceId={}",
            self.license_base,
            item_id.unwrap_or_default(),
            device_id.unwrap_or_default()
        )
    }

    /// Exchanges a content protection blob for a decryption key.
    ///
    /// The blob must be valid base64. Failures are fatal for the
    /// representation being processed.
    pub async fn exchange(&self, pssh: &str, license_url: &str) -> Result<String> {
        crate::utils::decode_base64(pssh.trim())
            .map_err(|_| Error::KeyExchange("content protection blob is not base64".to_owned()))?;

        debug!("requesting key from {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&KeyRequest {
                pssh: pssh.trim(),
                licurl: license_url,
                proxy: None,
                headers: None,
                cookies: None,
                data: None,
                device: "default",
            })
            .send()
            .await
            .map_err(|x| Error::KeyExchange(x.to_string()))?;
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            return Err(Error::KeyExchange(format!(
                "key service answered HTTP {}",
                status
            )));
        }

        let key = response
            .json::<KeyResponse>()
            .await
            .map_err(|x| Error::KeyExchange(format!("malformed key response ({x})")))?
            .message;

        if key.is_empty() {
            return Err(Error::KeyExchange("key service answered an empty key".to_owned()));
        }

        info!("Using key: {}", key);
        Ok(key)
    }
}
