use crate::error::{Error, Result};
use std::env;

const CATALOG_BASE: &str = "https://ffprod2s3.b-cdn.net/c/278/catalog/4FM71hGHCuwLjg-sGYSA4Q";
const IMAGES_BASE: &str = "https://ffprod2s3.b-cdn.net/c/278/images";
const MEDIA_BASE: &str = "https://ffprod2.b-cdn.net/c/278/m";
const LICENSE_BASE: &str = "https://www.darya.net/api/1.0/license";
const KEY_SERVICE: &str = "https://cdrm-project.com/api/decrypt";
const PUBLISH_GATEWAY: &str = "https://bridge.darya.net/api/1.0/publish";

/// Process wide configuration, resolved once at startup.
///
/// Every service endpoint has a baked in default and a `DARYA_*` environment
/// override. Publish credentials are all or nothing, a partially set group
/// fails at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_base: String,
    pub images_base: String,
    pub media_base: String,
    pub license_base: String,
    pub key_service: String,
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub gateway: String,
    pub api_id: u64,
    pub api_hash: String,
    pub session: String,
    pub channel: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            catalog_base: var_or("DARYA_CATALOG_BASE", CATALOG_BASE),
            images_base: var_or("DARYA_IMAGES_BASE", IMAGES_BASE),
            media_base: var_or("DARYA_MEDIA_BASE", MEDIA_BASE),
            license_base: var_or("DARYA_LICENSE_BASE", LICENSE_BASE),
            key_service: var_or("DARYA_KEY_SERVICE", KEY_SERVICE),
            publish: PublishConfig::from_env()?,
        })
    }
}

impl PublishConfig {
    const VARS: [&'static str; 4] = [
        "DARYA_API_ID",
        "DARYA_API_HASH",
        "DARYA_SESSION",
        "DARYA_CHANNEL",
    ];

    fn from_env() -> Result<Option<Self>> {
        let values = Self::VARS
            .iter()
            .map(|x| env::var(x).ok().filter(|x| !x.is_empty()))
            .collect::<Vec<_>>();

        if values.iter().all(|x| x.is_none()) {
            return Ok(None);
        }

        if let Some(i) = values.iter().position(|x| x.is_none()) {
            return Err(Error::Config(format!(
                "{} is required when any publish variable is set",
                Self::VARS[i]
            )));
        }

        let mut values = values.into_iter().flatten();
        let api_id = values.next().unwrap_or_default();

        Ok(Some(Self {
            gateway: var_or("DARYA_PUBLISH_GATEWAY", PUBLISH_GATEWAY),
            api_id: api_id
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("DARYA_API_ID is not a number ({})", api_id)))?,
            api_hash: values.next().unwrap_or_default(),
            session: values.next().unwrap_or_default(),
            channel: values.next().unwrap_or_default(),
        }))
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|x| !x.is_empty())
        .unwrap_or_else(|| default.to_owned())
}
