use crate::error::{Error, Result};
use log::info;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;

/// One catalog entry as served by the item endpoint. Entries are either a
/// playable item or a collection whose `children` carry their own ids.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(rename = "mediaID", default)]
    pub media_id: String,
    #[serde(default)]
    pub title: HashMap<String, String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub media: MediaSources,
    #[serde(default)]
    pub trailer: Option<MediaSources>,
    #[serde(default)]
    pub children: Option<Vec<ChildItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSources {
    #[serde(default)]
    pub mpds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildItem {
    pub id: String,
}

impl MediaItem {
    /// English title with the id as fallback, used for output naming and
    /// publish captions.
    pub fn display_title(&self) -> &str {
        self.title
            .get("en")
            .or_else(|| self.title.values().next())
            .unwrap_or(&self.id)
    }

    pub fn is_collection(&self) -> bool {
        self.children.as_ref().is_some_and(|x| !x.is_empty())
    }
}

pub struct CatalogClient {
    client: Client,
    catalog_base: String,
    images_base: String,
}

impl CatalogClient {
    pub fn new(client: Client, catalog_base: &str, images_base: &str) -> Self {
        Self {
            client,
            catalog_base: catalog_base.trim_end_matches('/').to_owned(),
            images_base: images_base.trim_end_matches('/').to_owned(),
        }
    }

    /// Fetches the per item json document. A non success status is reported
    /// as not found, the catalog uses no other failure signal.
    pub async fn item(&self, item_id: &str) -> Result<MediaItem> {
        let url = format!("{}/item/{}.json", self.catalog_base, item_id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::NotFound(format!("catalog item {:?}", item_id)));
        }

        Ok(response.json::<MediaItem>().await?)
    }

    /// Saves a catalog image (thumbnail or background) unless it is already
    /// on disk from a previous run.
    pub async fn save_image(&self, image_id: &str, path: &Path) -> Result<()> {
        if fs::try_exists(path).await? {
            return Ok(());
        }

        let url = format!("{}/{}.jpg", self.images_base, image_id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::NotFound(format!("image {:?}", image_id)));
        }

        let bytes = response.bytes().await?;
        fs::write(path, &bytes).await.map_err(|source| Error::Write {
            path: path.to_owned(),
            source,
        })?;

        info!("Saved {}", path.to_string_lossy());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_entries_expose_their_children() {
        let item = serde_json::from_str::<MediaItem>(
            r#"{
                "id": "series-1",
                "title": {"en": "A Series"},
                "children": [{"id": "ep-1"}, {"id": "ep-2"}]
            }"#,
        )
        .unwrap();

        assert!(item.is_collection());
        assert_eq!(item.children.unwrap().len(), 2);
    }

    #[test]
    fn single_items_deserialize_manifest_urls() {
        let item = serde_json::from_str::<MediaItem>(
            r#"{
                "id": "movie-1",
                "mediaID": "m-77",
                "title": {"en": "A Movie", "fa": "..."},
                "thumbnail": "t-77",
                "background": "b-77",
                "media": {"mpds": ["https://cdn/m/a_1920x1080.mpd", "https://cdn/m/a_854x480.mpd"]}
            }"#,
        )
        .unwrap();

        assert!(!item.is_collection());
        assert_eq!(item.display_title(), "A Movie");
        assert_eq!(item.media.mpds.len(), 2);
    }
}
