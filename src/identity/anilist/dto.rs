//! AniList GraphQL Data Transfer Objects
//!
//! These types match EXACTLY what the AniList API returns for the media
//! search query below. DO NOT use these types outside the anilist module -
//! convert to domain types in the adapter.
//!
//! Example response:
//! ```json
//! {
//!   "data": {
//!     "Page": {
//!       "media": [{
//!         "id": 154587,
//!         "title": {"romaji": "Sousou no Frieren", "english": "Frieren: Beyond Journey's End", "native": "葬送のフリーレン"},
//!         "synonyms": ["Frieren at the Funeral"]
//!       }]
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Media search query; `$search` is the title, `$perPage` the result cap.
pub const SEARCH_QUERY: &str = r#"
query ($search: String, $perPage: Int) {
  Page(perPage: $perPage) {
    media(search: $search, type: ANIME) {
      id
      title { romaji english native }
      synonyms
    }
  }
}
"#;

/// GraphQL request body
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: SearchVariables<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchVariables<'a> {
    pub search: &'a str,
    pub per_page: u32,
}

/// Top-level GraphQL response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    pub data: Option<SearchData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQlError {
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchData {
    #[serde(rename = "Page")]
    pub page: Page,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page {
    #[serde(default)]
    pub media: Vec<Media>,
}

/// One anime entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Media {
    /// AniList media id
    pub id: i64,
    pub title: MediaTitle,
    /// Alternative titles
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}
