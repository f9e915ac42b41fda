//! The media query sent to the API

use std::path::Path;

/// Built-in query selecting the full media record.
///
/// Both run modes use it: a single lookup passes `$id` with the default
/// one-item page, a listing passes `$page` and `$perPage`.
pub const DEFAULT_QUERY: &str = r#"
query ($page: Int = 1, $perPage: Int = 1, $id: Int, $type: MediaType = ANIME) {
  Page(page: $page, perPage: $perPage) {
    pageInfo {
      total
      perPage
      currentPage
      lastPage
      hasNextPage
    }
    media(id: $id, type: $type, sort: ID) {
      id
      idMal
      title { native romaji english }
      type
      format
      status
      description
      startDate { year month day }
      endDate { year month day }
      season
      seasonYear
      episodes
      duration
      source
      hashtag
      updatedAt
      coverImage { large medium }
      bannerImage
      genres
      synonyms
      averageScore
      meanScore
      popularity
      isAdult
      tags { id name description category rank isGeneralSpoiler isMediaSpoiler isAdult }
      relations { edges { relationType node { id title { native } } } }
      characters {
        edges {
          role
          node { id name { first last native alternative } image { large medium } siteUrl }
          voiceActors(language: JAPANESE) { id name { first last native } image { large medium } siteUrl }
        }
      }
      staff { edges { role node { id name { first last native } image { large medium } siteUrl } } }
      studios { edges { isMain node { id name siteUrl } } }
      externalLinks { id url site }
      rankings { id rank type format year season allTime context }
      stats { scoreDistribution { score amount } statusDistribution { status amount } }
      siteUrl
    }
  }
}
"#;

/// Loads the query text, preferring `path` when one is configured
pub fn load_query(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(DEFAULT_QUERY.to_string()),
    }
}
