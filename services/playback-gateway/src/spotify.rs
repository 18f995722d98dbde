//! Playback operations against the Spotify Web API
//!
//! Each operation is one or two authenticated calls plus a narrow view of the
//! upstream JSON. Only the fields the routes return are modelled.

use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use spotify_session::{AuthenticatedClient, OutboundCall, Payload, TokenManager};
use tracing::{debug, info};

use crate::error::{ApiError, Result};

#[derive(Debug, Deserialize)]
struct PlaybackState {
    item: Option<Track>,
    context: Option<PlaybackContext>,
}

#[derive(Debug, Deserialize)]
struct PlaybackContext {
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Track>,
}

/// What the user is listening to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlaying {
    pub song_link: Option<String>,
    pub playlist_link: Option<String>,
    pub artists: Vec<String>,
    pub song_name: String,
}

/// A track picked from search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedTrack {
    pub song_name: String,
    pub artists: Vec<String>,
    #[serde(skip)]
    pub uri: String,
}

fn artist_names(artists: Vec<Artist>) -> Vec<String> {
    artists.into_iter().map(|a| a.name).collect()
}

/// Web API operations on behalf of the authorized user.
pub struct SpotifyApi {
    client: AuthenticatedClient,
    base_url: String,
    market: Option<String>,
}

impl SpotifyApi {
    pub fn new(client: AuthenticatedClient, base_url: String, market: Option<String>) -> Self {
        Self {
            client,
            base_url,
            market,
        }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        self.client.manager()
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let url = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        url.map_err(|e| ApiError::Internal(format!("invalid API URL {raw}: {e}")))
    }

    /// Current playback, or `None` when nothing is playing.
    pub async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let call = OutboundCall::get(self.endpoint("me/player", &[])?);
        let state = match self.client.call_json::<PlaybackState>(&call).await? {
            Payload::Content(state) => state,
            Payload::Empty => return Ok(None),
        };
        let Some(item) = state.item else {
            return Ok(None);
        };

        Ok(Some(NowPlaying {
            song_link: item.external_urls.spotify,
            playlist_link: state.context.and_then(|c| c.external_urls.spotify),
            artists: artist_names(item.artists),
            song_name: item.name,
        }))
    }

    pub async fn skip_song(&self) -> Result<()> {
        let call = OutboundCall::post(self.endpoint("me/player/next", &[])?);
        self.client.call(&call).await?;
        info!("skipped to next track");
        Ok(())
    }

    pub async fn add_to_queue(&self, uri: &str) -> Result<()> {
        let call = OutboundCall::post(self.endpoint("me/player/queue", &[("uri", uri)])?);
        self.client.call(&call).await?;
        info!(uri, "added track to queue");
        Ok(())
    }

    /// First track matching `query`, if any.
    pub async fn search_track(&self, query: &str) -> Result<Option<QueuedTrack>> {
        let mut params = vec![("q", query), ("type", "track"), ("limit", "1")];
        if let Some(market) = &self.market {
            params.push(("market", market.as_str()));
        }
        let call = OutboundCall::get(self.endpoint("search", &params)?);

        let results = match self.client.call_json::<SearchResults>(&call).await? {
            Payload::Content(results) => results,
            Payload::Empty => return Ok(None),
        };
        let track = results
            .tracks
            .and_then(|page| page.items.into_iter().next());
        debug!(found = track.is_some(), "search completed");

        Ok(track.map(|t| QueuedTrack {
            song_name: t.name,
            artists: artist_names(t.artists),
            uri: t.uri,
        }))
    }

    /// Search and enqueue the first result.
    pub async fn search_and_queue(&self, query: &str) -> Result<Option<QueuedTrack>> {
        let Some(track) = self.search_track(query).await? else {
            return Ok(None);
        };
        self.add_to_queue(&track.uri).await?;
        Ok(Some(track))
    }
}
