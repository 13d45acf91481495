use crate::{
    fetch::FetchClient, profile::RawProfile, Dashboard, Error, GenreSummary, Me, PlaylistPage,
    Registration, SessionResponse, TrackEnvelope,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use urlencoding::encode;

/// Typed calls against the remote API.
pub struct Api {
    fetch: FetchClient,
}

#[derive(Debug, Serialize)]
struct PlaylistIds<'a> {
    playlists: Vec<PlaylistId<'a>>,
}

#[derive(Debug, Serialize)]
struct PlaylistId<'a> {
    id: &'a str,
}

impl<'a> PlaylistIds<'a> {
    fn new(ids: &'a [String]) -> PlaylistIds<'a> {
        PlaylistIds {
            playlists: ids.iter().map(|id| PlaylistId { id }).collect(),
        }
    }
}

impl Api {
    pub fn new(fetch: FetchClient) -> Api {
        Api { fetch }
    }

    pub async fn session(&self) -> Result<SessionResponse, Error> {
        self.fetch.get("/session").await
    }

    pub async fn me(&self) -> Result<Me, Error> {
        self.fetch.get("/me").await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, Error> {
        self.fetch.get("/dashboard").await
    }

    pub async fn refresh_session(&self) -> Result<Value, Error> {
        self.fetch.get("/refresh-session").await
    }

    pub async fn logout(&self) -> Result<Value, Error> {
        self.fetch.logout().await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<Value, Error> {
        self.fetch
            .delete(&format!("/delete-user?user_id={}", encode(user_id)))
            .await
    }

    pub async fn register(&self, registration: &Registration) -> Result<Value, Error> {
        self.fetch.post("/register", registration).await
    }

    pub async fn genres(&self) -> Result<GenreSummary, Error> {
        self.fetch.get("/genres").await
    }

    pub async fn public_genres(&self, user_id: &str) -> Result<GenreSummary, Error> {
        self.fetch
            .get(&format!("/public-genres/{}", encode(user_id)))
            .await
    }

    pub async fn refresh_genres(&self, user_id: &str) -> Result<Value, Error> {
        self.fetch
            .post("/refresh_genres", &json!({ "user_id": user_id }))
            .await
    }

    pub async fn meta_gradients(&self) -> Result<BTreeMap<String, String>, Error> {
        self.fetch.get("/meta-gradients").await
    }

    /// Live playback, as recorded by the server.
    pub async fn update_playing(&self) -> Result<TrackEnvelope, Error> {
        self.fetch.post_empty("/update-playing").await
    }

    pub async fn recently_played(&self) -> Result<TrackEnvelope, Error> {
        self.fetch.get("/recently-played").await
    }

    pub async fn public_profile(&self, user_id: &str) -> Result<RawProfile, Error> {
        self.fetch
            .get(&format!("/public-profile/{}", encode(user_id)))
            .await
    }

    /// Pulls the user's playlists from the music service into the server.
    pub async fn sync_playlists(&self, user_id: &str) -> Result<Value, Error> {
        self.fetch
            .post(
                &format!("/admin/sync_playlists?user_id={}", encode(user_id)),
                &json!({}),
            )
            .await
    }

    pub async fn synced_playlists(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PlaylistPage, Error> {
        self.fetch
            .get(&format!(
                "/synced-playlists/paginated?user_id={}&offset={offset}&limit={limit}",
                encode(user_id)
            ))
            .await
    }

    pub async fn user_playlists(&self, user_id: &str) -> Result<PlaylistPage, Error> {
        self.fetch
            .get(&format!("/user-playlists?user_id={}", encode(user_id)))
            .await
    }

    pub async fn add_playlists(&self, ids: &[String]) -> Result<Value, Error> {
        self.fetch
            .post("/add-playlists", &PlaylistIds::new(ids))
            .await
    }

    pub async fn delete_playlists(&self, ids: &[String]) -> Result<Value, Error> {
        self.fetch
            .post("/delete-playlists", &PlaylistIds::new(ids))
            .await
    }

    pub async fn update_featured(&self, user_id: &str, ids: &[String]) -> Result<Value, Error> {
        self.fetch
            .post(
                "/update-featured",
                &json!({ "user_id": user_id, "playlist_ids": ids }),
            )
            .await
    }
}
