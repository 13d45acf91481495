use crate::{
    api::Api,
    mirror::{Key, Mirror},
    Error, GenreSummary, Playlist, RawPlaylists, Track,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::warn;

/// `GET /public-profile/{id}` as sent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub playlists: RawPlaylists,
    #[serde(default)]
    pub genres: Option<GenreSummary>,
    /// A bare track or a `{"track": ...}` envelope
    #[serde(default)]
    pub last_played: Option<Value>,
}

/// Another user's page, readable without a session.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PublicProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub featured_playlists: Vec<Playlist>,
    pub all_playlists: Vec<Playlist>,
    pub genres: GenreSummary,
    pub last_played: Option<Track>,
}

impl PublicProfile {
    pub fn from_raw(user_id: &str, raw: RawProfile) -> PublicProfile {
        let playlists = raw.playlists.normalize();
        PublicProfile {
            user_id: user_id.to_owned(),
            display_name: raw.display_name,
            profile_image_url: raw.profile_picture,
            featured_playlists: playlists.featured,
            all_playlists: playlists.all,
            genres: raw.genres.unwrap_or_default(),
            last_played: raw.last_played.and_then(Track::from_value),
        }
    }

    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        let played_at = self.last_played.as_ref()?.played_at.as_deref()?;
        OffsetDateTime::parse(played_at, &Rfc3339).ok()
    }
}

pub struct ProfileLoader {
    api: Rc<Api>,
    mirror: Rc<Mirror>,
}

impl ProfileLoader {
    pub fn new(api: Rc<Api>, mirror: Rc<Mirror>) -> ProfileLoader {
        ProfileLoader { api, mirror }
    }

    /// The mirrored profile, for painting before [`ProfileLoader::load`] resolves.
    pub fn cached(&self, user_id: &str) -> Option<PublicProfile> {
        self.mirror.read(&Key::PublicProfile(user_id.to_owned()))
    }

    pub async fn fetch(&self, user_id: &str) -> Result<PublicProfile, Error> {
        let raw = self.api.public_profile(user_id).await?;
        let profile = PublicProfile::from_raw(user_id, raw);
        self.mirror
            .write(&Key::PublicProfile(user_id.to_owned()), &profile);
        Ok(profile)
    }

    /// The fresh profile, or the mirrored one if the fetch fails.
    pub async fn load(&self, user_id: &str) -> Option<PublicProfile> {
        match self.fetch(user_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(%user_id, error = %e, "failed to load public profile");
                self.cached(user_id)
            }
        }
    }
}
