use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub mod api;
pub mod config;
pub mod context;
pub mod display;
pub mod fetch;
pub mod genres;
pub mod mirror;
#[cfg(feature = "full")]
pub mod native;
pub mod normalize;
pub mod playlists;
pub mod poller;
pub mod profile;
pub mod session;
pub mod theme;

pub use config::{Config, SessionSource};
pub use context::Context;

/// The authenticated user's aggregate client-side state.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub playlists: Playlists,
    #[serde(default)]
    pub genres: GenreSummary,
    #[serde(default)]
    pub last_played: Option<Track>,
}

impl Session {
    /// Featured playlists are capped at three, matching what the profile page can show.
    pub const MAX_FEATURED: usize = 3;

    pub fn assemble(me: Me, dashboard: Dashboard) -> Session {
        Session {
            user_id: me.user_id,
            display_name: me.display_name,
            profile_image_url: me.profile_image_url,
            theme: me.theme,
            playlists: dashboard.playlists.normalize(),
            genres: dashboard.genres.unwrap_or_default(),
            last_played: dashboard.last_played.and_then(Track::from_value),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Playlists {
    pub all: Vec<Playlist>,
    pub featured: Vec<Playlist>,
}

/// Canonical playlist shape. `id` is the de-duplication key everywhere.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub image: String,
    pub tracks: u64,
    pub external_url: String,
}

/// Playlists as the server sends them: any mix of `id`/`playlist_id` and
/// `tracks`/`track_count` shapes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RawPlaylists {
    #[serde(default)]
    pub all: Vec<Value>,
    #[serde(default)]
    pub featured: Vec<Value>,
}

impl RawPlaylists {
    pub fn normalize(&self) -> Playlists {
        let mut featured = normalize::normalize_playlists(&self.featured);
        featured.truncate(Session::MAX_FEATURED);
        Playlists {
            all: normalize::normalize_playlists(&self.all),
            featured,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<TrackGenre>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_at: Option<String>,
    // Anything else the server attaches still takes part in equality
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Track {
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Track {
        Track {
            name: name.into(),
            artist: artist.into(),
            id: None,
            album_art_url: None,
            genres: None,
            timestamp: None,
            played_at: None,
            extra: Map::new(),
        }
    }

    /// Accepts a bare track or a `{"track": ...}` envelope. Empty objects
    /// and nulls, which the server uses for "never played", become `None`.
    pub fn from_value(value: Value) -> Option<Track> {
        let value = match value {
            Value::Object(mut map) if map.contains_key("track") && !map.contains_key("name") => {
                map.remove("track")?
            }
            value => value,
        };
        if value.get("name").is_some() {
            serde_json::from_value(value).ok()
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrackGenre {
    Tagged {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gradient: Option<String>,
    },
    Name(String),
}

impl TrackGenre {
    pub fn name(&self) -> &str {
        match self {
            TrackGenre::Tagged { name, .. } | TrackGenre::Name(name) => name,
        }
    }
}

/// Portions are not guaranteed to sum to 1.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GenreSummary {
    #[serde(default)]
    pub meta_genres: BTreeMap<String, GenreShare>,
    #[serde(default)]
    pub sub_genres: BTreeMap<String, GenreShare>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GenreShare {
    pub portion: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Me {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Dashboard {
    #[serde(default)]
    pub playlists: RawPlaylists,
    #[serde(default)]
    pub genres: Option<GenreSummary>,
    #[serde(default)]
    pub last_played: Option<Value>,
}

/// Response of `GET /session`: identity and dashboard in one document.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub me: Me,
    #[serde(flatten)]
    pub dashboard: Dashboard,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TrackEnvelope {
    #[serde(default)]
    pub track: Option<Value>,
}

impl TrackEnvelope {
    pub fn into_track(self) -> Option<Track> {
        self.track.and_then(Track::from_value)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PlaylistPage {
    #[serde(default)]
    pub playlists: Vec<Value>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Onboarding completion payload for `POST /register`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Registration {
    pub user_id: String,
    pub display_name: String,
    pub profile_picture: String,
    pub selected_playlists: Vec<Playlist>,
    pub featured_playlists: Vec<Playlist>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The request never produced a response
    NetworkFailure(String),
    RequestFailed { status: u16, body: String },
    ParseFailure(String),
    Storage(String),
    Config(String),
}

impl Error {
    pub fn network(e: impl Into<String>) -> Self {
        Self::NetworkFailure(e.into())
    }

    pub fn storage(e: impl Into<String>) -> Self {
        Self::Storage(e.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Failures worth another attempt: no response at all, or a server-side status.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::NetworkFailure(_) => true,
            Error::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::ParseFailure(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Storage(e.to_string())
    }
}

#[cfg(feature = "full")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::NetworkFailure(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::{Dashboard, Me, Session, SessionResponse, Track, TrackGenre};
    use serde_json::json;

    #[test]
    fn test_track_from_value() {
        assert_eq!(Track::from_value(json!({})), None);
        assert_eq!(Track::from_value(json!(null)), None);
        assert_eq!(Track::from_value(json!({"track": null})), None);
        assert_eq!(
            Track::from_value(json!({"track": {"name": "X", "artist": "Y"}})),
            Some(Track::new("X", "Y"))
        );
        let track = Track::from_value(json!({
            "name": "X",
            "artist": "Y",
            "genres": ["indie rock", {"name": "pop", "gradient": "linear-gradient(red, blue)"}],
            "popularity": 42,
        }))
        .unwrap();
        assert_eq!(
            track.genres,
            Some(vec![
                TrackGenre::Name("indie rock".to_owned()),
                TrackGenre::Tagged {
                    name: "pop".to_owned(),
                    gradient: Some("linear-gradient(red, blue)".to_owned())
                }
            ])
        );
        assert_eq!(track.extra["popularity"], json!(42));
    }

    #[test]
    fn test_track_equality_is_structural() {
        let first = Track::from_value(json!({"name": "X", "artist": "Y", "popularity": 1})).unwrap();
        let second = Track::from_value(json!({"name": "X", "artist": "Y", "popularity": 2})).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.clone(), first);
    }

    #[test]
    fn test_session_response() {
        let response: SessionResponse = serde_json::from_value(json!({
            "user_id": "u1",
            "display_name": "User",
            "profile_image_url": null,
            "theme": "default",
            "playlists": {
                "all": [
                    {"playlist_id": "a", "name": "A", "track_count": 3},
                    {"id": "b", "name": "B", "tracks": 4},
                    {"id": "c", "name": "C", "tracks": 5},
                    {"id": "d", "name": "D", "tracks": 6}
                ],
                "featured": [
                    {"playlist_id": "a", "name": "A", "track_count": 3},
                    {"id": "b", "name": "B", "tracks": 4},
                    {"id": "c", "name": "C", "tracks": 5},
                    {"id": "d", "name": "D", "tracks": 6}
                ]
            },
            "genres": {"meta_genres": {"rock": {"portion": 0.5}}, "sub_genres": {}},
            "last_played": {}
        }))
        .unwrap();
        let session = Session::assemble(response.me, response.dashboard);
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.playlists.all.len(), 4);
        assert_eq!(session.playlists.featured.len(), 3);
        assert_eq!(session.playlists.all[0].id, "a");
        assert_eq!(session.playlists.all[0].tracks, 3);
        assert_eq!(session.genres.meta_genres["rock"].portion, 0.5);
        assert_eq!(session.last_played, None);
    }

    #[test]
    fn test_assemble_without_dashboard_data() {
        let session = Session::assemble(
            Me {
                user_id: "u1".to_owned(),
                display_name: None,
                profile_image_url: None,
                theme: None,
            },
            Dashboard::default(),
        );
        assert_eq!(
            session,
            Session {
                user_id: "u1".to_owned(),
                ..Session::default()
            }
        );
    }
}
