use crate::{
    api::Api,
    mirror::{Key, Mirror},
    Error, GenreShare, GenreSummary, Track, TrackGenre,
};
use serde::Serialize;
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use tracing::{debug, warn};

/// Checked in order; the first one contained in a genre name wins.
const META_GENRES: [&str; 19] = [
    "rock",
    "pop",
    "r&b",
    "electronic",
    "hip hop",
    "hip-hop",
    "metal",
    "folk",
    "jazz",
    "reggae",
    "blues",
    "country",
    "new age",
    "classical",
    "easy listening",
    "latin",
    "religious",
    "vocal",
    "indie",
];

pub const OTHER: &str = "other";

/// How many bars a genre chart shows.
pub const TOP_GENRES: usize = 5;

pub fn meta_genre(genre: &str) -> &'static str {
    let genre = genre.to_lowercase();
    META_GENRES
        .iter()
        .find(|meta| genre.contains(*meta))
        .copied()
        .unwrap_or(OTHER)
}

/// The meta genre of the first genre that has one.
pub fn meta_genre_from_list<'a>(genres: impl IntoIterator<Item = &'a str>) -> &'static str {
    genres
        .into_iter()
        .map(meta_genre)
        .find(|meta| *meta != OTHER)
        .unwrap_or(OTHER)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenreBar {
    pub name: String,
    /// Share of the observed total, 0-100
    pub percent: f64,
    pub gradient: Option<String>,
}

/// The `n` largest shares, as percentages of the sum of every share.
pub fn top(shares: &BTreeMap<String, GenreShare>, n: usize) -> Vec<GenreBar> {
    let total: f64 = shares.values().map(|s| s.portion.max(0.0)).sum();
    let mut bars: Vec<_> = shares
        .iter()
        .map(|(name, share)| GenreBar {
            name: name.clone(),
            percent: if total > 0.0 {
                share.portion.max(0.0) / total * 100.0
            } else {
                0.0
            },
            gradient: share.gradient.clone(),
        })
        .collect();
    bars.sort_by(|a, b| b.percent.total_cmp(&a.percent));
    bars.truncate(n);
    bars
}

#[derive(Clone, Debug, PartialEq)]
pub enum GenreState {
    Loading,
    Ready(GenreSummary),
    /// The fetch failed and nothing was cached
    Unavailable,
}

pub struct GenreLoader {
    api: Rc<Api>,
    mirror: Rc<Mirror>,
}

impl GenreLoader {
    pub fn new(api: Rc<Api>, mirror: Rc<Mirror>) -> GenreLoader {
        GenreLoader { api, mirror }
    }

    fn cached(&self, user_id: Option<&str>) -> Option<GenreSummary> {
        self.mirror
            .read(&Key::GenreData(user_id?.to_owned()))
    }

    /// What to paint before any network call.
    pub fn initial_state(&self, user_id: Option<&str>) -> GenreState {
        match self.cached(user_id) {
            Some(summary) => GenreState::Ready(summary),
            None => GenreState::Loading,
        }
    }

    /// A mirrored summary is used as is. Otherwise `/public-genres/{id}`
    /// (or `/genres` for the signed-in user) is fetched and mirrored.
    pub async fn load(&self, user_id: Option<&str>) -> GenreState {
        if let Some(summary) = self.cached(user_id) {
            debug!(?user_id, "genres served from mirror");
            return GenreState::Ready(summary);
        }
        let result = match user_id {
            Some(user_id) => self.api.public_genres(user_id).await,
            None => self.api.genres().await,
        };
        match result {
            Ok(summary) => {
                if let Some(user_id) = user_id {
                    self.mirror
                        .write(&Key::GenreData(user_id.to_owned()), &summary);
                }
                GenreState::Ready(summary)
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch genres");
                GenreState::Unavailable
            }
        }
    }

    /// Asks the server to recompute genres and forgets the mirrored copy.
    pub async fn refresh_genres(&self, user_id: &str) -> Result<(), Error> {
        self.api.refresh_genres(user_id).await?;
        self.mirror.remove(&Key::GenreData(user_id.to_owned()));
        Ok(())
    }
}

/// Meta-genre colour lookup, fetched at most once.
pub struct GradientCache {
    api: Rc<Api>,
    gradients: RefCell<Option<Rc<BTreeMap<String, String>>>>,
}

impl GradientCache {
    pub fn new(api: Rc<Api>) -> GradientCache {
        GradientCache {
            api,
            gradients: RefCell::new(None),
        }
    }

    /// A failed fetch is remembered as an empty map.
    pub async fn get(&self) -> Rc<BTreeMap<String, String>> {
        if let Some(gradients) = self.gradients.borrow().as_ref() {
            return Rc::clone(gradients);
        }
        let gradients = match self.api.meta_gradients().await {
            Ok(gradients) => gradients,
            Err(e) => {
                warn!(error = %e, "failed to fetch genre gradients");
                BTreeMap::new()
            }
        };
        let gradients = Rc::new(gradients);
        *self.gradients.borrow_mut() = Some(Rc::clone(&gradients));
        gradients
    }

    /// Background for a track's genre badge: an explicit gradient on its
    /// first genre, else the gradient of its meta genre.
    pub async fn gradient_for(&self, track: &Track) -> Option<String> {
        let genres = track.genres.as_ref()?;
        let gradients = self.get().await;
        match genres.first()? {
            TrackGenre::Tagged { name, gradient } => gradient
                .clone()
                .or_else(|| gradients.get(name).cloned()),
            TrackGenre::Name(_) => gradients
                .get(meta_genre_from_list(genres.iter().map(TrackGenre::name)))
                .cloned(),
        }
    }
}
