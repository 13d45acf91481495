use crate::{
    api::Api,
    fetch::{FetchClient, Gateway},
    genres::{GenreLoader, GradientCache},
    mirror::{Mirror, Store},
    playlists::PlaylistCatalog,
    poller::Poller,
    profile::ProfileLoader,
    session::SessionCache,
    theme::ThemeStore,
    Config,
};
use async_trait::async_trait;
use std::{rc::Rc, time::Duration};
use time::OffsetDateTime;

/// Name of the session-presence cookie set by the API.
pub const USER_COOKIE: &str = "sinatra_user_id";

#[async_trait(?Send)]
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
    async fn sleep(&self, duration: Duration);
}

/// Local evidence that a session might exist, checked before any login request.
pub trait Identity {
    fn user_marker(&self) -> Option<String>;
}

pub trait Visibility {
    fn is_visible(&self) -> bool;
}

pub struct AlwaysVisible;

impl Visibility for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }
}

/// Finds `name` in a `Cookie` header or `document.cookie` string.
pub fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// Everything the sync layer needs, built once at start-up and handed to
/// each component at construction.
pub struct Context {
    pub config: Config,
    pub api: Rc<Api>,
    pub mirror: Rc<Mirror>,
    pub clock: Rc<dyn Clock>,
    pub identity: Rc<dyn Identity>,
    pub visibility: Rc<dyn Visibility>,
    pub session: Rc<SessionCache>,
    pub gradients: Rc<GradientCache>,
}

impl Context {
    pub fn new(
        config: Config,
        gateway: Rc<dyn Gateway>,
        store: Rc<dyn Store>,
        clock: Rc<dyn Clock>,
        identity: Rc<dyn Identity>,
        visibility: Rc<dyn Visibility>,
    ) -> Context {
        let api = Rc::new(Api::new(FetchClient::new(
            gateway,
            Rc::clone(&clock),
            config.retry,
        )));
        let mirror = Rc::new(Mirror::new(store));
        let session = Rc::new(SessionCache::new(
            Rc::clone(&api),
            Rc::clone(&mirror),
            Rc::clone(&identity),
            config.session_source,
        ));
        let gradients = Rc::new(GradientCache::new(Rc::clone(&api)));
        Context {
            config,
            api,
            mirror,
            clock,
            identity,
            visibility,
            session,
            gradients,
        }
    }

    /// A poller seeded from the current session and the mirror.
    pub fn poller(&self) -> Rc<Poller> {
        let poller = Rc::new(Poller::new(
            Rc::clone(&self.api),
            Rc::clone(&self.mirror),
            Rc::clone(&self.clock),
            Rc::clone(&self.visibility),
            &self.config,
        ));
        poller.seed(self.session.session().and_then(|s| s.last_played));
        poller
    }

    pub fn genres(&self) -> GenreLoader {
        GenreLoader::new(Rc::clone(&self.api), Rc::clone(&self.mirror))
    }

    pub fn profiles(&self) -> ProfileLoader {
        ProfileLoader::new(Rc::clone(&self.api), Rc::clone(&self.mirror))
    }

    pub fn playlists(&self) -> PlaylistCatalog {
        PlaylistCatalog::new(Rc::clone(&self.api), Rc::clone(&self.session))
    }

    pub fn theme(&self) -> ThemeStore {
        ThemeStore::new(Rc::clone(&self.mirror))
    }

    /// Ends the signed-in lifecycle: server logout, then the identity scope
    /// of the mirror and the in-memory session are dropped.
    pub async fn logout(&self) {
        self.session.logout().await;
    }
}
