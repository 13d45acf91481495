use crate::{
    api::Api,
    context::Identity,
    mirror::{Key, Mirror, Scope},
    Error, Playlist, Registration, Session, SessionSource,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use tracing::{debug, info, warn};

/// Where the rendering layer currently is.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    Landing,
    Home,
    Onboard,
    /// `/u/{user_id}`, readable without a session
    Public { user_id: String },
    Other(String),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "" => Route::Landing,
            "/home" => Route::Home,
            "/onboard" => Route::Onboard,
            other => match other.strip_prefix("/u/") {
                Some(user_id) if !user_id.is_empty() && !user_id.contains('/') => Route::Public {
                    user_id: user_id.to_owned(),
                },
                _ => Route::Other(other.to_owned()),
            },
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Route::Public { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoginOutcome {
    /// Public pages never ask for a session
    Skipped,
    /// No identity marker, or the API rejected the credentials
    Unauthenticated,
    /// The API could not be reached or answered with garbage
    NetworkError(Error),
    Authenticated(Session),
}

/// Owns the single in-memory [`Session`] and mediates its refresh.
pub struct SessionCache {
    api: Rc<Api>,
    mirror: Rc<Mirror>,
    identity: Rc<dyn Identity>,
    source: SessionSource,
    session: RefCell<Option<Session>>,
    loading: Cell<bool>,
}

impl SessionCache {
    pub fn new(
        api: Rc<Api>,
        mirror: Rc<Mirror>,
        identity: Rc<dyn Identity>,
        source: SessionSource,
    ) -> SessionCache {
        SessionCache {
            api,
            mirror,
            identity,
            source,
            session: RefCell::new(None),
            loading: Cell::new(true),
        }
    }

    /// Seeds the cache from the mirror so the first paint does not wait on
    /// the network. Only meaningful while an identity marker is present.
    pub fn restore(&self) -> Option<Session> {
        self.identity.user_marker()?;
        let session: Session = self.mirror.read(&Key::Session)?;
        debug!(user_id = %session.user_id, "restored session from mirror");
        *self.session.borrow_mut() = Some(session.clone());
        Some(session)
    }

    pub async fn login(&self, route: &Route) -> LoginOutcome {
        if route.is_public() {
            debug!("public route, skipping session hydration");
            self.loading.set(false);
            return LoginOutcome::Skipped;
        }
        if self.identity.user_marker().is_none() {
            debug!("no identity marker, not probing for a session");
            *self.session.borrow_mut() = None;
            self.loading.set(false);
            return LoginOutcome::Unauthenticated;
        }
        self.loading.set(true);
        let outcome = match self.fetch().await {
            Ok(session) => {
                info!(user_id = %session.user_id, "authenticated");
                self.replace(session.clone());
                LoginOutcome::Authenticated(session)
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "session rejected");
                self.teardown();
                LoginOutcome::Unauthenticated
            }
            Err(e) => {
                // Any restored session stays in place; the caller decides
                // whether to retry or send the user to the landing page
                warn!(error = %e, "login failed");
                LoginOutcome::NetworkError(e)
            }
        };
        self.loading.set(false);
        outcome
    }

    /// Full refetch; the result replaces the cached session wholesale.
    pub async fn refresh(&self) -> Result<Session, Error> {
        let session = self.fetch().await?;
        self.replace(session.clone());
        Ok(session)
    }

    async fn fetch(&self) -> Result<Session, Error> {
        match self.source {
            SessionSource::Session => {
                let response = self.api.session().await?;
                Ok(Session::assemble(response.me, response.dashboard))
            }
            SessionSource::Dashboard => {
                let me = self.api.me().await?;
                let dashboard = self.api.dashboard().await?;
                Ok(Session::assemble(me, dashboard))
            }
        }
    }

    fn replace(&self, session: Session) {
        self.mirror.write(&Key::Session, &session);
        *self.session.borrow_mut() = Some(session);
    }

    pub fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn set_session(&self, session: Option<Session>) {
        match session {
            Some(session) => self.replace(session),
            None => {
                self.mirror.remove(&Key::Session);
                *self.session.borrow_mut() = None;
            }
        }
    }

    /// Optimistic local mutation, e.g. after a playlist edit, without a
    /// refetch. Returns false when there is no session to patch.
    pub fn update(&self, f: impl FnOnce(&mut Session)) -> bool {
        let Some(mut session) = self.session() else {
            return false;
        };
        f(&mut session);
        self.replace(session);
        true
    }

    pub fn user_id(&self) -> Option<String> {
        self.session.borrow().as_ref().map(|s| s.user_id.clone())
    }

    /// The playlists shown on the profile card.
    pub fn important_playlists(&self) -> Vec<Playlist> {
        self.session
            .borrow()
            .as_ref()
            .map(|s| {
                s.playlists
                    .featured
                    .iter()
                    .take(Session::MAX_FEATURED)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Extends the server session. A failure means the session is gone and
    /// the identity scope is torn down.
    pub async fn refresh_session(&self) -> bool {
        match self.api.refresh_session().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "session refresh failed");
                self.teardown();
                false
            }
        }
    }

    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "logout failed");
        }
        self.teardown();
    }

    pub async fn delete_account(&self) -> Result<(), Error> {
        let user_id = self
            .user_id()
            .ok_or_else(|| Error::Config("no signed-in user".to_owned()))?;
        self.api.delete_user(&user_id).await?;
        info!(%user_id, "account deleted");
        self.logout().await;
        Ok(())
    }

    /// Completes onboarding. The session itself is hydrated by the next login.
    pub async fn register(&self, registration: &Registration) -> Result<(), Error> {
        self.api.register(registration).await?;
        info!(user_id = %registration.user_id, "registered");
        Ok(())
    }

    pub fn teardown(&self) {
        *self.session.borrow_mut() = None;
        self.mirror.clear(Scope::Identity);
    }
}

#[cfg(test)]
mod test {
    use super::{LoginOutcome, Route, SessionCache};
    use crate::{
        api::Api,
        context::test::{ManualClock, TestIdentity},
        fetch::{
            test::{ok, status, TestGateway},
            FetchClient, RetryPolicy,
        },
        mirror::{Key, MemoryStore, Mirror, Store},
        Error, Registration, Session, SessionSource, Track,
    };
    use serde_json::{json, Value};
    use std::rc::Rc;

    fn session_json() -> Value {
        json!({
            "user_id": "u1",
            "display_name": "User",
            "profile_image_url": "https://img/u1.png",
            "playlists": {
                "all": [{"id": "a", "name": "A", "tracks": 3}, {"playlist_id": "b", "track_count": 4}],
                "featured": [{"playlist_id": "b", "track_count": 4}]
            },
            "genres": {"meta_genres": {"pop": {"portion": 0.7}}, "sub_genres": {}},
            "last_played": {"name": "X", "artist": "Y"}
        })
    }

    struct Harness {
        gateway: Rc<TestGateway>,
        store: Rc<MemoryStore>,
        cache: SessionCache,
    }

    fn harness(marker: Option<&str>, source: SessionSource) -> Harness {
        let gateway = TestGateway::new(Vec::new());
        let store = MemoryStore::new();
        let api = Rc::new(Api::new(FetchClient::new(
            gateway.clone(),
            ManualClock::new(),
            RetryPolicy::none(),
        )));
        let cache = SessionCache::new(
            api,
            Rc::new(Mirror::new(store.clone())),
            Rc::new(TestIdentity(marker.map(str::to_owned))),
            source,
        );
        Harness {
            gateway,
            store,
            cache,
        }
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/"), Route::Landing);
        assert_eq!(Route::parse("/home?tab=1"), Route::Home);
        assert_eq!(
            Route::parse("/u/u1"),
            Route::Public {
                user_id: "u1".to_owned()
            }
        );
        assert_eq!(Route::parse("/u/"), Route::Other("/u".to_owned()));
        assert_eq!(Route::parse("/dev"), Route::Other("/dev".to_owned()));
    }

    #[tokio::test]
    async fn test_login_without_marker_makes_no_request() {
        let h = harness(None, SessionSource::Session);
        assert_eq!(h.cache.login(&Route::Home).await, LoginOutcome::Unauthenticated);
        assert!(h.gateway.call_args.borrow().is_empty());
        assert!(!h.cache.is_loading());
        assert_eq!(h.cache.session(), None);
    }

    #[tokio::test]
    async fn test_login_on_public_route_is_skipped() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        assert_eq!(
            h.cache.login(&Route::parse("/u/someone")).await,
            LoginOutcome::Skipped
        );
        assert!(h.gateway.call_args.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_login_session_source() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        h.gateway.push(ok(session_json()));
        let LoginOutcome::Authenticated(session) = h.cache.login(&Route::Home).await else {
            panic!("expected a session");
        };
        assert_eq!(h.gateway.paths(), ["GET /session"]);
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.playlists.all.len(), 2);
        assert_eq!(session.last_played, Some(Track::new("X", "Y")));
        assert_eq!(h.cache.user_id().as_deref(), Some("u1"));
        assert_eq!(
            h.cache
                .important_playlists()
                .iter()
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>(),
            ["b"]
        );
        // Written through to the mirror
        let stored: Session =
            serde_json::from_str(&h.store.get("session").unwrap().unwrap()).unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn test_login_dashboard_source() {
        let h = harness(Some("u1.sig"), SessionSource::Dashboard);
        h.gateway
            .push(ok(json!({"user_id": "u1", "display_name": "User"})));
        h.gateway.push(ok(json!({
            "playlists": {"all": [], "featured": []},
            "genres": null,
            "last_played": {}
        })));
        let LoginOutcome::Authenticated(session) = h.cache.login(&Route::Home).await else {
            panic!("expected a session");
        };
        assert_eq!(h.gateway.paths(), ["GET /me", "GET /dashboard"]);
        assert_eq!(session.display_name.as_deref(), Some("User"));
        assert_eq!(session.last_played, None);
    }

    #[tokio::test]
    async fn test_login_unauthorized() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        h.store.set("session", r#"{"user_id": "u1"}"#).unwrap();
        h.store
            .set("last_played_track", r#"{"name": "X", "artist": "Y"}"#)
            .unwrap();
        h.store.set("theme", "dark").unwrap();
        assert!(h.cache.restore().is_some());

        h.gateway
            .push(status(401, r#"{"detail": "Missing sinatra_user_id cookie"}"#));
        assert_eq!(h.cache.login(&Route::Home).await, LoginOutcome::Unauthenticated);
        assert_eq!(h.cache.session(), None);
        assert!(!h.cache.is_loading());
        assert_eq!(h.store.keys().unwrap(), ["theme"]);

        // A reload with the cookie still present has nothing to repaint
        let reloaded = SessionCache::new(
            Rc::new(Api::new(FetchClient::new(
                h.gateway.clone(),
                ManualClock::new(),
                RetryPolicy::none(),
            ))),
            Rc::new(Mirror::new(h.store.clone())),
            Rc::new(TestIdentity(Some("u1.sig".to_owned()))),
            SessionSource::Session,
        );
        assert_eq!(reloaded.restore(), None);
    }

    #[tokio::test]
    async fn test_login_network_error_keeps_restored_session() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        let cached = Session {
            user_id: "u1".to_owned(),
            ..Session::default()
        };
        h.store
            .set("session", &serde_json::to_string(&cached).unwrap())
            .unwrap();
        assert_eq!(h.cache.restore(), Some(cached.clone()));
        assert!(h.gateway.call_args.borrow().is_empty());

        h.gateway.push(Err(Error::network("offline")));
        assert_eq!(
            h.cache.login(&Route::Home).await,
            LoginOutcome::NetworkError(Error::network("offline"))
        );
        assert_eq!(h.cache.session(), Some(cached));
    }

    #[tokio::test]
    async fn test_restore_requires_marker() {
        let h = harness(None, SessionSource::Session);
        h.store.set("session", r#"{"user_id": "u1"}"#).unwrap();
        assert_eq!(h.cache.restore(), None);
    }

    #[tokio::test]
    async fn test_update_patches_and_writes_through() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        assert!(!h.cache.update(|s| s.display_name = None));
        h.gateway.push(ok(session_json()));
        h.cache.login(&Route::Home).await;
        assert!(h.cache.update(|s| s.playlists.featured.clear()));
        assert!(h.cache.important_playlists().is_empty());
        let stored: Session =
            serde_json::from_str(&h.store.get("session").unwrap().unwrap()).unwrap();
        assert!(stored.playlists.featured.is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_identity_scope_only() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        h.gateway.push(ok(session_json()));
        h.cache.login(&Route::Home).await;
        h.store.set("theme", "dark").unwrap();
        h.store.set("genreData:u1", "{}").unwrap();
        // Logout failures are not fatal
        h.gateway.push(status(500, ""));
        h.cache.logout().await;
        assert_eq!(h.cache.session(), None);
        assert_eq!(h.store.keys().unwrap(), ["theme"]);
        assert_eq!(h.gateway.paths(), ["GET /session", "GET /logout"]);
        assert_eq!(Mirror::new(h.store.clone()).read_raw(&Key::Theme).as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn test_refresh_session_failure_tears_down() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        h.gateway.push(ok(session_json()));
        h.cache.login(&Route::Home).await;
        h.gateway.push(ok(json!({"status": "ok"})));
        assert!(h.cache.refresh_session().await);
        assert!(h.cache.session().is_some());
        h.gateway.push(status(401, ""));
        assert!(!h.cache.refresh_session().await);
        assert_eq!(h.cache.session(), None);
        assert!(h.store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_account() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        assert!(h.cache.delete_account().await.is_err());
        h.gateway.push(ok(session_json()));
        h.cache.login(&Route::Home).await;
        h.gateway.push(ok(json!({"status": "deleted"})));
        h.gateway.push(ok(json!({"status": "logged out"})));
        h.cache.delete_account().await.unwrap();
        assert_eq!(
            h.gateway.paths(),
            [
                "GET /session",
                "DELETE /delete-user?user_id=u1",
                "GET /logout"
            ]
        );
        assert_eq!(h.cache.session(), None);
    }

    #[tokio::test]
    async fn test_register() {
        let h = harness(Some("u1.sig"), SessionSource::Session);
        h.gateway.push(ok(json!({"status": "registered"})));
        let registration = Registration {
            user_id: "u1".to_owned(),
            display_name: "User".to_owned(),
            ..Registration::default()
        };
        h.cache.register(&registration).await.unwrap();
        let call_args = h.gateway.call_args.borrow();
        assert_eq!(call_args[0].path, "/register");
        let body: Value = serde_json::from_str(call_args[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["selected_playlists"], json!([]));
    }
}
