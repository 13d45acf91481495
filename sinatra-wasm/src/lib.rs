use crate::platform::{BrowserClock, DocumentCookie, DocumentVisibility, FetchGateway, LocalStorage};
use serde::Serialize;
use sinatra::{
    genres::{top, GenreBar, GenreState, TOP_GENRES},
    poller::{NowPlaying, Poller},
    session::{LoginOutcome, Route},
    theme::Theme,
    Config, Context, Error, Session, Track,
};
use std::{cell::RefCell, rc::Rc};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

pub mod platform;

/// What the rendering layer draws for the now-playing card.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NowPlayingView {
    pub track: Option<Track>,
    pub display_name: Option<String>,
    pub last_updated: Option<String>,
    pub refreshing: bool,
    pub track_changed: bool,
}

impl NowPlayingView {
    pub fn new(state: &NowPlaying) -> NowPlayingView {
        NowPlayingView {
            track: state.track.clone(),
            display_name: state
                .track
                .as_ref()
                .map(|t| sinatra::display::clean_track_name(&t.name)),
            last_updated: state.last_updated.and_then(|t| t.format(&Rfc3339).ok()),
            refreshing: state.refreshing,
            track_changed: state.track_changed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginView {
    Skipped,
    Unauthenticated,
    NetworkError { message: String, session: Option<Session> },
    Authenticated { session: Session },
}

impl LoginView {
    pub fn new(outcome: LoginOutcome, restored: Option<Session>) -> LoginView {
        match outcome {
            LoginOutcome::Skipped => LoginView::Skipped,
            LoginOutcome::Unauthenticated => LoginView::Unauthenticated,
            LoginOutcome::NetworkError(e) => LoginView::NetworkError {
                message: e.to_string(),
                session: restored,
            },
            LoginOutcome::Authenticated(session) => LoginView::Authenticated { session },
        }
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn error_to_js(e: Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Entry point for the page. One instance per tab.
#[wasm_bindgen]
pub struct SinatraClient {
    context: Rc<Context>,
    poller: RefCell<Option<Rc<Poller>>>,
}

#[wasm_bindgen]
impl SinatraClient {
    #[wasm_bindgen(constructor)]
    pub fn new(base_url: String) -> Result<SinatraClient, JsValue> {
        console_error_panic_hook::set_once();
        let config = Config::new(base_url).map_err(error_to_js)?;
        let store = LocalStorage::new().map_err(error_to_js)?;
        let context = Context::new(
            config.clone(),
            Rc::new(FetchGateway::new(config)),
            Rc::new(store),
            Rc::new(BrowserClock),
            Rc::new(DocumentCookie),
            Rc::new(DocumentVisibility),
        );
        Ok(SinatraClient {
            context: Rc::new(context),
            poller: RefCell::new(None),
        })
    }

    /// The mirrored session, available synchronously for the first paint.
    pub fn restore(&self) -> Result<JsValue, JsValue> {
        to_js(&self.context.session.restore())
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.context.session.is_loading()
    }

    /// Resolves to a tagged `{status, ...}` object.
    pub fn login(&self, path: String) -> js_sys::Promise {
        let context = Rc::clone(&self.context);
        future_to_promise(async move {
            let route = Route::parse(&path);
            let outcome = context.session.login(&route).await;
            to_js(&LoginView::new(outcome, context.session.session()))
        })
    }

    pub fn logout(&self) -> js_sys::Promise {
        self.stop_polling();
        let context = Rc::clone(&self.context);
        future_to_promise(async move {
            context.logout().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Top meta-genre bars for `user_id`, or for the signed-in user.
    pub fn genres(&self, user_id: Option<String>) -> js_sys::Promise {
        let context = Rc::clone(&self.context);
        future_to_promise(async move {
            let bars: Option<Vec<GenreBar>> =
                match context.genres().load(user_id.as_deref()).await {
                    GenreState::Ready(summary) => Some(top(&summary.meta_genres, TOP_GENRES)),
                    GenreState::Loading | GenreState::Unavailable => None,
                };
            to_js(&bars)
        })
    }

    /// The mirrored public profile, available synchronously for the first
    /// paint. `publicProfile` then replaces it with the fetched one.
    #[wasm_bindgen(js_name = cachedPublicProfile)]
    pub fn cached_public_profile(&self, user_id: String) -> Result<JsValue, JsValue> {
        to_js(&self.context.profiles().cached(&user_id))
    }

    #[wasm_bindgen(js_name = publicProfile)]
    pub fn public_profile(&self, user_id: String) -> js_sys::Promise {
        let context = Rc::clone(&self.context);
        future_to_promise(async move { to_js(&context.profiles().load(&user_id).await) })
    }

    #[wasm_bindgen(js_name = refreshNowPlaying)]
    pub fn refresh_now_playing(&self) -> js_sys::Promise {
        let poller = self.poller();
        future_to_promise(async move {
            poller.tick().await;
            to_js(&NowPlayingView::new(&poller.state()))
        })
    }

    /// Calls `listener` with a now-playing view on every state change and
    /// keeps polling until [`SinatraClient::stop_polling`].
    #[wasm_bindgen(js_name = startPolling)]
    pub fn start_polling(&self, listener: js_sys::Function) {
        self.stop_polling();
        let poller = self.context.poller();
        poller.subscribe(move |state| {
            if let Ok(view) = to_js(&NowPlayingView::new(state)) {
                if let Err(e) = listener.call1(&JsValue::NULL, &view) {
                    tracing::warn!(error = ?e, "now playing listener threw");
                }
            }
        });
        *self.poller.borrow_mut() = Some(Rc::clone(&poller));
        spawn_local(async move {
            poller.tick().await;
            poller.run().await;
        });
    }

    #[wasm_bindgen(js_name = stopPolling)]
    pub fn stop_polling(&self) {
        if let Some(poller) = self.poller.borrow_mut().take() {
            poller.stop();
        }
    }

    /// `prefers_dark` is the `prefers-color-scheme` media query result.
    pub fn theme(&self, prefers_dark: bool) -> String {
        self.context.theme().resolve(prefers_dark).to_string()
    }

    #[wasm_bindgen(js_name = toggleTheme)]
    pub fn toggle_theme(&self, prefers_dark: bool) -> String {
        let store = self.context.theme();
        store.toggle(store.resolve(prefers_dark)).to_string()
    }
}

impl SinatraClient {
    fn poller(&self) -> Rc<Poller> {
        self.poller
            .borrow_mut()
            .get_or_insert_with(|| self.context.poller())
            .clone()
    }
}

#[wasm_bindgen(js_name = cleanTrackName)]
pub fn clean_track_name(name: &str) -> String {
    sinatra::display::clean_track_name(name)
}

/// `then` is an RFC 3339 timestamp; anything unparseable reads as "just now".
#[wasm_bindgen(js_name = freshnessLabel)]
pub fn freshness_label(then: &str) -> String {
    let now = OffsetDateTime::from_unix_timestamp_nanos((js_sys::Date::now() * 1_000_000.0) as i128)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    freshness_between(now, then)
}

pub fn freshness_between(now: OffsetDateTime, then: &str) -> String {
    match OffsetDateTime::parse(then, &Rfc3339) {
        Ok(then) => sinatra::display::freshness_label(now, then),
        Err(_) => sinatra::display::freshness_label(now, now),
    }
}

#[wasm_bindgen(js_name = themeCssVars)]
pub fn theme_css_vars(theme: &str) -> Result<JsValue, JsValue> {
    let theme: Theme = theme.parse().unwrap_or_default();
    to_js(&theme.css_vars())
}
