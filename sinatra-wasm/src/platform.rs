//! Browser implementations of the sync layer's platform seams.
use async_trait::async_trait;
use js_sys::{Date, Function, Promise};
use sinatra::{
    context::{find_cookie, Clock, Identity, Visibility, USER_COOKIE},
    fetch::{Gateway, Request, Response},
    mirror::Store,
    Config, Error,
};
use std::time::Duration;
use time::OffsetDateTime;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlDocument, RequestCredentials, RequestInit, RequestMode, VisibilityState, Window};

fn window() -> Window {
    web_sys::window().expect("no global `window` exists")
}

fn describe(e: JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}

fn network(e: JsValue) -> Error {
    Error::network(describe(e))
}

fn storage(e: JsValue) -> Error {
    Error::storage(describe(e))
}

/// `fetch` with the browser's cookies attached.
pub struct FetchGateway {
    config: Config,
}

impl FetchGateway {
    pub fn new(config: Config) -> FetchGateway {
        FetchGateway { config }
    }
}

#[async_trait(?Send)]
impl Gateway for FetchGateway {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let opts = RequestInit::new();
        opts.set_method(request.method.as_str());
        opts.set_mode(RequestMode::Cors);
        opts.set_credentials(RequestCredentials::Include);
        if let Some(body) = &request.body {
            opts.set_body(&JsValue::from_str(body));
        }
        let url = self.config.url(&request.path);
        let js_request = web_sys::Request::new_with_str_and_init(&url, &opts).map_err(network)?;
        if request.body.is_some() {
            js_request
                .headers()
                .set("Content-Type", "application/json")
                .map_err(network)?;
        }
        let resp_value = JsFuture::from(window().fetch_with_request(&js_request))
            .await
            .map_err(network)?;
        let resp: web_sys::Response = resp_value.dyn_into().map_err(network)?;
        let text = JsFuture::from(resp.text().map_err(network)?)
            .await
            .map_err(network)?;
        Ok(Response {
            status: resp.status(),
            body: text.as_string().unwrap_or_default(),
        })
    }
}

/// `window.localStorage`.
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    pub fn new() -> Result<LocalStorage, Error> {
        let storage = window()
            .local_storage()
            .map_err(storage)?
            .ok_or_else(|| Error::storage("localStorage is unavailable"))?;
        Ok(LocalStorage { storage })
    }
}

impl Store for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.storage.get_item(key).map_err(storage)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.storage.set_item(key, value).map_err(storage)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.storage.remove_item(key).map_err(storage)
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        let len = self.storage.length().map_err(storage)?;
        let mut keys = Vec::with_capacity(len as usize);
        for i in 0..len {
            if let Some(key) = self.storage.key(i).map_err(storage)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn document() -> Option<web_sys::Document> {
    window().document()
}

/// Presence of the session cookie in `document.cookie`. The cookie is
/// only read here; the API sets and clears it.
pub struct DocumentCookie;

impl Identity for DocumentCookie {
    fn user_marker(&self) -> Option<String> {
        let document: HtmlDocument = document()?.dyn_into().ok()?;
        find_cookie(&document.cookie().ok()?, USER_COOKIE)
    }
}

pub struct DocumentVisibility;

impl Visibility for DocumentVisibility {
    fn is_visible(&self) -> bool {
        document().map_or(true, |d| d.visibility_state() == VisibilityState::Visible)
    }
}

pub struct BrowserClock;

#[async_trait(?Send)]
impl Clock for BrowserClock {
    fn now(&self) -> OffsetDateTime {
        let nanos = (Date::now() * 1_000_000.0) as i128;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    async fn sleep(&self, duration: Duration) {
        let millis = duration.as_millis().min(i32::MAX as u128) as i32;
        let promise = timer_promise(|resolve| {
            window().set_timeout_with_callback_and_timeout_and_arguments_0(resolve, millis)
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// A promise resolved by whatever `schedule` arranges, or at once if
/// scheduling fails.
pub fn timer_promise(schedule: impl Fn(&Function) -> Result<i32, JsValue>) -> Promise {
    Promise::new(&mut |resolve, _| {
        if let Err(e) = schedule(&resolve) {
            tracing::warn!(error = %describe(e), "could not schedule timer, not sleeping");
            let _ = resolve.call0(&JsValue::UNDEFINED);
        }
    })
}
