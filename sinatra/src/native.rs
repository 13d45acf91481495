//! Platform adapters for running the sync layer outside a browser.
use crate::{
    context::{find_cookie, Clock, Identity, USER_COOKIE},
    fetch::{Gateway, Method, Request, Response},
    mirror::Store,
    Config, Error,
};
use async_trait::async_trait;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::CONTENT_TYPE,
    Client, Url,
};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Sends requests with reqwest, keeping cookies in a jar the way a browser
/// would for `credentials: include`.
pub struct HttpGateway {
    client: Client,
    jar: Arc<Jar>,
    config: Config,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<HttpGateway, Error> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("sinatra/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpGateway {
            client,
            jar,
            config: config.clone(),
        })
    }

    fn origin(&self) -> Result<Url, Error> {
        Url::parse(&self.config.base_url).map_err(|e| Error::Config(e.to_string()))
    }

    /// Seeds the session cookie a browser would already hold.
    pub fn with_user_cookie(self, value: &str) -> Result<HttpGateway, Error> {
        let origin = self.origin()?;
        self.jar
            .add_cookie_str(&format!("{USER_COOKIE}={value}; Path=/"), &origin);
        Ok(self)
    }

    /// Reads the session cookie back out of this gateway's jar.
    pub fn identity(&self) -> Result<CookieIdentity, Error> {
        Ok(CookieIdentity {
            jar: Arc::clone(&self.jar),
            origin: self.origin()?,
        })
    }
}

#[async_trait(?Send)]
impl Gateway for HttpGateway {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let url = self.config.url(&request.path);
        debug!(method = request.method.as_str(), %url, "sending request");
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Response { status, body })
    }
}

pub struct CookieIdentity {
    jar: Arc<Jar>,
    origin: Url,
}

impl Identity for CookieIdentity {
    fn user_marker(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.origin)?;
        find_cookie(cookies.to_str().ok()?, USER_COOKIE)
    }
}

/// A [`Store`] kept as one JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
}

impl FileStore {
    /// A missing file is an empty store; an unreadable one is replaced.
    pub fn open(path: impl AsRef<Path>) -> Result<FileStore, Error> {
        let path = path.as_ref().to_owned();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding corrupt mirror file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(FileStore {
            path,
            entries: RefCell::new(entries),
        })
    }

    fn persist(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&*self.entries.borrow())?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        self.persist()
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        if self.entries.borrow_mut().remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

pub struct TokioClock;

#[async_trait(?Send)]
impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
