use sinatra::{
    context::{AlwaysVisible, Clock},
    display::{clean_track_name, freshness_label},
    genres::{top, GenreBar, GenreState, TOP_GENRES},
    native::{FileStore, HttpGateway, TokioClock},
    poller::NowPlaying,
    profile::PublicProfile,
    session::{LoginOutcome, Route},
    Config, Context, Error, Session,
};
use std::{path::PathBuf, rc::Rc, time::Duration};
use tracing::{info, warn};

/// Environment the client is started from.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub config: Config,
    /// Value of the session cookie, as a browser would hold it
    pub user_cookie: Option<String>,
    pub mirror_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Settings, Error> {
        Settings::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Settings, Error> {
        let base_url = var("SINATRA_API_BASE_URL")
            .ok_or_else(|| Error::Config("Set env variable SINATRA_API_BASE_URL first!".to_owned()))?;
        let mut config = Config::new(base_url)?;
        if let Some(secs) = var("SINATRA_POLL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("SINATRA_POLL_SECS is not a number: {secs}")))?;
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        let mirror_path = var("SINATRA_MIRROR_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_mirror_path);
        Ok(Settings {
            config,
            user_cookie: var("SINATRA_USER_COOKIE").filter(|c| !c.is_empty()),
            mirror_path,
        })
    }

    pub fn context(&self) -> Result<Context, Error> {
        let mut gateway = HttpGateway::new(&self.config)?;
        if let Some(cookie) = &self.user_cookie {
            gateway = gateway.with_user_cookie(cookie)?;
        }
        let identity = gateway.identity()?;
        let store = FileStore::open(&self.mirror_path)?;
        Ok(Context::new(
            self.config.clone(),
            Rc::new(gateway),
            Rc::new(store),
            Rc::new(TokioClock),
            Rc::new(identity),
            Rc::new(AlwaysVisible),
        ))
    }
}

fn default_mirror_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sinatra")
        .join("mirror.json")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Watch,
    Profile(String),
    Genres,
    Logout,
}

impl Command {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Command, Error> {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None | Some("watch") => Command::Watch,
            Some("profile") => Command::Profile(
                args.next()
                    .ok_or_else(|| Error::Config("usage: profile <user_id>".to_owned()))?,
            ),
            Some("genres") => Command::Genres,
            Some("logout") => Command::Logout,
            Some(other) => return Err(Error::Config(format!("unknown command {other}"))),
        };
        Ok(command)
    }
}

pub fn describe_track(state: &NowPlaying, now: time::OffsetDateTime) -> Option<String> {
    let track = state.track.as_ref()?;
    let mut line = format!("{} - {}", clean_track_name(&track.name), track.artist);
    if let Some(updated) = state.last_updated {
        line.push_str(&format!(" ({})", freshness_label(now, updated)));
    }
    Some(line)
}

/// Hydrates the session, painting any mirrored copy first.
pub async fn login(context: &Context) -> Result<Session, Error> {
    if let Some(session) = context.session.restore() {
        info!(user_id = %session.user_id, "using mirrored session until the API answers");
    }
    match context.session.login(&Route::Home).await {
        LoginOutcome::Authenticated(session) => Ok(session),
        LoginOutcome::NetworkError(e) => match context.session.session() {
            Some(session) => {
                warn!(error = %e, "API unreachable, continuing with the mirrored session");
                Ok(session)
            }
            None => Err(e),
        },
        LoginOutcome::Unauthenticated | LoginOutcome::Skipped => Err(Error::RequestFailed {
            status: 401,
            body: "not signed in; set SINATRA_USER_COOKIE".to_owned(),
        }),
    }
}

/// Polls now playing until interrupted.
pub async fn watch(context: &Context) -> Result<(), Error> {
    let session = login(context).await?;
    info!(
        user_id = %session.user_id,
        playlists = session.playlists.all.len(),
        "signed in"
    );
    let poller = context.poller();
    let clock = Rc::clone(&context.clock);
    poller.subscribe(move |state| {
        if state.track_changed {
            if let Some(line) = describe_track(state, clock.now()) {
                println!("{line}");
            }
        }
    });
    if let Some(line) = describe_track(&poller.state(), context.clock.now()) {
        println!("{line}");
    }
    poller.tick().await;
    tokio::select! {
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            poller.stop();
            info!("interrupted");
        }
    }
    Ok(())
}

/// The signed-in user's top meta genres, from `/genres`.
pub async fn genres(context: &Context) -> Result<Option<Vec<GenreBar>>, Error> {
    login(context).await?;
    Ok(match context.genres().load(None).await {
        GenreState::Ready(summary) => Some(top(&summary.meta_genres, TOP_GENRES)),
        GenreState::Loading | GenreState::Unavailable => None,
    })
}

pub async fn profile(context: &Context, user_id: &str) -> Result<PublicProfile, Error> {
    match context.profiles().load(user_id).await {
        Some(profile) => Ok(profile),
        None => Err(Error::RequestFailed {
            status: 404,
            body: format!("no profile for {user_id}"),
        }),
    }
}
