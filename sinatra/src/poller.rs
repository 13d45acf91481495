//! Periodic refresh of the now-playing track.
//!
//! Each tick asks the API for live playback, falls back to the recently
//! played track, and commits only when the result differs structurally
//! from what is displayed. Overlapping ticks are refused rather than raced.
use crate::{
    api::Api,
    context::{Clock, Visibility},
    mirror::{Key, Mirror},
    Config, Error, Track,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, warn};

/// What the rendering layer draws from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NowPlaying {
    pub track: Option<Track>,
    pub last_updated: Option<OffsetDateTime>,
    /// A tick is in progress, or finished less than the refreshing hold ago
    pub refreshing: bool,
    /// Raised for the changed-flag hold after a new track is committed
    pub track_changed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    /// Another tick was still in flight
    Skipped,
    NoTrack,
    Unchanged,
    Changed(Track),
    Failed(Error),
}

type Listener = Rc<dyn Fn(&NowPlaying)>;

pub struct Poller {
    api: Rc<Api>,
    mirror: Rc<Mirror>,
    clock: Rc<dyn Clock>,
    visibility: Rc<dyn Visibility>,
    interval: Duration,
    track_changed_hold: Duration,
    refreshing_hold: Duration,
    state: RefCell<NowPlaying>,
    listeners: RefCell<Vec<Listener>>,
    in_flight: Cell<bool>,
    stopped: Rc<Cell<bool>>,
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

impl Poller {
    pub fn new(
        api: Rc<Api>,
        mirror: Rc<Mirror>,
        clock: Rc<dyn Clock>,
        visibility: Rc<dyn Visibility>,
        config: &Config,
    ) -> Poller {
        Poller {
            api,
            mirror,
            clock,
            visibility,
            interval: config.poll_interval,
            track_changed_hold: config.track_changed_hold,
            refreshing_hold: config.refreshing_hold,
            state: RefCell::new(NowPlaying::default()),
            listeners: RefCell::new(Vec::new()),
            in_flight: Cell::new(false),
            stopped: Rc::new(Cell::new(false)),
        }
    }

    /// Sets the displayed track before the first tick. Without a session
    /// track the mirrored one is used; the mirrored update time wins over
    /// the track's own timestamp.
    pub fn seed(&self, track: Option<Track>) {
        let track = track.or_else(|| self.mirror.read(&Key::LastPlayedTrack));
        let last_updated = self
            .mirror
            .read_raw(&Key::LastPlayedUpdatedAt)
            .and_then(|raw| parse_timestamp(&raw))
            .or_else(|| {
                track
                    .as_ref()
                    .and_then(|t| t.timestamp.as_deref().or(t.played_at.as_deref()))
                    .and_then(parse_timestamp)
            });
        self.set(|state| {
            state.track = track;
            state.last_updated = last_updated;
        });
    }

    pub fn subscribe(&self, listener: impl Fn(&NowPlaying) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    pub fn state(&self) -> NowPlaying {
        self.state.borrow().clone()
    }

    fn set(&self, f: impl FnOnce(&mut NowPlaying)) {
        let state = {
            let mut state = self.state.borrow_mut();
            f(&mut state);
            state.clone()
        };
        // Listeners may subscribe others; those hear from the next change on
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&state);
        }
    }

    pub async fn tick(&self) -> Tick {
        if self.in_flight.replace(true) {
            debug!("previous tick still in flight, skipping");
            return Tick::Skipped;
        }
        self.set(|state| state.refreshing = true);

        let tick = match self.latest().await {
            Ok(None) => Tick::NoTrack,
            Ok(Some(track)) if self.state.borrow().track.as_ref() == Some(&track) => {
                Tick::Unchanged
            }
            Ok(Some(track)) => {
                self.commit(track.clone());
                Tick::Changed(track)
            }
            Err(e) => {
                warn!(error = %e, "now-playing refresh failed");
                Tick::Failed(e)
            }
        };

        let clear_changed = async {
            if matches!(tick, Tick::Changed(_)) {
                self.clock.sleep(self.track_changed_hold).await;
                self.set(|state| state.track_changed = false);
            }
        };
        let clear_refreshing = async {
            self.clock.sleep(self.refreshing_hold).await;
            self.set(|state| state.refreshing = false);
        };
        futures::join!(clear_changed, clear_refreshing);

        self.in_flight.set(false);
        tick
    }

    async fn latest(&self) -> Result<Option<Track>, Error> {
        if let Some(track) = self.api.update_playing().await?.into_track() {
            return Ok(Some(track));
        }
        debug!("nothing playing, falling back to recently played");
        Ok(self.api.recently_played().await?.into_track())
    }

    fn commit(&self, track: Track) {
        let now = self.clock.now();
        info!(name = %track.name, artist = %track.artist, "track changed");
        self.mirror.write(&Key::LastPlayedTrack, &track);
        match now.format(&Rfc3339) {
            Ok(stamp) => self.mirror.write_raw(&Key::LastPlayedUpdatedAt, &stamp),
            Err(e) => warn!(error = %e, "could not format update time"),
        }
        self.set(|state| {
            state.track = Some(track);
            state.last_updated = Some(now);
            state.track_changed = true;
        });
    }

    /// Ticks every poll interval while the document is visible, until
    /// stopped. A hidden document skips the tick but keeps the schedule.
    /// A stopped poller stays stopped; build a new one to poll again.
    pub async fn run(&self) {
        while !self.stopped.get() {
            self.clock.sleep(self.interval).await;
            if self.stopped.get() {
                break;
            }
            if !self.visibility.is_visible() {
                debug!("document hidden, skipping tick");
                continue;
            }
            self.tick().await;
            if self.stopped.get() {
                break;
            }
        }
        debug!("poller stopped");
    }

    /// Also honoured when called before [`Poller::run`] starts.
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    /// Lets a listener or another task stop the loop without holding the poller.
    pub fn stop_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.stopped)
    }
}
