//! Playlist import and curation.
use crate::{
    api::Api,
    normalize::{dedupe, exclude_imported, normalize_playlists},
    session::SessionCache,
    Error, Playlist, Session,
};
use std::{
    cell::{Cell, RefCell},
    cmp::Reverse,
    rc::Rc,
};
use tracing::{debug, info, warn};

pub const PAGE_SIZE: usize = 50;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Tab {
    /// Synced playlists not yet imported
    #[default]
    Add,
    /// Imported playlists
    Remove,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    MostTracks,
    FewestTracks,
}

impl SortOrder {
    pub fn toggle(self) -> SortOrder {
        match self {
            SortOrder::MostTracks => SortOrder::FewestTracks,
            SortOrder::FewestTracks => SortOrder::MostTracks,
        }
    }
}

/// Case-insensitive name search, then a stable sort by track count.
pub fn search_and_sort(playlists: &[Playlist], search: &str, order: SortOrder) -> Vec<Playlist> {
    let search = search.to_lowercase();
    let mut matches: Vec<_> = playlists
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&search))
        .cloned()
        .collect();
    match order {
        SortOrder::MostTracks => matches.sort_by_key(|p| Reverse(p.tracks)),
        SortOrder::FewestTracks => matches.sort_by_key(|p| p.tracks),
    }
    matches
}

/// The synced and imported playlist sets behind the edit dialog.
pub struct PlaylistCatalog {
    api: Rc<Api>,
    session: Rc<SessionCache>,
    available: RefCell<Vec<Playlist>>,
    imported: RefCell<Vec<Playlist>>,
    offset: Cell<usize>,
    total: Cell<Option<u64>>,
}

impl PlaylistCatalog {
    pub fn new(api: Rc<Api>, session: Rc<SessionCache>) -> PlaylistCatalog {
        PlaylistCatalog {
            api,
            session,
            available: RefCell::new(Vec::new()),
            imported: RefCell::new(Vec::new()),
            offset: Cell::new(0),
            total: Cell::new(None),
        }
    }

    fn user_id(&self) -> Result<String, Error> {
        self.session
            .user_id()
            .ok_or_else(|| Error::Config("no signed-in user".to_owned()))
    }

    fn reset(&self) {
        self.available.borrow_mut().clear();
        self.offset.set(0);
        self.total.set(None);
    }

    /// Loads the first page of synced playlists and the imported set.
    pub async fn open(&self) -> Result<(), Error> {
        self.reset();
        self.load_more().await?;
        let imported = match self.api.dashboard().await {
            Ok(dashboard) => dashboard.playlists.normalize().all,
            Err(e) => {
                warn!(error = %e, "imported playlists unavailable");
                Vec::new()
            }
        };
        *self.imported.borrow_mut() = imported;
        Ok(())
    }

    /// Appends the next page of synced playlists and returns how many new
    /// ones it contributed.
    pub async fn load_more(&self) -> Result<usize, Error> {
        let user_id = self.user_id()?;
        let offset = self.offset.get();
        let page = self
            .api
            .synced_playlists(&user_id, offset, PAGE_SIZE)
            .await?;
        let mut available = self.available.borrow_mut();
        let before = available.len();
        let merged = dedupe(
            available
                .drain(..)
                .chain(normalize_playlists(&page.playlists)),
        );
        *available = merged;
        self.offset.set(offset + PAGE_SIZE);
        self.total.set(page.total);
        debug!(offset, total = ?page.total, "loaded synced playlists");
        Ok(available.len() - before)
    }

    /// Re-imports from the music service, then starts paging from scratch.
    pub async fn sync(&self) -> Result<(), Error> {
        let user_id = self.user_id()?;
        self.api.sync_playlists(&user_id).await?;
        self.reset();
        self.load_more().await?;
        Ok(())
    }

    pub fn has_more(&self) -> bool {
        match self.total.get() {
            Some(total) => (self.available.borrow().len() as u64) < total,
            None => false,
        }
    }

    pub fn available(&self) -> Vec<Playlist> {
        exclude_imported(&self.available.borrow(), &self.imported.borrow())
    }

    pub fn imported(&self) -> Vec<Playlist> {
        self.imported.borrow().clone()
    }

    pub fn displayed(&self, tab: Tab, search: &str, order: SortOrder) -> Vec<Playlist> {
        let source = match tab {
            Tab::Add => self.available(),
            Tab::Remove => self.imported(),
        };
        search_and_sort(&source, search, order)
    }

    /// Imports or removes the selected playlists, then patches the cached
    /// session without a refetch.
    pub async fn save(&self, tab: Tab, selected: &[String]) -> Result<(), Error> {
        let source = match tab {
            Tab::Add => self.available(),
            Tab::Remove => self.imported(),
        };
        let targets: Vec<Playlist> = source
            .into_iter()
            .filter(|p| selected.contains(&p.id))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = targets.iter().map(|p| p.id.clone()).collect();
        match tab {
            Tab::Add => self.api.add_playlists(&ids).await?,
            Tab::Remove => self.api.delete_playlists(&ids).await?,
        };
        info!(?tab, count = ids.len(), "saved playlist changes");

        let imported = {
            let mut imported = self.imported.borrow_mut();
            match tab {
                Tab::Add => {
                    let merged = dedupe(imported.drain(..).chain(targets));
                    *imported = merged;
                }
                Tab::Remove => imported.retain(|p| !ids.contains(&p.id)),
            }
            imported.clone()
        };
        self.session.update(|session| {
            session.playlists.all = imported;
            if tab == Tab::Remove {
                session.playlists.featured.retain(|p| !ids.contains(&p.id));
            }
        });
        Ok(())
    }

    /// Sends the featured selection and mirrors it into the cached session.
    pub async fn update_featured(&self, selection: &FeaturedSelection) -> Result<(), Error> {
        let user_id = self.user_id()?;
        self.api.update_featured(&user_id, selection.ids()).await?;
        self.session.update(|session| {
            session.playlists.featured = session
                .playlists
                .all
                .iter()
                .filter(|p| selection.contains(&p.id))
                .cloned()
                .collect();
        });
        Ok(())
    }

    /// Onboarding import: sync, then every playlist the user owns, most
    /// tracks first.
    pub async fn onboarding_playlists(&self, user_id: &str) -> Result<Vec<Playlist>, Error> {
        self.api.sync_playlists(user_id).await?;
        let page = self.api.user_playlists(user_id).await?;
        let playlists = dedupe(normalize_playlists(&page.playlists));
        Ok(search_and_sort(&playlists, "", SortOrder::MostTracks))
    }
}

/// Up to three playlist ids picked for the profile card.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FeaturedSelection {
    selected: Vec<String>,
}

impl FeaturedSelection {
    pub fn new(ids: impl IntoIterator<Item = String>) -> FeaturedSelection {
        let mut selection = FeaturedSelection::default();
        for id in ids {
            selection.toggle(&id);
        }
        selection
    }

    pub fn from_session(session: &Session) -> FeaturedSelection {
        FeaturedSelection::new(session.playlists.featured.iter().map(|p| p.id.clone()))
    }

    /// Deselects a selected id, or selects it if there is room. Returns
    /// whether the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(i) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(i);
            false
        } else if self.is_full() {
            false
        } else {
            self.selected.push(id.to_owned());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn is_full(&self) -> bool {
        self.selected.len() >= Session::MAX_FEATURED
    }

    pub fn ids(&self) -> &[String] {
        &self.selected
    }
}
