use archetype_core::config::Config;
use archetype_core::facebook::GraphApi;
use archetype_core::site::Site;
use archetype_core::template_cache::TemplateCache;
use archetype_core::user::{FileUserStore, UserStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub site: Arc<Site>,
    pub store: Arc<dyn UserStore>,
    /// `None` when the site has no `facebook:` section.
    pub graph: Option<Arc<dyn GraphApi>>,
    pub templates: Arc<TemplateCache>,
}

impl AppState {
    pub fn new(
        root: PathBuf,
        site: Site,
        store: Arc<dyn UserStore>,
        graph: Option<Arc<dyn GraphApi>>,
    ) -> Self {
        Self {
            root,
            site: Arc::new(site),
            store,
            graph,
            templates: Arc::new(TemplateCache::default()),
        }
    }

    /// Load `archetype.yaml` under `root`, build the site, and open the
    /// file-backed user store next to it.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root)?;
        for w in config.validate() {
            tracing::warn!(level = ?w.level, "config: {}", w.message);
        }
        let site = Site::from_config(&config)?;
        let graph = site
            .graph_client()?
            .map(|c| Arc::new(c) as Arc<dyn GraphApi>);
        let store: Arc<dyn UserStore> = Arc::new(FileUserStore::open(root));
        Ok(Self::new(root.to_path_buf(), site, store, graph))
    }
}
