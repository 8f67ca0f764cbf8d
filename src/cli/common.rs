//! Global flags and the per-invocation session shared by command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use idcard::config::{Config, DEFAULT_CONFIG_FILE, StoreBackend};
use idcard::export::{Exporter, Surface};
use idcard::form::FormController;
use idcard::image::PixelRasterizer;
use idcard::store::{Backend, RecordStore, open_backend, open_store};
use idcard::templates::RenderContext;

/// Flags accepted by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Use the card server at this URL instead of local storage.
    #[arg(long, global = true, conflicts_with = "store")]
    pub remote: Option<String>,
    /// Keep cards in this local storage directory.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Loaded configuration with command-line overrides applied.
#[derive(Debug)]
pub struct Session {
    pub config: Config,
}

impl Session {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let mut config = Config::load(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?;
        if let Some(url) = &args.remote {
            config.store.backend = StoreBackend::Remote;
            config.store.remote_url = url.clone();
        }
        if let Some(path) = &args.store {
            config.store.backend = StoreBackend::Local;
            config.store.path = path.clone();
        }
        debug!(backend = ?config.store.backend, "configuration loaded");
        Ok(Self { config })
    }

    pub fn store(&self) -> Result<Arc<dyn RecordStore>> {
        open_store(&self.config).context("failed to open card store")
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext::now(self.config.card.school.clone())
    }

    /// Form controller wired to the configured store, with the default template selected.
    pub fn form(&self) -> Result<FormController> {
        let Backend { store, photos } =
            open_backend(&self.config).context("failed to open card store")?;
        let rasterizer = PixelRasterizer::new(photos, self.config.export.pixel_ratio);
        let mut form = FormController::new(
            store,
            Exporter::new(Box::new(rasterizer)),
            Arc::new(Surface::new()),
            self.render_context(),
        );
        form.select_template(&self.config.card.template)
            .context("invalid card.template in configuration")?;
        Ok(form)
    }
}
