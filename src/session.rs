use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cache::LearnedPatternCache;
use crate::cascade::{Cascade, CascadeConfig};
use crate::db::{self, get_connection, init_db};
use crate::error::Result;
use crate::external::{GuardPolicy, GuardedClassifier};
use crate::metrics::{MetricsConfig, MetricsEngine};
use crate::rules::RuleMatcher;
use crate::settings::{load_settings, shellexpand_path, Settings};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Skip the external classifier even when an endpoint is configured.
    pub offline: bool,
    pub as_of: Option<NaiveDate>,
    pub window_days: Option<i64>,
}

/// Everything one invocation needs: the database, the loaded cache and
/// rules, and the cascade and metrics engine built on top of them.
pub struct Session {
    pub settings: Settings,
    conn: Connection,
    pub taxonomy: Arc<Taxonomy>,
    pub rules: Arc<RuleMatcher>,
    pub cache: Arc<LearnedPatternCache>,
    pub cascade: Cascade,
    pub engine: MetricsEngine,
}

impl Session {
    pub fn open(options: &SessionOptions) -> Result<Self> {
        Self::with_settings(load_settings()?, options)
    }

    pub fn with_settings(settings: Settings, options: &SessionOptions) -> Result<Self> {
        settings.validate()?;
        let conn = open_database(&settings)?;
        let taxonomy = Arc::new(load_taxonomy(&settings)?);

        let user_rules = db::load_rules(&conn)?;
        let rules = Arc::new(RuleMatcher::with_builtins(user_rules, &taxonomy)?);
        let cache = Arc::new(LearnedPatternCache::load(&conn, settings.learn_threshold)?);
        let external = if options.offline {
            None
        } else {
            build_classifier(&settings)?
        };

        let cascade_config = CascadeConfig {
            accept_threshold: settings.accept_threshold,
            external_min_confidence: settings.external_min_confidence,
        };
        let cascade = Cascade::new(
            Arc::clone(&taxonomy),
            Arc::clone(&rules),
            Arc::clone(&cache),
            external,
            &cascade_config,
        )?;

        let metrics_config = load_metrics_config(&settings, options.window_days)?;
        let engine = MetricsEngine::new(metrics_config, &taxonomy)?.with_as_of(options.as_of);

        info!(
            taxonomy = taxonomy.len(),
            rules = rules.len(),
            patterns = cache.len(),
            tiers = ?cascade.tier_order(),
            "session opened"
        );
        Ok(Self {
            settings,
            conn,
            taxonomy,
            rules,
            cache,
            cascade,
            engine,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Persists learned patterns and rule hit counts.
    pub fn finish(self) -> Result<usize> {
        let written = self.cache.flush(&self.conn)?;
        db::record_rule_hits(&self.conn, &self.rules.hit_counts())?;
        if let Some(external) = self.cascade.external() {
            let stats = external.stats();
            info!(
                classifier = external.name(),
                calls = stats.calls,
                failures = stats.failures,
                short_circuited = stats.short_circuited,
                breaker = ?external.breaker_state(),
                "external classifier usage"
            );
        }
        Ok(written)
    }
}

pub fn open_database(settings: &Settings) -> Result<Connection> {
    std::fs::create_dir_all(settings.data_path())?;
    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    Ok(conn)
}

/// The metrics config file, with the window length overridden by the
/// command line first and settings second.
pub fn load_metrics_config(settings: &Settings, window_days: Option<i64>) -> Result<MetricsConfig> {
    let mut config = match &settings.metrics_config_path {
        Some(path) => MetricsConfig::load(Path::new(&shellexpand_path(path)))?,
        None => MetricsConfig::default(),
    };
    if let Some(days) = window_days.or(settings.reporting_period_days) {
        config.reporting_period_days = days;
    }
    Ok(config)
}

pub fn load_taxonomy(settings: &Settings) -> Result<Taxonomy> {
    match &settings.taxonomy_path {
        Some(path) => Taxonomy::load(Path::new(&shellexpand_path(path))),
        None => Ok(Taxonomy::builtin()),
    }
}

#[cfg(feature = "http")]
fn build_classifier(settings: &Settings) -> Result<Option<Arc<GuardedClassifier>>> {
    use crate::external::HttpClassifier;

    let Some(endpoint) = &settings.external_endpoint else {
        return Ok(None);
    };
    let timeout = Duration::from_millis(settings.timeout_ms);
    let api_key = std::env::var(&settings.external_api_key_env).ok();
    if api_key.is_none() {
        warn!(var = %settings.external_api_key_env, "classifier api key not set; calling without auth");
    }
    let http = HttpClassifier::new(endpoint, api_key, timeout)?;
    let policy = GuardPolicy {
        timeout,
        max_retries: settings.max_retries,
        backoff: Duration::from_millis(settings.backoff_ms),
        failure_threshold: settings.breaker_threshold,
    };
    Ok(Some(Arc::new(GuardedClassifier::new(Arc::new(http), policy))))
}

#[cfg(not(feature = "http"))]
fn build_classifier(settings: &Settings) -> Result<Option<Arc<GuardedClassifier>>> {
    if settings.external_endpoint.is_some() {
        warn!("external endpoint configured but built without the http feature; skipping");
    }
    Ok(None)
}
