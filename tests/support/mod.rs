use std::{
    collections::HashSet,
    num::NonZeroUsize,
    sync::{Mutex, MutexGuard},
};

use tokio_postgres_scroll::{
    CacheMode, LockMode, Query, ResultCursor, ScrollableResults, Session, DEFAULT_FETCH_SIZE,
};

/// Sets up tracing subscriber.
#[allow(dead_code)]
pub fn setup_tracing(level: Option<&str>) {
    use tracing_subscriber::{
        fmt::{format::FmtSpan, layer},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let filter_layer = level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or("warn".into()));
    let fmt_layer = layer()
        .with_test_writer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Several tests of one binary may race to install the subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init();
}

#[allow(dead_code)]
pub fn fetch_size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[allow(dead_code)]
pub const NO_ALIASES: [&str; 0] = [];

/// Drains `cursor`, returning the ids of the delivered items.
#[allow(dead_code)]
pub async fn drain(cursor: &mut ResultCursor<'_, MemorySession>) -> Vec<u64> {
    let mut ids = Vec::new();
    while let Some(item) = cursor.next().await.unwrap() {
        ids.push(item.id);
    }
    ids
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
}

/// Everything the session, its queries and their scrolls were asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Prepare(String),
    Open,
    Advance(u64),
    Clear,
    Release,
}

#[allow(dead_code)]
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("cannot parse `{0}`")]
    Parse(String),
    #[error("unknown alias `{0}`")]
    UnknownAlias(String),
    #[error("invalid parameter: {0}")]
    Parameter(&'static str),
    #[error("read failed at item {0}")]
    Read(u64),
    #[error("clear failed")]
    Clear,
    #[error("release failed")]
    Release,
}

/// Configuration a query received, in call order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConfig {
    pub expression: String,
    pub calls: Vec<&'static str>,
    pub fetch_size: Option<NonZeroUsize>,
    pub read_only: bool,
    pub cacheable: bool,
    pub cache_mode: CacheMode,
    pub lock_modes: Vec<(String, LockMode)>,
    pub min_id: Option<u64>,
}

#[derive(Default)]
struct Journal {
    events: Vec<Event>,
    queries: Vec<QueryConfig>,
    identity_map: HashSet<u64>,
    max_identity_map: usize,
}

/// In-memory session over items `1..=len`.
///
/// Queries must start with `from`; aliases must appear as words of the
/// expression.
pub struct MemorySession {
    len: u64,
    fail_read_at: Option<u64>,
    fail_clear: bool,
    fail_release: bool,
    journal: Mutex<Journal>,
}

#[allow(dead_code)]
impl MemorySession {
    pub fn new(len: u64) -> Self {
        Self {
            len,
            fail_read_at: None,
            fail_clear: false,
            fail_release: false,
            journal: Mutex::default(),
        }
    }

    pub fn fail_read_at(mut self, id: u64) -> Self {
        self.fail_read_at = Some(id);
        self
    }

    pub fn fail_clear(mut self) -> Self {
        self.fail_clear = true;
        self
    }

    pub fn fail_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal().events.clone()
    }

    pub fn queries(&self) -> Vec<QueryConfig> {
        self.journal().queries.clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.journal().events.iter().filter(|e| *e == event).count()
    }

    pub fn clears(&self) -> usize {
        self.count(&Event::Clear)
    }

    pub fn releases(&self) -> usize {
        self.count(&Event::Release)
    }

    pub fn opened(&self) -> usize {
        self.count(&Event::Open)
    }

    pub fn identity_map_len(&self) -> usize {
        self.journal().identity_map.len()
    }

    pub fn max_identity_map(&self) -> usize {
        self.journal().max_identity_map
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    fn record(&self, event: Event) {
        self.journal().events.push(event);
    }
}

impl Session for MemorySession {
    type Entity = Item;
    type Error = MemoryError;
    type Query<'s> = MemoryQuery<'s> where Self: 's;

    async fn create_query<'s>(&'s self, expression: &str) -> Result<MemoryQuery<'s>, MemoryError> {
        self.record(Event::Prepare(expression.to_owned()));
        if !expression.starts_with("from") {
            return Err(MemoryError::Parse(expression.to_owned()));
        }
        Ok(MemoryQuery {
            session: self,
            config: QueryConfig {
                expression: expression.to_owned(),
                ..QueryConfig::default()
            },
        })
    }

    fn clear(&self) -> Result<(), MemoryError> {
        let mut journal = self.journal();
        journal.events.push(Event::Clear);
        if self.fail_clear {
            return Err(MemoryError::Clear);
        }
        journal.identity_map.clear();
        Ok(())
    }
}

pub struct MemoryQuery<'s> {
    session: &'s MemorySession,
    config: QueryConfig,
}

#[allow(dead_code)]
impl MemoryQuery<'_> {
    /// Restricts the results to items with an id of at least `min_id`.
    pub fn bind_min_id(&mut self, min_id: u64) {
        self.config.calls.push("bind");
        self.config.min_id = Some(min_id);
    }
}

impl<'s> Query for MemoryQuery<'s> {
    type Entity = Item;
    type Error = MemoryError;
    type Scroll = MemoryScroll<'s>;

    fn set_fetch_size(&mut self, fetch_size: NonZeroUsize) {
        self.config.calls.push("fetch_size");
        self.config.fetch_size = Some(fetch_size);
    }

    fn fetch_size(&self) -> NonZeroUsize {
        self.config.fetch_size.unwrap_or(DEFAULT_FETCH_SIZE)
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.config.calls.push("read_only");
        self.config.read_only = read_only;
    }

    fn set_cacheable(&mut self, cacheable: bool) {
        self.config.calls.push("cacheable");
        self.config.cacheable = cacheable;
    }

    fn set_cache_mode(&mut self, cache_mode: CacheMode) {
        self.config.calls.push("cache_mode");
        self.config.cache_mode = cache_mode;
    }

    fn set_lock_mode(&mut self, alias: &str, lock_mode: LockMode) -> Result<(), MemoryError> {
        self.config.calls.push("lock_mode");
        if !self.config.expression.split_whitespace().any(|w| w == alias) {
            return Err(MemoryError::UnknownAlias(alias.to_owned()));
        }
        self.config.lock_modes.push((alias.to_owned(), lock_mode));
        Ok(())
    }

    async fn scroll(self) -> Result<MemoryScroll<'s>, MemoryError> {
        let next_id = self.config.min_id.unwrap_or(1);
        let mut journal = self.session.journal();
        journal.events.push(Event::Open);
        journal.queries.push(self.config);
        Ok(MemoryScroll {
            session: self.session,
            next_id,
        })
    }
}

pub struct MemoryScroll<'s> {
    session: &'s MemorySession,
    next_id: u64,
}

impl ScrollableResults for MemoryScroll<'_> {
    type Entity = Item;
    type Error = MemoryError;

    async fn advance(&mut self) -> Result<Option<Item>, MemoryError> {
        let id = self.next_id;
        if self.session.fail_read_at == Some(id) {
            return Err(MemoryError::Read(id));
        }
        if id > self.session.len {
            return Ok(None);
        }
        self.next_id += 1;

        let mut journal = self.session.journal();
        journal.events.push(Event::Advance(id));
        journal.identity_map.insert(id);
        journal.max_identity_map = journal.max_identity_map.max(journal.identity_map.len());
        Ok(Some(Item { id }))
    }

    async fn release(&mut self) -> Result<(), MemoryError> {
        self.session.record(Event::Release);
        if self.session.fail_release {
            return Err(MemoryError::Release);
        }
        Ok(())
    }
}
