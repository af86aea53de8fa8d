//! Cache-or-fetch for one location and concurrent fan-out across the roster.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, instrument, warn};

use crate::{
    cache::SnapshotCache,
    directory::LocationDirectory,
    error::WeatherError,
    model::{LocationId, WeatherSnapshot},
    provider::WeatherProvider,
};

type FetchResult = Result<WeatherSnapshot, WeatherError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;
type InFlightMap = Mutex<HashMap<LocationId, (u64, InFlight)>>;

/// Settled outcome of a roster-wide fan-out, in roster order.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<WeatherSnapshot>,
    pub failed: Vec<(LocationId, WeatherError)>,
}

impl FanOutReport {
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Successes if there are any; otherwise the first failure in roster order.
    ///
    /// An empty roster yields an empty success list.
    pub fn into_result(self) -> Result<Vec<WeatherSnapshot>, WeatherError> {
        if self.succeeded.is_empty() {
            if let Some((_, err)) = self.failed.into_iter().next() {
                return Err(err);
            }
        }
        Ok(self.succeeded)
    }
}

/// Entry point for snapshot reads.
///
/// Concurrent misses for the same location share a single upstream request. That request
/// runs on its own task, so it settles and leaves the in-flight map even when every
/// caller waiting on it has been dropped.
pub struct AggregationEngine {
    directory: Arc<LocationDirectory>,
    provider: Arc<dyn WeatherProvider>,
    cache: Arc<SnapshotCache>,
    snapshot_ttl: Duration,
    in_flight: Arc<InFlightMap>,
    generation: AtomicU64,
}

impl fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("directory", &self.directory)
            .field("provider", &self.provider)
            .field("snapshot_ttl", &self.snapshot_ttl)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    pub fn new(
        directory: Arc<LocationDirectory>,
        provider: Arc<dyn WeatherProvider>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        let snapshot_ttl = cache.default_ttl();
        Self {
            directory,
            provider,
            cache,
            snapshot_ttl,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    pub async fn roster(&self) -> Result<Vec<LocationId>, WeatherError> {
        self.directory.resolve().await
    }

    /// Cached snapshot for `id`, fetching and caching it on a miss.
    ///
    /// Upstream errors are returned as-is; nothing is retried here. Must be called from
    /// within a tokio runtime.
    pub async fn get_one(&self, id: &LocationId) -> FetchResult {
        if let Some(snapshot) = self.cache.get(id) {
            debug!(%id, "snapshot cache hit");
            return Ok(snapshot);
        }

        self.join_or_start(id).await
    }

    fn join_or_start(&self, id: &LocationId) -> InFlight {
        let mut in_flight = self.in_flight.lock();
        if let Some((_, existing)) = in_flight.get(id) {
            debug!(%id, "joining in-flight fetch");
            return existing.clone();
        }

        debug!(%id, "snapshot cache miss");
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let provider = Arc::clone(&self.provider);
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.in_flight);
        let ttl = self.snapshot_ttl;
        let key = id.clone();

        // The map lock is held until the entry is inserted, so the task cannot remove
        // it before it exists.
        let task = tokio::spawn(async move {
            let result = provider.fetch(&key).await;
            if let Ok(snapshot) = &result {
                cache.put_with_ttl(key.clone(), snapshot.clone(), ttl);
            }

            let mut in_flight = registry.lock();
            if in_flight.get(&key).is_some_and(|(current, _)| *current == generation) {
                in_flight.remove(&key);
            }
            result
        });

        let fetch = async move {
            task.await.unwrap_or_else(|e| {
                Err(WeatherError::unavailable(None, format!("fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        in_flight.insert(id.clone(), (generation, fetch.clone()));
        fetch
    }

    /// Fetch every roster location concurrently and report each settled outcome.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_all_report(&self) -> Result<FanOutReport, WeatherError> {
        let ids = self.directory.resolve().await?;

        let outcomes =
            future::join_all(ids.into_iter().map(|id| async move {
                let result = self.get_one(&id).await;
                (id, result)
            }))
            .await;

        let mut report = FanOutReport::default();
        for (id, result) in outcomes {
            match result {
                Ok(snapshot) => report.succeeded.push(snapshot),
                Err(err) => {
                    warn!(%id, error = %err, "dropping location from fan-out");
                    report.failed.push((id, err));
                }
            }
        }

        Ok(report)
    }

    /// Snapshots for the whole roster; fails only when every location failed.
    pub async fn get_all(&self) -> Result<Vec<WeatherSnapshot>, WeatherError> {
        self.get_all_report().await?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Wind;
    use async_trait::async_trait;
    use std::{
        collections::HashSet,
        fs,
        sync::atomic::AtomicUsize,
    };
    use tempfile::TempDir;

    /// Provider double: fixed failures per id, optional latency, call counting.
    #[derive(Debug, Default)]
    struct FakeProvider {
        calls: AtomicUsize,
        failures: HashMap<LocationId, WeatherError>,
        delay: Duration,
    }

    impl FakeProvider {
        fn failing(pairs: &[(&str, WeatherError)]) -> Self {
            let failures = pairs.iter().map(|(id, e)| (LocationId::from(*id), e.clone())).collect();
            Self {
                failures,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn fetch(&self, id: &LocationId) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = self.failures.get(id) {
                return Err(err.clone());
            }
            Ok(snapshot(id))
        }
    }

    fn snapshot(id: &LocationId) -> WeatherSnapshot {
        WeatherSnapshot {
            id: id.clone(),
            name: format!("city-{id}"),
            weather: "clear sky".into(),
            temp: Some(21.5),
            temp_min: Some(20.0),
            temp_max: Some(23.0),
            pressure: Some(1012.0),
            humidity: Some(40.0),
            visibility: Some(10000.0),
            wind: Wind {
                speed: Some(3.0),
                deg: Some(90.0),
            },
            sunrise: Some(1_700_000_000),
            sunset: Some(1_700_040_000),
            raw: serde_json::json!({ "id": id.as_str() }),
        }
    }

    struct Fixture {
        engine: AggregationEngine,
        provider: Arc<FakeProvider>,
        _dir: TempDir,
    }

    fn fixture(roster: &[&str], provider: FakeProvider) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cities.json");
        let list: Vec<_> = roster.iter().map(|id| serde_json::json!({ "CityCode": id })).collect();
        fs::write(&path, serde_json::json!({ "List": list }).to_string()).unwrap();

        let directory = Arc::new(LocationDirectory::new(
            vec![path],
            LocationDirectory::DEFAULT_TTL,
        ));
        let provider = Arc::new(provider);
        let dyn_provider: Arc<dyn WeatherProvider> = provider.clone();
        let engine =
            AggregationEngine::new(directory, dyn_provider, Arc::new(SnapshotCache::default()));

        Fixture {
            engine,
            provider,
            _dir: dir,
        }
    }

    fn ids_of(snapshots: &[WeatherSnapshot]) -> HashSet<String> {
        snapshots.iter().map(|s| s.id.to_string()).collect()
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn second_get_within_ttl_hits_cache() {
        let f = fixture(&["1"], FakeProvider::default());
        let id = LocationId::from("1");

        let first = f.engine.get_one(&id).await.unwrap();
        let second = f.engine.get_one(&id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_is_refetched() {
        let f = fixture(&["1"], FakeProvider::default());
        let id = LocationId::from("1");

        f.engine.get_one(&id).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        f.engine.get_one(&id).await.unwrap();
        assert_eq!(f.provider.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        f.engine.get_one(&id).await.unwrap();
        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_snapshot_ttl_is_honored() {
        let f = fixture(&["1"], FakeProvider::default());
        let engine = f.engine.with_snapshot_ttl(Duration::from_secs(30));
        let id = LocationId::from("1");

        engine.get_one(&id).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        engine.get_one(&id).await.unwrap();

        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test]
    async fn errors_propagate_unchanged_and_are_not_cached() {
        let f = fixture(&["7"], FakeProvider::failing(&[("7", WeatherError::UpstreamRateLimited)]));
        let id = LocationId::from("7");

        assert_eq!(f.engine.get_one(&id).await.unwrap_err(), WeatherError::UpstreamRateLimited);
        assert_eq!(f.engine.get_one(&id).await.unwrap_err(), WeatherError::UpstreamRateLimited);
        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let provider = FakeProvider {
            delay: Duration::from_secs(1),
            ..FakeProvider::default()
        };
        let f = fixture(&["1"], provider);
        let id = LocationId::from("1");

        let (a, b, c) =
            tokio::join!(f.engine.get_one(&id), f.engine.get_one(&id), f.engine.get_one(&id));

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(f.provider.calls(), 1);
        assert!(f.engine.in_flight.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_leaves_no_stale_fetch_behind() {
        let provider = FakeProvider {
            delay: Duration::from_millis(300),
            ..FakeProvider::default()
        };
        let f = fixture(&["1"], provider);
        let id = LocationId::from("1");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), f.engine.get_one(&id)).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(f.engine.in_flight.lock().is_empty());

        let later = f.engine.get_one(&id).await.unwrap();
        assert_eq!(later, snapshot(&id));
        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_failing_fetch_is_retried_by_the_next_caller() {
        let provider = FakeProvider {
            delay: Duration::from_millis(300),
            ..FakeProvider::failing(&[("1", WeatherError::unavailable(Some(503), "down"))])
        };
        let f = fixture(&["1"], provider);
        let id = LocationId::from("1");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), f.engine.get_one(&id)).await;
        assert!(cancelled.is_err());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let err = f.engine.get_one(&id).await.unwrap_err();
        assert_eq!(err, WeatherError::unavailable(Some(503), "down"));
        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test]
    async fn get_all_returns_every_roster_entry() {
        let f = fixture(&["1", "2", "3"], FakeProvider::default());

        let all = f.engine.get_all().await.unwrap();

        assert_eq!(ids_of(&all), set(&["1", "2", "3"]));
        assert_eq!(f.provider.calls(), 3);
    }

    #[tokio::test]
    async fn partial_failure_drops_failed_locations() {
        let f = fixture(
            &["1", "2", "3"],
            FakeProvider::failing(&[("2", WeatherError::unavailable(Some(500), "boom"))]),
        );

        let all = f.engine.get_all().await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(ids_of(&all), set(&["1", "3"]));
    }

    #[tokio::test]
    async fn report_lists_failures_alongside_successes() {
        let f = fixture(
            &["1", "2", "3"],
            FakeProvider::failing(&[("2", WeatherError::LocationNotFound(LocationId::from("2")))]),
        );

        let report = f.engine.get_all_report().await.unwrap();

        assert!(report.is_partial());
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(
            report.failed,
            vec![(LocationId::from("2"), WeatherError::LocationNotFound(LocationId::from("2")))]
        );
    }

    #[tokio::test]
    async fn total_failure_reports_first_failure_in_roster_order() {
        let f = fixture(
            &["1", "2"],
            FakeProvider::failing(&[
                ("1", WeatherError::LocationNotFound(LocationId::from("1"))),
                ("2", WeatherError::UpstreamRateLimited),
            ]),
        );

        let err = f.engine.get_all().await.unwrap_err();

        assert_eq!(err, WeatherError::LocationNotFound(LocationId::from("1")));
    }

    #[tokio::test]
    async fn empty_roster_yields_empty_result() {
        let f = fixture(&[], FakeProvider::default());

        assert!(f.engine.get_all().await.unwrap().is_empty());
        assert_eq!(f.provider.calls(), 0);
    }

    #[tokio::test]
    async fn roster_failure_is_fatal_for_get_all() {
        let directory = Arc::new(LocationDirectory::new(vec![], LocationDirectory::DEFAULT_TTL));
        let engine = AggregationEngine::new(
            directory,
            Arc::new(FakeProvider::default()),
            Arc::new(SnapshotCache::default()),
        );

        let err = engine.get_all().await.unwrap_err();
        assert!(matches!(err, WeatherError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_runs_concurrently() {
        let provider = FakeProvider {
            delay: Duration::from_secs(10),
            ..FakeProvider::default()
        };
        let f = fixture(&["1", "2", "3", "4"], provider);

        let started = tokio::time::Instant::now();
        let all = f.engine.get_all().await.unwrap();

        assert_eq!(all.len(), 4);
        assert!(started.elapsed() < Duration::from_secs(20));
    }
}
