use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::gallery::{GalleryStore, SampleRef};
use crate::keys::{GalleryScope, IdentityKey};
use crate::oracle::FaceOracle;
use crate::payload::decode_data_uri;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.35;
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// A sample matches only when `distance < match_threshold`.
    pub match_threshold: f64,
    pub scan_timeout: Duration,
    pub max_concurrent_comparisons: usize,
    pub parallel_scan: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            max_concurrent_comparisons: default_concurrency(),
            parallel_scan: false,
        }
    }
}

pub fn default_concurrency() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    /// Data-URI encoded capture.
    pub capture: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    EmptyScope,
    NoCoincidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub request_id: String,
    pub scope: GalleryScope,
    pub matched: bool,
    pub identity: Option<IdentityKey>,
    pub distance: Option<f64>,
    pub reason: Option<DenialReason>,
    pub comparisons: usize,
    pub skipped: usize,
    #[serde(skip)]
    pub logs: Vec<String>,
}

/// Scans one gallery scope for the first sample matching a capture.
pub struct VerificationEngine {
    store: Arc<dyn GalleryStore>,
    oracle: Arc<dyn FaceOracle>,
    settings: EngineSettings,
    pool: ThreadPool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SampleOutcome {
    Match(f64),
    Miss,
    Skipped,
}

#[derive(Debug)]
struct Hit {
    identity: IdentityKey,
    sample_id: u32,
    distance: f64,
}

#[derive(Debug, Default)]
struct ScanTally {
    comparisons: AtomicUsize,
    skipped: AtomicUsize,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        oracle: Arc<dyn FaceOracle>,
        settings: EngineSettings,
    ) -> AppResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.max_concurrent_comparisons.max(1))
            .thread_name(|index| format!("acceso-compare-{index}"))
            .build()
            .map_err(|err| AppError::ThreadPool(err.to_string()))?;
        Ok(Self {
            store,
            oracle,
            settings,
            pool,
        })
    }

    pub fn verify(&self, request: &VerificationRequest) -> AppResult<VerificationResult> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("verify", request_id = %request_id);
        let _entered = span.enter();

        let scope = GalleryScope::from_labels(
            request.category.as_deref(),
            request.subcategory.as_deref(),
        )?;
        let capture = request
            .capture
            .as_deref()
            .filter(|payload| !payload.trim().is_empty())
            .ok_or(AppError::MissingCapture)?;
        let probe = decode_data_uri(capture)?;

        let samples = self.store.list_samples(&scope)?;
        let mut logs = vec![format!(
            "Scanning {} sample(s) in {scope} (capture {} bytes)",
            samples.len(),
            probe.bytes.len()
        )];
        let mut result = VerificationResult {
            request_id,
            scope,
            matched: false,
            identity: None,
            distance: None,
            reason: None,
            comparisons: 0,
            skipped: 0,
            logs: Vec::new(),
        };

        if samples.is_empty() {
            info!(scope = %result.scope, "no enrolled samples in scope");
            logs.push("No samples enrolled for this scope".to_string());
            result.reason = Some(DenialReason::EmptyScope);
            result.logs = logs;
            return Ok(result);
        }

        let tally = ScanTally::default();
        let hit = self.pool.install(|| {
            if self.settings.parallel_scan {
                self.scan_parallel(&probe.bytes, &samples, started, &tally)
            } else {
                self.scan_sequential(&probe.bytes, &samples, started, &tally)
            }
        })?;
        result.comparisons = tally.comparisons.load(Ordering::Relaxed);
        result.skipped = tally.skipped.load(Ordering::Relaxed);
        if result.skipped > 0 {
            logs.push(format!(
                "Skipped {} sample(s) the oracle could not compare",
                result.skipped
            ));
        }

        match hit {
            Some(hit) => {
                info!(
                    identity = %hit.identity,
                    sample_id = hit.sample_id,
                    distance = hit.distance,
                    "access granted"
                );
                logs.push(format!(
                    "Matched {} sample #{} (distance {:.4})",
                    hit.identity, hit.sample_id, hit.distance
                ));
                result.matched = true;
                result.identity = Some(hit.identity);
                result.distance = Some(hit.distance);
            }
            None => {
                info!(
                    comparisons = result.comparisons,
                    skipped = result.skipped,
                    "access denied"
                );
                logs.push(format!(
                    "No sample below threshold {} after {} comparison(s)",
                    self.settings.match_threshold, result.comparisons
                ));
                result.reason = Some(DenialReason::NoCoincidence);
            }
        }
        result.logs = logs;
        Ok(result)
    }

    fn scan_sequential(
        &self,
        probe: &[u8],
        samples: &[SampleRef],
        started: Instant,
        tally: &ScanTally,
    ) -> AppResult<Option<Hit>> {
        for sample in samples {
            if let Some(hit) = self.visit(probe, sample, started, tally)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Earliest match in enumeration order wins, as in the sequential scan.
    fn scan_parallel(
        &self,
        probe: &[u8],
        samples: &[SampleRef],
        started: Instant,
        tally: &ScanTally,
    ) -> AppResult<Option<Hit>> {
        samples
            .par_iter()
            .find_map_first(|sample| self.visit(probe, sample, started, tally).transpose())
            .transpose()
    }

    fn visit(
        &self,
        probe: &[u8],
        sample: &SampleRef,
        started: Instant,
        tally: &ScanTally,
    ) -> AppResult<Option<Hit>> {
        self.check_deadline(started)?;
        match self.compare_sample(probe, sample)? {
            SampleOutcome::Match(distance) => {
                tally.comparisons.fetch_add(1, Ordering::Relaxed);
                Ok(Some(Hit {
                    identity: sample.identity.clone(),
                    sample_id: sample.sample_id,
                    distance,
                }))
            }
            SampleOutcome::Miss => {
                tally.comparisons.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            SampleOutcome::Skipped => {
                tally.skipped.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn compare_sample(&self, probe: &[u8], sample: &SampleRef) -> AppResult<SampleOutcome> {
        let reference = self.store.read_sample(sample)?;
        match self.oracle.compare(probe, &reference) {
            Ok(comparison) => {
                debug!(
                    identity = %sample.identity,
                    sample_id = sample.sample_id,
                    distance = comparison.distance,
                    verified = comparison.verified,
                    "compared sample"
                );
                if comparison.verified && comparison.distance < self.settings.match_threshold {
                    Ok(SampleOutcome::Match(comparison.distance))
                } else {
                    Ok(SampleOutcome::Miss)
                }
            }
            Err(err) => {
                warn!(
                    identity = %sample.identity,
                    sample_id = sample.sample_id,
                    location = %sample.location.display(),
                    error = %err,
                    "skipping sample the oracle could not compare"
                );
                Ok(SampleOutcome::Skipped)
            }
        }
    }

    fn check_deadline(&self, started: Instant) -> AppResult<()> {
        let elapsed = started.elapsed();
        if elapsed > self.settings.scan_timeout {
            return Err(AppError::Timeout {
                elapsed,
                limit: self.settings.scan_timeout,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::MemoryGallery;
    use crate::keys::IdentityScope;
    use crate::oracle::{FaceComparison, OracleError};
    use crate::payload::encode_data_uri;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by reference bytes; unknown references are far misses.
    #[derive(Default)]
    struct ScriptedOracle {
        answers: HashMap<Vec<u8>, Option<FaceComparison>>,
        calls: Mutex<Vec<Vec<u8>>>,
        delay: Option<Duration>,
    }

    impl ScriptedOracle {
        fn answer(mut self, reference: &[u8], verified: bool, distance: f64) -> Self {
            self.answers.insert(
                reference.to_vec(),
                Some(FaceComparison { verified, distance }),
            );
            self
        }

        fn fail(mut self, reference: &[u8]) -> Self {
            self.answers.insert(reference.to_vec(), None);
            self
        }

        fn calls(&self) -> Vec<Vec<u8>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FaceOracle for ScriptedOracle {
        fn compare(&self, _probe: &[u8], reference: &[u8]) -> Result<FaceComparison, OracleError> {
            self.calls.lock().unwrap().push(reference.to_vec());
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            match self.answers.get(reference) {
                Some(Some(answer)) => Ok(*answer),
                Some(None) => Err(OracleError::Backend("scripted failure".into())),
                None => Ok(FaceComparison {
                    verified: false,
                    distance: 0.9,
                }),
            }
        }
    }

    /// Delegates to a memory gallery but fails reads of one identity or every listing.
    struct FailingStore {
        inner: MemoryGallery,
        unreadable: Option<&'static str>,
        unlistable: bool,
    }

    impl FailingStore {
        fn unavailable(path: &std::path::Path) -> AppError {
            AppError::StoreUnavailable {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }
        }
    }

    impl GalleryStore for FailingStore {
        fn ensure_scope(&self, scope: &IdentityScope) -> AppResult<()> {
            self.inner.ensure_scope(scope)
        }

        fn append_sample(
            &self,
            scope: &IdentityScope,
            bytes: &[u8],
            extension: &str,
        ) -> AppResult<SampleRef> {
            self.inner.append_sample(scope, bytes, extension)
        }

        fn list_samples(&self, scope: &GalleryScope) -> AppResult<Vec<SampleRef>> {
            if self.unlistable {
                return Err(Self::unavailable(std::path::Path::new("memory://listing")));
            }
            self.inner.list_samples(scope)
        }

        fn read_sample(&self, sample: &SampleRef) -> AppResult<Vec<u8>> {
            if self.unreadable == Some(sample.identity.as_str()) {
                return Err(Self::unavailable(&sample.location));
            }
            self.inner.read_sample(sample)
        }

        fn remove_identity(&self, scope: &IdentityScope) -> AppResult<usize> {
            self.inner.remove_identity(scope)
        }
    }

    fn failing_store(unreadable: Option<&'static str>, unlistable: bool) -> Arc<FailingStore> {
        let inner = MemoryGallery::new();
        for identity in ["A1", "B2", "C3"] {
            inner
                .append_sample(&student("cs", identity), identity.as_bytes(), "png")
                .unwrap();
        }
        Arc::new(FailingStore {
            inner,
            unreadable,
            unlistable,
        })
    }

    fn student(program: &str, identity: &str) -> IdentityScope {
        GalleryScope::from_labels(Some("alumno"), Some(program))
            .unwrap()
            .identity(IdentityKey::parse(Some(identity), true).unwrap())
    }

    fn request(program: &str) -> VerificationRequest {
        VerificationRequest {
            capture: Some(encode_data_uri(b"probe")),
            category: Some("alumno".into()),
            subcategory: Some(program.into()),
        }
    }

    fn engine(
        store: Arc<MemoryGallery>,
        oracle: Arc<ScriptedOracle>,
        settings: EngineSettings,
    ) -> VerificationEngine {
        VerificationEngine::new(store, oracle, settings).unwrap()
    }

    #[test]
    fn missing_capture_is_rejected_before_scanning() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "A1"), b"a1", "png").unwrap();
        let oracle = Arc::new(ScriptedOracle::default());
        let engine = engine(store, oracle.clone(), EngineSettings::default());

        let mut req = request("cs");
        req.capture = None;
        assert!(matches!(engine.verify(&req), Err(AppError::MissingCapture)));
        req.capture = Some("   ".into());
        assert!(matches!(engine.verify(&req), Err(AppError::MissingCapture)));
        req.capture = Some("no separator here".into());
        assert!(matches!(
            engine.verify(&req),
            Err(AppError::MalformedCapture(_))
        ));
        assert!(oracle.calls().is_empty());
    }

    #[test]
    fn empty_scope_is_reported_as_reason() {
        let store = Arc::new(MemoryGallery::new());
        let oracle = Arc::new(ScriptedOracle::default());
        let result = engine(store, oracle, EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.reason, Some(DenialReason::EmptyScope));
    }

    #[test]
    fn identity_without_samples_counts_as_empty_scope() {
        let store = Arc::new(MemoryGallery::new());
        store.ensure_scope(&student("cs", "A1")).unwrap();
        let oracle = Arc::new(ScriptedOracle::default());
        let result = engine(store, oracle.clone(), EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert_eq!(result.reason, Some(DenialReason::EmptyScope));
        assert!(oracle.calls().is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "A1"), b"edge", "png").unwrap();
        let oracle = Arc::new(ScriptedOracle::default().answer(b"edge", true, 0.35));
        let result = engine(store.clone(), oracle, EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.reason, Some(DenialReason::NoCoincidence));

        let oracle = Arc::new(ScriptedOracle::default().answer(b"edge", true, 0.349999));
        let result = engine(store, oracle, EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.identity.unwrap().as_str(), "A1");
    }

    #[test]
    fn unverified_comparison_never_matches() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "A1"), b"a1", "png").unwrap();
        let oracle = Arc::new(ScriptedOracle::default().answer(b"a1", false, 0.01));
        let result = engine(store, oracle, EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert!(!result.matched);
    }

    #[test]
    fn first_match_in_enumeration_order_stops_the_scan() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "B2"), b"b2", "png").unwrap();
        store.append_sample(&student("cs", "A1"), b"a1", "png").unwrap();
        let oracle = Arc::new(
            ScriptedOracle::default()
                .answer(b"a1", true, 0.2)
                .answer(b"b2", true, 0.1),
        );
        let result = engine(store, oracle.clone(), EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert_eq!(result.identity.unwrap().as_str(), "A1");
        assert_eq!(oracle.calls(), vec![b"a1".to_vec()]);
    }

    #[test]
    fn oracle_failure_skips_the_sample() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "A1"), b"broken", "png").unwrap();
        store.append_sample(&student("cs", "B2"), b"b2", "png").unwrap();
        let oracle = Arc::new(
            ScriptedOracle::default()
                .fail(b"broken")
                .answer(b"b2", true, 0.1),
        );
        let result = engine(store, oracle, EngineSettings::default())
            .verify(&request("cs"))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.identity.unwrap().as_str(), "B2");
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn scopes_are_isolated() {
        let store = Arc::new(MemoryGallery::new());
        store.append_sample(&student("cs", "A1"), b"a1", "png").unwrap();
        let oracle = Arc::new(ScriptedOracle::default().answer(b"a1", true, 0.0));
        let result = engine(store, oracle.clone(), EngineSettings::default())
            .verify(&request("ee"))
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.reason, Some(DenialReason::EmptyScope));
        assert!(oracle.calls().is_empty());
    }

    #[test]
    fn slow_scans_time_out() {
        let store = Arc::new(MemoryGallery::new());
        for identity in ["A1", "B2", "C3"] {
            store
                .append_sample(&student("cs", identity), identity.as_bytes(), "png")
                .unwrap();
        }
        let oracle = Arc::new(ScriptedOracle {
            delay: Some(Duration::from_millis(30)),
            ..ScriptedOracle::default()
        });
        let settings = EngineSettings {
            scan_timeout: Duration::from_millis(10),
            ..EngineSettings::default()
        };
        let err = engine(store.clone(), oracle, settings)
            .verify(&request("cs"))
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { .. }));
        assert_eq!(store.sample_count(&student("cs", "A1")), 1);
    }

    #[test]
    fn parallel_scan_reports_the_earliest_match() {
        let store = Arc::new(MemoryGallery::new());
        let mut oracle = ScriptedOracle::default();
        for index in 0..32u32 {
            let identity = format!("id{index:02}");
            let reference = identity.clone().into_bytes();
            store
                .append_sample(&student("cs", &identity), &reference, "png")
                .unwrap();
            if index >= 7 {
                oracle = oracle.answer(&reference, true, 0.05);
            }
        }
        let settings = EngineSettings {
            parallel_scan: true,
            max_concurrent_comparisons: 4,
            ..EngineSettings::default()
        };
        let result = engine(store, Arc::new(oracle), settings)
            .verify(&request("cs"))
            .unwrap();
        assert_eq!(result.identity.unwrap().as_str(), "id07");
    }

    #[test]
    fn unreadable_sample_fails_the_request_instead_of_denying() {
        for parallel_scan in [false, true] {
            let oracle = Arc::new(ScriptedOracle::default().answer(b"C3", true, 0.1));
            let settings = EngineSettings {
                parallel_scan,
                max_concurrent_comparisons: 2,
                ..EngineSettings::default()
            };
            let engine =
                VerificationEngine::new(failing_store(Some("B2"), false), oracle, settings)
                    .unwrap();
            let outcome = engine.verify(&request("cs"));
            assert!(
                matches!(outcome, Err(AppError::StoreUnavailable { .. })),
                "parallel_scan={parallel_scan}: {outcome:?}"
            );
        }
    }

    #[test]
    fn unlistable_scope_fails_the_request_instead_of_denying() {
        let oracle = Arc::new(ScriptedOracle::default());
        let engine = VerificationEngine::new(
            failing_store(None, true),
            oracle.clone(),
            EngineSettings::default(),
        )
        .unwrap();
        let err = engine.verify(&request("cs")).unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }));
        assert!(oracle.calls().is_empty());
    }
}
