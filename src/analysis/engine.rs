//! Strategy chain and admission control.
//!
//! A request is served by trying an ordered list of strategies and keeping the
//! first success. Precise analysis is always the last resort. A counting gate
//! admits at most `max_concurrent_analyses` requests at once; extra callers
//! block until a slot frees up. Admitted requests run on the engine's own
//! rayon pool, which only ever receives admitted work.

use std::path::{Path, PathBuf};

use crossbeam::channel::{self, Receiver, Sender};

use crate::analysis::fast::FastAnalyzer;
use crate::analysis::precise;
use crate::analysis::result::AnalysisResult;
use crate::cache::DetectionCache;
use crate::config::{AnalysisConfig, Config};
use crate::detector::{CommandSuite, DetectorSuite};
use crate::error::{AnalysisError, Result};
use crate::separation::{CommandSeparator, StemSeparator};

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub path: PathBuf,
    /// Try the fast cached path before the precise one.
    pub fast: bool,
    /// Strip vocals first and analyze the instrumental.
    pub separate_vocals: bool,
}

impl Request {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fast: false,
            separate_vocals: false,
        }
    }

    fn with_path(&self, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..self.clone()
        }
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn analyze(&self, request: &Request) -> Result<AnalysisResult>;
}

pub struct PreciseStrategy {
    config: AnalysisConfig,
}

impl PreciseStrategy {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }
}

impl Strategy for PreciseStrategy {
    fn name(&self) -> &str {
        "precise"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn analyze(&self, request: &Request) -> Result<AnalysisResult> {
        precise::analyze_file(&request.path, &self.config)
    }
}

pub struct FastStrategy<D: DetectorSuite> {
    analyzer: FastAnalyzer<D>,
}

impl<D: DetectorSuite> FastStrategy<D> {
    pub fn new(analyzer: FastAnalyzer<D>) -> Self {
        Self { analyzer }
    }
}

impl<D: DetectorSuite> Strategy for FastStrategy<D> {
    fn name(&self) -> &str {
        "fast"
    }

    fn is_available(&self) -> bool {
        self.analyzer.is_available()
    }

    fn analyze(&self, request: &Request) -> Result<AnalysisResult> {
        self.analyzer.analyze(&request.path)
    }
}

/// Counting admission gate: a bounded channel holding one token per free slot.
struct Gate {
    release: Sender<()>,
    slots: Receiver<()>,
}

/// Holds one slot; returns it on drop.
struct Permit<'a> {
    gate: &'a Gate,
}

impl Gate {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (release, slots) = channel::bounded(capacity);
        for _ in 0..capacity {
            let _ = release.send(());
        }
        Self { release, slots }
    }

    fn enter(&self) -> Permit<'_> {
        // never disconnected: the gate owns a sender
        let _ = self.slots.recv();
        Permit { gate: self }
    }

    fn free(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.release.send(());
    }
}

pub struct Engine {
    precise: Box<dyn Strategy>,
    fast: Option<Box<dyn Strategy>>,
    separator: Option<Box<dyn StemSeparator>>,
    gate: Gate,
    pool: rayon::ThreadPool,
}

impl Engine {
    pub fn from_config(config: &Config) -> Result<Self> {
        let fast: Option<Box<dyn Strategy>> = if config.fast.enabled {
            let suite = CommandSuite::from_config(&config.fast);
            let cache = DetectionCache::new(&config.fast.cache_dir);
            Some(Box::new(FastStrategy::new(FastAnalyzer::new(suite, cache))))
        } else {
            None
        };
        Self::with_parts(
            Box::new(PreciseStrategy::new(config.analysis.clone())),
            fast,
            Some(Box::new(CommandSeparator::from_config(&config.separation))),
            config.limits.max_concurrent_analyses,
        )
    }

    pub fn with_parts(
        precise: Box<dyn Strategy>,
        fast: Option<Box<dyn Strategy>>,
        separator: Option<Box<dyn StemSeparator>>,
        max_concurrent: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("analysis-{}", i))
            .build()
            .map_err(|e| AnalysisError::InvalidInput(format!("cannot build analysis pool: {}", e)))?;
        Ok(Self {
            precise,
            fast,
            separator,
            gate: Gate::new(max_concurrent),
            pool,
        })
    }

    /// Strategies to try for `request`, in order.
    fn plan(&self, request: &Request) -> Vec<&dyn Strategy> {
        let mut plan: Vec<&dyn Strategy> = Vec::with_capacity(2);
        if request.fast {
            match &self.fast {
                Some(fast) => plan.push(fast.as_ref()),
                None => log::info!("Fast engine requested but disabled"),
            }
        }
        plan.push(self.precise.as_ref());
        plan
    }

    /// Blocks until a slot is free, then runs the strategy chain.
    ///
    /// Call from ordinary threads. A worker of another rayon pool keeps
    /// stealing from that pool while it waits here.
    pub fn analyze(&self, request: &Request) -> Result<AnalysisResult> {
        if self.gate.free() == 0 {
            log::debug!("All analysis slots busy; {} waits", request.path.display());
        }
        let _permit = self.gate.enter();
        self.pool.install(|| self.run(request))
    }

    fn run(&self, request: &Request) -> Result<AnalysisResult> {
        let (target, instrumental) = self.prepare(request);
        let plan = self.plan(&target);

        let mut last_err = None;
        for (i, strategy) in plan.iter().enumerate() {
            let is_last = i + 1 == plan.len();
            if !strategy.is_available() {
                log::info!("Skipping unavailable {} strategy", strategy.name());
                last_err = Some(AnalysisError::Unavailable(strategy.name().to_string()));
                continue;
            }
            log::info!("Analyzing {} with {} strategy", target.path.display(), strategy.name());
            match strategy.analyze(&target) {
                Ok(mut result) => {
                    result.instrumental_path = instrumental.clone();
                    return Ok(result);
                }
                Err(err) if !is_last => {
                    log::warn!("{} strategy failed ({}); falling back", strategy.name(), err);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| AnalysisError::Unavailable("analysis".into())))
    }

    /// Swap in the instrumental stem when vocal filtering is requested and works.
    fn prepare(&self, request: &Request) -> (Request, Option<String>) {
        if !request.separate_vocals {
            return (request.clone(), None);
        }
        let Some(separator) = &self.separator else {
            log::warn!("Vocal filter requested but no separator configured");
            return (request.clone(), None);
        };
        match separator.separate(&request.path) {
            Ok(stems) => {
                let path = stems.instrumental.to_string_lossy().into_owned();
                (request.with_path(&stems.instrumental), Some(path))
            }
            Err(err) => {
                log::warn!("Vocal separation failed ({}); analyzing original mix", err);
                (request.clone(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::Stems;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed(f32),
        Fail,
        FailLoad,
    }

    struct FakeStrategy {
        name: &'static str,
        available: bool,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeStrategy {
        fn new(name: &'static str, available: bool, outcome: Outcome) -> Self {
            Self {
                name,
                available,
                outcome,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Strategy for FakeStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn analyze(&self, request: &Request) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.path.clone());
            match self.outcome {
                Outcome::Succeed(tempo) => Ok(AnalysisResult {
                    tempo,
                    ..AnalysisResult::default()
                }),
                Outcome::Fail => Err(AnalysisError::Detector {
                    detector: self.name.into(),
                    message: "boom".into(),
                }),
                Outcome::FailLoad => Err(AnalysisError::load(&request.path, "corrupt")),
            }
        }
    }

    struct FakeSeparator {
        fail: bool,
    }

    impl StemSeparator for FakeSeparator {
        fn separate(&self, _path: &Path) -> Result<Stems> {
            if self.fail {
                return Err(AnalysisError::Separation("no model".into()));
            }
            Ok(Stems {
                vocals: PathBuf::from("/stems/vocals.wav"),
                instrumental: PathBuf::from("/stems/instrumental.wav"),
            })
        }
    }

    fn engine(precise: FakeStrategy, fast: Option<FakeStrategy>) -> Engine {
        Engine::with_parts(
            Box::new(precise),
            fast.map(|f| Box::new(f) as Box<dyn Strategy>),
            None,
            2,
        )
        .unwrap()
    }

    fn fast_request() -> Request {
        Request {
            fast: true,
            ..Request::new("song.mp3")
        }
    }

    #[test]
    fn fast_wins_when_requested_and_available() {
        let engine = engine(
            FakeStrategy::new("precise", true, Outcome::Succeed(1.0)),
            Some(FakeStrategy::new("fast", true, Outcome::Succeed(2.0))),
        );
        assert_eq!(engine.analyze(&fast_request()).unwrap().tempo, 2.0);
        assert_eq!(engine.analyze(&Request::new("song.mp3")).unwrap().tempo, 1.0);
    }

    #[test]
    fn unavailable_fast_path_is_skipped() {
        let fast = FakeStrategy::new("fast", false, Outcome::Succeed(2.0));
        let calls = fast.calls.clone();
        let engine = engine(FakeStrategy::new("precise", true, Outcome::Succeed(1.0)), Some(fast));
        assert_eq!(engine.analyze(&fast_request()).unwrap().tempo, 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fast_failure_falls_back_to_precise() {
        let engine = engine(
            FakeStrategy::new("precise", true, Outcome::Succeed(1.0)),
            Some(FakeStrategy::new("fast", true, Outcome::Fail)),
        );
        assert_eq!(engine.analyze(&fast_request()).unwrap().tempo, 1.0);
    }

    #[test]
    fn precise_load_error_is_returned() {
        let engine = engine(
            FakeStrategy::new("precise", true, Outcome::FailLoad),
            Some(FakeStrategy::new("fast", true, Outcome::Fail)),
        );
        let err = engine.analyze(&fast_request()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn instrumental_is_analyzed_and_reported() {
        let precise = FakeStrategy::new("precise", true, Outcome::Succeed(1.0));
        let seen = precise.seen.clone();
        let engine = Engine::with_parts(
            Box::new(precise),
            None,
            Some(Box::new(FakeSeparator { fail: false })),
            1,
        )
        .unwrap();

        let request = Request {
            separate_vocals: true,
            ..Request::new("song.mp3")
        };
        let result = engine.analyze(&request).unwrap();
        assert_eq!(result.instrumental_path.as_deref(), Some("/stems/instrumental.wav"));
        assert_eq!(seen.lock().unwrap()[0], PathBuf::from("/stems/instrumental.wav"));
    }

    #[test]
    fn separation_failure_uses_original_mix() {
        let precise = FakeStrategy::new("precise", true, Outcome::Succeed(1.0));
        let seen = precise.seen.clone();
        let engine = Engine::with_parts(
            Box::new(precise),
            None,
            Some(Box::new(FakeSeparator { fail: true })),
            1,
        )
        .unwrap();

        let request = Request {
            separate_vocals: true,
            ..Request::new("song.mp3")
        };
        let result = engine.analyze(&request).unwrap();
        assert!(result.instrumental_path.is_none());
        assert_eq!(seen.lock().unwrap()[0], PathBuf::from("song.mp3"));
    }

    /// Parallel inner work, like the spectral stages of the precise path.
    struct ParallelStrategy {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Strategy for ParallelStrategy {
        fn name(&self) -> &str {
            "parallel"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn analyze(&self, _request: &Request) -> Result<AnalysisResult> {
            use rayon::prelude::*;

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            (0..64)
                .into_par_iter()
                .for_each(|_| std::thread::sleep(Duration::from_millis(2)));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(AnalysisResult::default())
        }
    }

    struct Shared(Arc<ParallelStrategy>);

    impl Strategy for Shared {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn is_available(&self) -> bool {
            true
        }
        fn analyze(&self, request: &Request) -> Result<AnalysisResult> {
            self.0.analyze(request)
        }
    }

    #[test]
    fn admission_gate_bounds_parallel_analyses() {
        let heavy = Arc::new(ParallelStrategy {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let engine = Arc::new(Engine::with_parts(Box::new(Shared(heavy.clone())), None, None, 2).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.analyze(&Request::new("x.wav")).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let peak = heavy.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "{} analyses ran at once", peak);
        assert!(peak >= 1);
        assert_eq!(engine.gate.free(), 2);
    }

    #[test]
    fn permit_is_returned_on_failure() {
        let engine = engine(FakeStrategy::new("precise", true, Outcome::FailLoad), None);
        for _ in 0..3 {
            assert!(engine.analyze(&Request::new("bad.mp3")).is_err());
        }
        assert_eq!(engine.gate.free(), 2);
    }

    #[test]
    fn zero_capacity_still_admits_one() {
        let gate = Gate::new(0);
        let permit = gate.enter();
        assert_eq!(gate.free(), 0);
        drop(permit);
        assert_eq!(gate.free(), 1);
    }
}
