use crate::application::cosigner::Cosigner;
use crate::application::leader::Leader;
use crate::domain::moving_average::MovingAverage;
use crate::domain::nonce::{CachedNonce, Nonce, NonceCache};
use crate::foundation::{CosignerId, Result, SignerError};
use crate::infrastructure::config::NonceConfig;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

// Demand window spans a few reconcile intervals so short bursts do not whip
// the target around.
const MOVING_AVERAGE_INTERVALS: u32 = 4;

#[derive(Clone, Debug)]
pub struct NonceCacheConfig {
    pub get_nonces_interval: Duration,
    pub get_nonces_timeout: Duration,
    pub nonce_expiration: Duration,
    pub threshold: usize,
    pub safety_factor: f64,
    pub target_min: usize,
    pub target_max: usize,
}

impl NonceCacheConfig {
    pub fn from_settings(settings: &NonceConfig, threshold: usize) -> Self {
        Self {
            get_nonces_interval: Duration::from_millis(settings.get_nonces_interval_ms),
            get_nonces_timeout: Duration::from_millis(settings.get_nonces_timeout_ms),
            nonce_expiration: Duration::from_millis(settings.nonce_expiration_ms),
            threshold,
            safety_factor: settings.safety_factor,
            target_min: settings.target_min,
            target_max: settings.target_max,
        }
    }
}

/// Pruning strategy hook. The cache prunes itself in production; tests pass
/// a wrapper to observe prune counts.
pub trait NoncePruner: Send + Sync {
    fn prune_nonces(&self) -> usize;
}

struct ReconcileMark {
    at: Instant,
    expected: usize,
}

/// Demand-estimated pre-computed nonce pool. A background reconcile loop
/// prunes expired sets, measures the consumption rate, and — on the leader
/// only — replenishes toward a target sized to cover one nonce lifetime of
/// demand.
pub struct CosignerNonceCache {
    config: NonceCacheConfig,
    cosigners: Vec<Arc<dyn Cosigner>>,
    leader: Arc<dyn Leader>,
    pruner: Option<Arc<dyn NoncePruner>>,
    cache: Mutex<NonceCache>,
    moving_average: Mutex<MovingAverage>,
    last_reconcile: Mutex<ReconcileMark>,
    empty_count: AtomicU64,
}

impl CosignerNonceCache {
    pub fn new(
        config: NonceCacheConfig,
        cosigners: Vec<Arc<dyn Cosigner>>,
        leader: Arc<dyn Leader>,
        pruner: Option<Arc<dyn NoncePruner>>,
    ) -> Arc<Self> {
        let window = config.get_nonces_interval * MOVING_AVERAGE_INTERVALS;
        Arc::new(Self {
            config,
            cosigners,
            leader,
            pruner,
            cache: Mutex::new(NonceCache::new()),
            moving_average: Mutex::new(MovingAverage::new(window)),
            last_reconcile: Mutex::new(ReconcileMark { at: Instant::now(), expected: 0 }),
            empty_count: AtomicU64::new(0),
        })
    }

    fn lock_cache(&self) -> MutexGuard<'_, NonceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn size(&self) -> usize {
        self.lock_cache().len()
    }

    /// Weighted average of the recent consumption rate, in nonce sets per
    /// second.
    pub fn demand_rate(&self) -> f64 {
        self.moving_average.lock().unwrap_or_else(|e| e.into_inner()).average()
    }

    /// The pool size needed to ride out one nonce lifetime at `rate_per_sec`
    /// demand, with headroom, clamped to the configured bounds.
    pub fn target(&self, rate_per_sec: f64) -> usize {
        let demand = rate_per_sec * self.config.nonce_expiration.as_secs_f64() * self.config.safety_factor;
        (demand.ceil() as usize).clamp(self.config.target_min, self.config.target_max)
    }

    /// Atomically removes and returns the oldest cached set covering all
    /// `participants`. A returned set is never reinserted, so it is consumed
    /// by at most one signing round.
    pub fn get_nonces(&self, participants: &[CosignerId]) -> Result<CachedNonce> {
        if let Some(entry) = self.lock_cache().take_matching(participants) {
            return Ok(entry);
        }
        self.empty_count.fetch_add(1, Ordering::Relaxed);
        Err(SignerError::NoNoncesAvailable)
    }

    /// Removes cosigner `c` from every cached set and drops sets that fall
    /// below the threshold. Called when a peer is deemed faulty or restarts.
    pub fn clear_nonces(&self, cosigner_id: CosignerId) {
        let dropped = self.lock_cache().clear_cosigner(cosigner_id, self.config.threshold);
        info!("cleared nonces for cosigner {} ({} sets dropped below threshold)", cosigner_id, dropped);
    }

    /// Synchronously pre-computes `n` fresh nonce sets by fanning
    /// `get_nonces` out to every cosigner in parallel, each call bounded by
    /// the configured timeout. Returns the number of sets added.
    pub async fn load_n(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let started = Instant::now();
        let uuids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        let expiration = Instant::now() + self.config.nonce_expiration;

        let mut join_set = JoinSet::new();
        for cosigner in &self.cosigners {
            let cosigner = Arc::clone(cosigner);
            let uuids = uuids.clone();
            let timeout = self.config.get_nonces_timeout;
            join_set.spawn(async move {
                let result = tokio::time::timeout(timeout, cosigner.get_nonces(&uuids)).await;
                (cosigner.id(), result)
            });
        }

        let mut responses: HashMap<CosignerId, HashMap<Uuid, Vec<Nonce>>> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((id, result)) = joined else {
                continue;
            };
            match result {
                Ok(Ok(sets)) => {
                    responses.insert(id, sets.into_iter().map(|set| (set.uuid, set.nonces)).collect());
                }
                Ok(Err(err)) => warn!("failed to get nonces from cosigner {}: {}", id, err),
                Err(_) => {
                    warn!("timed out getting nonces from cosigner {} after {:?}", id, self.config.get_nonces_timeout)
                }
            }
        }

        if responses.len() < self.config.threshold {
            warn!(
                "nonce replenishment abandoned: {} of {} cosigners responded, threshold {}",
                responses.len(),
                self.cosigners.len(),
                self.config.threshold
            );
            return 0;
        }

        let total = self.cosigners.len();
        let mut added = 0;
        for uuid in uuids {
            let mut per_source: BTreeMap<CosignerId, Vec<Nonce>> = BTreeMap::new();
            for (source, by_uuid) in &responses {
                match by_uuid.get(&uuid) {
                    Some(nonces) if nonces.len() == total => {
                        per_source.insert(*source, nonces.clone());
                    }
                    Some(nonces) => {
                        warn!("cosigner {} returned {} shares for uuid {}, expected {}", source, nonces.len(), uuid, total)
                    }
                    None => {}
                }
            }
            if per_source.len() < self.config.threshold {
                debug!("dropping nonce set {}: only {} of {} required sources", uuid, per_source.len(), self.config.threshold);
                continue;
            }
            self.lock_cache().push(CachedNonce { uuid, expiration, per_source });
            added += 1;
        }
        debug!("loaded {} nonce sets in {:?} ({} requested)", added, started.elapsed(), n);
        added
    }

    /// One reconcile pass: prune, measure demand, and (leader only)
    /// replenish up to the target.
    pub async fn reconcile(&self) {
        let pruned = match &self.pruner {
            Some(pruner) => pruner.prune_nonces(),
            None => self.prune_nonces(),
        };

        if !self.leader.is_leader() {
            // A non-leader keeps pruning but never replenishes; reset the
            // demand mark so later leadership starts from a clean slate.
            let remaining = self.size();
            self.set_mark(ReconcileMark { at: Instant::now(), expected: remaining });
            return;
        }

        let remaining = self.size();
        let (elapsed, consumed) = {
            let mark = self.last_reconcile.lock().unwrap_or_else(|e| e.into_inner());
            (mark.at.elapsed(), mark.expected.saturating_sub(remaining + pruned))
        };
        let rate = if elapsed > Duration::ZERO { consumed as f64 / elapsed.as_secs_f64() } else { 0.0 };
        let average = {
            let mut moving_average = self.moving_average.lock().unwrap_or_else(|e| e.into_inner());
            moving_average.add(elapsed, rate);
            moving_average.average()
        };
        let target = self.target(average);
        let misses = self.empty_count.swap(0, Ordering::Relaxed) as usize;
        let want = target.saturating_add(misses);

        if want > remaining {
            let additional = want - remaining;
            self.set_mark(ReconcileMark { at: Instant::now(), expected: remaining + additional });
            debug!(
                "replenishing nonce cache: have={} target={} misses={} pruned={} rate={:.2}/s",
                remaining, target, misses, pruned, average
            );
            let added = self.load_n(additional).await;
            if added < additional {
                debug!("replenishment added {} of {} requested nonce sets", added, additional);
            }
        } else {
            self.set_mark(ReconcileMark { at: Instant::now(), expected: remaining });
        }
    }

    fn set_mark(&self, mark: ReconcileMark) {
        *self.last_reconcile.lock().unwrap_or_else(|e| e.into_inner()) = mark;
    }

    /// Reconcile loop; runs until `shutdown` flips to true or is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.get_nonces_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "nonce cache reconcile loop started interval={:?} timeout={:?} expiration={:?} threshold={}",
            self.config.get_nonces_interval, self.config.get_nonces_timeout, self.config.nonce_expiration, self.config.threshold
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reconcile().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("nonce cache reconcile loop stopped");
    }
}

impl NoncePruner for CosignerNonceCache {
    fn prune_nonces(&self) -> usize {
        self.lock_cache().prune(Instant::now())
    }
}
