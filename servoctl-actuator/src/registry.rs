//! Servo registry: id → controller mapping, process-wide config, bulk fan-out
//!
//! Moves and other per-servo commands share a read lock on the registry, so
//! different servos move concurrently while each controller serializes its own
//! work. Configuration changes, (re)initialization and shutdown take the write
//! lock and therefore run with no command in flight.
//!
//! Every command runs on its own task. A caller that stops waiting (a dropped
//! HTTP request, a timeout) does not interrupt a move halfway: the servo still
//! reaches its target, the hold policy still applies and the snapshot is
//! still published.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

use crate::config::{ConfigUpdate, ServoConfig};
use crate::controller::{MotionController, MoveOutcome};
use crate::device::{DeviceFactory, ServoDevice};
use crate::error::{ServoError, ServoResult};
use crate::publisher::{StatusPublisher, StatusSnapshot};
use crate::scheduler::DetachScheduler;
use crate::state::ServoState;
use crate::types::{CENTER_ANGLE, ServoId};

/// Per-servo outcome of an operation applied to every servo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub succeeded: Vec<ServoId>,
    pub failed: BTreeMap<ServoId, ServoError>,
}

impl BulkReport {
    /// Every servo failed with the same error
    fn all_failed(ids: impl IntoIterator<Item = ServoId>, error: &ServoError) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: ids.into_iter().map(|id| (id, error.clone())).collect(),
        }
    }

    fn record<T>(&mut self, id: ServoId, result: ServoResult<T>) {
        match result {
            Ok(_) => self.succeeded.push(id),
            Err(e) => {
                self.failed.insert(id, e);
            }
        }
    }

    /// True when every servo succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct RegistryInner {
    config: ServoConfig,
    controllers: BTreeMap<ServoId, MotionController>,
}

impl RegistryInner {
    fn controller(&self, id: ServoId) -> ServoResult<&MotionController> {
        self.controllers.get(&id).ok_or(ServoError::NotFound(id))
    }

    fn snapshot(&self) -> StatusSnapshot {
        self.controllers
            .iter()
            .map(|(id, controller)| (*id, controller.state()))
            .collect()
    }
}

/// Owner of every servo on the host
///
/// Cheap to clone; clones share the same servos.
#[derive(Debug, Clone)]
pub struct ServoRegistry {
    pins: Arc<[u8]>,
    factory: Arc<dyn DeviceFactory>,
    inner: Arc<RwLock<RegistryInner>>,
    scheduler: DetachScheduler,
    publisher: StatusPublisher,
}

impl ServoRegistry {
    /// Servo ids are assigned from 1 in `pins` order. No hardware is touched
    /// until [`initialize_all`](Self::initialize_all).
    pub fn new(pins: Vec<u8>, factory: Arc<dyn DeviceFactory>) -> Self {
        Self {
            pins: pins.into(),
            factory,
            inner: Arc::new(RwLock::new(RegistryInner {
                config: ServoConfig::default(),
                controllers: BTreeMap::new(),
            })),
            scheduler: DetachScheduler::new(),
            publisher: StatusPublisher::default(),
        }
    }

    /// Builds a registry and initializes every channel with `config`
    pub async fn start(
        pins: Vec<u8>,
        config: ServoConfig,
        factory: Arc<dyn DeviceFactory>,
    ) -> ServoResult<(Self, BulkReport)> {
        let registry = Self::new(pins, factory);
        let report = registry.initialize_all(config).await?;
        Ok((registry, report))
    }

    /// Destroys any existing devices, then opens every channel and places it
    /// at center. Channel failures are reported per id and never abort the rest.
    pub async fn initialize_all(&self, config: ServoConfig) -> ServoResult<BulkReport> {
        let registry = self.clone();
        run_to_completion(async move { registry.initialize_all_now(config).await }).await?
    }

    async fn initialize_all_now(&self, config: ServoConfig) -> ServoResult<BulkReport> {
        config.validate()?;
        let mut inner = self.inner.write().await;
        inner.config = config;
        let report = self.rebuild(&mut inner).await;
        self.publisher.publish(inner.snapshot());
        Ok(report)
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }

    pub async fn config(&self) -> ServoConfig {
        self.inner.read().await.config.clone()
    }

    pub async fn ids(&self) -> Vec<ServoId> {
        self.inner.read().await.controllers.keys().copied().collect()
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn status_of(&self, id: ServoId) -> ServoResult<ServoState> {
        Ok(self.inner.read().await.controller(id)?.state())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatusSnapshot>> {
        self.publisher.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// Pushes the current snapshot to every subscriber
    pub async fn publish_status(&self) -> usize {
        let snapshot = self.status().await;
        self.publisher.publish(snapshot)
    }

    pub async fn move_one(&self, id: ServoId, angle: i32) -> ServoResult<MoveOutcome> {
        let registry = self.clone();
        run_to_completion(async move { registry.move_one_now(id, angle).await }).await?
    }

    async fn move_one_now(&self, id: ServoId, angle: i32) -> ServoResult<MoveOutcome> {
        let inner = self.inner.read().await;
        let outcome = inner.controller(id)?.move_to(angle, &inner.config).await?;
        self.publisher.publish(inner.snapshot());
        Ok(outcome)
    }

    pub async fn move_all(&self, angle: i32) -> BulkReport {
        let registry = self.clone();
        self.finish_detached(async move { registry.move_all_now(angle).await }).await
    }

    async fn move_all_now(&self, angle: i32) -> BulkReport {
        let inner = self.inner.read().await;
        let config = &inner.config;
        let results = join_all(
            inner
                .controllers
                .values()
                .map(|controller| async move { (controller.id(), controller.move_to(angle, config).await) }),
        )
        .await;
        self.finish_bulk(&inner, results)
    }

    pub async fn center_one(&self, id: ServoId) -> ServoResult<MoveOutcome> {
        self.move_one(id, i32::from(CENTER_ANGLE)).await
    }

    pub async fn center_all(&self) -> BulkReport {
        self.move_all(i32::from(CENTER_ANGLE)).await
    }

    pub async fn hold_one(&self, id: ServoId) -> ServoResult<()> {
        let registry = self.clone();
        run_to_completion(async move { registry.hold_one_now(id).await }).await?
    }

    async fn hold_one_now(&self, id: ServoId) -> ServoResult<()> {
        let inner = self.inner.read().await;
        inner.controller(id)?.hold().await?;
        self.publisher.publish(inner.snapshot());
        Ok(())
    }

    pub async fn release_one(&self, id: ServoId) -> ServoResult<()> {
        let registry = self.clone();
        run_to_completion(async move { registry.release_one_now(id).await }).await?
    }

    async fn release_one_now(&self, id: ServoId) -> ServoResult<()> {
        let inner = self.inner.read().await;
        inner.controller(id)?.release().await?;
        self.publisher.publish(inner.snapshot());
        Ok(())
    }

    pub async fn hold_all(&self) -> BulkReport {
        let registry = self.clone();
        self.finish_detached(async move { registry.hold_all_now().await }).await
    }

    async fn hold_all_now(&self) -> BulkReport {
        let inner = self.inner.read().await;
        let results = join_all(
            inner
                .controllers
                .values()
                .map(|controller| async move { (controller.id(), controller.hold().await) }),
        )
        .await;
        self.finish_bulk(&inner, results)
    }

    pub async fn release_all(&self) -> BulkReport {
        let registry = self.clone();
        self.finish_detached(async move { registry.release_all_now().await }).await
    }

    async fn release_all_now(&self) -> BulkReport {
        let inner = self.inner.read().await;
        let results = join_all(
            inner
                .controllers
                .values()
                .map(|controller| async move { (controller.id(), controller.release().await) }),
        )
        .await;
        self.finish_bulk(&inner, results)
    }

    /// Merges `update` over the current config and, if the result validates,
    /// re-initializes every servo with it. A rejected update changes nothing.
    pub async fn update_config(&self, update: ConfigUpdate) -> ServoResult<ServoConfig> {
        let registry = self.clone();
        run_to_completion(async move { registry.update_config_now(update).await }).await?
    }

    async fn update_config_now(&self, update: ConfigUpdate) -> ServoResult<ServoConfig> {
        let mut inner = self.inner.write().await;
        let next = update.apply_to(&inner.config)?;

        info!(
            hold_mode = %next.hold_mode,
            detach_enabled = next.detach_enabled,
            hold_time = next.hold_time,
            smooth_enabled = next.smooth_enabled,
            "applying servo configuration"
        );
        inner.config = next.clone();
        let report = self.rebuild(&mut inner).await;
        if !report.is_complete() {
            warn!(failed = report.failed.len(), "some servos failed to re-initialize");
        }
        self.publisher.publish(inner.snapshot());
        Ok(next)
    }

    /// Cancels every pending detach and detaches every servo. Failures are
    /// logged, not returned. Servos are inactive afterwards.
    pub async fn shutdown(&self) {
        let registry = self.clone();
        let drained = run_to_completion(async move {
            let inner = registry.inner.write().await;
            registry.teardown(&inner).await;
            info!(servos = inner.controllers.len(), "servos released");
        })
        .await;
        if let Err(e) = drained {
            warn!(error = %e, "servo drain interrupted");
        }
    }

    async fn teardown(&self, inner: &RegistryInner) {
        self.scheduler.cancel_all();
        for controller in inner.controllers.values() {
            if let Err(e) = controller.retire().await {
                warn!(servo_id = controller.id(), error = %e, "detach failed during teardown");
            }
        }
    }

    async fn rebuild(&self, inner: &mut RegistryInner) -> BulkReport {
        self.teardown(inner).await;
        inner.controllers.clear();

        let mut report = BulkReport::default();
        let range = inner.config.pulse_range();
        for (id, gpio) in (1..).zip(self.pins.iter().copied()) {
            let device = match ServoDevice::create(self.factory.as_ref(), gpio, range) {
                Ok(device) => {
                    info!(servo_id = id, gpio, "servo initialized");
                    Some(device)
                }
                Err(e) => {
                    warn!(servo_id = id, gpio, error = %e, "servo unavailable");
                    report.failed.insert(id, e.into_init_error());
                    None
                }
            };
            let controller = MotionController::new(id, gpio, device, self.scheduler.clone());
            inner.controllers.insert(id, controller);
        }

        // every servo is centered, release mode included; the policy detaches it afterwards
        let config = &inner.config;
        let placements = join_all(
            inner
                .controllers
                .values()
                .filter(|controller| !report.failed.contains_key(&controller.id()))
                .map(|controller| async move { (controller, controller.place_initial(config).await) }),
        )
        .await;

        for (controller, result) in placements {
            match result {
                Ok(()) => report.succeeded.push(controller.id()),
                Err(e) => {
                    warn!(servo_id = controller.id(), error = %e, "initial placement failed");
                    controller.deactivate().await;
                    report.failed.insert(controller.id(), e);
                }
            }
        }
        report
    }

    /// Runs a bulk command to completion; if the runtime stops first, every
    /// servo is reported as failed
    async fn finish_detached<F>(&self, work: F) -> BulkReport
    where
        F: Future<Output = BulkReport> + Send + 'static,
    {
        run_to_completion(work).await.unwrap_or_else(|e| {
            let ids = (1..).take(self.pins.len());
            BulkReport::all_failed(ids, &e)
        })
    }

    fn finish_bulk<T>(
        &self,
        inner: &RegistryInner,
        results: Vec<(ServoId, ServoResult<T>)>,
    ) -> BulkReport {
        let mut report = BulkReport::default();
        for (id, result) in results {
            report.record(id, result);
        }
        if !report.succeeded.is_empty() {
            self.publisher.publish(inner.snapshot());
        }
        report
    }
}

/// Runs `work` on its own task and waits for it. The work finishes even if
/// the returned future is dropped. Panics in the work are propagated.
async fn run_to_completion<T, F>(work: F) -> ServoResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(ServoError::ShuttingDown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedFactory;
    use crate::types::HoldMode;

    async fn registry(factory: &SimulatedFactory) -> ServoRegistry {
        let config = ServoConfig {
            hold_mode: HoldMode::Hold,
            ..Default::default()
        };
        let (registry, report) = ServoRegistry::start(vec![13, 6, 19, 26], config, Arc::new(factory.clone()))
            .await
            .unwrap();
        assert!(report.is_complete());
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_follow_pin_order() {
        let registry = registry(&SimulatedFactory::new()).await;
        assert_eq!(registry.ids().await, vec![1, 2, 3, 4]);

        let status = registry.status().await;
        assert_eq!(status[&1].gpio_pin, 13);
        assert_eq!(status[&4].gpio_pin, 26);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id() {
        let registry = registry(&SimulatedFactory::new()).await;
        assert_eq!(registry.move_one(9, 10).await, Err(ServoError::NotFound(9)));
        assert_eq!(registry.hold_one(9).await, Err(ServoError::NotFound(9)));
        assert_eq!(registry.release_one(0).await, Err(ServoError::NotFound(0)));
        assert!(matches!(registry.status_of(5).await, Err(ServoError::NotFound(5))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_failure_is_per_channel() {
        let factory = SimulatedFactory::new().fail_open(19);
        let (registry, report) =
            ServoRegistry::start(vec![13, 6, 19, 26], ServoConfig::default(), Arc::new(factory))
                .await
                .unwrap();

        assert_eq!(report.succeeded, vec![1, 2, 4]);
        assert_eq!(report.failed[&3].code(), "HARDWARE_INIT_ERROR");

        let state = registry.status_of(3).await.unwrap();
        assert!(!state.is_active);
        assert_eq!(state.current_angle, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placement_failure_deactivates() {
        let factory = SimulatedFactory::new().fail_writes(6);
        let (registry, report) =
            ServoRegistry::start(vec![13, 6], ServoConfig::default(), Arc::new(factory.clone()))
                .await
                .unwrap();

        assert_eq!(report.succeeded, vec![1]);
        assert_eq!(report.failed[&2].code(), "HARDWARE_WRITE_ERROR");

        // stays inactive even once the line recovers
        factory.heal_writes(6);
        assert_eq!(registry.move_one(2, 10).await, Err(ServoError::Inactive(2)));
        assert!(!registry.status_of(2).await.unwrap().is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_initial_config_rejected() {
        let registry = ServoRegistry::new(vec![13], Arc::new(SimulatedFactory::new()));
        let config = ServoConfig {
            hold_time: 0.0,
            ..Default::default()
        };
        let err = registry.initialize_all(config).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_VALIDATION_ERROR");
        assert!(registry.ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_and_release_all() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;

        let report = registry.release_all().await;
        assert_eq!(report.succeeded, vec![1, 2, 3, 4]);
        assert!(registry.status().await.values().all(|s| !s.attached));

        let report = registry.hold_all().await;
        assert!(report.is_complete());
        assert!(registry.status().await.values().all(|s| s.attached));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_write_fault_does_not_poison_siblings() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;
        factory.break_writes(6);

        let report = registry.move_all(30).await;
        assert_eq!(report.succeeded, vec![1, 3, 4]);
        assert_eq!(report.failed[&2].code(), "HARDWARE_WRITE_ERROR");

        let status = registry.status().await;
        assert_eq!(status[&1].current_angle, Some(30));
        assert_eq!(status[&2].current_angle, Some(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_are_published() {
        let registry = registry(&SimulatedFactory::new()).await;
        let mut updates = registry.subscribe();

        registry.move_one(3, 120).await.unwrap();
        let snapshot = updates.recv().await.unwrap();
        assert_eq!(snapshot[&3].current_angle, Some(120));

        registry.center_all().await;
        let snapshot = updates.recv().await.unwrap();
        assert!(snapshot.values().all(|s| s.current_angle == Some(90)));

        assert_eq!(registry.publish_status().await, 1);
        assert!(updates.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_move_is_not_published() {
        let registry = registry(&SimulatedFactory::new()).await;
        let mut updates = registry.subscribe();

        assert!(registry.move_one(42, 10).await.is_err());
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_update_recreates_devices() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;
        assert_eq!(factory.open_count(13), 1);

        let update: ConfigUpdate =
            serde_json::from_str(r#"{"min_pulse_width": 0.0006, "max_pulse_width": 0.0024}"#).unwrap();
        let config = registry.update_config(update).await.unwrap();
        assert_eq!(config.min_pulse_width, 0.0006);
        assert_eq!(config.hold_mode, HoldMode::Hold);
        assert_eq!(factory.open_count(13), 2);

        factory.clear_events();
        registry.move_one(1, 0).await.unwrap();
        assert_eq!(factory.pulses(13), vec![config.pulse_range().min]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_mode_update_detaches_everything() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;
        assert!(registry.status().await.values().all(|s| s.attached));

        factory.clear_events();
        let update = ConfigUpdate {
            hold_mode: Some("release".into()),
            ..Default::default()
        };
        registry.update_config(update).await.unwrap();
        assert!(registry.status().await.values().all(|s| !s.attached));
        // re-centered once before going limp
        assert_eq!(factory.pulses(13).len(), 1);
        assert!(factory.disable_count(13) >= 1);

        factory.clear_events();
        assert_eq!(registry.move_one(1, 45).await, Ok(MoveOutcome::Released));
        assert!(factory.pulses(13).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_detaches_and_deactivates() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;

        registry.shutdown().await;
        for gpio in [13, 6, 19, 26] {
            assert_eq!(factory.disable_count(gpio), 1);
        }
        assert!(registry.status().await.values().all(|s| !s.attached));
        assert_eq!(registry.move_one(1, 10).await, Err(ServoError::Inactive(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_tolerates_detach_failures() {
        let factory = SimulatedFactory::new();
        let registry = registry(&factory).await;
        factory.break_writes(19);

        registry.shutdown().await;
        assert_eq!(factory.disable_count(13), 1);
        assert_eq!(factory.disable_count(26), 1);
    }
}
