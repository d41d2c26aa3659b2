    use super::*;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use jobmesh_core::{job_fn, Job, JobDefinition, OverlapGuard};
    use jobmesh_workqueue::{Delivery, DurableQueue, MemoryQueue, QueueError, QueueMessage};

    fn counting_job(counter: &Arc<AtomicU32>) -> Arc<dyn Job> {
        let counter = counter.clone();
        job_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn engine_with(
        config: SchedulerConfig,
        jobs: Vec<(JobDefinition, Arc<dyn Job>)>,
        queue: Option<Arc<dyn DurableQueue>>,
    ) -> Arc<LocalTriggerEngine> {
        let default_queue = config.default_queue_name.clone();
        let mut registry = JobRegistry::new(config);
        for (definition, job) in jobs {
            registry.register(definition, job).unwrap();
        }
        let dispatcher = queue.map(|q| QueueDispatcher::new(q, default_queue));
        Arc::new(LocalTriggerEngine::new(
            Arc::new(registry),
            JobRunner::new(Arc::new(OverlapGuard::new())),
            dispatcher,
        ))
    }

    /// Fails the first `failures` enqueues.
    struct FlakyQueue {
        inner: MemoryQueue,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyQueue {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryQueue::default(),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DurableQueue for FlakyQueue {
        fn backend(&self) -> &str {
            "flaky"
        }

        async fn enqueue(&self, message: QueueMessage) -> Result<EnqueueReceipt, QueueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(QueueError::Backend("broker unavailable".into()));
            }
            self.inner.enqueue(message).await
        }

        async fn receive(&self, queue_name: &str) -> Result<Option<Delivery>, QueueError> {
            self.inner.receive(queue_name).await
        }

        async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
            self.inner.ack(delivery).await
        }

        async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
            self.inner.nack(delivery).await
        }
    }

    #[tokio::test]
    async fn test_run_on_start_without_cron_fires_once() {
        let count = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(JobDefinition::new("warmup").run_on_start(true), counting_job(&count))],
            None,
        );

        engine.start();
        engine.start();
        assert!(engine.shutdown(Duration::from_secs(5)).await);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let next = engine.next_fire_times();
        assert_eq!(next.len(), 1);
        assert!(next[0].next.is_none());
    }

    #[tokio::test]
    async fn test_disabled_engine_is_noop_but_introspectable() {
        let count = Arc::new(AtomicU32::new(0));
        let config = SchedulerConfig {
            enabled: false,
            ..Default::default()
        };
        let engine = engine_with(
            config,
            vec![(
                JobDefinition::new("heartbeat")
                    .cron("* * * * * *")
                    .run_on_start(true),
                counting_job(&count),
            )],
            None,
        );

        engine.start();
        assert!(!engine.is_started());
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(engine.shutdown(Duration::from_secs(1)).await);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(engine.registry().lookup("heartbeat").is_ok());
        let next = engine.next_fire_times();
        assert_eq!(next[0].cron_expression.as_deref(), Some("* * * * * *"));
        assert!(next[0].next.is_none());
    }

    #[tokio::test]
    async fn test_disabled_job_not_fired() {
        let count = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(
                JobDefinition::new("off").run_on_start(true).enabled(false),
                counting_job(&count),
            )],
            None,
        );

        engine.start();
        assert!(engine.shutdown(Duration::from_secs(1)).await);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let outcome = engine.trigger("off").await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::NotRun { .. }));
    }

    #[tokio::test]
    async fn test_cron_job_fires_repeatedly() {
        let count = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(JobDefinition::new("tick").cron("* * * * * *"), counting_job(&count))],
            None,
        );

        engine.start();
        let next = engine.next_fire_times();
        assert!(next[0].next.is_some());

        tokio::time::sleep(Duration::from_millis(2300)).await;
        assert!(engine.shutdown(Duration::from_secs(1)).await);

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least two ticks, got {}", fired);
    }

    #[tokio::test]
    async fn test_slow_job_does_not_delay_next_tick() {
        let started = Arc::new(AtomicU32::new(0));
        let counter = started.clone();
        let slow = job_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Ok(())
            }
        });

        // Overlap allowed: every tick starts a body even while one runs.
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(
                JobDefinition::new("slow").cron("* * * * * *").prevent_overlap(false),
                slow,
            )],
            None,
        );

        engine.start();
        tokio::time::sleep(Duration::from_millis(2300)).await;
        assert!(started.load(Ordering::SeqCst) >= 2);
        assert!(engine.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let count = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(JobDefinition::new("report"), counting_job(&count))],
            None,
        );

        let outcome = engine.trigger("report").await.unwrap();
        assert_eq!(outcome.run_outcome(), Some(RunOutcome::Succeeded));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let err = engine.trigger("missing").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_with_payload() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let job = job_fn(move |ctx| {
            let sink = sink.clone();
            async move {
                assert_eq!(ctx.trigger, Trigger::Manual);
                *sink.lock() = Some(ctx.payload);
                Ok(())
            }
        });
        let engine = engine_with(SchedulerConfig::default(), vec![(JobDefinition::new("p"), job)], None);

        engine
            .trigger_with("p", serde_json::json!({"period": "2024-03"}))
            .await
            .unwrap();
        assert_eq!(seen.lock().as_ref().unwrap()["period"], "2024-03");
    }

    #[tokio::test]
    async fn test_queue_bound_job_is_dispatched_not_run() {
        let count = Arc::new(AtomicU32::new(0));
        let queue = Arc::new(MemoryQueue::default());
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(
                JobDefinition::new("timesheet-tick")
                    .queue("timesheets")
                    .queue_job_name("recalculate"),
                counting_job(&count),
            )],
            Some(queue.clone()),
        );

        let outcome = engine.trigger("timesheet-tick").await.unwrap();
        match outcome {
            TriggerOutcome::Dispatched { report, receipt } => {
                assert_eq!(report.outcome, RunOutcome::Succeeded);
                assert!(matches!(receipt, Some(EnqueueReceipt::Enqueued { .. })));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
        let delivery = queue.receive("timesheets").await.unwrap().unwrap();
        assert_eq!(delivery.message.job_name, "recalculate");
    }

    #[tokio::test]
    async fn test_queueing_disabled_runs_locally() {
        let count = Arc::new(AtomicU32::new(0));
        let queue = Arc::new(MemoryQueue::default());
        let config = SchedulerConfig {
            enable_queueing: false,
            ..Default::default()
        };
        let engine = engine_with(
            config,
            vec![(JobDefinition::new("recalc").queued(), counting_job(&count))],
            Some(queue.clone()),
        );

        let outcome = engine.trigger("recalc").await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Ran(_)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending_len("default"), 0);
    }

    #[tokio::test]
    async fn test_queueing_disabled_skip_policy() {
        let count = Arc::new(AtomicU32::new(0));
        let config = SchedulerConfig {
            enable_queueing: false,
            queueing_disabled: QueueingDisabledPolicy::Skip,
            ..Default::default()
        };
        let engine = engine_with(
            config,
            vec![(JobDefinition::new("recalc").queued(), counting_job(&count))],
            None,
        );

        let outcome = engine.trigger("recalc").await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::NotRun { .. }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_failure_retried_without_guard() {
        let queue = Arc::new(FlakyQueue::new(1));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(
                JobDefinition::new("recalc").queued().retries(2).retry_delay_ms(1000),
                job_fn(|_ctx| async { Ok(()) }),
            )],
            Some(queue.clone()),
        );

        let outcome = engine.trigger("recalc").await.unwrap();
        match outcome {
            TriggerOutcome::Dispatched { report, receipt } => {
                assert_eq!(report.outcome, RunOutcome::Succeeded);
                assert_eq!(report.attempt_count(), 2);
                assert!(receipt.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(queue.calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.inner.pending_len("default"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_exhausted() {
        let queue = Arc::new(FlakyQueue::new(10));
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(
                JobDefinition::new("recalc").queued().retries(1).retry_delay_ms(100),
                job_fn(|_ctx| async { Ok(()) }),
            )],
            Some(queue.clone()),
        );

        let outcome = engine.trigger("recalc").await.unwrap();
        match outcome {
            TriggerOutcome::Dispatched { report, receipt } => {
                assert_eq!(report.outcome, RunOutcome::Failed);
                assert!(receipt.is_none());
                assert!(report.last_error().unwrap().contains("broker unavailable"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(queue.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight() {
        let done = Arc::new(AtomicU32::new(0));
        let counter = done.clone();
        let job = job_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(JobDefinition::new("long").run_on_start(true), job)],
            None,
        );

        engine.start();
        assert!(engine.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_elapses() {
        let job = job_fn(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let engine = engine_with(
            SchedulerConfig::default(),
            vec![(JobDefinition::new("stuck").run_on_start(true), job)],
            None,
        );

        engine.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!engine.shutdown(Duration::from_millis(100)).await);
        assert_eq!(engine.in_flight(), 1);
    }
