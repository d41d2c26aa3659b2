    use super::*;
    use jobmesh_core::{job_fn, JobBinding, JobDefinition};
    use jobmesh_workqueue::{handler_fn, MemoryQueue};

    struct Jobs {
        name: &'static str,
        definitions: Vec<JobDefinition>,
    }

    impl JobProvider for Jobs {
        fn name(&self) -> &str {
            self.name
        }

        fn jobs(&self) -> Vec<JobBinding> {
            self.definitions
                .iter()
                .cloned()
                .map(|d| JobBinding::new(d, job_fn(|_ctx| async { Ok(()) })))
                .collect()
        }
    }

    struct Handlers {
        name: &'static str,
        routes: Vec<(&'static str, &'static str)>,
    }

    impl HandlerProvider for Handlers {
        fn name(&self) -> &str {
            self.name
        }

        fn handlers(&self) -> Vec<HandlerBinding> {
            self.routes
                .iter()
                .map(|(queue, job)| HandlerBinding::new(*queue, *job, handler_fn(|_, _| async { Ok(()) })))
                .collect()
        }
    }

    fn jobs(name: &'static str, definitions: Vec<JobDefinition>) -> Arc<dyn JobProvider> {
        Arc::new(Jobs { name, definitions })
    }

    fn handlers(name: &'static str, routes: Vec<(&'static str, &'static str)>) -> Arc<dyn HandlerProvider> {
        Arc::new(Handlers { name, routes })
    }

    #[tokio::test]
    async fn test_build_registers_all_providers() {
        let scheduler = SchedulerModule::for_root(SchedulerConfig::default())
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "heartbeat",
                vec![JobDefinition::new("heartbeat").cron("*/30 * * * * *")],
            )))
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "reports",
                vec![JobDefinition::new("daily-report").cron("0 6 * * *")],
            )))
            .build()
            .await
            .unwrap();

        let names: Vec<_> = scheduler.registry().all().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["daily-report", "heartbeat"]);
        assert!(scheduler.workers().is_empty());
        // No queue-bound jobs and nothing consumed: no broker is opened.
        assert!(scheduler.queue().is_none());
        assert!(scheduler.dispatcher().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_job_across_providers_aborts() {
        let err = SchedulerModule::for_root(SchedulerConfig::default())
            .for_feature(
                FeatureOptions::new()
                    .job_provider(jobs("a", vec![JobDefinition::new("sync")]))
                    .job_provider(jobs("b", vec![JobDefinition::new("sync")])),
            )
            .build()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SchedulerError::DuplicateJobName(ref n) if n == "sync"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_duplicate_handler_aborts() {
        let err = SchedulerModule::for_root(SchedulerConfig::default())
            .with_queue(Arc::new(MemoryQueue::default()))
            .for_feature(
                FeatureOptions::new()
                    .handler_provider(handlers("a", vec![("timesheets", "recalc")]))
                    .handler_provider(handlers("b", vec![("timesheets", "recalc")]))
                    .consume("timesheets"),
            )
            .build()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SchedulerError::DuplicateHandler { .. }));
    }

    #[tokio::test]
    async fn test_consumed_queue_without_handlers_aborts() {
        let err = SchedulerModule::for_root(SchedulerConfig::default())
            .for_feature(
                FeatureOptions::new()
                    .handler_provider(handlers("t", vec![("timesheets", "recalc")]))
                    .consume("billing"),
            )
            .build()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_one_host_per_consumed_queue() {
        let scheduler = SchedulerModule::for_root(SchedulerConfig::default())
            .for_feature(
                FeatureOptions::new()
                    .handler_provider(handlers(
                        "t",
                        vec![
                            ("timesheets", "recalc"),
                            ("timesheets", "close-period"),
                            ("billing", "invoice"),
                        ],
                    ))
                    .consume("timesheets")
                    .consume("billing")
                    .consume("timesheets"),
            )
            .build()
            .await
            .unwrap();

        let hosts: Vec<_> = scheduler
            .workers()
            .iter()
            .map(|w| (w.queue_name().to_string(), w.job_names()))
            .collect();
        assert_eq!(
            hosts,
            vec![
                ("timesheets".to_string(), vec!["close-period".to_string(), "recalc".to_string()]),
                ("billing".to_string(), vec!["invoice".to_string()]),
            ]
        );
        assert!(scheduler.queue().is_some());
    }

    #[tokio::test]
    async fn test_queueing_disabled_has_no_dispatcher() {
        let config = SchedulerConfig {
            enable_queueing: false,
            ..Default::default()
        };
        let scheduler = SchedulerModule::for_root(config)
            .with_queue(Arc::new(MemoryQueue::default()))
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "t",
                vec![JobDefinition::new("recalc").queued()],
            )))
            .build()
            .await
            .unwrap();

        assert!(scheduler.dispatcher().is_none());
    }

    #[tokio::test]
    async fn test_queue_bound_job_opens_dispatcher() {
        let scheduler = SchedulerModule::for_root(SchedulerConfig::default())
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "t",
                vec![JobDefinition::new("recalc").queued()],
            )))
            .build()
            .await
            .unwrap();

        let dispatcher = scheduler.dispatcher().unwrap();
        assert_eq!(dispatcher.default_queue_name(), "default");
        assert_eq!(dispatcher.queue().backend(), "memory");
    }

    #[tokio::test]
    async fn test_overrides_applied_before_registration() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "heartbeat".to_string(),
            JobOverride {
                enabled: Some(false),
                retries: Some(1),
                ..Default::default()
            },
        );

        let scheduler = SchedulerModule::for_root(SchedulerConfig::default())
            .with_overrides(overrides)
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "heartbeat",
                vec![JobDefinition::new("heartbeat").cron("*/30 * * * * *")],
            )))
            .build()
            .await
            .unwrap();

        let descriptor = scheduler.registry().lookup("heartbeat").unwrap();
        assert!(!descriptor.is_enabled());
        assert_eq!(descriptor.retries(), 1);
    }

    #[tokio::test]
    async fn test_invalid_override_schedule_aborts() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "heartbeat".to_string(),
            JobOverride {
                cron: Some("every now and then".to_string()),
                ..Default::default()
            },
        );

        let err = SchedulerModule::for_root(SchedulerConfig::default())
            .with_overrides(overrides)
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "heartbeat",
                vec![JobDefinition::new("heartbeat").cron("*/30 * * * * *")],
            )))
            .build()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
    }

    #[test]
    fn test_feature_select_filters_providers() {
        let feature = FeatureOptions::new()
            .job_provider(jobs("heartbeat", vec![]))
            .job_provider(jobs("timesheets", vec![]))
            .handler_provider(handlers("timesheets", vec![]));

        let selected = feature.clone().select(&FeatureConfig {
            providers: vec!["heartbeat".to_string()],
            queues: Vec::new(),
        });
        assert_eq!(selected.job_providers.len(), 1);
        assert_eq!(selected.job_providers[0].name(), "heartbeat");
        assert!(selected.handler_providers.is_empty());

        let all = feature.select(&FeatureConfig::default());
        assert_eq!(all.job_providers.len(), 2);
        assert_eq!(all.handler_providers.len(), 1);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = jobmesh_config::ConfigLoader::load_str(
            r#"
[scheduler]
default_queue_name = "ops"

[jobs.sync]
retries = 7
"#,
        )
        .unwrap();

        let scheduler = SchedulerModule::from_config(&config)
            .for_feature(FeatureOptions::new().job_provider(jobs(
                "sync",
                vec![JobDefinition::new("sync").queued()],
            )))
            .build()
            .await
            .unwrap();

        assert_eq!(scheduler.registry().lookup("sync").unwrap().retries(), 7);
        assert_eq!(scheduler.dispatcher().unwrap().default_queue_name(), "ops");
    }
