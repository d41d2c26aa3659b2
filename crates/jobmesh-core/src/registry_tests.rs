    use super::*;
    use crate::job::{job_fn, JobBinding};

    fn noop() -> Arc<dyn Job> {
        job_fn(|_ctx| async { Ok(()) })
    }

    struct TestProvider {
        jobs: Vec<JobDefinition>,
    }

    impl JobProvider for TestProvider {
        fn name(&self) -> &str {
            "test"
        }

        fn jobs(&self) -> Vec<JobBinding> {
            self.jobs
                .iter()
                .cloned()
                .map(|definition| JobBinding::new(definition, noop()))
                .collect()
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = JobRegistry::new(SchedulerConfig::default());
        assert!(registry.is_empty());
        assert_eq!(registry.all().count(), 0);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = JobRegistry::new(SchedulerConfig::default());
        registry
            .register(JobDefinition::new("heartbeat").cron("*/30 * * * * *"), noop())
            .unwrap();

        let descriptor = registry.lookup("heartbeat").unwrap();
        assert_eq!(descriptor.cron_expression(), Some("*/30 * * * * *"));
        assert!(registry.contains("heartbeat"));
        assert!(registry.get("heartbeat").is_some());
    }

    #[test]
    fn test_lookup_not_found() {
        let registry = JobRegistry::new(SchedulerConfig::default());
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn test_duplicate_leaves_registry_unchanged() {
        let mut registry = JobRegistry::new(SchedulerConfig::default());
        registry
            .register(JobDefinition::new("report").cron("0 0 * * *").retries(1), noop())
            .unwrap();

        let err = registry
            .register(JobDefinition::new("report").cron("0 12 * * *").retries(9), noop())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJobName(_)));
        assert!(err.is_fatal());

        assert_eq!(registry.len(), 1);
        let descriptor = registry.lookup("report").unwrap();
        assert_eq!(descriptor.cron_expression(), Some("0 0 * * *"));
        assert_eq!(descriptor.retries(), 1);
    }

    #[test]
    fn test_invalid_schedule_not_stored() {
        let mut registry = JobRegistry::new(SchedulerConfig::default());
        let err = registry
            .register(JobDefinition::new("bad").cron("61 * * * *"), noop())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_all_is_ordered_and_restartable() {
        let mut registry = JobRegistry::new(SchedulerConfig::default());
        for name in ["zeta", "alpha", "mid"] {
            registry.register(JobDefinition::new(name), noop()).unwrap();
        }

        let names: Vec<&str> = registry.all().map(|d| d.name()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        let again: Vec<&str> = registry.all().map(|d| d.name()).collect();
        assert_eq!(names, again);
    }

    #[test]
    fn test_register_provider() {
        let provider = TestProvider {
            jobs: vec![
                JobDefinition::new("a").cron("0 * * * *"),
                JobDefinition::new("b").run_on_start(true),
            ],
        };
        let mut registry = JobRegistry::new(SchedulerConfig::default());
        let count = registry.register_provider(&provider).unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_overrides_applied_before_validation() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "heartbeat".to_string(),
            JobOverride {
                cron: Some("*/10 * * * * *".to_string()),
                retries: Some(0),
                ..Default::default()
            },
        );

        let mut registry = JobRegistry::new(SchedulerConfig::default()).with_overrides(overrides);
        registry
            .register(JobDefinition::new("heartbeat").cron("*/30 * * * * *"), noop())
            .unwrap();

        let descriptor = registry.lookup("heartbeat").unwrap();
        assert_eq!(descriptor.cron_expression(), Some("*/10 * * * * *"));
        assert_eq!(descriptor.retries(), 0);
    }

    #[test]
    fn test_defaults_come_from_config() {
        let mut config = SchedulerConfig::default();
        config.default_job_options.retries = 5;
        config.default_job_options.prevent_overlap = false;

        let mut registry = JobRegistry::new(config);
        let descriptor = registry
            .register(JobDefinition::new("x"), noop())
            .unwrap();
        assert_eq!(descriptor.retries(), 5);
        assert!(!descriptor.prevent_overlap());
    }
