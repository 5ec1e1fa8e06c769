use std::sync::Arc;
use std::time::Duration;

use ruleguard_core::AnalysisConfig;
use ruleguard_invoker::Backend;

use crate::testing::{sleep_ms, test_config, Harness, Script, ScriptedBackend};

fn replying(latency_ms: u64) -> Arc<ScriptedBackend> {
    ScriptedBackend::replying(Duration::from_millis(latency_ms))
}

// ── Merging ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn both_tiers_are_merged() {
    let h = Harness::new(test_config(), replying(100));
    h.open("a.rs", "// TODO\nfn main() {}\n");

    sleep_ms(3_000).await;

    let mut ids = h.sink.rule_ids("a.rs");
    ids.sort();
    assert_eq!(ids, vec!["ai.review", "no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn fast_rerun_keeps_expensive_findings() {
    let h = Harness::new(test_config(), replying(100));
    h.open("a.rs", "// TODO\n");
    sleep_ms(3_000).await;

    h.edit("a.rs", "// TODO\n// TODO\n");
    sleep_ms(600).await;

    let mut ids = h.sink.rule_ids("a.rs");
    ids.sort();
    assert_eq!(ids, vec!["ai.review", "no-todo", "no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn prompt_carries_catalog_and_numbered_text() {
    let h = Harness::new(test_config(), replying(100));
    h.open("src/a.rs", "first\nsecond\n");
    sleep_ms(3_000).await;

    let prompt = &h.backend.prompts()[0];
    assert!(prompt.contains("- no-todo: TODO markers"));
    assert!(prompt.contains("File: src/a.rs"));
    assert!(prompt.contains("    2 | second"));
}

// ── Queue discipline ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn expensive_invocations_never_overlap() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 100,
        ..test_config()
    };
    let h = Harness::new(config, replying(1_000));
    for key in ["a", "b", "c", "d", "e"] {
        h.open(key, key);
    }

    sleep_ms(10_000).await;

    assert_eq!(h.backend.calls(), 5);
    assert_eq!(h.backend.peak_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_defers_until_window_reset() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 2,
        ..test_config()
    };
    let h = Harness::new(config, replying(100));
    for key in ["a", "b", "c"] {
        h.open(key, key);
    }

    sleep_ms(3_000).await;
    assert_eq!(h.backend.calls(), 2);
    let stats = h.analyzer.stats();
    assert_eq!(stats.queue.depth, 1);
    assert!(stats.queue.rate_limited >= 1);
    assert_eq!(stats.window_used, 2);

    sleep_ms(60_000).await;
    assert_eq!(h.backend.calls(), 3);
    assert_eq!(h.sink.rule_ids("c"), vec!["ai.review"]);
}

#[tokio::test(start_paused = true)]
async fn closing_removes_queued_job() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 1,
        ..test_config()
    };
    let h = Harness::new(config, replying(100));
    h.open("a", "a");
    h.open("b", "b");
    sleep_ms(3_000).await;
    assert_eq!(h.analyzer.stats().queue.depth, 1);

    h.close("b");
    sleep_ms(70_000).await;

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.analyzer.stats().queue.depth, 0);
}

#[tokio::test(start_paused = true)]
async fn running_job_survives_close_but_is_not_published() {
    let h = Harness::new(test_config(), replying(10_000));
    h.open("a.rs", "// TODO");
    sleep_ms(3_000).await;
    assert_eq!(h.backend.calls(), 1);

    h.close("a.rs");
    sleep_ms(20_000).await;

    assert_eq!(h.analyzer.stats().queue.completed, 1);
    assert_eq!(h.sink.latest("a.rs"), None);
    assert!(h.analyzer.findings("a.rs").is_empty());
}

#[tokio::test(start_paused = true)]
async fn edit_during_running_job_is_analyzed_after_it() {
    let h = Harness::new(test_config(), replying(60_000));
    h.open("a.rs", "v1");
    sleep_ms(3_000).await;
    assert_eq!(h.backend.calls(), 1);

    // The v2 timer fires while the v1 invocation is still running.
    h.edit("a.rs", "v2");
    sleep_ms(31_000).await;
    // Same text again inside the cooldown.
    h.edit("a.rs", "v2");

    // v1 finished at 62s but no longer matches the resource.
    sleep_ms(29_000).await;
    assert!(h.sink.rule_ids("a.rs").is_empty());

    sleep_ms(300_000).await;
    assert_eq!(h.backend.calls(), 2);
    let prompts = h.backend.prompts();
    assert!(prompts[0].contains("v1"));
    assert!(prompts[1].contains("v2"));
    assert_eq!(h.sink.rule_ids("a.rs"), vec!["ai.review"]);
    assert_eq!(h.analyzer.stats().queue.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn skipped_jobs_do_not_spend_the_budget() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 1,
        ..test_config()
    };
    let h = Harness::new(config.clone(), replying(100));
    h.open("a", "a");
    h.open("b", "b");
    sleep_ms(3_000).await;
    assert_eq!(h.analyzer.stats().queue.depth, 1);

    let disabled = AnalysisConfig {
        ai_enabled: false,
        ..config
    };
    let backend: Arc<dyn Backend> = h.backend.clone();
    h.analyzer.reconfigure(disabled, Some(backend)).unwrap();
    sleep_ms(100).await;

    // "b" is settled inside the same window without taking a slot.
    let stats = h.analyzer.stats();
    assert_eq!(stats.queue.depth, 0);
    assert_eq!(stats.queue.completed, 2);
    assert_eq!(stats.window_used, 1);
    assert_eq!(h.backend.calls(), 1);
}

// ── Failures ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn timeout_is_not_cached_and_retries_after_cooldown() {
    let config = AnalysisConfig {
        ai_timeout_ms: 5_000,
        ..test_config()
    };
    let h = Harness::new(config, ScriptedBackend::new(Script::Hang, Duration::ZERO));
    h.open("a.rs", "// TODO");

    sleep_ms(8_000).await;
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.backend.timeouts(), 1);
    assert_eq!(h.analyzer.stats().queue.failed, 1);
    // Fast findings still shown.
    assert_eq!(h.sink.rule_ids("a.rs"), vec!["no-todo"]);

    // Unchanged text inside the cooldown: no retry.
    h.edit("a.rs", "// TODO");
    sleep_ms(31_000).await;
    assert_eq!(h.backend.calls(), 1);

    // Past the cooldown the failure was not cached, so it runs again.
    h.backend.set_script(Script::Reply("[]".into()));
    h.edit("a.rs", "// TODO");
    sleep_ms(31_000).await;
    assert_eq!(h.backend.calls(), 2);
    assert_eq!(h.analyzer.stats().queue.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_reply_is_a_failure() {
    let h = Harness::new(
        test_config(),
        ScriptedBackend::new(Script::Reply("Sorry, I cannot help.".into()), Duration::ZERO),
    );
    h.open("a.rs", "// TODO");
    sleep_ms(3_000).await;

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.analyzer.stats().queue.failed, 1);
    assert_eq!(h.sink.rule_ids("a.rs"), vec!["no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn failing_backend_does_not_stall_other_resources() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 100,
        ..test_config()
    };
    let h = Harness::new(config, ScriptedBackend::new(Script::Fail, Duration::ZERO));
    for key in ["a", "b", "c"] {
        h.open(key, key);
    }
    sleep_ms(3_000).await;

    assert_eq!(h.backend.calls(), 3);
    assert_eq!(h.analyzer.stats().queue.failed, 3);
}

#[tokio::test(start_paused = true)]
async fn slow_expensive_tier_never_delays_fast_tier() {
    let h = Harness::new(test_config(), replying(100_000));
    h.open("a.rs", "x");
    sleep_ms(3_000).await;
    assert!(h.analyzer.stats().queue.running.is_some());

    h.open("b.rs", "// TODO");
    sleep_ms(600).await;

    assert_eq!(h.sink.rule_ids("b.rs"), vec!["no-todo"]);
}

// ── Guards ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disabled_expensive_tier_only_runs_fast() {
    let config = AnalysisConfig {
        ai_enabled: false,
        ..test_config()
    };
    let h = Harness::new(config, replying(100));
    h.open("a.rs", "// TODO");
    sleep_ms(40_000).await;

    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.sink.rule_ids("a.rs"), vec!["no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn oversized_resource_skips_expensive_tier() {
    let config = AnalysisConfig {
        max_file_size_for_ai_kb: 1,
        ..test_config()
    };
    let h = Harness::new(config, replying(100));
    h.open("big.rs", &"// TODO\n".repeat(300));
    sleep_ms(3_000).await;

    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.sink.rule_ids("big.rs").len(), 300);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let config = AnalysisConfig {
        max_ai_requests_per_minute: 0,
        ..test_config()
    };
    let h = Harness::new(test_config(), replying(100));
    assert!(h.analyzer.reconfigure(config, None).is_err());
}

// ── Reconfigure and shutdown ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconfigure_clears_cache_and_applies_settings() {
    let h = Harness::new(test_config(), replying(100));
    h.open("a.rs", "x");
    sleep_ms(3_000).await;
    assert_eq!(h.backend.calls(), 1);

    let config = AnalysisConfig {
        ai_cooldown_ms: 1_000,
        ..test_config()
    };
    let backend: Arc<dyn Backend> = h.backend.clone();
    h.analyzer.reconfigure(config, Some(backend)).unwrap();
    assert_eq!(h.analyzer.stats().cache_entries, 0);

    h.edit("a.rs", "x");
    sleep_ms(31_000).await;

    // Same text, but the cache was cleared and the cooldown has passed.
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn removing_backend_degrades_to_fast_tier() {
    let h = Harness::new(test_config(), replying(100));
    h.analyzer.reconfigure(test_config(), None).unwrap();
    h.open("a.rs", "// TODO");
    sleep_ms(3_000).await;

    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.analyzer.stats().queue.failed, 1);
    assert_eq!(h.analyzer.stats().backend, None);
    assert_eq!(h.sink.rule_ids("a.rs"), vec!["no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_timers_and_running_invocation() {
    let h = Harness::new(test_config(), replying(100_000));
    h.open("a.rs", "x");
    h.open("b.rs", "y");
    sleep_ms(3_000).await;
    assert_eq!(h.backend.calls(), 1);

    h.analyzer.shutdown();
    sleep_ms(1_000).await;

    let stats = h.analyzer.stats();
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.pending_timers, 0);
    assert_eq!(stats.queue.depth, 0);
    assert_eq!(stats.queue.failed, 1);
    assert!(stats.queue.running.is_none());

    h.open("c.rs", "z");
    sleep_ms(60_000).await;
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn wait_idle_returns_after_all_work() {
    let config = AnalysisConfig {
        static_debounce_ms: 0,
        ai_delay_on_open_ms: 0,
        ..test_config()
    };
    let h = Harness::new(config, replying(500));
    h.open("a.rs", "// TODO");
    h.open("b.rs", "ok");

    h.analyzer.wait_idle().await;

    assert_eq!(h.backend.calls(), 2);
    let mut ids = h.sink.rule_ids("a.rs");
    ids.sort();
    assert_eq!(ids, vec!["ai.review", "no-todo"]);
}

#[tokio::test(start_paused = true)]
async fn stats_render_as_one_line() {
    let h = Harness::new(test_config(), replying(100));
    h.open("a.rs", "x");
    let line = h.analyzer.stats().to_string();

    assert!(line.contains("sessions=1"));
    assert!(line.contains("timers=2"));
    assert!(line.contains("backend=scripted"));
}

// ── Backend selection ───────────────────────────────────────────

#[test]
fn build_backend_follows_config() {
    use ruleguard_core::BackendKind;

    let disabled = AnalysisConfig {
        ai_enabled: false,
        ..AnalysisConfig::default()
    };
    assert!(super::build_backend(&disabled).is_none());

    let mut external = AnalysisConfig::default();
    external.ai.backend = BackendKind::ExternalProcess;
    external.ai.external_tool = "claude".to_string();
    let backend = super::build_backend(&external).expect("external backend");
    assert_eq!(backend.name(), "claude");

    let mut in_process = AnalysisConfig::default();
    in_process.ai.backend = BackendKind::InProcess;
    in_process.ai.api_key = None;
    assert!(super::build_backend(&in_process).is_none());
}
