//! End-to-end interactor scenarios against the in-memory document.

#![allow(clippy::unwrap_used)]

use interactor::prelude::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{sleep, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn checkbox(checked: bool) -> Arc<VirtualDom> {
    let markup = if checked {
        r#"<input type="checkbox" id="agree" checked>"#
    } else {
        r#"<input type="checkbox" id="agree">"#
    };
    Arc::new(VirtualDom::parse(markup).unwrap())
}

fn agree(dom: &VirtualDom) -> NodeId {
    dom.select("#agree").unwrap()
}

mod checkbox_scenarios {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_check_unchecked_clicks_once() {
        init_tracing();
        let dom = checkbox(false);
        Interactor::new(dom.clone(), "#agree").check().await.unwrap();

        let node = agree(&dom);
        assert!(dom.snapshot(node).unwrap().checked);
        assert_eq!(dom.event_count(node, "click"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_already_checked_rejects() {
        init_tracing();
        let dom = checkbox(true);
        let started = Instant::now();
        let err = Interactor::new(dom.clone(), "#agree")
            .check()
            .timeout(ms(50))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "#agree is checked");
        assert!(matches!(err, InteractorError::AssertionFailed { .. }));
        let elapsed = started.elapsed();
        assert!(elapsed >= ms(50));
        assert!(elapsed < ms(100));
        assert_eq!(dom.event_count(agree(&dom), "click"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_waits_for_element_to_appear() {
        let dom = Arc::new(VirtualDom::new());
        let chain = Interactor::new(dom.clone(), "#agree").check();
        let writer = dom.clone();
        let task = tokio::spawn(async move {
            sleep(ms(30)).await;
            let root = writer.document();
            writer
                .create_element(root, "input", &[("type", "checkbox"), ("id", "agree")])
                .unwrap();
        });
        chain.await.unwrap();
        task.await.unwrap();
        assert!(dom.snapshot(agree(&dom)).unwrap().checked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_disabled_rejects_and_stays_unchecked() {
        init_tracing();
        let dom = checkbox(false);
        let node = agree(&dom);
        dom.set_disabled(node, true);
        let err = Interactor::new(dom.clone(), "#agree")
            .check()
            .timeout(ms(50))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "#agree is disabled");
        assert!(!dom.snapshot(node).unwrap().checked);
        assert_eq!(dom.event_count(node, "click"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_proceeds_once_enabled() {
        let dom = checkbox(false);
        let node = agree(&dom);
        dom.set_disabled(node, true);
        let writer = dom.clone();
        let task = tokio::spawn(async move {
            sleep(ms(20)).await;
            writer.set_disabled(node, false);
        });
        let stats = Interactor::new(dom.clone(), "#agree").check().await.unwrap();
        task.await.unwrap();

        assert!(dom.snapshot(node).unwrap().checked);
        assert_eq!(dom.event_count(node, "click"), 1);
        assert!(stats.steps[0].attempts > 1);
    }
}

mod poller_scenarios {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_counter_resolves_at_ten() {
        let count = AtomicUsize::new(0);
        let started = Instant::now();
        let mut last_call: Option<Instant> = None;
        let mut min_gap = Duration::MAX;

        let value = when(
            || {
                let now = Instant::now();
                if let Some(previous) = last_call.replace(now) {
                    min_gap = min_gap.min(now - previous);
                }
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if n > 9 {
                    Ok(n)
                } else {
                    Err(InteractorError::assertion(format!("{n} is not greater than 9")))
                }
            },
            PollConfig::new(ms(80)).with_interval(ms(3)),
        )
        .await
        .unwrap();

        assert_eq!(value, 10);
        assert!(min_gap >= ms(3));
        assert!(started.elapsed() <= ms(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_at_first_poll_after_state_change() {
        let dom = checkbox(false);
        let node = agree(&dom);
        let writer = dom.clone();
        let task = tokio::spawn(async move {
            sleep(ms(25)).await;
            writer.set_checked(node, true);
        });
        let stats = Interactor::new(dom.clone(), "#agree")
            .interval(ms(10))
            .assert()
            .that("checked")
            .await
            .unwrap();
        task.await.unwrap();
        assert!(stats.elapsed >= ms(25));
        assert!(stats.elapsed < ms(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stability_window_after_flicker() {
        let dom = checkbox(true);
        let node = agree(&dom);
        let writer = dom.clone();
        let task = tokio::spawn(async move {
            sleep(ms(12)).await;
            writer.set_checked(node, false);
            sleep(ms(10)).await;
            writer.set_checked(node, true);
        });
        let started = Instant::now();
        Interactor::new(dom.clone(), "#agree")
            .interval(ms(5))
            .remains(ms(30))
            .assert()
            .that("checked")
            .await
            .unwrap();
        task.await.unwrap();
        assert!(started.elapsed() >= ms(22) + ms(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_rejects_when_state_flips() {
        let dom = checkbox(true);
        let node = agree(&dom);
        let writer = dom.clone();
        let task = tokio::spawn(async move {
            sleep(ms(25)).await;
            writer.set_checked(node, false);
        });
        let started = Instant::now();
        let err = Interactor::new(dom.clone(), "#agree")
            .interval(ms(10))
            .always(|i| i.assert().evaluate("checked", None, &[]), Some(ms(500)))
            .await
            .unwrap_err();
        task.await.unwrap();
        assert!(err.is_assertion());
        assert!(started.elapsed() >= ms(25));
        assert!(started.elapsed() < ms(40));
    }
}

mod type_scenarios {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_extend_override_replaces_inherited_assertion() {
        let dom = checkbox(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let lenient = TypeDescriptor::base()
            .extend(TypeDefinition::new("LenientCheckbox").property(
                "checked",
                Property::new(|_, _| Ok(json!(true))).with_assert(move |_, _, _| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            ))
            .unwrap();

        lenient
            .create(dom.clone(), "#agree")
            .timeout(ms(20))
            .assert()
            .that("checked")
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = Interactor::new(dom.clone(), "#agree")
            .timeout(ms(20))
            .assert()
            .that("checked")
            .await
            .unwrap_err();
        assert_eq!(err.message(), "expected #agree to be checked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overridden_action_used_by_check() {
        let dom = checkbox(false);
        let clicks = Arc::new(AtomicUsize::new(0));
        let seen = clicks.clone();
        let counting = TypeDescriptor::base()
            .extend(TypeDefinition::new("CountingCheckbox").action("click", move |i, _| {
                let seen = seen.clone();
                i.interact("counted click", move |el| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    el.click()
                })
            }))
            .unwrap();
        counting.create(dom.clone(), "#agree").check().await.unwrap();
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert!(dom.snapshot(agree(&dom)).unwrap().checked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_timeout_loses_to_instance_timeout() {
        let dom = checkbox(false);
        let patient = TypeDescriptor::base()
            .extend(TypeDefinition::new("Patient").timeout(Duration::from_secs(5)))
            .unwrap();
        let started = Instant::now();
        let _ = patient
            .create(dom.clone(), "#agree")
            .timeout(ms(40))
            .assert()
            .that("checked")
            .await
            .unwrap_err();
        assert!(started.elapsed() < ms(100));

        let started = Instant::now();
        let _ = patient
            .create(dom, "#agree")
            .assert()
            .that("checked")
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}

mod scoping_scenarios {
    use super::*;

    fn page() -> Arc<VirtualDom> {
        Arc::new(
            VirtualDom::parse(
                r#"<section id="modal"><button class="ok">OK</button></section>
                   <footer><button class="ok">Other OK</button></footer>"#,
            )
            .unwrap(),
        )
    }

    fn modal_type() -> Arc<TypeDescriptor> {
        TypeDescriptor::base()
            .extend(
                TypeDefinition::new("Modal")
                    .selector("#modal")
                    .child("ok", &TypeDescriptor::base(), ".ok"),
            )
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_parent_never_matches_outside() {
        let dom = page();
        let modal = modal_type().create(dom.clone(), "");
        dom.remove(dom.select("#modal").unwrap());

        let err = modal
            .child("ok")
            .timeout(ms(30))
            .click()
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "did not find #modal");

        let footer_ok = dom.select("footer .ok").unwrap();
        assert_eq!(dom.event_count(footer_ok, "click"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattached_parent_resolves_again() {
        let dom = page();
        let modal_node = dom.select("#modal").unwrap();
        let chain = modal_type().create(dom.clone(), "").child("ok").click();

        dom.remove(modal_node);
        assert!(chain.clone().timeout(ms(20)).await.is_err());

        dom.attach(dom.document(), modal_node).unwrap();
        chain.await.unwrap();
        let ok = dom.select("#modal .ok").unwrap();
        assert_eq!(dom.event_count(ok, "click"), 1);
    }
}

mod composition_scenarios {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_branches_share_base_without_interference() {
        let dom = Arc::new(
            VirtualDom::parse(r#"<input id="name"><input type="checkbox" id="agree">"#).unwrap(),
        );
        let base = Interactor::new(dom.clone(), "#name").fill("Ada");
        let filled = base.assert().equals("value", "Ada");
        let agreed = base.scope_as(&TypeDescriptor::base(), "#agree");

        assert_eq!(base.convergence().queue().len(), 2);
        filled.await.unwrap();

        let name = dom.select("#name").unwrap();
        dom.set_value(name, "");
        let replayed = Interactor::new(dom.clone(), "").append(&base).await;
        assert!(replayed.is_ok());
        assert_eq!(dom.snapshot(name).unwrap().value, "Ada");
        assert_eq!(agreed.describe(), "#agree");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_inside_chain() {
        let dom = checkbox(false);
        let node = agree(&dom);
        let writer = dom.clone();
        let stats = Interactor::new(dom.clone(), "#agree")
            .pause(ms(10))
            .wait(move || {
                let writer = writer.clone();
                vec![Delay::Until(Box::pin(async move {
                    sleep(ms(5)).await;
                    writer.set_checked(node, true);
                }))]
            })
            .assert()
            .that("checked")
            .await
            .unwrap();
        assert!(stats.elapsed >= ms(15));
        assert_eq!(stats.steps[2].attempts, 1);
        let report = serde_json::to_value(&stats).unwrap();
        assert_eq!(report["steps"][0]["kind"], json!("Wait"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defaults_from_environment() {
        let defaults = Defaults::from_lookup(|key| (key == ENV_TIMEOUT_MS).then(|| "25".to_string()))
            .unwrap()
            .to_poll_config();
        let started = Instant::now();
        let err = Interactor::new(checkbox(false), "#agree")
            .with_defaults(defaults)
            .assert()
            .that("checked")
            .await
            .unwrap_err();
        assert!(err.is_assertion());
        assert!(started.elapsed() >= ms(25));
        assert!(started.elapsed() < ms(50));
    }
}

proptest! {
    #[test]
    fn prop_negation_duality(checked in any::<bool>(), disabled in any::<bool>()) {
        let dom = Arc::new(VirtualDom::parse(r#"<input type="checkbox" id="agree">"#).unwrap());
        let node = dom.select("#agree").unwrap();
        dom.set_checked(node, checked);
        dom.set_disabled(node, disabled);
        let subject = Interactor::new(dom, "#agree");

        for property in ["checked", "disabled", "exists"] {
            let plain = subject.assert().evaluate(property, None, &[]).is_ok();
            let negated = subject.assert().not().evaluate(property, None, &[]).is_ok();
            prop_assert!(plain != negated, "{property}: plain={plain} negated={negated}");
        }
    }

    #[test]
    fn prop_push_never_alters_base(extra in 1usize..6) {
        let dom = Arc::new(VirtualDom::new());
        let base = Interactor::new(dom, "#x").pause(Duration::ZERO);
        let mut grown = base.clone();
        for _ in 0..extra {
            grown = grown.pause(Duration::ZERO);
        }
        prop_assert_eq!(base.convergence().queue().len(), 1);
        prop_assert_eq!(grown.convergence().queue().len(), 1 + extra);
    }
}
