//! End-to-end shutdown scenarios.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::manager::{Lifecycle, Manager};
    use crate::notifier::NotifierStatus;
    use crate::watcher::{MockWatcher, Trigger};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::Instant;
    use tokio_test::{assert_pending, assert_ready, task};

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn exit_counter(manager: &Manager) -> Arc<AtomicUsize> {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        manager
            .register_exit_action(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        exits
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_acknowledgements_exit_before_timeout() {
        for participants in [0_u64, 1, 5] {
            let manager = Manager::new(TIMEOUT);
            let acks = Arc::new(AtomicUsize::new(0));
            let acks_at_exit = Arc::new(AtomicUsize::new(usize::MAX));

            {
                let acks = acks.clone();
                let acks_at_exit = acks_at_exit.clone();
                manager
                    .register_exit_action(move || {
                        acks_at_exit.store(acks.load(Ordering::SeqCst), Ordering::SeqCst);
                    })
                    .unwrap();
            }

            for index in 0..participants {
                let listener = manager.notifier(format!("worker-{index}")).unwrap();
                let acks = acks.clone();
                tokio::spawn(listener.cleanup_on_shutdown(move |_| async move {
                    tokio::time::sleep(Duration::from_millis(100 * (index + 1))).await;
                    acks.fetch_add(1, Ordering::SeqCst);
                }));
            }

            manager.start().unwrap();
            let started = Instant::now();
            let report = manager.shutdown().await;

            let expected = usize::try_from(participants).unwrap();
            assert!(report.all_acknowledged());
            assert!(!report.deadline_exceeded);
            assert_eq!(report.outcomes.len(), expected);
            assert_eq!(acks_at_exit.load(Ordering::SeqCst), expected);
            assert!(started.elapsed() >= Duration::from_millis(100 * participants));
            assert!(started.elapsed() < TIMEOUT);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_ack_exits_well_before_timeout() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let mut listener = manager.notifier("foo").unwrap();
        manager.start().unwrap();

        tokio::spawn(async move {
            if let Some(notice) = listener.recv().await {
                notice.acknowledge();
            }
        });

        let started = Instant::now();
        let report = manager.shutdown().await;

        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(report.acknowledged(), vec!["foo"]);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_notifier_exits_at_timeout() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let _silent = manager.notifier("silent").unwrap();
        let prompt = manager.notifier("prompt").unwrap();
        tokio::spawn(prompt.cleanup_on_shutdown(|_| async {}));
        manager.start().unwrap();

        let started = Instant::now();
        let report = manager.shutdown().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT + Duration::from_millis(10));
        assert!(report.deadline_exceeded);
        assert_eq!(report.timed_out(), vec!["silent"]);
        assert_eq!(report.acknowledged(), vec!["prompt"]);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_notifier_does_not_extend_timeout_per_participant() {
        let manager = Manager::new(TIMEOUT);
        let _exits = exit_counter(&manager);
        let _listeners: Vec<_> = (0..10)
            .map(|index| manager.notifier(format!("silent-{index}")).unwrap())
            .collect();

        let started = Instant::now();
        let report = manager.shutdown().await;

        assert!(started.elapsed() < TIMEOUT + Duration::from_millis(10));
        assert_eq!(report.timed_out().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_watchers_never_shut_down_alone() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        manager.start().unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        assert_eq!(manager.lifecycle(), Lifecycle::Started);

        manager.shutdown().await;
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.lifecycle(), Lifecycle::Exited);
    }

    #[tokio::test]
    async fn test_channel_watcher_triggers_shutdown() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let (tx, rx) = mpsc::channel(1);
        manager.watch_channel(rx).unwrap();

        let listener = manager.notifier("cache").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        {
            let seen = seen.clone();
            tokio::spawn(listener.cleanup_on_shutdown(move |trigger| async move {
                *seen.lock() = Some(trigger);
            }));
        }

        manager.start().unwrap();
        tx.send("terminate").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), manager.wait())
            .await
            .expect("channel event should shut the manager down");

        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), Some(Trigger::Channel));
        assert_eq!(manager.shutdown().await.trigger, Trigger::Channel);
    }

    #[tokio::test]
    async fn test_cancellation_watcher_passes_reason_to_participants() {
        let manager = Manager::new(TIMEOUT);
        let _exits = exit_counter(&manager);
        let token = CancellationToken::shared();
        manager.watch_context(token.clone()).unwrap();
        let mut listener = manager.notifier("db").unwrap();
        manager.start().unwrap();

        token.cancel("rolling deploy");

        let notice = tokio::time::timeout(Duration::from_secs(5), listener.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            notice.trigger(),
            &Trigger::Cancelled { reason: "rolling deploy".to_string() }
        );
        notice.acknowledge();

        manager.wait().await;
        let report = manager.shutdown().await;
        assert_eq!(report.outcomes[0].status, NotifierStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_exit_once() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let token = CancellationToken::shared();
        let (tx, rx) = mpsc::channel(1);
        manager.watch_context(token.clone()).unwrap();
        manager.watch_channel(rx).unwrap();
        let listener = manager.notifier("worker").unwrap();
        tokio::spawn(listener.cleanup_on_shutdown(|_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }));
        manager.start().unwrap();
        tokio::task::yield_now().await;

        let direct = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.shutdown().await })
        };
        token.cancel("stop");
        tx.send(()).await.unwrap();

        let report = direct.await.unwrap();
        manager.wait().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.shutdown().await.session_id, report.session_id);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_calls_join_one_session() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let listener = manager.notifier("slow").unwrap();
        tokio::spawn(listener.cleanup_on_shutdown(|_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }));

        let (first, second) = tokio::join!(manager.shutdown(), manager.shutdown());

        assert_eq!(first, second);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_resolves_after_exit_action() {
        let manager = Manager::new(TIMEOUT);
        let _exits = exit_counter(&manager);

        let mut wait = task::spawn(manager.wait());
        assert_pending!(wait.poll());

        manager.shutdown().await;

        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_panicking_exit_action_still_completes_once() {
        let manager = Manager::new(TIMEOUT);
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            manager
                .register_exit_action(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    panic!("exit action failed");
                })
                .unwrap();
        }

        manager.shutdown().await;
        manager.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.lifecycle(), Lifecycle::Exited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_future_keeps_exit_action() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let _silent = manager.notifier("silent").unwrap();

        let started = Instant::now();
        let abandoned = tokio::time::timeout(Duration::from_secs(1), manager.shutdown()).await;
        assert!(abandoned.is_err());
        assert_eq!(manager.lifecycle(), Lifecycle::ShuttingDown);
        assert_eq!(exits.load(Ordering::SeqCst), 0);

        // The session keeps running without anyone awaiting it.
        manager.wait().await;
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= TIMEOUT);

        let report = manager.shutdown().await;
        assert_eq!(report.timed_out(), vec!["silent"]);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoining_after_dropped_shutdown_runs_custom_action_once() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let _silent = manager.notifier("silent").unwrap();

        let mut first = task::spawn(manager.shutdown());
        assert_pending!(first.poll());
        drop(first);

        let started = Instant::now();
        let report = manager.shutdown().await;

        assert!(started.elapsed() <= TIMEOUT);
        assert!(report.deadline_exceeded);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.lifecycle(), Lifecycle::Exited);
    }

    #[tokio::test]
    async fn test_custom_watcher_is_watched_once() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);
        let (fire_tx, fire_rx) = oneshot::channel();
        let fire_rx = parking_lot::Mutex::new(Some(fire_rx));

        let mut watcher = MockWatcher::new();
        watcher
            .expect_watch()
            .times(1)
            .returning(move || fire_rx.lock().take().expect("watch called once"));
        manager.register_watcher(watcher).unwrap();
        manager.start().unwrap();

        fire_tx.send(Trigger::Manual).unwrap();
        tokio::time::timeout(Duration::from_secs(5), manager.wait())
            .await
            .expect("custom watcher should trigger shutdown");

        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_torn_down_watcher_does_not_trigger() {
        let manager = Manager::new(TIMEOUT);
        let exits = exit_counter(&manager);

        let mut watcher = MockWatcher::new();
        watcher.expect_watch().times(1).returning(|| {
            let (_tx, rx) = oneshot::channel();
            rx
        });
        manager.register_watcher(watcher).unwrap();
        manager.start().unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        assert_eq!(manager.lifecycle(), Lifecycle::Started);
    }
}
