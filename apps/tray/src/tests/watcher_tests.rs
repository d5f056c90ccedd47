use std::sync::atomic::Ordering;

use shared::protocol::Notify;
use tokio::time::{sleep, timeout};

use super::*;
use crate::{
    cancel::CancelSignal,
    test_support::{state_step, Call, FakeClient, Step},
};

fn spawn_watcher(
    client: &Arc<FakeClient>,
    signal: &CancelSignal,
    capacity: usize,
) -> (
    tokio::task::JoinHandle<Result<()>>,
    mpsc::Receiver<ConnectionState>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let watcher = StreamWatcher::new(client.clone(), tx, signal.token());
    (tokio::spawn(watcher.run()), rx)
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_delay_and_keeps_order() {
    let client = Arc::new(FakeClient::default());
    client.push_session(vec![
        state_step(ConnectionState::Starting),
        Step::Notify(Notify {
            state: None,
            err_message: Some("key expired soon".into()),
        }),
        Step::Fail("stream reset by peer"),
    ]);
    client.push_session(vec![
        state_step(ConnectionState::Running),
        state_step(ConnectionState::Stopped),
    ]);
    let signal = CancelSignal::new();
    let (handle, mut rx) = spawn_watcher(&client, &signal, 1);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(rx.recv().await.expect("state"));
    }
    assert_eq!(
        seen,
        vec![
            ConnectionState::Starting,
            ConnectionState::Running,
            ConnectionState::Stopped,
        ]
    );

    {
        let daemon = client.daemon();
        assert_eq!(daemon.watch_opened_at.len(), 2);
        let gap = daemon.watch_opened_at[1] - daemon.watch_opened_at[0];
        assert!(gap >= RECONNECT_DELAY, "reconnected after {gap:?}");
    }
    assert_eq!(client.closed.load(Ordering::SeqCst), 1);
    assert!(client.calls().iter().all(|call| *call == Call::Watch(WATCH_OPTIONS)));
    assert_eq!(WATCH_OPTIONS.mask(), 0b1_0010);

    // Nothing else arrives; the second session is idle.
    assert!(timeout(Duration::from_secs(30), rx.recv()).await.is_err());

    signal.cancel();
    let err = handle.await.expect("join").expect_err("cancellation is fatal");
    assert!(is_cancellation(&err));
}

#[tokio::test(start_paused = true)]
async fn reconnect_skips_replayed_state_already_delivered() {
    let client = Arc::new(FakeClient::default());
    client.push_session(vec![
        state_step(ConnectionState::Running),
        Step::Fail("stream reset by peer"),
    ]);
    client.push_session(vec![
        state_step(ConnectionState::Running),
        state_step(ConnectionState::Stopped),
        state_step(ConnectionState::Running),
    ]);
    let signal = CancelSignal::new();
    let (handle, mut rx) = spawn_watcher(&client, &signal, 1);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(rx.recv().await.expect("state"));
    }
    assert_eq!(
        seen,
        vec![
            ConnectionState::Running,
            ConnectionState::Stopped,
            ConnectionState::Running,
        ]
    );
    assert_eq!(client.daemon().watch_opened_at.len(), 2);
    assert!(timeout(Duration::from_secs(30), rx.recv()).await.is_err());

    signal.cancel();
    let err = handle.await.expect("join").expect_err("cancelled");
    assert!(is_cancellation(&err));
}

#[tokio::test(start_paused = true)]
async fn retries_forever_at_fixed_delay() {
    let client = Arc::new(FakeClient::default());
    client.daemon().fail_watch = true;
    let signal = CancelSignal::new();
    let (handle, _rx) = spawn_watcher(&client, &signal, 1);

    sleep(Duration::from_secs(7)).await;

    let opened = client.daemon().watch_opened_at.clone();
    assert_eq!(opened.len(), 3);
    for pair in opened.windows(2) {
        assert_eq!(pair[1] - pair[0], RECONNECT_DELAY);
    }

    signal.cancel();
    let err = handle.await.expect("join").expect_err("cancelled");
    assert!(is_cancellation(&err));
    assert_eq!(client.daemon().watch_opened_at.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn push_waits_for_consumer() {
    let client = Arc::new(FakeClient::default());
    client.push_session(vec![
        state_step(ConnectionState::Starting),
        state_step(ConnectionState::Running),
        state_step(ConnectionState::Stopped),
    ]);
    let signal = CancelSignal::new();
    let (handle, mut rx) = spawn_watcher(&client, &signal, 1);

    sleep(Duration::from_millis(10)).await;
    // One state buffered, the next one read and waiting to be pushed.
    assert_eq!(client.next_calls.load(Ordering::SeqCst), 2);

    assert_eq!(rx.recv().await, Some(ConnectionState::Starting));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(client.next_calls.load(Ordering::SeqCst), 3);

    assert_eq!(rx.recv().await, Some(ConnectionState::Running));
    assert_eq!(rx.recv().await, Some(ConnectionState::Stopped));

    signal.cancel();
    assert!(handle.await.expect("join").is_err());
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_blocked_on_push_is_fatal() {
    let client = Arc::new(FakeClient::default());
    client.push_session(vec![
        state_step(ConnectionState::Running),
        state_step(ConnectionState::Stopped),
    ]);
    let signal = CancelSignal::new();
    let (handle, _rx) = spawn_watcher(&client, &signal, 1);

    sleep(Duration::from_millis(10)).await;
    signal.cancel();

    let err = timeout(Duration::from_secs(1), handle)
        .await
        .expect("watcher stops promptly")
        .expect("join")
        .expect_err("fatal");
    assert!(is_cancellation(&err));
    assert_eq!(client.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exits_cleanly_once_consumer_is_gone() {
    let client = Arc::new(FakeClient::default());
    client.push_session(vec![state_step(ConnectionState::Running)]);
    let signal = CancelSignal::new();
    let (handle, rx) = spawn_watcher(&client, &signal, 1);
    drop(rx);

    handle
        .await
        .expect("join")
        .expect("consumer gone is not an error");
    assert_eq!(client.closed.load(Ordering::SeqCst), 1);
}
