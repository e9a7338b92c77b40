use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;

use diaghub::{
    CancellationToken, Diagnostic, DiagnosticQuery, DiagnosticService, DiagnosticServiceConfig,
    Producer, ProducerId, UpdateEvent, WorkspaceId,
};

const WAIT: Duration = Duration::from_secs(5);

fn quiet_service() -> DiagnosticService {
    // Blocking subscribers below are intentional.
    DiagnosticService::new(DiagnosticServiceConfig {
        slow_subscriber_threshold_ms: 0,
        ..DiagnosticServiceConfig::default()
    })
    .unwrap()
}

#[test]
fn notifications_follow_submission_order_across_producers() {
    let svc = quiet_service();
    let a = Producer::push("a");
    let b = Producer::push("b");
    svc.register_producer(a.clone()).unwrap();
    svc.register_producer(b.clone()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    svc.subscribe(move |producer, events| {
        for e in events {
            sink.lock().unwrap().push((producer.name().to_string(), e.id.to_string()));
        }
    });

    let w = WorkspaceId::new();
    let mut expected = Vec::new();
    for i in 0..100u64 {
        let producer = if i % 3 == 0 { &b } else { &a };
        svc.report_update(producer.id(), vec![UpdateEvent::new(w, i, vec![Diagnostic::error("x")])])
            .unwrap();
        expected.push((producer.name().to_string(), i.to_string()));
    }
    svc.flush_timeout(WAIT).unwrap();

    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn concurrent_producers_keep_their_own_order() {
    let svc = Arc::new(quiet_service());
    let producers: Vec<Producer> = (0..4)
        .map(|i| Producer::push(format!("producer-{i}")))
        .collect();
    for p in &producers {
        svc.register_producer(p.clone()).unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::<(ProducerId, u64)>::new()));
    let sink = Arc::clone(&seen);
    svc.subscribe(move |producer, events| {
        let mut log = sink.lock().unwrap();
        for e in events {
            log.push((producer.id(), e.diagnostics[0].message.parse().unwrap()));
        }
    });

    let w = WorkspaceId::new();
    let workers: Vec<_> = producers
        .iter()
        .map(|p| {
            let svc = Arc::clone(&svc);
            let id = p.id();
            thread::spawn(move || {
                for seq in 0..50u64 {
                    // Same batch id every time: last write wins.
                    let diag = Diagnostic::error(seq.to_string());
                    svc.report_update(id, vec![UpdateEvent::new(w, "live", vec![diag])])
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    svc.flush_timeout(WAIT).unwrap();

    let log = seen.lock().unwrap();
    assert_eq!(log.len(), 200);
    for p in &producers {
        let seqs: Vec<u64> = log.iter().filter(|(id, _)| *id == p.id()).map(|(_, s)| *s).collect();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
    }

    // One record per producer, holding its final report.
    let cancel = CancellationToken::new();
    let current = svc.get_diagnostics(&DiagnosticQuery::new(w), &cancel).unwrap();
    assert_eq!(current.len(), 4);
    assert!(current.iter().all(|d| d.message == "49"));
}

#[test]
fn reporting_does_not_wait_for_subscribers() {
    let svc = quiet_service();
    let p = Producer::push("compiler");
    svc.register_producer(p.clone()).unwrap();

    let (release_tx, release_rx) = bounded::<()>(0);
    let (entered_tx, entered_rx) = bounded::<()>(1);
    svc.subscribe(move |_, _| {
        let _ = entered_tx.try_send(());
        let _ = release_rx.recv_timeout(WAIT);
    });

    let w = WorkspaceId::new();
    let first = svc
        .report_update(p.id(), vec![UpdateEvent::new(w, "a", vec![Diagnostic::error("x")])])
        .unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    // The worker is stuck inside the subscriber; submissions still return.
    let second = svc
        .report_update(p.id(), vec![UpdateEvent::new(w, "b", vec![Diagnostic::error("y")])])
        .unwrap();
    assert!(svc.flush_timeout(Duration::from_millis(20)).unwrap_err().is_retryable());

    release_tx.send(()).unwrap();
    assert_eq!(first.wait_timeout(WAIT).unwrap().changed, 1);
    release_tx.send(()).unwrap();
    assert_eq!(second.wait_timeout(WAIT).unwrap().changed, 1);
    svc.flush_timeout(WAIT).unwrap();
}

#[test]
fn queries_see_reports_only_after_they_are_applied() {
    let svc = quiet_service();
    let p = Producer::push("compiler");
    svc.register_producer(p.clone()).unwrap();
    let w = WorkspaceId::new();
    let cancel = CancellationToken::new();

    for i in 0..20u64 {
        svc.report_update(p.id(), vec![UpdateEvent::new(w, i, vec![Diagnostic::error("x")])])
            .unwrap();
    }
    svc.report_clear(p.id()).unwrap();
    let last = svc
        .report_update(p.id(), vec![UpdateEvent::new(w, "final", vec![Diagnostic::error("kept")])])
        .unwrap();
    last.wait_timeout(WAIT).unwrap();

    // The clear ran between the two groups of reports.
    let current = svc.get_diagnostics(&DiagnosticQuery::new(w), &cancel).unwrap();
    assert_eq!(current, vec![Diagnostic::error("kept")]);
    assert_eq!(svc.stats().records, 1);
}

#[test]
fn dropping_the_service_drains_queued_jobs() {
    let svc = quiet_service();
    let p = Producer::push("compiler");
    svc.register_producer(p.clone()).unwrap();

    let delivered = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&delivered);
    svc.subscribe(move |_, events| *sink.lock().unwrap() += events.len());

    let w = WorkspaceId::new();
    for i in 0..25u64 {
        svc.report_update(p.id(), vec![UpdateEvent::new(w, i, vec![Diagnostic::error("x")])])
            .unwrap();
    }
    drop(svc);

    assert_eq!(*delivered.lock().unwrap(), 25);
}
