//! End-to-end test: one client against one live server, running the
//! `dummy` profile bidirectionally (no `-s`/`-r` suffix expands to a
//! send test and a receive test), three samples each with no interval.
//! Exercises the full handshake, `CHECKPROFILE`/`INSTANTIATEPROFILE`/
//! `EXECUTIONFINISHED` control sequence, and the sub-message result
//! exchange between the two peers' executors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nsts::events;
use nsts::value::Value;
use nsts::Client;
use tokio::net::TcpListener;

#[tokio::test]
async fn dummy_bidirectional_produces_six_finished_events_with_bounded_stats() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        nsts::server::serve_connection(stream, false).await
    });

    let finished_count = Arc::new(AtomicUsize::new(0));
    let counter = finished_count.clone();
    events::dispatcher().connect(
        "profile_execution_finished",
        Box::new(move |_n| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let client = Client::connect(&addr.ip().to_string(), addr.port(), false)
        .await
        .unwrap();

    let mut suite = nsts::suite_file::parse_command_line("dummy").unwrap();
    assert_eq!(suite.tests.len(), 2);
    for test in &mut suite.tests {
        test.options
            .set_value("samples", Value::Int(3))
            .unwrap();
        test.options
            .set_value("interval", Value::from(nsts::units::Time::from_base(0.0)))
            .unwrap();
    }

    client.run_suite(&mut suite).await.unwrap();

    assert_eq!(finished_count.load(Ordering::SeqCst), 6);

    for test in &suite.tests {
        assert_eq!(test.samples.len(), 3);
        let stats = test.statistics().unwrap();
        let transfer = stats.get("random_transfer").unwrap();
        let time = stats.get("random_time").unwrap();
        assert_raw_ordered(&transfer.min, &transfer.mean, &transfer.max);
        assert_raw_ordered(&time.min, &time.mean, &time.max);
    }

    // Drop the suite (which holds clones of the connection `Arc` via each
    // sample's executor context) before the client so the socket actually
    // closes and the server's blocked read observes EOF instead of
    // hanging forever.
    drop(suite);
    drop(client);
    let _ = server_task.await;
}

fn raw(u: &nsts::value::UnitValue) -> f64 {
    match u {
        nsts::value::UnitValue::Time(v)
        | nsts::value::UnitValue::BitRate(v)
        | nsts::value::UnitValue::ByteRate(v)
        | nsts::value::UnitValue::Byte(v)
        | nsts::value::UnitValue::Percentage(v)
        | nsts::value::UnitValue::Packet(v) => *v,
    }
}

fn assert_raw_ordered(min: &nsts::value::UnitValue, mean: &nsts::value::UnitValue, max: &nsts::value::UnitValue) {
    assert!(raw(min) <= raw(mean) + 1e-9);
    assert!(raw(mean) <= raw(max) + 1e-9);
}
