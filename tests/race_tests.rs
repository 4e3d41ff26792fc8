use chrono::Utc;
use proptest::prelude::*;
use relaygate::application::engine::CallOptions;
use relaygate::application::registry::WaitError;
use relaygate::domain::callback::{CallbackBody, CallbackDisposition};
use relaygate::domain::ports::CorrelationStore;
use relaygate::domain::transaction::{
    ApiType, TransactionId, TransactionRecord, TransactionStatus,
};
use relaygate::error::GatewayError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

mod common;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn callback(success: bool) -> CallbackBody {
    if success {
        CallbackBody::success(json!({"ok": true}))
    } else {
        CallbackBody::failure("E500", "backend rejected")
    }
}

/// A terminal record carries either a response or an error message, never both.
fn assert_well_formed(record: &TransactionRecord) {
    match record.status {
        TransactionStatus::Completed => {
            assert!(record.response_payload.is_some());
            assert!(record.error_message.is_none());
        }
        TransactionStatus::Error | TransactionStatus::TimedOut => {
            assert!(record.response_payload.is_none());
            assert!(record.error_message.is_some());
        }
        TransactionStatus::Pending => panic!("record left pending"),
    }
    assert!(record.completed_at.is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn callback_near_deadline_resolves_once(offset_us in -1000i64..=1000, success in any::<bool>()) {
        runtime().block_on(async move {
            let window = Duration::from_millis(20);
            let h = common::harness(window);
            let arrival = Duration::from_micros((window.as_micros() as i64 + offset_us) as u64);
            common::spawn_backend(h.engine.clone(), h.outbound, move |_| {
                Some((arrival, callback(success)))
            });

            let id = TransactionId::generate();
            let outcome = h
                .engine
                .call(
                    ApiType::new("incar.search"),
                    vec![],
                    CallOptions::new().transaction_id(id.clone()),
                )
                .await;
            // Let a late callback land so it can be shown to be a no-op.
            tokio::time::sleep(Duration::from_millis(5)).await;

            let record = h.store.get(&id).await.unwrap().unwrap();
            assert_well_formed(&record);
            match outcome {
                Ok(_) => assert_eq!(record.status, TransactionStatus::Completed),
                Err(GatewayError::BackendReported { .. }) => {
                    assert_eq!(record.status, TransactionStatus::Error)
                }
                Err(GatewayError::Timeout(_)) => {
                    assert_eq!(record.status, TransactionStatus::TimedOut)
                }
                Err(other) => panic!("unexpected outcome {other:?}"),
            }
            assert!(h.engine.registry().is_empty());
        });
    }

    #[test]
    fn timeout_and_callback_fired_together_apply_once(success in any::<bool>()) {
        runtime().block_on(async move {
            let h = common::harness(Duration::from_secs(60));
            let id = TransactionId::generate();
            let now = Utc::now();
            h.store
                .create(TransactionRecord::pending(
                    id.clone(),
                    ApiType::new("fee.calculate"),
                    vec![],
                    now,
                    now + chrono::Duration::seconds(60),
                ))
                .await
                .unwrap();
            let handle = h.engine.registry().register(id.clone()).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let timeout = {
                let (engine, id, barrier) = (h.engine.clone(), id.clone(), barrier.clone());
                tokio::spawn(async move {
                    barrier.wait().await;
                    engine.expire(&id).await.unwrap()
                })
            };
            let intake = {
                let (engine, id, barrier) = (h.engine.clone(), id.clone(), barrier.clone());
                tokio::spawn(async move {
                    barrier.wait().await;
                    engine.on_callback(&id, callback(success)).await.unwrap()
                })
            };
            let timeout_applied = timeout.await.unwrap();
            let ack = intake.await.unwrap();
            let callback_applied = ack.disposition == CallbackDisposition::Applied;
            assert!(timeout_applied ^ callback_applied);

            let waited = h
                .engine
                .registry()
                .wait(handle, tokio::time::Instant::now() + Duration::from_secs(1))
                .await;
            let record = h.store.get(&id).await.unwrap().unwrap();
            assert_well_formed(&record);
            match (record.status, waited) {
                (TransactionStatus::Completed, Ok(_)) => assert!(success && callback_applied),
                (TransactionStatus::Error, Err(WaitError::Backend(_))) => {
                    assert!(!success && callback_applied)
                }
                (TransactionStatus::TimedOut, Err(WaitError::TimedOut)) => assert!(timeout_applied),
                (status, waited) => panic!("store says {status:?} but waiter saw {waited:?}"),
            }
        });
    }
}
