//! Dispatch pool behavior: correlation, growth, eviction.

use std::collections::HashSet;
use std::time::Duration;

use axum::http::Method;
use futures_util::{stream, StreamExt};
use treeroute::dispatch::WorkerId;
use treeroute::{
    Error, HandlerError, RequestContext, RequestEnvelope, ResponseMessage, RouteManifest,
    RouteModule, RouteTable,
};

mod common;

fn manifest() -> RouteManifest {
    RouteManifest::new()
        .route(
            "echo/[value]/route.ts",
            RouteModule::new().get(|ctx: RequestContext| async move {
                let value = ctx.param("value").unwrap_or_default().to_string();
                // Later requests finish first so replies interleave.
                let delay = 50u64.saturating_sub(value.parse::<u64>().unwrap_or(0) * 2);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Some(ResponseMessage::text(value)))
            }),
        )
        .route(
            "slow/route.ts",
            RouteModule::new().get(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }),
        )
        .route(
            "fast/route.ts",
            RouteModule::new().get(|_ctx| async { Ok(Some(ResponseMessage::text("fast"))) }),
        )
        .route(
            "broken-stream/route.ts",
            RouteModule::new().get(|_ctx| async {
                let chunks = stream::iter(0..3).map(|i| {
                    if i == 1 {
                        panic!("chunk source failed");
                    }
                    Ok::<_, std::io::Error>(bytes::Bytes::from_static(b"first"))
                });
                Ok(Some(ResponseMessage::stream(chunks)))
            }),
        )
        .route(
            "panic/route.ts",
            RouteModule::new().get(|_ctx| async {
                if true {
                    panic!("handler blew up");
                }
                Err(HandlerError::msg("unreachable"))
            }),
        )
}

fn request(path: &str) -> RequestEnvelope {
    RequestEnvelope::new(Method::GET, path)
}

#[tokio::test]
async fn test_concurrent_requests_on_one_unit_are_not_crossed() {
    let pool = common::start_pool(&manifest(), 1, 1);

    let mut streams = Vec::new();
    for i in 0..20 {
        streams.push((i, pool.dispatch(request(&format!("/echo/{}", i))).unwrap()));
    }
    let workers: HashSet<WorkerId> = streams.iter().map(|(_, s)| s.worker()).collect();
    assert_eq!(workers.len(), 1);

    let tasks: Vec<_> = streams
        .into_iter()
        .map(|(i, stream)| tokio::spawn(async move { (i, common::collect(stream).await) }))
        .collect();

    for task in tasks {
        let (i, collected) = task.await.unwrap();
        assert!(collected.ended);
        assert_eq!(collected.status, Some(200));
        assert_eq!(String::from_utf8(collected.body).unwrap(), i.to_string());
    }
    assert_eq!(pool.stats()[0].1, 0);
    pool.shutdown();
}

#[tokio::test]
async fn test_exited_unit_fails_in_flight_and_is_never_reused() {
    let pool = common::start_pool(&manifest(), 1, 1);

    let stream = pool.dispatch(request("/slow")).unwrap();
    let victim = stream.worker();
    assert!(pool.terminate(victim, 3));

    let collected = common::collect(stream).await;
    assert_eq!(
        collected.error,
        Some(Error::WorkerFailure {
            worker: victim,
            code: 3
        })
    );
    assert!(!collected.ended);

    assert!(common::eventually(|| pool.stats().iter().all(|(id, _)| *id != victim)).await);

    let stream = pool.dispatch(request("/fast")).unwrap();
    assert_ne!(stream.worker(), victim);
    let collected = common::collect(stream).await;
    assert_eq!(collected.body, b"fast");
    assert!(!pool.terminate(victim, 1));
    pool.shutdown();
}

#[tokio::test]
async fn test_pool_grows_then_balances() {
    let pool = common::start_pool(&manifest(), 1, 3);
    assert_eq!(pool.size(), 1);

    let a = pool.dispatch(request("/slow")).unwrap();
    let b = pool.dispatch(request("/slow")).unwrap();
    let c = pool.dispatch(request("/slow")).unwrap();
    assert_eq!(pool.size(), 3);

    let distinct: HashSet<_> = [a.worker(), b.worker(), c.worker()].into_iter().collect();
    assert_eq!(distinct.len(), 3);

    // All busy at max size: least loaded, lowest id on ties.
    let d = pool.dispatch(request("/slow")).unwrap();
    let lowest = *distinct.iter().min().unwrap();
    assert_eq!(d.worker(), lowest);

    let mut stats = pool.stats();
    stats.sort();
    assert_eq!(stats[0], (lowest, 2));
    pool.shutdown();
}

#[tokio::test]
async fn test_idle_unit_preferred_over_growth() {
    let pool = common::start_pool(&manifest(), 2, 4);

    let first = common::collect(pool.dispatch(request("/fast")).unwrap()).await;
    assert!(first.ended);
    let _busy = pool.dispatch(request("/slow")).unwrap();
    let next = pool.dispatch(request("/fast")).unwrap();

    assert_eq!(pool.size(), 2);
    assert!(common::collect(next).await.ended);
    pool.shutdown();
}

#[tokio::test]
async fn test_handler_panic_keeps_unit() {
    let pool = common::start_pool(&manifest(), 1, 1);
    let before = pool.stats()[0].0;

    let collected = common::collect(pool.dispatch(request("/panic")).unwrap()).await;
    assert_eq!(collected.status, Some(500));
    assert!(collected.error.is_none());
    let body: serde_json::Value = serde_json::from_slice(&collected.body).unwrap();
    assert_eq!(body["message"], "Internal server error");

    let collected = common::collect(pool.dispatch(request("/fast")).unwrap()).await;
    assert_eq!(collected.body, b"fast");
    assert_eq!(pool.stats()[0].0, before);
    pool.shutdown();
}

#[tokio::test]
async fn test_panicking_body_stream_still_ends_and_releases_load() {
    let pool = common::start_pool(&manifest(), 1, 1);

    let stream = pool.dispatch(request("/broken-stream")).unwrap();
    let collected = tokio::time::timeout(Duration::from_secs(2), common::collect(stream))
        .await
        .expect("request never terminated");

    assert!(collected.ended);
    assert!(collected.error.is_none());
    assert_eq!(collected.status, Some(200));
    assert_eq!(collected.body, b"first");
    assert_eq!(pool.stats()[0].1, 0);

    let collected = common::collect(pool.dispatch(request("/fast")).unwrap()).await;
    assert_eq!(collected.body, b"fast");
    pool.shutdown();
}

#[tokio::test]
async fn test_terminated_unit_is_skipped_before_eviction() {
    let pool = common::start_pool(&manifest(), 1, 1);
    let victim = pool.stats()[0].0;

    assert!(pool.terminate(victim, 3));
    // No wait for the eviction: selection must already avoid the victim.
    let stream = pool.dispatch(request("/fast")).unwrap();
    assert_ne!(stream.worker(), victim);

    let collected = common::collect(stream).await;
    assert!(collected.error.is_none());
    assert_eq!(collected.body, b"fast");
    assert!(common::eventually(|| pool.size() == 1).await);
    pool.shutdown();
}

#[tokio::test]
async fn test_reload_swaps_routes() {
    let pool = common::start_pool(&manifest(), 1, 2);

    let collected = common::collect(pool.dispatch(request("/fresh")).unwrap()).await;
    assert_eq!(collected.status, Some(404));

    let fresh = RouteManifest::new().route(
        "fresh/route.ts",
        RouteModule::new().get(|_ctx| async { Ok(Some(ResponseMessage::text("new"))) }),
    );
    pool.reload(RouteTable::build(&fresh).unwrap());

    let collected = common::collect(pool.dispatch(request("/fresh")).unwrap()).await;
    assert_eq!(collected.status, Some(200));
    assert_eq!(collected.body, b"new");
    pool.shutdown();
}

#[tokio::test]
async fn test_shutdown_empties_pool() {
    let pool = common::start_pool(&manifest(), 3, 3);
    pool.shutdown();
    assert!(common::eventually(|| pool.size() == 0).await);
}
