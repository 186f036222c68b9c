mod common;

use std::net::SocketAddr;
use std::path::Path;

use chrono::DateTime;
use common::*;
use streamer::{HttpFetcher, StartMode, StreamError, TileStreamer};

async fn serve(dir: &Path) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = tiler::create_router(dir);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher_for(addr: SocketAddr) -> HttpFetcher {
    HttpFetcher::new(&format!("http://{addr}/")).unwrap()
}

#[tokio::test]
async fn streams_tiles_written_by_the_builder() {
    let dir = tempfile::tempdir().unwrap();
    build(japan_records())
        .write_to(
            &dir.path().join("weathernews-tiles"),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
        .unwrap();
    let addr = serve(dir.path()).await;

    let streamer = TileStreamer::new(config(), fetcher_for(addr), renderer_at(TOKYO));
    let mode = streamer.start().await.unwrap();

    assert!(matches!(mode, StartMode::Tiled { zoom: 9, total_reports: 7, .. }));
    assert_eq!(streamer.current_loaded_report_count(), 4);
    assert_eq!(streamer.search("snow").map(|ids| ids.len()), Some(1));
    streamer.with_renderer(|renderer| assert_eq!(renderer.visible_marker_count(), 3));
}

#[tokio::test]
async fn falls_back_to_legacy_file_on_404() {
    let dir = tempfile::tempdir().unwrap();
    let records = serde_json::json!([
        record("a", 139.80, 35.60, "Flood"),
        record("b", 139.81, 35.61, "Fire"),
        record("c", 139.82, 35.62, "Quake"),
        {"id": "bad", "position": {"cartographicDegrees": ["east", 35.0]}},
    ]);
    std::fs::write(dir.path().join(LEGACY_PATH), serde_json::to_vec(&records).unwrap()).unwrap();
    let addr = serve(dir.path()).await;

    let streamer = TileStreamer::new(config(), fetcher_for(addr), renderer_at(TOKYO));
    let mode = streamer.start().await.unwrap();

    assert_eq!(mode, StartMode::Legacy { reports: 3 });
    assert_eq!(streamer.manifest().unwrap().total_reports, 3);
    assert_eq!(streamer.current_loaded_report_count(), 3);
}

#[tokio::test]
async fn empty_server_fails_terminally() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(dir.path()).await;

    let streamer = TileStreamer::new(config(), fetcher_for(addr), renderer_at(TOKYO));
    match streamer.start().await {
        Err(StreamError::LegacyFetchFailed(streamer::FetchError::Status { status, .. })) => {
            assert_eq!(status, 404)
        }
        other => panic!("expected legacy failure, got {other:?}"),
    }
}
