//! One app session driven through the JSON bridge
//!
//! The bridge context is process-global, so everything lives in one test.

use onepace_core::bridge::dispatch_json;
use serde_json::{json, Value};

fn call(request: Value) -> Value {
    let response: Value = serde_json::from_str(&dispatch_json(&request.to_string())).unwrap();
    response
}

fn data(request: Value) -> Value {
    let response = call(request.clone());
    assert_eq!(response["success"], true, "{} failed: {}", request, response);
    response["data"].clone()
}

#[test]
fn test_bridge_session() {
    // Anything before init is refused
    let response = call(json!({ "method": "getProgress", "params": { "episodeId": "E1" } }));
    assert_eq!(response["success"], false);

    let dir = tempfile::tempdir().unwrap();
    let config = json!({
        "documentsRoot": dir.path(),
        "catalogUrl": "http://127.0.0.1:9/episodes.json",
        "mediaBaseUrl": "http://127.0.0.1:9/api/file",
    });
    data(json!({ "method": "init", "params": { "config": config } }));

    // Second init keeps the running context
    data(json!({ "method": "init", "params": { "config": config } }));

    // Progress
    let record = data(json!({ "method": "setProgress", "params": { "episodeId": "E1", "percentage": 150.0 } }));
    assert_eq!(record["percentage"], 100.0);

    let record = data(json!({ "method": "markFinished", "params": { "episodeId": "E2" } }));
    assert_eq!(record["isFinished"], true);

    let cleared = data(json!({ "method": "clearProgress", "params": { "episodeId": "E1" } }));
    assert_eq!(cleared["cleared"], true);

    let all = data(json!({ "method": "allProgress" }));
    assert_eq!(all.as_array().unwrap().len(), 1);

    // Settings
    let settings = data(json!({ "method": "setSetting", "params": { "name": "silentmode", "enabled": true } }));
    assert_eq!(settings["silentmode"], true);

    // Playback of an episode that isn't downloaded streams it
    let opened = data(json!({ "method": "openPlayback", "params": { "episodeId": "E3" } }));
    assert_eq!(opened["uri"], "http://127.0.0.1:9/api/file/E3");
    assert_eq!(opened["playsInSilentMode"], true);

    let loaded = data(json!({ "method": "playbackLoaded", "params": { "episodeId": "E3", "durationMs": 60000 } }));
    assert_eq!(loaded["seekToMs"], Value::Null);

    data(json!({
        "method": "playbackStatus",
        "params": {
            "episodeId": "E3",
            "status": { "positionMs": 30000, "durationMs": 60000, "isLoaded": true }
        }
    }));
    data(json!({ "method": "closePlayback", "params": { "episodeId": "E3" } }));

    let record = data(json!({ "method": "getProgress", "params": { "episodeId": "E3" } }));
    assert_eq!(record["percentage"], 50.0);

    // Downloads
    let entries = data(json!({ "method": "downloadEntries" }));
    assert!(entries.as_array().unwrap().is_empty());

    let response = call(json!({
        "method": "download",
        "params": { "command": { "type": "start", "episodeId": "../escape" } }
    }));
    assert_eq!(response["success"], false);

    let removed = data(json!({ "method": "clearDownloads" }));
    assert_eq!(removed["removed"], 0);

    // Catalog host is unreachable and nothing is cached
    let catalog = data(json!({ "method": "loadCatalog" }));
    assert_eq!(catalog["state"], "error");
    assert_eq!(catalog["message"], "Error loading data.");
}
