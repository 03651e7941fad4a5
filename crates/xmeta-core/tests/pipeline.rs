//! End-to-end tests for the metadata pipeline against a fake catalog.
//!
//! The fake catalog serves the by-hash and model endpoints plus media files
//! from an in-process axum router bound to an ephemeral port.

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use xmeta_core::{CatalogEndpoints, DirectoryModelRegistry, ExpandedMetadataApi, XmetaError};

const SUBTYPE: &str = "Stable-Diffusion";

#[derive(Default)]
struct FakeCatalog {
    /// Short hashes the by-hash endpoint answers for.
    known_hashes: Vec<String>,
    /// Media list returned in the version record.
    images: Vec<Value>,
    /// Every request path seen, in order.
    hits: Vec<String>,
}

type Shared = Arc<Mutex<FakeCatalog>>;

async fn by_hash(
    State(state): State<Shared>,
    AxumPath(hash): AxumPath<String>,
) -> Result<Json<Value>, StatusCode> {
    let mut catalog = state.lock().unwrap();
    catalog.hits.push(format!("by-hash/{}", hash));
    if catalog.known_hashes.contains(&hash) {
        Ok(Json(json!({
            "id": 202,
            "modelId": 101,
            "name": "v2.0",
            "baseModel": "SDXL 1.0",
            "trainedWords": ["trigger"],
            "images": catalog.images.clone(),
        })))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn model(State(state): State<Shared>, AxumPath(id): AxumPath<String>) -> Json<Value> {
    state.lock().unwrap().hits.push(format!("models/{}", id));
    Json(json!({
        "id": 101,
        "name": "Demo Model",
        "tags": ["style"],
        "creator": {"username": "someone"},
    }))
}

async fn image(AxumPath(name): AxumPath<String>) -> Vec<u8> {
    format!("media:{}", name).into_bytes()
}

async fn spawn_catalog(state: Shared) -> String {
    let app = Router::new()
        .route("/api/v1/model-versions/by-hash/:hash", get(by_hash))
        .route("/api/v1/models/:id", get(model))
        .route("/img/:name", get(image))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write_model(path: &Path, header: &str, payload: &[u8]) {
    let mut bytes = (header.len() as i64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

struct TestEnv {
    temp: TempDir,
    base: String,
    state: Shared,
}

impl TestEnv {
    async fn new() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeCatalog::default()));
        let base = spawn_catalog(state.clone()).await;
        Self {
            temp: TempDir::new().unwrap(),
            base,
            state,
        }
    }

    fn models_dir(&self) -> PathBuf {
        self.temp.path().join("models")
    }

    fn data_root(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    /// Build a fresh API; a new registry starts without cached tensor hashes.
    fn api(&self) -> ExpandedMetadataApi {
        let registry = DirectoryModelRegistry::new().with_subtype(SUBTYPE, self.models_dir());
        ExpandedMetadataApi::builder(self.data_root())
            .with_registry(Arc::new(registry))
            .catalog_endpoints(CatalogEndpoints {
                api_base: format!("{}/api/v1", self.base),
                web_base: "https://catalog.test".to_string(),
            })
            .request_timeout(Duration::from_secs(5))
            .download_timeout(Duration::from_secs(5))
            .download_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn hits(&self) -> Vec<String> {
        self.state.lock().unwrap().hits.clone()
    }

    fn metadata_files(&self) -> Vec<String> {
        let dir = self.data_root().join("expanded_metadata").join("metadata");
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[tokio::test]
async fn full_pipeline_writes_document_and_media() {
    let env = TestEnv::new().await;
    write_model(
        &env.models_dir().join("sdxl").join("demo.safetensors"),
        r#"{"__metadata__":{"ss_output_name":"demo"}}"#,
        &[1u8; 128],
    );

    let api = env.api();
    let first = api
        .get_expanded_metadata("sdxl/demo.safetensors", SUBTYPE)
        .await
        .unwrap();
    let hashes = first.hashes.unwrap();
    assert!(first.civitai.is_none());

    // Teach the catalog the whole-file hash, then rebuild.
    {
        let mut catalog = env.state.lock().unwrap();
        catalog.known_hashes.push(hashes.autov2_short.clone());
        catalog.images = vec![
            json!({"url": format!("{}/img/a.jpeg", env.base), "nsfwLevel": 1}),
            json!({"url": format!("{}/img/b.mp4", env.base), "type": "video"}),
        ];
    }

    let doc = api
        .refresh_expanded_metadata("sdxl/demo.safetensors", SUBTYPE)
        .await
        .unwrap();
    let civitai = doc.civitai.clone().unwrap();
    assert_eq!(civitai.source, "civitai");
    assert_eq!(civitai.hash_used, hashes.autov2_short);
    assert_eq!(civitai.model_url, "https://catalog.test/models/101?modelVersionId=202");
    assert_eq!(civitai.data["model"]["creator"]["username"], "someone");

    let id = &hashes.autov3_short;
    let images = civitai.media_items();
    assert_eq!(images[0]["local_path"], format!("{}/0.jpg", id));
    assert_eq!(images[1]["local_path"], format!("{}/1.mp4", id));

    let media_dir = api.media_root().join(id);
    assert_eq!(std::fs::read(media_dir.join("1.mp4")).unwrap(), b"media:b.mp4");

    // On-disk document matches the returned one and uses the expected keys.
    assert_eq!(
        env.metadata_files(),
        vec![format!("{}.meta.demo.json", id)]
    );
    let on_disk: Value = serde_json::from_str(
        &std::fs::read_to_string(
            api.store()
                .metadata_dir()
                .join(format!("{}.meta.demo.json", id)),
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk["file_metadata"]["ss_output_name"], "demo");
    assert_eq!(on_disk["hashes"]["autov2_short"], hashes.autov2_short);
    assert_eq!(on_disk["civitai"]["data"]["images"][0]["local_path"], format!("{}/0.jpg", id));
}

#[tokio::test]
async fn failed_lookups_still_return_hashes_and_header() {
    let env = TestEnv::new().await;
    write_model(
        &env.models_dir().join("nomatch.safetensors"),
        r#"{"__metadata__":{"k":"v"}}"#,
        &[9u8; 32],
    );

    let doc = env
        .api()
        .get_expanded_metadata("nomatch.safetensors", SUBTYPE)
        .await
        .unwrap();

    let hashes = doc.hashes.unwrap();
    assert_eq!(
        env.hits(),
        vec![
            format!("by-hash/{}", hashes.autov2_short),
            format!("by-hash/{}", hashes.autov3_short),
        ]
    );
    assert!(doc.civitai.is_none());
    assert!(doc.error.is_none());
    assert_eq!(doc.file_metadata["k"], "v");
    assert_eq!(hashes.sha256_autov2.len(), 64);
}

#[tokio::test]
async fn tensor_hash_fallback_produces_match() {
    let env = TestEnv::new().await;
    let path = env.models_dir().join("v3.safetensors");
    write_model(&path, "{}", &[3u8; 16]);

    let autov3 = xmeta_core::hashing::compute_autov3(&path).unwrap();
    env.state
        .lock()
        .unwrap()
        .known_hashes
        .push(autov3[..12].to_string());

    let doc = env
        .api()
        .get_expanded_metadata("v3.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert_eq!(doc.civitai.unwrap().hash_used, &autov3[..12]);
    assert_eq!(env.hits().len(), 3);
}

#[tokio::test]
async fn one_broken_media_item_does_not_fail_the_batch() {
    let env = TestEnv::new().await;
    let path = env.models_dir().join("media.safetensors");
    write_model(&path, "{}", &[5u8; 16]);

    let autov2 = xmeta_core::hashing::compute_autov2(&path).unwrap();
    {
        let mut catalog = env.state.lock().unwrap();
        catalog.known_hashes.push(autov2[..10].to_string());
        catalog.images = vec![
            json!({"url": format!("{}/img/one.jpg", env.base)}),
            json!({"url": "http://127.0.0.1:1/two.jpg"}),
            json!({"url": format!("{}/img/three.webm", env.base)}),
        ];
    }

    let doc = env
        .api()
        .get_expanded_metadata("media.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert!(doc.error.is_none());

    let civitai = doc.civitai.unwrap();
    let images = civitai.media_items();
    assert!(images[0].get("local_path").is_some());
    assert!(images[1].get("local_path").is_none());
    assert_eq!(images[1]["url"], "http://127.0.0.1:1/two.jpg");
    assert!(images[2]["local_path"].as_str().unwrap().ends_with("/2.webm"));
}

#[tokio::test]
async fn document_path_survives_model_rename() {
    let env = TestEnv::new().await;
    let original = env.models_dir().join("old_name.safetensors");
    write_model(&original, r#"{"__metadata__":{"a":"1"}}"#, &[8u8; 16]);

    let first = env
        .api()
        .get_expanded_metadata("old_name.safetensors", SUBTYPE)
        .await
        .unwrap();
    let files_before = env.metadata_files();

    std::fs::rename(&original, env.models_dir().join("new_name.safetensors")).unwrap();

    let second = env
        .api()
        .get_expanded_metadata("new_name.safetensors", SUBTYPE)
        .await
        .unwrap();

    assert_eq!(env.metadata_files(), files_before);
    assert!(files_before[0].ends_with(".meta.old_name.json"));
    // Served from cache: the old file name is still recorded.
    assert_eq!(second.file_name, "old_name.safetensors");
    assert_eq!(first.hashes, second.hashes);
}

#[tokio::test]
async fn refresh_does_not_leak_stale_catalog_data() {
    let env = TestEnv::new().await;
    let path = env.models_dir().join("stale.safetensors");
    write_model(&path, "{}", &[4u8; 16]);

    let autov2 = xmeta_core::hashing::compute_autov2(&path).unwrap();
    env.state
        .lock()
        .unwrap()
        .known_hashes
        .push(autov2[..10].to_string());

    let api = env.api();
    let first = api
        .get_expanded_metadata("stale.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert!(first.civitai.is_some());

    env.state.lock().unwrap().known_hashes.clear();

    let refreshed = api
        .refresh_expanded_metadata("stale.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert!(refreshed.civitai.is_none());
    assert!(refreshed.hashes.is_some());

    let cached = api
        .get_expanded_metadata("stale.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert!(cached.civitai.is_none());
}

#[tokio::test]
async fn negative_header_length_degrades_gracefully() {
    let env = TestEnv::new().await;
    let path = env.models_dir().join("corrupt.safetensors");
    std::fs::create_dir_all(env.models_dir()).unwrap();
    let mut bytes = (-1i64).to_le_bytes().to_vec();
    bytes.extend_from_slice(b"garbage that is not a header");
    std::fs::write(&path, bytes).unwrap();

    let doc = env
        .api()
        .get_expanded_metadata("corrupt.safetensors", SUBTYPE)
        .await
        .unwrap();

    assert!(doc.file_metadata.is_empty());
    let hashes = doc.hashes.unwrap();
    assert_eq!(hashes.sha256_autov3, "");
    assert_eq!(hashes.autov3_short, "");
    assert_eq!(hashes.autov2_short.len(), 10);
    // Without a tensor hash the document is keyed on the unknown token.
    assert_eq!(env.metadata_files(), vec!["unknown.meta.corrupt.json".to_string()]);
    // Only the whole-file hash is tried.
    assert_eq!(env.hits(), vec![format!("by-hash/{}", hashes.autov2_short)]);
}

#[tokio::test]
async fn truncated_models_do_not_share_a_document() {
    let env = TestEnv::new().await;
    std::fs::create_dir_all(env.models_dir()).unwrap();
    for (name, body) in [("a", b"0123456789"), ("b", b"abcdefghij")] {
        let mut bytes = 5000i64.to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        std::fs::write(env.models_dir().join(format!("{}.safetensors", name)), bytes).unwrap();
    }

    let api = env.api();
    let a = api.get_expanded_metadata("a.safetensors", SUBTYPE).await.unwrap();
    let b = api.get_expanded_metadata("b.safetensors", SUBTYPE).await.unwrap();

    assert_eq!(a.file_name, "a.safetensors");
    assert_eq!(b.file_name, "b.safetensors");
    assert_eq!(b.hashes.unwrap().sha256_autov3, "");
    assert_eq!(
        env.metadata_files(),
        vec![
            "unknown.meta.a.json".to_string(),
            "unknown.meta.b.json".to_string(),
        ]
    );
}

#[tokio::test]
async fn refresh_rehashes_a_replaced_model() {
    let env = TestEnv::new().await;
    let path = env.models_dir().join("swap.safetensors");
    write_model(&path, "{}", &[1u8; 16]);

    let api = env.api();
    let before = api
        .get_expanded_metadata("swap.safetensors", SUBTYPE)
        .await
        .unwrap()
        .hashes
        .unwrap();

    write_model(&path, "{}", &[2u8; 48]);
    let after = api
        .refresh_expanded_metadata("swap.safetensors", SUBTYPE)
        .await
        .unwrap()
        .hashes
        .unwrap();

    let expected = xmeta_core::hashing::compute_autov3(&path).unwrap();
    assert_eq!(after.sha256_autov3, expected);
    assert_ne!(after.sha256_autov3, before.sha256_autov3);
    assert_eq!(after.sha256_autov2, xmeta_core::hashing::compute_autov2(&path).unwrap());

    // The rebuilt document is keyed on the new tensor hash.
    let cached = api
        .get_expanded_metadata("swap.safetensors", SUBTYPE)
        .await
        .unwrap();
    assert_eq!(cached.hashes.unwrap(), after);
    assert!(env
        .metadata_files()
        .contains(&format!("{}.meta.swap.json", after.autov3_short)));
}

#[tokio::test]
async fn unknown_subtype_and_missing_model_are_input_errors() {
    let env = TestEnv::new().await;
    std::fs::create_dir_all(env.models_dir()).unwrap();
    let api = env.api();

    let err = api.get_expanded_metadata("x.safetensors", "LoRA").await.unwrap_err();
    assert!(matches!(err, XmetaError::UnknownSubtype(_)));

    let err = api
        .refresh_expanded_metadata("x.safetensors", SUBTYPE)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Model not found: x.safetensors in Stable-Diffusion");
    assert!(env.hits().is_empty());
}
