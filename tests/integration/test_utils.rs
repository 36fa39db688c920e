//! Test utilities for integration tests.
//!
//! Provides synthetic JP2 headers, a mock decoding engine, a router fixture
//! over a temporary image root, and (on unix) shell scripts that stand in for
//! the expand executable.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use jp2_streamer::engine::DecodeEngine;
use jp2_streamer::format::{ImageMetadata, ImageSource};
use jp2_streamer::{
    create_router, DirectoryResolver, ExtractError, ImagingContext, NativeEngine, Raster,
    ResolvedParameters, RouterConfig, TileOptions,
};

// =============================================================================
// Synthetic JP2 Files
// =============================================================================

const SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

fn jp2_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// A JP2 file whose header is complete but whose codestream carries no
/// coded data. Good for probing; decoding needs a mock or fake engine.
pub fn create_jp2(width: u32, height: u32, levels: u8, xml: &[&str]) -> Vec<u8> {
    let components: u16 = 3;

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&components.to_be_bytes());
    ihdr.extend_from_slice(&[7, 7, 0, 0]);

    let mut cs = vec![0xFF, 0x4F, 0xFF, 0x51];
    cs.extend_from_slice(&(38 + 3 * components).to_be_bytes());
    cs.extend_from_slice(&0u16.to_be_bytes());
    for v in [width, height, 0, 0, width, height, 0, 0] {
        cs.extend_from_slice(&v.to_be_bytes());
    }
    cs.extend_from_slice(&components.to_be_bytes());
    for _ in 0..components {
        cs.extend_from_slice(&[7, 1, 1]);
    }
    cs.extend_from_slice(&[0xFF, 0x52, 0x00, 0x0C, 0x00, 0x00, 0x00, 0x01]);
    cs.extend_from_slice(&[0x01, levels, 0x04, 0x04, 0x00, 0x01]);
    cs.extend_from_slice(&[0xFF, 0xD9]);

    let mut out = SIGNATURE.to_vec();
    out.extend(jp2_box(b"ftyp", b"jp2 \x00\x00\x00\x00jp2 "));
    out.extend(jp2_box(b"jp2h", &jp2_box(b"ihdr", &ihdr)));
    for x in xml {
        out.extend(jp2_box(b"xml ", x.as_bytes()));
    }
    out.extend(jp2_box(b"jp2c", &cs));
    out
}

/// Check if data is a valid JPEG (starts with SOI marker).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

// =============================================================================
// Mock Engine
// =============================================================================

/// Probes with the native container reader and "decodes" a gray gradient
/// sized like the requested region.
#[derive(Default)]
pub struct MockEngine {
    decodes: AtomicUsize,
    last: std::sync::Mutex<Option<ResolvedParameters>>,
}

impl MockEngine {
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<ResolvedParameters> {
        *self.last.lock().unwrap()
    }
}

#[async_trait]
impl DecodeEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self, source: &ImageSource) -> Result<ImageMetadata, ExtractError> {
        NativeEngine::new().probe(source).await
    }

    async fn decode(
        &self,
        source: &ImageSource,
        params: &ResolvedParameters,
        _cancel: &CancellationToken,
    ) -> Result<Raster, ExtractError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(*params);

        let meta = self.probe(source).await?;
        let [_, _, h, w] = params.region.unwrap_or([0.0, 0.0, 1.0, 1.0]);
        let scale = (1u32 << params.reduce.min(31)) as f64;
        let width = ((w * meta.width as f64 / scale).round() as u32).clamp(1, 256);
        let height = ((h * meta.height as f64 / scale).round() as u32).clamp(1, 256);

        let data: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
        Raster::new(width, height, 1, Bytes::from(data))
    }
}

// =============================================================================
// Router Fixture
// =============================================================================

/// Image root, tile directory and router over a mock engine.
pub struct TestServer {
    pub dir: TempDir,
    pub engine: Arc<MockEngine>,
    pub context: Arc<ImagingContext>,
    pub router: Router,
}

impl TestServer {
    pub async fn new(capacity: usize) -> Self {
        Self::with_engine_and_capacity(Arc::new(MockEngine::default()), capacity).await
    }

    pub async fn with_engine_and_capacity(engine: Arc<MockEngine>, capacity: usize) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();

        let context = Arc::new(
            ImagingContext::start(
                engine.clone(),
                Arc::new(DirectoryResolver::new(dir.path().join("images"))),
                TileOptions::new(dir.path().join("tiles"))
                    .with_capacity(capacity)
                    .with_delete_workers(2),
            )
            .await
            .unwrap(),
        );
        let router = create_router(
            context.clone(),
            RouterConfig::new().with_cache_max_age(600).with_tracing(false),
        );

        Self {
            dir,
            engine,
            context,
            router,
        }
    }

    /// Write an image under the image root.
    pub fn add_image(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join("images").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.dir.path().join("tiles")
    }

    /// Number of tile files on disk.
    pub fn tile_files(&self) -> usize {
        std::fs::read_dir(self.tiles_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == "jpg"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        get(&self.router, uri).await
    }
}

/// Send a GET through the router and collect the response.
pub async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

// =============================================================================
// Fake Expand Executables
// =============================================================================

/// A shell script standing in for the expand executable, logging its argv.
#[cfg(unix)]
pub struct FakeExpand {
    pub path: PathBuf,
    log: PathBuf,
}

#[cfg(unix)]
impl FakeExpand {
    /// Answers `-record` with a 2000x1000, 5-level header dump and decodes
    /// to a 4x2 RGB PNM.
    pub fn working(dir: &Path) -> Self {
        Self::with_body(
            dir,
            "expand_ok",
            r#"
record=""
out=""
in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift ;;
    -o) out="$2"; shift ;;
    -record) record="$2"; shift ;;
  esac
  shift
done
if [ "$in" = /dev/stdin ]; then cat > /dev/null; fi
if [ -n "$record" ]; then
  printf 'Ssize={1000,2000}\nClevels=5\nSprecision=8,8,8\nScomponents=3\nClayers=1\n' > "$record"
  exit 0
fi
printf 'P6\n# fake\n4 2\n255\n' > "$out"
printf 'AAABBBCCCDDDEEEFFFGGGHHH' >> "$out"
"#,
        )
    }

    /// Exits 3 after a diagnostic on stderr.
    pub fn failing(dir: &Path) -> Self {
        Self::with_body(
            dir,
            "expand_fail",
            "echo 'Kakadu Error: region out of bounds' >&2\nexit 3\n",
        )
    }

    /// Never finishes on its own.
    pub fn hanging(dir: &Path) -> Self {
        Self::with_body(dir, "expand_hang", "exec sleep 30\n")
    }

    fn with_body(dir: &Path, name: &str, body: &str) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        let log = dir.join(format!("{}.log", name));
        let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}", log.display(), body);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { path, log }
    }

    /// Argument lines of every run so far.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
