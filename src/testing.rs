//! In-memory collaborators for unit tests
//!
//! Every fake appends to a shared [`CallLog`] so tests can check which
//! collaborators ran, and in what order.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::clients::{
    Catalog, Collaborators, Fetcher, GeneratedImage, ImageCdn, ImageGenerator, ImageRequest,
    ObjectStore, PromptProvider, RunHandle, RunStatus, Upscaler, storage,
};
use crate::config::PipelineConfig;
use crate::db::entities::wallpapers::{Model, NewWallpaper};
use crate::error::WallpaperError;

pub(crate) const GENERATED_URL: &str = "https://images.test/generated.png";
pub(crate) const UPSCALED_URL: &str = "https://upscaler.test/upscaled.png";
pub(crate) const REVISED_PROMPT: &str = "A misty fjord at dawn, painted in soft watercolor";

#[derive(Clone, Debug, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: &str) {
        self.0.lock().expect("call log lock").push(call.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.lock().expect("call log lock").clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

/// Tiny solid PNG of the given size
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 160]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Config with instant polling so tests need no paused clock
pub(crate) fn fast_config() -> PipelineConfig {
    PipelineConfig {
        scheduler_enabled: true,
        generate_wallpaper_enabled: true,
        poll_interval: Duration::ZERO,
        ..Default::default()
    }
}

pub(crate) struct FakePrompts {
    log: CallLog,
    script: Mutex<VecDeque<Result<RunStatus, WallpaperError>>>,
    fallback: RunStatus,
    content: Option<String>,
    run_fails: bool,
}

#[async_trait]
impl PromptProvider for FakePrompts {
    async fn run(&self, _instruction: &str) -> Result<RunHandle, WallpaperError> {
        self.log.push("prompts.run");
        if self.run_fails {
            return Err(WallpaperError::Provider("run rejected".to_string()));
        }
        Ok(RunHandle {
            thread_id: "thread_1".to_string(),
            run_id: "run_1".to_string(),
        })
    }

    async fn poll(&self, _handle: &RunHandle) -> Result<RunStatus, WallpaperError> {
        self.log.push("prompts.poll");
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn latest_message(&self, _thread_id: &str) -> Result<String, WallpaperError> {
        self.log.push("prompts.latest_message");
        self.content
            .clone()
            .ok_or_else(|| WallpaperError::EmptyResult("thread messages".to_string()))
    }
}

pub(crate) struct FakeImages {
    log: CallLog,
    images: Vec<GeneratedImage>,
    pub(crate) requests: Mutex<Vec<ImageRequest>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<GeneratedImage>, WallpaperError> {
        self.log.push("images.generate");
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        Ok(self.images.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UpscaleCall {
    pub(crate) model: String,
    pub(crate) image_url: String,
    pub(crate) scale: u32,
    pub(crate) face_enhance: bool,
}

pub(crate) struct FakeUpscaler {
    log: CallLog,
    output: Value,
    pub(crate) calls: Mutex<Vec<UpscaleCall>>,
}

#[async_trait]
impl Upscaler for FakeUpscaler {
    async fn upscale(
        &self,
        model: &str,
        image_url: &str,
        scale: u32,
        face_enhance: bool,
    ) -> Result<Value, WallpaperError> {
        self.log.push("upscaler.upscale");
        self.calls.lock().expect("calls lock").push(UpscaleCall {
            model: model.to_string(),
            image_url: image_url.to_string(),
            scale,
            face_enhance,
        });
        Ok(self.output.clone())
    }
}

pub(crate) struct FakeFetcher {
    log: CallLog,
    fail: bool,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFetcher {
    pub(crate) fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies
            .lock()
            .expect("bodies lock")
            .insert(url.to_string(), body);
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WallpaperError> {
        self.log.push("fetcher.fetch");
        if self.fail {
            return Err(WallpaperError::Provider(format!("Image download error 500 {url}")));
        }
        self.bodies
            .lock()
            .expect("bodies lock")
            .get(url)
            .cloned()
            .ok_or_else(|| WallpaperError::Provider(format!("Image download error 404 {url}")))
    }
}

pub(crate) struct FakeStore {
    log: CallLog,
    put_fails: bool,
    pub(crate) objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeStore {
    pub(crate) fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("objects lock").get(key).cloned()
    }

    pub(crate) fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .expect("objects lock")
            .insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, WallpaperError> {
        self.log.push("store.put");
        if self.put_fails {
            return Err(WallpaperError::Storage("bucket unavailable".to_string()));
        }
        let key = storage::key_for_filename(filename);
        self.insert(&key, bytes);
        Ok(key)
    }

    async fn put_at(&self, key: &str, bytes: Vec<u8>) -> Result<(), WallpaperError> {
        self.log.push("store.put_at");
        self.insert(key, bytes);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError> {
        self.log.push("store.signed_url");
        if self.object(key).is_none() {
            return Err(WallpaperError::NotFound(key.to_string()));
        }
        Ok(format!(
            "https://r2.test/{key}?X-Amz-Expires={}",
            ttl.as_secs()
        ))
    }

    async fn signed_put_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError> {
        self.log.push("store.signed_put_url");
        Ok(format!(
            "https://r2.test/{key}?x-id=PutObject&X-Amz-Expires={}",
            ttl.as_secs()
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct IngestCall {
    pub(crate) url: String,
    pub(crate) metadata: Value,
    pub(crate) id: Option<String>,
}

pub(crate) struct FakeCdn {
    log: CallLog,
    fail: bool,
    pub(crate) ingested: Mutex<Vec<IngestCall>>,
}

#[async_trait]
impl ImageCdn for FakeCdn {
    async fn ingest(
        &self,
        url: &str,
        metadata: Value,
        id: Option<&str>,
    ) -> Result<String, WallpaperError> {
        self.log.push("cdn.ingest");
        if self.fail {
            return Err(WallpaperError::Cdn("ingest rejected".to_string()));
        }
        let mut ingested = self.ingested.lock().expect("ingested lock");
        let image_key = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("cdn-{}", ingested.len() + 1));
        ingested.push(IngestCall {
            url: url.to_string(),
            metadata,
            id: id.map(str::to_string),
        });
        Ok(image_key)
    }

    fn public_url(&self, id: &str, variant: Option<&str>) -> String {
        format!("https://cdn.test/{id}/{}", variant.unwrap_or("public"))
    }
}

#[derive(Default)]
pub(crate) struct FakeCatalog {
    log: CallLog,
    pub(crate) rows: Mutex<Vec<Model>>,
}

impl FakeCatalog {
    pub(crate) fn len(&self) -> usize {
        self.rows.lock().expect("rows lock").len()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn insert(&self, wallpaper: NewWallpaper) -> Result<Model, WallpaperError> {
        self.log.push("catalog.insert");
        let now = Utc::now().naive_utc();
        let mut rows = self.rows.lock().expect("rows lock");
        let model = Model {
            id: i32::try_from(rows.len() + 1).expect("row id"),
            collection_id: None,
            object_key: wallpaper.object_key,
            image_key: wallpaper.image_key,
            input: wallpaper.input,
            created_at: now,
            updated_at: now,
        };
        rows.push(model.clone());
        Ok(model)
    }
}

/// Builder for a full set of fakes sharing one call log
pub(crate) struct Fakes {
    pub(crate) log: CallLog,
    poll_script: VecDeque<Result<RunStatus, WallpaperError>>,
    poll_fallback: RunStatus,
    content: Option<String>,
    images: Vec<GeneratedImage>,
    upscale_output: Value,
    run_fails: bool,
    fetch_fails: bool,
    store_put_fails: bool,
    cdn_fails: bool,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            log: CallLog::default(),
            poll_script: VecDeque::new(),
            poll_fallback: RunStatus::Completed,
            content: Some(
                "```json\n{\"prompt\":\"a misty fjord\",\"styles\":[\"watercolor\"],\"tags\":[\"nature\"],\"colors\":[\"teal\",\"grey\"]}\n```"
                    .to_string(),
            ),
            images: vec![GeneratedImage {
                url: Some(GENERATED_URL.to_string()),
                revised_prompt: Some(REVISED_PROMPT.to_string()),
            }],
            upscale_output: Value::String(UPSCALED_URL.to_string()),
            run_fails: false,
            fetch_fails: false,
            store_put_fails: false,
            cdn_fails: false,
        }
    }
}

impl Fakes {
    pub(crate) fn poll_script(
        mut self,
        script: impl IntoIterator<Item = Result<RunStatus, WallpaperError>>,
    ) -> Self {
        self.poll_script = script.into_iter().collect();
        self
    }

    pub(crate) fn poll_fallback(mut self, status: RunStatus) -> Self {
        self.poll_fallback = status;
        self
    }

    pub(crate) fn content(mut self, content: Option<&str>) -> Self {
        self.content = content.map(str::to_string);
        self
    }

    pub(crate) fn images(mut self, images: Vec<GeneratedImage>) -> Self {
        self.images = images;
        self
    }

    pub(crate) fn upscale_output(mut self, output: Value) -> Self {
        self.upscale_output = output;
        self
    }

    pub(crate) fn run_fails(mut self) -> Self {
        self.run_fails = true;
        self
    }

    pub(crate) fn fetch_fails(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub(crate) fn store_put_fails(mut self) -> Self {
        self.store_put_fails = true;
        self
    }

    pub(crate) fn cdn_fails(mut self) -> Self {
        self.cdn_fails = true;
        self
    }

    pub(crate) fn build(self) -> FakeSet {
        let log = self.log;
        let fetcher = Arc::new(FakeFetcher {
            log: log.clone(),
            fail: self.fetch_fails,
            bodies: Mutex::new(HashMap::new()),
        });
        fetcher.serve(UPSCALED_URL, png_bytes(8, 14));
        FakeSet {
            prompts: Arc::new(FakePrompts {
                log: log.clone(),
                script: Mutex::new(self.poll_script),
                fallback: self.poll_fallback,
                content: self.content,
                run_fails: self.run_fails,
            }),
            images: Arc::new(FakeImages {
                log: log.clone(),
                images: self.images,
                requests: Mutex::new(Vec::new()),
            }),
            upscaler: Arc::new(FakeUpscaler {
                log: log.clone(),
                output: self.upscale_output,
                calls: Mutex::new(Vec::new()),
            }),
            store: Arc::new(FakeStore {
                log: log.clone(),
                put_fails: self.store_put_fails,
                objects: Mutex::new(HashMap::new()),
            }),
            cdn: Arc::new(FakeCdn {
                log: log.clone(),
                fail: self.cdn_fails,
                ingested: Mutex::new(Vec::new()),
            }),
            fetcher,
            catalog: Arc::new(FakeCatalog {
                log: log.clone(),
                rows: Mutex::new(Vec::new()),
            }),
            log,
        }
    }
}

/// Handles on every fake, kept so tests can inspect them after a run
pub(crate) struct FakeSet {
    pub(crate) log: CallLog,
    pub(crate) prompts: Arc<FakePrompts>,
    pub(crate) images: Arc<FakeImages>,
    pub(crate) upscaler: Arc<FakeUpscaler>,
    pub(crate) store: Arc<FakeStore>,
    pub(crate) cdn: Arc<FakeCdn>,
    pub(crate) fetcher: Arc<FakeFetcher>,
    pub(crate) catalog: Arc<FakeCatalog>,
}

impl FakeSet {
    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            prompts: self.prompts.clone(),
            images: self.images.clone(),
            upscaler: self.upscaler.clone(),
            store: self.store.clone(),
            cdn: self.cdn.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}
