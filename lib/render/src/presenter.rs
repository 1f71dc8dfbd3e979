//! Grid rendering.
//!
//! Every distinct reference in the layout is fetched at most once, with a
//! bounded number of fetches in flight and a timeout on each. A reference
//! that fails to fetch or decode only costs its own cells: they get a
//! placeholder tile and the failure is logged and recorded in the manifest.

use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::RenderError;
use crate::fetch::ResourceFetcher;
use crate::grid::GridLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Side of each square tile, in pixels
    pub cell_size: u32,
    pub padding: u32,
    /// Maximum fetches in flight
    pub concurrency: usize,
    #[serde(with = "millis", rename = "timeout_ms")]
    pub timeout: Duration,
    pub background: [u8; 3],
    pub placeholder: [u8; 3],
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            cell_size: 256,
            padding: 8,
            concurrency: 8,
            timeout: Duration::from_secs(10),
            background: [255, 255, 255],
            placeholder: [220, 220, 220],
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Serialize)]
struct ManifestCell<'a> {
    row: usize,
    column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
    /// "ok", "empty" or "failed"
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: String,
    image: String,
    cell_size: u32,
    rows: &'a [String],
    columns: &'a [String],
    cells: Vec<ManifestCell<'a>>,
}

/// Outcome of a render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub output: PathBuf,
    pub manifest: PathBuf,
    pub ok: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct Presenter {
    config: PresenterConfig,
}

impl Presenter {
    pub fn new(config: PresenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PresenterConfig {
        &self.config
    }

    /// Manifest path written next to `output`
    pub fn manifest_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    /// Fetch and decode every distinct reference, each fitted into a tile
    async fn load_tiles<'a, F: ResourceFetcher>(
        &self,
        layout: &'a GridLayout,
        fetcher: &F,
    ) -> HashMap<&'a str, Result<RgbImage, RenderError>> {
        let references: BTreeSet<&str> = layout
            .cells
            .iter()
            .flatten()
            .filter_map(|c| c.as_deref())
            .collect();

        let size = self.config.cell_size;
        let timeout = self.config.timeout;

        stream::iter(references)
            .map(|reference| async move {
                let loaded = match tokio::time::timeout(timeout, fetcher.fetch(reference)).await {
                    Ok(Ok(bytes)) => image::load_from_memory(&bytes)
                        .map(|img| img.resize(size, size, FilterType::Triangle).to_rgb8())
                        .map_err(|source| RenderError::Decode {
                            reference: reference.to_string(),
                            source,
                        }),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(RenderError::Timeout {
                        reference: reference.to_string(),
                    }),
                };
                if let Err(e) = &loaded {
                    warn!(reference, error = %e, "resource unavailable, using placeholder");
                }
                (reference, loaded)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    fn draw_placeholder(&self, canvas: &mut RgbImage, x: u32, y: u32, failed: bool) {
        let size = self.config.cell_size;
        let fill = Rgb(self.config.placeholder);
        let mark = Rgb(self.config.placeholder.map(|c| c / 2));
        for dy in 0..size {
            for dx in 0..size {
                // failed tiles get a cross so they read differently from empty ones
                let on_cross = failed && (dx == dy || dx + dy + 1 == size);
                canvas.put_pixel(x + dx, y + dy, if on_cross { mark } else { fill });
            }
        }
    }

    /// Render `layout` to a PNG at `output` plus a JSON manifest beside it
    pub async fn render<F: ResourceFetcher>(
        &self,
        layout: &GridLayout,
        fetcher: &F,
        output: &Path,
    ) -> Result<RenderReport, RenderError> {
        if layout.is_empty() {
            return Err(RenderError::EmptyLayout);
        }

        let size = self.config.cell_size;
        let pad = self.config.padding;
        let too_large = || RenderError::CanvasTooLarge {
            rows: layout.num_rows(),
            columns: layout.num_columns(),
            cell_size: size,
        };
        let width = canvas_extent(layout.num_columns(), size, pad).ok_or_else(too_large)?;
        let height = canvas_extent(layout.num_rows(), size, pad).ok_or_else(too_large)?;
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(too_large)?;

        let tiles = self.load_tiles(layout, fetcher).await;

        let mut canvas = RgbImage::from_pixel(width, height, Rgb(self.config.background));

        let mut cells = Vec::with_capacity(layout.num_rows() * layout.num_columns());
        let (mut ok, mut empty, mut failed) = (0, 0, 0);

        for (r, row) in layout.cells.iter().enumerate() {
            for (c, reference) in row.iter().enumerate().take(layout.num_columns()) {
                let x = pad + c as u32 * (size + pad);
                let y = pad + r as u32 * (size + pad);
                let reference = reference.as_deref();

                let (status, reason) = match reference.and_then(|key| tiles.get(key)) {
                    Some(Ok(tile)) => {
                        let ox = x + (size - tile.width().min(size)) / 2;
                        let oy = y + (size - tile.height().min(size)) / 2;
                        imageops::overlay(&mut canvas, tile, ox as i64, oy as i64);
                        ok += 1;
                        ("ok", None)
                    }
                    Some(Err(e)) => {
                        self.draw_placeholder(&mut canvas, x, y, true);
                        failed += 1;
                        ("failed", Some(e.to_string()))
                    }
                    None => {
                        self.draw_placeholder(&mut canvas, x, y, false);
                        empty += 1;
                        ("empty", None)
                    }
                };
                cells.push(ManifestCell {
                    row: r,
                    column: c,
                    reference,
                    status,
                    reason,
                });
            }
        }

        let mut png = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        write_atomic(output, &png)?;

        let manifest_path = Self::manifest_path(output);
        let manifest = Manifest {
            generated_at: Utc::now().to_rfc3339(),
            image: output.display().to_string(),
            cell_size: size,
            rows: &layout.row_titles,
            columns: &layout.column_titles,
            cells,
        };
        write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;

        info!(output = %output.display(), ok, empty, failed, "comparison grid rendered");
        Ok(RenderReport {
            output: output.to_path_buf(),
            manifest: manifest_path,
            ok,
            empty,
            failed,
        })
    }
}

/// Pixels spanned by `cells` tiles of `size` with `pad` around each, if it fits
fn canvas_extent(cells: usize, size: u32, pad: u32) -> Option<u32> {
    u32::try_from(cells)
        .ok()?
        .checked_mul(size.checked_add(pad)?)?
        .checked_add(pad)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RenderError> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(data))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => RenderError::Io(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves in-memory resources; "slow" references sleep past any test timeout
    struct MemoryFetcher {
        resources: HashMap<String, Bytes>,
    }

    impl ResourceFetcher for MemoryFetcher {
        async fn fetch(&self, reference: &str) -> Result<Bytes, RenderError> {
            if reference.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.resources
                .get(reference)
                .cloned()
                .ok_or_else(|| RenderError::Status {
                    reference: reference.to_string(),
                    status: 404,
                })
        }
    }

    fn png(width: u32, height: u32, color: [u8; 3]) -> Bytes {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        Bytes::from(buf)
    }

    fn fetcher() -> MemoryFetcher {
        let mut resources = HashMap::new();
        resources.insert("red".to_string(), png(40, 20, [255, 0, 0]));
        resources.insert("blue".to_string(), png(10, 10, [0, 0, 255]));
        resources.insert("garbage".to_string(), Bytes::from_static(b"not an image"));
        resources.insert("slow".to_string(), png(4, 4, [0, 255, 0]));
        MemoryFetcher { resources }
    }

    fn config() -> PresenterConfig {
        PresenterConfig {
            cell_size: 32,
            padding: 2,
            concurrency: 2,
            timeout: Duration::from_millis(100),
            ..PresenterConfig::default()
        }
    }

    fn layout(cells: Vec<Vec<Option<&str>>>) -> GridLayout {
        GridLayout {
            row_titles: (0..cells.len()).map(|i| format!("r{i}")).collect(),
            column_titles: (0..cells[0].len()).map(|i| format!("c{i}")).collect(),
            cells: cells
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_render_grid_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grid.png");
        let layout = layout(vec![
            vec![Some("red"), Some("blue")],
            vec![Some("blue"), None],
        ]);

        let report = Presenter::new(config())
            .render(&layout, &fetcher(), &output)
            .await
            .unwrap();
        assert_eq!((report.ok, report.empty, report.failed), (3, 1, 0));

        let img = image::open(&output).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2 * 34 + 2, 2 * 34 + 2));
        // center of the first tile is red
        let center = img.get_pixel(2 + 16, 2 + 16);
        assert!(center[0] > 200 && center[2] < 50);
        // empty cell is placeholder grey
        assert_eq!(img.get_pixel(34 + 2 + 5, 34 + 2 + 16), &Rgb([220, 220, 220]));

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&report.manifest).unwrap()).unwrap();
        assert_eq!(manifest["rows"][1], "r1");
        assert_eq!(manifest["cells"].as_array().unwrap().len(), 4);
        assert_eq!(manifest["cells"][3]["status"], "empty");
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grid.png");
        let layout = layout(vec![vec![Some("red"), Some("missing"), Some("garbage"), Some("slow")]]);

        let report = Presenter::new(config())
            .render(&layout, &fetcher(), &output)
            .await
            .unwrap();
        assert_eq!((report.ok, report.empty, report.failed), (1, 0, 3));

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&report.manifest).unwrap()).unwrap();
        let cells = manifest["cells"].as_array().unwrap();
        assert_eq!(cells[1]["status"], "failed");
        assert!(cells[1]["reason"].as_str().unwrap().contains("404"));
        assert!(cells[2]["reason"].as_str().unwrap().contains("decode"));
        assert!(cells[3]["reason"].as_str().unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_empty_layout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GridLayout {
            row_titles: vec!["original".to_string()],
            column_titles: vec![],
            cells: vec![vec![]],
        };
        let err = Presenter::new(config())
            .render(&layout, &fetcher(), &dir.path().join("grid.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyLayout));
    }

    /// Records the highest number of fetches running at once
    struct CountingFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        tile: Bytes,
    }

    impl ResourceFetcher for CountingFetcher {
        async fn fetch(&self, _reference: &str) -> Result<Bytes, RenderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.tile.clone())
        }
    }

    #[tokio::test]
    async fn test_fetches_bounded_by_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let references: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        let layout = layout(vec![references.iter().map(|r| Some(r.as_str())).collect()]);
        let fetcher = CountingFetcher {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            tile: png(4, 4, [0, 255, 0]),
        };

        let config = config();
        let report = Presenter::new(config.clone())
            .render(&layout, &fetcher, &dir.path().join("grid.png"))
            .await
            .unwrap();
        assert_eq!(report.ok, 10);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), config.concurrency);
        assert_eq!(fetcher.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_canvas_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(vec![vec![Some("red"), Some("blue"), Some("red")]]);
        let config = PresenterConfig {
            cell_size: u32::MAX / 2,
            ..config()
        };
        let output = dir.path().join("grid.png");
        let err = Presenter::new(config)
            .render(&layout, &fetcher(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::CanvasTooLarge { columns: 3, .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_canvas_extent() {
        assert_eq!(canvas_extent(2, 32, 2), Some(70));
        assert_eq!(canvas_extent(0, 32, 2), Some(2));
        assert_eq!(canvas_extent(3, u32::MAX / 2, 8), None);
        assert_eq!(canvas_extent(1, u32::MAX, 1), None);
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            Presenter::manifest_path(Path::new("out/grid.png")),
            PathBuf::from("out/grid.png.json")
        );
    }

    #[test]
    fn test_config_timeout_in_millis() {
        let cfg: PresenterConfig = serde_json::from_str(r#"{"timeout_ms": 250, "cell_size": 64}"#).unwrap();
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert_eq!(cfg.cell_size, 64);
        assert_eq!(cfg.concurrency, 8);
    }
}
