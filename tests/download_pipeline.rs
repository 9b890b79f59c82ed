//! Download stage tests against an in-memory asset source

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use sanity_cache::{CacheManager, Region};
use sanity_pack::download::published_name;
use sanity_pack::{
    AssetSource, Config, Downloader, FetchError, Manifest, ManifestEntry, MirrorSource,
    PipelineError, RemoteVersion, ServerConfig,
};

/// Source holding one release per region, recording every asset fetch.
#[derive(Default)]
struct MemorySource {
    version: Option<RemoteVersion>,
    entries: Vec<ManifestEntry>,
    payloads: BTreeMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl MemorySource {
    fn release(resource: &str) -> Self {
        Self {
            version: Some(RemoteVersion {
                resource: resource.to_string(),
                client: "2.4.01".to_string(),
            }),
            ..Self::default()
        }
    }

    fn with_asset(mut self, name: &str, hash: &str, payload: &[u8]) -> Self {
        self.entries.push(ManifestEntry {
            name: name.to_string(),
            hash: hash.to_string(),
        });
        self.payloads.insert(published_name(name), payload.to_vec());
        self
    }

    fn with_failing(mut self, name: &str, hash: &str) -> Self {
        self.entries.push(ManifestEntry {
            name: name.to_string(),
            hash: hash.to_string(),
        });
        self.failing.insert(published_name(name));
        self
    }

    fn fetched(&self) -> Vec<String> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

impl AssetSource for MemorySource {
    fn fetch_version(&self, _region: Region) -> Result<RemoteVersion, FetchError> {
        self.version
            .clone()
            .ok_or_else(|| FetchError::Transport("version endpoint unreachable".to_string()))
    }

    fn fetch_manifest(&self, _region: Region, _resource: &str) -> Result<Manifest, FetchError> {
        Ok(Manifest {
            entries: self.entries.clone(),
        })
    }

    fn fetch_asset(&self, _region: Region, _resource: &str, published: &str) -> Result<Vec<u8>, FetchError> {
        self.fetched.lock().unwrap().push(published.to_string());
        if self.failing.contains(published) {
            return Err(FetchError::Transport("connection reset".to_string()));
        }
        self.payloads
            .get(published)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(published.to_string()))
    }
}

fn config_in(temp: &TempDir) -> Config {
    Config {
        output_dir: temp.path().join("assets"),
        cache_dir: temp.path().join("cache"),
        concurrency: 4,
        ..Config::default()
    }
}

fn zipped(contents: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("payload", SimpleFileOptions::default()).unwrap();
    writer.write_all(contents).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_second_run_downloads_nothing() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::release("24-06-01")
        .with_asset("gamedata/excel/item_table.ab", "h1", &zipped(b"items"))
        .with_asset("gamedata/excel/skill_table.ab", "h2", b"skills")
        .with_asset("audio/bgm.ab", "h3", b"music");

    let first = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(first.downloaded, 3);
    assert!(first.version_changed);
    caches.save_all().unwrap();

    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let second = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.unchanged, 3);
    assert!(!second.version_changed);
    assert_eq!(source.fetched().len(), 3);
}

#[test]
fn test_payloads_land_at_asset_paths() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::release("r1")
        .with_asset("gamedata/excel/item_table.ab", "h1", &zipped(b"items"))
        .with_asset("avg/bg#2.bin", "h2", b"raw-bytes");

    let report = Downloader::new(&source, &caches, &config).run(Region::Jp).unwrap();

    let region_dir = temp.path().join("assets/jp");
    assert_eq!(fs::read(region_dir.join("gamedata/excel/item_table.ab")).unwrap(), b"items");
    assert_eq!(fs::read(region_dir.join("avg/bg#2.bin")).unwrap(), b"raw-bytes");
    assert_eq!(report.bytes_written, 14);
    assert_eq!(report.folders["gamedata"], 5);
    assert_eq!(report.folders["avg"], 9);

    let version = caches.versions().read(|v| v.get_version(Region::Jp).cloned()).unwrap();
    assert_eq!(version.resource, "r1");
    assert_eq!(version.folders["gamedata"], 5);
}

#[test]
fn test_refetched_asset_is_not_counted_twice_in_folder_sizes() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();

    let first = MemorySource::release("r1").with_asset("audio/bgm.ab", "h1", &[1u8; 10]);
    Downloader::new(&first, &caches, &config).run(Region::Cn).unwrap();
    let second = MemorySource::release("r2").with_asset("audio/bgm.ab", "h2", &[2u8; 10]);
    let report = Downloader::new(&second, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(report.downloaded, 1);

    let on_disk = fs::metadata(temp.path().join("assets/cn/audio/bgm.ab")).unwrap().len();
    let version = caches.versions().read(|v| v.get_version(Region::Cn).cloned()).unwrap();
    assert_eq!(version.resource, "r2");
    assert_eq!(version.folders["audio"], on_disk);
    assert_eq!(version.total_folder_bytes(), 10);
}

#[test]
fn test_failed_fetch_is_not_cached_and_retried() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::release("r1")
        .with_asset("a/ok.ab", "h1", b"ok")
        .with_failing("a/broken.ab", "h2");

    let report = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 1);
    caches.assets().read(|a| {
        assert!(a.has_asset(Region::Cn, "a/ok.ab"));
        assert!(!a.has_asset(Region::Cn, "a/broken.ab"));
    });

    let again = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.failed, 1);
}

#[test]
fn test_changed_hash_is_refetched() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    caches.assets().update(|a| {
        a.set_hash(Region::Cn, "a/one.ab", "old");
        a.set_hash(Region::Cn, "a/two.ab", "same");
    });
    let source = MemorySource::release("r2")
        .with_asset("a/one.ab", "new", b"1")
        .with_asset("a/two.ab", "same", b"2");

    let report = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(source.fetched(), vec![published_name("a/one.ab")]);
    assert_eq!(
        caches.assets().read(|a| a.get_hash(Region::Cn, "a/one.ab").map(str::to_string)),
        Some("new".to_string())
    );
}

#[test]
fn test_whitelist_filters_assets() {
    let temp = TempDir::new().unwrap();
    let mut config = config_in(&temp);
    config.servers.insert(
        Region::En,
        ServerConfig {
            enabled: true,
            path_whitelist: vec!["gamedata/excel".to_string()],
        },
    );
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::release("r1")
        .with_asset("gamedata/excel/item_table.ab", "h1", b"x")
        .with_asset("audio/bgm.ab", "h2", b"y");

    let report = Downloader::new(&source, &caches, &config).run(Region::En).unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.filtered, 1);
    assert!(!Path::new(&temp.path().join("assets/en/audio/bgm.ab")).exists());
}

#[test]
fn test_unreachable_version_fails_region() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::default();

    let err = Downloader::new(&source, &caches, &config).run(Region::Kr).unwrap_err();
    assert!(matches!(err, PipelineError::Version(_)));
    assert!(caches.versions().read(|v| v.is_empty()));
}

#[test]
fn test_mirror_source_end_to_end() {
    let temp = TempDir::new().unwrap();
    let mirror = temp.path().join("mirror");
    let res = mirror.join("CN/assets/24-07-15");
    fs::create_dir_all(&res).unwrap();
    fs::write(
        mirror.join("CN/version.json"),
        r#"{"resVersion": "24-07-15", "clientVersion": "2.3.0"}"#,
    )
    .unwrap();
    fs::write(
        res.join("hot_update_list.json"),
        r#"{"versionId": "24-07-15", "abInfos": [{"name": "gamedata/excel/stage_table.ab", "md5": "m1"}]}"#,
    )
    .unwrap();
    fs::write(res.join("gamedata_excel_stage_table.dat"), zipped(b"stages")).unwrap();

    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MirrorSource::new(&mirror);

    let report = Downloader::new(&source, &caches, &config).run(Region::Cn).unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(
        fs::read(temp.path().join("assets/cn/gamedata/excel/stage_table.ab")).unwrap(),
        b"stages"
    );
    assert_eq!(
        caches.assets().read(|a| a.get_hash(Region::Cn, "gamedata/excel/stage_table.ab").map(str::to_string)),
        Some("m1".to_string())
    );
}

#[test]
fn test_pipeline_run_persists_caches_after_all_regions() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let caches = CacheManager::new(&config.cache_dir).unwrap();
    let source = MemorySource::release("r9").with_asset("a/x.ab", "h1", b"x");
    let history = sanity_schema::mock::MockHistory::linear(&["c1"]);
    let decoder = sanity_schema::mock::MockDecoder::always();
    let ctx = sanity_pack::StageContext {
        config: &config,
        caches: &caches,
        source: Some(&source as &dyn AssetSource),
        history: &history,
        decoder: &decoder,
        force: false,
    };

    let summary =
        sanity_pack::pipeline::run(&ctx, &[Region::Cn, Region::Jp], &[sanity_pack::Stage::Download])
            .unwrap();
    assert_eq!(summary.exit_code, 0);
    assert_eq!(summary.succeeded, 2);

    let reopened = CacheManager::new(&config.cache_dir).unwrap();
    reopened.assets().read(|a| {
        assert_eq!(a.get_hash(Region::Cn, "a/x.ab"), Some("h1"));
        assert_eq!(a.get_hash(Region::Jp, "a/x.ab"), Some("h1"));
    });
    assert_eq!(
        reopened.versions().read(|v| v.get_version(Region::Jp).map(|s| s.resource.clone())),
        Some("r9".to_string())
    );
}
