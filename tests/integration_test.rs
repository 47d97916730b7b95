/// Integration tests for the detector pipeline
///
/// Bundle extraction, configuration, session lifecycle and the streaming
/// listener are exercised against a mocked engine. Tests against the real
/// engine are ignored by default; they need the vendor bundle, a valid
/// `PORCUPINE_ACCESS_KEY` and the audio samples.

use mockall::mock;
use porcupine::{
    BuiltinKeyword, BundleDirectory, DetectorConfig, EngineHandle, KeywordListener, NativeEngine,
    OsFamily, PlatformDescriptor, Porcupine, PorcupineError, PvStatus, ResourceCache, Runtime, RuntimeOptions,
    SessionState, StaticLoader, NO_DETECTION,
};
use std::f32::consts::PI;
use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use tempfile::TempDir;

mock! {
    pub Engine {}

    impl NativeEngine for Engine {
        fn init(
            &self,
            access_key: &str,
            model_path: &Path,
            keyword_paths: &[PathBuf],
            sensitivities: &[f32],
        ) -> porcupine::Result<EngineHandle>;
        fn process(&self, handle: &EngineHandle, frame: &[i16]) -> porcupine::Result<i32>;
        fn delete(&self, handle: EngineHandle);
        fn frame_length(&self) -> usize;
        fn sample_rate(&self) -> u32;
        fn version(&self) -> String;
    }
}

const FRAME_LENGTH: usize = 512;
const SAMPLE_RATE: u32 = 16000;

const LINUX_KEYWORDS: [&str; 4] = ["alexa", "bumblebee", "hey google", "porcupine"];

fn fake_handle() -> EngineHandle {
    unsafe { EngineHandle::from_raw(NonNull::<c_void>::dangling().as_ptr()) }.unwrap()
}

/// Lay out a bundle for `platform` on disk.
fn write_bundle(root: &Path, platform: &PlatformDescriptor) {
    let write = |logical: &str, bytes: &[u8]| {
        let path = logical.split('/').fold(root.to_path_buf(), |p, s| p.join(s));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    };

    write(&platform.library_resource_path(), b"engine library");
    write("lib/common/porcupine_params.pv", b"model parameters");
    for keyword in LINUX_KEYWORDS {
        write(
            &format!("{}/{}_{}.ppn", platform.keyword_resource_dir(), keyword, platform.os_family),
            keyword.as_bytes(),
        );
    }
}

fn linux_runtime(dir: &TempDir, engine: MockEngine) -> Arc<Runtime> {
    let platform = PlatformDescriptor::new(OsFamily::Linux, "x86_64");
    let bundle_root = dir.path().join("bundle");
    write_bundle(&bundle_root, &platform);

    let runtime = Runtime::from_source(
        platform,
        &BundleDirectory::new(&bundle_root),
        ResourceCache::new(dir.path().join("cache")),
    )
    .unwrap()
    .with_loader(Arc::new(StaticLoader::new(Arc::new(engine))));

    Arc::new(runtime)
}

fn engine_with_constants() -> MockEngine {
    let mut engine = MockEngine::new();
    engine.expect_frame_length().return_const(FRAME_LENGTH);
    engine.expect_sample_rate().return_const(SAMPLE_RATE);
    engine.expect_version().returning(|| "3.0.1".to_string());
    engine
}

/// Generate a sine tone
fn generate_tone(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let sample = amplitude * (2.0 * PI * frequency * t).sin();
            (sample * i16::MAX as f32) as i16
        })
        .collect()
}

#[test]
fn test_bundle_is_extracted_into_hashed_cache() {
    let dir = TempDir::new().unwrap();
    let runtime = linux_runtime(&dir, MockEngine::new());

    let cache_root = dir.path().join("cache");
    assert!(runtime.library_path().starts_with(&cache_root));
    assert!(runtime
        .library_path()
        .ends_with("lib/linux/x86_64/libpv_porcupine.so"));
    assert_eq!(fs::read(runtime.model_path()).unwrap(), b"model parameters");

    let keywords: Vec<BuiltinKeyword> = runtime.builtin_keywords().collect();
    assert_eq!(
        keywords,
        vec![
            BuiltinKeyword::Alexa,
            BuiltinKeyword::Bumblebee,
            BuiltinKeyword::HeyGoogle,
            BuiltinKeyword::Porcupine
        ]
    );

    let hey_google = runtime.keyword_path(BuiltinKeyword::HeyGoogle).unwrap();
    assert_eq!(
        hey_google.file_name().unwrap().to_string_lossy(),
        "hey google_linux.ppn"
    );
}

#[test]
fn test_second_runtime_reuses_cache() {
    let dir = TempDir::new().unwrap();
    let first = linux_runtime(&dir, MockEngine::new());
    let modified = fs::metadata(first.library_path()).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));

    let second = Runtime::from_source(
        PlatformDescriptor::new(OsFamily::Linux, "x86_64"),
        &BundleDirectory::new(dir.path().join("bundle")),
        ResourceCache::new(dir.path().join("cache")),
    )
    .unwrap();

    assert_eq!(first.library_path(), second.library_path());
    assert_eq!(
        fs::metadata(second.library_path()).unwrap().modified().unwrap(),
        modified
    );
}

#[cfg(unix)]
#[test]
fn test_extracted_library_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let runtime = linux_runtime(&dir, MockEngine::new());

    let mode = fs::metadata(runtime.library_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[test]
fn test_runtime_initialize_for_host_platform() {
    let Ok(platform) = PlatformDescriptor::identify() else {
        return;
    };

    let dir = TempDir::new().unwrap();
    write_bundle(&dir.path().join("bundle"), &platform);

    let runtime = Runtime::initialize(RuntimeOptions {
        bundle_dir: dir.path().join("bundle"),
        cache_root: dir.path().join("cache"),
    })
    .unwrap();

    assert_eq!(runtime.platform(), &platform);
    assert!(runtime.keyword_path(BuiltinKeyword::Porcupine).is_some());
}

#[test]
fn test_keyword_indices_follow_resolved_order() {
    let dir = TempDir::new().unwrap();
    let custom = dir.path().join("hey aether_linux.ppn");
    fs::write(&custom, b"custom keyword").unwrap();

    let mut engine = engine_with_constants();
    let expected_custom = custom.clone();
    engine
        .expect_init()
        .withf(move |_, _, paths, sensitivities| {
            paths.len() == 3
                && paths[0] == expected_custom
                && paths[1].ends_with("porcupine_linux.ppn")
                && paths[2].ends_with("alexa_linux.ppn")
                && sensitivities == [0.6, 0.5, 0.4]
        })
        .times(1)
        .returning(|_, _, _, _| Ok(fake_handle()));
    // The frame's first sample says which keyword to report.
    engine
        .expect_process()
        .returning(|_, frame| Ok(i32::from(frame[0]) - 1));
    engine.expect_delete().times(1).return_const(());

    let config = DetectorConfig::new_with_keywords("key", [BuiltinKeyword::Porcupine, BuiltinKeyword::Alexa])
        .keyword_paths([&custom])
        .sensitivities(&[0.6, 0.5, 0.4]);
    let mut porcupine = Porcupine::with_config(linux_runtime(&dir, engine), config).unwrap();

    let mut frame = vec![0i16; FRAME_LENGTH];
    assert_eq!(porcupine.process(&frame).unwrap(), NO_DETECTION);
    frame[0] = 1;
    assert_eq!(porcupine.process(&frame).unwrap(), 0);
    frame[0] = 3;
    assert_eq!(porcupine.process(&frame).unwrap(), 2);

    let labels: Vec<_> = porcupine
        .keyword_paths()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        labels,
        vec!["hey aether_linux.ppn", "porcupine_linux.ppn", "alexa_linux.ppn"]
    );

    porcupine.delete().unwrap();
    assert_eq!(porcupine.state(), SessionState::Deleted);
}

#[test]
fn test_invalid_config_never_loads_engine() {
    let dir = TempDir::new().unwrap();
    let mut engine = MockEngine::new();
    engine.expect_init().never();
    let runtime = linux_runtime(&dir, engine);

    let cases = vec![
        DetectorConfig::new_with_keywords("", ["porcupine"]),
        DetectorConfig::new_with_keywords("key", ["hey aether"]),
        DetectorConfig::new_with_keywords("key", ["jarvis"]),
        DetectorConfig::new_with_keyword_paths("key", [dir.path().join("missing.ppn")]),
        DetectorConfig::new_with_keywords("key", ["porcupine"]).sensitivities(&[f32::NAN]),
        DetectorConfig::new_with_keywords("key", ["porcupine"]).sensitivities(&[]),
        DetectorConfig::new_with_keywords("key", ["porcupine"]).model_path(dir.path().join("missing.pv")),
    ];

    for config in cases {
        let mut porcupine = Porcupine::new(Arc::clone(&runtime));
        let err = porcupine.init(config.clone()).unwrap_err();
        assert!(err.is_invalid_argument(), "{:?} gave {:?}", config, err);
        assert_eq!(porcupine.state(), SessionState::Uninitialized);
    }
}

#[test]
fn test_config_loaded_from_json() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with_constants();
    engine
        .expect_init()
        .withf(|key, _, paths, sensitivities| {
            key == "json-key" && paths.len() == 2 && sensitivities == [0.25, 0.75]
        })
        .times(1)
        .returning(|_, _, _, _| Ok(fake_handle()));
    engine.expect_delete().times(1).return_const(());

    let config: DetectorConfig = serde_json::from_str(
        r#"{"access_key": "json-key", "keywords": ["Hey_Google", "BUMBLEBEE"], "sensitivities": [0.25, 0.75]}"#,
    )
    .unwrap();

    let porcupine = Porcupine::with_config(linux_runtime(&dir, engine), config).unwrap();
    assert_eq!(porcupine.version().unwrap(), "3.0.1");
}

#[test]
fn test_native_activation_error_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with_constants();
    engine.expect_init().times(1).returning(|_, _, _, _| {
        Err(PorcupineError::Native {
            status: PvStatus::ActivationLimitReached,
            message: "Failed to initialize Porcupine".to_string(),
        })
    });

    let mut porcupine = Porcupine::new(linux_runtime(&dir, engine));
    let err = porcupine
        .init(DetectorConfig::new_with_keywords("key", ["alexa"]))
        .unwrap_err();

    assert_eq!(err.status(), Some(PvStatus::ActivationLimitReached));
    assert_eq!(porcupine.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_listener_streams_detections() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with_constants();
    engine
        .expect_init()
        .times(1)
        .returning(|_, _, _, _| Ok(fake_handle()));
    // Loud frames count as a detection of keyword 0.
    engine.expect_process().returning(|_, frame| {
        let peak = frame.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        Ok(if peak > i16::MAX as u16 / 2 { 0 } else { NO_DETECTION })
    });
    engine.expect_delete().times(1).return_const(());

    let porcupine = Porcupine::with_config(
        linux_runtime(&dir, engine),
        DetectorConfig::new_with_keywords("key", ["porcupine"]),
    )
    .unwrap();
    let listener = KeywordListener::new(porcupine).unwrap();
    listener.start().await.unwrap();

    // 1 s silence, then 3 frames of loud tone, then silence again.
    let mut audio = vec![0i16; SAMPLE_RATE as usize];
    let loud_start_frame = audio.len() / FRAME_LENGTH;
    audio.truncate(loud_start_frame * FRAME_LENGTH);
    audio.extend(generate_tone(440.0, (3 * FRAME_LENGTH) as f32 / SAMPLE_RATE as f32, 0.9));
    audio.extend(vec![0i16; SAMPLE_RATE as usize]);

    for chunk in audio.chunks(333) {
        listener.process_audio(chunk).await.unwrap();
    }

    let stats = listener.stats().await;
    assert_eq!(stats.frames_processed as usize, audio.len() / FRAME_LENGTH);
    assert_eq!(stats.keywords_detected, 3);

    listener.shutdown().await.unwrap();

    let mut frames = Vec::new();
    while let Some(event) = listener.recv_event().await {
        assert_eq!(event.keyword_index, 0);
        frames.push(event.frame_index as usize);
    }
    assert_eq!(
        frames,
        vec![loud_start_frame, loud_start_frame + 1, loud_start_frame + 2]
    );
}

// Engine-backed tests

fn audio_sample(name: &str) -> PathBuf {
    let dir = std::env::var_os("PORCUPINE_AUDIO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("data/resources/audio_samples"));
    dir.join(name)
}

fn detections(porcupine: &mut Porcupine, wav: &Path) -> Vec<i32> {
    let mut reader = hound::WavReader::open(wav).unwrap();
    assert_eq!(reader.spec().sample_rate, porcupine.sample_rate().unwrap());
    assert_eq!(reader.spec().channels, 1);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    let frame_length = porcupine.frame_length().unwrap();

    samples
        .chunks_exact(frame_length)
        .map(|frame| porcupine.process(frame).unwrap())
        .filter(|&index| index != NO_DETECTION)
        .collect()
}

fn real_session(keywords: &[BuiltinKeyword]) -> Porcupine {
    let access_key = std::env::var("PORCUPINE_ACCESS_KEY").expect("PORCUPINE_ACCESS_KEY must be set");
    let runtime = Runtime::global().unwrap();
    Porcupine::with_config(runtime, DetectorConfig::new_with_keywords(access_key, keywords.iter())).unwrap()
}

#[test]
#[ignore = "requires the Porcupine engine, an access key and audio samples"]
fn test_engine_detects_single_keyword() {
    let mut porcupine = real_session(&[BuiltinKeyword::Porcupine]);

    assert_eq!(detections(&mut porcupine, &audio_sample("porcupine.wav")), vec![0]);
    assert!(!porcupine.version().unwrap().is_empty());

    porcupine.delete().unwrap();
}

#[test]
#[ignore = "requires the Porcupine engine, an access key and audio samples"]
fn test_engine_detects_multiple_keywords() {
    let mut porcupine = real_session(&[
        BuiltinKeyword::Alexa,
        BuiltinKeyword::Americano,
        BuiltinKeyword::Blueberry,
        BuiltinKeyword::Bumblebee,
        BuiltinKeyword::Grapefruit,
        BuiltinKeyword::Grasshopper,
        BuiltinKeyword::Picovoice,
        BuiltinKeyword::Porcupine,
        BuiltinKeyword::Terminator,
    ]);

    assert_eq!(
        detections(&mut porcupine, &audio_sample("multiple_keywords.wav")),
        vec![7, 0, 1, 2, 3, 4, 5, 6, 7, 8]
    );

    porcupine.delete().unwrap();
}
