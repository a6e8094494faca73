//! Loading pipeline configuration from INI files on disk.

use std::io::Write;
use std::sync::Arc;

use femtorelay::{
    ConfigError, DeferredHandlerBuilder, ExitHooks, FemtoLevel, HandlerKind, LoggerRegistry,
    LoggingPipeline, PipelineConfig,
};
use rstest::rstest;
use tempfile::NamedTempFile;

fn ini_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(bytes).expect("write config");
    file.flush().expect("flush config");
    file
}

#[rstest]
fn utf8_file_is_loaded() {
    let file = ini_file(
        b"[console]\nlevel = debug\ntarget = stdout\n\n[levels]\nsalt.loaded = trace\n",
    );
    let config = PipelineConfig::from_ini_file(file.path()).unwrap();
    let console = config.console.unwrap();
    assert_eq!(console.kind, HandlerKind::Stream);
    assert_eq!(console.level, Some(FemtoLevel::DEBUG));
    assert_eq!(config.granular_levels["salt.loaded"], FemtoLevel::TRACE);
}

#[rstest]
fn latin1_file_needs_its_encoding() {
    let file = ini_file(b"[console]\nformat = caf\xE9 %(message)s\n");

    assert!(matches!(
        PipelineConfig::from_ini_file(file.path()).unwrap_err(),
        ConfigError::Decode { .. }
    ));
    let config = PipelineConfig::from_ini_file_with_encoding(file.path(), Some("latin1")).unwrap();
    assert_eq!(
        config.console.unwrap().format.as_deref(),
        Some("caf\u{e9} %(message)s")
    );
}

#[rstest]
fn empty_and_missing_files_are_errors() {
    let empty = ini_file(b"");
    assert!(matches!(
        PipelineConfig::from_ini_file(empty.path()).unwrap_err(),
        ConfigError::EmptyFile(_)
    ));

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.ini");
    assert!(matches!(
        PipelineConfig::from_ini_file(&missing).unwrap_err(),
        ConfigError::Io { .. }
    ));
}

#[rstest]
fn file_configuration_drives_the_pipeline() {
    let file = ini_file(b"[console]\nlevel = info\ntarget = stderr\n\n[levels]\nchatty = debug\n");
    let config = PipelineConfig::from_ini_file(file.path()).unwrap();

    let hooks = Arc::new(ExitHooks::new());
    let pipeline = LoggingPipeline::bootstrap_with(
        Arc::new(LoggerRegistry::new()),
        DeferredHandlerBuilder::new().with_max_size(config.deferred_max_size),
        Arc::clone(&hooks),
    )
    .unwrap();
    pipeline.configure(&config).unwrap();

    assert_eq!(pipeline.handlers().len(), 1);
    assert_eq!(pipeline.lowest_level(), Some(FemtoLevel::DEBUG));
    assert_eq!(
        pipeline.registry().get_logger("chatty").unwrap().level(),
        FemtoLevel::DEBUG
    );
    assert!(hooks.is_empty());
    pipeline.shutdown();
}
