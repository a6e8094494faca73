//! End-to-end behaviour of the bootstrap pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use femtorelay::test_utils::SharedBuf;
use femtorelay::{
    DeferredHandlerBuilder, ExitGuard, ExitHooks, FemtoHandlerTrait, FemtoLevel,
    HandlerBuilderTrait, LoggerRegistry, LoggingPipeline, SeverityMethods, StreamHandlerBuilder,
    femtolog_info, femtolog_warning,
};
use rstest::rstest;

fn pipeline_with(raw: &SharedBuf, hooks: &Arc<ExitHooks>) -> LoggingPipeline {
    LoggingPipeline::bootstrap_with(
        Arc::new(LoggerRegistry::new()),
        DeferredHandlerBuilder::new().with_stream(raw.clone()),
        Arc::clone(hooks),
    )
    .expect("bootstrap")
}

fn message_stream(buf: &SharedBuf, level: FemtoLevel) -> Arc<dyn FemtoHandlerTrait> {
    StreamHandlerBuilder::writer(buf.clone())
        .with_level(level)
        .with_format("%(message)s")
        .build()
        .expect("stream handler")
}

#[rstest]
fn records_logged_before_configuration_reach_the_console() {
    let raw = SharedBuf::default();
    let hooks = Arc::new(ExitHooks::new());
    let pipeline = pipeline_with(&raw, &hooks);
    let logger = pipeline.registry().get_logger("salt.minion").expect("logger");

    femtolog_warning!(logger, "Foo");
    let console = SharedBuf::default();
    pipeline
        .activate(vec![message_stream(&console, FemtoLevel::INFO)], &BTreeMap::new())
        .expect("activate");
    femtolog_info!(logger, "{}", "Bar");
    logger.debug("hidden");

    assert_eq!(console.contents_string(), "Foo\nBar\n");
    assert!(raw.contents().is_empty());
    drop(ExitGuard::new(Arc::clone(&hooks)));
    assert!(raw.contents().is_empty());
}

#[rstest]
fn unconfigured_pipeline_flushes_raw_records_at_exit() {
    let raw = SharedBuf::default();
    let hooks = Arc::new(ExitHooks::new());
    let pipeline = pipeline_with(&raw, &hooks);
    let logger = pipeline.registry().get_logger("early").expect("logger");
    logger.trace("looking for config");
    logger.error("config missing");

    drop(ExitGuard::new(Arc::clone(&hooks)));

    assert_eq!(
        raw.contents_string(),
        "[TRACE   ] looking for config\n[ERROR   ] config missing\n"
    );
    assert!(hooks.has_run());
    drop(pipeline);
}

#[rstest]
fn replayed_records_honour_each_handler_level() {
    let hooks = Arc::new(ExitHooks::new());
    let pipeline = pipeline_with(&SharedBuf::default(), &hooks);
    let logger = pipeline.registry().get_logger("app.db").expect("logger");
    logger.debug("connecting");
    logger.error("refused");

    let verbose = SharedBuf::default();
    let quiet = SharedBuf::default();
    pipeline
        .activate(
            vec![
                message_stream(&verbose, FemtoLevel::DEBUG),
                message_stream(&quiet, FemtoLevel::ERROR),
            ],
            &BTreeMap::from([("app.db".to_owned(), FemtoLevel::DEBUG)]),
        )
        .expect("activate");

    assert_eq!(verbose.contents_string(), "connecting\nrefused\n");
    assert_eq!(quiet.contents_string(), "refused\n");
    assert_eq!(pipeline.registry().root().level(), FemtoLevel::DEBUG);
}

#[rstest]
fn logger_names_are_padded_to_the_longest_seen() {
    let hooks = Arc::new(ExitHooks::new());
    let pipeline = pipeline_with(&SharedBuf::default(), &hooks);
    let console = SharedBuf::default();
    let handler = StreamHandlerBuilder::writer(console.clone())
        .with_level(FemtoLevel::INFO)
        .with_format("%(name)-1s|%(message)s")
        .build()
        .expect("stream handler");
    pipeline
        .activate(vec![handler], &BTreeMap::new())
        .expect("activate");

    let short = pipeline.registry().get_logger("a").expect("logger");
    short.info("one");
    let long = pipeline.registry().get_logger("a.much.longer").expect("logger");
    long.info("two");
    short.info("three");

    let expected = format!("a|one\na.much.longer|two\n{:<13}|three\n", "a");
    assert_eq!(console.contents_string(), expected);
}
