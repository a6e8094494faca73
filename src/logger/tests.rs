//! Unit tests for loggers, the registry and the severity methods.

use super::*;
use crate::exception_schema::ExceptionPayload;
use crate::formatter::{PercentFormatter, SharedFormatter};
use crate::handler::HandlerError;
use crate::test_utils::CollectingHandler;
use rstest::{fixture, rstest};
use std::any::Any;

struct FailingHandler;

impl FemtoHandlerTrait for FailingHandler {
    fn handle(&self, _record: FemtoLogRecord) -> Result<(), HandlerError> {
        Err(HandlerError::Closed)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[fixture]
fn registry() -> LoggerRegistry {
    LoggerRegistry::new()
}

fn attach(logger: &FemtoLogger) -> CollectingHandler {
    let handler = CollectingHandler::new();
    logger.add_handler(Arc::new(handler.clone()));
    handler
}

fn padded_handler(format: &str) -> CollectingHandler {
    let handler = CollectingHandler::new();
    handler
        .core()
        .set_formatter(SharedFormatter::new(PercentFormatter::new(format)));
    handler
}

#[rstest]
fn child_inherits_root_level(registry: LoggerRegistry) {
    let child = registry.get_logger("app.db").unwrap();
    assert_eq!(child.level(), FemtoLevel::ALL);
    assert_eq!(child.effective_level(), FemtoLevel::WARNING);
    assert!(!child.is_enabled_for(FemtoLevel::INFO));

    registry.get_logger("app").unwrap().set_level(FemtoLevel::DEBUG);
    assert_eq!(child.effective_level(), FemtoLevel::DEBUG);
}

#[rstest]
fn detached_logger_accepts_everything() {
    let logger = FemtoLogger::new("solo");
    assert_eq!(logger.effective_level(), FemtoLevel::ALL);
    assert!(logger.is_enabled_for(FemtoLevel::GARBAGE));
}

#[rstest]
fn records_propagate_to_ancestors(registry: LoggerRegistry) {
    let root_handler = attach(&registry.root());
    let child = registry.get_logger("svc.worker").unwrap();
    let child_handler = attach(&child);

    assert!(child.log(FemtoLevel::ERROR, "bad"));
    assert_eq!(root_handler.messages(), vec!["bad"]);
    assert_eq!(child_handler.messages(), vec!["bad"]);

    child.set_propagate(false);
    assert!(child.log(FemtoLevel::ERROR, "local"));
    assert_eq!(root_handler.messages(), vec!["bad"]);
    assert_eq!(child_handler.messages(), vec!["bad", "local"]);
}

#[rstest]
fn ancestor_level_does_not_gate_propagated_records(registry: LoggerRegistry) {
    let root = registry.root();
    root.set_level(FemtoLevel::ERROR);
    let root_handler = attach(&root);
    let child = registry.get_logger("chatty").unwrap();
    child.set_level(FemtoLevel::DEBUG);

    assert!(child.log(FemtoLevel::DEBUG, "details"));
    assert_eq!(root_handler.messages(), vec!["details"]);
}

#[rstest]
fn failing_handler_does_not_block_others() {
    let logger = FemtoLogger::new("mixed");
    logger.add_handler(Arc::new(FailingHandler));
    let handler = attach(&logger);
    assert!(logger.log(FemtoLevel::INFO, "still delivered"));
    assert_eq!(handler.messages(), vec!["still delivered"]);
}

#[rstest]
fn remove_handler_matches_identity() {
    let logger = FemtoLogger::new("rm");
    let first: Arc<dyn FemtoHandlerTrait> = Arc::new(CollectingHandler::new());
    let second: Arc<dyn FemtoHandlerTrait> = Arc::new(CollectingHandler::new());
    logger.add_handler(Arc::clone(&first));
    logger.add_handler(Arc::clone(&second));

    assert!(logger.remove_handler(&first));
    assert!(!logger.remove_handler(&first));
    assert_eq!(logger.handlers().len(), 1);
    logger.clear_handlers();
    assert!(!logger.has_handlers());
}

#[rstest]
fn builder_rejects_two_exceptions() {
    let logger = FemtoLogger::new("exc");
    let err = logger
        .record(FemtoLevel::ERROR, "both")
        .exc_info(ExceptionPayload::new("ValueError", "a"))
        .exc_info_on_level(ExceptionPayload::new("ValueError", "b"), FemtoLevel::DEBUG)
        .emit()
        .unwrap_err();
    assert_eq!(err, LoggingError::ConflictingExceptionInfo);
}

#[rstest]
fn builder_attaches_args_extras_and_location() {
    let logger = FemtoLogger::new("built");
    let handler = attach(&logger);
    let emitted = logger
        .record(FemtoLevel::INFO, "user %s logged in")
        .args(["alice"])
        .extra("request_id", 42_i64)
        .location("app::auth", "src/auth.rs", 17)
        .emit()
        .unwrap();
    assert!(emitted);

    let records = handler.collected();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message(), "user alice logged in");
    assert!(records[0].metadata.key_values.contains_key("request_id"));
    assert_eq!(records[0].metadata.filename, "src/auth.rs");
    assert_eq!(records[0].metadata.line_number, 17);
}

#[rstest]
#[case::verbose_handler(FemtoLevel::DEBUG, true)]
#[case::quiet_handler(FemtoLevel::INFO, false)]
fn tagged_exception_follows_handler_level(#[case] handler_level: FemtoLevel, #[case] shown: bool) {
    let logger = FemtoLogger::new("tagged");
    let handler = CollectingHandler::with_level(handler_level);
    logger.add_handler(Arc::new(handler.clone()));

    logger
        .record(FemtoLevel::ERROR, "request failed")
        .exc_info_on_level(ExceptionPayload::new("ValueError", "boom"), FemtoLevel::DEBUG)
        .emit()
        .unwrap();

    let lines = handler.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("request failed"));
    assert_eq!(lines[0].contains("ValueError: boom"), shown);
}

#[rstest]
fn disabled_builder_is_not_dispatched(registry: LoggerRegistry) {
    let logger = registry.get_logger("quietly").unwrap();
    let handler = attach(&logger);
    assert!(!logger.record(FemtoLevel::DEBUG, "hidden").emit().unwrap());
    assert!(handler.messages().is_empty());
}

#[rstest]
#[case("")]
#[case(".leading")]
#[case("trailing.")]
#[case("double..dot")]
fn invalid_names_are_rejected(registry: LoggerRegistry, #[case] name: &str) {
    assert_eq!(
        registry.get_logger(name).unwrap_err(),
        LoggingError::InvalidLoggerName(name.to_owned())
    );
}

#[rstest]
fn registry_links_dotted_ancestors(registry: LoggerRegistry) {
    let leaf = registry.get_logger("a.b.c").unwrap();
    assert_eq!(registry.logger_names(), vec!["a", "a.b", "a.b.c"]);

    let parent = leaf.parent().unwrap();
    assert_eq!(parent.name(), "a.b");
    assert_eq!(parent.parent().unwrap().name(), "a");
    assert_eq!(
        parent.parent().unwrap().parent().unwrap().name(),
        ROOT_LOGGER_NAME
    );
    assert!(Arc::ptr_eq(&registry.get_logger("a.b").unwrap(), parent));
    assert!(Arc::ptr_eq(&registry.get_logger("root").unwrap(), &registry.root()));
}

#[rstest]
fn new_names_widen_attached_handlers(registry: LoggerRegistry) {
    let handler = padded_handler("%(name)-5s|%(message)s");
    registry.root().add_handler(Arc::new(handler.clone()));

    registry.get_logger("service.http").unwrap();
    assert_eq!(registry.name_width(), 12);

    let short = registry.get_logger("a").unwrap();
    short.log(FemtoLevel::ERROR, "m");
    assert_eq!(handler.lines(), vec![format!("{:<12}|m", "a")]);
}

#[rstest]
fn alignment_is_idempotent_and_skips_plain_formats(registry: LoggerRegistry) {
    registry.get_logger("component").unwrap();
    let padded = padded_handler("%(name)-4s %(message)s");
    let plain = padded_handler("%(name)s %(message)s");
    let root = registry.root();
    root.add_handler(Arc::new(padded.clone()));
    root.add_handler(Arc::new(plain.clone()));

    assert_eq!(registry.align_handlers(), 1);
    assert_eq!(registry.align_handlers(), 0);

    root.log(FemtoLevel::ERROR, "x");
    assert_eq!(padded.lines(), vec![format!("{:<9} x", "root")]);
    assert_eq!(plain.lines(), vec!["root x".to_owned()]);
}

#[rstest]
fn name_width_is_capped(registry: LoggerRegistry) {
    let long = "x".repeat(120);
    registry.get_logger(&long).unwrap();
    assert_eq!(registry.name_width(), crate::formatter::MAX_NAME_WIDTH);
}

#[rstest]
fn set_levels_creates_and_configures(registry: LoggerRegistry) {
    let levels = BTreeMap::from([
        ("noisy.lib".to_owned(), FemtoLevel::ERROR),
        ("mine".to_owned(), FemtoLevel::TRACE),
    ]);
    registry.set_levels(&levels).unwrap();
    assert_eq!(registry.get_logger("noisy.lib").unwrap().level(), FemtoLevel::ERROR);
    assert_eq!(registry.get_logger("mine").unwrap().effective_level(), FemtoLevel::TRACE);
    assert_eq!(registry.get_logger("noisy").unwrap().level(), FemtoLevel::ALL);
}

#[rstest]
fn severity_methods_cover_the_ladder() {
    let logger = Arc::new(FemtoLogger::new("sev"));
    let handler = attach(&logger);

    assert!(logger.garbage("g"));
    assert!(logger.trace("t"));
    assert!(logger.debug("d"));
    assert!(logger.profile("p"));
    assert!(logger.info("i"));
    assert!(logger.warning("w"));
    assert!(logger.error("e"));
    assert!(logger.critical("c"));

    let levels: Vec<FemtoLevel> = handler.collected().iter().map(|r| r.level()).collect();
    assert_eq!(
        levels,
        vec![
            FemtoLevel::GARBAGE,
            FemtoLevel::TRACE,
            FemtoLevel::DEBUG,
            FemtoLevel::PROFILE,
            FemtoLevel::INFO,
            FemtoLevel::WARNING,
            FemtoLevel::ERROR,
            FemtoLevel::CRITICAL,
        ]
    );
}

#[rstest]
fn severity_methods_respect_the_gate() {
    let logger = FemtoLogger::new("gated");
    logger.set_level(FemtoLevel::PROFILE);
    let handler = attach(&logger);
    assert!(!logger.trace("dropped"));
    assert!(logger.profile("kept"));
    assert_eq!(handler.messages(), vec!["kept"]);
}
