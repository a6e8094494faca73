//! The process-wide exit hooks and the guard that runs them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use femtorelay::test_utils::SharedBuf;
use femtorelay::{
    ExitHooks, FemtoDeferredHandler, FemtoHandlerTrait, FemtoLevel, FemtoLogRecord,
    install_exit_guard,
};
use parking_lot::Mutex;
use rstest::rstest;
use serial_test::serial;

#[rstest]
#[serial]
fn dropping_the_guard_runs_global_hooks_newest_first() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let hooks = ExitHooks::global();
    for label in ["first", "second"] {
        let order = Arc::clone(&order);
        hooks.register(move || order.lock().push(label));
    }

    drop(install_exit_guard());

    assert_eq!(*order.lock(), ["second", "first"]);
    assert!(hooks.is_empty());
    assert!(hooks.has_run());
}

#[rstest]
#[serial]
fn a_panicking_hook_does_not_skip_the_rest() {
    let ran = Arc::new(AtomicUsize::new(0));
    let hooks = ExitHooks::global();
    let counter = Arc::clone(&ran);
    hooks.register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    hooks.register(|| panic!("hook failure"));

    drop(install_exit_guard());

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(hooks.is_empty());
}

#[rstest]
#[serial]
fn deferred_records_are_written_when_the_guard_drops() {
    let raw = SharedBuf::default();
    let deferred = Arc::new(FemtoDeferredHandler::with_stream(raw.clone(), 10));
    deferred.register_exit_flush(&ExitHooks::global());
    deferred
        .handle(FemtoLogRecord::new("boot", FemtoLevel::WARNING, "no config yet"))
        .unwrap();

    {
        let _guard = install_exit_guard();
        assert!(raw.contents().is_empty());
    }

    assert_eq!(raw.contents_string(), "[WARNING ] no config yet\n");
    assert!(deferred.is_empty());
}
