//! Rate-limited drop warnings emitted through the `log` facade.
//!
//! `logtest` installs a process-wide logger, so this binary holds a single
//! test.

use std::sync::Arc;
use std::time::Duration;

use femtorelay::lifecycle::{ManualPid, PidSource};
use femtorelay::network::{RecordSender, StreamSender, StreamSenderConfig};
use femtorelay::test_utils::ScriptedConnector;
use logtest::Logger;

fn drain_warnings(logger: &mut Logger) -> Vec<String> {
    let mut warnings = Vec::new();
    while let Some(record) = logger.pop() {
        if record.level() == log::Level::Warn {
            warnings.push(record.args().to_owned());
        }
    }
    warnings
}

#[test]
fn unreachable_endpoint_reports_dropped_bytes() {
    let mut logger = Logger::start();
    let peer = ScriptedConnector::new();
    peer.fail_connects(usize::MAX);
    let sender = StreamSender::with_connector(
        peer.boxed(),
        Arc::new(ManualPid::new(7)) as Arc<dyn PidSource>,
        &StreamSenderConfig {
            buffer_max_bytes: 10,
            warn_interval: Duration::from_secs(60),
            ..StreamSenderConfig::default()
        },
    );

    sender.send(vec![b'x'; 20]);
    let warnings = drain_warnings(&mut logger);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("dropped 20 bytes for scripted://peer"));

    // Suppressed within the interval, then reported at shutdown.
    sender.send(vec![b'y'; 30]);
    assert!(drain_warnings(&mut logger).is_empty());
    sender.send(vec![b'z'; 4]);
    assert_eq!(sender.pending_len(), 4);

    sender.stop(false);
    let warnings = drain_warnings(&mut logger);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("discarded 34 bytes for scripted://peer at shutdown"));
    assert_eq!(peer.connects(), 0);
}
