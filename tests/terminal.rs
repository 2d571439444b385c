// Terminal tests - sessions, tabs and the host loop against a fake transport

mod common;

use common::fakes::FakeTerminalConnector;
use lite_ide::services::terminal::{
    ControlMessage, FocusPolicy, InboundPayload, MuxError, OutboundFrame, SessionOptions,
    TerminalEvent, TerminalHost, TerminalMultiplexer, TerminalSize, TerminalState,
};
use lite_ide::services::time_source::{SharedTimeSource, TestTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;

fn host(options: SessionOptions) -> (TerminalHost, Arc<FakeTerminalConnector>, Arc<TestTimeSource>) {
    common::tracing::init_tracing_from_env();
    let time = TestTimeSource::shared();
    let shared: SharedTimeSource = time.clone();
    let connector = FakeTerminalConnector::new();
    let (mux, initial) = TerminalMultiplexer::new(options, FocusPolicy::default(), time.now());
    let host = TerminalHost::new(mux, initial, connector.clone(), shared);
    (host, connector, time)
}

fn resize(cols: u16, rows: u16) -> OutboundFrame {
    OutboundFrame::Control(ControlMessage::Resize { cols, rows })
}

#[test]
fn test_first_frame_is_resize_with_latest_viewport() {
    let (mut host, connector, _time) = host(SessionOptions {
        initial_size: TerminalSize::new(100, 30),
        ..Default::default()
    });
    let id = host.multiplexer().active();

    host.send_keys(b"ls".to_vec());
    host.resize(TerminalSize::new(120, 40));
    host.send_keys(b"\r".to_vec());
    assert!(connector.frames_for(id).is_empty());

    connector.emit(id, |attempt| TerminalEvent::Opened { attempt });
    host.process_pending();

    assert_eq!(
        connector.frames_for(id),
        vec![
            resize(120, 40),
            OutboundFrame::Keys(b"ls".to_vec()),
            OutboundFrame::Keys(b"\r".to_vec()),
        ]
    );
}

#[test]
fn test_resize_burst_is_debounced() {
    let (mut host, connector, time) = host(SessionOptions::default());
    let id = host.multiplexer().active();
    connector.emit(id, |attempt| TerminalEvent::Opened { attempt });
    host.process_pending();

    for cols in [90, 100, 110] {
        host.resize(TerminalSize::new(cols, 30));
        time.advance(Duration::from_millis(30));
        host.process_pending();
    }
    assert_eq!(connector.frames_for(id), vec![resize(80, 24)]);

    time.advance(Duration::from_millis(100));
    host.process_pending();
    assert_eq!(connector.frames_for(id), vec![resize(80, 24), resize(110, 30)]);
}

#[test]
fn test_last_tab_cannot_be_closed() {
    let (mut host, connector, _time) = host(SessionOptions::default());
    let id = host.multiplexer().active();

    assert_eq!(host.close_tab(id), Err(MuxError::LastTab));
    assert_eq!(host.multiplexer().len(), 1);
    assert_eq!(host.open_links(), 1);
    assert!(connector.closed.lock().unwrap().is_empty());
}

#[test]
fn test_tabs_stay_connected_in_background() {
    let (mut host, connector, _time) = host(SessionOptions::default());
    let first = host.multiplexer().active();
    let second = host.new_tab();
    let third = host.new_tab();
    assert_eq!(host.connections_started(), 3);

    host.activate(first).unwrap();
    assert_eq!(host.open_links(), 3);

    // Output of a background tab is still delivered.
    connector.emit(second, |attempt| TerminalEvent::Opened { attempt });
    connector.emit(second, |attempt| TerminalEvent::Payload {
        attempt,
        payload: InboundPayload::Text("$ ".into()),
    });
    host.process_pending();
    assert_eq!(host.take_output(), vec![(second, "$ ".to_string())]);

    host.activate(third).unwrap();
    host.close_tab(third).unwrap();
    assert_eq!(host.multiplexer().active(), second);
    assert_eq!(host.open_links(), 2);
    assert_eq!(connector.closed.lock().unwrap().len(), 1);
}

#[test]
fn test_close_notice_and_no_reconnect_by_default() {
    let (mut host, connector, time) = host(SessionOptions::default());
    let id = host.multiplexer().active();
    connector.emit(id, |attempt| TerminalEvent::Opened { attempt });
    connector.emit(id, |attempt| TerminalEvent::Closed { attempt });
    host.process_pending();

    assert_eq!(
        host.take_output(),
        vec![(id, "\r\nConnection closed.\r\n".to_string())]
    );
    let state = host.multiplexer().tab(id).unwrap().state();
    assert_eq!(state, TerminalState::Closed);

    time.advance(Duration::from_secs(60));
    host.process_pending();
    assert_eq!(host.connections_started(), 1);
    assert_eq!(host.open_links(), 0);
}

#[test]
fn test_optional_reconnect_after_error() {
    let (mut host, connector, time) = host(SessionOptions {
        auto_reconnect: true,
        reconnect_delay: Duration::from_secs(2),
        ..Default::default()
    });
    let id = host.multiplexer().active();
    connector.emit(id, |attempt| TerminalEvent::Error {
        attempt,
        message: "refused".into(),
    });
    host.process_pending();
    assert_eq!(
        host.take_output(),
        vec![(id, "\r\nConnection error.\r\n".to_string())]
    );
    assert_eq!(host.open_links(), 0);

    time.advance(Duration::from_secs(2));
    host.process_pending();
    assert_eq!(host.connections_started(), 2);
    assert_eq!(host.open_links(), 1);
}

#[test]
fn test_focus_follows_mount() {
    let (mut host, _connector, time) = host(SessionOptions::default());
    let first = host.multiplexer().active();
    assert_eq!(host.focused(), None);

    time.advance(Duration::from_millis(150));
    host.process_pending();
    assert_eq!(host.focused(), None);

    host.set_mounted(first, true);
    assert_eq!(host.focused(), Some(first));

    let second = host.new_tab();
    host.set_mounted(second, true);
    assert_eq!(host.focused(), Some(second));

    host.activate(first).unwrap();
    assert_eq!(host.focused(), Some(first));
}

#[test]
fn test_shutdown_releases_every_link() {
    let (mut host, connector, _time) = host(SessionOptions::default());
    host.new_tab();
    host.shutdown();
    assert_eq!(host.open_links(), 0);
    assert_eq!(connector.closed.lock().unwrap().len(), 2);
}
