use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use livetrace::config::LivetraceConfig;
use livetrace_sink::{router, SinkState};

/// Serve an in-process event sink on an ephemeral port, on its own
/// thread and runtime. The returned state is shared with the server so
/// tests can inspect what arrived.
pub fn spawn_sink() -> (Arc<SinkState>, SocketAddr) {
    let state = Arc::new(SinkState::new());
    let listener = TcpListener::bind("127.0.0.1:0").expect("unable to bind sink listener");
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = Arc::clone(&state);
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(router(server_state).into_make_service())
                .await
                .unwrap();
        });
    });

    (state, addr)
}

/// Engine config pointed at the given sink, with fast retry timing and
/// an ephemeral control port.
pub fn test_config(sink_addr: SocketAddr) -> LivetraceConfig {
    let mut config = LivetraceConfig::default();
    config.agent.app_name = "livetrace-tests".to_owned();
    config.sink.url = format!("http://{sink_addr}");
    config.sink.connect_timeout_ms = 2000;
    config.sink.read_timeout_ms = 2000;
    config.sink.base_delay_ms = 10;
    config.control.host = "127.0.0.1".to_owned();
    config.control.port = 0;
    config
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
