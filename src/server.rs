use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

use crate::clock::Clock;
use crate::framer::Framer;
use crate::protocol::ProtocolEngine;
use crate::store::Store;

/// One task per connection. A single connection's failure doesn't bring down the listener.
pub async fn serve(listener: TcpListener, store: Arc<Mutex<Store>>, clock: Arc<dyn Clock>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                continue;
            }
        };

        tracing::info!(%peer, "connection accepted");
        let store = Arc::clone(&store);
        let clock = Arc::clone(&clock);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, store, clock).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            } else {
                tracing::info!(%peer, "connection closed");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    store: Arc<Mutex<Store>>,
    clock: Arc<dyn Clock>,
) -> Result<(), crate::Error> {
    let _ = stream.set_nodelay(true);
    let framer = Framer::new(stream);
    let mut engine = ProtocolEngine::new(framer, store, clock);
    engine.serve().await
}
