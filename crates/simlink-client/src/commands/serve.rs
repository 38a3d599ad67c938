//! Serve command: runs the relay in the foreground.
//!
//! Every sink delivery is printed to stdout, one per line. Ctrl-C stops
//! the relay through its shutdown handle.

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use simlink_core::{Message, MessageType};
use simlink_server::{ChannelSink, RelayConfig, RelayExit, spawn_relay};

use crate::error::{ClientError, ClientResult};

/// Runs the relay until Ctrl-C or until it stops on its own.
///
/// With `once`, the relay is shut down after the first simulation reports
/// that it stopped.
pub async fn run(config: &RelayConfig, once: bool) -> ClientResult<()> {
    let (sink, mut events) = ChannelSink::new();
    let relay = spawn_relay(config.clone(), sink).await?;
    let shutdown = relay.shutdown_handle();
    info!(addr = %relay.local_addr(), "relay listening");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(text) => {
                    println!("{text}");
                    if once && is_stop_event(&text, config.delimiter) {
                        info!("simulation finished, stopping relay");
                        shutdown.shutdown();
                    }
                }
                // The relay task dropped its sink.
                None => break,
            },
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("interrupt received, stopping relay");
                shutdown.shutdown();
                break;
            }
        }
    }

    let exit = relay.join().await;
    print_remaining(&mut events);

    match exit {
        RelayExit::Normal => Ok(()),
        RelayExit::Abnormal => Err(ClientError::Connection(
            "relay stopped abnormally".to_string(),
        )),
    }
}

fn print_remaining(events: &mut UnboundedReceiver<String>) {
    while let Ok(text) = events.try_recv() {
        println!("{text}");
    }
}

/// Returns true for a forwarded `SIMULATION` message that is not `RUNNING`.
fn is_stop_event(text: &str, delimiter: char) -> bool {
    let message = Message::decode_with(text, delimiter);
    message.message_type == Some(MessageType::Simulation) && !message.is_simulation_running()
}
