use std::process;
use tokio::sync::watch;

/// Echo identifier for this run, derived from the process id.
pub fn generate_identifier() -> u16 {
    process::id() as u16
}

/// Print error message and exit with error code
pub fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("icmpecho: {}", message);
    process::exit(code);
}

/// Cancellation token checked by the ping loop between cycles.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the sending
    /// side is gone without having requested it.
    pub async fn triggered(&mut self) {
        let closed = self.rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

pub fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (tx, Shutdown { rx })
}

/// Handle Ctrl+C signal for graceful shutdown
pub fn setup_signal_handler() -> Shutdown {
    let (tx, shutdown) = shutdown_channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tx.send_replace(true);
            }
            Err(e) => log::warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    shutdown
}
