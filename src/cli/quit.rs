use crate::Result;
use crate::ipc::{IpcChannel, IpcMessage};

/// Sends the quit datagram to a running daemon
///
/// Fire-and-forget: no reply is read and delivery is not confirmed.
#[derive(Debug, clap::Args)]
#[clap(verbatim_doc_comment)]
pub struct Quit {
    /// Port the daemon listens on
    #[clap(long, short)]
    port: u16,
}

impl Quit {
    pub async fn run(&self) -> Result<()> {
        let channel = IpcChannel::connect(self.port).await?;
        channel.send(&IpcMessage::Quit).await
    }
}
