use crate::Result;
use crate::error::SupervisorError;

/// Prints a free loopback UDP port
///
/// The port is not reserved; it is only free at the moment it is printed.
#[derive(Debug, clap::Args)]
#[clap(verbatim_doc_comment)]
pub struct Port {}

impl Port {
    pub async fn run(&self) -> Result<()> {
        match crate::port::allocate() {
            0 => Err(SupervisorError::PortAllocation.into()),
            port => {
                println!("{port}");
                Ok(())
            }
        }
    }
}
